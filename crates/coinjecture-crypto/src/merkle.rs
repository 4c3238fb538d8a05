//! Binary SHA-256 Merkle tree over ordered hash lists.
//!
//! Empty input yields the all-zero root; a single leaf is its own root.
//! Levels with an odd node count duplicate the last element.

use sha2::{Digest, Sha256};

use coinjecture_core::types::Hash32;

fn hash_pair(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Compute the Merkle root of an ordered list of leaf hashes.
pub fn merkle_root(hashes: &[Hash32]) -> Hash32 {
    match hashes.len() {
        0 => [0u8; 32],
        1 => hashes[0],
        _ => {
            let mut level: Vec<Hash32> = hashes.to_vec();
            while level.len() > 1 {
                if level.len() % 2 == 1 {
                    level.push(*level.last().unwrap());
                }
                level = level
                    .chunks(2)
                    .map(|pair| hash_pair(&pair[0], &pair[1]))
                    .collect();
            }
            level[0]
        }
    }
}

/// Build the sibling path for the leaf at `index`.
///
/// Returns the bottom-up list of sibling hashes; feed to [`verify_proof`]
/// with the same index. Empty for a single-leaf tree.
pub fn build_proof(hashes: &[Hash32], index: usize) -> Option<Vec<Hash32>> {
    if index >= hashes.len() {
        return None;
    }
    if hashes.len() == 1 {
        return Some(Vec::new());
    }

    let mut proof = Vec::new();
    let mut level: Vec<Hash32> = hashes.to_vec();
    let mut pos = index;
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(*level.last().unwrap());
        }
        let sibling = if pos % 2 == 0 { pos + 1 } else { pos - 1 };
        proof.push(level[sibling]);
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();
        pos /= 2;
    }
    Some(proof)
}

/// Verify an inclusion proof: fold the sibling path over the leaf and compare
/// against `root`. Bit `i` of `index` selects whether the current node is the
/// left (`0`) or right (`1`) input at level `i`.
pub fn verify_proof(leaf: &Hash32, proof: &[Hash32], root: &Hash32, index: usize) -> bool {
    let mut current = *leaf;
    for (i, sibling) in proof.iter().enumerate() {
        current = if (index >> i) & 1 == 0 {
            hash_pair(&current, sibling)
        } else {
            hash_pair(sibling, &current)
        };
    }
    current == *root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    fn leaves(n: usize) -> Vec<Hash32> {
        (0..n).map(|i| sha256(&[i as u8])).collect()
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn single_leaf_is_identity() {
        let leaf = sha256(b"only");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn two_leaves() {
        let l = leaves(2);
        assert_eq!(merkle_root(&l), hash_pair(&l[0], &l[1]));
    }

    #[test]
    fn odd_count_duplicates_last() {
        let l = leaves(3);
        let ab = hash_pair(&l[0], &l[1]);
        let cc = hash_pair(&l[2], &l[2]);
        assert_eq!(merkle_root(&l), hash_pair(&ab, &cc));
    }

    #[test]
    fn proofs_verify_for_every_leaf() {
        for n in 1..=9 {
            let l = leaves(n);
            let root = merkle_root(&l);
            for (i, leaf) in l.iter().enumerate() {
                let proof = build_proof(&l, i).unwrap();
                assert!(
                    verify_proof(leaf, &proof, &root, i),
                    "leaf {i} of {n} failed"
                );
            }
        }
    }

    #[test]
    fn proof_rejects_wrong_leaf() {
        let l = leaves(5);
        let root = merkle_root(&l);
        let proof = build_proof(&l, 2).unwrap();
        let bogus = sha256(b"bogus");
        assert!(!verify_proof(&bogus, &proof, &root, 2));
    }

    #[test]
    fn proof_rejects_wrong_index() {
        let l = leaves(4);
        let root = merkle_root(&l);
        let proof = build_proof(&l, 1).unwrap();
        assert!(!verify_proof(&l[1], &proof, &root, 2));
    }

    #[test]
    fn out_of_range_index_has_no_proof() {
        let l = leaves(4);
        assert!(build_proof(&l, 4).is_none());
    }
}
