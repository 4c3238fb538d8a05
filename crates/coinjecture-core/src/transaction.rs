use serde::{Deserialize, Serialize};

use crate::constants::{CODEC_VERSION, TRANSFER_GAS_MIN};
use crate::error::CoinjectureError;
use crate::types::{Address, Balance, Gas, Nonce, Signature, Timestamp};

// ── TxType ───────────────────────────────────────────────────────────────────

/// Kind of state transition a transaction performs.
///
/// Dispatch in the applier is an exhaustive `match`; adding a variant without
/// handling it everywhere is a compile error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxType {
    /// Plain value transfer.
    Transfer = 1,
    /// Transfer whose `data` field references off-chain escrow terms.
    Escrow = 2,
}

impl TxType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Transfer),
            2 => Some(Self::Escrow),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

// ── Transaction ──────────────────────────────────────────────────────────────

/// A signed value-transfer transaction.
///
/// Two canonical byte encodings exist:
/// - [`Transaction::signing_bytes`] covers every field preceding the
///   signature, in declaration order (including `fee`), and is what the
///   sender signs;
/// - [`Transaction::hash_bytes`] is the wire-format hash preimage
///   (`codec ‖ type ‖ from ‖ to ‖ amount ‖ nonce ‖ gas_limit ‖ gas_price ‖
///   len(data) ‖ data ‖ timestamp`), hashed with SHA-256 to produce the
///   transaction identifier.
///
/// All integers are little-endian in both encodings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub codec_version: u8,
    pub tx_type: TxType,
    pub from: Address,
    pub to: Address,
    pub amount: Balance,
    pub fee: Balance,
    pub gas_limit: Gas,
    pub gas_price: Gas,
    pub nonce: Nonce,
    pub data: Vec<u8>,
    pub timestamp: Timestamp,
    pub signature: Signature,
}

impl Transaction {
    /// The bytes covered by the sender's signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 64 + 8 * 5 + 4 + self.data.len() + 8);
        out.push(self.codec_version);
        out.push(self.tx_type.as_u8());
        out.extend_from_slice(self.from.as_bytes());
        out.extend_from_slice(self.to.as_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.fee.to_le_bytes());
        out.extend_from_slice(&self.gas_limit.to_le_bytes());
        out.extend_from_slice(&self.gas_price.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    /// The canonical hash preimage (identifier derivation, wire format §).
    pub fn hash_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + 64 + 8 * 4 + 4 + self.data.len() + 8);
        out.push(self.codec_version);
        out.push(self.tx_type.as_u8());
        out.extend_from_slice(self.from.as_bytes());
        out.extend_from_slice(self.to.as_bytes());
        out.extend_from_slice(&self.amount.to_le_bytes());
        out.extend_from_slice(&self.nonce.to_le_bytes());
        out.extend_from_slice(&self.gas_limit.to_le_bytes());
        out.extend_from_slice(&self.gas_price.to_le_bytes());
        out.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&(self.timestamp as u64).to_le_bytes());
        out
    }

    /// `amount + fee`, or an overflow error.
    pub fn total_cost(&self) -> Result<Balance, CoinjectureError> {
        self.amount
            .checked_add(self.fee)
            .ok_or(CoinjectureError::CostOverflow)
    }

    /// Stateless shape validation: field ranges that hold regardless of the
    /// current ledger state. Signature and nonce/balance checks live in the
    /// crypto and state layers respectively.
    pub fn validate_shape(&self) -> Result<(), CoinjectureError> {
        if self.codec_version != CODEC_VERSION {
            return Err(CoinjectureError::UnsupportedCodec {
                got: self.codec_version,
            });
        }
        if self.amount == 0 {
            return Err(CoinjectureError::ZeroAmount);
        }
        if self.from == self.to {
            return Err(CoinjectureError::SelfTransfer);
        }
        if self.gas_limit < TRANSFER_GAS_MIN {
            return Err(CoinjectureError::GasLimitTooLow {
                min: TRANSFER_GAS_MIN,
                got: self.gas_limit,
            });
        }
        self.total_cost()?;
        match self.tx_type {
            TxType::Transfer => {}
            TxType::Escrow => {
                if self.data.is_empty() {
                    return Err(CoinjectureError::EscrowDataMissing);
                }
            }
        }
        Ok(())
    }
}
