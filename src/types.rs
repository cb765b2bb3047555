//! # Core Types
//!
//! This module defines the error taxonomy and the small felt helpers shared by
//! the chain client, the devnet contracts and the workflows.

use starknet::core::types::FieldElement;
use thiserror::Error;

/// Error types for relay operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("Funding error: {0}")]
    Funding(String),

    #[error("Insufficient balance for {account:#x}: balance {balance}, max fee {max_fee}")]
    InsufficientBalance {
        account: FieldElement,
        balance: u128,
        max_fee: u128,
    },

    #[error("Max fee {max_fee} is below the required fee {required}")]
    MaxFeeTooLow { max_fee: u128, required: u128 },

    #[error("Nonce mismatch: expected {expected:#x}, got {actual:#x}")]
    NonceMismatch {
        expected: FieldElement,
        actual: FieldElement,
    },

    #[error("Invalid signature for account {0:#x}")]
    InvalidSignature(FieldElement),

    #[error("Quorum not met: {confirmations} of {threshold} confirmations")]
    QuorumNotMet { confirmations: usize, threshold: usize },

    #[error("Owner {owner:#x} already confirmed transaction {tx_id:#x}")]
    AlreadyConfirmed {
        owner: FieldElement,
        tx_id: FieldElement,
    },

    #[error("Transaction {0:#x} already executed")]
    AlreadyExecuted(FieldElement),

    #[error("{0:#x} is not an owner")]
    NotOwner(FieldElement),

    #[error("Transaction not found: {0:#x}")]
    TransactionNotFound(FieldElement),

    #[error("Malformed calldata: {0}")]
    MalformedCalldata(String),

    #[error("Call {index} reads calldata[{offset}..{end}] but the buffer holds {len} values")]
    CallOutOfBounds {
        index: usize,
        offset: usize,
        end: usize,
        len: usize,
    },

    #[error("Contract not found: {0:#x}")]
    ContractNotFound(FieldElement),

    #[error("Entry point {selector:#x} not found in contract {contract:#x}")]
    EntryPointNotFound {
        contract: FieldElement,
        selector: FieldElement,
    },

    #[error("Unknown contract class: {0}")]
    UnknownContractClass(String),

    #[error("Invalid constructor arguments: {0}")]
    InvalidConstructor(String),

    #[error("Re-entrant call into contract {0:#x}")]
    Reentrancy(FieldElement),

    #[error("Evaluator rejected invocation: {0}")]
    EvaluatorRejected(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Signing error: {0}")]
    Signing(String),
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Parse a felt from either a `0x`-prefixed hex string or a decimal string
pub fn parse_felt(value: &str) -> RelayResult<FieldElement> {
    let value = value.trim();
    let hex_digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"));
    let parsed = if let Some(digits) = hex_digits {
        FieldElement::from_hex_be(&format!("0x{}", digits)).map_err(|e| e.to_string())
    } else {
        FieldElement::from_dec_str(value).map_err(|e| e.to_string())
    };

    parsed.map_err(|e| RelayError::Serialization(format!("invalid felt '{}': {}", value, e)))
}

/// Interpret a felt as an integer amount, if it fits in 128 bits
pub fn felt_to_u128(value: FieldElement) -> Option<u128> {
    let bytes = value.to_bytes_be();
    if bytes[..16].iter().any(|b| *b != 0) {
        return None;
    }
    let mut low = [0u8; 16];
    low.copy_from_slice(&bytes[16..]);
    Some(u128::from_be_bytes(low))
}

/// Read a length or offset field out of calldata
pub fn felt_to_usize(value: FieldElement) -> RelayResult<usize> {
    felt_to_u128(value)
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| RelayError::MalformedCalldata(format!("{:#x} does not fit in a length", value)))
}

/// Encode a boolean the way Cairo views return it
pub fn felt_from_bool(value: bool) -> FieldElement {
    if value {
        FieldElement::ONE
    } else {
        FieldElement::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_felt_hex_and_decimal() {
        assert_eq!(parse_felt("0x10").unwrap(), FieldElement::from(16u64));
        assert_eq!(parse_felt("16").unwrap(), FieldElement::from(16u64));
        assert_eq!(parse_felt(" 0X1f ").unwrap(), FieldElement::from(31u64));
    }

    #[test]
    fn test_parse_felt_rejects_garbage() {
        let err = parse_felt("not-a-number").unwrap_err();
        assert!(matches!(err, RelayError::Serialization(_)));
    }

    #[test]
    fn test_felt_to_u128() {
        assert_eq!(felt_to_u128(FieldElement::from(u128::MAX)), Some(u128::MAX));
        assert_eq!(felt_to_u128(FieldElement::MAX), None);
    }

    #[test]
    fn test_felt_to_usize() {
        assert_eq!(felt_to_usize(FieldElement::from(42u64)).unwrap(), 42);

        let huge = FieldElement::from_hex_be("0x100000000000000000000000000000000").unwrap();
        assert!(matches!(felt_to_usize(huge), Err(RelayError::MalformedCalldata(_))));
    }

    #[test]
    fn test_error_display() {
        let err = RelayError::NonceMismatch {
            expected: FieldElement::from(2u64),
            actual: FieldElement::from(1u64),
        };
        assert_eq!(err.to_string(), "Nonce mismatch: expected 0x2, got 0x1");

        let err = RelayError::QuorumNotMet { confirmations: 1, threshold: 2 };
        assert_eq!(err.to_string(), "Quorum not met: 1 of 2 confirmations");
    }
}
