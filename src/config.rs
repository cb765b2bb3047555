//! # Relay Configuration
//!
//! Workflows take an explicit [`RelayConfig`] loaded from the JSON hints file
//! (`PRIVATE_KEY`, `MAX_FEE` and the contract paths), optionally overlaid with
//! environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use starknet::core::types::FieldElement;
use tracing::{debug, info};

use crate::types::{felt_to_u128, parse_felt, RelayError, RelayResult};

/// Default number of distinct owner confirmations required to execute
pub const DEFAULT_MULTISIG_THRESHOLD: usize = 2;

/// Default number of owners deployed for the multisig flow
pub const DEFAULT_MULTISIG_OWNERS: usize = 3;

/// Environment variable overriding `PRIVATE_KEY`
pub const PRIVATE_KEY_ENV: &str = "RELAY_PRIVATE_KEY";

/// Environment variable overriding `MAX_FEE`
pub const MAX_FEE_ENV: &str = "RELAY_MAX_FEE";

/// A number in the hints file: JSON integer or hex/decimal string
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum FeltValue {
    Number(serde_json::Number),
    Text(String),
}

impl FeltValue {
    pub fn to_felt(&self) -> RelayResult<FieldElement> {
        match self {
            FeltValue::Number(n) => parse_felt(&n.to_string()),
            FeltValue::Text(s) => parse_felt(s),
        }
    }
}

/// Raw hints file layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct HintsFile {
    private_key: FeltValue,
    max_fee: FeltValue,
    multicall: PathBuf,
    multisig: PathBuf,
    signature_basic: PathBuf,
    #[serde(default)]
    multisig_threshold: Option<usize>,
    #[serde(default)]
    multisig_owners: Option<usize>,
}

/// Contract artifact paths the workflows deploy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPaths {
    pub multicall: PathBuf,
    pub multisig: PathBuf,
    pub signature_basic: PathBuf,
}

/// Configuration passed to every workflow entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub private_key: FieldElement,
    pub max_fee: FieldElement,
    pub contracts: ContractPaths,
    pub multisig_threshold: usize,
    pub multisig_owners: usize,
}

impl RelayConfig {
    /// Parse a hints document
    pub fn from_json(content: &str) -> RelayResult<Self> {
        let hints: HintsFile = serde_json::from_str(content)?;

        let config = Self {
            private_key: hints.private_key.to_felt()?,
            max_fee: hints.max_fee.to_felt()?,
            contracts: ContractPaths {
                multicall: hints.multicall,
                multisig: hints.multisig,
                signature_basic: hints.signature_basic,
            },
            multisig_threshold: hints.multisig_threshold.unwrap_or(DEFAULT_MULTISIG_THRESHOLD),
            multisig_owners: hints.multisig_owners.unwrap_or(DEFAULT_MULTISIG_OWNERS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Load a hints file from disk
    pub fn load(path: impl AsRef<Path>) -> RelayResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Configuration(format!("failed to read {}: {}", path.display(), e))
        })?;

        let config = Self::from_json(&content)?;
        info!("Loaded relay configuration from {}", path.display());
        Ok(config)
    }

    /// Apply `RELAY_PRIVATE_KEY` / `RELAY_MAX_FEE` overrides when set
    pub fn with_env_overrides(self) -> RelayResult<Self> {
        self.with_overrides(
            std::env::var(PRIVATE_KEY_ENV).ok().as_deref(),
            std::env::var(MAX_FEE_ENV).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, private_key: Option<&str>, max_fee: Option<&str>) -> RelayResult<Self> {
        if let Some(value) = private_key {
            debug!("Private key overridden from environment");
            self.private_key = parse_felt(value)?;
        }
        if let Some(value) = max_fee {
            debug!("Max fee overridden from environment");
            self.max_fee = parse_felt(value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Private key of the `index`-th multisig owner: `PRIVATE_KEY + index`
    pub fn owner_private_key(&self, index: usize) -> FieldElement {
        self.private_key + FieldElement::from(index as u64)
    }

    /// Max fee as an integer amount
    pub fn max_fee_amount(&self) -> RelayResult<u128> {
        felt_to_u128(self.max_fee)
            .ok_or_else(|| RelayError::Configuration(format!("MAX_FEE {:#x} is out of range", self.max_fee)))
    }

    fn validate(&self) -> RelayResult<()> {
        if self.private_key == FieldElement::ZERO {
            return Err(RelayError::Configuration("PRIVATE_KEY must be non-zero".to_string()));
        }
        self.max_fee_amount()?;
        if self.multisig_owners == 0 {
            return Err(RelayError::Configuration("MULTISIG_OWNERS must be at least 1".to_string()));
        }
        if self.multisig_threshold == 0 || self.multisig_threshold > self.multisig_owners {
            return Err(RelayError::Configuration(format!(
                "MULTISIG_THRESHOLD must be between 1 and {}, got {}",
                self.multisig_owners, self.multisig_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const HINTS: &str = r#"{
        "PRIVATE_KEY": 123456789,
        "MAX_FEE": "0x2386f26fc10000",
        "MULTICALL": "contracts/multicall.json",
        "MULTISIG": "contracts/multisig.json",
        "SIGNATURE_BASIC": "contracts/signature_basic.json",
        "EXTRA": "ignored"
    }"#;

    #[test]
    fn test_parse_hints() {
        let config = RelayConfig::from_json(HINTS).unwrap();

        assert_eq!(config.private_key, FieldElement::from(123456789u64));
        assert_eq!(config.max_fee_amount().unwrap(), 10_000_000_000_000_000);
        assert_eq!(config.contracts.multisig, PathBuf::from("contracts/multisig.json"));
        assert_eq!(config.multisig_threshold, DEFAULT_MULTISIG_THRESHOLD);
        assert_eq!(config.multisig_owners, DEFAULT_MULTISIG_OWNERS);
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let err = RelayConfig::from_json(r#"{"PRIVATE_KEY": 1, "MAX_FEE": 1}"#).unwrap_err();
        assert!(matches!(err, RelayError::Serialization(_)));
    }

    #[test]
    fn test_threshold_above_owner_count_is_rejected() {
        let hints = HINTS.replace("\"EXTRA\"", "\"MULTISIG_THRESHOLD\": 4, \"EXTRA\"");
        let err = RelayConfig::from_json(&hints).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_owner_keys_are_sequential() {
        let config = RelayConfig::from_json(HINTS).unwrap();
        assert_eq!(config.owner_private_key(0), config.private_key);
        assert_eq!(config.owner_private_key(2), FieldElement::from(123456791u64));
    }

    #[test]
    fn test_large_integer_private_key() {
        let hints = HINTS.replace("123456789", "1234567890123456789012345678901234567890");
        let config = RelayConfig::from_json(&hints).unwrap();

        assert_eq!(
            config.private_key,
            FieldElement::from_dec_str("1234567890123456789012345678901234567890").unwrap()
        );
        assert_eq!(
            config.owner_private_key(1),
            FieldElement::from_dec_str("1234567890123456789012345678901234567891").unwrap()
        );
    }

    #[test]
    fn test_uppercase_hex_override() {
        let config = RelayConfig::from_json(HINTS).unwrap();
        let config = config.with_overrides(Some("0XFF"), Some("0X3e8")).unwrap();

        assert_eq!(config.private_key, FieldElement::from(255u64));
        assert_eq!(config.max_fee_amount().unwrap(), 1000);
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::from_json(HINTS).unwrap();
        let config = config.with_overrides(Some("0xff"), Some("1000")).unwrap();

        assert_eq!(config.private_key, FieldElement::from(255u64));
        assert_eq!(config.max_fee_amount().unwrap(), 1000);

        let err = config.with_overrides(Some("0x0"), None).unwrap_err();
        assert!(matches!(err, RelayError::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(HINTS.as_bytes()).unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.contracts.multicall, PathBuf::from("contracts/multicall.json"));

        let missing = RelayConfig::load("/nonexistent/hints.json").unwrap_err();
        assert!(matches!(missing, RelayError::Configuration(_)));
    }
}
