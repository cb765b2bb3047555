//! # Transaction Hashing and Signing
//!
//! Account contracts authorize an `__execute__` payload by checking a STARK
//! curve signature over `H(account_address, H(calldata))`, where `H` is the
//! Pedersen hash-on-elements used by Cairo 0 contracts.

use starknet::core::crypto::{compute_hash_on_elements, ecdsa_sign, ecdsa_verify, Signature};
use starknet::core::types::FieldElement;
use tracing::debug;

use crate::types::{RelayError, RelayResult};

/// Hash an account payload: the digest an account's owner signs
pub fn invoke_tx_hash(account_address: FieldElement, calldata: &[FieldElement]) -> FieldElement {
    let calldata_hash = compute_hash_on_elements(calldata);
    compute_hash_on_elements(&[account_address, calldata_hash])
}

/// Sign a digest with a raw private key, returning `[r, s]`
pub fn sign_digest(digest: FieldElement, private_key: FieldElement) -> RelayResult<Vec<FieldElement>> {
    let signature = ecdsa_sign(&private_key, &digest)
        .map_err(|e| RelayError::Signing(e.to_string()))?;
    Ok(vec![signature.r, signature.s])
}

/// Derive the public stark key for a private key
pub fn private_to_stark_key(private_key: FieldElement) -> FieldElement {
    starknet_crypto::get_public_key(&private_key)
}

/// Check an `[r, s]` signature against a public key
pub fn verify_signature(public_key: FieldElement, digest: FieldElement, signature: &[FieldElement]) -> bool {
    let [r, s] = match signature {
        [r, s] => [*r, *s],
        _ => return false,
    };

    ecdsa_verify(&public_key, &digest, &Signature { r, s }).unwrap_or(false)
}

/// Local key holder for one account owner
#[derive(Debug, Clone)]
pub struct StarkSigner {
    private_key: FieldElement,
    stark_key: FieldElement,
}

impl StarkSigner {
    pub fn new(private_key: FieldElement) -> Self {
        Self {
            private_key,
            stark_key: private_to_stark_key(private_key),
        }
    }

    /// Public key the account contract is deployed with
    pub fn stark_key(&self) -> FieldElement {
        self.stark_key
    }

    pub fn private_key(&self) -> FieldElement {
        self.private_key
    }

    /// Hash and sign an `__execute__` payload for `account_address`
    pub fn sign_invoke(
        &self,
        account_address: FieldElement,
        calldata: &[FieldElement],
    ) -> RelayResult<(FieldElement, Vec<FieldElement>)> {
        let digest = invoke_tx_hash(account_address, calldata);
        let signature = sign_digest(digest, self.private_key)?;

        debug!("Signed payload for {:#x}: digest={:#x}", account_address, digest);
        Ok((digest, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> FieldElement {
        FieldElement::from_hex_be("0x1234567890abcdef").unwrap()
    }

    #[test]
    fn test_sign_and_verify() {
        let signer = StarkSigner::new(key());
        let account = FieldElement::from(0x42u64);
        let calldata = vec![FieldElement::ONE, FieldElement::from(2u64)];

        let (digest, signature) = signer.sign_invoke(account, &calldata).unwrap();

        assert_eq!(digest, invoke_tx_hash(account, &calldata));
        assert!(verify_signature(signer.stark_key(), digest, &signature));
    }

    #[test]
    fn test_stark_key_matches_free_function() {
        let signer = StarkSigner::new(key());
        assert_eq!(signer.stark_key(), private_to_stark_key(key()));
        assert_eq!(signer.private_key(), key());
    }

    #[test]
    fn test_raw_signature_verifies() {
        let digest = invoke_tx_hash(FieldElement::from(7u64), &[FieldElement::from(8u64)]);
        let signature = sign_digest(digest, key()).unwrap();
        assert!(verify_signature(private_to_stark_key(key()), digest, &signature));
    }

    #[test]
    fn test_hash_covers_address_and_payload() {
        let calldata = vec![FieldElement::ONE];
        let base = invoke_tx_hash(FieldElement::from(1u64), &calldata);

        assert_ne!(base, invoke_tx_hash(FieldElement::from(2u64), &calldata));
        assert_ne!(base, invoke_tx_hash(FieldElement::from(1u64), &[FieldElement::from(2u64)]));
    }

    #[test]
    fn test_wrong_key_or_shape_fails_verification() {
        let signer = StarkSigner::new(key());
        let other = StarkSigner::new(key() + FieldElement::ONE);
        let (digest, signature) = signer.sign_invoke(FieldElement::ONE, &[]).unwrap();

        assert!(!verify_signature(other.stark_key(), digest, &signature));
        assert!(!verify_signature(signer.stark_key(), digest, &signature[..1]));
    }
}
