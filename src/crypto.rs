//! Cryptographic primitives for TallyChain
//!
//! Hashing is SHA-256 over length-prefixed parts, signatures are ECDSA over
//! P-256 in the fixed 64-byte `r || s` form, and public keys travel as the raw
//! 64-byte `X || Y` coordinates.

use crate::error::ChainError;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

pub const SIGNATURE_SIZE: usize = 64;
pub const PUBLIC_KEY_SIZE: usize = 64;
pub const SECRET_KEY_SIZE: usize = 32;
/// Number of digest bytes kept when deriving an address.
pub const ADDRESS_BYTES: usize = 20;

/// Hash every part prefixed by its 8-byte big-endian length, so that
/// `("ab", "c")` and `("a", "bc")` never collide.
pub fn hash_data(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Number of leading zero bits in `hash` read as a big-endian integer.
pub fn leading_zero_bits(hash: &Hash) -> u32 {
    let mut bits = 0;
    for byte in hash {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

/// True when `hash` < 2^(256 - difficulty).
pub fn validate_hash(hash: &Hash, difficulty: u32) -> bool {
    difficulty <= 256 && leading_zero_bits(hash) >= difficulty
}

/// Derive the hex address of a raw `X || Y` public key.
pub fn address_from_public_key(public_key: &[u8; PUBLIC_KEY_SIZE]) -> String {
    let digest = hash_data(&[&public_key[..]]);
    hex::encode(&digest[..ADDRESS_BYTES])
}

/// Parse a raw `X || Y` public key, rejecting points not on the curve.
pub fn public_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey, ChainError> {
    if bytes.len() != PUBLIC_KEY_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Public key must be exactly {} bytes (X || Y), got {}",
            PUBLIC_KEY_SIZE,
            bytes.len()
        )));
    }
    let mut sec1 = [0u8; PUBLIC_KEY_SIZE + 1];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(bytes);
    VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|e| ChainError::CryptoError(format!("Invalid public key: {}", e)))
}

fn public_key_to_bytes(key: &VerifyingKey) -> [u8; PUBLIC_KEY_SIZE] {
    let point = key.to_encoded_point(false);
    let mut raw = [0u8; PUBLIC_KEY_SIZE];
    // Uncompressed SEC1 is 0x04 || X || Y.
    raw.copy_from_slice(&point.as_bytes()[1..]);
    raw
}

#[derive(Clone)]
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key().clone();
        KeyPair {
            signing_key,
            verifying_key,
        }
    }

    /// Creates a KeyPair from the 32-byte big-endian private scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, ChainError> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(ChainError::CryptoError(format!(
                "Secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        let signing_key = SigningKey::from_slice(bytes)
            .map_err(|e| ChainError::CryptoError(format!("Invalid secret key bytes: {}", e)))?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn secret_bytes(&self) -> [u8; SECRET_KEY_SIZE] {
        let mut out = [0u8; SECRET_KEY_SIZE];
        out.copy_from_slice(&self.signing_key.to_bytes());
        out
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        public_key_to_bytes(&self.verifying_key)
    }

    pub fn address(&self) -> String {
        address_from_public_key(&self.public_key_bytes())
    }

    /// Signs a 32-byte digest directly (no further hashing) and returns `r || s`.
    pub fn sign(&self, digest: &Hash) -> Result<[u8; SIGNATURE_SIZE], ChainError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| ChainError::CryptoError(format!("Failed to sign digest: {}", e)))?;

        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

/// Verifies an `r || s` signature over `digest` under a raw `X || Y` public key.
pub fn verify_signature(
    public_key_bytes: &[u8],
    digest: &Hash,
    signature_bytes: &[u8],
) -> Result<(), ChainError> {
    if signature_bytes.len() != SIGNATURE_SIZE {
        return Err(ChainError::CryptoError(format!(
            "Signature must be exactly {} bytes (r || s), got {}",
            SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }
    let public_key = public_key_from_bytes(public_key_bytes)?;

    let signature = Signature::from_slice(signature_bytes)
        .map_err(|e| ChainError::CryptoError(format!("Invalid signature: {}", e)))?;

    public_key
        .verify_prehash(digest, &signature)
        .map_err(|_| ChainError::CryptoError("Signature verification failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_data_is_length_prefixed() {
        let ab_c = hash_data(&[b"ab".as_slice(), b"c".as_slice()]);
        let a_bc = hash_data(&[b"a".as_slice(), b"bc".as_slice()]);
        assert_ne!(ab_c, a_bc);
        assert_eq!(ab_c, hash_data(&[b"ab".as_slice(), b"c".as_slice()]));
        // A single empty part still differs from no parts at all.
        assert_ne!(hash_data(&[]), hash_data(&[b"".as_slice()]));
    }

    #[test]
    fn test_hash_data_matches_manual_framing() {
        let mut framed = Vec::new();
        framed.extend_from_slice(&3u64.to_be_bytes());
        framed.extend_from_slice(b"abc");
        let expected: Hash = Sha256::digest(&framed).into();
        assert_eq!(hash_data(&[b"abc".as_slice()]), expected);
    }

    #[test]
    fn test_validate_hash_boundaries() {
        let mut hash = [0xFFu8; 32];
        assert!(validate_hash(&hash, 0));
        assert!(!validate_hash(&hash, 1));

        hash[0] = 0x00;
        hash[1] = 0x7F;
        assert!(validate_hash(&hash, 9));
        assert!(!validate_hash(&hash, 10));

        let zero = [0u8; 32];
        assert!(validate_hash(&zero, 256));
        assert!(!validate_hash(&zero, 257));
    }

    #[test]
    fn test_key_generation() {
        let keypair = KeyPair::generate();
        assert_eq!(keypair.public_key_bytes().len(), PUBLIC_KEY_SIZE);
        assert_eq!(keypair.secret_bytes().len(), SECRET_KEY_SIZE);
    }

    #[test]
    fn test_address_generation() {
        let keypair = KeyPair::generate();
        let address = keypair.address();
        assert_eq!(address.len(), ADDRESS_BYTES * 2);
        assert!(address.chars().all(|c| c.is_ascii_hexdigit()));

        let digest = hash_data(&[keypair.public_key_bytes().as_slice()]);
        assert_eq!(address, hex::encode(&digest[..20]));
    }

    #[test]
    fn test_keypair_roundtrip_through_secret_bytes() {
        let keypair = KeyPair::generate();
        let restored = KeyPair::from_secret_bytes(&keypair.secret_bytes()).unwrap();
        assert_eq!(restored.address(), keypair.address());
        assert_eq!(restored.public_key_bytes(), keypair.public_key_bytes());
    }

    #[test]
    fn test_signing_and_verification() {
        let keypair = KeyPair::generate();
        let digest = hash_data(&[b"Hello, TallyChain!".as_slice()]);

        let signature = keypair.sign(&digest).unwrap();
        assert_eq!(signature.len(), SIGNATURE_SIZE);
        assert!(verify_signature(&keypair.public_key_bytes(), &digest, &signature).is_ok());
    }

    #[test]
    fn test_invalid_signature() {
        let keypair1 = KeyPair::generate();
        let keypair2 = KeyPair::generate();
        let digest = hash_data(&[b"Test message".as_slice()]);

        let signature = keypair1.sign(&digest).unwrap();
        let result = verify_signature(&keypair2.public_key_bytes(), &digest, &signature);
        assert_eq!(
            result.unwrap_err().to_string(),
            "Cryptographic error: Signature verification failed"
        );
    }

    #[test]
    fn test_tampered_digest() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(&hash_data(&[b"Original".as_slice()])).unwrap();

        let result = verify_signature(
            &keypair.public_key_bytes(),
            &hash_data(&[b"Tampered".as_slice()]),
            &signature,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_key_or_sig_length_check() {
        let keypair = KeyPair::generate();
        let digest = hash_data(&[b"Test".as_slice()]);
        let signature = keypair.sign(&digest).unwrap();
        let pubkey_bytes = keypair.public_key_bytes();

        let result = verify_signature(&pubkey_bytes[1..], &digest, &signature);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Public key must be exactly"));

        let result = verify_signature(&pubkey_bytes, &digest, &signature[1..]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Signature must be exactly"));

        let mut padded = signature.to_vec();
        padded.push(0);
        assert!(verify_signature(&pubkey_bytes, &digest, &padded).is_err());
    }

    #[test]
    fn test_off_curve_public_key_rejected() {
        let result = public_key_from_bytes(&[7u8; PUBLIC_KEY_SIZE]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_secret_bytes_invalid_length() {
        let short_bytes = [1u8; SECRET_KEY_SIZE - 1];
        let result = KeyPair::from_secret_bytes(&short_bytes);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Secret key must be"));
    }
}
