//! RSA PKCS#1 v1.5 signing and verification.
//!
//! XML-DSig and the Redirect binding both use RSASSA-PKCS1-v1_5. SHA-1
//! variants are accepted on verification only.

use std::fmt;

use aws_lc_rs::rand::SystemRandom;
use aws_lc_rs::signature::{self, KeyPair, RsaKeyPair, UnparsedPublicKey};

use crate::certificate::decode_pem;
use crate::der;
use crate::error::{CryptoError, CryptoResult};

/// RSA signature algorithms, identified by their hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsaAlgorithm {
    /// RSA with SHA-1 (verification only).
    Sha1,
    /// RSA with SHA-256.
    Sha256,
    /// RSA with SHA-384.
    Sha384,
    /// RSA with SHA-512.
    Sha512,
}

impl RsaAlgorithm {
    /// Returns true if keys may sign with this algorithm.
    #[must_use]
    pub const fn can_sign(self) -> bool {
        !matches!(self, Self::Sha1)
    }

    fn verification(self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            Self::Sha1 => &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &signature::RSA_PKCS1_2048_8192_SHA256,
            Self::Sha384 => &signature::RSA_PKCS1_2048_8192_SHA384,
            Self::Sha512 => &signature::RSA_PKCS1_2048_8192_SHA512,
        }
    }
}

/// An RSA private key able to produce PKCS#1 v1.5 signatures.
pub struct RsaSigningKey {
    key_pair: RsaKeyPair,
    public_key: RsaPublicKey,
}

impl RsaSigningKey {
    /// Loads a PKCS#8 DER private key.
    pub fn from_pkcs8(pkcs8_der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_pkcs8(pkcs8_der)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PKCS#8 RSA key: {e}")))?;
        Self::from_key_pair(key_pair)
    }

    /// Loads a PKCS#1 or PKCS#8 DER private key.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let key_pair = RsaKeyPair::from_der(der)
            .or_else(|_| RsaKeyPair::from_pkcs8(der))
            .map_err(|e| CryptoError::InvalidKey(format!("invalid RSA key: {e}")))?;
        Self::from_key_pair(key_pair)
    }

    /// Loads a PEM private key (`PRIVATE KEY` or `RSA PRIVATE KEY`).
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let der = decode_pem(pem, "PRIVATE KEY")
            .or_else(|_| decode_pem(pem, "RSA PRIVATE KEY"))
            .map_err(|_| CryptoError::InvalidKey("no private key found in PEM".to_string()))?;
        Self::from_der(&der)
    }

    fn from_key_pair(key_pair: RsaKeyPair) -> CryptoResult<Self> {
        let public_key = RsaPublicKey::from_der(key_pair.public_key().as_ref())?;
        Ok(Self {
            key_pair,
            public_key,
        })
    }

    /// Returns the matching public key.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Signs `data` with the given algorithm.
    pub fn sign(&self, algorithm: RsaAlgorithm, data: &[u8]) -> CryptoResult<Vec<u8>> {
        let padding = match algorithm {
            RsaAlgorithm::Sha256 => &signature::RSA_PKCS1_SHA256,
            RsaAlgorithm::Sha384 => &signature::RSA_PKCS1_SHA384,
            RsaAlgorithm::Sha512 => &signature::RSA_PKCS1_SHA512,
            RsaAlgorithm::Sha1 => {
                return Err(CryptoError::UnsupportedAlgorithm(
                    "RSA-SHA1 is accepted for verification only".to_string(),
                ))
            }
        };

        let rng = SystemRandom::new();
        let mut sig = vec![0u8; self.key_pair.public_modulus_len()];
        self.key_pair
            .sign(padding, &rng, data, &mut sig)
            .map_err(|e| CryptoError::Signing(format!("RSA signing failed: {e}")))?;
        Ok(sig)
    }
}

impl fmt::Debug for RsaSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSigningKey")
            .field("modulus_bits", &(self.public_key.modulus().len() * 8))
            .finish_non_exhaustive()
    }
}

/// An RSA public key held as modulus and exponent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RsaPublicKey {
    modulus: Vec<u8>,
    exponent: Vec<u8>,
}

impl RsaPublicKey {
    /// Builds a key from big-endian modulus and exponent bytes.
    pub fn from_components(modulus: &[u8], exponent: &[u8]) -> CryptoResult<Self> {
        let modulus = der::strip_leading_zeros(modulus);
        let exponent = der::strip_leading_zeros(exponent);
        if modulus.is_empty() || exponent.is_empty() {
            return Err(CryptoError::InvalidKey(
                "modulus and exponent must be non-zero".to_string(),
            ));
        }
        Ok(Self { modulus, exponent })
    }

    /// Parses a PKCS#1 `RSAPublicKey` or a `SubjectPublicKeyInfo`.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let (n, e) = der::rsa_components(der)?;
        Self::from_components(&n, &e)
    }

    /// Big-endian modulus without leading zeros.
    #[must_use]
    pub fn modulus(&self) -> &[u8] {
        &self.modulus
    }

    /// Big-endian public exponent without leading zeros.
    #[must_use]
    pub fn exponent(&self) -> &[u8] {
        &self.exponent
    }

    /// Encodes this key as a PKCS#1 `RSAPublicKey`.
    #[must_use]
    pub fn to_pkcs1_der(&self) -> Vec<u8> {
        der::encode_rsa_public_key(&self.modulus, &self.exponent)
    }

    /// Verifies a PKCS#1 v1.5 signature. Never errors; a bad key or
    /// signature simply fails verification.
    #[must_use]
    pub fn verify(&self, algorithm: RsaAlgorithm, data: &[u8], sig: &[u8]) -> bool {
        let der = self.to_pkcs1_der();
        UnparsedPublicKey::new(algorithm.verification(), &der)
            .verify(data, sig)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_PEM: &str = include_str!("../../saml2-protocol/testdata/sp.key.pem");
    const OTHER_KEY_PEM: &str = include_str!("../../saml2-protocol/testdata/idp.key.pem");

    #[test]
    fn sign_and_verify() {
        let key = RsaSigningKey::from_pem(KEY_PEM).unwrap();
        let sig = key.sign(RsaAlgorithm::Sha256, b"payload").unwrap();

        assert_eq!(sig.len(), 256);
        assert!(key.public_key().verify(RsaAlgorithm::Sha256, b"payload", &sig));
        assert!(!key.public_key().verify(RsaAlgorithm::Sha256, b"tampered", &sig));
        assert!(!key.public_key().verify(RsaAlgorithm::Sha512, b"payload", &sig));
    }

    #[test]
    fn wrong_key_does_not_verify() {
        let key = RsaSigningKey::from_pem(KEY_PEM).unwrap();
        let other = RsaSigningKey::from_pem(OTHER_KEY_PEM).unwrap();
        let sig = key.sign(RsaAlgorithm::Sha384, b"payload").unwrap();

        assert!(!other.public_key().verify(RsaAlgorithm::Sha384, b"payload", &sig));
    }

    #[test]
    fn sha1_signing_is_refused() {
        let key = RsaSigningKey::from_pem(KEY_PEM).unwrap();
        assert!(matches!(
            key.sign(RsaAlgorithm::Sha1, b"payload"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn public_key_survives_der_encoding() {
        let key = RsaSigningKey::from_pem(KEY_PEM).unwrap();
        let der = key.public_key().to_pkcs1_der();
        assert_eq!(&RsaPublicKey::from_der(&der).unwrap(), key.public_key());
    }

    #[test]
    fn garbage_pem_rejected() {
        assert!(RsaSigningKey::from_pem("not a key").is_err());
    }
}
