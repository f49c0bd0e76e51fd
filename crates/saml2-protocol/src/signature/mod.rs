//! XML Signature support for SAML.
//!
//! Enveloped XML-DSig signatures over SAML protocol messages and assertions,
//! plus the detached query-string signatures of the HTTP-Redirect binding.
//!
//! Signing always uses RSA with a SHA-2 hash. Verification additionally
//! accepts RSA-SHA1 and SHA-1 digests, which older identity providers still
//! emit.

mod signer;
mod verifier;

pub use signer::{SigningCredential, XmlSigner};
pub use verifier::{
    check_element_signature, check_signature, check_signature_with_keys, extract_key,
    extract_keys, is_signed, verify_query_signature, CertificateSpecification,
    ValidityPeriodSpecification, VerificationKey,
};

use saml2_crypto::{DigestAlgorithm, RsaAlgorithm};

use crate::types::{digest_algorithms, signature_algorithms, transforms};
use crate::xml::C14nMethod;

/// `ec:InclusiveNamespaces` namespace of the exclusive canonicalization.
pub const EXC_C14N_NS: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

/// XML Signature algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    /// RSA with SHA-256 (recommended).
    #[default]
    RsaSha256,
    /// RSA with SHA-384.
    RsaSha384,
    /// RSA with SHA-512.
    RsaSha512,
    /// RSA with SHA-1 (verification only).
    RsaSha1,
}

impl SignatureAlgorithm {
    /// Returns the algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::RsaSha256 => signature_algorithms::RSA_SHA256,
            Self::RsaSha384 => signature_algorithms::RSA_SHA384,
            Self::RsaSha512 => signature_algorithms::RSA_SHA512,
            Self::RsaSha1 => signature_algorithms::RSA_SHA1,
        }
    }

    /// Returns the digest algorithm URI paired with this signature algorithm.
    #[must_use]
    pub const fn digest_uri(self) -> &'static str {
        match self {
            Self::RsaSha256 => digest_algorithms::SHA256,
            Self::RsaSha384 => digest_algorithms::SHA384,
            Self::RsaSha512 => digest_algorithms::SHA512,
            Self::RsaSha1 => digest_algorithms::SHA1,
        }
    }

    /// Parses a signature algorithm from its URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            signature_algorithms::RSA_SHA256 => Some(Self::RsaSha256),
            signature_algorithms::RSA_SHA384 => Some(Self::RsaSha384),
            signature_algorithms::RSA_SHA512 => Some(Self::RsaSha512),
            signature_algorithms::RSA_SHA1 => Some(Self::RsaSha1),
            _ => None,
        }
    }

    /// Returns true if the algorithm is only accepted on verification.
    #[must_use]
    pub const fn is_deprecated(self) -> bool {
        matches!(self, Self::RsaSha1)
    }

    /// The RSA primitive behind this algorithm.
    #[must_use]
    pub const fn rsa_algorithm(self) -> RsaAlgorithm {
        match self {
            Self::RsaSha256 => RsaAlgorithm::Sha256,
            Self::RsaSha384 => RsaAlgorithm::Sha384,
            Self::RsaSha512 => RsaAlgorithm::Sha512,
            Self::RsaSha1 => RsaAlgorithm::Sha1,
        }
    }

    /// The digest used for references signed with this algorithm.
    #[must_use]
    pub const fn digest_algorithm(self) -> DigestAlgorithm {
        match self {
            Self::RsaSha256 => DigestAlgorithm::Sha256,
            Self::RsaSha384 => DigestAlgorithm::Sha384,
            Self::RsaSha512 => DigestAlgorithm::Sha512,
            Self::RsaSha1 => DigestAlgorithm::Sha1,
        }
    }
}

/// Maps a `ds:DigestMethod` URI to a digest algorithm.
#[must_use]
pub fn digest_from_uri(uri: &str) -> Option<DigestAlgorithm> {
    match uri {
        digest_algorithms::SHA256 => Some(DigestAlgorithm::Sha256),
        digest_algorithms::SHA384 => Some(DigestAlgorithm::Sha384),
        digest_algorithms::SHA512 => Some(DigestAlgorithm::Sha512),
        digest_algorithms::SHA1 => Some(DigestAlgorithm::Sha1),
        _ => None,
    }
}

/// Returns true if `uri` names a transform the verifier understands.
pub(crate) fn is_supported_transform(uri: &str) -> bool {
    uri == transforms::ENVELOPED_SIGNATURE || C14nMethod::from_uri(uri).is_some()
}

/// Signature configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureConfig {
    /// Signature algorithm.
    pub algorithm: SignatureAlgorithm,
    /// Canonicalization used for `SignedInfo` and the reference transform.
    pub canonicalization: C14nMethod,
    /// Include the signing certificate in `KeyInfo`.
    pub include_certificate: bool,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            algorithm: SignatureAlgorithm::RsaSha256,
            canonicalization: C14nMethod::Exclusive,
            include_certificate: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn algorithm_uri_roundtrip() {
        for alg in [
            SignatureAlgorithm::RsaSha256,
            SignatureAlgorithm::RsaSha384,
            SignatureAlgorithm::RsaSha512,
            SignatureAlgorithm::RsaSha1,
        ] {
            assert_eq!(SignatureAlgorithm::from_uri(alg.uri()), Some(alg));
            assert_eq!(
                digest_from_uri(alg.digest_uri()),
                Some(alg.digest_algorithm())
            );
        }
        assert_eq!(SignatureAlgorithm::from_uri("urn:unknown"), None);
    }

    #[test]
    fn sha1_is_verification_only() {
        assert!(SignatureAlgorithm::RsaSha1.is_deprecated());
        assert!(!SignatureAlgorithm::RsaSha1.rsa_algorithm().can_sign());
        assert!(SignatureAlgorithm::RsaSha256.rsa_algorithm().can_sign());
    }

    #[test]
    fn default_config_uses_exclusive_c14n() {
        let config = SignatureConfig::default();
        assert_eq!(config.algorithm, SignatureAlgorithm::RsaSha256);
        assert_eq!(config.canonicalization, C14nMethod::Exclusive);
        assert!(config.include_certificate);
    }

    #[test]
    fn transforms() {
        assert!(is_supported_transform(transforms::ENVELOPED_SIGNATURE));
        assert!(is_supported_transform(C14nMethod::Exclusive.uri()));
        assert!(!is_supported_transform("http://www.w3.org/TR/1999/REC-xpath-19991116"));
    }
}
