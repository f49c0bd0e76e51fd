//! X.509 certificate handling.

use base64::Engine;
use x509_parser::parse_x509_certificate;
use x509_parser::pem::Pem;
use x509_parser::public_key::PublicKey;

use crate::error::{CryptoError, CryptoResult};
use crate::rsa::RsaPublicKey;

/// A parsed X.509 certificate carrying an RSA public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X509Certificate {
    der: Vec<u8>,
    public_key: RsaPublicKey,
    subject: String,
    not_before: i64,
    not_after: i64,
}

impl X509Certificate {
    /// Parses a DER certificate.
    pub fn from_der(der: &[u8]) -> CryptoResult<Self> {
        let (_, cert) = parse_x509_certificate(der)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;

        let public_key = match cert.public_key().parsed() {
            Ok(PublicKey::RSA(rsa)) => RsaPublicKey::from_components(rsa.modulus, rsa.exponent)?,
            Ok(_) => {
                return Err(CryptoError::UnsupportedAlgorithm(
                    "only RSA certificates are supported".to_string(),
                ))
            }
            Err(e) => return Err(CryptoError::InvalidCertificate(e.to_string())),
        };

        let validity = cert.validity();
        Ok(Self {
            der: der.to_vec(),
            public_key,
            subject: cert.subject().to_string(),
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }

    /// Parses the first `CERTIFICATE` block of a PEM document.
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let der = decode_pem(pem, "CERTIFICATE")
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_der(&der)
    }

    /// Parses a base64 DER certificate as found in `ds:X509Certificate`.
    pub fn from_base64(value: &str) -> CryptoResult<Self> {
        let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
        let der = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .map_err(|e| CryptoError::InvalidCertificate(e.to_string()))?;
        Self::from_der(&der)
    }

    /// The DER encoding.
    #[must_use]
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The DER encoding in base64, as embedded in XML.
    #[must_use]
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }

    /// The subject public key.
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// The subject distinguished name.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Returns true if `unix_time` lies inside the validity period.
    #[must_use]
    pub fn is_valid_at(&self, unix_time: i64) -> bool {
        self.not_before <= unix_time && unix_time <= self.not_after
    }
}

/// Decodes the first PEM block with the given label.
pub fn decode_pem(pem: &str, label: &str) -> CryptoResult<Vec<u8>> {
    for block in Pem::iter_from_buffer(pem.as_bytes()) {
        let block = block.map_err(|e| CryptoError::InvalidKey(format!("invalid PEM: {e}")))?;
        if block.label == label {
            return Ok(block.contents);
        }
    }
    Err(CryptoError::InvalidKey(format!("no {label} block in PEM")))
}
