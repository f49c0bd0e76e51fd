//! XML Signature verification.
//!
//! Trust is disjunctive: a signature is accepted when any one of the
//! candidate keys verifies it. Keys come either from the caller (identity
//! provider metadata) or from the signature's own `ds:KeyInfo`, in which case
//! embedded certificates must satisfy every [`CertificateSpecification`].

use std::sync::Arc;

use base64::Engine;
use chrono::Utc;
use saml2_crypto::{digest, RsaPublicKey, X509Certificate};

use crate::types::{transforms, KeyInfo, KeyInfoClause, XMLDSIG_NS};
use crate::xml::{canonicalize, C14nMethod, Element, NamespaceScope, XmlDocument};

use super::{digest_from_uri, SignatureAlgorithm, EXC_C14N_NS};

/// A public key a signature may be verified with.
pub type VerificationKey = RsaPublicKey;

/// A predicate certificates must satisfy before their key is trusted.
pub trait CertificateSpecification: Send + Sync {
    /// Returns true if the certificate is acceptable.
    fn is_satisfied_by(&self, certificate: &X509Certificate) -> bool;
}

/// Accepts certificates whose validity period contains the current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidityPeriodSpecification;

impl CertificateSpecification for ValidityPeriodSpecification {
    fn is_satisfied_by(&self, certificate: &X509Certificate) -> bool {
        certificate.is_valid_at(Utc::now().timestamp())
    }
}

enum Trust<'a> {
    Keys(&'a [VerificationKey]),
    Embedded(&'a [Arc<dyn CertificateSpecification>]),
}

/// Returns true if the document element carries an enveloped signature.
#[must_use]
pub fn is_signed(doc: &XmlDocument) -> bool {
    doc.root().find_child(XMLDSIG_NS, "Signature").is_some()
}

/// Verifies the document element's signature with the keys found in its own
/// `ds:KeyInfo`.
#[must_use]
pub fn check_signature(
    doc: &XmlDocument,
    specifications: &[Arc<dyn CertificateSpecification>],
) -> bool {
    check_root(doc, Trust::Embedded(specifications))
}

/// Verifies the document element's signature with any of `keys`.
#[must_use]
pub fn check_signature_with_keys(doc: &XmlDocument, keys: &[VerificationKey]) -> bool {
    check_root(doc, Trust::Keys(keys))
}

/// Verifies the signature of the element carrying `id` somewhere under
/// `root` with any of `keys`.
///
/// Fails when the ID is absent or not unique in the document.
#[must_use]
pub fn check_element_signature(root: &Element, id: &str, keys: &[VerificationKey]) -> bool {
    let Some((element, inherited)) =
        root.find_with_scope(&NamespaceScope::new(), &|el| el.id() == Some(id))
    else {
        tracing::debug!(id, "signed element not found");
        return false;
    };
    report(verify_enveloped(root, element, &inherited, &Trust::Keys(keys)))
}

fn check_root(doc: &XmlDocument, trust: Trust<'_>) -> bool {
    let root = doc.root();
    report(verify_enveloped(root, root, &NamespaceScope::new(), &trust))
}

fn report(result: Result<(), String>) -> bool {
    match result {
        Ok(()) => true,
        Err(reason) => {
            tracing::debug!(reason, "signature verification failed");
            false
        }
    }
}

/// Extracts a key from a single `ds:KeyInfo` clause.
///
/// Certificates must satisfy every specification. Returns `None` for clauses
/// that carry no usable RSA key.
#[must_use]
pub fn extract_key(
    clause: &KeyInfoClause,
    specifications: &[Arc<dyn CertificateSpecification>],
) -> Option<VerificationKey> {
    match clause {
        KeyInfoClause::X509Data(certificates) => certificates.iter().find_map(|encoded| {
            let certificate = X509Certificate::from_base64(encoded).ok()?;
            if specifications
                .iter()
                .all(|spec| spec.is_satisfied_by(&certificate))
            {
                Some(certificate.public_key().clone())
            } else {
                tracing::debug!(
                    subject = certificate.subject(),
                    "certificate rejected by specification"
                );
                None
            }
        }),
        KeyInfoClause::RsaKeyValue { modulus, exponent } => {
            let engine = base64::engine::general_purpose::STANDARD;
            let modulus = engine.decode(modulus).ok()?;
            let exponent = engine.decode(exponent).ok()?;
            RsaPublicKey::from_components(&modulus, &exponent).ok()
        }
        KeyInfoClause::KeyName(_) | KeyInfoClause::Unknown(_) => None,
    }
}

/// Extracts every usable key from a `ds:KeyInfo`.
#[must_use]
pub fn extract_keys(
    key_info: &KeyInfo,
    specifications: &[Arc<dyn CertificateSpecification>],
) -> Vec<VerificationKey> {
    key_info
        .clauses
        .iter()
        .filter_map(|clause| extract_key(clause, specifications))
        .collect()
}

/// Verifies an HTTP-Redirect query signature.
///
/// `signed_octets` must be the query components exactly as received.
#[must_use]
pub fn verify_query_signature(
    signed_octets: &str,
    algorithm_uri: &str,
    signature: &str,
    keys: &[VerificationKey],
) -> bool {
    let Some(algorithm) = SignatureAlgorithm::from_uri(algorithm_uri) else {
        tracing::debug!(algorithm_uri, "unsupported SigAlg");
        return false;
    };
    let Ok(signature) = decode_base64(signature) else {
        tracing::debug!("Signature parameter is not valid base64");
        return false;
    };
    keys.iter().any(|key| {
        key.verify(
            algorithm.rsa_algorithm(),
            signed_octets.as_bytes(),
            &signature,
        )
    })
}

fn verify_enveloped(
    root: &Element,
    element: &Element,
    inherited: &NamespaceScope,
    trust: &Trust<'_>,
) -> Result<(), String> {
    let signature = element
        .find_child(XMLDSIG_NS, "Signature")
        .ok_or("element is not signed")?;
    let signed_info = signature
        .find_child(XMLDSIG_NS, "SignedInfo")
        .ok_or("Signature has no SignedInfo")?;

    let c14n_method = signed_info
        .find_child(XMLDSIG_NS, "CanonicalizationMethod")
        .ok_or("SignedInfo has no CanonicalizationMethod")?;
    let signed_info_method = c14n_method
        .attribute("Algorithm")
        .and_then(C14nMethod::from_uri)
        .ok_or("unsupported CanonicalizationMethod")?;
    let signed_info_prefixes = inclusive_prefixes(c14n_method);

    let algorithm = signed_info
        .find_child(XMLDSIG_NS, "SignatureMethod")
        .and_then(|m| m.attribute("Algorithm"))
        .and_then(SignatureAlgorithm::from_uri)
        .ok_or("unsupported SignatureMethod")?;

    let mut references = signed_info.find_children(XMLDSIG_NS, "Reference");
    let reference = references.next().ok_or("SignedInfo has no Reference")?;
    if references.next().is_some() {
        return Err("SignedInfo must contain exactly one Reference".to_string());
    }
    check_reference_uri(root, element, reference.attribute("URI"))?;

    // Without a canonicalization transform the node-set is serialized with
    // inclusive C14N.
    let mut enveloped = false;
    let mut reference_method = C14nMethod::Inclusive;
    let mut reference_prefixes = Vec::new();
    if let Some(transform_list) = reference.find_child(XMLDSIG_NS, "Transforms") {
        for transform in transform_list.find_children(XMLDSIG_NS, "Transform") {
            let uri = transform.attribute("Algorithm").unwrap_or_default();
            if uri == transforms::ENVELOPED_SIGNATURE {
                enveloped = true;
            } else if let Some(method) = C14nMethod::from_uri(uri) {
                reference_method = method;
                reference_prefixes = inclusive_prefixes(transform);
            } else {
                return Err(format!("unsupported transform {uri}"));
            }
        }
    }

    let digest_algorithm = reference
        .find_child(XMLDSIG_NS, "DigestMethod")
        .and_then(|m| m.attribute("Algorithm"))
        .and_then(digest_from_uri)
        .ok_or("unsupported DigestMethod")?;
    let expected_digest = reference
        .child_text(XMLDSIG_NS, "DigestValue")
        .ok_or("Reference has no DigestValue")
        .and_then(|value| decode_base64(&value).map_err(|()| "DigestValue is not base64"))?;

    let canonical_element = canonicalize(
        element,
        inherited,
        reference_method,
        &reference_prefixes,
        enveloped.then_some(signature),
    );
    if digest(digest_algorithm, canonical_element.as_bytes()) != expected_digest {
        return Err("reference digest mismatch".to_string());
    }

    let signature_value = signature
        .child_text(XMLDSIG_NS, "SignatureValue")
        .ok_or("Signature has no SignatureValue")
        .and_then(|value| decode_base64(&value).map_err(|()| "SignatureValue is not base64"))?;

    let signed_info_scope = signature.scope(&element.scope(inherited));
    let canonical_signed_info = canonicalize(
        signed_info,
        &signed_info_scope,
        signed_info_method,
        &signed_info_prefixes,
        None,
    );

    let embedded;
    let keys = match trust {
        Trust::Keys(keys) => *keys,
        Trust::Embedded(specifications) => {
            embedded = signature
                .find_child(XMLDSIG_NS, "KeyInfo")
                .map(|el| extract_keys(&KeyInfo::from_element(el), specifications))
                .unwrap_or_default();
            embedded.as_slice()
        }
    };
    if keys.is_empty() {
        return Err("no candidate keys".to_string());
    }

    let verified = keys.iter().any(|key| {
        key.verify(
            algorithm.rsa_algorithm(),
            canonical_signed_info.as_bytes(),
            &signature_value,
        )
    });
    if verified {
        if algorithm.is_deprecated() {
            tracing::warn!(algorithm = algorithm.uri(), "accepted deprecated signature algorithm");
        }
        Ok(())
    } else {
        Err("no candidate key verifies SignatureValue".to_string())
    }
}

fn check_reference_uri(root: &Element, element: &Element, uri: Option<&str>) -> Result<(), String> {
    match uri {
        None | Some("") => {
            if std::ptr::eq(root, element) {
                Ok(())
            } else {
                Err("empty Reference URI on an embedded element".to_string())
            }
        }
        Some(uri) => {
            let id = uri
                .strip_prefix('#')
                .ok_or_else(|| format!("unsupported Reference URI {uri}"))?;
            if element.id() != Some(id) {
                return Err(format!("Reference URI {uri} does not point at the signed element"));
            }
            if root.count_id(id) != 1 {
                return Err(format!("ID {id} is not unique in the document"));
            }
            Ok(())
        }
    }
}

fn inclusive_prefixes(method: &Element) -> Vec<String> {
    method
        .find_child(EXC_C14N_NS, "InclusiveNamespaces")
        .and_then(|el| el.attribute("PrefixList"))
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn decode_base64(value: &str) -> Result<Vec<u8>, ()> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|_| ())
}
