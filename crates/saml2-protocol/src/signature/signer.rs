//! XML Signature creation.
//!
//! Signs SAML documents with an enveloped XML-DSig signature and produces
//! the detached query signatures of the HTTP-Redirect binding.

use base64::Engine;
use saml2_crypto::{digest, RsaSigningKey, X509Certificate};

use crate::error::{SamlError, SamlResult};
use crate::types::{prefixes, transforms, SAML_NS, XMLDSIG_NS};
use crate::xml::{canonicalize, Element, NamespaceScope, Node, XmlDocument};

use super::SignatureConfig;

/// The service provider's signing key and the certificate that publishes it.
#[derive(Debug)]
pub struct SigningCredential {
    key: RsaSigningKey,
    certificate: X509Certificate,
}

impl SigningCredential {
    /// Pairs a private key with its certificate.
    ///
    /// Fails if the certificate does not carry the key's public half.
    pub fn new(key: RsaSigningKey, certificate: X509Certificate) -> SamlResult<Self> {
        if key.public_key() != certificate.public_key() {
            return Err(SamlError::Configuration(format!(
                "signing key does not match certificate {}",
                certificate.subject()
            )));
        }
        Ok(Self { key, certificate })
    }

    /// Loads a credential from PEM-encoded key and certificate.
    pub fn from_pem(private_key_pem: &str, certificate_pem: &str) -> SamlResult<Self> {
        let key = RsaSigningKey::from_pem(private_key_pem)?;
        let certificate = X509Certificate::from_pem(certificate_pem)?;
        Self::new(key, certificate)
    }

    /// The private key.
    #[must_use]
    pub fn key(&self) -> &RsaSigningKey {
        &self.key
    }

    /// The certificate.
    #[must_use]
    pub fn certificate(&self) -> &X509Certificate {
        &self.certificate
    }
}

/// XML document signer.
///
/// Signs SAML documents using the configured credential.
pub struct XmlSigner<'a> {
    credential: &'a SigningCredential,
    config: SignatureConfig,
}

impl<'a> XmlSigner<'a> {
    /// Creates a signer with the default configuration.
    #[must_use]
    pub fn new(credential: &'a SigningCredential) -> Self {
        Self {
            credential,
            config: SignatureConfig::default(),
        }
    }

    /// Sets the signature configuration.
    #[must_use]
    pub fn with_config(mut self, config: SignatureConfig) -> Self {
        self.config = config;
        self
    }

    /// Signs a serialized XML document.
    ///
    /// # Arguments
    ///
    /// * `xml` - The XML document to sign
    /// * `reference_id` - The ID of the element to sign (without the '#' prefix)
    ///
    /// # Returns
    ///
    /// The signed XML document with the `<ds:Signature>` element inserted.
    pub fn sign(&self, xml: &str, reference_id: &str) -> SamlResult<String> {
        let mut doc = XmlDocument::parse(xml)?;
        self.sign_document(&mut doc, reference_id)?;
        Ok(doc.to_xml())
    }

    /// Signs a freshly built element carrying `reference_id`.
    pub fn sign_element(&self, element: Element, reference_id: &str) -> SamlResult<Element> {
        let mut doc = XmlDocument::from_root(element);
        self.sign_document(&mut doc, reference_id)?;
        Ok(doc.into_root())
    }

    /// Inserts an enveloped signature over the element with `reference_id`.
    ///
    /// The signature goes directly after the element's `saml:Issuer`, or
    /// first when it has none.
    pub fn sign_document(&self, doc: &mut XmlDocument, reference_id: &str) -> SamlResult<()> {
        let algorithm = self.config.algorithm;
        if !algorithm.rsa_algorithm().can_sign() {
            return Err(SamlError::Crypto(format!(
                "{} may only be used for verification",
                algorithm.uri()
            )));
        }

        match doc.root().count_id(reference_id) {
            1 => {}
            0 => {
                return Err(SamlError::InvalidArgument(format!(
                    "no element with ID {reference_id}"
                )))
            }
            _ => {
                return Err(SamlError::Security(format!(
                    "duplicate ID {reference_id} in document to sign"
                )))
            }
        }

        let (target, inherited) = doc
            .root()
            .find_with_scope(&NamespaceScope::new(), &|el| el.id() == Some(reference_id))
            .ok_or_else(|| SamlError::Internal(format!("element {reference_id} vanished")))?;

        // Calculate the digest
        let canonical_element =
            canonicalize(target, &inherited, self.config.canonicalization, &[], None);
        let digest_value = base64::engine::general_purpose::STANDARD.encode(digest(
            algorithm.digest_algorithm(),
            canonical_element.as_bytes(),
        ));

        // Build the SignedInfo element
        let signed_info = self.build_signed_info(reference_id, &digest_value);

        // Canonicalize SignedInfo in the scope it will have inside ds:Signature
        let mut signed_info_scope = target.scope(&inherited);
        signed_info_scope.insert(prefixes::DS.to_string(), XMLDSIG_NS.to_string());
        let canonical_signed_info = canonicalize(
            &signed_info,
            &signed_info_scope,
            self.config.canonicalization,
            &[],
            None,
        );

        // Sign the canonical SignedInfo
        let signature_value = self
            .credential
            .key
            .sign(algorithm.rsa_algorithm(), canonical_signed_info.as_bytes())?;
        let signature_b64 = base64::engine::general_purpose::STANDARD.encode(signature_value);

        let signature = self.build_signature_element(signed_info, signature_b64);

        // Insert the signature into the document
        let target = doc
            .root_mut()
            .find_by_id_mut(reference_id)
            .ok_or_else(|| SamlError::Internal(format!("element {reference_id} vanished")))?;
        let position = target
            .children
            .iter()
            .position(|node| matches!(node, Node::Element(el) if el.is(SAML_NS, "Issuer")))
            .map_or(0, |index| index + 1);
        target.children.insert(position, Node::Element(signature));

        tracing::trace!(reference_id, algorithm = algorithm.uri(), "signed element");
        Ok(())
    }

    /// Signs the octets of an HTTP-Redirect query.
    ///
    /// `query` is `SAMLRequest=...[&RelayState=...]&SigAlg=...` exactly as it
    /// will appear in the URL. Returns the base64 signature value.
    pub fn sign_redirect_query(&self, query: &str) -> SamlResult<String> {
        let algorithm = self.config.algorithm;
        let signature = self
            .credential
            .key
            .sign(algorithm.rsa_algorithm(), query.as_bytes())?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature))
    }

    /// The configured signature algorithm.
    #[must_use]
    pub fn algorithm(&self) -> super::SignatureAlgorithm {
        self.config.algorithm
    }

    fn build_signed_info(&self, reference_id: &str, digest_value: &str) -> Element {
        let c14n = self.config.canonicalization.uri();
        Element::new("ds:SignedInfo", XMLDSIG_NS)
            .child(Element::new("ds:CanonicalizationMethod", XMLDSIG_NS).attr("Algorithm", c14n))
            .child(
                Element::new("ds:SignatureMethod", XMLDSIG_NS)
                    .attr("Algorithm", self.config.algorithm.uri()),
            )
            .child(
                Element::new("ds:Reference", XMLDSIG_NS)
                    .attr("URI", format!("#{reference_id}"))
                    .child(
                        Element::new("ds:Transforms", XMLDSIG_NS)
                            .child(
                                Element::new("ds:Transform", XMLDSIG_NS)
                                    .attr("Algorithm", transforms::ENVELOPED_SIGNATURE),
                            )
                            .child(Element::new("ds:Transform", XMLDSIG_NS).attr("Algorithm", c14n)),
                    )
                    .child(
                        Element::new("ds:DigestMethod", XMLDSIG_NS)
                            .attr("Algorithm", self.config.algorithm.digest_uri()),
                    )
                    .child(Element::new("ds:DigestValue", XMLDSIG_NS).text(digest_value)),
            )
    }

    fn build_signature_element(&self, signed_info: Element, signature_value: String) -> Element {
        let key_info = self.config.include_certificate.then(|| {
            Element::new("ds:KeyInfo", XMLDSIG_NS).child(
                Element::new("ds:X509Data", XMLDSIG_NS).child(
                    Element::new("ds:X509Certificate", XMLDSIG_NS)
                        .text(self.credential.certificate.to_base64()),
                ),
            )
        });

        Element::new("ds:Signature", XMLDSIG_NS)
            .declare(prefixes::DS, XMLDSIG_NS)
            .child(signed_info)
            .child(Element::new("ds:SignatureValue", XMLDSIG_NS).text(signature_value))
            .child_opt(key_info)
    }
}
