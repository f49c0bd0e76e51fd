//! Attribute, encrypted element and extension attribute rules.

use super::{ensure, has_content, is_absolute_uri};
use crate::error::SamlResult;
use crate::types::{EncryptedElement, SamlAttribute, SAML_NAMESPACES, XMLENC_ELEMENT_TYPE};
use crate::xml::XmlAttribute;

/// Validates a `saml:Attribute`.
pub fn validate_attribute(attribute: &SamlAttribute) -> SamlResult<()> {
    ensure(
        has_content(&attribute.name),
        "Name attribute of SAML Attribute MUST contain at least one non-whitespace character",
    )?;
    if let Some(format) = &attribute.name_format {
        ensure(
            is_absolute_uri(format),
            "NameFormat attribute of SAML Attribute has a value which is not a wellformed absolute uri",
        )?;
    }
    validate_any_attributes(&attribute.any_attributes)
}

/// Validates an element of `EncryptedElementType`.
pub fn validate_encrypted_element(element: &EncryptedElement) -> SamlResult<()> {
    let Some(data) = &element.encrypted_data else {
        return ensure(false, "EncryptedElement MUST contain an EncryptedData element");
    };
    if let Some(type_uri) = &data.type_uri {
        ensure(
            type_uri == XMLENC_ELEMENT_TYPE,
            "Type attribute of EncryptedData MUST have the value http://www.w3.org/2001/04/xmlenc#Element",
        )?;
    }
    Ok(())
}

/// Validates extension attributes: they must be namespace qualified and
/// outside the SAML namespaces.
pub fn validate_any_attributes(attributes: &[XmlAttribute]) -> SamlResult<()> {
    for attribute in attributes {
        let Some(namespace) = attribute.namespace.as_deref() else {
            return ensure(false, "Attribute extension xml attributes MUST BE namespace qualified");
        };
        ensure(
            !SAML_NAMESPACES.contains(&namespace),
            "Attribute extension xml attributes MUST NOT use a namespace reserved by SAML",
        )?;
    }
    Ok(())
}
