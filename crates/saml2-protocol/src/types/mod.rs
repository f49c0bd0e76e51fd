//! SAML 2.0 types and data structures.
//!
//! Protocol messages built by the service provider serialize through
//! `to_element`/`to_xml`; inbound messages and assertions are read with
//! `from_element`. Parsed models keep optional fields optional so the
//! validators can report what is missing.

mod artifact_resolve;
mod assertion;
mod attribute_query;
mod authn_request;
mod constants;
mod logout;
mod name_id;
mod response;
mod status;

pub use artifact_resolve::*;
pub use assertion::*;
pub use attribute_query::*;
pub use authn_request::*;
pub use constants::*;
pub use logout::*;
pub use name_id::*;
pub use response::*;
pub use status::*;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// Formats a timestamp as an `xs:dateTime` in UTC.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses an `xs:dateTime` value.
pub fn parse_instant(value: &str) -> SamlResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| SamlError::format(format!("Invalid xs:dateTime value: {value}")))
}

/// Parses an optional `xs:dateTime` attribute.
pub(crate) fn instant_attribute(el: &Element, name: &str) -> SamlResult<Option<DateTime<Utc>>> {
    el.attribute(name).map(parse_instant).transpose()
}

/// Parses an optional `xs:boolean` attribute.
pub(crate) fn bool_attribute(el: &Element, name: &str) -> Option<bool> {
    el.attribute(name)
        .map(|value| matches!(value.trim(), "true" | "1"))
}

/// A `saml:` element.
pub(crate) fn saml(local: &str) -> Element {
    Element::new(&format!("{}:{local}", prefixes::SAML), SAML_NS)
}

/// A `samlp:` element.
pub(crate) fn samlp(local: &str) -> Element {
    Element::new(&format!("{}:{local}", prefixes::SAMLP), SAMLP_NS)
}

/// Root element of an outbound protocol message, declaring the protocol and
/// assertion namespaces.
pub(crate) fn protocol_root(local: &str) -> Element {
    samlp(local)
        .declare(prefixes::SAMLP, SAMLP_NS)
        .declare(prefixes::SAML, SAML_NS)
}

/// Checks the root of an inbound protocol message.
pub(crate) fn expect_root(el: &Element, namespace: &str, name: &str) -> SamlResult<()> {
    if el.is(namespace, name) {
        Ok(())
    } else {
        Err(SamlError::format(format!(
            "Expected {name} element but found {}",
            el.qualified_name()
        )))
    }
}

/// Reads a required attribute of an inbound message.
pub(crate) fn required_attribute(el: &Element, name: &str) -> SamlResult<String> {
    el.attribute(name).map(str::to_string).ok_or_else(|| {
        SamlError::format(format!("{} element must have the {name} attribute set.", el.name))
    })
}
