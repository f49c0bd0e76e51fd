//! SAML Core conformance validation.
//!
//! Each validator covers one element type and fails on the first rule it
//! finds broken, with a [`SamlError::Format`] carrying the rule text.
//! [`AssertionValidator`] composes the others.

mod assertion;
mod attribute;
mod name_id;
mod statement;
mod subject;

pub use assertion::{validate_time_restrictions, AssertionValidator};
pub use attribute::{validate_any_attributes, validate_attribute, validate_encrypted_element};
pub use name_id::NameIdValidator;
pub use statement::StatementValidator;
pub use subject::{
    validate_key_info, validate_subject_confirmation_data, SubjectConfirmationValidator,
    SubjectValidator,
};

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{SamlError, SamlResult};

/// RFC 3986 `scheme ":"` followed only by characters legal in a URI.
static URI_CHARACTERS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:(?:[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=]|%[0-9A-Fa-f]{2})*$")
        .unwrap()
});

/// Returns true if `value` is an absolute URI made of legal characters.
pub(crate) fn is_absolute_uri(value: &str) -> bool {
    URI_CHARACTERS.is_match(value) && url::Url::parse(value).is_ok()
}

/// Returns true if `value` has at least one non-whitespace character.
pub(crate) fn has_content(value: &str) -> bool {
    !value.trim().is_empty()
}

/// Fails with `message` unless `condition` holds.
pub(crate) fn ensure(condition: bool, message: &str) -> SamlResult<()> {
    if condition {
        Ok(())
    } else {
        Err(SamlError::format(message))
    }
}
