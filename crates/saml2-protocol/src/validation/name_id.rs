//! NameID format rules.

use std::sync::LazyLock;

use regex::Regex;

use super::{ensure, has_content, is_absolute_uri};
use crate::error::SamlResult;
use crate::types::{NameId, NameIdFormat};

/// RFC 2822 `addr-spec` with a dot-atom local part.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@(?:[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?\.)*[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?$",
    )
    .unwrap()
});

const ENTITY_MAX_LENGTH: usize = 1024;
const IDENTIFIER_MAX_LENGTH: usize = 256;
const TRANSIENT_MIN_LENGTH: usize = 16;
const KERBEROS_MIN_LENGTH: usize = 3;

/// Validates `NameIDType` elements against their declared format.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameIdValidator {
    quirks_mode: bool,
}

impl NameIdValidator {
    /// Creates a validator. Quirks mode drops the transient minimum length.
    #[must_use]
    pub const fn new(quirks_mode: bool) -> Self {
        Self { quirks_mode }
    }

    /// Validates a name identifier.
    pub fn validate(&self, name_id: &NameId) -> SamlResult<()> {
        let Some(format) = name_id.format.as_deref() else {
            return Ok(());
        };
        ensure(
            is_absolute_uri(format),
            "NameID element has Format attribute which is not a wellformed absolute uri.",
        )?;

        let value = name_id.value.as_str();
        let length = value.chars().count();
        match NameIdFormat::from_uri(format) {
            Some(NameIdFormat::Email) => {
                ensure(
                    has_content(value),
                    "NameID with Email Format attribute MUST contain a Value that contains more than whitespace characters",
                )?;
                ensure(
                    EMAIL_REGEX.is_match(value.trim()),
                    "Value of NameID is not a valid email address according to the IETF RFC 2822 specification",
                )
            }
            Some(NameIdFormat::X509SubjectName) => ensure(
                has_content(value),
                "NameID with X509SubjectName Format attribute MUST contain a Value that contains more than whitespace characters",
            ),
            Some(NameIdFormat::WindowsDomainQualifiedName) => ensure(
                has_content(value),
                "NameID with Windows Format attribute MUST contain a Value that contains more than whitespace characters",
            ),
            Some(NameIdFormat::Kerberos) => {
                ensure(
                    has_content(value),
                    "NameID with Kerberos Format attribute MUST contain a Value that contains more than whitespace characters",
                )?;
                ensure(
                    length >= KERBEROS_MIN_LENGTH,
                    "NameID with Kerberos Format attribute MUST contain a Value with at least 3 characters",
                )?;
                ensure(
                    value.contains('@'),
                    "NameID with Kerberos Format attribute MUST contain a Value that contains a '@'",
                )
            }
            Some(NameIdFormat::Entity) => {
                ensure(
                    has_content(value),
                    "NameID with Entity Format attribute MUST contain a Value that contains more than whitespace characters",
                )?;
                ensure(
                    length <= ENTITY_MAX_LENGTH,
                    "NameID with Entity Format attribute MUST have a Value that contains no more than 1024 characters",
                )?;
                ensure(
                    name_id.name_qualifier.is_none(),
                    "NameID with Entity Format attribute MUST NOT set the NameQualifier attribute",
                )?;
                ensure(
                    name_id.sp_name_qualifier.is_none(),
                    "NameID with Entity Format attribute MUST NOT set the SPNameQualifier attribute",
                )?;
                ensure(
                    name_id.sp_provided_id.is_none(),
                    "NameID with Entity Format attribute MUST NOT set the SPProvidedID attribute",
                )
            }
            Some(NameIdFormat::Persistent) => {
                ensure(
                    has_content(value),
                    "NameID with Persistent Format attribute MUST contain a Value that contains more than whitespace characters",
                )?;
                ensure(
                    length <= IDENTIFIER_MAX_LENGTH,
                    "NameID with Persistent Format attribute MUST have a Value that contains no more than 256 characters",
                )
            }
            Some(NameIdFormat::Transient) => {
                ensure(
                    has_content(value),
                    "NameID with Transient Format attribute MUST contain a Value that contains more than whitespace characters",
                )?;
                ensure(
                    length <= IDENTIFIER_MAX_LENGTH,
                    "NameID with Transient Format attribute MUST have a Value that contains no more than 256 characters",
                )?;
                ensure(
                    self.quirks_mode || length >= TRANSIENT_MIN_LENGTH,
                    "NameID with Transient Format attribute MUST have a Value with at least 16 characters (the equivalent of 128 bits)",
                )
            }
            Some(NameIdFormat::Unspecified | NameIdFormat::Encrypted) | None => Ok(()),
        }
    }
}
