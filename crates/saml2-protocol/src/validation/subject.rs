//! Subject, subject confirmation and key info rules.

use super::attribute::{validate_any_attributes, validate_encrypted_element};
use super::name_id::NameIdValidator;
use super::{ensure, has_content, is_absolute_uri};
use crate::error::SamlResult;
use crate::types::{
    confirmation_methods, KeyInfo, Subject, SubjectConfirmation, SubjectConfirmationData,
    SubjectIdentifier,
};

fn validate_identifier(identifier: &SubjectIdentifier, name_ids: NameIdValidator) -> SamlResult<()> {
    match identifier {
        SubjectIdentifier::NameId(name_id) => name_ids.validate(name_id),
        SubjectIdentifier::EncryptedId(encrypted) => validate_encrypted_element(encrypted),
        SubjectIdentifier::BaseId(_) => Ok(()),
    }
}

/// Validates a `saml:Subject`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectValidator {
    name_ids: NameIdValidator,
}

impl SubjectValidator {
    /// Creates a validator using the given NameID rules.
    #[must_use]
    pub const fn new(name_ids: NameIdValidator) -> Self {
        Self { name_ids }
    }

    /// Validates a subject and each of its confirmations.
    pub fn validate(&self, subject: &Subject) -> SamlResult<()> {
        ensure(
            subject.identifier.is_some() || !subject.confirmations.is_empty(),
            "Subject MUST contain either an identifier or a subject confirmation",
        )?;
        if let Some(identifier) = &subject.identifier {
            validate_identifier(identifier, self.name_ids)?;
        }
        let confirmations = SubjectConfirmationValidator::new(self.name_ids);
        for confirmation in &subject.confirmations {
            confirmations.validate(confirmation)?;
        }
        Ok(())
    }
}

/// Validates a `saml:SubjectConfirmation`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectConfirmationValidator {
    name_ids: NameIdValidator,
}

impl SubjectConfirmationValidator {
    /// Creates a validator using the given NameID rules.
    #[must_use]
    pub const fn new(name_ids: NameIdValidator) -> Self {
        Self { name_ids }
    }

    /// Validates one confirmation.
    ///
    /// Holder-of-key confirmations must carry key evidence in their
    /// confirmation data.
    pub fn validate(&self, confirmation: &SubjectConfirmation) -> SamlResult<()> {
        let method = confirmation.method.as_deref().unwrap_or_default();
        ensure(
            has_content(method),
            "Method attribute of SubjectConfirmation MUST contain at least one non-whitespace character",
        )?;
        ensure(
            is_absolute_uri(method),
            "SubjectConfirmation element has Method attribute which is not a wellformed absolute uri.",
        )?;

        if let Some(identifier) = &confirmation.identifier {
            validate_identifier(identifier, self.name_ids)?;
        }

        if method == confirmation_methods::HOLDER_OF_KEY {
            let Some(data) = &confirmation.data else {
                return ensure(
                    false,
                    "SubjectConfirmationData element MUST be present when the SubjectConfirmation Method is holder-of-key",
                );
            };
            ensure(
                !data.key_infos.is_empty(),
                "SubjectConfirmationData element MUST contain at least one ds:KeyInfo element when the SubjectConfirmation Method is holder-of-key",
            )?;
        }

        match &confirmation.data {
            Some(data) => validate_subject_confirmation_data(data),
            None => Ok(()),
        }
    }
}

/// Validates a `saml:SubjectConfirmationData`.
pub fn validate_subject_confirmation_data(data: &SubjectConfirmationData) -> SamlResult<()> {
    if let Some(recipient) = &data.recipient {
        ensure(
            is_absolute_uri(recipient),
            "Recipient of SubjectConfirmationData must be a wellformed absolute URI.",
        )?;
    }
    if let (Some(not_before), Some(not_on_or_after)) = (data.not_before, data.not_on_or_after) {
        ensure(
            not_before < not_on_or_after,
            "NotBefore of SubjectConfirmationData MUST be earlier than NotOnOrAfter",
        )?;
    }
    validate_any_attributes(&data.any_attributes)?;

    if data.is_key_info_type {
        ensure(
            !data.key_infos.is_empty(),
            "SubjectConfirmationData of type KeyInfoConfirmationDataType MUST contain at least one ds:KeyInfo element",
        )?;
    }
    data.key_infos.iter().try_for_each(validate_key_info)
}

/// Validates a `ds:KeyInfo` used as key evidence.
pub fn validate_key_info(key_info: &KeyInfo) -> SamlResult<()> {
    ensure(
        !key_info.is_empty(),
        "ds:KeyInfo element MUST contain at least one child element",
    )
}
