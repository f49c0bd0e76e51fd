//! Statement rules.

use super::attribute::{validate_attribute, validate_encrypted_element};
use super::{ensure, has_content, is_absolute_uri};
use crate::error::{SamlError, SamlResult};
use crate::types::{
    AttributeStatement, AttributeStatementItem, AuthnContext, AuthnContextItem, AuthnStatement,
    AuthzDecisionStatement, Statement,
};

const DECISIONS: [&str; 3] = ["Permit", "Deny", "Indeterminate"];

/// Validates the statements of an assertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatementValidator;

impl StatementValidator {
    /// Validates one statement.
    pub fn validate(&self, statement: &Statement) -> SamlResult<()> {
        match statement {
            Statement::Authn(authn) => validate_authn_statement(authn),
            Statement::AuthzDecision(authz) => validate_authz_decision_statement(authz),
            Statement::Attribute(attributes) => validate_attribute_statement(attributes),
            Statement::Unknown(type_name) => Err(SamlError::format(format!(
                "Unsupported Statement type: {type_name}"
            ))),
        }
    }
}

fn validate_authn_statement(statement: &AuthnStatement) -> SamlResult<()> {
    ensure(
        statement.authn_instant.is_some(),
        "AuthnStatement MUST have an AuthnInstant attribute",
    )?;
    if let Some(session_index) = &statement.session_index {
        ensure(
            has_content(session_index),
            "SessionIndex attribute of AuthnStatement must contain at least one non-whitespace character",
        )?;
    }
    if let Some(locality) = &statement.subject_locality {
        if let Some(address) = &locality.address {
            ensure(
                has_content(address),
                "Address attribute of SubjectLocality must contain at least one non-whitespace character",
            )?;
        }
        if let Some(dns_name) = &locality.dns_name {
            ensure(
                has_content(dns_name),
                "DNSName attribute of SubjectLocality must contain at least one non-whitespace character",
            )?;
        }
    }

    let Some(context) = &statement.authn_context else {
        return ensure(false, "AuthnStatement MUST have an AuthnContext element");
    };
    validate_authn_context(context)
}

fn validate_authn_context(context: &AuthnContext) -> SamlResult<()> {
    ensure(
        !context.items.is_empty(),
        "AuthnContext element MUST contain at least one AuthnContextClassRef, AuthnContextDecl or AuthnContextDeclRef element",
    )?;
    ensure(
        context.items.len() <= 2,
        "AuthnContext MUST NOT contain more than two elements.",
    )?;

    let mut decl_refs = 0;
    for (position, item) in context.items.iter().enumerate() {
        match item {
            AuthnContextItem::ClassRef(class_ref) => {
                ensure(position == 0, "AuthnContextClassRef must be in the first element")?;
                ensure(
                    is_absolute_uri(class_ref),
                    "AuthnContextClassRef has a value which is not a wellformed absolute uri",
                )?;
            }
            AuthnContextItem::DeclRef(decl_ref) => {
                decl_refs += 1;
                ensure(
                    decl_refs == 1,
                    "AuthnContext MUST NOT contain more than one AuthnContextDeclRef element",
                )?;
                ensure(
                    is_absolute_uri(decl_ref),
                    "AuthnContextDeclRef has a value which is not a wellformed absolute uri",
                )?;
            }
            AuthnContextItem::Decl => {
                return ensure(false, "AuthnContextDecl elements are not supported");
            }
        }
    }

    for authority in &context.authenticating_authorities {
        ensure(
            is_absolute_uri(authority),
            "AuthenticatingAuthority array contains a value which is not a wellformed absolute uri",
        )?;
    }
    Ok(())
}

fn validate_attribute_statement(statement: &AttributeStatement) -> SamlResult<()> {
    ensure(
        !statement.items.is_empty(),
        "AttributeStatement MUST contain at least one Attribute or EncryptedAttribute",
    )?;
    for item in &statement.items {
        match item {
            AttributeStatementItem::Attribute(attribute) => validate_attribute(attribute)?,
            AttributeStatementItem::EncryptedAttribute(encrypted) => {
                validate_encrypted_element(encrypted)?;
            }
        }
    }
    Ok(())
}

fn validate_authz_decision_statement(statement: &AuthzDecisionStatement) -> SamlResult<()> {
    // An empty Resource means "unspecified"
    let Some(resource) = &statement.resource else {
        return ensure(false, "Resource attribute of AuthzDecisionStatement is REQUIRED");
    };
    if !resource.is_empty() {
        ensure(
            is_absolute_uri(resource),
            "Resource attribute of AuthzDecisionStatement has a value which is not a wellformed absolute uri",
        )?;
    }

    let Some(decision) = &statement.decision else {
        return ensure(false, "Decision attribute of AuthzDecisionStatement is REQUIRED");
    };
    ensure(
        DECISIONS.contains(&decision.as_str()),
        "Decision attribute of AuthzDecisionStatement has an invalid value",
    )?;

    ensure(
        !statement.actions.is_empty(),
        "AuthzDecisionStatement MUST contain at least one Action element",
    )?;
    for action in &statement.actions {
        let Some(namespace) = action.namespace.as_deref().filter(|ns| has_content(ns)) else {
            return ensure(false, "Namespace attribute of Action element is REQUIRED");
        };
        ensure(
            is_absolute_uri(namespace),
            "Namespace attribute of Action element has a value which is not a wellformed absolute uri",
        )?;
    }
    Ok(())
}
