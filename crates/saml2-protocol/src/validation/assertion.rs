//! Assertion, conditions and validity window rules.

use chrono::{DateTime, TimeDelta, Utc};

use super::name_id::NameIdValidator;
use super::statement::StatementValidator;
use super::subject::SubjectValidator;
use super::{ensure, has_content, is_absolute_uri};
use crate::error::{SamlError, SamlResult};
use crate::types::{Assertion, Condition, Conditions, Statement, SAML_VERSION};

const ID_MIN_LENGTH: usize = 16;

/// Top-level assertion validator.
///
/// Checks the assertion's own attributes, its subject, its conditions and
/// each statement. Validity windows are checked separately by
/// [`AssertionValidator::validate_time_restrictions`].
#[derive(Debug, Clone, Default)]
pub struct AssertionValidator {
    allowed_audiences: Vec<String>,
    quirks_mode: bool,
}

impl AssertionValidator {
    /// Creates a validator accepting the given audiences.
    ///
    /// Quirks mode tolerates short assertion IDs and short transient
    /// NameIDs.
    #[must_use]
    pub fn new<I, S>(allowed_audiences: I, quirks_mode: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed_audiences: allowed_audiences.into_iter().map(Into::into).collect(),
            quirks_mode,
        }
    }

    /// Validates the structure and content of an assertion.
    pub fn validate_assertion(&self, assertion: &Assertion) -> SamlResult<()> {
        let name_ids = NameIdValidator::new(self.quirks_mode);

        ensure(
            assertion.version.as_deref() == Some(SAML_VERSION),
            "Assertion element must have the Version attribute set to \"2.0\"",
        )?;

        let id = assertion.id.as_deref().unwrap_or_default();
        ensure(has_content(id), "Assertion element must have the ID attribute set.")?;
        ensure(
            self.quirks_mode || id.chars().count() >= ID_MIN_LENGTH,
            "Assertion element must have an ID attribute with at least 16 characters (the equivalent of 128 bits)",
        )?;

        ensure(
            assertion.issue_instant.is_some(),
            "Assertion element must have the IssueInstant attribute set.",
        )?;

        let Some(issuer) = &assertion.issuer else {
            return ensure(false, "Assertion element must have an issuer element.");
        };
        ensure(
            has_content(&issuer.value),
            "Issuer element of Assertion must contain at least one non-whitespace character",
        )?;
        name_ids.validate(issuer)?;

        self.validate_subject(assertion, name_ids)?;

        if let Some(conditions) = &assertion.conditions {
            self.validate_conditions(conditions)?;
        }

        let statements = StatementValidator;
        assertion
            .statements
            .iter()
            .try_for_each(|statement| statements.validate(statement))
    }

    fn validate_subject(&self, assertion: &Assertion, name_ids: NameIdValidator) -> SamlResult<()> {
        match &assertion.subject {
            Some(subject) => SubjectValidator::new(name_ids).validate(subject),
            None if assertion.statements.is_empty() => {
                ensure(false, "Assertion with no Statements must have a subject.")
            }
            None => {
                let needs_subject = assertion.statements.iter().any(|statement| {
                    matches!(
                        statement,
                        Statement::Authn(_) | Statement::AuthzDecision(_) | Statement::Attribute(_)
                    )
                });
                ensure(
                    !needs_subject,
                    "AuthnStatement, AuthzDecisionStatement and AttributeStatement require a subject.",
                )
            }
        }
    }

    fn validate_conditions(&self, conditions: &Conditions) -> SamlResult<()> {
        if let (Some(not_before), Some(not_on_or_after)) =
            (conditions.not_before, conditions.not_on_or_after)
        {
            ensure(
                not_before < not_on_or_after,
                "NotBefore of Conditions MUST be earlier than NotOnOrAfter",
            )?;
        }

        let mut one_time_use = false;
        let mut proxy_restriction = false;
        for condition in &conditions.items {
            match condition {
                Condition::AudienceRestriction(audiences) => {
                    self.validate_audience_restriction(audiences)?;
                }
                Condition::OneTimeUse => {
                    ensure(
                        !one_time_use,
                        "Assertion contained more than one condition of type OneTimeUse",
                    )?;
                    one_time_use = true;
                }
                Condition::ProxyRestriction { count, audiences } => {
                    ensure(
                        !proxy_restriction,
                        "Assertion contained more than one condition of type ProxyRestriction",
                    )?;
                    proxy_restriction = true;
                    if let Some(count) = count {
                        ensure(
                            count.trim().parse::<u32>().is_ok(),
                            "Count attribute of ProxyRestriction MUST BE a non-negative integer",
                        )?;
                    }
                    for audience in audiences {
                        ensure(
                            is_absolute_uri(audience),
                            "ProxyRestriction Audience MUST BE a wellformed uri",
                        )?;
                    }
                }
                Condition::Unknown(type_name) => {
                    return Err(SamlError::format(format!(
                        "Assertion contains an unsupported Condition: {type_name}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every restriction must name at least one allowed audience.
    fn validate_audience_restriction(&self, audiences: &[String]) -> SamlResult<()> {
        for audience in audiences {
            ensure(
                is_absolute_uri(audience),
                "Audience element has value which is not a wellformed absolute uri",
            )?;
        }
        ensure(
            !self.allowed_audiences.is_empty(),
            "The service is not configured to meet any audience restrictions",
        )?;
        let matched = audiences
            .iter()
            .any(|audience| self.allowed_audiences.iter().any(|allowed| allowed == audience));
        if !matched {
            tracing::warn!(?audiences, "assertion audience not allowed");
        }
        ensure(
            matched,
            "The service is not configured to meet the given audience restrictions",
        )
    }

    /// Checks the validity windows of an assertion at `now`.
    pub fn validate_time_restrictions(
        &self,
        assertion: &Assertion,
        clock_skew: TimeDelta,
        now: DateTime<Utc>,
    ) -> SamlResult<()> {
        validate_time_restrictions(assertion, clock_skew, now)
    }
}

/// Checks the validity windows of an assertion at `now`.
///
/// The absolute value of `clock_skew` widens the Conditions and
/// SubjectConfirmationData windows on both ends. An elapsed
/// `SessionNotOnOrAfter` fails regardless of skew.
pub fn validate_time_restrictions(
    assertion: &Assertion,
    clock_skew: TimeDelta,
    now: DateTime<Utc>,
) -> SamlResult<()> {
    let skew = clock_skew.abs();

    if let Some(conditions) = &assertion.conditions {
        if let Some(not_before) = conditions.not_before {
            ensure(
                now + skew >= not_before,
                "Conditions.NotBefore must not be in the future",
            )?;
        }
        if let Some(not_on_or_after) = conditions.not_on_or_after {
            ensure(
                now - skew < not_on_or_after,
                "Conditions.NotOnOrAfter must not be in the past",
            )?;
        }
    }

    for statement in assertion.authn_statements() {
        if let Some(session_end) = statement.session_not_on_or_after {
            ensure(
                now < session_end,
                "AuthnStatement attribute SessionNotOnOrAfter MUST be in the future",
            )?;
        }
    }

    let confirmation_data = assertion
        .subject
        .iter()
        .flat_map(|subject| subject.confirmations.iter())
        .filter_map(|confirmation| confirmation.data.as_ref());
    for data in confirmation_data {
        if let Some(not_before) = data.not_before {
            ensure(
                now + skew >= not_before,
                "SubjectConfirmationData.NotBefore must not be in the future",
            )?;
        }
        if let Some(not_on_or_after) = data.not_on_or_after {
            ensure(
                now - skew < not_on_or_after,
                "SubjectConfirmationData.NotOnOrAfter must not be in the past",
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        AuthnContext, AuthnContextItem, AuthnStatement, NameId, NameIdFormat, Subject,
        SubjectConfirmation, SubjectConfirmationData, SubjectIdentifier,
    };
    use crate::xml::XmlDocument;

    const SP: &str = "https://sp.example.com";

    const ASSERTION: &str = r#"<saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="_7f3b0a6c2d9e4f18a5b1c0d2e3f40516" Version="2.0" IssueInstant="2024-05-01T10:00:00Z">
  <saml:Issuer Format="urn:oasis:names:tc:SAML:2.0:nameid-format:entity">https://idp.example.com</saml:Issuer>
  <saml:Subject>
    <saml:NameID Format="urn:oasis:names:tc:SAML:2.0:nameid-format:transient">_0123456789abcdef0123</saml:NameID>
    <saml:SubjectConfirmation Method="urn:oasis:names:tc:SAML:2.0:cm:bearer">
      <saml:SubjectConfirmationData NotOnOrAfter="2024-05-01T10:05:00Z" Recipient="https://sp.example.com/acs"/>
    </saml:SubjectConfirmation>
  </saml:Subject>
  <saml:Conditions NotBefore="2024-05-01T09:59:00Z" NotOnOrAfter="2024-05-01T10:05:00Z">
    <saml:AudienceRestriction><saml:Audience>https://sp.example.com</saml:Audience></saml:AudienceRestriction>
    <saml:OneTimeUse/>
  </saml:Conditions>
  <saml:AuthnStatement AuthnInstant="2024-05-01T10:00:00Z" SessionIndex="s-42" SessionNotOnOrAfter="2024-05-01T18:00:00Z">
    <saml:AuthnContext>
      <saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef>
    </saml:AuthnContext>
  </saml:AuthnStatement>
</saml:Assertion>"#;

    fn parse() -> Assertion {
        let doc = XmlDocument::parse(ASSERTION).unwrap();
        Assertion::from_element(doc.root()).unwrap()
    }

    fn at(instant: &str) -> DateTime<Utc> {
        crate::types::parse_instant(instant).unwrap()
    }

    fn validator() -> AssertionValidator {
        AssertionValidator::new([SP], false)
    }

    fn error(result: SamlResult<()>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn well_formed_assertion_passes() {
        let assertion = parse();
        validator().validate_assertion(&assertion).unwrap();
        validator()
            .validate_time_restrictions(&assertion, TimeDelta::seconds(180), at("2024-05-01T10:01:00Z"))
            .unwrap();
    }

    #[test]
    fn attribute_requirements() {
        let mut assertion = parse();
        assertion.version = Some("1.1".into());
        assert!(error(validator().validate_assertion(&assertion)).contains("Version"));

        let mut assertion = parse();
        assertion.id = None;
        assert_eq!(
            error(validator().validate_assertion(&assertion)),
            "Assertion element must have the ID attribute set."
        );

        let mut assertion = parse();
        assertion.id = Some("_short".into());
        assert!(error(validator().validate_assertion(&assertion)).contains("at least 16 characters"));
        AssertionValidator::new([SP], true)
            .validate_assertion(&assertion)
            .unwrap();

        let mut assertion = parse();
        assertion.issue_instant = None;
        assert!(error(validator().validate_assertion(&assertion)).contains("IssueInstant"));

        let mut assertion = parse();
        assertion.issuer = None;
        assert_eq!(
            error(validator().validate_assertion(&assertion)),
            "Assertion element must have an issuer element."
        );

        let mut assertion = parse();
        assertion.issuer = Some(NameId::entity("https://idp.example.com").with_name_qualifier("q"));
        assert!(error(validator().validate_assertion(&assertion)).contains("NameQualifier"));
    }

    #[test]
    fn subject_presence() {
        let mut assertion = parse();
        assertion.subject = None;
        assert!(error(validator().validate_assertion(&assertion)).contains("require a subject"));

        assertion.statements.clear();
        assert_eq!(
            error(validator().validate_assertion(&assertion)),
            "Assertion with no Statements must have a subject."
        );
    }

    #[test]
    fn audience_matching() {
        let assertion = parse();
        assert_eq!(
            error(AssertionValidator::new(Vec::<String>::new(), false).validate_assertion(&assertion)),
            "The service is not configured to meet any audience restrictions"
        );
        assert_eq!(
            error(AssertionValidator::new(["https://other.example.com"], false).validate_assertion(&assertion)),
            "The service is not configured to meet the given audience restrictions"
        );
        AssertionValidator::new(["https://other.example.com", SP], false)
            .validate_assertion(&assertion)
            .unwrap();
    }

    #[test]
    fn every_audience_restriction_must_match() {
        let mut assertion = parse();
        let conditions = assertion.conditions.as_mut().unwrap();
        conditions.items.push(Condition::AudienceRestriction(vec![
            "https://other.example.com".into(),
            SP.into(),
        ]));
        validator().validate_assertion(&assertion).unwrap();

        let conditions = assertion.conditions.as_mut().unwrap();
        conditions
            .items
            .push(Condition::AudienceRestriction(vec!["https://other.example.com".into()]));
        assert!(validator().validate_assertion(&assertion).is_err());
    }

    #[test]
    fn condition_cardinality() {
        let mut assertion = parse();
        assertion.conditions.as_mut().unwrap().items.push(Condition::OneTimeUse);
        assert!(error(validator().validate_assertion(&assertion)).contains("OneTimeUse"));

        let proxy = |count: &str| Condition::ProxyRestriction {
            count: Some(count.to_string()),
            audiences: Vec::new(),
        };
        let mut assertion = parse();
        assertion.conditions.as_mut().unwrap().items.push(proxy("-1"));
        assert_eq!(
            error(validator().validate_assertion(&assertion)),
            "Count attribute of ProxyRestriction MUST BE a non-negative integer"
        );

        let mut assertion = parse();
        let items = &mut assertion.conditions.as_mut().unwrap().items;
        items.push(proxy("0"));
        items.push(proxy("1"));
        assert!(error(validator().validate_assertion(&assertion)).contains("ProxyRestriction"));

        let mut assertion = parse();
        let conditions = assertion.conditions.as_mut().unwrap();
        conditions.not_before = conditions.not_on_or_after;
        assert!(validator().validate_assertion(&assertion).is_err());
    }

    #[test]
    fn statements_are_validated() {
        let mut assertion = parse();
        assertion.statements.push(Statement::Authn(AuthnStatement {
            authn_instant: Some(Utc::now()),
            authn_context: Some(AuthnContext {
                items: vec![AuthnContextItem::Decl],
                authenticating_authorities: Vec::new(),
            }),
            ..AuthnStatement::default()
        }));
        assert!(validator().validate_assertion(&assertion).is_err());
    }

    #[test]
    fn conditions_window_uses_skew() {
        let assertion = parse();
        let skew = TimeDelta::seconds(60);

        // NotBefore is 09:59:00
        validate_time_restrictions(&assertion, skew, at("2024-05-01T09:58:30Z")).unwrap();
        assert_eq!(
            error(validate_time_restrictions(&assertion, skew, at("2024-05-01T09:57:30Z"))),
            "Conditions.NotBefore must not be in the future"
        );

        // NotOnOrAfter is 10:05:00
        validate_time_restrictions(&assertion, skew, at("2024-05-01T10:05:30Z")).unwrap();
        assert_eq!(
            error(validate_time_restrictions(&assertion, skew, at("2024-05-01T10:06:00Z"))),
            "Conditions.NotOnOrAfter must not be in the past"
        );
    }

    #[test]
    fn negative_skew_is_treated_as_absolute() {
        let assertion = parse();
        validate_time_restrictions(&assertion, TimeDelta::seconds(-60), at("2024-05-01T10:05:30Z"))
            .unwrap();
    }

    #[test]
    fn confirmation_data_window() {
        let mut assertion = parse();
        assertion.conditions = None;
        let subject = assertion.subject.as_mut().unwrap();
        subject.confirmations = vec![SubjectConfirmation {
            method: Some("urn:oasis:names:tc:SAML:2.0:cm:bearer".into()),
            identifier: None,
            data: Some(SubjectConfirmationData {
                not_before: Some(at("2024-05-01T10:00:00Z")),
                not_on_or_after: Some(at("2024-05-01T10:05:00Z")),
                ..SubjectConfirmationData::default()
            }),
        }];

        let none = TimeDelta::zero();
        validate_time_restrictions(&assertion, none, at("2024-05-01T10:01:00Z")).unwrap();
        assert!(error(validate_time_restrictions(&assertion, none, at("2024-05-01T09:59:00Z")))
            .starts_with("SubjectConfirmationData.NotBefore"));
        assert!(error(validate_time_restrictions(&assertion, none, at("2024-05-01T10:05:00Z")))
            .starts_with("SubjectConfirmationData.NotOnOrAfter"));
    }

    #[test]
    fn elapsed_session_is_rejected() {
        let mut assertion = parse();
        assertion.conditions = None;
        assertion.subject = Some(Subject {
            identifier: Some(SubjectIdentifier::NameId(
                NameId::new("abc").with_format(NameIdFormat::Persistent),
            )),
            confirmations: Vec::new(),
        });
        // SessionNotOnOrAfter is 18:00:00
        let skew = TimeDelta::minutes(10);
        validate_time_restrictions(&assertion, skew, at("2024-05-01T17:59:59Z")).unwrap();
        assert_eq!(
            error(validate_time_restrictions(&assertion, skew, at("2024-05-01T18:00:00Z"))),
            "AuthnStatement attribute SessionNotOnOrAfter MUST be in the future"
        );
    }
}
