//! SAML Status types.
//!
//! Status information returned in SAML protocol responses.

use serde::{Deserialize, Serialize};

use super::{samlp, status_codes, sub_status_codes, SAMLP_NS};
use crate::error::{SamlError, SamlResult};
use crate::xml::Element;

/// SAML protocol status.
///
/// Contains the status code and optional message for a SAML response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// The status code.
    pub status_code: StatusCode,

    /// Optional status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl Status {
    /// Creates a success status.
    #[must_use]
    pub fn success() -> Self {
        Self {
            status_code: StatusCode::success(),
            status_message: None,
        }
    }

    /// Creates a requester error status.
    #[must_use]
    pub fn requester_error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::requester(),
            status_message: Some(message.into()),
        }
    }

    /// Creates a responder error status.
    #[must_use]
    pub fn responder_error(message: impl Into<String>) -> Self {
        Self {
            status_code: StatusCode::responder(),
            status_message: Some(message.into()),
        }
    }

    /// Returns true if this status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code.is_success()
    }

    /// Returns true if the identity provider could not authenticate the
    /// principal passively.
    #[must_use]
    pub fn is_no_passive(&self) -> bool {
        self.status_code.sub_status_value() == Some(sub_status_codes::NO_PASSIVE)
    }

    /// Sets the status message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Serializes as a `samlp:Status`.
    #[must_use]
    pub fn to_element(&self) -> Element {
        samlp("Status")
            .child(self.status_code.to_element())
            .child_opt(
                self.status_message
                    .as_deref()
                    .map(|message| samlp("StatusMessage").text(message)),
            )
    }

    /// Reads a `samlp:Status`.
    pub fn from_element(el: &Element) -> SamlResult<Self> {
        let code = el
            .find_child(SAMLP_NS, "StatusCode")
            .ok_or_else(|| SamlError::format("Status element must contain a StatusCode element"))?;
        Ok(Self {
            status_code: StatusCode::from_element(code)?,
            status_message: el.child_text(SAMLP_NS, "StatusMessage"),
        })
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::success()
    }
}

/// SAML status code.
///
/// Status codes can be nested, with a top-level code and optional sub-code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCode {
    /// The status code URI value.
    pub value: String,

    /// Optional nested status code providing more detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<Box<StatusCode>>,
}

impl StatusCode {
    /// Creates a new status code with the given value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            status_code: None,
        }
    }

    /// Creates a success status code.
    #[must_use]
    pub fn success() -> Self {
        Self::new(status_codes::SUCCESS)
    }

    /// Creates a requester error status code.
    #[must_use]
    pub fn requester() -> Self {
        Self::new(status_codes::REQUESTER)
    }

    /// Creates a responder error status code.
    #[must_use]
    pub fn responder() -> Self {
        Self::new(status_codes::RESPONDER)
    }

    /// Adds a sub-status code.
    #[must_use]
    pub fn with_sub_status(mut self, sub: StatusCode) -> Self {
        self.status_code = Some(Box::new(sub));
        self
    }

    /// Returns true if this is a success status code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.value == status_codes::SUCCESS
    }

    /// Returns the sub-status code value if present.
    #[must_use]
    pub fn sub_status_value(&self) -> Option<&str> {
        self.status_code.as_ref().map(|s| s.value.as_str())
    }

    fn to_element(&self) -> Element {
        samlp("StatusCode")
            .attr("Value", self.value.as_str())
            .child_opt(self.status_code.as_ref().map(|sub| sub.to_element()))
    }

    fn from_element(el: &Element) -> SamlResult<Self> {
        let value = el
            .attribute("Value")
            .ok_or_else(|| SamlError::format("StatusCode element must have a Value attribute"))?;
        let status_code = el
            .find_child(SAMLP_NS, "StatusCode")
            .map(Self::from_element)
            .transpose()?
            .map(Box::new);
        Ok(Self {
            value: value.to_string(),
            status_code,
        })
    }
}
