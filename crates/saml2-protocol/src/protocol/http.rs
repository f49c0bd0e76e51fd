//! HTTP request abstraction.
//!
//! Hosts adapt their framework's request to [`HttpRequest`], or build an
//! owned [`InboundRequest`].

use std::collections::HashMap;

use url::Url;

use crate::error::{SamlError, SamlResult};

/// The parts of an inbound HTTP request the protocol flows read.
pub trait HttpRequest {
    /// Request method in upper case.
    fn method(&self) -> &str;

    /// Absolute request URL including the query string.
    fn url(&self) -> &str;

    /// A decoded query parameter.
    fn query_param(&self, name: &str) -> Option<String>;

    /// A decoded form parameter of a POST body.
    fn form_param(&self, name: &str) -> Option<String>;

    /// A cookie value as sent.
    fn cookie(&self, name: &str) -> Option<String>;

    /// Raw request body.
    fn body(&self) -> &[u8];

    /// `Content-Type` header.
    fn content_type(&self) -> Option<&str>;

    /// Returns true for a SOAP call.
    fn is_soap(&self) -> bool {
        self.method() == "POST"
            && self
                .content_type()
                .is_some_and(|ct| ct.starts_with("text/xml") || ct.starts_with("application/soap+xml"))
    }

    /// A query or form parameter, query first.
    fn param(&self, name: &str) -> Option<String> {
        self.query_param(name).or_else(|| self.form_param(name))
    }
}

/// An owned request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    method: String,
    url: String,
    query: HashMap<String, String>,
    form: HashMap<String, String>,
    cookies: HashMap<String, String>,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl InboundRequest {
    fn with_url(method: &str, url: &str) -> SamlResult<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| SamlError::InvalidArgument(format!("invalid request URL {url}: {e}")))?;
        Ok(Self {
            method: method.to_string(),
            url: url.to_string(),
            query: parsed.query_pairs().into_owned().collect(),
            ..Self::default()
        })
    }

    /// A GET request.
    pub fn get(url: &str) -> SamlResult<Self> {
        Self::with_url("GET", url)
    }

    /// A form POST.
    pub fn post_form<I, K, V>(url: &str, params: I) -> SamlResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::with_url("POST", url)?;
        request.content_type = Some("application/x-www-form-urlencoded".to_string());
        request.form = params
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Ok(request)
    }

    /// A SOAP POST.
    pub fn soap(url: &str, body: impl Into<Vec<u8>>) -> SamlResult<Self> {
        let mut request = Self::with_url("POST", url)?;
        request.content_type = Some(crate::bindings::SOAP_CONTENT_TYPE.to_string());
        request.body = body.into();
        Ok(request)
    }

    /// Adds a cookie.
    #[must_use]
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

impl HttpRequest for InboundRequest {
    fn method(&self) -> &str {
        &self.method
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn form_param(&self, name: &str) -> Option<String> {
        self.form.get(name).cloned()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.get(name).cloned()
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}
