//! Canonical XML 1.0 and Exclusive XML Canonicalization 1.0.
//!
//! Both operate on an element subtree (the signed element or `SignedInfo`),
//! given the namespaces it inherits from the rest of the document. An
//! excluded element, the enveloped `ds:Signature`, can be left out of the
//! output.

use std::collections::BTreeSet;

use super::{Element, NamespaceScope, Node};

/// Canonicalization method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C14nMethod {
    /// `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
    Inclusive,
    /// `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
    InclusiveWithComments,
    /// `http://www.w3.org/2001/10/xml-exc-c14n#`
    Exclusive,
    /// `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
    ExclusiveWithComments,
}

impl C14nMethod {
    /// Algorithm URI.
    #[must_use]
    pub const fn uri(self) -> &'static str {
        match self {
            Self::Inclusive => "http://www.w3.org/TR/2001/REC-xml-c14n-20010315",
            Self::InclusiveWithComments => {
                "http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments"
            }
            Self::Exclusive => "http://www.w3.org/2001/10/xml-exc-c14n#",
            Self::ExclusiveWithComments => "http://www.w3.org/2001/10/xml-exc-c14n#WithComments",
        }
    }

    /// Looks up a method by URI.
    #[must_use]
    pub fn from_uri(uri: &str) -> Option<Self> {
        [
            Self::Inclusive,
            Self::InclusiveWithComments,
            Self::Exclusive,
            Self::ExclusiveWithComments,
        ]
        .into_iter()
        .find(|m| m.uri() == uri)
    }

    const fn is_exclusive(self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }

    const fn with_comments(self) -> bool {
        matches!(self, Self::InclusiveWithComments | Self::ExclusiveWithComments)
    }
}

/// Canonicalizes `element`.
///
/// `inherited` holds the namespaces in scope from its ancestors.
/// `inclusive_prefixes` is the exclusive method's `InclusiveNamespaces
/// PrefixList` (`#default` names the default namespace) and is ignored by the
/// inclusive methods.
#[must_use]
pub fn canonicalize(
    element: &Element,
    inherited: &NamespaceScope,
    method: C14nMethod,
    inclusive_prefixes: &[String],
    excluded: Option<&Element>,
) -> String {
    let canonicalizer = Canonicalizer {
        method,
        inclusive_prefixes: inclusive_prefixes
            .iter()
            .map(|p| if p == "#default" { String::new() } else { p.clone() })
            .collect(),
        excluded,
    };
    let mut out = String::new();
    canonicalizer.write_element(&mut out, element, inherited, &NamespaceScope::new());
    out
}

struct Canonicalizer<'a> {
    method: C14nMethod,
    inclusive_prefixes: BTreeSet<String>,
    excluded: Option<&'a Element>,
}

impl Canonicalizer<'_> {
    fn write_element(
        &self,
        out: &mut String,
        el: &Element,
        inherited: &NamespaceScope,
        rendered: &NamespaceScope,
    ) {
        let scope = el.scope(inherited);

        let candidates: BTreeSet<String> = if self.method.is_exclusive() {
            let mut used = BTreeSet::new();
            used.insert(el.prefix.clone().unwrap_or_default());
            for attr in &el.attributes {
                if let Some(prefix) = &attr.prefix {
                    used.insert(prefix.clone());
                }
            }
            for prefix in &self.inclusive_prefixes {
                if scope.contains_key(prefix) {
                    used.insert(prefix.clone());
                }
            }
            used
        } else {
            let mut all: BTreeSet<String> = scope.keys().cloned().collect();
            // xmlns="" is only output when it undoes a rendered default
            all.insert(String::new());
            all
        };

        let mut declarations = Vec::new();
        for prefix in candidates {
            if prefix == "xml" {
                continue;
            }
            let uri = scope.get(&prefix).map_or("", String::as_str);
            let previous = rendered.get(&prefix).map_or("", String::as_str);
            if uri == previous {
                continue;
            }
            if !prefix.is_empty() && uri.is_empty() {
                continue;
            }
            declarations.push((prefix, uri.to_string()));
        }

        let mut attributes: Vec<_> = el.attributes.iter().collect();
        attributes.sort_by(|a, b| {
            let a_key = (a.namespace.as_deref().unwrap_or(""), a.name.as_str());
            let b_key = (b.namespace.as_deref().unwrap_or(""), b.name.as_str());
            a_key.cmp(&b_key)
        });

        let qname = el.qualified_name();
        out.push('<');
        out.push_str(&qname);
        for (prefix, uri) in &declarations {
            if prefix.is_empty() {
                out.push_str(" xmlns=\"");
            } else {
                out.push_str(" xmlns:");
                out.push_str(prefix);
                out.push_str("=\"");
            }
            super::writer::escape_attribute(out, uri);
            out.push('"');
        }
        for attr in attributes {
            out.push(' ');
            out.push_str(&attr.qualified_name());
            out.push_str("=\"");
            super::writer::escape_attribute(out, &attr.value);
            out.push('"');
        }
        out.push('>');

        let mut now_rendered = rendered.clone();
        for (prefix, uri) in declarations {
            now_rendered.insert(prefix, uri);
        }

        for node in &el.children {
            match node {
                Node::Element(child) => {
                    if self.excluded.is_some_and(|ex| std::ptr::eq(ex, child)) {
                        continue;
                    }
                    self.write_element(out, child, &scope, &now_rendered);
                }
                Node::Text(text) => super::writer::escape_text(out, text),
                Node::Comment(comment) => {
                    if self.method.with_comments() {
                        out.push_str("<!--");
                        out.push_str(comment);
                        out.push_str("-->");
                    }
                }
            }
        }

        out.push_str("</");
        out.push_str(&qname);
        out.push('>');
    }
}
