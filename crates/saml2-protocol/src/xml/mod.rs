//! Namespace-aware XML tree.
//!
//! SAML signatures are computed over canonical XML, so messages are kept as
//! a small DOM that remembers prefixes, namespace declarations and the exact
//! attribute values. The tree is produced by [`parse`], serialized with
//! [`Element::to_xml`] and canonicalized with [`canonicalize`].

mod c14n;
mod parser;
mod writer;

use std::collections::BTreeMap;

pub use c14n::{canonicalize, C14nMethod};
pub use parser::parse;

/// Namespace bindings in scope: prefix (`""` for the default namespace) to URI.
pub type NamespaceScope = BTreeMap<String, String>;

/// The namespace bound to the reserved `xml` prefix.
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    root: Element,
}

impl XmlDocument {
    /// Parses a document, rejecting DTDs.
    pub fn parse(xml: &str) -> crate::SamlResult<Self> {
        parse(xml).map(|root| Self { root })
    }

    /// Wraps an element as a document.
    #[must_use]
    pub fn from_root(root: Element) -> Self {
        Self { root }
    }

    /// The document element.
    #[must_use]
    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Mutable access to the document element.
    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    /// Consumes the document, returning its root.
    #[must_use]
    pub fn into_root(self) -> Element {
        self.root
    }

    /// Serializes the document without an XML declaration.
    #[must_use]
    pub fn to_xml(&self) -> String {
        self.root.to_xml()
    }

    /// Serializes the document with a UTF-8 XML declaration.
    #[must_use]
    pub fn to_xml_with_declaration(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>{}",
            self.root.to_xml()
        )
    }
}

/// A child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// Element child.
    Element(Element),
    /// Character data (CDATA sections are folded into text).
    Text(String),
    /// Comment.
    Comment(String),
}

/// An attribute with its resolved namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Namespace URI; unprefixed attributes have none.
    pub namespace: Option<String>,
    /// Value after entity expansion.
    pub value: String,
}

impl XmlAttribute {
    /// The attribute name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// An element with namespace information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Prefix as written, if any.
    pub prefix: Option<String>,
    /// Local name.
    pub name: String,
    /// Resolved namespace URI.
    pub namespace: Option<String>,
    /// `xmlns` declarations made on this element, in document order.
    pub namespace_declarations: Vec<(String, String)>,
    /// Attributes other than namespace declarations.
    pub attributes: Vec<XmlAttribute>,
    /// Child nodes.
    pub children: Vec<Node>,
}

impl Element {
    /// Creates an element from a possibly prefixed name and its namespace.
    ///
    /// The namespace is not declared; call [`declare`](Self::declare) on the
    /// element (or an ancestor) that introduces it.
    #[must_use]
    pub fn new(qualified_name: &str, namespace: &str) -> Self {
        let (prefix, name) = split_qname(qualified_name);
        Self {
            prefix,
            name,
            namespace: Some(namespace.to_string()),
            namespace_declarations: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Declares a namespace prefix on this element (`""` for the default).
    #[must_use]
    pub fn declare(mut self, prefix: &str, uri: &str) -> Self {
        self.namespace_declarations
            .retain(|(existing, _)| existing != prefix);
        self.namespace_declarations
            .push((prefix.to_string(), uri.to_string()));
        self
    }

    /// Adds an unqualified attribute.
    #[must_use]
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Adds an unqualified attribute when the value is present.
    #[must_use]
    pub fn attr_opt(self, name: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.attr(name, value),
            None => self,
        }
    }

    /// Adds a namespaced attribute such as `xsi:type`.
    #[must_use]
    pub fn attr_ns(mut self, qualified_name: &str, namespace: &str, value: impl Into<String>) -> Self {
        let (prefix, name) = split_qname(qualified_name);
        self.attributes.push(XmlAttribute {
            prefix,
            name,
            namespace: Some(namespace.to_string()),
            value: value.into(),
        });
        self
    }

    /// Appends a child element.
    #[must_use]
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    /// Appends a child element when present.
    #[must_use]
    pub fn child_opt(self, child: Option<Element>) -> Self {
        match child {
            Some(child) => self.child(child),
            None => self,
        }
    }

    /// Appends several child elements.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Element>) -> Self {
        self.children
            .extend(children.into_iter().map(Node::Element));
        self
    }

    /// Appends a text node.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    /// Sets or replaces an unqualified attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.namespace.is_none() && a.name == name)
        {
            existing.value = value;
            return;
        }
        self.attributes.push(XmlAttribute {
            prefix: None,
            name: name.to_string(),
            namespace: None,
            value,
        });
    }

    /// The element name as written.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Returns true if the element has the given namespace and local name.
    #[must_use]
    pub fn is(&self, namespace: &str, name: &str) -> bool {
        self.name == name && self.namespace.as_deref() == Some(namespace)
    }

    /// Value of an unqualified attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.is_none() && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Value of a namespaced attribute.
    #[must_use]
    pub fn attribute_ns(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.namespace.as_deref() == Some(namespace) && a.name == name)
            .map(|a| a.value.as_str())
    }

    /// The XML ID of this element (`ID`, `Id` or `AssertionID`).
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.attribute("ID")
            .or_else(|| self.attribute("Id"))
            .or_else(|| self.attribute("AssertionID"))
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    /// First child element with the given name.
    #[must_use]
    pub fn find_child(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.child_elements().find(|el| el.is(namespace, name))
    }

    /// All child elements with the given name.
    pub fn find_children<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |el| el.is(namespace, name))
    }

    /// Concatenated text of this element and its descendants.
    #[must_use]
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Text content of the first matching child, trimmed.
    #[must_use]
    pub fn child_text(&self, namespace: &str, name: &str) -> Option<String> {
        self.find_child(namespace, name)
            .map(|el| el.text_content().trim().to_string())
    }

    /// Namespaces in scope on this element, given those inherited from its
    /// ancestors.
    #[must_use]
    pub fn scope(&self, inherited: &NamespaceScope) -> NamespaceScope {
        let mut scope = inherited.clone();
        for (prefix, uri) in &self.namespace_declarations {
            scope.insert(prefix.clone(), uri.clone());
        }
        scope
    }

    /// Depth-first search returning the first element matching `predicate`
    /// together with the namespaces it inherits.
    pub fn find_with_scope<'a, F>(
        &'a self,
        inherited: &NamespaceScope,
        predicate: &F,
    ) -> Option<(&'a Element, NamespaceScope)>
    where
        F: Fn(&Element) -> bool,
    {
        if predicate(self) {
            return Some((self, inherited.clone()));
        }
        let scope = self.scope(inherited);
        self.child_elements()
            .find_map(|child| child.find_with_scope(&scope, predicate))
    }

    /// Counts the elements (including this one) carrying the given ID.
    #[must_use]
    pub fn count_id(&self, id: &str) -> usize {
        let own = usize::from(self.id() == Some(id));
        own + self.child_elements().map(|c| c.count_id(id)).sum::<usize>()
    }

    /// Mutable access to the first element carrying the given ID.
    pub fn find_by_id_mut(&mut self, id: &str) -> Option<&mut Element> {
        if self.id() == Some(id) {
            return Some(self);
        }
        self.children.iter_mut().find_map(|node| match node {
            Node::Element(el) => el.find_by_id_mut(id),
            _ => None,
        })
    }

    /// Returns a copy that declares every inherited namespace itself, so it
    /// can be serialized on its own.
    #[must_use]
    pub fn detached(&self, inherited: &NamespaceScope) -> Element {
        let mut copy = self.clone();
        for (prefix, uri) in inherited {
            if !copy
                .namespace_declarations
                .iter()
                .any(|(declared, _)| declared == prefix)
            {
                copy.namespace_declarations
                    .push((prefix.clone(), uri.clone()));
            }
        }
        copy
    }

    /// Serializes this element.
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        writer::write_element(&mut out, self);
        out
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for node in &el.children {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(child) => collect_text(child, out),
            Node::Comment(_) => {}
        }
    }
}

pub(crate) fn split_qname(qualified_name: &str) -> (Option<String>, String) {
    match qualified_name.split_once(':') {
        Some((prefix, name)) => (Some(prefix.to_string()), name.to_string()),
        None => (None, qualified_name.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "urn:test";

    #[test]
    fn builder_and_queries() {
        let el = Element::new("t:Root", NS)
            .declare("t", NS)
            .attr("ID", "abc")
            .child(Element::new("t:Child", NS).text(" hello "))
            .child(Element::new("t:Child", NS).text("world"));

        assert!(el.is(NS, "Root"));
        assert_eq!(el.id(), Some("abc"));
        assert_eq!(el.find_children(NS, "Child").count(), 2);
        assert_eq!(el.child_text(NS, "Child").as_deref(), Some("hello"));
        assert_eq!(el.text_content(), " hello world");
    }

    #[test]
    fn find_with_scope_reports_inherited_namespaces() {
        let doc = parse(r#"<a:Root xmlns:a="urn:a" xmlns:b="urn:b"><b:Inner ID="x"/></a:Root>"#)
            .unwrap();
        let (found, scope) = doc
            .find_with_scope(&NamespaceScope::new(), &|el| el.id() == Some("x"))
            .unwrap();
        assert_eq!(found.name, "Inner");
        assert_eq!(scope.get("a").map(String::as_str), Some("urn:a"));
        assert_eq!(scope.get("b").map(String::as_str), Some("urn:b"));
    }

    #[test]
    fn detached_copy_is_standalone() {
        let doc = parse(r#"<a:Root xmlns:a="urn:a"><a:Inner ID="x">v</a:Inner></a:Root>"#).unwrap();
        let (inner, scope) = doc
            .find_with_scope(&NamespaceScope::new(), &|el| el.id() == Some("x"))
            .unwrap();
        let xml = inner.detached(&scope).to_xml();
        assert_eq!(xml, r#"<a:Inner xmlns:a="urn:a" ID="x">v</a:Inner>"#);
        assert!(parse(&xml).is_ok());
    }

    #[test]
    fn duplicate_ids_are_counted() {
        let doc = parse(r#"<R ID="x"><C ID="x"/><C ID="y"/></R>"#).unwrap();
        assert_eq!(doc.count_id("x"), 2);
        assert_eq!(doc.count_id("y"), 1);
        assert_eq!(doc.count_id("z"), 0);
    }
}
