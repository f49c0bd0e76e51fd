//! XML parsing on top of quick-xml.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{split_qname, Element, NamespaceScope, Node, XmlAttribute, XML_NS};
use crate::error::{SamlError, SamlResult};

/// Parses `xml` into an element tree.
///
/// Document type declarations are refused outright. Line endings are
/// normalized to `\n` and attribute whitespace to spaces, as an XML
/// processor would.
pub fn parse(xml: &str) -> SamlResult<Element> {
    let normalized = normalize_line_endings(xml);
    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<(Element, NamespaceScope)> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            SamlError::XmlParse(format!("{e} at position {}", reader.error_position()))
        })?;

        match event {
            Event::Start(start) => {
                ensure_single_root(root.as_ref())?;
                let parent_scope = stack.last().map(|(_, scope)| scope);
                let (element, scope) = open_element(&start, parent_scope)?;
                stack.push((element, scope));
            }
            Event::Empty(start) => {
                ensure_single_root(root.as_ref())?;
                let parent_scope = stack.last().map(|(_, scope)| scope);
                let (element, _) = open_element(&start, parent_scope)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let (element, _) = stack
                    .pop()
                    .ok_or_else(|| SamlError::XmlParse("unexpected end tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                let text = text.unescape()?;
                push_text(&mut stack, text)?;
            }
            Event::CData(cdata) => {
                let text = std::str::from_utf8(&cdata)
                    .map_err(|e| SamlError::XmlParse(format!("invalid UTF-8 in CDATA: {e}")))?;
                push_text(&mut stack, Cow::Borrowed(text))?;
            }
            Event::Comment(comment) => {
                if let Some((parent, _)) = stack.last_mut() {
                    let text = std::str::from_utf8(&comment).map_err(|e| {
                        SamlError::XmlParse(format!("invalid UTF-8 in comment: {e}"))
                    })?;
                    parent.children.push(Node::Comment(text.to_string()));
                }
            }
            Event::DocType(_) => {
                return Err(SamlError::XmlParse(
                    "document type declarations are not allowed".to_string(),
                ));
            }
            Event::Eof => break,
            Event::Decl(_) | Event::PI(_) => {}
        }
    }

    if !stack.is_empty() {
        return Err(SamlError::XmlParse("unexpected end of document".to_string()));
    }
    root.ok_or_else(|| SamlError::XmlParse("document has no root element".to_string()))
}

fn normalize_line_endings(xml: &str) -> Cow<'_, str> {
    if xml.contains('\r') {
        Cow::Owned(xml.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(xml)
    }
}

fn ensure_single_root(root: Option<&Element>) -> SamlResult<()> {
    if root.is_some() {
        return Err(SamlError::XmlParse(
            "content after the document element".to_string(),
        ));
    }
    Ok(())
}

fn attach(stack: &mut [(Element, NamespaceScope)], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some((parent, _)) => parent.children.push(Node::Element(element)),
        None => *root = Some(element),
    }
}

fn push_text(stack: &mut [(Element, NamespaceScope)], text: Cow<'_, str>) -> SamlResult<()> {
    match stack.last_mut() {
        Some((parent, _)) => {
            if let Some(Node::Text(previous)) = parent.children.last_mut() {
                previous.push_str(&text);
            } else {
                parent.children.push(Node::Text(text.into_owned()));
            }
            Ok(())
        }
        None if text.trim().is_empty() => Ok(()),
        None => Err(SamlError::XmlParse(
            "text outside the document element".to_string(),
        )),
    }
}

fn open_element(
    start: &BytesStart<'_>,
    parent_scope: Option<&NamespaceScope>,
) -> SamlResult<(Element, NamespaceScope)> {
    let start_name = start.name();
    let qname = utf8(start_name.as_ref())?;
    let mut scope = parent_scope.cloned().unwrap_or_default();
    let mut declarations = Vec::new();
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| SamlError::XmlParse(e.to_string()))?;
        let key = utf8(attr.key.as_ref())?;
        let value = attribute_value(&attr.value)?;

        if key == "xmlns" {
            declarations.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            if value.is_empty() {
                return Err(SamlError::XmlParse(format!(
                    "prefix {prefix} cannot be bound to an empty namespace"
                )));
            }
            declarations.push((prefix.to_string(), value));
        } else {
            raw_attributes.push((key.to_string(), value));
        }
    }

    for (prefix, uri) in &declarations {
        scope.insert(prefix.clone(), uri.clone());
    }

    let (prefix, name) = split_qname(qname);
    let namespace = resolve(prefix.as_deref(), &scope, qname)?;

    let mut attributes = Vec::with_capacity(raw_attributes.len());
    for (key, value) in raw_attributes {
        let (attr_prefix, attr_name) = split_qname(&key);
        let attr_namespace = match attr_prefix.as_deref() {
            Some(p) => resolve(Some(p), &scope, &key)?,
            None => None,
        };
        attributes.push(XmlAttribute {
            prefix: attr_prefix,
            name: attr_name,
            namespace: attr_namespace,
            value,
        });
    }

    let element = Element {
        prefix,
        name,
        namespace,
        namespace_declarations: declarations,
        attributes,
        children: Vec::new(),
    };
    Ok((element, scope))
}

fn resolve(prefix: Option<&str>, scope: &NamespaceScope, qname: &str) -> SamlResult<Option<String>> {
    match prefix {
        Some("xml") => Ok(Some(XML_NS.to_string())),
        Some(p) => scope
            .get(p)
            .cloned()
            .map(Some)
            .ok_or_else(|| SamlError::XmlParse(format!("unbound namespace prefix in {qname}"))),
        None => Ok(scope.get("").filter(|uri| !uri.is_empty()).cloned()),
    }
}

fn attribute_value(raw: &[u8]) -> SamlResult<String> {
    let raw = utf8(raw)?;
    let normalized = raw.replace(['\t', '\n', '\r'], " ");
    quick_xml::escape::unescape(&normalized)
        .map(Cow::into_owned)
        .map_err(|e| SamlError::XmlParse(e.to_string()))
}

fn utf8(bytes: &[u8]) -> SamlResult<&str> {
    std::str::from_utf8(bytes).map_err(|e| SamlError::XmlParse(format!("invalid UTF-8: {e}")))
}
