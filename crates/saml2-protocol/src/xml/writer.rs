//! Plain (non-canonical) serialization.

use super::{Element, Node};

pub(super) fn write_element(out: &mut String, el: &Element) {
    let qname = el.qualified_name();
    out.push('<');
    out.push_str(&qname);

    for (prefix, uri) in &el.namespace_declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        escape_attribute(out, uri);
        out.push('"');
    }

    for attr in &el.attributes {
        out.push(' ');
        out.push_str(&attr.qualified_name());
        out.push_str("=\"");
        escape_attribute(out, &attr.value);
        out.push('"');
    }

    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }

    out.push('>');
    for node in &el.children {
        match node {
            Node::Element(child) => write_element(out, child),
            Node::Text(text) => escape_text(out, text),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
        }
    }
    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

pub(super) fn escape_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

pub(super) fn escape_attribute(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::{parse, Element};

    #[test]
    fn escapes_special_characters() {
        let el = Element::new("p:E", "urn:p")
            .declare("p", "urn:p")
            .attr("A", "a\"b<c&d\ne")
            .text("1 < 2 & 3 > 2");
        assert_eq!(
            el.to_xml(),
            r#"<p:E xmlns:p="urn:p" A="a&quot;b&lt;c&amp;d&#xA;e">1 &lt; 2 &amp; 3 &gt; 2</p:E>"#
        );
    }

    #[test]
    fn output_parses_back_to_same_tree() {
        let el = Element::new("p:E", "urn:p")
            .declare("p", "urn:p")
            .attr("A", "tab\there")
            .child(Element::new("p:C", "urn:p").text("x"));
        let parsed = parse(&el.to_xml()).unwrap();
        assert_eq!(parsed, el);
    }
}
