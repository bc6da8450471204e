use quick_xml::Reader;
use quick_xml::events::Event;

use crate::{Error, Result};

/// Minimal owned XML tree for the XML-RPC envelope, whose `<value>` nodes
/// are typed by their first child and so do not map onto serde models.
/// The documents OpenNebula embeds in it (`<VM>`, `<VM_POOL>`) are decoded
/// with `quick_xml::de` in `types.rs`.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Element {
    pub name: String,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    fn named(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// First direct child with the given tag.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given tag, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of the first direct child with the given tag, trimmed.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|c| c.text.trim())
    }
}

/// Parse a document and return its root element.
pub(crate) fn parse(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Element::default()];

    loop {
        match reader
            .read_event()
            .map_err(|e| Error::Decode(format!("malformed xml: {e}")))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                stack.push(Element::named(name));
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Element::named(name));
                }
            }
            Event::End(_) => {
                let done = stack
                    .pop()
                    .ok_or_else(|| Error::Decode("unbalanced xml".into()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(done),
                    None => return Err(Error::Decode("unbalanced xml".into())),
                }
            }
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| Error::Decode(format!("bad xml text: {e}")))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(c) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(Error::Decode("unexpected end of xml document".into()));
    }

    stack
        .pop()
        .and_then(|doc| doc.children.into_iter().next())
        .ok_or_else(|| Error::Decode("empty xml document".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_elements_and_cdata() {
        let root = parse(
            "<?xml version=\"1.0\"?><VM><ID>7</ID><NAME><![CDATA[node-a]]></NAME>\
             <TEMPLATE><NIC><IP>10.0.0.4</IP></NIC><NIC><IP>10.0.1.4</IP></NIC></TEMPLATE></VM>",
        )
        .unwrap();

        assert_eq!(root.name, "VM");
        assert_eq!(root.child_text("ID"), Some("7"));
        assert_eq!(root.child_text("NAME"), Some("node-a"));
        let nics: Vec<_> = root
            .child("TEMPLATE")
            .unwrap()
            .children_named("NIC")
            .collect();
        assert_eq!(nics.len(), 2);
        assert_eq!(nics[1].child_text("IP"), Some("10.0.1.4"));
    }

    #[test]
    fn unescapes_entities() {
        let root = parse("<string>&lt;VM&gt;&amp;</string>").unwrap();
        assert_eq!(root.text, "<VM>&");
    }

    #[test]
    fn rejects_truncated_documents() {
        assert!(parse("<VM><ID>1</ID>").is_err());
    }
}
