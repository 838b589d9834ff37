//! Legacy markup parser (quick-xml).

use quick_xml::events::Event;
use quick_xml::Reader;

use super::error::FlowError;
use super::model::NormalizedFlow;
use super::payload::{RawFormat, RawPayload};
use super::traits::PayloadParser;
use super::tree::{build_flow, SourceNode};
use super::vocabulary::ROOT_ELEMENT;

/// Parser for tag-markup flow definitions.
#[derive(Debug, Default)]
pub struct MarkupParser;

impl MarkupParser {
    pub fn new() -> Self {
        Self
    }
}

impl PayloadParser for MarkupParser {
    fn format(&self) -> RawFormat {
        RawFormat::LegacyMarkup
    }

    fn detect(&self, payload: &RawPayload) -> bool {
        match payload {
            RawPayload::Text(text) => {
                let text = strip_bom(text).trim_start();
                text.starts_with('<') && root_tag(text).as_deref() == Some(ROOT_ELEMENT)
            }
            RawPayload::Document(_) => false,
        }
    }

    fn normalize(&self, unit_id: &str, payload: &RawPayload) -> Result<NormalizedFlow, FlowError> {
        let text = match payload {
            RawPayload::Text(text) => text,
            RawPayload::Document(_) => {
                return Err(FlowError::normalization(unit_id, "expected markup text, got a document"))
            }
        };

        let root = parse_markup(strip_bom(text)).map_err(|m| FlowError::normalization(unit_id, m))?;
        if root.name != ROOT_ELEMENT {
            return Err(FlowError::normalization(
                unit_id,
                format!("unexpected root element <{}>", root.name),
            ));
        }

        build_flow(&root, RawFormat::LegacyMarkup).map_err(|m| FlowError::normalization(unit_id, m))
    }
}

/// One decoded markup element.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct XmlNode {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    fn is_scalar(&self) -> bool {
        self.children.is_empty() && !self.text.trim().is_empty()
    }
}

impl SourceNode for XmlNode {
    fn text(&self, key: &str) -> Option<String> {
        self.children
            .iter()
            .filter(|c| c.name == key && c.is_scalar())
            .map(|c| c.text.trim().to_string())
            .next()
    }

    fn texts(&self, key: &str) -> Vec<String> {
        self.children
            .iter()
            .filter(|c| c.name == key && c.is_scalar())
            .map(|c| c.text.trim().to_string())
            .collect()
    }

    fn nodes(&self, key: &str) -> Vec<&Self> {
        self.children
            .iter()
            .filter(|c| c.name == key && !c.is_scalar())
            .collect()
    }

    fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for child in &self.children {
            if !keys.contains(&child.name.as_str()) {
                keys.push(&child.name);
            }
        }
        keys
    }

    fn has_scalar(&self, key: &str) -> bool {
        self.children.iter().any(|c| c.name == key && c.is_scalar())
    }
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Local name of the first element, if the prologue is readable.
fn root_tag(text: &str) -> Option<String> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// Decode a whole markup document into a tree, rejecting malformed nesting.
pub(crate) fn parse_markup(text: &str) -> Result<XmlNode, String> {
    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| format!("malformed markup at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(e) => {
                if stack.is_empty() && root.is_some() {
                    return Err("content after the root element".to_string());
                }
                stack.push(XmlNode::new(String::from_utf8_lossy(e.local_name().as_ref()).into_owned()));
            }
            Event::Empty(e) => {
                let node = XmlNode::new(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                attach(&mut stack, &mut root, node)?;
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let node = stack
                    .pop()
                    .ok_or_else(|| format!("closing tag </{}> without an opening tag", name))?;
                if node.name != name {
                    return Err(format!("expected </{}>, found </{}>", node.name, name));
                }
                attach(&mut stack, &mut root, node)?;
            }
            Event::Text(t) => {
                let content = t.unescape().map_err(|e| format!("bad text content: {}", e))?;
                match stack.last_mut() {
                    Some(open) => open.text.push_str(&content),
                    None if content.trim().is_empty() => {}
                    None => return Err("text outside the root element".to_string()),
                }
            }
            Event::CData(c) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(format!("unterminated element <{}>", open.name));
    }

    root.ok_or_else(|| "no root element".to_string())
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), String> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err("more than one root element".to_string()),
    }
}
