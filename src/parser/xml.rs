//! Tolerant element tree built from `quick-xml` events.
//!
//! End-name checks are off: a stray end tag closes the nearest open element
//! with that name (or is ignored), and elements still open at EOF are closed.
//! Entity references are decoded with `html-escape`, so HTML entities that
//! XML does not define survive. Names are kept qualified (`dc:date`);
//! namespace declarations are not resolved.

use html_escape::decode_html_entities;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Nesting beyond this is treated as hostile input.
pub const MAX_DEPTH: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },

    #[error("nesting depth exceeds {0} levels")]
    TooDeep(usize),

    #[error("document has no root element")]
    NoRoot,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Element(Element),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub nodes: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut element = Self::new(name);
        element.nodes.push(Node::Text(text.into()));
        element
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn push(&mut self, child: Element) {
        self.nodes.push(Node::Element(child));
    }

    pub fn prefix(&self) -> Option<&str> {
        self.name.split_once(':').map(|(prefix, _)| prefix)
    }

    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    /// Qualified names match exactly; bare names match only unprefixed elements.
    pub fn is(&self, name: &str) -> bool {
        if name.contains(':') {
            self.name.eq_ignore_ascii_case(name)
        } else {
            self.prefix().is_none() && self.name.eq_ignore_ascii_case(name)
        }
    }

    pub fn is_local(&self, local: &str) -> bool {
        self.local_name().eq_ignore_ascii_case(local)
    }

    /// Attribute by qualified name, falling back to local name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .or_else(|| {
                let local = name.rsplit(':').next().unwrap_or(name);
                self.attrs
                    .iter()
                    .find(|(k, _)| k.rsplit(':').next().unwrap_or(k) == local)
            })
            .map(|(_, v)| v.as_str())
    }

    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.nodes.iter().filter_map(|node| match node {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children().find(|c| c.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children().filter(move |c| c.is(name))
    }

    /// First descendant (depth-first, document order) with this local name.
    pub fn find_local(&self, local: &str) -> Option<&Element> {
        for child in self.children() {
            if child.is_local(local) {
                return Some(child);
            }
            if let Some(found) = child.find_local(local) {
                return Some(found);
            }
        }
        None
    }

    /// All descendants with this local name. Matches are not searched further.
    pub fn descendants_local<'a>(&'a self, local: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_local(local, &mut found);
        found
    }

    fn collect_local<'a>(&'a self, local: &str, found: &mut Vec<&'a Element>) {
        for child in self.children() {
            if child.is_local(local) {
                found.push(child);
            } else {
                child.collect_local(local, found);
            }
        }
    }

    pub fn has_children(&self) -> bool {
        self.children().next().is_some()
    }

    /// Direct text content, trimmed.
    pub fn text(&self) -> String {
        let mut text = String::new();
        for node in &self.nodes {
            if let Node::Text(t) = node {
                text.push_str(t);
            }
        }
        text.trim().to_string()
    }

    /// Text for leaf elements, re-serialized markup when the element holds
    /// unescaped HTML.
    pub fn value(&self) -> String {
        if self.has_children() {
            self.inner_markup().trim().to_string()
        } else {
            self.text()
        }
    }

    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for node in &self.nodes {
            match node {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.write_markup(&mut out),
            }
        }
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (k, v) in &self.attrs {
            out.push(' ');
            out.push_str(k);
            out.push_str("=\"");
            out.push_str(&v.replace('"', "&quot;"));
            out.push('"');
        }
        if self.nodes.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&self.inner_markup());
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Rename elements carrying `prefix` to their local name, recursively.
    pub fn strip_prefix(&mut self, prefix: &str) {
        if self.prefix() == Some(prefix) {
            self.name = self.local_name().to_string();
        }
        for node in &mut self.nodes {
            if let Node::Element(e) = node {
                e.strip_prefix(prefix);
            }
        }
    }
}

/// Parse into a synthetic `#document` element holding the top-level elements.
pub fn parse_document(content: &str) -> Result<Element, XmlError> {
    let mut reader = Reader::from_str(content);
    let config = reader.config_mut();
    config.check_end_names = false;
    config.allow_unmatched_ends = true;
    config.check_comments = false;

    let mut stack: Vec<Element> = vec![Element::new("#document")];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if stack.len() > MAX_DEPTH {
                    return Err(XmlError::TooDeep(MAX_DEPTH));
                }
                stack.push(element_from_start(&e));
            }
            Ok(Event::Empty(e)) => {
                let element = element_from_start(&e);
                attach(&mut stack, element);
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                close(&mut stack, &name);
            }
            Ok(Event::Text(e)) => {
                let raw = String::from_utf8_lossy(&e);
                push_text(&mut stack, decode_html_entities(&raw).into_owned());
            }
            Ok(Event::CData(e)) => {
                push_text(&mut stack, String::from_utf8_lossy(&e).into_owned());
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(XmlError::Syntax {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })
            }
        }
    }

    while stack.len() > 1 {
        if let Some(open) = stack.pop() {
            attach(&mut stack, open);
        }
    }

    let document = stack.pop().ok_or(XmlError::NoRoot)?;
    if !document.has_children() {
        return Err(XmlError::NoRoot);
    }
    Ok(document)
}

fn element_from_start(start: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut element = Element::new(name);

    let mut attributes = start.attributes();
    attributes.with_checks(false);
    for attr in attributes.flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let raw = String::from_utf8_lossy(&attr.value);
        element
            .attrs
            .push((key, decode_html_entities(&raw).into_owned()));
    }
    element
}

fn attach(stack: &mut [Element], element: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.push(element);
    }
}

fn push_text(stack: &mut [Element], text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(parent) = stack.last_mut() {
        match parent.nodes.last_mut() {
            Some(Node::Text(existing)) => existing.push_str(&text),
            _ => parent.nodes.push(Node::Text(text)),
        }
    }
}

/// Close the nearest open element named `name`; unmatched end tags are dropped.
fn close(stack: &mut Vec<Element>, name: &str) {
    let Some(index) = stack
        .iter()
        .rposition(|e| e.name.eq_ignore_ascii_case(name))
    else {
        return;
    };
    if index == 0 {
        return;
    }
    while stack.len() > index {
        if let Some(open) = stack.pop() {
            attach(stack, open);
        }
    }
}
