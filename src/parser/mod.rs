//! Format detection and the per-format fallback chains.
//!
//! Every [`FeedParser`] runs the same chain: a structured parse over the
//! repaired document, then regex extraction of item blocks, then manual
//! splitting on item open tags. The first strategy that yields items wins.

pub mod atom;
pub mod detect;
pub mod extract;
pub mod json;
pub mod normalize;
pub mod rdf;
pub mod rss;
pub mod xml;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::app::observer::{Event, Level, Observer};

pub use atom::AtomParser;
pub use detect::detect;
pub use json::JsonFeedParser;
pub use rdf::RdfParser;
pub use rss::RssParser;
pub use xml::{Element, Node};

const COMPONENT: &str = "parser";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Rss,
    Atom,
    Json,
    Rdf,
    Unknown,
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FeedFormat::Rss => "RSS",
            FeedFormat::Atom => "Atom",
            FeedFormat::Json => "JSON Feed",
            FeedFormat::Rdf => "RDF",
            FeedFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Structured,
    Regex,
    Manual,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Structured => "structured",
            Strategy::Regex => "regex",
            Strategy::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// Loosely-typed item as found in the source document, tagged by schema.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Rss(Element),
    Atom(Element),
    Rdf(Element),
    Json(serde_json::Value),
}

impl RawItem {
    pub fn format(&self) -> FeedFormat {
        match self {
            RawItem::Rss(_) => FeedFormat::Rss,
            RawItem::Atom(_) => FeedFormat::Atom,
            RawItem::Rdf(_) => FeedFormat::Rdf,
            RawItem::Json(_) => FeedFormat::Json,
        }
    }

    pub fn element(&self) -> Option<&Element> {
        match self {
            RawItem::Rss(e) | RawItem::Atom(e) | RawItem::Rdf(e) => Some(e),
            RawItem::Json(_) => None,
        }
    }

    pub fn json(&self) -> Option<&serde_json::Value> {
        match self {
            RawItem::Json(v) => Some(v),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("content is empty")]
    Empty,

    #[error("no {format} items found ({})", .attempts.join("; "))]
    Exhausted {
        format: FeedFormat,
        attempts: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct ParsedFeed {
    pub format: FeedFormat,
    pub strategy: Strategy,
    pub items: Vec<RawItem>,
}

pub trait FeedParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn format(&self) -> FeedFormat;

    fn can_parse(&self, content: &str) -> bool;

    /// Tolerant structured parse. `Err` carries the reason the document was rejected.
    fn structured(&self, content: &str) -> Result<Vec<RawItem>, String>;

    fn regex(&self, content: &str) -> Vec<RawItem>;

    fn manual(&self, content: &str) -> Vec<RawItem>;

    fn parse(&self, content: &str) -> Result<ParsedFeed, ParseError> {
        if content.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let format = self.format();
        let mut attempts = Vec::new();

        match self.structured(content) {
            Ok(items) if !items.is_empty() => {
                return Ok(ParsedFeed {
                    format,
                    strategy: Strategy::Structured,
                    items,
                })
            }
            Ok(_) => attempts.push("structured: no items".to_string()),
            Err(reason) => attempts.push(format!("structured: {}", reason)),
        }

        let items = self.regex(content);
        if !items.is_empty() {
            return Ok(ParsedFeed {
                format,
                strategy: Strategy::Regex,
                items,
            });
        }
        attempts.push("regex: no items".to_string());

        let items = self.manual(content);
        if !items.is_empty() {
            return Ok(ParsedFeed {
                format,
                strategy: Strategy::Manual,
                items,
            });
        }
        attempts.push("manual: no items".to_string());

        Err(ParseError::Exhausted { format, attempts })
    }
}

/// Selects a parser for detected content. Unknown content is treated as RSS.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn FeedParser>>,
    observer: Arc<dyn Observer>,
}

impl ParserRegistry {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self::with_parsers(
            vec![
                Box::new(JsonFeedParser),
                Box::new(RdfParser),
                Box::new(AtomParser),
                Box::new(RssParser),
            ],
            observer,
        )
    }

    pub fn with_parsers(parsers: Vec<Box<dyn FeedParser>>, observer: Arc<dyn Observer>) -> Self {
        Self { parsers, observer }
    }

    pub fn parser_for(&self, format: FeedFormat) -> Option<&dyn FeedParser> {
        self.parsers
            .iter()
            .find(|p| p.format() == format)
            .map(|p| p.as_ref())
    }

    /// Decode a fetched body and parse it.
    pub fn parse_bytes(&self, body: &[u8]) -> Result<ParsedFeed, ParseError> {
        let content = normalize::decode(body);
        self.parse(&content)
    }

    pub fn parse(&self, content: &str) -> Result<ParsedFeed, ParseError> {
        if content.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let detected = detect(content);
        let format = match detected {
            FeedFormat::Unknown => FeedFormat::Rss,
            other => other,
        };

        let parser = self
            .parser_for(format)
            .or_else(|| self.parsers.iter().find(|p| p.can_parse(content)).map(|p| p.as_ref()));

        let Some(parser) = parser else {
            return Err(ParseError::Exhausted {
                format,
                attempts: vec!["no parser registered".to_string()],
            });
        };

        match parser.parse(content) {
            Ok(parsed) => {
                let level = if parsed.strategy == Strategy::Structured {
                    Level::Debug
                } else {
                    Level::Warn
                };
                self.observer.record(
                    Event::new(level, COMPONENT, "parsed feed")
                        .field("detected", detected)
                        .field("parser", parser.name())
                        .field("strategy", parsed.strategy)
                        .field("items", parsed.items.len()),
                );
                Ok(parsed)
            }
            Err(err) => {
                self.observer.record(
                    Event::new(Level::Error, COMPONENT, "all parse strategies failed")
                        .field("detected", detected)
                        .field("parser", parser.name())
                        .field("error", &err),
                );
                Err(err)
            }
        }
    }
}
