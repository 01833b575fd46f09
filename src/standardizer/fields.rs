//! Per-format field resolution tables.
//!
//! Each canonical field is resolved by walking an ordered list of sources
//! and taking the first non-empty value.

use serde_json::Value;

use crate::domain::Enclosure;
use crate::parser::extract::{collapse_whitespace, strip_tags};
use crate::parser::{Element, FeedFormat, RawItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Child element text, tags stripped.
    Text(&'static str),
    /// Child element content with markup kept.
    Markup(&'static str),
    /// Attribute of a child element.
    Attr(&'static str, &'static str),
    /// Attribute of the item element itself.
    OwnAttr(&'static str),
    /// `href` of the first `link` whose `rel` is `alternate` or absent.
    AtomLink,
    /// Text of a grandchild, e.g. `author/name`.
    Path(&'static str, &'static str),
    /// JSON string or number.
    Key(&'static str),
    /// JSON nested key, e.g. `author.name`.
    KeyPath(&'static str, &'static str),
    /// Key of the first object in a JSON array, e.g. `authors[0].name`.
    FirstOf(&'static str, &'static str),
}

pub struct FieldTable {
    pub title: &'static [Source],
    pub link: &'static [Source],
    pub description: &'static [Source],
    pub content: &'static [Source],
    pub dates: &'static [Source],
    pub guid: &'static [Source],
    pub author: &'static [Source],
}

use Source::*;

pub static RSS: FieldTable = FieldTable {
    title: &[Text("title"), Text("dc:title")],
    link: &[Attr("link", "href"), Text("link"), AtomLink],
    description: &[
        Markup("description"),
        Markup("content"),
        Markup("content:encoded"),
        Markup("summary"),
        Markup("dc:description"),
    ],
    content: &[
        Markup("content:encoded"),
        Markup("content"),
        Markup("description"),
        Markup("summary"),
    ],
    dates: &[
        Text("pubDate"),
        Text("published"),
        Text("dc:date"),
        Text("updated"),
        Text("dcterms:modified"),
    ],
    guid: &[Text("guid"), Text("id")],
    author: &[Text("author"), Text("dc:creator")],
};

pub static ATOM: FieldTable = FieldTable {
    title: &[Text("title")],
    link: &[AtomLink, Attr("link", "href"), Text("link")],
    description: &[Markup("description"), Markup("content"), Markup("summary")],
    content: &[Markup("content"), Markup("summary")],
    dates: &[
        Text("pubDate"),
        Text("published"),
        Text("issued"),
        Text("updated"),
        Text("modified"),
    ],
    guid: &[Text("id"), Text("guid")],
    author: &[Path("author", "name"), Text("author")],
};

pub static RDF: FieldTable = FieldTable {
    title: &[Text("title"), Text("dc:title")],
    link: &[Attr("link", "href"), Text("link"), OwnAttr("rdf:about")],
    description: &[
        Markup("description"),
        Markup("content:encoded"),
        Markup("dc:description"),
    ],
    content: &[Markup("content:encoded"), Markup("description")],
    dates: &[
        Text("pubDate"),
        Text("dc:date"),
        Text("dcterms:issued"),
        Text("dcterms:modified"),
    ],
    guid: &[Text("guid"), Text("id"), Text("dc:identifier")],
    author: &[Text("dc:creator"), Text("author")],
};

pub static JSON: FieldTable = FieldTable {
    title: &[Key("title")],
    link: &[Key("url"), Key("external_url"), Key("permalink"), Key("link")],
    description: &[
        Key("description"),
        Key("content_html"),
        Key("content"),
        Key("summary"),
        Key("content_text"),
    ],
    content: &[
        Key("content_html"),
        Key("content"),
        Key("description"),
        Key("summary"),
        Key("content_text"),
    ],
    dates: &[
        Key("pubDate"),
        Key("date_published"),
        Key("published"),
        Key("date_modified"),
        Key("updated"),
    ],
    guid: &[Key("id"), Key("guid")],
    author: &[KeyPath("author", "name"), Key("author"), FirstOf("authors", "name")],
};

pub fn table_for(format: FeedFormat) -> &'static FieldTable {
    match format {
        FeedFormat::Atom => &ATOM,
        FeedFormat::Rdf => &RDF,
        FeedFormat::Json => &JSON,
        FeedFormat::Rss | FeedFormat::Unknown => &RSS,
    }
}

/// First non-empty value among `sources`.
pub fn resolve(item: &RawItem, sources: &[Source]) -> Option<String> {
    sources.iter().find_map(|source| {
        let value = match item {
            RawItem::Json(value) => from_json(value, *source),
            RawItem::Rss(e) | RawItem::Atom(e) | RawItem::Rdf(e) => from_element(e, *source),
        }?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Every value among `sources` that is non-empty, in table order.
pub fn resolve_all(item: &RawItem, sources: &[Source]) -> Vec<String> {
    sources
        .iter()
        .filter_map(|source| resolve(item, std::slice::from_ref(source)))
        .collect()
}

fn from_element(item: &Element, source: Source) -> Option<String> {
    match source {
        Text(name) => item.child(name).map(|c| collapse_whitespace(&strip_tags(&c.value()))),
        Markup(name) => item.child(name).map(Element::value),
        Attr(name, attr) => item
            .children_named(name)
            .find_map(|c| c.attr(attr))
            .map(str::to_string),
        OwnAttr(attr) => item.attr(attr).map(str::to_string),
        AtomLink => item
            .children()
            .filter(|c| c.is_local("link"))
            .find(|c| matches!(c.attr("rel"), None | Some("alternate")) && c.attr("href").is_some())
            .and_then(|c| c.attr("href"))
            .map(str::to_string),
        Path(parent, name) => item
            .child(parent)
            .and_then(|p| p.child(name))
            .map(|c| c.text()),
        Key(_) | KeyPath(..) | FirstOf(..) => None,
    }
}

fn from_json(item: &Value, source: Source) -> Option<String> {
    match source {
        Key(key) => scalar(item.get(key)?),
        KeyPath(parent, key) => scalar(item.get(parent)?.get(key)?),
        FirstOf(array, key) => scalar(item.get(array)?.as_array()?.first()?.get(key)?),
        _ => None,
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Categories in document order, duplicates removed.
pub fn categories(item: &RawItem) -> Vec<String> {
    let mut found: Vec<String> = match item {
        RawItem::Json(value) => value
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(scalar).collect())
            .unwrap_or_default(),
        RawItem::Rss(e) | RawItem::Atom(e) | RawItem::Rdf(e) => e
            .children()
            .filter(|c| c.is_local("category") || c.is("dc:subject"))
            .filter_map(|c| {
                c.attr("term")
                    .or_else(|| c.attr("label"))
                    .map(str::to_string)
                    .or_else(|| Some(collapse_whitespace(&c.text())))
            })
            .collect(),
    };

    found.retain(|c| !c.is_empty());
    let mut seen = std::collections::HashSet::new();
    found.retain(|c| seen.insert(c.clone()));
    found
}

pub fn enclosures(item: &RawItem) -> Vec<Enclosure> {
    match item {
        RawItem::Json(value) => value
            .get("attachments")
            .and_then(Value::as_array)
            .map(|attachments| {
                attachments
                    .iter()
                    .filter_map(|a| {
                        Some(Enclosure {
                            link: a.get("url")?.as_str()?.to_string(),
                            mime_type: a.get("mime_type").and_then(Value::as_str).map(str::to_string),
                            length: a.get("size_in_bytes").and_then(Value::as_u64),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default(),
        RawItem::Rss(e) | RawItem::Atom(e) | RawItem::Rdf(e) => xml_enclosures(e),
    }
}

fn xml_enclosures(item: &Element) -> Vec<Enclosure> {
    let mut found = Vec::new();
    let mut push = |link: Option<&str>, mime: Option<&str>, length: Option<&str>| {
        if let Some(link) = link.map(str::trim).filter(|l| !l.is_empty()) {
            found.push(Enclosure {
                link: link.to_string(),
                mime_type: mime.map(str::to_string),
                length: length.and_then(|l| l.trim().parse().ok()),
            });
        }
    };

    for child in item.children() {
        if child.is("enclosure") {
            push(child.attr("url"), child.attr("type"), child.attr("length"));
        } else if child.is("media:content") {
            push(child.attr("url"), child.attr("type"), child.attr("fileSize"));
        } else if child.is("media:group") {
            for media in child.children_named("media:content") {
                push(media.attr("url"), media.attr("type"), media.attr("fileSize"));
            }
        } else if child.is_local("link") && child.attr("rel") == Some("enclosure") {
            push(child.attr("href"), child.attr("type"), child.attr("length"));
        }
    }
    found
}
