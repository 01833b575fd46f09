//! Fallback strategies for XML formats that fail structured parsing.
//!
//! Both strategies synthesize [`Element`]s shaped like the structured ones,
//! so the standardizer does not care which strategy produced an item.

use std::collections::HashMap;

use html_escape::decode_html_entities;
use once_cell::sync::Lazy;
use regex::Regex;

use super::xml::Element;

/// Child fields captured from each block by the regex strategy.
const FIELD_TAGS: &[&str] = &[
    "title",
    "link",
    "description",
    "content:encoded",
    "content",
    "summary",
    "pubDate",
    "published",
    "updated",
    "dc:date",
    "guid",
    "id",
    "author",
    "dc:creator",
    "category",
    "dc:subject",
];

/// Tags that may legitimately repeat inside one item.
const REPEATED_TAGS: &[&str] = &["category", "dc:subject"];

const MANUAL_DESCRIPTION_LIMIT: usize = 500;

static BLOCK_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    ["item", "entry"]
        .into_iter()
        .map(|tag| {
            let pattern = format!(r"(?is)<{tag}(\s[^>]*)?>(.*?)</{tag}\s*>");
            (tag, Regex::new(&pattern).expect("valid block regex"))
        })
        .collect()
});

static FIELD_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    FIELD_TAGS
        .iter()
        .map(|&tag| {
            let escaped = regex::escape(tag);
            let pattern = format!(r"(?is)<{escaped}(\s[^>]*)?>(.*?)</{escaped}\s*>");
            (tag, Regex::new(&pattern).expect("valid field regex"))
        })
        .collect()
});

static LINK_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link(\s[^>]*?)/?>").expect("valid link regex"));

static ENCLOSURE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<enclosure(\s[^>]*?)/?>").expect("valid enclosure regex"));

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_][\w:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid attribute regex")
});

static CDATA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("valid cdata regex"));

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("valid url regex"));

static MARKUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z][^<>]*>").expect("valid markup regex")
});

static HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
});

/// Extract `<tag>…</tag>` blocks and their fields by pattern matching.
pub fn regex_blocks(content: &str, tag: &'static str) -> Vec<Element> {
    let Some(block) = BLOCK_PATTERNS.get(tag) else {
        return Vec::new();
    };

    block
        .captures_iter(content)
        .map(|caps| {
            let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            block_element(tag, attrs, body)
        })
        .filter(|element| element.has_children())
        .collect()
}

fn block_element(tag: &str, attrs: &str, body: &str) -> Element {
    let mut element = Element::new(tag);
    element.attrs = parse_attributes(attrs);

    for &field in FIELD_TAGS {
        let Some(pattern) = FIELD_PATTERNS.get(field) else {
            continue;
        };
        let repeated = REPEATED_TAGS.contains(&field);
        for caps in pattern.captures_iter(body) {
            let inner = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let mut child = Element::with_text(field, clean_text(inner));
            if let Some(field_attrs) = caps.get(1) {
                child.attrs = parse_attributes(field_attrs.as_str());
            }
            element.push(child);
            if !repeated {
                break;
            }
        }
    }

    for caps in LINK_TAG.captures_iter(body) {
        let attrs = parse_attributes(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
        if attrs.iter().any(|(k, _)| k == "href") {
            let mut link = Element::new("link");
            link.attrs = attrs;
            element.push(link);
        }
    }

    for caps in ENCLOSURE_TAG.captures_iter(body) {
        let mut enclosure = Element::new("enclosure");
        enclosure.attrs = parse_attributes(caps.get(1).map(|m| m.as_str()).unwrap_or(""));
        element.push(enclosure);
    }

    element
}

/// Last resort: split on open tags and salvage what each fragment holds.
pub fn manual_blocks(content: &str, tag: &str) -> Vec<Element> {
    let lower = content.to_ascii_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}", tag);

    let starts: Vec<usize> = lower
        .match_indices(&open)
        .map(|(pos, _)| pos)
        .filter(|&pos| {
            matches!(
                lower.as_bytes().get(pos + open.len()),
                Some(b'>') | Some(b' ') | Some(b'\t') | Some(b'\n') | Some(b'/')
            )
        })
        .collect();

    let mut elements = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(content.len());
        let fragment = &content[start..end];
        let fragment_lower = &lower[start..end];

        let fragment = match fragment_lower.find(&close) {
            Some(close_at) => &fragment[..close_at],
            None => fragment,
        };
        let body = match fragment.find('>') {
            Some(gt) => &fragment[gt + 1..],
            None => continue,
        };

        if let Some(element) = manual_element(tag, body) {
            elements.push(element);
        }
    }
    elements
}

fn manual_element(tag: &str, body: &str) -> Option<Element> {
    let title = find_tag_text(body, "title").unwrap_or_default();
    let link = HREF
        .captures(body)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .or_else(|| find_tag_text(body, "link").filter(|l| !l.is_empty()))
        .or_else(|| BARE_URL.find(body).map(|m| m.as_str().to_string()))
        .unwrap_or_default();

    let without_title = match body.to_ascii_lowercase().find("</title") {
        Some(pos) => body[pos..].split_once('>').map(|(_, rest)| rest).unwrap_or(""),
        None => body,
    };
    let description = truncate_chars(
        &strip_tags(&unwrap_cdata(without_title)),
        MANUAL_DESCRIPTION_LIMIT,
    );

    if title.is_empty() && description.is_empty() && link.is_empty() {
        return None;
    }

    let mut element = Element::new(tag);
    element.push(Element::with_text("title", title));
    element.push(Element::with_text("description", description));
    if !link.is_empty() {
        element.push(Element::with_text("link", link.clone()));
        element.push(Element::with_text(if tag == "entry" { "id" } else { "guid" }, link));
    }
    Some(element)
}

fn find_tag_text(body: &str, tag: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open_at = lower.find(&format!("<{}", tag))?;
    let content_start = open_at + lower[open_at..].find('>')? + 1;
    let content_end = content_start + lower[content_start..].find(&format!("</{}", tag))?;
    Some(clean_text(&body[content_start..content_end]))
}

pub fn parse_attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .filter_map(|caps| {
            let key = caps.get(1)?.as_str().to_string();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str();
            Some((key, decode_html_entities(value).into_owned()))
        })
        .collect()
}

pub fn unwrap_cdata(text: &str) -> String {
    CDATA.replace_all(text, "$1").into_owned()
}

/// CDATA unwrapped, entities decoded, trimmed.
pub fn clean_text(raw: &str) -> String {
    let unwrapped = unwrap_cdata(raw);
    decode_html_entities(unwrapped.trim()).into_owned()
}

/// Remove markup, decode entities and collapse whitespace.
///
/// Only well-formed tags and comments are removed; a stray `<` is kept as text.
pub fn strip_tags(html: &str) -> String {
    let text = MARKUP.replace_all(html, " ");
    collapse_whitespace(&decode_html_entities(&text))
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
