//! JSON Feed 1.0/1.1 and loose JSON item arrays.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::{FeedFormat, FeedParser, RawItem};

/// Keys that may hold the item array, in priority order.
const ITEM_KEYS: &[&str] = &["items", "entries", "posts", "data"];

static ITEMS_ARRAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:items|entries|posts)"\s*:\s*\["#).expect("valid items array regex")
});

static STRING_PAIR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""([A-Za-z_][\w]*)"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid string pair regex")
});

static NUMERIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""id"\s*:\s*(-?\d+)"#).expect("valid numeric id regex"));

static ID_KEY: Lazy<Regex> = Lazy::new(|| Regex::new(r#""id"\s*:"#).expect("valid id key regex"));

/// Fields that make a salvaged object worth keeping.
const SALVAGE_KEYS: &[&str] = &["title", "url", "content_html", "content_text", "summary"];

pub struct JsonFeedParser;

impl FeedParser for JsonFeedParser {
    fn name(&self) -> &'static str {
        "json"
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Json
    }

    fn can_parse(&self, content: &str) -> bool {
        let trimmed = content.trim_start_matches('\u{feff}').trim_start();
        trimmed.starts_with('{') || trimmed.starts_with('[')
    }

    fn structured(&self, content: &str) -> Result<Vec<RawItem>, String> {
        let trimmed = content.trim_start_matches('\u{feff}').trim();
        let value: Value = serde_json::from_str(trimmed).map_err(|e| e.to_string())?;

        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => ITEM_KEYS
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                })
                .ok_or_else(|| "no item array".to_string())?,
            _ => return Err("top-level value is not an object or array".to_string()),
        };

        Ok(items
            .into_iter()
            .filter(Value::is_object)
            .map(RawItem::Json)
            .collect())
    }

    /// Scan the item array object by object so one damaged item, or a
    /// truncated tail, does not lose the rest.
    fn regex(&self, content: &str) -> Vec<RawItem> {
        let Some(found) = ITEMS_ARRAY.find(content) else {
            return Vec::new();
        };

        balanced_objects(&content[found.end()..])
            .into_iter()
            .filter_map(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(Value::is_object)
            .map(RawItem::Json)
            .collect()
    }

    fn manual(&self, content: &str) -> Vec<RawItem> {
        let starts: Vec<usize> = ID_KEY.find_iter(content).map(|m| m.start()).collect();

        let mut items = Vec::new();
        for (i, &start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(content.len());
            let chunk = &content[start..end];

            let mut object = Map::new();
            if let Some(caps) = NUMERIC_ID.captures(chunk) {
                object.insert("id".to_string(), Value::String(caps[1].to_string()));
            }
            for caps in STRING_PAIR.captures_iter(chunk) {
                let key = caps[1].to_string();
                if object.contains_key(&key) {
                    continue;
                }
                object.insert(key, Value::String(unescape(&caps[2])));
            }

            if SALVAGE_KEYS.iter().any(|key| object.contains_key(*key)) {
                items.push(RawItem::Json(Value::Object(object)));
            }
        }
        items
    }
}

/// Top-level `{…}` spans inside an array body, ignoring braces in strings.
/// Stops at the array's closing bracket or at an unterminated object.
fn balanced_objects(body: &str) -> Vec<&str> {
    let mut objects = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        objects.push(&body[s..=i]);
                    }
                }
            }
            ']' if depth == 0 => break,
            _ => {}
        }
    }
    objects
}

fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or_else(|_| raw.replace("\\\"", "\""))
}
