//! RSS 1.0 / RDF.
//!
//! Item bodies are keyed by `rdf:about`. When the channel carries an
//! `rdf:Seq`, its `rdf:li/@rdf:resource` list decides the order; items the
//! sequence never references keep their document order after the sequenced
//! ones.

use once_cell::sync::Lazy;
use regex::Regex;

use super::extract::{manual_blocks, regex_blocks};
use super::normalize::repair;
use super::xml::{parse_document, Element};
use super::{FeedFormat, FeedParser, RawItem};

static SEQ_RESOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<rdf:li\b[^>]*?\bresource\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("valid rdf:li regex")
});

pub struct RdfParser;

impl FeedParser for RdfParser {
    fn name(&self) -> &'static str {
        "rdf"
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Rdf
    }

    fn can_parse(&self, content: &str) -> bool {
        let lower = content.to_ascii_lowercase();
        lower.contains("<rdf:rdf") || lower.contains(super::detect::RDF_NS)
    }

    fn structured(&self, content: &str) -> Result<Vec<RawItem>, String> {
        let document = parse_document(&repair(content)).map_err(|e| e.to_string())?;

        let items: Vec<Element> = document
            .descendants_local("item")
            .into_iter()
            .filter(|e| e.prefix().is_none() || e.prefix() == Some("rss"))
            .cloned()
            .collect();

        let sequence: Vec<String> = document
            .find_local("Seq")
            .map(|seq| {
                seq.children()
                    .filter(|li| li.is_local("li"))
                    .filter_map(|li| li.attr("rdf:resource"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(finish(order_by_sequence(items, &sequence)))
    }

    fn regex(&self, content: &str) -> Vec<RawItem> {
        let sequence: Vec<String> = SEQ_RESOURCE
            .captures_iter(content)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str().to_string())
            .collect();
        finish(order_by_sequence(regex_blocks(content, "item"), &sequence))
    }

    fn manual(&self, content: &str) -> Vec<RawItem> {
        finish(manual_blocks(content, "item"))
    }
}

/// Reorder `items` to follow `sequence`. An empty sequence keeps document order.
pub fn order_by_sequence(items: Vec<Element>, sequence: &[String]) -> Vec<Element> {
    if sequence.is_empty() {
        return items;
    }

    let mut slots: Vec<Option<Element>> = items.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());

    for resource in sequence {
        let exact = slots.iter().position(|slot| {
            slot.as_ref()
                .and_then(|item| item.attr("rdf:about"))
                .is_some_and(|about| about == resource)
        });
        let index = exact.or_else(|| {
            let needle = without_scheme(resource);
            if needle.is_empty() {
                return None;
            }
            slots.iter().position(|slot| {
                slot.as_ref()
                    .and_then(|item| item.attr("rdf:about"))
                    .is_some_and(|about| about.contains(needle))
            })
        });
        if let Some(item) = index.and_then(|i| slots[i].take()) {
            ordered.push(item);
        }
    }

    ordered.extend(slots.into_iter().flatten());
    ordered
}

fn without_scheme(uri: &str) -> &str {
    uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri)
}

/// Drop items with neither a title nor a description.
fn finish(items: Vec<Element>) -> Vec<RawItem> {
    items
        .into_iter()
        .filter(|item| {
            ["title", "description"].iter().any(|name| {
                item.children()
                    .any(|c| c.is_local(name) && !c.value().is_empty())
            })
        })
        .map(RawItem::Rdf)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Strategy;

    const SEQUENCED: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/">
  <channel rdf:about="https://example.com/">
    <title>Seq</title>
    <items>
      <rdf:Seq>
        <rdf:li rdf:resource="https://example.com/c"/>
        <rdf:li rdf:resource="https://example.com/a"/>
        <rdf:li rdf:resource="https://example.com/b"/>
      </rdf:Seq>
    </items>
  </channel>
  <item rdf:about="https://example.com/a"><title>A</title><link>https://example.com/a</link></item>
  <item rdf:about="https://example.com/b"><title>B</title><link>https://example.com/b</link></item>
  <item rdf:about="https://example.com/c"><title>C</title><link>https://example.com/c</link></item>
</rdf:RDF>"#;

    fn titles(items: &[RawItem]) -> Vec<String> {
        items
            .iter()
            .map(|i| i.element().unwrap().child("title").unwrap().text())
            .collect()
    }

    #[test]
    fn test_sequence_order_wins_over_document_order() {
        let parsed = RdfParser.parse(SEQUENCED).unwrap();
        assert_eq!(parsed.strategy, Strategy::Structured);
        assert_eq!(titles(&parsed.items), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_regex_strategy_also_follows_sequence() {
        let broken = format!("{}<!-- unterminated", SEQUENCED);
        let parsed = RdfParser.parse(&broken).unwrap();
        assert_eq!(parsed.strategy, Strategy::Regex);
        assert_eq!(titles(&parsed.items), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_no_sequence_uses_document_order() {
        let content = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <item rdf:about="x:2"><title>Two</title></item>
            <item rdf:about="x:1"><title>One</title></item>
        </rdf:RDF>"#;
        let parsed = RdfParser.parse(content).unwrap();
        assert_eq!(titles(&parsed.items), vec!["Two", "One"]);
    }

    #[test]
    fn test_substring_match_without_scheme() {
        let items = vec![
            Element::new("item").with_attr("rdf:about", "https://example.com/post?id=1"),
            Element::new("item").with_attr("rdf:about", "http://example.com/other"),
        ];
        let sequence = vec!["http://example.com/post?id=1".to_string()];
        let ordered = order_by_sequence(items, &sequence);
        assert_eq!(ordered[0].attr("rdf:about"), Some("https://example.com/post?id=1"));
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn test_unreferenced_items_are_appended() {
        let items = vec![
            Element::new("item").with_attr("rdf:about", "u:1"),
            Element::new("item").with_attr("rdf:about", "u:2"),
            Element::new("item").with_attr("rdf:about", "u:3"),
        ];
        let sequence = vec!["u:3".to_string(), "u:missing".to_string()];
        let ordered: Vec<_> = order_by_sequence(items, &sequence)
            .iter()
            .map(|e| e.attr("rdf:about").unwrap().to_string())
            .collect();
        assert_eq!(ordered, vec!["u:3", "u:1", "u:2"]);
    }

    #[test]
    fn test_items_without_title_or_description_are_discarded() {
        let content = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
            <item rdf:about="x:1"><link>https://example.com/1</link></item>
            <item rdf:about="x:2"><description>Kept</description></item>
        </rdf:RDF>"#;
        let parsed = RdfParser.parse(content).unwrap();
        assert_eq!(parsed.items.len(), 1);
    }
}
