use super::extract::{manual_blocks, regex_blocks};
use super::normalize::repair;
use super::xml::{parse_document, Element};
use super::{FeedFormat, FeedParser, RawItem};

/// Atom 1.0 and 0.3, including documents that prefix every element (`atom:feed`).
pub struct AtomParser;

impl FeedParser for AtomParser {
    fn name(&self) -> &'static str {
        "atom"
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Atom
    }

    fn can_parse(&self, content: &str) -> bool {
        let lower = content.to_ascii_lowercase();
        lower.contains("<feed") || lower.contains("<entry") || lower.contains("<atom:feed")
    }

    fn structured(&self, content: &str) -> Result<Vec<RawItem>, String> {
        let document = parse_document(&repair(content)).map_err(|e| e.to_string())?;

        let mut feed = document.find_local("feed").unwrap_or(&document).clone();
        if let Some(prefix) = feed.prefix().map(str::to_string) {
            feed.strip_prefix(&prefix);
        }

        let entries: Vec<Element> = {
            let direct: Vec<_> = feed.children_named("entry").cloned().collect();
            if direct.is_empty() {
                feed.descendants_local("entry").into_iter().cloned().collect()
            } else {
                direct
            }
        };

        Ok(entries.into_iter().map(RawItem::Atom).collect())
    }

    fn regex(&self, content: &str) -> Vec<RawItem> {
        regex_blocks(content, "entry").into_iter().map(RawItem::Atom).collect()
    }

    fn manual(&self, content: &str) -> Vec<RawItem> {
        manual_blocks(content, "entry").into_iter().map(RawItem::Atom).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Strategy;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example</title>
  <entry>
    <title>Entry one</title>
    <link rel="alternate" href="https://example.com/1"/>
    <id>urn:uuid:1</id>
    <updated>2024-01-01T10:00:00Z</updated>
    <content type="html">&lt;p&gt;Hi&lt;/p&gt;</content>
  </entry>
  <entry>
    <title>Entry two</title>
    <id>urn:uuid:2</id>
  </entry>
</feed>"#;

    #[test]
    fn test_structured_entries() {
        let parsed = AtomParser.parse(SAMPLE).unwrap();
        assert_eq!(parsed.strategy, Strategy::Structured);
        assert_eq!(parsed.items.len(), 2);

        let first = parsed.items[0].element().unwrap();
        assert_eq!(first.child("id").unwrap().text(), "urn:uuid:1");
        assert_eq!(first.child("link").unwrap().attr("href"), Some("https://example.com/1"));
        assert_eq!(first.child("content").unwrap().text(), "<p>Hi</p>");
    }

    #[test]
    fn test_prefixed_document() {
        let content = r#"<atom:feed xmlns:atom="http://www.w3.org/2005/Atom">
            <atom:entry><atom:title>P</atom:title><atom:id>p-1</atom:id></atom:entry>
        </atom:feed>"#;
        let parsed = AtomParser.parse(content).unwrap();
        assert_eq!(parsed.strategy, Strategy::Structured);
        let entry = parsed.items[0].element().unwrap();
        assert_eq!(entry.child("title").unwrap().text(), "P");
        assert_eq!(entry.child("id").unwrap().text(), "p-1");
    }

    #[test]
    fn test_bare_entry_fragment_is_wrapped() {
        let parsed = AtomParser.parse("<entry><title>Bare</title></entry>").unwrap();
        assert_eq!(parsed.strategy, Strategy::Structured);
        assert_eq!(parsed.items.len(), 1);
    }

    #[test]
    fn test_regex_fallback() {
        let content = "<feed><entry><title>R</title><id>r</id></entry></feed><!-- x";
        let parsed = AtomParser.parse(content).unwrap();
        assert_eq!(parsed.strategy, Strategy::Regex);
    }
}
