use super::extract::{manual_blocks, regex_blocks};
use super::normalize::repair;
use super::xml::{parse_document, Element};
use super::{FeedFormat, FeedParser, RawItem};

/// RSS 0.9x/2.0. Also the parser of last resort for unrecognized content.
pub struct RssParser;

impl FeedParser for RssParser {
    fn name(&self) -> &'static str {
        "rss"
    }

    fn format(&self) -> FeedFormat {
        FeedFormat::Rss
    }

    fn can_parse(&self, content: &str) -> bool {
        let lower = content.to_ascii_lowercase();
        lower.contains("<rss") || lower.contains("<channel") || lower.contains("<item")
    }

    fn structured(&self, content: &str) -> Result<Vec<RawItem>, String> {
        let document = parse_document(&repair(content)).map_err(|e| e.to_string())?;
        Ok(find_items(&document)
            .into_iter()
            .cloned()
            .map(RawItem::Rss)
            .collect())
    }

    fn regex(&self, content: &str) -> Vec<RawItem> {
        regex_blocks(content, "item").into_iter().map(RawItem::Rss).collect()
    }

    fn manual(&self, content: &str) -> Vec<RawItem> {
        manual_blocks(content, "item").into_iter().map(RawItem::Rss).collect()
    }
}

/// Items under `rss/channel`, then directly under `rss`, then anywhere.
fn find_items(document: &Element) -> Vec<&Element> {
    if let Some(rss) = document.child("rss") {
        if let Some(channel) = rss.child("channel") {
            let items: Vec<_> = channel.children_named("item").collect();
            if !items.is_empty() {
                return items;
            }
        }
        let items: Vec<_> = rss.children_named("item").collect();
        if !items.is_empty() {
            return items;
        }
    }
    document
        .descendants_local("item")
        .into_iter()
        .filter(|e| e.prefix().is_none())
        .collect()
}
