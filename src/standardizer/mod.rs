//! Maps raw items of every format onto [`CanonicalItem`].

pub mod dates;
pub mod fields;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::app::observer::{Event, Level, Observer};
use crate::domain::CanonicalItem;
use crate::parser::RawItem;

pub use dates::parse_date;
pub use fields::{resolve, table_for, FieldTable, Source};

const COMPONENT: &str = "standardizer";

pub struct ItemStandardizer {
    observer: Arc<dyn Observer>,
}

impl ItemStandardizer {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    pub fn standardize(&self, items: &[RawItem]) -> Vec<CanonicalItem> {
        self.standardize_at(items, Utc::now())
    }

    /// Standardize with `now` as the fallback publication date.
    pub fn standardize_at(&self, items: &[RawItem], now: DateTime<Utc>) -> Vec<CanonicalItem> {
        let mut undated = 0usize;
        let canonical: Vec<CanonicalItem> = items
            .iter()
            .filter_map(|raw| {
                let (item, dated) = standardize_item(raw, now)?;
                if !dated {
                    undated += 1;
                }
                Some(item)
            })
            .collect();

        let dropped = items.len() - canonical.len();
        if dropped > 0 || undated > 0 {
            self.observer.record(
                Event::new(Level::Debug, COMPONENT, "standardized items")
                    .field("items", canonical.len())
                    .field("dropped", dropped)
                    .field("undated", undated),
            );
        }
        canonical
    }
}

/// Returns the item and whether a publication date was found, or `None`
/// for items with no title, description or link.
pub fn standardize_item(raw: &RawItem, now: DateTime<Utc>) -> Option<(CanonicalItem, bool)> {
    let table = table_for(raw.format());

    let title = resolve(raw, table.title).unwrap_or_default();
    let link = resolve(raw, table.link).unwrap_or_default();
    let description = resolve(raw, table.description).unwrap_or_default();

    if title.is_empty() && description.is_empty() && link.is_empty() {
        return None;
    }

    let content = resolve(raw, table.content).unwrap_or_else(|| description.clone());

    let parsed_date = fields::resolve_all(raw, table.dates)
        .iter()
        .find_map(|value| parse_date(value));
    let dated = parsed_date.is_some();
    let pub_date = parsed_date.unwrap_or(now);

    let guid = resolve(raw, table.guid)
        .or_else(|| (!link.is_empty()).then(|| link.clone()))
        .unwrap_or_else(|| synthetic_guid(&title, pub_date));

    let item = CanonicalItem {
        title,
        link,
        description,
        content,
        pub_date,
        guid,
        author: resolve(raw, table.author),
        categories: fields::categories(raw),
        enclosures: fields::enclosures(raw),
    };
    Some((item, dated))
}

/// Last-resort identity: `md5(title + pub_date)` with the date in RFC 3339.
pub fn synthetic_guid(title: &str, pub_date: DateTime<Utc>) -> String {
    format!("{:x}", md5::compute(format!("{}{}", title, pub_date.to_rfc3339())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::observer::{MemoryObserver, NullObserver};
    use crate::parser::{Element, ParserRegistry};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn standardizer() -> ItemStandardizer {
        ItemStandardizer::new(Arc::new(NullObserver))
    }

    #[test]
    fn test_rss_document_maps_every_item() {
        let items: String = (1..=5)
            .map(|i| {
                format!(
                    "<item><title>Item {i}</title><link>https://example.com/{i}</link>\
                     <pubDate>Mon, 0{i} Jan 2024 10:00:00 GMT</pubDate></item>"
                )
            })
            .collect();
        let doc = format!("<?xml version=\"1.0\"?><rss version=\"2.0\"><channel>{items}</channel></rss>");

        let parsed = ParserRegistry::new(Arc::new(NullObserver)).parse(&doc).unwrap();
        assert_eq!(parsed.items.len(), 5);

        let canonical = standardizer().standardize_at(&parsed.items, now());
        assert_eq!(canonical.len(), 5);
        for item in &canonical {
            assert!(!item.guid.is_empty());
            assert_ne!(item.pub_date, now());
        }
        assert_eq!(canonical[2].guid, "https://example.com/3");
    }

    #[test]
    fn test_guid_precedence() {
        let mut with_guid = Element::new("item");
        with_guid.push(Element::with_text("title", "T"));
        with_guid.push(Element::with_text("link", "https://e.com/l"));
        with_guid.push(Element::with_text("guid", "g-1"));

        let mut link_only = Element::new("item");
        link_only.push(Element::with_text("title", "T"));
        link_only.push(Element::with_text("link", "https://e.com/l"));

        let mut title_only = Element::new("item");
        title_only.push(Element::with_text("title", "T"));
        title_only.push(Element::with_text("pubDate", "2024-01-01T10:00:00Z"));

        let items = vec![
            RawItem::Rss(with_guid),
            RawItem::Rss(link_only),
            RawItem::Rss(title_only),
        ];
        let canonical = standardizer().standardize_at(&items, now());

        assert_eq!(canonical[0].guid, "g-1");
        assert_eq!(canonical[1].guid, "https://e.com/l");
        let expected = format!("{:x}", md5::compute("T2024-01-01T10:00:00+00:00"));
        assert_eq!(canonical[2].guid, expected);
    }

    #[test]
    fn test_noise_items_are_dropped() {
        let observer = MemoryObserver::new();
        let standardizer = ItemStandardizer::new(observer.clone());

        let mut empty = Element::new("item");
        empty.push(Element::with_text("category", "only"));
        let items = vec![RawItem::Rss(empty), RawItem::Json(json!({"title": "kept"}))];

        let canonical = standardizer.standardize_at(&items, now());
        assert_eq!(canonical.len(), 1);
        assert_eq!(canonical[0].title, "kept");

        let events = observer.by_component("standardizer");
        assert_eq!(events[0].get("dropped"), Some("1"));
    }

    #[test]
    fn test_unparseable_date_falls_back_to_now() {
        let item = RawItem::Json(json!({"title": "x", "date_published": "someday"}));
        let canonical = standardizer().standardize_at(&[item], now());
        assert_eq!(canonical[0].pub_date, now());
    }

    #[test]
    fn test_first_parseable_date_wins() {
        let mut element = Element::new("item");
        element.push(Element::with_text("title", "x"));
        element.push(Element::with_text("pubDate", "not a date"));
        element.push(Element::with_text("dc:date", "2023-05-05T00:00:00Z"));
        let canonical = standardizer().standardize_at(&[RawItem::Rss(element)], now());
        assert_eq!(canonical[0].pub_date, Utc.with_ymd_and_hms(2023, 5, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_content_falls_back_to_description() {
        let item = RawItem::Json(json!({"title": "x", "summary": "only summary"}));
        let canonical = standardizer().standardize_at(&[item], now());
        assert_eq!(canonical[0].description, "only summary");
        assert_eq!(canonical[0].content, "only summary");
    }

    #[test]
    fn test_escaped_angle_bracket_survives_in_title() {
        let doc = r#"<rss version="2.0"><channel>
            <item>
              <title>Why 1 &lt; 2 matters for sorting</title>
              <guid isPermaLink="false">rank&lt;42</guid>
            </item>
        </channel></rss>"#;
        let parsed = ParserRegistry::new(Arc::new(NullObserver)).parse(doc).unwrap();
        let item = &standardizer().standardize_at(&parsed.items, now())[0];

        assert_eq!(item.title, "Why 1 < 2 matters for sorting");
        assert_eq!(item.guid, "rank<42");
    }

    #[test]
    fn test_atom_entry_end_to_end() {
        let doc = r#"<feed xmlns="http://www.w3.org/2005/Atom">
            <entry>
              <title type="html">Caf&amp;eacute; &lt;b&gt;news&lt;/b&gt;</title>
              <link rel="alternate" href="https://e.com/a"/>
              <link rel="enclosure" href="https://e.com/a.mp3" type="audio/mpeg" length="10"/>
              <id>tag:e.com,2024:1</id>
              <updated>2024-02-02T02:02:02Z</updated>
              <author><name>Ann</name></author>
              <category term="x"/>
              <summary>Sum</summary>
              <content type="html">&lt;p&gt;Body&lt;/p&gt;</content>
            </entry>
        </feed>"#;
        let parsed = ParserRegistry::new(Arc::new(NullObserver)).parse(doc).unwrap();
        let item = &standardizer().standardize_at(&parsed.items, now())[0];

        assert_eq!(item.title, "Café news");
        assert_eq!(item.link, "https://e.com/a");
        assert_eq!(item.guid, "tag:e.com,2024:1");
        assert_eq!(item.author.as_deref(), Some("Ann"));
        assert_eq!(item.categories, vec!["x"]);
        assert_eq!(item.enclosures[0].link, "https://e.com/a.mp3");
        assert_eq!(item.description, "<p>Body</p>");
        assert_eq!(item.content, "<p>Body</p>");
        assert_eq!(item.pub_date, Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap());
    }
}
