use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub link: String,
    #[serde(rename = "type")]
    pub mime_type: Option<String>,
    pub length: Option<u64>,
}

/// Format-independent representation of one feed entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub title: String,
    pub link: String,
    pub description: String,
    pub content: String,
    pub pub_date: DateTime<Utc>,
    pub guid: String,
    pub author: Option<String>,
    pub categories: Vec<String>,
    pub enclosures: Vec<Enclosure>,
}

impl CanonicalItem {
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ItemError {
    #[error("item has an empty guid")]
    EmptyGuid,

    #[error("item hash is empty")]
    EmptyHash,

    #[error("serialized item content is empty")]
    EmptyContent,

    #[error("failed to serialize item: {0}")]
    Serialization(String),
}

/// Storage row for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedItem {
    pub item_hash: String,
    pub feed_id: i64,
    pub guid: String,
    pub pub_date: DateTime<Utc>,
    pub raw_content: String,
    pub created_at: DateTime<Utc>,
}

impl PersistedItem {
    /// Build a row, rejecting items that violate the storage invariants.
    pub fn from_canonical(
        feed_id: i64,
        item: &CanonicalItem,
        now: DateTime<Utc>,
    ) -> Result<Self, ItemError> {
        let guid = item.guid.trim();
        if guid.is_empty() {
            return Err(ItemError::EmptyGuid);
        }

        let item_hash = Self::generate_hash(feed_id, guid);
        if item_hash.is_empty() {
            return Err(ItemError::EmptyHash);
        }

        let raw_content =
            serde_json::to_string(item).map_err(|e| ItemError::Serialization(e.to_string()))?;
        if raw_content.is_empty() {
            return Err(ItemError::EmptyContent);
        }

        Ok(Self {
            item_hash,
            feed_id,
            guid: guid.to_string(),
            pub_date: item.pub_date,
            raw_content,
            created_at: now,
        })
    }

    /// Deterministic storage key derived from the natural key (feed_id, guid).
    pub fn generate_hash(feed_id: i64, guid: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(feed_id.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(guid.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn item(&self) -> serde_json::Result<CanonicalItem> {
        serde_json::from_str(&self.raw_content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CanonicalItem {
        CanonicalItem {
            title: "Hello".into(),
            link: "https://example.com/hello".into(),
            description: "desc".into(),
            content: "desc".into(),
            pub_date: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            guid: "hello-1".into(),
            author: None,
            categories: vec!["news".into()],
            enclosures: vec![],
        }
    }

    #[test]
    fn test_hash_generation_deterministic() {
        let h1 = PersistedItem::generate_hash(1, "entry-123");
        let h2 = PersistedItem::generate_hash(1, "entry-123");
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_hash_generation_different_inputs() {
        let h1 = PersistedItem::generate_hash(1, "entry-123");
        let h2 = PersistedItem::generate_hash(1, "entry-456");
        let h3 = PersistedItem::generate_hash(2, "entry-123");
        assert_ne!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_hash_does_not_collide_on_concatenation() {
        assert_ne!(
            PersistedItem::generate_hash(1, "1x"),
            PersistedItem::generate_hash(11, "x")
        );
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = PersistedItem::generate_hash(1, "entry-123");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_from_canonical_round_trips_content() {
        let item = sample();
        let row = PersistedItem::from_canonical(7, &item, Utc::now()).unwrap();
        assert_eq!(row.guid, "hello-1");
        assert_eq!(row.item_hash, PersistedItem::generate_hash(7, "hello-1"));
        assert_eq!(row.item().unwrap(), item);
    }

    #[test]
    fn test_from_canonical_rejects_blank_guid() {
        let mut item = sample();
        item.guid = "   ".into();
        assert_eq!(
            PersistedItem::from_canonical(1, &item, Utc::now()),
            Err(ItemError::EmptyGuid)
        );
    }

    #[test]
    fn test_enclosure_serializes_type_key() {
        let enclosure = Enclosure {
            link: "https://example.com/a.mp3".into(),
            mime_type: Some("audio/mpeg".into()),
            length: Some(42),
        };
        let json = serde_json::to_string(&enclosure).unwrap();
        assert!(json.contains("\"type\":\"audio/mpeg\""));
    }

    #[test]
    fn test_display_title_without_title() {
        let mut item = sample();
        item.title.clear();
        assert_eq!(item.display_title(), "(Untitled)");
    }
}
