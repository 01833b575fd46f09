pub mod feed;
pub mod item;
pub mod metadata;
pub mod state;

pub use feed::Feed;
pub use item::{CanonicalItem, Enclosure, ItemError, PersistedItem};
pub use metadata::{ErrorCode, FeedErrorRecord, FeedMetadata};
pub use state::{FeedState, StateError};
