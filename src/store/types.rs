//! Record types and their timestamp encoding.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a content pointer refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerRole {
    Original,
    Thumbnail,
    Derived,
}

/// Reference to a blob held by the external object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentPointer {
    pub role: PointerRole,
    pub location: String,
}

impl ContentPointer {
    pub fn original(location: impl Into<String>) -> Self {
        Self {
            role: PointerRole::Original,
            location: location.into(),
        }
    }

    pub fn thumbnail(location: impl Into<String>) -> Self {
        Self {
            role: PointerRole::Thumbnail,
            location: location.into(),
        }
    }
}

/// One managed metadata entry, e.g. a photo.
///
/// `name` is the collision key: at most one present record per owner holds
/// a given name. `created_at` comes from the content (capture time) and is
/// never changed once set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub content_pointers: Vec<ContentPointer>,
    pub created_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
    pub size: u64,
    pub media_type: String,
}

impl Record {
    /// Creates a record with a fresh id, ingested now.
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        size: u64,
        media_type: impl Into<String>,
        content_pointers: Vec<ContentPointer>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            content_pointers,
            created_at: None,
            ingested_at: Utc::now(),
            size,
            media_type: media_type.into(),
        }
    }

    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// The fields a caller needs to decide between overwrite and skip.
    pub fn summary(&self) -> CollisionSummary {
        CollisionSummary {
            id: self.id.clone(),
            size: self.size,
            created_at: self.created_at,
            ingested_at: self.ingested_at,
        }
    }
}

/// Existing record behind a name collision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionSummary {
    pub id: String,
    pub size: u64,
    pub created_at: Option<DateTime<Utc>>,
    pub ingested_at: DateTime<Utc>,
}

/// Fixed-width RFC 3339 with nanoseconds, so text order is time order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc))
}
