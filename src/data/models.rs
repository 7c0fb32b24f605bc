//! Data models
//!
//! Rust structs representing database entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An object delivered to the inbox
///
/// Keyed by `(url, authenticated_id)`: the same URL may be deposited by
/// several identities, each row recording who vouched for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObject {
    /// The object's own URL (its `id`)
    pub url: String,
    /// `keyId` of the verified signature that delivered it
    pub authenticated_id: String,
    /// The delivered JSON document, stored as-is
    pub content: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

/// Raw `objects` row; `content` is JSON text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ObjectRow {
    pub url: String,
    pub authenticated_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl TryFrom<ObjectRow> for StoredObject {
    type Error = serde_json::Error;

    fn try_from(row: ObjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            content: serde_json::from_str(&row.content)?,
            url: row.url,
            authenticated_id: row.authenticated_id,
            received_at: row.received_at,
        })
    }
}
