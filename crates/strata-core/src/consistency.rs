//! Consistency tokens: how fresh the cloud mirror is, per table.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, poison_err};
use crate::id::TableId;

/// Watermark describing mirror freshness for one table.
///
/// `high_watermark_ts` is the latest commit timestamp known to be fully
/// verified and visible in the mirror. It never moves backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyToken {
    /// Latest verified commit timestamp.
    pub high_watermark_ts: DateTime<Utc>,
    /// Sequence number of the last snapshot applied to the mirror.
    pub last_applied_sequence: u64,
    /// Version of the inventory index used when the token was produced.
    pub inventory_version: String,
}

impl ConsistencyToken {
    /// Creates a token.
    #[must_use]
    pub fn new(
        high_watermark_ts: DateTime<Utc>,
        last_applied_sequence: u64,
        inventory_version: impl Into<String>,
    ) -> Self {
        Self {
            high_watermark_ts,
            last_applied_sequence,
            inventory_version: inventory_version.into(),
        }
    }

    /// Returns true if saving `self` over `stored` would move the watermark
    /// backwards: an earlier timestamp, or the same timestamp with a lower
    /// applied sequence.
    #[must_use]
    pub fn is_older_than(&self, stored: &Self) -> bool {
        self.high_watermark_ts < stored.high_watermark_ts
            || (self.high_watermark_ts == stored.high_watermark_ts
                && self.last_applied_sequence < stored.last_applied_sequence)
    }
}

/// Storage for consistency tokens.
#[async_trait]
pub trait ConsistencyStore: Send + Sync {
    /// Loads the token for `table`, if one was ever saved.
    async fn load(&self, table: &TableId) -> Result<Option<ConsistencyToken>>;

    /// Saves the token for `table`, replacing the previous one.
    async fn save(&self, table: &TableId, token: ConsistencyToken) -> Result<()>;

    /// Saves `token` unless the stored token is newer, as one atomic step.
    ///
    /// Returns the token in effect afterwards. Concurrent callers never
    /// overwrite a newer watermark with an older one.
    async fn save_if_newer(
        &self,
        table: &TableId,
        token: ConsistencyToken,
    ) -> Result<ConsistencyToken>;
}

/// In-memory [`ConsistencyStore`].
#[derive(Debug, Default)]
pub struct InMemoryConsistencyStore {
    tokens: RwLock<HashMap<TableId, ConsistencyToken>>,
}

impl InMemoryConsistencyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsistencyStore for InMemoryConsistencyStore {
    async fn load(&self, table: &TableId) -> Result<Option<ConsistencyToken>> {
        let tokens = self.tokens.read().map_err(poison_err)?;
        Ok(tokens.get(table).cloned())
    }

    async fn save(&self, table: &TableId, token: ConsistencyToken) -> Result<()> {
        let mut tokens = self.tokens.write().map_err(poison_err)?;
        tokens.insert(table.clone(), token);
        Ok(())
    }

    async fn save_if_newer(
        &self,
        table: &TableId,
        token: ConsistencyToken,
    ) -> Result<ConsistencyToken> {
        let mut tokens = self.tokens.write().map_err(poison_err)?;
        if let Some(stored) = tokens.get(table) {
            if token.is_older_than(stored) {
                return Ok(stored.clone());
            }
        }
        tokens.insert(table.clone(), token.clone());
        Ok(token)
    }
}
