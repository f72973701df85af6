use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use memberwatch_store::{KeyValueStore, KeyValueStoreExt, Scope};
use tracing::debug;

use crate::{resource::ResourceType, Result};

/// How far back a poll may ever look. Bounds the result volume of the
/// first cycle after a long downtime.
pub fn lookback_window() -> Duration {
    Duration::hours(24)
}

/// Tracks the last-processed timestamp per feed, persisted in the
/// local scope as RFC 3339 strings.
pub struct CheckpointTracker {
    store: Arc<dyn KeyValueStore>,
}

impl CheckpointTracker {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stored checkpoint for a feed; 24 hours ago on first access or
    /// when the stored value is unreadable.
    pub fn checkpoint(&self, resource: ResourceType, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let raw: Option<String> = self
            .store
            .get_json(Scope::Local, resource.storage_key())?;
        let fallback = now - lookback_window();
        let checkpoint = raw
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or(fallback);
        Ok(checkpoint)
    }

    /// Advance a feed's checkpoint. Persisted immediately; regressions
    /// are ignored so the value stays monotonically non-decreasing.
    pub fn set_checkpoint(&self, resource: ResourceType, ts: DateTime<Utc>) -> Result<()> {
        let current: Option<String> = self
            .store
            .get_json(Scope::Local, resource.storage_key())?;
        if let Some(current) = current
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        {
            if ts < current {
                debug!(resource = %resource, "Ignoring checkpoint regression");
                return Ok(());
            }
        }
        self.store
            .set_json(Scope::Local, resource.storage_key(), &ts.to_rfc3339())?;
        Ok(())
    }

    /// The effective since-filter for a poll: the stored checkpoint,
    /// clamped to no older than 24 hours ago.
    pub fn effective_since(
        &self,
        resource: ResourceType,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        let checkpoint = self.checkpoint(resource, now)?;
        Ok(checkpoint.max(now - lookback_window()))
    }
}
