//! Persistent pool of generated content awaiting scheduling
//!
//! The pool is one JSON document keyed by platform, each value an
//! insertion-ordered list of content items. The pipeline loads it at the
//! start of a cycle, mutates it in memory, and saves the whole document back
//! (temp file + atomic rename).
//!
//! Concurrency contract: single writer. Only the background worker thread
//! may load-mutate-save the pool; external mutation of the file while the
//! worker is running is undefined behavior.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{ContentItem, Platform};

/// Errors from content pool operations
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("content item '{id}' not found for {platform}")]
    ItemNotFound { id: String, platform: Platform },

    #[error("content item '{id}' is already marked used")]
    AlreadyUsed { id: String },

    #[error("pool I/O error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("pool serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PoolError {
    fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Whether a later cycle may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Per-platform queue of content items, insertion order preserved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentPool {
    items: BTreeMap<Platform, Vec<ContentItem>>,
}

impl ContentPool {
    /// Empty pool with an entry for each given platform
    pub fn for_platforms(platforms: &[Platform]) -> Self {
        let mut items = BTreeMap::new();
        for &platform in platforms {
            items.entry(platform).or_insert_with(Vec::new);
        }
        Self { items }
    }

    /// Load the pool document; a missing file yields an empty pool
    pub fn load(path: &Path, platforms: &[Platform]) -> Result<Self, PoolError> {
        if !path.exists() {
            debug!(path = %path.display(), "No content pool file, starting empty");
            return Ok(Self::for_platforms(platforms));
        }

        let file = File::open(path).map_err(|e| PoolError::io("open", e))?;
        let mut pool: Self = serde_json::from_reader(BufReader::new(file))?;

        // Platforms added to the config after the file was written
        for &platform in platforms {
            pool.items.entry(platform).or_default();
        }

        Ok(pool)
    }

    /// Save the whole document atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<(), PoolError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PoolError::io("create_dir", e))?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp).map_err(|e| PoolError::io("create", e))?;
            serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        }
        fs::rename(&tmp, path).map_err(|e| PoolError::io("rename", e))?;

        debug!(path = %path.display(), items = self.len(), "Content pool saved");
        Ok(())
    }

    /// Append a fresh item; returns false when an identical payload is
    /// already pooled for the platform (the duplicate is skipped).
    pub fn add_item(&mut self, item: ContentItem) -> bool {
        let platform = item.platform;
        let fingerprint = item.fingerprint();
        let entries = self.items.entry(platform).or_default();

        if entries.iter().any(|e| e.fingerprint() == fingerprint) {
            warn!(
                platform = %platform,
                id = %item.id,
                "Skipping duplicate content payload"
            );
            return false;
        }

        info!(platform = %platform, id = %item.id, "Content added to pool");
        entries.push(item);
        true
    }

    /// Unused items for a platform, in insertion order
    pub fn get_unused(&self, platform: Platform) -> Vec<&ContentItem> {
        self.items
            .get(&platform)
            .map(|items| items.iter().filter(|i| !i.used).collect())
            .unwrap_or_default()
    }

    /// Number of unused items for a platform
    pub fn unused_count(&self, platform: Platform) -> usize {
        self.get_unused(platform).len()
    }

    /// Mark an item used and record its scheduled time.
    ///
    /// This is the only mutator of the `used` flag, and it is called strictly
    /// after a successful scheduling decision. Marking twice is an error.
    pub fn mark_used(
        &mut self,
        item_id: &str,
        platform: Platform,
        scheduled_time: DateTime<Utc>,
    ) -> Result<(), PoolError> {
        let item = self
            .items
            .get_mut(&platform)
            .and_then(|items| items.iter_mut().find(|i| i.id == item_id))
            .ok_or_else(|| PoolError::ItemNotFound {
                id: item_id.to_string(),
                platform,
            })?;

        if item.used {
            return Err(PoolError::AlreadyUsed {
                id: item_id.to_string(),
            });
        }

        item.used = true;
        item.scheduled_time = Some(scheduled_time);
        debug!(platform = %platform, id = %item_id, scheduled = %scheduled_time, "Content marked used");
        Ok(())
    }

    /// Total item count across platforms
    pub fn len(&self) -> usize {
        self.items.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Platforms present in the pool
    pub fn platforms(&self) -> impl Iterator<Item = Platform> + '_ {
        self.items.keys().copied()
    }
}
