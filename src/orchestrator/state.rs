//! Persistent cycle state
//!
//! Tracks when the expensive refresh steps last ran, persisted so a process
//! restart does not immediately re-trigger them. Mutated only by the
//! orchestrator, on the background worker.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

use crate::error::Result;

/// Timestamps of the last expensive refresh steps
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleState {
    pub last_trend_scan: Option<DateTime<Utc>>,
    pub last_content_creation: Option<DateTime<Utc>>,
}

impl CycleState {
    /// Load persisted state; a missing file yields the never-ran default
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No cycle state file, starting fresh");
            return Ok(Self::default());
        }

        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Save atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Whether a trend refresh is due
    pub fn trend_scan_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_trend_scan {
            None => true,
            Some(last) => now - last > interval,
        }
    }

    /// Whether a content generation pass is due
    pub fn content_creation_due(&self, now: DateTime<Utc>, interval: Duration) -> bool {
        match self.last_content_creation {
            None => true,
            Some(last) => now - last > interval,
        }
    }
}
