//! Scheduled post records and the durable post log
//!
//! The post log is one JSON document keyed by post id, updated in place as
//! statuses advance. Statuses only move forward; the sole repeatable
//! transition is `Retrying -> Retrying` while attempts remain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::debug;

use super::DispatchError;
use crate::models::{ContentPayload, Platform};

// ============================================================================
// Post Status
// ============================================================================

/// Lifecycle state of a scheduled post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Awaiting its scheduled time (gate disabled)
    Pending,
    /// Awaiting its scheduled time, cleared by human review
    Approved,
    /// Rejected by human review; audit entry only
    Rejected,
    /// Successfully published
    Dispatched,
    /// Transient publish failure, attempts remain
    Retrying,
    /// No more attempts, or failure was permanent
    Failed,
}

impl PostStatus {
    /// Whether any further transition is allowed out of this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dispatched | Self::Failed | Self::Rejected)
    }

    /// Whether a post in this state should be executed when due
    pub fn is_actionable(self) -> bool {
        matches!(self, Self::Pending | Self::Approved | Self::Retrying)
    }

    /// Forward-only transition check
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved)
                | (Self::Pending | Self::Approved | Self::Retrying, Self::Retrying)
                | (Self::Pending | Self::Approved | Self::Retrying, Self::Dispatched)
                | (Self::Pending | Self::Approved | Self::Retrying, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Dispatched => "dispatched",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "dispatched" => Some(Self::Dispatched),
            "retrying" => Some(Self::Retrying),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Scheduled Post
// ============================================================================

/// A durable record of an assigned (content, time, platform) triple
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledPost {
    pub post_id: String,
    pub platform: Platform,

    /// Id of the pooled content item this post was built from
    pub content_ref: String,

    /// Payload snapshot, kept so a restart can still publish
    pub payload: ContentPayload,

    pub scheduled_time: DateTime<Utc>,
    pub status: PostStatus,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ScheduledPost {
    pub fn new(
        post_id: String,
        platform: Platform,
        content_ref: String,
        payload: ContentPayload,
        scheduled_time: DateTime<Utc>,
        status: PostStatus,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            post_id,
            platform,
            content_ref,
            payload,
            scheduled_time,
            status,
            attempt_count: 0,
            created_at,
            posted_at: None,
            remote_id: None,
            last_error: None,
        }
    }

    /// Advance to a new status, enforcing forward-only transitions
    pub fn advance(&mut self, next: PostStatus) -> Result<(), DispatchError> {
        if !self.status.can_advance_to(next) {
            return Err(DispatchError::InvalidTransition {
                post_id: self.post_id.clone(),
                from: self.status,
                to: next,
            });
        }
        debug!(post_id = %self.post_id, from = %self.status, to = %next, "Post status advanced");
        self.status = next;
        Ok(())
    }
}

// ============================================================================
// History Filter
// ============================================================================

/// Filters for posting-history queries
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub platform: Option<Platform>,
    pub status: Option<PostStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    fn matches(&self, post: &ScheduledPost) -> bool {
        if let Some(platform) = self.platform {
            if post.platform != platform {
                return false;
            }
        }
        if let Some(status) = self.status {
            if post.status != status {
                return false;
            }
        }
        if let Some(start) = self.start {
            if post.scheduled_time < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if post.scheduled_time > end {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Post Log
// ============================================================================

/// Durable post log, one document keyed by post id.
///
/// Same single-writer contract as the content pool: only the background
/// worker mutates the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostLog {
    posts: BTreeMap<String, ScheduledPost>,
}

impl PostLog {
    /// Load the log; a missing file yields an empty log
    pub fn load(path: &Path) -> Result<Self, DispatchError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let file = File::open(path).map_err(|e| DispatchError::io("open", e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Save the whole document atomically (temp file + rename)
    pub fn save(&self, path: &Path) -> Result<(), DispatchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| DispatchError::io("create_dir", e))?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp).map_err(|e| DispatchError::io("create", e))?;
            serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        }
        fs::rename(&tmp, path).map_err(|e| DispatchError::io("rename", e))?;
        Ok(())
    }

    pub fn get(&self, post_id: &str) -> Option<&ScheduledPost> {
        self.posts.get(post_id)
    }

    pub fn get_mut(&mut self, post_id: &str) -> Option<&mut ScheduledPost> {
        self.posts.get_mut(post_id)
    }

    pub fn contains(&self, post_id: &str) -> bool {
        self.posts.contains_key(post_id)
    }

    /// Insert a new record; duplicate post ids are rejected
    pub fn insert(&mut self, post: ScheduledPost) -> Result<(), DispatchError> {
        if self.posts.contains_key(&post.post_id) {
            return Err(DispatchError::DuplicatePostId {
                post_id: post.post_id,
            });
        }
        self.posts.insert(post.post_id.clone(), post);
        Ok(())
    }

    /// Ids of actionable posts whose scheduled time has arrived
    pub fn due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut due: Vec<&ScheduledPost> = self
            .posts
            .values()
            .filter(|p| p.status.is_actionable() && p.scheduled_time <= now)
            .collect();
        due.sort_by_key(|p| p.scheduled_time);
        due.into_iter().map(|p| p.post_id.clone()).collect()
    }

    /// Matching posts, newest scheduled time first
    pub fn history(&self, filter: &HistoryFilter) -> Vec<ScheduledPost> {
        let mut posts: Vec<ScheduledPost> = self
            .posts
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
        posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}
