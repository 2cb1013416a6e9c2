//! Optional human approval checkpoint before dispatch
//!
//! When human review is enabled, every (content, time, platform) assignment
//! passes through an [`ApprovalGate`] before the post is scheduled. A
//! rejection is normal control flow: the content item stays unused and is
//! re-offered in a later cycle.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

use crate::models::{ContentItem, Platform};

/// Synchronous yes/no checkpoint for a proposed post
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Present the assignment and block for a decision.
    ///
    /// `Ok(false)` is a rejection; errors are treated as rejections by the
    /// caller and never abort the cycle.
    async fn review(
        &self,
        platform: Platform,
        item: &ContentItem,
        scheduled_time: DateTime<Utc>,
    ) -> io::Result<bool>;
}

/// Gate used when human review is disabled: approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn review(
        &self,
        _platform: Platform,
        _item: &ContentItem,
        _scheduled_time: DateTime<Utc>,
    ) -> io::Result<bool> {
        Ok(true)
    }
}

/// Interactive gate that prompts on stdout and reads y/n from stdin
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleGate;

#[async_trait]
impl ApprovalGate for ConsoleGate {
    async fn review(
        &self,
        platform: Platform,
        item: &ContentItem,
        scheduled_time: DateTime<Utc>,
    ) -> io::Result<bool> {
        let preview = item.preview(240);
        let prompt = format!(
            "\n{divider}\nCONTENT REVIEW FOR {platform} - scheduled for {scheduled_time}\n{divider}\n{preview}\n\nApprove this content? (y/n): ",
            divider = "=".repeat(60),
            platform = platform.as_str().to_uppercase(),
        );

        // Stdin is blocking; keep it off the async worker.
        let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
            let mut stdout = io::stdout().lock();
            stdout.write_all(prompt.as_bytes())?;
            stdout.flush()?;

            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            Ok(line)
        })
        .await
        .map_err(|e| io::Error::other(format!("approval task failed: {e}")))??;

        let approved = matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        if approved {
            info!(platform = %platform, id = %item.id, "Content approved");
        } else {
            warn!(platform = %platform, id = %item.id, "Content rejected by reviewer");
        }
        Ok(approved)
    }
}
