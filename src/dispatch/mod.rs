//! Durable post scheduling and publish execution
//!
//! The dispatcher turns a (content, time, platform) assignment into a
//! persistent [`ScheduledPost`] and, when the scheduled time arrives,
//! executes the publish call with bounded timeouts and exponential-backoff
//! retries. Blocking in-place backoff is acceptable here: dispatch always
//! runs on the background worker, never a caller-facing thread.
//!
//! In dry-run mode every state transition happens identically but the
//! publish call is simulated and always succeeds, with zero publisher
//! invocations.

pub mod record;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::collaborators::{call_with_timeout, PlatformPublisher};
use crate::models::{generate_id, ContentPayload, Platform, PublishResult};
use crate::utils::{Clock, RetryConfig};

pub use record::{HistoryFilter, PostLog, PostStatus, ScheduledPost};

/// Errors from post dispatch operations
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("post id '{post_id}' already exists in the log")]
    DuplicatePostId { post_id: String },

    #[error("post '{post_id}' not found in the log")]
    PostNotFound { post_id: String },

    #[error("post '{post_id}': invalid status transition {from} -> {to}")]
    InvalidTransition {
        post_id: String,
        from: PostStatus,
        to: PostStatus,
    },

    #[error("post log I/O error during {operation}: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("post log serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }

    /// Whether a later tick may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Counts from one due-post processing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub examined: usize,
    pub dispatched: usize,
    pub failed: usize,
}

/// Executes scheduled posts against the platform publisher
pub struct PostDispatcher {
    log_path: PathBuf,
    publisher: Arc<dyn PlatformPublisher>,
    retry: RetryConfig,
    call_timeout: Duration,
    dry_run: bool,
    clock: Arc<dyn Clock>,
}

impl PostDispatcher {
    pub fn new(
        log_path: impl Into<PathBuf>,
        publisher: Arc<dyn PlatformPublisher>,
        retry: RetryConfig,
        call_timeout: Duration,
        dry_run: bool,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            log_path: log_path.into(),
            publisher,
            retry,
            call_timeout,
            dry_run,
            clock,
        }
    }

    /// Create a durable scheduled post.
    ///
    /// The post starts `Approved` when it already passed human review, else
    /// `Pending`. A caller-provided id (normally the content item id) must be
    /// unique across the log.
    pub fn schedule_post(
        &self,
        platform: Platform,
        content_ref: &str,
        payload: ContentPayload,
        scheduled_time: chrono::DateTime<chrono::Utc>,
        post_id: Option<String>,
        approved: bool,
    ) -> Result<ScheduledPost, DispatchError> {
        let now = self.clock.now();
        let post_id = post_id.unwrap_or_else(|| generate_id(platform, now));
        let status = if approved {
            PostStatus::Approved
        } else {
            PostStatus::Pending
        };

        let post = ScheduledPost::new(
            post_id,
            platform,
            content_ref.to_string(),
            payload,
            scheduled_time,
            status,
            now,
        );

        let mut log = PostLog::load(&self.log_path)?;
        log.insert(post.clone())?;
        log.save(&self.log_path)?;

        info!(
            post_id = %post.post_id,
            platform = %platform,
            scheduled = %scheduled_time,
            status = %post.status,
            "Post scheduled"
        );
        Ok(post)
    }

    /// Record a human-review rejection as an audit entry.
    ///
    /// The rejected content item itself is untouched and stays eligible for
    /// a later cycle.
    pub fn record_rejection(
        &self,
        platform: Platform,
        content_ref: &str,
        scheduled_time: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), DispatchError> {
        let now = self.clock.now();
        let post = ScheduledPost::new(
            generate_id(platform, now),
            platform,
            content_ref.to_string(),
            ContentPayload::Null,
            scheduled_time,
            PostStatus::Rejected,
            now,
        );

        let mut log = PostLog::load(&self.log_path)?;
        log.insert(post)?;
        log.save(&self.log_path)?;

        info!(platform = %platform, content_ref = %content_ref, "Rejection recorded");
        Ok(())
    }

    /// Execute every actionable post whose scheduled time has arrived
    pub async fn process_due(&self) -> Result<DispatchSummary, DispatchError> {
        let now = self.clock.now();
        let mut log = PostLog::load(&self.log_path)?;
        let due = log.due(now);

        let mut summary = DispatchSummary {
            examined: due.len(),
            ..Default::default()
        };

        for post_id in due {
            match self.execute_post(&mut log, &post_id).await? {
                PostStatus::Dispatched => summary.dispatched += 1,
                PostStatus::Failed => summary.failed += 1,
                other => {
                    // execute_post only terminates in a terminal state
                    warn!(post_id = %post_id, status = %other, "Unexpected non-terminal outcome");
                }
            }
        }

        if summary.examined > 0 {
            info!(
                examined = summary.examined,
                dispatched = summary.dispatched,
                failed = summary.failed,
                "Due posts processed"
            );
        }
        Ok(summary)
    }

    /// Publish immediately, bypassing slot planning.
    ///
    /// The post is recorded first, then executed with the standard retry
    /// policy. Returns the final record.
    pub async fn post_now(
        &self,
        platform: Platform,
        payload: ContentPayload,
    ) -> Result<ScheduledPost, DispatchError> {
        let now = self.clock.now();
        let post_id = generate_id(platform, now);
        let content_ref = post_id.clone();
        let post = ScheduledPost::new(
            post_id.clone(),
            platform,
            content_ref,
            payload,
            now,
            PostStatus::Pending,
            now,
        );

        let mut log = PostLog::load(&self.log_path)?;
        log.insert(post)?;
        log.save(&self.log_path)?;

        self.execute_post(&mut log, &post_id).await?;
        log.get(&post_id)
            .cloned()
            .ok_or_else(|| DispatchError::PostNotFound { post_id })
    }

    /// Posting history, newest first
    pub fn history(&self, filter: &HistoryFilter) -> Result<Vec<ScheduledPost>, DispatchError> {
        Ok(PostLog::load(&self.log_path)?.history(filter))
    }

    /// Run one post to a terminal state, persisting every transition.
    ///
    /// Transient failures increment `attempt_count` and back off in place
    /// while attempts remain (`attempt_count` never exceeds `max_retries`);
    /// permanent failures fail immediately.
    async fn execute_post(
        &self,
        log: &mut PostLog,
        post_id: &str,
    ) -> Result<PostStatus, DispatchError> {
        loop {
            let (platform, payload, attempt_count) = {
                let post = log.get(post_id).ok_or_else(|| DispatchError::PostNotFound {
                    post_id: post_id.to_string(),
                })?;
                (post.platform, post.payload.clone(), post.attempt_count)
            };

            let outcome = if self.dry_run {
                Ok(PublishResult::simulated(format!(
                    "dryrun_{}_{:08x}",
                    platform,
                    rand::random::<u32>()
                )))
            } else {
                call_with_timeout(
                    self.call_timeout,
                    "publish",
                    self.publisher.publish(platform, &payload),
                )
                .await
            };

            let post = log.get_mut(post_id).ok_or_else(|| DispatchError::PostNotFound {
                post_id: post_id.to_string(),
            })?;

            match outcome {
                Ok(result) => {
                    post.advance(PostStatus::Dispatched)?;
                    post.remote_id = result.remote_id;
                    post.posted_at = Some(self.clock.now());
                    log.save(&self.log_path)?;

                    info!(post_id = %post_id, platform = %platform, dry_run = self.dry_run, "Post dispatched");
                    return Ok(PostStatus::Dispatched);
                }

                Err(e) if e.is_transient() && attempt_count < self.retry.max_retries => {
                    post.attempt_count += 1;
                    post.last_error = Some(e.to_string());
                    post.advance(PostStatus::Retrying)?;
                    let delay = self.retry.calculate_delay(post.attempt_count);
                    log.save(&self.log_path)?;

                    warn!(
                        post_id = %post_id,
                        attempt = attempt_count + 1,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Transient publish failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }

                Err(e) => {
                    post.last_error = Some(e.to_string());
                    post.advance(PostStatus::Failed)?;
                    log.save(&self.log_path)?;

                    error!(
                        post_id = %post_id,
                        platform = %platform,
                        transient = e.is_transient(),
                        error = %e,
                        "Post failed"
                    );
                    return Ok(PostStatus::Failed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExternalError;
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    struct MockPublisher {
        responses: Mutex<VecDeque<Result<PublishResult, ExternalError>>>,
        calls: AtomicU32,
    }

    impl MockPublisher {
        fn with_responses(
            responses: Vec<Result<PublishResult, ExternalError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlatformPublisher for MockPublisher {
        async fn publish(
            &self,
            _platform: Platform,
            _payload: &ContentPayload,
        ) -> Result<PublishResult, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PublishResult::live("mock_default")))
        }
    }

    fn setup(
        publisher: Arc<MockPublisher>,
        dry_run: bool,
    ) -> (tempfile::TempDir, PostDispatcher, Arc<ManualClock>) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
        ));
        let dispatcher = PostDispatcher::new(
            dir.path().join("post_log.json"),
            publisher,
            RetryConfig::with_delays(3, 1, 5),
            Duration::from_secs(5),
            dry_run,
            clock.clone(),
        );
        (dir, dispatcher, clock)
    }

    fn schedule_due(dispatcher: &PostDispatcher, clock: &ManualClock) -> ScheduledPost {
        dispatcher
            .schedule_post(
                Platform::Twitter,
                "content_1",
                json!({"text": "hello"}),
                clock.now() - ChronoDuration::minutes(1),
                Some("post_1".to_string()),
                false,
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_dry_run_dispatches_without_publisher_calls() {
        let publisher = MockPublisher::with_responses(vec![]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), true);

        schedule_due(&dispatcher, &clock);
        let summary = dispatcher.process_due().await.unwrap();

        assert_eq!(summary.dispatched, 1);
        assert_eq!(publisher.call_count(), 0);

        let history = dispatcher.history(&HistoryFilter::default()).unwrap();
        assert_eq!(history[0].status, PostStatus::Dispatched);
        assert!(history[0].remote_id.as_deref().unwrap().starts_with("dryrun_"));
    }

    #[tokio::test]
    async fn test_success_marks_dispatched_with_remote_id() {
        let publisher =
            MockPublisher::with_responses(vec![Ok(PublishResult::live("tw_123"))]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), false);

        schedule_due(&dispatcher, &clock);
        dispatcher.process_due().await.unwrap();

        let history = dispatcher.history(&HistoryFilter::default()).unwrap();
        assert_eq!(history[0].status, PostStatus::Dispatched);
        assert_eq!(history[0].remote_id.as_deref(), Some("tw_123"));
        assert!(history[0].posted_at.is_some());
        assert_eq!(publisher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retries_then_succeeds() {
        let publisher = MockPublisher::with_responses(vec![
            Err(ExternalError::transient("rate limit")),
            Err(ExternalError::transient("rate limit")),
            Ok(PublishResult::live("tw_456")),
        ]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), false);

        schedule_due(&dispatcher, &clock);
        let summary = dispatcher.process_due().await.unwrap();

        assert_eq!(summary.dispatched, 1);
        assert_eq!(publisher.call_count(), 3);

        let history = dispatcher.history(&HistoryFilter::default()).unwrap();
        assert_eq!(history[0].status, PostStatus::Dispatched);
        assert_eq!(history[0].attempt_count, 2);
    }

    #[tokio::test]
    async fn test_transient_exhaustion_fails_at_max_retries() {
        let publisher = MockPublisher::with_responses(vec![
            Err(ExternalError::transient("down")),
            Err(ExternalError::transient("down")),
            Err(ExternalError::transient("down")),
            Err(ExternalError::transient("down")),
        ]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), false);

        schedule_due(&dispatcher, &clock);
        let summary = dispatcher.process_due().await.unwrap();

        assert_eq!(summary.failed, 1);
        // Initial attempt plus max_retries retries
        assert_eq!(publisher.call_count(), 4);

        let history = dispatcher.history(&HistoryFilter::default()).unwrap();
        assert_eq!(history[0].status, PostStatus::Failed);
        assert_eq!(history[0].attempt_count, 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_does_not_retry() {
        let publisher = MockPublisher::with_responses(vec![Err(ExternalError::permanent(
            "payload rejected",
        ))]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), false);

        schedule_due(&dispatcher, &clock);
        let summary = dispatcher.process_due().await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(publisher.call_count(), 1);

        let history = dispatcher.history(&HistoryFilter::default()).unwrap();
        assert_eq!(history[0].status, PostStatus::Failed);
        assert_eq!(history[0].attempt_count, 0);
        assert!(history[0].last_error.as_deref().unwrap().contains("rejected"));
    }

    #[tokio::test]
    async fn test_future_posts_left_pending() {
        let publisher = MockPublisher::with_responses(vec![]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), false);

        dispatcher
            .schedule_post(
                Platform::Twitter,
                "content_1",
                json!({"text": "later"}),
                clock.now() + ChronoDuration::hours(2),
                None,
                false,
            )
            .unwrap();

        let summary = dispatcher.process_due().await.unwrap();
        assert_eq!(summary.examined, 0);
        assert_eq!(publisher.call_count(), 0);

        // Advance past the scheduled time and it becomes due
        clock.advance(ChronoDuration::hours(3));
        let summary = dispatcher.process_due().await.unwrap();
        assert_eq!(summary.dispatched, 1);
    }

    #[tokio::test]
    async fn test_post_now_executes_immediately() {
        let publisher =
            MockPublisher::with_responses(vec![Ok(PublishResult::live("tw_now"))]);
        let (_dir, dispatcher, _clock) = setup(publisher.clone(), false);

        let post = dispatcher
            .post_now(Platform::Twitter, json!({"text": "breaking"}))
            .await
            .unwrap();

        assert_eq!(post.status, PostStatus::Dispatched);
        assert_eq!(post.remote_id.as_deref(), Some("tw_now"));
        assert_eq!(publisher.call_count(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_post_id_rejected() {
        let publisher = MockPublisher::with_responses(vec![]);
        let (_dir, dispatcher, clock) = setup(publisher, false);

        schedule_due(&dispatcher, &clock);
        let err = dispatcher
            .schedule_post(
                Platform::Twitter,
                "content_2",
                json!({"text": "again"}),
                clock.now(),
                Some("post_1".to_string()),
                false,
            )
            .unwrap_err();

        assert!(matches!(err, DispatchError::DuplicatePostId { .. }));
    }

    #[tokio::test]
    async fn test_rejection_recorded_as_audit_entry() {
        let publisher = MockPublisher::with_responses(vec![]);
        let (_dir, dispatcher, clock) = setup(publisher.clone(), false);

        dispatcher
            .record_rejection(Platform::Instagram, "content_9", clock.now())
            .unwrap();

        let rejected = dispatcher
            .history(&HistoryFilter {
                status: Some(PostStatus::Rejected),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].content_ref, "content_9");

        // Rejected entries are terminal, never executed
        let summary = dispatcher.process_due().await.unwrap();
        assert_eq!(summary.examined, 0);
        assert_eq!(publisher.call_count(), 0);
    }
}
