//! Cycle orchestration: refresh trends, generate content, fill schedules
//!
//! One invocation of [`CycleOrchestrator::run_daily_cycle`] walks the whole
//! pipeline: refresh external trend data when stale, generate content when
//! due, then assign pooled content to planned publish times, gated by human
//! approval when enabled. Repeated invocations inside the interval windows
//! are no-ops for the refresh steps and simply continue filling schedules.
//!
//! Failure isolation: a trend refresh failure ends the current cycle early
//! (the next tick retries); a failure while processing one platform is
//! logged and never blocks the other platforms or the next cycle.

pub mod state;

use chrono::{DateTime, Duration, Utc};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::approval::ApprovalGate;
use crate::collaborators::{call_with_timeout, ContentGenerator, TrendSource};
use crate::config::Config;
use crate::dispatch::{DispatchError, PostDispatcher};
use crate::error::Result;
use crate::models::{ContentItem, Platform, TrendReport};
use crate::planner::TimeSlotPlanner;
use crate::pool::ContentPool;
use crate::utils::{with_retry, Clock, RetryConfig};

pub use state::CycleState;

/// Summary of one cycle invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub trends_refreshed: bool,
    pub content_generated: usize,
    pub posts_scheduled: usize,
    pub posts_rejected: usize,
    pub platforms_failed: usize,
}

/// Drives the scan -> generate -> schedule state machine
pub struct CycleOrchestrator {
    config: Config,
    planner: TimeSlotPlanner,
    trends: Arc<dyn TrendSource>,
    generator: Arc<dyn ContentGenerator>,
    gate: Arc<dyn ApprovalGate>,
    dispatcher: Arc<PostDispatcher>,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
}

impl CycleOrchestrator {
    pub fn new(
        config: Config,
        trends: Arc<dyn TrendSource>,
        generator: Arc<dyn ContentGenerator>,
        gate: Arc<dyn ApprovalGate>,
        dispatcher: Arc<PostDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let planner = TimeSlotPlanner::new(config.schedule.slot_template.clone());
        let retry = config.retry_config();
        Self {
            config,
            planner,
            trends,
            generator,
            gate,
            dispatcher,
            clock,
            retry,
        }
    }

    fn state_path(&self) -> PathBuf {
        self.config.storage.cycle_state_path()
    }

    fn pool_path(&self) -> PathBuf {
        self.config.storage.content_pool_path()
    }

    fn trend_report_path(&self) -> PathBuf {
        self.config.storage.trend_report_path()
    }

    /// Run one full cycle. Safe to call repeatedly; the refresh steps are
    /// gated by their persisted intervals.
    pub async fn run_daily_cycle(&self) -> Result<CycleReport> {
        let now = self.clock.now();
        info!(now = %now, "Starting pipeline cycle");

        let mut report = CycleReport::default();
        let mut state = CycleState::load(&self.state_path())?;

        // Step 1: refresh trend data when stale
        if state.trend_scan_due(now, self.config.trend_scan_interval()) {
            match self.refresh_trends(&mut state, now).await {
                Ok(()) => report.trends_refreshed = true,
                Err(e) => {
                    error!(error = %e, "Trend refresh failed, ending cycle early");
                    return Ok(report);
                }
            }
        } else {
            debug!("Trend data is fresh, skipping scan");
        }

        let platforms = self.config.pipeline.platforms.clone();
        let mut pool = ContentPool::load(&self.pool_path(), &platforms)?;

        // Step 2: generate content when due
        if state.content_creation_due(now, self.config.content_creation_interval()) {
            report.content_generated = self.generate_content(&mut pool, &platforms).await;
            state.last_content_creation = Some(now);
            state.save(&self.state_path())?;
        } else {
            debug!("Content generation is fresh, skipping");
        }

        // Step 3: fill schedules per platform, isolating failures
        for &platform in &platforms {
            match self
                .schedule_platform(&mut pool, platform, now, &mut report)
                .await
            {
                Ok(()) => {}
                Err(e) => {
                    error!(platform = %platform, error = %e, "Platform scheduling failed");
                    report.platforms_failed += 1;
                }
            }
        }

        pool.save(&self.pool_path())?;

        info!(
            trends_refreshed = report.trends_refreshed,
            content_generated = report.content_generated,
            posts_scheduled = report.posts_scheduled,
            posts_rejected = report.posts_rejected,
            "Pipeline cycle completed"
        );
        Ok(report)
    }

    /// Trend-scan-only trigger used between daily cycles.
    ///
    /// Returns true when a refresh actually ran.
    pub async fn scan_trends_if_due(&self) -> Result<bool> {
        let now = self.clock.now();
        let mut state = CycleState::load(&self.state_path())?;

        if !state.trend_scan_due(now, self.config.trend_scan_interval()) {
            return Ok(false);
        }

        match self.refresh_trends(&mut state, now).await {
            Ok(()) => Ok(true),
            Err(e) => {
                error!(error = %e, "Trend refresh failed");
                Ok(false)
            }
        }
    }

    /// Refresh the trend report and persist it with the new scan timestamp
    async fn refresh_trends(&self, state: &mut CycleState, now: DateTime<Utc>) -> Result<()> {
        let keywords = self.config.pipeline.keywords.clone();
        info!(keywords = ?keywords, "Refreshing trend data");

        let timeout = self.config.external_timeout();
        let report = with_retry(&self.retry, || {
            call_with_timeout(timeout, "trend refresh", self.trends.refresh(&keywords))
        })
        .await?;

        self.save_trend_report(&report)?;
        state.last_trend_scan = Some(now);
        state.save(&self.state_path())?;

        info!(generated_at = %report.generated_at, "Trend report saved");
        Ok(())
    }

    /// Generate content for each platform, appending to the pool.
    ///
    /// One platform's generation failure is logged and skipped.
    async fn generate_content(&self, pool: &mut ContentPool, platforms: &[Platform]) -> usize {
        let Some(report) = self.load_trend_report() else {
            warn!("No trend report available, skipping content generation");
            return 0;
        };

        let mut generated = 0;
        for &platform in platforms {
            generated += self.generate_for_platform(pool, platform, &report).await;
        }
        generated
    }

    /// Generate one item for a single platform; returns how many were pooled
    async fn generate_for_platform(
        &self,
        pool: &mut ContentPool,
        platform: Platform,
        report: &TrendReport,
    ) -> usize {
        debug!(platform = %platform, "Generating content");
        let timeout = self.config.external_timeout();

        let outcome = with_retry(&self.retry, || {
            call_with_timeout(
                timeout,
                "content generation",
                self.generator.generate(platform, report),
            )
        })
        .await;

        match outcome {
            Ok(payload) => {
                let item = ContentItem::new(platform, payload, self.clock.now());
                usize::from(pool.add_item(item))
            }
            Err(e) => {
                error!(platform = %platform, error = %e, "Content generation failed");
                0
            }
        }
    }

    /// Assign pooled content to planned times for one platform
    async fn schedule_platform(
        &self,
        pool: &mut ContentPool,
        platform: Platform,
        now: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> Result<()> {
        // Empty pool forces a generation pass for this platform first
        if pool.unused_count(platform) == 0 {
            info!(platform = %platform, "No unused content, forcing generation");
            if let Some(trend_report) = self.load_trend_report() {
                report.content_generated +=
                    self.generate_for_platform(pool, platform, &trend_report).await;
            }
        }

        let max_posts = self.config.max_posts_for(platform) as usize;
        let items: Vec<ContentItem> = pool
            .get_unused(platform)
            .into_iter()
            .take(max_posts)
            .cloned()
            .collect();

        if items.is_empty() {
            warn!(platform = %platform, "No unused content available");
            return Ok(());
        }

        let from_time = now + Duration::minutes(i64::from(self.config.schedule.schedule_lead_minutes));
        let times = self.planner.get_bulk_schedule(
            platform,
            items.len(),
            from_time,
            self.config.schedule.min_gap_hours,
        );

        for (item, scheduled_time) in items.iter().zip(times) {
            let approved = match self.gate.review(platform, item, scheduled_time).await {
                Ok(approved) => approved,
                Err(e) => {
                    warn!(platform = %platform, id = %item.id, error = %e, "Approval gate failed, treating as rejection");
                    false
                }
            };

            if !approved {
                report.posts_rejected += 1;
                info!(platform = %platform, id = %item.id, "Content rejected, stays in pool");
                if let Err(e) =
                    self.dispatcher
                        .record_rejection(platform, &item.id, scheduled_time)
                {
                    warn!(error = %e, "Failed to record rejection");
                }
                continue;
            }

            match self.dispatcher.schedule_post(
                platform,
                &item.id,
                item.payload.clone(),
                scheduled_time,
                Some(item.id.clone()),
                self.config.pipeline.human_review,
            ) {
                Ok(_) => {
                    // Marked used only after the post is durably scheduled
                    pool.mark_used(&item.id, platform, scheduled_time)?;
                    report.posts_scheduled += 1;
                }
                Err(DispatchError::DuplicatePostId { .. }) => {
                    // A previous cycle scheduled this item but crashed before
                    // marking it used; heal the pool instead of rescheduling.
                    warn!(platform = %platform, id = %item.id, "Post already recorded, marking content used");
                    pool.mark_used(&item.id, platform, scheduled_time)?;
                }
                Err(e) => {
                    error!(platform = %platform, id = %item.id, error = %e, "Failed to schedule post");
                }
            }
        }

        Ok(())
    }

    fn save_trend_report(&self, report: &TrendReport) -> Result<()> {
        let path = self.trend_report_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("json.tmp");
        {
            let file = File::create(&tmp)?;
            serde_json::to_writer_pretty(BufWriter::new(file), report)?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn load_trend_report(&self) -> Option<TrendReport> {
        let path = self.trend_report_path();
        let file = File::open(&path).ok()?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable trend report");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::AutoApprove;
    use crate::error::ExternalError;
    use crate::models::{ContentPayload, PublishResult};
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockTrends {
        calls: AtomicU32,
        fail: bool,
    }

    impl MockTrends {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl TrendSource for MockTrends {
        async fn refresh(&self, keywords: &[String]) -> Result2<TrendReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExternalError::permanent("scanner offline"));
            }
            Ok(TrendReport::new(
                keywords.to_vec(),
                json!({"topics": ["space"]}),
                Utc::now(),
            ))
        }
    }

    type Result2<T> = std::result::Result<T, ExternalError>;

    struct MockGenerator {
        counter: AtomicUsize,
        fail_for: Option<Platform>,
    }

    impl MockGenerator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                counter: AtomicUsize::new(0),
                fail_for: None,
            })
        }

        fn failing_for(platform: Platform) -> Arc<Self> {
            Arc::new(Self {
                counter: AtomicUsize::new(0),
                fail_for: Some(platform),
            })
        }
    }

    #[async_trait]
    impl ContentGenerator for MockGenerator {
        async fn generate(
            &self,
            platform: Platform,
            _report: &TrendReport,
        ) -> Result2<ContentPayload> {
            if self.fail_for == Some(platform) {
                return Err(ExternalError::permanent("generator rejected platform"));
            }
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({ "text": format!("{platform} update #{n}") }))
        }
    }

    struct ScriptedGate {
        decisions: Mutex<VecDeque<bool>>,
    }

    impl ScriptedGate {
        fn new(decisions: Vec<bool>) -> Arc<Self> {
            Arc::new(Self {
                decisions: Mutex::new(decisions.into()),
            })
        }
    }

    #[async_trait]
    impl ApprovalGate for ScriptedGate {
        async fn review(
            &self,
            _platform: Platform,
            _item: &ContentItem,
            _scheduled_time: DateTime<Utc>,
        ) -> std::io::Result<bool> {
            Ok(self.decisions.lock().unwrap().pop_front().unwrap_or(true))
        }
    }

    struct NeverPublisher;

    #[async_trait]
    impl crate::collaborators::PlatformPublisher for NeverPublisher {
        async fn publish(
            &self,
            _platform: Platform,
            _payload: &ContentPayload,
        ) -> Result2<PublishResult> {
            panic!("publisher must not be called during scheduling");
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        config: Config,
        clock: Arc<ManualClock>,
        dispatcher: Arc<PostDispatcher>,
    }

    fn harness(human_review: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.pipeline.human_review = human_review;
        config.pipeline.max_posts_per_day = BTreeMapExt::from([
            (String::from("twitter"), 2),
            (String::from("instagram"), 1),
            (String::from("linkedin"), 1),
        ]);
        config.schedule.retry_base_delay_ms = 1;
        config.schedule.retry_max_delay_ms = 5;

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 3, 8, 0, 0).unwrap(),
        ));
        let dispatcher = Arc::new(PostDispatcher::new(
            config.storage.post_log_path(),
            Arc::new(NeverPublisher),
            config.retry_config(),
            config.external_timeout(),
            false,
            clock.clone(),
        ));

        Harness {
            _dir: dir,
            config,
            clock,
            dispatcher,
        }
    }

    type BTreeMapExt = std::collections::BTreeMap<String, u32>;

    fn orchestrator(
        h: &Harness,
        trends: Arc<dyn TrendSource>,
        generator: Arc<dyn ContentGenerator>,
        gate: Arc<dyn ApprovalGate>,
    ) -> CycleOrchestrator {
        CycleOrchestrator::new(
            h.config.clone(),
            trends,
            generator,
            gate,
            h.dispatcher.clone(),
            h.clock.clone(),
        )
    }

    #[tokio::test]
    async fn test_full_cycle_schedules_posts() {
        let h = harness(false);
        let trends = MockTrends::new();
        let orch = orchestrator(&h, trends.clone(), MockGenerator::new(), Arc::new(AutoApprove));

        let report = orch.run_daily_cycle().await.unwrap();

        assert!(report.trends_refreshed);
        assert_eq!(report.content_generated, 3);
        assert_eq!(report.posts_scheduled, 3);
        assert_eq!(report.platforms_failed, 0);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 1);

        // Every scheduled item is marked used in the persisted pool
        let pool = ContentPool::load(
            &h.config.storage.content_pool_path(),
            &h.config.pipeline.platforms,
        )
        .unwrap();
        for platform in Platform::ALL {
            assert!(pool.get_unused(platform).is_empty());
        }
    }

    #[tokio::test]
    async fn test_repeat_cycle_skips_fresh_refreshes() {
        let h = harness(false);
        let trends = MockTrends::new();
        let generator = MockGenerator::new();
        let orch = orchestrator(&h, trends.clone(), generator.clone(), Arc::new(AutoApprove));

        orch.run_daily_cycle().await.unwrap();
        h.clock.advance(Duration::hours(1));
        let second = orch.run_daily_cycle().await.unwrap();

        // Both intervals still fresh: no new scan, no new generation
        assert!(!second.trends_refreshed);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 1);
        // Step 3 forces per-platform generation because the pool drained
        assert!(second.content_generated > 0);
    }

    #[tokio::test]
    async fn test_trend_failure_ends_cycle_early() {
        let h = harness(false);
        let orch = orchestrator(
            &h,
            MockTrends::failing(),
            MockGenerator::new(),
            Arc::new(AutoApprove),
        );

        let report = orch.run_daily_cycle().await.unwrap();

        assert!(!report.trends_refreshed);
        assert_eq!(report.posts_scheduled, 0);
    }

    #[tokio::test]
    async fn test_generation_failure_isolated_per_platform() {
        let h = harness(false);
        let orch = orchestrator(
            &h,
            MockTrends::new(),
            MockGenerator::failing_for(Platform::Instagram),
            Arc::new(AutoApprove),
        );

        let report = orch.run_daily_cycle().await.unwrap();

        // Twitter and LinkedIn still generated and scheduled
        assert_eq!(report.content_generated, 2);
        assert_eq!(report.posts_scheduled, 2);
        assert_eq!(report.platforms_failed, 0);
    }

    #[tokio::test]
    async fn test_rejected_item_stays_unused_and_reappears() {
        let h = harness(true);
        let trends = MockTrends::new();
        let generator = MockGenerator::new();

        // First cycle: reject everything
        let orch = orchestrator(
            &h,
            trends.clone(),
            generator.clone(),
            ScriptedGate::new(vec![false, false, false]),
        );
        let first = orch.run_daily_cycle().await.unwrap();

        assert_eq!(first.posts_rejected, 3);
        assert_eq!(first.posts_scheduled, 0);

        let pool = ContentPool::load(
            &h.config.storage.content_pool_path(),
            &h.config.pipeline.platforms,
        )
        .unwrap();
        assert_eq!(pool.get_unused(Platform::Twitter).len(), 1);

        // Second cycle: the same items are re-offered and approved
        let orch = orchestrator(&h, trends, generator, ScriptedGate::new(vec![true, true, true]));
        h.clock.advance(Duration::hours(1));
        let second = orch.run_daily_cycle().await.unwrap();

        assert_eq!(second.posts_rejected, 0);
        assert_eq!(second.posts_scheduled, 3);
    }

    #[tokio::test]
    async fn test_restart_does_not_retrigger_refreshes() {
        let h = harness(false);
        let trends = MockTrends::new();
        let generator = MockGenerator::new();

        let orch = orchestrator(&h, trends.clone(), generator.clone(), Arc::new(AutoApprove));
        orch.run_daily_cycle().await.unwrap();
        drop(orch);

        // Fresh orchestrator over the same data dir simulates a restart
        let orch = orchestrator(&h, trends.clone(), generator, Arc::new(AutoApprove));
        h.clock.advance(Duration::minutes(30));
        let report = orch.run_daily_cycle().await.unwrap();

        assert!(!report.trends_refreshed);
        assert_eq!(trends.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_scan_trends_if_due_respects_interval() {
        let h = harness(false);
        let trends = MockTrends::new();
        let orch = orchestrator(&h, trends.clone(), MockGenerator::new(), Arc::new(AutoApprove));

        assert!(orch.scan_trends_if_due().await.unwrap());
        assert!(!orch.scan_trends_if_due().await.unwrap());

        h.clock.advance(Duration::hours(5));
        assert!(orch.scan_trends_if_due().await.unwrap());
        assert_eq!(trends.calls.load(Ordering::SeqCst), 2);
    }
}
