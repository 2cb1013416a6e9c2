//! herald - Trend-driven social publishing pipeline
//!
//! Automates refresh of external trend data, platform-specific content
//! generation, and scheduled publishing with retry coordination and optional
//! human approval.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration management and settings
//! - [`models`] - Core data structures and types
//! - [`planner`] - Weekly slot tables and publish-time computation
//! - [`pool`] - Persistent pool of generated content
//! - [`approval`] - Optional human review checkpoint
//! - [`dispatch`] - Durable scheduled posts and publish execution
//! - [`orchestrator`] - The scan/generate/schedule cycle state machine
//! - [`runner`] - Background worker and pipeline lifecycle
//! - [`collaborators`] - External service contracts (trends, generation, publishing)
//! - [`utils`] - Retry/backoff and clock utilities
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use herald::approval::AutoApprove;
//! use herald::collaborators::{KeywordTrendSource, SinkPublisher, TemplateGenerator};
//! use herald::config::Config;
//! use herald::dispatch::PostDispatcher;
//! use herald::orchestrator::CycleOrchestrator;
//! use herald::utils::SystemClock;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     config.validate()?;
//!
//!     let clock = Arc::new(SystemClock);
//!     let dispatcher = Arc::new(PostDispatcher::new(
//!         config.storage.post_log_path(),
//!         Arc::new(SinkPublisher),
//!         config.retry_config(),
//!         config.external_timeout(),
//!         config.pipeline.dry_run,
//!         clock.clone(),
//!     ));
//!     let orchestrator = CycleOrchestrator::new(
//!         config,
//!         Arc::new(KeywordTrendSource),
//!         Arc::new(TemplateGenerator::default()),
//!         Arc::new(AutoApprove),
//!         dispatcher,
//!         clock,
//!     );
//!     orchestrator.run_daily_cycle().await?;
//!     Ok(())
//! }
//! ```

pub mod approval;
pub mod collaborators;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod planner;
pub mod pool;
pub mod runner;
pub mod utils;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::approval::{ApprovalGate, AutoApprove, ConsoleGate};
    pub use crate::config::Config;
    pub use crate::dispatch::{PostDispatcher, PostStatus, ScheduledPost};
    pub use crate::error::{Error, ErrorCategory, ExternalError, Result};
    pub use crate::models::{ContentItem, ContentPayload, Platform, PublishResult, TrendReport};
    pub use crate::orchestrator::{CycleOrchestrator, CycleReport, CycleState};
    pub use crate::planner::{SlotTemplate, TimeSlotPlanner, WeeklySlot};
    pub use crate::pool::ContentPool;
    pub use crate::runner::{BackgroundRunner, RunnerConfig};
}

// Direct re-exports for convenience
pub use models::{ContentItem, Platform, TrendReport};
