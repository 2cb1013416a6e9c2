//! External collaborator contracts
//!
//! Trend scanning, content generation, and publishing are single-shot calls
//! to external services. The pipeline only depends on these traits; wire
//! formats and prompt semantics live behind them.
//!
//! Every call goes through [`call_with_timeout`] so one unresponsive
//! collaborator cannot stall the worker: a timeout is a transient failure
//! and enters the standard retry policy.

pub mod fixtures;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::ExternalError;
use crate::models::{ContentPayload, Platform, PublishResult, TrendReport};

pub use fixtures::{KeywordTrendSource, SinkPublisher, TemplateGenerator};

/// Source of external trend data
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn refresh(&self, keywords: &[String]) -> Result<TrendReport, ExternalError>;
}

/// Produces platform-specific content from a trend report
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        platform: Platform,
        report: &TrendReport,
    ) -> Result<ContentPayload, ExternalError>;
}

/// Publishes a payload to a social platform
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    async fn publish(
        &self,
        platform: Platform,
        payload: &ContentPayload,
    ) -> Result<PublishResult, ExternalError>;
}

/// Run an external call under a bounded timeout.
///
/// An elapsed timeout maps to [`ExternalError::Transient`].
pub async fn call_with_timeout<T, Fut>(
    timeout: Duration,
    label: &str,
    fut: Fut,
) -> Result<T, ExternalError>
where
    Fut: Future<Output = Result<T, ExternalError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(label = label, timeout_secs = timeout.as_secs(), "External call timed out");
            Err(ExternalError::transient(format!(
                "{label} timed out after {}s",
                timeout.as_secs()
            )))
        }
    }
}
