//! Built-in collaborator implementations
//!
//! These keep the binary and demos runnable without network credentials:
//! the trend source echoes its keywords as a report, the generator fills a
//! text template, and the sink publisher accepts everything and returns a
//! synthetic remote id.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use super::{ContentGenerator, PlatformPublisher, TrendSource};
use crate::error::ExternalError;
use crate::models::{ContentPayload, Platform, PublishResult, TrendReport};

/// Trend source that packages the configured keywords into a report
#[derive(Debug, Default)]
pub struct KeywordTrendSource;

#[async_trait]
impl TrendSource for KeywordTrendSource {
    async fn refresh(&self, keywords: &[String]) -> Result<TrendReport, ExternalError> {
        let data = json!({
            "topics": keywords
                .iter()
                .map(|kw| json!({ "keyword": kw, "momentum": "steady" }))
                .collect::<Vec<_>>(),
        });

        Ok(TrendReport::new(keywords.to_vec(), data, Utc::now()))
    }
}

/// Generator that fills a plain-text template from the trend report.
///
/// A monotonically increasing sequence number keeps successive payloads
/// distinct, so pool-level duplicate detection doesn't swallow them.
#[derive(Debug, Default)]
pub struct TemplateGenerator {
    sequence: AtomicU64,
}

#[async_trait]
impl ContentGenerator for TemplateGenerator {
    async fn generate(
        &self,
        platform: Platform,
        report: &TrendReport,
    ) -> Result<ContentPayload, ExternalError> {
        let topic = report
            .keywords
            .first()
            .cloned()
            .unwrap_or_else(|| "today".to_string());
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);

        let text = format!("What's moving in {topic} right now (update #{seq})");
        let payload = match platform {
            Platform::Instagram => json!({ "caption": text, "hashtags": [topic] }),
            _ => json!({ "text": text }),
        };

        Ok(payload)
    }
}

/// Publisher that accepts every payload without side effects
#[derive(Debug, Default)]
pub struct SinkPublisher;

#[async_trait]
impl PlatformPublisher for SinkPublisher {
    async fn publish(
        &self,
        platform: Platform,
        payload: &ContentPayload,
    ) -> Result<PublishResult, ExternalError> {
        let remote_id = format!("sink_{}_{:08x}", platform, rand::random::<u32>());
        info!(
            platform = %platform,
            remote_id = %remote_id,
            bytes = payload.to_string().len(),
            "Sink publisher accepted payload"
        );
        Ok(PublishResult::live(remote_id))
    }
}
