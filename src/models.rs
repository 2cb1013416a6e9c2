//! Core data structures for the herald pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Social platform enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Instagram,
    Linkedin,
}

impl Platform {
    /// All supported platforms, in canonical order
    pub const ALL: [Platform; 3] = [Platform::Twitter, Platform::Instagram, Platform::Linkedin];

    /// Parse from a case-insensitive name
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "twitter" => Some(Self::Twitter),
            "instagram" => Some(Self::Instagram),
            "linkedin" => Some(Self::Linkedin),
            _ => None,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Twitter => "twitter",
            Self::Instagram => "instagram",
            Self::Linkedin => "linkedin",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque generated content handed from the generator to the publisher.
///
/// The pipeline never inspects the payload beyond a preview; its shape is a
/// contract between the generation and publishing collaborators.
pub type ContentPayload = serde_json::Value;

/// One unit of generated, not-yet-published content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub platform: Platform,
    pub payload: ContentPayload,
    pub created_at: DateTime<Utc>,
    pub used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl ContentItem {
    /// Create a fresh unused item with a generated id
    pub fn new(platform: Platform, payload: ContentPayload, created_at: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(platform, created_at),
            platform,
            payload,
            created_at,
            used: false,
            scheduled_time: None,
        }
    }

    /// SHA256 fingerprint of the payload, for duplicate detection
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.payload.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Short payload preview for logs and review prompts
    pub fn preview(&self, max_chars: usize) -> String {
        let text = match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Object(map) => map
                .get("text")
                .or_else(|| map.get("caption"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| self.payload.to_string()),
            other => other.to_string(),
        };
        if text.chars().count() <= max_chars {
            text
        } else {
            let truncated: String = text.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{truncated}...")
        }
    }
}

/// Trend snapshot produced by the trend collaborator.
///
/// The report body is opaque to the pipeline; only freshness metadata is read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub generated_at: DateTime<Utc>,
    pub keywords: Vec<String>,
    pub data: serde_json::Value,
}

impl TrendReport {
    pub fn new(keywords: Vec<String>, data: serde_json::Value, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            keywords,
            data,
        }
    }
}

/// Result of a successful publish call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    /// Identifier assigned by the remote platform, when available
    pub remote_id: Option<String>,

    /// True when the publish was simulated (dry-run)
    #[serde(default)]
    pub simulated: bool,
}

impl PublishResult {
    pub fn live(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            simulated: false,
        }
    }

    pub fn simulated(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
            simulated: true,
        }
    }
}

/// Generate a unique id in the form `{platform}_{unix_ts}_{hex}`
pub fn generate_id(platform: Platform, at: DateTime<Utc>) -> String {
    format!("{}_{}_{:08x}", platform, at.timestamp(), rand::random::<u32>())
}
