//! Summary generation for new items.
//!
//! Ingestion talks to a [`Summarizer`] trait object. When summaries are
//! disabled it gets a [`DisabledSummarizer`], so the pipeline never touches
//! the network for enrichment.

mod ollama;

pub use ollama::OllamaSummarizer;

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::config::SummaryConfig;

/// Why a summary could not be produced.
#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    /// The link is empty or not an http(s) URL.
    #[error("invalid link: {0}")]
    InvalidLink(String),
    /// The request could not be sent or the response not read.
    #[error("network error: {0}")]
    Network(String),
    /// No answer within the configured bound.
    #[error("summary request timed out after {0} seconds")]
    Timeout(u64),
    /// The service answered but reported that generation had not finished.
    #[error("incomplete response from summary service")]
    Incomplete,
    /// Non-success HTTP status.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },
    /// The response body did not have the expected shape.
    #[error("failed to parse response: {0}")]
    Parse(String),
    /// Summaries are turned off.
    #[error("summaries are disabled")]
    Disabled,
}

/// Produces a short summary for an article link.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Whether this summarizer does anything at all.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Summarize the article at `link` using `model`.
    async fn summarize(&self, link: &str, model: &str) -> Result<String, SummaryError>;
}

/// Null summarizer used when summaries are turned off.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSummarizer;

#[async_trait]
impl Summarizer for DisabledSummarizer {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn summarize(&self, _link: &str, _model: &str) -> Result<String, SummaryError> {
        Err(SummaryError::Disabled)
    }
}

/// Build the summarizer described by the configuration.
pub fn from_config(config: &SummaryConfig) -> Result<Arc<dyn Summarizer>, SummaryError> {
    if !config.enabled {
        return Ok(Arc::new(DisabledSummarizer));
    }
    Ok(Arc::new(OllamaSummarizer::new(
        &config.endpoint,
        config.timeout(),
    )?))
}

/// Check that a link is a non-empty http(s) URL.
pub fn validate_link(link: &str) -> Result<Url, SummaryError> {
    if link.trim().is_empty() {
        return Err(SummaryError::InvalidLink("empty link".to_string()));
    }
    let url = Url::parse(link).map_err(|e| SummaryError::InvalidLink(format!("{link}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(SummaryError::InvalidLink(format!(
            "unsupported scheme {scheme}: {link}"
        ))),
    }
}
