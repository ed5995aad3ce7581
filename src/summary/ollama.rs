use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{validate_link, SummaryError, Summarizer};

/// Summarizer backed by an Ollama-compatible `/api/generate` endpoint.
pub struct OllamaSummarizer {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaSummarizer {
    /// Create a summarizer for `endpoint` with a per-request timeout.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, SummaryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SummaryError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn prompt(link: &str) -> String {
        format!("Create a two sentence summary of {link}")
    }

    fn map_error(&self, e: reqwest::Error) -> SummaryError {
        if e.is_timeout() {
            SummaryError::Timeout(self.timeout.as_secs())
        } else {
            SummaryError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Summarizer for OllamaSummarizer {
    async fn summarize(&self, link: &str, model: &str) -> Result<String, SummaryError> {
        validate_link(link)?;

        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({
            "model": model,
            "prompt": Self::prompt(link),
            "stream": false,
        });

        debug!("Summary request to {} for {}", url, link);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SummaryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await.map_err(|e| self.map_error(e))?;
        parse_generate_response(&text)
    }
}

fn parse_generate_response(body: &str) -> Result<String, SummaryError> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| SummaryError::Parse(e.to_string()))?;
    if !parsed.done {
        return Err(SummaryError::Incomplete);
    }
    Ok(parsed.response.trim().to_string())
}
