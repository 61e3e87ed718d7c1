use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use redress_core::config::LookupConfig;

/// Keywords that mark a product description as perishable. The scan covers
/// the whole lookup response: answer, summary, and every result body.
const PERISHABLE_MARKERS: &[&str] = &["perishable", "spoil", "expire", "shelf life"];

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("lookup returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("lookup is not configured")]
    Disabled,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LookupResult {
    pub title: String,
    pub url: String,
    pub content: String,
    pub relevance: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LookupResponse {
    pub success: bool,
    pub results: Vec<LookupResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl LookupResponse {
    /// Whole-response keyword scan, case-insensitive. Advisory evidence only;
    /// the refund handler treats a positive as eligibility, never as a
    /// command.
    pub fn indicates_perishable(&self) -> bool {
        let mut haystack = String::new();
        if let Some(answer) = &self.answer {
            haystack.push_str(answer);
            haystack.push(' ');
        }
        if let Some(summary) = &self.summary {
            haystack.push_str(summary);
            haystack.push(' ');
        }
        for result in &self.results {
            haystack.push_str(&result.title);
            haystack.push(' ');
            haystack.push_str(&result.content);
            haystack.push(' ');
        }
        let haystack = haystack.to_lowercase();
        PERISHABLE_MARKERS.iter().any(|marker| haystack.contains(marker))
    }
}

/// External web-lookup port. Failures are advisory: callers fall back to
/// treating the product as non-perishable.
#[async_trait]
pub trait ExternalLookup: Send + Sync {
    async fn search(&self, query: &str) -> Result<LookupResponse, LookupError>;
}

/// Stand-in used when lookup is disabled in config; every search reports
/// no evidence.
pub struct NullLookup;

#[async_trait]
impl ExternalLookup for NullLookup {
    async fn search(&self, _query: &str) -> Result<LookupResponse, LookupError> {
        Ok(LookupResponse { success: false, ..LookupResponse::default() })
    }
}

/// Tavily-style search client.
pub struct HttpLookupClient {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    search_depth: &'a str,
    include_answer: bool,
    max_results: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultRow>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Deserialize)]
struct SearchResultRow {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
}

impl HttpLookupClient {
    pub fn from_config(config: &LookupConfig) -> Result<Self, LookupError> {
        let api_key = config.api_key.clone().ok_or(LookupError::Disabled)?;
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { client, base_url: config.base_url.trim_end_matches('/').to_string(), api_key })
    }
}

#[async_trait]
impl ExternalLookup for HttpLookupClient {
    async fn search(&self, query: &str) -> Result<LookupResponse, LookupError> {
        let body = SearchRequest {
            api_key: self.api_key.expose_secret(),
            query,
            search_depth: "advanced",
            include_answer: true,
            max_results: 5,
        };

        let response =
            self.client.post(format!("{}/search", self.base_url)).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LookupError::Api { status: status.as_u16(), body });
        }

        let parsed: SearchResponse = response.json().await?;
        let results = parsed
            .results
            .into_iter()
            .take(3)
            .map(|row| LookupResult {
                title: row.title,
                url: row.url,
                content: row.content,
                relevance: row.score,
            })
            .collect();
        Ok(LookupResponse { success: true, results, answer: parsed.answer, summary: parsed.summary })
    }
}

#[cfg(test)]
mod tests {
    use super::{ExternalLookup, LookupResponse, LookupResult, NullLookup};

    #[test]
    fn perishable_scan_covers_answer_and_results() {
        let mut response = LookupResponse {
            success: true,
            answer: Some("Oat milk is Perishable and must be refrigerated.".to_string()),
            ..LookupResponse::default()
        };
        assert!(response.indicates_perishable());

        response.answer = None;
        response.results.push(LookupResult {
            title: "Storage guide".to_string(),
            content: "Keep cold; the product can spoil quickly.".to_string(),
            ..LookupResult::default()
        });
        assert!(response.indicates_perishable());
    }

    #[test]
    fn durable_goods_do_not_scan_as_perishable() {
        let response = LookupResponse {
            success: true,
            answer: Some("Stainless steel bottles last for decades.".to_string()),
            ..LookupResponse::default()
        };
        assert!(!response.indicates_perishable());
    }

    #[tokio::test]
    async fn null_lookup_reports_no_evidence() {
        let response = NullLookup.search("is milk perishable").await.expect("search");
        assert!(!response.success);
        assert!(!response.indicates_perishable());
    }
}
