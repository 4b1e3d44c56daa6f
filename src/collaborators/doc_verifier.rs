//! Documentation-backed claim checker.
//!
//! Claims are checked against the Microsoft Learn search API: the claim
//! text is used as a query and confidence is derived from how much of the
//! claim's vocabulary the top results cover. Adversarial framing tightens
//! the scoring so the same evidence yields a lower score.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use super::{Claim, DocCheck, DocVerifier, Framing, VerifierError};

const DEFAULT_SEARCH_URL: &str = "https://learn.microsoft.com/api/search";
const DEFAULT_LOCALE: &str = "en-us";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const TOP_RESULTS: usize = 3;
const MAX_QUERY_CHARS: usize = 160;
const ADVERSARIAL_PENALTY: f64 = 0.15;

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct HttpDocVerifier {
    search_url: String,
    locale: String,
    client: reqwest::Client,
}

impl HttpDocVerifier {
    pub fn from_env() -> Self {
        let search_url = std::env::var("DOCS_SEARCH_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
        let locale = std::env::var("DOCS_LOCALE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        let timeout = std::env::var("DOCS_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { search_url, locale, client }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.collaborator_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            search_url: config.search_url.clone(),
            locale: config.locale.clone(),
            client,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, VerifierError> {
        let resp = self
            .client
            .get(&self.search_url)
            .query(&[("search", query), ("locale", &self.locale), ("$top", "10")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VerifierError::HttpStatus { status, body });
        }

        let body: SearchResponse = serde_json::from_slice(&resp.bytes().await?)?;
        Ok(body.results)
    }
}

impl DocVerifier for HttpDocVerifier {
    async fn check(&self, claim: &Claim) -> Result<DocCheck, VerifierError> {
        let query: String = claim.content.chars().take(MAX_QUERY_CHARS).collect();
        let results = self.search(&query).await?;

        if results.is_empty() {
            return Ok(DocCheck {
                confidence: 0.0,
                issues: vec![format!("no documentation found for {}", claim.subject_ref)],
                corrections: Vec::new(),
                source_refs: Vec::new(),
            });
        }

        let top = &results[..results.len().min(TOP_RESULTS)];
        let mut confidence = coverage(&claim.content, top);
        if claim.framing == Framing::Adversarial {
            confidence = (confidence - ADVERSARIAL_PENALTY).max(0.0);
        }
        debug!(subject = %claim.subject_ref, confidence, "doc check scored");

        let mut issues = Vec::new();
        if confidence < 0.5 {
            issues.push(format!(
                "documentation coverage for {} is weak",
                claim.subject_ref
            ));
        }

        Ok(DocCheck {
            confidence,
            issues,
            corrections: Vec::new(),
            source_refs: top.iter().map(|r| r.url.clone()).collect(),
        })
    }
}

/// Fraction of the claim's significant terms that appear in the result
/// titles and descriptions.
fn coverage(content: &str, results: &[SearchResult]) -> f64 {
    let terms: HashSet<String> = tokens(content).filter(|t| t.len() >= 4).collect();
    if terms.is_empty() {
        return 0.5;
    }

    let mut corpus: HashSet<String> = HashSet::new();
    for result in results {
        corpus.extend(tokens(&result.title));
        if let Some(desc) = &result.description {
            corpus.extend(tokens(desc));
        }
    }

    let hits = terms.iter().filter(|t| corpus.contains(*t)).count();
    hits as f64 / terms.len() as f64
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}
