//! Microsoft Learn catalog client.
//!
//! Pulls the skill outline for a certification and matches published
//! learning modules to concepts. The catalog is advisory: callers treat
//! failures as degraded output, not fatal errors.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::{CatalogError, CatalogLookup, ConceptQuery, ModuleLink, Objective};

const DEFAULT_BASE_URL: &str = "https://learn.microsoft.com/api/catalog/";
const DEFAULT_LOCALE: &str = "en-us";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MODULES_PER_CONCEPT: usize = 3;
const MAX_RETRIES: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

/// Skill areas assumed when the catalog entry carries no outline. Weights
/// mirror the split typical of role-based certification exams.
const FALLBACK_AREAS: [(&str, f64); 4] = [
    ("Core concepts and architecture", 30.0),
    ("Implementation and deployment", 30.0),
    ("Security and governance", 20.0),
    ("Monitoring and troubleshooting", 20.0),
];

#[derive(Debug, Clone, Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    certifications: Vec<CertificationEntry>,
    #[serde(default)]
    modules: Vec<ModuleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct CertificationEntry {
    uid: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    study_skill_areas: Vec<SkillArea>,
}

#[derive(Debug, Clone, Deserialize)]
struct SkillArea {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    weight: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModuleEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    summary: Option<String>,
}

#[derive(Clone)]
pub struct HttpCatalog {
    base_url: String,
    locale: String,
    client: reqwest::Client,
}

impl HttpCatalog {
    pub fn from_env() -> Self {
        let base_url = std::env::var("CATALOG_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let locale = std::env::var("CATALOG_LOCALE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOCALE.to_string());
        let timeout = std::env::var("CATALOG_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { base_url, locale, client }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.collaborator_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: config.catalog_base_url.clone(),
            locale: config.locale.clone(),
            client,
        }
    }

    async fn fetch(&self, kind: &str, uid: Option<&str>) -> Result<CatalogResponse, CatalogError> {
        let mut query = vec![("type", kind.to_string()), ("locale", self.locale.clone())];
        if let Some(uid) = uid {
            query.push(("uid", uid.to_string()));
        }

        let mut last_error: Option<CatalogError> = None;
        for retry in 0..=MAX_RETRIES {
            match self.client.get(&self.base_url).query(&query).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(serde_json::from_slice(&resp.bytes().await?)?);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = CatalogError::HttpStatus { status, body };
                    if retry < MAX_RETRIES && super::oracle::is_retryable(status) {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, ?status, "catalog request failed, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    let err = CatalogError::Request(e);
                    if retry < MAX_RETRIES {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << retry));
                        warn!(retry, "catalog request error, retrying");
                        sleep(backoff).await;
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| CatalogError::NotFound("catalog".to_string())))
    }
}

impl CatalogLookup for HttpCatalog {
    async fn find_objectives(
        &self,
        certification_uid: &str,
    ) -> Result<Vec<Objective>, CatalogError> {
        let response = self.fetch("certifications", Some(certification_uid)).await?;
        let entry = response
            .certifications
            .into_iter()
            .find(|c| c.uid == certification_uid)
            .ok_or_else(|| CatalogError::NotFound(certification_uid.to_string()))?;

        if entry.study_skill_areas.is_empty() {
            warn!(uid = %certification_uid, "catalog entry has no skill outline, using fallback areas");
            return Ok(fallback_objectives(certification_uid));
        }

        let count = entry.study_skill_areas.len();
        Ok(entry
            .study_skill_areas
            .into_iter()
            .enumerate()
            .map(|(i, area)| Objective {
                id: format!("{certification_uid}-obj-{}", i + 1),
                name: area.name.clone(),
                description: area.description.unwrap_or_else(|| {
                    format!("{} as assessed by {}", area.name, entry.title)
                }),
                weight_percent: area.weight.unwrap_or(100.0 / count as f64),
            })
            .collect())
    }

    async fn find_modules(
        &self,
        concepts: &[ConceptQuery],
    ) -> Result<HashMap<String, Vec<ModuleLink>>, CatalogError> {
        let response = self.fetch("modules", None).await?;
        debug!(modules = response.modules.len(), "catalog module inventory loaded");

        let mut links: HashMap<String, Vec<ModuleLink>> = HashMap::new();
        for concept in concepts {
            let mut scored: Vec<(f64, &ModuleEntry)> = response
                .modules
                .iter()
                .map(|m| (match_score(&concept.name, m), m))
                .filter(|(score, _)| *score > 0.0)
                .collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));

            let matched: Vec<ModuleLink> = scored
                .into_iter()
                .take(MODULES_PER_CONCEPT)
                .map(|(_, m)| ModuleLink { title: m.title.clone(), url: m.url.clone() })
                .collect();
            links.insert(concept.id.clone(), matched);
        }
        Ok(links)
    }
}

pub fn fallback_objectives(certification_uid: &str) -> Vec<Objective> {
    FALLBACK_AREAS
        .iter()
        .enumerate()
        .map(|(i, (name, weight))| Objective {
            id: format!("{certification_uid}-obj-{}", i + 1),
            name: (*name).to_string(),
            description: format!("{name} for {certification_uid}"),
            weight_percent: *weight,
        })
        .collect()
}

/// Token overlap between a concept name and a module's title/summary.
fn match_score(concept_name: &str, module: &ModuleEntry) -> f64 {
    let terms: Vec<String> = concept_name
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .filter(|t| t.len() >= 3)
        .collect();
    if terms.is_empty() {
        return 0.0;
    }

    let haystack = format!(
        "{} {}",
        module.title.to_lowercase(),
        module.summary.as_deref().unwrap_or("").to_lowercase()
    );
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_objectives_weights_sum_to_hundred() {
        let objectives = fallback_objectives("cert-x");
        let total: f64 = objectives.iter().map(|o| o.weight_percent).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert_eq!(objectives.len(), 4);
    }

    #[test]
    fn test_match_score_prefers_relevant_modules() {
        let relevant = ModuleEntry {
            title: "Configure virtual networks".into(),
            url: "u1".into(),
            summary: Some("Plan virtual networks in Azure".into()),
        };
        let unrelated = ModuleEntry {
            title: "Introduction to quantum computing".into(),
            url: "u2".into(),
            summary: None,
        };
        let name = "Virtual networks";
        assert!(match_score(name, &relevant) > match_score(name, &unrelated));
    }
}
