use std::time::Duration;

const DEFAULT_PASS_THRESHOLD: f64 = 0.80;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.70;
const DEFAULT_MIN_QUESTIONS: usize = 10;
const DEFAULT_MAX_QUESTIONS: usize = 20;
const DEFAULT_THETA_CONVERGENCE: f64 = 0.1;
const DEFAULT_MAX_ITERATIONS: u32 = 3;
const DEFAULT_TUTOR_MAX_TURNS: usize = 10;
const DEFAULT_FRONTIER_STUDY_LIMIT: usize = 5;
const DEFAULT_CATALOG_BASE_URL: &str = "https://learn.microsoft.com/api/catalog/";
const DEFAULT_SEARCH_URL: &str = "https://learn.microsoft.com/api/search";
const DEFAULT_LOCALE: &str = "en-us";
const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub pass_threshold: f64,
    pub confidence_threshold: f64,
    pub min_questions: usize,
    pub max_questions: usize,
    pub theta_convergence: f64,
    pub max_iterations: u32,
    pub tutor_max_turns: usize,
    pub frontier_study_limit: usize,
    pub catalog_base_url: String,
    pub search_url: String,
    pub locale: String,
    pub collaborator_timeout: Duration,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            pass_threshold: env_f64("PASS_THRESHOLD").unwrap_or(DEFAULT_PASS_THRESHOLD),
            confidence_threshold: env_f64("CONFIDENCE_THRESHOLD")
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            min_questions: env_usize("MIN_DIAGNOSTIC_QUESTIONS").unwrap_or(DEFAULT_MIN_QUESTIONS),
            max_questions: env_usize("MAX_DIAGNOSTIC_QUESTIONS").unwrap_or(DEFAULT_MAX_QUESTIONS),
            theta_convergence: env_f64("THETA_CONVERGENCE").unwrap_or(DEFAULT_THETA_CONVERGENCE),
            max_iterations: env_u32("MAX_LOOP_ITERATIONS").unwrap_or(DEFAULT_MAX_ITERATIONS),
            tutor_max_turns: env_usize("TUTOR_MAX_TURNS").unwrap_or(DEFAULT_TUTOR_MAX_TURNS),
            frontier_study_limit: env_usize("FRONTIER_STUDY_LIMIT")
                .unwrap_or(DEFAULT_FRONTIER_STUDY_LIMIT),
            catalog_base_url: env_string("CATALOG_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CATALOG_BASE_URL.to_string()),
            search_url: env_string("DOC_SEARCH_URL")
                .unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string()),
            locale: env_string("LOCALE").unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            collaborator_timeout: Duration::from_millis(
                env_u64("COLLABORATOR_TIMEOUT_MS").unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_MS),
            ),
            log_level: env_string("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key)?.parse().ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_string(key)?.parse().ok()
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key)?.parse().ok()
}

fn env_usize(key: &str) -> Option<usize> {
    env_string(key)?.parse().ok()
}
