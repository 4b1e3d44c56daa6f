//! External-collaborator contracts.
//!
//! The orchestration core drives five narrow capabilities: a text-generation
//! oracle, a documentation verifier, a catalog lookup, a notification
//! channel, and the human-in-the-loop signal. Each is a trait so the
//! workflow can be assembled with HTTP-backed clients in production and
//! deterministic mocks in tests and demos.

pub mod catalog;
pub mod doc_verifier;
pub mod mock;
pub mod notifier;
pub mod oracle;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use catalog::HttpCatalog;
pub use doc_verifier::HttpDocVerifier;
pub use notifier::EmailNotifier;
pub use oracle::HttpOracle;

/// A single objective/skill area measured by the certification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub name: String,
    pub description: String,
    pub weight_percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerOption {
    pub key: String,
    pub text: String,
    pub is_correct: bool,
}

/// An assessment item produced by the oracle for one objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub objective_id: String,
    pub difficulty: f64,
    pub stem: String,
    pub options: Vec<AnswerOption>,
    pub explanation: String,
}

/// Target difficulty window for the next item, centered on the
/// estimator's request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DifficultyBand {
    pub low: f64,
    pub high: f64,
}

impl DifficultyBand {
    pub fn contains(&self, difficulty: f64) -> bool {
        difficulty >= self.low && difficulty <= self.high
    }

    pub fn midpoint(&self) -> f64 {
        (self.low + self.high) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BloomLevel {
    Remember,
    Understand,
    Apply,
    Analyze,
    Evaluate,
    Create,
}

impl BloomLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remember => "remember",
            Self::Understand => "understand",
            Self::Apply => "apply",
            Self::Analyze => "analyze",
            Self::Evaluate => "evaluate",
            Self::Create => "create",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
}

/// One tutor utterance, with the mastery adjustment it suggests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub message: String,
    pub bloom_level: BloomLevel,
    pub mastery_delta: f64,
    #[serde(default)]
    pub reference_url: Option<String>,
    #[serde(default)]
    pub concluded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Motivational,
    Empathetic,
    Urgent,
    Celebration,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Motivational => "motivational",
            Self::Empathetic => "empathetic",
            Self::Urgent => "urgent",
            Self::Celebration => "celebration",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    Standard,
    Adversarial,
}

/// A claim submitted to the documentation verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub subject_ref: String,
    pub content: String,
    pub framing: Framing,
}

/// Verifier response for a single claim check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocCheck {
    pub confidence: f64,
    pub issues: Vec<String>,
    #[serde(default)]
    pub corrections: Vec<String>,
    #[serde(default)]
    pub source_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleLink {
    pub title: String,
    pub url: String,
}

/// Concept identity passed to catalog lookups; the name improves title
/// matching on the catalog side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptQuery {
    pub id: String,
    pub name: String,
}

/// The two indefinite human-in-the-loop suspension points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    PlanConfirmation,
    AssessmentReadiness,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanConfirmation => "plan_confirmation",
            Self::AssessmentReadiness => "assessment_readiness",
        }
    }
}

/// A student's response to a presented item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemAnswer {
    pub selected_keys: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyResponse,
    #[error("malformed completion: {0}")]
    Malformed(&'static str),
}

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("verifier not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no catalog entry for {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notifier not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Question/dialogue/message generation. Retries with exponential backoff
/// live inside implementations; errors surfacing here have already
/// exhausted them.
#[allow(async_fn_in_trait)]
pub trait TextOracle {
    async fn generate_item(
        &self,
        objective: &Objective,
        band: DifficultyBand,
    ) -> Result<Item, OracleError>;

    async fn generate_dialogue_turn(
        &self,
        concept_name: &str,
        bloom: BloomLevel,
        history: &[TranscriptEntry],
    ) -> Result<DialogueTurn, OracleError>;

    async fn generate_message(&self, tone: Tone, context: &str) -> Result<String, OracleError>;
}

/// Documentation-backed fact check. A single attempt; the verification
/// gate owns the transport retry policy.
#[allow(async_fn_in_trait)]
pub trait DocVerifier {
    async fn check(&self, claim: &Claim) -> Result<DocCheck, VerifierError>;
}

#[allow(async_fn_in_trait)]
pub trait CatalogLookup {
    async fn find_objectives(&self, certification_uid: &str)
        -> Result<Vec<Objective>, CatalogError>;

    async fn find_modules(
        &self,
        concepts: &[ConceptQuery],
    ) -> Result<HashMap<String, Vec<ModuleLink>>, CatalogError>;
}

#[allow(async_fn_in_trait)]
pub trait Notifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Human-in-the-loop channel. `await_confirmation` suspends indefinitely
/// (no core-side timeout); `answer_item` returns `None` when no live
/// student is attached, which grades as an incorrect auto-answer.
#[allow(async_fn_in_trait)]
pub trait HumanSignal {
    async fn await_confirmation(&self, checkpoint: Checkpoint) -> bool;

    async fn answer_item(&self, item: &Item) -> Option<ItemAnswer>;
}
