//! Deterministic collaborator mocks for tests and offline demos.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{
    BloomLevel, CatalogError, CatalogLookup, Checkpoint, Claim, ConceptQuery, DialogueTurn,
    DifficultyBand, DocCheck, DocVerifier, HumanSignal, Item, ItemAnswer, ModuleLink, Notifier,
    NotifyError, Objective, OracleError, TextOracle, Tone, TranscriptEntry,
};

/// Generates items and dialogue deterministically. Item difficulty is the
/// band midpoint and option "a" is always correct, which keeps scripted
/// answering trivial.
#[derive(Clone, Default)]
pub struct MockOracle {
    item_counter: Arc<Mutex<u64>>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items_generated(&self) -> u64 {
        *self.item_counter.lock()
    }
}

impl TextOracle for MockOracle {
    async fn generate_item(
        &self,
        objective: &Objective,
        band: DifficultyBand,
    ) -> Result<Item, OracleError> {
        let n = {
            let mut counter = self.item_counter.lock();
            *counter += 1;
            *counter
        };
        let options = ["a", "b", "c", "d"]
            .iter()
            .map(|key| super::AnswerOption {
                key: (*key).to_string(),
                text: format!("Option {key} for {}", objective.name),
                is_correct: *key == "a",
            })
            .collect();
        Ok(Item {
            id: format!("mock-item-{n}"),
            objective_id: objective.id.clone(),
            difficulty: band.midpoint(),
            stem: format!("Question {n} on {}", objective.name),
            options,
            explanation: format!("Option a is correct for {}", objective.name),
        })
    }

    async fn generate_dialogue_turn(
        &self,
        concept_name: &str,
        bloom: BloomLevel,
        history: &[TranscriptEntry],
    ) -> Result<DialogueTurn, OracleError> {
        Ok(DialogueTurn {
            message: format!("What do you already know about {concept_name}?"),
            bloom_level: bloom,
            mastery_delta: 0.05,
            reference_url: None,
            concluded: history.len() >= 4,
        })
    }

    async fn generate_message(&self, tone: Tone, context: &str) -> Result<String, OracleError> {
        Ok(format!("[{}] {context}", tone.as_str()))
    }
}

/// Returns scripted confidences in order; once the script runs out every
/// check scores `default_confidence`.
#[derive(Clone)]
pub struct MockVerifier {
    scripted: Arc<Mutex<VecDeque<f64>>>,
    default_confidence: f64,
    calls: Arc<Mutex<u32>>,
}

impl MockVerifier {
    pub fn passing() -> Self {
        Self::with_default(0.9)
    }

    pub fn with_default(default_confidence: f64) -> Self {
        Self {
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            default_confidence,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_script(confidences: impl IntoIterator<Item = f64>) -> Self {
        let verifier = Self::with_default(0.9);
        verifier.scripted.lock().extend(confidences);
        verifier
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock()
    }
}

impl DocVerifier for MockVerifier {
    async fn check(&self, claim: &Claim) -> Result<DocCheck, super::VerifierError> {
        *self.calls.lock() += 1;
        let confidence = self
            .scripted
            .lock()
            .pop_front()
            .unwrap_or(self.default_confidence);

        let (issues, corrections) = if confidence < 0.7 {
            (
                vec![format!("unsupported statement about {}", claim.subject_ref)],
                vec![format!("revised: {}", claim.content)],
            )
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(DocCheck {
            confidence,
            issues,
            corrections,
            source_refs: vec!["https://learn.microsoft.com/mock".into()],
        })
    }
}

/// Serves a fixed objective outline and one module link per concept.
/// `failing()` simulates a catalog outage.
#[derive(Clone)]
pub struct MockCatalog {
    objectives: Vec<Objective>,
    failing: bool,
}

impl MockCatalog {
    pub fn new(objectives: Vec<Objective>) -> Self {
        Self { objectives, failing: false }
    }

    pub fn with_default_outline() -> Self {
        Self::new(super::catalog::fallback_objectives("mock-cert"))
    }

    pub fn failing() -> Self {
        Self { objectives: Vec::new(), failing: true }
    }
}

impl CatalogLookup for MockCatalog {
    async fn find_objectives(
        &self,
        certification_uid: &str,
    ) -> Result<Vec<Objective>, CatalogError> {
        if self.failing {
            return Err(CatalogError::NotFound(certification_uid.to_string()));
        }
        Ok(self.objectives.clone())
    }

    async fn find_modules(
        &self,
        concepts: &[ConceptQuery],
    ) -> Result<HashMap<String, Vec<ModuleLink>>, CatalogError> {
        if self.failing {
            return Err(CatalogError::NotFound("modules".into()));
        }
        Ok(concepts
            .iter()
            .map(|c| {
                (
                    c.id.clone(),
                    vec![ModuleLink {
                        title: format!("Learn {}", c.name),
                        url: format!("https://learn.microsoft.com/mock/{}", c.id),
                    }],
                )
            })
            .collect())
    }
}

/// Records every message; `failing()` rejects all sends so callers can
/// prove delivery failures stay harmless.
#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    failing: bool,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { sent: Arc::new(Mutex::new(Vec::new())), failing: true }
    }

    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().clone()
    }
}

impl Notifier for MockNotifier {
    async fn send(&self, recipient: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        if self.failing {
            return Err(NotifyError::NotConfigured("mock"));
        }
        self.sent
            .lock()
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScriptedAnswer {
    pub correct: bool,
    pub confidence: f64,
}

impl ScriptedAnswer {
    pub fn right(confidence: f64) -> Self {
        Self { correct: true, confidence }
    }

    pub fn wrong(confidence: f64) -> Self {
        Self { correct: false, confidence }
    }
}

/// Approves every checkpoint and answers items from a script. An empty
/// script yields `None`, which the workflow grades as incorrect.
#[derive(Clone)]
pub struct ScriptedHuman {
    approvals: bool,
    answers: Arc<Mutex<VecDeque<ScriptedAnswer>>>,
}

impl ScriptedHuman {
    pub fn approving(answers: impl IntoIterator<Item = ScriptedAnswer>) -> Self {
        Self {
            approvals: true,
            answers: Arc::new(Mutex::new(answers.into_iter().collect())),
        }
    }

    /// Declines every checkpoint.
    pub fn declining() -> Self {
        Self {
            approvals: false,
            answers: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Answers every item correctly with the given confidence.
    pub fn always_right(confidence: f64) -> Self {
        let human = Self::approving([]);
        human
            .answers
            .lock()
            .extend(std::iter::repeat(ScriptedAnswer::right(confidence)).take(1_000));
        human
    }

    /// Answers every item incorrectly with the given confidence.
    pub fn always_wrong(confidence: f64) -> Self {
        let human = Self::approving([]);
        human
            .answers
            .lock()
            .extend(std::iter::repeat(ScriptedAnswer::wrong(confidence)).take(1_000));
        human
    }
}

impl HumanSignal for ScriptedHuman {
    async fn await_confirmation(&self, _checkpoint: Checkpoint) -> bool {
        self.approvals
    }

    async fn answer_item(&self, item: &Item) -> Option<ItemAnswer> {
        let script = self.answers.lock().pop_front()?;
        let selected = item
            .options
            .iter()
            .find(|o| o.is_correct == script.correct)
            .map(|o| o.key.clone())?;
        Some(ItemAnswer {
            selected_keys: vec![selected],
            confidence: script.confidence,
        })
    }
}
