//! Session phases and the session-state aggregate.
//!
//! The phase enum is the single source of truth for where a session is;
//! every move goes through `transition_to`, which checks the transition
//! table and logs the hop. The only legal re-entry is the bounded
//! Scored -> Scheduling loop-back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{FailureInfo, WorkflowError};
use crate::services::ability::{AbilityState, DiagnosticReport};
use crate::services::concept_graph::ConceptGraph;
use crate::services::plan::StudyPlan;
use crate::services::scheduler::ReviewRecord;
use crate::services::tutor::TutorOutcome;
use crate::services::verification::VerificationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Start,
    Diagnosing,
    GraphBuilding,
    Verifying,
    Scheduling,
    AwaitingPlanConfirmation,
    Tutoring,
    AwaitingAssessmentReadiness,
    Assessing,
    Scored,
    Passed,
    Failed,
    ExhaustedRetries,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed | Self::ExhaustedRetries)
    }

    /// Phases reachable from this one. `Failed` is additionally reachable
    /// from every non-terminal phase.
    pub fn allowed_next(&self) -> &'static [Phase] {
        match self {
            Self::Start => &[Phase::Diagnosing],
            Self::Diagnosing => &[Phase::GraphBuilding],
            Self::GraphBuilding => &[Phase::Verifying],
            Self::Verifying => &[Phase::Scheduling],
            Self::Scheduling => &[Phase::AwaitingPlanConfirmation],
            Self::AwaitingPlanConfirmation => &[Phase::Tutoring],
            Self::Tutoring => &[Phase::AwaitingAssessmentReadiness],
            Self::AwaitingAssessmentReadiness => &[Phase::Assessing],
            Self::Assessing => &[Phase::Scored],
            Self::Scored => &[Phase::Passed, Phase::Scheduling, Phase::ExhaustedRetries],
            Self::Passed | Self::Failed | Self::ExhaustedRetries => &[],
        }
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        if next == Phase::Failed {
            return !self.is_terminal();
        }
        self.allowed_next().contains(&next)
    }

    /// How far through the journey this phase sits, for display layers.
    pub fn progress_percent(&self) -> u8 {
        match self {
            Self::Start => 0,
            Self::Diagnosing => 10,
            Self::GraphBuilding => 25,
            Self::Verifying => 35,
            Self::Scheduling => 45,
            Self::AwaitingPlanConfirmation => 50,
            Self::Tutoring => 65,
            Self::AwaitingAssessmentReadiness => 75,
            Self::Assessing => 85,
            Self::Scored => 90,
            Self::Passed | Self::Failed | Self::ExhaustedRetries => 100,
        }
    }
}

/// Everything a session owns. Mutated only by the workflow task; readers
/// get consistent snapshots published between phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: Uuid,
    pub certification_uid: String,
    pub recipient: Option<String>,
    pub phase: Phase,
    /// Remediation rounds consumed so far.
    pub iteration: u32,
    pub initial_ability: AbilityState,
    pub diagnostic_report: Option<DiagnosticReport>,
    pub graph: Option<ConceptGraph>,
    pub review_records: HashMap<String, ReviewRecord>,
    pub plan: Option<StudyPlan>,
    pub final_ability: Option<AbilityState>,
    pub final_score: Option<f64>,
    /// Set when the graph shipped without a trusted verification.
    pub graph_unverified: bool,
    pub verification_log: Vec<VerificationResult>,
    pub tutor_sessions: Vec<TutorOutcome>,
    /// Milestone subjects handed to the notifier, delivered or not.
    pub reminders: Vec<String>,
    pub failure: Option<FailureInfo>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(certification_uid: &str, recipient: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            certification_uid: certification_uid.to_string(),
            recipient,
            phase: Phase::Start,
            iteration: 0,
            initial_ability: AbilityState::new(),
            diagnostic_report: None,
            graph: None,
            review_records: HashMap::new(),
            plan: None,
            final_ability: None,
            final_score: None,
            graph_unverified: false,
            verification_log: Vec::new(),
            tutor_sessions: Vec::new(),
            reminders: Vec::new(),
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition_to(&mut self, next: Phase) -> Result<(), WorkflowError> {
        if !self.phase.can_transition_to(next) {
            return Err(WorkflowError::InvalidTransition { from: self.phase, to: next });
        }
        info!(
            session = %self.session_id,
            from = ?self.phase,
            to = ?next,
            iteration = self.iteration,
            "phase transition"
        );
        self.phase = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn add_verification(&mut self, result: VerificationResult) {
        self.verification_log.push(result);
        self.updated_at = Utc::now();
    }

    pub fn record_failure(&mut self, info: FailureInfo) {
        self.failure = Some(info);
        self.updated_at = Utc::now();
    }

    pub fn progress_percent(&self) -> u8 {
        self.phase.progress_percent()
    }

    /// Restores derived lookup structures after deserialization.
    pub fn reindex(&mut self) {
        if let Some(graph) = &mut self.graph {
            graph.reindex();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = SessionState::new("cert-x", None);
        let path = [
            Phase::Diagnosing,
            Phase::GraphBuilding,
            Phase::Verifying,
            Phase::Scheduling,
            Phase::AwaitingPlanConfirmation,
            Phase::Tutoring,
            Phase::AwaitingAssessmentReadiness,
            Phase::Assessing,
            Phase::Scored,
            Phase::Passed,
        ];
        for next in path {
            state.transition_to(next).unwrap();
        }
        assert!(state.phase.is_terminal());
        assert_eq!(state.progress_percent(), 100);
    }

    #[test]
    fn test_loop_back_is_the_only_reentry() {
        let mut state = SessionState::new("cert-x", None);
        state.phase = Phase::Scored;
        state.transition_to(Phase::Scheduling).unwrap();
        assert_eq!(state.phase, Phase::Scheduling);
    }

    #[test]
    fn test_skipping_phases_rejected() {
        let mut state = SessionState::new("cert-x", None);
        let err = state.transition_to(Phase::Assessing).unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
    }

    #[test]
    fn test_failed_reachable_from_any_nonterminal() {
        for phase in [Phase::Start, Phase::Diagnosing, Phase::Tutoring, Phase::Scored] {
            let mut state = SessionState::new("cert-x", None);
            state.phase = phase;
            state.transition_to(Phase::Failed).unwrap();
        }
    }

    #[test]
    fn test_terminal_phases_are_dead_ends() {
        for phase in [Phase::Passed, Phase::Failed, Phase::ExhaustedRetries] {
            let mut state = SessionState::new("cert-x", None);
            state.phase = phase;
            assert!(state.transition_to(Phase::Diagnosing).is_err());
            assert!(state.transition_to(Phase::Failed).is_err());
        }
    }

    #[test]
    fn test_progress_monotone_along_happy_path() {
        let path = [
            Phase::Start,
            Phase::Diagnosing,
            Phase::GraphBuilding,
            Phase::Verifying,
            Phase::Scheduling,
            Phase::AwaitingPlanConfirmation,
            Phase::Tutoring,
            Phase::AwaitingAssessmentReadiness,
            Phase::Assessing,
            Phase::Scored,
            Phase::Passed,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].progress_percent() < pair[1].progress_percent());
        }
    }

    #[test]
    fn test_state_serde_round_trip() {
        let state = SessionState::new("cert-x", Some("a@b.c".into()));
        let json = serde_json::to_string(&state).unwrap();
        let mut restored: SessionState = serde_json::from_str(&json).unwrap();
        restored.reindex();
        assert_eq!(restored.session_id, state.session_id);
        assert_eq!(restored.phase, Phase::Start);
    }
}
