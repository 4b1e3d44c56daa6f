//! Session orchestration.
//!
//! One `SessionWorkflow` drives one student session end to end:
//! diagnose, build and verify the concept graph, schedule, confirm the
//! plan, tutor, re-assess, and loop back on failure up to the iteration
//! cap. The workflow task is the sole writer of session state; readers
//! observe snapshots published between phases.

pub mod state;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::collaborators::catalog::fallback_objectives;
use crate::collaborators::{
    CatalogLookup, Checkpoint, DocVerifier, HumanSignal, Item, ItemAnswer, Notifier, Objective,
    TextOracle,
};
use crate::config::Config;
use crate::error::{FailureInfo, WorkflowError};
use crate::services::ability::{self, AbilityState, DiagnosticReport, ResponseLog};
use crate::services::concept_graph::{Concept, ConceptGraph, FRONTIER_LOW};
use crate::services::engagement::{self, Milestone};
use crate::services::plan;
use crate::services::scheduler;
use crate::services::tutor;
use crate::services::verification::VerificationGate;
use state::{Phase, SessionState};

pub struct SessionWorkflow<O, V, C, N, H> {
    config: Config,
    gate: VerificationGate,
    oracle: O,
    verifier: V,
    catalog: C,
    notifier: N,
    human: H,
    objectives: Vec<Objective>,
    state: SessionState,
    shared: Arc<RwLock<SessionState>>,
}

impl<O, V, C, N, H> SessionWorkflow<O, V, C, N, H>
where
    O: TextOracle,
    V: DocVerifier,
    C: CatalogLookup,
    N: Notifier,
    H: HumanSignal,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        oracle: O,
        verifier: V,
        catalog: C,
        notifier: N,
        human: H,
        certification_uid: &str,
        recipient: Option<String>,
    ) -> Self {
        let gate = VerificationGate::new(config.confidence_threshold);
        let state = SessionState::new(certification_uid, recipient);
        let shared = Arc::new(RwLock::new(state.clone()));
        Self {
            config,
            gate,
            oracle,
            verifier,
            catalog,
            notifier,
            human,
            objectives: Vec::new(),
            state,
            shared,
        }
    }

    /// Consistent snapshot of the session, safe to read from other tasks.
    pub fn shared_state(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.shared)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Drives the session from `Start` to a terminal phase. Collaborator
    /// failures that exhaust their retry budget land the session in
    /// `Failed` with the precipitating error recorded; the terminal phase
    /// is the return value either way.
    pub async fn run_full_pipeline(&mut self) -> Result<Phase, WorkflowError> {
        if self.state.phase != Phase::Start {
            return Err(WorkflowError::WrongPhase {
                expected: Phase::Start,
                actual: self.state.phase,
            });
        }
        match self.drive().await {
            Ok(phase) => Ok(phase),
            Err(e) => {
                self.fail(e);
                Ok(Phase::Failed)
            }
        }
    }

    async fn drive(&mut self) -> Result<Phase, WorkflowError> {
        self.run_diagnostic().await?;
        self.build_graph()?;
        self.verify_graph().await?;

        loop {
            self.schedule_plan().await?;
            self.confirm_plan().await?;
            self.run_tutoring().await?;
            self.begin_assessment().await?;
            match self.run_assessment_round().await? {
                Phase::Passed => return Ok(Phase::Passed),
                Phase::ExhaustedRetries => return Ok(Phase::ExhaustedRetries),
                _ => continue,
            }
        }
    }

    /// Adaptive diagnostic pass: objectives come from the catalog (with a
    /// generic fallback outline when it is unreachable) and items are
    /// generated one at a time at the estimator's requested band.
    pub async fn run_diagnostic(&mut self) -> Result<(), WorkflowError> {
        self.state.transition_to(Phase::Diagnosing)?;
        self.notify(Milestone::SessionStarted).await;
        self.publish();

        let uid = self.state.certification_uid.clone();
        self.objectives = match self.catalog.find_objectives(&uid).await {
            Ok(objectives) if !objectives.is_empty() => objectives,
            Ok(_) => fallback_objectives(&uid),
            Err(e) => {
                warn!(error = %e, "catalog objective lookup failed, using fallback outline");
                fallback_objectives(&uid)
            }
        };

        let (ability, responses) = self.adaptive_pass().await?;
        let report = DiagnosticReport::from_responses(&ability, &responses);
        info!(
            session = %self.state.session_id,
            theta = ability.theta,
            responses = responses.len(),
            gaps = report.gaps.len(),
            "diagnostic finished"
        );
        match self
            .gate
            .verify(&self.verifier, "diagnostic-report", &report.summary())
            .await
        {
            Ok(result) => self.state.add_verification(result),
            Err(e) => warn!(error = %e, "diagnostic verification unavailable"),
        }

        self.state.initial_ability = ability;
        self.state.diagnostic_report = Some(report);
        self.publish();
        Ok(())
    }

    /// One full adaptive question loop over the current objectives.
    async fn adaptive_pass(&self) -> Result<(AbilityState, Vec<ResponseLog>), WorkflowError> {
        if self.objectives.is_empty() {
            return Err(WorkflowError::NoObjectives);
        }
        let mut ability = AbilityState::new();
        let mut responses = Vec::new();
        let mut round = 0usize;

        while !ability.is_converged(
            self.config.min_questions,
            self.config.max_questions,
            self.config.theta_convergence,
        ) {
            let objective = self.objectives[round % self.objectives.len()].clone();
            round += 1;

            let band = ability.next_band();
            let generated = self
                .oracle
                .generate_item(&objective, band)
                .await
                .map_err(|e| {
                    warn!(error = %e, objective = %objective.id, "item generation failed");
                    WorkflowError::NoItemAvailable { objective_id: objective.id.clone() }
                })?;
            // an item outside the requested band carries no usable signal
            let mut item = ability::select_item(vec![generated], band).ok_or_else(|| {
                WorkflowError::NoItemAvailable { objective_id: objective.id.clone() }
            })?;
            ability::shuffle_options(&mut item);

            let answer = self.human.answer_item(&item).await;
            let (correct, confidence) = grade_answer(&item, answer.as_ref());
            ability.update(item.difficulty, correct);
            responses.push(ResponseLog {
                objective_id: item.objective_id,
                difficulty: item.difficulty,
                correct,
                confidence,
            });
        }
        Ok((ability, responses))
    }

    pub fn build_graph(&mut self) -> Result<(), WorkflowError> {
        self.state.transition_to(Phase::GraphBuilding)?;
        let accuracy = self
            .state
            .diagnostic_report
            .as_ref()
            .map(|r| r.objective_accuracy.clone())
            .unwrap_or_default();
        let graph = ConceptGraph::build(&self.objectives, &self.state.initial_ability, &accuracy)?;
        self.state.graph = Some(graph);
        self.publish();
        Ok(())
    }

    /// Verification of the graph is advisory: an unreachable verifier or
    /// a low-confidence verdict flags the graph instead of blocking.
    pub async fn verify_graph(&mut self) -> Result<(), WorkflowError> {
        self.state.transition_to(Phase::Verifying)?;
        let claim = match &self.state.graph {
            Some(graph) => graph_claim(&self.state.certification_uid, graph),
            None => String::new(),
        };

        match self.gate.verify(&self.verifier, "concept-graph", &claim).await {
            Ok(result) => {
                self.state.graph_unverified = !result.is_trusted(self.gate.threshold());
                self.state.add_verification(result);
            }
            Err(e) => {
                warn!(error = %e, "graph verification unavailable, proceeding unverified");
                self.state.graph_unverified = true;
            }
        }
        self.publish();
        Ok(())
    }

    pub async fn schedule_plan(&mut self) -> Result<(), WorkflowError> {
        self.state.transition_to(Phase::Scheduling)?;
        let now = Utc::now();

        if let Some(graph) = &self.state.graph {
            if self.state.review_records.is_empty() {
                self.state.review_records = scheduler::schedule(graph, now);
            }

            let mut plan = plan::assemble(
                &self.catalog,
                &self.state.certification_uid,
                graph,
                &self.state.review_records,
                now,
            )
            .await;

            match self.gate.verify(&self.verifier, "study-plan", &plan.summary()).await {
                Ok(result) => {
                    plan.unverified = !result.is_trusted(self.gate.threshold());
                    self.state.add_verification(result);
                }
                Err(e) => {
                    warn!(error = %e, "plan verification unavailable, proceeding unverified");
                    plan.unverified = true;
                }
            }
            self.state.plan = Some(plan);
        }

        self.notify(Milestone::PlanReady).await;
        self.publish();
        Ok(())
    }

    /// Suspends at the plan-confirmation checkpoint, then enters tutoring.
    pub async fn confirm_plan(&mut self) -> Result<(), WorkflowError> {
        self.await_checkpoint(Checkpoint::PlanConfirmation, Phase::AwaitingPlanConfirmation)
            .await
    }

    /// Suspends at the assessment-readiness checkpoint, then enters
    /// assessment.
    pub async fn begin_assessment(&mut self) -> Result<(), WorkflowError> {
        self.await_checkpoint(
            Checkpoint::AssessmentReadiness,
            Phase::AwaitingAssessmentReadiness,
        )
        .await
    }

    async fn await_checkpoint(
        &mut self,
        checkpoint: Checkpoint,
        phase: Phase,
    ) -> Result<(), WorkflowError> {
        self.state.transition_to(phase)?;
        self.publish();

        info!(
            session = %self.state.session_id,
            checkpoint = checkpoint.as_str(),
            "suspended awaiting human confirmation"
        );
        if !self.human.await_confirmation(checkpoint).await {
            return Err(WorkflowError::CheckpointDeclined(checkpoint));
        }

        match checkpoint {
            Checkpoint::PlanConfirmation => self.state.transition_to(Phase::Tutoring)?,
            Checkpoint::AssessmentReadiness => self.state.transition_to(Phase::Assessing)?,
        }
        self.publish();
        Ok(())
    }

    /// Tutors the frontier concepts, feeding each session's outcome back
    /// into mastery and the review schedule. When nothing sits in the
    /// zone, the weakest below-zone concepts are tutored instead.
    pub async fn run_tutoring(&mut self) -> Result<(), WorkflowError> {
        self.expect_phase(Phase::Tutoring)?;
        let targets: Vec<Concept> = match &self.state.graph {
            Some(graph) => {
                let mut ids = graph.frontier();
                if ids.is_empty() {
                    ids = graph.weak_areas(FRONTIER_LOW);
                }
                ids.into_iter()
                    .take(self.config.frontier_study_limit)
                    .filter_map(|id| graph.get(&id).cloned())
                    .collect()
            }
            None => Vec::new(),
        };

        for concept in targets {
            let outcome = tutor::run_session(&self.oracle, &concept, self.config.tutor_max_turns)
                .await
                .map_err(WorkflowError::Oracle)?;

            match self
                .gate
                .verify(&self.verifier, &concept.id, &outcome.summary())
                .await
            {
                Ok(result) => self.state.add_verification(result),
                Err(e) => warn!(error = %e, concept = %concept.id, "tutoring verification unavailable"),
            }

            let now = Utc::now();
            let quality = quality_from_delta(outcome.mastery_delta);
            if let Some(graph) = &mut self.state.graph {
                graph.adjust_mastery(&concept.id, outcome.mastery_delta)?;
                graph.mark_reviewed(&concept.id, now)?;
            }
            if let Some(record) = self.state.review_records.get(&concept.id) {
                let next = scheduler::grade(record, quality, now)?;
                self.state.review_records.insert(concept.id.clone(), next);
            }
            self.state.tutor_sessions.push(outcome);
        }
        self.publish();
        Ok(())
    }

    /// Final assessment: a fresh estimator pass whose history does not
    /// carry over from the diagnostic. Resolves the score into `Passed`,
    /// a loop-back (session stays at `Scored`, ready to re-schedule), or
    /// `ExhaustedRetries`, and returns the resulting phase.
    pub async fn run_assessment_round(&mut self) -> Result<Phase, WorkflowError> {
        self.expect_phase(Phase::Assessing)?;
        let (ability, responses) = self.adaptive_pass().await?;
        let report = DiagnosticReport::from_responses(&ability, &responses);
        let score = ability.score();

        self.state.final_ability = Some(ability);
        self.state.final_score = Some(score);
        self.state.transition_to(Phase::Scored)?;
        info!(session = %self.state.session_id, score, "assessment scored");

        if score >= self.config.pass_threshold {
            self.state.transition_to(Phase::Passed)?;
            self.notify(Milestone::AssessmentPassed).await;
            self.publish();
            return Ok(Phase::Passed);
        }

        if self.state.iteration < self.config.max_iterations {
            self.state.iteration += 1;
            info!(
                session = %self.state.session_id,
                iteration = self.state.iteration,
                score,
                "assessment below pass bar, looping back"
            );
            self.blend_mastery(&report.objective_accuracy)?;
            self.notify(Milestone::AssessmentFailed { iteration: self.state.iteration })
                .await;
            self.publish();
            return Ok(Phase::Scored);
        }

        let err = WorkflowError::ExhaustedRetries { iterations: self.state.iteration };
        self.state
            .record_failure(FailureInfo::from_error(self.state.phase, &err));
        self.state.transition_to(Phase::ExhaustedRetries)?;
        self.notify(Milestone::RetriesExhausted).await;
        self.publish();
        Ok(Phase::ExhaustedRetries)
    }

    /// Loop-back remediation: pull each concept's mastery halfway toward
    /// the accuracy the failed assessment showed for its objective.
    fn blend_mastery(&mut self, accuracy: &HashMap<String, f64>) -> Result<(), WorkflowError> {
        if let Some(graph) = &mut self.state.graph {
            let updates: Vec<(String, f64)> = graph
                .concepts()
                .iter()
                .filter_map(|c| {
                    accuracy
                        .get(&c.objective_id)
                        .map(|&a| (c.id.clone(), (c.mastery + a) / 2.0))
                })
                .collect();
            for (id, value) in updates {
                graph.set_mastery(&id, value)?;
            }
        }
        Ok(())
    }

    /// Steps that do not open with a transition still refuse to run in
    /// the wrong phase before touching any state.
    fn expect_phase(&self, expected: Phase) -> Result<(), WorkflowError> {
        if self.state.phase != expected {
            return Err(WorkflowError::WrongPhase { expected, actual: self.state.phase });
        }
        Ok(())
    }

    async fn notify(&mut self, milestone: Milestone) {
        if let Some(recipient) = &self.state.recipient {
            engagement::notify(&self.oracle, &self.notifier, recipient, milestone).await;
            self.state.reminders.push(milestone.subject().to_string());
        }
    }

    fn fail(&mut self, error: WorkflowError) {
        let info = FailureInfo::from_error(self.state.phase, &error);
        warn!(
            session = %self.state.session_id,
            phase = ?info.phase,
            kind = ?info.kind,
            detail = %info.detail,
            "session failed"
        );
        self.state.record_failure(info);
        if self.state.phase.can_transition_to(Phase::Failed) {
            // transition into Failed is valid from every non-terminal phase
            let _ = self.state.transition_to(Phase::Failed);
        }
        self.publish();
    }

    fn publish(&self) {
        *self.shared.write() = self.state.clone();
    }
}

/// Grades a response against the item's answer key. A missing answer
/// (no live student attached) grades as incorrect at neutral confidence,
/// as does an item carrying no answer key at all.
fn grade_answer(item: &Item, answer: Option<&ItemAnswer>) -> (bool, f64) {
    let Some(answer) = answer else {
        return (false, 0.5);
    };
    let mut correct_keys: Vec<&str> = item
        .options
        .iter()
        .filter(|o| o.is_correct)
        .map(|o| o.key.as_str())
        .collect();
    if correct_keys.is_empty() {
        return (false, answer.confidence.clamp(0.0, 1.0));
    }
    correct_keys.sort_unstable();
    let mut selected: Vec<&str> = answer.selected_keys.iter().map(|k| k.as_str()).collect();
    selected.sort_unstable();
    (selected == correct_keys, answer.confidence.clamp(0.0, 1.0))
}

fn graph_claim(certification_uid: &str, graph: &ConceptGraph) -> String {
    format!(
        "concept graph for {} with {} concepts and average mastery {:.2}",
        certification_uid,
        graph.len(),
        graph.average_mastery()
    )
}

/// SM-2 recall quality implied by a tutoring session's mastery movement.
fn quality_from_delta(delta: f64) -> u8 {
    if delta >= 0.08 {
        5
    } else if delta >= 0.04 {
        4
    } else if delta > 0.0 {
        3
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::AnswerOption;

    fn item(correct_key: &str) -> Item {
        Item {
            id: "i".into(),
            objective_id: "o".into(),
            difficulty: 0.5,
            stem: "?".into(),
            options: ["a", "b"]
                .iter()
                .map(|k| AnswerOption {
                    key: (*k).to_string(),
                    text: String::new(),
                    is_correct: *k == correct_key,
                })
                .collect(),
            explanation: String::new(),
        }
    }

    #[test]
    fn test_grade_answer_exact_match() {
        let item = item("b");
        let answer = ItemAnswer { selected_keys: vec!["b".into()], confidence: 0.9 };
        assert_eq!(grade_answer(&item, Some(&answer)), (true, 0.9));

        let wrong = ItemAnswer { selected_keys: vec!["a".into()], confidence: 0.9 };
        assert!(!grade_answer(&item, Some(&wrong)).0);
    }

    #[test]
    fn test_missing_answer_grades_incorrect() {
        let (correct, confidence) = grade_answer(&item("a"), None);
        assert!(!correct);
        assert!((confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_keyless_item_never_grades_correct() {
        let mut item = item("a");
        for option in &mut item.options {
            option.is_correct = false;
        }
        let empty = ItemAnswer { selected_keys: Vec::new(), confidence: 0.9 };
        assert!(!grade_answer(&item, Some(&empty)).0);
    }

    #[test]
    fn test_quality_from_delta_bands() {
        assert_eq!(quality_from_delta(0.1), 5);
        assert_eq!(quality_from_delta(0.05), 4);
        assert_eq!(quality_from_delta(0.01), 3);
        assert_eq!(quality_from_delta(-0.02), 2);
    }
}
