//! Socratic tutoring over frontier concepts.
//!
//! Each session walks one concept up the Bloom ladder: the dialogue
//! starts at the level the current mastery supports and climbs as turns
//! accumulate. The oracle writes the dialogue; this module owns pacing,
//! the ladder, and the mastery adjustment the session yields.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collaborators::{BloomLevel, OracleError, TextOracle, TranscriptEntry};
use crate::services::concept_graph::Concept;

/// Cap on how far one dialogue turn may move mastery.
const MAX_TURN_DELTA: f64 = 0.1;
/// Turns spent at a level before climbing to the next.
const TURNS_PER_LEVEL: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorOutcome {
    pub concept_id: String,
    pub transcript: Vec<TranscriptEntry>,
    pub mastery_delta: f64,
    pub final_level: BloomLevel,
    pub reference_urls: Vec<String>,
}

impl TutorOutcome {
    /// One-line account of the session, used when the outcome itself is
    /// submitted for verification.
    pub fn summary(&self) -> String {
        format!(
            "tutoring on {} reached the {} level over {} turns",
            self.concept_id,
            self.final_level.as_str(),
            self.transcript.len()
        )
    }
}

/// Entry level supported by current mastery.
pub fn starting_level(mastery: f64) -> BloomLevel {
    if mastery < 0.3 {
        BloomLevel::Remember
    } else if mastery < 0.5 {
        BloomLevel::Understand
    } else if mastery < 0.7 {
        BloomLevel::Apply
    } else {
        BloomLevel::Analyze
    }
}

pub fn next_level(level: BloomLevel) -> BloomLevel {
    match level {
        BloomLevel::Remember => BloomLevel::Understand,
        BloomLevel::Understand => BloomLevel::Apply,
        BloomLevel::Apply => BloomLevel::Analyze,
        BloomLevel::Analyze => BloomLevel::Evaluate,
        BloomLevel::Evaluate | BloomLevel::Create => BloomLevel::Create,
    }
}

/// Runs one bounded dialogue for a concept.
pub async fn run_session<O: TextOracle>(
    oracle: &O,
    concept: &Concept,
    max_turns: usize,
) -> Result<TutorOutcome, OracleError> {
    let mut level = starting_level(concept.mastery);
    let mut transcript: Vec<TranscriptEntry> = Vec::new();
    let mut mastery_delta = 0.0;
    let mut reference_urls = Vec::new();

    for turn_index in 0..max_turns {
        let turn = oracle
            .generate_dialogue_turn(&concept.name, level, &transcript)
            .await?;

        transcript.push(TranscriptEntry {
            role: "tutor".into(),
            content: turn.message,
        });
        mastery_delta += turn.mastery_delta.clamp(-MAX_TURN_DELTA, MAX_TURN_DELTA);
        if let Some(url) = turn.reference_url {
            reference_urls.push(url);
        }

        if turn.concluded {
            break;
        }
        if (turn_index + 1) % TURNS_PER_LEVEL == 0 {
            level = next_level(level);
        }
    }

    debug!(
        concept = %concept.id,
        turns = transcript.len(),
        mastery_delta,
        "tutoring session finished"
    );
    Ok(TutorOutcome {
        concept_id: concept.id.clone(),
        transcript,
        mastery_delta,
        final_level: level,
        reference_urls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::MockOracle;

    fn concept(mastery: f64) -> Concept {
        Concept {
            id: "obj-1-c01".into(),
            name: "Networking: fundamentals".into(),
            objective_id: "obj-1".into(),
            prerequisites: Vec::new(),
            mastery,
            last_reviewed: None,
        }
    }

    #[test]
    fn test_starting_level_tracks_mastery() {
        assert_eq!(starting_level(0.1), BloomLevel::Remember);
        assert_eq!(starting_level(0.4), BloomLevel::Understand);
        assert_eq!(starting_level(0.6), BloomLevel::Apply);
        assert_eq!(starting_level(0.9), BloomLevel::Analyze);
    }

    #[test]
    fn test_ladder_tops_out_at_create() {
        assert_eq!(next_level(BloomLevel::Create), BloomLevel::Create);
    }

    #[tokio::test]
    async fn test_session_bounded_by_max_turns() {
        let oracle = MockOracle::new();
        let outcome = run_session(&oracle, &concept(0.4), 3).await.unwrap();
        assert!(outcome.transcript.len() <= 3);
        assert!(outcome.mastery_delta > 0.0);
    }

    #[tokio::test]
    async fn test_session_stops_when_dialogue_concludes() {
        // mock oracle concludes once the history holds 4 entries
        let oracle = MockOracle::new();
        let outcome = run_session(&oracle, &concept(0.4), 10).await.unwrap();
        assert_eq!(outcome.transcript.len(), 5);
    }
}
