//! Property-based tests for the review scheduler, ability estimator,
//! and concept graph.
//!
//! Invariants covered:
//! - easiness factor never drops below 1.3, intervals never below 1 day
//! - any grade below 3 restarts the repetition ladder
//! - theta moves only on hard-corrects (+0.5) and easy-incorrects (-0.3)
//! - item selection never leaves the requested difficulty band
//! - the estimator never exceeds the question cap
//! - built graphs stay acyclic with 15-25 nodes; frontier respects bounds
//! - session state survives a JSON round-trip

use std::collections::HashMap;

use chrono::Utc;
use proptest::prelude::*;

use certpath::collaborators::{DifficultyBand, Item, Objective};
use certpath::services::ability::{self, AbilityState};
use certpath::services::concept_graph::ConceptGraph;
use certpath::services::scheduler::{self, ReviewRecord, MIN_EASINESS};
use certpath::workflow::state::{Phase, SessionState};

fn arb_quality() -> impl Strategy<Value = u8> {
    0u8..=5
}

fn arb_objectives() -> impl Strategy<Value = Vec<Objective>> {
    (1usize..=12).prop_map(|n| {
        (0..n)
            .map(|i| Objective {
                id: format!("obj-{i}"),
                name: format!("Area {i}"),
                description: String::new(),
                weight_percent: 100.0 / n as f64,
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn easiness_and_interval_stay_in_bounds(qualities in proptest::collection::vec(arb_quality(), 1..30)) {
        let now = Utc::now();
        let mut record = ReviewRecord::new("c".into(), now);
        for quality in qualities {
            record = scheduler::grade(&record, quality, now).unwrap();
            prop_assert!(record.easiness_factor >= MIN_EASINESS - 1e-9);
            prop_assert!(record.interval_days >= 1.0);
            prop_assert!(record.due_at >= now);
        }
    }

    #[test]
    fn failing_grade_always_resets(
        qualities in proptest::collection::vec(arb_quality(), 0..20),
        failing in 0u8..3,
    ) {
        let now = Utc::now();
        let mut record = ReviewRecord::new("c".into(), now);
        for quality in qualities {
            record = scheduler::grade(&record, quality, now).unwrap();
        }
        let reset = scheduler::grade(&record, failing, now).unwrap();
        prop_assert_eq!(reset.repetitions, 0);
        prop_assert!((reset.interval_days - 1.0).abs() < 1e-9);
    }

    #[test]
    fn theta_moves_only_on_informative_responses(
        responses in proptest::collection::vec((0.0f64..1.0, any::<bool>()), 1..40)
    ) {
        let mut state = AbilityState::new();
        for (difficulty, correct) in responses {
            let before = state.theta;
            state.update(difficulty, correct);
            let delta = state.theta - before;
            if correct && difficulty >= before {
                prop_assert!((delta - 0.5).abs() < 1e-9);
            } else if !correct && difficulty < before {
                prop_assert!((delta + 0.3).abs() < 1e-9);
            } else {
                prop_assert!(delta.abs() < 1e-9);
            }
        }
    }

    #[test]
    fn estimator_terminates_within_cap(
        responses in proptest::collection::vec((0.0f64..1.0, any::<bool>()), 25)
    ) {
        let mut state = AbilityState::new();
        for (difficulty, correct) in responses {
            if state.is_converged(10, 20, 0.1) {
                break;
            }
            state.update(difficulty, correct);
        }
        prop_assert!(state.history.len() <= 20);
        prop_assert!(state.is_converged(10, 20, 0.1) || state.history.len() < 10);
    }

    #[test]
    fn selected_item_always_inside_band(
        difficulties in proptest::collection::vec(0.0f64..=1.0, 0..20),
        target in 0.05f64..=0.95,
    ) {
        let band = DifficultyBand {
            low: (target - 0.15).max(0.0),
            high: (target + 0.15).min(1.0),
        };
        let candidates: Vec<Item> = difficulties
            .iter()
            .enumerate()
            .map(|(i, &difficulty)| Item {
                id: format!("i{i}"),
                objective_id: "o".into(),
                difficulty,
                stem: String::new(),
                options: Vec::new(),
                explanation: String::new(),
            })
            .collect();
        let any_eligible = difficulties.iter().any(|&d| band.contains(d));
        match ability::select_item(candidates, band) {
            Some(item) => {
                prop_assert!(any_eligible);
                prop_assert!(band.contains(item.difficulty));
            }
            None => prop_assert!(!any_eligible),
        }
    }

    #[test]
    fn built_graphs_are_acyclic_and_sized(objectives in arb_objectives()) {
        let graph = ConceptGraph::build(&objectives, &AbilityState::new(), &HashMap::new()).unwrap();
        prop_assert!(graph.len() >= 15 && graph.len() <= 25);
        prop_assert!(graph.validate_acyclic());
    }

    #[test]
    fn frontier_matches_mastery_bounds(
        objectives in arb_objectives(),
        masteries in proptest::collection::vec(0.0f64..=1.0, 25),
    ) {
        let mut graph = ConceptGraph::build(&objectives, &AbilityState::new(), &HashMap::new()).unwrap();
        let ids: Vec<String> = graph.concepts().iter().map(|c| c.id.clone()).collect();
        for (id, mastery) in ids.iter().zip(&masteries) {
            graph.set_mastery(id, *mastery).unwrap();
        }
        let frontier = graph.frontier();
        for concept in graph.concepts() {
            let in_zone = concept.mastery >= 0.3 && concept.mastery <= 0.7;
            prop_assert_eq!(frontier.contains(&concept.id), in_zone);
        }
        let mut sorted = frontier.clone();
        sorted.sort();
        prop_assert_eq!(frontier, sorted);
    }

    #[test]
    fn session_state_json_round_trip(iteration in 0u32..4) {
        let mut state = SessionState::new("cert-x", Some("a@b.c".into()));
        state.iteration = iteration;
        state.phase = Phase::Scheduling;
        let json = serde_json::to_string(&state).unwrap();
        let mut restored: SessionState = serde_json::from_str(&json).unwrap();
        restored.reindex();
        prop_assert_eq!(restored.iteration, iteration);
        prop_assert_eq!(restored.phase, Phase::Scheduling);
        prop_assert_eq!(restored.session_id, state.session_id);
    }
}
