//! Spaced-review scheduling, SM-2 family.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::concept_graph::ConceptGraph;

pub const INITIAL_EASINESS: f64 = 2.5;
pub const MIN_EASINESS: f64 = 1.3;
const SECOND_INTERVAL_DAYS: f64 = 6.0;

#[derive(Debug, Error, PartialEq)]
pub enum SchedulerError {
    #[error("recall quality {0} outside 0..=5")]
    InvalidGrade(u8),
    #[error("no review record for concept {0}")]
    UnknownConcept(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub concept_id: String,
    pub interval_days: f64,
    pub easiness_factor: f64,
    pub repetitions: u32,
    pub due_at: DateTime<Utc>,
}

impl ReviewRecord {
    pub fn new(concept_id: String, now: DateTime<Utc>) -> Self {
        Self {
            concept_id,
            interval_days: 1.0,
            easiness_factor: INITIAL_EASINESS,
            repetitions: 0,
            due_at: now + Duration::days(1),
        }
    }
}

/// Fresh review records for every concept in the graph.
pub fn schedule(graph: &ConceptGraph, now: DateTime<Utc>) -> HashMap<String, ReviewRecord> {
    graph
        .concepts()
        .iter()
        .map(|c| (c.id.clone(), ReviewRecord::new(c.id.clone(), now)))
        .collect()
}

/// Applies one recall grade. Quality below 3 restarts the repetition
/// ladder; otherwise the interval grows by the easiness factor held
/// before this grade, rounded up to whole days. The easiness factor
/// itself is adjusted on every grade and floored at 1.3.
pub fn grade(
    record: &ReviewRecord,
    quality: u8,
    now: DateTime<Utc>,
) -> Result<ReviewRecord, SchedulerError> {
    if quality > 5 {
        return Err(SchedulerError::InvalidGrade(quality));
    }

    let mut next = record.clone();
    if quality < 3 {
        next.repetitions = 0;
        next.interval_days = 1.0;
    } else {
        next.repetitions += 1;
        next.interval_days = match next.repetitions {
            1 => 1.0,
            2 => SECOND_INTERVAL_DAYS,
            _ => (record.interval_days * record.easiness_factor).ceil(),
        };
    }

    let shortfall = (5 - quality) as f64;
    next.easiness_factor =
        (record.easiness_factor + 0.1 - shortfall * (0.08 + shortfall * 0.02)).max(MIN_EASINESS);
    next.due_at = now + Duration::days(next.interval_days as i64);
    Ok(next)
}

/// Maps an observed response to an SM-2 recall quality. Confidence
/// separates fluent recall from hesitant recall, and confident errors
/// from honest blanks.
pub fn recall_quality(correct: bool, confidence: f64) -> u8 {
    match (correct, confidence) {
        (true, c) if c >= 0.8 => 5,
        (true, c) if c >= 0.5 => 4,
        (true, _) => 3,
        (false, c) if c >= 0.8 => 1,
        (false, c) if c >= 0.5 => 2,
        (false, _) => 0,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekBucket {
    pub week_index: u32,
    pub concept_ids: Vec<String>,
}

/// Groups records by the 7-day window their due date falls in, relative
/// to `now`. Already-due records land in week 0. Read-only view.
pub fn weekly_buckets(
    records: &HashMap<String, ReviewRecord>,
    now: DateTime<Utc>,
) -> Vec<WeekBucket> {
    let mut by_week: HashMap<u32, Vec<String>> = HashMap::new();
    for record in records.values() {
        let days_out = (record.due_at - now).num_days().max(0);
        let week = (days_out / 7) as u32;
        by_week.entry(week).or_default().push(record.concept_id.clone());
    }

    let mut buckets: Vec<WeekBucket> = by_week
        .into_iter()
        .map(|(week_index, mut concept_ids)| {
            concept_ids.sort();
            WeekBucket { week_index, concept_ids }
        })
        .collect();
    buckets.sort_by_key(|b| b.week_index);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::Objective;
    use crate::services::ability::AbilityState;

    fn record() -> ReviewRecord {
        ReviewRecord::new("c1".into(), Utc::now())
    }

    #[test]
    fn test_low_quality_resets_ladder() {
        let mut r = record();
        r.repetitions = 4;
        r.interval_days = 30.0;
        let next = grade(&r, 2, Utc::now()).unwrap();
        assert_eq!(next.repetitions, 0);
        assert!((next.interval_days - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_interval_ladder_one_six_then_growth() {
        let now = Utc::now();
        let first = grade(&record(), 5, now).unwrap();
        assert!((first.interval_days - 1.0).abs() < 1e-9);
        let second = grade(&first, 5, now).unwrap();
        assert!((second.interval_days - 6.0).abs() < 1e-9);
        let third = grade(&second, 5, now).unwrap();
        // 6 * EF(after two perfect grades: 2.5 + 0.1 + 0.1 = 2.7), ceiled
        assert!((third.interval_days - (6.0_f64 * 2.7).ceil()).abs() < 1e-9);
    }

    #[test]
    fn test_easiness_floor() {
        let mut r = record();
        r.easiness_factor = 1.31;
        let next = grade(&r, 0, Utc::now()).unwrap();
        assert!((next.easiness_factor - MIN_EASINESS).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_grade_rejected() {
        assert_eq!(grade(&record(), 6, Utc::now()).unwrap_err(), SchedulerError::InvalidGrade(6));
    }

    #[test]
    fn test_schedule_covers_graph() {
        let objectives: Vec<Objective> = (0..4)
            .map(|i| Objective {
                id: format!("obj-{i}"),
                name: format!("Area {i}"),
                description: String::new(),
                weight_percent: 25.0,
            })
            .collect();
        let graph = ConceptGraph::build(
            &objectives,
            &AbilityState::new(),
            &HashMap::new(),
        )
        .unwrap();
        let records = schedule(&graph, Utc::now());
        assert_eq!(records.len(), graph.len());
        assert!(records.values().all(|r| r.repetitions == 0));
        assert!(records
            .values()
            .all(|r| (r.easiness_factor - INITIAL_EASINESS).abs() < 1e-9));
    }

    #[test]
    fn test_recall_quality_bands() {
        assert_eq!(recall_quality(true, 0.9), 5);
        assert_eq!(recall_quality(true, 0.6), 4);
        assert_eq!(recall_quality(true, 0.2), 3);
        assert_eq!(recall_quality(false, 0.9), 1);
        assert_eq!(recall_quality(false, 0.6), 2);
        assert_eq!(recall_quality(false, 0.1), 0);
    }

    #[test]
    fn test_weekly_buckets_group_by_due_window() {
        let now = Utc::now();
        let mut records = HashMap::new();
        for (id, days) in [("a", 1), ("b", 6), ("c", 8), ("d", 20)] {
            let mut r = ReviewRecord::new(id.into(), now);
            r.due_at = now + Duration::days(days);
            records.insert(id.to_string(), r);
        }
        let buckets = weekly_buckets(&records, now);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].concept_ids, vec!["a", "b"]);
        assert_eq!(buckets[1].concept_ids, vec!["c"]);
        assert_eq!(buckets[2].concept_ids, vec!["d"]);
    }
}
