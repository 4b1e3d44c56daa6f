//! Adaptive ability estimation.
//!
//! A scalar ability estimate (theta) moves only on informative responses:
//! a correct answer at or above the current estimate raises it, an
//! incorrect answer below the estimate lowers it. Everything else is
//! evidence the estimate already predicted.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::collaborators::{DifficultyBand, Item};

pub const HARD_CORRECT_GAIN: f64 = 0.5;
pub const EASY_INCORRECT_LOSS: f64 = 0.3;
pub const BAND_HALF_WIDTH: f64 = 0.15;
const MIN_DIFFICULTY: f64 = 0.05;
const MAX_DIFFICULTY: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradedResponse {
    pub difficulty: f64,
    pub correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbilityState {
    pub theta: f64,
    pub history: Vec<GradedResponse>,
    #[serde(default)]
    last_delta: f64,
}

impl AbilityState {
    pub fn new() -> Self {
        Self {
            theta: 0.0,
            history: Vec::new(),
            last_delta: 0.0,
        }
    }

    /// Difficulty target for the next item: the logistic of theta, so the
    /// target starts at 0.5 and rises monotonically with ability.
    pub fn next_item(&self) -> f64 {
        sigmoid(self.theta)
    }

    pub fn next_band(&self) -> DifficultyBand {
        let target = self.next_item();
        DifficultyBand {
            low: (target - BAND_HALF_WIDTH).max(MIN_DIFFICULTY),
            high: (target + BAND_HALF_WIDTH).min(MAX_DIFFICULTY),
        }
    }

    pub fn update(&mut self, difficulty: f64, correct: bool) {
        let before = self.theta;
        if correct && difficulty >= self.theta {
            self.theta += HARD_CORRECT_GAIN;
        } else if !correct && difficulty < self.theta {
            self.theta -= EASY_INCORRECT_LOSS;
        }
        self.last_delta = (self.theta - before).abs();
        self.history.push(GradedResponse { difficulty, correct });
    }

    /// Stop once at least `min_questions` are answered and the estimate
    /// has settled, or unconditionally at `max_questions`.
    pub fn is_converged(&self, min_questions: usize, max_questions: usize, epsilon: f64) -> bool {
        if self.history.len() >= max_questions {
            return true;
        }
        self.history.len() >= min_questions && self.last_delta < epsilon
    }

    /// Fraction of responses answered correctly.
    pub fn score(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let correct = self.history.iter().filter(|r| r.correct).count();
        correct as f64 / self.history.len() as f64
    }
}

impl Default for AbilityState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// One answered diagnostic item with its attribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseLog {
    pub objective_id: String,
    pub difficulty: f64,
    pub correct: bool,
    pub confidence: f64,
}

/// Post-diagnostic summary: where the student stands per objective, and
/// how well their confidence tracked their correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub theta: f64,
    pub score: f64,
    pub objective_accuracy: std::collections::HashMap<String, f64>,
    /// Objectives answered below 50% accuracy, ascending by id.
    pub gaps: Vec<String>,
    /// Objectives answered at 80% accuracy or better, ascending by id.
    pub strengths: Vec<String>,
    /// All objectives ordered weakest first, the suggested study order.
    pub recommended_start: Vec<String>,
    /// Pearson correlation between stated confidence and correctness.
    /// Zero when either series is constant.
    pub calibration: f64,
}

impl DiagnosticReport {
    pub fn from_responses(state: &AbilityState, responses: &[ResponseLog]) -> Self {
        let mut per_objective: std::collections::HashMap<String, (usize, usize)> =
            std::collections::HashMap::new();
        for r in responses {
            let entry = per_objective.entry(r.objective_id.clone()).or_insert((0, 0));
            entry.0 += 1;
            if r.correct {
                entry.1 += 1;
            }
        }

        let objective_accuracy: std::collections::HashMap<String, f64> = per_objective
            .into_iter()
            .map(|(id, (total, correct))| (id, correct as f64 / total as f64))
            .collect();

        let mut gaps: Vec<String> = objective_accuracy
            .iter()
            .filter(|(_, &a)| a < 0.5)
            .map(|(id, _)| id.clone())
            .collect();
        gaps.sort();
        let mut strengths: Vec<String> = objective_accuracy
            .iter()
            .filter(|(_, &a)| a >= 0.8)
            .map(|(id, _)| id.clone())
            .collect();
        strengths.sort();

        let mut recommended_start: Vec<String> = objective_accuracy.keys().cloned().collect();
        recommended_start.sort_by(|a, b| {
            objective_accuracy[a]
                .total_cmp(&objective_accuracy[b])
                .then_with(|| a.cmp(b))
        });

        Self {
            theta: state.theta,
            score: state.score(),
            objective_accuracy,
            gaps,
            strengths,
            recommended_start,
            calibration: calibration(responses),
        }
    }

    /// Claim text when the diagnostic itself is put through verification.
    pub fn summary(&self) -> String {
        format!(
            "diagnostic estimate {:.2} with score {:.0}%, {} gap objectives and {} strengths",
            self.theta,
            self.score * 100.0,
            self.gaps.len(),
            self.strengths.len()
        )
    }
}

fn calibration(responses: &[ResponseLog]) -> f64 {
    if responses.len() < 2 {
        return 0.0;
    }
    let n = responses.len() as f64;
    let xs: Vec<f64> = responses.iter().map(|r| r.confidence).collect();
    let ys: Vec<f64> = responses
        .iter()
        .map(|r| if r.correct { 1.0 } else { 0.0 })
        .collect();
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(&ys) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
        var_y += (y - mean_y).powi(2);
    }
    if var_x == 0.0 || var_y == 0.0 {
        return 0.0;
    }
    cov / (var_x.sqrt() * var_y.sqrt())
}

/// Shuffles answer options in place so option position carries no signal.
/// Grading reads `is_correct` flags, so ordering never touches theta.
pub fn shuffle_options(item: &mut Item) {
    item.options.shuffle(&mut rand::rng());
}

/// Picks one candidate inside the band, shuffling eligible candidates so
/// presentation order carries no positional bias. `None` when nothing
/// falls in the band; theta never sees the shuffle.
pub fn select_item(candidates: Vec<Item>, band: DifficultyBand) -> Option<Item> {
    let mut eligible: Vec<Item> = candidates
        .into_iter()
        .filter(|i| band.contains(i.difficulty))
        .collect();
    eligible.shuffle(&mut rand::rng());
    eligible.into_iter().next()
}
