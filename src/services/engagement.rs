//! Engagement nudges around workflow milestones.
//!
//! Message delivery is fire-and-forget: generation or delivery failures
//! are logged and swallowed so a flaky notifier can never stall a phase
//! transition.

use tracing::{info, warn};

use crate::collaborators::{Notifier, TextOracle, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Milestone {
    SessionStarted,
    PlanReady,
    AssessmentFailed { iteration: u32 },
    AssessmentPassed,
    RetriesExhausted,
}

impl Milestone {
    pub fn tone(&self) -> Tone {
        match self {
            Self::SessionStarted | Self::PlanReady => Tone::Motivational,
            Self::AssessmentFailed { .. } => Tone::Empathetic,
            Self::AssessmentPassed => Tone::Celebration,
            Self::RetriesExhausted => Tone::Urgent,
        }
    }

    fn context(&self) -> String {
        match self {
            Self::SessionStarted => "The study session has just begun.".into(),
            Self::PlanReady => "A personalized study plan is ready for review.".into(),
            Self::AssessmentFailed { iteration } => format!(
                "The latest practice assessment fell short; remediation round {} is starting.",
                iteration
            ),
            Self::AssessmentPassed => "The practice assessment was passed.".into(),
            Self::RetriesExhausted => {
                "All remediation rounds are used up; a fresh diagnostic is needed.".into()
            }
        }
    }

    pub fn subject(&self) -> &'static str {
        match self {
            Self::SessionStarted => "Your study session has started",
            Self::PlanReady => "Your study plan is ready",
            Self::AssessmentFailed { .. } => "Assessment results and next steps",
            Self::AssessmentPassed => "You passed your practice assessment",
            Self::RetriesExhausted => "Time to regroup on your certification",
        }
    }
}

/// Composes and sends a milestone message. Never fails.
pub async fn notify<O: TextOracle, N: Notifier>(
    oracle: &O,
    notifier: &N,
    recipient: &str,
    milestone: Milestone,
) {
    let body = match oracle.generate_message(milestone.tone(), &milestone.context()).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, ?milestone, "message generation failed, using plain context");
            milestone.context()
        }
    };

    match notifier.send(recipient, milestone.subject(), &body).await {
        Ok(()) => info!(%recipient, ?milestone, "milestone notification sent"),
        Err(e) => warn!(error = %e, %recipient, "notification delivery failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{MockNotifier, MockOracle};

    #[test]
    fn test_tone_selection() {
        assert_eq!(Milestone::SessionStarted.tone(), Tone::Motivational);
        assert_eq!(Milestone::AssessmentFailed { iteration: 1 }.tone(), Tone::Empathetic);
        assert_eq!(Milestone::AssessmentPassed.tone(), Tone::Celebration);
        assert_eq!(Milestone::RetriesExhausted.tone(), Tone::Urgent);
    }

    #[tokio::test]
    async fn test_notify_records_message() {
        let oracle = MockOracle::new();
        let notifier = MockNotifier::new();
        notify(&oracle, &notifier, "a@b.c", Milestone::PlanReady).await;
        let sent = notifier.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "a@b.c");
    }

    #[tokio::test]
    async fn test_notify_swallows_delivery_failure() {
        let oracle = MockOracle::new();
        notify(&oracle, &MockNotifier::failing(), "a@b.c", Milestone::PlanReady).await;
        // reaching this line is the assertion
    }
}
