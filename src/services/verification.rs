//! Confidence-gated artifact verification.
//!
//! Every produced artifact passes through here before the workflow
//! commits it. A low-confidence first check earns exactly one adversarial
//! re-check; transport failures get their own bounded retry, independent
//! of the confidence logic.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::collaborators::{Claim, DocCheck, DocVerifier, Framing, VerifierError};

const MAX_TRANSPORT_ATTEMPTS: usize = 3;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub subject_ref: String,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub corrected_subject: Option<String>,
    /// True when a second, adversarial check was performed.
    pub reflected: bool,
    pub source_refs: Vec<String>,
}

impl VerificationResult {
    pub fn is_trusted(&self, threshold: f64) -> bool {
        self.confidence >= threshold
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VerificationGate {
    threshold: f64,
}

impl VerificationGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Checks one artifact. At most two external confidence checks are
    /// made: the second only when the first lands below the threshold,
    /// reframed adversarially. The combined result keeps the lower
    /// confidence and every issue from both passes.
    pub async fn verify<V: DocVerifier>(
        &self,
        verifier: &V,
        subject_ref: &str,
        content: &str,
    ) -> Result<VerificationResult, VerifierError> {
        let first = self
            .check_with_retry(verifier, subject_ref, content, Framing::Standard)
            .await?;

        if first.confidence >= self.threshold {
            debug!(subject = %subject_ref, confidence = first.confidence, "verification passed");
            return Ok(result_from(subject_ref, first, None, false));
        }

        warn!(
            subject = %subject_ref,
            confidence = first.confidence,
            "verification below threshold, re-checking adversarially"
        );
        let second = self
            .check_with_retry(verifier, subject_ref, content, Framing::Adversarial)
            .await?;

        let mut combined = if second.confidence < first.confidence {
            second.clone()
        } else {
            first.clone()
        };
        combined.issues = first.issues;
        combined.issues.extend(second.issues);
        let mut source_refs = first.source_refs;
        source_refs.extend(second.source_refs);
        combined.source_refs = source_refs;

        let correction = first
            .corrections
            .into_iter()
            .chain(second.corrections)
            .next();
        Ok(result_from(subject_ref, combined, correction, true))
    }

    async fn check_with_retry<V: DocVerifier>(
        &self,
        verifier: &V,
        subject_ref: &str,
        content: &str,
        framing: Framing,
    ) -> Result<DocCheck, VerifierError> {
        let claim = Claim {
            subject_ref: subject_ref.to_string(),
            content: content.to_string(),
            framing,
        };

        let mut last_error = None;
        for attempt in 0..MAX_TRANSPORT_ATTEMPTS {
            match verifier.check(&claim).await {
                Ok(check) => return Ok(check),
                Err(e) => {
                    if attempt + 1 < MAX_TRANSPORT_ATTEMPTS {
                        let backoff = Duration::from_millis(BASE_BACKOFF_MS * (1 << attempt));
                        warn!(attempt, subject = %subject_ref, "verifier call failed, retrying");
                        sleep(backoff).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(VerifierError::NotConfigured("verifier")))
    }
}

fn result_from(
    subject_ref: &str,
    check: DocCheck,
    corrected_subject: Option<String>,
    reflected: bool,
) -> VerificationResult {
    VerificationResult {
        subject_ref: subject_ref.to_string(),
        confidence: check.confidence,
        issues: check.issues,
        corrected_subject,
        reflected,
        source_refs: check.source_refs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::MockVerifier;

    #[tokio::test]
    async fn test_confident_first_check_makes_one_call() {
        let verifier = MockVerifier::with_script([0.85]);
        let gate = VerificationGate::new(0.7);
        let result = gate.verify(&verifier, "graph", "claim text").await.unwrap();
        assert_eq!(verifier.call_count(), 1);
        assert!(!result.reflected);
        assert!(result.is_trusted(0.7));
    }

    #[tokio::test]
    async fn test_low_confidence_triggers_single_reflection() {
        let verifier = MockVerifier::with_script([0.5, 0.65]);
        let gate = VerificationGate::new(0.7);
        let result = gate.verify(&verifier, "graph", "claim text").await.unwrap();
        assert_eq!(verifier.call_count(), 2);
        assert!(result.reflected);
        // lower of the two confidences wins
        assert!((result.confidence - 0.5).abs() < 1e-9);
        assert!(!result.issues.is_empty());
        assert!(result.corrected_subject.is_some());
    }

    #[tokio::test]
    async fn test_reflection_keeps_lower_second_confidence() {
        let verifier = MockVerifier::with_script([0.6, 0.4]);
        let gate = VerificationGate::new(0.7);
        let result = gate.verify(&verifier, "plan", "claim").await.unwrap();
        assert!((result.confidence - 0.4).abs() < 1e-9);
    }

    struct DownVerifier;

    impl DocVerifier for DownVerifier {
        async fn check(&self, _claim: &Claim) -> Result<DocCheck, VerifierError> {
            Err(VerifierError::NotConfigured("down"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_surfaces_after_retries() {
        let gate = VerificationGate::new(0.7);
        let err = gate.verify(&DownVerifier, "graph", "claim").await;
        assert!(err.is_err());
    }
}
