//! VLM-assisted verification of ambiguous detector signals.
//!
//! The verifier is consulted only when detector evidence alone cannot commit
//! a capture: the best fired confidence is below the auto-accept threshold,
//! several detectors fire with comparable confidence, or the step explicitly
//! demands visual confirmation. Detector evidence is the more deterministic
//! signal, so disagreement biases toward it; VLM failure degrades the
//! decision to a detector-only threshold and never crashes the run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::CaptureSettings;
use crate::detectors::DetectorResult;
use crate::snapshot::UiSnapshot;
use crate::task::StepSpec;
use crate::vlm::VlmClient;

/// How a verification verdict was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// Detector evidence alone decided (auto-accept or VLM unavailable)
    DetectorOnly,
    /// The VLM's answer agreed with or determined the decision
    VlmConfirmed,
    /// Detector evidence overruled a negative VLM answer
    VlmOverridden,
}

/// The final decision for one ambiguous capture point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationVerdict {
    /// Whether the observed state should be captured
    pub accepted: bool,

    /// Combined decision confidence
    pub confidence: f64,

    /// How the decision was reached
    pub source: VerdictSource,

    /// Human-readable account of the decision
    pub explanation: String,
}

impl VerificationVerdict {
    /// A verdict decided by detector evidence alone
    pub fn detector_only(accepted: bool, confidence: f64, explanation: impl Into<String>) -> Self {
        Self {
            accepted,
            confidence,
            source: VerdictSource::DetectorOnly,
            explanation: explanation.into(),
        }
    }
}

/// Decide whether the verifier must be consulted for this decision point.
///
/// `best` is the winning fired detector's confidence; `fired` lists the
/// confidences of every fired detector.
pub fn needs_verification(
    best: f64,
    fired: &[f64],
    step: &StepSpec,
    settings: &CaptureSettings,
) -> bool {
    if step.verify.is_some() {
        return true;
    }
    // Inclusive threshold: exactly at the boundary auto-accepts
    if best < settings.auto_accept_threshold {
        return true;
    }
    let comparable = fired
        .iter()
        .filter(|&&c| (best - c).abs() <= settings.tie_band)
        .count();
    comparable > 1
}

/// Resolves ambiguous detector signals through the VLM capability
pub struct Verifier {
    vlm: Box<dyn VlmClient>,
    settings: CaptureSettings,
}

impl Verifier {
    /// Create a verifier over the given VLM capability
    pub fn new(vlm: Box<dyn VlmClient>, settings: CaptureSettings) -> Self {
        Self { vlm, settings }
    }

    /// Ask the VLM about the snapshot and combine its answer with the best
    /// detector evidence.
    ///
    /// Given the same snapshot and question, the decision is stable modulo
    /// the VLM's own non-determinism.
    pub fn verify(
        &self,
        snapshot: &UiSnapshot,
        question: &str,
        prior_results: &HashMap<String, DetectorResult>,
        best_detector: &str,
    ) -> VerificationVerdict {
        let detector_confidence = prior_results
            .get(best_detector)
            .map(|r| r.confidence)
            .unwrap_or(0.0);

        let answer = match self.vlm.ask(&snapshot.screenshot, question) {
            Ok(answer) => answer,
            Err(err) => {
                return self.degrade(detector_confidence, format!("VLM unavailable: {}", err));
            }
        };

        let Some(affirmative) = answer.is_affirmative() else {
            return self.degrade(
                detector_confidence,
                format!("VLM answer not a yes/no: '{}'", answer.answer),
            );
        };

        if affirmative {
            // Agreement lifts the combined confidence above the detector's own
            let combined = detector_confidence + (1.0 - detector_confidence) * answer.confidence;
            return VerificationVerdict {
                accepted: true,
                confidence: combined,
                source: VerdictSource::VlmConfirmed,
                explanation: format!(
                    "VLM confirmed ({:.2}) detector '{}' ({:.2})",
                    answer.confidence, best_detector, detector_confidence
                ),
            };
        }

        if detector_confidence >= self.settings.fallback_threshold {
            // Detector evidence wins over a negative VLM answer, damped
            let combined = detector_confidence * (1.0 - answer.confidence / 2.0);
            eprintln!(
                "Warning: overriding VLM rejection ({:.2}) with detector '{}' ({:.2})",
                answer.confidence, best_detector, detector_confidence
            );
            return VerificationVerdict {
                accepted: true,
                confidence: combined,
                source: VerdictSource::VlmOverridden,
                explanation: format!(
                    "detector '{}' ({:.2}) overrode VLM rejection ({:.2})",
                    best_detector, detector_confidence, answer.confidence
                ),
            };
        }

        VerificationVerdict {
            accepted: false,
            confidence: answer.confidence,
            source: VerdictSource::VlmConfirmed,
            explanation: format!(
                "VLM rejected ({:.2}); detector '{}' ({:.2}) below fallback threshold",
                answer.confidence, best_detector, detector_confidence
            ),
        }
    }

    /// Detector-only decision when the VLM cannot be used
    fn degrade(&self, detector_confidence: f64, why: String) -> VerificationVerdict {
        let accepted = detector_confidence >= self.settings.fallback_threshold;
        VerificationVerdict {
            accepted,
            confidence: detector_confidence,
            source: VerdictSource::DetectorOnly,
            explanation: format!(
                "{}; detector-only fallback ({:.2} vs threshold {:.2})",
                why, detector_confidence, self.settings.fallback_threshold
            ),
        }
    }
}
