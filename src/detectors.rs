//! UI state detectors and their registry.
//!
//! A detector is a pure check over one `UiSnapshot` that reports whether a
//! named condition fired, with a confidence in `[0, 1]` and a reason string.
//! The registry owns a fixed set of named detectors, evaluates all of them
//! against the same snapshot in one pass, and preserves registration order
//! for the fired-detector listing; the verification step relies on that
//! ordering to pick a primary signal deterministically.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::snapshot::UiSnapshot;

/// Result type for registry and detector-evaluation operations
pub type RegistryResult<T> = Result<T, DetectorError>;

/// The outcome of one detector against one snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorResult {
    /// Whether the condition fired
    pub fired: bool,

    /// Confidence in `[0, 1]`
    pub confidence: f64,

    /// Why the detector decided what it decided
    pub reason: String,
}

impl DetectorResult {
    /// A fired result
    pub fn fired(confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            fired: true,
            confidence: confidence.clamp(0.0, 1.0),
            reason: reason.into(),
        }
    }

    /// A non-fired result
    pub fn quiet(reason: impl Into<String>) -> Self {
        Self {
            fired: false,
            confidence: 0.0,
            reason: reason.into(),
        }
    }
}

/// Errors raised by the registry or by a detector's own evaluation
#[derive(Debug)]
pub enum DetectorError {
    /// A detector was registered under a name that is already taken
    DuplicateDetector(String),

    /// No detector is registered under the requested name
    UnknownDetector(String),

    /// A detector failed internally while evaluating a snapshot
    Internal(String),
}

impl std::fmt::Display for DetectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorError::DuplicateDetector(name) => {
                write!(f, "detector '{}' is already registered", name)
            }
            DetectorError::UnknownDetector(name) => {
                write!(f, "no detector registered as '{}'", name)
            }
            DetectorError::Internal(msg) => write!(f, "detector error: {}", msg),
        }
    }
}

impl std::error::Error for DetectorError {}

/// Text fragments that mark a transient status banner, with per-pattern
/// match strength
const STATUS_PATTERNS: &[(&str, f64)] = &[
    ("created", 0.9),
    ("saved", 0.9),
    ("success", 0.85),
    ("updated", 0.8),
    ("deleted", 0.8),
    ("added", 0.75),
    ("error", 0.7),
    ("failed", 0.7),
];

/// The closed set of detector kinds
#[derive(Debug, Clone)]
pub enum Detector {
    /// Fires when a dialog/overlay is present and blocking interaction.
    /// Confidence 1.0 for an unambiguous dialog role, lower when inferred
    /// from z-index and visibility alone.
    ModalVisible,

    /// Fires on transient success/error banners, confidence scaled by
    /// text-pattern match strength
    StatusNotification,

    /// Fires when the input fields the current step expects are present,
    /// visible, and enabled
    FormReady,

    /// Fires when no DOM mutation has been observed for at least the
    /// configured interval. This is the default settle signal, kept below
    /// the auto-accept threshold so it never commits a capture unverified.
    QuietWindow {
        /// Minimum no-mutation interval; a zero interval is an evaluation
        /// error
        min_quiet: Duration,
    },
}

impl Detector {
    /// Evaluate the detector against a snapshot.
    ///
    /// Detectors never mutate the snapshot. An `Err` here is caught at the
    /// registry boundary and degraded to a non-firing result.
    pub fn evaluate(&self, snapshot: &UiSnapshot) -> RegistryResult<DetectorResult> {
        match self {
            Detector::ModalVisible => Ok(evaluate_modal(snapshot)),
            Detector::StatusNotification => Ok(evaluate_notification(snapshot)),
            Detector::FormReady => Ok(evaluate_form_ready(snapshot)),
            Detector::QuietWindow { min_quiet } => {
                if min_quiet.is_zero() {
                    // A zero interval would make every snapshot "settled"
                    // and the confidence ratio meaningless
                    return Err(DetectorError::Internal(
                        "quiet window interval is zero".to_string(),
                    ));
                }
                Ok(evaluate_quiet(snapshot, *min_quiet))
            }
        }
    }
}

fn evaluate_modal(snapshot: &UiSnapshot) -> DetectorResult {
    for element in snapshot.visible_elements() {
        if element.has_role("dialog") || element.has_role("alertdialog") {
            if element.blocking {
                return DetectorResult::fired(1.0, format!("dialog role: {}", element.text));
            }
            return DetectorResult::fired(0.85, format!("dialog role, not blocking: {}", element.text));
        }
    }
    // No explicit role: fall back to the z-index/overlay heuristic
    for element in snapshot.visible_elements() {
        if element.blocking && element.z_index.unwrap_or(0) >= 100 {
            return DetectorResult::fired(
                0.7,
                format!("blocking overlay at z={}", element.z_index.unwrap_or(0)),
            );
        }
    }
    DetectorResult::quiet("no dialog or blocking overlay")
}

fn evaluate_notification(snapshot: &UiSnapshot) -> DetectorResult {
    for element in snapshot.visible_elements() {
        let has_status_role = element.has_role("status") || element.has_role("alert");
        let text = element.text.to_lowercase();
        let pattern = STATUS_PATTERNS
            .iter()
            .find(|(needle, _)| text.contains(needle));

        match (has_status_role, pattern) {
            (true, Some((needle, strength))) => {
                return DetectorResult::fired(
                    *strength,
                    format!("status banner matched '{}'", needle),
                );
            }
            (true, None) if !element.text.is_empty() => {
                return DetectorResult::fired(0.5, "status role with unmatched text");
            }
            (false, Some((needle, strength))) => {
                return DetectorResult::fired(
                    strength * 0.7,
                    format!("text matched '{}' without status role", needle),
                );
            }
            _ => {}
        }
    }
    DetectorResult::quiet("no status banner")
}

fn evaluate_form_ready(snapshot: &UiSnapshot) -> DetectorResult {
    let fields: Vec<_> = snapshot
        .visible_elements()
        .filter(|e| e.has_role("textbox") || e.has_role("combobox") || e.has_role("searchbox"))
        .collect();

    if snapshot.expected_fields.is_empty() {
        return if fields.iter().any(|f| f.enabled) {
            DetectorResult::fired(0.6, "input fields present, none specifically expected")
        } else {
            DetectorResult::quiet("no enabled input fields")
        };
    }

    let mut found = 0usize;
    for expected in &snapshot.expected_fields {
        let expected_lower = expected.to_lowercase();
        if fields
            .iter()
            .any(|f| f.enabled && f.text.to_lowercase().contains(&expected_lower))
        {
            found += 1;
        }
    }

    if found == snapshot.expected_fields.len() {
        DetectorResult::fired(0.95, format!("all {} expected fields ready", found))
    } else if found > 0 {
        DetectorResult::fired(
            0.6,
            format!("{}/{} expected fields ready", found, snapshot.expected_fields.len()),
        )
    } else {
        DetectorResult::quiet("expected fields not found")
    }
}

fn evaluate_quiet(snapshot: &UiSnapshot, min_quiet: Duration) -> DetectorResult {
    if snapshot.quiet_for >= min_quiet {
        // Confidence grows with the length of the quiet period but stays
        // below the auto-accept threshold
        let ratio = snapshot.quiet_for.as_millis() as f64 / min_quiet.as_millis() as f64;
        let confidence = (0.4 + 0.1 * ratio).min(0.7);
        DetectorResult::fired(
            confidence,
            format!("no DOM mutation for {}ms", snapshot.quiet_for.as_millis()),
        )
    } else {
        DetectorResult::quiet(format!(
            "DOM still active {}ms ago",
            snapshot.quiet_for.as_millis()
        ))
    }
}

/// Owns the set of named detectors and evaluates them in a single pass
#[derive(Debug, Clone)]
pub struct DetectorRegistry {
    /// Entries in registration order
    entries: Vec<(String, Detector)>,
}

impl DetectorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// The registry with the four built-in detectors, in their canonical
    /// registration order
    pub fn with_builtins(quiet_window: Duration) -> Self {
        // Registration order is a contract: fired_detectors reports in
        // this order.
        Self {
            entries: vec![
                ("modal_visible".to_string(), Detector::ModalVisible),
                ("status_notification".to_string(), Detector::StatusNotification),
                ("form_ready".to_string(), Detector::FormReady),
                (
                    "quiet_window".to_string(),
                    Detector::QuietWindow { min_quiet: quiet_window },
                ),
            ],
        }
    }

    /// Add a detector under a unique name
    pub fn register(&mut self, name: &str, detector: Detector) -> RegistryResult<()> {
        if self.entries.iter().any(|(n, _)| n == name) {
            return Err(DetectorError::DuplicateDetector(name.to_string()));
        }
        self.entries.push((name.to_string(), detector));
        Ok(())
    }

    /// Look up a detector by name
    pub fn get(&self, name: &str) -> RegistryResult<&Detector> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
            .ok_or_else(|| DetectorError::UnknownDetector(name.to_string()))
    }

    /// Registered detector names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Evaluate every registered detector against the same snapshot.
    ///
    /// A detector that errors internally is degraded to
    /// `{fired: false, confidence: 0, reason: "detector_error:<name>"}` so
    /// one bad detector cannot abort the run.
    pub fn evaluate_all(&self, snapshot: &UiSnapshot) -> HashMap<String, DetectorResult> {
        let mut results = HashMap::with_capacity(self.entries.len());
        for (name, detector) in &self.entries {
            let result = match detector.evaluate(snapshot) {
                Ok(result) => result,
                Err(err) => {
                    eprintln!("Warning: detector '{}' failed: {}", name, err);
                    DetectorResult {
                        fired: false,
                        confidence: 0.0,
                        reason: format!("detector_error:{}", name),
                    }
                }
            };
            results.insert(name.clone(), result);
        }
        results
    }

    /// Names of the detectors that fired, in registration order regardless
    /// of the result map's iteration order
    pub fn fired_detectors(&self, results: &HashMap<String, DetectorResult>) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(name, _)| results.get(name).map(|r| r.fired).unwrap_or(false))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::with_builtins(Duration::from_millis(crate::config::DEFAULT_QUIET_WINDOW_MS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ElementInfo;

    fn snapshot(elements: Vec<ElementInfo>, quiet_ms: u64, expected: Vec<&str>) -> UiSnapshot {
        UiSnapshot::new(
            elements,
            Vec::new(),
            Duration::from_millis(quiet_ms),
            expected.into_iter().map(String::from).collect(),
        )
    }

    #[test]
    fn test_builtin_registration() {
        let registry = DetectorRegistry::default();
        assert!(registry.get("modal_visible").is_ok());
        assert!(registry.get("status_notification").is_ok());
        assert!(registry.get("form_ready").is_ok());
        assert!(registry.get("quiet_window").is_ok());
        assert!(matches!(
            registry.get("nope"),
            Err(DetectorError::UnknownDetector(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = DetectorRegistry::default();
        let err = registry.register("modal_visible", Detector::ModalVisible);
        assert!(matches!(err, Err(DetectorError::DuplicateDetector(_))));
    }

    #[test]
    fn test_fired_detectors_preserve_registration_order() {
        let registry = DetectorRegistry::default();
        // Insertion into the map happens out of registration order on purpose
        let mut results = HashMap::new();
        results.insert(
            "form_ready".to_string(),
            DetectorResult::fired(0.95, "test"),
        );
        results.insert(
            "quiet_window".to_string(),
            DetectorResult::quiet("test"),
        );
        results.insert(
            "modal_visible".to_string(),
            DetectorResult::fired(1.0, "test"),
        );
        results.insert(
            "status_notification".to_string(),
            DetectorResult::quiet("test"),
        );

        let fired = registry.fired_detectors(&results);
        assert_eq!(fired, vec!["modal_visible", "form_ready"]);
    }

    #[test]
    fn test_modal_dialog_role_full_confidence() {
        let registry = DetectorRegistry::default();
        let snap = snapshot(
            vec![ElementInfo::new(Some("dialog"), "New issue").blocking(1000)],
            0,
            vec![],
        );
        let results = registry.evaluate_all(&snap);
        let modal = &results["modal_visible"];
        assert!(modal.fired);
        assert_eq!(modal.confidence, 1.0);
    }

    #[test]
    fn test_modal_overlay_heuristic_lower_confidence() {
        let registry = DetectorRegistry::default();
        let snap = snapshot(
            vec![ElementInfo::new(None, "").blocking(500)],
            0,
            vec![],
        );
        let results = registry.evaluate_all(&snap);
        let modal = &results["modal_visible"];
        assert!(modal.fired);
        assert!(modal.confidence < 1.0);
    }

    #[test]
    fn test_notification_confidence_scales_with_pattern() {
        let registry = DetectorRegistry::default();

        let strong = snapshot(
            vec![ElementInfo::new(Some("status"), "Issue created")],
            0,
            vec![],
        );
        let weak = snapshot(
            vec![ElementInfo::new(None, "3 items added")],
            0,
            vec![],
        );

        let strong_result = &registry.evaluate_all(&strong)["status_notification"];
        let weak_result = &registry.evaluate_all(&weak)["status_notification"];
        assert!(strong_result.fired);
        assert!(weak_result.fired);
        assert!(strong_result.confidence > weak_result.confidence);
    }

    #[test]
    fn test_form_ready_expected_fields() {
        let registry = DetectorRegistry::default();
        let snap = snapshot(
            vec![
                ElementInfo::new(Some("textbox"), "Title"),
                ElementInfo::new(Some("textbox"), "Description"),
            ],
            0,
            vec!["Title", "Description"],
        );
        let form = &registry.evaluate_all(&snap)["form_ready"];
        assert!(form.fired);
        assert_eq!(form.confidence, 0.95);
    }

    #[test]
    fn test_form_ready_disabled_field_does_not_count() {
        let registry = DetectorRegistry::default();
        let snap = snapshot(
            vec![ElementInfo::new(Some("textbox"), "Title").disabled()],
            0,
            vec!["Title"],
        );
        let form = &registry.evaluate_all(&snap)["form_ready"];
        assert!(!form.fired);
    }

    #[test]
    fn test_quiet_window_threshold() {
        let registry = DetectorRegistry::with_builtins(Duration::from_millis(800));

        let busy = snapshot(vec![], 200, vec![]);
        let settled = snapshot(vec![], 900, vec![]);

        assert!(!registry.evaluate_all(&busy)["quiet_window"].fired);
        let quiet = &registry.evaluate_all(&settled)["quiet_window"];
        assert!(quiet.fired);
        assert!(quiet.confidence < 0.9, "quiet window must not auto-accept");
    }

    #[test]
    fn test_failing_detector_degrades_without_aborting_pass() {
        // A zero quiet-window interval is an internal detector error
        let registry = DetectorRegistry::with_builtins(Duration::ZERO);
        let snap = snapshot(
            vec![ElementInfo::new(Some("dialog"), "New issue").blocking(1000)],
            500,
            vec![],
        );

        let results = registry.evaluate_all(&snap);
        assert_eq!(results.len(), 4);

        let quiet = &results["quiet_window"];
        assert!(!quiet.fired);
        assert_eq!(quiet.confidence, 0.0);
        assert_eq!(quiet.reason, "detector_error:quiet_window");

        // The other detectors still evaluated normally
        assert!(results["modal_visible"].fired);
        assert_eq!(registry.fired_detectors(&results), vec!["modal_visible"]);
    }

    #[test]
    fn test_empty_snapshot_only_quiet_fires() {
        let registry = DetectorRegistry::with_builtins(Duration::from_millis(100));
        let snap = snapshot(vec![], 500, vec![]);
        let results = registry.evaluate_all(&snap);
        let fired = registry.fired_detectors(&results);
        assert_eq!(fired, vec!["quiet_window"]);
    }
}
