//! The capture graph: a per-task state machine.
//!
//! For each step of the task spec the graph performs the action through the
//! browser driver, polls fresh UI snapshots through the detector registry
//! until a detector fires or the step deadline passes, escalates ambiguous
//! signals to the verifier, and commits a capture on a positive verdict. It
//! owns the run lifecycle and emits a typed event stream for observers.
//!
//! Steps never run out of order or concurrently: tasks assume sequential
//! causal dependency between UI actions. `run()` never propagates expected
//! failure modes to the caller; they end the run with `status = Failed`.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::config::CaptureSettings;
use crate::detectors::{DetectorRegistry, DetectorResult};
use crate::driver::{BrowserDriver, DriverError, DriverResult};
use crate::run::{Capture, RunEvent, RunState, RunStatus};
use crate::session::Session;
use crate::snapshot::UiSnapshot;
use crate::task::{CapturePolicy, Locator, StepAction, StepSpec, StepTarget, TaskSpec};
use crate::verify::{needs_verification, VerificationVerdict, Verifier};
use crate::vlm::build_verification_question;

/// A fatal step-level failure that ends the run
#[derive(Debug)]
enum StepError {
    /// The browser action exhausted its retry budget
    ActionFailed { step: usize, reason: String },

    /// No detector fired before the step deadline
    Timeout { step: usize },

    /// The verification verdict stayed negative through the re-poll budget
    Rejected { step: usize },

    /// Anything else that escaped the step loop
    Fatal(String),
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::ActionFailed { step, reason } => {
                write!(f, "step {} action failed after retries: {}", step, reason)
            }
            StepError::Timeout { step } => {
                write!(f, "step {}: no detector fired before the deadline", step)
            }
            StepError::Rejected { step } => {
                write!(f, "step {}: capture rejected after all retries", step)
            }
            StepError::Fatal(msg) => write!(f, "fatal: {}", msg),
        }
    }
}

/// Observer callback for the event stream
pub type EventObserver = Box<dyn Fn(&RunEvent) + Send>;

/// Per-task capture state machine
pub struct CaptureGraph {
    task: TaskSpec,
    run_id: String,
    driver: Box<dyn BrowserDriver>,
    registry: DetectorRegistry,
    verifier: Verifier,
    settings: CaptureSettings,
    session: Session,
    observers: Vec<EventObserver>,
    /// Most recent instant at which a DOM mutation was observed
    last_mutation_seen: DateTime<Utc>,
}

impl CaptureGraph {
    /// Create a graph for one task run
    pub fn new(
        task: TaskSpec,
        run_id: &str,
        driver: Box<dyn BrowserDriver>,
        registry: DetectorRegistry,
        verifier: Verifier,
        settings: CaptureSettings,
        session: Session,
    ) -> Self {
        Self {
            task,
            run_id: run_id.to_string(),
            driver,
            registry,
            verifier,
            settings,
            session,
            observers: Vec::new(),
            last_mutation_seen: Utc::now(),
        }
    }

    /// Register an observer, invoked synchronously for every emitted event
    /// in emission order. Observer panics are isolated and logged; they never
    /// abort the run.
    pub fn on_event(&mut self, observer: impl Fn(&RunEvent) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    /// Execute the task. Awaited once per graph instance; always returns a
    /// terminal `RunState` and emits exactly one terminal event.
    pub fn run(&mut self) -> RunState {
        let mut state = RunState::new(&self.run_id, &self.task.app, &self.task.task_id);
        state.status = RunStatus::Running;
        self.emit(&RunEvent::RunStarted {
            run_id: self.run_id.clone(),
            task_id: self.task.task_id.clone(),
        });

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute_steps(&mut state)))
            .unwrap_or_else(|payload| {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(StepError::Fatal(msg))
            });

        // The browser session is scoped to this run; release it on every path
        if let Err(err) = self.driver.close() {
            eprintln!("Warning: failed to close browser: {}", err);
        }

        state.end_time = Some(Utc::now());
        match outcome {
            Ok(()) => {
                state.status = RunStatus::Completed;
                self.emit(&RunEvent::RunCompleted {
                    captures: state.captures.len(),
                    duration_ms: state.duration_ms(),
                });
            }
            Err(err) => {
                state.status = RunStatus::Failed;
                state.error = Some(err.to_string());
                self.emit(&RunEvent::RunFailed {
                    error: err.to_string(),
                });
            }
        }

        if let Err(err) = self.session.write_run_state(&state) {
            eprintln!("Warning: failed to write run.json: {}", err);
        }
        state
    }

    fn execute_steps(&mut self, state: &mut RunState) -> Result<(), StepError> {
        self.session
            .init()
            .map_err(|e| StepError::Fatal(format!("session init: {}", e)))?;

        let steps = self.task.steps.clone();
        for (index, step) in steps.iter().enumerate() {
            self.emit(&RunEvent::StepStarted {
                step: index,
                action: step.action.to_string(),
                target: step.target.to_string(),
            });

            self.perform_action(index, step)?;
            self.resolve_step(index, step, state)?;
        }
        Ok(())
    }

    /// Perform one browser action with bounded retries and linear backoff
    fn perform_action(&mut self, index: usize, step: &StepSpec) -> Result<(), StepError> {
        let retries = self.settings.action_retries;
        let mut attempt = 0u32;
        loop {
            match self.apply_action(step) {
                Ok(()) => {
                    // The quiet window counts from the end of the action
                    self.last_mutation_seen = Utc::now();
                    return Ok(());
                }
                Err(err) if attempt < retries => {
                    attempt += 1;
                    self.emit(&RunEvent::Error {
                        message: format!(
                            "step {} attempt {}/{}: {}",
                            index, attempt, retries, err
                        ),
                    });
                    thread::sleep(Duration::from_millis(
                        self.settings.retry_backoff_ms * u64::from(attempt),
                    ));
                }
                Err(err) => {
                    return Err(StepError::ActionFailed {
                        step: index,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    fn apply_action(&mut self, step: &StepSpec) -> DriverResult<()> {
        match (step.action, &step.target) {
            (StepAction::Navigate, StepTarget::Url(url)) => self.driver.navigate(url),
            (StepAction::Click, StepTarget::Element(locator)) => self.driver.click(locator),
            (StepAction::Type, StepTarget::Element(locator)) => {
                let text = step.text_param().ok_or_else(|| {
                    DriverError::ActionFailed("type step without a text param".to_string())
                })?;
                self.driver.type_text(locator, text)
            }
            (StepAction::Wait, _) => {
                let ms = step.wait_ms_param().unwrap_or(self.settings.poll_interval_ms);
                thread::sleep(Duration::from_millis(ms));
                Ok(())
            }
            (StepAction::Assert, StepTarget::Element(locator)) => self.assert_element(locator),
            (action, target) => Err(DriverError::ActionFailed(format!(
                "unsupported action/target pair: {} on {}",
                action, target
            ))),
        }
    }

    fn assert_element(&mut self, locator: &Locator) -> DriverResult<()> {
        let elements = self.driver.query_elements()?;
        let found = elements.iter().any(|element| {
            if !element.visible {
                return false;
            }
            match locator {
                Locator::Role { role, name } => {
                    element.has_role(role) && element.text.contains(name.as_str())
                }
                Locator::Text(text) => element.text.contains(text.as_str()),
                Locator::Css(_) => false,
            }
        });
        if found {
            Ok(())
        } else {
            Err(DriverError::ActionFailed(format!(
                "assert failed: {} not visible",
                locator
            )))
        }
    }

    /// Poll, decide, and capture (or retry/skip) for one step
    fn resolve_step(
        &mut self,
        index: usize,
        step: &StepSpec,
        state: &mut RunState,
    ) -> Result<(), StepError> {
        if step.capture == CapturePolicy::None {
            // Let the page settle, but make no capture decision
            let _ = self.poll_until_fired(index, step);
            return Ok(());
        }

        let mut reject_attempts = 0u32;
        loop {
            let (snapshot, results, fired) = match self.poll_until_fired(index, step) {
                Ok(polled) => polled,
                Err(StepError::Timeout { .. }) if step.capture == CapturePolicy::Optional => {
                    self.emit(&RunEvent::CaptureRejected {
                        step: index,
                        reason: "no detector fired before the step deadline".to_string(),
                    });
                    return Ok(());
                }
                Err(err) => return Err(err),
            };

            for name in &fired {
                self.emit(&RunEvent::DetectorFired {
                    step: index,
                    detector: name.clone(),
                    confidence: results[name].confidence,
                });
            }

            // Winning signal: highest confidence, registration order breaking ties
            let mut best = fired[0].clone();
            for name in &fired[1..] {
                if results[name].confidence > results[&best].confidence {
                    best = name.clone();
                }
            }
            let best_confidence = results[&best].confidence;
            let fired_confidences: Vec<f64> =
                fired.iter().map(|name| results[name].confidence).collect();

            let verdict = if needs_verification(best_confidence, &fired_confidences, step, &self.settings)
            {
                let question = build_verification_question(&self.task.task_name, step);
                self.emit(&RunEvent::VlmVerifying {
                    step: index,
                    question: question.clone(),
                });
                self.verifier.verify(&snapshot, &question, &results, &best)
            } else {
                VerificationVerdict::detector_only(
                    true,
                    best_confidence,
                    format!("detector '{}' at or above auto-accept threshold", best),
                )
            };

            if verdict.accepted {
                self.commit_capture(index, step, &snapshot, &best, &verdict, state)?;
                return Ok(());
            }

            self.emit(&RunEvent::CaptureRejected {
                step: index,
                reason: verdict.explanation.clone(),
            });

            if reject_attempts >= self.settings.reject_retries {
                return match step.capture {
                    CapturePolicy::Optional => Ok(()),
                    _ => Err(StepError::Rejected { step: index }),
                };
            }
            reject_attempts += 1;
            thread::sleep(Duration::from_millis(self.settings.poll_interval_ms));
        }
    }

    /// Take fresh snapshots until at least one detector fires or the step
    /// deadline elapses. The deadline is checked at each suspension point;
    /// in-flight work is never interrupted.
    fn poll_until_fired(
        &mut self,
        index: usize,
        step: &StepSpec,
    ) -> Result<(UiSnapshot, HashMap<String, DetectorResult>, Vec<String>), StepError> {
        let deadline = Instant::now() + Duration::from_secs(self.settings.step_timeout_secs);
        loop {
            match self.take_snapshot(step) {
                Ok(snapshot) => {
                    let results = self.registry.evaluate_all(&snapshot);
                    let fired = self.registry.fired_detectors(&results);
                    if !fired.is_empty() {
                        return Ok((snapshot, results, fired));
                    }
                }
                Err(err) => {
                    // A flaky snapshot is a skipped tick, not a fatal error
                    self.emit(&RunEvent::Error {
                        message: format!("step {} snapshot failed: {}", index, err),
                    });
                }
            }

            if Instant::now() >= deadline {
                return Err(StepError::Timeout { step: index });
            }
            thread::sleep(Duration::from_millis(self.settings.poll_interval_ms));
        }
    }

    /// Observe the page: DOM signals, quiescence, and a screenshot
    fn take_snapshot(&mut self, step: &StepSpec) -> DriverResult<UiSnapshot> {
        if self.driver.dom_mutated_since(self.last_mutation_seen)? {
            self.last_mutation_seen = Utc::now();
        }
        let quiet_for = (Utc::now() - self.last_mutation_seen)
            .to_std()
            .unwrap_or_default();

        let elements = self.driver.query_elements()?;
        let screenshot = self.driver.screenshot()?;
        Ok(UiSnapshot::new(
            elements,
            screenshot,
            quiet_for,
            expected_fields(step),
        ))
    }

    fn commit_capture(
        &mut self,
        index: usize,
        step: &StepSpec,
        snapshot: &UiSnapshot,
        detector: &str,
        verdict: &VerificationVerdict,
        state: &mut RunState,
    ) -> Result<(), StepError> {
        let sequence = state.captures.len();
        let caption = step
            .params
            .get("caption")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let capture = Capture {
            state_id: format!("{}_{:02}", self.task.task_id, sequence),
            step_index: index,
            screenshot_path: self.session.capture_path(sequence, detector),
            caption: caption.clone(),
            detector_name: detector.to_string(),
            confidence: verdict.confidence,
            timestamp: Utc::now(),
        };

        self.session
            .write_capture(&capture, &snapshot.screenshot)
            .map_err(|e| StepError::Fatal(format!("write capture: {}", e)))?;

        self.emit(&RunEvent::StateCaptured {
            state_id: capture.state_id.clone(),
            step: index,
            detector: detector.to_string(),
            confidence: verdict.confidence,
            caption,
        });
        state.captures.push(capture);
        Ok(())
    }

    /// Deliver an event to every observer, isolating observer panics
    fn emit(&self, event: &RunEvent) {
        for observer in &self.observers {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                eprintln!("Warning: event observer panicked; continuing");
            }
        }
    }
}

/// Input fields the step expects, for the form-ready detector
fn expected_fields(step: &StepSpec) -> Vec<String> {
    match (step.action, &step.target) {
        (StepAction::Type, StepTarget::Element(locator)) => locator
            .expected_name()
            .map(|name| vec![name.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}
