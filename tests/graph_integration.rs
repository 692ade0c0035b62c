//! Integration tests for the capture graph over a scripted browser and VLM

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use web_vision::config::CaptureSettings;
use web_vision::detectors::DetectorRegistry;
use web_vision::driver::{MockBrowser, MockPage};
use web_vision::graph::CaptureGraph;
use web_vision::run::{RunEvent, RunStatus};
use web_vision::session::Session;
use web_vision::snapshot::ElementInfo;
use web_vision::task::{CapturePolicy, Locator, StepAction, StepSpec, StepTarget, TaskSpec};
use web_vision::verify::Verifier;
use web_vision::vlm::{VlmAnswer, VlmClient, VlmError, VlmResult};

/// VLM that always gives the same scripted reply, counting calls
struct ScriptedVlm {
    reply: Option<(&'static str, f64)>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedVlm {
    fn new(reply: Option<(&'static str, f64)>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                reply,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl VlmClient for ScriptedVlm {
    fn ask(&self, _image: &[u8], _question: &str) -> VlmResult<VlmAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.reply {
            Some((answer, confidence)) => Ok(VlmAnswer {
                answer: answer.to_string(),
                confidence,
            }),
            None => Err(VlmError::ConnectionFailed("scripted outage".to_string())),
        }
    }
}

/// Fast timings so polling tests stay quick. The quiet window is pushed out
/// of reach so only element-driven detectors fire, keeping event sequences
/// stable across machines.
fn fast_settings() -> CaptureSettings {
    CaptureSettings {
        poll_interval_ms: 10,
        step_timeout_secs: 1,
        action_retries: 2,
        retry_backoff_ms: 1,
        reject_retries: 0,
        quiet_window_ms: 60_000,
        ..CaptureSettings::defaults()
    }
}

fn dialog_page() -> MockPage {
    MockPage::with_elements(vec![
        ElementInfo::new(Some("dialog"), "New issue").blocking(1000)
    ])
}

/// Page whose only signal is a status-pattern text without a status role,
/// which lands below the auto-accept threshold
fn weak_notification_page() -> MockPage {
    MockPage::with_elements(vec![ElementInfo::new(None, "Issue created")])
}

/// Page with a proper status banner: fires at 0.8, between the fallback and
/// auto-accept thresholds
fn medium_notification_page() -> MockPage {
    MockPage::with_elements(vec![ElementInfo::new(Some("status"), "Project updated")])
}

fn build_graph(
    task: TaskSpec,
    browser: MockBrowser,
    vlm: ScriptedVlm,
    settings: CaptureSettings,
    dir: &TempDir,
) -> (CaptureGraph, Arc<Mutex<Vec<RunEvent>>>) {
    let session = Session::in_dir(dir.path());
    let verifier = Verifier::new(Box::new(vlm), settings.clone());
    let registry =
        DetectorRegistry::with_builtins(Duration::from_millis(settings.quiet_window_ms));

    let mut graph = CaptureGraph::new(
        task,
        "2026-08-29_10-00-00",
        Box::new(browser),
        registry,
        verifier,
        settings,
        session,
    );

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    graph.on_event(move |event| sink.lock().unwrap().push(event.clone()));
    (graph, events)
}

fn two_step_task() -> TaskSpec {
    TaskSpec {
        app: "linear".to_string(),
        task_id: "create_issue".to_string(),
        task_name: "Create a new issue".to_string(),
        steps: vec![
            StepSpec::new(StepAction::Navigate)
                .target(StepTarget::Url("https://linear.app/acme".to_string()))
                .capture(CapturePolicy::None),
            StepSpec::new(StepAction::Click)
                .target(StepTarget::Element(Locator::role("button", "New issue")))
                .param("caption", "Issue modal open"),
        ],
    }
}

fn terminal_events(events: &[RunEvent]) -> Vec<&RunEvent> {
    events.iter().filter(|e| e.is_terminal()).collect()
}

#[test]
fn test_happy_path_one_capture_per_capturing_step() {
    let dir = TempDir::new().unwrap();
    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(dialog_page());

    let (vlm, calls) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    // Navigate has CapturePolicy::None, so only the click step captures
    assert_eq!(state.captures.len(), 1);
    assert_eq!(state.captures[0].detector_name, "modal_visible");
    assert_eq!(state.captures[0].caption.as_deref(), Some("Issue modal open"));

    // Modal at full confidence auto-accepts without consulting the VLM
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let events = events.lock().unwrap();
    let terminals = terminal_events(&events);
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], RunEvent::RunCompleted { captures: 1, .. }));
}

#[test]
fn test_artifacts_written_to_session_dir() {
    let dir = TempDir::new().unwrap();
    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(dialog_page());

    let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, _) = build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);

    let state = graph.run();
    assert_eq!(state.status, RunStatus::Completed);

    assert!(dir.path().join("run.json").exists());
    assert!(state.captures[0].screenshot_path.exists());
    assert!(state.captures[0]
        .screenshot_path
        .with_extension("json")
        .exists());

    let session = Session::in_dir(dir.path());
    assert_eq!(session.list_captures().unwrap().len(), 1);
}

#[test]
fn test_action_retry_exhaustion_fails_run() {
    let dir = TempDir::new().unwrap();
    let settings = fast_settings();
    let mut browser = MockBrowser::new();
    // One more failure than the retry budget allows
    browser.fail_next_actions(settings.action_retries + 1);

    let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(two_step_task(), browser, vlm, settings, &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.captures.is_empty());
    let error = state.error.unwrap();
    assert!(error.contains("step 0"), "error should name the step: {}", error);

    let events = events.lock().unwrap();
    let terminals = terminal_events(&events);
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], RunEvent::RunFailed { .. }));
}

#[test]
fn test_transient_action_failure_is_retried() {
    let dir = TempDir::new().unwrap();
    let settings = fast_settings();
    let mut browser = MockBrowser::new();
    browser.fail_next_actions(1);
    browser.push_page(dialog_page());
    browser.push_page(dialog_page());

    let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(two_step_task(), browser, vlm, settings, &dir);

    let state = graph.run();
    assert_eq!(state.status, RunStatus::Completed);

    // The failed attempt surfaces as a non-fatal error event
    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::Error { message } if message.contains("attempt 1"))));
}

#[test]
fn test_below_threshold_signal_goes_through_vlm() {
    let dir = TempDir::new().unwrap();
    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(weak_notification_page());

    let (vlm, calls) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.captures.len(), 1);
    assert_eq!(state.captures[0].detector_name, "status_notification");
    // Agreement lifts the combined confidence above the detector's own
    assert!(state.captures[0].confidence > 0.63);

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::VlmVerifying { .. })));
}

#[test]
fn test_vlm_outage_degrades_to_detector_only() {
    let dir = TempDir::new().unwrap();
    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    // 0.8 confidence: needs the VLM, but clears the fallback threshold
    browser.push_page(medium_notification_page());

    let (vlm, calls) = ScriptedVlm::new(None);
    let (mut graph, _) = build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.captures.len(), 1);
    assert_eq!(state.captures[0].detector_name, "status_notification");
}

#[test]
fn test_vlm_rejection_of_weak_signal_fails_required_step() {
    let dir = TempDir::new().unwrap();
    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    // 0.63 confidence: below the fallback threshold, so a VLM "no" is final
    browser.push_page(weak_notification_page());

    let (vlm, _) = ScriptedVlm::new(Some(("NO 0.9", 0.9)));
    let (mut graph, events) = build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Failed);
    assert!(state.captures.is_empty());

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::CaptureRejected { .. })));
}

#[test]
fn test_vlm_rejection_of_optional_step_skips_capture() {
    let dir = TempDir::new().unwrap();
    let mut task = two_step_task();
    task.steps[1].capture = CapturePolicy::Optional;

    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(weak_notification_page());

    let (vlm, _) = ScriptedVlm::new(Some(("NO 0.9", 0.9)));
    let (mut graph, _) = build_graph(task, browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.captures.is_empty());
}

#[test]
fn test_timeout_on_optional_step_skips_capture() {
    let dir = TempDir::new().unwrap();
    // Empty pages plus the unreachable quiet window: nothing ever fires
    let settings = fast_settings();

    let mut task = two_step_task();
    task.steps[1].capture = CapturePolicy::Optional;

    let mut browser = MockBrowser::new();
    browser.push_page(MockPage::new());
    browser.push_page(MockPage::new());

    let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(task, browser, vlm, settings, &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.captures.is_empty());

    let events = events.lock().unwrap();
    assert!(events
        .iter()
        .any(|e| matches!(e, RunEvent::CaptureRejected { reason, .. } if reason.contains("deadline"))));
}

#[test]
fn test_explicit_verify_consults_vlm_despite_strong_detector() {
    let dir = TempDir::new().unwrap();
    let mut task = two_step_task();
    task.steps[1].verify = Some("Is the issue modal open?".to_string());

    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(dialog_page());

    let (vlm, calls) = ScriptedVlm::new(Some(("YES 0.95", 0.95)));
    let (mut graph, events) = build_graph(task, browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let events = events.lock().unwrap();
    let question = events.iter().find_map(|e| match e {
        RunEvent::VlmVerifying { question, .. } => Some(question.clone()),
        _ => None,
    });
    assert!(question.unwrap().starts_with("Is the issue modal open?"));
}

#[test]
fn test_observer_panic_does_not_abort_run() {
    let dir = TempDir::new().unwrap();
    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(dialog_page());

    let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);
    graph.on_event(|_| panic!("bad observer"));

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    let events = events.lock().unwrap();
    assert_eq!(terminal_events(&events).len(), 1);
}

#[test]
fn test_auto_accept_then_vlm_confirmed_in_one_run() {
    let dir = TempDir::new().unwrap();
    let task = TaskSpec {
        app: "linear".to_string(),
        task_id: "create_issue".to_string(),
        task_name: "Create a new issue".to_string(),
        steps: vec![
            StepSpec::new(StepAction::Navigate)
                .target(StepTarget::Url("https://linear.app/acme/new".to_string()))
                .capture(CapturePolicy::None),
            StepSpec::new(StepAction::Type)
                .target(StepTarget::Element(Locator::role("textbox", "Issue title")))
                .param("text", "Bug"),
            StepSpec::new(StepAction::Click)
                .target(StepTarget::Element(Locator::role("button", "Submit"))),
        ],
    };

    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    // All expected fields present: form_ready fires at 0.95, above auto-accept
    browser.push_page(MockPage::with_elements(vec![ElementInfo::new(
        Some("textbox"),
        "Issue title",
    )]));
    // Weak 0.63 signal: needs the VLM, which confirms
    browser.push_page(weak_notification_page());

    let (vlm, calls) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(task, browser, vlm, fast_settings(), &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(state.captures.len(), 2);
    assert_eq!(state.captures[0].detector_name, "form_ready");
    assert_eq!(state.captures[1].detector_name, "status_notification");
    // Only the below-threshold step paid the VLM cost
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let events = events.lock().unwrap();
    let terminals = terminal_events(&events);
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], RunEvent::RunCompleted { captures: 2, .. }));
}

#[test]
fn test_retry_exhaustion_midway_keeps_earlier_captures() {
    let dir = TempDir::new().unwrap();
    let settings = fast_settings();
    let mut task = two_step_task();
    task.steps.push(
        StepSpec::new(StepAction::Click)
            .target(StepTarget::Element(Locator::role("button", "Submit"))),
    );

    let mut browser = MockBrowser::new();
    browser.push_page(dialog_page());
    browser.push_page(dialog_page());
    // Steps 0 and 1 each take one action; step 2 then exhausts its retries
    browser.fail_actions_after(2, settings.action_retries + 1);

    let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
    let (mut graph, events) = build_graph(task, browser, vlm, settings, &dir);

    let state = graph.run();

    assert_eq!(state.status, RunStatus::Failed);
    let error = state.error.unwrap();
    assert!(error.contains("step 2"), "error should name the step: {}", error);

    // The capture from the earlier step survives; nothing follows it
    assert_eq!(state.captures.len(), 1);
    assert_eq!(state.captures[0].step_index, 1);

    let events = events.lock().unwrap();
    let terminals = terminal_events(&events);
    assert_eq!(terminals.len(), 1);
    assert!(matches!(terminals[0], RunEvent::RunFailed { .. }));
}

#[test]
fn test_replay_produces_identical_event_shape() {
    let run = || {
        let dir = TempDir::new().unwrap();
        let mut browser = MockBrowser::new();
        browser.push_page(dialog_page());
        browser.push_page(weak_notification_page());
        let (vlm, _) = ScriptedVlm::new(Some(("YES 0.9", 0.9)));
        let (mut graph, events) =
            build_graph(two_step_task(), browser, vlm, fast_settings(), &dir);
        let state = graph.run();
        let kinds: Vec<String> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| {
                serde_json::to_value(e).unwrap()["type"]
                    .as_str()
                    .unwrap()
                    .to_string()
            })
            .collect();
        (state.status, state.captures.len(), kinds)
    };

    let (status_a, captures_a, kinds_a) = run();
    let (status_b, captures_b, kinds_b) = run();
    assert_eq!(status_a, status_b);
    assert_eq!(captures_a, captures_b);
    // Identical inputs replay to the same event sequence, modulo timestamps
    assert_eq!(kinds_a, kinds_b);
}
