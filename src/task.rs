//! Task and step specifications.
//!
//! A `TaskSpec` is an ordered list of UI steps for one workflow in one web
//! application ("create an issue", "add a database entry"). Task specs are
//! produced by the adapters and are immutable once built; the capture graph
//! only iterates them.

use serde::{Deserialize, Serialize};

/// One task: an ordered sequence of causally dependent UI steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Application the task runs against (e.g., "linear", "notion")
    pub app: String,

    /// Stable task identifier, used in artifact paths
    pub task_id: String,

    /// Human-readable task name
    pub task_name: String,

    /// Steps, in execution order
    pub steps: Vec<StepSpec>,
}

/// One UI step within a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSpec {
    /// The browser action to perform
    pub action: StepAction,

    /// What the action operates on
    #[serde(default)]
    pub target: StepTarget,

    /// Opaque step parameters (e.g., the text for a `Type` action)
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,

    /// Whether this step must produce a capture
    #[serde(default)]
    pub capture: CapturePolicy,

    /// Explicit VLM question, forcing verification even above the
    /// auto-accept threshold
    #[serde(default)]
    pub verify: Option<String>,
}

impl StepSpec {
    /// Create a step with no target, no params, and required capture
    pub fn new(action: StepAction) -> Self {
        Self {
            action,
            target: StepTarget::None,
            params: serde_json::Map::new(),
            capture: CapturePolicy::Required,
            verify: None,
        }
    }

    /// Set the step target
    pub fn target(mut self, target: StepTarget) -> Self {
        self.target = target;
        self
    }

    /// Add a string parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Set the capture policy
    pub fn capture(mut self, capture: CapturePolicy) -> Self {
        self.capture = capture;
        self
    }

    /// Request explicit VLM verification with the given question
    pub fn verify(mut self, question: impl Into<String>) -> Self {
        self.verify = Some(question.into());
        self
    }

    /// Text parameter for `Type` actions, if present
    pub fn text_param(&self) -> Option<&str> {
        self.params.get("text").and_then(|v| v.as_str())
    }

    /// Wait duration parameter in milliseconds, if present
    pub fn wait_ms_param(&self) -> Option<u64> {
        self.params.get("ms").and_then(|v| v.as_u64())
    }

    /// Short description of the step for logs and events
    pub fn describe(&self) -> String {
        format!("{} {}", self.action, self.target)
    }
}

/// The closed set of browser actions a step can perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Load a URL
    Navigate,
    /// Click an element
    Click,
    /// Type text into an element
    Type,
    /// Pause for a fixed duration
    Wait,
    /// Assert that an element is present and visible
    Assert,
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StepAction::Navigate => "navigate",
            StepAction::Click => "click",
            StepAction::Type => "type",
            StepAction::Wait => "wait",
            StepAction::Assert => "assert",
        };
        write!(f, "{}", name)
    }
}

/// What a step action operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepTarget {
    /// A URL (for `Navigate`)
    Url(String),
    /// A page element (for `Click`, `Type`, `Assert`)
    Element(Locator),
    /// No target (for `Wait`)
    #[default]
    None,
}

impl std::fmt::Display for StepTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepTarget::Url(url) => write!(f, "{}", url),
            StepTarget::Element(locator) => write!(f, "{}", locator),
            StepTarget::None => write!(f, "-"),
        }
    }
}

/// A typed element locator descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Locator {
    /// An element with an ARIA role and accessible name
    Role {
        /// ARIA role (e.g., "button", "textbox")
        role: String,
        /// Accessible name
        name: String,
    },
    /// An element containing the given text
    Text(String),
    /// A CSS selector
    Css(String),
}

impl Locator {
    /// Locator for a role/name pair
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Locator::Role {
            role: role.into(),
            name: name.into(),
        }
    }

    /// Locator for an element containing text
    pub fn text(text: impl Into<String>) -> Self {
        Locator::Text(text.into())
    }

    /// Locator for a CSS selector
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// The accessible name or text this locator matches on, if any.
    /// Used by the form-ready detector to know which fields a step expects.
    pub fn expected_name(&self) -> Option<&str> {
        match self {
            Locator::Role { name, .. } => Some(name),
            Locator::Text(text) => Some(text),
            Locator::Css(_) => None,
        }
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Locator::Role { role, name } => write!(f, "{}[{}]", role, name),
            Locator::Text(text) => write!(f, "text:{}", text),
            Locator::Css(selector) => write!(f, "css:{}", selector),
        }
    }
}

/// Whether a step must produce a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CapturePolicy {
    /// A missing or rejected capture fails the run
    #[default]
    Required,
    /// A missing or rejected capture is skipped; the run continues
    Optional,
    /// The step settles but no capture is attempted
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_builder() {
        let step = StepSpec::new(StepAction::Type)
            .target(StepTarget::Element(Locator::role("textbox", "Title")))
            .param("text", "Bug report")
            .capture(CapturePolicy::Optional);

        assert_eq!(step.action, StepAction::Type);
        assert_eq!(step.text_param(), Some("Bug report"));
        assert_eq!(step.capture, CapturePolicy::Optional);
        assert!(step.verify.is_none());
    }

    #[test]
    fn test_locator_expected_name() {
        assert_eq!(Locator::role("button", "Submit").expected_name(), Some("Submit"));
        assert_eq!(Locator::text("New issue").expected_name(), Some("New issue"));
        assert_eq!(Locator::css("#title").expected_name(), None);
    }

    #[test]
    fn test_step_describe() {
        let step = StepSpec::new(StepAction::Click)
            .target(StepTarget::Element(Locator::role("button", "Create issue")));
        assert_eq!(step.describe(), "click button[Create issue]");
    }

    #[test]
    fn test_task_spec_roundtrip() {
        let task = TaskSpec {
            app: "linear".to_string(),
            task_id: "create_issue".to_string(),
            task_name: "Create an issue".to_string(),
            steps: vec![
                StepSpec::new(StepAction::Navigate)
                    .target(StepTarget::Url("https://linear.app/acme".to_string()))
                    .capture(CapturePolicy::None),
            ],
        };

        let json = serde_json::to_string(&task).unwrap();
        let parsed: TaskSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_id, "create_issue");
        assert_eq!(parsed.steps.len(), 1);
        assert_eq!(parsed.steps[0].action, StepAction::Navigate);
        assert_eq!(parsed.steps[0].capture, CapturePolicy::None);
    }
}
