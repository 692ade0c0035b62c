//! Task catalog for Linear (linear.app).
//!
//! URLs are derived from the workspace slug. Keyboard-driven flows are
//! avoided; every step targets an element by role or text so the same spec
//! works across Linear's layout variants.

use super::TaskSource;
use crate::task::{CapturePolicy, Locator, StepAction, StepSpec, StepTarget, TaskSpec};

/// Tasks for a Linear workspace
#[derive(Debug, Clone)]
pub struct LinearTasks {
    workspace: String,
}

impl LinearTasks {
    /// Create a task source for the given workspace slug
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    fn workspace_url(&self, path: &str) -> String {
        format!("https://linear.app/{}/{}", self.workspace, path)
    }
}

impl TaskSource for LinearTasks {
    fn app(&self) -> &str {
        "linear"
    }

    fn get_tasks(&self) -> Vec<TaskSpec> {
        vec![
            TaskSpec {
                app: "linear".to_string(),
                task_id: "create_issue".to_string(),
                task_name: "Create a new issue".to_string(),
                steps: vec![
                    StepSpec::new(StepAction::Navigate)
                        .target(StepTarget::Url(self.workspace_url("team/all")))
                        .capture(CapturePolicy::None),
                    StepSpec::new(StepAction::Click)
                        .target(StepTarget::Element(Locator::role("button", "New issue")))
                        .param("caption", "Issue creation modal open"),
                    StepSpec::new(StepAction::Type)
                        .target(StepTarget::Element(Locator::role("textbox", "Issue title")))
                        .param("text", "Fix login page rendering on mobile")
                        .param("caption", "Issue title filled")
                        .capture(CapturePolicy::Optional),
                    StepSpec::new(StepAction::Click)
                        .target(StepTarget::Element(Locator::role("button", "Create issue")))
                        .param("caption", "Issue created")
                        .verify("Does the page show a confirmation that a new issue was created?"),
                ],
            },
            TaskSpec {
                app: "linear".to_string(),
                task_id: "create_project".to_string(),
                task_name: "Create a new project".to_string(),
                steps: vec![
                    StepSpec::new(StepAction::Navigate)
                        .target(StepTarget::Url(self.workspace_url("projects/all")))
                        .capture(CapturePolicy::None),
                    StepSpec::new(StepAction::Click)
                        .target(StepTarget::Element(Locator::text("Create new project")))
                        .param("caption", "Project creation form open"),
                    StepSpec::new(StepAction::Type)
                        .target(StepTarget::Element(Locator::role("textbox", "Project name")))
                        .param("text", "Mobile redesign")
                        .param("caption", "Project name filled")
                        .capture(CapturePolicy::Optional),
                    StepSpec::new(StepAction::Click)
                        .target(StepTarget::Element(Locator::role("button", "Create project")))
                        .param("caption", "Project created")
                        .verify("Does the page show a newly created project named 'Mobile redesign'?"),
                ],
            },
            TaskSpec {
                app: "linear".to_string(),
                task_id: "search_issues".to_string(),
                task_name: "Search for issues".to_string(),
                steps: vec![
                    StepSpec::new(StepAction::Navigate)
                        .target(StepTarget::Url(self.workspace_url("search")))
                        .capture(CapturePolicy::None),
                    StepSpec::new(StepAction::Type)
                        .target(StepTarget::Element(Locator::role("textbox", "Search")))
                        .param("text", "login")
                        .param("caption", "Search query entered"),
                    StepSpec::new(StepAction::Assert)
                        .target(StepTarget::Element(Locator::text("Results")))
                        .param("caption", "Search results listed")
                        .capture(CapturePolicy::Optional),
                ],
            },
        ]
    }
}
