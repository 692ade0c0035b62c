//! Task catalog for Notion (notion.so).
//!
//! The workspace id doubles as a database id for the database-entry task,
//! matching how shared test workspaces are usually set up.

use super::TaskSource;
use crate::task::{CapturePolicy, Locator, StepAction, StepSpec, StepTarget, TaskSpec};

/// Tasks for a Notion workspace
#[derive(Debug, Clone)]
pub struct NotionTasks {
    workspace: String,
}

impl NotionTasks {
    /// Create a task source for the given workspace or database id
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }
}

impl TaskSource for NotionTasks {
    fn app(&self) -> &str {
        "notion"
    }

    fn get_tasks(&self) -> Vec<TaskSpec> {
        vec![
            TaskSpec {
                app: "notion".to_string(),
                task_id: "create_page".to_string(),
                task_name: "Create a new page".to_string(),
                steps: vec![
                    StepSpec::new(StepAction::Navigate)
                        .target(StepTarget::Url("https://www.notion.so".to_string()))
                        .capture(CapturePolicy::None),
                    StepSpec::new(StepAction::Click)
                        .target(StepTarget::Element(Locator::text("New page")))
                        .param("caption", "Empty page editor open"),
                    StepSpec::new(StepAction::Type)
                        .target(StepTarget::Element(Locator::role("textbox", "Untitled")))
                        .param("text", "Weekly sync notes")
                        .param("caption", "Page titled")
                        .verify("Does the page editor show the title 'Weekly sync notes'?"),
                ],
            },
            TaskSpec {
                app: "notion".to_string(),
                task_id: "add_database_entry".to_string(),
                task_name: "Add an entry to a database".to_string(),
                steps: vec![
                    StepSpec::new(StepAction::Navigate)
                        .target(StepTarget::Url(format!(
                            "https://www.notion.so/{}",
                            self.workspace
                        )))
                        .capture(CapturePolicy::None),
                    StepSpec::new(StepAction::Click)
                        .target(StepTarget::Element(Locator::role("button", "New")))
                        .param("caption", "New database row open"),
                    StepSpec::new(StepAction::Type)
                        .target(StepTarget::Element(Locator::role("textbox", "Name")))
                        .param("text", "Q3 launch checklist")
                        .param("caption", "Row name filled")
                        .capture(CapturePolicy::Optional),
                    StepSpec::new(StepAction::Assert)
                        .target(StepTarget::Element(Locator::text("Q3 launch checklist")))
                        .param("caption", "Entry visible in database")
                        .verify("Does the database show a row named 'Q3 launch checklist'?"),
                ],
            },
        ]
    }
}
