//! Task-source adapters.
//!
//! An adapter knows one web application and produces the task specs to run
//! against it. Adapters are pure catalogs; they hold workspace identity but
//! never touch the browser.

pub mod linear;
pub mod notion;

pub use linear::LinearTasks;
pub use notion::NotionTasks;

use crate::config::AdapterSettings;
use crate::task::TaskSpec;

/// A source of tasks for one web application
pub trait TaskSource {
    /// Application identifier ("linear", "notion")
    fn app(&self) -> &str;

    /// The tasks this source provides, in execution order
    fn get_tasks(&self) -> Vec<TaskSpec>;
}

/// Build every known task source from adapter settings
pub fn all_sources(settings: &AdapterSettings) -> Vec<Box<dyn TaskSource>> {
    vec![
        Box::new(LinearTasks::new(&settings.linear_workspace)),
        Box::new(NotionTasks::new(&settings.notion_workspace)),
    ]
}

/// Build the task source for a single app, if known
pub fn source_for(app: &str, settings: &AdapterSettings) -> Option<Box<dyn TaskSource>> {
    match app {
        "linear" => Some(Box::new(LinearTasks::new(&settings.linear_workspace))),
        "notion" => Some(Box::new(NotionTasks::new(&settings.notion_workspace))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_sources_cover_known_apps() {
        let sources = all_sources(&AdapterSettings::defaults());
        let apps: Vec<&str> = sources.iter().map(|s| s.app()).collect();
        assert_eq!(apps, vec!["linear", "notion"]);
    }

    #[test]
    fn test_source_for_unknown_app() {
        assert!(source_for("jira", &AdapterSettings::defaults()).is_none());
    }

    #[test]
    fn test_every_task_carries_its_app() {
        for source in all_sources(&AdapterSettings::defaults()) {
            for task in source.get_tasks() {
                assert_eq!(task.app, source.app());
                assert!(!task.steps.is_empty());
            }
        }
    }
}
