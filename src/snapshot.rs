//! UI state snapshots consumed by the detectors.
//!
//! A `UiSnapshot` is taken fresh before each detector pass and is owned by
//! that evaluation cycle alone; it is never retained past the decision it
//! feeds. It bundles the DOM-queryable signals (visible elements, how long
//! the DOM has been quiet) with the rendered screenshot bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A DOM element as seen by the detectors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementInfo {
    /// ARIA role, when the element has one
    pub role: Option<String>,

    /// Visible text or accessible name
    pub text: String,

    /// Whether the element is currently visible
    pub visible: bool,

    /// Whether the element is enabled (relevant for inputs and buttons)
    pub enabled: bool,

    /// Whether the element blocks interaction with content behind it
    pub blocking: bool,

    /// Computed z-index, when one is set
    pub z_index: Option<i32>,
}

impl ElementInfo {
    /// A plain visible element with the given role and text
    pub fn new(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_string),
            text: text.to_string(),
            visible: true,
            enabled: true,
            blocking: false,
            z_index: None,
        }
    }

    /// Mark the element as an interaction-blocking overlay
    pub fn blocking(mut self, z_index: i32) -> Self {
        self.blocking = true;
        self.z_index = Some(z_index);
        self
    }

    /// Mark the element as disabled
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Mark the element as hidden
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Whether the element carries the given ARIA role
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// One observation of the page, fed to a single detector pass
#[derive(Debug, Clone)]
pub struct UiSnapshot {
    /// Elements currently in the DOM
    pub elements: Vec<ElementInfo>,

    /// PNG-encoded screenshot of the page
    pub screenshot: Vec<u8>,

    /// How long the DOM has gone without an observed mutation
    pub quiet_for: Duration,

    /// Accessible names of the input fields the current step expects,
    /// for the form-ready detector
    pub expected_fields: Vec<String>,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl UiSnapshot {
    /// Build a snapshot from its parts, stamped with the current time
    pub fn new(
        elements: Vec<ElementInfo>,
        screenshot: Vec<u8>,
        quiet_for: Duration,
        expected_fields: Vec<String>,
    ) -> Self {
        Self {
            elements,
            screenshot,
            quiet_for,
            expected_fields,
            taken_at: Utc::now(),
        }
    }

    /// Visible elements only
    pub fn visible_elements(&self) -> impl Iterator<Item = &ElementInfo> {
        self.elements.iter().filter(|e| e.visible)
    }

    /// Find a visible element by role
    pub fn find_by_role(&self, role: &str) -> Option<&ElementInfo> {
        self.visible_elements().find(|e| e.has_role(role))
    }
}
