//! Scripted in-memory browser for tests and dry runs.
//!
//! `MockBrowser` plays back a queue of page states: every successful action
//! (navigate, click, type) advances to the next queued page and registers a
//! DOM mutation, so the polling loop sees the page "settle" the same way a
//! real one would. Screenshots are small generated PNG frames.

use std::collections::VecDeque;
use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::RgbImage;

use super::{BrowserDriver, DriverError, DriverResult};
use crate::snapshot::ElementInfo;
use crate::task::Locator;

/// One scripted page state
#[derive(Debug, Clone)]
pub struct MockPage {
    /// Elements reported by `query_elements`
    pub elements: Vec<ElementInfo>,
    /// Fill color of the generated screenshot frame
    pub fill: [u8; 3],
}

impl MockPage {
    /// An empty page with a dark fill
    pub fn new() -> Self {
        Self {
            elements: Vec::new(),
            fill: [24, 24, 24],
        }
    }

    /// A page with the given elements
    pub fn with_elements(elements: Vec<ElementInfo>) -> Self {
        Self {
            elements,
            fill: [24, 24, 24],
        }
    }

    /// Set the screenshot fill color
    pub fn fill(mut self, color: [u8; 3]) -> Self {
        self.fill = color;
        self
    }
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

/// A scripted browser driver
pub struct MockBrowser {
    /// Pages queued for upcoming actions
    pages: VecDeque<MockPage>,
    /// The page currently "displayed"
    current: MockPage,
    /// Actions that should fail before the next success
    failures_remaining: u32,
    /// Attempts to let through before the scripted failures start
    failures_start: u32,
    /// Total actions attempted (including failures)
    pub action_count: u32,
    /// When the last DOM mutation was registered
    last_mutation: DateTime<Utc>,
    /// Whether `close` has been called
    closed: bool,
    /// Screenshot frame size in pixels
    frame_size: (u32, u32),
}

impl MockBrowser {
    /// Create a browser showing an empty page
    pub fn new() -> Self {
        Self {
            pages: VecDeque::new(),
            current: MockPage::new(),
            failures_remaining: 0,
            failures_start: 0,
            action_count: 0,
            last_mutation: Utc::now(),
            closed: false,
            frame_size: (64, 48),
        }
    }

    /// Queue a page to become current after the next successful action
    pub fn push_page(&mut self, page: MockPage) {
        self.pages.push_back(page);
    }

    /// Make the next `count` actions fail with `ActionFailed`
    pub fn fail_next_actions(&mut self, count: u32) {
        self.fail_actions_after(0, count);
    }

    /// Let `skip` attempts through, then fail the following `count` actions
    pub fn fail_actions_after(&mut self, skip: u32, count: u32) {
        self.failures_start = skip;
        self.failures_remaining = count;
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Common path for navigate/click/type: count the attempt, honor
    /// scripted failures, then advance to the next queued page
    fn perform_action(&mut self, what: &str) -> DriverResult<()> {
        self.action_count += 1;
        if self.closed {
            return Err(DriverError::SessionLost("browser closed".to_string()));
        }
        if self.failures_remaining > 0 && self.action_count > self.failures_start {
            self.failures_remaining -= 1;
            return Err(DriverError::ActionFailed(format!("{}: scripted failure", what)));
        }
        if let Some(page) = self.pages.pop_front() {
            self.current = page;
        }
        self.last_mutation = Utc::now();
        Ok(())
    }
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl BrowserDriver for MockBrowser {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        self.perform_action(&format!("navigate to {}", url))
    }

    fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        self.perform_action(&format!("click {}", locator))
    }

    fn type_text(&mut self, locator: &Locator, _text: &str) -> DriverResult<()> {
        self.perform_action(&format!("type into {}", locator))
    }

    fn screenshot(&mut self) -> DriverResult<Vec<u8>> {
        let (width, height) = self.frame_size;
        let fill = self.current.fill;
        let img = RgbImage::from_pixel(width, height, image::Rgb(fill));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .map_err(|e| DriverError::ActionFailed(format!("screenshot encode: {}", e)))?;
        Ok(bytes)
    }

    fn query_elements(&mut self) -> DriverResult<Vec<ElementInfo>> {
        Ok(self.current.elements.clone())
    }

    fn dom_mutated_since(&mut self, since: DateTime<Utc>) -> DriverResult<bool> {
        Ok(self.last_mutation > since)
    }

    fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_advance_pages() {
        let mut browser = MockBrowser::new();
        browser.push_page(MockPage::with_elements(vec![ElementInfo::new(
            Some("button"),
            "New issue",
        )]));

        assert!(browser.query_elements().unwrap().is_empty());
        browser.navigate("https://example.com").unwrap();
        let elements = browser.query_elements().unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].text, "New issue");
    }

    #[test]
    fn test_scripted_failures() {
        let mut browser = MockBrowser::new();
        browser.fail_next_actions(2);

        assert!(browser.click(&Locator::text("Save")).is_err());
        assert!(browser.click(&Locator::text("Save")).is_err());
        assert!(browser.click(&Locator::text("Save")).is_ok());
        assert_eq!(browser.action_count, 3);
    }

    #[test]
    fn test_delayed_scripted_failures() {
        let mut browser = MockBrowser::new();
        browser.fail_actions_after(2, 1);

        assert!(browser.click(&Locator::text("Save")).is_ok());
        assert!(browser.click(&Locator::text("Save")).is_ok());
        assert!(browser.click(&Locator::text("Save")).is_err());
        assert!(browser.click(&Locator::text("Save")).is_ok());
    }

    #[test]
    fn test_screenshot_is_png() {
        let mut browser = MockBrowser::new();
        let bytes = browser.screenshot().unwrap();
        assert_eq!(&bytes[0..4], &[0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_mutation_tracking() {
        let mut browser = MockBrowser::new();
        let before = Utc::now() - chrono::Duration::seconds(1);
        assert!(browser.dom_mutated_since(before).unwrap());
        let after = Utc::now() + chrono::Duration::seconds(1);
        assert!(!browser.dom_mutated_since(after).unwrap());
    }
}
