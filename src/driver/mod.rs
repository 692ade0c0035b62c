//! Browser driver abstraction.
//!
//! This module provides a unified interface over whatever actually drives the
//! web application:
//! - `WebDriverBrowser` for a real browser behind a W3C WebDriver endpoint
//! - `MockBrowser` for tests and dry runs
//!
//! The capture graph only sees the `BrowserDriver` trait; everything a driver
//! can get wrong surfaces as a uniform `ActionFailed` error.

pub mod mock;
pub mod webdriver;

pub use mock::{MockBrowser, MockPage};
pub use webdriver::WebDriverBrowser;

use chrono::{DateTime, Utc};

use crate::snapshot::ElementInfo;
use crate::task::Locator;

/// Result type for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors that can occur while driving the browser
#[derive(Debug)]
pub enum DriverError {
    /// An action could not be performed (element not found, timeout, ...)
    ActionFailed(String),

    /// The driver session itself is gone
    SessionLost(String),

    /// I/O error talking to the driver
    Io(std::io::Error),
}

impl std::fmt::Display for DriverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverError::ActionFailed(reason) => write!(f, "action failed: {}", reason),
            DriverError::SessionLost(reason) => write!(f, "session lost: {}", reason),
            DriverError::Io(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Io(err)
    }
}

/// Trait for browser drivers
///
/// One driver instance is scoped to one task run. The capture graph calls
/// `close` on every exit path, success or failure, so implementations must
/// make `close` safe to call after errors.
pub trait BrowserDriver: Send {
    /// Load a URL
    fn navigate(&mut self, url: &str) -> DriverResult<()>;

    /// Click the element matched by the locator
    fn click(&mut self, locator: &Locator) -> DriverResult<()>;

    /// Type text into the element matched by the locator
    fn type_text(&mut self, locator: &Locator, text: &str) -> DriverResult<()>;

    /// Render the current page to PNG bytes
    fn screenshot(&mut self) -> DriverResult<Vec<u8>>;

    /// List the elements currently in the DOM
    fn query_elements(&mut self) -> DriverResult<Vec<ElementInfo>>;

    /// Whether any DOM mutation has been observed since the given instant
    fn dom_mutated_since(&mut self, since: DateTime<Utc>) -> DriverResult<bool>;

    /// Release the underlying browser resources
    fn close(&mut self) -> DriverResult<()>;
}
