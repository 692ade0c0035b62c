//! Run artifact management.
//!
//! Each task run gets its own directory under the batch:
//! `<output>/<app>_<run_id>/<task_id>/`, holding the capture PNGs, a JSON
//! manifest per capture, and the final `run.json` with the terminal
//! `RunState`.

use std::fs;
use std::path::PathBuf;

use chrono::Utc;

use crate::run::{Capture, RunState};

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while managing run artifacts
#[derive(Debug)]
pub enum SessionError {
    /// I/O error
    Io(std::io::Error),

    /// Serialization error
    Serialization(serde_json::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Io(err) => write!(f, "I/O error: {}", err),
            SessionError::Serialization(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Io(err) => Some(err),
            SessionError::Serialization(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err)
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err)
    }
}

/// The artifact directory for one task run
#[derive(Debug, Clone)]
pub struct Session {
    /// Root directory for this task run
    pub dir: PathBuf,
}

impl Session {
    /// Create a session for one task within a batch
    pub fn for_task(output_dir: &str, app: &str, run_id: &str, task_id: &str) -> Self {
        let dir = PathBuf::from(output_dir)
            .join(format!("{}_{}", sanitize_name(app), sanitize_name(run_id)))
            .join(sanitize_name(task_id));
        Self { dir }
    }

    /// Create a session rooted at an explicit directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Initialize the session directory and write its metadata
    pub fn init(&self) -> SessionResult<()> {
        fs::create_dir_all(&self.dir)?;

        let metadata = serde_json::json!({
            "created": Utc::now().to_rfc3339(),
        });
        fs::write(
            self.dir.join(".session.json"),
            serde_json::to_string_pretty(&metadata)?,
        )?;
        Ok(())
    }

    /// Path for a capture's screenshot
    pub fn capture_path(&self, sequence: usize, detector: &str) -> PathBuf {
        self.dir
            .join(format!("state_{:02}_{}.png", sequence, sanitize_name(detector)))
    }

    /// Save a capture's screenshot and its JSON sidecar manifest
    pub fn write_capture(&self, capture: &Capture, image: &[u8]) -> SessionResult<()> {
        fs::write(&capture.screenshot_path, image)?;
        let manifest_path = capture.screenshot_path.with_extension("json");
        fs::write(manifest_path, serde_json::to_string_pretty(capture)?)?;
        Ok(())
    }

    /// Write the final run state as `run.json`
    pub fn write_run_state(&self, state: &RunState) -> SessionResult<()> {
        fs::write(
            self.dir.join("run.json"),
            serde_json::to_string_pretty(state)?,
        )?;
        Ok(())
    }

    /// List all PNG captures in the session, sorted
    pub fn list_captures(&self) -> SessionResult<Vec<PathBuf>> {
        let mut captures = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    captures.push(path);
                }
            }
        }
        captures.sort();
        Ok(captures)
    }
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// Generate the batch run id shared by every task of one invocation
pub fn generate_run_id() -> String {
    Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_dir_layout() {
        let session = Session::for_task("./runs", "linear", "2026-08-29_10-00-00", "create_issue");
        let dir = session.dir.to_string_lossy();
        assert!(dir.contains("linear_2026-08-29_10-00-00"));
        assert!(dir.ends_with("create_issue"));
    }

    #[test]
    fn test_capture_path_is_sequenced() {
        let session = Session::in_dir("/tmp/x");
        let path = session.capture_path(3, "form_ready");
        assert!(path.ends_with("state_03_form_ready.png"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_name("create_issue"), "create_issue");
    }

    #[test]
    fn test_run_id_format() {
        let run_id = generate_run_id();
        assert_eq!(run_id.len(), 19);
        assert!(run_id.contains('_'));
    }
}
