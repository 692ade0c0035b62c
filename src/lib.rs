//! Web Vision - Web UI task automation with detector-driven capture.
//!
//! This crate provides:
//! - A capture graph that executes task steps against a browser and decides
//!   when the UI has reached a state worth keeping
//! - Heuristic detectors (modal, notification, form-ready, quiet window) over
//!   UI snapshots
//! - VLM verification for ambiguous detector signals
//! - Task catalogs for Linear and Notion
//! - Run artifact management under `./runs/`
//!
//! # Example
//!
//! ```rust,no_run
//! use web_vision::adapters::{LinearTasks, TaskSource};
//! use web_vision::config::Config;
//! use web_vision::detectors::DetectorRegistry;
//! use web_vision::driver::MockBrowser;
//! use web_vision::graph::CaptureGraph;
//! use web_vision::session::{generate_run_id, Session};
//! use web_vision::verify::Verifier;
//! use web_vision::vlm::HttpVlmClient;
//! use std::time::Duration;
//!
//! let config = Config::from_env();
//! let run_id = generate_run_id();
//! let task = LinearTasks::new("acme").get_tasks().remove(0);
//! let session = Session::for_task(&config.runs.output_dir, &task.app, &run_id, &task.task_id);
//! let verifier = Verifier::new(
//!     Box::new(HttpVlmClient::new(config.vlm.clone())),
//!     config.capture.clone(),
//! );
//! let registry = DetectorRegistry::with_builtins(Duration::from_millis(config.capture.quiet_window_ms));
//! let mut graph = CaptureGraph::new(
//!     task,
//!     &run_id,
//!     Box::new(MockBrowser::new()),
//!     registry,
//!     verifier,
//!     config.capture,
//!     session,
//! );
//! let state = graph.run();
//! println!("{:?}: {} captures", state.status, state.captures.len());
//! ```

pub mod adapters;
pub mod config;
pub mod detectors;
pub mod driver;
pub mod graph;
pub mod run;
pub mod session;
pub mod snapshot;
pub mod task;
pub mod verify;
pub mod vlm;

// Re-export configuration
pub use config::{AdapterSettings, CaptureSettings, Config, RunSettings, VlmSettings};

// Re-export task types
pub use task::{CapturePolicy, Locator, StepAction, StepSpec, StepTarget, TaskSpec};

// Re-export the capture graph and run types
pub use graph::CaptureGraph;
pub use run::{Capture, RunEvent, RunState, RunStatus};

// Re-export detectors
pub use detectors::{Detector, DetectorRegistry, DetectorResult};

// Re-export drivers
pub use driver::{BrowserDriver, DriverError, DriverResult, MockBrowser, WebDriverBrowser};

// Re-export verification
pub use verify::{needs_verification, VerdictSource, VerificationVerdict, Verifier};

// Re-export VLM client
pub use vlm::{
    build_verification_question, check_health, HttpVlmClient, VlmAnswer, VlmClient, VlmError,
    VlmResult,
};

// Re-export session management
pub use session::{generate_run_id, Session, SessionError, SessionResult};
