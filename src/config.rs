//! Configuration management with environment variable support.
//!
//! This module provides centralized configuration for Web Vision. A `Config`
//! is built once at startup (`Config::from_env` or `Config::defaults`) and
//! passed into the components that need it; there is no process-global state.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WEB_VISION_VLM_ENDPOINT` | VLM API endpoint URL | `http://127.0.0.1:8080/v1/chat/completions` |
//! | `WEB_VISION_VLM_MODEL` | Model name for VLM | `qwen3` |
//! | `WEB_VISION_VLM_MAX_TOKENS` | Maximum tokens in VLM response | `200` |
//! | `WEB_VISION_VLM_CONNECT_TIMEOUT` | VLM connection timeout in seconds | `10` |
//! | `WEB_VISION_VLM_TIMEOUT` | VLM request timeout in seconds | `60` |
//! | `WEB_VISION_AUTO_ACCEPT` | Detector auto-accept threshold | `0.9` |
//! | `WEB_VISION_FALLBACK_THRESHOLD` | Detector-only fallback threshold | `0.75` |
//! | `WEB_VISION_OUTPUT_DIR` | Base directory for run artifacts | `./runs` |
//! | `WEB_VISION_LINEAR_WORKSPACE` | Linear workspace slug | `test-softlight` |
//! | `WEB_VISION_NOTION_WORKSPACE` | Notion workspace/database id | (empty) |
//! | `WEB_VISION_WEBDRIVER_URL` | WebDriver endpoint URL | `http://127.0.0.1:4444` |

use std::env;

// ============================================================================
// Default Values
// ============================================================================

/// Default VLM API endpoint
pub const DEFAULT_VLM_ENDPOINT: &str = "http://127.0.0.1:8080/v1/chat/completions";

/// Default VLM model name
pub const DEFAULT_VLM_MODEL: &str = "qwen3";

/// Default max tokens for VLM verification answers
pub const DEFAULT_VLM_MAX_TOKENS: u32 = 200;

/// Default VLM connection timeout (seconds)
pub const DEFAULT_VLM_CONNECT_TIMEOUT: u64 = 10;

/// Default VLM request timeout (seconds)
pub const DEFAULT_VLM_REQUEST_TIMEOUT: u64 = 60;

/// Default detector auto-accept threshold
pub const DEFAULT_AUTO_ACCEPT_THRESHOLD: f64 = 0.9;

/// Default detector-only fallback threshold (used when the VLM is unavailable)
pub const DEFAULT_FALLBACK_THRESHOLD: f64 = 0.75;

/// Default tie band: fired detectors within this distance of the best one
/// count as comparable signals and force verification
pub const DEFAULT_TIE_BAND: f64 = 0.1;

/// Default interval between detector polls (milliseconds)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// Default per-step detection deadline (seconds)
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 15;

/// Default retry budget for a failed browser action
pub const DEFAULT_ACTION_RETRIES: u32 = 3;

/// Default backoff unit between action retries (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default re-poll budget after a rejected verification verdict
pub const DEFAULT_REJECT_RETRIES: u32 = 2;

/// Default minimum no-mutation interval for the quiet-window detector (ms)
pub const DEFAULT_QUIET_WINDOW_MS: u64 = 800;

/// Default delay between tasks in a batch (milliseconds)
pub const DEFAULT_INTER_TASK_DELAY_MS: u64 = 2000;

/// Default base directory for run artifacts
pub const DEFAULT_OUTPUT_DIR: &str = "./runs";

/// Default Linear workspace slug
pub const DEFAULT_LINEAR_WORKSPACE: &str = "test-softlight";

/// Default WebDriver endpoint
pub const DEFAULT_WEBDRIVER_URL: &str = "http://127.0.0.1:4444";

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable for VLM endpoint
pub const ENV_VLM_ENDPOINT: &str = "WEB_VISION_VLM_ENDPOINT";

/// Environment variable for VLM model
pub const ENV_VLM_MODEL: &str = "WEB_VISION_VLM_MODEL";

/// Environment variable for VLM max tokens
pub const ENV_VLM_MAX_TOKENS: &str = "WEB_VISION_VLM_MAX_TOKENS";

/// Environment variable for VLM connection timeout
pub const ENV_VLM_CONNECT_TIMEOUT: &str = "WEB_VISION_VLM_CONNECT_TIMEOUT";

/// Environment variable for VLM request timeout
pub const ENV_VLM_REQUEST_TIMEOUT: &str = "WEB_VISION_VLM_TIMEOUT";

/// Environment variable for the auto-accept threshold
pub const ENV_AUTO_ACCEPT: &str = "WEB_VISION_AUTO_ACCEPT";

/// Environment variable for the fallback threshold
pub const ENV_FALLBACK_THRESHOLD: &str = "WEB_VISION_FALLBACK_THRESHOLD";

/// Environment variable for the artifact output directory
pub const ENV_OUTPUT_DIR: &str = "WEB_VISION_OUTPUT_DIR";

/// Environment variable for the Linear workspace slug
pub const ENV_LINEAR_WORKSPACE: &str = "WEB_VISION_LINEAR_WORKSPACE";

/// Environment variable for the Notion workspace/database id
pub const ENV_NOTION_WORKSPACE: &str = "WEB_VISION_NOTION_WORKSPACE";

/// Environment variable for the WebDriver endpoint
pub const ENV_WEBDRIVER_URL: &str = "WEB_VISION_WEBDRIVER_URL";

// ============================================================================
// Configuration Structs
// ============================================================================

/// Centralized configuration for Web Vision
#[derive(Debug, Clone)]
pub struct Config {
    /// VLM configuration
    pub vlm: VlmSettings,
    /// Capture decision tuning
    pub capture: CaptureSettings,
    /// Task-source adapter settings
    pub adapters: AdapterSettings,
    /// Run/batch settings
    pub runs: RunSettings,
}

/// VLM-related settings
#[derive(Debug, Clone)]
pub struct VlmSettings {
    /// API endpoint URL
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Maximum tokens in response
    pub max_tokens: u32,
    /// Connection timeout (seconds)
    pub connect_timeout: u64,
    /// Total request timeout (seconds)
    pub request_timeout: u64,
}

/// Tuning knobs for the capture decision loop
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Detector confidence at or above this value is accepted without VLM
    /// cost. The comparison is inclusive: a confidence exactly at the
    /// threshold auto-accepts.
    pub auto_accept_threshold: f64,
    /// Minimum detector confidence for acceptance when the VLM is unavailable
    pub fallback_threshold: f64,
    /// Two fired detectors within this band of each other count as a tie
    pub tie_band: f64,
    /// Interval between detector polls (milliseconds)
    pub poll_interval_ms: u64,
    /// Per-step detection deadline (seconds)
    pub step_timeout_secs: u64,
    /// Retry budget for a failed browser action
    pub action_retries: u32,
    /// Backoff unit between action retries (milliseconds, linear)
    pub retry_backoff_ms: u64,
    /// Re-poll budget after a rejected verification verdict
    pub reject_retries: u32,
    /// Minimum no-mutation interval for the quiet-window detector (ms)
    pub quiet_window_ms: u64,
}

/// Task-source adapter settings
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Linear workspace slug (URL path component)
    pub linear_workspace: String,
    /// Notion workspace or database id
    pub notion_workspace: String,
}

/// Batch run settings
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Base directory for run artifacts
    pub output_dir: String,
    /// Delay between tasks in a batch (milliseconds)
    pub inter_task_delay_ms: u64,
    /// WebDriver endpoint URL
    pub webdriver_url: String,
}

impl Config {
    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            vlm: VlmSettings::from_env(),
            capture: CaptureSettings::from_env(),
            adapters: AdapterSettings::from_env(),
            runs: RunSettings::from_env(),
        }
    }

    /// Create configuration with all defaults (ignoring environment)
    pub fn defaults() -> Self {
        Self {
            vlm: VlmSettings::defaults(),
            capture: CaptureSettings::defaults(),
            adapters: AdapterSettings::defaults(),
            runs: RunSettings::defaults(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl VlmSettings {
    /// Create VLM settings from environment variables
    pub fn from_env() -> Self {
        Self {
            endpoint: env::var(ENV_VLM_ENDPOINT)
                .unwrap_or_else(|_| DEFAULT_VLM_ENDPOINT.to_string()),
            model: env::var(ENV_VLM_MODEL).unwrap_or_else(|_| DEFAULT_VLM_MODEL.to_string()),
            max_tokens: parse_env(ENV_VLM_MAX_TOKENS, DEFAULT_VLM_MAX_TOKENS),
            connect_timeout: parse_env(ENV_VLM_CONNECT_TIMEOUT, DEFAULT_VLM_CONNECT_TIMEOUT),
            request_timeout: parse_env(ENV_VLM_REQUEST_TIMEOUT, DEFAULT_VLM_REQUEST_TIMEOUT),
        }
    }

    /// Create VLM settings with defaults
    pub fn defaults() -> Self {
        Self {
            endpoint: DEFAULT_VLM_ENDPOINT.to_string(),
            model: DEFAULT_VLM_MODEL.to_string(),
            max_tokens: DEFAULT_VLM_MAX_TOKENS,
            connect_timeout: DEFAULT_VLM_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_VLM_REQUEST_TIMEOUT,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl CaptureSettings {
    /// Create capture settings from environment variables
    pub fn from_env() -> Self {
        Self {
            auto_accept_threshold: parse_env(ENV_AUTO_ACCEPT, DEFAULT_AUTO_ACCEPT_THRESHOLD),
            fallback_threshold: parse_env(ENV_FALLBACK_THRESHOLD, DEFAULT_FALLBACK_THRESHOLD),
            ..Self::defaults()
        }
    }

    /// Create capture settings with defaults
    pub fn defaults() -> Self {
        Self {
            auto_accept_threshold: DEFAULT_AUTO_ACCEPT_THRESHOLD,
            fallback_threshold: DEFAULT_FALLBACK_THRESHOLD,
            tie_band: DEFAULT_TIE_BAND,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            action_retries: DEFAULT_ACTION_RETRIES,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            reject_retries: DEFAULT_REJECT_RETRIES,
            quiet_window_ms: DEFAULT_QUIET_WINDOW_MS,
        }
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self::defaults()
    }
}

impl AdapterSettings {
    /// Create adapter settings from environment variables
    pub fn from_env() -> Self {
        Self {
            linear_workspace: env::var(ENV_LINEAR_WORKSPACE)
                .unwrap_or_else(|_| DEFAULT_LINEAR_WORKSPACE.to_string()),
            notion_workspace: env::var(ENV_NOTION_WORKSPACE).unwrap_or_default(),
        }
    }

    /// Create adapter settings with defaults
    pub fn defaults() -> Self {
        Self {
            linear_workspace: DEFAULT_LINEAR_WORKSPACE.to_string(),
            notion_workspace: String::new(),
        }
    }
}

impl RunSettings {
    /// Create run settings from environment variables
    pub fn from_env() -> Self {
        Self {
            output_dir: env::var(ENV_OUTPUT_DIR).unwrap_or_else(|_| DEFAULT_OUTPUT_DIR.to_string()),
            inter_task_delay_ms: DEFAULT_INTER_TASK_DELAY_MS,
            webdriver_url: env::var(ENV_WEBDRIVER_URL)
                .unwrap_or_else(|_| DEFAULT_WEBDRIVER_URL.to_string()),
        }
    }

    /// Create run settings with defaults
    pub fn defaults() -> Self {
        Self {
            output_dir: DEFAULT_OUTPUT_DIR.to_string(),
            inter_task_delay_ms: DEFAULT_INTER_TASK_DELAY_MS,
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
        }
    }
}

/// Parse an environment variable, falling back to a default on absence or
/// parse failure
fn parse_env<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}
