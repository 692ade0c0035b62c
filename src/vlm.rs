//! Vision Language Model (VLM) client.
//!
//! Provides the question-answering capability the verification step consumes:
//! given a screenshot and a yes/no question, return an answer and a
//! confidence. The HTTP implementation speaks the OpenAI-compatible chat
//! completions protocol with the image inlined as base64 PNG.
//!
//! # Configuration
//!
//! Endpoint, model, and timeouts come from `VlmSettings` (see the `config`
//! module for the corresponding environment variables).

use std::process::Command;

use base64::Engine;

use crate::config::VlmSettings;
use crate::task::StepSpec;

/// Result type for VLM operations
pub type VlmResult<T> = Result<T, VlmError>;

/// Errors that can occur during VLM operations
#[derive(Debug)]
pub enum VlmError {
    /// Failed to connect to the VLM endpoint
    ConnectionFailed(String),
    /// Invalid response from the VLM
    InvalidResponse(String),
    /// IO error
    Io(std::io::Error),
}

impl std::fmt::Display for VlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VlmError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            VlmError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            VlmError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for VlmError {}

impl From<std::io::Error> for VlmError {
    fn from(e: std::io::Error) -> Self {
        VlmError::Io(e)
    }
}

/// A graded answer from the VLM
#[derive(Debug, Clone)]
pub struct VlmAnswer {
    /// Raw answer text
    pub answer: String,
    /// Model-reported confidence in `[0, 1]`
    pub confidence: f64,
}

impl VlmAnswer {
    /// Whether the answer is affirmative. `None` when the reply is neither
    /// a yes nor a no; the verifier treats that as a malformed answer.
    pub fn is_affirmative(&self) -> Option<bool> {
        let normalized = self.answer.trim().to_lowercase();
        if normalized.starts_with("yes") {
            Some(true)
        } else if normalized.starts_with("no") {
            Some(false)
        } else {
            None
        }
    }
}

/// Trait for the VLM capability
///
/// Implementations answer one yes/no question about one image. Tests swap in
/// a scripted implementation at this seam.
pub trait VlmClient: Send {
    /// Ask a question about an image
    fn ask(&self, image: &[u8], question: &str) -> VlmResult<VlmAnswer>;
}

/// VLM client over an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct HttpVlmClient {
    settings: VlmSettings,
}

impl HttpVlmClient {
    /// Create a client with the given settings
    pub fn new(settings: VlmSettings) -> Self {
        Self { settings }
    }
}

impl VlmClient for HttpVlmClient {
    fn ask(&self, image: &[u8], question: &str) -> VlmResult<VlmAnswer> {
        let img_base64 = base64::engine::general_purpose::STANDARD.encode(image);

        let request = serde_json::json!({
            "model": self.settings.model,
            "messages": [{
                "role": "user",
                "content": [
                    {
                        "type": "image_url",
                        "image_url": {
                            "url": format!("data:image/png;base64,{}", img_base64)
                        }
                    },
                    {
                        "type": "text",
                        "text": question
                    }
                ]
            }],
            "max_tokens": self.settings.max_tokens,
            "temperature": 0.1
        });

        let request_json = serde_json::to_string(&request)
            .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

        let output = Command::new("curl")
            .args([
                "-s",
                "-X", "POST",
                &self.settings.endpoint,
                "-H", "Content-Type: application/json",
                "-d", &request_json,
                "--connect-timeout", &self.settings.connect_timeout.to_string(),
                "--max-time", &self.settings.request_timeout.to_string(),
            ])
            .output()?;

        if !output.status.success() {
            return Err(VlmError::ConnectionFailed(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let response: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| VlmError::InvalidResponse(e.to_string()))?;

        let content = response["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("");

        // Thinking models put their usable text under reasoning_content
        let text = if content.is_empty() {
            response["choices"][0]["message"]["reasoning_content"]
                .as_str()
                .unwrap_or("")
        } else {
            content
        };

        if text.is_empty() {
            return Err(VlmError::InvalidResponse(format!(
                "no content in response: {}",
                response
            )));
        }

        Ok(parse_answer(text))
    }
}

/// Check if a VLM endpoint is reachable (connection-only check).
///
/// This only verifies the server accepts connections - it doesn't wait for a
/// full response since VLM requests can take 30+ seconds for large images.
pub fn check_health(endpoint: &str, timeout_secs: u64) -> VlmResult<bool> {
    let url = endpoint.trim_start_matches("http://").trim_start_matches("https://");
    let host_port = url.split('/').next().unwrap_or("127.0.0.1:8080");

    let output = Command::new("curl")
        .args([
            "-s",
            "-o", "/dev/null",
            "-w", "%{http_code}",
            "--connect-timeout", &timeout_secs.to_string(),
            "--max-time", &timeout_secs.to_string(),
            "-I",
            &format!("http://{}", host_port),
        ])
        .output()?;

    let status = String::from_utf8_lossy(&output.stdout);
    // Any response (even 4xx/5xx) means the server is reachable;
    // 000 means the connection failed entirely
    let code: u16 = status.trim().parse().unwrap_or(0);
    Ok(code > 0)
}

/// Parse a model reply of the form "YES 0.9" / "NO (0.4)" / free text.
///
/// When no numeric confidence is present, a clear yes/no gets a moderate
/// default and anything else a zero confidence.
pub fn parse_answer(text: &str) -> VlmAnswer {
    let trimmed = text.trim();

    let confidence = trimmed
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f64>().ok())
        .find(|v| (0.0..=1.0).contains(v));

    let answer = VlmAnswer {
        answer: trimmed.to_string(),
        confidence: confidence.unwrap_or(0.0),
    };

    match (answer.is_affirmative(), confidence) {
        (Some(_), None) => VlmAnswer {
            confidence: 0.6,
            ..answer
        },
        _ => answer,
    }
}

/// Build the verification question for a task step.
///
/// A step's explicit `verify` question wins; otherwise a generic question is
/// derived from the step itself.
pub fn build_verification_question(task_name: &str, step: &StepSpec) -> String {
    if let Some(question) = &step.verify {
        format!(
            "{} Answer YES or NO, followed by a confidence between 0 and 1.",
            question
        )
    } else {
        format!(
            "This screenshot was taken after performing '{}' during the task '{}'. \
             Does the page show the expected result of that action, fully rendered \
             and not mid-transition? Answer YES or NO, followed by a confidence \
             between 0 and 1.",
            step.describe(),
            task_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{StepAction, StepTarget};

    #[test]
    fn test_parse_answer_with_confidence() {
        let answer = parse_answer("YES 0.92");
        assert_eq!(answer.is_affirmative(), Some(true));
        assert_eq!(answer.confidence, 0.92);
    }

    #[test]
    fn test_parse_answer_negative() {
        let answer = parse_answer("No (0.4) - the dialog is still loading");
        assert_eq!(answer.is_affirmative(), Some(false));
        assert_eq!(answer.confidence, 0.4);
    }

    #[test]
    fn test_parse_answer_without_confidence_gets_default() {
        let answer = parse_answer("Yes, the issue form is visible.");
        assert_eq!(answer.is_affirmative(), Some(true));
        assert_eq!(answer.confidence, 0.6);
    }

    #[test]
    fn test_parse_answer_malformed() {
        let answer = parse_answer("The screenshot shows a form.");
        assert_eq!(answer.is_affirmative(), None);
    }

    #[test]
    fn test_build_question_uses_explicit_verify() {
        let step = StepSpec::new(StepAction::Click).verify("Is the success toast visible?");
        let question = build_verification_question("Create an issue", &step);
        assert!(question.starts_with("Is the success toast visible?"));
        assert!(question.contains("YES or NO"));
    }

    #[test]
    fn test_build_question_default_mentions_step() {
        let step = StepSpec::new(StepAction::Navigate)
            .target(StepTarget::Url("https://linear.app/acme".to_string()));
        let question = build_verification_question("Create an issue", &step);
        assert!(question.contains("navigate"));
        assert!(question.contains("Create an issue"));
    }
}
