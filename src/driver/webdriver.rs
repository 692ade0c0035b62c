//! Thin W3C WebDriver client.
//!
//! Talks to a WebDriver endpoint (chromedriver, geckodriver, selenium) over
//! plain JSON-over-HTTP via `curl` subprocesses. This is deliberately a thin
//! wrapper: locator resolution, a DOM walk for element signals, and a
//! `MutationObserver` hook for quiescence tracking. All orchestration lives
//! in the capture graph.

use std::process::Command;

use base64::Engine;
use chrono::{DateTime, Utc};

use super::{BrowserDriver, DriverError, DriverResult};
use crate::snapshot::ElementInfo;
use crate::task::Locator;

/// Script that installs a MutationObserver on first use and returns the
/// epoch milliseconds of the last observed DOM mutation
const MUTATION_SCRIPT: &str = r#"
if (!window.__wvObserver) {
  window.__wvLastMutation = Date.now();
  window.__wvObserver = new MutationObserver(function () {
    window.__wvLastMutation = Date.now();
  });
  window.__wvObserver.observe(document.documentElement, {
    childList: true, subtree: true, attributes: true, characterData: true
  });
}
return window.__wvLastMutation;
"#;

/// Script that walks interaction-relevant elements and reports the signals
/// the detectors read
const ELEMENTS_SCRIPT: &str = r#"
var out = [];
var tagRoles = { BUTTON: 'button', INPUT: 'textbox', TEXTAREA: 'textbox', A: 'link' };
var nodes = document.querySelectorAll(
  "button,[role],input,textarea,a,[aria-modal],[aria-live]");
for (var i = 0; i < nodes.length; i++) {
  var el = nodes[i];
  var st = getComputedStyle(el);
  var r = el.getBoundingClientRect();
  var visible = st.display !== 'none' && st.visibility !== 'hidden'
    && r.width > 0 && r.height > 0;
  var z = parseInt(st.zIndex, 10);
  var blocking = el.getAttribute('aria-modal') === 'true'
    || (st.position === 'fixed' && !isNaN(z) && z >= 100
        && r.width > window.innerWidth * 0.3);
  out.push({
    role: el.getAttribute('role') || tagRoles[el.tagName] || null,
    text: (el.getAttribute('aria-label') || el.innerText || el.value || '')
      .trim().slice(0, 200),
    visible: visible,
    enabled: !el.disabled,
    blocking: blocking,
    z_index: isNaN(z) ? null : z
  });
}
return out;
"#;

/// A browser session behind a W3C WebDriver endpoint
pub struct WebDriverBrowser {
    /// Endpoint base URL (e.g., "http://127.0.0.1:4444")
    endpoint: String,
    /// WebDriver session id
    session_id: String,
    /// Connection timeout for each request (seconds)
    connect_timeout: u64,
}

impl WebDriverBrowser {
    /// Open a new browser session at the given WebDriver endpoint
    pub fn connect(endpoint: &str) -> DriverResult<Self> {
        let body = serde_json::json!({
            "capabilities": { "alwaysMatch": {} }
        });
        let value = http_request(endpoint, "POST", "/session", Some(&body), 10)?;
        let session_id = value["value"]["sessionId"]
            .as_str()
            .ok_or_else(|| {
                DriverError::SessionLost(format!("no session id in response: {}", value))
            })?
            .to_string();

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            session_id,
            connect_timeout: 10,
        })
    }

    fn session_path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.session_id, suffix)
    }

    fn request(
        &self,
        method: &str,
        suffix: &str,
        body: Option<&serde_json::Value>,
    ) -> DriverResult<serde_json::Value> {
        http_request(
            &self.endpoint,
            method,
            &self.session_path(suffix),
            body,
            self.connect_timeout,
        )
    }

    /// Run a synchronous script in the page and return its value
    fn execute(&self, script: &str) -> DriverResult<serde_json::Value> {
        let body = serde_json::json!({ "script": script, "args": [] });
        let value = self.request("POST", "/execute/sync", Some(&body))?;
        Ok(value["value"].clone())
    }

    /// Resolve a locator to a WebDriver element id
    fn find_element(&self, locator: &Locator) -> DriverResult<String> {
        let (using, value) = locator_strategy(locator);
        let body = serde_json::json!({ "using": using, "value": value });
        let response = self.request("POST", "/element", Some(&body))?;

        // The element id lives under a spec-defined magic key
        let element = response["value"]
            .as_object()
            .and_then(|obj| obj.values().next())
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DriverError::ActionFailed(format!("element not found: {}", locator))
            })?;
        Ok(element.to_string())
    }
}

impl BrowserDriver for WebDriverBrowser {
    fn navigate(&mut self, url: &str) -> DriverResult<()> {
        let body = serde_json::json!({ "url": url });
        self.request("POST", "/url", Some(&body))?;
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        let element = self.find_element(locator)?;
        let body = serde_json::json!({});
        self.request("POST", &format!("/element/{}/click", element), Some(&body))?;
        Ok(())
    }

    fn type_text(&mut self, locator: &Locator, text: &str) -> DriverResult<()> {
        let element = self.find_element(locator)?;
        let body = serde_json::json!({ "text": text });
        self.request("POST", &format!("/element/{}/value", element), Some(&body))?;
        Ok(())
    }

    fn screenshot(&mut self) -> DriverResult<Vec<u8>> {
        let response = self.request("GET", "/screenshot", None)?;
        let encoded = response["value"].as_str().ok_or_else(|| {
            DriverError::ActionFailed("screenshot response had no image data".to_string())
        })?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DriverError::ActionFailed(format!("screenshot decode: {}", e)))
    }

    fn query_elements(&mut self) -> DriverResult<Vec<ElementInfo>> {
        let value = self.execute(ELEMENTS_SCRIPT)?;
        serde_json::from_value(value)
            .map_err(|e| DriverError::ActionFailed(format!("element query parse: {}", e)))
    }

    fn dom_mutated_since(&mut self, since: DateTime<Utc>) -> DriverResult<bool> {
        let value = self.execute(MUTATION_SCRIPT)?;
        let last_mutation_ms = value.as_i64().ok_or_else(|| {
            DriverError::ActionFailed(format!("mutation probe returned {}", value))
        })?;
        Ok(last_mutation_ms > since.timestamp_millis())
    }

    fn close(&mut self) -> DriverResult<()> {
        self.request("DELETE", "", None)?;
        Ok(())
    }
}

/// Map a locator to a WebDriver location strategy
fn locator_strategy(locator: &Locator) -> (&'static str, String) {
    match locator {
        Locator::Css(selector) => ("css selector", selector.clone()),
        Locator::Text(text) => (
            "xpath",
            format!("//*[contains(normalize-space(.), {})]", xpath_literal(text)),
        ),
        Locator::Role { role, name } => {
            let name_lit = xpath_literal(name);
            (
                "xpath",
                format!(
                    "//*[(@role={role_lit} or self::{tag}) \
                     and (normalize-space(.)={name} or @aria-label={name} \
                     or @placeholder={name})]",
                    role_lit = xpath_literal(role),
                    tag = role_tag(role),
                    name = name_lit,
                ),
            )
        }
    }
}

/// Native tag equivalent for a handful of common ARIA roles
fn role_tag(role: &str) -> &'static str {
    match role {
        "button" => "button",
        "link" => "a",
        "textbox" => "input",
        _ => "*",
    }
}

/// Quote a string as an XPath literal, handling embedded quotes
fn xpath_literal(text: &str) -> String {
    if !text.contains('\'') {
        format!("'{}'", text)
    } else if !text.contains('"') {
        format!("\"{}\"", text)
    } else {
        let parts: Vec<String> = text.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

/// Issue one HTTP request through curl and parse the JSON response.
/// A WebDriver-level error payload is converted into `ActionFailed`.
fn http_request(
    endpoint: &str,
    method: &str,
    path: &str,
    body: Option<&serde_json::Value>,
    connect_timeout: u64,
) -> DriverResult<serde_json::Value> {
    let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
    let mut cmd = Command::new("curl");
    cmd.args([
        "-s",
        "-X",
        method,
        &url,
        "-H",
        "Content-Type: application/json",
        "--connect-timeout",
        &connect_timeout.to_string(),
    ]);
    let body_json;
    if let Some(body) = body {
        body_json = serde_json::to_string(body)
            .map_err(|e| DriverError::ActionFailed(format!("request encode: {}", e)))?;
        cmd.args(["-d", &body_json]);
    }

    let output = cmd.output()?;
    if !output.status.success() {
        return Err(DriverError::SessionLost(format!(
            "curl failed for {} {}: {}",
            method,
            url,
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    let value: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| DriverError::ActionFailed(format!("response parse: {}", e)))?;

    if let Some(error) = value["value"]["error"].as_str() {
        let message = value["value"]["message"].as_str().unwrap_or(error);
        return Err(DriverError::ActionFailed(format!("{}: {}", error, message)));
    }
    Ok(value)
}
