//! Blocking HTTP helpers shared by the provider adapters.

use crate::fetch::FetchError;
use serde_json::Value;
use std::time::Duration;

/// ureq agent with a global per-request timeout.
///
/// Requests run inside `spawn_blocking`; the global timeout guarantees an
/// abandoned request still ends on its own.
#[derive(Clone)]
pub struct HttpClient {
    agent: ureq::Agent,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { agent }
    }

    pub fn get_text(&self, url: &str, headers: &[(&str, &str)]) -> Result<String, FetchError> {
        let mut request = self.agent.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        request
            .call()
            .map_err(classify)?
            .body_mut()
            .read_to_string()
            .map_err(classify)
    }

    pub fn get_json(&self, url: &str, headers: &[(&str, &str)]) -> Result<Value, FetchError> {
        let body = self.get_text(url, headers)?;
        Ok(serde_json::from_str(&body)?)
    }

    pub fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, FetchError> {
        let mut request = self
            .agent
            .post(url)
            .header("Content-Type", "application/json");
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let text = request
            .send(&body.to_string())
            .map_err(classify)?
            .body_mut()
            .read_to_string()
            .map_err(classify)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Form POST; the raw ureq error is returned so callers can inspect status codes.
    pub fn post_form(&self, url: &str, fields: &[(&str, &str)]) -> Result<String, ureq::Error> {
        self.agent
            .post(url)
            .send_form(fields.iter().copied())?
            .body_mut()
            .read_to_string()
    }
}

/// Maps transport errors onto the fetch taxonomy. 401/403 mean the
/// credential was rejected.
pub fn classify(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(code @ (401 | 403)) => {
            FetchError::Authentication(format!("HTTP {}", code))
        }
        ureq::Error::StatusCode(code) => FetchError::Network(format!("HTTP {}", code)),
        ureq::Error::Timeout(_) => FetchError::Network("request timed out".to_string()),
        other => FetchError::Network(other.to_string()),
    }
}

/// `Bearer <token>` header value.
pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}
