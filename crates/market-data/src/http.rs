use analysis_core::SourceError;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::rate_gate::RateGate;
use crate::retry::RetryPolicy;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// HTTP plumbing shared by the source adapters.
///
/// Every attempt, retries included, passes through the shared rate gate first.
#[derive(Clone)]
pub struct SourceClient {
    name: &'static str,
    http: Client,
    gate: Arc<RateGate>,
    retry: RetryPolicy,
}

impl SourceClient {
    pub fn new(
        name: &'static str,
        gate: Arc<RateGate>,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Unavailable(format!("{name}: cannot build HTTP client: {e}")))?;

        Ok(Self {
            name,
            http,
            gate,
            retry,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// GET `url` and decode the body as JSON, with gating and retry
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        self.get_json_checked(url, query, |_| Ok(())).await
    }

    /// Like [`get_json`](Self::get_json), with a body check that runs inside the retry
    /// loop so that in-band throttle notices are retried too
    pub async fn get_json_checked(
        &self,
        url: &str,
        query: &[(&str, String)],
        check: fn(&Value) -> Result<(), SourceError>,
    ) -> Result<Value, SourceError> {
        let this = self;
        self.retry
            .run(self.name, move || async move {
                this.gate.acquire(this.name).await;
                let json = this.send_once(url, query).await?;
                check(&json)?;
                Ok(json)
            })
            .await
    }

    async fn send_once(&self, url: &str, query: &[(&str, String)]) -> Result<Value, SourceError> {
        tracing::debug!("{} GET {}", self.name, url);

        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| classify_transport(self.name, &e))?;

        if let Some(err) = classify_status(self.name, response.status()) {
            return Err(err);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Unavailable(format!("{}: malformed response: {}", self.name, e)))
    }
}

/// Maps an HTTP status to the failure taxonomy, `None` on success
pub fn classify_status(source: &str, status: StatusCode) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    let msg = format!("{source}: HTTP {status}");
    Some(match status.as_u16() {
        429 => SourceError::RateLimited(msg),
        408 => SourceError::Transient(msg),
        404 => SourceError::NotFound(msg),
        s if (500..600).contains(&s) => SourceError::Transient(msg),
        _ => SourceError::Unavailable(msg),
    })
}

fn classify_transport(source: &str, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Transient(format!("{source}: request timed out"))
    } else {
        SourceError::Unavailable(format!("{source}: {err}"))
    }
}

/// Reads a number that providers encode either as JSON numbers, `{"raw": n}` objects,
/// or strings where `"None"`, `"-"` and empty mean absent
pub fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s),
        Value::Object(map) => map.get("raw").and_then(|raw| number(Some(raw))),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

pub fn parse_numeric(s: &str) -> Option<f64> {
    let s = s.trim().trim_end_matches('%');
    match s {
        "" | "-" | "None" | "none" | "N/A" => None,
        _ => s.parse::<f64>().ok(),
    }
}

/// Non-empty string field
pub fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None")
        .map(str::to_string)
}
