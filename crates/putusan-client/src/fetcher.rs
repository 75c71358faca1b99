use std::time::Duration;

use putusan_core::error::AppError;
use putusan_core::models::{IdentityRecord, RawResult, TransportErrorKind};
use putusan_core::traits::PrimaryTransport;
use reqwest::Client;
use reqwest::header::USER_AGENT;

/// Primary transport: a pooled reqwest client.
///
/// Connections are reused across attempts. The user agent and extra headers
/// come from the identity drawn for each attempt. This never retries and
/// never returns an error: every condition ends up in the [`RawResult`].
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| AppError::HttpError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl PrimaryTransport for ReqwestTransport {
    async fn send(&self, url: &str, identity: &IdentityRecord) -> RawResult {
        let mut request = self
            .client
            .get(url)
            .header(USER_AGENT, identity.user_agent.as_str());
        for (name, value) in &identity.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let kind = error_kind(&e);
                tracing::debug!(%url, ?kind, error = %e, "Request failed");
                return RawResult::transport_error(kind, error_chain(&e.without_url()));
            }
        };

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        match response.text().await {
            Ok(body) => RawResult {
                http_status: Some(status),
                headers,
                body: Some(body),
                error: None,
                detail: None,
            },
            Err(e) => {
                let kind = error_kind(&e);
                tracing::debug!(%url, status, ?kind, error = %e, "Failed to read response body");
                RawResult {
                    headers,
                    ..RawResult::transport_error(kind, error_chain(&e.without_url()))
                }
            }
        }
    }
}

/// Map a reqwest error to the transport error taxonomy.
fn error_kind(err: &reqwest::Error) -> TransportErrorKind {
    if err.is_timeout() {
        return TransportErrorKind::Timeout;
    }
    // The URL is left out so that paths like `/ssl/` don't skew matching.
    let mut message = String::new();
    let mut source = std::error::Error::source(err);
    while let Some(e) = source {
        message.push_str(&e.to_string());
        message.push_str(": ");
        source = e.source();
    }
    kind_from_message(&message)
}

/// Classify an error chain by its text. hyper, rustls and native-tls only
/// expose these conditions through their messages.
fn kind_from_message(message: &str) -> TransportErrorKind {
    let lower = message.to_lowercase();
    if lower.contains("timed out") || lower.contains("deadline has elapsed") {
        TransportErrorKind::Timeout
    } else if lower.contains("dns error")
        || lower.contains("failed to lookup")
        || lower.contains("name or service not known")
        || lower.contains("no such host")
    {
        TransportErrorKind::Dns
    } else if lower.contains("certificate")
        || lower.contains("tls")
        || lower.contains("ssl")
        || lower.contains("handshake")
    {
        TransportErrorKind::Tls
    } else {
        TransportErrorKind::Connection
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        out.push_str(": ");
        out.push_str(&e.to_string());
        source = e.source();
    }
    out
}
