//! Provider failures and HTTP error classification.

use std::time::Duration;

use mercabot_core::error::ToolError;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider}: quota exhausted ({detail})")]
    QuotaExhausted { provider: String, detail: String },

    #[error("{provider}: rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider}: unauthorized (HTTP {status})")]
    Unauthorized { provider: String, status: u16 },

    #[error("{provider}: upstream error HTTP {status}: {body}")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: malformed response: {detail}")]
    MalformedResponse { provider: String, detail: String },

    #[error("{provider}: request failed: {detail}")]
    Transport { provider: String, detail: String },

    #[error("{provider}: stream failed: {detail}")]
    Stream { provider: String, detail: String },

    #[error("provider '{0}' is not configured")]
    NotConfigured(String),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl ProviderError {
    pub fn malformed(provider: &str, detail: impl std::fmt::Display) -> Self {
        ProviderError::MalformedResponse {
            provider: provider.to_string(),
            detail: detail.to_string(),
        }
    }

    pub fn transport(provider: &str, err: &reqwest::Error) -> Self {
        error!(provider, error = %err, "HTTP request failed");
        ProviderError::Transport {
            provider: provider.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Classify a non-2xx provider response and log it with full context.
pub fn classify_http_error(
    provider: &str,
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
) -> ProviderError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();

    let err = match status.as_u16() {
        429 => {
            if let Some(detail) = quota_violation(parsed.as_ref(), body) {
                ProviderError::QuotaExhausted {
                    provider: provider.to_string(),
                    detail,
                }
            } else {
                ProviderError::RateLimited {
                    provider: provider.to_string(),
                    retry_after: retry_after_header(headers)
                        .or_else(|| parsed.as_ref().and_then(gemini_retry_delay)),
                }
            }
        }
        401 | 403 => ProviderError::Unauthorized {
            provider: provider.to_string(),
            status: status.as_u16(),
        },
        code => ProviderError::Upstream {
            provider: provider.to_string(),
            status: code,
            body: mercabot_core::utils::truncate_string(body, 500),
        },
    };

    error!(
        provider,
        status = %status,
        body = %mercabot_core::utils::truncate_string(body, 500),
        kind = ?err,
        "API error"
    );
    err
}

/// Quota markers: OpenAI `insufficient_quota`, Gemini `RESOURCE_EXHAUSTED`
/// with `QuotaFailure` violations.
fn quota_violation(parsed: Option<&serde_json::Value>, body: &str) -> Option<String> {
    if body.contains("insufficient_quota") {
        return Some("insufficient_quota".to_string());
    }

    let error = parsed?.get("error")?;
    if error.get("status").and_then(|s| s.as_str()) != Some("RESOURCE_EXHAUSTED") {
        return None;
    }
    let details = error.get("details")?.as_array()?;
    let violations: Vec<String> = details
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| t.ends_with("QuotaFailure"))
        })
        .filter_map(|d| d.get("violations")?.as_array().cloned())
        .flatten()
        .map(|v| {
            v.get("quotaMetric")
                .or_else(|| v.get("quotaId"))
                .and_then(|m| m.as_str())
                .unwrap_or("quota")
                .to_string()
        })
        .collect();

    if violations.is_empty() {
        None
    } else {
        Some(violations.join(", "))
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Gemini reports `RetryInfo.retryDelay` as e.g. `"17s"` or `"1.5s"`.
fn gemini_retry_delay(parsed: &serde_json::Value) -> Option<Duration> {
    let details = parsed.get("error")?.get("details")?.as_array()?;
    details.iter().find_map(|d| {
        let is_retry = d
            .get("@type")
            .and_then(|t| t.as_str())
            .is_some_and(|t| t.ends_with("RetryInfo"));
        if !is_retry {
            return None;
        }
        let secs: f64 = d.get("retryDelay")?.as_str()?.trim_end_matches('s').parse().ok()?;
        Some(Duration::from_secs_f64(secs))
    })
}
