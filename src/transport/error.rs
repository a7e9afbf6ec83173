use serde::Deserialize;
use thiserror::Error;

/// Error returned by a GCP REST API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("googleapi: Error {}: {}{}", .code, .message, format_reasons(.reasons))]
pub struct ApiError {
    /// HTTP status code
    pub code: u16,
    pub message: String,
    /// Canonical status, e.g. `NOT_FOUND`
    pub status: Option<String>,
    /// Reason codes reported in `error.errors[].reason`
    pub reasons: Vec<String>,
    /// Raw response body
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    status: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: String,
}

impl ApiError {
    /// Decode the error envelope of a failed response
    ///
    /// Bodies that are not a JSON error envelope are kept verbatim as the message.
    pub fn from_body(code: u16, body: String) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => Self {
                code,
                message: envelope.error.message,
                status: envelope.error.status,
                reasons: envelope
                    .error
                    .errors
                    .into_iter()
                    .map(|e| e.reason)
                    .filter(|r| !r.is_empty())
                    .collect(),
                body,
            },
            Err(_) => Self {
                code,
                message: body.trim().to_owned(),
                status: None,
                reasons: Vec::new(),
                body,
            },
        }
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.reasons.iter().any(|r| r == reason)
    }
}

fn format_reasons(reasons: &[String]) -> String {
    if reasons.is_empty() {
        String::new()
    } else {
        format!(", {}", reasons.join(", "))
    }
}

/// Find the API error in an error chain
pub fn api_error(err: &anyhow::Error) -> Option<&ApiError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ApiError>())
}

pub fn has_status(err: &anyhow::Error, code: u16) -> bool {
    api_error(err).is_some_and(|e| e.code == code)
}

pub fn is_not_found(err: &anyhow::Error) -> bool {
    has_status(err, 404)
}

pub fn is_conflict(err: &anyhow::Error) -> bool {
    has_status(err, 409)
}

pub fn is_too_many_requests(err: &anyhow::Error) -> bool {
    has_status(err, 429)
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn decode_envelope() {
        let body = r#"{"error":{"code":404,"message":"Cluster not found","status":"NOT_FOUND","errors":[{"reason":"notFound"}]}}"#;
        let err = ApiError::from_body(404, body.to_owned());
        assert_eq!(err.message, "Cluster not found");
        assert_eq!(err.status.as_deref(), Some("NOT_FOUND"));
        assert!(err.has_reason("notFound"));
        assert_eq!(
            err.to_string(),
            "googleapi: Error 404: Cluster not found, notFound"
        );
    }

    #[test]
    fn plain_body() {
        let err = ApiError::from_body(502, "Bad Gateway\n".to_owned());
        assert_eq!(err.message, "Bad Gateway");
        assert_eq!(err.to_string(), "googleapi: Error 502: Bad Gateway");
    }

    #[test]
    fn found_through_context() {
        let err = Err::<(), _>(ApiError::from_body(404, String::new()))
            .context("reading cluster")
            .unwrap_err();
        assert!(is_not_found(&err));
        assert!(!is_conflict(&err));
    }
}
