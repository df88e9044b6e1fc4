use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

// ── Request / Result ───────────────────────────────────

/// What the model returns for one photo. Replaced wholesale on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentificationResult {
    pub medicine_name: String,
    pub uses: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    /// `data:<mime>;base64,<data>`
    pub photo_data_uri: String,
    pub language: String,
}

// ── Error Types ────────────────────────────────────────

/// Machine-readable failure class, named after the status codes hosted
/// model APIs report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorReason {
    DeadlineExceeded,
    InvalidArgument,
    Unauthenticated,
    ResourceExhausted,
    Unavailable,
    MalformedResponse,
    Other,
}

impl ErrorReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ErrorReason::InvalidArgument => "INVALID_ARGUMENT",
            ErrorReason::Unauthenticated => "UNAUTHENTICATED",
            ErrorReason::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorReason::Unavailable => "UNAVAILABLE",
            ErrorReason::MalformedResponse => "MALFORMED_RESPONSE",
            ErrorReason::Other => "UNKNOWN",
        }
    }

    /// Map a Google-style `error.status` string.
    pub fn from_status_str(status: &str) -> Self {
        match status {
            "DEADLINE_EXCEEDED" => ErrorReason::DeadlineExceeded,
            "INVALID_ARGUMENT" | "FAILED_PRECONDITION" | "OUT_OF_RANGE" => {
                ErrorReason::InvalidArgument
            }
            "UNAUTHENTICATED" | "PERMISSION_DENIED" => ErrorReason::Unauthenticated,
            "RESOURCE_EXHAUSTED" => ErrorReason::ResourceExhausted,
            "UNAVAILABLE" | "INTERNAL" => ErrorReason::Unavailable,
            _ => ErrorReason::Other,
        }
    }

    /// Fallback classification when the body carries no status string.
    pub fn from_http_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            400 | 413 | 415 | 422 => ErrorReason::InvalidArgument,
            401 | 403 => ErrorReason::Unauthenticated,
            408 | 504 => ErrorReason::DeadlineExceeded,
            429 => ErrorReason::ResourceExhausted,
            s if s >= 500 => ErrorReason::Unavailable,
            _ => ErrorReason::Other,
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyError {
    pub reason: ErrorReason,
    pub message: String,
}

impl IdentifyError {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::DeadlineExceeded, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::InvalidArgument, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::MalformedResponse, message)
    }

    /// Message suitable for showing to the person who uploaded the photo.
    pub fn friendly_message(&self) -> String {
        match self.reason {
            ErrorReason::DeadlineExceeded => "The request timed out. Please try again. If the issue persists, the image might be too complex or the server is busy.".to_string(),
            ErrorReason::InvalidArgument => "There was an issue with the uploaded image or selected language. Please check your input and try again.".to_string(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for IdentifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

impl std::error::Error for IdentifyError {}

impl From<IdentifyError> for String {
    fn from(e: IdentifyError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for IdentifyError {
    fn from(e: reqwest::Error) -> Self {
        // The message ends up in user notices; drop the request URL.
        let e = e.without_url();
        if e.is_timeout() {
            IdentifyError::deadline(format!("Network timeout: {}", e))
        } else if e.is_decode() {
            IdentifyError::malformed(format!("Response decode failed: {}", e))
        } else {
            IdentifyError::new(ErrorReason::Unavailable, format!("Network error: {}", e))
        }
    }
}

// ── Provider Trait ──────────────────────────────────────

#[async_trait]
pub trait MedicineIdentifier: Send + Sync {
    /// Provider identifier, e.g. "gemini"
    fn id(&self) -> String;

    async fn identify(&self, request: IdentifyRequest) -> Result<IdentificationResult, IdentifyError>;
}

/// Parse the model's JSON answer. Tolerates a Markdown code fence around it.
pub fn parse_result_json(text: &str) -> Result<IdentificationResult, IdentifyError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    serde_json::from_str::<IdentificationResult>(body)
        .map_err(|e| IdentifyError::malformed(format!("Model output is not a valid result: {}", e)))
}
