// Error taxonomy for the client core and the single normalization funnel
// that every dispatch-time failure goes through

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// Message the backend uses when it has nothing better to say
pub const UNHANDLED_ERROR_SENTINEL: &str = "UNHANDLED_ERROR";
pub const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

// Raw transport response kept alongside a normalized error
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawResponse {
    pub status: Option<u16>,
    pub data: Option<Value>,
}

impl RawResponse {
    pub fn new(status: Option<u16>, data: Option<Value>) -> Self {
        Self { status, data }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {response:?}")]
    Status { response: RawResponse },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unexpected response payload: {message}")]
    Decode {
        message: String,
        response: RawResponse,
    },

    #[error("No mocked response configured for simulated request")]
    MissingMock,
}

impl TransportError {
    pub fn status(status: u16, data: Value) -> Self {
        TransportError::Status {
            response: RawResponse::new(Some(status), Some(data)),
        }
    }

    pub fn response(&self) -> Option<&RawResponse> {
        match self {
            TransportError::Status { response } | TransportError::Decode { response, .. } => {
                Some(response)
            }
            _ => None,
        }
    }
}

// The uniform error returned by the dispatcher. `message` is never empty and
// never the unhandled sentinel.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct NormalizedError {
    pub message: String,
    pub original_response: Option<RawResponse>,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment service unavailable: {0}")]
    Unavailable(String),

    #[error("Payment can only be made on the payment step")]
    NotOnPaymentStep,

    #[error("Booking was reset before the payment completed")]
    Superseded,
}

// Collapses a transport failure into a `NormalizedError`.
//
// The message is taken from the response body's `error.code` or
// `error.description` (code first when `error_code_first` is set, otherwise
// description first, each falling back to the other). A missing message or
// the unhandled sentinel is replaced by `FALLBACK_ERROR_MESSAGE`. A
// non-empty `custom_message` always wins.
pub fn normalize_error(
    error: &TransportError,
    custom_message: Option<&str>,
    error_code_first: bool,
) -> NormalizedError {
    let original_response = error.response().cloned();
    let extracted = original_response
        .as_ref()
        .and_then(|response| extract_message(response, error_code_first));

    let computed = match extracted {
        Some(message) if message != UNHANDLED_ERROR_SENTINEL => message,
        _ => FALLBACK_ERROR_MESSAGE.to_string(),
    };

    let message = match custom_message {
        Some(custom) if !custom.is_empty() => custom.to_string(),
        _ => computed,
    };

    tracing::debug!(%error, %message, "normalized dispatch error");

    NormalizedError {
        message,
        original_response,
    }
}

fn extract_message(response: &RawResponse, error_code_first: bool) -> Option<String> {
    let error = response.data.as_ref()?.get("error")?;
    let code = non_empty_text(error.get("code"));
    let description = non_empty_text(error.get("description"));

    if error_code_first {
        code.or(description)
    } else {
        description.or(code)
    }
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
