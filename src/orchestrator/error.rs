//! Pipeline failures and their display messages.

use crate::runtime::Rejection;
use serde_json::Value;

pub const UNKNOWN_ERROR: &str = "Unknown error occurred";

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("{tool} install failed with exit code {code}")]
    InstallFailed { tool: String, code: i32 },

    #[error("Sandbox runtime failed to boot: {0}")]
    Boot(String),
}

/// Display message for a failed activation, always prefixed with `"Error: "`.
///
/// Rejected runtime values are unpacked: error messages and strings are used
/// as is (a bare JSON string included), objects contribute their `message`
/// field. Anything else falls back to [`UNKNOWN_ERROR`].
pub fn error_message(err: &anyhow::Error) -> String {
    format!("Error: {}", raw_message(err))
}

fn raw_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<Rejection>() {
        Some(Rejection::Error { message }) => message.clone(),
        Some(Rejection::Text(text)) => text.clone(),
        Some(Rejection::Value(Value::String(text))) => text.clone(),
        Some(Rejection::Value(value)) => match value.get("message") {
            Some(Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => UNKNOWN_ERROR.to_string(),
        },
        None => err.to_string(),
    }
}
