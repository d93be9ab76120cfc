use regex::Regex;
use serde::{Deserialize, Serialize};

/// Structured failure details attached to capture results and worker
/// error history. One tagged representation is used in-process and on the
/// wire; only serde sits at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ErrorDetails {
    #[serde(rename_all = "camelCase")]
    Http {
        message: String,
        http_status_code: u16,
        #[serde(skip_serializing_if = "Option::is_none")]
        http_status_text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Timeout {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    Connection { message: String },
    Internal { message: String },
}

impl ErrorDetails {
    /// Non-2xx navigation response. When the transport did not supply a
    /// status text, the fixed fallback table fills it in.
    pub fn http(status_code: u16, status_text: Option<String>) -> Self {
        let status_text = status_text
            .filter(|text| !text.is_empty())
            .or_else(|| default_status_text(status_code).map(str::to_string));
        let message = match &status_text {
            Some(text) => format!("HTTP {} {}", status_code, text),
            None => format!("HTTP {}", status_code),
        };
        ErrorDetails::Http { message, http_status_code: status_code, http_status_text: status_text }
    }

    /// A wall-clock bound fired. The message embeds `Timeout ({ms}ms)` so
    /// it classifies back to the same variant through `from_failure`.
    pub fn timeout(timeout_ms: u64, operation: &str) -> Self {
        ErrorDetails::Timeout {
            message: format!("Timeout ({}ms) exceeded during {}", timeout_ms, operation),
            timeout_ms: Some(timeout_ms),
        }
    }

    /// The browser session dropped or the page/browser was closed mid-operation.
    pub fn connection(reason: &str) -> Self {
        ErrorDetails::Connection { message: reason.to_string() }
    }

    /// Any other failure.
    pub fn internal(message: &str) -> Self {
        ErrorDetails::Internal { message: message.to_string() }
    }

    /// Classify a raw failure by its message. Timeouts are recognized by the
    /// `Timeout` substring (with the original bound recovered from a
    /// `({n}ms)` fragment when present); dropped sessions by the
    /// `disconnect`/`closed` substrings the CDP library surfaces.
    pub fn from_failure(error: &anyhow::Error) -> Self {
        let message = format!("{:#}", error);
        if message.contains("Timeout") {
            return ErrorDetails::Timeout {
                timeout_ms: extract_timeout_ms(&message),
                message,
            };
        }
        if indicates_session_loss(&message) {
            return ErrorDetails::Connection { message };
        }
        ErrorDetails::Internal { message }
    }

    pub fn message(&self) -> &str {
        match self {
            ErrorDetails::Http { message, .. }
            | ErrorDetails::Timeout { message, .. }
            | ErrorDetails::Connection { message }
            | ErrorDetails::Internal { message } => message,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ErrorDetails::Timeout { .. })
    }
}

/// Substring rule for detecting a dropped session. The CDP library reports
/// these conditions as plain error text, so message matching is the
/// contract of last resort.
pub fn indicates_session_loss(message: &str) -> bool {
    message.contains("disconnect") || message.contains("closed")
}

fn extract_timeout_ms(message: &str) -> Option<u64> {
    let pattern = Regex::new(r"\((\d+)ms\)").ok()?;
    pattern
        .captures(message)
        .and_then(|captures| captures.get(1))
        .and_then(|group| group.as_str().parse().ok())
}

/// Status text for common HTTP codes, used when the navigation response
/// carried none. Unknown codes get no text.
pub fn default_status_text(status_code: u16) -> Option<&'static str> {
    match status_code {
        300 => Some("Multiple Choices"),
        301 => Some("Moved Permanently"),
        302 => Some("Found"),
        303 => Some("See Other"),
        304 => Some("Not Modified"),
        307 => Some("Temporary Redirect"),
        308 => Some("Permanent Redirect"),
        400 => Some("Bad Request"),
        401 => Some("Unauthorized"),
        403 => Some("Forbidden"),
        404 => Some("Not Found"),
        405 => Some("Method Not Allowed"),
        408 => Some("Request Timeout"),
        429 => Some("Too Many Requests"),
        500 => Some("Internal Server Error"),
        502 => Some("Bad Gateway"),
        503 => Some("Service Unavailable"),
        504 => Some("Gateway Timeout"),
        _ => None,
    }
}
