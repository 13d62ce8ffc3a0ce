use std::fmt;

use serde_json::Value;

/// Why the caller must re-authenticate before retrying.
///
/// The transport returns this as a classification instead of performing a
/// redirect itself; the calling layer decides how to navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ReauthReason {
    /// Sign-in is required.
    Login,
    /// The instance has not been set up yet (wire code `not_setup`).
    Setup,
}

impl fmt::Display for ReauthReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => f.write_str("login"),
            Self::Setup => f.write_str("setup"),
        }
    }
}

/// Errors returned by the non-streaming transport primitive.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RequestError {
    /// The fixed-duration timeout elapsed before the network call settled.
    #[error("request timeout")]
    Timeout,
    /// Non-2xx/3xx response; the body is parsed best-effort.
    #[error("http error {status}")]
    Http { status: u16, body: Value },
    /// The caller must re-authenticate; no result is available.
    #[error("reauthentication required: {reason}")]
    RequiresReauth { reason: ReauthReason },
    /// Network or body-decode failure.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Invalid client construction or configuration.
    #[error("config error: {0}")]
    Config(String),
}

impl RequestError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an HTTP status error with its parsed body.
    pub fn http(status: u16, body: Value) -> Self {
        Self::Http { status, body }
    }

    /// Returns the HTTP status for `Http` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Terminal outcome of a failed streaming session, delivered through
/// [`ChatEvent::Failed`](crate::ChatEvent::Failed).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum StreamFailure {
    /// Non-2xx/3xx status before the decode phase began.
    #[error("http error {status}: {message}")]
    Http { status: u16, message: String },
    /// Application error embedded inside a transport-successful stream.
    #[error("stream error: {message}")]
    Embedded {
        message: String,
        code: Option<String>,
    },
    /// Network read failed mid-stream.
    #[error("transport failure: {message}")]
    Transport { message: String },
    /// Event processing failed in a way the decoder could not recover from.
    #[error("decode failure: {message}")]
    Decode { message: String },
    /// The session was cancelled through its abort handle.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamFailure {
    /// Creates an HTTP status failure.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates an embedded stream failure.
    pub fn embedded(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Embedded {
            message: message.into(),
            code,
        }
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a decode failure.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// True for caller-initiated cancellation. Cancellations reach the error
    /// channel but are never forwarded to the notification sink.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The message shown to the user when this failure is notified.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. }
            | Self::Embedded { message, .. }
            | Self::Transport { message }
            | Self::Decode { message } => message.clone(),
            Self::Cancelled => self.to_string(),
        }
    }
}
