/// Errors raised by a transport link before they are folded into a
/// connection status change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed (refused, handshake rejected, bad status).
    #[error("connect error ({url}): {message}")]
    Connect { url: String, message: String },
    /// Reading from or writing to an open link failed.
    #[error("transport i/o error: {message}")]
    Io { message: String },
    /// The peer sent something the link could not interpret.
    #[error("transport protocol error: {message}")]
    Protocol { message: String },
    /// The operation is not available on this kind of link (for example
    /// sending on an event stream).
    #[error("unsupported transport operation: {0}")]
    Unsupported(String),
}

impl TransportError {
    /// Creates a connect-time error.
    pub fn connect(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates an i/o error on an open link.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Connect { message, .. } | Self::Io { message } | Self::Protocol { message } => {
                message
            }
            Self::Unsupported(message) => message,
        }
    }
}

/// Top-level error type for configuration and REST calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// The server answered with a non-success status.
    #[error("http error ({status}): {message}")]
    Http { status: u16, message: String },
    /// Authentication was rejected; the message is meant for the user.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The request never produced a response.
    #[error(transparent)]
    Transport(TransportError),
    /// A response or frame body could not be encoded/decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub(crate) fn http(status: reqwest::StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        let message = detail_from_body(&body).unwrap_or(body);
        Self::Http {
            status: status.as_u16(),
            message,
        }
    }

    /// Returns the HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(value: TransportError) -> Self {
        ClientError::Transport(value)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            return ClientError::Decode(value.to_string());
        }
        let url = value
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        ClientError::Transport(TransportError::connect(url, value.to_string()))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        ClientError::Decode(value.to_string())
    }
}

/// Extracts the `detail` member that the backend puts on every error body.
pub(crate) fn detail_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
