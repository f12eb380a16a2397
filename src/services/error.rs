use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    NotFound,
    Unauthorized,
    InvalidCredentials,
    Network,
    Timeout,
    Provider,
    Io,
    Internal,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendErrorKind::NotFound => "object not found",
            BackendErrorKind::Unauthorized => "authentication failed",
            BackendErrorKind::InvalidCredentials => "invalid credentials",
            BackendErrorKind::Network => "network error",
            BackendErrorKind::Timeout => "timeout",
            BackendErrorKind::Provider => "storage provider error",
            BackendErrorKind::Io => "i/o error",
            BackendErrorKind::Internal => "internal error",
        };
        f.write_str(label)
    }
}

/// Fault reported by a physical backend, before any retry or failover
/// decision has been made.
#[derive(Debug, Clone, Error)]
#[error("{provider} {kind}: {message}")]
pub struct BackendError {
    pub provider: String,
    pub kind: BackendErrorKind,
    pub status: Option<u16>,
    pub code: Option<String>,
    pub message: String,
}

impl BackendError {
    pub fn new(provider: impl Into<String>, kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            kind,
            status: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn not_found(provider: impl Into<String>, locator: impl Into<String>) -> Self {
        Self::new(provider, BackendErrorKind::NotFound, locator)
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, BackendErrorKind::Network, message)
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, BackendErrorKind::Timeout, message)
    }

    pub fn provider_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(provider, BackendErrorKind::Provider, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == BackendErrorKind::NotFound
    }

    /// Explicit verdict for kinds that are unambiguous; `None` leaves the
    /// decision to status, code and message classification.
    pub fn retryable_hint(&self) -> Option<bool> {
        match self.kind {
            BackendErrorKind::NotFound
            | BackendErrorKind::Unauthorized
            | BackendErrorKind::InvalidCredentials => Some(false),
            BackendErrorKind::Network | BackendErrorKind::Timeout => Some(true),
            BackendErrorKind::Provider | BackendErrorKind::Io | BackendErrorKind::Internal => None,
        }
    }

    pub fn from_reqwest(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            BackendError::timeout(provider, format!("request timeout: {}", error))
        } else if error.is_connect() {
            BackendError::network(provider, format!("connection failed: {}", error))
        } else if let Some(status) = error.status() {
            let kind = match status.as_u16() {
                404 => BackendErrorKind::NotFound,
                401 | 403 => BackendErrorKind::Unauthorized,
                _ => BackendErrorKind::Provider,
            };
            BackendError::new(provider, kind, error.to_string()).with_status(status.as_u16())
        } else {
            BackendError::new(provider, BackendErrorKind::Internal, error.to_string())
        }
    }

    pub fn from_io(provider: &str, error: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match error.kind() {
            ErrorKind::NotFound => BackendErrorKind::NotFound,
            ErrorKind::PermissionDenied => BackendErrorKind::Unauthorized,
            ErrorKind::TimedOut => BackendErrorKind::Timeout,
            ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe => BackendErrorKind::Network,
            ErrorKind::Interrupted | ErrorKind::WouldBlock => BackendErrorKind::Network,
            _ => BackendErrorKind::Io,
        };
        BackendError::new(provider, kind, error.to_string())
    }
}
