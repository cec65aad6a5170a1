//! Error types for the otp-watch crate.
//!
//! Each layer has its own error type so callers can tell what failed:
//!
//! - [`ConnError`]: opening a session (network, TLS, login)
//! - [`TransportError`]: a single command round trip
//! - [`MailboxError`]: a mailbox operation (transport failure or unexpected response)
//! - [`DeliveryError`]: handing a token to the clipboard/notifier collaborators
//! - [`Error`]: configuration errors plus wrappers around the above
//!
//! Extraction problems (old mail, malformed bodies, no code) are not errors;
//! they surface as `None`. See [`Error::is_retryable`] and [`ErrorCategory`].

use std::time::Duration;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while opening an IMAP session.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnError {
    /// Host name is not usable as a TLS server name.
    #[error("invalid DNS name for host '{host}'")]
    InvalidDnsName {
        /// The invalid hostname.
        host: String,
        /// The underlying DNS name error.
        #[source]
        source: rustls::client::InvalidDnsNameError,
    },

    /// Failed to establish the TCP connection.
    #[error("failed to connect to {target}")]
    Network {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake failed.
    #[error("failed to establish TLS connection to {target}")]
    Tls {
        /// The target address that failed.
        target: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// LOGIN was rejected or its exchange could not be understood.
    #[error("IMAP login failed for {username}: {message}")]
    Auth {
        /// The username used for login.
        username: String,
        /// Server response or local reason.
        message: String,
    },

    /// Connect or authentication step did not finish in time.
    #[error("{stage} timeout for {target} after {timeout:?}")]
    Timeout {
        /// Which step timed out (`connect` or `auth`).
        stage: &'static str,
        /// The target address.
        target: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },
}

impl ConnError {
    /// Returns `true` if waiting and reopening can succeed.
    ///
    /// Every open failure is retryable for an unattended daemon except a host
    /// name that can never be a valid TLS server name.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ConnError::InvalidDnsName { .. })
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConnError::InvalidDnsName { .. } => ErrorCategory::Configuration,
            ConnError::Network { .. } | ConnError::Tls { .. } => ErrorCategory::Network,
            ConnError::Auth { .. } => ErrorCategory::Auth,
            ConnError::Timeout { .. } => ErrorCategory::Timeout,
        }
    }
}

/// Errors raised by a single command round trip.
///
/// Any of these leaves the session faulted; the caller decides whether to reconnect.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// No complete response within the command timeout.
    #[error("command '{command}' timed out after {timeout:?}")]
    Timeout {
        /// The command verb (arguments omitted).
        command: String,
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The server closed the connection or it was reset.
    #[error("connection reset during '{command}'")]
    ConnectionReset {
        /// The command verb (arguments omitted).
        command: String,
        /// The underlying I/O error, if any (clean EOF has none).
        #[source]
        source: Option<std::io::Error>,
    },

    /// I/O failure or a response the IMAP client could not parse.
    #[error("protocol I/O error during '{command}': {message}")]
    ProtocolIo {
        /// The command verb (arguments omitted).
        command: String,
        /// What went wrong.
        message: String,
        /// The underlying I/O error, if any.
        #[source]
        source: Option<std::io::Error>,
    },

    /// A command was issued while the session was not ready.
    #[error("session not connected (state: {state})")]
    NotConnected {
        /// The state the session was in.
        state: crate::transport::SessionState,
    },
}

impl TransportError {
    /// Transport failures are never retried in place; they are retryable after reconnecting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            TransportError::Timeout { .. } => ErrorCategory::Timeout,
            TransportError::ConnectionReset { .. } | TransportError::NotConnected { .. } => {
                ErrorCategory::Network
            }
            TransportError::ProtocolIo { .. } => ErrorCategory::Protocol,
        }
    }
}

/// Errors raised by mailbox operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MailboxError {
    /// The command could not complete its round trip.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered, but not in the expected shape.
    #[error("unexpected response to '{command}': {message}")]
    Protocol {
        /// The command verb (arguments omitted).
        command: String,
        /// Description of the unexpected shape.
        message: String,
    },
}

impl MailboxError {
    pub(crate) fn protocol(command: impl Into<String>, message: impl Into<String>) -> Self {
        MailboxError::Protocol {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Mailbox errors abort the cycle; the next cycle retries from scratch.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        true
    }

    /// Returns the error category for logging.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            MailboxError::Transport(inner) => inner.category(),
            MailboxError::Protocol { .. } => ErrorCategory::Protocol,
        }
    }
}

/// Errors raised by the clipboard and notification collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DeliveryError {
    /// Clipboard could not be read or written.
    #[error("clipboard unavailable: {message}")]
    Clipboard {
        /// Description of the failure.
        message: String,
    },

    /// Notification could not be shown.
    #[error("notification failed: {message}")]
    Notify {
        /// Description of the failure.
        message: String,
    },
}

impl DeliveryError {
    /// Clipboard contention is usually momentary; notification failures are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryError::Clipboard { .. })
    }

    /// Always [`ErrorCategory::Delivery`].
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Delivery
    }
}

/// Crate-level error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration / validation errors (NOT retryable)
    // ─────────────────────────────────────────────────────────────────────────
    /// Invalid email address format.
    #[error("invalid email format: {email}")]
    InvalidEmailFormat {
        /// The invalid email address.
        email: String,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid matcher pattern.
    #[error("invalid matcher pattern")]
    InvalidPattern {
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Runtime errors (RETRYABLE, except where noted)
    // ─────────────────────────────────────────────────────────────────────────
    /// Opening a session failed.
    #[error(transparent)]
    Connect(#[from] ConnError),

    /// A command round trip failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A mailbox operation failed.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// Token delivery failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

impl Error {
    /// Returns `true` if this error represents a transient failure that might succeed on retry.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connect(e) => e.is_retryable(),
            Error::Delivery(e) => e.is_retryable(),
            Error::Transport(_) | Error::Mailbox(_) => true,
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidPattern { .. } => false,
        }
    }

    /// Returns the error category for metrics/logging purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidEmailFormat { .. }
            | Error::InvalidConfig { .. }
            | Error::InvalidPattern { .. } => ErrorCategory::Configuration,
            Error::Connect(e) => e.category(),
            Error::Transport(e) => e.category(),
            Error::Mailbox(e) => e.category(),
            Error::Delivery(e) => e.category(),
        }
    }
}

/// Error categories for metrics and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Configuration or validation errors.
    Configuration,
    /// Credentials rejected.
    Auth,
    /// Network connectivity errors.
    Network,
    /// Timeout errors.
    Timeout,
    /// IMAP protocol errors.
    Protocol,
    /// Clipboard or notification errors.
    Delivery,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Timeout => write!(f, "timeout"),
            ErrorCategory::Protocol => write!(f, "protocol"),
            ErrorCategory::Delivery => write!(f, "delivery"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SessionState;

    #[test]
    fn test_retryable_classification() {
        let err = Error::InvalidEmailFormat {
            email: "bad".into(),
        };
        assert!(!err.is_retryable());

        let err: Error = ConnError::Network {
            target: "imap.example.com:993".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        }
        .into();
        assert!(err.is_retryable());

        let err: Error = MailboxError::protocol("SELECT", "NO").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_conn_error_categories() {
        let err = ConnError::Auth {
            username: "user".into(),
            message: "NO [AUTHENTICATIONFAILED]".into(),
        };
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert!(err.is_retryable());

        let err = ConnError::Timeout {
            stage: "connect",
            target: "imap.example.com:993".into(),
            timeout: Duration::from_secs(10),
        };
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    #[test]
    fn test_mailbox_error_inherits_transport_category() {
        let err = MailboxError::from(TransportError::Timeout {
            command: "UID FETCH".into(),
            timeout: Duration::from_secs(30),
        });
        assert_eq!(err.category(), ErrorCategory::Timeout);

        let err = MailboxError::from(TransportError::NotConnected {
            state: SessionState::Faulted,
        });
        assert_eq!(err.category(), ErrorCategory::Network);
        assert_eq!(err.to_string(), "session not connected (state: faulted)");
    }

    #[test]
    fn test_delivery_error_classification() {
        let err = DeliveryError::Clipboard {
            message: "clipboard owned by another process".into(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Delivery);

        let err: Error = DeliveryError::Notify {
            message: "no notification daemon".into(),
        }
        .into();
        assert!(!err.is_retryable());
        assert_eq!(err.category(), ErrorCategory::Delivery);
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Protocol.to_string(), "protocol");
        assert_eq!(ErrorCategory::Delivery.to_string(), "delivery");
    }
}
