//! Error types for the tiller-session crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving a browser debugging connection.
///
/// Every variant carries a stable kind tag (see [`SessionError::kind`]);
/// retryability is a property of the kind, not of any internal state, so
/// callers never need to inspect a variant's payload to decide whether to
/// retry.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The connection configuration is invalid. Never retried.
    #[error("invalid connection config: {detail}")]
    Configuration { detail: String },

    /// Failed to establish a connection to the debugging endpoint.
    #[error("failed to dial {url}: {reason}")]
    Dial { url: String, reason: String },

    /// The socket dropped while commands were in flight.
    #[error("connection to the browser was lost")]
    ConnectionLost,

    /// Reconnection attempts were exhausted; the session is closed.
    #[error("connection retries exhausted after {attempts} attempts")]
    ConnectionExhausted { attempts: u32 },

    /// A command did not receive its response before the deadline.
    #[error("command '{method}' timed out after {duration:?}")]
    CommandTimeout { method: String, duration: Duration },

    /// The browser answered a command with a protocol error frame.
    #[error("command failed with code {code}: {message}")]
    CommandFailed { code: i64, message: String },

    /// A malformed frame, serialization failure, or unexpected payload shape.
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// A command was issued while no target is attached.
    #[error("session is not attached to a target")]
    NotAttached,

    /// No debugging target matched the attach selector.
    #[error("no target matched selector '{selector}'")]
    TargetNotFound { selector: String },

    /// The session has been closed and accepts no further commands.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Configuration { .. } => "configuration",
            SessionError::Dial { .. } => "dial",
            SessionError::ConnectionLost => "connection_lost",
            SessionError::ConnectionExhausted { .. } => "connection_exhausted",
            SessionError::CommandTimeout { .. } => "command_timeout",
            SessionError::CommandFailed { .. } => "command_failed",
            SessionError::Protocol { .. } => "protocol",
            SessionError::NotAttached => "not_attached",
            SessionError::TargetNotFound { .. } => "target_not_found",
            SessionError::Closed => "closed",
        }
    }

    /// Whether an operation failing with this error may be retried.
    ///
    /// Transport-level failures are retryable up to the configured bound;
    /// configuration and command-level failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Dial { .. } | SessionError::ConnectionLost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags_are_stable() {
        let err = SessionError::Configuration {
            detail: "bad port".into(),
        };
        assert_eq!(err.kind(), "configuration");

        let err = SessionError::CommandTimeout {
            method: "Page.navigate".into(),
            duration: Duration::from_secs(5),
        };
        assert_eq!(err.kind(), "command_timeout");

        assert_eq!(SessionError::ConnectionLost.kind(), "connection_lost");
        assert_eq!(
            SessionError::ConnectionExhausted { attempts: 3 }.kind(),
            "connection_exhausted"
        );
    }

    #[test]
    fn test_retryability_by_kind() {
        assert!(SessionError::ConnectionLost.is_retryable());
        assert!(SessionError::Dial {
            url: "ws://x".into(),
            reason: "refused".into()
        }
        .is_retryable());

        assert!(!SessionError::Configuration {
            detail: "x".into()
        }
        .is_retryable());
        assert!(!SessionError::CommandTimeout {
            method: "m".into(),
            duration: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!SessionError::Closed.is_retryable());
    }

    #[test]
    fn test_display_messages() {
        let err = SessionError::CommandFailed {
            code: -32601,
            message: "Method not found".into(),
        };
        assert!(err.to_string().contains("-32601"));
        assert!(err.to_string().contains("Method not found"));
    }
}
