//! Protocol engine error types.

use mobdbg_stack::DecodeError;
use thiserror::Error;

/// Errors from the connection server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The server was disposed and cannot be restarted.
    #[error("connection server disposed")]
    Disposed,

    /// A body read was requested while another one is still pending.
    #[error("a body read is already pending")]
    BodyAlreadyRequested,
}

/// Errors surfaced to callers awaiting a command reply.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The request was dropped before a reply arrived (dispatcher disposed).
    #[error("request cancelled")]
    Cancelled,

    /// The debuggee, or the dispatcher on its behalf, answered with an error.
    #[error("remote error: {message}")]
    Remote {
        message: String,
        details: Option<String>,
    },

    /// A reply body could not be decoded.
    #[error("undecodable reply: {0}")]
    Decode(#[from] DecodeError),

    /// Connection server failure.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// A session transition was not allowed in the current state.
    #[error("invalid session transition: {0}")]
    InvalidState(String),
}

impl ProtocolError {
    /// Whether this is the synthetic timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Remote { message, .. } if message == "Timeout")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_bind_display() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:8172".into(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use"),
        };
        assert_eq!(
            err.to_string(),
            "failed to bind 127.0.0.1:8172: address in use"
        );
    }

    #[test]
    fn error_disposed_display() {
        assert_eq!(ServerError::Disposed.to_string(), "connection server disposed");
    }

    #[test]
    fn error_remote_display() {
        let err = ProtocolError::Remote {
            message: "Timeout".into(),
            details: Some("STACK timed out after 10000ms".into()),
        };
        assert_eq!(err.to_string(), "remote error: Timeout");
        assert!(err.is_timeout());
    }

    #[test]
    fn error_server_is_transparent() {
        let err = ProtocolError::from(ServerError::BodyAlreadyRequested);
        assert_eq!(err.to_string(), "a body read is already pending");
        assert!(!err.is_timeout());
    }

    #[test]
    fn error_cancelled_display() {
        assert_eq!(ProtocolError::Cancelled.to_string(), "request cancelled");
    }
}
