//! Error types for the configuration and task clients

use thiserror::Error;
use tonic::Code;

/// Main error type for client operations
///
/// Each variant is a distinct failure category callers can match on:
/// channel setup, bootstrap data, caller input, connection state, remote call
/// failures and logical signing rejections.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Transport channel could not be established
    #[error("connection error: {message}")]
    Connection {
        /// What was being connected to and why it failed
        message: String,
        /// Transport error or interruption behind the failure, when there is one
        #[source]
        source: Option<ConnectionCause>,
    },

    /// Identity or peer data missing or unobtainable from the configuration service
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the missing data
        message: String,
        /// Status of the remote call that failed, when one did
        #[source]
        source: Option<Box<tonic::Status>>,
    },

    /// Caller supplied an argument that cannot be sent
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation requires a live connection
    #[error("not connected")]
    NotConnected,

    /// Remote call failed (after retries, for retryable statuses)
    #[error("transport error during {operation}: {:?}: {}", .status.code(), .status.message())]
    Transport {
        /// Remote operation that failed
        operation: String,
        /// Final status returned by the transport
        #[source]
        status: Box<tonic::Status>,
    },

    /// Remote call succeeded but the service rejected the signing request
    #[error("signing error: {0}")]
    Signing(String),
}

/// Underlying cause of an [`Error::Connection`]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectionCause {
    /// Dialing the endpoint failed
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    /// Caller's context was cancelled or its deadline passed while dialing
    #[error(transparent)]
    Interrupted(Box<tonic::Status>),
}

impl Error {
    /// Create a connection error without an underlying transport error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping a transport error
    pub fn connection_with(msg: impl Into<String>, source: tonic::transport::Error) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(ConnectionCause::Transport(source)),
        }
    }

    /// Create a connection error for a dial cut short by the caller's context
    pub fn connection_interrupted(msg: impl Into<String>, status: tonic::Status) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(ConnectionCause::Interrupted(Box::new(status))),
        }
    }

    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a configuration error caused by a failed remote call
    pub fn configuration_with(msg: impl Into<String>, status: tonic::Status) -> Self {
        Self::Configuration {
            message: msg.into(),
            source: Some(Box::new(status)),
        }
    }

    /// Create an invalid argument error with the given message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a transport error for the named operation
    pub fn transport(operation: impl Into<String>, status: tonic::Status) -> Self {
        Self::Transport {
            operation: operation.into(),
            status: Box::new(status),
        }
    }

    /// Create a signing error carrying the service-supplied message
    pub fn signing(msg: impl Into<String>) -> Self {
        Self::Signing(msg.into())
    }

    /// Status code of the remote call behind this error, if any
    pub fn status_code(&self) -> Option<Code> {
        match self {
            Self::Transport { status, .. } => Some(status.code()),
            Self::Configuration {
                source: Some(status),
                ..
            } => Some(status.code()),
            Self::Connection {
                source: Some(ConnectionCause::Interrupted(status)),
                ..
            } => Some(status.code()),
            _ => None,
        }
    }

    /// Whether this error came from cancelling the caller's context
    pub fn is_cancelled(&self) -> bool {
        self.status_code() == Some(Code::Cancelled)
    }
}

impl From<crate::mtls::MtlsError> for Error {
    fn from(err: crate::mtls::MtlsError) -> Self {
        Self::connection(format!("invalid TLS material: {}", err))
    }
}
