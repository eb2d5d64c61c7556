//! Error types for the pod networking admission webhook
//!
//! Errors carry enough context (profile name, operation) to be useful in
//! admission logs. Absence of a resource is never an error here: store
//! lookups return `Option` for that case.

use std::time::Duration;

use thiserror::Error;

/// Main error type for admission mutation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A label selector uses an operator or shape that cannot be evaluated
    #[error("invalid selector on {profile}: {message}")]
    InvalidSelector {
        /// Name of the NetworkProfile carrying the selector
        profile: String,
        /// Description of what's invalid
        message: String,
    },

    /// The admission request was cancelled while a read was in flight
    #[error("cancelled during {operation}")]
    Cancelled {
        /// The read that was interrupted (e.g., "list_network_profiles")
        operation: String,
    },

    /// The admission deadline elapsed while a read was in flight
    #[error("deadline of {timeout:?} exceeded during {operation}")]
    DeadlineExceeded {
        /// The read that was interrupted
        operation: String,
        /// The admission timeout that was in force
        timeout: Duration,
    },

    /// The pod's network request is inconsistent with cluster state
    #[error("validation error: {message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Startup configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },
}

impl Error {
    /// Create an invalid selector error for the named profile
    pub fn invalid_selector(profile: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidSelector {
            profile: profile.into(),
            message: msg.into(),
        }
    }

    /// Create a cancellation error for the given read operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a deadline error for the given read operation
    pub fn deadline_exceeded(operation: impl Into<String>, timeout: Duration) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
            timeout,
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Nothing is retried inside the webhook; this only informs the log
    /// level and the outcome label recorded for the admission.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::Cancelled { .. } | Error::DeadlineExceeded { .. } => true,
            Error::InvalidSelector { .. }
            | Error::Validation { .. }
            | Error::Serialization { .. }
            | Error::Config { .. } => false,
        }
    }

    /// Short, stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::InvalidSelector { .. } => "invalid_selector",
            Error::Cancelled { .. } => "cancelled",
            Error::DeadlineExceeded { .. } => "deadline_exceeded",
            Error::Validation { .. } => "validation",
            Error::Serialization { .. } => "serialization",
            Error::Config { .. } => "config",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
