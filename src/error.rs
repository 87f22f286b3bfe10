//! Error types for client operations.
//!
//! This module provides the [`Error`] taxonomy shared by the whole crate.
//! The save-specific wrapper reporting how far a multi-aspect save got
//! lives with the save protocol in [`crate::object`].

use crate::transport::TransportError;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during client operations.
///
/// Validation variants (`UnknownAttribute`, `Validation`, `TypeMismatch`,
/// `ConstraintViolation`, `NotSupported`, `InvalidArgument`) are raised
/// synchronously at the point of local mutation, before any remote call.
/// `Protocol` and `Transport` report failures of a remote round trip.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A property key that is not defined by the object's type.
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// A value incompatible with a property definition's type or cardinality.
    #[error("Validation error for {property}: {message}")]
    Validation {
        /// Property definition id the value was checked against.
        property: String,
        /// What was wrong with the value.
        message: String,
    },

    /// Operation forbidden by type flags (non-fileable, non-creatable, ...).
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Operation forbidden by repository capability flags.
    #[error("Not supported by this repository: {0}")]
    NotSupported(String),

    /// A required argument was missing (e.g. a required attribute at creation).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation invalid for the object's current lifecycle phase.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A wire value or native value incompatible with an atomic type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The atomic type that was expected.
        expected: &'static str,
        /// Description of the offending value.
        actual: String,
    },

    /// Malformed or missing expected link/element in a remote response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure reported by the transport collaborator.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol(message.into())
    }

    pub(crate) fn validation(property: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Validation { property: property.into(), message: message.into() }
    }
}
