//! Error types for the type system
//!
//! Every fallible entry point returns [`MetaError`]. Failures are also written
//! to the thread's ambient [`context`] so callers that only look at an
//! `Option`/`bool` result can still ask what went wrong.

pub mod context;

#[cfg(test)]
mod tests;

use thiserror::Error;

pub use context::{ErrorRecord, FrameGuard};

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, MetaError>;

/// Coarse failure category callers can branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    DuplicateRegistration,
    TypeMismatch,
    InvalidHandle,
    InvalidOperation,
    OutOfRange,
    OutOfMemory,
    Unimplemented,
}

/// Errors raised by the registry, class, instance and signal subsystems
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// Null or unknown handle, malformed argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Parent type rejected during registration
    #[error("Invalid parent for '{name}': {reason}")]
    InvalidParent {
        /// Name being registered
        name: String,
        /// Why the parent was rejected
        reason: String,
    },

    /// Type info rejected during registration
    #[error("Invalid type info for '{name}': {reason}")]
    InvalidTypeInfo {
        /// Name being registered
        name: String,
        /// Which check failed
        reason: String,
    },

    /// Name or key already registered
    #[error("'{0}' is already registered")]
    DuplicateRegistration(String),

    /// Failed cast or compatibility check
    #[error("Type mismatch: cannot convert '{from}' to '{to}'")]
    TypeMismatch {
        /// Source type name
        from: String,
        /// Requested type name
        to: String,
    },

    /// Unknown signal, connection or closure
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Lifecycle misuse
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Request exceeds a configured limit or a storage bound
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Allocation collaborator refused the request
    #[error("Out of memory allocating {size} bytes for {label}")]
    OutOfMemory {
        /// Requested bytes
        size: usize,
        /// Allocation label
        label: String,
    },

    /// Zero-size class or instance, or an empty virtual slot
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl MetaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaError::InvalidArgument(_)
            | MetaError::InvalidParent { .. }
            | MetaError::InvalidTypeInfo { .. } => ErrorKind::InvalidArgument,
            MetaError::DuplicateRegistration(_) => ErrorKind::DuplicateRegistration,
            MetaError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            MetaError::InvalidHandle(_) => ErrorKind::InvalidHandle,
            MetaError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            MetaError::OutOfRange(_) => ErrorKind::OutOfRange,
            MetaError::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            MetaError::Unimplemented(_) => ErrorKind::Unimplemented,
        }
    }

    /// Programmer errors are logged loudly rather than as plain failures
    pub fn is_usage_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidOperation)
    }

    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        MetaError::InvalidArgument(msg.into())
    }

    pub(crate) fn invalid_operation(msg: impl Into<String>) -> Self {
        MetaError::InvalidOperation(msg.into())
    }

    pub(crate) fn invalid_handle(msg: impl Into<String>) -> Self {
        MetaError::InvalidHandle(msg.into())
    }

    pub(crate) fn mismatch(from: impl Into<String>, to: impl Into<String>) -> Self {
        MetaError::TypeMismatch {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Record a failure in the ambient context and hand it back as `Err`
#[inline]
pub(crate) fn fail<T>(err: MetaError) -> Result<T> {
    Err(context::record(err))
}

/// Conversion helpers for the two propagation styles
pub trait ResultExt<T> {
    /// Record any error in the ambient context and keep propagating it
    fn recorded(self) -> Result<T>;

    /// Record any error in the ambient context and degrade to `None`
    fn or_record(self) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn recorded(self) -> Result<T> {
        self.map_err(context::record)
    }

    fn or_record(self) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                context::record(err);
                None
            }
        }
    }
}
