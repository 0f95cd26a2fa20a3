use crate::Value;
use core::time::Duration;

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `sequenced` can emit.
///
/// Every variant propagates to the caller of the save/insert operation that
/// triggered generation. Nothing is logged and swallowed internally.
///
/// Only [`Error::LockTimeout`] and [`Error::DuplicateSequenceValue`] are
/// transient; see [`Error::is_retryable`]. Retrying means repeating the whole
/// generate-and-save operation, since a fresh scope scan is required.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A sequence spec references a column or attribute the entity type does
    /// not define, or redefines a column that is already sequenced.
    ///
    /// Raised at registration time. Never retried.
    #[error("configuration error on `{type_name}`: {reason}")]
    Configuration {
        type_name: &'static str,
        reason: String,
    },

    /// A scope attribute was unset on the record being saved.
    #[error("scope attribute `{attribute}` is missing")]
    MissingScopeValue { attribute: &'static str },

    /// A computed start value did not evaluate to an integer.
    #[error("start value for `{column}` must be an integer, got {found}")]
    InvalidStartValue { column: &'static str, found: Value },

    /// The backing store did not grant a serialization lock in time.
    #[error("timed out after {waited:?} waiting for lock on {resource}")]
    LockTimeout { resource: String, waited: Duration },

    /// A uniqueness constraint on the sequenced column was violated.
    #[error("duplicate sequence value in `{table}` ({constraint})")]
    DuplicateSequenceValue { table: String, constraint: String },

    /// No integer above the current maximum is representable.
    #[error("sequence `{table}.{column}` is exhausted")]
    Exhausted {
        table: &'static str,
        column: &'static str,
    },

    /// An opaque failure reported by the backing store.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Returns `true` if repeating the whole generate-and-save operation may
    /// succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout { .. } | Self::DuplicateSequenceValue { .. }
        )
    }

    pub(crate) fn configuration(type_name: &'static str, reason: impl Into<String>) -> Self {
        Self::Configuration {
            type_name,
            reason: reason.into(),
        }
    }
}
