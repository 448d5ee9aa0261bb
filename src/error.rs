use super::matrix::{Label, StateId};

/// Errors returned by every fallible operation of the crate.
///
/// None of these are transient: they signal either caller misuse or a
/// corrupted capsule, so nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Threshold, share count, chunk size or another parameter is out of bounds.
    #[error("invalid parameters: {0}")]
    InvalidParameters(&'static str),

    /// Fewer distinct shares than the threshold were supplied.
    #[error("not enough shares to recover the secret: {got} distinct of {needed} required")]
    InsufficientShares {
        /// Minimum number of distinct shares.
        needed: usize,
        /// Distinct shares actually supplied.
        got: usize,
    },

    /// Inverse of zero or a value outside the field.
    #[error("arithmetic error: {0}")]
    Arithmetic(&'static str),

    /// A visited state has no usable transition for a script label.
    #[error("state {state} has no transition for label {label}")]
    DeadEndState {
        /// State the executor was in.
        state: StateId,
        /// Label that could not be followed.
        label: Label,
    },

    /// Two share-id subsets that must be disjoint overlap.
    #[error("share id subsets are not disjoint")]
    AmbiguousSignature,

    /// The capsule bytes are not structurally well-formed.
    #[error("malformed capsule: {0}")]
    MalformedCapsule(&'static str),

    /// The supplied key does not open the capsule.
    #[error("decryption failed")]
    KeyMismatch,
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
