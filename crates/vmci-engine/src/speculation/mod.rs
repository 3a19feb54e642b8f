//! Speculation log
//!
//! A speculation is an optimistic assumption made by the compiler. Its
//! [`SpeculationReason`] is encoded into a byte string; the VM records the
//! encodings of speculations that failed at run time, so later compilations
//! can avoid repeating them.

mod encoding;
mod log;
mod reason;

pub use encoding::{SpeculationEncoding, DIGEST_LENGTH, MAX_ENCODING_LENGTH};
pub use log::{Speculation, SpeculationLog, NO_SPECULATION};
pub use reason::{ContextKind, ContextValue, GroupedReason, SpeculationReason, SpeculationReasonGroup};

/// Speculation errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum SpeculationError {
    /// A speculation recorded in this log failed after it was made
    #[error("Speculation failed: {reason}")]
    Failed {
        /// Description of the failed reason
        reason: String,
    },

    /// A reason encoded to zero bytes
    #[error("Speculation reason has an empty encoding: {0}")]
    EmptyEncoding(String),

    /// An id that this log never handed out
    #[error("Unknown encoded speculation: {0:#x}")]
    UnknownId(i64),

    /// Context values do not match the group's signature
    #[error("Context of reason group {group} does not match: {message}")]
    ContextMismatch {
        /// Group name
        group: String,
        /// What did not match
        message: String,
    },
}

/// Result type for speculation operations
pub type SpeculationResult<T> = Result<T, SpeculationError>;
