//! Decoding of VM-collected execution profiles
//!
//! A `MethodData` is a sequence of variable-size records in two regions: the
//! normal region, ordered by BCI, and the extra region holding records added
//! after the profile was laid out. [`MethodData`] walks the raw bytes,
//! [`ProfileRecord`] interprets one record, and [`ProfilingInfo`] answers
//! per-BCI queries.

mod info;
mod kind;
mod layout;
mod method_data;
mod record;
mod types;

pub use info::ProfilingInfo;
pub use kind::ProfileKind;
pub use layout::RecordLayout;
pub use method_data::MethodData;
pub use record::ProfileRecord;
pub use types::{JavaMethodProfile, JavaTypeProfile, ProfiledMethod, ProfiledType, TriState};

/// Profile decoding errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProfileError {
    /// The decoded size of a record disagrees with the VM
    #[error("Profile record {tag} at position {position} has size {computed} but the VM reports {reported}")]
    SizeMismatch {
        /// Record position
        position: i32,
        /// Record kind
        tag: ProfileKind,
        /// Size computed by the decoder
        computed: i32,
        /// Size reported by the VM
        reported: i32,
    },

    /// A record tag the decoder does not understand
    #[error("Unknown profile record tag {tag} at position {position}")]
    UnknownTag {
        /// Record position
        position: i32,
        /// Tag byte
        tag: u8,
    },

    /// A position outside the profile
    #[error("Profile position {position} outside data of size {size}")]
    OutOfBounds {
        /// Requested position
        position: i32,
        /// Total data size
        size: i32,
    },
}

/// Result type for profile decoding
pub type ProfileResult<T> = Result<T, ProfileError>;
