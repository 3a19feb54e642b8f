//! VM configuration binding
//!
//! The VM publishes the layout of its metadata structures as a table of named
//! fields, constants, addresses and flags. [`ConfigStore`] holds that table as
//! read once at startup, [`ConfigAccess`] turns names into typed values, and
//! [`VmConfig`] resolves every entry the decoders need up front so a missing
//! or mistyped entry fails at startup rather than mid-compilation.

mod access;
mod store;
mod vm_config;

pub use access::{ConfigAccess, FromConfigValue};
pub use store::ConfigStore;
pub use vm_config::{DataLayoutConfig, DataLayoutTags, JvmConstantTags, VmConfig};

use std::fmt;
use vmci_sdk::BoundaryError;

/// Kinds of configuration entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCategory {
    /// Struct field
    Field,
    /// Named constant
    Constant,
    /// Named address
    Address,
    /// VM flag
    Flag,
    /// Native type size
    TypeSize,
}

impl fmt::Display for ConfigCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigCategory::Field => "field",
            ConfigCategory::Constant => "constant",
            ConfigCategory::Address => "address",
            ConfigCategory::Flag => "flag",
            ConfigCategory::TypeSize => "type size",
        })
    }
}

/// Configuration errors. All of them mean the compiler and the VM disagree
/// about the VM's layout and are not recoverable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// A required entry is absent
    #[error(
        "expected VM {category} not found: {name}\navailable {category} entries:\n    {}",
        .available.join("\n    ")
    )]
    EntryMissing {
        /// Kind of entry
        category: ConfigCategory,
        /// Requested name
        name: String,
        /// Every name present in that category, sorted
        available: Vec<String>,
    },

    /// A field's declared native type is not the expected one
    #[error("expected type {expected} but VM field {name} is of type {}", .actual.as_deref().unwrap_or("<none>"))]
    NativeTypeMismatch {
        /// Field name
        name: String,
        /// Expected native type
        expected: String,
        /// Declared native type
        actual: Option<String>,
    },

    /// Value or address requested from an instance field
    #[error("{name} is not a static field")]
    NotStatic {
        /// Field name
        name: String,
    },

    /// Offset requested from a static field
    #[error("cannot get offset of static field {name}")]
    StaticField {
        /// Field name
        name: String,
    },

    /// The stored value cannot be converted to the requested type
    #[error("cannot convert {name} of type {from} to {to}")]
    Conversion {
        /// Entry name
        name: String,
        /// Representation of the stored value
        from: &'static str,
        /// Requested type
        to: &'static str,
    },

    /// The VM published the same name twice
    #[error("duplicate VM {category}: {name}")]
    DuplicateEntry {
        /// Kind of entry
        category: ConfigCategory,
        /// Duplicated name
        name: String,
    },

    /// Reading the table failed
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
}

/// Result type for configuration access
pub type ConfigResult<T> = Result<T, ConfigError>;
