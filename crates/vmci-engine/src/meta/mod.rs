//! VM metadata: types, methods, fields and constant pools
//!
//! Wrappers are memoized per native pointer in a [`MetaspaceCache`], so
//! repeated lookups of the same class or method return the same `Arc` for as
//! long as any caller keeps one alive. Each wrapper holds a metadata handle
//! that keeps the native object alive and is released when the wrapper drops.

mod bytecodes;
mod cache;
mod constant;
pub mod constant_pool;
mod field;
mod method;
mod signature;
mod types;

pub use bytecodes::Opcode;
pub use cache::MetaspaceCache;
pub use constant::{JavaConstant, PrimitiveConstant};
pub use constant_pool::{ConstantPool, JvmConstant, PoolConstant};
pub use field::{JavaField, ResolvedJavaField};
pub use method::{JavaMethod, ResolvedJavaMethod};
pub use signature::Signature;
pub use types::{JavaType, ResolvedJavaType, METHOD_HANDLE_CLASS, VAR_HANDLE_CLASS};

use vmci_sdk::BoundaryError;

/// Access flag `ACC_STATIC`
pub const ACC_STATIC: u32 = 0x0008;

/// Metadata decoding errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum MetadataError {
    /// A constant pool tag this decoder does not understand
    #[error("Unknown constant pool tag {tag} at index {index}")]
    UnknownConstantTag {
        /// Constant pool index
        index: i32,
        /// Tag byte
        tag: u8,
    },

    /// An entry has a different tag than the operation requires
    #[error("Expected {expected} at constant pool index {index}, found tag {actual}")]
    UnexpectedTag {
        /// Constant pool index
        index: i32,
        /// Required entry kind
        expected: &'static str,
        /// Tag byte found
        actual: u8,
    },

    /// An opcode that does not reference the constant pool this way
    #[error("Unexpected opcode {0:?}")]
    UnexpectedOpcode(Opcode),

    /// Index past the end of the pool
    #[error("Constant pool index {index} out of bounds for length {length}")]
    IndexOutOfBounds {
        /// Requested index
        index: i32,
        /// Pool length
        length: i32,
    },

    /// A non-negative index used with invokedynamic
    #[error("Not an invokedynamic constant pool index: {0}")]
    NotInvokedynamicIndex(i32),

    /// A descriptor that does not parse
    #[error("Malformed signature {signature}: {reason}")]
    MalformedSignature {
        /// The descriptor
        signature: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// A primitive constant with a non-primitive kind
    #[error("Invalid primitive constant kind {0:?}")]
    InvalidPrimitiveKind(vmci_sdk::JavaKind),

    /// A metadata pointer that must not be null was null
    #[error("Null {0} pointer")]
    NullPointer(&'static str),

    /// A VM query failed
    #[error(transparent)]
    Boundary(#[from] BoundaryError),
}

/// Result type for metadata decoding
pub type MetadataResult<T> = Result<T, MetadataError>;
