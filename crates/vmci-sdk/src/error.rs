//! Error types for calls across the VM boundary

/// Result type for VM boundary calls
pub type BoundaryResult<T> = Result<T, BoundaryError>;

/// Failures reported by the host VM
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoundaryError {
    /// Raw memory read outside any mapped region
    #[error("Invalid address: {len} bytes at {address:#x}")]
    InvalidAddress {
        /// Start of the read
        address: u64,
        /// Number of bytes requested
        len: usize,
    },

    /// Object or metadata handle not known to the VM
    #[error("Unknown handle: {0}")]
    UnknownHandle(i64),

    /// Pointer does not denote a constant pool
    #[error("Unknown constant pool: {0:#x}")]
    UnknownConstantPool(u64),

    /// Symbol pointer does not denote a symbol
    #[error("Unknown symbol: {0:#x}")]
    UnknownSymbol(u64),

    /// A symbolic reference could not be linked
    #[error("Cannot resolve {what}")]
    Unresolvable {
        /// Description of the reference
        what: String,
    },

    /// The VM does not support this query
    #[error("Unsupported: {0}")]
    Unsupported(String),
}
