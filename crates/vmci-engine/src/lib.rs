//! VMCI Engine - the core of a JIT compiler interface
//!
//! This crate lets a compiler running beside a VM read the VM's metadata and
//! runtime state without knowing its internals:
//! - **Config**: the VM's self-described layout, bound to typed values (`config` module)
//! - **Metadata**: types, methods, fields and constant pools (`meta` module)
//! - **Profiles**: per-bytecode execution profiles (`profile` module)
//! - **Handles**: scoped lifetimes for VM object references (`handles` module)
//! - **Speculation**: the failed-speculation log (`speculation` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vmci_engine::{RuntimeOptions, VmciRuntime};
//!
//! let runtime = VmciRuntime::new(boundary, RuntimeOptions::from_env())?;
//! let method = runtime.resolve_method(method_pointer)?;
//! let profile = method.profiling_info()?;
//! let taken = profile.branch_taken_probability(12)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// ============================================================================
// Core Modules
// ============================================================================

pub mod config;
pub mod handles;
pub mod meta;
pub mod options;
pub mod profile;
pub mod runtime;
pub mod speculation;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{ConfigAccess, ConfigError, ConfigResult, VmConfig};
pub use handles::{HandleError, HandleRegistry, ObjectConstant, ObjectConstantScope};
pub use meta::{
    ConstantPool, JavaConstant, JavaField, JavaMethod, JavaType, MetadataError, Opcode,
    PoolConstant, ResolvedJavaField, ResolvedJavaMethod, ResolvedJavaType, Signature,
};
pub use options::RuntimeOptions;
pub use profile::{MethodData, ProfileError, ProfilingInfo, TriState};
pub use runtime::VmciRuntime;
pub use speculation::{Speculation, SpeculationError, SpeculationLog, SpeculationReason};

pub use vmci_sdk::{BoundaryError, JavaKind, VmBoundary};

/// Errors surfaced by the compiler interface
#[derive(Debug, Clone, thiserror::Error)]
pub enum VmciError {
    /// VM configuration mismatch
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Use of a released object handle or misuse of a scope
    #[error("Handle error: {0}")]
    Handle(#[from] HandleError),

    /// Malformed or unexpected metadata
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Corrupt or inconsistent profile
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Speculation failure
    #[error("Speculation error: {0}")]
    Speculation(#[from] SpeculationError),

    /// Failure reported by the VM
    #[error("VM error: {0}")]
    Boundary(#[from] BoundaryError),
}

/// Result type for compiler interface operations
pub type VmciResult<T> = Result<T, VmciError>;
