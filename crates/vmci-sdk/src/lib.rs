//! VMCI SDK - the boundary between the compiler interface and the host VM
//!
//! This crate provides the call interface the compiler interface core uses to
//! talk to a running VM ([`VmBoundary`]), the raw values that cross it, and
//! [`MemoryVm`], an in-process VM that serves metadata out of byte regions laid
//! out in the [`memory::layout`] reference layout.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmci_sdk::{MemoryVm, VmBoundary};
//!
//! let vm = Arc::new(MemoryVm::new());
//! let object = vm.klass("java/lang/Object").initialized().build()?;
//! let table = vm.read_configuration()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod boundary;
pub mod error;
pub mod memory;
pub mod types;

pub use boundary::VmBoundary;
pub use error::{BoundaryError, BoundaryResult};
pub use memory::MemoryVm;
pub use types::{
    ConfigTable, ConfigValue, HostObject, JavaKind, KlassRef, RawConstant, RawObject,
    ResolvedFieldInfo, VmField, VmFlag, VmIntrinsic,
};
