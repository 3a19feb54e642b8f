//! Lifetime management for references into the VM
//!
//! Three ownership regimes exist for object references:
//!
//! - **Direct**: the object lives in the compiler's own heap and is embedded
//!   as a [`HostObject`](vmci_sdk::HostObject). No handle is involved.
//! - **Global**: an indirect handle created outside any local scope. It is
//!   deleted when the last wrapper referencing it is dropped.
//! - **Scoped**: an indirect handle created while an
//!   [`ObjectConstantScope`] is the innermost local scope on the current
//!   thread. The scope holds it until the scope closes, and closing deletes
//!   it even while wrappers are still alive. Wrappers dropped before the
//!   close leave the deletion to the scope.
//!
//! Using a handle after it was deleted fails with [`HandleError::Cleared`].

mod cleaner;
mod object;
mod registry;
mod scope;

pub use cleaner::{CleanupAction, Cleaner};
pub use object::{ForeignHandle, IndirectObjectConstant, ObjectConstant};
pub use registry::{HandleRegistry, HandleStats};
pub use scope::ObjectConstantScope;

/// Handle lifetime violations
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandleError {
    /// A cleared handle was dereferenced
    #[error("{message}")]
    Cleared {
        /// Diagnostic message, including the clearing scope and, in audit
        /// mode, the allocation backtrace
        message: String,
    },

    /// A scope that is not the innermost one on this thread was closed
    #[error("Cannot close non-active scope {} (scope depth {depth})", .description.as_deref().unwrap_or("<global>"))]
    ScopeNotActive {
        /// Description of the scope being closed
        description: Option<String>,
        /// Scope stack depth on the current thread
        depth: usize,
    },
}

/// Result type for handle operations
pub type HandleResult<T> = Result<T, HandleError>;
