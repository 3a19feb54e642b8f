//! Creation of object references from raw VM values

use super::object::{ForeignHandle, IndirectObjectConstant, ObjectConstant};
use super::scope::{self, ObjectConstantScope};
use std::backtrace::Backtrace;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vmci_sdk::{RawObject, VmBoundary};

/// Counters over the indirect handles created by one registry
#[derive(Debug, Default)]
pub struct HandleStats {
    created: AtomicU64,
    deleted: AtomicU64,
}

impl HandleStats {
    pub(crate) fn record_created(&self) {
        self.created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deleted(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Handles created
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Handles deleted
    pub fn deleted(&self) -> u64 {
        self.deleted.load(Ordering::Relaxed)
    }

    /// Handles not yet deleted
    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.deleted())
    }
}

/// Wraps raw VM object references, registering them with the active scope
pub struct HandleRegistry {
    boundary: Arc<dyn VmBoundary>,
    audit: bool,
    stats: Arc<HandleStats>,
}

impl HandleRegistry {
    /// Create a registry. With `audit` set every handle records the
    /// backtrace of its creation.
    pub fn new(boundary: Arc<dyn VmBoundary>, audit: bool) -> Self {
        Self {
            boundary,
            audit,
            stats: Arc::new(HandleStats::default()),
        }
    }

    /// Handle counters
    pub fn stats(&self) -> &HandleStats {
        &self.stats
    }

    /// Wrap a raw global handle
    pub fn wrap_handle(&self, raw: i64, compressed: bool) -> IndirectObjectConstant {
        let allocation_site = self
            .audit
            .then(|| Backtrace::force_capture().to_string());
        let handle = Arc::new(ForeignHandle::new(
            raw,
            self.boundary.clone(),
            self.stats.clone(),
            allocation_site,
        ));
        let scoped = scope::register(&handle);
        tracing::trace!(handle = raw, scoped, "wrapped global handle");
        IndirectObjectConstant::new(handle, compressed)
    }

    /// Wrap a raw object reference
    pub fn wrap(&self, object: RawObject) -> ObjectConstant {
        match object {
            RawObject::Handle { handle, compressed } => {
                ObjectConstant::Indirect(self.wrap_handle(handle, compressed))
            }
            RawObject::Direct(object) => ObjectConstant::Direct {
                object,
                compressed: false,
            },
        }
    }

    /// Open a local scope on the current thread
    pub fn open_local_scope(&self, description: impl Into<String>) -> ObjectConstantScope {
        ObjectConstantScope::open_local(description)
    }

    /// Enter the global scope on the current thread
    pub fn enter_global_scope(&self) -> ObjectConstantScope {
        ObjectConstantScope::enter_global()
    }
}
