//! Object references: direct objects and indirect handles

use super::cleaner::CleanupAction;
use super::registry::HandleStats;
use super::{HandleError, HandleResult};
use crate::VmciResult;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use vmci_sdk::{HostObject, VmBoundary};

// ============================================================================
// ForeignHandle
// ============================================================================

/// A global handle into the VM heap.
///
/// The raw value is swapped to 0 when the handle is cleared, so deletion
/// happens at most once no matter how many threads race to clear it.
pub struct ForeignHandle {
    raw: AtomicI64,
    boundary: Arc<dyn VmBoundary>,
    stats: Arc<HandleStats>,
    allocation_site: Option<String>,
    cleared_from: Mutex<Option<String>>,
}

impl ForeignHandle {
    pub(crate) fn new(
        raw: i64,
        boundary: Arc<dyn VmBoundary>,
        stats: Arc<HandleStats>,
        allocation_site: Option<String>,
    ) -> Self {
        stats.record_created();
        Self {
            raw: AtomicI64::new(raw),
            boundary,
            stats,
            allocation_site,
            cleared_from: Mutex::new(None),
        }
    }

    /// Raw handle value, or an error if the handle was cleared
    pub fn get(&self) -> HandleResult<i64> {
        match self.raw.load(Ordering::Acquire) {
            0 => Err(HandleError::Cleared {
                message: self.cleared_message(),
            }),
            raw => Ok(raw),
        }
    }

    /// Whether the handle has been cleared
    pub fn is_cleared(&self) -> bool {
        self.raw.load(Ordering::Acquire) == 0
    }

    /// Delete the handle. `scope` names the scope doing the clearing.
    ///
    /// Returns false if the handle was already cleared.
    pub fn clear(&self, scope: Option<&str>) -> bool {
        {
            let mut cleared_from = self.cleared_from.lock();
            if cleared_from.is_none() {
                *cleared_from = Some(scope.unwrap_or("<global>").to_string());
            }
        }
        let raw = self.raw.swap(0, Ordering::AcqRel);
        if raw == 0 {
            return false;
        }
        CleanupAction::DeleteGlobalHandle(raw).perform(self.boundary.as_ref());
        self.stats.record_deleted();
        true
    }

    fn cleared_message(&self) -> String {
        let mut message = String::from("Foreign object reference has been cleared");
        if let Some(scope) = self.cleared_from.lock().as_deref() {
            message.push_str(" from ");
            message.push_str(scope);
        }
        match &self.allocation_site {
            Some(site) => {
                message.push_str("; allocated at:\n");
                message.push_str(site);
            }
            None => message.push_str("; enable handle auditing to see the allocation site"),
        }
        message
    }

    fn boundary(&self) -> &dyn VmBoundary {
        self.boundary.as_ref()
    }
}

impl Drop for ForeignHandle {
    fn drop(&mut self) {
        self.clear(None);
    }
}

impl fmt::Debug for ForeignHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignHandle")
            .field("raw", &self.raw.load(Ordering::Relaxed))
            .field("audited", &self.allocation_site.is_some())
            .finish()
    }
}

// ============================================================================
// IndirectObjectConstant
// ============================================================================

/// An object reference held through a [`ForeignHandle`].
///
/// The compressed and uncompressed views of one object share the handle.
#[derive(Debug, Clone)]
pub struct IndirectObjectConstant {
    handle: Arc<ForeignHandle>,
    compressed: bool,
}

impl IndirectObjectConstant {
    pub(crate) fn new(handle: Arc<ForeignHandle>, compressed: bool) -> Self {
        Self { handle, compressed }
    }

    /// Raw handle value
    pub fn raw_handle(&self) -> HandleResult<i64> {
        self.handle.get()
    }

    /// Shared handle
    pub fn handle(&self) -> &Arc<ForeignHandle> {
        &self.handle
    }

    /// Whether this view is a compressed reference
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Compressed view of the same object
    pub fn compress(&self) -> Self {
        Self::new(self.handle.clone(), true)
    }

    /// Uncompressed view of the same object
    pub fn uncompress(&self) -> Self {
        Self::new(self.handle.clone(), false)
    }

    /// Whether both references denote the same VM object
    pub fn same_object(&self, other: &Self) -> VmciResult<bool> {
        if Arc::ptr_eq(&self.handle, &other.handle) {
            return Ok(true);
        }
        let (a, b) = (self.raw_handle()?, other.raw_handle()?);
        Ok(self.handle.boundary().objects_equal(a, b)?)
    }
}

// ============================================================================
// ObjectConstant
// ============================================================================

/// A non-null object reference
#[derive(Debug, Clone)]
pub enum ObjectConstant {
    /// Object embedded directly
    Direct {
        /// The object
        object: HostObject,
        /// Whether this view is a compressed reference
        compressed: bool,
    },
    /// Object behind a VM handle
    Indirect(IndirectObjectConstant),
}

impl ObjectConstant {
    /// Whether this view is a compressed reference
    pub fn is_compressed(&self) -> bool {
        match self {
            ObjectConstant::Direct { compressed, .. } => *compressed,
            ObjectConstant::Indirect(indirect) => indirect.is_compressed(),
        }
    }

    /// Compressed view of the same object
    pub fn compress(&self) -> Self {
        match self {
            ObjectConstant::Direct { object, .. } => ObjectConstant::Direct {
                object: object.clone(),
                compressed: true,
            },
            ObjectConstant::Indirect(indirect) => ObjectConstant::Indirect(indirect.compress()),
        }
    }

    /// Uncompressed view of the same object
    pub fn uncompress(&self) -> Self {
        match self {
            ObjectConstant::Direct { object, .. } => ObjectConstant::Direct {
                object: object.clone(),
                compressed: false,
            },
            ObjectConstant::Indirect(indirect) => ObjectConstant::Indirect(indirect.uncompress()),
        }
    }

    /// The embedded object, for direct references
    pub fn host_object(&self) -> Option<&HostObject> {
        match self {
            ObjectConstant::Direct { object, .. } => Some(object),
            ObjectConstant::Indirect(_) => None,
        }
    }

    /// Handle value, for indirect references
    pub fn raw_handle(&self) -> Option<HandleResult<i64>> {
        match self {
            ObjectConstant::Direct { .. } => None,
            ObjectConstant::Indirect(indirect) => Some(indirect.raw_handle()),
        }
    }
}
