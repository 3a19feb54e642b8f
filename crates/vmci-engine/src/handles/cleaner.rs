//! Run-once release of VM resources

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vmci_sdk::VmBoundary;

/// A VM resource to release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    /// Delete a global object handle
    DeleteGlobalHandle(i64),
    /// Release a metadata handle
    ReleaseMetadataHandle(i64),
    /// Free a failed-speculation list
    ReleaseFailedSpeculations(u64),
}

impl CleanupAction {
    /// Perform the release
    pub fn perform(self, boundary: &dyn VmBoundary) {
        match self {
            CleanupAction::DeleteGlobalHandle(handle) => boundary.delete_global_handle(handle),
            CleanupAction::ReleaseMetadataHandle(handle) => {
                boundary.release_metadata_handle(handle)
            }
            CleanupAction::ReleaseFailedSpeculations(address) => {
                boundary.release_failed_speculations(address)
            }
        }
        tracing::trace!(action = ?self, "released VM resource");
    }
}

/// Releases a VM resource exactly once, at the latest when dropped
pub struct Cleaner {
    boundary: Arc<dyn VmBoundary>,
    action: CleanupAction,
    done: AtomicBool,
}

impl Cleaner {
    /// Arm a cleaner
    pub fn new(boundary: Arc<dyn VmBoundary>, action: CleanupAction) -> Self {
        Self {
            boundary,
            action,
            done: AtomicBool::new(false),
        }
    }

    /// The armed action
    pub fn action(&self) -> CleanupAction {
        self.action
    }

    /// Release now. Returns false if the resource was already released.
    pub fn clean(&self) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.action.perform(self.boundary.as_ref());
        true
    }

    /// Whether the resource has been released
    pub fn is_clean(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        self.clean();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmci_sdk::MemoryVm;

    #[test]
    fn test_runs_once() {
        let vm = Arc::new(MemoryVm::new());
        let handle = vm.new_global_handle(Arc::new(1u8));
        let cleaner = Cleaner::new(vm.clone(), CleanupAction::DeleteGlobalHandle(handle));
        assert!(cleaner.clean());
        assert!(!cleaner.clean());
        drop(cleaner);
        assert_eq!(vm.deleted_handles(), vec![handle]);
        assert_eq!(vm.double_deletes(), 0);
    }

    #[test]
    fn test_runs_on_drop() {
        let vm = Arc::new(MemoryVm::new());
        let list = vm.allocate_failed_speculations_list().unwrap();
        {
            let _cleaner = Cleaner::new(vm.clone(), CleanupAction::ReleaseFailedSpeculations(list));
        }
        assert_eq!(vm.released_speculation_lists(), vec![list]);
    }
}
