//! Shared fixtures for the integration tests
//!
//! Every test gets its own [`MemoryVm`] and runtime, so tests can run in
//! parallel without sharing metadata or handle state.

#![allow(dead_code)]

use std::sync::Arc;
use vmci_engine::{RuntimeOptions, VmBoundary, VmciRuntime};
use vmci_sdk::MemoryVm;

/// Route `tracing` output through the test harness. Honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A VM and a runtime bound to it
pub struct Fixture {
    pub vm: Arc<MemoryVm>,
    pub runtime: Arc<VmciRuntime>,
}

impl Fixture {
    /// Fixture over the reference layout with default options
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Fixture over the reference layout
    pub fn with_options(options: RuntimeOptions) -> Self {
        Self::with_vm(MemoryVm::new(), options)
    }

    /// Fixture over a preconfigured VM
    pub fn with_vm(vm: MemoryVm, options: RuntimeOptions) -> Self {
        init_tracing();
        let vm = Arc::new(vm);
        let boundary: Arc<dyn VmBoundary> = vm.clone();
        let runtime = VmciRuntime::new(boundary, options).expect("runtime over the reference layout");
        Self { vm, runtime }
    }
}

/// A method `demo/Holder.run()V` with its own pool, for tests that only
/// need something to hang a profile or speculation log off
pub struct DemoMethod {
    pub holder: u64,
    pub pool: u64,
    pub method: u64,
}

impl DemoMethod {
    pub fn build(vm: &MemoryVm, code_size: usize) -> Self {
        let mut cp = vm.constant_pool();
        let name = cp.utf8("run");
        let signature = cp.utf8("()V");
        let pool = cp.build().unwrap();
        let holder = vm.klass("demo/Holder").constant_pool(pool).build().unwrap();
        let method = vm
            .method(pool)
            .name_and_signature(name, signature)
            .code(&vec![0u8; code_size])
            .build().unwrap();
        Self {
            holder,
            pool,
            method,
        }
    }
}
