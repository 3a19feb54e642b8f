//! The compiler interface runtime
//!
//! A [`VmciRuntime`] binds one [`VmBoundary`] to everything decoded from it:
//! the VM configuration, the handle registry and the caches of metadata
//! wrappers. Wrappers keep their runtime alive through an `Arc`.

use crate::config::{ConfigAccess, VmConfig};
use crate::handles::HandleRegistry;
use crate::meta::{
    ConstantPool, JavaConstant, JavaType, MetaspaceCache, ResolvedJavaMethod, ResolvedJavaType,
    METHOD_HANDLE_CLASS,
};
use crate::options::RuntimeOptions;
use crate::speculation::SpeculationLog;
use crate::{VmciError, VmciResult};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use vmci_sdk::{JavaKind, KlassRef, RawConstant, VmBoundary};

static GLOBAL: OnceCell<Arc<VmciRuntime>> = OnceCell::new();

/// Shared state of the compiler interface
pub struct VmciRuntime {
    boundary: Arc<dyn VmBoundary>,
    options: RuntimeOptions,
    config: ConfigAccess,
    vm_config: VmConfig,
    handles: HandleRegistry,
    types: MetaspaceCache<ResolvedJavaType>,
    methods: MetaspaceCache<ResolvedJavaMethod>,
    pools: MetaspaceCache<ConstantPool>,
}

impl VmciRuntime {
    /// Bind a new runtime to `boundary`. Reads and validates the VM
    /// configuration, so layout mismatches fail here.
    pub fn new(boundary: Arc<dyn VmBoundary>, options: RuntimeOptions) -> VmciResult<Arc<Self>> {
        let config = ConfigAccess::load(boundary.clone())?;
        let vm_config = VmConfig::load(&config)?;
        let handles = HandleRegistry::new(boundary.clone(), options.audit_handles);
        tracing::info!(
            audit_handles = options.audit_handles,
            verify_profile_sizes = options.verify_profile_sizes,
            "compiler interface runtime initialized"
        );
        Ok(Arc::new(Self {
            boundary,
            options,
            config,
            vm_config,
            handles,
            types: MetaspaceCache::new(),
            methods: MetaspaceCache::new(),
            pools: MetaspaceCache::new(),
        }))
    }

    /// Initialize the process-wide runtime. Later calls return the runtime
    /// created by the first successful one and ignore their arguments.
    pub fn initialize(
        boundary: Arc<dyn VmBoundary>,
        options: RuntimeOptions,
    ) -> VmciResult<Arc<Self>> {
        GLOBAL
            .get_or_try_init(|| Self::new(boundary, options))
            .cloned()
    }

    /// The process-wide runtime, if [`initialize`](Self::initialize) ran
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Boundary to the VM
    pub fn boundary(&self) -> &Arc<dyn VmBoundary> {
        &self.boundary
    }

    /// Options the runtime was created with
    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// Named access to the VM configuration
    pub fn config(&self) -> &ConfigAccess {
        &self.config
    }

    /// Configuration entries resolved at startup
    pub fn vm_config(&self) -> &VmConfig {
        &self.vm_config
    }

    /// Registry wrapping object handles
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub(crate) fn types(&self) -> &MetaspaceCache<ResolvedJavaType> {
        &self.types
    }

    pub(crate) fn methods(&self) -> &MetaspaceCache<ResolvedJavaMethod> {
        &self.methods
    }

    pub(crate) fn pools(&self) -> &MetaspaceCache<ConstantPool> {
        &self.pools
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Wrapper for the `Klass*` at `klass`. Live wrappers are shared.
    pub fn resolve_type(self: &Arc<Self>, klass: u64) -> VmciResult<Arc<ResolvedJavaType>> {
        self.types.get_or_try_insert_with(klass, || {
            tracing::debug!(klass = format_args!("{:#x}", klass), "wrapping type");
            ResolvedJavaType::new(self.clone(), klass)
        })
    }

    /// Wrapper for the `Method*` at `method`. Live wrappers are shared.
    pub fn resolve_method(self: &Arc<Self>, method: u64) -> VmciResult<Arc<ResolvedJavaMethod>> {
        self.methods.get_or_try_insert_with(method, || {
            tracing::debug!(method = format_args!("{:#x}", method), "wrapping method");
            ResolvedJavaMethod::new(self.clone(), method)
        })
    }

    /// Wrapper for the `ConstantPool*` at `pool`. Live wrappers are shared.
    pub fn constant_pool(self: &Arc<Self>, pool: u64) -> VmciResult<Arc<ConstantPool>> {
        self.pools.get_or_try_insert_with(pool, || {
            tracing::debug!(pool = format_args!("{:#x}", pool), "wrapping constant pool");
            ConstantPool::new(self.clone(), pool)
        })
    }

    /// Type named by the descriptor `name`. Primitive descriptors never
    /// consult the VM; other names are looked up relative to `accessing`
    /// and yield an unresolved type when the VM does not know them.
    pub fn lookup_type(
        self: &Arc<Self>,
        name: &str,
        accessing: Option<&Arc<ResolvedJavaType>>,
        resolve: bool,
    ) -> VmciResult<JavaType> {
        let mut chars = name.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            match JavaKind::from_type_char(c) {
                Some(JavaKind::Object) | None => {}
                Some(kind) => return Ok(JavaType::Primitive(kind)),
            }
        }
        let accessing = accessing.map(|ty| ty.klass_pointer());
        match self.boundary.lookup_type(name, accessing, resolve)? {
            Some(klass) => Ok(JavaType::Resolved(self.resolve_type(klass)?)),
            None => Ok(JavaType::Unresolved(name.to_string())),
        }
    }

    /// Type for a class reference returned by the VM
    pub fn java_type(self: &Arc<Self>, klass: KlassRef) -> VmciResult<JavaType> {
        match klass {
            KlassRef::Resolved(klass) => Ok(JavaType::Resolved(self.resolve_type(klass)?)),
            KlassRef::Unresolved(name) => Ok(JavaType::Unresolved(name)),
        }
    }

    /// `java.lang.invoke.MethodHandle`
    pub fn method_handle_class(self: &Arc<Self>) -> VmciResult<JavaType> {
        self.lookup_type(METHOD_HANDLE_CLASS, None, true)
    }

    /// Wrap a constant produced by the VM, registering object handles with
    /// the active scope
    pub fn wrap_constant(&self, raw: RawConstant) -> VmciResult<JavaConstant> {
        JavaConstant::from_raw(raw, &self.handles).map_err(VmciError::from)
    }

    /// Speculation log owning a fresh failed-speculation list
    pub fn new_speculation_log(self: &Arc<Self>) -> VmciResult<SpeculationLog> {
        SpeculationLog::new(self.clone())
    }
}

impl fmt::Debug for VmciRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmciRuntime")
            .field("options", &self.options)
            .field("types", &self.types.len())
            .field("methods", &self.methods.len())
            .field("pools", &self.pools.len())
            .field("handles", &self.handles.stats().live())
            .finish()
    }
}
