//! Classes

use super::{ConstantPool, MetadataError, ResolvedJavaField};
use crate::handles::{Cleaner, CleanupAction};
use crate::runtime::VmciRuntime;
use crate::VmciResult;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;
use vmci_sdk::JavaKind;

/// Descriptor of `java.lang.invoke.MethodHandle`
pub const METHOD_HANDLE_CLASS: &str = "Ljava/lang/invoke/MethodHandle;";
/// Descriptor of `java.lang.invoke.VarHandle`
pub const VAR_HANDLE_CLASS: &str = "Ljava/lang/invoke/VarHandle;";

// ============================================================================
// ResolvedJavaType
// ============================================================================

/// A loaded class, identified by its `Klass*`
pub struct ResolvedJavaType {
    runtime: Arc<VmciRuntime>,
    klass: u64,
    handle: Cleaner,
    name: OnceCell<String>,
    constant_pool: OnceCell<Arc<ConstantPool>>,
}

impl ResolvedJavaType {
    pub(crate) fn new(runtime: Arc<VmciRuntime>, klass: u64) -> VmciResult<Self> {
        if klass == 0 {
            return Err(MetadataError::NullPointer("Klass").into());
        }
        let boundary = runtime.boundary().clone();
        let raw = boundary.acquire_metadata_handle(klass)?;
        Ok(Self {
            runtime,
            klass,
            handle: Cleaner::new(boundary, CleanupAction::ReleaseMetadataHandle(raw)),
            name: OnceCell::new(),
            constant_pool: OnceCell::new(),
        })
    }

    /// The `Klass*`
    pub fn klass_pointer(&self) -> u64 {
        self.klass
    }

    /// Metadata handle keeping the class alive
    pub fn metadata_handle(&self) -> &Cleaner {
        &self.handle
    }

    /// Name in descriptor form, e.g. `Ljava/lang/String;` or `[I`
    pub fn name(&self) -> VmciResult<&str> {
        self.name
            .get_or_try_init(|| {
                let config = self.runtime.vm_config();
                let boundary = self.runtime.boundary();
                let symbol = boundary.read_u64(self.klass + config.klass_name_offset)?;
                let internal = boundary.get_symbol(symbol)?;
                Ok(if internal.starts_with('[') {
                    internal
                } else {
                    format!("L{};", internal)
                })
            })
            .map(String::as_str)
    }

    fn layout_helper(&self) -> VmciResult<i32> {
        let offset = self.runtime.vm_config().klass_layout_helper_offset;
        Ok(self.runtime.boundary().read_i32(self.klass + offset)?)
    }

    /// Whether this is an array class
    pub fn is_array(&self) -> VmciResult<bool> {
        Ok(self.layout_helper()? < 0)
    }

    /// Access flags
    pub fn access_flags(&self) -> VmciResult<u32> {
        let offset = self.runtime.vm_config().klass_access_flags_offset;
        Ok(self.runtime.boundary().read_u32(self.klass + offset)?)
    }

    /// Whether class initialization has completed. Arrays always count as
    /// initialized.
    pub fn is_initialized(&self) -> VmciResult<bool> {
        if self.is_array()? {
            return Ok(true);
        }
        let config = self.runtime.vm_config();
        let state = self
            .runtime
            .boundary()
            .read_u8(self.klass + config.instance_klass_init_state_offset)?;
        Ok(state == config.instance_klass_fully_initialized)
    }

    /// Run class initialization if needed
    pub fn initialize(&self) -> VmciResult<()> {
        if !self.is_initialized()? {
            self.runtime.boundary().ensure_initialized(self.klass)?;
        }
        Ok(())
    }

    /// Constant pool of an instance class
    pub fn constant_pool(&self) -> VmciResult<Arc<ConstantPool>> {
        self.constant_pool
            .get_or_try_init(|| {
                let offset = self.runtime.vm_config().instance_klass_constants_offset;
                let pool = self.runtime.boundary().read_u64(self.klass + offset)?;
                self.runtime.constant_pool(pool)
            })
            .cloned()
    }

    /// Whether invocations of this class's native varargs methods are
    /// signature polymorphic
    pub fn is_signature_polymorphic_holder(&self) -> VmciResult<bool> {
        let name = self.name()?;
        Ok(name == METHOD_HANDLE_CLASS || name == VAR_HANDLE_CLASS)
    }

    /// Field declared by this class
    pub fn create_field(
        self: &Arc<Self>,
        name: String,
        field_type: JavaType,
        offset: i32,
        flags: i32,
        index: i32,
    ) -> ResolvedJavaField {
        ResolvedJavaField::new(self.clone(), name, field_type, offset, flags, index)
    }
}

impl PartialEq for ResolvedJavaType {
    fn eq(&self, other: &Self) -> bool {
        self.klass == other.klass
    }
}

impl Eq for ResolvedJavaType {}

impl fmt::Debug for ResolvedJavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedJavaType")
            .field("klass", &format_args!("{:#x}", self.klass))
            .field("name", &self.name.get())
            .finish()
    }
}

impl Drop for ResolvedJavaType {
    fn drop(&mut self) {
        self.runtime.types().remove_dead(self.klass);
    }
}

// ============================================================================
// JavaType
// ============================================================================

/// A type reference that may not be loaded yet
#[derive(Debug, Clone)]
pub enum JavaType {
    /// A primitive type or `void`
    Primitive(JavaKind),
    /// A loaded class
    Resolved(Arc<ResolvedJavaType>),
    /// A class known only by its descriptor
    Unresolved(String),
}

impl JavaType {
    /// Name in descriptor form
    pub fn name(&self) -> VmciResult<String> {
        match self {
            JavaType::Primitive(kind) => Ok(kind.type_char().to_string()),
            JavaType::Resolved(ty) => Ok(ty.name()?.to_string()),
            JavaType::Unresolved(name) => Ok(name.clone()),
        }
    }

    /// Kind of values of this type
    pub fn kind(&self) -> JavaKind {
        match self {
            JavaType::Primitive(kind) => *kind,
            _ => JavaKind::Object,
        }
    }

    /// Whether this is a loaded class
    pub fn is_resolved(&self) -> bool {
        matches!(self, JavaType::Resolved(_))
    }

    /// The loaded class, if any
    pub fn as_resolved(&self) -> Option<&Arc<ResolvedJavaType>> {
        match self {
            JavaType::Resolved(ty) => Some(ty),
            _ => None,
        }
    }
}

impl PartialEq for JavaType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JavaType::Primitive(a), JavaType::Primitive(b)) => a == b,
            (JavaType::Resolved(a), JavaType::Resolved(b)) => a == b,
            (JavaType::Unresolved(a), JavaType::Unresolved(b)) => a == b,
            _ => false,
        }
    }
}
