//! Methods

use super::{ConstantPool, JavaType, MetadataError, ResolvedJavaType, Signature, ACC_STATIC};
use crate::handles::{Cleaner, CleanupAction};
use crate::profile::ProfilingInfo;
use crate::runtime::VmciRuntime;
use crate::speculation::SpeculationLog;
use crate::VmciResult;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// ResolvedJavaMethod
// ============================================================================

/// A linked method, identified by its `Method*`
pub struct ResolvedJavaMethod {
    runtime: Arc<VmciRuntime>,
    holder: Arc<ResolvedJavaType>,
    method: u64,
    const_method: u64,
    handle: Cleaner,
    name: OnceCell<String>,
    signature: OnceCell<Signature>,
    speculation_log: OnceCell<Arc<SpeculationLog>>,
}

impl ResolvedJavaMethod {
    pub(crate) fn new(runtime: Arc<VmciRuntime>, method: u64) -> VmciResult<Self> {
        if method == 0 {
            return Err(MetadataError::NullPointer("Method").into());
        }
        let config = runtime.vm_config();
        let boundary = runtime.boundary().clone();
        let const_method = boundary.read_u64(method + config.method_const_method_offset)?;
        if const_method == 0 {
            return Err(MetadataError::NullPointer("ConstMethod").into());
        }
        let pool = boundary.read_u64(const_method + config.const_method_constants_offset)?;
        let holder = boundary.read_u64(pool + config.constant_pool_holder_offset)?;
        let holder = runtime.resolve_type(holder)?;

        let raw = boundary.acquire_metadata_handle(method)?;
        Ok(Self {
            runtime,
            holder,
            method,
            const_method,
            handle: Cleaner::new(boundary, CleanupAction::ReleaseMetadataHandle(raw)),
            name: OnceCell::new(),
            signature: OnceCell::new(),
            speculation_log: OnceCell::new(),
        })
    }

    /// The `Method*`
    pub fn method_pointer(&self) -> u64 {
        self.method
    }

    /// Metadata handle keeping the method alive
    pub fn metadata_handle(&self) -> &Cleaner {
        &self.handle
    }

    /// Declaring class
    pub fn holder(&self) -> &Arc<ResolvedJavaType> {
        &self.holder
    }

    /// Constant pool the method's bytecodes index into
    pub fn constant_pool(&self) -> VmciResult<Arc<ConstantPool>> {
        let offset = self.runtime.vm_config().const_method_constants_offset;
        let pool = self.runtime.boundary().read_u64(self.const_method + offset)?;
        self.runtime.constant_pool(pool)
    }

    fn utf8_at_u2(&self, offset: u64) -> VmciResult<String> {
        let index = self.runtime.boundary().read_u16(self.const_method + offset)?;
        self.constant_pool()?.lookup_utf8(index as i32)
    }

    /// Method name
    pub fn name(&self) -> VmciResult<&str> {
        self.name
            .get_or_try_init(|| {
                self.utf8_at_u2(self.runtime.vm_config().const_method_name_index_offset)
            })
            .map(String::as_str)
    }

    /// Method descriptor
    pub fn signature(&self) -> VmciResult<&Signature> {
        self.signature.get_or_try_init(|| {
            let descriptor =
                self.utf8_at_u2(self.runtime.vm_config().const_method_signature_index_offset)?;
            Ok(Signature::parse(&descriptor)?)
        })
    }

    /// Number of bytecode bytes
    pub fn code_size(&self) -> VmciResult<usize> {
        let offset = self.runtime.vm_config().const_method_code_size_offset;
        Ok(self.runtime.boundary().read_u16(self.const_method + offset)? as usize)
    }

    /// Bytecodes, which follow the `ConstMethod` header
    pub fn code(&self) -> VmciResult<Vec<u8>> {
        let size = self.code_size()?;
        let start = self.const_method + self.runtime.vm_config().const_method_size;
        Ok(self.runtime.boundary().read_bytes(start, size)?)
    }

    /// Access flags
    pub fn access_flags(&self) -> VmciResult<u32> {
        let offset = self.runtime.vm_config().method_access_flags_offset;
        Ok(self.runtime.boundary().read_u32(self.method + offset)?)
    }

    /// Whether the method is static
    pub fn is_static(&self) -> VmciResult<bool> {
        Ok(self.access_flags()? & ACC_STATIC != 0)
    }

    /// The `MethodData*`, if the method has been profiled
    pub fn method_data_pointer(&self) -> VmciResult<Option<u64>> {
        let offset = self.runtime.vm_config().method_data_offset;
        let pointer = self.runtime.boundary().read_u64(self.method + offset)?;
        Ok((pointer != 0).then_some(pointer))
    }

    /// Profile of this method. Methods without a profile get the neutral
    /// defaults.
    pub fn profiling_info(&self) -> VmciResult<ProfilingInfo> {
        match self.method_data_pointer()? {
            Some(method_data) => {
                ProfilingInfo::load(self.runtime.clone(), method_data, self.code_size()?)
            }
            None => Ok(ProfilingInfo::default_for(&self.runtime, self.code_size()?)),
        }
    }

    /// Speculation log backed by the failed-speculation list of this method
    pub fn speculation_log(&self) -> VmciResult<Arc<SpeculationLog>> {
        self.speculation_log
            .get_or_try_init(|| {
                SpeculationLog::for_method(self.runtime.clone(), self.method).map(Arc::new)
            })
            .cloned()
    }

    /// Resolve the return type against the holder's class loader
    pub fn return_type(&self) -> VmciResult<JavaType> {
        let signature = self.signature()?;
        self.runtime
            .lookup_type(signature.return_type(), Some(&self.holder), false)
    }
}

impl PartialEq for ResolvedJavaMethod {
    fn eq(&self, other: &Self) -> bool {
        self.method == other.method
    }
}

impl Eq for ResolvedJavaMethod {}

impl fmt::Debug for ResolvedJavaMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedJavaMethod")
            .field("method", &format_args!("{:#x}", self.method))
            .field("holder", &self.holder)
            .field("name", &self.name.get())
            .finish()
    }
}

impl Drop for ResolvedJavaMethod {
    fn drop(&mut self) {
        self.runtime.methods().remove_dead(self.method);
    }
}

// ============================================================================
// JavaMethod
// ============================================================================

/// A method reference that may not be linked yet
#[derive(Debug, Clone)]
pub enum JavaMethod {
    /// A linked method
    Resolved(Arc<ResolvedJavaMethod>),
    /// A method known only by holder, name and descriptor
    Unresolved {
        /// Declaring class as named by the reference
        holder: JavaType,
        /// Method name
        name: String,
        /// Method descriptor
        signature: Signature,
    },
}

impl JavaMethod {
    /// Method name
    pub fn name(&self) -> VmciResult<String> {
        match self {
            JavaMethod::Resolved(method) => Ok(method.name()?.to_string()),
            JavaMethod::Unresolved { name, .. } => Ok(name.clone()),
        }
    }

    /// Whether the method is linked
    pub fn is_resolved(&self) -> bool {
        matches!(self, JavaMethod::Resolved(_))
    }

    /// The linked method, if any
    pub fn as_resolved(&self) -> Option<&Arc<ResolvedJavaMethod>> {
        match self {
            JavaMethod::Resolved(method) => Some(method),
            JavaMethod::Unresolved { .. } => None,
        }
    }
}
