//! Constant pool decoding
//!
//! Plain entries (numbers, Utf8 symbols, the uncached halves of member
//! references) are read directly from the pool's memory. Anything that needs
//! linkage state goes through the [`VmBoundary`](vmci_sdk::VmBoundary).
//!
//! Operations that take an `opcode` interpret their index as the operand of
//! that instruction; see [`index`] for the encodings.

pub mod index;
mod tags;

pub use tags::JvmConstant;

use super::{
    JavaConstant, JavaField, JavaMethod, JavaType, MetadataError, Opcode, PrimitiveConstant,
    ResolvedJavaMethod, ResolvedJavaType, Signature,
};
use crate::config::VmConfig;
use crate::handles::{Cleaner, CleanupAction};
use crate::runtime::VmciRuntime;
use crate::VmciResult;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use vmci_sdk::{RawConstant, VmBoundary};

/// Result of [`ConstantPool::lookup_constant`]
#[derive(Debug, Clone)]
pub enum PoolConstant {
    /// A loadable value
    Value(JavaConstant),
    /// A class entry
    Type(JavaType),
}

/// A `ConstantPool*` with its decoding operations
pub struct ConstantPool {
    runtime: Arc<VmciRuntime>,
    pool: u64,
    handle: Cleaner,
    /// Last resolved class lookup, keyed by constant pool index
    last_lookup_type: Mutex<Option<(i32, Weak<ResolvedJavaType>)>>,
}

impl ConstantPool {
    pub(crate) fn new(runtime: Arc<VmciRuntime>, pool: u64) -> VmciResult<Self> {
        if pool == 0 {
            return Err(MetadataError::NullPointer("ConstantPool").into());
        }
        let boundary = runtime.boundary().clone();
        let raw = boundary.acquire_metadata_handle(pool)?;
        Ok(Self {
            runtime,
            pool,
            handle: Cleaner::new(boundary, CleanupAction::ReleaseMetadataHandle(raw)),
            last_lookup_type: Mutex::new(None),
        })
    }

    fn config(&self) -> &VmConfig {
        self.runtime.vm_config()
    }

    fn boundary(&self) -> &dyn VmBoundary {
        self.runtime.boundary().as_ref()
    }

    /// The `ConstantPool*`
    pub fn pool_pointer(&self) -> u64 {
        self.pool
    }

    /// Metadata handle keeping the pool alive
    pub fn metadata_handle(&self) -> &Cleaner {
        &self.handle
    }

    /// Number of entries, including the unused entry 0
    pub fn length(&self) -> VmciResult<i32> {
        let offset = self.config().constant_pool_length_offset;
        Ok(self.boundary().read_i32(self.pool + offset)?)
    }

    fn holder_pointer(&self) -> VmciResult<u64> {
        let offset = self.config().constant_pool_holder_offset;
        Ok(self.boundary().read_u64(self.pool + offset)?)
    }

    /// Class owning this pool
    pub fn holder(&self) -> VmciResult<Arc<ResolvedJavaType>> {
        self.runtime.resolve_type(self.holder_pointer()?)
    }

    fn accessing_class(&self) -> VmciResult<Option<Arc<ResolvedJavaType>>> {
        match self.holder_pointer()? {
            0 => Ok(None),
            klass => Ok(Some(self.runtime.resolve_type(klass)?)),
        }
    }

    // ========================================================================
    // Raw entries
    // ========================================================================

    fn check_index(&self, index: i32) -> VmciResult<()> {
        let length = self.length()?;
        if index < 0 || index >= length {
            return Err(MetadataError::IndexOutOfBounds { index, length }.into());
        }
        Ok(())
    }

    /// Tag byte of an entry
    pub fn raw_tag_at(&self, index: i32) -> VmciResult<u8> {
        self.check_index(index)?;
        let config = self.config();
        let tags = self
            .boundary()
            .read_u64(self.pool + config.constant_pool_tags_offset)?;
        Ok(self
            .boundary()
            .read_u8(tags + config.array_u1_data_offset + index as u64)?)
    }

    /// Kind of an entry. `None` for the invalid tag, which marks entry 0 and
    /// the second slot of a long or double.
    pub fn tag_at(&self, index: i32) -> VmciResult<Option<JvmConstant>> {
        let tag = self.raw_tag_at(index)?;
        let tags = &self.config().jvm_constants;
        if tag == tags.invalid {
            return Ok(None);
        }
        JvmConstant::from_tag(tag, tags)
            .map(Some)
            .ok_or_else(|| MetadataError::UnknownConstantTag { index, tag }.into())
    }

    fn expect_tag(
        &self,
        index: i32,
        expected: &'static str,
        accept: impl Fn(JvmConstant) -> bool,
    ) -> VmciResult<JvmConstant> {
        match self.tag_at(index)? {
            Some(tag) if accept(tag) => Ok(tag),
            _ => Err(MetadataError::UnexpectedTag {
                index,
                expected,
                actual: self.raw_tag_at(index)?,
            }
            .into()),
        }
    }

    fn entry_address(&self, index: i32) -> u64 {
        let config = self.config();
        self.pool + config.constant_pool_size + index as u64 * config.word_size
    }

    fn entry_word(&self, index: i32) -> VmciResult<u64> {
        Ok(self.boundary().read_u64(self.entry_address(index))?)
    }

    /// Value of an Integer entry
    pub fn int_at(&self, index: i32) -> VmciResult<i32> {
        self.expect_tag(index, "Integer", |t| t == JvmConstant::Integer)?;
        Ok(self.boundary().read_i32(self.entry_address(index))?)
    }

    /// Value of a Long entry
    pub fn long_at(&self, index: i32) -> VmciResult<i64> {
        self.expect_tag(index, "Long", |t| t == JvmConstant::Long)?;
        Ok(self.boundary().read_i64(self.entry_address(index))?)
    }

    /// Value of a Float entry
    pub fn float_at(&self, index: i32) -> VmciResult<f32> {
        self.expect_tag(index, "Float", |t| t == JvmConstant::Float)?;
        Ok(f32::from_bits(
            self.boundary().read_u32(self.entry_address(index))?,
        ))
    }

    /// Value of a Double entry
    pub fn double_at(&self, index: i32) -> VmciResult<f64> {
        self.expect_tag(index, "Double", |t| t == JvmConstant::Double)?;
        Ok(f64::from_bits(
            self.boundary().read_u64(self.entry_address(index))?,
        ))
    }

    /// Text of a Utf8 entry
    pub fn lookup_utf8(&self, index: i32) -> VmciResult<String> {
        self.expect_tag(index, "Utf8", |t| t == JvmConstant::Utf8)?;
        let symbol = self.entry_word(index)?;
        Ok(self.boundary().get_symbol(symbol)?)
    }

    /// Method descriptor stored in a Utf8 entry
    pub fn lookup_signature(&self, index: i32) -> VmciResult<Signature> {
        Ok(Signature::parse(&self.lookup_utf8(index)?)?)
    }

    /// Class index of a member reference, read from the pool itself
    pub fn uncached_klass_ref_index_at(&self, index: i32) -> VmciResult<i32> {
        self.expect_tag(index, "member reference", JvmConstant::is_member_ref)?;
        Ok((self.entry_word(index)? & 0xFFFF) as i32)
    }

    /// NameAndType index of a member reference or dynamic entry, read from the
    /// pool itself
    pub fn uncached_name_and_type_ref_index_at(&self, index: i32) -> VmciResult<i32> {
        self.expect_tag(index, "member reference", |t| {
            t.is_member_ref() || matches!(t, JvmConstant::InvokeDynamic | JvmConstant::Dynamic)
        })?;
        Ok(((self.entry_word(index)? >> 16) & 0xFFFF) as i32)
    }

    /// Name index of a NameAndType entry
    pub fn name_ref_index_at(&self, index: i32) -> VmciResult<i32> {
        self.expect_tag(index, "NameAndType", |t| t == JvmConstant::NameAndType)?;
        Ok((self.entry_word(index)? & 0xFFFF) as i32)
    }

    /// Descriptor index of a NameAndType entry
    pub fn signature_ref_index_at(&self, index: i32) -> VmciResult<i32> {
        self.expect_tag(index, "NameAndType", |t| t == JvmConstant::NameAndType)?;
        Ok(((self.entry_word(index)? >> 16) & 0xFFFF) as i32)
    }

    // ========================================================================
    // Linked entries
    // ========================================================================

    /// Class index of the member reference at `which`, which may be a cache
    /// index
    pub fn klass_ref_index_at(&self, which: i32) -> VmciResult<i32> {
        Ok(self.boundary().lookup_klass_ref_index(self.pool, which)?)
    }

    /// NameAndType index of the member reference at `which`
    pub fn name_and_type_ref_index_at(&self, which: i32) -> VmciResult<i32> {
        Ok(self
            .boundary()
            .lookup_name_and_type_ref_index(self.pool, which)?)
    }

    /// Member name of the reference at `which`
    pub fn lookup_name(&self, which: i32) -> VmciResult<String> {
        Ok(self.boundary().lookup_name_in_pool(self.pool, which)?)
    }

    /// Member descriptor of the reference at `which`
    pub fn lookup_member_signature(&self, which: i32) -> VmciResult<String> {
        Ok(self.boundary().lookup_signature_in_pool(self.pool, which)?)
    }

    /// Tagged cache index for the operand of `opcode`
    pub fn raw_index_to_cache_index(&self, raw: i32, opcode: Opcode) -> VmciResult<i32> {
        let tag = self.config().constant_pool_cp_cache_index_tag;
        Ok(index::raw_index_to_cache_index(raw, opcode, tag)?)
    }

    /// Instruction operand for a tagged cache index
    pub fn cache_index_to_raw_index(&self, index: i32, opcode: Opcode) -> VmciResult<i32> {
        let tag = self.config().constant_pool_cp_cache_index_tag;
        Ok(index::cache_index_to_raw_index(index, opcode, tag)?)
    }

    /// Constant pool index behind a tagged cache index
    pub fn remap_from_cache(&self, index: i32) -> VmciResult<i32> {
        Ok(self
            .boundary()
            .remap_instruction_operand_from_cache(self.pool, index)?)
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Loadable constant at `index`
    pub fn lookup_constant(&self, index: i32) -> VmciResult<PoolConstant> {
        let tag = self.raw_tag_at(index)?;
        let kind = JvmConstant::from_tag(tag, &self.config().jvm_constants);
        let value = match kind {
            Some(JvmConstant::Integer) => PrimitiveConstant::Int(self.int_at(index)?),
            Some(JvmConstant::Long) => PrimitiveConstant::Long(self.long_at(index)?),
            Some(JvmConstant::Float) => PrimitiveConstant::Float(self.float_at(index)?),
            Some(JvmConstant::Double) => PrimitiveConstant::Double(self.double_at(index)?),
            Some(c) if c.is_class() => return Ok(PoolConstant::Type(self.lookup_type(index, None)?)),
            Some(c) if c.is_cached_object() => {
                let raw = self
                    .boundary()
                    .resolve_possibly_cached_constant(self.pool, index)?;
                return Ok(PoolConstant::Value(self.runtime.wrap_constant(raw)?));
            }
            _ => return Err(MetadataError::UnknownConstantTag { index, tag }.into()),
        };
        Ok(PoolConstant::Value(JavaConstant::Primitive(value)))
    }

    /// Class named by the Class entry at `index`, without loading it.
    ///
    /// `opcode` is accepted for symmetry with the other lookups; class entries
    /// are always addressed by plain index.
    pub fn lookup_type(&self, index: i32, _opcode: Option<Opcode>) -> VmciResult<JavaType> {
        {
            let last = self.last_lookup_type.lock();
            if let Some((last_index, ty)) = last.as_ref() {
                if *last_index == index {
                    if let Some(ty) = ty.upgrade() {
                        return Ok(JavaType::Resolved(ty));
                    }
                }
            }
        }
        let klass = self.boundary().lookup_klass_in_pool(self.pool, index)?;
        let ty = self.runtime.java_type(klass)?;
        if let JavaType::Resolved(resolved) = &ty {
            *self.last_lookup_type.lock() = Some((index, Arc::downgrade(resolved)));
        }
        Ok(ty)
    }

    /// Class an instruction refers to: the operand class of a type
    /// instruction, or the holder named by a member reference
    pub fn lookup_referenced_type(&self, index: i32, opcode: Opcode) -> VmciResult<JavaType> {
        let cpi = if opcode.takes_plain_index() {
            index
        } else if opcode.references_member() {
            let which = self.raw_index_to_cache_index(index, opcode)?;
            self.klass_ref_index_at(which)?
        } else {
            return Err(MetadataError::UnexpectedOpcode(opcode).into());
        };
        self.lookup_type(cpi, Some(opcode))
    }

    /// Method invoked by the instruction with operand `index`
    pub fn lookup_method(&self, index: i32, opcode: Opcode) -> VmciResult<JavaMethod> {
        let which = self.raw_index_to_cache_index(index, opcode)?;
        if let Some(method) =
            self.boundary()
                .lookup_method_in_pool(self.pool, which, opcode.to_u8())?
        {
            return Ok(JavaMethod::Resolved(self.runtime.resolve_method(method)?));
        }

        let name = self.lookup_name(which)?;
        let signature = Signature::parse(&self.lookup_member_signature(which)?)?;
        let holder = if opcode == Opcode::InvokeDynamic {
            self.runtime.method_handle_class()?
        } else {
            self.lookup_type(self.klass_ref_index_at(which)?, Some(opcode))?
        };
        Ok(JavaMethod::Unresolved {
            holder,
            name,
            signature,
        })
    }

    /// Field accessed by the instruction with operand `index`.
    ///
    /// Linkage failures are not errors: the field is returned unresolved so
    /// the compiler can emit a deoptimization instead.
    pub fn lookup_field(
        &self,
        index: i32,
        method: Option<&ResolvedJavaMethod>,
        opcode: Opcode,
    ) -> VmciResult<JavaField> {
        let which = self.raw_index_to_cache_index(index, opcode)?;
        let name_and_type = self.name_and_type_ref_index_at(which)?;
        let type_name = self.lookup_utf8(self.signature_ref_index_at(name_and_type)?)?;
        let accessing = self.accessing_class()?;
        let field_type = self
            .runtime
            .lookup_type(&type_name, accessing.as_ref(), false)?;
        let holder = self.lookup_type(self.klass_ref_index_at(which)?, Some(opcode))?;
        let name = self.lookup_utf8(self.name_ref_index_at(name_and_type)?)?;

        if holder.is_resolved() {
            let linked = self.boundary().resolve_field_in_pool(
                self.pool,
                which,
                method.map(ResolvedJavaMethod::method_pointer),
                opcode.to_u8(),
            );
            match linked {
                Ok(info) => {
                    let declaring = self.runtime.resolve_type(info.holder)?;
                    return Ok(JavaField::Resolved(declaring.create_field(
                        name,
                        field_type,
                        info.offset,
                        info.flags,
                        info.index,
                    )));
                }
                Err(error) => {
                    tracing::debug!(%error, index, field = %name, "field linkage failed");
                }
            }
        }
        Ok(JavaField::Unresolved {
            holder,
            name,
            field_type,
        })
    }

    /// Appendix argument of a linked invokedynamic or invokehandle site
    pub fn lookup_appendix(&self, index: i32, opcode: Opcode) -> VmciResult<Option<JavaConstant>> {
        let which = self.raw_index_to_cache_index(index, opcode)?;
        match self.boundary().lookup_appendix_in_pool(self.pool, which)? {
            RawConstant::Null => Ok(None),
            raw => Ok(Some(self.runtime.wrap_constant(raw)?)),
        }
    }

    /// Make sure the class an instruction refers to is loaded, and optionally
    /// initialized. Also links signature-polymorphic call sites and
    /// invokedynamic call sites.
    pub fn load_referenced_type(&self, index: i32, opcode: Opcode, initialize: bool) -> VmciResult<()> {
        let tag = self.config().constant_pool_cp_cache_index_tag;
        let cpi = if opcode.takes_plain_index() {
            index
        } else if opcode == Opcode::InvokeDynamic {
            self.remap_from_cache(index::decode_cache_index(index, tag) + tag)?
        } else if opcode.references_member() {
            self.remap_from_cache(self.raw_index_to_cache_index(index, opcode)?)?
        } else {
            return Err(MetadataError::UnexpectedOpcode(opcode).into());
        };

        let Some(kind) = self.tag_at(cpi)? else {
            return Ok(());
        };
        match kind {
            JvmConstant::Methodref | JvmConstant::Fieldref | JvmConstant::InterfaceMethodref => {
                let klass_index = self.uncached_klass_ref_index_at(cpi)?;
                // Read the class tag once; resolution may rewrite it.
                let klass_tag = self.tag_at(klass_index)?;
                if klass_tag != Some(JvmConstant::UnresolvedClass) {
                    return Ok(());
                }
                let klass = self.boundary().resolve_type_in_pool(self.pool, klass_index)?;
                let ty = self.runtime.resolve_type(klass)?;
                if initialize && !ty.is_array()? {
                    ty.initialize()?;
                }
                if kind == JvmConstant::Methodref
                    && opcode.is_invoke_handle_alias()
                    && ty.is_signature_polymorphic_holder()?
                {
                    let which = self.raw_index_to_cache_index(index, opcode)?;
                    let target = self.remap_from_cache(which)?;
                    self.expect_tag(target, "Methodref", |t| t == JvmConstant::Methodref)?;
                    self.boundary()
                        .resolve_invoke_handle_in_pool(self.pool, which)?;
                }
            }
            JvmConstant::InvokeDynamic => {
                if index::is_invokedynamic_index(index) {
                    self.boundary()
                        .resolve_invoke_dynamic_in_pool(self.pool, index)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl PartialEq for ConstantPool {
    fn eq(&self, other: &Self) -> bool {
        self.pool == other.pool
    }
}

impl Eq for ConstantPool {}

impl fmt::Debug for ConstantPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantPool")
            .field("pool", &format_args!("{:#x}", self.pool))
            .finish()
    }
}

impl Drop for ConstantPool {
    fn drop(&mut self) {
        self.runtime.pools().remove_dead(self.pool);
    }
}
