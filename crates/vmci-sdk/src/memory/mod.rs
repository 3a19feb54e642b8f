//! In-process VM backed by byte regions
//!
//! [`MemoryVm`] implements [`VmBoundary`] over a sparse address space. Metadata
//! structures are written into it by the builders in [`image`] using the
//! reference layout in [`layout`], and the VM-side queries (linkage, sizes,
//! maturity, failed speculations) are answered from models the builders
//! register alongside the raw bytes.
//!
//! All state sits behind one `RwLock`, so a `MemoryVm` can be shared between
//! compiler threads.

pub mod image;
pub mod layout;

use crate::boundary::VmBoundary;
use crate::error::{BoundaryError, BoundaryResult};
use crate::types::{
    ConfigTable, ConfigValue, HostObject, KlassRef, RawConstant, RawObject, ResolvedFieldInfo,
    VmFlag,
};
use layout::{StandardLayout, CPCACHE_INDEX_TAG};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use image::{ConstantPoolBuilder, KlassBuilder, MethodBuilder, MethodDataBuilder};

const FIRST_ADDRESS: u64 = 0x1_0000;
const ALIGNMENT: u64 = 16;

/// VM-side model of one constant pool
#[derive(Debug, Default)]
pub(crate) struct PoolModel {
    pub(crate) tags_address: u64,
    pub(crate) tags: Vec<u8>,
    pub(crate) words: Vec<i64>,
    pub(crate) utf8: FxHashMap<i32, String>,
    /// Cache slot to constant pool index
    pub(crate) cache: Vec<i32>,
    pub(crate) resolved_constants: FxHashMap<i32, RawConstant>,
    pub(crate) methods: FxHashMap<i32, u64>,
    pub(crate) fields: FxHashMap<i32, ResolvedFieldInfo>,
    pub(crate) appendices: FxHashMap<i32, RawConstant>,
}

impl PoolModel {
    fn slot(&self, which: i32) -> BoundaryResult<i32> {
        let cache_slot = if which < 0 {
            Some(!which)
        } else if which >= CPCACHE_INDEX_TAG {
            Some(which - CPCACHE_INDEX_TAG)
        } else {
            None
        };
        match cache_slot {
            Some(slot) => self.cache.get(slot as usize).copied().ok_or_else(|| {
                BoundaryError::Unresolvable {
                    what: format!("cache index {}", which),
                }
            }),
            None => Ok(which),
        }
    }

    fn tag(&self, cpi: i32) -> BoundaryResult<u8> {
        self.tags
            .get(cpi as usize)
            .copied()
            .ok_or_else(|| BoundaryError::Unresolvable {
                what: format!("constant pool index {}", cpi),
            })
    }

    fn word(&self, cpi: i32) -> BoundaryResult<i64> {
        self.words
            .get(cpi as usize)
            .copied()
            .ok_or_else(|| BoundaryError::Unresolvable {
                what: format!("constant pool index {}", cpi),
            })
    }

    fn utf8_at(&self, cpi: i32) -> BoundaryResult<String> {
        self.utf8
            .get(&cpi)
            .cloned()
            .ok_or_else(|| BoundaryError::Unresolvable {
                what: format!("Utf8 entry {}", cpi),
            })
    }

    fn name_and_type_index(&self, which: i32) -> BoundaryResult<i32> {
        let cpi = self.slot(which)?;
        match self.tag(cpi)? {
            layout::tags::FIELDREF
            | layout::tags::METHODREF
            | layout::tags::INTERFACE_METHODREF
            | layout::tags::INVOKE_DYNAMIC
            | layout::tags::DYNAMIC => Ok(((self.word(cpi)? >> 16) & 0xFFFF) as i32),
            tag => Err(BoundaryError::Unresolvable {
                what: format!("NameAndType of entry {} with tag {}", cpi, tag),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct VmState {
    config: ConfigTable,
    dynamic_flags: FxHashMap<String, ConfigValue>,

    regions: BTreeMap<u64, Vec<u8>>,
    next_address: u64,

    symbols: FxHashMap<u64, String>,
    symbol_ids: FxHashMap<String, u64>,

    metadata_handles: FxHashMap<i64, u64>,
    next_metadata_handle: i64,
    released_metadata_handles: Vec<i64>,

    global_handles: FxHashMap<i64, HostObject>,
    next_global_handle: i64,
    deleted_handles: Vec<i64>,
    double_deletes: usize,

    profile_sizes: FxHashMap<(u64, i32), i32>,
    mature: FxHashMap<u64, bool>,

    pools: FxHashMap<u64, PoolModel>,
    types_by_name: FxHashMap<String, u64>,
    init_requests: Vec<u64>,
    invoke_handle_resolutions: Vec<(u64, i32)>,
    invoke_dynamic_resolutions: Vec<(u64, i32)>,

    failed_speculations: FxHashMap<u64, Vec<Vec<u8>>>,
    method_speculation_lists: FxHashMap<u64, u64>,
    released_speculation_lists: Vec<u64>,
}

impl VmState {
    fn allocate(&mut self, size: usize) -> u64 {
        let address = self.next_address;
        let padded = (size as u64).max(1).div_ceil(ALIGNMENT) * ALIGNMENT;
        self.next_address += padded + ALIGNMENT;
        self.regions.insert(address, vec![0; size.max(1)]);
        address
    }

    fn allocate_with(&mut self, data: &[u8]) -> u64 {
        let address = self.allocate(data.len());
        if let Some(bytes) = self.regions.get_mut(&address) {
            bytes[..data.len()].copy_from_slice(data);
        }
        address
    }

    fn region(&self, address: u64, len: usize) -> BoundaryResult<(&Vec<u8>, usize)> {
        let invalid = BoundaryError::InvalidAddress { address, len };
        let (base, bytes) = self.regions.range(..=address).next_back().ok_or(invalid.clone())?;
        let start = (address - base) as usize;
        if start + len > bytes.len() {
            return Err(invalid);
        }
        Ok((bytes, start))
    }

    fn write(&mut self, address: u64, data: &[u8]) -> BoundaryResult<()> {
        let invalid = BoundaryError::InvalidAddress {
            address,
            len: data.len(),
        };
        let (base, bytes) = self
            .regions
            .range_mut(..=address)
            .next_back()
            .ok_or(invalid.clone())?;
        let start = (address - *base) as usize;
        if start + data.len() > bytes.len() {
            return Err(invalid);
        }
        bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn intern(&mut self, text: &str) -> u64 {
        if let Some(&symbol) = self.symbol_ids.get(text) {
            return symbol;
        }
        // Symbol bodies are never read directly; the bytes are kept for dumps.
        let symbol = self.allocate_with(text.as_bytes());
        self.symbols.insert(symbol, text.to_string());
        self.symbol_ids.insert(text.to_string(), symbol);
        symbol
    }

    fn new_handle(&mut self, object: HostObject) -> i64 {
        let handle = self.next_global_handle;
        self.next_global_handle += 1;
        self.global_handles.insert(handle, object);
        handle
    }

    /// Copy of a stored constant whose object handle, if any, is a fresh
    /// global handle owned by the caller
    fn export(&mut self, constant: RawConstant) -> BoundaryResult<RawConstant> {
        match constant {
            RawConstant::Object(RawObject::Handle { handle, compressed }) => {
                let object = self
                    .global_handles
                    .get(&handle)
                    .cloned()
                    .ok_or(BoundaryError::UnknownHandle(handle))?;
                Ok(RawConstant::Object(RawObject::Handle {
                    handle: self.new_handle(object),
                    compressed,
                }))
            }
            other => Ok(other),
        }
    }

    fn pool(&self, pool: u64) -> BoundaryResult<&PoolModel> {
        self.pools
            .get(&pool)
            .ok_or(BoundaryError::UnknownConstantPool(pool))
    }
}

/// A VM living entirely in process memory
#[derive(Debug)]
pub struct MemoryVm {
    state: RwLock<VmState>,
}

impl MemoryVm {
    /// Create a VM publishing the reference layout
    pub fn new() -> Self {
        Self::with_layout(StandardLayout::new())
    }

    /// Create a VM publishing a customized reference layout
    pub fn with_layout(layout: StandardLayout) -> Self {
        Self::with_config(layout.config_table())
    }

    /// Create a VM publishing an arbitrary configuration table
    pub fn with_config(config: ConfigTable) -> Self {
        let state = VmState {
            config,
            next_address: FIRST_ADDRESS,
            next_metadata_handle: 1,
            next_global_handle: 1,
            ..Default::default()
        };
        MemoryVm {
            state: RwLock::new(state),
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Set a flag in the startup table, replacing any previous value
    pub fn set_flag(&self, name: &str, value: ConfigValue) {
        let mut state = self.state.write();
        let flags = &mut state.config.flags;
        match flags.iter_mut().find(|f| f.name == name) {
            Some(flag) => flag.value = value,
            None => flags.push(VmFlag {
                name: name.to_string(),
                type_name: value.kind_name().to_string(),
                value,
            }),
        }
    }

    /// Register a flag answered only through on-demand queries
    pub fn set_dynamic_flag(&self, name: &str, value: ConfigValue) {
        self.state
            .write()
            .dynamic_flags
            .insert(name.to_string(), value);
    }

    /// Current integral value of a startup flag
    pub fn flag_i64(&self, name: &str) -> Option<i64> {
        let state = self.state.read();
        state.config.flags.iter().find(|f| f.name == name).and_then(|f| match f.value {
            ConfigValue::Long(v) => Some(v),
            _ => None,
        })
    }

    /// Apply an arbitrary edit to the startup table
    pub fn edit_config(&self, edit: impl FnOnce(&mut ConfigTable)) {
        edit(&mut self.state.write().config);
    }

    // ========================================================================
    // Memory
    // ========================================================================

    /// Allocate a zeroed region
    pub fn allocate(&self, size: usize) -> u64 {
        self.state.write().allocate(size)
    }

    /// Overwrite bytes in an allocated region
    pub fn write_bytes(&self, address: u64, data: &[u8]) -> BoundaryResult<()> {
        self.state.write().write(address, data)
    }

    /// Write a byte
    pub fn write_u8(&self, address: u64, value: u8) -> BoundaryResult<()> {
        self.write_bytes(address, &[value])
    }

    /// Write a little-endian u16
    pub fn write_u16(&self, address: u64, value: u16) -> BoundaryResult<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write a little-endian u32
    pub fn write_u32(&self, address: u64, value: u32) -> BoundaryResult<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write a little-endian i32
    pub fn write_i32(&self, address: u64, value: i32) -> BoundaryResult<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Write a little-endian u64
    pub fn write_u64(&self, address: u64, value: u64) -> BoundaryResult<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    /// Intern a symbol and return its address
    pub fn intern_symbol(&self, text: &str) -> u64 {
        self.state.write().intern(text)
    }

    // ========================================================================
    // Handles
    // ========================================================================

    /// Create a global handle to a host object
    pub fn new_global_handle(&self, object: HostObject) -> i64 {
        self.state.write().new_handle(object)
    }

    /// Object behind a live global handle
    pub fn host_object(&self, handle: i64) -> Option<HostObject> {
        self.state.read().global_handles.get(&handle).cloned()
    }

    /// Every handle passed to `delete_global_handle`, in call order
    pub fn deleted_handles(&self) -> Vec<i64> {
        self.state.read().deleted_handles.clone()
    }

    /// Number of deletions of handles that were already deleted or never existed
    pub fn double_deletes(&self) -> usize {
        self.state.read().double_deletes
    }

    /// Number of live global handles
    pub fn live_global_handles(&self) -> usize {
        self.state.read().global_handles.len()
    }

    /// Number of live metadata handles
    pub fn live_metadata_handles(&self) -> usize {
        self.state.read().metadata_handles.len()
    }

    /// Every metadata handle released so far
    pub fn released_metadata_handles(&self) -> Vec<i64> {
        self.state.read().released_metadata_handles.clone()
    }

    // ========================================================================
    // Profiling oracles
    // ========================================================================

    /// Mark a profile mature or immature
    pub fn set_mature(&self, method_data: u64, mature: bool) {
        self.state.write().mature.insert(method_data, mature);
    }

    /// Set the size the VM reports for the record at `position`
    pub fn set_profile_size(&self, method_data: u64, position: i32, size: i32) {
        self.state
            .write()
            .profile_sizes
            .insert((method_data, position), size);
    }

    // ========================================================================
    // Linkage
    // ========================================================================

    /// Link a member reference to a method
    pub fn link_method(&self, pool: u64, cpi: i32, method: u64) -> BoundaryResult<()> {
        let mut state = self.state.write();
        let model = state
            .pools
            .get_mut(&pool)
            .ok_or(BoundaryError::UnknownConstantPool(pool))?;
        model.methods.insert(cpi, method);
        Ok(())
    }

    /// Link a field reference
    pub fn link_field(&self, pool: u64, cpi: i32, info: ResolvedFieldInfo) -> BoundaryResult<()> {
        let mut state = self.state.write();
        let model = state
            .pools
            .get_mut(&pool)
            .ok_or(BoundaryError::UnknownConstantPool(pool))?;
        model.fields.insert(cpi, info);
        Ok(())
    }

    /// Attach an appendix to a linked call site
    pub fn set_appendix(&self, pool: u64, cpi: i32, appendix: RawConstant) -> BoundaryResult<()> {
        let mut state = self.state.write();
        let model = state
            .pools
            .get_mut(&pool)
            .ok_or(BoundaryError::UnknownConstantPool(pool))?;
        model.appendices.insert(cpi, appendix);
        Ok(())
    }

    /// Classes passed to `ensure_initialized`
    pub fn init_requests(&self) -> Vec<u64> {
        self.state.read().init_requests.clone()
    }

    /// Calls to `resolve_invoke_handle_in_pool`
    pub fn invoke_handle_resolutions(&self) -> Vec<(u64, i32)> {
        self.state.read().invoke_handle_resolutions.clone()
    }

    /// Calls to `resolve_invoke_dynamic_in_pool`
    pub fn invoke_dynamic_resolutions(&self) -> Vec<(u64, i32)> {
        self.state.read().invoke_dynamic_resolutions.clone()
    }

    /// Failed-speculation lists freed so far
    pub fn released_speculation_lists(&self) -> Vec<u64> {
        self.state.read().released_speculation_lists.clone()
    }

    // ========================================================================
    // Builder plumbing
    // ========================================================================

    pub(crate) fn register_type(&self, name: &str, klass: u64) {
        self.state
            .write()
            .types_by_name
            .insert(name.to_string(), klass);
    }

    pub(crate) fn register_pool(&self, pool: u64, model: PoolModel) {
        self.state.write().pools.insert(pool, model);
    }

    pub(crate) fn register_profile_sizes(&self, method_data: u64, sizes: &[(i32, i32)]) {
        let mut state = self.state.write();
        for &(position, size) in sizes {
            state.profile_sizes.insert((method_data, position), size);
        }
    }

    fn set_pool_entry(&self, pool: u64, cpi: i32, tag: u8, word: i64) -> BoundaryResult<()> {
        let mut state = self.state.write();
        let tags_address = {
            let model = state
                .pools
                .get_mut(&pool)
                .ok_or(BoundaryError::UnknownConstantPool(pool))?;
            model.tags[cpi as usize] = tag;
            model.words[cpi as usize] = word;
            model.tags_address
        };
        state.write(tags_address + layout::pool::ARRAY_DATA + cpi as u64, &[tag])?;
        state.write(
            pool + layout::pool::SIZE + cpi as u64 * layout::WORD_SIZE,
            &word.to_le_bytes(),
        )
    }
}

impl Default for MemoryVm {
    fn default() -> Self {
        Self::new()
    }
}

fn internal_name(name: &str) -> &str {
    name.strip_prefix('L')
        .and_then(|n| n.strip_suffix(';'))
        .unwrap_or(name)
}

fn descriptor_name(name: &str) -> String {
    if name.starts_with('[') {
        name.to_string()
    } else {
        format!("L{};", name)
    }
}

impl VmBoundary for MemoryVm {
    fn read_configuration(&self) -> BoundaryResult<ConfigTable> {
        Ok(self.state.read().config.clone())
    }

    fn get_flag_value(&self, name: &str) -> Option<ConfigValue> {
        self.state.read().dynamic_flags.get(name).cloned()
    }

    fn read_bytes(&self, address: u64, len: usize) -> BoundaryResult<Vec<u8>> {
        let state = self.state.read();
        let (bytes, start) = state.region(address, len)?;
        Ok(bytes[start..start + len].to_vec())
    }

    fn get_symbol(&self, symbol: u64) -> BoundaryResult<String> {
        self.state
            .read()
            .symbols
            .get(&symbol)
            .cloned()
            .ok_or(BoundaryError::UnknownSymbol(symbol))
    }

    fn acquire_metadata_handle(&self, metadata: u64) -> BoundaryResult<i64> {
        if metadata == 0 {
            return Err(BoundaryError::InvalidAddress {
                address: 0,
                len: 0,
            });
        }
        let mut state = self.state.write();
        let handle = state.next_metadata_handle;
        state.next_metadata_handle += 1;
        state.metadata_handles.insert(handle, metadata);
        Ok(handle)
    }

    fn release_metadata_handle(&self, handle: i64) {
        let mut state = self.state.write();
        if state.metadata_handles.remove(&handle).is_some() {
            state.released_metadata_handles.push(handle);
        }
    }

    fn delete_global_handle(&self, handle: i64) {
        let mut state = self.state.write();
        state.deleted_handles.push(handle);
        if state.global_handles.remove(&handle).is_none() {
            state.double_deletes += 1;
            tracing::warn!(handle, "delete of unknown global handle");
        }
    }

    fn objects_equal(&self, a: i64, b: i64) -> BoundaryResult<bool> {
        let state = self.state.read();
        let lhs = state
            .global_handles
            .get(&a)
            .ok_or(BoundaryError::UnknownHandle(a))?;
        let rhs = state
            .global_handles
            .get(&b)
            .ok_or(BoundaryError::UnknownHandle(b))?;
        Ok(Arc::ptr_eq(lhs, rhs))
    }

    fn method_data_profile_data_size(
        &self,
        method_data: u64,
        position: i32,
    ) -> BoundaryResult<i32> {
        self.state
            .read()
            .profile_sizes
            .get(&(method_data, position))
            .copied()
            .ok_or_else(|| BoundaryError::Unresolvable {
                what: format!("profile record at {} of {:#x}", position, method_data),
            })
    }

    fn is_mature(&self, method_data: u64) -> BoundaryResult<bool> {
        Ok(self
            .state
            .read()
            .mature
            .get(&method_data)
            .copied()
            .unwrap_or(false))
    }

    fn lookup_type(
        &self,
        name: &str,
        _accessing: Option<u64>,
        resolve: bool,
    ) -> BoundaryResult<Option<u64>> {
        let found = self
            .state
            .read()
            .types_by_name
            .get(internal_name(name))
            .copied();
        match found {
            None if resolve => Err(BoundaryError::Unresolvable {
                what: format!("class {}", name),
            }),
            found => Ok(found),
        }
    }

    fn ensure_initialized(&self, klass: u64) -> BoundaryResult<()> {
        let mut state = self.state.write();
        state.init_requests.push(klass);
        state.write(
            klass + layout::klass::INIT_STATE,
            &[layout::klass::FULLY_INITIALIZED],
        )
    }

    fn resolve_possibly_cached_constant(&self, pool: u64, cpi: i32) -> BoundaryResult<RawConstant> {
        let mut state = self.state.write();
        let constant = state
            .pool(pool)?
            .resolved_constants
            .get(&cpi)
            .cloned()
            .ok_or_else(|| BoundaryError::Unresolvable {
                what: format!("constant {}", cpi),
            })?;
        state.export(constant)
    }

    fn lookup_klass_in_pool(&self, pool: u64, cpi: i32) -> BoundaryResult<KlassRef> {
        let state = self.state.read();
        let model = state.pool(pool)?;
        match model.tag(cpi)? {
            layout::tags::CLASS => Ok(KlassRef::Resolved(model.word(cpi)? as u64)),
            layout::tags::UNRESOLVED_CLASS | layout::tags::UNRESOLVED_CLASS_IN_ERROR => {
                let name = model.utf8_at(model.word(cpi)? as i32)?;
                Ok(KlassRef::Unresolved(descriptor_name(&name)))
            }
            tag => Err(BoundaryError::Unresolvable {
                what: format!("class entry {} with tag {}", cpi, tag),
            }),
        }
    }

    fn resolve_type_in_pool(&self, pool: u64, cpi: i32) -> BoundaryResult<u64> {
        let klass = {
            let state = self.state.read();
            let model = state.pool(pool)?;
            match model.tag(cpi)? {
                layout::tags::CLASS => return Ok(model.word(cpi)? as u64),
                layout::tags::UNRESOLVED_CLASS => {
                    let name = model.utf8_at(model.word(cpi)? as i32)?;
                    state.types_by_name.get(&name).copied().ok_or_else(|| {
                        BoundaryError::Unresolvable {
                            what: format!("class {}", name),
                        }
                    })?
                }
                tag => {
                    return Err(BoundaryError::Unresolvable {
                        what: format!("class entry {} with tag {}", cpi, tag),
                    })
                }
            }
        };
        self.set_pool_entry(pool, cpi, layout::tags::CLASS, klass as i64)?;
        Ok(klass)
    }

    fn lookup_method_in_pool(
        &self,
        pool: u64,
        which: i32,
        _opcode: u8,
    ) -> BoundaryResult<Option<u64>> {
        let state = self.state.read();
        let model = state.pool(pool)?;
        let cpi = model.slot(which)?;
        Ok(model.methods.get(&cpi).copied())
    }

    fn resolve_field_in_pool(
        &self,
        pool: u64,
        which: i32,
        _method: Option<u64>,
        _opcode: u8,
    ) -> BoundaryResult<ResolvedFieldInfo> {
        let state = self.state.read();
        let model = state.pool(pool)?;
        let cpi = model.slot(which)?;
        model
            .fields
            .get(&cpi)
            .copied()
            .ok_or_else(|| BoundaryError::Unresolvable {
                what: format!("field reference {}", cpi),
            })
    }

    fn lookup_name_and_type_ref_index(&self, pool: u64, which: i32) -> BoundaryResult<i32> {
        let state = self.state.read();
        state.pool(pool)?.name_and_type_index(which)
    }

    fn lookup_klass_ref_index(&self, pool: u64, which: i32) -> BoundaryResult<i32> {
        let state = self.state.read();
        let model = state.pool(pool)?;
        let cpi = model.slot(which)?;
        match model.tag(cpi)? {
            layout::tags::FIELDREF | layout::tags::METHODREF | layout::tags::INTERFACE_METHODREF => {
                Ok((model.word(cpi)? & 0xFFFF) as i32)
            }
            tag => Err(BoundaryError::Unresolvable {
                what: format!("class of entry {} with tag {}", cpi, tag),
            }),
        }
    }

    fn lookup_name_in_pool(&self, pool: u64, which: i32) -> BoundaryResult<String> {
        let state = self.state.read();
        let model = state.pool(pool)?;
        let nat = model.name_and_type_index(which)?;
        model.utf8_at((model.word(nat)? & 0xFFFF) as i32)
    }

    fn lookup_signature_in_pool(&self, pool: u64, which: i32) -> BoundaryResult<String> {
        let state = self.state.read();
        let model = state.pool(pool)?;
        let nat = model.name_and_type_index(which)?;
        model.utf8_at(((model.word(nat)? >> 16) & 0xFFFF) as i32)
    }

    fn remap_instruction_operand_from_cache(&self, pool: u64, index: i32) -> BoundaryResult<i32> {
        let state = self.state.read();
        state.pool(pool)?.slot(index)
    }

    fn resolve_invoke_dynamic_in_pool(&self, pool: u64, index: i32) -> BoundaryResult<()> {
        let mut state = self.state.write();
        state.pool(pool)?.slot(index)?;
        state.invoke_dynamic_resolutions.push((pool, index));
        Ok(())
    }

    fn resolve_invoke_handle_in_pool(&self, pool: u64, index: i32) -> BoundaryResult<()> {
        let mut state = self.state.write();
        state.pool(pool)?.slot(index)?;
        state.invoke_handle_resolutions.push((pool, index));
        Ok(())
    }

    fn lookup_appendix_in_pool(&self, pool: u64, index: i32) -> BoundaryResult<RawConstant> {
        let mut state = self.state.write();
        let model = state.pool(pool)?;
        let cpi = model.slot(index)?;
        let appendix = model
            .appendices
            .get(&cpi)
            .cloned()
            .unwrap_or(RawConstant::Null);
        state.export(appendix)
    }

    fn allocate_failed_speculations_list(&self) -> BoundaryResult<u64> {
        let mut state = self.state.write();
        let address = state.allocate(layout::WORD_SIZE as usize);
        state.failed_speculations.insert(address, Vec::new());
        Ok(address)
    }

    fn get_failed_speculations_address(&self, method: u64) -> BoundaryResult<u64> {
        let mut state = self.state.write();
        if let Some(&address) = state.method_speculation_lists.get(&method) {
            return Ok(address);
        }
        let address = state.allocate(layout::WORD_SIZE as usize);
        state.failed_speculations.insert(address, Vec::new());
        state.method_speculation_lists.insert(method, address);
        Ok(address)
    }

    fn get_failed_speculations(
        &self,
        address: u64,
        current: &[Vec<u8>],
    ) -> BoundaryResult<Vec<Vec<u8>>> {
        let state = self.state.read();
        match state.failed_speculations.get(&address) {
            Some(list) if list.len() == current.len() => Ok(current.to_vec()),
            Some(list) => Ok(list.clone()),
            None => Ok(Vec::new()),
        }
    }

    fn add_failed_speculation(&self, address: u64, speculation: &[u8]) -> BoundaryResult<bool> {
        let mut state = self.state.write();
        let list = state
            .failed_speculations
            .get_mut(&address)
            .ok_or(BoundaryError::InvalidAddress {
                address,
                len: speculation.len(),
            })?;
        if list.iter().any(|s| s == speculation) {
            return Ok(false);
        }
        list.push(speculation.to_vec());
        Ok(true)
    }

    fn release_failed_speculations(&self, address: u64) {
        let mut state = self.state.write();
        if state.failed_speculations.remove(&address).is_some() {
            state.released_speculation_lists.push(address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_round_trip() {
        let vm = MemoryVm::new();
        let region = vm.allocate(16);
        vm.write_u32(region + 4, 0xDEAD_BEEF).unwrap();
        vm.write_u16(region + 8, 0x1234).unwrap();
        assert_eq!(vm.read_u32(region + 4).unwrap(), 0xDEAD_BEEF);
        assert_eq!(vm.read_u16(region + 8).unwrap(), 0x1234);
        assert_eq!(vm.read_u8(region).unwrap(), 0);
    }

    #[test]
    fn test_out_of_region_read_fails() {
        let vm = MemoryVm::new();
        let region = vm.allocate(8);
        assert!(matches!(
            vm.read_u64(region + 4),
            Err(BoundaryError::InvalidAddress { .. })
        ));
        assert!(vm.read_bytes(1, 1).is_err());
    }

    #[test]
    fn test_global_handle_deletion_tracking() {
        let vm = MemoryVm::new();
        let h = vm.new_global_handle(Arc::new("x".to_string()));
        assert_eq!(vm.live_global_handles(), 1);
        vm.delete_global_handle(h);
        vm.delete_global_handle(h);
        assert_eq!(vm.deleted_handles(), vec![h, h]);
        assert_eq!(vm.double_deletes(), 1);
        assert_eq!(vm.live_global_handles(), 0);
    }

    #[test]
    fn test_objects_equal() {
        let vm = MemoryVm::new();
        let object: HostObject = Arc::new(42u32);
        let a = vm.new_global_handle(object.clone());
        let b = vm.new_global_handle(object);
        let c = vm.new_global_handle(Arc::new(42u32));
        assert!(vm.objects_equal(a, b).unwrap());
        assert!(!vm.objects_equal(a, c).unwrap());
        assert!(vm.objects_equal(a, 99).is_err());
    }

    #[test]
    fn test_symbols_are_interned() {
        let vm = MemoryVm::new();
        let a = vm.intern_symbol("foo");
        assert_eq!(vm.intern_symbol("foo"), a);
        assert_eq!(vm.get_symbol(a).unwrap(), "foo");
        assert_eq!(vm.read_u8(a + 2).unwrap(), b'o');
    }

    #[test]
    fn test_dynamic_flags() {
        let vm = MemoryVm::new();
        assert!(vm.get_flag_value("UseJVMCICompiler").is_none());
        vm.set_dynamic_flag("UseJVMCICompiler", ConfigValue::Bool(true));
        assert_eq!(
            vm.get_flag_value("UseJVMCICompiler"),
            Some(ConfigValue::Bool(true))
        );
    }

    #[test]
    fn test_failed_speculation_lists() {
        let vm = MemoryVm::new();
        let list = vm.allocate_failed_speculations_list().unwrap();
        assert!(vm.add_failed_speculation(list, &[1, 2]).unwrap());
        assert!(!vm.add_failed_speculation(list, &[1, 2]).unwrap());
        assert_eq!(vm.get_failed_speculations(list, &[]).unwrap(), vec![vec![1, 2]]);
        vm.release_failed_speculations(list);
        vm.release_failed_speculations(list);
        assert_eq!(vm.released_speculation_lists(), vec![list]);
    }
}
