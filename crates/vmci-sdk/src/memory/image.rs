//! Builders that lay out VM metadata in a [`MemoryVm`]
//!
//! Each builder writes the raw structure bytes in the reference layout and
//! registers the VM-side model used to answer linkage queries. The profile
//! builder also records the size of every record it writes, which the VM
//! reports back through `method_data_profile_data_size`.

use super::layout::{self, data_layout as dl, klass, mdo, method, pool, tags, WORD_SIZE};
use super::{MemoryVm, PoolModel};
use crate::error::BoundaryResult;
use crate::types::{RawConstant, RawObject};
use rustc_hash::FxHashMap;
use std::sync::Arc;

// ============================================================================
// Klass
// ============================================================================

/// Builder for an `InstanceKlass` or array klass
pub struct KlassBuilder<'a> {
    vm: &'a MemoryVm,
    name: String,
    layout_helper: i32,
    access_flags: u32,
    init_state: u8,
    constant_pool: Option<u64>,
}

impl MemoryVm {
    /// Start a class with an internal name such as `java/lang/String`
    pub fn klass(&self, name: &str) -> KlassBuilder<'_> {
        KlassBuilder {
            vm: self,
            name: name.to_string(),
            layout_helper: 16,
            access_flags: 0x0001,
            init_state: klass::LOADED,
            constant_pool: None,
        }
    }

    /// Start an empty constant pool
    pub fn constant_pool(&self) -> ConstantPoolBuilder<'_> {
        ConstantPoolBuilder {
            vm: self,
            tags: vec![tags::INVALID],
            words: vec![0],
            utf8: FxHashMap::default(),
            cache: Vec::new(),
            resolved_constants: FxHashMap::default(),
            utf8_ids: FxHashMap::default(),
        }
    }

    /// Start a method whose metadata lives in `constant_pool`
    pub fn method(&self, constant_pool: u64) -> MethodBuilder<'_> {
        MethodBuilder {
            vm: self,
            constant_pool,
            name_index: 0,
            signature_index: 0,
            code: Vec::new(),
            access_flags: 0x0001,
        }
    }

    /// Start the profile of `method`
    pub fn method_data(&self, method: u64) -> MethodDataBuilder<'_> {
        let width = |name: &str, default: i64| self.flag_i64(name).unwrap_or(default) as usize;
        MethodDataBuilder {
            vm: self,
            method,
            type_width: width("TypeProfileWidth", layout::TYPE_PROFILE_WIDTH),
            method_width: width("MethodProfileWidth", layout::METHOD_PROFILE_WIDTH),
            bci_width: width("BciProfileWidth", layout::BCI_PROFILE_WIDTH),
            data: Vec::new(),
            extra: Vec::new(),
            extra_free: 0,
            arg_info: None,
            sizes: Vec::new(),
            extra_sizes: Vec::new(),
            trap_hist: [0; layout::TRAP_HISTORY_LENGTH],
            decompiles: 0,
            overflow_recompiles: 0,
            overflow_traps: 0,
            ir_size: 0,
            mature: false,
        }
    }
}

impl<'a> KlassBuilder<'a> {
    /// Make this an array class
    pub fn array(mut self) -> Self {
        self.layout_helper = i32::MIN + 16;
        self
    }

    /// Mark the class fully initialized
    pub fn initialized(mut self) -> Self {
        self.init_state = klass::FULLY_INITIALIZED;
        self
    }

    /// Set access flags
    pub fn access_flags(mut self, flags: u32) -> Self {
        self.access_flags = flags;
        self
    }

    /// Attach a constant pool; the pool's holder is set to this class
    pub fn constant_pool(mut self, constant_pool: u64) -> Self {
        self.constant_pool = Some(constant_pool);
        self
    }

    /// Write the class and return its address
    pub fn build(self) -> BoundaryResult<u64> {
        let vm = self.vm;
        let k = vm.allocate(klass::SIZE);
        let name = vm.intern_symbol(&self.name);
        vm.write_i32(k + klass::LAYOUT_HELPER, self.layout_helper)?;
        vm.write_u64(k + klass::NAME, name)?;
        vm.write_u64(k + klass::CONSTANTS, self.constant_pool.unwrap_or(0))?;
        vm.write_u8(k + klass::INIT_STATE, self.init_state)?;
        vm.write_u32(k + klass::ACCESS_FLAGS, self.access_flags)?;
        if let Some(cp) = self.constant_pool {
            vm.write_u64(cp + pool::HOLDER, k)?;
        }
        vm.register_type(&self.name, k);
        Ok(k)
    }
}

// ============================================================================
// ConstantPool
// ============================================================================

/// Builder for a `ConstantPool`
pub struct ConstantPoolBuilder<'a> {
    vm: &'a MemoryVm,
    tags: Vec<u8>,
    words: Vec<i64>,
    utf8: FxHashMap<i32, String>,
    utf8_ids: FxHashMap<String, i32>,
    cache: Vec<i32>,
    resolved_constants: FxHashMap<i32, RawConstant>,
}

impl<'a> ConstantPoolBuilder<'a> {
    fn push(&mut self, tag: u8, word: i64) -> i32 {
        let cpi = self.tags.len() as i32;
        self.tags.push(tag);
        self.words.push(word);
        cpi
    }

    fn push_wide(&mut self, tag: u8, word: i64) -> i32 {
        let cpi = self.push(tag, word);
        self.push(tags::INVALID, 0);
        cpi
    }

    /// Index of the next entry
    pub fn next_index(&self) -> i32 {
        self.tags.len() as i32
    }

    /// Add a Utf8 entry, reusing an existing one with the same text
    pub fn utf8(&mut self, text: &str) -> i32 {
        if let Some(&cpi) = self.utf8_ids.get(text) {
            return cpi;
        }
        let symbol = self.vm.intern_symbol(text);
        let cpi = self.push(tags::UTF8, symbol as i64);
        self.utf8.insert(cpi, text.to_string());
        self.utf8_ids.insert(text.to_string(), cpi);
        cpi
    }

    /// Add an Integer entry
    pub fn integer(&mut self, value: i32) -> i32 {
        self.push(tags::INTEGER, value as i64)
    }

    /// Add a Float entry
    pub fn float(&mut self, value: f32) -> i32 {
        self.push(tags::FLOAT, value.to_bits() as i64)
    }

    /// Add a Long entry (two slots)
    pub fn long(&mut self, value: i64) -> i32 {
        self.push_wide(tags::LONG, value)
    }

    /// Add a Double entry (two slots)
    pub fn double(&mut self, value: f64) -> i32 {
        self.push_wide(tags::DOUBLE, value.to_bits() as i64)
    }

    /// Add a resolved Class entry
    pub fn class(&mut self, klass: u64) -> i32 {
        self.push(tags::CLASS, klass as i64)
    }

    /// Add an unresolved Class entry naming an internal class name
    pub fn unresolved_class(&mut self, name: &str) -> i32 {
        let name_index = self.utf8(name);
        self.push(tags::UNRESOLVED_CLASS, name_index as i64)
    }

    /// Add a String entry resolved to a global handle of the string
    pub fn string(&mut self, value: &str) -> i32 {
        let symbol = self.vm.intern_symbol(value);
        let handle = self.vm.new_global_handle(Arc::new(value.to_string()));
        let cpi = self.push(tags::STRING, symbol as i64);
        self.resolved_constants.insert(
            cpi,
            RawConstant::Object(RawObject::Handle {
                handle,
                compressed: false,
            }),
        );
        cpi
    }

    /// Add a MethodHandle entry resolving to `value`
    pub fn method_handle(&mut self, value: RawConstant) -> i32 {
        let cpi = self.push(tags::METHOD_HANDLE, 0);
        self.resolved_constants.insert(cpi, value);
        cpi
    }

    /// Add a MethodType entry resolving to `value`
    pub fn method_type(&mut self, value: RawConstant) -> i32 {
        let cpi = self.push(tags::METHOD_TYPE, 0);
        self.resolved_constants.insert(cpi, value);
        cpi
    }

    /// Add a NameAndType entry
    pub fn name_and_type(&mut self, name: &str, signature: &str) -> i32 {
        let name_index = self.utf8(name);
        let signature_index = self.utf8(signature);
        self.push(
            tags::NAME_AND_TYPE,
            ((signature_index as i64) << 16) | name_index as i64,
        )
    }

    /// Add a Dynamic entry resolving to `value`
    pub fn dynamic(&mut self, name: &str, signature: &str, value: RawConstant) -> i32 {
        let nat = self.name_and_type(name, signature);
        let cpi = self.push(tags::DYNAMIC, (nat as i64) << 16);
        self.resolved_constants.insert(cpi, value);
        cpi
    }

    fn member_ref(&mut self, tag: u8, class_index: i32, name: &str, signature: &str) -> i32 {
        let nat = self.name_and_type(name, signature);
        self.push(tag, ((nat as i64) << 16) | class_index as i64)
    }

    /// Add a Fieldref entry
    pub fn field_ref(&mut self, class_index: i32, name: &str, signature: &str) -> i32 {
        self.member_ref(tags::FIELDREF, class_index, name, signature)
    }

    /// Add a Methodref entry
    pub fn method_ref(&mut self, class_index: i32, name: &str, signature: &str) -> i32 {
        self.member_ref(tags::METHODREF, class_index, name, signature)
    }

    /// Add an InterfaceMethodref entry
    pub fn interface_method_ref(&mut self, class_index: i32, name: &str, signature: &str) -> i32 {
        self.member_ref(tags::INTERFACE_METHODREF, class_index, name, signature)
    }

    /// Add an InvokeDynamic entry
    pub fn invoke_dynamic(&mut self, bootstrap_index: i32, name: &str, signature: &str) -> i32 {
        let nat = self.name_and_type(name, signature);
        self.push(
            tags::INVOKE_DYNAMIC,
            ((nat as i64) << 16) | bootstrap_index as i64,
        )
    }

    /// Add an entry with an arbitrary tag byte
    pub fn raw_tag(&mut self, tag: u8, word: i64) -> i32 {
        self.push(tag, word)
    }

    /// Add a cache entry for a field or invoke instruction referencing `cpi`.
    ///
    /// Returns the rewritten instruction operand.
    pub fn cache_entry(&mut self, cpi: i32) -> i32 {
        self.cache.push(cpi);
        self.cache.len() as i32 - 1
    }

    /// Add a cache entry for an invokedynamic instruction referencing `cpi`.
    ///
    /// Returns the rewritten (complemented) instruction operand.
    pub fn indy_cache_entry(&mut self, cpi: i32) -> i32 {
        !self.cache_entry(cpi)
    }

    /// Write the pool and return its address
    pub fn build(self) -> BoundaryResult<u64> {
        let vm = self.vm;
        let length = self.tags.len();

        let tags_address = vm.allocate(pool::ARRAY_DATA as usize + length);
        vm.write_i32(tags_address + pool::ARRAY_LENGTH, length as i32)?;
        vm.write_bytes(tags_address + pool::ARRAY_DATA, &self.tags)?;

        let cp = vm.allocate(pool::SIZE as usize + length * WORD_SIZE as usize);
        vm.write_u64(cp + pool::TAGS, tags_address)?;
        vm.write_i32(cp + pool::LENGTH, length as i32)?;
        for (i, word) in self.words.iter().enumerate() {
            vm.write_u64(cp + pool::SIZE + i as u64 * WORD_SIZE, *word as u64)?;
        }

        vm.register_pool(
            cp,
            PoolModel {
                tags_address,
                tags: self.tags,
                words: self.words,
                utf8: self.utf8,
                cache: self.cache,
                resolved_constants: self.resolved_constants,
                ..Default::default()
            },
        );
        Ok(cp)
    }
}

// ============================================================================
// Method
// ============================================================================

/// Builder for a `Method` and its `ConstMethod`
pub struct MethodBuilder<'a> {
    vm: &'a MemoryVm,
    constant_pool: u64,
    name_index: u16,
    signature_index: u16,
    code: Vec<u8>,
    access_flags: u32,
}

impl<'a> MethodBuilder<'a> {
    /// Utf8 indices of the name and descriptor
    pub fn name_and_signature(mut self, name_index: i32, signature_index: i32) -> Self {
        self.name_index = name_index as u16;
        self.signature_index = signature_index as u16;
        self
    }

    /// Bytecodes
    pub fn code(mut self, code: &[u8]) -> Self {
        self.code = code.to_vec();
        self
    }

    /// Access flags
    pub fn access_flags(mut self, flags: u32) -> Self {
        self.access_flags = flags;
        self
    }

    /// Write the method and return its address
    pub fn build(self) -> BoundaryResult<u64> {
        let vm = self.vm;
        let cm = vm.allocate(method::CONST_METHOD_SIZE as usize + self.code.len());
        vm.write_u64(cm + method::CM_CONSTANTS, self.constant_pool)?;
        vm.write_u16(cm + method::CM_CODE_SIZE, self.code.len() as u16)?;
        vm.write_u16(cm + method::CM_NAME_INDEX, self.name_index)?;
        vm.write_u16(cm + method::CM_SIGNATURE_INDEX, self.signature_index)?;
        vm.write_bytes(cm + method::CONST_METHOD_SIZE, &self.code)?;

        let m = vm.allocate(method::SIZE);
        vm.write_u64(m + method::CONST_METHOD, cm)?;
        vm.write_u32(m + method::ACCESS_FLAGS, self.access_flags)?;
        Ok(m)
    }
}

// ============================================================================
// MethodData
// ============================================================================

/// Builder for a `MethodData` profile.
///
/// Records are appended in call order; callers keep BCIs ascending in the
/// normal region.
pub struct MethodDataBuilder<'a> {
    vm: &'a MemoryVm,
    method: u64,
    type_width: usize,
    method_width: usize,
    bci_width: usize,
    data: Vec<u8>,
    extra: Vec<u8>,
    extra_free: usize,
    arg_info: Option<Vec<u64>>,
    sizes: Vec<(i32, i32)>,
    extra_sizes: Vec<(i32, i32)>,
    trap_hist: [u8; layout::TRAP_HISTORY_LENGTH],
    decompiles: u32,
    overflow_recompiles: u32,
    overflow_traps: u32,
    ir_size: i32,
    mature: bool,
}

fn record(tag: u8, flags: u8, bci: u16, cells: &[u64]) -> Vec<u8> {
    let mut bytes = vec![0u8; dl::CELLS as usize];
    bytes[dl::TAG as usize] = tag;
    bytes[dl::FLAGS as usize] = flags;
    bytes[dl::BCI as usize..dl::BCI as usize + 2].copy_from_slice(&bci.to_le_bytes());
    for cell in cells {
        bytes.extend_from_slice(&cell.to_le_bytes());
    }
    bytes
}

fn rows(entries: &[(u64, u64)], width: usize) -> Vec<u64> {
    let mut cells = Vec::with_capacity(width * 2);
    for i in 0..width {
        let (item, count) = entries.get(i).copied().unwrap_or((0, 0));
        cells.push(item);
        cells.push(count);
    }
    cells
}

impl<'a> MethodDataBuilder<'a> {
    fn push(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.sizes.push((self.data.len() as i32, bytes.len() as i32));
        self.data.extend_from_slice(&bytes);
        self
    }

    fn push_extra(&mut self, bytes: Vec<u8>) -> &mut Self {
        self.extra_sizes
            .push((self.extra.len() as i32, bytes.len() as i32));
        self.extra.extend_from_slice(&bytes);
        self
    }

    /// Position the next normal record will occupy
    pub fn next_position(&self) -> i32 {
        self.data.len() as i32
    }

    /// BitData
    pub fn bit(&mut self, bci: u16, flags: u8) -> &mut Self {
        self.push(record(dl::BIT_DATA, flags, bci, &[]))
    }

    /// CounterData
    pub fn counter(&mut self, bci: u16, count: u64) -> &mut Self {
        self.push(record(dl::COUNTER_DATA, 0, bci, &[count]))
    }

    /// JumpData
    pub fn jump(&mut self, bci: u16, taken: u64, displacement: u64) -> &mut Self {
        self.push(record(dl::JUMP_DATA, 0, bci, &[taken, displacement]))
    }

    /// BranchData
    pub fn branch(&mut self, bci: u16, taken: u64, not_taken: u64) -> &mut Self {
        self.push(record(dl::BRANCH_DATA, 0, bci, &[taken, 0, not_taken]))
    }

    /// ReceiverTypeData with `(klass, count)` rows
    pub fn receiver_type(
        &mut self,
        bci: u16,
        flags: u8,
        count: u64,
        nonprofiled: u64,
        types: &[(u64, u64)],
    ) -> &mut Self {
        let mut cells = vec![count, nonprofiled];
        cells.extend(rows(types, self.type_width));
        self.push(record(dl::RECEIVER_TYPE_DATA, flags, bci, &cells))
    }

    fn virtual_call_cells(
        &self,
        count: u64,
        types: &[(u64, u64)],
        methods: &[(u64, u64)],
    ) -> Vec<u64> {
        let mut cells = vec![count, 0];
        cells.extend(rows(types, self.type_width));
        cells.extend(rows(methods, self.method_width));
        cells
    }

    /// VirtualCallData with `(klass, count)` and `(method, count)` rows
    pub fn virtual_call(
        &mut self,
        bci: u16,
        count: u64,
        types: &[(u64, u64)],
        methods: &[(u64, u64)],
    ) -> &mut Self {
        let cells = self.virtual_call_cells(count, types, methods);
        self.push(record(dl::VIRTUAL_CALL_DATA, 0, bci, &cells))
    }

    /// RetData with `(bci, count, displacement)` rows
    pub fn ret(&mut self, bci: u16, count: u64, targets: &[(u64, u64, u64)]) -> &mut Self {
        let mut cells = vec![count];
        for i in 0..self.bci_width {
            let (target, n, displacement) = targets.get(i).copied().unwrap_or((0, 0, 0));
            cells.extend([target, n, displacement]);
        }
        self.push(record(dl::RET_DATA, 0, bci, &cells))
    }

    /// MultiBranchData; the default count is stored first
    pub fn multi_branch(&mut self, bci: u16, default_count: u64, cases: &[u64]) -> &mut Self {
        let mut cells = vec![2 * (cases.len() as u64 + 1), default_count, 0];
        for &count in cases {
            cells.extend([count, 0]);
        }
        self.push(record(dl::MULTI_BRANCH_DATA, 0, bci, &cells))
    }

    /// CallTypeData with raw type-entry cells
    pub fn call_type(&mut self, bci: u16, count: u64, entries: &[u64]) -> &mut Self {
        let mut cells = vec![count, entries.len() as u64];
        cells.extend_from_slice(entries);
        self.push(record(dl::CALL_TYPE_DATA, 0, bci, &cells))
    }

    /// VirtualCallTypeData with raw type-entry cells
    pub fn virtual_call_type(
        &mut self,
        bci: u16,
        count: u64,
        types: &[(u64, u64)],
        methods: &[(u64, u64)],
        entries: &[u64],
    ) -> &mut Self {
        let mut cells = self.virtual_call_cells(count, types, methods);
        cells.push(entries.len() as u64);
        cells.extend_from_slice(entries);
        self.push(record(dl::VIRTUAL_CALL_TYPE_DATA, 0, bci, &cells))
    }

    /// ParametersTypeData with raw cells
    pub fn parameters_type(&mut self, bci: u16, entries: &[u64]) -> &mut Self {
        let mut cells = vec![entries.len() as u64];
        cells.extend_from_slice(entries);
        self.push(record(dl::PARAMETERS_TYPE_DATA, 0, bci, &cells))
    }

    /// BitData in the extra region
    pub fn extra_bit(&mut self, bci: u16, flags: u8) -> &mut Self {
        self.push_extra(record(dl::BIT_DATA, flags, bci, &[]))
    }

    /// SpeculativeTrapData in the extra region
    pub fn extra_speculative_trap(&mut self, bci: u16, flags: u8, method: u64) -> &mut Self {
        self.push_extra(record(dl::SPECULATIVE_TRAP_DATA, flags, bci, &[method]))
    }

    /// Unused bytes after the extra records
    pub fn extra_free(&mut self, bytes: usize) -> &mut Self {
        self.extra_free = bytes;
        self
    }

    /// ArgInfoData terminating the extra region
    pub fn arg_info(&mut self, args: &[u64]) -> &mut Self {
        self.arg_info = Some(args.to_vec());
        self
    }

    /// Trap history entry
    pub fn trap(&mut self, reason: usize, count: u8) -> &mut Self {
        self.trap_hist[reason] = count;
        self
    }

    /// Decompile counter
    pub fn decompiles(&mut self, count: u32) -> &mut Self {
        self.decompiles = count;
        self
    }

    /// Overflow counters
    pub fn overflow(&mut self, recompiles: u32, traps: u32) -> &mut Self {
        self.overflow_recompiles = recompiles;
        self.overflow_traps = traps;
        self
    }

    /// Size of the last compiled code
    pub fn ir_size(&mut self, size: i32) -> &mut Self {
        self.ir_size = size;
        self
    }

    /// Maturity reported by the VM
    pub fn mature(&mut self, mature: bool) -> &mut Self {
        self.mature = mature;
        self
    }

    /// Write the profile, attach it to the method and return its address
    pub fn build(&mut self) -> BoundaryResult<u64> {
        let vm = self.vm;
        let normal = self.data.len();
        let mut extra = self.extra.clone();
        extra.resize(extra.len() + self.extra_free, 0);
        let mut extra_sizes = self.extra_sizes.clone();
        if let Some(args) = &self.arg_info {
            let mut cells = vec![args.len() as u64];
            cells.extend_from_slice(args);
            let bytes = record(dl::ARG_INFO_DATA, 0, 0, &cells);
            extra_sizes.push((extra.len() as i32, bytes.len() as i32));
            extra.extend_from_slice(&bytes);
        }

        let total = mdo::DATA as usize + normal + extra.len();
        let m = vm.allocate(total);
        vm.write_i32(m + mdo::SIZE, total as i32)?;
        vm.write_i32(m + mdo::DATA_SIZE, normal as i32)?;
        vm.write_u32(m + mdo::DECOMPILES, self.decompiles)?;
        vm.write_u32(m + mdo::OVERFLOW_RECOMPILES, self.overflow_recompiles)?;
        vm.write_u32(m + mdo::OVERFLOW_TRAPS, self.overflow_traps)?;
        vm.write_bytes(m + mdo::TRAP_HIST, &self.trap_hist)?;
        vm.write_i32(m + mdo::IR_SIZE, self.ir_size)?;
        vm.write_bytes(m + mdo::DATA, &self.data)?;
        vm.write_bytes(m + mdo::DATA + normal as u64, &extra)?;

        let mut sizes = self.sizes.clone();
        sizes.extend(
            extra_sizes
                .iter()
                .map(|&(position, size)| (position + normal as i32, size)),
        );
        vm.register_profile_sizes(m, &sizes);
        vm.set_mature(m, self.mature);
        vm.write_u64(self.method + method::METHOD_DATA, m)?;
        Ok(m)
    }
}
