//! Reference layout of VM metadata structures
//!
//! Offsets and constants used by [`MemoryVm`](super::MemoryVm) images. The
//! core never reads these values directly; it discovers them by name through
//! the configuration table published by [`StandardLayout::config_table`].

use crate::types::{ConfigTable, ConfigValue, VmField, VmFlag, VmIntrinsic};

/// Machine word size
pub const WORD_SIZE: u64 = 8;

/// Offset added to a constant pool cache index
pub const CPCACHE_INDEX_TAG: i32 = 1000;

/// Trap history entries per MethodData
pub const TRAP_HISTORY_LENGTH: usize = 20;

/// Default `TypeProfileWidth`
pub const TYPE_PROFILE_WIDTH: i64 = 2;
/// Default `MethodProfileWidth`
pub const METHOD_PROFILE_WIDTH: i64 = 2;
/// Default `BciProfileWidth`
pub const BCI_PROFILE_WIDTH: i64 = 2;

/// Klass offsets
pub mod klass {
    /// `Klass::_layout_helper`
    pub const LAYOUT_HELPER: u64 = 8;
    /// `Klass::_name`
    pub const NAME: u64 = 16;
    /// `InstanceKlass::_constants`
    pub const CONSTANTS: u64 = 32;
    /// `InstanceKlass::_init_state`
    pub const INIT_STATE: u64 = 40;
    /// `Klass::_access_flags`
    pub const ACCESS_FLAGS: u64 = 44;
    /// Allocation size
    pub const SIZE: usize = 64;
    /// `InstanceKlass::fully_initialized`
    pub const FULLY_INITIALIZED: u8 = 4;
    /// Init state of a loaded class
    pub const LOADED: u8 = 1;
}

/// Method and ConstMethod offsets
pub mod method {
    /// `Method::_constMethod`
    pub const CONST_METHOD: u64 = 8;
    /// `Method::_method_data`
    pub const METHOD_DATA: u64 = 16;
    /// `Method::_access_flags`
    pub const ACCESS_FLAGS: u64 = 24;
    /// Method allocation size
    pub const SIZE: usize = 32;

    /// `ConstMethod::_constants`
    pub const CM_CONSTANTS: u64 = 8;
    /// `ConstMethod::_code_size`
    pub const CM_CODE_SIZE: u64 = 16;
    /// `ConstMethod::_name_index`
    pub const CM_NAME_INDEX: u64 = 18;
    /// `ConstMethod::_signature_index`
    pub const CM_SIGNATURE_INDEX: u64 = 20;
    /// sizeof(ConstMethod); bytecodes follow
    pub const CONST_METHOD_SIZE: u64 = 32;
}

/// ConstantPool offsets
pub mod pool {
    /// `ConstantPool::_tags`
    pub const TAGS: u64 = 8;
    /// `ConstantPool::_pool_holder`
    pub const HOLDER: u64 = 16;
    /// `ConstantPool::_length`
    pub const LENGTH: u64 = 24;
    /// sizeof(ConstantPool); entries follow
    pub const SIZE: u64 = 40;
    /// `Array<u1>::_length`
    pub const ARRAY_LENGTH: u64 = 0;
    /// `Array<u1>::_data`
    pub const ARRAY_DATA: u64 = 4;
}

/// MethodData offsets
pub mod mdo {
    /// `MethodData::_size`
    pub const SIZE: u64 = 8;
    /// `MethodData::_data_size`
    pub const DATA_SIZE: u64 = 12;
    /// `_nof_decompiles`
    pub const DECOMPILES: u64 = 16;
    /// `_nof_overflow_recompiles`
    pub const OVERFLOW_RECOMPILES: u64 = 20;
    /// `_nof_overflow_traps`
    pub const OVERFLOW_TRAPS: u64 = 24;
    /// `_trap_hist._array[0]`
    pub const TRAP_HIST: u64 = 28;
    /// `MethodData::_jvmci_ir_size`
    pub const IR_SIZE: u64 = 52;
    /// `MethodData::_data[0]`
    pub const DATA: u64 = 64;
}

/// DataLayout header and tags
pub mod data_layout {
    /// `_header._struct._tag`
    pub const TAG: u64 = 0;
    /// `_header._struct._flags`
    pub const FLAGS: u64 = 1;
    /// `_header._struct._bci`
    pub const BCI: u64 = 2;
    /// `_cells[0]`
    pub const CELLS: u64 = 8;
    /// `DataLayout::cell_size`
    pub const CELL_SIZE: u64 = 8;

    /// `DataLayout::no_tag`
    pub const NO_TAG: u8 = 0;
    /// `DataLayout::bit_data_tag`
    pub const BIT_DATA: u8 = 1;
    /// `DataLayout::counter_data_tag`
    pub const COUNTER_DATA: u8 = 2;
    /// `DataLayout::jump_data_tag`
    pub const JUMP_DATA: u8 = 3;
    /// `DataLayout::receiver_type_data_tag`
    pub const RECEIVER_TYPE_DATA: u8 = 4;
    /// `DataLayout::virtual_call_data_tag`
    pub const VIRTUAL_CALL_DATA: u8 = 5;
    /// `DataLayout::ret_data_tag`
    pub const RET_DATA: u8 = 6;
    /// `DataLayout::branch_data_tag`
    pub const BRANCH_DATA: u8 = 7;
    /// `DataLayout::multi_branch_data_tag`
    pub const MULTI_BRANCH_DATA: u8 = 8;
    /// `DataLayout::arg_info_data_tag`
    pub const ARG_INFO_DATA: u8 = 9;
    /// `DataLayout::call_type_data_tag`
    pub const CALL_TYPE_DATA: u8 = 10;
    /// `DataLayout::virtual_call_type_data_tag`
    pub const VIRTUAL_CALL_TYPE_DATA: u8 = 11;
    /// `DataLayout::parameters_type_data_tag`
    pub const PARAMETERS_TYPE_DATA: u8 = 12;
    /// `DataLayout::speculative_trap_data_tag`
    pub const SPECULATIVE_TRAP_DATA: u8 = 13;

    /// `BitData::null_seen_flag`
    pub const NULL_SEEN_FLAG: u8 = 0;
    /// `BitData::exception_seen_flag`
    pub const EXCEPTION_SEEN_FLAG: u8 = 1;
}

/// Constant pool tags
pub mod tags {
    #![allow(missing_docs)]
    pub const INVALID: u8 = 0;
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const UNRESOLVED_CLASS: u8 = 100;
    pub const CLASS_INDEX: u8 = 101;
    pub const STRING_INDEX: u8 = 102;
    pub const UNRESOLVED_CLASS_IN_ERROR: u8 = 103;
    pub const METHOD_HANDLE_IN_ERROR: u8 = 104;
    pub const METHOD_TYPE_IN_ERROR: u8 = 105;
    pub const DYNAMIC_IN_ERROR: u8 = 106;
}

/// Builder for the configuration table of the reference layout
#[derive(Debug, Clone)]
pub struct StandardLayout {
    type_profile_width: i64,
    method_profile_width: i64,
    bci_profile_width: i64,
}

impl StandardLayout {
    /// Layout with default profile widths
    pub fn new() -> Self {
        Self {
            type_profile_width: TYPE_PROFILE_WIDTH,
            method_profile_width: METHOD_PROFILE_WIDTH,
            bci_profile_width: BCI_PROFILE_WIDTH,
        }
    }

    /// Override `TypeProfileWidth`
    pub fn type_profile_width(mut self, width: i64) -> Self {
        self.type_profile_width = width;
        self
    }

    /// Override `MethodProfileWidth`
    pub fn method_profile_width(mut self, width: i64) -> Self {
        self.method_profile_width = width;
        self
    }

    /// Override `BciProfileWidth`
    pub fn bci_profile_width(mut self, width: i64) -> Self {
        self.bci_profile_width = width;
        self
    }

    /// Produce the configuration table
    pub fn config_table(&self) -> ConfigTable {
        let field = |name: &str, ty: &str, offset: u64| VmField::instance(name, ty, offset as i64);

        let fields = vec![
            field("Klass::_layout_helper", "jint", klass::LAYOUT_HELPER),
            field("Klass::_name", "Symbol*", klass::NAME),
            field("Klass::_access_flags", "AccessFlags", klass::ACCESS_FLAGS),
            field("InstanceKlass::_constants", "ConstantPool*", klass::CONSTANTS),
            field("InstanceKlass::_init_state", "u1", klass::INIT_STATE),
            field("Method::_constMethod", "ConstMethod*", method::CONST_METHOD),
            field("Method::_method_data", "MethodData*", method::METHOD_DATA),
            field("Method::_access_flags", "AccessFlags", method::ACCESS_FLAGS),
            field("ConstMethod::_constants", "ConstantPool*", method::CM_CONSTANTS),
            field("ConstMethod::_code_size", "u2", method::CM_CODE_SIZE),
            field("ConstMethod::_name_index", "u2", method::CM_NAME_INDEX),
            field("ConstMethod::_signature_index", "u2", method::CM_SIGNATURE_INDEX),
            field("ConstantPool::_tags", "Array<u1>*", pool::TAGS),
            field("ConstantPool::_pool_holder", "InstanceKlass*", pool::HOLDER),
            field("ConstantPool::_length", "int", pool::LENGTH),
            field("Array<u1>::_length", "int", pool::ARRAY_LENGTH),
            field("Array<u1>::_data", "u1", pool::ARRAY_DATA),
            field("MethodData::_size", "int", mdo::SIZE),
            field("MethodData::_data_size", "int", mdo::DATA_SIZE),
            field("MethodData::_data[0]", "intptr_t", mdo::DATA),
            field(
                "MethodData::_compiler_counters._trap_hist._array[0]",
                "u1",
                mdo::TRAP_HIST,
            ),
            field(
                "MethodData::_compiler_counters._nof_decompiles",
                "uint",
                mdo::DECOMPILES,
            ),
            field(
                "MethodData::_compiler_counters._nof_overflow_recompiles",
                "uint",
                mdo::OVERFLOW_RECOMPILES,
            ),
            field(
                "MethodData::_compiler_counters._nof_overflow_traps",
                "uint",
                mdo::OVERFLOW_TRAPS,
            ),
            field("MethodData::_jvmci_ir_size", "int", mdo::IR_SIZE),
            field("DataLayout::_header._struct._tag", "u1", data_layout::TAG),
            field("DataLayout::_header._struct._flags", "u1", data_layout::FLAGS),
            field("DataLayout::_header._struct._bci", "u2", data_layout::BCI),
            field("DataLayout::_cells[0]", "intptr_t", data_layout::CELLS),
        ];

        let type_sizes = vec![
            ("intptr_t".to_string(), WORD_SIZE as i64),
            ("ConstantPool".to_string(), pool::SIZE as i64),
            ("ConstMethod".to_string(), method::CONST_METHOD_SIZE as i64),
            ("Method".to_string(), method::SIZE as i64),
        ];

        let long = |name: &str, value: i64| (name.to_string(), ConfigValue::Long(value));
        let mut constants = vec![
            long("ConstantPool::CPCACHE_INDEX_TAG", CPCACHE_INDEX_TAG as i64),
            long("DataLayout::cell_size", data_layout::CELL_SIZE as i64),
            long("BitData::null_seen_flag", data_layout::NULL_SEEN_FLAG as i64),
            long("BitData::exception_seen_flag", data_layout::EXCEPTION_SEEN_FLAG as i64),
            long("InstanceKlass::fully_initialized", klass::FULLY_INITIALIZED as i64),
            long("Deoptimization::Reason_TRAP_HISTORY_LENGTH", TRAP_HISTORY_LENGTH as i64),
        ];
        let data_tags = [
            ("no_tag", data_layout::NO_TAG),
            ("bit_data_tag", data_layout::BIT_DATA),
            ("counter_data_tag", data_layout::COUNTER_DATA),
            ("jump_data_tag", data_layout::JUMP_DATA),
            ("receiver_type_data_tag", data_layout::RECEIVER_TYPE_DATA),
            ("virtual_call_data_tag", data_layout::VIRTUAL_CALL_DATA),
            ("ret_data_tag", data_layout::RET_DATA),
            ("branch_data_tag", data_layout::BRANCH_DATA),
            ("multi_branch_data_tag", data_layout::MULTI_BRANCH_DATA),
            ("arg_info_data_tag", data_layout::ARG_INFO_DATA),
            ("call_type_data_tag", data_layout::CALL_TYPE_DATA),
            ("virtual_call_type_data_tag", data_layout::VIRTUAL_CALL_TYPE_DATA),
            ("parameters_type_data_tag", data_layout::PARAMETERS_TYPE_DATA),
            ("speculative_trap_data_tag", data_layout::SPECULATIVE_TRAP_DATA),
        ];
        for (name, tag) in data_tags {
            constants.push(long(&format!("DataLayout::{}", name), tag as i64));
        }
        let pool_tags = [
            ("Utf8", tags::UTF8),
            ("Integer", tags::INTEGER),
            ("Float", tags::FLOAT),
            ("Long", tags::LONG),
            ("Double", tags::DOUBLE),
            ("Class", tags::CLASS),
            ("String", tags::STRING),
            ("Fieldref", tags::FIELDREF),
            ("Methodref", tags::METHODREF),
            ("InterfaceMethodref", tags::INTERFACE_METHODREF),
            ("NameAndType", tags::NAME_AND_TYPE),
            ("MethodHandle", tags::METHOD_HANDLE),
            ("MethodType", tags::METHOD_TYPE),
            ("Dynamic", tags::DYNAMIC),
            ("InvokeDynamic", tags::INVOKE_DYNAMIC),
            ("Invalid", tags::INVALID),
            ("UnresolvedClass", tags::UNRESOLVED_CLASS),
            ("ClassIndex", tags::CLASS_INDEX),
            ("StringIndex", tags::STRING_INDEX),
            ("UnresolvedClassInError", tags::UNRESOLVED_CLASS_IN_ERROR),
            ("MethodHandleInError", tags::METHOD_HANDLE_IN_ERROR),
            ("MethodTypeInError", tags::METHOD_TYPE_IN_ERROR),
            ("DynamicInError", tags::DYNAMIC_IN_ERROR),
        ];
        for (name, tag) in pool_tags {
            constants.push(long(&format!("JVM_CONSTANT_{}", name), tag as i64));
        }

        let flag = |name: &str, value: i64| VmFlag {
            name: name.to_string(),
            type_name: "intx".to_string(),
            value: ConfigValue::Long(value),
        };
        let flags = vec![
            flag("TypeProfileWidth", self.type_profile_width),
            flag("MethodProfileWidth", self.method_profile_width),
            flag("BciProfileWidth", self.bci_profile_width),
            VmFlag {
                name: "UseCompressedOops".to_string(),
                type_name: "bool".to_string(),
                value: ConfigValue::Bool(true),
            },
        ];

        let intrinsics = vec![VmIntrinsic {
            holder: "java/lang/Math".to_string(),
            name: "sqrt".to_string(),
            descriptor: "(D)D".to_string(),
            id: 1,
        }];

        ConfigTable {
            fields,
            type_sizes,
            constants,
            addresses: Vec::new(),
            flags,
            intrinsics,
        }
    }
}

impl Default for StandardLayout {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_unique() {
        let table = StandardLayout::new().config_table();
        let mut names: Vec<&str> = table.fields.iter().map(|f| f.name.as_str()).collect();
        let len = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), len);

        let mut constants: Vec<&str> = table.constants.iter().map(|(n, _)| n.as_str()).collect();
        let len = constants.len();
        constants.sort_unstable();
        constants.dedup();
        assert_eq!(constants.len(), len);
    }

    #[test]
    fn test_profile_width_override() {
        let table = StandardLayout::new().type_profile_width(8).config_table();
        let width = table.flags.iter().find(|f| f.name == "TypeProfileWidth").unwrap();
        assert_eq!(width.value, ConfigValue::Long(8));
    }
}
