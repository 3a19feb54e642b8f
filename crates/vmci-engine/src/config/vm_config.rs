//! Layout constants resolved once at startup

use super::{ConfigAccess, ConfigResult};

/// Constant pool tag values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct JvmConstantTags {
    pub utf8: u8,
    pub integer: u8,
    pub float: u8,
    pub long: u8,
    pub double: u8,
    pub class: u8,
    pub string: u8,
    pub fieldref: u8,
    pub methodref: u8,
    pub interface_methodref: u8,
    pub name_and_type: u8,
    pub method_handle: u8,
    pub method_type: u8,
    pub dynamic: u8,
    pub invoke_dynamic: u8,
    pub invalid: u8,
    pub unresolved_class: u8,
    pub unresolved_class_in_error: u8,
    pub method_handle_in_error: u8,
    pub method_type_in_error: u8,
    pub dynamic_in_error: u8,
}

impl JvmConstantTags {
    fn load(access: &ConfigAccess) -> ConfigResult<Self> {
        let tag = |name: &str| -> ConfigResult<u8> {
            Ok(access.get_constant::<i32>(&format!("JVM_CONSTANT_{}", name))? as u8)
        };
        Ok(Self {
            utf8: tag("Utf8")?,
            integer: tag("Integer")?,
            float: tag("Float")?,
            long: tag("Long")?,
            double: tag("Double")?,
            class: tag("Class")?,
            string: tag("String")?,
            fieldref: tag("Fieldref")?,
            methodref: tag("Methodref")?,
            interface_methodref: tag("InterfaceMethodref")?,
            name_and_type: tag("NameAndType")?,
            method_handle: tag("MethodHandle")?,
            method_type: tag("MethodType")?,
            dynamic: tag("Dynamic")?,
            invoke_dynamic: tag("InvokeDynamic")?,
            invalid: tag("Invalid")?,
            unresolved_class: tag("UnresolvedClass")?,
            unresolved_class_in_error: tag("UnresolvedClassInError")?,
            method_handle_in_error: tag("MethodHandleInError")?,
            method_type_in_error: tag("MethodTypeInError")?,
            dynamic_in_error: tag("DynamicInError")?,
        })
    }
}

/// Profile record tag values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct DataLayoutTags {
    pub no: u8,
    pub bit: u8,
    pub counter: u8,
    pub jump: u8,
    pub receiver_type: u8,
    pub virtual_call: u8,
    pub ret: u8,
    pub branch: u8,
    pub multi_branch: u8,
    pub arg_info: u8,
    pub call_type: u8,
    pub virtual_call_type: u8,
    pub parameters_type: u8,
    pub speculative_trap: u8,
}

impl DataLayoutTags {
    fn load(access: &ConfigAccess) -> ConfigResult<Self> {
        let tag = |name: &str| -> ConfigResult<u8> {
            Ok(access.get_constant::<i32>(&format!("DataLayout::{}_tag", name))? as u8)
        };
        Ok(Self {
            no: tag("no")?,
            bit: tag("bit_data")?,
            counter: tag("counter_data")?,
            jump: tag("jump_data")?,
            receiver_type: tag("receiver_type_data")?,
            virtual_call: tag("virtual_call_data")?,
            ret: tag("ret_data")?,
            branch: tag("branch_data")?,
            multi_branch: tag("multi_branch_data")?,
            arg_info: tag("arg_info_data")?,
            call_type: tag("call_type_data")?,
            virtual_call_type: tag("virtual_call_type_data")?,
            parameters_type: tag("parameters_type_data")?,
            speculative_trap: tag("speculative_trap_data")?,
        })
    }
}

/// Profile record header layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayoutConfig {
    /// Offset of the tag byte
    pub tag_offset: u64,
    /// Offset of the flags byte
    pub flags_offset: u64,
    /// Offset of the u2 BCI
    pub bci_offset: u64,
    /// Offset of the first cell, i.e. the header size
    pub cells_offset: u64,
    /// Bytes per cell
    pub cell_size: u64,
    /// Bit number of the null-seen flag
    pub null_seen_flag: u8,
    /// Bit number of the exception-seen flag
    pub exception_seen_flag: u8,
    /// Record tags
    pub tags: DataLayoutTags,
}

/// Every layout value the decoders use
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct VmConfig {
    pub word_size: u64,

    pub klass_name_offset: u64,
    pub klass_layout_helper_offset: u64,
    pub klass_access_flags_offset: u64,
    pub instance_klass_constants_offset: u64,
    pub instance_klass_init_state_offset: u64,
    pub instance_klass_fully_initialized: u8,

    pub method_const_method_offset: u64,
    pub method_data_offset: u64,
    pub method_access_flags_offset: u64,

    pub const_method_constants_offset: u64,
    pub const_method_code_size_offset: u64,
    pub const_method_name_index_offset: u64,
    pub const_method_signature_index_offset: u64,
    pub const_method_size: u64,

    pub constant_pool_size: u64,
    pub constant_pool_tags_offset: u64,
    pub constant_pool_holder_offset: u64,
    pub constant_pool_length_offset: u64,
    pub constant_pool_cp_cache_index_tag: i32,
    pub array_u1_length_offset: u64,
    pub array_u1_data_offset: u64,
    pub jvm_constants: JvmConstantTags,

    pub method_data_size_offset: u64,
    pub method_data_data_size_offset: u64,
    pub method_data_oop_data_offset: u64,
    pub method_data_trap_history_offset: u64,
    pub trap_history_length: u64,
    pub method_data_decompiles_offset: u64,
    pub method_data_overflow_recompiles_offset: u64,
    pub method_data_overflow_traps_offset: u64,
    pub method_data_ir_size_offset: Option<u64>,
    pub data_layout: DataLayoutConfig,

    pub type_profile_width: usize,
    pub method_profile_width: usize,
    pub bci_profile_width: usize,
}

impl VmConfig {
    /// Resolve every entry, failing on the first missing or mistyped one
    pub fn load(access: &ConfigAccess) -> ConfigResult<Self> {
        let offset = |name: &str, ty: &str| -> ConfigResult<u64> {
            Ok(access.get_field_offset::<i64>(name, Some(ty))? as u64)
        };
        let constant = |name: &str| -> ConfigResult<i64> { access.get_constant::<i64>(name) };

        let data_layout = DataLayoutConfig {
            tag_offset: offset("DataLayout::_header._struct._tag", "u1")?,
            flags_offset: offset("DataLayout::_header._struct._flags", "u1")?,
            bci_offset: offset("DataLayout::_header._struct._bci", "u2")?,
            cells_offset: offset("DataLayout::_cells[0]", "intptr_t")?,
            cell_size: constant("DataLayout::cell_size")? as u64,
            null_seen_flag: constant("BitData::null_seen_flag")? as u8,
            exception_seen_flag: constant("BitData::exception_seen_flag")? as u8,
            tags: DataLayoutTags::load(access)?,
        };

        Ok(Self {
            word_size: access.get_type_size("intptr_t")? as u64,

            klass_name_offset: offset("Klass::_name", "Symbol*")?,
            klass_layout_helper_offset: offset("Klass::_layout_helper", "jint")?,
            klass_access_flags_offset: offset("Klass::_access_flags", "AccessFlags")?,
            instance_klass_constants_offset: offset("InstanceKlass::_constants", "ConstantPool*")?,
            instance_klass_init_state_offset: offset("InstanceKlass::_init_state", "u1")?,
            instance_klass_fully_initialized: constant("InstanceKlass::fully_initialized")? as u8,

            method_const_method_offset: offset("Method::_constMethod", "ConstMethod*")?,
            method_data_offset: offset("Method::_method_data", "MethodData*")?,
            method_access_flags_offset: offset("Method::_access_flags", "AccessFlags")?,

            const_method_constants_offset: offset("ConstMethod::_constants", "ConstantPool*")?,
            const_method_code_size_offset: offset("ConstMethod::_code_size", "u2")?,
            const_method_name_index_offset: offset("ConstMethod::_name_index", "u2")?,
            const_method_signature_index_offset: offset("ConstMethod::_signature_index", "u2")?,
            const_method_size: access.get_type_size("ConstMethod")? as u64,

            constant_pool_size: access.get_type_size("ConstantPool")? as u64,
            constant_pool_tags_offset: offset("ConstantPool::_tags", "Array<u1>*")?,
            constant_pool_holder_offset: offset("ConstantPool::_pool_holder", "InstanceKlass*")?,
            constant_pool_length_offset: offset("ConstantPool::_length", "int")?,
            constant_pool_cp_cache_index_tag: access
                .get_constant::<i32>("ConstantPool::CPCACHE_INDEX_TAG")?,
            array_u1_length_offset: offset("Array<u1>::_length", "int")?,
            array_u1_data_offset: offset("Array<u1>::_data", "u1")?,
            jvm_constants: JvmConstantTags::load(access)?,

            method_data_size_offset: offset("MethodData::_size", "int")?,
            method_data_data_size_offset: offset("MethodData::_data_size", "int")?,
            method_data_oop_data_offset: offset("MethodData::_data[0]", "intptr_t")?,
            method_data_trap_history_offset: offset(
                "MethodData::_compiler_counters._trap_hist._array[0]",
                "u1",
            )?,
            trap_history_length: access
                .get_constant_or::<i64>("Deoptimization::Reason_TRAP_HISTORY_LENGTH", 0)?
                as u64,
            method_data_decompiles_offset: offset(
                "MethodData::_compiler_counters._nof_decompiles",
                "uint",
            )?,
            method_data_overflow_recompiles_offset: offset(
                "MethodData::_compiler_counters._nof_overflow_recompiles",
                "uint",
            )?,
            method_data_overflow_traps_offset: offset(
                "MethodData::_compiler_counters._nof_overflow_traps",
                "uint",
            )?,
            method_data_ir_size_offset: match access.get_field_offset_or::<i64>(
                "MethodData::_jvmci_ir_size",
                Some("int"),
                -1,
            )? {
                -1 => None,
                off => Some(off as u64),
            },
            data_layout,

            type_profile_width: access.get_flag::<i64>("TypeProfileWidth")? as usize,
            method_profile_width: access.get_flag_or::<i64>("MethodProfileWidth", 0)? as usize,
            bci_profile_width: access.get_flag::<i64>("BciProfileWidth")? as usize,
        })
    }

    /// Whether a constant pool index lies in the cache index space
    pub fn is_cache_index(&self, index: i32) -> bool {
        index >= self.constant_pool_cp_cache_index_tag
    }
}
