//! Constant pool entry kinds

use crate::config::JvmConstantTags;

/// Kind of a constant pool entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum JvmConstant {
    Utf8,
    Integer,
    Float,
    Long,
    Double,
    Class,
    String,
    Fieldref,
    Methodref,
    InterfaceMethodref,
    NameAndType,
    MethodHandle,
    MethodType,
    Dynamic,
    InvokeDynamic,
    UnresolvedClass,
    UnresolvedClassInError,
    MethodHandleInError,
    MethodTypeInError,
    DynamicInError,
}

impl JvmConstant {
    /// Decode a tag byte. `None` for the invalid tag and for unknown tags.
    pub fn from_tag(tag: u8, tags: &JvmConstantTags) -> Option<Self> {
        let table = [
            (tags.utf8, Self::Utf8),
            (tags.integer, Self::Integer),
            (tags.float, Self::Float),
            (tags.long, Self::Long),
            (tags.double, Self::Double),
            (tags.class, Self::Class),
            (tags.string, Self::String),
            (tags.fieldref, Self::Fieldref),
            (tags.methodref, Self::Methodref),
            (tags.interface_methodref, Self::InterfaceMethodref),
            (tags.name_and_type, Self::NameAndType),
            (tags.method_handle, Self::MethodHandle),
            (tags.method_type, Self::MethodType),
            (tags.dynamic, Self::Dynamic),
            (tags.invoke_dynamic, Self::InvokeDynamic),
            (tags.unresolved_class, Self::UnresolvedClass),
            (tags.unresolved_class_in_error, Self::UnresolvedClassInError),
            (tags.method_handle_in_error, Self::MethodHandleInError),
            (tags.method_type_in_error, Self::MethodTypeInError),
            (tags.dynamic_in_error, Self::DynamicInError),
        ];
        if tag == tags.invalid {
            return None;
        }
        table
            .iter()
            .find(|(value, _)| *value == tag)
            .map(|(_, constant)| *constant)
    }

    /// Entries that name a class
    pub fn is_class(self) -> bool {
        matches!(
            self,
            Self::Class | Self::UnresolvedClass | Self::UnresolvedClassInError
        )
    }

    /// Field and method references
    pub fn is_member_ref(self) -> bool {
        matches!(
            self,
            Self::Fieldref | Self::Methodref | Self::InterfaceMethodref
        )
    }

    /// Entries resolved through the VM's resolved-references cache
    pub fn is_cached_object(self) -> bool {
        matches!(
            self,
            Self::String
                | Self::MethodHandle
                | Self::MethodHandleInError
                | Self::MethodType
                | Self::MethodTypeInError
                | Self::Dynamic
                | Self::DynamicInError
        )
    }
}
