//! Fields

use super::{JavaType, ResolvedJavaType, ACC_STATIC};
use std::sync::Arc;

/// A linked field
#[derive(Debug, Clone)]
pub struct ResolvedJavaField {
    holder: Arc<ResolvedJavaType>,
    name: String,
    field_type: JavaType,
    offset: i32,
    flags: i32,
    index: i32,
}

impl ResolvedJavaField {
    pub(crate) fn new(
        holder: Arc<ResolvedJavaType>,
        name: String,
        field_type: JavaType,
        offset: i32,
        flags: i32,
        index: i32,
    ) -> Self {
        Self {
            holder,
            name,
            field_type,
            offset,
            flags,
            index,
        }
    }

    /// Declaring class
    pub fn holder(&self) -> &Arc<ResolvedJavaType> {
        &self.holder
    }

    /// Field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type
    pub fn field_type(&self) -> &JavaType {
        &self.field_type
    }

    /// Byte offset within the instance, or within the mirror for statics
    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Access flags
    pub fn flags(&self) -> i32 {
        self.flags
    }

    /// Index in the holder's field table
    pub fn index(&self) -> i32 {
        self.index
    }

    /// Whether the field is static
    pub fn is_static(&self) -> bool {
        self.flags as u32 & ACC_STATIC != 0
    }
}

/// A field reference that may not be linked yet
#[derive(Debug, Clone)]
pub enum JavaField {
    /// A linked field
    Resolved(ResolvedJavaField),
    /// A field known only by holder, name and type
    Unresolved {
        /// Declaring class as named by the reference
        holder: JavaType,
        /// Field name
        name: String,
        /// Declared type
        field_type: JavaType,
    },
}

impl JavaField {
    /// Field name
    pub fn name(&self) -> &str {
        match self {
            JavaField::Resolved(field) => field.name(),
            JavaField::Unresolved { name, .. } => name,
        }
    }

    /// Declared type
    pub fn field_type(&self) -> &JavaType {
        match self {
            JavaField::Resolved(field) => field.field_type(),
            JavaField::Unresolved { field_type, .. } => field_type,
        }
    }

    /// Whether the field is linked
    pub fn is_resolved(&self) -> bool {
        matches!(self, JavaField::Resolved(_))
    }

    /// The linked field, if any
    pub fn as_resolved(&self) -> Option<&ResolvedJavaField> {
        match self {
            JavaField::Resolved(field) => Some(field),
            JavaField::Unresolved { .. } => None,
        }
    }
}
