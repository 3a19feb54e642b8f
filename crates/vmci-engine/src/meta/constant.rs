//! Constant values

use super::{MetadataError, MetadataResult};
use crate::handles::{HandleRegistry, ObjectConstant};
use vmci_sdk::{JavaKind, RawConstant};

/// A primitive value
#[derive(Debug, Clone, Copy, PartialEq)]
#[allow(missing_docs)]
pub enum PrimitiveConstant {
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl PrimitiveConstant {
    /// Decode a raw bit pattern
    pub fn from_raw(kind: JavaKind, raw: i64) -> MetadataResult<Self> {
        Ok(match kind {
            JavaKind::Boolean => Self::Boolean(raw != 0),
            JavaKind::Byte => Self::Byte(raw as i8),
            JavaKind::Short => Self::Short(raw as i16),
            JavaKind::Char => Self::Char(raw as u16),
            JavaKind::Int => Self::Int(raw as i32),
            JavaKind::Float => Self::Float(f32::from_bits(raw as u32)),
            JavaKind::Long => Self::Long(raw),
            JavaKind::Double => Self::Double(f64::from_bits(raw as u64)),
            other => return Err(MetadataError::InvalidPrimitiveKind(other)),
        })
    }

    /// Kind of the value
    pub fn kind(&self) -> JavaKind {
        match self {
            Self::Boolean(_) => JavaKind::Boolean,
            Self::Byte(_) => JavaKind::Byte,
            Self::Short(_) => JavaKind::Short,
            Self::Char(_) => JavaKind::Char,
            Self::Int(_) => JavaKind::Int,
            Self::Float(_) => JavaKind::Float,
            Self::Long(_) => JavaKind::Long,
            Self::Double(_) => JavaKind::Double,
        }
    }

    /// Raw bit pattern, sign-extended to 64 bits
    pub fn raw_bits(&self) -> i64 {
        match *self {
            Self::Boolean(v) => v as i64,
            Self::Byte(v) => v as i64,
            Self::Short(v) => v as i64,
            Self::Char(v) => v as i64,
            Self::Int(v) => v as i64,
            Self::Float(v) => v.to_bits() as i32 as i64,
            Self::Long(v) => v,
            Self::Double(v) => v.to_bits() as i64,
        }
    }
}

/// A constant as seen by the compiler
#[derive(Debug, Clone)]
pub enum JavaConstant {
    /// The null reference
    Null,
    /// No value
    Illegal,
    /// A primitive value
    Primitive(PrimitiveConstant),
    /// A non-null object reference
    Object(ObjectConstant),
}

impl JavaConstant {
    /// Wrap a raw VM constant, registering object handles with `handles`
    pub fn from_raw(raw: RawConstant, handles: &HandleRegistry) -> MetadataResult<Self> {
        Ok(match raw {
            RawConstant::Null => Self::Null,
            RawConstant::Illegal => Self::Illegal,
            RawConstant::Primitive { kind, raw } => {
                Self::Primitive(PrimitiveConstant::from_raw(kind, raw)?)
            }
            RawConstant::Object(object) => Self::Object(handles.wrap(object)),
        })
    }

    /// Kind of the constant
    pub fn kind(&self) -> JavaKind {
        match self {
            Self::Null | Self::Object(_) => JavaKind::Object,
            Self::Illegal => JavaKind::Illegal,
            Self::Primitive(p) => p.kind(),
        }
    }

    /// Whether this is the null reference
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The object reference, if any
    pub fn as_object(&self) -> Option<&ObjectConstant> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// The primitive value, if any
    pub fn as_primitive(&self) -> Option<PrimitiveConstant> {
        match self {
            Self::Primitive(p) => Some(*p),
            _ => None,
        }
    }
}

impl From<PrimitiveConstant> for JavaConstant {
    fn from(value: PrimitiveConstant) -> Self {
        Self::Primitive(value)
    }
}
