//! Raw values exchanged with the host VM

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Configuration table
// ============================================================================

/// Raw value of a configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// Integral value (also used for addresses and offsets)
    Long(i64),
    /// Boolean value
    Bool(bool),
    /// String value
    Str(String),
}

impl ConfigValue {
    /// Name of the value's representation, for diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            ConfigValue::Long(_) => "long",
            ConfigValue::Bool(_) => "boolean",
            ConfigValue::Str(_) => "string",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Long(v) => write!(f, "{}", v),
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Str(v) => write!(f, "\"{}\"", v),
        }
    }
}

/// A VM struct field as described by the VM.
///
/// Instance fields carry an `offset` and a zero `address`; static fields carry
/// the `address` of their storage and a pre-fetched `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmField {
    /// Qualified name, e.g. `Klass::_name`
    pub name: String,
    /// Declared native type, e.g. `Symbol*`
    pub type_name: Option<String>,
    /// Byte offset within the owning struct (instance fields)
    pub offset: i64,
    /// Address of the storage (static fields), 0 for instance fields
    pub address: u64,
    /// Value read at startup (static fields)
    pub value: Option<ConfigValue>,
}

impl VmField {
    /// Describe an instance field
    pub fn instance(name: impl Into<String>, type_name: &str, offset: i64) -> Self {
        VmField {
            name: name.into(),
            type_name: Some(type_name.to_string()),
            offset,
            address: 0,
            value: None,
        }
    }

    /// Describe a static field
    pub fn global(
        name: impl Into<String>,
        type_name: &str,
        address: u64,
        value: ConfigValue,
    ) -> Self {
        VmField {
            name: name.into(),
            type_name: Some(type_name.to_string()),
            offset: 0,
            address,
            value: Some(value),
        }
    }

    /// Static fields are identified by a non-zero address
    pub fn is_static(&self) -> bool {
        self.address != 0
    }
}

/// A VM flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFlag {
    /// Flag name, e.g. `TypeProfileWidth`
    pub name: String,
    /// Declared type, e.g. `intx`
    pub type_name: String,
    /// Current value
    pub value: ConfigValue,
}

/// A method the VM implements intrinsically
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmIntrinsic {
    /// Holder class in internal form
    pub holder: String,
    /// Method name
    pub name: String,
    /// Method descriptor
    pub descriptor: String,
    /// VM intrinsic id
    pub id: i32,
}

/// Everything the VM publishes about itself, read once at startup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTable {
    /// Struct fields
    pub fields: Vec<VmField>,
    /// Native type sizes
    pub type_sizes: Vec<(String, i64)>,
    /// Named constants
    pub constants: Vec<(String, ConfigValue)>,
    /// Named addresses
    pub addresses: Vec<(String, u64)>,
    /// Flags known at startup
    pub flags: Vec<VmFlag>,
    /// Intrinsified methods
    pub intrinsics: Vec<VmIntrinsic>,
}

// ============================================================================
// Constants and object references
// ============================================================================

/// An object living in the same heap as the compiler
pub type HostObject = Arc<dyn Any + Send + Sync>;

/// Reference to a VM heap object
#[derive(Debug, Clone)]
pub enum RawObject {
    /// Global handle into the foreign heap
    Handle {
        /// Raw handle value, never 0
        handle: i64,
        /// Whether the reference is a compressed oop
        compressed: bool,
    },
    /// Directly embedded object
    Direct(HostObject),
}

/// A constant value produced by the VM
#[derive(Debug, Clone)]
pub enum RawConstant {
    /// The null reference
    Null,
    /// No value
    Illegal,
    /// A primitive value, stored as its raw bit pattern
    Primitive {
        /// Kind of the primitive
        kind: JavaKind,
        /// Raw bits, sign-extended to 64 bits
        raw: i64,
    },
    /// An object reference
    Object(RawObject),
}

/// Result of resolving a class reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KlassRef {
    /// A loaded class
    Resolved(u64),
    /// A class known only by name
    Unresolved(String),
}

/// Field linkage information returned by the VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedFieldInfo {
    /// Declaring class
    pub holder: u64,
    /// Access flags
    pub flags: i32,
    /// Byte offset within the instance (or mirror, for statics)
    pub offset: i32,
    /// Index in the holder's field table
    pub index: i32,
}

// ============================================================================
// JavaKind
// ============================================================================

/// Value kinds of the Java virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JavaKind {
    /// boolean
    Boolean,
    /// byte
    Byte,
    /// short
    Short,
    /// char
    Char,
    /// int
    Int,
    /// float
    Float,
    /// long
    Long,
    /// double
    Double,
    /// reference
    Object,
    /// void
    Void,
    /// no value
    Illegal,
}

impl JavaKind {
    /// Kind for a descriptor character
    pub fn from_type_char(c: char) -> Option<Self> {
        Some(match c {
            'Z' => JavaKind::Boolean,
            'B' => JavaKind::Byte,
            'S' => JavaKind::Short,
            'C' => JavaKind::Char,
            'I' => JavaKind::Int,
            'F' => JavaKind::Float,
            'J' => JavaKind::Long,
            'D' => JavaKind::Double,
            'L' | '[' => JavaKind::Object,
            'V' => JavaKind::Void,
            _ => return None,
        })
    }

    /// Descriptor character of this kind
    pub fn type_char(self) -> char {
        match self {
            JavaKind::Boolean => 'Z',
            JavaKind::Byte => 'B',
            JavaKind::Short => 'S',
            JavaKind::Char => 'C',
            JavaKind::Int => 'I',
            JavaKind::Float => 'F',
            JavaKind::Long => 'J',
            JavaKind::Double => 'D',
            JavaKind::Object => 'A',
            JavaKind::Void => 'V',
            JavaKind::Illegal => '-',
        }
    }

    /// Whether values of this kind are primitives
    pub fn is_primitive(self) -> bool {
        !matches!(self, JavaKind::Object | JavaKind::Void | JavaKind::Illegal)
    }

    /// Long and double occupy two slots
    pub fn needs_two_slots(self) -> bool {
        matches!(self, JavaKind::Long | JavaKind::Double)
    }

    /// Java source name of the kind
    pub fn java_name(self) -> &'static str {
        match self {
            JavaKind::Boolean => "boolean",
            JavaKind::Byte => "byte",
            JavaKind::Short => "short",
            JavaKind::Char => "char",
            JavaKind::Int => "int",
            JavaKind::Float => "float",
            JavaKind::Long => "long",
            JavaKind::Double => "double",
            JavaKind::Object => "Object",
            JavaKind::Void => "void",
            JavaKind::Illegal => "illegal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_field_detection() {
        let instance = VmField::instance("Klass::_name", "Symbol*", 16);
        let global = VmField::global("Universe::_heap", "CollectedHeap*", 0x4000, ConfigValue::Long(7));
        assert!(!instance.is_static());
        assert!(global.is_static());
    }

    #[test]
    fn test_java_kind_chars() {
        for c in ['Z', 'B', 'S', 'C', 'I', 'F', 'J', 'D', 'V'] {
            let kind = JavaKind::from_type_char(c).unwrap();
            assert_eq!(kind.type_char(), c);
        }
        assert_eq!(JavaKind::from_type_char('L'), Some(JavaKind::Object));
        assert_eq!(JavaKind::from_type_char('Q'), None);
        assert!(JavaKind::Long.needs_two_slots());
        assert!(!JavaKind::Object.is_primitive());
    }

    #[test]
    fn test_config_table_json() {
        let table = ConfigTable {
            fields: vec![VmField::instance("Klass::_name", "Symbol*", 16)],
            constants: vec![("ConstantPool::CPCACHE_INDEX_TAG".into(), ConfigValue::Long(1000))],
            ..Default::default()
        };
        let text = serde_json::to_string(&table).unwrap();
        let back: ConfigTable = serde_json::from_str(&text).unwrap();
        assert_eq!(back, table);
    }
}
