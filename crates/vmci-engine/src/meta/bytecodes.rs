//! Opcodes that reference the constant pool

/// Bytecodes whose operand is a constant pool or cache index
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Load int, float, String, Class, MethodType or MethodHandle (u1 index)
    Ldc = 18,
    /// Same as `Ldc` with a u2 index
    LdcW = 19,
    /// Load long or double
    Ldc2W = 20,
    /// Read a static field
    GetStatic = 178,
    /// Write a static field
    PutStatic = 179,
    /// Read an instance field
    GetField = 180,
    /// Write an instance field
    PutField = 181,
    /// Virtual dispatch
    InvokeVirtual = 182,
    /// Special (constructor, private, super) invocation
    InvokeSpecial = 183,
    /// Static invocation
    InvokeStatic = 184,
    /// Interface dispatch
    InvokeInterface = 185,
    /// Dynamic call site
    InvokeDynamic = 186,
    /// Allocate an instance
    New = 187,
    /// Allocate an object array
    ANewArray = 189,
    /// Checked cast
    CheckCast = 192,
    /// Type test
    InstanceOf = 193,
    /// Allocate a multi-dimensional array
    MultiANewArray = 197,
    /// Rewritten signature-polymorphic invocation
    InvokeHandle = 233,
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            18 => Some(Self::Ldc),
            19 => Some(Self::LdcW),
            20 => Some(Self::Ldc2W),
            178 => Some(Self::GetStatic),
            179 => Some(Self::PutStatic),
            180 => Some(Self::GetField),
            181 => Some(Self::PutField),
            182 => Some(Self::InvokeVirtual),
            183 => Some(Self::InvokeSpecial),
            184 => Some(Self::InvokeStatic),
            185 => Some(Self::InvokeInterface),
            186 => Some(Self::InvokeDynamic),
            187 => Some(Self::New),
            189 => Some(Self::ANewArray),
            192 => Some(Self::CheckCast),
            193 => Some(Self::InstanceOf),
            197 => Some(Self::MultiANewArray),
            233 => Some(Self::InvokeHandle),
            _ => None,
        }
    }

    /// Opcode byte
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Mnemonic
    pub fn name(self) -> &'static str {
        match self {
            Self::Ldc => "ldc",
            Self::LdcW => "ldc_w",
            Self::Ldc2W => "ldc2_w",
            Self::GetStatic => "getstatic",
            Self::PutStatic => "putstatic",
            Self::GetField => "getfield",
            Self::PutField => "putfield",
            Self::InvokeVirtual => "invokevirtual",
            Self::InvokeSpecial => "invokespecial",
            Self::InvokeStatic => "invokestatic",
            Self::InvokeInterface => "invokeinterface",
            Self::InvokeDynamic => "invokedynamic",
            Self::New => "new",
            Self::ANewArray => "anewarray",
            Self::CheckCast => "checkcast",
            Self::InstanceOf => "instanceof",
            Self::MultiANewArray => "multianewarray",
            Self::InvokeHandle => "invokehandle",
        }
    }

    /// Field access instructions
    pub fn is_field_access(self) -> bool {
        matches!(
            self,
            Self::GetStatic | Self::PutStatic | Self::GetField | Self::PutField
        )
    }

    /// Invocations whose operand is rewritten to a cache index by adding the
    /// cache tag (everything except invokedynamic)
    pub fn is_tagged_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual
                | Self::InvokeSpecial
                | Self::InvokeStatic
                | Self::InvokeInterface
                | Self::InvokeHandle
        )
    }

    /// Any invocation
    pub fn is_invoke(self) -> bool {
        self.is_tagged_invoke() || self == Self::InvokeDynamic
    }

    /// Invocations that are rewritten to invokehandle when the target is
    /// signature polymorphic
    pub fn is_invoke_handle_alias(self) -> bool {
        matches!(self, Self::InvokeVirtual | Self::InvokeSpecial)
    }

    /// Instructions whose operand is a cache index naming a member reference
    pub fn references_member(self) -> bool {
        self.is_field_access()
            || matches!(
                self,
                Self::InvokeVirtual | Self::InvokeSpecial | Self::InvokeStatic | Self::InvokeInterface
            )
    }

    /// Instructions whose operand is a plain constant pool index
    pub fn takes_plain_index(self) -> bool {
        matches!(
            self,
            Self::Ldc
                | Self::LdcW
                | Self::Ldc2W
                | Self::New
                | Self::ANewArray
                | Self::CheckCast
                | Self::InstanceOf
                | Self::MultiANewArray
        )
    }
}
