//! Profile record kinds

use super::RecordLayout;
use std::fmt;

/// Kind of a profile record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProfileKind {
    /// Flags only
    Bit,
    /// Execution counter
    Counter,
    /// Unconditional jump
    Jump,
    /// Type check with receiver type table
    ReceiverType,
    /// Virtual call with receiver type and call target tables
    VirtualCall,
    /// `ret` with target table
    Ret,
    /// Conditional branch
    Branch,
    /// Switch
    MultiBranch,
    /// Argument modification flags
    ArgInfo,
    /// Static call with argument type entries
    CallType,
    /// Virtual call with argument type entries
    VirtualCallType,
    /// Parameter types
    ParametersType,
    /// Failed speculation trap (extra region only)
    SpeculativeTrap,
}

impl ProfileKind {
    /// Decode a record tag. `None` for the no-data tag and for unknown tags.
    pub fn from_tag(tag: u8, layout: &RecordLayout) -> Option<Self> {
        let t = &layout.tags;
        let table = [
            (t.bit, Self::Bit),
            (t.counter, Self::Counter),
            (t.jump, Self::Jump),
            (t.receiver_type, Self::ReceiverType),
            (t.virtual_call, Self::VirtualCall),
            (t.ret, Self::Ret),
            (t.branch, Self::Branch),
            (t.multi_branch, Self::MultiBranch),
            (t.arg_info, Self::ArgInfo),
            (t.call_type, Self::CallType),
            (t.virtual_call_type, Self::VirtualCallType),
            (t.parameters_type, Self::ParametersType),
            (t.speculative_trap, Self::SpeculativeTrap),
        ];
        if tag == t.no {
            return None;
        }
        table
            .iter()
            .find(|(value, _)| *value == tag)
            .map(|(_, kind)| *kind)
    }

    /// Size in bytes of the fixed part of the record
    pub fn static_size(self, layout: &RecordLayout) -> u64 {
        let cells = match self {
            Self::Bit => 0,
            Self::Counter => 1,
            Self::Jump => 2,
            Self::Branch => 3,
            Self::ReceiverType => layout.receiver_type_cells(),
            Self::VirtualCall | Self::VirtualCallType => layout.virtual_call_cells(),
            Self::Ret => layout.ret_cells(),
            Self::MultiBranch | Self::ArgInfo | Self::ParametersType => 1,
            Self::CallType => 1,
            Self::SpeculativeTrap => 1,
        };
        layout.cell_offset(cells)
    }

    /// Records whose flags carry a null-seen bit
    pub fn has_null_seen(self) -> bool {
        matches!(
            self,
            Self::Bit
                | Self::Counter
                | Self::ReceiverType
                | Self::VirtualCall
                | Self::Ret
                | Self::CallType
                | Self::VirtualCallType
                | Self::SpeculativeTrap
        )
    }

    /// Name of the record type
    pub fn name(self) -> &'static str {
        match self {
            Self::Bit => "BitData",
            Self::Counter => "CounterData",
            Self::Jump => "JumpData",
            Self::ReceiverType => "ReceiverTypeData",
            Self::VirtualCall => "VirtualCallData",
            Self::Ret => "RetData",
            Self::Branch => "BranchData",
            Self::MultiBranch => "MultiBranchData",
            Self::ArgInfo => "ArgInfoData",
            Self::CallType => "CallTypeData",
            Self::VirtualCallType => "VirtualCallTypeData",
            Self::ParametersType => "ParametersTypeData",
            Self::SpeculativeTrap => "SpeculativeTrapData",
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
