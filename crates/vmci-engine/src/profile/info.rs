//! Per-BCI profile queries

use super::{JavaMethodProfile, JavaTypeProfile, MethodData, ProfileRecord, TriState};
use crate::runtime::VmciRuntime;
use crate::VmciResult;
use std::sync::Arc;

/// Outcome of searching the profile for a BCI
enum Lookup<'a> {
    Found(ProfileRecord<'a>),
    /// No record; the flag is set when the extra region overflowed, so an
    /// exception may have gone unrecorded
    Missing { exception_possibly_not_recorded: bool },
}

/// Profile queries for one method.
///
/// A method without a `MethodData` yields the neutral answers: counts and
/// probabilities of -1, no type or switch profiles, and `Unknown` for
/// observations.
#[derive(Debug)]
pub struct ProfilingInfo {
    data: Option<MethodData>,
    code_size: usize,
    mature_override: Option<bool>,
}

impl ProfilingInfo {
    /// Profile backed by the `MethodData*` at `method_data`
    pub fn load(runtime: Arc<VmciRuntime>, method_data: u64, code_size: usize) -> VmciResult<Self> {
        let mature_override = runtime.options().force_profile_maturity;
        Ok(Self {
            data: Some(MethodData::new(runtime, method_data)?),
            code_size,
            mature_override,
        })
    }

    /// Neutral profile for a method with `code_size` bytecode bytes
    pub fn default_for(runtime: &VmciRuntime, code_size: usize) -> Self {
        Self {
            data: None,
            code_size,
            mature_override: runtime.options().force_profile_maturity,
        }
    }

    /// Underlying profile, if the method has one
    pub fn method_data(&self) -> Option<&MethodData> {
        self.data.as_ref()
    }

    /// Bytecode size of the method
    pub fn code_size(&self) -> usize {
        self.code_size
    }

    fn find_bci(&self, bci: u16, search_extra: bool) -> VmciResult<Lookup<'_>> {
        let Some(data) = &self.data else {
            return Ok(Lookup::Missing {
                exception_possibly_not_recorded: false,
            });
        };

        let mut position = 0;
        while let Some(record) = data.normal_record_at(position)? {
            let current = record.bci()?;
            if current == bci {
                return Ok(Lookup::Found(record));
            }
            if current > bci {
                break;
            }
            position += record.size()?;
        }

        let mut exception_possibly_not_recorded = false;
        if search_extra {
            let mut position = data.extra_data_begin();
            while let Some(record) = data.extra_record_at(position)? {
                if record.bci()? == bci {
                    return Ok(Lookup::Found(record));
                }
                position += record.size()?;
            }
            if !data.is_within(position) {
                exception_possibly_not_recorded = true;
            }
        }
        Ok(Lookup::Missing {
            exception_possibly_not_recorded,
        })
    }

    fn record(&self, bci: u16) -> VmciResult<Option<ProfileRecord<'_>>> {
        match self.find_bci(bci, false)? {
            Lookup::Found(record) => Ok(Some(record)),
            Lookup::Missing { .. } => Ok(None),
        }
    }

    /// Times `bci` executed, or -1 if unknown
    pub fn execution_count(&self, bci: u16) -> VmciResult<i32> {
        match self.record(bci)? {
            Some(record) => record.execution_count(),
            None => Ok(-1),
        }
    }

    /// Probability the branch at `bci` was taken, or -1 if unknown
    pub fn branch_taken_probability(&self, bci: u16) -> VmciResult<f64> {
        match self.record(bci)? {
            Some(record) => record.branch_taken_probability(),
            None => Ok(-1.0),
        }
    }

    /// Switch probabilities at `bci`, default case last
    pub fn switch_probabilities(&self, bci: u16) -> VmciResult<Option<Vec<f64>>> {
        match self.record(bci)? {
            Some(record) => record.switch_probabilities(),
            None => Ok(None),
        }
    }

    /// Receiver types at `bci`
    pub fn type_profile(&self, bci: u16) -> VmciResult<Option<JavaTypeProfile>> {
        match self.record(bci)? {
            Some(record) => record.type_profile(),
            None => Ok(None),
        }
    }

    /// Call targets at `bci`
    pub fn method_profile(&self, bci: u16) -> VmciResult<Option<JavaMethodProfile>> {
        match self.record(bci)? {
            Some(record) => record.method_profile(),
            None => Ok(None),
        }
    }

    /// Whether a null operand was seen at `bci`
    pub fn null_seen(&self, bci: u16) -> VmciResult<TriState> {
        match self.record(bci)? {
            Some(record) => record.null_seen(),
            None => Ok(TriState::Unknown),
        }
    }

    /// Whether an exception was thrown at `bci`. Also searches the extra
    /// region, where records for exception-throwing BCIs are added lazily.
    pub fn exception_seen(&self, bci: u16) -> VmciResult<TriState> {
        if self.data.is_none() {
            return Ok(TriState::Unknown);
        }
        match self.find_bci(bci, true)? {
            Lookup::Found(record) => record.exception_seen(),
            Lookup::Missing {
                exception_possibly_not_recorded: true,
            } => Ok(TriState::Unknown),
            Lookup::Missing {
                exception_possibly_not_recorded: false,
            } => Ok(TriState::False),
        }
    }

    /// Traps recorded for deoptimization `reason`
    pub fn deoptimization_count(&self, reason: i32) -> VmciResult<i32> {
        match &self.data {
            Some(data) => data.deoptimization_count(reason),
            None => Ok(0),
        }
    }

    /// Whether the profile has collected enough to compile against. The
    /// runtime options and [`set_mature`](Self::set_mature) take precedence
    /// over the VM.
    pub fn is_mature(&self) -> VmciResult<bool> {
        if let Some(mature) = self.mature_override {
            return Ok(mature);
        }
        match &self.data {
            Some(data) => data.is_profile_mature(),
            None => Ok(false),
        }
    }

    /// Treat the profile as mature from now on
    pub fn set_mature(&mut self) {
        self.mature_override = Some(true);
    }

    /// Deoptimize-and-recompile cycles of the method
    pub fn decompile_count(&self) -> VmciResult<i32> {
        match &self.data {
            Some(data) => data.decompile_count(),
            None => Ok(0),
        }
    }

    /// Size of the last compiled IR, or -1 if unknown
    pub fn compiled_ir_size(&self) -> VmciResult<i32> {
        match &self.data {
            Some(data) => data.compiled_ir_size(),
            None => Ok(-1),
        }
    }
}
