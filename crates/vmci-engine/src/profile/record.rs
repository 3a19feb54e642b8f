//! Interpretation of individual profile records

use super::method_data::truncate_long_to_int;
use super::types::RawItemProfile;
use super::{
    JavaMethodProfile, JavaTypeProfile, MethodData, ProfileError, ProfileKind, ProfiledMethod,
    ProfiledType, TriState,
};
use crate::VmciResult;

/// One record of a [`MethodData`]
#[derive(Clone, Copy)]
pub struct ProfileRecord<'a> {
    data: &'a MethodData,
    kind: ProfileKind,
    position: i32,
}

impl<'a> ProfileRecord<'a> {
    pub(crate) fn new(data: &'a MethodData, kind: ProfileKind, position: i32) -> Self {
        Self {
            data,
            kind,
            position,
        }
    }

    /// Record kind
    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    /// Byte position within the profile data
    pub fn position(&self) -> i32 {
        self.position
    }

    fn cell(&self, index: u64) -> VmciResult<u64> {
        self.data
            .read_unsigned_int(self.position, self.data.layout().cell_offset(index))
    }

    // ========================================================================
    // Header
    // ========================================================================

    /// BCI the record belongs to
    pub fn bci(&self) -> VmciResult<u16> {
        self.data
            .read_unsigned_short(self.position, self.data.layout().bci_offset)
    }

    /// Flags byte
    pub fn flags(&self) -> VmciResult<u8> {
        self.data
            .read_unsigned_byte(self.position, self.data.layout().flags_offset)
    }

    // ========================================================================
    // Size
    // ========================================================================

    fn dynamic_size(&self) -> VmciResult<u64> {
        let layout = self.data.layout();
        let cells = match self.kind {
            ProfileKind::MultiBranch | ProfileKind::ArgInfo | ProfileKind::ParametersType => {
                self.cell(0)?
            }
            ProfileKind::CallType => 1 + self.cell(1)?,
            ProfileKind::VirtualCallType => 1 + self.cell(layout.virtual_call_cells())?,
            _ => 0,
        };
        Ok(layout.cells(cells))
    }

    /// Size in bytes, i.e. the distance to the next record.
    ///
    /// With size verification enabled the result is checked against the VM.
    pub fn size(&self) -> VmciResult<i32> {
        let size = (self.kind.static_size(self.data.layout()) + self.dynamic_size()?) as i32;
        if self.data.verify_sizes() {
            let reported = self.data.vm_record_size(self.position)?;
            if reported != size {
                tracing::error!(
                    position = self.position,
                    kind = %self.kind,
                    computed = size,
                    reported,
                    "profile record size disagrees with the VM"
                );
                return Err(ProfileError::SizeMismatch {
                    position: self.position,
                    tag: self.kind,
                    computed: size,
                    reported,
                }
                .into());
            }
        }
        Ok(size)
    }

    // ========================================================================
    // Observations
    // ========================================================================

    /// Whether an exception was thrown at this BCI
    pub fn exception_seen(&self) -> VmciResult<TriState> {
        let mask = self.data.layout().exception_seen_mask;
        Ok(TriState::from_bool(self.flags()? & mask != 0))
    }

    /// Whether a null operand was seen. `Unknown` for records without the
    /// null-seen bit.
    pub fn null_seen(&self) -> VmciResult<TriState> {
        if !self.kind.has_null_seen() {
            return Ok(TriState::Unknown);
        }
        let mask = self.data.layout().null_seen_mask;
        Ok(TriState::from_bool(self.flags()? & mask != 0))
    }

    /// Times the BCI was executed, saturated to `i32::MAX`, or -1 if the
    /// record does not count executions
    pub fn execution_count(&self) -> VmciResult<i32> {
        match self.kind {
            ProfileKind::Counter
            | ProfileKind::ReceiverType
            | ProfileKind::Ret
            | ProfileKind::CallType
            | ProfileKind::Jump => self
                .data
                .read_unsigned_int_as_signed_int(self.position, self.data.layout().cell_offset(0)),
            ProfileKind::VirtualCall | ProfileKind::VirtualCallType => {
                let layout = self.data.layout();
                let mut total = self.cell(0)?;
                for i in 0..layout.type_width {
                    total += self
                        .data
                        .read_unsigned_int(self.position, layout.type_count_offset(i))?;
                }
                Ok(truncate_long_to_int(total))
            }
            ProfileKind::Branch => {
                let (taken, not_taken) = self.branch_counts()?;
                Ok(truncate_long_to_int(taken + not_taken))
            }
            ProfileKind::MultiBranch => {
                let counts = self.switch_counts()?;
                Ok(truncate_long_to_int(counts.iter().sum()))
            }
            _ => Ok(-1),
        }
    }

    fn branch_counts(&self) -> VmciResult<(u64, u64)> {
        Ok((self.cell(0)?, self.cell(2)?))
    }

    /// Probability that the branch was taken, or -1 if unknown
    pub fn branch_taken_probability(&self) -> VmciResult<f64> {
        match self.kind {
            ProfileKind::Jump => Ok(if self.cell(0)? != 0 { 1.0 } else { 0.0 }),
            ProfileKind::Branch => {
                let (taken, not_taken) = self.branch_counts()?;
                let total = taken + not_taken;
                if total == 0 {
                    Ok(-1.0)
                } else {
                    Ok(taken as f64 / total as f64)
                }
            }
            _ => Ok(-1.0),
        }
    }

    /// Switch row counts with the default row first, as stored
    fn switch_counts(&self) -> VmciResult<Vec<u64>> {
        let layout = self.data.layout();
        let rows = self.cell(0)? / layout.multi_branch_row_cells();
        (0..rows)
            .map(|i| {
                self.data
                    .read_unsigned_int(self.position, layout.multi_branch_count_offset(i))
            })
            .collect()
    }

    /// Probability of each switch case, with the default case last. `None`
    /// if the switch never executed or this is not a switch record.
    pub fn switch_probabilities(&self) -> VmciResult<Option<Vec<f64>>> {
        if self.kind != ProfileKind::MultiBranch {
            return Ok(None);
        }
        let counts = self.switch_counts()?;
        let total: u64 = counts.iter().sum();
        let Some((default, cases)) = counts.split_first() else {
            return Ok(None);
        };
        if total == 0 {
            return Ok(None);
        }
        let total = total as f64;
        let mut probabilities: Vec<f64> = cases.iter().map(|c| *c as f64 / total).collect();
        probabilities.push(*default as f64 / total);
        Ok(Some(probabilities))
    }

    /// Receiver types seen at a type check or call, or `None`
    pub fn type_profile(&self) -> VmciResult<Option<JavaTypeProfile>> {
        let not_recorded = match self.kind {
            ProfileKind::ReceiverType => self.cell(1)?,
            ProfileKind::VirtualCall | ProfileKind::VirtualCallType => self.cell(0)?,
            _ => return Ok(None),
        };
        let layout = self.data.layout();
        let runtime = self.data.runtime();
        let mut raw = RawItemProfile::new();
        for i in 0..layout.type_width {
            let klass = self.data.read_word(self.position, layout.type_offset(i))?;
            if klass == 0 {
                continue;
            }
            let count = self
                .data
                .read_unsigned_int(self.position, layout.type_count_offset(i))?;
            raw.add(runtime.resolve_type(klass)?, count);
        }
        raw.total += not_recorded;

        let null_seen = self.null_seen()?;
        Ok(raw
            .normalize(layout.type_width)
            .map(|(items, not_recorded_probability)| JavaTypeProfile {
                null_seen,
                not_recorded_probability,
                types: items
                    .into_iter()
                    .map(|(item, probability)| ProfiledType { item, probability })
                    .collect(),
            }))
    }

    /// Call targets seen at a virtual call, or `None`
    pub fn method_profile(&self) -> VmciResult<Option<JavaMethodProfile>> {
        if !matches!(
            self.kind,
            ProfileKind::VirtualCall | ProfileKind::VirtualCallType
        ) {
            return Ok(None);
        }
        let layout = self.data.layout();
        let runtime = self.data.runtime();
        let mut raw = RawItemProfile::new();
        for i in 0..layout.method_width {
            let method = self.data.read_word(self.position, layout.method_offset(i))?;
            if method == 0 {
                continue;
            }
            let count = self
                .data
                .read_unsigned_int(self.position, layout.method_count_offset(i))?;
            raw.add(runtime.resolve_method(method)?, count);
        }
        raw.total += self.cell(1)?;

        Ok(raw
            .normalize(layout.method_width)
            .map(|(items, not_recorded_probability)| JavaMethodProfile {
                not_recorded_probability,
                methods: items
                    .into_iter()
                    .map(|(item, probability)| ProfiledMethod { item, probability })
                    .collect(),
            }))
    }

    /// One-line rendering of the record for diagnostics
    pub fn describe(&self) -> VmciResult<String> {
        let mut line = format!("{:>5}: {} bci={}", self.position, self.kind, self.bci()?);
        match self.kind {
            ProfileKind::Branch => {
                let (taken, not_taken) = self.branch_counts()?;
                line.push_str(&format!(" taken={} not_taken={}", taken, not_taken));
            }
            ProfileKind::MultiBranch => {
                let counts = self.switch_counts()?;
                line.push_str(&format!(" default={:?} cases={:?}", counts.first(), counts.get(1..)));
            }
            _ => {
                let count = self.execution_count()?;
                if count >= 0 {
                    line.push_str(&format!(" count={}", count));
                }
            }
        }
        if let Some(profile) = self.type_profile()? {
            for ty in &profile.types {
                line.push_str(&format!(" {}:{:.3}", ty.item.name()?, ty.probability));
            }
        }
        if self.flags()? & self.data.layout().exception_seen_mask != 0 {
            line.push_str(" exception_seen");
        }
        Ok(line)
    }
}

impl std::fmt::Debug for ProfileRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileRecord")
            .field("kind", &self.kind)
            .field("position", &self.position)
            .finish()
    }
}
