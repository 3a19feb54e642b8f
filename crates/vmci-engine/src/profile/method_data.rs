//! Raw access to a `MethodData`

use super::{ProfileError, ProfileKind, ProfileRecord, RecordLayout};
use crate::config::VmConfig;
use crate::runtime::VmciRuntime;
use crate::VmciResult;
use std::fmt;
use std::sync::Arc;
use vmci_sdk::VmBoundary;

/// The profile of one method
pub struct MethodData {
    runtime: Arc<VmciRuntime>,
    pointer: u64,
    layout: RecordLayout,
    normal_size: i32,
    extra_size: i32,
}

impl MethodData {
    /// Wrap the `MethodData*` at `pointer`
    pub fn new(runtime: Arc<VmciRuntime>, pointer: u64) -> VmciResult<Self> {
        let config = runtime.vm_config();
        let boundary = runtime.boundary();
        let total = boundary.read_i32(pointer + config.method_data_size_offset)?;
        let normal_size = boundary.read_i32(pointer + config.method_data_data_size_offset)?;
        let extra_size = total - config.method_data_oop_data_offset as i32 - normal_size;
        let layout = RecordLayout::from_config(config);
        Ok(Self {
            runtime,
            pointer,
            layout,
            normal_size,
            extra_size: extra_size.max(0),
        })
    }

    pub(crate) fn runtime(&self) -> &Arc<VmciRuntime> {
        &self.runtime
    }

    fn config(&self) -> &VmConfig {
        self.runtime.vm_config()
    }

    fn boundary(&self) -> &dyn VmBoundary {
        self.runtime.boundary().as_ref()
    }

    /// The `MethodData*`
    pub fn pointer(&self) -> u64 {
        self.pointer
    }

    /// Record geometry
    pub fn layout(&self) -> &RecordLayout {
        &self.layout
    }

    /// Bytes of the normal region
    pub fn normal_data_size(&self) -> i32 {
        self.normal_size
    }

    /// Bytes of the extra region
    pub fn extra_data_size(&self) -> i32 {
        self.extra_size
    }

    /// Position of the first extra record
    pub fn extra_data_begin(&self) -> i32 {
        self.normal_size
    }

    /// Whether `position` lies inside either region
    pub fn is_within(&self, position: i32) -> bool {
        position >= 0 && position < self.normal_size + self.extra_size
    }

    // ========================================================================
    // Cell access
    // ========================================================================

    fn full_offset(&self, position: i32, offset: u64) -> u64 {
        self.pointer + self.config().method_data_oop_data_offset + position as u64 + offset
    }

    pub(crate) fn read_unsigned_byte(&self, position: i32, offset: u64) -> VmciResult<u8> {
        Ok(self.boundary().read_u8(self.full_offset(position, offset))?)
    }

    pub(crate) fn read_unsigned_short(&self, position: i32, offset: u64) -> VmciResult<u16> {
        Ok(self.boundary().read_u16(self.full_offset(position, offset))?)
    }

    /// Low 32 bits of a cell
    pub(crate) fn read_unsigned_int(&self, position: i32, offset: u64) -> VmciResult<u64> {
        Ok(self.read_word(position, offset)? & 0xFFFF_FFFF)
    }

    /// Low 32 bits of a cell, saturated to `i32::MAX`
    pub(crate) fn read_unsigned_int_as_signed_int(&self, position: i32, offset: u64) -> VmciResult<i32> {
        Ok(truncate_long_to_int(self.read_unsigned_int(position, offset)?))
    }

    /// Full cell, e.g. a metadata pointer
    pub(crate) fn read_word(&self, position: i32, offset: u64) -> VmciResult<u64> {
        Ok(self.boundary().read_u64(self.full_offset(position, offset))?)
    }

    // ========================================================================
    // Records
    // ========================================================================

    /// Record at `position`, or `None` where the tag is the no-data tag
    pub fn record_at(&self, position: i32) -> VmciResult<Option<ProfileRecord<'_>>> {
        if !self.is_within(position) {
            return Err(ProfileError::OutOfBounds {
                position,
                size: self.normal_size + self.extra_size,
            }
            .into());
        }
        let tag = self.read_unsigned_byte(position, self.layout.tag_offset)?;
        if tag == self.layout.tags.no {
            return Ok(None);
        }
        match ProfileKind::from_tag(tag, &self.layout) {
            Some(kind) => Ok(Some(ProfileRecord::new(self, kind, position))),
            None => Err(ProfileError::UnknownTag { position, tag }.into()),
        }
    }

    /// Record at `position` in the normal region
    pub fn normal_record_at(&self, position: i32) -> VmciResult<Option<ProfileRecord<'_>>> {
        if position >= self.normal_size {
            return Ok(None);
        }
        self.record_at(position)
    }

    /// Record at `position` in the extra region
    pub fn extra_record_at(&self, position: i32) -> VmciResult<Option<ProfileRecord<'_>>> {
        if position >= self.normal_size + self.extra_size {
            return Ok(None);
        }
        self.record_at(position)
    }

    /// Every record of the normal region, in order
    pub fn normal_records(&self) -> VmciResult<Vec<ProfileRecord<'_>>> {
        let mut records = Vec::new();
        let mut position = 0;
        while let Some(record) = self.normal_record_at(position)? {
            position += record.size()?;
            records.push(record);
        }
        Ok(records)
    }

    /// Every record of the extra region up to the first free slot
    pub fn extra_records(&self) -> VmciResult<Vec<ProfileRecord<'_>>> {
        let mut records = Vec::new();
        let mut position = self.extra_data_begin();
        while let Some(record) = self.extra_record_at(position)? {
            position += record.size()?;
            records.push(record);
        }
        Ok(records)
    }

    /// Size of a record as the VM computes it
    pub(crate) fn vm_record_size(&self, position: i32) -> VmciResult<i32> {
        Ok(self
            .boundary()
            .method_data_profile_data_size(self.pointer, position)?)
    }

    pub(crate) fn verify_sizes(&self) -> bool {
        self.runtime.options().verify_profile_sizes
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Whether the VM considers the profile mature
    pub fn is_profile_mature(&self) -> VmciResult<bool> {
        Ok(self.boundary().is_mature(self.pointer)?)
    }

    /// Traps recorded for deoptimization `reason`, or -1 if the reason has
    /// no trap history slot
    pub fn deoptimization_count(&self, reason: i32) -> VmciResult<i32> {
        let config = self.config();
        if reason < 0 || reason as u64 >= config.trap_history_length {
            return Ok(-1);
        }
        let address = self.pointer + config.method_data_trap_history_offset + reason as u64;
        Ok(self.boundary().read_u8(address)? as i32)
    }

    fn read_counter(&self, offset: u64) -> VmciResult<i32> {
        let value = self.boundary().read_u32(self.pointer + offset)?;
        Ok(truncate_long_to_int(value as u64))
    }

    /// Times the method was deoptimized and recompiled
    pub fn decompile_count(&self) -> VmciResult<i32> {
        self.read_counter(self.config().method_data_decompiles_offset)
    }

    /// Recompilations caused by trap counter overflow
    pub fn overflow_recompile_count(&self) -> VmciResult<i32> {
        self.read_counter(self.config().method_data_overflow_recompiles_offset)
    }

    /// Traps that overflowed the per-BCI history
    pub fn overflow_trap_count(&self) -> VmciResult<i32> {
        self.read_counter(self.config().method_data_overflow_traps_offset)
    }

    /// Size of the last compiled IR, or -1 if the VM does not track it
    pub fn compiled_ir_size(&self) -> VmciResult<i32> {
        match self.config().method_data_ir_size_offset {
            Some(offset) => Ok(self.boundary().read_i32(self.pointer + offset)?),
            None => Ok(-1),
        }
    }
}

impl fmt::Debug for MethodData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodData")
            .field("pointer", &format_args!("{:#x}", self.pointer))
            .field("normal_size", &self.normal_size)
            .field("extra_size", &self.extra_size)
            .finish()
    }
}

impl fmt::Display for MethodData {
    /// One line per record of both regions, for diagnostics
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let normal = self.normal_records().map_err(|_| fmt::Error)?;
        let extra = self.extra_records().map_err(|_| fmt::Error)?;
        for record in normal {
            writeln!(f, "{}", record.describe().map_err(|_| fmt::Error)?)?;
        }
        if !extra.is_empty() {
            writeln!(f, "--- extra data ---")?;
            for record in extra {
                writeln!(f, "{}", record.describe().map_err(|_| fmt::Error)?)?;
            }
        }
        Ok(())
    }
}

/// Saturate an unsigned count to `i32::MAX`
pub(crate) fn truncate_long_to_int(value: u64) -> i32 {
    if value > i32::MAX as u64 {
        i32::MAX
    } else {
        value as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_long_to_int(5), 5);
        assert_eq!(truncate_long_to_int(0xFFFF_FFFF), i32::MAX);
        assert_eq!(truncate_long_to_int(i32::MAX as u64), i32::MAX);
    }
}
