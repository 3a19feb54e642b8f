//! Record geometry

use crate::config::{DataLayoutTags, VmConfig};

/// Offsets within a profile record, derived from the VM configuration.
///
/// Offsets are relative to the start of the record. Cell `n` lives at
/// `cells_offset + n * cell_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    /// Offset of the tag byte
    pub tag_offset: u64,
    /// Offset of the flags byte
    pub flags_offset: u64,
    /// Offset of the u2 BCI
    pub bci_offset: u64,
    /// Offset of cell 0
    pub cells_offset: u64,
    /// Bytes per cell
    pub cell_size: u64,
    /// Rows in a receiver type table
    pub type_width: u64,
    /// Rows in a call target table
    pub method_width: u64,
    /// Rows in a ret target table
    pub bci_width: u64,
    /// Flags mask of the null-seen bit
    pub null_seen_mask: u8,
    /// Flags mask of the exception-seen bit
    pub exception_seen_mask: u8,
    /// Record tags
    pub tags: DataLayoutTags,
}

/// Cells per `(item, count)` row
const TYPE_ROW_CELLS: u64 = 2;
/// Cells per ret row
const RET_ROW_CELLS: u64 = 3;
/// Cells per switch row
const MULTI_BRANCH_ROW_CELLS: u64 = 2;

impl RecordLayout {
    /// Derive the layout from the resolved configuration
    pub fn from_config(config: &VmConfig) -> Self {
        let dl = &config.data_layout;
        Self {
            tag_offset: dl.tag_offset,
            flags_offset: dl.flags_offset,
            bci_offset: dl.bci_offset,
            cells_offset: dl.cells_offset,
            cell_size: dl.cell_size,
            type_width: config.type_profile_width as u64,
            method_width: config.method_profile_width as u64,
            bci_width: config.bci_profile_width as u64,
            null_seen_mask: 1 << dl.null_seen_flag,
            exception_seen_mask: 1 << dl.exception_seen_flag,
            tags: dl.tags,
        }
    }

    /// Offset of cell `index`
    pub fn cell_offset(&self, index: u64) -> u64 {
        self.cells_offset + index * self.cell_size
    }

    /// Bytes taken by `count` cells
    pub fn cells(&self, count: u64) -> u64 {
        count * self.cell_size
    }

    /// Offset of the `i`th receiver klass
    pub fn type_offset(&self, i: u64) -> u64 {
        self.cell_offset(2 + TYPE_ROW_CELLS * i)
    }

    /// Offset of the `i`th receiver count
    pub fn type_count_offset(&self, i: u64) -> u64 {
        self.type_offset(i) + self.cell_size
    }

    /// Offset of the `i`th call target method
    pub fn method_offset(&self, i: u64) -> u64 {
        self.type_offset(self.type_width + i)
    }

    /// Offset of the `i`th call target count
    pub fn method_count_offset(&self, i: u64) -> u64 {
        self.method_offset(i) + self.cell_size
    }

    /// Cells of a virtual call record before any type entries
    pub fn virtual_call_cells(&self) -> u64 {
        2 + TYPE_ROW_CELLS * (self.type_width + self.method_width)
    }

    /// Cells of a receiver type record
    pub fn receiver_type_cells(&self) -> u64 {
        2 + TYPE_ROW_CELLS * self.type_width
    }

    /// Cells of a ret record
    pub fn ret_cells(&self) -> u64 {
        1 + RET_ROW_CELLS * self.bci_width
    }

    /// Offset of the count of switch row `i`; row 0 is the default
    pub fn multi_branch_count_offset(&self, i: u64) -> u64 {
        self.cell_offset(1 + MULTI_BRANCH_ROW_CELLS * i)
    }

    /// Cells per switch row
    pub fn multi_branch_row_cells(&self) -> u64 {
        MULTI_BRANCH_ROW_CELLS
    }
}
