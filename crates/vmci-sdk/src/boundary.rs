//! The synchronous call interface to the host VM
//!
//! Every query the compiler interface makes of the VM goes through
//! [`VmBoundary`]. Calls block until the VM answers and are never cancelled.
//! Implementations must tolerate concurrent calls from several compiler
//! threads, and `delete_global_handle` must tolerate being called from any
//! thread.
//!
//! Constant pool queries that take a `which` index accept either a plain
//! constant pool index, a constant pool cache index (plain index plus the
//! `ConstantPool::CPCACHE_INDEX_TAG` constant), or a complemented
//! invokedynamic index.

use crate::error::{BoundaryError, BoundaryResult};
use crate::types::{ConfigTable, ConfigValue, KlassRef, RawConstant, ResolvedFieldInfo};

/// Call interface supplied by the host VM
pub trait VmBoundary: Send + Sync {
    // ========================================================================
    // Configuration
    // ========================================================================

    /// Read the full configuration table. Called once at startup.
    fn read_configuration(&self) -> BoundaryResult<ConfigTable>;

    /// Query a flag that was not part of the startup table
    fn get_flag_value(&self, name: &str) -> Option<ConfigValue>;

    // ========================================================================
    // Raw memory
    // ========================================================================

    /// Copy `len` bytes starting at `address`
    fn read_bytes(&self, address: u64, len: usize) -> BoundaryResult<Vec<u8>>;

    /// Read an unsigned byte
    fn read_u8(&self, address: u64) -> BoundaryResult<u8> {
        Ok(self.read_bytes(address, 1)?[0])
    }

    /// Read a little-endian u16
    fn read_u16(&self, address: u64) -> BoundaryResult<u16> {
        let b = self.read_bytes(address, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Read a little-endian u32
    fn read_u32(&self, address: u64) -> BoundaryResult<u32> {
        let b = self.read_bytes(address, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a little-endian u64
    fn read_u64(&self, address: u64) -> BoundaryResult<u64> {
        let b = self.read_bytes(address, 8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(&b);
        Ok(u64::from_le_bytes(word))
    }

    /// Read a little-endian i32
    fn read_i32(&self, address: u64) -> BoundaryResult<i32> {
        Ok(self.read_u32(address)? as i32)
    }

    /// Read a little-endian i64
    fn read_i64(&self, address: u64) -> BoundaryResult<i64> {
        Ok(self.read_u64(address)? as i64)
    }

    /// Decode a symbol to a string
    fn get_symbol(&self, symbol: u64) -> BoundaryResult<String>;

    // ========================================================================
    // Handles
    // ========================================================================

    /// Register a metadata pointer so the VM keeps it alive
    fn acquire_metadata_handle(&self, metadata: u64) -> BoundaryResult<i64>;

    /// Release a handle returned by `acquire_metadata_handle`
    fn release_metadata_handle(&self, handle: i64);

    /// Delete a global object handle
    fn delete_global_handle(&self, handle: i64);

    /// Compare the objects two global handles refer to
    fn objects_equal(&self, a: i64, b: i64) -> BoundaryResult<bool>;

    // ========================================================================
    // Profiling
    // ========================================================================

    /// Size of the profile record at `position`, as the VM computes it
    fn method_data_profile_data_size(&self, method_data: u64, position: i32)
        -> BoundaryResult<i32>;

    /// Whether the VM considers the profile mature
    fn is_mature(&self, method_data: u64) -> BoundaryResult<bool>;

    // ========================================================================
    // Types
    // ========================================================================

    /// Look up a class by name. With `resolve` set, a missing class is an error.
    fn lookup_type(
        &self,
        name: &str,
        accessing: Option<u64>,
        resolve: bool,
    ) -> BoundaryResult<Option<u64>>;

    /// Run class initialization if it has not run yet
    fn ensure_initialized(&self, klass: u64) -> BoundaryResult<()>;

    // ========================================================================
    // Constant pools
    // ========================================================================

    /// Resolve a String, MethodHandle, MethodType or Dynamic entry. An
    /// object result is a new global handle owned by the caller.
    fn resolve_possibly_cached_constant(&self, pool: u64, cpi: i32)
        -> BoundaryResult<RawConstant>;

    /// Class at a Class entry, without triggering loading
    fn lookup_klass_in_pool(&self, pool: u64, cpi: i32) -> BoundaryResult<KlassRef>;

    /// Resolve the class at a Class entry, loading it if needed
    fn resolve_type_in_pool(&self, pool: u64, cpi: i32) -> BoundaryResult<u64>;

    /// Method referenced at `which` if it is already linked
    fn lookup_method_in_pool(&self, pool: u64, which: i32, opcode: u8)
        -> BoundaryResult<Option<u64>>;

    /// Link the field referenced at `which`
    fn resolve_field_in_pool(
        &self,
        pool: u64,
        which: i32,
        method: Option<u64>,
        opcode: u8,
    ) -> BoundaryResult<ResolvedFieldInfo>;

    /// NameAndType index of the member reference at `which`
    fn lookup_name_and_type_ref_index(&self, pool: u64, which: i32) -> BoundaryResult<i32>;

    /// Class index of the member reference at `which`
    fn lookup_klass_ref_index(&self, pool: u64, which: i32) -> BoundaryResult<i32>;

    /// Member name of the reference at `which`
    fn lookup_name_in_pool(&self, pool: u64, which: i32) -> BoundaryResult<String>;

    /// Member descriptor of the reference at `which`
    fn lookup_signature_in_pool(&self, pool: u64, which: i32) -> BoundaryResult<String>;

    /// Constant pool index behind a cache index
    fn remap_instruction_operand_from_cache(&self, pool: u64, index: i32) -> BoundaryResult<i32>;

    /// Link the call site of an invokedynamic instruction
    fn resolve_invoke_dynamic_in_pool(&self, pool: u64, index: i32) -> BoundaryResult<()>;

    /// Link a signature-polymorphic invocation
    fn resolve_invoke_handle_in_pool(&self, pool: u64, index: i32) -> BoundaryResult<()>;

    /// Appendix argument of a linked call site, as a new global handle
    fn lookup_appendix_in_pool(&self, pool: u64, index: i32) -> BoundaryResult<RawConstant>;

    // ========================================================================
    // Failed speculations
    // ========================================================================

    /// Allocate a failed-speculation list not owned by any method
    fn allocate_failed_speculations_list(&self) -> BoundaryResult<u64> {
        Err(BoundaryError::Unsupported(
            "allocate_failed_speculations_list".to_string(),
        ))
    }

    /// Failed-speculation list owned by a method's profile
    fn get_failed_speculations_address(&self, method: u64) -> BoundaryResult<u64>;

    /// Snapshot of the failed-speculation list at `address`
    fn get_failed_speculations(
        &self,
        address: u64,
        current: &[Vec<u8>],
    ) -> BoundaryResult<Vec<Vec<u8>>>;

    /// Record a failed speculation. Returns false if it was already present.
    fn add_failed_speculation(&self, address: u64, speculation: &[u8]) -> BoundaryResult<bool>;

    /// Free a failed-speculation list
    fn release_failed_speculations(&self, address: u64);
}
