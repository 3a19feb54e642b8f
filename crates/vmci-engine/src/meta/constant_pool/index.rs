//! Conversions between instruction operands and constant pool indices
//!
//! After linking, the operand of a field access or invoke instruction is a
//! constant pool cache index. The decoder sees it offset by the cache tag, so
//! it cannot be confused with a plain constant pool index. An invokedynamic
//! operand is the bitwise complement of its cache index and therefore always
//! negative. Every other instruction operand is a plain constant pool index.

use crate::meta::{MetadataError, MetadataResult, Opcode};

/// Whether `index` is an encoded invokedynamic operand
pub fn is_invokedynamic_index(index: i32) -> bool {
    index < 0
}

/// Cache index of an encoded invokedynamic operand
pub fn decode_invokedynamic_index(index: i32) -> i32 {
    !index
}

/// Encoded invokedynamic operand of a cache index
pub fn encode_invokedynamic_index(index: i32) -> i32 {
    !index
}

/// Tagged cache index for the operand of `opcode`.
///
/// The result is only meaningful if `opcode` is the instruction the operand
/// came from: passing a field opcode for an invokedynamic operand, or the
/// reverse, yields a well-formed but wrong index.
pub fn raw_index_to_cache_index(raw: i32, opcode: Opcode, cache_tag: i32) -> MetadataResult<i32> {
    if opcode == Opcode::InvokeDynamic {
        if !is_invokedynamic_index(raw) {
            return Err(MetadataError::NotInvokedynamicIndex(raw));
        }
        Ok(raw)
    } else if opcode.is_field_access() || opcode.is_tagged_invoke() {
        Ok(raw + cache_tag)
    } else {
        Err(MetadataError::UnexpectedOpcode(opcode))
    }
}

/// Inverse of [`raw_index_to_cache_index`]
pub fn cache_index_to_raw_index(index: i32, opcode: Opcode, cache_tag: i32) -> MetadataResult<i32> {
    if opcode == Opcode::InvokeDynamic {
        if !is_invokedynamic_index(index) {
            return Err(MetadataError::NotInvokedynamicIndex(index));
        }
        Ok(index)
    } else if opcode.is_field_access() || opcode.is_tagged_invoke() {
        Ok(index - cache_tag)
    } else {
        Err(MetadataError::UnexpectedOpcode(opcode))
    }
}

/// Position in the constant pool cache of a tagged or invokedynamic index
pub fn decode_cache_index(index: i32, cache_tag: i32) -> i32 {
    if is_invokedynamic_index(index) {
        decode_invokedynamic_index(index)
    } else {
        index - cache_tag
    }
}
