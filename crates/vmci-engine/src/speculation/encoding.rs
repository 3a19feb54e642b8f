//! Byte encoding of speculation reasons

use crate::meta::{ResolvedJavaMethod, ResolvedJavaType};
use sha1::{Digest, Sha1};

/// Longest encoding stored verbatim; the length must fit in 5 bits
pub const MAX_ENCODING_LENGTH: usize = 31;
/// Length of the digest substituted for longer encodings
pub const DIGEST_LENGTH: usize = 20;

/// Accumulates the encoding of one reason. All values are big-endian.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeculationEncoding {
    bytes: Vec<u8>,
}

impl SpeculationEncoding {
    /// Start an empty encoding
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte
    pub fn add_byte(&mut self, value: u8) {
        self.bytes.push(value);
    }

    /// Append a 16-bit value
    pub fn add_short(&mut self, value: i16) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a 32-bit value
    pub fn add_int(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a 64-bit value
    pub fn add_long(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_be_bytes());
    }

    /// Length-prefixed UTF-8 bytes; `None` is encoded as length -1
    pub fn add_string(&mut self, value: Option<&str>) {
        match value {
            None => self.add_int(-1),
            Some(s) => {
                self.add_int(s.len() as i32);
                self.bytes.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Identifies a method by its metadata pointer
    pub fn add_method(&mut self, method: &ResolvedJavaMethod) {
        self.add_long(method.method_pointer() as i64);
    }

    /// Identifies a type by its metadata pointer
    pub fn add_type(&mut self, ty: &ResolvedJavaType) {
        self.add_long(ty.klass_pointer() as i64);
    }

    /// Bytes added so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes added
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether nothing was added
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The form recorded by the VM: the bytes themselves, or their SHA-1
    /// digest when longer than [`MAX_ENCODING_LENGTH`]
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.bytes.len() > MAX_ENCODING_LENGTH {
            Sha1::digest(&self.bytes).to_vec()
        } else {
            self.bytes.clone()
        }
    }
}
