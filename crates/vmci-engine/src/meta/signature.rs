//! Method descriptors

use super::{MetadataError, MetadataResult};
use std::fmt;
use vmci_sdk::JavaKind;

/// A parsed method descriptor such as `(I[Ljava/lang/String;)V`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    descriptor: String,
    parameters: Vec<String>,
    return_type: String,
}

impl Signature {
    /// Parse a method descriptor
    pub fn parse(descriptor: &str) -> MetadataResult<Self> {
        let malformed = |reason| MetadataError::MalformedSignature {
            signature: descriptor.to_string(),
            reason,
        };
        let body = descriptor
            .strip_prefix('(')
            .ok_or_else(|| malformed("missing '('"))?;
        let close = body.find(')').ok_or_else(|| malformed("missing ')'"))?;

        let mut parameters = Vec::new();
        let mut rest = &body[..close];
        while !rest.is_empty() {
            if rest.starts_with('V') {
                return Err(malformed("void parameter"));
            }
            let len = field_descriptor_len(rest).ok_or_else(|| malformed("bad parameter type"))?;
            parameters.push(rest[..len].to_string());
            rest = &rest[len..];
        }

        let ret = &body[close + 1..];
        if field_descriptor_len(ret) != Some(ret.len()) {
            return Err(malformed("bad return type"));
        }

        Ok(Self {
            descriptor: descriptor.to_string(),
            parameters,
            return_type: ret.to_string(),
        })
    }

    /// The descriptor text
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Number of declared parameters, plus one for the receiver if requested
    pub fn parameter_count(&self, with_receiver: bool) -> usize {
        self.parameters.len() + usize::from(with_receiver)
    }

    /// Descriptor of the `index`th declared parameter
    pub fn parameter_type(&self, index: usize) -> Option<&str> {
        self.parameters.get(index).map(String::as_str)
    }

    /// Kind of the `index`th declared parameter
    pub fn parameter_kind(&self, index: usize) -> Option<JavaKind> {
        self.parameter_type(index).and_then(descriptor_kind)
    }

    /// Descriptor of the return type
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Kind of the return type
    pub fn return_kind(&self) -> JavaKind {
        descriptor_kind(&self.return_type).unwrap_or(JavaKind::Illegal)
    }

    /// Local variable slots taken by the declared parameters
    pub fn parameter_slots(&self) -> usize {
        self.parameters
            .iter()
            .filter_map(|p| descriptor_kind(p))
            .map(|kind| if kind.needs_two_slots() { 2 } else { 1 })
            .sum()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

/// Kind denoted by a field descriptor
pub(crate) fn descriptor_kind(descriptor: &str) -> Option<JavaKind> {
    descriptor.chars().next().and_then(JavaKind::from_type_char)
}

/// Length of the field descriptor at the start of `s`
fn field_descriptor_len(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let dims = bytes.iter().take_while(|b| **b == b'[').count();
    match bytes.get(dims)? {
        b'L' => s[dims..].find(';').filter(|end| *end > 1).map(|end| dims + end + 1),
        b'Z' | b'B' | b'S' | b'C' | b'I' | b'F' | b'J' | b'D' => Some(dims + 1),
        b'V' if dims == 0 => Some(1),
        _ => None,
    }
}
