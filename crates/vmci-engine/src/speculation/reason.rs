//! Speculation reasons and reason groups

use super::{SpeculationEncoding, SpeculationError, SpeculationResult};
use crate::meta::{ResolvedJavaMethod, ResolvedJavaType};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Why a speculation was made. Reasons that encode to the same bytes are
/// the same speculation.
pub trait SpeculationReason: fmt::Debug + Send + Sync {
    /// Append this reason's identity to `encoding`
    fn encode(&self, encoding: &mut SpeculationEncoding);
}

static NEXT_GROUP_ID: AtomicI32 = AtomicI32::new(1);

// ============================================================================
// Context values
// ============================================================================

/// Type of one context slot of a [`SpeculationReasonGroup`]
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    String,
    Method,
    Type,
}

/// A context value identifying one reason within a group
#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub enum ContextValue {
    Boolean(bool),
    Byte(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    String(Option<String>),
    Method(Arc<ResolvedJavaMethod>),
    Type(Arc<ResolvedJavaType>),
}

impl ContextValue {
    /// Slot type this value fills
    pub fn kind(&self) -> ContextKind {
        match self {
            ContextValue::Boolean(_) => ContextKind::Boolean,
            ContextValue::Byte(_) => ContextKind::Byte,
            ContextValue::Short(_) => ContextKind::Short,
            ContextValue::Int(_) => ContextKind::Int,
            ContextValue::Long(_) => ContextKind::Long,
            ContextValue::String(_) => ContextKind::String,
            ContextValue::Method(_) => ContextKind::Method,
            ContextValue::Type(_) => ContextKind::Type,
        }
    }

    fn encode(&self, encoding: &mut SpeculationEncoding) {
        match self {
            ContextValue::Boolean(v) => encoding.add_byte(*v as u8),
            ContextValue::Byte(v) => encoding.add_byte(*v),
            ContextValue::Short(v) => encoding.add_short(*v),
            ContextValue::Int(v) => encoding.add_int(*v),
            ContextValue::Long(v) => encoding.add_long(*v),
            ContextValue::String(v) => encoding.add_string(v.as_deref()),
            ContextValue::Method(m) => encoding.add_method(m),
            ContextValue::Type(t) => encoding.add_type(t),
        }
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        use ContextValue::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Method(a), Method(b)) => a.method_pointer() == b.method_pointer(),
            (Type(a), Type(b)) => a.klass_pointer() == b.klass_pointer(),
            _ => false,
        }
    }
}

// ============================================================================
// Groups
// ============================================================================

/// A family of reasons sharing a name and a context signature, e.g. "null
/// check at (method, bci)". Each group gets a process-unique id.
#[derive(Debug)]
pub struct SpeculationReasonGroup {
    id: i32,
    name: String,
    signature: Vec<ContextKind>,
}

impl SpeculationReasonGroup {
    /// Create a group whose reasons carry context of the given kinds
    pub fn new(name: impl Into<String>, signature: &[ContextKind]) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            signature: signature.to_vec(),
        })
    }

    /// Process-unique id, the first encoded value of every reason
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Diagnostic name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kinds of the context values
    pub fn signature(&self) -> &[ContextKind] {
        &self.signature
    }

    /// Reason of this group for `context`, which must match the signature
    pub fn create_reason(
        self: &Arc<Self>,
        context: Vec<ContextValue>,
    ) -> SpeculationResult<Arc<GroupedReason>> {
        if context.len() != self.signature.len() {
            return Err(SpeculationError::ContextMismatch {
                group: self.name.clone(),
                message: format!(
                    "expected {} values, got {}",
                    self.signature.len(),
                    context.len()
                ),
            });
        }
        for (i, (value, expected)) in context.iter().zip(&self.signature).enumerate() {
            if value.kind() != *expected {
                return Err(SpeculationError::ContextMismatch {
                    group: self.name.clone(),
                    message: format!("value {} is {:?}, expected {:?}", i, value.kind(), expected),
                });
            }
        }
        Ok(Arc::new(GroupedReason {
            group: self.clone(),
            context,
        }))
    }
}

/// A reason created by a [`SpeculationReasonGroup`]
pub struct GroupedReason {
    group: Arc<SpeculationReasonGroup>,
    context: Vec<ContextValue>,
}

impl GroupedReason {
    /// Group the reason belongs to
    pub fn group(&self) -> &Arc<SpeculationReasonGroup> {
        &self.group
    }

    /// Context values, in signature order
    pub fn context(&self) -> &[ContextValue] {
        &self.context
    }
}

impl SpeculationReason for GroupedReason {
    fn encode(&self, encoding: &mut SpeculationEncoding) {
        encoding.add_int(self.group.id);
        for value in &self.context {
            value.encode(encoding);
        }
    }
}

impl PartialEq for GroupedReason {
    fn eq(&self, other: &Self) -> bool {
        self.group.id == other.group.id && self.context == other.context
    }
}

impl fmt::Debug for GroupedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.group.name, self.group.id)?;
        f.debug_list().entries(&self.context).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(reason: &dyn SpeculationReason) -> Vec<u8> {
        let mut encoding = SpeculationEncoding::new();
        reason.encode(&mut encoding);
        encoding.as_bytes().to_vec()
    }

    #[test]
    fn test_group_ids_unique() {
        let a = SpeculationReasonGroup::new("a", &[]);
        let b = SpeculationReasonGroup::new("b", &[]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_reason_encoding() {
        let group = SpeculationReasonGroup::new("bounds", &[ContextKind::Int, ContextKind::Boolean]);
        let reason = group
            .create_reason(vec![ContextValue::Int(7), ContextValue::Boolean(true)])
            .unwrap();
        let mut expected = group.id().to_be_bytes().to_vec();
        expected.extend_from_slice(&[0, 0, 0, 7, 1]);
        assert_eq!(encode(reason.as_ref()), expected);

        let same = group
            .create_reason(vec![ContextValue::Int(7), ContextValue::Boolean(true)])
            .unwrap();
        assert_eq!(*reason, *same);
    }

    #[test]
    fn test_context_mismatch() {
        let group = SpeculationReasonGroup::new("g", &[ContextKind::Long]);
        assert!(matches!(
            group.create_reason(vec![]),
            Err(SpeculationError::ContextMismatch { .. })
        ));
        assert!(matches!(
            group.create_reason(vec![ContextValue::Int(1)]),
            Err(SpeculationError::ContextMismatch { .. })
        ));
    }
}
