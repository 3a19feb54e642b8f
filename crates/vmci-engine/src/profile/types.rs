//! Profile results

use crate::meta::{ResolvedJavaMethod, ResolvedJavaType};
use std::sync::Arc;

/// A three-valued observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriState {
    /// Observed
    True,
    /// Known not to have been observed
    False,
    /// Not known
    Unknown,
}

impl TriState {
    /// `True` or `False`
    pub fn from_bool(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }

    /// Whether the state is `True`
    pub fn is_true(self) -> bool {
        self == TriState::True
    }
}

/// A receiver type with its observed probability
#[derive(Debug, Clone)]
pub struct ProfiledType {
    /// The receiver class
    pub item: Arc<ResolvedJavaType>,
    /// Fraction of executions that saw it
    pub probability: f64,
}

/// A call target with its observed probability
#[derive(Debug, Clone)]
pub struct ProfiledMethod {
    /// The target method
    pub item: Arc<ResolvedJavaMethod>,
    /// Fraction of executions that called it
    pub probability: f64,
}

/// Receiver types seen at a type check or call site.
///
/// Items are sorted by descending probability.
#[derive(Debug, Clone)]
pub struct JavaTypeProfile {
    /// Whether null was seen
    pub null_seen: TriState,
    /// Probability mass of types that did not fit in the table
    pub not_recorded_probability: f64,
    /// Recorded types
    pub types: Vec<ProfiledType>,
}

/// Call targets seen at a virtual call site.
///
/// Items are sorted by descending probability.
#[derive(Debug, Clone)]
pub struct JavaMethodProfile {
    /// Probability mass of targets that did not fit in the table
    pub not_recorded_probability: f64,
    /// Recorded targets
    pub methods: Vec<ProfiledMethod>,
}

/// Rows read from a type or method table, merged by item
pub(crate) struct RawItemProfile<T> {
    pub(crate) items: Vec<(Arc<T>, u64)>,
    pub(crate) total: u64,
}

impl<T: PartialEq> RawItemProfile<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }

    /// Add a row. The same item may occur in several rows, e.g. after class
    /// redefinition; counts of duplicates are summed.
    pub(crate) fn add(&mut self, item: Arc<T>, count: u64) {
        self.total += count;
        match self.items.iter_mut().find(|(existing, _)| **existing == *item) {
            Some((_, existing)) => *existing += count,
            None => self.items.push((item, count)),
        }
    }

    /// Normalize to `(item, probability)` sorted by descending probability,
    /// plus the not-recorded probability. `None` if nothing was recorded.
    pub(crate) fn normalize(self, width: u64) -> Option<(Vec<(Arc<T>, f64)>, f64)> {
        if self.items.is_empty() || self.total == 0 {
            return None;
        }
        let total = self.total as f64;
        let mut sum = 0.0;
        let mut items: Vec<(Arc<T>, f64)> = self
            .items
            .into_iter()
            .map(|(item, count)| {
                let p = count as f64 / total;
                sum += p;
                (item, p)
            })
            .collect();
        items.sort_by(|a, b| b.1.total_cmp(&a.1));
        let not_recorded = if (items.len() as u64) < width {
            0.0
        } else {
            (1.0 - sum).clamp(0.0, 1.0)
        };
        Some((items, not_recorded))
    }
}
