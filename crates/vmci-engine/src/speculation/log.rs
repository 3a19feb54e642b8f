//! Per-compilation record of speculations

use super::{SpeculationEncoding, SpeculationError, SpeculationReason};
use crate::handles::{Cleaner, CleanupAction};
use crate::runtime::VmciRuntime;
use crate::VmciResult;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Id denoting "no speculation"
pub const NO_SPECULATION: i64 = 0;

const LENGTH_BITS: u32 = 5;
const LENGTH_MASK: i64 = (1 << LENGTH_BITS) - 1;

/// A speculation made through a [`SpeculationLog`]
#[derive(Debug, Clone)]
pub struct Speculation {
    id: i64,
    encoding: Arc<[u8]>,
    original: Arc<[u8]>,
    reason: Arc<dyn SpeculationReason>,
}

impl Speculation {
    /// `(offset << 5) | length` of the encoding within the flattened table
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Bytes the VM records if the speculation fails. A digest when the
    /// reason's encoding is too long to store.
    pub fn encoding(&self) -> &[u8] {
        &self.encoding
    }

    /// Encoding of the reason as produced, before any digest
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// Reason the speculation was made for
    pub fn reason(&self) -> &Arc<dyn SpeculationReason> {
        &self.reason
    }
}

#[derive(Default)]
struct LogState {
    speculations: Vec<Speculation>,
    by_encoding: FxHashMap<Arc<[u8]>, usize>,
    by_offset: FxHashMap<usize, usize>,
    flattened_length: usize,
    failed: Vec<Vec<u8>>,
}

/// Speculations made during one compilation, checked against the failed
/// speculations the VM recorded for the compiled method.
///
/// Reasons with byte-identical encodings share one entry, so ids are stable
/// and the flattened table holds no duplicates.
pub struct SpeculationLog {
    runtime: Arc<VmciRuntime>,
    address: u64,
    /// Set when this log allocated its failed-speculation list
    owner: Option<Cleaner>,
    state: Mutex<LogState>,
}

impl SpeculationLog {
    /// Log with its own failed-speculation list, freed when the log drops
    pub fn new(runtime: Arc<VmciRuntime>) -> VmciResult<Self> {
        let boundary = runtime.boundary().clone();
        let address = boundary.allocate_failed_speculations_list()?;
        tracing::debug!(address = format_args!("{:#x}", address), "allocated failed-speculation list");
        Ok(Self {
            runtime,
            address,
            owner: Some(Cleaner::new(
                boundary,
                CleanupAction::ReleaseFailedSpeculations(address),
            )),
            state: Mutex::new(LogState::default()),
        })
    }

    /// Log reading the failed-speculation list of the method at `method`
    pub fn for_method(runtime: Arc<VmciRuntime>, method: u64) -> VmciResult<Self> {
        let address = runtime.boundary().get_failed_speculations_address(method)?;
        Ok(Self {
            runtime,
            address,
            owner: None,
            state: Mutex::new(LogState::default()),
        })
    }

    /// Address of the failed-speculation list
    pub fn failed_speculations_address(&self) -> u64 {
        self.address
    }

    /// Whether this log owns and frees its list
    pub fn is_managed(&self) -> bool {
        self.owner.is_some()
    }

    fn encode(reason: &dyn SpeculationReason) -> VmciResult<(Vec<u8>, Vec<u8>)> {
        let mut encoding = SpeculationEncoding::new();
        reason.encode(&mut encoding);
        if encoding.is_empty() {
            return Err(SpeculationError::EmptyEncoding(format!("{:?}", reason)).into());
        }
        let stored = encoding.to_bytes();
        Ok((stored, encoding.as_bytes().to_vec()))
    }

    /// Refresh the snapshot of failed speculations from the VM
    pub fn collect_failed_speculations(&self) -> VmciResult<()> {
        let mut state = self.state.lock();
        self.collect_locked(&mut state)
    }

    fn collect_locked(&self, state: &mut LogState) -> VmciResult<()> {
        let failed = self
            .runtime
            .boundary()
            .get_failed_speculations(self.address, &state.failed)?;
        if failed.len() != state.failed.len() {
            tracing::debug!(
                address = format_args!("{:#x}", self.address),
                failed = failed.len(),
                "collected failed speculations"
            );
        }
        state.failed = failed;
        Ok(())
    }

    /// Whether `reason` is not among the failed speculations collected so
    /// far
    pub fn may_speculate(&self, reason: &dyn SpeculationReason) -> VmciResult<bool> {
        let (stored, _) = Self::encode(reason)?;
        let state = self.state.lock();
        Ok(!state.failed.iter().any(|failed| *failed == stored))
    }

    /// Record a speculation on `reason` and return it with its id
    pub fn speculate(&self, reason: Arc<dyn SpeculationReason>) -> VmciResult<Speculation> {
        let (stored, original) = Self::encode(reason.as_ref())?;
        let mut state = self.state.lock();
        if let Some(&index) = state.by_encoding.get(stored.as_slice()) {
            return Ok(state.speculations[index].clone());
        }

        let id = ((state.flattened_length as i64) << LENGTH_BITS) | stored.len() as i64;
        let encoding: Arc<[u8]> = stored.into();
        let speculation = Speculation {
            id,
            encoding: encoding.clone(),
            original: original.into(),
            reason,
        };
        let index = state.speculations.len();
        let offset = state.flattened_length;
        state.flattened_length += encoding.len();
        state.by_encoding.insert(encoding, index);
        state.by_offset.insert(offset, index);
        state.speculations.push(speculation.clone());
        tracing::trace!(id, reason = ?speculation.reason, "recorded speculation");
        Ok(speculation)
    }

    /// Speculation with `id`, or `None` for [`NO_SPECULATION`]
    pub fn lookup_speculation(&self, id: i64) -> VmciResult<Option<Speculation>> {
        if id == NO_SPECULATION {
            return Ok(None);
        }
        let (offset, length) = decode_id(id);
        let state = self.state.lock();
        match state.by_offset.get(&offset) {
            Some(&index) if state.speculations[index].encoding.len() == length => {
                Ok(Some(state.speculations[index].clone()))
            }
            _ => Err(SpeculationError::UnknownId(id).into()),
        }
    }

    /// Whether any speculation was recorded
    pub fn has_speculations(&self) -> bool {
        !self.state.lock().speculations.is_empty()
    }

    /// Concatenated encodings of all speculations, in id order.
    ///
    /// With `validate`, failures recorded since the last collection are
    /// fetched first; if any of them is a speculation of this log the
    /// compilation is invalid and [`SpeculationError::Failed`] is returned.
    pub fn flattened_speculations(&self, validate: bool) -> VmciResult<Vec<u8>> {
        let mut state = self.state.lock();
        if validate {
            let previously_failed = state.failed.len();
            self.collect_locked(&mut state)?;
            let new_failures = state.failed.get(previously_failed..).unwrap_or(&[]);
            for failed in new_failures {
                if let Some(&index) = state.by_encoding.get(failed.as_slice()) {
                    let reason = format!("{:?}", state.speculations[index].reason);
                    tracing::debug!(%reason, "speculation failed during compilation");
                    return Err(SpeculationError::Failed { reason }.into());
                }
            }
        }
        let mut flattened = Vec::with_capacity(state.flattened_length);
        for speculation in &state.speculations {
            flattened.extend_from_slice(&speculation.encoding);
        }
        Ok(flattened)
    }

    /// Record a failed speculation in this log's list. Returns false if it
    /// was already recorded.
    pub fn add_failed_speculation(&self, speculation: &Speculation) -> VmciResult<bool> {
        Ok(self
            .runtime
            .boundary()
            .add_failed_speculation(self.address, speculation.encoding())?)
    }
}

/// Decode an id into `(offset, length)` within the flattened table
fn decode_id(id: i64) -> (usize, usize) {
    ((id >> LENGTH_BITS) as usize, (id & LENGTH_MASK) as usize)
}

impl fmt::Debug for SpeculationLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SpeculationLog")
            .field("address", &format_args!("{:#x}", self.address))
            .field("managed", &self.owner.is_some())
            .field("speculations", &state.speculations.len())
            .field("failed", &state.failed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_id() {
        assert_eq!(decode_id((12 << 5) | 20), (12, 20));
        assert_eq!(decode_id(31), (0, 31));
    }
}
