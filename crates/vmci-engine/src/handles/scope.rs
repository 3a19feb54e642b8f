//! Thread-local, stack-disciplined handle scopes

use super::object::ForeignHandle;
use super::{HandleError, HandleResult};
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

struct ScopeFrame {
    id: u64,
    /// `None` for a global scope
    description: Option<String>,
    handles: Vec<Arc<ForeignHandle>>,
}

thread_local! {
    static SCOPES: RefCell<Vec<ScopeFrame>> = const { RefCell::new(Vec::new()) };
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(1);

/// Register a new indirect handle with the innermost scope of this thread.
///
/// Returns false when there is no scope or the innermost scope is global; the
/// handle is then owned by its wrappers alone.
pub(crate) fn register(handle: &Arc<ForeignHandle>) -> bool {
    SCOPES.with(|scopes| match scopes.borrow_mut().last_mut() {
        Some(frame) if frame.description.is_some() => {
            frame.handles.push(handle.clone());
            true
        }
        _ => false,
    })
}

/// A lifetime boundary for indirect object handles.
///
/// Scopes nest per thread and must be closed innermost first. Closing a local
/// scope clears every handle created while it was the innermost local scope.
/// A global scope shields the handles created inside it from the enclosing
/// local scope. Dropping an open scope closes it; a scope dropped while not
/// innermost is removed from the stack and its handles are cleared.
#[must_use = "a scope closes when dropped"]
pub struct ObjectConstantScope {
    id: u64,
    description: Option<String>,
    closed: bool,
    _not_send: PhantomData<*const ()>,
}

impl ObjectConstantScope {
    fn push(description: Option<String>) -> Self {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let depth = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            scopes.push(ScopeFrame {
                id,
                description: description.clone(),
                handles: Vec::new(),
            });
            scopes.len()
        });
        tracing::debug!(scope = ?description, depth, "opened object constant scope");
        Self {
            id,
            description,
            closed: false,
            _not_send: PhantomData,
        }
    }

    /// Open a local scope
    pub fn open_local(description: impl Into<String>) -> Self {
        Self::push(Some(description.into()))
    }

    /// Enter the global scope
    pub fn enter_global() -> Self {
        Self::push(None)
    }

    /// Whether this is a global scope
    pub fn is_global(&self) -> bool {
        self.description.is_none()
    }

    /// Description given when the scope was opened
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Number of open scopes on the current thread
    pub fn depth() -> usize {
        SCOPES.with(|scopes| scopes.borrow().len())
    }

    /// Description of the innermost open scope on the current thread
    pub fn current_description() -> Option<String> {
        SCOPES.with(|scopes| scopes.borrow().last().and_then(|f| f.description.clone()))
    }

    /// Close the scope, clearing its handles.
    ///
    /// Fails without side effects if the scope is not the innermost one.
    /// Returns the number of handles cleared.
    pub fn close(&mut self) -> HandleResult<usize> {
        if self.closed {
            return Ok(0);
        }
        let frame = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            match scopes.last() {
                Some(top) if top.id == self.id => Ok(scopes.pop()),
                _ => Err(HandleError::ScopeNotActive {
                    description: self.description.clone(),
                    depth: scopes.len(),
                }),
            }
        })?;
        self.closed = true;

        let mut cleared = 0;
        for handle in frame.map(|f| f.handles).unwrap_or_default() {
            if handle.clear(self.description.as_deref()) {
                cleared += 1;
            }
        }
        tracing::debug!(
            scope = ?self.description,
            depth = Self::depth(),
            cleared,
            "closed object constant scope"
        );
        Ok(cleared)
    }

    /// Remove this scope's frame wherever it sits in the stack and clear its
    /// handles. Only for a guard dropped while not innermost.
    fn discard(&mut self) -> usize {
        self.closed = true;
        let frame = SCOPES.with(|scopes| {
            let mut scopes = scopes.borrow_mut();
            let position = scopes.iter().position(|frame| frame.id == self.id)?;
            Some(scopes.remove(position))
        });
        let mut cleared = 0;
        for handle in frame.map(|f| f.handles).unwrap_or_default() {
            if handle.clear(self.description.as_deref()) {
                cleared += 1;
            }
        }
        cleared
    }
}

impl Drop for ObjectConstantScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.close() {
            tracing::error!(%err, "object constant scope dropped out of order");
            let cleared = self.discard();
            tracing::debug!(scope = ?self.description, cleared, "discarded object constant scope");
        }
    }
}
