// ============================================================================
// spark-signals - Fork Engine
// Speculative writes that can be computed, inspected, and thrown away (or
// committed) without disturbing the real reactive graph.
// ============================================================================
//
// A Fork is a shadow write set: `Signal::set` inside `fork(..)` writes into
// the fork instead of the real source, and `Signal::get`/`Derived::get`
// check the active fork's shadow before falling back to the real value.
// Nothing in the committed graph changes - no dirty flags flip, no effects
// run - until `ForkHandle::apply()` replays the shadow writes for real.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::context::with_context;
use crate::core::types::AnySource;
use crate::reactivity::tracking::notify_write;

/// A single shadowed entry recorded while a fork was active.
#[derive(Clone)]
enum ForkEntry {
    /// A signal write: `source` is what gets committed on `apply()`.
    Signal {
        source: Rc<dyn AnySource>,
        value: Rc<dyn Any>,
    },
    /// A derived's recomputed value, cached only for the lifetime of the
    /// fork. Deriveds are never written back on `apply()` - they simply
    /// recompute lazily against the committed signals afterward.
    Derived { value: Rc<dyn Any> },
}

/// The shadow write set backing an in-flight fork.
///
/// Keyed by the pointer identity of the source (`Rc::as_ptr` cast to
/// `usize`), so repeated reads/writes of the same signal or derived inside
/// one fork session see a consistent shadow value.
pub struct Fork {
    entries: RefCell<HashMap<usize, ForkEntry>>,
    order: RefCell<Vec<usize>>,
}

impl Fork {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
        })
    }

    /// Pointer identity used as the shadow map key for both signals and
    /// deriveds. Public within the crate so `Derived::get` can compute its
    /// own key when caching a forced recompute.
    pub(crate) fn key_of(source: &Rc<dyn AnySource>) -> usize {
        Rc::as_ptr(source) as *const () as usize
    }

    /// Record (or overwrite) a signal's shadow value.
    pub(crate) fn set_signal(&self, source: Rc<dyn AnySource>, value: Rc<dyn Any>) {
        let key = Self::key_of(&source);
        let mut entries = self.entries.borrow_mut();
        if !entries.contains_key(&key) {
            self.order.borrow_mut().push(key);
        }
        entries.insert(key, ForkEntry::Signal { source, value });
    }

    /// Look up a signal's shadow value by its source pointer identity.
    pub(crate) fn get_signal(&self, source: &Rc<dyn AnySource>) -> Option<Rc<dyn Any>> {
        let key = Self::key_of(source);
        match self.entries.borrow().get(&key) {
            Some(ForkEntry::Signal { value, .. }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Record (or overwrite) a derived's recomputed value.
    pub(crate) fn set_derived(&self, derived_key: usize, value: Rc<dyn Any>) {
        let mut entries = self.entries.borrow_mut();
        if !entries.contains_key(&derived_key) {
            self.order.borrow_mut().push(derived_key);
        }
        entries.insert(derived_key, ForkEntry::Derived { value });
    }

    /// Look up a derived's cached shadow value by its own pointer identity.
    pub(crate) fn get_derived(&self, derived_key: usize) -> Option<Rc<dyn Any>> {
        match self.entries.borrow().get(&derived_key) {
            Some(ForkEntry::Derived { value }) => Some(value.clone()),
            _ => None,
        }
    }

    /// Snapshot this fork's shadow map into a brand-new, independent `Fork`.
    ///
    /// Used by `ForkHandle::with` so writes made inside the nested closure
    /// extend the clone only - the original fork's shadow set (and whatever
    /// `apply()` will later commit) is untouched.
    fn clone_shadow(&self) -> Rc<Self> {
        Rc::new(Self {
            entries: RefCell::new(self.entries.borrow().clone()),
            order: RefCell::new(self.order.borrow().clone()),
        })
    }

    /// Replay every shadowed signal write into the real graph, in the order
    /// the writes were first made. Derived entries are skipped - they have
    /// no real counterpart to write into.
    ///
    /// Each commit goes through the source's normal write-version bump and
    /// `notify_write`, so dirty propagation and effect scheduling happen
    /// exactly as if the write had been made outside the fork.
    fn apply(&self) {
        let order = self.order.borrow().clone();
        let changed: Vec<Rc<dyn AnySource>> = {
            let entries = self.entries.borrow();
            order
                .iter()
                .filter_map(|key| match entries.get(key) {
                    Some(ForkEntry::Signal { source, value }) => {
                        if source.apply_fork_value(value.clone()) {
                            Some(source.clone())
                        } else {
                            None
                        }
                    }
                    _ => None,
                })
                .collect()
        };

        for source in changed {
            with_context(|ctx| {
                let wv = ctx.increment_write_version();
                source.set_write_version(wv);
            });
            notify_write(source);
        }
    }
}

/// A handle to a completed `fork(..)` call.
///
/// Dropping the handle without calling `apply()` discards the speculative
/// writes entirely; nothing in the committed graph ever saw them.
pub struct ForkHandle {
    fork: Rc<Fork>,
}

impl ForkHandle {
    /// Commit every shadowed write into the real signals, in the order they
    /// were made. This runs through each signal's normal setter, so the
    /// usual equality check, write-version bump, and dirty cascade
    /// (including real effects) all happen exactly as if the writes had
    /// been made outside the fork.
    pub fn apply(&self) {
        log::debug!("applying fork with {} shadowed entr(y/ies)", self.fork.entries.borrow().len());
        with_context(|ctx| {
            let prev = ctx.set_applying_fork(Some(self.fork.clone()));
            self.fork.apply();
            ctx.set_applying_fork(prev);
        });
    }

    /// Re-enter this fork's shadow scope to perform more speculative reads
    /// or writes, returning the closure's result.
    ///
    /// `g` runs against a *clone* of this fork's shadow map: reads inside
    /// `g` see the same speculative state as the original `fork(..)` call,
    /// but any writes `g` makes land only in the clone and are discarded
    /// when `with` returns. The handle's own shadow set - what `apply()`
    /// will later commit - is never touched by `g`.
    pub fn with<R>(&self, g: impl FnOnce() -> R) -> R {
        let clone = self.fork.clone_shadow();
        let prev = with_context(|ctx| ctx.set_active_fork(Some(clone)));
        let result = g();
        with_context(|ctx| ctx.set_active_fork(prev));
        result
    }
}

/// Run `f` with a fresh fork active, returning a handle to its shadow
/// write set.
///
/// Signal reads and writes inside `f` are redirected to the fork: writes
/// are recorded as shadow values instead of mutating the real signal, and
/// reads see the shadow value if one has been recorded (falling back to
/// the real value otherwise). No dirty flags change and no effects run
/// for the real graph while the fork is active.
///
/// # Example
///
/// ```
/// use spark_signals::{signal, fork};
///
/// let count = signal(1);
/// let handle = fork(|| {
///     count.set(count.get() + 1);
/// });
///
/// // The real signal hasn't changed yet.
/// assert_eq!(count.get(), 1);
///
/// handle.apply();
/// assert_eq!(count.get(), 2);
/// ```
pub fn fork<F: FnOnce()>(f: F) -> ForkHandle {
    let new_fork = Fork::new();
    let prev = with_context(|ctx| ctx.set_active_fork(Some(new_fork.clone())));
    f();
    with_context(|ctx| ctx.set_active_fork(prev));
    ForkHandle { fork: new_fork }
}
