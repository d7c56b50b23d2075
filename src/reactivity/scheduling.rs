// ============================================================================
// spark-signals - Effect Scheduler
// Queues dirty effects and drains them in tree order.
// ============================================================================
//
// In TypeScript this boundary is `queueMicrotask`. Rust has no microtask
// queue, so the "next microtask" is modeled as a synchronous drain that runs
// as soon as nothing else is holding the queue open - no active batch, and
// no outer drain already in progress. `flush_sync` is the deterministic
// entry point tests (and hosts that want explicit control) can call
// directly instead of relying on that automatic trigger.
//
// This module doesn't decide *whether* an effect is dirty - that's
// `tracking::is_dirty`. It decides the *order* dirty effects run in once
// queued, and drives the drain loop to a fixed point.
// ============================================================================

use std::collections::HashSet;
use std::rc::Rc;

use crate::core::constants::*;
use crate::core::context::with_context;
use crate::core::types::AnyReaction;
use crate::primitives::effect::EffectInner;
use crate::reactivity::tracking::is_dirty;

/// Maximum drain iterations before we assume an effect is retriggering
/// itself forever.
const MAX_FLUSH_COUNT: u32 = 1000;

// =============================================================================
// QUEUEING
// =============================================================================

/// Queue a reaction discovered dirty during dependency-graph propagation
/// (`tracking::mark_reactions`) and drain immediately unless something else
/// is holding the queue open.
pub(crate) fn schedule_reaction(reaction: Rc<dyn AnyReaction>) {
    let should_run_now = with_context(|ctx| {
        ctx.add_pending_reaction(Rc::downgrade(&reaction));
        !ctx.is_batching() && !ctx.is_flushing_sync()
    });

    if should_run_now {
        drain_pending();
    }
}

/// Queue a freshly created effect for its first run, and drain immediately
/// unless something else is holding the queue open.
pub fn schedule_effect_inner(effect: Rc<EffectInner>) {
    schedule_reaction(effect as Rc<dyn AnyReaction>);
}

/// Drain whatever effects are currently pending. Called when the outermost
/// batch exits.
pub fn flush_pending_reactions() {
    drain_pending();
}

/// Synchronously flush all pending effects to a fixed point.
///
/// This is the deterministic stand-in for the "next microtask" boundary:
/// tests call this instead of waiting for a scheduler tick.
pub fn flush_sync() {
    drain_pending();
}

/// Run `f`, flush effects, then return `f`'s result.
pub fn flush_sync_with<T>(f: impl FnOnce() -> T) -> T {
    let result = f();
    drain_pending();
    result
}

// =============================================================================
// DRAIN LOOP
// =============================================================================

/// Drain the pending-effects queue to empty.
///
/// Each round: take the queue, drop anything no longer live or dirty, put
/// the rest in ancestor-filtered, depth/document-order, then run them.
/// Effects appended while running (synchronous writes from inside an
/// effect) are picked up by the next round of this same loop - no separate
/// flush gets scheduled for them, so nested drains never happen.
fn drain_pending() {
    let was_flushing = with_context(|ctx| {
        let was = ctx.is_flushing_sync();
        ctx.set_flushing_sync(true);
        was
    });

    let mut iterations = 0u32;
    loop {
        let pending = with_context(|ctx| ctx.take_pending_reactions());
        if pending.is_empty() {
            break;
        }

        iterations += 1;
        if iterations > MAX_FLUSH_COUNT {
            log::error!(
                "effect flush exceeded {MAX_FLUSH_COUNT} iterations, assuming a retrigger loop"
            );
            with_context(|ctx| ctx.set_flushing_sync(was_flushing));
            panic!(
                "Maximum update depth exceeded. This can happen when an effect \
                 continuously triggers itself."
            );
        }

        let mut live = Vec::with_capacity(pending.len());
        for weak in pending {
            let Some(reaction) = weak.upgrade() else {
                continue;
            };
            let flags = reaction.flags();
            if (flags & (INERT | DESTROYED)) != 0 || (flags & EFFECT) == 0 {
                continue;
            }
            if !is_dirty(&*reaction) {
                continue;
            }
            live.push(reaction);
        }

        let ordered = order_effects(live);
        log::trace!("draining {} effect(s), round {}", ordered.len(), iterations);

        for reaction in ordered {
            // May have been cleaned by an earlier entry in this same round
            // (queued twice, through two separate dependencies).
            if is_dirty(&*reaction) {
                reaction.update();
            }
        }
    }

    with_context(|ctx| ctx.set_flushing_sync(was_flushing));
}

// =============================================================================
// ORDERING
// =============================================================================

/// Filter out effects whose own ancestor is also in the candidate set, then
/// sort the survivors by tree depth and document order.
///
/// "Ancestor wins" because a parent effect tears down and recreates its
/// children every run; running a stale child first would just have it
/// destroyed a moment later by its parent's own re-run.
fn order_effects(candidates: Vec<Rc<dyn AnyReaction>>) -> Vec<Rc<dyn AnyReaction>> {
    let effects: Vec<(Rc<dyn AnyReaction>, *const EffectInner)> = candidates
        .into_iter()
        .filter_map(|r| {
            let ptr = r.as_any().downcast_ref::<EffectInner>()? as *const EffectInner;
            Some((r, ptr))
        })
        .collect();

    let addresses: HashSet<*const EffectInner> = effects.iter().map(|(_, ptr)| *ptr).collect();

    let mut survivors: Vec<(Rc<dyn AnyReaction>, &EffectInner)> = effects
        .iter()
        .filter_map(|(r, ptr)| {
            let inner = unsafe { &**ptr };
            let mut ancestor = inner.parent();
            while let Some(a) = ancestor {
                if addresses.contains(&(&*a as *const EffectInner)) {
                    return None;
                }
                ancestor = a.parent();
            }
            Some((r.clone(), inner))
        })
        .collect();

    survivors.sort_by(|(_, a), (_, b)| document_order(a, b));
    survivors.into_iter().map(|(r, _)| r).collect()
}

/// Compare two effects by tree depth first, then by document position
/// (sibling order, climbing to the lowest common ancestor). Root-level
/// effects (depth 0) compare by creation order via `root_index`.
fn document_order(a: &EffectInner, b: &EffectInner) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    let depth_a = a.depth();
    let depth_b = b.depth();
    if depth_a != depth_b {
        return depth_a.cmp(&depth_b);
    }

    if depth_a == 0 {
        return a.root_index().cmp(&b.root_index());
    }

    let chain_a = ancestor_chain(a);
    let chain_b = ancestor_chain(b);

    for (node_a, node_b) in chain_a.iter().zip(chain_b.iter()) {
        if !std::ptr::eq(*node_a, *node_b) {
            return node_a.sibling_index().cmp(&node_b.sibling_index());
        }
    }

    Ordering::Equal
}

/// Root-first chain of ancestors ending at (and including) `effect` itself.
fn ancestor_chain(effect: &EffectInner) -> Vec<*const EffectInner> {
    let mut chain = vec![effect as *const EffectInner];
    let mut current = effect.parent();
    while let Some(p) = current {
        chain.push(Rc::as_ptr(&p));
        current = p.parent();
    }
    chain.reverse();
    chain
}

// =============================================================================
// TESTS
// =============================================================================
