// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The change pipeline.
//!
//! Every write, whatever provider it goes through, runs the same protocol:
//!
//! 1. resolve the old value and the provider it came from,
//! 2. run the property's change callback, which may reject or mutate
//!    (parent references are checked for cycles before and after it),
//! 3. snapshot descendants that inherit the property, if it is inherited,
//! 4. commit through the writing provider,
//! 5. push the new value down to the snapshotted descendants,
//! 6. notify handlers if the write is visible and changed something,
//! 7. run `after_commit` continuations if the write is visible,
//! 8. hand a local write to its local-value listeners.
//!
//! A write is visible when no provider of strictly higher precedence than the
//! writing one currently supplies the value.
//!
//! Local-value listeners come last because a two-way binding writes back
//! through them, which re-enters the pipeline on the same object.
//!
//! No runtime state is borrowed while user code (callbacks, handlers,
//! continuations, custom providers) runs, so all of it may reenter.

use std::borrow::Cow;
use std::rc::Rc;

use crate::args::{ChangingArgs, Outcome, PropertyChanged, WriteOutcome};
use crate::context::ContextState;
use crate::events::dispatch;
use crate::id::{DependencyObject, ObjectId};
use crate::metadata::PropertySettings;
use crate::registry::PropertyEntry;
use crate::value::{ErasedValue, PropertyValue, expect_typed};

const CYCLE: &str = "parent reference would create a cycle";

/// What a write asks the provider to do.
pub(crate) enum Request<V> {
    Set(V),
    /// Remove the provider's value, letting lower providers show through.
    Clear,
}

/// Runs a write through the provider at precedence index `provider`.
///
/// The write is refused if the callback rejects it, or if it is a parent
/// reference that would create a cycle.
pub(crate) fn change<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    provider: usize,
    object: &Rc<C>,
    request: Request<V>,
) -> WriteOutcome {
    let id = state.objects.borrow_mut().ensure(object);
    let (old, old_index) = state.resolve(id, entry.id);
    let old: V = expect_typed(&old);

    let clearing = matches!(request, Request::Clear);
    let new = match request {
        Request::Set(value) => value,
        Request::Clear => expect_typed(&state.resolve_skipping(id, entry.id, Some(provider)).0),
    };
    if creates_cycle(state, entry, id, &new) {
        return WriteOutcome::refused(Some(Cow::Borrowed(CYCLE)));
    }

    let will_change = old_index >= provider;
    let mut args = ChangingArgs::new(old.clone(), new.clone(), will_change);
    entry.callback.invoke(object, &mut args);
    let Outcome {
        mutated_value: mutated,
        rejected,
        error,
        after_commit,
    } = args.into_outcome();

    if rejected {
        tracing::trace!(property = entry.name, object = %id, "change rejected");
        return WriteOutcome::refused(error);
    }
    if mutated != new && creates_cycle(state, entry, id, &mutated) {
        return WriteOutcome::refused(Some(Cow::Borrowed(CYCLE)));
    }

    let local = state.chain.local_index() == Some(provider);
    let stored = if (clearing && mutated == new) || (local && entry.metadata.clears_local(&mutated)) {
        None
    } else {
        Some(ErasedValue::new(mutated.clone()))
    };

    let descendants = snapshot_descendants(state, entry, id);
    state.commit(provider, id, entry.id, stored);
    settle(state, entry, object, &descendants, will_change, &old, &mutated);
    if will_change {
        for continuation in after_commit {
            continuation();
        }
    }

    if local && !clearing {
        let listeners = state.events.borrow().local_listeners(id, entry.id);
        if !listeners.is_empty() {
            let value = ErasedValue::new(mutated);
            for listener in listeners {
                listener(&value);
            }
        }
    }
    WriteOutcome::applied(error)
}

/// Removes the value the provider at `provider` holds, without a veto.
///
/// Used when a binding stops supplying its target. The change callback still
/// observes the change and may schedule continuations, but its rejection and
/// any mutated value are ignored: the provider no longer has a value to keep.
pub(crate) fn withdraw<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    provider: usize,
    object: &Rc<C>,
) {
    let id = state.objects.borrow_mut().ensure(object);
    let (old, old_index) = state.resolve(id, entry.id);
    let old: V = expect_typed(&old);
    let new: V = expect_typed(&state.resolve_skipping(id, entry.id, Some(provider)).0);

    let will_change = old_index >= provider;
    let mut args = ChangingArgs::new(old.clone(), new.clone(), will_change);
    entry.callback.invoke(object, &mut args);
    let outcome = args.into_outcome();
    if outcome.rejected || outcome.mutated_value != new {
        tracing::debug!(
            property = entry.name,
            object = %id,
            "change callback cannot veto a withdrawn value"
        );
    }

    let descendants = snapshot_descendants(state, entry, id);
    state.commit(provider, id, entry.id, None);
    settle(state, entry, object, &descendants, will_change, &old, &new);
    if will_change {
        outcome.run_after_commit();
    }
}

/// Descendants that currently inherit the property from `id` or above,
/// with their resolved values.
fn snapshot_descendants<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    id: ObjectId,
) -> Vec<(Rc<C>, ErasedValue)> {
    match state.chain.inheritance_index() {
        Some(inheritance) if entry.metadata.inherits() => {
            state.inheriting_descendants::<C>(id, entry.id, inheritance)
        }
        _ => Vec::new(),
    }
}

/// Propagates a committed change to the snapshotted descendants, then
/// notifies the owner's handlers if the change is visible.
fn settle<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    object: &Rc<C>,
    descendants: &[(Rc<C>, ErasedValue)],
    will_change: bool,
    old: &V,
    new: &V,
) {
    let id = object.object_id();
    if let Some(inheritance) = state.chain.inheritance_index() {
        for (descendant, before) in descendants {
            propagate_inherited(state, entry, descendant, id, before, inheritance);
        }
    }

    let on_equals = entry
        .metadata
        .settings()
        .contains(PropertySettings::CALL_HANDLER_ON_EQUALS);
    if will_change && (new != old || on_equals) {
        notify(state, entry, object, id, old, new);
    }
}

/// Re-resolves an inheriting descendant after its ancestor committed, and
/// runs the callback and notification on its behalf.
fn propagate_inherited<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    object: &Rc<C>,
    sender: ObjectId,
    before: &ErasedValue,
    inheritance: usize,
) {
    let id = object.object_id();
    let (after, index) = state.resolve(id, entry.id);
    if after == *before {
        return;
    }
    let old: V = expect_typed(before);
    let new: V = expect_typed(&after);

    let will_change = index >= inheritance;
    let mut args = ChangingArgs::new(old.clone(), new.clone(), will_change);
    entry.callback.invoke(object, &mut args);
    let outcome = args.into_outcome();
    if outcome.rejected {
        tracing::trace!(property = entry.name, object = %id, %sender, "inherited change rejected");
        return;
    }

    tracing::trace!(property = entry.name, object = %id, %sender, "propagated inherited value");
    if will_change {
        notify(state, entry, object, sender, &old, &new);
        outcome.run_after_commit();
    }
}

/// Delivers a visible change to handlers.
///
/// For a parent reference the ownership tree is updated first, so handlers
/// observe the new shape.
pub(crate) fn notify<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    object: &Rc<C>,
    sender: ObjectId,
    old: &V,
    new: &V,
) {
    let id = object.object_id();
    if entry.metadata.is_parent_reference() {
        state.reparent(id, entry.metadata.parent_link(new));
    }

    let handlers = state.events.borrow().handlers(id, entry.id);
    if handlers.is_empty() {
        return;
    }
    dispatch(
        handlers,
        &PropertyChanged {
            sender,
            object,
            old_value: old,
            new_value: new,
        },
    );
}

fn creates_cycle<V: PropertyValue, C>(
    state: &ContextState,
    entry: &PropertyEntry<V, C>,
    object: ObjectId,
    value: &V,
) -> bool {
    let Some(link) = entry.metadata.parent_link(value) else {
        return false;
    };
    let cycle = state.objects.borrow().is_self_or_ancestor(object, link.id);
    if cycle {
        tracing::warn!(
            property = entry.name,
            %object,
            parent = %link.id,
            "refusing parent reference that would create a cycle"
        );
    }
    cycle
}
