// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Data binding.
//!
//! A [`Binding`] drives one property of one target object from a chain of
//! property hops ([`BindingPath`]). It supplies values through the
//! [`Provider::Binding`](crate::Provider::Binding) layer, ahead of local
//! values, and re-wires itself whenever an intermediate hop starts naming a
//! different object.
//!
//! Dropping or [disposing](Binding::dispose) a binding detaches the chain and
//! clears its layer, which produces one final change notification on the
//! target reflecting whatever the next provider supplies.

mod chain;
mod path;

pub use path::{BindingPath, BindingSpec};

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::{Rc, Weak};

use self::chain::{ChainRoot, Outlet};
use self::path::Writeback;
use crate::context::{ConfigurationContext, ContextState, state};
use crate::error::PropertyError;
use crate::id::{DependencyObject, HandlerId, ObjectId, PropertyId};
use crate::pipeline::{self, Request};
use crate::registry::typed_entry;
use crate::value::{ErasedValue, PropertyValue};

/// What the binding provider sees of a binding.
pub(crate) trait BindingSlot {
    fn current_value(&self) -> Option<ErasedValue>;
    fn set_current_value(&self, value: Option<ErasedValue>);
    fn is_disposed(&self) -> bool;
    fn dispose(&self);
}

struct BindingCore<V, C> {
    state: Rc<ContextState>,
    property: PropertyId,
    target: Weak<C>,
    target_id: ObjectId,
    current: RefCell<Option<V>>,
    root: RefCell<Option<Rc<dyn ChainRoot>>>,
    writeback: RefCell<Option<Writeback<V>>>,
    outlet: Rc<Outlet<V>>,
    listener: Cell<Option<HandlerId>>,
    disposed: Cell<bool>,
}

impl<V: PropertyValue, C: DependencyObject> BindingCore<V, C> {
    /// Runs a value delivered by the chain through the pipeline.
    fn receive(&self, value: Option<V>) {
        if self.disposed.get() {
            return;
        }
        let (Some(target), Some(binding)) = (self.target.upgrade(), self.state.chain.binding_index())
        else {
            return;
        };
        let entry = typed_entry::<V, C>(&self.state, self.property);
        match value {
            Some(value) => {
                let outcome =
                    pipeline::change(&self.state, &entry, binding, &target, Request::Set(value));
                if let Some(error) = outcome.error() {
                    tracing::debug!(
                        object = %self.target_id,
                        property = %self.property,
                        error,
                        rejected = outcome.is_rejected(),
                        "bound value reported an error"
                    );
                }
            }
            None => pipeline::withdraw(&self.state, &entry, binding, &target),
        }
    }

    /// Pushes a local edit of the target back along the chain.
    fn write_back(&self, value: &ErasedValue) {
        if self.disposed.get() {
            return;
        }
        let writeback = self.writeback.borrow().clone();
        if let (Some(writeback), Some(value)) = (writeback, value.downcast_ref::<V>()) {
            writeback(value.clone());
        }
    }
}

impl<V: PropertyValue, C: DependencyObject> BindingSlot for BindingCore<V, C> {
    fn current_value(&self) -> Option<ErasedValue> {
        self.current.borrow().clone().map(ErasedValue::new)
    }

    fn set_current_value(&self, value: Option<ErasedValue>) {
        let value = value.and_then(|value| value.downcast_ref::<V>().cloned());
        *self.current.borrow_mut() = value;
    }

    fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.outlet.disconnect();
        let root = self.root.borrow_mut().take();
        if let Some(root) = root {
            root.destroy();
        }
        self.writeback.borrow_mut().take();
        if let Some(listener) = self.listener.take() {
            self.state
                .events
                .borrow_mut()
                .remove_local_listener(self.target_id, self.property, listener);
        }

        if let (Some(target), Some(binding)) = (self.target.upgrade(), self.state.chain.binding_index()) {
            let entry = typed_entry::<V, C>(&self.state, self.property);
            pipeline::withdraw(&self.state, &entry, binding, &target);
        }
        self.current.borrow_mut().take();

        let key = (self.target_id, self.property);
        let mut bindings = self.state.bindings.borrow_mut();
        let ours = bindings
            .get(&key)
            .is_some_and(|slot| core::ptr::addr_eq(slot.as_ptr(), core::ptr::from_ref(self)));
        if ours {
            bindings.remove(&key);
        }
        drop(bindings);
        tracing::debug!(object = %self.target_id, property = %self.property, "binding disposed");
    }
}

/// An active binding.
///
/// The binding lives as long as this handle: dropping it disposes the
/// binding.
#[must_use = "dropping a Binding disposes it immediately"]
pub struct Binding {
    core: Rc<dyn BindingSlot>,
}

impl Binding {
    /// Detaches the chain and reverts the target to the next provider's
    /// value. Idempotent.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    /// Returns `true` once the binding has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.core.is_disposed()
    }
}

impl Drop for Binding {
    fn drop(&mut self) {
        self.core.dispose();
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Attaches `spec` to `(target, property)` through the binding provider.
pub(crate) fn bind<Cx: ConfigurationContext, V: PropertyValue, C: DependencyObject>(
    property: PropertyId,
    target: &Rc<C>,
    spec: BindingSpec<Cx, V>,
) -> Result<Binding, PropertyError> {
    let state = state::<Cx>();
    if state.chain.binding_index().is_none() {
        return Err(PropertyError::BindingsDisabled);
    }

    let target_id = state.objects.borrow_mut().ensure(target);
    let key = (target_id, property);
    let previous = state.bindings.borrow().get(&key).and_then(Weak::upgrade);
    if let Some(previous) = previous {
        previous.dispose();
    }

    let core = Rc::new(BindingCore::<V, C> {
        state: Rc::clone(&state),
        property,
        target: Rc::downgrade(target),
        target_id,
        current: RefCell::new(None),
        root: RefCell::new(None),
        writeback: RefCell::new(None),
        outlet: Rc::new(Outlet::new()),
        listener: Cell::new(None),
        disposed: Cell::new(false),
    });
    let slot: Rc<dyn BindingSlot> = Rc::clone(&core) as Rc<dyn BindingSlot>;
    state.bindings.borrow_mut().insert(key, Rc::downgrade(&slot));

    let weak = Rc::downgrade(&core);
    core.outlet.connect(Rc::new(move |value: Option<V>| {
        if let Some(core) = weak.upgrade() {
            core.receive(value);
        }
    }));

    let hops = spec.hops();
    let two_way = spec.is_two_way();
    let (root, writeback) = spec.materialize(Rc::clone(&core.outlet));
    *core.root.borrow_mut() = Some(Rc::clone(&root));
    if let Some(writeback) = writeback {
        *core.writeback.borrow_mut() = Some(writeback);
        let weak = Rc::downgrade(&core);
        let listener = state.events.borrow_mut().add_local_listener(
            target_id,
            property,
            Rc::new(move |value: &ErasedValue| {
                if let Some(core) = weak.upgrade() {
                    core.write_back(value);
                }
            }),
        );
        core.listener.set(Some(listener));
    }

    tracing::debug!(object = %target_id, %property, hops, two_way, "binding attached");
    root.generate();
    Ok(Binding { core: slot })
}
