// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binding chain nodes.
//!
//! A chain is a list of hops. Each hop watches one property on its current
//! source object and feeds the value to its downstream node: the next hop,
//! which treats the value as its new source object, or the terminal, which
//! converts it and hands it to the binding through an [`Outlet`].
//!
//! Ownership runs root to terminal. Handlers registered with the event table
//! hold their hop weakly, so a dropped chain unsubscribes cleanly and never
//! keeps a source object alive.

use core::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::args::PropertyChanged;
use crate::context::ContextState;
use crate::events::Handler;
use crate::id::{AsSource, DependencyObject, HandlerId, ObjectId, PropertyId};
use crate::pipeline::{self, Request};
use crate::registry::typed_entry;
use crate::value::{PropertyValue, expect_typed};

/// Receives values from the node upstream.
pub(crate) trait Downstream<U> {
    /// The upstream value changed, or was read for the first time.
    fn accept(&self, value: &U);
    /// The upstream node lost its source; drop every subscription below.
    fn detach(&self);
}

/// Signals that the chain currently has no value.
pub(crate) trait ChainReset {
    fn reset(&self);
}

/// The entry point of a materialized chain.
pub(crate) trait ChainRoot {
    /// Subscribes the whole chain, starting at the root source.
    fn generate(&self);
    /// Unsubscribes the whole chain.
    fn destroy(&self);
}

/// Writes a value to the current source object of a hop.
pub(crate) trait HopWriter<V> {
    fn write(&self, value: V) -> bool;
}

struct Attachment<C> {
    object: Weak<C>,
    object_id: ObjectId,
    handler: HandlerId,
}

/// Watches `property` on whichever `C` it is currently registered on.
pub(crate) struct Hop<V, C> {
    state: Rc<ContextState>,
    property: PropertyId,
    downstream: Rc<dyn Downstream<V>>,
    reset: Rc<dyn ChainReset>,
    attached: RefCell<Option<Attachment<C>>>,
    this: Weak<Self>,
}

impl<V: PropertyValue, C: DependencyObject> Hop<V, C> {
    pub(crate) fn new(
        state: Rc<ContextState>,
        property: PropertyId,
        downstream: Rc<dyn Downstream<V>>,
        reset: Rc<dyn ChainReset>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            state,
            property,
            downstream,
            reset,
            attached: RefCell::new(None),
            this: this.clone(),
        })
    }

    /// Subscribes to `object` and pushes its current value downstream.
    pub(crate) fn register(&self, object: &Rc<C>) {
        self.unregister();

        let object_id = object.object_id();
        let this = self.this.clone();
        let handler = self.state.events.borrow_mut().add(
            object_id,
            self.property,
            Handler::<C, V>(Box::new(move |change: &PropertyChanged<'_, C, V>| {
                if let Some(hop) = this.upgrade() {
                    hop.downstream.accept(change.new_value);
                }
            })),
        );
        *self.attached.borrow_mut() = Some(Attachment {
            object: Rc::downgrade(object),
            object_id,
            handler,
        });

        let (value, _) = self.state.resolve(object_id, self.property);
        let value: V = expect_typed(&value);
        self.downstream.accept(&value);
    }

    fn unregister(&self) {
        let attachment = self.attached.borrow_mut().take();
        if let Some(attachment) = attachment {
            self.state.events.borrow_mut().remove(
                attachment.object_id,
                self.property,
                attachment.handler,
            );
        }
    }

    /// Unsubscribes this hop and everything below it.
    pub(crate) fn detach_all(&self) {
        self.unregister();
        self.downstream.detach();
    }

    pub(crate) fn signal_reset(&self) {
        self.reset.reset();
    }
}

impl<U, V, C> Downstream<U> for Hop<V, C>
where
    U: AsSource<C>,
    V: PropertyValue,
    C: DependencyObject,
{
    fn accept(&self, value: &U) {
        match value.as_source() {
            Some(object) => self.register(&object),
            None => {
                self.detach_all();
                self.signal_reset();
            }
        }
    }

    fn detach(&self) {
        self.detach_all();
    }
}

impl<V: PropertyValue, C: DependencyObject> HopWriter<V> for Hop<V, C> {
    fn write(&self, value: V) -> bool {
        let object = self
            .attached
            .borrow()
            .as_ref()
            .and_then(|attachment| attachment.object.upgrade());
        let (Some(object), Some(local)) = (object, self.state.chain.local_index()) else {
            return false;
        };
        let entry = typed_entry::<V, C>(&self.state, self.property);
        pipeline::change(&self.state, &entry, local, &object, Request::Set(value)).is_applied()
    }
}

/// The first hop together with the object the chain starts from.
pub(crate) struct RootHop<V, C> {
    pub(crate) hop: Rc<Hop<V, C>>,
    pub(crate) source: Weak<C>,
}

impl<V: PropertyValue, C: DependencyObject> ChainRoot for RootHop<V, C> {
    fn generate(&self) {
        match self.source.upgrade() {
            Some(source) => self.hop.register(&source),
            None => self.hop.signal_reset(),
        }
    }

    fn destroy(&self) {
        self.hop.detach_all();
    }
}

/// Converts the last hop's value and hands it to the outlet.
pub(crate) struct Terminal<F, T> {
    pub(crate) convert: Box<dyn Fn(&F) -> T>,
    pub(crate) outlet: Rc<Outlet<T>>,
}

impl<F, T> Downstream<F> for Terminal<F, T> {
    fn accept(&self, value: &F) {
        self.outlet.send(Some((self.convert)(value)));
    }

    fn detach(&self) {}
}

/// Where a chain delivers its values; `None` means the chain has no value.
pub(crate) struct Outlet<T> {
    receiver: RefCell<Option<Rc<dyn Fn(Option<T>)>>>,
}

impl<T> Outlet<T> {
    pub(crate) fn new() -> Self {
        Self {
            receiver: RefCell::new(None),
        }
    }

    pub(crate) fn connect(&self, receiver: Rc<dyn Fn(Option<T>)>) {
        *self.receiver.borrow_mut() = Some(receiver);
    }

    pub(crate) fn disconnect(&self) {
        self.receiver.borrow_mut().take();
    }

    fn send(&self, value: Option<T>) {
        let receiver = self.receiver.borrow().clone();
        if let Some(receiver) = receiver {
            receiver(value);
        }
    }
}

impl<T> ChainReset for Outlet<T> {
    fn reset(&self) {
        self.send(None);
    }
}
