// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change handler registrations.
//!
//! Handlers are keyed by ids only and never hold the object they observe.
//! Lists are cloned out before dispatch so a handler can add or remove
//! handlers, including itself, while it runs.

use std::any::Any;
use std::rc::Rc;

use hashbrown::HashMap;

use crate::args::PropertyChanged;
use crate::id::{HandlerId, ObjectId, PropertyId};
use crate::value::ErasedValue;

/// A typed change handler, stored erased and recovered by downcast.
pub(crate) struct Handler<C, V>(pub(crate) Box<dyn Fn(&PropertyChanged<'_, C, V>)>);

/// Listener for local value writes, used by two-way bindings.
pub(crate) type LocalListener = Rc<dyn Fn(&ErasedValue)>;

type HandlerList = Vec<(HandlerId, Rc<dyn Any>)>;

#[derive(Default)]
pub(crate) struct EventTable {
    instance: HashMap<(ObjectId, PropertyId), HandlerList>,
    global: HashMap<PropertyId, HandlerList>,
    local: HashMap<(ObjectId, PropertyId), Vec<(HandlerId, LocalListener)>>,
}

impl EventTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add<C: 'static, V: 'static>(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        handler: Handler<C, V>,
    ) -> HandlerId {
        let id = HandlerId::next();
        self.instance
            .entry((object, property))
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    pub(crate) fn remove(&mut self, object: ObjectId, property: PropertyId, id: HandlerId) -> bool {
        remove_from(&mut self.instance, &(object, property), id)
    }

    pub(crate) fn add_global<C: 'static, V: 'static>(
        &mut self,
        property: PropertyId,
        handler: Handler<C, V>,
    ) -> HandlerId {
        let id = HandlerId::next();
        self.global
            .entry(property)
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    pub(crate) fn remove_global(&mut self, property: PropertyId, id: HandlerId) -> bool {
        remove_from(&mut self.global, &property, id)
    }

    /// Instance handlers followed by global handlers, each in registration order.
    pub(crate) fn handlers(&self, object: ObjectId, property: PropertyId) -> Vec<Rc<dyn Any>> {
        let instance = self.instance.get(&(object, property)).into_iter().flatten();
        let global = self.global.get(&property).into_iter().flatten();
        instance
            .chain(global)
            .map(|(_, handler)| Rc::clone(handler))
            .collect()
    }

    pub(crate) fn add_local_listener(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        listener: LocalListener,
    ) -> HandlerId {
        let id = HandlerId::next();
        self.local
            .entry((object, property))
            .or_default()
            .push((id, listener));
        id
    }

    pub(crate) fn remove_local_listener(
        &mut self,
        object: ObjectId,
        property: PropertyId,
        id: HandlerId,
    ) -> bool {
        remove_from(&mut self.local, &(object, property), id)
    }

    pub(crate) fn local_listeners(&self, object: ObjectId, property: PropertyId) -> Vec<LocalListener> {
        self.local
            .get(&(object, property))
            .into_iter()
            .flatten()
            .map(|(_, listener)| Rc::clone(listener))
            .collect()
    }

    /// Drops every registration for `object`.
    pub(crate) fn forget(&mut self, object: ObjectId) {
        self.instance.retain(|(id, _), _| *id != object);
        self.local.retain(|(id, _), _| *id != object);
    }
}

fn remove_from<K, T>(map: &mut HashMap<K, Vec<(HandlerId, T)>>, key: &K, id: HandlerId) -> bool
where
    K: core::hash::Hash + Eq,
{
    let Some(list) = map.get_mut(key) else {
        return false;
    };
    let before = list.len();
    list.retain(|(handler, _)| *handler != id);
    let removed = list.len() != before;
    if list.is_empty() {
        map.remove(key);
    }
    removed
}

/// Delivers a change to erased handlers of type `Handler<C, V>`.
pub(crate) fn dispatch<C: 'static, V: 'static>(
    handlers: Vec<Rc<dyn Any>>,
    change: &PropertyChanged<'_, C, V>,
) {
    for handler in handlers {
        match handler.downcast::<Handler<C, V>>() {
            Ok(handler) => (handler.0)(change),
            Err(_) => tracing::error!(
                sender = %change.sender,
                "change handler registered with a different owner or value type"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const P: PropertyId = PropertyId::new(0);

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> Handler<u8, i32> {
        let log = Rc::clone(log);
        Handler(Box::new(move |_| log.borrow_mut().push(tag)))
    }

    #[test]
    fn instance_before_global_in_registration_order() {
        let mut table = EventTable::new();
        let object = ObjectId::next();
        let log = Rc::new(RefCell::new(Vec::new()));

        table.add_global(P, recorder(&log, "global"));
        table.add(object, P, recorder(&log, "first"));
        table.add(object, P, recorder(&log, "second"));

        let target = Rc::new(0_u8);
        let change = PropertyChanged {
            sender: object,
            object: &target,
            old_value: &1,
            new_value: &2,
        };
        dispatch(table.handlers(object, P), &change);
        assert_eq!(*log.borrow(), ["first", "second", "global"]);
    }

    #[test]
    fn remove_by_id() {
        let mut table = EventTable::new();
        let object = ObjectId::next();
        let log = Rc::new(RefCell::new(Vec::new()));

        let a = table.add(object, P, recorder(&log, "a"));
        table.add(object, P, recorder(&log, "b"));
        assert!(table.remove(object, P, a));
        assert!(!table.remove(object, P, a));
        assert_eq!(table.handlers(object, P).len(), 1);

        let g = table.add_global(P, recorder(&log, "g"));
        assert!(table.remove_global(P, g));
        assert_eq!(table.handlers(object, P).len(), 1);
    }

    #[test]
    fn forget_drops_object_registrations() {
        let mut table = EventTable::new();
        let object = ObjectId::next();
        let log = Rc::new(RefCell::new(Vec::new()));
        table.add(object, P, recorder(&log, "a"));
        table.add_local_listener(object, P, Rc::new(|_| {}));

        table.forget(object);
        assert!(table.handlers(object, P).is_empty());
        assert!(table.local_listeners(object, P).is_empty());
    }
}
