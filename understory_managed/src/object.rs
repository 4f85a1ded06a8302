// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-object bookkeeping.
//!
//! This module provides the [`ObjectTable`] a context keeps for every object
//! that has ever been written to: its local values and its node in the
//! ownership tree. Records are keyed by [`ObjectId`] and only hold a
//! [`Weak`] reference to the object itself, so being known to the property
//! system never keeps an object alive.

use core::any::TypeId;
use std::any::{Any, type_name};
use std::rc::{Rc, Weak};

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::id::{DependencyObject, ObjectId, PropertyId};
use crate::metadata::ParentLink;
use crate::store::LocalStore;
use crate::value::ErasedValue;

/// Bookkeeping for one object.
#[derive(Debug)]
pub(crate) struct ObjectRecord {
    pub(crate) object: Weak<dyn Any>,
    pub(crate) type_id: TypeId,
    pub(crate) locals: LocalStore,
    pub(crate) parent: Option<ObjectId>,
    /// Children in attach order.
    pub(crate) children: SmallVec<[ObjectId; 4]>,
}

impl ObjectRecord {
    fn new(object: Weak<dyn Any>, type_id: TypeId) -> Self {
        Self {
            object,
            type_id,
            locals: LocalStore::new(),
            parent: None,
            children: SmallVec::new(),
        }
    }
}

/// Id-keyed node pool holding local values and the ownership tree.
///
/// Invariant: `child` is in `parent.children` exactly when `child.parent`
/// is `parent`.
#[derive(Debug, Default)]
pub(crate) struct ObjectTable {
    records: HashMap<ObjectId, ObjectRecord>,
}

impl ObjectTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Makes sure `object` has a record.
    pub(crate) fn ensure<C: DependencyObject>(&mut self, object: &Rc<C>) -> ObjectId {
        let id = object.object_id();
        self.records.entry(id).or_insert_with(|| {
            let weak: Weak<C> = Rc::downgrade(object);
            tracing::trace!(object = %id, ty = type_name::<C>(), "tracking object");
            ObjectRecord::new(weak, TypeId::of::<C>())
        });
        id
    }

    /// Makes sure the parent named by `link` has a record.
    pub(crate) fn ensure_link(&mut self, link: &ParentLink) {
        self.records
            .entry(link.id)
            .or_insert_with(|| ObjectRecord::new(link.object.clone(), link.type_id));
    }

    pub(crate) fn record(&self, id: ObjectId) -> Option<&ObjectRecord> {
        self.records.get(&id)
    }

    /// Upgrades the weak reference of a tracked object.
    pub(crate) fn object(&self, id: ObjectId) -> Option<Rc<dyn Any>> {
        self.records.get(&id).and_then(|record| record.object.upgrade())
    }

    pub(crate) fn local(&self, id: ObjectId, property: PropertyId) -> Option<&ErasedValue> {
        self.records
            .get(&id)
            .and_then(|record| record.locals.get(property))
    }

    pub(crate) fn has_local(&self, id: ObjectId, property: PropertyId) -> bool {
        self.records
            .get(&id)
            .is_some_and(|record| record.locals.contains(property))
    }

    /// Stores or clears a local value.
    ///
    /// The object must have been registered with [`ensure`](Self::ensure).
    pub(crate) fn set_local(&mut self, id: ObjectId, property: PropertyId, value: Option<ErasedValue>) {
        let Some(record) = self.records.get_mut(&id) else {
            return;
        };
        match value {
            Some(value) => record.locals.set(property, value),
            None => {
                record.locals.clear(property);
            }
        }
    }

    pub(crate) fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.records.get(&id).and_then(|record| record.parent)
    }

    pub(crate) fn children(&self, id: ObjectId) -> SmallVec<[ObjectId; 4]> {
        self.records
            .get(&id)
            .map(|record| record.children.clone())
            .unwrap_or_default()
    }

    /// Returns `true` if `ancestor` is `id` or one of its ancestors.
    pub(crate) fn is_self_or_ancestor(&self, ancestor: ObjectId, id: ObjectId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Moves `child` under `parent`, updating both child sets.
    ///
    /// Both records must exist.
    pub(crate) fn set_parent(&mut self, child: ObjectId, parent: Option<ObjectId>) {
        let Some(record) = self.records.get_mut(&child) else {
            return;
        };
        let old = core::mem::replace(&mut record.parent, parent);
        if old == parent {
            return;
        }
        if let Some(old) = old
            && let Some(old_record) = self.records.get_mut(&old)
        {
            old_record.children.retain(|id| *id != child);
        }
        if let Some(parent) = parent
            && let Some(parent_record) = self.records.get_mut(&parent)
        {
            parent_record.children.push(child);
        }
    }

    /// Drops records of objects that no longer exist.
    ///
    /// Returns the removed ids.
    pub(crate) fn prune(&mut self) -> Vec<ObjectId> {
        let dead: Vec<ObjectId> = self
            .records
            .iter()
            .filter(|(_, record)| record.object.strong_count() == 0)
            .map(|(id, _)| *id)
            .collect();
        for id in &dead {
            if let Some(record) = self.records.remove(id) {
                if let Some(parent) = record.parent
                    && let Some(parent_record) = self.records.get_mut(&parent)
                {
                    parent_record.children.retain(|child| child != id);
                }
                for child in record.children {
                    if let Some(child_record) = self.records.get_mut(&child) {
                        child_record.parent = None;
                    }
                }
            }
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Element {
        id: ObjectId,
    }

    impl DependencyObject for Element {
        fn object_id(&self) -> ObjectId {
            self.id
        }
    }

    fn element() -> Rc<Element> {
        Rc::new(Element {
            id: ObjectId::next(),
        })
    }

    const WIDTH: PropertyId = PropertyId::new(0);

    #[test]
    fn ensure_is_idempotent() {
        let mut table = ObjectTable::new();
        let a = element();
        assert_eq!(table.ensure(&a), a.id);
        table.set_local(a.id, WIDTH, Some(ErasedValue::new(1.0_f64)));
        table.ensure(&a);
        assert_eq!(table.len(), 1);
        assert!(table.has_local(a.id, WIDTH));
    }

    #[test]
    fn local_set_and_clear() {
        let mut table = ObjectTable::new();
        let a = element();
        table.ensure(&a);

        table.set_local(a.id, WIDTH, Some(ErasedValue::new(2_i32)));
        assert_eq!(
            table.local(a.id, WIDTH).and_then(ErasedValue::downcast_ref),
            Some(&2_i32)
        );
        table.set_local(a.id, WIDTH, None);
        assert!(table.local(a.id, WIDTH).is_none());
    }

    #[test]
    fn reparent_keeps_child_sets_consistent() {
        let mut table = ObjectTable::new();
        let (a, b, c) = (element(), element(), element());
        for e in [&a, &b, &c] {
            table.ensure(e);
        }

        table.set_parent(c.id, Some(a.id));
        assert_eq!(table.parent(c.id), Some(a.id));
        assert_eq!(table.children(a.id).as_slice(), &[c.id]);

        table.set_parent(c.id, Some(b.id));
        assert!(table.children(a.id).is_empty());
        assert_eq!(table.children(b.id).as_slice(), &[c.id]);

        table.set_parent(c.id, None);
        assert!(table.children(b.id).is_empty());
        assert_eq!(table.parent(c.id), None);
    }

    #[test]
    fn ancestry() {
        let mut table = ObjectTable::new();
        let (a, b, c) = (element(), element(), element());
        for e in [&a, &b, &c] {
            table.ensure(e);
        }
        table.set_parent(b.id, Some(a.id));
        table.set_parent(c.id, Some(b.id));

        assert!(table.is_self_or_ancestor(a.id, c.id));
        assert!(table.is_self_or_ancestor(c.id, c.id));
        assert!(!table.is_self_or_ancestor(c.id, a.id));
    }

    #[test]
    fn prune_drops_dead_records() {
        let mut table = ObjectTable::new();
        let parent = element();
        let child = element();
        table.ensure(&parent);
        table.ensure(&child);
        table.set_parent(child.id, Some(parent.id));

        let child_id = child.id;
        drop(child);
        assert_eq!(table.prune(), vec![child_id]);
        assert_eq!(table.len(), 1);
        assert!(table.children(parent.id).is_empty());
        assert!(table.object(parent.id).is_some());
    }
}
