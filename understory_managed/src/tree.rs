// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ownership tree walks.
//!
//! Both walks here copy what they find into a `Vec` before any callback or
//! handler runs, so reentrant writes cannot disturb a walk in progress.

use std::any::Any;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::context::ContextState;
use crate::id::{ObjectId, PropertyId};
use crate::metadata::ParentLink;
use crate::registry::ErasedProperty;
use crate::value::ErasedValue;

/// An inherited value recorded before the tree changes shape.
struct Affected {
    node: ObjectId,
    object: Rc<dyn Any>,
    entry: Rc<dyn ErasedProperty>,
    before: ErasedValue,
}

impl ContextState {
    /// Breadth-first walk below `root`, recording every `C` whose value of
    /// `property` comes from inheritance or a lower provider.
    ///
    /// Subtrees that supply their own value are skipped. Objects of other
    /// types are walked through.
    pub(crate) fn inheriting_descendants<C: 'static>(
        &self,
        root: ObjectId,
        property: PropertyId,
        inheritance: usize,
    ) -> Vec<(Rc<C>, ErasedValue)> {
        let mut found = Vec::new();
        let mut queue: VecDeque<ObjectId> = self.objects.borrow().children(root).into_iter().collect();
        while let Some(node) = queue.pop_front() {
            let (value, index) = self.resolve(node, property);
            if index < inheritance {
                continue;
            }
            let (object, children) = {
                let objects = self.objects.borrow();
                (objects.object(node), objects.children(node))
            };
            if let Some(object) = object.and_then(|object| object.downcast::<C>().ok()) {
                found.push((object, value));
            }
            queue.extend(children);
        }
        found
    }

    /// Every inherited `(node, property, value)` in the subtree at `root`,
    /// `root` included, that currently resolves through inheritance or lower.
    fn inherited_snapshot(&self, root: ObjectId) -> Vec<Affected> {
        let Some(inheritance) = self.chain.inheritance_index() else {
            return Vec::new();
        };
        if !self.registry.borrow().has_inherited() {
            return Vec::new();
        }

        let mut nodes = Vec::new();
        {
            let objects = self.objects.borrow();
            let mut queue = VecDeque::from([root]);
            while let Some(node) = queue.pop_front() {
                if let Some(record) = objects.record(node) {
                    nodes.push((node, record.type_id, record.object.clone()));
                    queue.extend(record.children.iter().copied());
                }
            }
        }

        let mut affected = Vec::new();
        for (node, type_id, object) in nodes {
            let Some(object) = object.upgrade() else {
                continue;
            };
            let properties = self.registry.borrow().inherited_for(type_id);
            for property in properties {
                let Some(entry) = self.registry.borrow().get(property) else {
                    continue;
                };
                let (before, index) = entry.get_value_and_provider(self, node);
                if index >= inheritance {
                    affected.push(Affected {
                        node,
                        object: Rc::clone(&object),
                        entry,
                        before,
                    });
                }
            }
        }
        affected
    }

    /// Moves `child` under the parent named by `link`, then notifies every
    /// inherited value in the moved subtree that changed as a result.
    ///
    /// Notifications carry `child` as their sender.
    pub(crate) fn reparent(&self, child: ObjectId, link: Option<ParentLink>) {
        let parent = link.as_ref().map(|link| link.id);
        if self.objects.borrow().parent(child) == parent {
            return;
        }

        let snapshot = self.inherited_snapshot(child);
        {
            let mut objects = self.objects.borrow_mut();
            if let Some(link) = &link {
                objects.ensure_link(link);
            }
            objects.set_parent(child, parent);
        }
        tracing::trace!(%child, ?parent, recorded = snapshot.len(), "re-parented");

        for Affected {
            node,
            object,
            entry,
            before,
        } in snapshot
        {
            let (after, _) = entry.get_value_and_provider(self, node);
            if after == before {
                continue;
            }
            if let Err(err) = entry.call_change_handler(self, object, child, &before, &after) {
                tracing::error!(
                    property = entry.name(),
                    object = %node,
                    %err,
                    "failed to notify inherited change after re-parenting"
                );
            }
        }
    }
}
