// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tests for the ownership tree: parent references, inherited values and
//! the notifications re-parenting produces.

use std::cell::RefCell;
use std::rc::Rc;

use understory_managed::{
    Context, DefaultContext, DependencyObject, ObjectId, ObjectRef, Property,
    PropertyMetadataBuilder, Provider,
};

struct Element {
    id: ObjectId,
}

impl DependencyObject for Element {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

struct Panel {
    id: ObjectId,
}

impl DependencyObject for Panel {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

type ParentProperty = Property<DefaultContext, Option<ObjectRef<Element>>, Element>;
type FontSize = Property<DefaultContext, f64, Element>;

/// A change as seen by a handler: sender, old, new.
type Seen = Rc<RefCell<Vec<(ObjectId, f64, f64)>>>;

fn element() -> Rc<Element> {
    Rc::new(Element {
        id: ObjectId::next(),
    })
}

fn register() -> (ParentProperty, FontSize) {
    let parent = Property::register(
        "Parent",
        PropertyMetadataBuilder::new(None).parent_reference().build(),
    );
    let font_size = Property::register(
        "FontSize",
        PropertyMetadataBuilder::new(12.0).inherits(true).build(),
    );
    (parent, font_size)
}

fn attach(parent: ParentProperty, child: &Rc<Element>, to: &Rc<Element>) {
    assert!(parent.set_value(child, Some(ObjectRef::from(to))).is_applied());
}

fn watch(font_size: FontSize, object: &Rc<Element>) -> Seen {
    let seen: Seen = Rc::default();
    let sink = Rc::clone(&seen);
    font_size.add_handler(object, move |change| {
        sink.borrow_mut()
            .push((change.sender, *change.old_value, *change.new_value));
    });
    seen
}

#[test]
fn children_reflect_the_nearest_ancestor() {
    let (parent, font_size) = register();
    let root = element();
    let middle = element();
    let leaf = element();
    attach(parent, &middle, &root);
    attach(parent, &leaf, &middle);

    font_size.set_value(&root, 20.0);
    assert_eq!(font_size.get_value(&leaf), 20.0);
    assert_eq!(font_size.value_source(&leaf), Provider::Inheritance);

    font_size.set_value(&middle, 16.0);
    assert_eq!(font_size.get_value(&leaf), 16.0);
    assert_eq!(font_size.get_value(&root), 20.0);

    assert_eq!(Context::<DefaultContext>::parent_of(leaf.id), Some(middle.id));
    assert_eq!(Context::<DefaultContext>::children_of(root.id), [middle.id]);
}

#[test]
fn ancestor_changes_notify_descendants_with_the_ancestor_as_sender() {
    let (parent, font_size) = register();
    let root = element();
    let child = element();
    let grandchild = element();
    attach(parent, &child, &root);
    attach(parent, &grandchild, &child);

    let child_seen = watch(font_size, &child);
    let grandchild_seen = watch(font_size, &grandchild);

    font_size.set_value(&root, 18.0);
    assert_eq!(*child_seen.borrow(), [(root.id, 12.0, 18.0)]);
    assert_eq!(*grandchild_seen.borrow(), [(root.id, 12.0, 18.0)]);
}

#[test]
fn local_values_shield_their_subtree() {
    let (parent, font_size) = register();
    let root = element();
    let child = element();
    let grandchild = element();
    attach(parent, &child, &root);
    attach(parent, &grandchild, &child);
    font_size.set_value(&child, 9.0);

    let child_seen = watch(font_size, &child);
    let grandchild_seen = watch(font_size, &grandchild);

    font_size.set_value(&root, 30.0);
    assert_eq!(font_size.get_value(&grandchild), 9.0);
    assert!(child_seen.borrow().is_empty());
    assert!(grandchild_seen.borrow().is_empty());
}

#[test]
fn reparenting_notifies_once_per_changed_value() {
    let (parent, font_size) = register();
    let small = element();
    let large = element();
    let also_large = element();
    let child = element();
    let grandchild = element();
    font_size.set_value(&small, 10.0);
    font_size.set_value(&large, 20.0);
    font_size.set_value(&also_large, 20.0);
    attach(parent, &child, &small);
    attach(parent, &grandchild, &child);

    let child_seen = watch(font_size, &child);
    let grandchild_seen = watch(font_size, &grandchild);

    attach(parent, &child, &large);
    assert_eq!(*child_seen.borrow(), [(child.id, 10.0, 20.0)]);
    assert_eq!(*grandchild_seen.borrow(), [(child.id, 10.0, 20.0)]);
    assert!(Context::<DefaultContext>::children_of(small.id).is_empty());
    assert_eq!(Context::<DefaultContext>::children_of(large.id), [child.id]);

    // Same inherited value under the new parent: nothing to report.
    attach(parent, &child, &also_large);
    assert_eq!(child_seen.borrow().len(), 1);
    assert_eq!(grandchild_seen.borrow().len(), 1);

    // Detaching falls back to the default.
    parent.set_value(&child, None);
    assert_eq!(Context::<DefaultContext>::parent_of(child.id), None);
    assert_eq!(child_seen.borrow().last(), Some(&(child.id, 20.0, 12.0)));
}

#[test]
fn parent_handlers_observe_the_new_tree() {
    let (parent, _) = register();
    let root = element();
    let child = element();

    let observed = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&observed);
    parent.add_handler(&child, move |change| {
        *sink.borrow_mut() = Some(Context::<DefaultContext>::parent_of(change.object.id));
    });

    attach(parent, &child, &root);
    assert_eq!(*observed.borrow(), Some(Some(root.id)));
}

#[test]
fn cycles_are_refused() {
    let (parent, _) = register();
    let root = element();
    let child = element();
    attach(parent, &child, &root);

    assert!(parent.set_value(&root, Some(ObjectRef::from(&child))).is_rejected());
    assert!(parent.set_value(&root, Some(ObjectRef::from(&root))).is_rejected());
    assert_eq!(parent.get_value(&root), None);
    assert_eq!(Context::<DefaultContext>::parent_of(root.id), None);
    assert_eq!(Context::<DefaultContext>::parent_of(child.id), Some(root.id));
}

#[test]
fn inheritance_walks_through_other_object_types() {
    let (_, font_size) = register();
    let panel_parent: Property<DefaultContext, Option<ObjectRef<Element>>, Panel> =
        Property::register(
            "PanelParent",
            PropertyMetadataBuilder::new(None).parent_reference().build(),
        );
    let element_in_panel: Property<DefaultContext, Option<ObjectRef<Panel>>, Element> =
        Property::register(
            "ElementPanel",
            PropertyMetadataBuilder::new(None).parent_reference().build(),
        );

    let root = element();
    let panel = Rc::new(Panel {
        id: ObjectId::next(),
    });
    let leaf = element();
    panel_parent.set_value(&panel, Some(ObjectRef::from(&root)));
    element_in_panel.set_value(&leaf, Some(ObjectRef::from(&panel)));

    let seen = watch(font_size, &leaf);
    font_size.set_value(&root, 14.0);
    assert_eq!(font_size.get_value(&leaf), 14.0);
    assert_eq!(*seen.borrow(), [(root.id, 12.0, 14.0)]);
}

#[test]
fn dropped_objects_are_pruned() {
    let (parent, font_size) = register();
    let root = element();
    let child = element();
    attach(parent, &child, &root);
    font_size.set_value(&child, 11.0);
    let child_id = child.id;
    drop(child);

    assert_eq!(Context::<DefaultContext>::prune(), 1);
    assert!(Context::<DefaultContext>::children_of(root.id).is_empty());
    assert_eq!(Context::<DefaultContext>::parent_of(child_id), None);
    assert_eq!(Context::<DefaultContext>::prune(), 0);
}

#[test]
fn objects_that_were_only_observed_are_pruned() {
    let (_, font_size) = register();
    let observed = element();
    let seen = watch(font_size, &observed);
    drop(observed);

    assert_eq!(Context::<DefaultContext>::prune(), 1);
    assert!(seen.borrow().is_empty());
}
