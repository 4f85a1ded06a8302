// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Randomized checks of the ownership tree and inherited resolution against
//! a plain model.

use std::rc::Rc;

use proptest::prelude::*;
use understory_managed::{
    Context, DefaultContext, DependencyObject, ObjectId, ObjectRef, Property,
    PropertyMetadataBuilder,
};

const NODES: usize = 6;
const DEFAULT: i32 = -1;

struct Node {
    id: ObjectId,
}

impl DependencyObject for Node {
    fn object_id(&self) -> ObjectId {
        self.id
    }
}

type Parent = Property<DefaultContext, Option<ObjectRef<Node>>, Node>;
type Weight = Property<DefaultContext, i32, Node>;

thread_local! {
    static PROPERTIES: (Parent, Weight) = (
        Property::register(
            "Parent",
            PropertyMetadataBuilder::new(None).parent_reference().build(),
        ),
        Property::register(
            "Weight",
            PropertyMetadataBuilder::new(DEFAULT).inherits(true).build(),
        ),
    );
}

fn properties() -> (Parent, Weight) {
    PROPERTIES.with(|properties| *properties)
}

#[derive(Clone, Debug)]
enum Op {
    Attach(usize, Option<usize>),
    Set(usize, i32),
    Clear(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NODES, proptest::option::of(0..NODES)).prop_map(|(child, parent)| Op::Attach(child, parent)),
        (0..NODES, 0..100_i32).prop_map(|(node, value)| Op::Set(node, value)),
        (0..NODES).prop_map(Op::Clear),
    ]
}

#[derive(Default)]
struct Model {
    parent: [Option<usize>; NODES],
    local: [Option<i32>; NODES],
}

impl Model {
    fn is_self_or_ancestor(&self, ancestor: usize, mut node: usize) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.parent[node] {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    fn resolve(&self, mut node: usize) -> i32 {
        loop {
            if let Some(value) = self.local[node] {
                return value;
            }
            match self.parent[node] {
                Some(parent) => node = parent,
                None => return DEFAULT,
            }
        }
    }
}

proptest! {
    #[test]
    fn tree_and_inheritance_match_the_model(ops in proptest::collection::vec(op(), 1..48)) {
        let (parent, weight) = properties();
        let nodes: Vec<Rc<Node>> = (0..NODES)
            .map(|_| Rc::new(Node { id: ObjectId::next() }))
            .collect();
        let mut model = Model::default();

        for op in ops {
            match op {
                Op::Attach(child, to) => {
                    let refused = to.is_some_and(|to| model.is_self_or_ancestor(child, to));
                    let accepted = parent
                        .set_value(&nodes[child], to.map(|to| ObjectRef::from(&nodes[to])))
                        .is_applied();
                    prop_assert_eq!(accepted, !refused);
                    if !refused {
                        model.parent[child] = to;
                    }
                }
                Op::Set(node, value) => {
                    prop_assert!(weight.set_value(&nodes[node], value).is_applied());
                    model.local[node] = Some(value);
                }
                Op::Clear(node) => {
                    prop_assert!(weight.remove_local_value(&nodes[node]).is_applied());
                    model.local[node] = None;
                }
            }

            for (index, node) in nodes.iter().enumerate() {
                prop_assert_eq!(weight.get_value(node), model.resolve(index));
                let expected_parent = model.parent[index].map(|p| nodes[p].id);
                prop_assert_eq!(Context::<DefaultContext>::parent_of(node.id), expected_parent);
                if let Some(p) = expected_parent {
                    prop_assert!(Context::<DefaultContext>::children_of(p).contains(&node.id));
                }
            }
        }
    }

    #[test]
    fn local_values_round_trip(values in proptest::collection::vec(any::<i32>(), 1..16)) {
        let (_, weight) = properties();
        let node = Rc::new(Node { id: ObjectId::next() });
        for value in values {
            prop_assert!(weight.set_value(&node, value).is_applied());
            prop_assert_eq!(weight.get_value(&node), value);
            prop_assert_eq!(weight.get_local_value(&node), Some(value));
        }
    }
}
