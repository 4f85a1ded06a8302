// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fluent construction of binding paths.

use core::fmt;
use core::marker::PhantomData;
use std::rc::Rc;

use super::chain::{ChainReset, ChainRoot, Downstream, Hop, HopWriter, Outlet, RootHop, Terminal};
use crate::context::{ConfigurationContext, state};
use crate::id::{AsSource, DependencyObject, PropertyId};
use crate::property::ManagedProperty;
use crate::value::PropertyValue;

/// A chain with its root and its last hop.
pub(crate) struct BuiltChain<F> {
    pub(crate) root: Rc<dyn ChainRoot>,
    pub(crate) last: Rc<dyn HopWriter<F>>,
}

type Build<F> = Box<dyn FnOnce(Rc<dyn Downstream<F>>, Rc<dyn ChainReset>) -> BuiltChain<F>>;

/// Writes a target edit back to the source, for two-way bindings.
pub(crate) type Writeback<T> = Rc<dyn Fn(T) -> bool>;

type Terminate<T> = Box<dyn FnOnce(Rc<Outlet<T>>) -> (Rc<dyn ChainRoot>, Option<Writeback<T>>)>;

/// A source object followed by zero or more property hops.
///
/// Created with [`Property::of`](crate::Property::of), extended with
/// [`over`](Self::over), and finished with one of the terminal methods.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use understory_managed::{
///     BindingContext, DependencyObject, ObjectId, ObjectRef, Property, PropertyMetadataBuilder,
/// };
///
/// struct Node {
///     id: ObjectId,
/// }
///
/// impl DependencyObject for Node {
///     fn object_id(&self) -> ObjectId {
///         self.id
///     }
/// }
///
/// let next: Property<BindingContext, Option<ObjectRef<Node>>, Node> =
///     Property::register("Next", PropertyMetadataBuilder::new(None).build());
/// let label: Property<BindingContext, String, Node> =
///     Property::register("Label", PropertyMetadataBuilder::new(String::new()).build());
///
/// let head = Rc::new(Node { id: ObjectId::next() });
/// let tail = Rc::new(Node { id: ObjectId::next() });
/// let target = Rc::new(Node { id: ObjectId::next() });
///
/// label.set_value(&tail, "tail".to_owned());
/// next.set_value(&head, Some(ObjectRef::from(&tail)));
///
/// let binding = label
///     .bind(&target, next.of(&head).over(label).one_way())
///     .unwrap();
/// assert_eq!(label.get_value(&target), "tail");
///
/// binding.dispose();
/// assert_eq!(label.get_value(&target), "");
/// ```
#[must_use = "a binding path does nothing until it is bound"]
pub struct BindingPath<Cx, F> {
    build: Build<F>,
    hops: usize,
    marker: PhantomData<fn() -> Cx>,
}

impl<Cx, F> fmt::Debug for BindingPath<Cx, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingPath")
            .field("hops", &self.hops)
            .finish_non_exhaustive()
    }
}

impl<Cx: ConfigurationContext, F: PropertyValue> BindingPath<Cx, F> {
    pub(crate) fn start<C: DependencyObject>(property: PropertyId, source: &Rc<C>) -> Self {
        let source = Rc::downgrade(source);
        Self {
            build: Box::new(move |downstream: Rc<dyn Downstream<F>>, reset: Rc<dyn ChainReset>| {
                let hop = Hop::<F, C>::new(state::<Cx>(), property, downstream, reset);
                BuiltChain {
                    root: Rc::new(RootHop {
                        hop: Rc::clone(&hop),
                        source,
                    }),
                    last: hop,
                }
            }),
            hops: 1,
            marker: PhantomData,
        }
    }

    /// Number of property hops.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Continues the path at `next` on the object the current value names.
    ///
    /// Whenever the current value changes, the rest of the chain re-attaches
    /// to the new object. While it is `None` the binding has no value.
    pub fn over<V, C>(self, next: impl ManagedProperty<Cx, V, C>) -> BindingPath<Cx, V>
    where
        F: AsSource<C>,
        V: PropertyValue,
        C: DependencyObject,
    {
        let property = next.id();
        let build = self.build;
        BindingPath {
            build: Box::new(move |downstream: Rc<dyn Downstream<V>>, reset: Rc<dyn ChainReset>| {
                let hop = Hop::<V, C>::new(state::<Cx>(), property, downstream, Rc::clone(&reset));
                let upstream: Rc<dyn Downstream<F>> = Rc::clone(&hop) as Rc<dyn Downstream<F>>;
                let BuiltChain { root, .. } = build(upstream, reset);
                BuiltChain { root, last: hop }
            }),
            hops: self.hops + 1,
            marker: PhantomData,
        }
    }

    /// Binds the target to the path's value.
    pub fn one_way(self) -> BindingSpec<Cx, F> {
        self.convert_one_way(|value| value)
    }

    /// Binds the target to a converted value.
    pub fn convert_one_way<T: PropertyValue>(
        self,
        convert: impl Fn(F) -> T + 'static,
    ) -> BindingSpec<Cx, T> {
        let build = self.build;
        BindingSpec::new(self.hops, false, move |outlet: Rc<Outlet<T>>| {
            let terminal: Rc<dyn Downstream<F>> = Rc::new(Terminal {
                convert: Box::new(move |value: &F| convert(value.clone())),
                outlet: Rc::clone(&outlet),
            });
            let reset: Rc<dyn ChainReset> = outlet;
            let chain = build(terminal, reset);
            (chain.root, None)
        })
    }

    /// Binds both ways: local edits of the target are written to the last
    /// hop's current object.
    pub fn two_way(self) -> BindingSpec<Cx, F> {
        self.convert_two_way(|value| value, |value| value)
    }

    /// Binds both ways through a converter pair.
    pub fn convert_two_way<T: PropertyValue>(
        self,
        convert: impl Fn(F) -> T + 'static,
        convert_back: impl Fn(T) -> F + 'static,
    ) -> BindingSpec<Cx, T> {
        let build = self.build;
        BindingSpec::new(self.hops, true, move |outlet: Rc<Outlet<T>>| {
            let terminal: Rc<dyn Downstream<F>> = Rc::new(Terminal {
                convert: Box::new(move |value: &F| convert(value.clone())),
                outlet: Rc::clone(&outlet),
            });
            let reset: Rc<dyn ChainReset> = outlet;
            let chain = build(terminal, reset);
            let last = chain.last;
            let writeback: Writeback<T> = Rc::new(move |value: T| last.write(convert_back(value)));
            (chain.root, Some(writeback))
        })
    }
}

/// A finished binding path, ready for [`Property::bind`](crate::Property::bind).
#[must_use = "a binding spec does nothing until it is bound"]
pub struct BindingSpec<Cx, T> {
    terminate: Terminate<T>,
    hops: usize,
    two_way: bool,
    marker: PhantomData<fn() -> Cx>,
}

impl<Cx, T> fmt::Debug for BindingSpec<Cx, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingSpec")
            .field("hops", &self.hops)
            .field("two_way", &self.two_way)
            .finish_non_exhaustive()
    }
}

impl<Cx, T> BindingSpec<Cx, T> {
    fn new(
        hops: usize,
        two_way: bool,
        terminate: impl FnOnce(Rc<Outlet<T>>) -> (Rc<dyn ChainRoot>, Option<Writeback<T>>) + 'static,
    ) -> Self {
        Self {
            terminate: Box::new(terminate),
            hops,
            two_way,
            marker: PhantomData,
        }
    }

    /// Number of property hops.
    #[must_use]
    pub fn hops(&self) -> usize {
        self.hops
    }

    /// Whether target edits flow back to the source.
    #[must_use]
    pub fn is_two_way(&self) -> bool {
        self.two_way
    }

    /// Materializes the chain, delivering into `outlet`.
    pub(crate) fn materialize(
        self,
        outlet: Rc<Outlet<T>>,
    ) -> (Rc<dyn ChainRoot>, Option<Writeback<T>>) {
        (self.terminate)(outlet)
    }
}
