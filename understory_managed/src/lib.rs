// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Managed: managed properties for object graphs.
//!
//! A managed property is a typed slot that any participating object can
//! carry without declaring a field for it. Its effective value is resolved
//! through a chain of value providers, every write runs through a change
//! pipeline that can veto or rewrite it, and observers hear about every
//! visible change.
//!
//! ## Core Concepts
//!
//! ### Contexts and providers
//!
//! Every property belongs to a [`ConfigurationContext`], a type-level token
//! whose [`ProviderChain`] lists the value providers in precedence order.
//! The first provider with a value wins:
//!
//! - **Binding** - values driven by a [`Binding`] (only in chains that ask for it)
//! - **Local** - values set explicitly with `set_value`
//! - **Inheritance** - values taken from the nearest ancestor in the ownership tree
//! - **Default** - the default from the property's metadata
//!
//! Custom providers implement [`ValueProvider`] and slot in anywhere.
//!
//! ### Descriptors
//!
//! [`Property`], [`ReadOnlyProperty`] and [`AttachedProperty`] are `Copy`
//! handles typed by context, value type and owner type. They are registered
//! once per thread, usually inside a `thread_local!` next to the owner type.
//!
//! ### The change pipeline
//!
//! A write resolves the old value, hands a [`ChangingArgs`] to the
//! property's change callback (which may reject the write or substitute a
//! value), commits through the writing provider, propagates inherited values
//! to descendants and finally notifies handlers with a [`PropertyChanged`].
//! Writes through a provider that is currently shadowed by a higher one are
//! stored but produce no notification.
//!
//! ### The ownership tree
//!
//! Properties flagged [`PARENT_REFERENCE`](PropertySettings::PARENT_REFERENCE)
//! hold an object's parent. Setting one moves the object in the tree and
//! re-notifies inherited values in the moved subtree that changed.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use understory_managed::{
//!     DefaultContext, DependencyObject, ObjectId, ObjectRef, Property, PropertyMetadataBuilder,
//! };
//!
//! struct Element {
//!     id: ObjectId,
//! }
//!
//! impl DependencyObject for Element {
//!     fn object_id(&self) -> ObjectId {
//!         self.id
//!     }
//! }
//!
//! let parent: Property<DefaultContext, Option<ObjectRef<Element>>, Element> = Property::register(
//!     "Parent",
//!     PropertyMetadataBuilder::new(None).parent_reference().build(),
//! );
//! let font_size: Property<DefaultContext, f64, Element> = Property::register(
//!     "FontSize",
//!     PropertyMetadataBuilder::new(12.0).inherits(true).build(),
//! );
//!
//! let window = Rc::new(Element { id: ObjectId::next() });
//! let label = Rc::new(Element { id: ObjectId::next() });
//! parent.set_value(&label, Some(ObjectRef::from(&window)));
//!
//! let seen = Rc::new(Cell::new(0.0));
//! let sink = Rc::clone(&seen);
//! font_size.add_handler(&label, move |change| sink.set(*change.new_value));
//!
//! // The label inherits the window's value and hears about it.
//! font_size.set_value(&window, 16.0);
//! assert_eq!(font_size.get_value(&label), 16.0);
//! assert_eq!(seen.get(), 16.0);
//!
//! // A local value wins over inheritance.
//! font_size.set_value(&label, 9.0);
//! assert_eq!(font_size.get_value(&label), 9.0);
//! ```
//!
//! ## Threading
//!
//! Context state is per thread. Objects, descriptors and bindings are `!Send`
//! and must stay on the thread that created them.
//!
//! ## Memory
//!
//! The runtime never keeps an object alive. Records of dropped objects are
//! dropped by [`Context::prune`].

mod args;
mod binding;
mod context;
mod error;
mod events;
mod id;
mod metadata;
mod object;
mod pipeline;
mod property;
mod provider;
mod registry;
mod store;
mod tree;
mod value;

pub use args::{ChangingArgs, PropertyChanged, WriteOutcome};
pub use binding::{Binding, BindingPath, BindingSpec};
pub use context::{BindingContext, ConfigurationContext, Context, DefaultContext, PropertyInfo};
pub use error::PropertyError;
pub use id::{AsSource, DependencyObject, HandlerId, ObjectId, ObjectRef, PropertyId};
pub use metadata::{PropertyMetadata, PropertyMetadataBuilder, PropertySettings};
pub use property::{AttachedAccess, AttachedProperty, ManagedProperty, Property, ReadOnlyProperty};
pub use provider::{Provider, ProviderChain, ValueProvider};
pub use value::{ErasedValue, PropertyValue};
