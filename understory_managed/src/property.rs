// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed property descriptors.
//!
//! A descriptor is a `Copy` handle around a [`PropertyId`], typed by its
//! configuration context, value type and owner type. Metadata and the change
//! callback live in the context's registry.
//!
//! - [`Property`] is owned by a type and its callback is a method of that type.
//! - [`AttachedProperty`] can be set on any object of its target type and its
//!   callback receives the target explicitly.
//! - [`ReadOnlyProperty`] is the public face of a property whose writes are
//!   kept private to its owner.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;
use std::any::type_name;
use std::rc::Rc;

use crate::args::{ChangingArgs, PropertyChanged, WriteOutcome};
use crate::binding::{self, Binding, BindingPath, BindingSpec};
use crate::context::{ConfigurationContext, ContextState, state};
use crate::error::PropertyError;
use crate::events::Handler;
use crate::id::{DependencyObject, HandlerId, PropertyId};
use crate::metadata::PropertyMetadata;
use crate::pipeline::{self, Request};
use crate::provider::Provider;
use crate::registry::{ChangeCallback, PropertyEntry, typed_entry};
use crate::value::{PropertyValue, expect_typed};

/// Anything that names a managed property of value `V` on owner `C` in
/// context `Cx`.
///
/// Implemented by every descriptor kind, so any of them can be a hop of a
/// binding path.
pub trait ManagedProperty<Cx, V, C>: Copy {
    /// The property's id within its context.
    fn id(self) -> PropertyId;
}

/// Operations shared by every descriptor kind.
struct Key<Cx, V, C> {
    id: PropertyId,
    marker: PhantomData<fn() -> (Cx, V, C)>,
}

impl<Cx, V, C> Clone for Key<Cx, V, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<Cx, V, C> Copy for Key<Cx, V, C> {}

impl<Cx, V, C> Key<Cx, V, C> {
    const fn new(id: PropertyId) -> Self {
        Self {
            id,
            marker: PhantomData,
        }
    }
}

impl<Cx: ConfigurationContext, V: PropertyValue, C: DependencyObject> Key<Cx, V, C> {
    fn register(
        name: &'static str,
        metadata: PropertyMetadata<V>,
        callback: ChangeCallback<V, C>,
        attached: bool,
    ) -> Self {
        let id = state::<Cx>()
            .registry
            .borrow_mut()
            .register(name, metadata, callback, attached);
        Self::new(id)
    }

    fn entry(self, state: &ContextState) -> Rc<PropertyEntry<V, C>> {
        typed_entry(state, self.id)
    }

    fn name(self) -> &'static str {
        state::<Cx>().registry.borrow().name(self.id).unwrap_or("?")
    }

    fn get_value(self, object: &C) -> V {
        let (value, _) = state::<Cx>().resolve(object.object_id(), self.id);
        expect_typed(&value)
    }

    fn write(self, provider: usize, object: &Rc<C>, request: Request<V>) -> WriteOutcome {
        let state = state::<Cx>();
        let entry = self.entry(&state);
        pipeline::change(&state, &entry, provider, object, request)
    }

    fn local_index(state: &ContextState) -> usize {
        match state.chain.local_index() {
            Some(index) => index,
            None => panic!("context `{}` has no local provider", state.name),
        }
    }

    fn set_value(self, object: &Rc<C>, value: V) -> WriteOutcome {
        let local = Self::local_index(&state::<Cx>());
        self.write(local, object, Request::Set(value))
    }

    fn remove_local_value(self, object: &Rc<C>) -> WriteOutcome {
        let local = Self::local_index(&state::<Cx>());
        self.write(local, object, Request::Clear)
    }

    fn writable_provider(self, provider: &Provider) -> Result<usize, PropertyError> {
        let index = state::<Cx>().provider_index(provider)?;
        match provider {
            Provider::Local | Provider::Custom(_) => Ok(index),
            _ => Err(PropertyError::ProviderNotWritable(provider.name().to_owned())),
        }
    }

    fn set_provider_value(
        self,
        provider: &Provider,
        object: &Rc<C>,
        value: V,
    ) -> Result<WriteOutcome, PropertyError> {
        let index = self.writable_provider(provider)?;
        Ok(self.write(index, object, Request::Set(value)))
    }

    fn clear_provider_value(self, provider: &Provider, object: &Rc<C>) -> Result<WriteOutcome, PropertyError> {
        let index = self.writable_provider(provider)?;
        Ok(self.write(index, object, Request::Clear))
    }

    fn get_local_value(self, object: &C) -> Option<V> {
        let value = state::<Cx>()
            .objects
            .borrow()
            .local(object.object_id(), self.id)
            .cloned();
        value.as_ref().map(expect_typed)
    }

    fn has_local_value(self, object: &C) -> bool {
        state::<Cx>()
            .objects
            .borrow()
            .has_local(object.object_id(), self.id)
    }

    fn get_provider_value(self, provider: &Provider, object: &C) -> Result<Option<V>, PropertyError> {
        let state = state::<Cx>();
        state.provider_index(provider)?;
        let value = state.provider_value(provider, object.object_id(), self.id);
        Ok(value.as_ref().map(expect_typed))
    }

    fn value_source(self, object: &C) -> Provider {
        let state = state::<Cx>();
        let (_, index) = state.resolve(object.object_id(), self.id);
        state.chain.get(index).cloned().unwrap_or(Provider::Default)
    }

    fn add_handler(
        self,
        object: &Rc<C>,
        handler: impl Fn(&PropertyChanged<'_, C, V>) + 'static,
    ) -> HandlerId {
        let state = state::<Cx>();
        // Known objects get their handlers dropped by `Context::prune`.
        let id = state.objects.borrow_mut().ensure(object);
        state
            .events
            .borrow_mut()
            .add(id, self.id, Handler(Box::new(handler)))
    }

    fn remove_handler(self, object: &C, handler: HandlerId) -> bool {
        state::<Cx>()
            .events
            .borrow_mut()
            .remove(object.object_id(), self.id, handler)
    }

    fn add_global_handler(self, handler: impl Fn(&PropertyChanged<'_, C, V>) + 'static) -> HandlerId {
        state::<Cx>()
            .events
            .borrow_mut()
            .add_global(self.id, Handler(Box::new(handler)))
    }

    fn remove_global_handler(self, handler: HandlerId) -> bool {
        state::<Cx>()
            .events
            .borrow_mut()
            .remove_global(self.id, handler)
    }

    fn of(self, source: &Rc<C>) -> BindingPath<Cx, V> {
        BindingPath::start::<C>(self.id, source)
    }

    fn bind(self, target: &Rc<C>, spec: BindingSpec<Cx, V>) -> Result<Binding, PropertyError> {
        binding::bind::<Cx, V, C>(self.id, target, spec)
    }
}

macro_rules! descriptor_common {
    ($ty:ident) => {
        impl<Cx, V, C> Clone for $ty<Cx, V, C> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<Cx, V, C> Copy for $ty<Cx, V, C> {}

        impl<Cx, V, C> Eq for $ty<Cx, V, C> {}

        impl<Cx, V, C> Hash for $ty<Cx, V, C> {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.key.id.hash(state);
            }
        }

        impl<Cx, V, C> ManagedProperty<Cx, V, C> for $ty<Cx, V, C> {
            fn id(self) -> PropertyId {
                self.key.id
            }
        }

        impl<Cx: ConfigurationContext, V: PropertyValue, C: DependencyObject> fmt::Debug
            for $ty<Cx, V, C>
        {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("id", &self.key.id)
                    .field("name", &self.key.name())
                    .field("value", &type_name::<V>())
                    .field("owner", &type_name::<C>())
                    .finish()
            }
        }

        impl<Cx: ConfigurationContext, V: PropertyValue, C: DependencyObject> $ty<Cx, V, C> {
            /// The property's id within its context.
            #[must_use]
            #[inline]
            pub fn id(self) -> PropertyId {
                self.key.id
            }

            /// The registered name.
            #[must_use]
            pub fn name(self) -> &'static str {
                self.key.name()
            }

            /// Resolves the value through the provider chain.
            #[must_use]
            pub fn get_value(self, object: &C) -> V {
                self.key.get_value(object)
            }

            /// The local value, if one is set.
            #[must_use]
            pub fn get_local_value(self, object: &C) -> Option<V> {
                self.key.get_local_value(object)
            }

            /// Returns `true` if a local value is set.
            #[must_use]
            pub fn has_local_value(self, object: &C) -> bool {
                self.key.has_local_value(object)
            }

            /// The provider currently supplying the value.
            #[must_use]
            pub fn value_source(self, object: &C) -> Provider {
                self.key.value_source(object)
            }

            /// Asks a single provider for its value.
            ///
            /// # Errors
            ///
            /// Returns [`PropertyError::ProviderNotInChain`] if `provider` is
            /// not part of the context's chain.
            pub fn get_provider_value(
                self,
                provider: &Provider,
                object: &C,
            ) -> Result<Option<V>, PropertyError> {
                self.key.get_provider_value(provider, object)
            }

            /// Subscribes to visible changes of this property on `object`.
            ///
            /// The registration is dropped by
            /// [`Context::prune`](crate::Context::prune) once `object` is gone.
            pub fn add_handler(
                self,
                object: &Rc<C>,
                handler: impl Fn(&PropertyChanged<'_, C, V>) + 'static,
            ) -> HandlerId {
                self.key.add_handler(object, handler)
            }

            /// Removes a handler added with [`add_handler`](Self::add_handler).
            ///
            /// Returns `false` if it was not registered.
            pub fn remove_handler(self, object: &C, handler: HandlerId) -> bool {
                self.key.remove_handler(object, handler)
            }

            /// Subscribes to visible changes of this property on any object.
            ///
            /// Global handlers run after the per-object handlers.
            pub fn add_global_handler(
                self,
                handler: impl Fn(&PropertyChanged<'_, C, V>) + 'static,
            ) -> HandlerId {
                self.key.add_global_handler(handler)
            }

            /// Removes a handler added with
            /// [`add_global_handler`](Self::add_global_handler).
            pub fn remove_global_handler(self, handler: HandlerId) -> bool {
                self.key.remove_global_handler(handler)
            }

            /// Starts a binding path at this property of `source`.
            #[must_use]
            pub fn of(self, source: &Rc<C>) -> BindingPath<Cx, V> {
                self.key.of(source)
            }
        }
    };
}

/// A property owned by type `C`.
///
/// # Example
///
/// ```rust
/// use std::rc::Rc;
/// use understory_managed::{
///     ChangingArgs, DefaultContext, DependencyObject, ObjectId, Property,
///     PropertyMetadataBuilder,
/// };
///
/// struct Slider {
///     id: ObjectId,
/// }
///
/// impl DependencyObject for Slider {
///     fn object_id(&self) -> ObjectId {
///         self.id
///     }
/// }
///
/// impl Slider {
///     fn value_property() -> Property<DefaultContext, i32, Slider> {
///         thread_local! {
///             static VALUE: Property<DefaultContext, i32, Slider> = Property::register_with(
///                 "Value",
///                 PropertyMetadataBuilder::new(0).build(),
///                 Slider::on_value_changing,
///             );
///         }
///         VALUE.with(|p| *p)
///     }
///
///     fn on_value_changing(&self, args: &mut ChangingArgs<i32>) {
///         args.set_mutated_value((*args.new_value()).clamp(0, 100));
///     }
///
///     fn value(&self) -> i32 {
///         Self::value_property().get_value(self)
///     }
///
///     fn set_value(self: &Rc<Self>, value: i32) -> bool {
///         Self::value_property().set_value(self, value).is_applied()
///     }
/// }
///
/// let slider = Rc::new(Slider { id: ObjectId::next() });
/// assert_eq!(slider.value(), 0);
/// assert!(slider.set_value(250));
/// assert_eq!(slider.value(), 100);
/// ```
pub struct Property<Cx, V, C> {
    key: Key<Cx, V, C>,
}

descriptor_common!(Property);

impl<Cx: ConfigurationContext, V: PropertyValue, C: DependencyObject> Property<Cx, V, C> {
    /// Registers a property without a change callback.
    ///
    /// Each call registers a new property; call it once per thread and keep
    /// the handle, typically in a `thread_local!`.
    ///
    /// # Panics
    ///
    /// Panics if the context already has 65,535 properties, or if the
    /// metadata is flagged `PARENT_REFERENCE` without
    /// [`parent_reference`](crate::PropertyMetadataBuilder::parent_reference).
    #[must_use]
    pub fn register(name: &'static str, metadata: PropertyMetadata<V>) -> Self {
        Self {
            key: Key::register(name, metadata, ChangeCallback::None, false),
        }
    }

    /// Registers a property whose change callback is a method of `C`.
    ///
    /// # Panics
    ///
    /// As [`register`](Self::register).
    #[must_use]
    pub fn register_with(
        name: &'static str,
        metadata: PropertyMetadata<V>,
        on_changing: impl Fn(&C, &mut ChangingArgs<V>) + 'static,
    ) -> Self {
        Self {
            key: Key::register(
                name,
                metadata,
                ChangeCallback::Owner(Box::new(on_changing)),
                false,
            ),
        }
    }

    /// The read-only view of this property.
    #[must_use]
    pub fn read_only(self) -> ReadOnlyProperty<Cx, V, C> {
        ReadOnlyProperty { key: self.key }
    }

    /// Sets the local value.
    ///
    /// The outcome reports whether the change callback rejected the write,
    /// along with any validation message it attached.
    ///
    /// # Panics
    ///
    /// Panics if the context's chain has no [`Provider::Local`].
    pub fn set_value(self, object: &Rc<C>, value: V) -> WriteOutcome {
        self.key.set_value(object, value)
    }

    /// Removes the local value, so lower providers show through.
    ///
    /// # Panics
    ///
    /// Panics if the context's chain has no [`Provider::Local`].
    pub fn remove_local_value(self, object: &Rc<C>) -> WriteOutcome {
        self.key.remove_local_value(object)
    }

    /// Writes through a specific provider.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::ProviderNotInChain`] if the provider is not
    /// part of the context, and [`PropertyError::ProviderNotWritable`] for
    /// providers that do not store values.
    pub fn set_provider_value(
        self,
        provider: &Provider,
        object: &Rc<C>,
        value: V,
    ) -> Result<WriteOutcome, PropertyError> {
        self.key.set_provider_value(provider, object, value)
    }

    /// Removes the value a specific provider holds.
    ///
    /// # Errors
    ///
    /// As [`set_provider_value`](Self::set_provider_value).
    pub fn clear_provider_value(
        self,
        provider: &Provider,
        object: &Rc<C>,
    ) -> Result<WriteOutcome, PropertyError> {
        self.key.clear_provider_value(provider, object)
    }

    /// Drives this property of `target` from a binding path.
    ///
    /// An existing binding of the same target property is disposed first.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::BindingsDisabled`] if the context's chain has
    /// no [`Provider::Binding`].
    pub fn bind(self, target: &Rc<C>, spec: BindingSpec<Cx, V>) -> Result<Binding, PropertyError> {
        self.key.bind(target, spec)
    }
}

/// The public, read-only face of a [`Property`].
///
/// Compares and hashes equal to the property it was made from.
pub struct ReadOnlyProperty<Cx, V, C> {
    key: Key<Cx, V, C>,
}

descriptor_common!(ReadOnlyProperty);

impl<Cx, V, C> PartialEq for Property<Cx, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.key.id == other.key.id
    }
}

impl<Cx, V, C> PartialEq for ReadOnlyProperty<Cx, V, C> {
    fn eq(&self, other: &Self) -> bool {
        self.key.id == other.key.id
    }
}

impl<Cx, V, C> PartialEq<ReadOnlyProperty<Cx, V, C>> for Property<Cx, V, C> {
    fn eq(&self, other: &ReadOnlyProperty<Cx, V, C>) -> bool {
        self.key.id == other.key.id
    }
}

impl<Cx, V, C> PartialEq<Property<Cx, V, C>> for ReadOnlyProperty<Cx, V, C> {
    fn eq(&self, other: &Property<Cx, V, C>) -> bool {
        self.key.id == other.key.id
    }
}

/// A property that can be set on any object of type `T`.
pub struct AttachedProperty<Cx, V, T> {
    key: Key<Cx, V, T>,
}

descriptor_common!(AttachedProperty);

impl<Cx, V, T> PartialEq for AttachedProperty<Cx, V, T> {
    fn eq(&self, other: &Self) -> bool {
        self.key.id == other.key.id
    }
}

impl<Cx: ConfigurationContext, V: PropertyValue, T: DependencyObject> AttachedProperty<Cx, V, T> {
    /// Registers an attached property without a change callback.
    ///
    /// # Panics
    ///
    /// As [`Property::register`].
    #[must_use]
    pub fn register(name: &'static str, metadata: PropertyMetadata<V>) -> Self {
        Self {
            key: Key::register(name, metadata, ChangeCallback::None, true),
        }
    }

    /// Registers an attached property whose callback receives the target.
    ///
    /// # Panics
    ///
    /// As [`Property::register`].
    #[must_use]
    pub fn register_with(
        name: &'static str,
        metadata: PropertyMetadata<V>,
        on_changing: impl Fn(&Rc<T>, &mut ChangingArgs<V>) + 'static,
    ) -> Self {
        Self {
            key: Key::register(
                name,
                metadata,
                ChangeCallback::Target(Box::new(on_changing)),
                true,
            ),
        }
    }

    /// Sets the local value on `target`.
    ///
    /// # Panics
    ///
    /// Panics if the context's chain has no [`Provider::Local`].
    pub fn set_value(self, target: &Rc<T>, value: V) -> WriteOutcome {
        self.key.set_value(target, value)
    }

    /// Removes the local value from `target`.
    ///
    /// # Panics
    ///
    /// Panics if the context's chain has no [`Provider::Local`].
    pub fn remove_local_value(self, target: &Rc<T>) -> WriteOutcome {
        self.key.remove_local_value(target)
    }

    /// Writes through a specific provider.
    ///
    /// # Errors
    ///
    /// As [`Property::set_provider_value`].
    pub fn set_provider_value(
        self,
        provider: &Provider,
        target: &Rc<T>,
        value: V,
    ) -> Result<WriteOutcome, PropertyError> {
        self.key.set_provider_value(provider, target, value)
    }

    /// Drives this property of `target` from a binding path.
    ///
    /// # Errors
    ///
    /// As [`Property::bind`].
    pub fn bind(self, target: &Rc<T>, spec: BindingSpec<Cx, V>) -> Result<Binding, PropertyError> {
        self.key.bind(target, spec)
    }

    /// Accessor for this property on one target.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::rc::Rc;
    /// use understory_managed::{
    ///     AttachedProperty, DefaultContext, DependencyObject, ObjectId, PropertyMetadataBuilder,
    /// };
    ///
    /// struct Cell {
    ///     id: ObjectId,
    /// }
    ///
    /// impl DependencyObject for Cell {
    ///     fn object_id(&self) -> ObjectId {
    ///         self.id
    ///     }
    /// }
    ///
    /// let row: AttachedProperty<DefaultContext, u32, Cell> =
    ///     AttachedProperty::register("Grid.Row", PropertyMetadataBuilder::new(0).build());
    ///
    /// let cell = Rc::new(Cell { id: ObjectId::next() });
    /// let access = row.on(&cell);
    /// access.set(3);
    /// assert_eq!(access.get(), 3);
    /// assert!(access.clear().is_applied());
    /// assert_eq!(access.local(), None);
    /// ```
    #[must_use]
    pub fn on(self, target: &Rc<T>) -> AttachedAccess<'_, Cx, V, T> {
        AttachedAccess {
            property: self,
            target,
        }
    }
}

/// An [`AttachedProperty`] paired with one target.
pub struct AttachedAccess<'a, Cx, V, T> {
    property: AttachedProperty<Cx, V, T>,
    target: &'a Rc<T>,
}

impl<Cx: ConfigurationContext, V: PropertyValue, T: DependencyObject> fmt::Debug
    for AttachedAccess<'_, Cx, V, T>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedAccess")
            .field("property", &self.property)
            .field("target", &self.target.object_id())
            .finish()
    }
}

impl<Cx: ConfigurationContext, V: PropertyValue, T: DependencyObject> AttachedAccess<'_, Cx, V, T> {
    /// Resolved value on the target.
    #[must_use]
    pub fn get(&self) -> V {
        self.property.get_value(self.target)
    }

    /// Sets the local value on the target.
    pub fn set(&self, value: V) -> WriteOutcome {
        self.property.set_value(self.target, value)
    }

    /// Local value on the target, if any.
    #[must_use]
    pub fn local(&self) -> Option<V> {
        self.property.get_local_value(self.target)
    }

    /// Removes the local value from the target.
    pub fn clear(&self) -> WriteOutcome {
        self.property.remove_local_value(self.target)
    }

    /// Subscribes to changes on the target.
    pub fn add_changed(&self, handler: impl Fn(&PropertyChanged<'_, T, V>) + 'static) -> HandlerId {
        self.property.add_handler(self.target, handler)
    }

    /// Removes a handler added with [`add_changed`](Self::add_changed).
    pub fn remove_changed(&self, handler: HandlerId) -> bool {
        self.property.remove_handler(self.target, handler)
    }
}
