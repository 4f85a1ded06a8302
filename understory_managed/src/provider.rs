// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Value providers and precedence-ordered resolution.
//!
//! A context resolves a property by asking each [`Provider`] of its
//! [`ProviderChain`] in turn and taking the first value offered. The position
//! of a provider in the chain is its precedence index: 0 wins over everything.

use core::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::context::ContextState;
use crate::id::{ObjectId, PropertyId};
use crate::metadata::PropertySettings;
use crate::value::ErasedValue;

/// A custom source of property values.
///
/// Custom providers take part in resolution at the position they are given in
/// a [`ProviderChain`], and store values written to them through
/// [`Property::set_provider_value`](crate::Property::set_provider_value).
///
/// Implementations are called with no runtime state borrowed, so they may
/// read other properties.
pub trait ValueProvider {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Returns the value this provider holds for `(object, property)`, if any.
    fn try_get_value(&self, object: ObjectId, property: PropertyId) -> Option<ErasedValue>;

    /// Stores (`Some`) or removes (`None`) the value for `(object, property)`.
    fn update(&self, object: ObjectId, property: PropertyId, value: Option<ErasedValue>);
}

/// One layer of value resolution.
#[derive(Clone)]
pub enum Provider {
    /// Values pushed by an active [`Binding`](crate::Binding).
    Binding,
    /// Values set explicitly on the object.
    Local,
    /// Values taken from the nearest ancestor in the ownership tree.
    ///
    /// Only consulted for properties registered with
    /// [`PropertySettings::INHERITED`].
    Inheritance,
    /// The registered default. Always has a value.
    Default,
    /// A user supplied provider.
    Custom(Rc<dyn ValueProvider>),
}

impl Provider {
    /// Name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Binding => "Binding",
            Self::Local => "Local",
            Self::Inheritance => "Inheritance",
            Self::Default => "Default",
            Self::Custom(provider) => provider.name(),
        }
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Binding, Self::Binding)
            | (Self::Local, Self::Local)
            | (Self::Inheritance, Self::Inheritance)
            | (Self::Default, Self::Default) => true,
            (Self::Custom(a), Self::Custom(b)) => core::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            _ => false,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(provider) => f.debug_tuple("Custom").field(&provider.name()).finish(),
            _ => f.write_str(self.name()),
        }
    }
}

/// The ordered providers of a configuration context.
///
/// # Example
///
/// ```rust
/// use understory_managed::{Provider, ProviderChain};
///
/// let chain = ProviderChain::with_bindings();
/// assert_eq!(chain.index_of(&Provider::Binding), Some(0));
/// assert_eq!(chain.index_of(&Provider::Local), Some(1));
/// assert_eq!(ProviderChain::standard().index_of(&Provider::Binding), None);
/// ```
#[derive(Clone, Debug)]
pub struct ProviderChain {
    providers: SmallVec<[Provider; 5]>,
    binding: Option<usize>,
    local: Option<usize>,
    inheritance: Option<usize>,
}

impl ProviderChain {
    /// Creates a chain from providers in precedence order (highest first).
    ///
    /// A chain without [`Provider::Default`] must make sure some other
    /// provider always has a value, or reads panic.
    pub fn new(providers: impl IntoIterator<Item = Provider>) -> Self {
        let providers: SmallVec<[Provider; 5]> = providers.into_iter().collect();
        let position = |wanted: Provider| providers.iter().position(|p| *p == wanted);
        Self {
            binding: position(Provider::Binding),
            local: position(Provider::Local),
            inheritance: position(Provider::Inheritance),
            providers,
        }
    }

    /// `Local`, `Inheritance`, `Default`.
    #[must_use]
    pub fn standard() -> Self {
        Self::new([Provider::Local, Provider::Inheritance, Provider::Default])
    }

    /// `Binding`, `Local`, `Inheritance`, `Default`.
    #[must_use]
    pub fn with_bindings() -> Self {
        Self::new([
            Provider::Binding,
            Provider::Local,
            Provider::Inheritance,
            Provider::Default,
        ])
    }

    /// Returns the number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if the chain has no providers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Iterates providers in precedence order.
    pub fn iter(&self) -> impl Iterator<Item = &Provider> {
        self.providers.iter()
    }

    /// Returns the provider at a precedence index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Provider> {
        self.providers.get(index)
    }

    /// Returns the precedence index of `provider`.
    #[must_use]
    pub fn index_of(&self, provider: &Provider) -> Option<usize> {
        self.providers.iter().position(|p| p == provider)
    }

    pub(crate) fn binding_index(&self) -> Option<usize> {
        self.binding
    }

    pub(crate) fn local_index(&self) -> Option<usize> {
        self.local
    }

    pub(crate) fn inheritance_index(&self) -> Option<usize> {
        self.inheritance
    }
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl ContextState {
    /// Resolves `(object, property)` through the whole chain.
    ///
    /// Returns the value and the precedence index of the provider that
    /// supplied it.
    ///
    /// # Panics
    ///
    /// Panics if no provider has a value, which means the chain has no
    /// [`Provider::Default`] and nothing stood in for it.
    pub(crate) fn resolve(&self, object: ObjectId, property: PropertyId) -> (ErasedValue, usize) {
        self.resolve_skipping(object, property, None)
    }

    /// Like [`resolve`](Self::resolve) but ignoring the provider at `skip`.
    pub(crate) fn resolve_skipping(
        &self,
        object: ObjectId,
        property: PropertyId,
        skip: Option<usize>,
    ) -> (ErasedValue, usize) {
        for (index, provider) in self.chain.iter().enumerate() {
            if Some(index) == skip {
                continue;
            }
            if let Some(value) = self.provider_value(provider, object, property) {
                return (value, index);
            }
        }
        panic!(
            "no provider of context `{}` has a value for {property} on object {object}",
            self.name
        );
    }

    /// Asks a single provider for its value.
    pub(crate) fn provider_value(
        &self,
        provider: &Provider,
        object: ObjectId,
        property: PropertyId,
    ) -> Option<ErasedValue> {
        match provider {
            Provider::Binding => {
                let slot = self
                    .bindings
                    .borrow()
                    .get(&(object, property))
                    .and_then(Weak::upgrade)?;
                slot.current_value()
            }
            Provider::Local => self.objects.borrow().local(object, property).cloned(),
            Provider::Inheritance => {
                let inheritance = self.chain.inheritance_index()?;
                let settings = self.registry.borrow().get(property)?.settings();
                if !settings.contains(PropertySettings::INHERITED) {
                    return None;
                }
                let parent = self.objects.borrow().parent(object)?;
                let (value, index) = self.resolve(parent, property);
                (index <= inheritance).then_some(value)
            }
            Provider::Default => {
                let entry = self.registry.borrow().get(property)?;
                Some(entry.default_value())
            }
            Provider::Custom(provider) => provider.try_get_value(object, property),
        }
    }

    /// Stores `value` through the provider at `index`.
    ///
    /// `None` removes whatever the provider held. `Inheritance` and `Default`
    /// have no storage of their own.
    pub(crate) fn commit(
        &self,
        index: usize,
        object: ObjectId,
        property: PropertyId,
        value: Option<ErasedValue>,
    ) {
        let Some(provider) = self.chain.get(index) else {
            return;
        };
        tracing::trace!(
            provider = provider.name(),
            %object,
            %property,
            clear = value.is_none(),
            "commit"
        );
        match provider {
            Provider::Binding => {
                let slot = self
                    .bindings
                    .borrow()
                    .get(&(object, property))
                    .and_then(Weak::upgrade);
                if let Some(slot) = slot {
                    slot.set_current_value(value);
                }
            }
            Provider::Local => self.objects.borrow_mut().set_local(object, property, value),
            Provider::Inheritance | Provider::Default => {}
            Provider::Custom(provider) => provider.update(object, property, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use hashbrown::HashMap;

    #[derive(Default)]
    struct MapProvider {
        values: RefCell<HashMap<(ObjectId, PropertyId), ErasedValue>>,
    }

    impl ValueProvider for MapProvider {
        fn name(&self) -> &str {
            "Map"
        }

        fn try_get_value(&self, object: ObjectId, property: PropertyId) -> Option<ErasedValue> {
            self.values.borrow().get(&(object, property)).cloned()
        }

        fn update(&self, object: ObjectId, property: PropertyId, value: Option<ErasedValue>) {
            let mut values = self.values.borrow_mut();
            match value {
                Some(value) => values.insert((object, property), value),
                None => values.remove(&(object, property)),
            };
        }
    }

    #[test]
    fn standard_chain_order() {
        let chain = ProviderChain::standard();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain.binding_index(), None);
        assert_eq!(chain.local_index(), Some(0));
        assert_eq!(chain.inheritance_index(), Some(1));
        assert_eq!(chain.index_of(&Provider::Default), Some(2));
    }

    #[test]
    fn binding_chain_order() {
        let chain = ProviderChain::with_bindings();
        assert_eq!(chain.binding_index(), Some(0));
        assert_eq!(chain.local_index(), Some(1));
        assert_eq!(chain.inheritance_index(), Some(2));
    }

    #[test]
    fn custom_providers_compare_by_identity() {
        let a: Rc<dyn ValueProvider> = Rc::new(MapProvider::default());
        let b: Rc<dyn ValueProvider> = Rc::new(MapProvider::default());
        let chain = ProviderChain::new([
            Provider::Custom(Rc::clone(&a)),
            Provider::Local,
            Provider::Default,
        ]);

        assert_eq!(chain.index_of(&Provider::Custom(a)), Some(0));
        assert_eq!(chain.index_of(&Provider::Custom(b)), None);
        assert_eq!(chain.inheritance_index(), None);
    }

    #[test]
    fn provider_names() {
        assert_eq!(Provider::Local.name(), "Local");
        let custom = Provider::Custom(Rc::new(MapProvider::default()));
        assert_eq!(custom.name(), "Map");
        assert_eq!(format!("{custom:?}"), "Custom(\"Map\")");
        assert_eq!(format!("{:?}", Provider::Default), "Default");
    }
}
