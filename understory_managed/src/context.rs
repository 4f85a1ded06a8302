// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration contexts.
//!
//! A [`ConfigurationContext`] is a type-level token. Every property is
//! registered in exactly one context, and the context decides the provider
//! chain its properties resolve through. The state behind a token (registry,
//! object table, handlers and bindings) is created the first time the token
//! is used on a thread and lives as long as the thread.

use core::any::TypeId;
use core::cell::RefCell;
use core::fmt;
use core::marker::PhantomData;
use std::any::{Any, type_name};
use std::rc::{Rc, Weak};

use hashbrown::HashMap;

use crate::args::WriteOutcome;
use crate::binding::BindingSlot;
use crate::error::PropertyError;
use crate::events::EventTable;
use crate::id::{ObjectId, PropertyId};
use crate::metadata::PropertySettings;
use crate::object::ObjectTable;
use crate::provider::{Provider, ProviderChain};
use crate::registry::PropertyRegistry;
use crate::value::ErasedValue;

/// A token selecting the provider chain of a family of properties.
///
/// # Example
///
/// ```rust
/// use understory_managed::{ConfigurationContext, Provider, ProviderChain};
///
/// /// Local values only, no inheritance.
/// struct Flat;
///
/// impl ConfigurationContext for Flat {
///     fn provider_chain() -> ProviderChain {
///         ProviderChain::new([Provider::Local, Provider::Default])
///     }
/// }
/// ```
pub trait ConfigurationContext: 'static {
    /// The providers of this context, highest precedence first.
    ///
    /// Called once per thread, on first use of the context.
    fn provider_chain() -> ProviderChain {
        ProviderChain::standard()
    }
}

/// The default context: `Local`, `Inheritance`, `Default`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultContext;

impl ConfigurationContext for DefaultContext {}

/// A context whose chain starts with a `Binding` provider.
#[derive(Clone, Copy, Debug, Default)]
pub struct BindingContext;

impl ConfigurationContext for BindingContext {
    fn provider_chain() -> ProviderChain {
        ProviderChain::with_bindings()
    }
}

/// Runtime state behind a context token.
pub(crate) struct ContextState {
    pub(crate) name: &'static str,
    pub(crate) chain: ProviderChain,
    pub(crate) registry: RefCell<PropertyRegistry>,
    pub(crate) objects: RefCell<ObjectTable>,
    pub(crate) events: RefCell<EventTable>,
    pub(crate) bindings: RefCell<HashMap<(ObjectId, PropertyId), Weak<dyn BindingSlot>>>,
}

impl ContextState {
    fn new(name: &'static str, chain: ProviderChain) -> Self {
        Self {
            name,
            chain,
            registry: RefCell::new(PropertyRegistry::new()),
            objects: RefCell::new(ObjectTable::new()),
            events: RefCell::new(EventTable::new()),
            bindings: RefCell::new(HashMap::new()),
        }
    }

    /// Precedence index of `provider`, or an error naming it.
    pub(crate) fn provider_index(&self, provider: &Provider) -> Result<usize, PropertyError> {
        self.chain
            .index_of(provider)
            .ok_or_else(|| PropertyError::ProviderNotInChain(provider.name().to_owned()))
    }
}

impl fmt::Debug for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextState")
            .field("name", &self.name)
            .field("chain", &self.chain)
            .field("registry", &self.registry.borrow())
            .field("objects", &self.objects.borrow().len())
            .finish_non_exhaustive()
    }
}

thread_local! {
    static CONTEXTS: RefCell<HashMap<TypeId, Rc<ContextState>>> = RefCell::new(HashMap::new());
}

/// Returns the state of `Cx` on this thread, creating it on first use.
pub(crate) fn state<Cx: ConfigurationContext>() -> Rc<ContextState> {
    let key = TypeId::of::<Cx>();
    if let Some(state) = CONTEXTS.with(|contexts| contexts.borrow().get(&key).cloned()) {
        return state;
    }
    // The chain is user code and may itself touch other contexts.
    let chain = Cx::provider_chain();
    let name = type_name::<Cx>();
    CONTEXTS.with(|contexts| {
        let mut contexts = contexts.borrow_mut();
        let state = contexts.entry(key).or_insert_with(|| {
            tracing::debug!(context = name, ?chain, "initializing configuration context");
            Rc::new(ContextState::new(name, chain))
        });
        Rc::clone(state)
    })
}

/// Description of a registered property.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyInfo {
    /// The property's id.
    pub id: PropertyId,
    /// The registered name.
    pub name: &'static str,
    /// Behavior flags.
    pub settings: PropertySettings,
    /// Whether this is an attached property.
    pub attached: bool,
    /// The owner (or attached target) type.
    pub owner_type: TypeId,
    /// Name of the owner type.
    pub owner_type_name: &'static str,
    /// Name of the value type.
    pub value_type_name: &'static str,
}

/// Non-generic access to the state of context `Cx`.
///
/// Typed code goes through [`Property`](crate::Property) and friends; this
/// facade exists for tooling that only has ids and erased values, and for
/// inspecting the ownership tree.
///
/// # Example
///
/// ```rust
/// use understory_managed::{Context, DefaultContext, Provider};
///
/// assert_eq!(
///     Context::<DefaultContext>::provider_chain().index_of(&Provider::Local),
///     Some(0)
/// );
/// ```
pub struct Context<Cx>(PhantomData<fn() -> Cx>);

impl<Cx> fmt::Debug for Context<Cx> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Context").field(&type_name::<Cx>()).finish()
    }
}

impl<Cx: ConfigurationContext> Context<Cx> {
    /// The provider chain of this context.
    #[must_use]
    pub fn provider_chain() -> ProviderChain {
        state::<Cx>().chain.clone()
    }

    /// Number of properties registered in this context.
    #[must_use]
    pub fn len() -> usize {
        state::<Cx>().registry.borrow().len()
    }

    /// Returns `true` if no property is registered in this context.
    #[must_use]
    pub fn is_empty() -> bool {
        Self::len() == 0
    }

    /// Registered name of a property.
    #[must_use]
    pub fn property_name(property: PropertyId) -> Option<&'static str> {
        state::<Cx>().registry.borrow().name(property)
    }

    /// Describes a registered property.
    #[must_use]
    pub fn property_info(property: PropertyId) -> Option<PropertyInfo> {
        let entry = state::<Cx>().registry.borrow().get(property)?;
        Some(PropertyInfo {
            id: entry.id(),
            name: entry.name(),
            settings: entry.settings(),
            attached: entry.is_attached(),
            owner_type: entry.owner_type(),
            owner_type_name: entry.owner_type_name(),
            value_type_name: entry.value_type_name(),
        })
    }

    /// Parent of `object` in the ownership tree.
    #[must_use]
    pub fn parent_of(object: ObjectId) -> Option<ObjectId> {
        state::<Cx>().objects.borrow().parent(object)
    }

    /// Children of `object` in the ownership tree, in attach order.
    #[must_use]
    pub fn children_of(object: ObjectId) -> Vec<ObjectId> {
        state::<Cx>().objects.borrow().children(object).into_vec()
    }

    /// Resolves a property through the whole chain.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::UnknownProperty`] if `property` is not
    /// registered in this context.
    pub fn get_value_erased(
        property: PropertyId,
        object: ObjectId,
    ) -> Result<ErasedValue, PropertyError> {
        let state = state::<Cx>();
        let entry = lookup(&state, property)?;
        Ok(entry.get_value_and_provider(&state, object).0)
    }

    /// Returns the provider currently supplying a property's value.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::UnknownProperty`] if `property` is not
    /// registered in this context.
    pub fn value_source_erased(
        property: PropertyId,
        object: ObjectId,
    ) -> Result<Provider, PropertyError> {
        let state = state::<Cx>();
        let entry = lookup(&state, property)?;
        let (_, index) = entry.get_value_and_provider(&state, object);
        Ok(state.chain.get(index).cloned().unwrap_or(Provider::Default))
    }

    /// Asks a single provider for its value.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::UnknownProperty`] or
    /// [`PropertyError::ProviderNotInChain`].
    pub fn get_provider_value_erased(
        provider: &Provider,
        property: PropertyId,
        object: ObjectId,
    ) -> Result<Option<ErasedValue>, PropertyError> {
        let state = state::<Cx>();
        let entry = lookup(&state, property)?;
        state.provider_index(provider)?;
        Ok(entry.get_provider_value(&state, object, provider))
    }

    /// Sets a local value through the change pipeline.
    ///
    /// The [`WriteOutcome`] reports whether the change callback rejected the
    /// write and any validation message it attached.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::TypeMismatch`] or
    /// [`PropertyError::ObjectTypeMismatch`] when the value or object is not
    /// of the property's types, [`PropertyError::UnknownProperty`] for an
    /// unregistered id, and [`PropertyError::ProviderNotInChain`] if the
    /// context has no local provider.
    pub fn set_value_erased(
        property: PropertyId,
        object: &Rc<dyn Any>,
        value: ErasedValue,
    ) -> Result<WriteOutcome, PropertyError> {
        let state = state::<Cx>();
        let entry = lookup(&state, property)?;
        let local = state.provider_index(&Provider::Local)?;
        entry.set_value(&state, local, Rc::clone(object), value)
    }

    /// Drops bookkeeping for objects that no longer exist.
    ///
    /// Returns the number of objects forgotten.
    pub fn prune() -> usize {
        let state = state::<Cx>();
        let dead = state.objects.borrow_mut().prune();
        if !dead.is_empty() {
            let mut events = state.events.borrow_mut();
            for id in &dead {
                events.forget(*id);
            }
            drop(events);
            state
                .bindings
                .borrow_mut()
                .retain(|(object, _), slot| slot.strong_count() > 0 && !dead.contains(object));
            tracing::debug!(context = state.name, count = dead.len(), "pruned dead objects");
        }
        dead.len()
    }
}

fn lookup(
    state: &ContextState,
    property: PropertyId,
) -> Result<Rc<dyn crate::registry::ErasedProperty>, PropertyError> {
    state
        .registry
        .borrow()
        .get(property)
        .ok_or(PropertyError::UnknownProperty(property))
}
