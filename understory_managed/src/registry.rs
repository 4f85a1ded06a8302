// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-context property registry.
//!
//! This module provides the registry a context uses to look up property
//! entries by [`PropertyId`], the index of inherited properties by owner type,
//! and the erased capability through which non-generic code (re-parenting,
//! the erased [`Context`](crate::Context) surface) reaches a typed entry.

use core::any::TypeId;
use core::fmt;
use std::any::{Any, type_name};
use std::rc::Rc;

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::args::{ChangingArgs, WriteOutcome};
use crate::context::ContextState;
use crate::error::PropertyError;
use crate::id::{DependencyObject, ObjectId, PropertyId};
use crate::metadata::{PropertyMetadata, PropertySettings, value_type_name};
use crate::pipeline::{self, Request};
use crate::provider::Provider;
use crate::value::{ErasedValue, PropertyValue};

/// The pre-commit callback of a property.
pub(crate) enum ChangeCallback<V, C> {
    None,
    /// Owner-bound, as in `C::on_x_changing(&self, args)`.
    Owner(Box<dyn Fn(&C, &mut ChangingArgs<V>)>),
    /// Explicit target, for attached properties.
    Target(Box<dyn Fn(&Rc<C>, &mut ChangingArgs<V>)>),
}

impl<V, C> ChangeCallback<V, C> {
    pub(crate) fn invoke(&self, object: &Rc<C>, args: &mut ChangingArgs<V>) {
        match self {
            Self::None => {}
            Self::Owner(callback) => callback(object, args),
            Self::Target(callback) => callback(object, args),
        }
    }
}

/// A registered property: metadata, callback and identity.
pub(crate) struct PropertyEntry<V: PropertyValue, C> {
    pub(crate) id: PropertyId,
    pub(crate) name: &'static str,
    pub(crate) metadata: PropertyMetadata<V>,
    pub(crate) callback: ChangeCallback<V, C>,
    pub(crate) attached: bool,
}

/// The capability non-generic code needs from a property entry.
pub(crate) trait ErasedProperty: Any {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
    fn id(&self) -> PropertyId;
    fn name(&self) -> &'static str;
    fn settings(&self) -> PropertySettings;
    fn is_attached(&self) -> bool;
    fn owner_type(&self) -> TypeId;
    fn owner_type_name(&self) -> &'static str;
    fn value_type_name(&self) -> &'static str;
    fn default_value(&self) -> ErasedValue;

    fn get_value_and_provider(&self, state: &ContextState, object: ObjectId) -> (ErasedValue, usize) {
        state.resolve(object, self.id())
    }

    fn get_provider_value(
        &self,
        state: &ContextState,
        object: ObjectId,
        provider: &Provider,
    ) -> Option<ErasedValue> {
        state.provider_value(provider, object, self.id())
    }

    /// Notifies handlers of a change that happened without a write, such as
    /// an inherited value shifting after re-parenting.
    fn call_change_handler(
        &self,
        state: &ContextState,
        object: Rc<dyn Any>,
        sender: ObjectId,
        old: &ErasedValue,
        new: &ErasedValue,
    ) -> Result<(), PropertyError>;

    /// Runs the change pipeline with an erased object and value.
    fn set_value(
        &self,
        state: &ContextState,
        provider: usize,
        object: Rc<dyn Any>,
        value: ErasedValue,
    ) -> Result<WriteOutcome, PropertyError>;
}

impl<V: PropertyValue, C: DependencyObject> PropertyEntry<V, C> {
    fn downcast_object(&self, object: Rc<dyn Any>) -> Result<Rc<C>, PropertyError> {
        object
            .downcast::<C>()
            .map_err(|_| PropertyError::ObjectTypeMismatch {
                expected: type_name::<C>(),
            })
    }
}

impl<V: PropertyValue, C: DependencyObject> ErasedProperty for PropertyEntry<V, C> {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn id(&self) -> PropertyId {
        self.id
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn settings(&self) -> PropertySettings {
        self.metadata.settings()
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn owner_type(&self) -> TypeId {
        TypeId::of::<C>()
    }

    fn owner_type_name(&self) -> &'static str {
        type_name::<C>()
    }

    fn value_type_name(&self) -> &'static str {
        value_type_name::<V>()
    }

    fn default_value(&self) -> ErasedValue {
        ErasedValue::new(self.metadata.default_value().clone())
    }

    fn call_change_handler(
        &self,
        state: &ContextState,
        object: Rc<dyn Any>,
        sender: ObjectId,
        old: &ErasedValue,
        new: &ErasedValue,
    ) -> Result<(), PropertyError> {
        let object = self.downcast_object(object)?;
        let old = old.downcast::<V>()?;
        let new = new.downcast::<V>()?;
        pipeline::notify(state, self, &object, sender, &old, &new);
        Ok(())
    }

    fn set_value(
        &self,
        state: &ContextState,
        provider: usize,
        object: Rc<dyn Any>,
        value: ErasedValue,
    ) -> Result<WriteOutcome, PropertyError> {
        let object = self.downcast_object(object)?;
        let value = value.downcast::<V>()?;
        Ok(pipeline::change(
            state,
            self,
            provider,
            &object,
            Request::Set(value),
        ))
    }
}

/// The properties registered in one context.
#[derive(Default)]
pub(crate) struct PropertyRegistry {
    entries: Vec<Rc<dyn ErasedProperty>>,
    inherited: HashMap<TypeId, SmallVec<[PropertyId; 4]>>,
}

impl PropertyRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a new property.
    ///
    /// # Panics
    ///
    /// Panics if more than 65,535 properties are registered, or if
    /// [`PropertySettings::PARENT_REFERENCE`] is set on a property whose
    /// metadata cannot name a parent.
    pub(crate) fn register<V: PropertyValue, C: DependencyObject>(
        &mut self,
        name: &'static str,
        metadata: PropertyMetadata<V>,
        callback: ChangeCallback<V, C>,
        attached: bool,
    ) -> PropertyId {
        assert!(
            self.entries.len() < u16::MAX as usize,
            "Too many properties registered (max {})",
            u16::MAX
        );
        let settings = metadata.settings();
        assert!(
            !settings.contains(PropertySettings::PARENT_REFERENCE) || metadata.is_parent_reference(),
            "Property '{name}' is flagged PARENT_REFERENCE but was not built with `parent_reference()`"
        );

        #[expect(clippy::cast_possible_truncation, reason = "checked above")]
        let id = PropertyId::new(self.entries.len() as u16);

        if settings.contains(PropertySettings::INHERITED) {
            self.inherited
                .entry(TypeId::of::<C>())
                .or_default()
                .push(id);
        }
        tracing::debug!(
            %id,
            name,
            owner = type_name::<C>(),
            value = value_type_name::<V>(),
            ?settings,
            attached,
            "registered property"
        );
        self.entries.push(Rc::new(PropertyEntry {
            id,
            name,
            metadata,
            callback,
            attached,
        }));
        id
    }

    /// Returns the number of registered properties.
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, id: PropertyId) -> Option<Rc<dyn ErasedProperty>> {
        self.entries.get(id.index() as usize).cloned()
    }

    /// Returns the name of a property.
    pub(crate) fn name(&self, id: PropertyId) -> Option<&'static str> {
        self.entries.get(id.index() as usize).map(|e| e.name())
    }

    /// Inherited properties indexed for owner type `owner`.
    pub(crate) fn inherited_for(&self, owner: TypeId) -> SmallVec<[PropertyId; 4]> {
        self.inherited.get(&owner).cloned().unwrap_or_default()
    }

    /// Returns `true` if any inherited property exists.
    pub(crate) fn has_inherited(&self) -> bool {
        !self.inherited.is_empty()
    }
}

impl fmt::Debug for PropertyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyRegistry")
            .field("count", &self.entries.len())
            .field(
                "properties",
                &self.entries.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Recovers the typed entry behind an id.
///
/// # Panics
///
/// Panics if `id` is not registered as a `(V, C)` property in `state`. Typed
/// handles are only created by registration in the same context, so this is
/// an invariant violation.
pub(crate) fn typed_entry<V: PropertyValue, C: DependencyObject>(
    state: &ContextState,
    id: PropertyId,
) -> Rc<PropertyEntry<V, C>> {
    let entry = state.registry.borrow().get(id);
    match entry.map(|entry| entry.into_any().downcast::<PropertyEntry<V, C>>()) {
        Some(Ok(entry)) => entry,
        _ => panic!(
            "{id} is not a `{}` property of `{}` in context `{}`",
            type_name::<V>(),
            type_name::<C>(),
            state.name
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyMetadataBuilder;

    struct Element;

    impl DependencyObject for Element {
        fn object_id(&self) -> ObjectId {
            ObjectId::next()
        }
    }

    struct Other;

    impl DependencyObject for Other {
        fn object_id(&self) -> ObjectId {
            ObjectId::next()
        }
    }

    #[test]
    fn registry_new() {
        let registry = PropertyRegistry::new();
        assert_eq!(registry.len(), 0);
        assert!(!registry.has_inherited());
    }

    #[test]
    fn registry_register() {
        let mut registry = PropertyRegistry::new();
        let width = registry.register::<f64, Element>(
            "Width",
            PropertyMetadataBuilder::new(0.0).build(),
            ChangeCallback::None,
            false,
        );
        let height = registry.register::<f64, Element>(
            "Height",
            PropertyMetadataBuilder::new(0.0).build(),
            ChangeCallback::None,
            false,
        );

        assert_eq!(registry.len(), 2);
        assert_eq!(width.index(), 0);
        assert_eq!(height.index(), 1);
        assert_eq!(registry.name(width), Some("Width"));
        assert_eq!(registry.name(PropertyId::new(999)), None);
    }

    #[test]
    fn registry_indexes_inherited_by_owner() {
        let mut registry = PropertyRegistry::new();
        let font_size = registry.register::<f64, Element>(
            "FontSize",
            PropertyMetadataBuilder::new(12.0).inherits(true).build(),
            ChangeCallback::None,
            false,
        );
        registry.register::<f64, Element>(
            "Width",
            PropertyMetadataBuilder::new(0.0).build(),
            ChangeCallback::None,
            false,
        );

        assert!(registry.has_inherited());
        assert_eq!(
            registry.inherited_for(TypeId::of::<Element>()).as_slice(),
            &[font_size]
        );
        assert!(registry.inherited_for(TypeId::of::<Other>()).is_empty());
    }

    #[test]
    fn erased_entry_reports_types() {
        let mut registry = PropertyRegistry::new();
        let id = registry.register::<i32, Element>(
            "Count",
            PropertyMetadataBuilder::new(7).build(),
            ChangeCallback::None,
            true,
        );
        let entry = registry.get(id).unwrap();
        assert_eq!(entry.id(), id);
        assert!(entry.is_attached());
        assert_eq!(entry.owner_type(), TypeId::of::<Element>());
        assert_eq!(entry.value_type_name(), "i32");
        assert_eq!(entry.default_value(), ErasedValue::new(7_i32));
    }

    #[test]
    #[should_panic(expected = "PARENT_REFERENCE")]
    fn parent_reference_flag_needs_link() {
        let mut registry = PropertyRegistry::new();
        registry.register::<i32, Element>(
            "Parent",
            PropertyMetadataBuilder::new(0)
                .settings(PropertySettings::PARENT_REFERENCE)
                .build(),
            ChangeCallback::None,
            false,
        );
    }

    #[test]
    fn registry_debug() {
        let mut registry = PropertyRegistry::new();
        registry.register::<f64, Element>(
            "Width",
            PropertyMetadataBuilder::new(0.0).build(),
            ChangeCallback::None,
            false,
        );
        let debug = format!("{registry:?}");
        assert!(debug.contains("PropertyRegistry"));
        assert!(debug.contains("Width"));
    }
}
