// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Property metadata definitions.
//!
//! This module provides [`PropertySettings`], [`PropertyMetadata`] for storing
//! property configuration and [`PropertyMetadataBuilder`] for ergonomic
//! construction.

use core::any::TypeId;
use std::any::{Any, type_name};
use std::rc::{Rc, Weak};

use crate::id::{DependencyObject, ObjectId, ObjectRef};
use crate::value::PropertyValue;

bitflags::bitflags! {
    /// Behavior flags of a managed property.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PropertySettings: u8 {
        /// Notify handlers even when a visible write stores an equal value.
        const CALL_HANDLER_ON_EQUALS = 0b0000_0001;
        /// The value names the owner's parent in the ownership tree.
        ///
        /// Set through [`PropertyMetadataBuilder::parent_reference`].
        const PARENT_REFERENCE = 0b0000_0010;
        /// Only a read-only view of the property is meant to be public.
        const READ_ONLY = 0b0000_0100;
        /// Objects without a value of their own take it from their nearest ancestor.
        const INHERITED = 0b0000_1000;
        /// A local write of `None` to a nullable property is stored rather than
        /// clearing the local value.
        const SET_LOCAL_EXPLICIT_NULL = 0b0001_0000;
    }
}

/// The tree edge a parent-reference value describes.
#[derive(Clone, Debug)]
pub(crate) struct ParentLink {
    pub(crate) id: ObjectId,
    pub(crate) object: Weak<dyn Any>,
    pub(crate) type_id: TypeId,
}

impl ParentLink {
    fn of<P: DependencyObject>(parent: &ObjectRef<P>) -> Self {
        let object: Weak<P> = Rc::downgrade(parent.as_rc());
        let object: Weak<dyn Any> = object;
        Self {
            id: parent.object_id(),
            object,
            type_id: TypeId::of::<P>(),
        }
    }
}

fn parent_link_of<P: DependencyObject>(value: &Option<ObjectRef<P>>) -> Option<ParentLink> {
    value.as_ref().map(ParentLink::of)
}

/// Metadata for a managed property.
///
/// This contains the configuration for a property: its default value, its
/// [`PropertySettings`], and how to interpret null and parent-reference values.
///
/// # Example
///
/// ```rust
/// use understory_managed::{PropertyMetadataBuilder, PropertySettings};
///
/// let metadata = PropertyMetadataBuilder::new(12.0_f64)
///     .inherits(true)
///     .build();
///
/// assert_eq!(metadata.default_value(), &12.0);
/// assert!(metadata.settings().contains(PropertySettings::INHERITED));
/// ```
pub struct PropertyMetadata<V: PropertyValue> {
    default_value: V,
    settings: PropertySettings,
    is_null: Option<fn(&V) -> bool>,
    parent_link: Option<fn(&V) -> Option<ParentLink>>,
}

impl<V: PropertyValue> PropertyMetadata<V> {
    /// Creates new property metadata with the given default value and no settings.
    #[must_use]
    pub fn new(default_value: V) -> Self {
        Self {
            default_value,
            settings: PropertySettings::empty(),
            is_null: None,
            parent_link: None,
        }
    }

    /// Returns a reference to the default value.
    #[must_use]
    #[inline]
    pub fn default_value(&self) -> &V {
        &self.default_value
    }

    /// Returns the property's settings.
    #[must_use]
    #[inline]
    pub fn settings(&self) -> PropertySettings {
        self.settings
    }

    /// Returns whether this property inherits from ancestors.
    #[must_use]
    #[inline]
    pub fn inherits(&self) -> bool {
        self.settings.contains(PropertySettings::INHERITED)
    }

    /// Returns whether `None` writes are treated as null by the local provider.
    #[must_use]
    #[inline]
    pub fn is_nullable(&self) -> bool {
        self.is_null.is_some()
    }

    /// Whether a local write of `value` should clear instead of store.
    pub(crate) fn clears_local(&self, value: &V) -> bool {
        !self
            .settings
            .contains(PropertySettings::SET_LOCAL_EXPLICIT_NULL)
            && self.is_null.is_some_and(|is_null| is_null(value))
    }

    pub(crate) fn parent_link(&self, value: &V) -> Option<ParentLink> {
        self.parent_link.and_then(|link| link(value))
    }

    pub(crate) fn is_parent_reference(&self) -> bool {
        self.parent_link.is_some()
    }
}

impl<V: PropertyValue + core::fmt::Debug> core::fmt::Debug for PropertyMetadata<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyMetadata")
            .field("default_value", &self.default_value)
            .field("settings", &self.settings)
            .field("nullable", &self.is_null.is_some())
            .finish()
    }
}

/// Builder for [`PropertyMetadata`].
///
/// # Example
///
/// ```rust
/// use understory_managed::{PropertyMetadataBuilder, PropertySettings};
///
/// let metadata = PropertyMetadataBuilder::new(None::<String>)
///     .nullable()
///     .settings(PropertySettings::CALL_HANDLER_ON_EQUALS)
///     .build();
///
/// assert!(metadata.is_nullable());
/// assert!(metadata.settings().contains(PropertySettings::CALL_HANDLER_ON_EQUALS));
/// ```
pub struct PropertyMetadataBuilder<V: PropertyValue> {
    metadata: PropertyMetadata<V>,
}

impl<V: PropertyValue + core::fmt::Debug> core::fmt::Debug for PropertyMetadataBuilder<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PropertyMetadataBuilder")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl<V: PropertyValue> PropertyMetadataBuilder<V> {
    /// Creates a new builder with the given default value.
    #[must_use]
    pub fn new(default_value: V) -> Self {
        Self {
            metadata: PropertyMetadata::new(default_value),
        }
    }

    /// Adds settings flags.
    ///
    /// [`PropertySettings::PARENT_REFERENCE`] also needs a way to read the
    /// parent out of the value; use [`parent_reference`](Self::parent_reference).
    #[must_use]
    pub fn settings(mut self, settings: PropertySettings) -> Self {
        self.metadata.settings |= settings;
        self
    }

    /// Sets whether this property inherits from ancestors in the ownership tree.
    #[must_use]
    pub fn inherits(mut self, inherits: bool) -> Self {
        self.metadata.settings.set(PropertySettings::INHERITED, inherits);
        self
    }

    /// Builds the [`PropertyMetadata`].
    #[must_use]
    pub fn build(self) -> PropertyMetadata<V> {
        self.metadata
    }
}

impl<T: PropertyValue> PropertyMetadataBuilder<Option<T>> {
    /// Treats `None` as null.
    ///
    /// A local write of `None` then clears the local value unless
    /// [`PropertySettings::SET_LOCAL_EXPLICIT_NULL`] is set.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.metadata.is_null = Some(Option::is_none);
        self
    }
}

impl<P: DependencyObject> PropertyMetadataBuilder<Option<ObjectRef<P>>> {
    /// Marks the property as the owner's parent reference.
    ///
    /// Writes maintain the ownership tree and re-notify inherited properties
    /// across the moved subtree. The value is nullable.
    #[must_use]
    pub fn parent_reference(mut self) -> Self {
        self.metadata.settings |= PropertySettings::PARENT_REFERENCE;
        self.metadata.is_null = Some(Option::is_none);
        self.metadata.parent_link = Some(parent_link_of::<P>);
        self
    }
}

pub(crate) fn value_type_name<V: PropertyValue>() -> &'static str {
    type_name::<V>()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        id: ObjectId,
    }

    impl DependencyObject for Node {
        fn object_id(&self) -> ObjectId {
            self.id
        }
    }

    #[test]
    fn metadata_defaults() {
        let metadata = PropertyMetadata::new(42_i32);
        assert_eq!(metadata.default_value(), &42);
        assert!(!metadata.inherits());
        assert!(!metadata.is_nullable());
        assert!(metadata.settings().is_empty());
    }

    #[test]
    fn metadata_builder() {
        let metadata = PropertyMetadataBuilder::new(100.0_f64)
            .inherits(true)
            .settings(PropertySettings::CALL_HANDLER_ON_EQUALS)
            .build();

        assert!(metadata.inherits());
        assert!(
            metadata
                .settings()
                .contains(PropertySettings::CALL_HANDLER_ON_EQUALS)
        );
    }

    #[test]
    fn nullable_clears_unless_explicit() {
        let implicit = PropertyMetadataBuilder::new(Some(1_u8)).nullable().build();
        assert!(implicit.clears_local(&None));
        assert!(!implicit.clears_local(&Some(2)));

        let explicit = PropertyMetadataBuilder::new(Some(1_u8))
            .nullable()
            .settings(PropertySettings::SET_LOCAL_EXPLICIT_NULL)
            .build();
        assert!(!explicit.clears_local(&None));
    }

    #[test]
    fn parent_reference_reads_link() {
        let metadata = PropertyMetadataBuilder::new(None::<ObjectRef<Node>>)
            .parent_reference()
            .build();
        assert!(metadata.is_parent_reference());
        assert!(
            metadata
                .settings()
                .contains(PropertySettings::PARENT_REFERENCE)
        );

        let parent = Rc::new(Node {
            id: ObjectId::next(),
        });
        let link = metadata
            .parent_link(&Some(ObjectRef::from(&parent)))
            .unwrap();
        assert_eq!(link.id, parent.id);
        assert_eq!(link.type_id, TypeId::of::<Node>());
        assert!(metadata.parent_link(&None).is_none());
    }

    #[test]
    fn metadata_debug() {
        let metadata = PropertyMetadataBuilder::new(42_i32).inherits(true).build();
        let debug = format!("{metadata:?}");
        assert!(debug.contains("PropertyMetadata"));
        assert!(debug.contains("42"));
        assert!(debug.contains("INHERITED"));
    }
}
