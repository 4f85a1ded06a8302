// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boxed values with their type attached.
//!
//! Every value the runtime stores travels as an [`ErasedValue`]. Typed
//! property handles unwrap them again; [`PropertyValue`] is the bound all such
//! values share.

use core::any::TypeId;
use core::fmt;
use std::any::{Any, type_name};

use crate::error::PropertyError;

/// Bound for managed property values.
///
/// Values are cloned out of storage on read and compared to decide whether a
/// write is a visible change. Blanket-implemented for every suitable type.
pub trait PropertyValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> PropertyValue for T {}

/// A boxed [`PropertyValue`] of a type known only at runtime.
///
/// Two erased values are equal when they hold the same type and the held
/// values compare equal.
///
/// # Example
///
/// ```rust
/// use understory_managed::ErasedValue;
///
/// let value = ErasedValue::new(42_i32);
/// assert!(value.is::<i32>());
/// assert_eq!(value.downcast_ref::<i32>(), Some(&42));
/// assert_eq!(value, ErasedValue::new(42_i32));
/// assert_ne!(value, ErasedValue::new(42_i64));
/// ```
pub struct ErasedValue {
    value: Box<dyn DynValue>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ErasedValue {
    /// Boxes `value`.
    #[must_use]
    pub fn new<T: PropertyValue>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// The [`TypeId`] of the held value.
    #[must_use]
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The type name of the held value, for diagnostics.
    #[must_use]
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Whether the held value is a `T`.
    #[must_use]
    #[inline]
    pub fn is<T: 'static>(&self) -> bool {
        TypeId::of::<T>() == self.type_id
    }

    /// Borrows the held value as a `T`, or `None` for any other type.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.is::<T>()
            .then(|| self.value.as_any().downcast_ref::<T>())
            .flatten()
    }

    /// Clones the held value out as a `T`.
    ///
    /// # Errors
    ///
    /// [`PropertyError::TypeMismatch`] names both types when the held value is
    /// something else.
    pub fn downcast<T: PropertyValue>(&self) -> Result<T, PropertyError> {
        self.downcast_ref::<T>()
            .cloned()
            .ok_or(PropertyError::TypeMismatch {
                expected: type_name::<T>(),
                found: self.type_name,
            })
    }
}

/// Unwraps a value the runtime itself stored for a property of type `T`.
///
/// # Panics
///
/// Panics if the value is not a `T`, which only happens when a custom
/// [`ValueProvider`](crate::ValueProvider) hands back a value of the wrong type.
pub(crate) fn expect_typed<T: PropertyValue>(value: &ErasedValue) -> T {
    match value.downcast::<T>() {
        Ok(value) => value,
        Err(err) => panic!("{err}"),
    }
}

impl Clone for ErasedValue {
    fn clone(&self) -> Self {
        Self {
            value: self.value.boxed_clone(),
            ..*self
        }
    }
}

impl PartialEq for ErasedValue {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.value.eq_any(other.value.as_any())
    }
}

impl fmt::Debug for ErasedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedValue")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Object-safe view of a [`PropertyValue`].
trait DynValue: Any {
    fn as_any(&self) -> &dyn Any;
    fn boxed_clone(&self) -> Box<dyn DynValue>;
    fn eq_any(&self, other: &dyn Any) -> bool;
}

impl<T: PropertyValue> DynValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn boxed_clone(&self) -> Box<dyn DynValue> {
        Box::new(Self::clone(self))
    }

    fn eq_any(&self, other: &dyn Any) -> bool {
        match other.downcast_ref::<T>() {
            Some(other) => self == other,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast_ref_checks_the_type() {
        let value = ErasedValue::new(7_i16);
        assert!(value.is::<i16>());
        assert!(!value.is::<i32>());
        assert_eq!(value.downcast_ref::<i16>(), Some(&7));
        assert_eq!(value.downcast_ref::<i32>(), None);
    }

    #[test]
    fn downcast_clones_out() {
        let value = ErasedValue::new(String::from("hello"));
        assert_eq!(
            value.downcast_ref::<String>().map(String::as_str),
            Some("hello")
        );
        assert_eq!(value.downcast::<String>().as_deref(), Ok("hello"));
    }

    #[test]
    fn downcast_reports_both_types() {
        let value = ErasedValue::new(1_u8);
        let err = value.downcast::<String>().unwrap_err();
        assert_eq!(
            err,
            PropertyError::TypeMismatch {
                expected: type_name::<String>(),
                found: "u8",
            }
        );
    }

    #[test]
    fn equality_needs_same_type_and_value() {
        assert_eq!(ErasedValue::new(Some(3_u32)), ErasedValue::new(Some(3_u32)));
        assert_ne!(ErasedValue::new(Some(3_u32)), ErasedValue::new(None::<u32>));
        assert_ne!(ErasedValue::new(3_u32), ErasedValue::new(3_u64));
    }

    #[test]
    fn clone_keeps_type_and_value() {
        let value = ErasedValue::new(String::from("world"));
        let cloned = value.clone();
        assert_eq!(cloned, value);
        assert_eq!(cloned.type_id(), TypeId::of::<String>());
    }

    #[test]
    fn debug_shows_the_type_name() {
        let debug = format!("{:?}", ErasedValue::new(42_i32));
        assert!(debug.contains("ErasedValue"));
        assert!(debug.contains("i32"));
    }
}
