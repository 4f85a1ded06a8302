// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Identification types.
//!
//! This module provides [`PropertyId`] for runtime property identification,
//! [`ObjectId`] for object identity, [`HandlerId`] for event subscriptions,
//! the [`DependencyObject`] trait implemented by managed objects, and
//! [`ObjectRef`] for identity-compared object references stored as property
//! values.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::ops::Deref;
use core::sync::atomic::{AtomicU64, Ordering};
use std::any::Any;
use std::rc::Rc;

/// A runtime property identifier.
///
/// This is a lightweight handle (u16) that identifies a property within the
/// registry of one configuration context. The u16 size allows up to 65,536
/// properties per context while keeping storage compact.
///
/// # Example
///
/// ```rust
/// use understory_managed::PropertyId;
///
/// let id = PropertyId::new(42);
/// assert_eq!(id.index(), 42);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PropertyId(u16);

impl PropertyId {
    /// Creates a new property ID from the given index.
    ///
    /// This is typically called during registration rather than directly.
    #[must_use]
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Returns the underlying index of this property ID.
    #[must_use]
    #[inline]
    pub const fn index(self) -> u16 {
        self.0
    }
}

impl fmt::Debug for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PropertyId").field(&self.0).finish()
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PropertyId({})", self.0)
    }
}

/// Identity of a managed object.
///
/// Ids are drawn from a process-wide monotonically increasing counter and are
/// never reused, so bookkeeping left behind by a dropped object can never be
/// mistaken for a live one.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Allocates a fresh object id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value of this id.
    #[must_use]
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectId").field(&self.0).finish()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token returned when an event handler is registered; used to remove it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// An object that can carry managed properties.
///
/// Managed objects live in an [`Rc`] and report a stable [`ObjectId`]. The
/// property system only ever stores the id and a [`Weak`](std::rc::Weak)
/// reference, so participating never keeps an object alive.
///
/// # Example
///
/// ```rust
/// use understory_managed::{DependencyObject, ObjectId};
///
/// struct Element {
///     id: ObjectId,
/// }
///
/// impl DependencyObject for Element {
///     fn object_id(&self) -> ObjectId {
///         self.id
///     }
/// }
///
/// let element = Element { id: ObjectId::next() };
/// assert_eq!(element.object_id(), element.id);
/// ```
pub trait DependencyObject: Any {
    /// Returns the identity of this object.
    fn object_id(&self) -> ObjectId;
}

/// An identity-compared, shared reference to a managed object.
///
/// Object-valued properties (parent references, binding hops) hold an
/// `ObjectRef` so that change detection compares *which* object is referenced
/// rather than its contents.
pub struct ObjectRef<T: ?Sized>(Rc<T>);

impl<T: ?Sized> ObjectRef<T> {
    /// Wraps a shared object.
    #[must_use]
    pub fn new(object: Rc<T>) -> Self {
        Self(object)
    }

    /// Returns the wrapped [`Rc`].
    #[must_use]
    #[inline]
    pub fn as_rc(&self) -> &Rc<T> {
        &self.0
    }

    /// Unwraps into the inner [`Rc`].
    #[must_use]
    pub fn into_rc(self) -> Rc<T> {
        self.0
    }
}

impl<T: ?Sized> From<Rc<T>> for ObjectRef<T> {
    fn from(object: Rc<T>) -> Self {
        Self(object)
    }
}

impl<T: ?Sized> From<&Rc<T>> for ObjectRef<T> {
    fn from(object: &Rc<T>) -> Self {
        Self(Rc::clone(object))
    }
}

impl<T: ?Sized> Clone for ObjectRef<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for ObjectRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized> PartialEq for ObjectRef<T> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}

impl<T: ?Sized> Eq for ObjectRef<T> {}

impl<T: ?Sized> Hash for ObjectRef<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.0).cast::<()>().hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for ObjectRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObjectRef")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// A property value that can name the object a binding hop continues from.
///
/// Implemented for [`ObjectRef<C>`] and `Option<ObjectRef<C>>`; a `.over(..)`
/// hop only type-checks when the previous hop's value implements
/// `AsSource<NextOwner>`.
pub trait AsSource<C> {
    /// Returns the referenced object, or `None` when the hop is null.
    fn as_source(&self) -> Option<Rc<C>>;
}

impl<C> AsSource<C> for ObjectRef<C> {
    fn as_source(&self) -> Option<Rc<C>> {
        Some(Rc::clone(&self.0))
    }
}

impl<C> AsSource<C> for Option<ObjectRef<C>> {
    fn as_source(&self) -> Option<Rc<C>> {
        self.as_ref().map(|object| Rc::clone(&object.0))
    }
}
