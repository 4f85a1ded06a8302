// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Arguments passed to change callbacks and change handlers, and what a
//! write reports back to its caller.

use std::borrow::Cow;
use std::rc::Rc;

use crate::id::ObjectId;

/// A pending change, handed to a property's change callback before commit.
///
/// The callback may [`reject`](Self::reject) the change, replace the value
/// that gets committed with [`set_mutated_value`](Self::set_mutated_value),
/// attach a validation message, or schedule work to run once the new value is
/// visible.
///
/// # Example
///
/// ```rust
/// use understory_managed::ChangingArgs;
///
/// fn clamp(args: &mut ChangingArgs<i32>) {
///     if *args.new_value() < 0 {
///         args.set_mutated_value(0);
///         args.set_error("negative values are clamped");
///     }
/// }
/// # let _ = clamp;
/// ```
pub struct ChangingArgs<V> {
    old_value: V,
    new_value: V,
    mutated_value: V,
    rejected: bool,
    will_change: bool,
    error: Option<Cow<'static, str>>,
    after_commit: Vec<Box<dyn FnOnce()>>,
}

/// What the pipeline needs back from a dispatched [`ChangingArgs`].
pub(crate) struct Outcome<V> {
    pub(crate) mutated_value: V,
    pub(crate) rejected: bool,
    pub(crate) error: Option<Cow<'static, str>>,
    pub(crate) after_commit: Vec<Box<dyn FnOnce()>>,
}

impl<V> Outcome<V> {
    pub(crate) fn run_after_commit(self) {
        for continuation in self.after_commit {
            continuation();
        }
    }
}

impl<V: Clone> ChangingArgs<V> {
    pub(crate) fn new(old_value: V, new_value: V, will_change: bool) -> Self {
        Self {
            old_value,
            mutated_value: new_value.clone(),
            new_value,
            rejected: false,
            will_change,
            error: None,
            after_commit: Vec::new(),
        }
    }
}

impl<V> ChangingArgs<V> {
    /// The currently resolved value.
    #[must_use]
    pub fn old_value(&self) -> &V {
        &self.old_value
    }

    /// The value that was requested.
    #[must_use]
    pub fn new_value(&self) -> &V {
        &self.new_value
    }

    /// The value that will be committed. Starts out as the requested value.
    #[must_use]
    pub fn mutated_value(&self) -> &V {
        &self.mutated_value
    }

    /// Replaces the value that will be committed.
    pub fn set_mutated_value(&mut self, value: V) {
        self.mutated_value = value;
    }

    /// Aborts the change. Nothing is stored and no handler runs.
    pub fn reject(&mut self) {
        self.rejected = true;
    }

    /// Returns `true` if the change has been rejected.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    /// Whether the write is visible once committed.
    ///
    /// `false` when a provider of higher precedence than the writing one
    /// already supplies the value.
    #[must_use]
    pub fn will_change(&self) -> bool {
        self.will_change
    }

    /// Attaches a validation message, with or without rejecting.
    pub fn set_error(&mut self, error: impl Into<Cow<'static, str>>) {
        self.error = Some(error.into());
    }

    /// The validation message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Runs `f` after the change is committed and handlers have been notified.
    ///
    /// Continuations run in registration order, and only when the change is
    /// visible.
    pub fn after_commit(&mut self, f: impl FnOnce() + 'static) {
        self.after_commit.push(Box::new(f));
    }

    pub(crate) fn into_outcome(self) -> Outcome<V> {
        if let Some(error) = &self.error {
            tracing::trace!(%error, rejected = self.rejected, "change callback reported an error");
        }
        Outcome {
            mutated_value: self.mutated_value,
            rejected: self.rejected,
            error: self.error,
            after_commit: self.after_commit,
        }
    }
}

impl<V: core::fmt::Debug> core::fmt::Debug for ChangingArgs<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangingArgs")
            .field("old_value", &self.old_value)
            .field("new_value", &self.new_value)
            .field("mutated_value", &self.mutated_value)
            .field("rejected", &self.rejected)
            .field("will_change", &self.will_change)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// What became of a write.
///
/// A write is applied unless the change callback rejected it or it would have
/// made an object its own ancestor. Either way it carries the validation
/// message the callback attached with [`ChangingArgs::set_error`].
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
/// struct Field {
///     id: ObjectId,
/// }
///
/// impl DependencyObject for Field {
///     fn object_id(&self) -> ObjectId {
///         self.id
///     }
/// }
///
/// let port: Property<DefaultContext, u32, Field> = Property::register_with(
///     "Port",
///     PropertyMetadataBuilder::new(80).build(),
///     |_: &Field, args: &mut ChangingArgs<u32>| {
///         if *args.new_value() == 0 {
///             args.set_error("port 0 is reserved");
///             args.reject();
///         }
///     },
/// );
///
/// let field = Rc::new(Field { id: ObjectId::next() });
/// let outcome = port.set_value(&field, 0);
/// assert!(outcome.is_rejected());
/// assert_eq!(outcome.error(), Some("port 0 is reserved"));
/// assert!(port.set_value(&field, 8080).is_applied());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    applied: bool,
    error: Option<Cow<'static, str>>,
}

impl WriteOutcome {
    pub(crate) fn applied(error: Option<Cow<'static, str>>) -> Self {
        Self {
            applied: true,
            error,
        }
    }

    pub(crate) fn refused(error: Option<Cow<'static, str>>) -> Self {
        Self {
            applied: false,
            error,
        }
    }

    /// Whether the value was committed.
    ///
    /// An applied write may still be invisible, when a provider of higher
    /// precedence supplies the value.
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Whether the write was refused and nothing was stored.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        !self.applied
    }

    /// The validation message, if one was attached.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// A committed, visible change, delivered to change handlers.
#[derive(Debug)]
pub struct PropertyChanged<'a, C, V> {
    /// The object whose write caused this change.
    ///
    /// For inherited values and re-parenting this is the ancestor or the
    /// moved object rather than `object`.
    pub sender: ObjectId,
    /// The object whose resolved value changed.
    pub object: &'a Rc<C>,
    /// The value before the change.
    pub old_value: &'a V,
    /// The value after the change.
    pub new_value: &'a V,
}
