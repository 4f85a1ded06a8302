// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for the fallible, non-generic parts of the runtime.

use crate::id::PropertyId;

/// Errors reported by the property runtime.
///
/// A change callback rejecting a write is not an error: the write simply
/// reports that it was not applied. Resolution finding no value at all is an
/// invariant violation and panics instead.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PropertyError {
    /// A value passed through the erased surface is not of the property's type.
    #[error("value of type `{found}` is not assignable to `{expected}`")]
    TypeMismatch {
        /// The property's declared value type.
        expected: &'static str,
        /// The type that was supplied.
        found: &'static str,
    },
    /// An object passed through the erased surface is not of the owner type.
    #[error("object is not an instance of owner type `{expected}`")]
    ObjectTypeMismatch {
        /// The property's declared owner type.
        expected: &'static str,
    },
    /// The property id is not registered in this context.
    #[error("{0} is not registered in this context")]
    UnknownProperty(PropertyId),
    /// A write named a provider the context's chain does not contain.
    #[error("provider `{0}` is not part of this context's provider chain")]
    ProviderNotInChain(String),
    /// A direct write named a provider that computes its values rather than
    /// storing them.
    #[error("provider `{0}` does not store values")]
    ProviderNotWritable(String),
    /// The context's chain has no binding provider, so bindings cannot attach.
    #[error("the provider chain of this context has no binding provider")]
    BindingsDisabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages() {
        let err = PropertyError::TypeMismatch {
            expected: "i32",
            found: "alloc::string::String",
        };
        assert_eq!(
            err.to_string(),
            "value of type `alloc::string::String` is not assignable to `i32`"
        );
        assert_eq!(
            PropertyError::UnknownProperty(PropertyId::new(3)).to_string(),
            "PropertyId(3) is not registered in this context"
        );
    }
}
