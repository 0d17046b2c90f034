// Argument types that resolve themselves from a container.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use crate::container::{Container, Injectable, Lifetime};
use crate::error::DependencyError;

/// Anything that can be assembled from a [`Container`]: single
/// dependencies, tuples of them, and structs that implement it by hand.
pub trait FromContainer: Sized {
    fn from_container(container: &Container) -> Result<Self, DependencyError>;
}

/// A freshly built `T` for every resolution.
pub struct Depends<T>(Arc<T>);

/// The container's cached `T` for the current configuration.
pub struct Persisted<T>(Arc<T>);

macro_rules! dependency_wrapper {
    ($wrapper:ident, $lifetime:expr) => {
        impl<T> $wrapper<T> {
            pub fn into_inner(self) -> Arc<T> {
                self.0
            }

            pub fn shared(&self) -> Arc<T> {
                Arc::clone(&self.0)
            }
        }

        impl<T> Deref for $wrapper<T> {
            type Target = T;

            fn deref(&self) -> &T {
                &self.0
            }
        }

        impl<T> Clone for $wrapper<T> {
            fn clone(&self) -> Self {
                Self(Arc::clone(&self.0))
            }
        }

        impl<T: fmt::Debug> fmt::Debug for $wrapper<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($wrapper)).field(&self.0).finish()
            }
        }

        impl<T: Injectable> FromContainer for $wrapper<T> {
            fn from_container(container: &Container) -> Result<Self, DependencyError> {
                container.resolve::<T>($lifetime).map(Self)
            }
        }
    };
}

dependency_wrapper!(Depends, Lifetime::Transient);
dependency_wrapper!(Persisted, Lifetime::Persist);

impl FromContainer for () {
    fn from_container(_container: &Container) -> Result<Self, DependencyError> {
        Ok(())
    }
}

macro_rules! tuple_from_container {
    ($($name:ident),+) => {
        impl<$($name: FromContainer),+> FromContainer for ($($name,)+) {
            fn from_container(container: &Container) -> Result<Self, DependencyError> {
                Ok(($($name::from_container(container)?,)+))
            }
        }
    };
}

tuple_from_container!(A);
tuple_from_container!(A, B);
tuple_from_container!(A, B, C);
tuple_from_container!(A, B, C, D);
