// strata-dependency: environment-driven construction and caching of shared services.
//
// Types implement [`Injectable`] to describe how their configuration is read
// from an [`Env`] and how an instance is built from it. A [`Container`]
// resolves them either fresh ([`Depends`]) or cached per configuration
// ([`Persisted`]), and hands them to functions or structs through
// [`FromContainer`].

pub mod container;
pub mod env;
pub mod error;
pub mod inject;

pub use container::{Container, Injectable, Lifetime};
pub use env::Env;
pub use error::{BoxError, DependencyError};
pub use inject::{Depends, FromContainer, Persisted};
