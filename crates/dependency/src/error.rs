use std::error::Error as StdError;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("failed to load configuration for `{type_name}`: {source}")]
    Config {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("failed to construct `{type_name}`: {source}")]
    Build {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("cached instance for `{type_name}` has a different type")]
    SlotMismatch { type_name: &'static str },
}

impl DependencyError {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Config { type_name, .. }
            | Self::Build { type_name, .. }
            | Self::SlotMismatch { type_name } => type_name,
        }
    }

    /// Borrow the underlying error as a concrete type, if it is one.
    pub fn downcast_source<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Config { source, .. } | Self::Build { source, .. } => source.downcast_ref::<E>(),
            Self::SlotMismatch { .. } => None,
        }
    }
}
