// Environment lookup used by injectable types to load their configuration.

use std::collections::HashMap;
use std::env::VarError;
use std::fmt;
use std::sync::Arc;

type Lookup = dyn Fn(&str) -> Result<String, VarError> + Send + Sync;

/// Source of configuration variables.
///
/// Production code reads the process environment via [`Env::process`];
/// tests swap in a map or a closure so they never touch global state.
#[derive(Clone)]
pub struct Env {
    lookup: Arc<Lookup>,
}

impl Env {
    /// Reads variables from the process environment.
    pub fn process() -> Self {
        Self::from_fn(|key| std::env::var(key))
    }

    /// Reads variables through an arbitrary lookup function.
    pub fn from_fn<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Result<String, VarError> + Send + Sync + 'static,
    {
        Self { lookup: Arc::new(lookup) }
    }

    /// Reads variables from a fixed map.
    pub fn from_map<K, V, I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> =
            vars.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        Self::from_fn(move |key| map.get(key).cloned().ok_or(VarError::NotPresent))
    }

    pub fn var(&self, key: &str) -> Result<String, VarError> {
        (self.lookup)(key)
    }

    /// Like [`Env::var`] but treats absent and non-unicode values as `None`.
    pub fn var_opt(&self, key: &str) -> Option<String> {
        self.var(key).ok()
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::process()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env").finish_non_exhaustive()
    }
}
