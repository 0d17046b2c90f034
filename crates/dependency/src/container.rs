use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::debug;

use crate::env::Env;
use crate::error::DependencyError;
use crate::inject::FromContainer;

static GLOBAL_CONTAINER: OnceLock<Container> = OnceLock::new();

/// A type the container knows how to build from environment configuration.
///
/// Persisted instances are cached per `Config` value, so two resolutions
/// with identical configuration share one instance while a changed
/// environment yields a new one.
pub trait Injectable: Send + Sync + Sized + 'static {
    type Config: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    type Error: StdError + Send + Sync + 'static;

    fn load_config(env: &Env) -> Result<Self::Config, Self::Error>;

    fn build(config: &Self::Config) -> Result<Self, Self::Error>;
}

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifetime {
    /// A new instance on every resolution.
    #[default]
    Transient,
    /// One instance per configuration for the container's lifetime.
    Persist,
}

struct Slot<T: Injectable> {
    entries: Vec<(T::Config, Arc<T>)>,
}

impl<T: Injectable> Slot<T> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn get(&self, config: &T::Config) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|(cached, _)| cached == config)
            .map(|(_, instance)| Arc::clone(instance))
    }
}

pub struct Container {
    env: Env,
    persisted: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl Container {
    pub fn new(env: Env) -> Self {
        Self { env, persisted: Mutex::new(HashMap::new()) }
    }

    /// Process-wide container reading the process environment.
    pub fn global() -> &'static Container {
        GLOBAL_CONTAINER.get_or_init(|| Container::new(Env::process()))
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn resolve<T: Injectable>(&self, lifetime: Lifetime) -> Result<Arc<T>, DependencyError> {
        let config = T::load_config(&self.env).map_err(|error| DependencyError::Config {
            type_name: type_name::<T>(),
            source: Box::new(error),
        })?;

        match lifetime {
            Lifetime::Transient => build::<T>(&config).map(Arc::new),
            Lifetime::Persist => self.resolve_persisted(config),
        }
    }

    pub fn persisted<T: Injectable>(&self) -> Result<Arc<T>, DependencyError> {
        self.resolve(Lifetime::Persist)
    }

    pub fn transient<T: Injectable>(&self) -> Result<Arc<T>, DependencyError> {
        self.resolve(Lifetime::Transient)
    }

    /// Calls `f` with its arguments resolved from this container.
    pub fn inject<A, R, F>(&self, f: F) -> Result<R, DependencyError>
    where
        A: FromContainer,
        F: FnOnce(A) -> R,
    {
        let args = A::from_container(self)?;
        Ok(f(args))
    }

    /// Builds a struct whose fields are all resolvable dependencies.
    pub fn construct<S: FromContainer>(&self) -> Result<S, DependencyError> {
        S::from_container(self)
    }

    /// Drops every persisted instance. Outstanding `Arc`s stay valid.
    pub fn clear(&self) {
        self.persisted.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn resolve_persisted<T: Injectable>(
        &self,
        config: T::Config,
    ) -> Result<Arc<T>, DependencyError> {
        // Held across `build` so racing first resolutions construct once.
        let mut persisted = self.persisted.lock().unwrap_or_else(PoisonError::into_inner);
        let entry =
            persisted.entry(TypeId::of::<T>()).or_insert_with(|| Box::new(Slot::<T>::new()));
        let slot = entry
            .downcast_mut::<Slot<T>>()
            .ok_or(DependencyError::SlotMismatch { type_name: type_name::<T>() })?;

        if let Some(instance) = slot.get(&config) {
            return Ok(instance);
        }

        let instance = Arc::new(build::<T>(&config)?);
        debug!(dependency = type_name::<T>(), ?config, "persisted new dependency instance");
        slot.entries.push((config, Arc::clone(&instance)));
        Ok(instance)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cached = self.persisted.lock().map(|map| map.len()).unwrap_or_default();
        f.debug_struct("Container").field("persisted_types", &cached).finish_non_exhaustive()
    }
}

fn build<T: Injectable>(config: &T::Config) -> Result<T, DependencyError> {
    T::build(config).map_err(|error| DependencyError::Build {
        type_name: type_name::<T>(),
        source: Box::new(error),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct Greeter {
        greeting: String,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("GREETING must be set")]
    struct MissingGreeting;

    impl Injectable for Greeter {
        type Config = String;
        type Error = MissingGreeting;

        fn load_config(env: &Env) -> Result<String, MissingGreeting> {
            env.var("GREETING").map_err(|_| MissingGreeting)
        }

        fn build(config: &String) -> Result<Self, MissingGreeting> {
            Ok(Self { greeting: config.clone() })
        }
    }

    fn mutable_env(initial: &str) -> (Env, Arc<StdMutex<String>>) {
        let value = Arc::new(StdMutex::new(initial.to_string()));
        let shared = Arc::clone(&value);
        let env = Env::from_fn(move |key| match key {
            "GREETING" => Ok(shared.lock().expect("env lock").clone()),
            _ => Err(std::env::VarError::NotPresent),
        });
        (env, value)
    }

    #[test]
    fn persisted_resolution_returns_same_instance() {
        let container = Container::new(Env::from_map([("GREETING", "hello")]));
        let first = container.persisted::<Greeter>().expect("first resolution");
        let second = container.persisted::<Greeter>().expect("second resolution");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.greeting, "hello");
    }

    #[test]
    fn transient_resolution_builds_every_time() {
        let container = Container::new(Env::from_map([("GREETING", "hi")]));
        let first = container.transient::<Greeter>().expect("first resolution");
        let second = container.transient::<Greeter>().expect("second resolution");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn changed_configuration_yields_new_persisted_instance() {
        let (env, value) = mutable_env("one");
        let container = Container::new(env);

        let first = container.persisted::<Greeter>().expect("first resolution");
        *value.lock().expect("env lock") = "two".into();
        let second = container.persisted::<Greeter>().expect("second resolution");
        *value.lock().expect("env lock") = "one".into();
        let third = container.persisted::<Greeter>().expect("third resolution");

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.greeting, "two");
        assert!(Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn missing_configuration_surfaces_at_resolution() {
        let container = Container::new(Env::from_map(Vec::<(String, String)>::new()));
        let error = container.persisted::<Greeter>().expect_err("missing env should fail");
        assert!(matches!(error, DependencyError::Config { .. }));
        assert!(error.downcast_source::<MissingGreeting>().is_some());
        assert!(error.type_name().ends_with("Greeter"));
    }

    #[test]
    fn mistyped_cache_slot_is_an_error() {
        let container = Container::new(Env::from_map([("GREETING", "hello")]));
        container
            .persisted
            .lock()
            .expect("cache lock")
            .insert(TypeId::of::<Greeter>(), Box::new(42_u32));

        let error = container.persisted::<Greeter>().expect_err("mistyped slot should fail");
        assert!(matches!(error, DependencyError::SlotMismatch { .. }));
        assert!(error.type_name().ends_with("Greeter"));
    }

    #[test]
    fn clear_drops_cached_instances() {
        let container = Container::new(Env::from_map([("GREETING", "hey")]));
        let first = container.persisted::<Greeter>().expect("first resolution");
        container.clear();
        let second = container.persisted::<Greeter>().expect("second resolution");
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn concurrent_first_resolutions_share_one_instance() {
        let container = Arc::new(Container::new(Env::from_map([("GREETING", "race")])));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                std::thread::spawn(move || container.persisted::<Greeter>().expect("resolve"))
            })
            .collect();

        let instances: Vec<Arc<Greeter>> =
            handles.into_iter().map(|handle| handle.join().expect("thread")).collect();
        for instance in &instances[1..] {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }
}
