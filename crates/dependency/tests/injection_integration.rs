use std::convert::Infallible;
use std::sync::Arc;

use strata_dependency::{Container, Depends, Env, FromContainer, Injectable, Persisted};

#[derive(Debug)]
struct Settings {
    region: String,
}

impl Injectable for Settings {
    type Config = String;
    type Error = Infallible;

    fn load_config(env: &Env) -> Result<String, Infallible> {
        Ok(env.var_opt("APP_REGION").unwrap_or_else(|| "local".to_string()))
    }

    fn build(config: &String) -> Result<Self, Infallible> {
        Ok(Self { region: config.clone() })
    }
}

#[derive(Debug)]
struct RequestId(u64);

impl Injectable for RequestId {
    type Config = ();
    type Error = Infallible;

    fn load_config(_env: &Env) -> Result<(), Infallible> {
        Ok(())
    }

    fn build(_config: &()) -> Result<Self, Infallible> {
        static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);
        Ok(Self(NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed)))
    }
}

struct Handler {
    settings: Persisted<Settings>,
    request: Depends<RequestId>,
}

impl FromContainer for Handler {
    fn from_container(container: &Container) -> Result<Self, strata_dependency::DependencyError> {
        Ok(Self {
            settings: Persisted::from_container(container)?,
            request: Depends::from_container(container)?,
        })
    }
}

#[test]
fn functions_receive_mixed_lifetimes() {
    let container = Container::new(Env::from_map([("APP_REGION", "eu-west")]));

    let (region, first_id) = container
        .inject(|(settings, request): (Persisted<Settings>, Depends<RequestId>)| {
            (settings.region.clone(), request.0)
        })
        .expect("injection should succeed");
    let second_id = container
        .inject(|(request,): (Depends<RequestId>,)| request.0)
        .expect("injection should succeed");

    assert_eq!(region, "eu-west");
    assert_ne!(first_id, second_id);
}

#[test]
fn structs_share_persisted_fields_across_constructions() {
    let container = Container::new(Env::from_map(Vec::<(String, String)>::new()));

    let first = container.construct::<Handler>().expect("first handler");
    let second = container.construct::<Handler>().expect("second handler");

    assert_eq!(first.settings.region, "local");
    assert!(Arc::ptr_eq(&first.settings.shared(), &second.settings.shared()));
    assert!(!Arc::ptr_eq(&first.request.shared(), &second.request.shared()));
}

#[test]
fn global_container_is_process_wide() {
    let first = Container::global();
    let second = Container::global();
    assert!(std::ptr::eq(first, second));

    let settings = first.persisted::<Settings>().expect("settings resolve from process env");
    assert!(Arc::ptr_eq(&settings, &second.persisted::<Settings>().expect("cached")));
}
