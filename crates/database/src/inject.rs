use strata_dependency::{Env, Injectable};

use crate::config::{ConfigError, DatabaseConfig};
use crate::database::Database;

/// Resolves a [`Database`] from `DATABASE_TYPE`, the backend's URL variable
/// and the optional pool tuning variables.
impl Injectable for Database {
    type Config = DatabaseConfig;
    type Error = ConfigError;

    fn load_config(env: &Env) -> Result<DatabaseConfig, ConfigError> {
        DatabaseConfig::from_env_fn(|key| env.var(key))
    }

    fn build(config: &DatabaseConfig) -> Result<Self, ConfigError> {
        Database::new(config.clone())
    }
}
