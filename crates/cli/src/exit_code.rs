// Consistent exit codes for the strata CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   10 = configuration error
//   11 = database unreachable
//   12 = migration failed

use std::process;

use strata_database::{ConfigError, DbError};
use strata_dependency::DependencyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Config = 10,
    Unavailable = 11,
    Migration = 12,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Config;
            }
            if let Some(dependency_err) = cause.downcast_ref::<DependencyError>() {
                if dependency_err.downcast_source::<ConfigError>().is_some() {
                    return Self::Config;
                }
            }
            if let Some(db_err) = cause.downcast_ref::<DbError>() {
                return Self::from_db_error(db_err);
            }
        }
        Self::Error
    }

    fn from_db_error(err: &DbError) -> Self {
        match err {
            DbError::Config(_) => Self::Config,
            DbError::Pool(_) | DbError::Io(_) => Self::Unavailable,
            DbError::Migration { .. }
            | DbError::DuplicateMigration(_)
            | DbError::InvalidMigrationFile { .. } => Self::Migration,
            DbError::UnknownColumn { .. } => Self::Usage,
            _ => Self::Error,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_values() {
        assert_eq!(ExitCode::Success.code(), 0);
        assert_eq!(ExitCode::Error.code(), 1);
        assert_eq!(ExitCode::Usage.code(), 2);
        assert_eq!(ExitCode::Config.code(), 10);
        assert_eq!(ExitCode::Unavailable.code(), 11);
        assert_eq!(ExitCode::Migration.code(), 12);
    }

    #[test]
    fn config_error_in_chain() {
        let err = anyhow::Error::new(ConfigError::MissingVar("DATABASE_TYPE".into()))
            .context("failed to resolve database");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Config);
    }

    #[test]
    fn dependency_error_wrapping_config_error() {
        let err = anyhow::Error::new(DependencyError::Config {
            type_name: "Database",
            source: Box::new(ConfigError::UnsupportedType("oracle".into())),
        });
        assert_eq!(ExitCode::from_error(&err), ExitCode::Config);
    }

    #[test]
    fn migration_failures() {
        let err = anyhow::Error::new(DbError::DuplicateMigration(3));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Migration);
    }

    #[test]
    fn io_failure_is_unavailable() {
        let err = anyhow::Error::new(DbError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )));
        assert_eq!(ExitCode::from_error(&err), ExitCode::Unavailable);
    }

    #[test]
    fn generic_is_error() {
        let err = anyhow::anyhow!("something went wrong");
        assert_eq!(ExitCode::from_error(&err), ExitCode::Error);
    }
}
