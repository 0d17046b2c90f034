// Output format auto-detection for the CLI.
//
// TTY → human-readable text. Piped/redirected → structured JSON.
// `--json` flag forces JSON output regardless of terminal.

use serde::Serialize;
use std::io::{self, IsTerminal, Write};

use crate::exit_code::ExitCode;

const ANSI_RED: &str = "\x1b[31m";
const ANSI_YELLOW: &str = "\x1b[33m";
const ANSI_RESET: &str = "\x1b[0m";

/// How a command renders its result and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text lines for a terminal, colored on stderr.
    Human,
    /// One JSON object per line, for scripts and pipes.
    Json,
}

impl OutputFormat {
    /// JSON if `--json` was passed or stdout is not a TTY.
    pub fn detect(json_flag: bool) -> Self {
        if json_flag {
            return Self::Json;
        }
        Self::detect_from_terminal(io::stdout().is_terminal())
    }

    /// Same as [`OutputFormat::detect`] with the TTY check passed in.
    pub fn detect_from_terminal(is_tty: bool) -> Self {
        if is_tty {
            Self::Human
        } else {
            Self::Json
        }
    }
}

/// Writes a command result to stdout.
///
/// - `Human`: the string produced by `human_fn`.
/// - `Json`: `value` serialized on a single line.
pub fn print_output<T, F>(format: OutputFormat, value: &T, human_fn: F) -> io::Result<()>
where
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    write_output(&mut io::stdout().lock(), format, value, human_fn)
}

/// [`print_output`] against any writer, so rendering can be asserted on.
pub fn write_output<W, T, F>(
    writer: &mut W,
    format: OutputFormat,
    value: &T,
    human_fn: F,
) -> io::Result<()>
where
    W: Write,
    T: Serialize,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Human => {
            writeln!(writer, "{}", human_fn(value))
        }
        OutputFormat::Json => {
            serde_json::to_writer(&mut *writer, value).map_err(io::Error::other)?;
            writeln!(writer)
        }
    }
}

/// Writes a coded error to stderr in the selected format.
pub fn print_error(format: OutputFormat, code: &str, message: &str) {
    print_stderr(format, "error", ANSI_RED, code, message);
}

/// Writes a coded, non-fatal warning to stderr.
pub fn print_warning(format: OutputFormat, code: &str, message: &str) {
    print_stderr(format, "warning", ANSI_YELLOW, code, message);
}

/// Print a mapped, actionable error for a command failure.
pub fn print_anyhow_error(format: OutputFormat, error: &anyhow::Error) {
    let (code, message) = actionable_error(error);
    print_error(format, code, &message);
}

fn print_stderr(format: OutputFormat, label: &str, color: &str, code: &str, message: &str) {
    let mut err = io::stderr().lock();
    match format {
        OutputFormat::Human => {
            let line = render_human_stderr_line(label, message, io::stderr().is_terminal(), color);
            let _ = writeln!(err, "{line}");
        }
        OutputFormat::Json => {
            let obj = serde_json::json!({
                label: {
                    "code": code,
                    "message": message,
                }
            });
            let _ = serde_json::to_writer(&mut err, &obj);
            let _ = writeln!(err);
        }
    }
}

fn actionable_error(error: &anyhow::Error) -> (&'static str, String) {
    let message = format!("{error:#}");

    match ExitCode::from_error(error) {
        ExitCode::Config => (
            "CONFIG_ERROR",
            format!(
                "{message}. Set DATABASE_TYPE=SQLITE and DATABASE_SQLITE_URL=sqlite://<path>"
            ),
        ),
        ExitCode::Unavailable => (
            "DATABASE_UNAVAILABLE",
            format!("{message}. Check that the database file and its directory are writable"),
        ),
        ExitCode::Migration => ("MIGRATION_FAILED", message),
        ExitCode::Usage => ("USAGE_ERROR", message),
        ExitCode::Success | ExitCode::Error => ("DATABASE_ERROR", message),
    }
}

fn render_human_stderr_line(label: &str, message: &str, is_tty: bool, color: &str) -> String {
    if is_tty {
        format!("{color}{label}:{ANSI_RESET} {message}")
    } else {
        format!("{label}: {message}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_database::{ConfigError, DbError};

    #[test]
    fn detect_tty_returns_human() {
        assert_eq!(OutputFormat::detect_from_terminal(true), OutputFormat::Human);
    }

    #[test]
    fn detect_pipe_returns_json() {
        assert_eq!(OutputFormat::detect_from_terminal(false), OutputFormat::Json);
    }

    #[test]
    fn detect_json_flag_overrides_tty() {
        assert_eq!(OutputFormat::detect(true), OutputFormat::Json);
    }

    #[test]
    fn write_output_human_format() {
        #[derive(Serialize)]
        struct Info {
            name: String,
        }
        let info = Info { name: "people".into() };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Human, &info, |i| format!("Table: {}", i.name))
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "Table: people\n");
    }

    #[test]
    fn write_output_json_does_not_call_human_fn() {
        #[derive(Serialize)]
        struct Info {
            name: String,
            version: i64,
        }
        let info = Info { name: "people".into(), version: 3 };
        let mut buf = Vec::new();
        write_output(&mut buf, OutputFormat::Json, &info, |_| {
            unreachable!("human_fn should not be called in JSON mode")
        })
        .unwrap();
        let output = String::from_utf8(buf).unwrap();
        assert!(output.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["name"], "people");
        assert_eq!(parsed["version"], 3);
    }

    #[test]
    fn print_error_does_not_panic_in_either_format() {
        print_error(OutputFormat::Human, "TEST_ERR", "something broke");
        print_error(OutputFormat::Json, "TEST_ERR", "something broke");
        print_warning(OutputFormat::Json, "WARN", "heads up");
    }

    #[test]
    fn render_human_error_uses_color_for_tty() {
        let line = render_human_stderr_line("error", "boom", true, ANSI_RED);
        assert!(line.contains(ANSI_RED));
        assert!(line.contains(ANSI_RESET));
        assert!(line.contains("boom"));
    }

    #[test]
    fn render_human_warning_without_tty_is_plain() {
        let line = render_human_stderr_line("warning", "careful", false, ANSI_YELLOW);
        assert_eq!(line, "warning: careful");
    }

    #[test]
    fn actionable_error_for_missing_configuration() {
        let err = anyhow::Error::new(ConfigError::MissingVar("DATABASE_TYPE".into()));
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "CONFIG_ERROR");
        assert!(message.starts_with("DATABASE_TYPE must be set"));
        assert!(message.contains("DATABASE_SQLITE_URL"));
    }

    #[test]
    fn actionable_error_for_migrations() {
        let err = anyhow::Error::new(DbError::DuplicateMigration(2));
        let (code, message) = actionable_error(&err);
        assert_eq!(code, "MIGRATION_FAILED");
        assert_eq!(message, "duplicate migration version 2");
    }

    #[test]
    fn actionable_error_fallback_keeps_message() {
        let err = anyhow::anyhow!("disk full");
        assert_eq!(actionable_error(&err), ("DATABASE_ERROR", "disk full".to_string()));
    }
}
