use crate::errors::{FATAL_EXIT_CODE, Result};
use dialoguer::{
    console::{Style, style},
    theme::ColorfulTheme,
};
use std::fmt::Display;
use tracing_subscriber::EnvFilter;

pub const WARNING_PREFIX: &str = "⚠";
pub const ERROR_PREFIX: &str = "✘";

const DEFAULT_LOG_FILTER: &str = "warn,pkgkit=info";

/// Installs a stderr `tracing` subscriber filtered by `RUST_LOG`.
///
/// Calling it more than once is harmless; only the first call installs.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Prints an operator-facing notice to stderr.
pub fn warn(message: impl Display) {
    let prefix = style(WARNING_PREFIX.to_string()).for_stderr().yellow();
    let message_style = Style::new().for_stderr().yellow();
    eprintln!("{} {}", prefix, message_style.apply_to(message));
}

/// Prints `message` to stderr and terminates the process with status 1.
///
/// Accepts any diagnostic, a [`PkgError`](crate::PkgError) or a script's own text.
pub fn die(message: impl Display) -> ! {
    exit_with(FATAL_EXIT_CODE, message)
}

/// Unwraps `result`, or reports the error and exits with its exit code.
///
/// # Examples
/// ```no_run
/// use pkgkit::ui::exit_on_error;
///
/// let version = exit_on_error(pkgkit::configured_version());
/// println!("{version}");
/// ```
pub fn exit_on_error<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => exit_with(error.exit_code(), &error),
    }
}

fn exit_with(code: i32, message: impl Display) -> ! {
    let prefix = style(ERROR_PREFIX.to_string()).for_stderr().red();
    eprintln!("{prefix} {message}");
    std::process::exit(code)
}

pub fn prompt_theme() -> ColorfulTheme {
    ColorfulTheme {
        prompt_style: Style::new().for_stderr(),
        values_style: Style::new().for_stderr(),
        ..ColorfulTheme::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PkgError;

    #[test]
    fn exit_on_error_passes_values_through() {
        assert_eq!(exit_on_error(Ok::<_, PkgError>(7)), 7);
    }

    #[test]
    fn diagnostics_accept_script_messages() {
        warn(format!("release {} is not tagged", "3.2.7"));
        warn("plain text");
        let _from_text: fn(&'static str) -> ! = die;
        let _from_error: fn(&'static PkgError) -> ! = die;
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
        tracing::info!("logging initialised twice");
    }
}
