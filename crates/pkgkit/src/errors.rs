use std::io;
use std::path::{Path, PathBuf};

/// Canonical result type for pkgkit code
pub type Result<T> = std::result::Result<T, PkgError>;

/// Exit code used when a fatal condition ends the process
pub const FATAL_EXIT_CODE: i32 = 1;

/// Common error type for pkgkit operations
#[derive(Debug, thiserror::Error)]
pub enum PkgError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to start command \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    CommandFailed(#[from] CommandFailure),

    #[error("The{} checkout is not clean:\n{}", display_dir(.dir), .status)]
    DirtyCheckout { dir: PathBuf, status: String },

    #[error("The{} checkout is not on a branch (detached HEAD).", display_dir(.dir))]
    DetachedHead { dir: PathBuf },

    #[error("The checkout is on branch {found}, not the {expected} branch.")]
    BranchMismatch { expected: String, found: String },

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error("Unable to determine commit hash for master branch: {branch}")]
    CommitHash { branch: String },

    #[error("Unable to {} in {}", .what, .path.display())]
    MissingMetadata { path: PathBuf, what: String },

    #[error("Unable to determine protocol_version for {}.", .version.as_deref().unwrap_or("None"))]
    ProtocolVersionUnknown { version: Option<String> },

    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(String),
}

impl PkgError {
    /// Whether this error stands for a condition packaging scripts cannot
    /// recover from. Checked command failures are the only recoverable kind.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PkgError::Process(_) | PkgError::CommandFailed(_))
    }

    pub fn exit_code(&self) -> i32 {
        FATAL_EXIT_CODE
    }
}

/// A checked `run` finished with a non-zero exit code.
#[derive(Debug, thiserror::Error)]
#[error("Command \"{command}\" returned non-zero exit status {code}.")]
pub struct ProcessError {
    pub command: String,
    pub code: i32,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
}

/// A checked text capture finished with a non-zero exit code; `output` holds
/// the merged stdout and stderr.
#[derive(Debug, thiserror::Error)]
#[error("Command \"{command}\" returned non-zero exit status \"{code}\" and output:\n{output}")]
pub struct CommandFailure {
    pub command: String,
    pub code: i32,
    pub output: String,
}

fn display_dir(dir: &Path) -> String {
    if dir.as_os_str().is_empty() || dir == Path::new(".") {
        String::new()
    } else {
        format!(" *{}*", dir.display())
    }
}

/// Helper to create an IO error with file path context
pub fn io_error_with_path<P: AsRef<Path>>(error: io::Error, path: P) -> io::Error {
    io::Error::new(
        error.kind(),
        format!("{}: {}", path.as_ref().display(), error),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failure_message_lists_command_code_and_output() {
        let err = CommandFailure {
            command: "false".into(),
            code: 1,
            output: "boom\n".into(),
        };
        assert_eq!(
            err.to_string(),
            "Command \"false\" returned non-zero exit status \"1\" and output:\nboom\n"
        );
    }

    #[test]
    fn dirty_checkout_names_subdir_only_when_not_current() {
        let here = PkgError::DirtyCheckout {
            dir: PathBuf::from("."),
            status: "M foo".into(),
        };
        assert!(here.to_string().starts_with("The checkout is not clean:\nM foo"));

        let nested = PkgError::DirtyCheckout {
            dir: PathBuf::from("patches"),
            status: String::new(),
        };
        assert!(nested.to_string().starts_with("The *patches* checkout"));
    }

    #[test]
    fn checked_command_errors_are_recoverable() {
        let err = PkgError::from(ProcessError {
            command: "make".into(),
            code: 2,
            stdout: None,
            stderr: None,
        });
        assert!(!err.is_fatal());
        assert!(PkgError::CommitHash { branch: "master".into() }.is_fatal());
        assert_eq!(PkgError::Aborted("no".into()).exit_code(), 1);
    }

    #[test]
    fn protocol_version_unknown_without_version() {
        let err = PkgError::ProtocolVersionUnknown { version: None };
        assert_eq!(err.to_string(), "Unable to determine protocol_version for None.");
    }

    #[test]
    fn io_error_with_path_prefixes_path() {
        let err = io_error_with_path(io::Error::new(io::ErrorKind::NotFound, "gone"), "OLDNEWS");
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(err.to_string(), "OLDNEWS: gone");
    }
}
