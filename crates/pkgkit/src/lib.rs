//! Helpers for packaging scripts: running commands, checking git checkout
//! state, and reading version metadata from the project's own files.

pub mod config;
pub mod errors;
pub mod git;
pub mod metadata;
pub mod process;
pub mod prompt;
pub mod ui;

// Re-export commonly used items
pub use config::Config;
pub use errors::{CommandFailure, PkgError, ProcessError, Result};
pub use git::{
    Checkout, GitState, GitStatus, base_branch, check_state, check_status, latest_hash,
    list_patch_branches,
};
pub use metadata::{
    ChangelogInfo, Project, ProtocolVersions, changelog_version_info, configured_version,
    extra_generated_files, protocol_versions,
};
pub use process::{
    CommandSpec, Completed, Output, PipedChild, RunOptions, capture_output, capture_text,
    capture_text_checked, run, run_checked, spawn_pipe,
};
pub use prompt::{AlwaysDecline, Confirm, ConsoleConfirm};
