//! Git checkout inspection for release scripts.
//!
//! Everything here shells out to the system `git` with `LC_ALL=C`, so the
//! phrases matched below are the untranslated ones.

use crate::errors::{PkgError, ProcessError, Result};
use crate::metadata::Project;
use crate::process::{RunOptions, capture_text_checked, run_checked, spawn_pipe};
use crate::prompt::Confirm;
use crate::ui;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static CLEAN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^nothing to commit.+working (directory|tree) clean")
        .expect("Invalid clean status regex")
});

static BRANCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\A(?:# )?On branch ([^\n]+)").expect("Invalid branch header regex")
});

static PATCH_BRANCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^patch/([^/]+)/[^/]+$").expect("Invalid patch branch regex")
});

static BRANCH_LIST_PATCH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r" patch/([^/]+)/(.+)").expect("Invalid branch list regex")
});

static COMMIT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^commit (\S+)").expect("Invalid commit line regex"));

/// Parsed `git status` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitStatus {
    /// `None` when HEAD is detached.
    pub branch: Option<String>,
    pub is_clean: bool,
    pub text: String,
}

impl GitStatus {
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let is_clean = CLEAN_REGEX.is_match(&text);
        let branch = BRANCH_REGEX
            .captures(&text)
            .map(|caps| caps[1].trim_end().to_string());
        Self {
            branch,
            is_clean,
            text,
        }
    }
}

/// Outcome of [`check_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitState {
    /// Branch the checkout is actually on, patch prefix included.
    pub current_branch: String,
    /// Branch the release should be made from after any operator override.
    pub master_branch: String,
}

/// Reduces `patch/BASE/NAME` to `BASE`; other names are returned unchanged.
pub fn base_branch(branch: &str) -> &str {
    PATCH_BRANCH_REGEX
        .captures(branch)
        .and_then(|caps| caps.get(1))
        .map_or(branch, |m| m.as_str())
}

/// Returns `NAME` when a `git branch -l` line names `patch/<base>/NAME`.
pub fn parse_patch_branch<'a>(line: &'a str, base: &str) -> Option<&'a str> {
    let caps = BRANCH_LIST_PATCH_REGEX.captures(line)?;
    if &caps[1] != base {
        return None;
    }
    caps.get(2).map(|m| m.as_str())
}

/// Extracts the hash from the first `commit <hash>` line of `git log` output.
pub fn parse_commit_hash(log: &str) -> Option<&str> {
    COMMIT_REGEX
        .captures(log)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// A git working copy rooted at some directory.
#[derive(Debug, Clone)]
pub struct Checkout {
    dir: PathBuf,
}

impl Checkout {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The checkout containing the current working directory.
    pub fn current() -> Self {
        Self::at(".")
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `dir` holds its own repository (a `.git` directory or file).
    pub fn is_repository(&self) -> bool {
        self.dir.join(".git").exists()
    }

    fn nested(&self, dir: &Path) -> Checkout {
        if self.dir == Path::new(".") {
            Checkout::at(dir)
        } else {
            Checkout::at(self.dir.join(dir))
        }
    }

    fn options(&self) -> RunOptions {
        RunOptions::new()
            .current_dir(&self.dir)
            .env("LC_ALL", "C")
    }

    /// Runs `git status`. A dirty tree is an error when `fatal_unless_clean`
    /// is set.
    pub fn status(&self, fatal_unless_clean: bool) -> Result<GitStatus> {
        let text = capture_text_checked(["git", "status"], &self.options())?;
        let status = GitStatus::parse(text);
        debug!(
            dir = %self.dir.display(),
            branch = ?status.branch,
            clean = status.is_clean,
            "checked git status"
        );

        if !status.is_clean && fatal_unless_clean {
            return Err(PkgError::DirtyCheckout {
                dir: self.dir.clone(),
                status: status.text,
            });
        }
        Ok(status)
    }

    /// Makes sure this checkout (and optionally a nested one) is on
    /// `master_branch`.
    ///
    /// A `patch/BASE/NAME` branch counts as `BASE`. When the expected branch
    /// is `master` the operator may accept the detected branch instead;
    /// any other mismatch is an error. A nested checkout on the wrong branch
    /// is switched after confirmation.
    ///
    /// # Errors
    /// `DirtyCheckout`, `DetachedHead`, `BranchMismatch`, or `Aborted` when
    /// the operator declines.
    pub fn check_state(
        &self,
        master_branch: &str,
        fatal_unless_clean: bool,
        extra_dir: Option<&Path>,
        confirm: &mut dyn Confirm,
    ) -> Result<GitState> {
        let status = self.status(fatal_unless_clean)?;
        let current_branch = status.branch.ok_or_else(|| PkgError::DetachedHead {
            dir: self.dir.clone(),
        })?;

        let mut master = master_branch.to_string();
        let branch = base_branch(&current_branch);
        if branch != master_branch {
            ui::warn(&format!("The checkout is not on the {master_branch} branch."));
            if master_branch != "master" {
                return Err(PkgError::BranchMismatch {
                    expected: master_branch.to_string(),
                    found: branch.to_string(),
                });
            }
            if !confirm.confirm(&format!("Do you want me to continue with --branch={branch}?"))? {
                warn!(branch, "operator declined to release from detected branch");
                return Err(PkgError::Aborted(format!(
                    "the checkout is on branch {branch}, not {master_branch}"
                )));
            }
            master = branch.to_string();
        }

        if let Some(extra_dir) = extra_dir {
            let extra = self.nested(extra_dir);
            if extra.is_repository() {
                extra.ensure_branch(&master, fatal_unless_clean, confirm)?;
            }
        }

        Ok(GitState {
            current_branch,
            master_branch: master,
        })
    }

    fn ensure_branch(
        &self,
        branch: &str,
        fatal_unless_clean: bool,
        confirm: &mut dyn Confirm,
    ) -> Result<()> {
        let status = self.status(fatal_unless_clean)?;
        if status.branch.as_deref() == Some(branch) {
            return Ok(());
        }

        let found = status.branch.as_deref().unwrap_or("(detached HEAD)");
        ui::warn(&format!(
            "The *{}* checkout is on branch {found}, not branch {branch}.",
            self.dir.display()
        ));
        if !confirm.confirm(&format!("Do you want to change it to branch {branch}?"))? {
            warn!(dir = %self.dir.display(), branch, "operator declined branch switch");
            return Err(PkgError::Aborted(format!(
                "the *{}* checkout is on branch {found}, not {branch}",
                self.dir.display()
            )));
        }
        self.checkout(branch)
    }

    /// Switches the working copy to `branch`.
    pub fn checkout(&self, branch: &str) -> Result<()> {
        run_checked(["git", "checkout", branch], &self.options())?;
        Ok(())
    }

    /// Hash of the newest commit on `branch`.
    pub fn latest_hash(&self, branch: &str) -> Result<String> {
        let log = capture_text_checked(["git", "log", "-1", "--no-color", branch], &self.options())?;
        parse_commit_hash(&log)
            .map(str::to_string)
            .ok_or_else(|| PkgError::CommitHash {
                branch: branch.to_string(),
            })
    }

    /// Names of all local `patch/<base>/NAME` branches.
    pub fn patch_branches(&self, base: &str) -> Result<FxHashSet<String>> {
        let mut child = spawn_pipe(["git", "branch", "-l"], &self.options())?;
        let mut branches = FxHashSet::default();
        let read = child.lines().try_for_each(|line| {
            if let Some(name) = parse_patch_branch(&line?, base) {
                branches.insert(name.to_string());
            }
            Ok::<_, std::io::Error>(())
        });
        if let Err(err) = read {
            let _ = child.finish();
            return Err(err.into());
        }

        let command = child.command().to_string();
        let code = child.finish()?;
        if code != 0 {
            return Err(ProcessError {
                command,
                code,
                stdout: None,
                stderr: None,
            }
            .into());
        }
        Ok(branches)
    }
}

impl Project {
    /// [`Checkout::check_state`] on the project root against the configured
    /// master branch.
    pub fn check_state(
        &self,
        fatal_unless_clean: bool,
        extra_dir: Option<&Path>,
        confirm: &mut dyn Confirm,
    ) -> Result<GitState> {
        Checkout::at(self.root()).check_state(
            &self.config().master_branch,
            fatal_unless_clean,
            extra_dir,
            confirm,
        )
    }
}

/// `git status` for `dir`; see [`Checkout::status`].
pub fn check_status(fatal_unless_clean: bool, dir: impl AsRef<Path>) -> Result<GitStatus> {
    Checkout::at(dir.as_ref()).status(fatal_unless_clean)
}

/// Branch reconciliation for the current directory; see
/// [`Checkout::check_state`].
pub fn check_state(
    master_branch: &str,
    fatal_unless_clean: bool,
    extra_dir: Option<&Path>,
    confirm: &mut dyn Confirm,
) -> Result<GitState> {
    Checkout::current().check_state(master_branch, fatal_unless_clean, extra_dir, confirm)
}

pub fn latest_hash(branch: &str) -> Result<String> {
    Checkout::current().latest_hash(branch)
}

pub fn list_patch_branches(base: &str) -> Result<FxHashSet<String>> {
    Checkout::current().patch_branches(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_status_is_detected_in_both_wordings() {
        let old = GitStatus::parse("On branch master\nnothing to commit, working directory clean\n");
        assert!(old.is_clean);
        let new = GitStatus::parse(
            "On branch master\nYour branch is up to date with 'origin/master'.\n\nnothing to commit, working tree clean\n",
        );
        assert!(new.is_clean);
    }

    #[test]
    fn dirty_status_is_not_clean() {
        let status = GitStatus::parse(
            "On branch master\nChanges not staged for commit:\n\tmodified:   rsync.h\n\nno changes added to commit\n",
        );
        assert!(!status.is_clean);
    }

    #[test]
    fn branch_comes_from_header_line() {
        let status = GitStatus::parse("On branch feature-x\nnothing to commit, working tree clean\n");
        assert_eq!(status.branch.as_deref(), Some("feature-x"));

        let legacy = GitStatus::parse("# On branch release\n");
        assert_eq!(legacy.branch.as_deref(), Some("release"));
    }

    #[test]
    fn detached_head_has_no_branch() {
        let status = GitStatus::parse("HEAD detached at 1a2b3c4\nnothing to commit, working tree clean\n");
        assert_eq!(status.branch, None);
        assert!(status.is_clean);
    }

    #[test]
    fn patch_branches_reduce_to_their_base() {
        assert_eq!(base_branch("patch/master/acls"), "master");
        assert_eq!(base_branch("patch/b3.2/fix-xattrs"), "b3.2");
        assert_eq!(base_branch("master"), "master");
        assert_eq!(base_branch("patch/master/a/b"), "patch/master/a/b");
    }

    #[test]
    fn branch_list_lines_match_requested_base() {
        assert_eq!(parse_patch_branch("  patch/master/foo", "master"), Some("foo"));
        assert_eq!(parse_patch_branch("* patch/master/bar", "master"), Some("bar"));
        assert_eq!(parse_patch_branch("  patch/b3.2/foo", "master"), None);
        assert_eq!(parse_patch_branch("  master", "master"), None);
    }

    #[test]
    fn commit_hash_from_log() {
        let log = "commit 0123abcd\nAuthor: Someone <a@b>\n\n    commit message mentions\n    commit deadbeef\n";
        assert_eq!(parse_commit_hash(log), Some("0123abcd"));
        assert_eq!(parse_commit_hash("fatal: bad revision\n"), None);
    }
}
