use crate::errors::{PkgError, Result, io_error_with_path};
use std::path::{Path, PathBuf};

/// Directory under the project root that holds pkgkit settings
pub const CONFIG_DIR: &str = ".pkgkit";

/// Where the packaged project keeps its metadata, and what it is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Package name expected in the `AC_INIT` line.
    pub package: String,
    /// Branch releases are cut from.
    pub master_branch: String,
    pub makefile: PathBuf,
    pub configure: PathBuf,
    pub changelog: PathBuf,
    pub header: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            package: "rsync".to_string(),
            master_branch: "master".to_string(),
            makefile: PathBuf::from("Makefile.in"),
            configure: PathBuf::from("configure.ac"),
            changelog: PathBuf::from("OLDNEWS"),
            header: PathBuf::from("rsync.h"),
        }
    }
}

impl Config {
    /// Load configuration from .pkgkit/config.toml, falling back to the
    /// rsync layout for anything not set.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_DIR).join("config.toml");
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(&path).map_err(|e| io_error_with_path(e, &path))?;
        Self::parse(&text)
    }

    fn parse(text: &str) -> Result<Self> {
        let value: toml::Value = text
            .parse()
            .map_err(|e| PkgError::Config(format!("invalid config.toml: {e}")))?;
        let defaults = Self::default();

        let package = string_setting(&value, "project", "package")?.unwrap_or(defaults.package);
        if package.trim().is_empty() {
            return Err(PkgError::Config("project.package must not be empty".into()));
        }
        let master_branch = string_setting(&value, "project", "master_branch")?
            .unwrap_or(defaults.master_branch);

        let file = |key: &str, fallback: PathBuf| -> Result<PathBuf> {
            Ok(string_setting(&value, "files", key)?
                .map(PathBuf::from)
                .unwrap_or(fallback))
        };

        Ok(Self {
            package,
            master_branch,
            makefile: file("makefile", defaults.makefile)?,
            configure: file("configure", defaults.configure)?,
            changelog: file("changelog", defaults.changelog)?,
            header: file("header", defaults.header)?,
        })
    }
}

fn string_setting(value: &toml::Value, table: &str, key: &str) -> Result<Option<String>> {
    let Some(entry) = value
        .get(table)
        .and_then(|v| v.as_table())
        .and_then(|t| t.get(key))
    else {
        return Ok(None);
    };

    entry
        .as_str()
        .map(|s| Some(s.to_string()))
        .ok_or_else(|| PkgError::Config(format!("{table}.{key} must be a string, found {entry}")))
}
