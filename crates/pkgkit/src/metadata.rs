//! Version metadata pulled out of the packaged project's own files.
//!
//! Each extractor reads its file line by line through a small state machine,
//! so the `parse_*` functions accept any [`BufRead`] and can be exercised on
//! in-memory text.

use crate::config::Config;
use crate::errors::{PkgError, Result, io_error_with_path};
use chrono::NaiveDate;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

const GENFILES_PREFIX: &str = "GENFILES=";
const CHANGELOG_DATE_FORMAT: &str = "%d %b %Y";

static VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+\.\d+)").expect("Invalid version regex"));

static RELEASE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s+(?P<released>\S{2}\s\S{3}\s\d{4})\s+(?P<ver>\d+\.\d+\.\d+)\s+(?:(?P<pdate>\d{2} \w{3} \d{4})\s+)?(?P<pver>\d+)$",
    )
    .expect("Invalid release table regex")
});

static PROTOCOL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#define\s+PROTOCOL_VERSION\s+(\d+)").expect("Invalid protocol regex")
});

static SUBPROTOCOL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#define\s+SUBPROTOCOL_VERSION\s+(\d+)").expect("Invalid subprotocol regex")
});

/// The newest release recorded in the changelog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangelogInfo {
    pub version: String,
    pub protocol_version: String,
    /// Release date column; `None` for placeholders such as `?? Jan 2025`.
    pub released: Option<NaiveDate>,
    /// Date the protocol number last changed, when the row lists one.
    pub protocol_changed: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolVersions {
    pub protocol: String,
    pub subprotocol: String,
}

enum GenfilesScan {
    Searching,
    Collecting,
    Done,
}

/// Collects the `GENFILES=` assignment, following `\` continuations.
///
/// Returns an empty list when there is no assignment. A continuation that
/// runs into end of input keeps what was collected so far.
pub fn parse_generated_files<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut state = GenfilesScan::Searching;
    let mut files = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let value = match state {
            GenfilesScan::Searching => match line.strip_prefix(GENFILES_PREFIX) {
                Some(value) => value,
                None => continue,
            },
            GenfilesScan::Collecting => line.as_str(),
            GenfilesScan::Done => break,
        };

        let (value, continued) = match value.strip_suffix('\\') {
            Some(value) => (value, true),
            None => (value, false),
        };
        files.extend(value.split_whitespace().map(str::to_string));
        state = if continued {
            GenfilesScan::Collecting
        } else {
            GenfilesScan::Done
        };
    }

    Ok(files)
}

/// Finds the version in `AC_INIT([<package>], [<version>]...)`.
pub fn parse_configured_version<R: BufRead>(
    reader: R,
    package: &str,
    path: &Path,
) -> Result<String> {
    let pattern = format!(r"^AC_INIT\(\[{}\],\s*\[(\d.+?)\]", regex::escape(package));
    let ac_init = Regex::new(&pattern)
        .map_err(|e| PkgError::Config(format!("invalid package name {package:?}: {e}")))?;

    for line in reader.lines() {
        let line = line?;
        if let Some(caps) = ac_init.captures(&line) {
            return Ok(caps[1].to_string());
        }
    }

    Err(PkgError::MissingMetadata {
        path: path.to_path_buf(),
        what: "find AC_INIT with version".to_string(),
    })
}

enum ChangelogScan {
    SeekingVersion,
    SeekingRelease(String),
}

/// Finds the first version mentioned in the changelog and the protocol
/// number from its row in the release table.
pub fn parse_changelog<R: BufRead>(reader: R) -> Result<ChangelogInfo> {
    let mut state = ChangelogScan::SeekingVersion;

    for line in reader.lines() {
        let line = line?;
        if let ChangelogScan::SeekingVersion = state {
            if let Some(caps) = VERSION_REGEX.captures(&line) {
                debug!(version = &caps[1], "found last version in changelog");
                state = ChangelogScan::SeekingRelease(caps[1].to_string());
            }
        }

        if let ChangelogScan::SeekingRelease(version) = &state {
            if let Some(info) = release_row(&line, version) {
                return Ok(info);
            }
        }
    }

    Err(PkgError::ProtocolVersionUnknown {
        version: match state {
            ChangelogScan::SeekingVersion => None,
            ChangelogScan::SeekingRelease(version) => Some(version),
        },
    })
}

fn release_row(line: &str, version: &str) -> Option<ChangelogInfo> {
    let caps = RELEASE_REGEX.captures(line)?;
    if &caps["ver"] != version {
        return None;
    }
    Some(ChangelogInfo {
        version: version.to_string(),
        protocol_version: caps["pver"].to_string(),
        released: parse_date(&caps["released"]),
        protocol_changed: caps.name("pdate").and_then(|m| parse_date(m.as_str())),
    })
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDate::parse_from_str(&text, CHANGELOG_DATE_FORMAT).ok()
}

enum ProtocolScan {
    Searching,
    HaveProtocol(String),
}

/// Reads `PROTOCOL_VERSION` and the `SUBPROTOCOL_VERSION` defined after it.
pub fn parse_protocol_versions<R: BufRead>(reader: R, path: &Path) -> Result<ProtocolVersions> {
    let mut state = ProtocolScan::Searching;
    let mut subprotocol = None;

    for line in reader.lines() {
        let line = line?;
        if let Some(caps) = PROTOCOL_REGEX.captures(&line) {
            state = ProtocolScan::HaveProtocol(caps[1].to_string());
            continue;
        }
        if let Some(caps) = SUBPROTOCOL_REGEX.captures(&line) {
            subprotocol = Some(caps[1].to_string());
            break;
        }
    }

    let missing = |what: &str| PkgError::MissingMetadata {
        path: path.to_path_buf(),
        what: format!("determine the current {what}"),
    };
    let protocol = match state {
        ProtocolScan::HaveProtocol(protocol) => protocol,
        ProtocolScan::Searching => return Err(missing("PROTOCOL_VERSION")),
    };
    let subprotocol = subprotocol.ok_or_else(|| missing("SUBPROTOCOL_VERSION"))?;

    Ok(ProtocolVersions {
        protocol,
        subprotocol,
    })
}

/// A source tree whose metadata files are read relative to `root`.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    config: Config,
}

impl Project {
    /// Opens `root`, loading `.pkgkit/config.toml` when present.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let config = Config::load(&root)?;
        Ok(Self { root, config })
    }

    pub fn with_config(root: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn reader(&self, relative: &Path) -> Result<(PathBuf, BufReader<File>)> {
        let path = self.root.join(relative);
        let file = File::open(&path).map_err(|e| io_error_with_path(e, &path))?;
        Ok((path, BufReader::new(file)))
    }

    /// Files listed in the `GENFILES=` assignment of the makefile template.
    pub fn extra_generated_files(&self) -> Result<Vec<String>> {
        let (_, reader) = self.reader(&self.config.makefile)?;
        parse_generated_files(reader)
    }

    /// Package version declared in `configure.ac`.
    pub fn configured_version(&self) -> Result<String> {
        let (path, reader) = self.reader(&self.config.configure)?;
        parse_configured_version(reader, &self.config.package, &path)
    }

    /// Last released version and its protocol number, from the changelog.
    pub fn changelog_version_info(&self) -> Result<ChangelogInfo> {
        let (_, reader) = self.reader(&self.config.changelog)?;
        parse_changelog(reader)
    }

    /// `PROTOCOL_VERSION` and `SUBPROTOCOL_VERSION` from the core header.
    pub fn protocol_versions(&self) -> Result<ProtocolVersions> {
        let (path, reader) = self.reader(&self.config.header)?;
        parse_protocol_versions(reader, &path)
    }
}

pub fn extra_generated_files() -> Result<Vec<String>> {
    Project::open(".")?.extra_generated_files()
}

pub fn configured_version() -> Result<String> {
    Project::open(".")?.configured_version()
}

pub fn changelog_version_info() -> Result<ChangelogInfo> {
    Project::open(".")?.changelog_version_info()
}

pub fn protocol_versions() -> Result<ProtocolVersions> {
    Project::open(".")?.protocol_versions()
}
