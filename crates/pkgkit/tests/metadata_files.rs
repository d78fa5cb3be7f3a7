use pkgkit::{PkgError, Project};
use serial_test::serial;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MAKEFILE_IN: &str = "\
prefix=@prefix@
GENFILES=configure.sh aclocal.m4 config.h.in rsync.1 rsync.1.html \\
\trsync-ssl.1 rsync-ssl.1.html rsyncd.conf.5 rsyncd.conf.5.html \\
\trrsync.1 rrsync.1.html
HEADERS=byteorder.h config.h errcode.h proto.h rsync.h ifuncs.h itypes.h inums.h \\
\tlib/pool_alloc.h lib/mdigest.h lib/md-defines.h
";

const CONFIGURE_AC: &str = "\
dnl Process this file with autoconf to produce a configure script.

AC_INIT([rsync],[3.2.7],[https://rsync.samba.org/bug-tracking.html])

AC_C_BIGENDIAN
";

const OLDNEWS: &str = "\
# NEWS for rsync 3.2.7 (20 Oct 2022)

## Changes in this version:

### BUG FIXES:

- Fixed the handling of arg-splitting in 3.2.6.

------------------------------------------------------------------------------

# Partial Protocol History

| RELEASE DATE | VER.   | DATE OF COMMIT\\* | PROTOCOL    |
|--------------|--------|------------------|-------------|
| 20 Oct 2022  | 3.2.7  |                  | 31          |
    20 Oct 2022   3.2.7                       31
    09 Sep 2022   3.2.6                       31
";

const RSYNC_H: &str = "\
#define False 0
#define True 1

#define PROTOCOL_VERSION 31

/* This is used when working on a new protocol version in CVS, and should
 * be a new non-zero value for each CVS change that affects the protocol. */
#define SUBPROTOCOL_VERSION 0
";

fn rsync_tree() -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = temp.path().to_path_buf();
    fs::write(root.join("Makefile.in"), MAKEFILE_IN).unwrap();
    fs::write(root.join("configure.ac"), CONFIGURE_AC).unwrap();
    fs::write(root.join("OLDNEWS"), OLDNEWS).unwrap();
    fs::write(root.join("rsync.h"), RSYNC_H).unwrap();
    (temp, root)
}

#[test]
fn reads_all_metadata_from_rsync_tree() {
    let (_temp, root) = rsync_tree();
    let project = Project::open(&root).unwrap();

    assert_eq!(
        project.extra_generated_files().unwrap(),
        [
            "configure.sh",
            "aclocal.m4",
            "config.h.in",
            "rsync.1",
            "rsync.1.html",
            "rsync-ssl.1",
            "rsync-ssl.1.html",
            "rsyncd.conf.5",
            "rsyncd.conf.5.html",
            "rrsync.1",
            "rrsync.1.html",
        ]
    );
    assert_eq!(project.configured_version().unwrap(), "3.2.7");

    let info = project.changelog_version_info().unwrap();
    assert_eq!(info.version, "3.2.7");
    assert_eq!(info.protocol_version, "31");

    let versions = project.protocol_versions().unwrap();
    assert_eq!(versions.protocol, "31");
    assert_eq!(versions.subprotocol, "0");
}

#[test]
fn missing_ac_init_is_fatal_and_mentions_version() {
    let (_temp, root) = rsync_tree();
    fs::write(root.join("configure.ac"), "AC_PREREQ([2.69])\n").unwrap();

    let err = Project::open(&root).unwrap().configured_version().unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.exit_code(), 1);
    assert!(matches!(err, PkgError::MissingMetadata { .. }));
    assert!(err.to_string().contains("AC_INIT with version"));
}

struct CwdGuard(PathBuf);

impl CwdGuard {
    fn enter(dir: &Path) -> Self {
        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        Self(previous)
    }
}

impl Drop for CwdGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.0);
    }
}

#[test]
#[serial]
fn free_functions_read_from_current_directory() {
    let (_temp, root) = rsync_tree();
    let _cwd = CwdGuard::enter(&root);

    assert_eq!(pkgkit::configured_version().unwrap(), "3.2.7");
    assert_eq!(pkgkit::extra_generated_files().unwrap().len(), 11);
    assert_eq!(pkgkit::changelog_version_info().unwrap().protocol_version, "31");
    assert_eq!(pkgkit::protocol_versions().unwrap().protocol, "31");
}
