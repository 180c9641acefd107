//! Bootstrap vocabulary from executables on a search path.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::config::SeedConfig;
use crate::vocabulary::Vocabulary;

/// Directories scanned when no search path is available.
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Outcome of a seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Directories opened.
    pub scanned: usize,
    /// Directories that could not be opened.
    pub unreadable: usize,
    /// Directories abandoned on timeout.
    pub timed_out: usize,
    /// Directories that hit the per-directory cap.
    pub capped: usize,
    /// New tokens added.
    pub added: usize,
}

/// Picks `value` unless it is unset or empty.
#[must_use]
pub fn search_path_or_default(value: Option<OsString>) -> OsString {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| OsString::from(DEFAULT_SEARCH_PATH))
}

/// Adds the names of executable regular files found in each directory of
/// `path_list` to `vocabulary`.
///
/// Dot-files, duplicates, names that are not valid tokens, and (when
/// configured) symlinks are skipped. A directory is abandoned once
/// `max_per_dir` names were added from it or `dir_timeout` elapsed.
pub fn seed_from_search_path(vocabulary: &mut Vocabulary, path_list: &OsStr, config: &SeedConfig) -> SeedReport {
    let mut report = SeedReport::default();

    for dir in std::env::split_paths(path_list) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "skipping unreadable directory");
                report.unreadable += 1;
                continue;
            }
        };
        report.scanned += 1;

        let started = Instant::now();
        let mut processed = 0usize;
        let mut added = 0usize;

        for entry in entries.flatten() {
            if config.dir_timeout().is_some_and(|limit| started.elapsed() >= limit) {
                info!(dir = %dir.display(), "directory scan timed out, moving on");
                report.timed_out += 1;
                break;
            }

            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with('.') || !is_executable_file(&entry.path(), config.skip_symlinks) {
                continue;
            }

            if let Ok((_, true)) = vocabulary.intern(name) {
                added += 1;
            }
            processed += 1;
            if config.log_every > 0 && processed % config.log_every == 0 {
                debug!(dir = %dir.display(), processed, added, "seeding progress");
            }
            if config.max_per_dir > 0 && added >= config.max_per_dir {
                info!(dir = %dir.display(), cap = config.max_per_dir, "directory hit seed cap");
                report.capped += 1;
                break;
            }
        }

        debug!(dir = %dir.display(), added, "directory seeded");
        report.added += added;
    }

    info!(added = report.added, directories = report.scanned, "vocabulary seeded");
    report
}

fn is_executable_file(path: &Path, skip_symlinks: bool) -> bool {
    let Ok(link_meta) = fs::symlink_metadata(path) else {
        return false;
    };
    let meta = if link_meta.file_type().is_symlink() {
        if skip_symlinks {
            return false;
        }
        match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => return false,
        }
    } else {
        link_meta
    };
    meta.is_file() && meta.permissions().mode() & 0o111 != 0
}
