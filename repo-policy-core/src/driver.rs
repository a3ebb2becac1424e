//! Hook driver: the single loop that applies registry entries to files.
//!
//! For every entry the driver selects files by glob, either among the paths
//! pre-commit passed in or by walking the repository root. Each file is then
//! read and parsed once, gets every entry that selected it applied in order,
//! and is written back atomically only if its text changed.
//!
//! Failures are per file: a file that cannot be read, parsed or transformed is
//! reported and left untouched while the other files are still processed.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::document::{self, Format};
use crate::error::{HookError, TransformError};
use crate::registry::RegistryEntry;
use crate::report::{FileOutcome, FileStatus, RunOutcome};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// Applies `entries` to the files under `root`.
///
/// With an empty `files` list every file under `root` matching an entry's glob
/// is processed; otherwise only the given paths are considered.
pub fn run(root: &Path, files: &[PathBuf], entries: &[RegistryEntry]) -> RunOutcome {
    info!(root = %root.display(), entries = entries.len(), files = files.len(), "[HOOK] Starting run");
    let mut targets: Vec<(PathBuf, Vec<&RegistryEntry>)> = Vec::new();
    for entry in entries {
        for path in select_files(root, files, &entry.glob) {
            match targets.iter_mut().find(|(target, _)| *target == path) {
                Some((_, selected)) => selected.push(entry),
                None => targets.push((path, vec![entry])),
            }
        }
    }

    let mut outcome = RunOutcome::new();
    for (path, selected) in targets {
        let status = match process_file(&path, &selected) {
            Ok(status) => status,
            Err(e) => {
                error!(path = %path.display(), error = %e, "[HOOK][ERROR] File left untouched");
                FileStatus::Failed(e)
            }
        };
        outcome.push(FileOutcome::new(&path, status));
    }
    info!(files = outcome.files().len(), clean = outcome.is_clean(), "[HOOK] Run finished");
    outcome
}

fn select_files(root: &Path, files: &[PathBuf], glob: &str) -> Vec<PathBuf> {
    if files.is_empty() {
        return find_files(root, glob);
    }
    let pattern = match Pattern::new(glob) {
        Ok(pattern) => pattern,
        Err(e) => {
            warn!(glob, error = %e, "[HOOK] Invalid glob pattern");
            return Vec::new();
        }
    };
    files
        .iter()
        .filter(|path| pattern.matches_path_with(&relative_to(root, path), MATCH_OPTIONS))
        .cloned()
        .collect()
}

/// Regular files under `root` matching `glob`. Hidden directories are skipped
/// unless the pattern names them literally.
pub fn find_files(root: &Path, glob: &str) -> Vec<PathBuf> {
    let escaped_root = Pattern::escape(&root.to_string_lossy());
    let full_pattern = format!("{}/{glob}", escaped_root.trim_end_matches('/'));
    let paths = match glob::glob_with(&full_pattern, MATCH_OPTIONS) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(glob, error = %e, "[HOOK] Invalid glob pattern");
            return Vec::new();
        }
    };
    paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "[HOOK] Skipping unreadable path");
                None
            }
        })
        .filter(|path| path.is_file())
        .collect()
}

/// Path used for glob matching: relative to `root` and without `.` components.
fn relative_to(root: &Path, path: &Path) -> PathBuf {
    let path = path.strip_prefix(root).unwrap_or(path);
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn process_file(path: &Path, entries: &[&RegistryEntry]) -> Result<FileStatus, HookError> {
    let io_error = |source| HookError::Io {
        path: path.to_path_buf(),
        source,
    };
    let text = fs::read_to_string(path).map_err(io_error)?;
    let mut document = document::parse(&text, Format::from_path(path), path)?;

    let mut changes = Vec::new();
    let mut violations = Vec::new();
    for entry in entries {
        match entry.transform.apply(document.root_mut()) {
            Ok(applied) => changes.extend(applied),
            Err(TransformError::Violation(message)) => {
                info!(path = %path.display(), "[HOOK] Convention violated");
                violations.push(message);
            }
            Err(source) => {
                return Err(HookError::Transform {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    let output = document::serialize(&document)?;
    let written = output != text;
    if written {
        write_atomic(path, &output).map_err(io_error)?;
        info!(path = %path.display(), changes = changes.len(), "[HOOK] Updated file");
    } else {
        debug!(path = %path.display(), "[HOOK] File already conforms");
    }

    Ok(if !violations.is_empty() {
        FileStatus::Violation {
            changes: if written { changes } else { Vec::new() },
            messages: violations,
        }
    } else if written {
        FileStatus::Changed(changes)
    } else {
        FileStatus::Unchanged
    })
}

/// Replaces `path` with `content` through a temporary file in the same
/// directory, so readers never observe a half-written file. The replacement
/// keeps the permissions of the file it replaces.
fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)?.permissions();
    let mut file = NamedTempFile::new_in(directory)?;
    file.write_all(content.as_bytes())?;
    file.as_file().set_permissions(permissions)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
