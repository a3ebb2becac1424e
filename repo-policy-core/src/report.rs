//! Per-file results of a hook run, the summary printed to the user and the
//! process exit status.

use std::path::{Path, PathBuf};

use crate::error::HookError;
use crate::merge::Change;

const SEPARATOR: &str = "\n--------------------\n";

#[derive(Debug)]
pub enum FileStatus {
    Unchanged,
    /// Rewritten on disk.
    Changed(Vec<Change>),
    /// At least one convention could not be fixed automatically. Fixable parts
    /// are still written and listed in `changes`.
    Violation {
        changes: Vec<Change>,
        messages: Vec<String>,
    },
    /// Left untouched because it could not be read, parsed or transformed.
    Failed(HookError),
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileOutcome {
    pub fn new(path: &Path, status: FileStatus) -> Self {
        Self {
            path: path.to_path_buf(),
            status,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self.status, FileStatus::Unchanged)
    }

    fn render(&self) -> Option<String> {
        let path = self.path.display();
        let with_changes = |header: String, changes: &[Change]| {
            changes
                .iter()
                .fold(header, |text, change| format!("{text}\n  - {change}"))
        };
        match &self.status {
            FileStatus::Unchanged => None,
            FileStatus::Changed(changes) => Some(with_changes(format!("Updated {path}"), changes)),
            FileStatus::Violation { changes, messages } => {
                let mut text = format!("{path}:\n{}", messages.join("\n"));
                if !changes.is_empty() {
                    text = with_changes(format!("{text}\nFixed"), changes);
                }
                Some(text)
            }
            FileStatus::Failed(error) => Some(format!("Failed to process {path}: {error}")),
        }
    }
}

/// Everything one hook invocation did, in processing order.
#[derive(Debug, Default)]
pub struct RunOutcome {
    files: Vec<FileOutcome>,
}

impl RunOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: FileOutcome) {
        self.files.push(outcome);
    }

    pub fn files(&self) -> &[FileOutcome] {
        &self.files
    }

    pub fn get(&self, path: &Path) -> Option<&FileOutcome> {
        self.files.iter().find(|outcome| outcome.path == path)
    }

    pub fn is_clean(&self) -> bool {
        self.files.iter().all(FileOutcome::is_clean)
    }

    /// 0 when every file was already conforming, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_clean() {
            0
        } else {
            1
        }
    }

    /// Human-readable summary; empty when nothing needs attention.
    pub fn render(&self) -> String {
        self.files
            .iter()
            .filter_map(FileOutcome::render)
            .collect::<Vec<_>>()
            .join(SEPARATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_run_exits_zero_and_renders_nothing() {
        let mut outcome = RunOutcome::new();
        outcome.push(FileOutcome::new(Path::new("a.yaml"), FileStatus::Unchanged));
        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(outcome.render(), "");
    }

    #[test]
    fn changes_and_violations_are_separated() {
        let mut outcome = RunOutcome::new();
        outcome.push(FileOutcome::new(
            Path::new("a.yaml"),
            FileStatus::Changed(vec![Change::Added("repos[x]".into())]),
        ));
        outcome.push(FileOutcome::new(
            Path::new("b.ipynb"),
            FileStatus::Violation {
                changes: Vec::new(),
                messages: vec!["install cell is not hidden".into()],
            },
        ));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(
            outcome.render(),
            "Updated a.yaml\n  - added repos[x]\n--------------------\nb.ipynb:\ninstall cell is not hidden"
        );
    }
}
