//! # contract: interface to the label-sync collaborator
//!
//! Repository labels live on the code host, not in the repository. This module
//! defines the [`LabelRemote`] trait that a host client implements, and the
//! additive [`sync_labels`] algorithm that runs against it.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; enable the `test-export-mocks`
//!   feature to use `MockLabelRemote` from other crates.
//!
//! No network implementation ships with this crate.

use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Error type for [`LabelRemote`] implementations.
pub type RemoteError = Box<dyn std::error::Error + Send + Sync>;

/// One issue label as stored in `labels.toml` and on the code host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Hex colour without the leading `#`.
    pub color: String,
    #[serde(default)]
    pub description: String,
}

impl Label {
    pub fn new(name: &str, color: &str, description: &str) -> Self {
        Self {
            name: name.to_owned(),
            color: color.to_owned(),
            description: description.to_owned(),
        }
    }
}

/// Labels every repository is expected to carry.
pub fn standard_labels() -> Vec<Label> {
    vec![
        Label::new("🐛 Bug", "d73a4a", "Something isn't working"),
        Label::new("📝 Docs", "0075ca", "Improvements or additions to documentation"),
        Label::new("✨ Feature", "a2eeef", "New feature added to the package"),
        Label::new("🔨 Maintenance", "e4e669", "Maintenance and upkeep improvements"),
        Label::new("⚠️ Interface", "fbca04", "Breaking changes to the API"),
        Label::new("🖱️ DX", "c5def5", "Improvements to the Developer Experience"),
        Label::new("💡 Enhancement", "a2eeef", "Improvements and optimizations of existing features"),
        Label::new("⚙️ Enhancement", "cfd3d7", "Improvements to the CI, tooling or build system"),
        Label::new("❌ Won't fix", "ffffff", "This will not be worked on"),
    ]
}

/// Code host that stores a repository's labels.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait LabelRemote {
    /// All labels currently defined on the remote.
    fn list_labels(&self) -> Result<Vec<Label>, RemoteError>;

    fn create_label(&self, label: &Label) -> Result<(), RemoteError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSyncReport {
    pub created: Vec<String>,
    /// Labels already present; never modified.
    pub existing: Vec<String>,
}

/// Creates every desired label missing on the remote.
///
/// The sync is additive: labels present remotely are left alone even when
/// their colour or description differ, and labels not in `desired` are kept.
pub fn sync_labels<R: LabelRemote + ?Sized>(
    remote: &R,
    desired: &[Label],
) -> Result<LabelSyncReport, RemoteError> {
    let current = remote.list_labels()?;
    debug!(count = current.len(), "Fetched remote labels");
    let mut report = LabelSyncReport::default();
    for label in desired {
        if current.iter().any(|l| l.name == label.name) {
            report.existing.push(label.name.clone());
            continue;
        }
        remote.create_label(label)?;
        info!(label = %label.name, "[LABELS] Created label");
        report.created.push(label.name.clone());
    }
    Ok(report)
}
