use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigurationError;

/// What to do with `.github/dependabot.yml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependabot {
    /// Keep the file and make sure it updates GitHub Actions.
    Update,
    /// The file must not exist.
    Disabled,
}

impl std::str::FromStr for Dependabot {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update" => Ok(Dependabot::Update),
            "disabled" => Ok(Dependabot::Disabled),
            other => Err(ConfigurationError(format!(
                "unknown dependabot option `{other}`, expected `update` or `disabled`"
            ))),
        }
    }
}

/// Facts about the repository being checked, built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConventionProfile {
    pub repo_name: Option<String>,
    pub repo_title: Option<String>,
    pub has_pypi: bool,
    pub has_notebooks: bool,
    pub has_python: bool,
    pub allow_labels: bool,
    pub dependabot: Option<Dependabot>,
    pub pytest_single_threaded: bool,
    /// Set when the repository has an `.editorconfig` file.
    pub has_editorconfig: bool,
}

impl Default for ConventionProfile {
    fn default() -> Self {
        Self {
            repo_name: None,
            repo_title: None,
            has_pypi: true,
            has_notebooks: true,
            has_python: true,
            allow_labels: false,
            dependabot: None,
            pytest_single_threaded: false,
            has_editorconfig: false,
        }
    }
}

impl ConventionProfile {
    /// Rejects settings that cannot describe any repository.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Some(name) = &self.repo_name {
            if name.is_empty() {
                return Err(ConfigurationError("repository name must not be empty".into()));
            }
            if name.chars().any(char::is_whitespace) {
                return Err(ConfigurationError(format!(
                    "repository name `{name}` must not contain whitespace"
                )));
            }
        }
        if self.repo_title.is_some() && self.repo_name.is_none() {
            return Err(ConfigurationError(
                "a repository title requires a repository name".into(),
            ));
        }
        Ok(())
    }

    /// The repository name, required by hooks that render it into files.
    pub fn require_repo_name(&self) -> Result<&str, ConfigurationError> {
        self.repo_name
            .as_deref()
            .ok_or_else(|| ConfigurationError("--repo-name is required for this hook".into()))
    }

    /// Title shown in documentation, defaulting to the repository name.
    pub fn title(&self) -> Option<&str> {
        self.repo_title.as_deref().or(self.repo_name.as_deref())
    }

    pub fn trace_loaded(&self) {
        info!(
            repo_name = ?self.repo_name,
            has_notebooks = self.has_notebooks,
            has_python = self.has_python,
            "Loaded ConventionProfile"
        );
        debug!(?self, "ConventionProfile loaded (full debug)");
    }
}
