/// `load_config` module: loads the optional YAML profile file passed with `--config`.
///
/// Every field is optional; a value given on the command line takes precedence
/// (see [`crate::cli::build_profile`]). Unknown keys are rejected so that typos
/// surface as configuration errors instead of being ignored.
///
/// ```yaml
/// repo_name: ampform
/// repo_title: AmpForm
/// allow_labels: true
/// dependabot: update
/// ```
use anyhow::Result;
use repo_policy_core::config::Dependabot;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileFile {
    pub repo_name: Option<String>,
    pub repo_title: Option<String>,
    pub has_pypi: Option<bool>,
    pub has_notebooks: Option<bool>,
    pub has_python: Option<bool>,
    pub allow_labels: Option<bool>,
    pub dependabot: Option<Dependabot>,
    pub pytest_single_threaded: Option<bool>,
}

/// Reads and parses the profile file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ProfileFile> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };
    if config_content.trim().is_empty() {
        return Ok(ProfileFile::default());
    }

    match serde_yaml::from_str(&config_content) {
        Ok(file) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            Ok(file)
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML: {e}"))
        }
    }
}
