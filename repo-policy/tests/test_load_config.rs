use std::fs::write;
use std::path::Path;

use repo_policy::cli::{build_profile, ProfileArgs};
use repo_policy::load_config::load_config;
use repo_policy_core::config::Dependabot;
use tempfile::NamedTempFile;

/// A full profile file is loaded field by field.
#[test]
fn test_load_config_reads_every_field() {
    let config_yaml = r#"
repo_name: ampform
repo_title: AmpForm
has_pypi: false
has_notebooks: true
has_python: true
allow_labels: true
dependabot: update
pytest_single_threaded: true
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let file = load_config(config_file.path()).expect("Config should load");
    assert_eq!(file.repo_name.as_deref(), Some("ampform"));
    assert_eq!(file.repo_title.as_deref(), Some("AmpForm"));
    assert_eq!(file.has_pypi, Some(false));
    assert_eq!(file.dependabot, Some(Dependabot::Update));
    assert_eq!(file.pytest_single_threaded, Some(true));

    let profile = build_profile(&ProfileArgs::default(), file, Path::new("/nonexistent"));
    assert_eq!(profile.repo_name.as_deref(), Some("ampform"));
    assert!(!profile.has_pypi);
    assert!(profile.has_notebooks);
    assert!(profile.allow_labels);
    assert_eq!(profile.validate(), Ok(()));
}

#[test]
fn test_load_config_empty_file_gives_defaults() {
    let config_file = NamedTempFile::new().expect("temp file");
    let file = load_config(config_file.path()).expect("Empty config should load");
    assert!(file.repo_name.is_none());
    assert!(file.dependabot.is_none());
}

#[test]
fn test_load_config_rejects_unknown_keys() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "repo_nmae: typo\n").unwrap();
    let err = load_config(config_file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
fn test_load_config_rejects_unknown_dependabot_mode() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "dependabot: sometimes\n").unwrap();
    assert!(load_config(config_file.path()).is_err());
}

#[test]
fn test_load_config_missing_file() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
