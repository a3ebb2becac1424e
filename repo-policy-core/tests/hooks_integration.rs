use std::fs;
use std::path::{Path, PathBuf};

use repo_policy_core::config::ConventionProfile;
use repo_policy_core::contract::Label;
use repo_policy_core::document::{parse, Format, Node};
use repo_policy_core::driver;
use repo_policy_core::registry::{
    labels_fragment, profile_for, self_check_entries, HookId, HookOptions, RegistryEntry,
};
use repo_policy_core::report::FileStatus;
use repo_policy_core::transform::{HookDefinitions, NotebookCells};
use tempfile::{tempdir, TempDir};

fn repo_with(files: &[(&str, &str)]) -> TempDir {
    let dir = tempdir().unwrap();
    for (name, content) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }
    dir
}

fn entries(hook: HookId, profile: &ConventionProfile) -> Vec<RegistryEntry> {
    profile_for(hook, profile, &HookOptions::default()).unwrap()
}

fn demo_profile() -> ConventionProfile {
    ConventionProfile {
        repo_name: Some("demo".into()),
        ..Default::default()
    }
}

fn read(dir: &TempDir, name: &str) -> String {
    fs::read_to_string(dir.path().join(name)).unwrap()
}

fn parse_file(dir: &TempDir, name: &str) -> Node {
    let path = dir.path().join(name);
    parse(&read(dir, name), Format::from_path(&path), &path)
        .unwrap()
        .into_root()
}

const PRECOMMIT: &str = "repos:
  - repo: https://github.com/astral-sh/ruff-pre-commit
    rev: v0.4.0
    hooks:
      - id: ruff
        args: [--fix]
";

#[test]
fn check_dev_files_adds_missing_hook_once() {
    let dir = repo_with(&[(".pre-commit-config.yaml", PRECOMMIT)]);
    let profile = demo_profile();

    let first = driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &profile));
    assert_eq!(first.exit_code(), 1);
    let outcome = &first.files()[0];
    let FileStatus::Changed(changes) = &outcome.status else {
        panic!("expected a change, got {:?}", outcome.status);
    };
    assert!(changes
        .iter()
        .any(|c| c.to_string().ends_with("ruff-pre-commit].hooks[ruff-format]")));

    let config = parse_file(&dir, ".pre-commit-config.yaml");
    let repos = config.get("repos").unwrap().as_sequence().unwrap();
    let ruff = &repos[0];
    assert_eq!(ruff.get("rev"), Some(&Node::from("v0.4.0")));
    let hook_ids: Vec<&str> = ruff
        .get("hooks")
        .unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|hook| hook.get("id").unwrap().as_str().unwrap())
        .collect();
    assert_eq!(hook_ids, vec!["ruff", "ruff-format"]);
    let keys: Vec<&str> = config.as_mapping().unwrap().keys().collect();
    assert_eq!(keys, vec!["ci", "repos"]);

    let written = read(&dir, ".pre-commit-config.yaml");
    let second = driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &profile));
    assert_eq!(second.exit_code(), 0, "{}", second.render());
    assert_eq!(read(&dir, ".pre-commit-config.yaml"), written);
}

#[test]
fn check_dev_files_removes_deprecated_hooks() {
    let dir = repo_with(&[(
        ".pre-commit-config.yaml",
        "repos:\n  - repo: https://github.com/igorshubovych/markdownlint-cli\n    rev: v0.39.0\n    hooks:\n      - id: markdownlint\n  - repo: https://github.com/psf/black\n    rev: 24.1.0\n    hooks:\n      - id: black\n      - id: black-jupyter\n",
    )]);
    let outcome = driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &demo_profile()));
    assert_eq!(outcome.exit_code(), 1);

    let config = parse_file(&dir, ".pre-commit-config.yaml");
    let urls: Vec<&str> = config
        .get("repos")
        .unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|repo| repo.get("repo").unwrap().as_str().unwrap())
        .collect();
    assert!(!urls.contains(&"https://github.com/igorshubovych/markdownlint-cli"));
    assert!(urls.contains(&"https://github.com/psf/black"));
}

const NOTEBOOK: &str = r##"{
 "cells": [
  {
   "cell_type": "markdown",
   "id": "a1b2",
   "metadata": {},
   "source": ["# Title"]
  },
  {
   "cell_type": "code",
   "execution_count": null,
   "id": "c3d4",
   "metadata": {"tags": []},
   "outputs": [],
   "source": ["print(1)"]
  }
 ],
 "metadata": {},
 "nbformat": 4,
 "nbformat_minor": 2
}
"##;

#[test]
fn fix_nbformat_version_sets_minor_and_strips_ids() {
    let dir = repo_with(&[("docs/demo.ipynb", NOTEBOOK)]);
    let profile = ConventionProfile::default();

    let first = driver::run(dir.path(), &[], &entries(HookId::FixNbformatVersion, &profile));
    assert_eq!(first.exit_code(), 1);

    let notebook = parse_file(&dir, "docs/demo.ipynb");
    assert_eq!(notebook.get("nbformat_minor"), Some(&Node::from(4_i64)));
    for cell in notebook.get("cells").unwrap().as_sequence().unwrap() {
        assert!(cell.get("id").is_none());
    }

    let second = driver::run(dir.path(), &[], &entries(HookId::FixNbformatVersion, &profile));
    assert_eq!(second.exit_code(), 0);
}

#[test]
fn binary_outputs_are_reported_but_other_fixes_are_written() {
    let notebook = NOTEBOOK.replace(
        "\"outputs\": []",
        "\"outputs\": [{\"output_type\": \"display_data\", \"data\": {\"image/png\": \"iVBOR\"}, \"metadata\": {}}]",
    );
    let dir = repo_with(&[("demo.ipynb", &notebook)]);
    let outcome = driver::run(
        dir.path(),
        &[],
        &entries(HookId::FixNbformatVersion, &ConventionProfile::default()),
    );
    let FileStatus::Violation { changes, messages } = &outcome.files()[0].status else {
        panic!("expected a violation");
    };
    assert!(!changes.is_empty());
    assert!(messages[0].contains("image/png"));
    let written = parse_file(&dir, "demo.ipynb");
    assert_eq!(written.get("nbformat_minor"), Some(&Node::from(4_i64)));
}

#[test]
fn remove_empty_tags_and_colab_toc_visible() {
    let dir = repo_with(&[("demo.ipynb", NOTEBOOK)]);
    let profile = ConventionProfile::default();
    let mut all = entries(HookId::RemoveEmptyTags, &profile);
    all.extend(entries(HookId::ColabTocVisible, &profile));
    assert_eq!(driver::run(dir.path(), &[], &all).exit_code(), 1);

    let notebook = parse_file(&dir, "demo.ipynb");
    assert_eq!(
        notebook.get_path(&["metadata", "colab", "toc_visible"]),
        Some(&Node::from(true))
    );
    let code_cell = &notebook.get("cells").unwrap().as_sequence().unwrap()[1];
    assert!(code_cell.get_path(&["metadata", "tags"]).is_none());
    assert_eq!(driver::run(dir.path(), &[], &all).exit_code(), 0);
}

#[test]
fn set_nb_cells_inserts_managed_cells_once() {
    let dir = repo_with(&[("demo.ipynb", NOTEBOOK)]);
    let options = HookOptions {
        notebook_cells: NotebookCells {
            install_cell: Some(NotebookCells::install_statement("demo", None, &[])),
            config_cell: true,
            autolink_concat: true,
        },
    };
    let entries = profile_for(HookId::SetNbCells, &ConventionProfile::default(), &options).unwrap();
    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 1);

    let notebook = parse_file(&dir, "demo.ipynb");
    let cells = notebook.get("cells").unwrap().as_sequence().unwrap();
    let sources: Vec<String> = cells
        .iter()
        .map(|cell| cell.get("source").unwrap().joined_text().unwrap())
        .collect();
    assert!(sources[0].contains("%pip install -q demo"));
    assert!(sources[1].contains("STATIC_WEB_PAGE"));
    assert_eq!(sources[2], "```{autolink-concat}\n```");
    assert_eq!(sources[3], "# Title");
    assert_eq!(
        cells[0].get_path(&["metadata", "tags"]),
        Some(&Node::from(vec!["remove-cell", "skip-execution"]))
    );

    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 0);
}

#[test]
fn pin_nb_requirements_accepts_pinned_hidden_cell() {
    let notebook = r#"{
 "cells": [
  {
   "cell_type": "code",
   "execution_count": null,
   "metadata": {"jupyter": {"source_hidden": true}, "tags": ["remove-cell"]},
   "outputs": [],
   "source": ["%pip install -q ampform==0.14.0 \\\n", " sympy==1.12"]
  }
 ],
 "metadata": {},
 "nbformat": 4,
 "nbformat_minor": 4
}
"#;
    let unpinned = notebook.replace("sympy==1.12", "sympy");
    let dir = repo_with(&[("good.ipynb", notebook), ("bad.ipynb", &unpinned)]);
    let outcome = driver::run(
        dir.path(),
        &[],
        &entries(HookId::PinNbRequirements, &ConventionProfile::default()),
    );
    let good = outcome.get(&dir.path().join("good.ipynb")).unwrap();
    assert!(good.is_clean());
    let bad = outcome.get(&dir.path().join("bad.ipynb")).unwrap();
    let FileStatus::Violation { messages, .. } = &bad.status else {
        panic!("expected a violation");
    };
    assert!(messages[0].contains("without =="));
    assert_eq!(read(&dir, "bad.ipynb"), unpinned);
}

#[test]
fn format_setup_cfg_rewrites_text() {
    let dir = repo_with(&[("setup.cfg", "[options]\ninstall_requires =\n\tnumpy>=1.0\n\n\n")]);
    let entries = entries(HookId::FormatSetupCfg, &ConventionProfile::default());
    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 1);
    assert_eq!(
        read(&dir, "setup.cfg"),
        "[options]\ninstall_requires =\n    numpy >=1.0\n"
    );
    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 0);
}

#[test]
fn self_check_compares_local_hooks_ignoring_args() {
    let definitions = parse(
        "- id: check-dev-files\n  name: Check developer config files\n  entry: check-dev-files\n  language: python\n",
        Format::Yaml,
        Path::new(".pre-commit-hooks.yaml"),
    )
    .unwrap();
    let definitions = HookDefinitions::from_node(definitions.root()).unwrap();
    let matching = "repos:\n  - repo: local\n    hooks:\n      - id: check-dev-files\n        name: Check developer config files\n        entry: check-dev-files\n        language: python\n        args: [--repo-name=policy]\n";
    let dir = repo_with(&[(".pre-commit-config.yaml", matching)]);
    let entries = self_check_entries(definitions);
    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 0);

    fs::write(
        dir.path().join(".pre-commit-config.yaml"),
        matching.replace("language: python", "language: system"),
    )
    .unwrap();
    let outcome = driver::run(dir.path(), &[], &entries);
    assert_eq!(outcome.exit_code(), 1);
    assert!(outcome.render().contains("check-dev-files"));
}

#[test]
fn labels_are_merged_additively() {
    let dir = repo_with(&[(
        "labels.toml",
        "[[labels]]\nname = \"bug\"\ncolor = \"d73a4a\"\n\n[[labels]]\nname = \"docs\"\ncolor = \"0075ca\"\n",
    )]);
    let desired = [
        Label::new("bug", "ff0000", "Something isn't working"),
        Label::new("enhancement", "a2eeef", "New feature or request"),
    ];
    let entries = vec![RegistryEntry::merge("labels.toml", labels_fragment(&desired))];
    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 1);

    let labels = parse_file(&dir, "labels.toml");
    let labels = labels.get("labels").unwrap().as_sequence().unwrap();
    let names: Vec<&str> = labels
        .iter()
        .map(|label| label.get("name").unwrap().as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["bug", "docs", "enhancement"]);
    assert_eq!(labels[0].get("color"), Some(&Node::from("d73a4a")));
    assert_eq!(labels[1].get("color"), Some(&Node::from("0075ca")));
    assert_eq!(driver::run(dir.path(), &[], &entries).exit_code(), 0);
}

#[test]
fn broken_files_fail_without_stopping_the_run() {
    let dir = repo_with(&[("a.ipynb", "{ not json"), ("b.ipynb", NOTEBOOK)]);
    let outcome = driver::run(
        dir.path(),
        &[],
        &entries(HookId::FixNbformatVersion, &ConventionProfile::default()),
    );
    let broken = outcome.get(&dir.path().join("a.ipynb")).unwrap();
    assert!(matches!(broken.status, FileStatus::Failed(_)));
    assert_eq!(read(&dir, "a.ipynb"), "{ not json");
    let fixed = parse_file(&dir, "b.ipynb");
    assert_eq!(fixed.get("nbformat_minor"), Some(&Node::from(4_i64)));
}

#[test]
fn explicit_file_list_limits_the_run() {
    let dir = repo_with(&[("a.ipynb", NOTEBOOK), ("b.ipynb", NOTEBOOK)]);
    let only: Vec<PathBuf> = vec![dir.path().join("a.ipynb")];
    let outcome = driver::run(
        dir.path(),
        &only,
        &entries(HookId::FixNbformatVersion, &ConventionProfile::default()),
    );
    assert_eq!(outcome.files().len(), 1);
    assert_eq!(read(&dir, "b.ipynb"), NOTEBOOK);
}

#[test]
fn pyproject_dates_survive_check_dev_files() {
    let dir = repo_with(&[(
        "pyproject.toml",
        "[project]\nname = \"demo\"\nreleased = 2024-01-01\n\n[tool.pytest.ini_options]\naddopts = \"--color=no\"\n",
    )]);
    let outcome = driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &demo_profile()));
    assert_eq!(outcome.exit_code(), 1);

    let text = read(&dir, "pyproject.toml");
    assert!(text.contains("released = 2024-01-01\n"), "{text}");
    assert!(text.contains("--color=yes"));
}

#[cfg(unix)]
#[test]
fn rewritten_notebooks_keep_their_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = repo_with(&[("demo.ipynb", NOTEBOOK)]);
    let path = dir.path().join("demo.ipynb");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

    let outcome = driver::run(
        dir.path(),
        &[],
        &entries(HookId::FixNbformatVersion, &ConventionProfile::default()),
    );
    assert_eq!(outcome.exit_code(), 1);
    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o644);
}

#[test]
fn no_pypi_drops_classifiers() {
    let pyproject = "[project]\nname = \"demo\"\nclassifiers = [\"Programming Language :: Python :: 3.12\"]\n";
    let dir = repo_with(&[("pyproject.toml", pyproject)]);
    let published = driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &demo_profile()));
    assert!(published.is_clean(), "{}", published.render());
    assert_eq!(read(&dir, "pyproject.toml"), pyproject);

    let profile = ConventionProfile {
        has_pypi: false,
        ..demo_profile()
    };
    let outcome = driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &profile));
    assert!(outcome.render().contains("removed project.classifiers"));
    let project = parse_file(&dir, "pyproject.toml");
    assert!(project.get_path(&["project", "classifiers"]).is_none());
    assert_eq!(project.get_path(&["project", "name"]), Some(&Node::from("demo")));
}

#[test]
fn release_drafter_name_carries_repo_title() {
    let dir = repo_with(&[(
        ".github/release-drafter.yml",
        "name-template: demo v$RESOLVED_VERSION\ntemplate: |\n  $CHANGES\n",
    )]);
    let profile = ConventionProfile {
        repo_title: Some("Demo Project".into()),
        ..demo_profile()
    };
    let check = entries(HookId::CheckDevFiles, &profile);
    assert_eq!(driver::run(dir.path(), &[], &check).exit_code(), 1);

    let config = parse_file(&dir, ".github/release-drafter.yml");
    assert_eq!(
        config.get("name-template"),
        Some(&Node::from("Demo Project $RESOLVED_VERSION"))
    );
    assert_eq!(config.get("tag-template"), Some(&Node::from("$RESOLVED_VERSION")));
    assert_eq!(config.get("template"), Some(&Node::from("$CHANGES\n")));
    assert_eq!(driver::run(dir.path(), &[], &check).exit_code(), 0);
}

#[test]
fn vscode_recommendations_are_updated() {
    let dir = repo_with(&[(
        ".vscode/extensions.json",
        "{\n  \"recommendations\": [\"ms-python.python\", \"tyriar.sort-lines\"]\n}\n",
    )]);
    let check = entries(HookId::CheckDevFiles, &demo_profile());
    assert_eq!(driver::run(dir.path(), &[], &check).exit_code(), 1);

    let config = parse_file(&dir, ".vscode/extensions.json");
    let recommendations: Vec<&str> = config
        .get("recommendations")
        .unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .map(|id| id.as_str().unwrap())
        .collect();
    assert_eq!(recommendations[0], "ms-python.python");
    assert!(recommendations.contains(&"stkb.rewrap"));
    assert!(!recommendations.contains(&"tyriar.sort-lines"));
    let unwanted = config.get("unwantedRecommendations").unwrap().as_sequence().unwrap();
    assert!(unwanted.contains(&Node::from("tyriar.sort-lines")));
    assert_eq!(driver::run(dir.path(), &[], &check).exit_code(), 0);
}

#[test]
fn editorconfig_checker_is_added_when_configured() {
    let dir = repo_with(&[(".pre-commit-config.yaml", PRECOMMIT)]);
    let profile = ConventionProfile {
        has_editorconfig: true,
        ..demo_profile()
    };
    driver::run(dir.path(), &[], &entries(HookId::CheckDevFiles, &profile));

    let config = parse_file(&dir, ".pre-commit-config.yaml");
    let editorconfig = config
        .get("repos")
        .unwrap()
        .as_sequence()
        .unwrap()
        .iter()
        .find(|repo| {
            repo.get("repo").and_then(Node::as_str)
                == Some("https://github.com/editorconfig-checker/editorconfig-checker.python")
        })
        .expect("editorconfig repo added");
    let hook = &editorconfig.get("hooks").unwrap().as_sequence().unwrap()[0];
    assert_eq!(hook.get("alias"), Some(&Node::from("ec")));
    assert_eq!(editorconfig.get("rev"), Some(&Node::from("PLEASE-UPDATE")));
}
