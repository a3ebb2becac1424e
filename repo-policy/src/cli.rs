/// # repo-policy CLI Interface (Module)
///
/// Command parsing and the glue between flags and the hook driver.
///
/// All rules about what files must contain live in [`repo-policy-core`]; this
/// module only builds a [`ConventionProfile`] from flags and the optional
/// `--config` file, picks the registry entries for the chosen hook and hands
/// them to the driver.
///
/// ## How To Use
/// - Through pre-commit: every hook has its own binary (`check-dev-files`,
///   `set-nb-cells`, ...) that behaves like `repo-policy <hook-id>`.
/// - Programmatically: call [`run`] with a constructed [`Cli`].
///
/// [`repo-policy-core`]: ../../repo-policy-core/
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use repo_policy_core::config::{ConventionProfile, Dependabot};
use repo_policy_core::document::{self, Format, Node};
use repo_policy_core::driver;
use repo_policy_core::error::{ConfigurationError, HookError, TransformError};
use repo_policy_core::registry::{
    profile_for, self_check_entries, HookId, HookOptions, NOTEBOOKS, PRECOMMIT_HOOKS,
};
use repo_policy_core::report::{FileOutcome, FileStatus, RunOutcome};
use repo_policy_core::transform::{HookDefinitions, NotebookCells};

use crate::load_config::{load_config, ProfileFile};

/// CLI for repo-policy: keep developer configuration files in line with shared conventions.
#[derive(Parser, Debug)]
#[clap(
    name = "repo-policy",
    version,
    about = "Pre-commit hooks that enforce shared developer-environment conventions"
)]
pub struct Cli {
    /// YAML file with profile defaults; flags take precedence
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check and update pre-commit, pyproject, label and dependabot configuration
    CheckDevFiles {
        #[clap(flatten)]
        profile: ProfileArgs,
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Make the table of contents visible when notebooks open in Google Colab
    ColabTocVisible {
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Set nbformat_minor to 4 and remove cell ids
    FixNbformatVersion {
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Normalise whitespace and version constraints in setup.cfg
    FormatSetupCfg {
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Check that the pip install cell of each notebook pins its requirements
    PinNbRequirements {
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Remove empty tag lists from notebook cell metadata
    RemoveEmptyTags {
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Check that local hooks match their published definitions
    SelfCheck {
        #[clap(flatten)]
        files: FileArgs,
    },
    /// Keep the standard install, configuration and autolink cells at the top of notebooks
    SetNbCells {
        #[clap(flatten)]
        cells: NotebookCellArgs,
        #[clap(flatten)]
        files: FileArgs,
    },
}

impl Commands {
    pub fn hook(&self) -> HookId {
        match self {
            Commands::CheckDevFiles { .. } => HookId::CheckDevFiles,
            Commands::ColabTocVisible { .. } => HookId::ColabTocVisible,
            Commands::FixNbformatVersion { .. } => HookId::FixNbformatVersion,
            Commands::FormatSetupCfg { .. } => HookId::FormatSetupCfg,
            Commands::PinNbRequirements { .. } => HookId::PinNbRequirements,
            Commands::RemoveEmptyTags { .. } => HookId::RemoveEmptyTags,
            Commands::SelfCheck { .. } => HookId::SelfCheck,
            Commands::SetNbCells { .. } => HookId::SetNbCells,
        }
    }

    fn files(&self) -> &FileArgs {
        match self {
            Commands::CheckDevFiles { files, .. }
            | Commands::ColabTocVisible { files }
            | Commands::FixNbformatVersion { files }
            | Commands::FormatSetupCfg { files }
            | Commands::PinNbRequirements { files }
            | Commands::RemoveEmptyTags { files }
            | Commands::SelfCheck { files }
            | Commands::SetNbCells { files, .. } => files,
        }
    }
}

#[derive(Args, Debug, Default)]
pub struct FileArgs {
    /// Files to check; the whole repository is scanned when none are given
    pub filenames: Vec<PathBuf>,

    /// Repository root
    #[clap(long, default_value = ".")]
    pub root: PathBuf,
}

#[derive(Args, Debug, Default)]
pub struct ProfileArgs {
    /// Repository name, e.g. as used on PyPI
    #[clap(long)]
    pub repo_name: Option<String>,
    /// Title of the repository shown in the documentation
    #[clap(long)]
    pub repo_title: Option<String>,
    /// The package is not published on PyPI
    #[clap(long)]
    pub no_pypi: bool,
    /// The repository contains no Jupyter notebooks
    #[clap(long)]
    pub no_notebooks: bool,
    /// The repository contains no Python package
    #[clap(long)]
    pub no_python: bool,
    /// Keep a labels.toml file with the standard issue labels
    #[clap(long)]
    pub allow_labels: bool,
    /// `update` keeps dependabot updating GitHub Actions, `disabled` forbids it
    #[clap(long)]
    pub dependabot: Option<Dependabot>,
    /// Do not run pytest with pytest-xdist
    #[clap(long)]
    pub pytest_single_threaded: bool,
}

#[derive(Args, Debug, Default)]
pub struct NotebookCellArgs {
    /// Add a hidden cell that installs the package
    #[clap(long)]
    pub add_install_cell: bool,
    /// Optional dependency groups to install, e.g. `doc,viz`
    #[clap(long)]
    pub extras_require: Option<String>,
    /// Extra packages to install in the install cell
    #[clap(long, value_delimiter = ',')]
    pub additional_packages: Vec<String>,
    /// Do not add the hidden configuration cell
    #[clap(long)]
    pub no_config_cell: bool,
    /// Do not add the autolink-concat cell
    #[clap(long)]
    pub no_autolink_concat: bool,
    /// Package to install; read from pyproject.toml when omitted
    #[clap(long)]
    pub package_name: Option<String>,
}

/// Layers flags over the optional config file and fills in what can be
/// detected from the repository.
pub fn build_profile(args: &ProfileArgs, file: ProfileFile, root: &Path) -> ConventionProfile {
    let defaults = ConventionProfile::default();
    ConventionProfile {
        repo_name: args.repo_name.clone().or(file.repo_name),
        repo_title: args.repo_title.clone().or(file.repo_title),
        has_pypi: !args.no_pypi && file.has_pypi.unwrap_or(defaults.has_pypi),
        has_notebooks: !args.no_notebooks
            && file.has_notebooks.unwrap_or_else(|| contains_notebooks(root)),
        has_python: !args.no_python && file.has_python.unwrap_or_else(|| contains_python(root)),
        allow_labels: args.allow_labels || file.allow_labels.unwrap_or(defaults.allow_labels),
        dependabot: args.dependabot.or(file.dependabot),
        pytest_single_threaded: args.pytest_single_threaded
            || file.pytest_single_threaded.unwrap_or(defaults.pytest_single_threaded),
        has_editorconfig: root.join(".editorconfig").is_file(),
    }
}

fn contains_notebooks(root: &Path) -> bool {
    !driver::find_files(root, NOTEBOOKS).is_empty()
}

fn contains_python(root: &Path) -> bool {
    ["pyproject.toml", "setup.cfg", "setup.py"]
        .iter()
        .any(|name| root.join(name).is_file())
}

/// Validates the set-nb-cells flags and resolves the install cell content.
pub fn notebook_cells(args: &NotebookCellArgs, root: &Path) -> Result<NotebookCells> {
    if !args.add_install_cell {
        if args.extras_require.is_some() {
            return Err(ConfigurationError("--extras-require requires --add-install-cell".into()).into());
        }
        if !args.additional_packages.is_empty() {
            return Err(
                ConfigurationError("--additional-packages requires --add-install-cell".into()).into(),
            );
        }
    }
    let install_cell = if args.add_install_cell {
        let package_name = match &args.package_name {
            Some(name) => name.clone(),
            None => package_name_from_pyproject(root)?,
        };
        Some(NotebookCells::install_statement(
            &package_name,
            args.extras_require.as_deref(),
            &args.additional_packages,
        ))
    } else {
        None
    };
    Ok(NotebookCells {
        install_cell,
        config_cell: !args.no_config_cell,
        autolink_concat: !args.no_autolink_concat,
    })
}

fn package_name_from_pyproject(root: &Path) -> Result<String> {
    let missing = || {
        ConfigurationError(
            "--add-install-cell needs a package name: pass --package-name or set project.name in pyproject.toml"
                .into(),
        )
    };
    let path = root.join("pyproject.toml");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Err(missing().into());
    };
    let pyproject = document::parse(&text, Format::Toml, &path)?;
    pyproject
        .root()
        .get_path(&["project", "name"])
        .and_then(Node::as_str)
        .map(str::to_owned)
        .ok_or_else(|| missing().into())
}

/// Loads `.pre-commit-hooks.yaml` and checks the local hooks against it.
fn self_check(root: &Path, files: &[PathBuf]) -> Result<RunOutcome> {
    let path = root.join(PRECOMMIT_HOOKS);
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read hook definitions {}", path.display()))?;
    let parsed = document::parse(&text, Format::Yaml, &path)?;
    match HookDefinitions::from_node(parsed.root()) {
        Ok(definitions) => {
            tracing::info!(count = definitions.len(), "Loaded hook definitions");
            Ok(driver::run(root, files, &self_check_entries(definitions)))
        }
        Err(TransformError::Violation(message)) => {
            let mut outcome = RunOutcome::new();
            outcome.push(FileOutcome::new(
                &path,
                FileStatus::Violation {
                    changes: Vec::new(),
                    messages: vec![message],
                },
            ));
            Ok(outcome)
        }
        Err(source) => {
            let mut outcome = RunOutcome::new();
            let error = HookError::Transform {
                path: path.clone(),
                source,
            };
            outcome.push(FileOutcome::new(&path, FileStatus::Failed(error)));
            Ok(outcome)
        }
    }
}

/// CLI logic entrypoint for integration tests and the binaries.
///
/// Errors returned here are configuration errors: no file has been touched.
pub fn run(cli: Cli) -> Result<RunOutcome> {
    tracing::info!("trace_initialised");
    let hook = cli.command.hook();
    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProfileFile::default(),
    };
    let files = cli.command.files();
    let root = files.root.as_path();

    if hook == HookId::SelfCheck {
        return self_check(root, &files.filenames);
    }

    let profile = match &cli.command {
        Commands::CheckDevFiles { profile, .. } => build_profile(profile, file, root),
        _ => build_profile(&ProfileArgs::default(), file, root),
    };
    profile.trace_loaded();

    let options = match &cli.command {
        Commands::SetNbCells { cells, .. } => HookOptions {
            notebook_cells: notebook_cells(cells, root)?,
        },
        _ => HookOptions::default(),
    };
    let entries = profile_for(hook, &profile, &options)?;
    tracing::info!(hook = %hook, entries = entries.len(), "Running hook");
    Ok(driver::run(root, &files.filenames, &entries))
}

/// Arguments for [`Cli`] when started through a hook-specific binary: the
/// hook id is inserted as the subcommand.
pub fn hook_args<I>(hook: Option<HookId>, args: I) -> Vec<std::ffi::OsString>
where
    I: IntoIterator<Item = std::ffi::OsString>,
{
    let mut args = args.into_iter();
    let mut result: Vec<std::ffi::OsString> = args.next().into_iter().collect();
    if let Some(hook) = hook {
        result.push(hook.as_str().into());
    }
    result.extend(args);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_binaries_insert_their_subcommand() {
        let args = hook_args(
            Some(HookId::SetNbCells),
            ["set-nb-cells", "--add-install-cell", "a.ipynb"].map(std::ffi::OsString::from),
        );
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(cli.command.hook(), HookId::SetNbCells);
    }

    #[test]
    fn flags_win_over_the_config_file() {
        let args = ProfileArgs {
            repo_name: Some("from-flag".into()),
            no_notebooks: true,
            ..Default::default()
        };
        let file = ProfileFile {
            repo_name: Some("from-file".into()),
            has_notebooks: Some(true),
            allow_labels: Some(true),
            ..Default::default()
        };
        let profile = build_profile(&args, file, Path::new("/nonexistent"));
        assert_eq!(profile.repo_name.as_deref(), Some("from-flag"));
        assert!(!profile.has_notebooks);
        assert!(profile.allow_labels);
        assert!(!profile.has_python);
    }

    #[test]
    fn extras_without_install_cell_is_rejected() {
        let args = NotebookCellArgs {
            extras_require: Some("doc".into()),
            ..Default::default()
        };
        let err = notebook_cells(&args, Path::new(".")).unwrap_err();
        assert!(err.downcast_ref::<ConfigurationError>().is_some());
    }

    #[test]
    fn registry_hook_ids_match_subcommands() {
        for hook in HookId::ALL {
            let cli = Cli::try_parse_from(["repo-policy", hook.as_str(), "--root", "."]);
            assert_eq!(cli.map(|cli| cli.command.hook()).ok(), Some(hook));
        }
    }
}
