//! Catalogue of the conventions each hook enforces.
//!
//! [`profile_for`] turns a hook id and a [`ConventionProfile`] into the list of
//! `{glob, transform}` entries the driver applies. Building entries is pure:
//! nothing here touches the file system.

use std::fmt;
use std::str::FromStr;

use crate::config::{ConventionProfile, Dependabot};
use crate::contract::{standard_labels, Label};
use crate::document::Node;
use crate::error::{ConfigurationError, TransformError};
use crate::merge::{self, Change, Desired, ElementSet, Fragment, Placement};
use crate::transform::{HookDefinitions, NotebookCells, StructuralTransform};

/// Repository that publishes these hooks.
pub const POLICY_REPO: &str = "https://github.com/ComPWA/policy";
/// `rev` written for pre-commit repos that are added from scratch.
pub const PLACEHOLDER_REV: &str = "PLEASE-UPDATE";

pub const PRECOMMIT_CONFIG: &str = ".pre-commit-config.yaml";
pub const PRECOMMIT_HOOKS: &str = ".pre-commit-hooks.yaml";
pub const NOTEBOOKS: &str = "**/*.ipynb";

const PRECOMMIT_HOOKS_REPO: &str = "https://github.com/pre-commit/pre-commit-hooks";
const RUFF_REPO: &str = "https://github.com/astral-sh/ruff-pre-commit";
const NBSTRIPOUT_REPO: &str = "https://github.com/kynan/nbstripout";
const EDITORCONFIG_REPO: &str = "https://github.com/editorconfig-checker/editorconfig-checker.python";

pub const RELEASE_DRAFTER: &str = ".github/release-drafter.yml";
pub const VSCODE_EXTENSIONS: &str = ".vscode/extensions.json";

const RECOMMENDED_EXTENSIONS: [&str; 4] = [
    "eamodio.gitlens",
    "mhutchie.git-graph",
    "soulcode.vscode-unwanted-extensions",
    "stkb.rewrap",
];
const UNWANTED_EXTENSIONS: [&str; 3] = [
    "garaioag.garaio-vscode-unwanted-recommendations",
    "travisillig.vscode-json-stable-stringify",
    "tyriar.sort-lines",
];

const NBSTRIPOUT_EXTRA_KEYS: [&str; 19] = [
    "cell.attachments",
    "cell.metadata.code_folding",
    "cell.metadata.editable",
    "cell.metadata.id",
    "cell.metadata.pycharm",
    "cell.metadata.slideshow",
    "cell.metadata.user_expressions",
    "metadata.celltoolbar",
    "metadata.colab.name",
    "metadata.colab.provenance",
    "metadata.interpreter",
    "metadata.notify_time",
    "metadata.toc",
    "metadata.toc-autonumbering",
    "metadata.toc-showcode",
    "metadata.toc-showmarkdowntxt",
    "metadata.toc-showtags",
    "metadata.varInspector",
    "metadata.vscode",
];

/// Every hook this crate provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookId {
    CheckDevFiles,
    ColabTocVisible,
    FixNbformatVersion,
    FormatSetupCfg,
    PinNbRequirements,
    RemoveEmptyTags,
    SelfCheck,
    SetNbCells,
}

impl HookId {
    pub const ALL: [HookId; 8] = [
        HookId::CheckDevFiles,
        HookId::ColabTocVisible,
        HookId::FixNbformatVersion,
        HookId::FormatSetupCfg,
        HookId::PinNbRequirements,
        HookId::RemoveEmptyTags,
        HookId::SelfCheck,
        HookId::SetNbCells,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookId::CheckDevFiles => "check-dev-files",
            HookId::ColabTocVisible => "colab-toc-visible",
            HookId::FixNbformatVersion => "fix-nbformat-version",
            HookId::FormatSetupCfg => "format-setup-cfg",
            HookId::PinNbRequirements => "pin-nb-requirements",
            HookId::RemoveEmptyTags => "remove-empty-tags",
            HookId::SelfCheck => "self-check",
            HookId::SetNbCells => "set-nb-cells",
        }
    }
}

impl fmt::Display for HookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookId {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookId::ALL
            .into_iter()
            .find(|hook| hook.as_str() == s)
            .ok_or_else(|| ConfigurationError(format!("unknown hook id `{s}`")))
    }
}

/// Either flavour of edit a registry entry can ask for.
#[derive(Debug, Clone, PartialEq)]
pub enum Transform {
    Merge(Fragment),
    Structural(StructuralTransform),
}

impl Transform {
    pub fn apply(&self, root: &mut Node) -> Result<Vec<Change>, TransformError> {
        match self {
            Transform::Merge(fragment) => Ok(merge::merge_in_place(root, fragment)?),
            Transform::Structural(transform) => transform.apply(root),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    /// Glob relative to the repository root selecting the files to touch.
    pub glob: String,
    pub transform: Transform,
}

impl RegistryEntry {
    pub fn merge(glob: &str, fragment: Fragment) -> Self {
        Self {
            glob: glob.to_owned(),
            transform: Transform::Merge(fragment),
        }
    }

    pub fn structural(glob: &str, transform: StructuralTransform) -> Self {
        Self {
            glob: glob.to_owned(),
            transform: Transform::Structural(transform),
        }
    }
}

/// Options of `set-nb-cells` that are not part of the repository profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOptions {
    pub notebook_cells: NotebookCells,
}

/// Entries that implement `hook` for a repository described by `profile`.
///
/// `self-check` needs the published hook definitions; build its entries with
/// [`self_check_entries`].
pub fn profile_for(
    hook: HookId,
    profile: &ConventionProfile,
    options: &HookOptions,
) -> Result<Vec<RegistryEntry>, ConfigurationError> {
    profile.validate()?;
    let entries = match hook {
        HookId::CheckDevFiles => check_dev_files(profile)?,
        HookId::ColabTocVisible => vec![RegistryEntry::merge(NOTEBOOKS, colab_toc_visible())],
        HookId::FixNbformatVersion => vec![
            RegistryEntry::structural(NOTEBOOKS, StructuralTransform::SetNbformatMinor(4)),
            RegistryEntry::structural(NOTEBOOKS, StructuralTransform::StripCellIds),
            RegistryEntry::structural(NOTEBOOKS, StructuralTransform::RejectBinaryOutputs),
        ],
        HookId::FormatSetupCfg => vec![RegistryEntry::structural(
            "setup.cfg",
            StructuralTransform::FormatSetupCfg,
        )],
        HookId::PinNbRequirements => vec![RegistryEntry::structural(
            NOTEBOOKS,
            StructuralTransform::CheckPinnedRequirements,
        )],
        HookId::RemoveEmptyTags => vec![RegistryEntry::structural(
            NOTEBOOKS,
            StructuralTransform::RemoveEmptyTags,
        )],
        HookId::SetNbCells => vec![RegistryEntry::structural(
            NOTEBOOKS,
            StructuralTransform::SetNotebookCells(options.notebook_cells.clone()),
        )],
        HookId::SelfCheck => {
            return Err(ConfigurationError(
                "self-check entries are built from the published hook definitions".into(),
            ))
        }
    };
    Ok(entries)
}

pub fn self_check_entries(definitions: HookDefinitions) -> Vec<RegistryEntry> {
    vec![RegistryEntry::structural(
        PRECOMMIT_CONFIG,
        StructuralTransform::CheckLocalHooks(definitions),
    )]
}

fn colab_toc_visible() -> Fragment {
    Fragment::new().with(
        "metadata",
        Fragment::new().with("colab", Fragment::new().with("toc_visible", Node::from(true))),
    )
}

fn check_dev_files(profile: &ConventionProfile) -> Result<Vec<RegistryEntry>, ConfigurationError> {
    let repo_name = profile.require_repo_name()?;
    let title = profile.title().unwrap_or(repo_name);
    let mut entries = vec![
        RegistryEntry::merge(PRECOMMIT_CONFIG, precommit_fragment(profile)),
        RegistryEntry::structural(
            PRECOMMIT_CONFIG,
            StructuralTransform::RemoveHooks(deprecated_hooks(profile)),
        ),
        RegistryEntry::merge(RELEASE_DRAFTER, release_drafter_fragment(title)),
        RegistryEntry::merge(VSCODE_EXTENSIONS, vscode_extensions_fragment()),
        RegistryEntry::structural(
            VSCODE_EXTENSIONS,
            StructuralTransform::RemoveValues {
                key: "recommendations".into(),
                values: UNWANTED_EXTENSIONS.iter().map(|id| id.to_string()).collect(),
            },
        ),
    ];
    if !profile.has_pypi {
        entries.push(RegistryEntry::structural(
            "pyproject.toml",
            StructuralTransform::RemoveKey {
                path: vec!["project".into()],
                key: "classifiers".into(),
            },
        ));
    }
    if profile.has_python {
        let mut addopts = vec!["--color=yes".to_owned()];
        if !profile.pytest_single_threaded {
            addopts.push("-n=auto".to_owned());
        }
        entries.push(RegistryEntry::structural(
            "pyproject.toml",
            StructuralTransform::PytestAddopts(addopts),
        ));
    }
    if profile.allow_labels {
        entries.push(RegistryEntry::merge("labels.toml", labels_fragment(&standard_labels())));
    }
    match profile.dependabot {
        Some(Dependabot::Update) => {
            entries.push(RegistryEntry::merge(".github/dependabot.yml", dependabot_fragment()))
        }
        Some(Dependabot::Disabled) => entries.push(RegistryEntry::structural(
            ".github/dependabot.yml",
            StructuralTransform::Forbid(
                "dependabot is disabled for this repository; remove .github/dependabot.yml".into(),
            ),
        )),
        None => {}
    }
    Ok(entries)
}

/// Arguments that reproduce `profile` when `check-dev-files` runs as a hook.
pub fn check_dev_files_args(profile: &ConventionProfile) -> Vec<String> {
    let mut args = Vec::new();
    if let Some(name) = &profile.repo_name {
        args.push(format!("--repo-name={name}"));
    }
    if let Some(title) = &profile.repo_title {
        args.push(format!("--repo-title={title}"));
    }
    if profile.allow_labels {
        args.push("--allow-labels".to_owned());
    }
    match profile.dependabot {
        Some(Dependabot::Update) => args.push("--dependabot=update".to_owned()),
        Some(Dependabot::Disabled) => args.push("--dependabot=disabled".to_owned()),
        None => {}
    }
    if !profile.has_notebooks {
        args.push("--no-notebooks".to_owned());
    }
    if !profile.has_pypi {
        args.push("--no-pypi".to_owned());
    }
    if !profile.has_python {
        args.push("--no-python".to_owned());
    }
    if profile.pytest_single_threaded {
        args.push("--pytest-single-threaded".to_owned());
    }
    args
}

fn hook(id: &str) -> Fragment {
    Fragment::new().with("id", Node::from(id))
}

fn repo(url: &str, hooks: ElementSet) -> Fragment {
    Fragment::new()
        .with("repo", Node::from(url))
        .with_placed("rev", Desired::if_absent(PLACEHOLDER_REV), Placement::After("repo".into()))
        .with("hooks", hooks)
}

fn precommit_fragment(profile: &ConventionProfile) -> Fragment {
    let mut repos = ElementSet::keyed("repo").with(repo(
        PRECOMMIT_HOOKS_REPO,
        ElementSet::keyed("id")
            .with(hook("check-yaml"))
            .with(hook("end-of-file-fixer"))
            .with(hook("trailing-whitespace")),
    ));
    if profile.has_python {
        let ruff = |id: &str| {
            let mut entry = hook(id);
            if id == "ruff" {
                entry = entry.with("args", Node::from(vec!["--fix"]));
            }
            if profile.has_notebooks {
                entry = entry.with("types_or", Node::from(vec!["python", "pyi", "jupyter"]));
            }
            entry
        };
        repos = repos.with(repo(
            RUFF_REPO,
            ElementSet::keyed("id").with(ruff("ruff")).with(ruff("ruff-format")),
        ));
    }
    if profile.has_notebooks {
        let extra_keys = NBSTRIPOUT_EXTRA_KEYS.join("\n") + "\n";
        let nbstripout = hook("nbstripout").with(
            "args",
            Node::from(vec!["--drop-empty-cells".to_owned(), "--extra-keys".to_owned(), extra_keys]),
        );
        repos = repos.with(repo(NBSTRIPOUT_REPO, ElementSet::keyed("id").with(nbstripout)));
    }
    if profile.has_editorconfig {
        let mut editorconfig = hook("editorconfig-checker")
            .with("name", Node::from("editorconfig"))
            .with("alias", Node::from("ec"));
        if profile.has_python {
            editorconfig = editorconfig.with("exclude", Node::from("(?x)^(\n  .*\\.py\n)$"));
        }
        repos = repos.with(repo(EDITORCONFIG_REPO, ElementSet::keyed("id").with(editorconfig)));
    }
    let mut policy_hooks = ElementSet::keyed("id").with(
        hook("check-dev-files").with("args", Node::from(check_dev_files_args(profile))),
    );
    if profile.has_notebooks {
        for id in ["colab-toc-visible", "fix-nbformat-version", "remove-empty-tags", "set-nb-cells"] {
            policy_hooks = policy_hooks.with(hook(id));
        }
    }
    repos = repos.with(repo(POLICY_REPO, policy_hooks));

    let ci = Fragment::new()
        .with("autoupdate_commit_msg", Node::from("MAINT: autoupdate pre-commit hooks"))
        .with("autoupdate_schedule", Node::from("quarterly"));
    Fragment::new()
        .with("repos", repos)
        .with_placed("ci", ci, Placement::Before("repos".into()))
}

fn deprecated_hooks(profile: &ConventionProfile) -> Vec<String> {
    let mut ids = vec!["markdownlint"];
    if profile.has_python {
        ids.extend(["black", "isort", "flake8", "pyupgrade"]);
    }
    if !profile.has_notebooks {
        ids.push("nbstripout");
    }
    ids.into_iter().map(str::to_owned).collect()
}

/// Required `labels` table of a `labels.toml` file. Existing labels keep
/// their colour and description.
pub fn labels_fragment(labels: &[Label]) -> Fragment {
    let elements = labels.iter().fold(ElementSet::keyed("name"), |set, label| {
        set.with(
            Fragment::new()
                .with("name", Node::from(label.name.as_str()))
                .with("color", Desired::if_absent(label.color.as_str()))
                .with("description", Desired::if_absent(label.description.as_str())),
        )
    });
    Fragment::new().with("labels", elements)
}

/// Release names carry the repository title; the rest of the draft
/// configuration is left to the repository.
fn release_drafter_fragment(title: &str) -> Fragment {
    Fragment::new()
        .with("name-template", Node::from(format!("{title} $RESOLVED_VERSION")))
        .with("tag-template", Desired::if_absent("$RESOLVED_VERSION"))
}

fn vscode_extensions_fragment() -> Fragment {
    let values = |ids: &[&str]| {
        ids.iter()
            .fold(ElementSet::values(), |set, id| set.with(Node::from(*id)))
    };
    Fragment::new()
        .with("recommendations", values(&RECOMMENDED_EXTENSIONS[..]))
        .with("unwantedRecommendations", values(&UNWANTED_EXTENSIONS[..]))
}

fn dependabot_fragment() -> Fragment {
    let github_actions = Fragment::new()
        .with("package-ecosystem", Node::from("github-actions"))
        .with("directory", Desired::if_absent("/"))
        .with(
            "schedule",
            Fragment::new().with("interval", Desired::if_absent("monthly")),
        );
    Fragment::new()
        .with("version", Node::from(2_i64))
        .with("updates", ElementSet::keyed("package-ecosystem").with(github_actions))
}
