//! Structural transforms: edits and checks that cannot be phrased as "the
//! document must contain this fragment".
//!
//! Each variant works on a parsed tree and reports what it changed. Checks
//! never modify the tree; they fail with [`TransformError::Violation`] instead.
//! Every transform is idempotent: applying it to its own output reports no
//! changes.

use regex::Regex;
use tracing::debug;

use crate::document::{to_yaml_string, Mapping, Node, Scalar};
use crate::error::TransformError;
use crate::merge::{self, Change, Identity};

/// MIME types that must not be stored as notebook cell output.
pub const BINARY_CELL_OUTPUT: [&str; 3] = ["image/jpeg", "image/png", "image/svg+xml"];

const PIP_INSTALL_STATEMENT: &str = "%pip install -q ";
const SKIP_CELLS_MARKER: &str = "<!-- no-set-nb-cells -->";
const SKIP_AUTOLINK_MARKER: &str = "<!-- no autolink-concat -->";
const AUTOLINK_CONCAT_CELL: &str = "```{autolink-concat}\n```";
const CONFIG_CELL: &str =
    "import os\n\nSTATIC_WEB_PAGE = {\"EXECUTE_NB\", \"READTHEDOCS\"}.intersection(os.environ)";

#[derive(Debug, Clone, PartialEq)]
pub enum StructuralTransform {
    /// Deletes pre-commit hooks by id; repos this empties are dropped.
    RemoveHooks(Vec<String>),
    SetNbformatMinor(i64),
    StripCellIds,
    /// Check: no cell output may carry one of [`BINARY_CELL_OUTPUT`].
    RejectBinaryOutputs,
    /// Drops empty `tags` from cell metadata and deduplicates the rest.
    RemoveEmptyTags,
    SetNotebookCells(NotebookCells),
    /// Check: the `%pip install -q` cell pins sorted requirements and is hidden.
    CheckPinnedRequirements,
    /// Splits a string `addopts` into a list, requires the given options and
    /// drops conflicting `--color=` values.
    PytestAddopts(Vec<String>),
    FormatSetupCfg,
    /// Check: local pre-commit hooks match their published definitions.
    CheckLocalHooks(HookDefinitions),
    /// Check: the file must not exist at all.
    Forbid(String),
    /// Deletes `key` from the mapping found at `path`, if both exist.
    RemoveKey { path: Vec<String>, key: String },
    /// Deletes the given strings from the list stored under a top-level key.
    RemoveValues { key: String, values: Vec<String> },
}

/// Standard cells kept at the top of every notebook.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotebookCells {
    /// Content of the `%pip install` cell, if one is wanted.
    pub install_cell: Option<String>,
    pub config_cell: bool,
    pub autolink_concat: bool,
}

impl NotebookCells {
    /// Builds the install cell content for `package_name`.
    pub fn install_statement(
        package_name: &str,
        extras_require: Option<&str>,
        additional_packages: &[String],
    ) -> String {
        let mut content = format!(
            "# WARNING: advised to install a specific version, e.g. {package_name}==0.1.2\n\
             %pip install -q {package_name}"
        );
        if let Some(extras) = extras_require.map(str::trim).filter(|e| !e.is_empty()) {
            content.push_str(&format!("[{extras}]"));
        }
        for package in additional_packages {
            content.push(' ');
            content.push_str(package.trim());
        }
        content
    }
}

/// Published hook definitions, keyed by hook id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookDefinitions {
    definitions: Vec<Mapping>,
}

impl HookDefinitions {
    /// Reads the list stored in a `.pre-commit-hooks.yaml` file.
    pub fn from_node(node: &Node) -> Result<Self, TransformError> {
        let items = node
            .as_sequence()
            .ok_or_else(|| TransformError::Malformed("hook definitions must be a list".into()))?;
        let mut definitions: Vec<Mapping> = Vec::with_capacity(items.len());
        for item in items {
            let definition = item
                .as_mapping()
                .ok_or_else(|| TransformError::Malformed("hook definition must be a mapping".into()))?;
            let id = definition
                .get("id")
                .and_then(Node::as_str)
                .ok_or_else(|| TransformError::Malformed("hook definition without an id".into()))?;
            if definitions.iter().any(|d| d.get("id").and_then(Node::as_str) == Some(id)) {
                return Err(TransformError::Violation(format!(
                    "hook definitions contain duplicate id `{id}`"
                )));
            }
            definitions.push(definition.clone());
        }
        Ok(Self { definitions })
    }

    pub fn get(&self, id: &str) -> Option<&Mapping> {
        self.definitions
            .iter()
            .find(|d| d.get("id").and_then(Node::as_str) == Some(id))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl StructuralTransform {
    pub fn name(&self) -> &'static str {
        match self {
            StructuralTransform::RemoveHooks(_) => "remove-hooks",
            StructuralTransform::SetNbformatMinor(_) => "set-nbformat-minor",
            StructuralTransform::StripCellIds => "strip-cell-ids",
            StructuralTransform::RejectBinaryOutputs => "reject-binary-outputs",
            StructuralTransform::RemoveEmptyTags => "remove-empty-tags",
            StructuralTransform::SetNotebookCells(_) => "set-notebook-cells",
            StructuralTransform::CheckPinnedRequirements => "check-pinned-requirements",
            StructuralTransform::PytestAddopts(_) => "pytest-addopts",
            StructuralTransform::FormatSetupCfg => "format-setup-cfg",
            StructuralTransform::CheckLocalHooks(_) => "check-local-hooks",
            StructuralTransform::Forbid(_) => "forbid",
            StructuralTransform::RemoveKey { .. } => "remove-key",
            StructuralTransform::RemoveValues { .. } => "remove-values",
        }
    }

    pub fn apply(&self, root: &mut Node) -> Result<Vec<Change>, TransformError> {
        debug!(transform = self.name(), "Applying structural transform");
        match self {
            StructuralTransform::RemoveHooks(ids) => Ok(remove_hooks(root, ids)),
            StructuralTransform::SetNbformatMinor(minor) => set_nbformat_minor(root, *minor),
            StructuralTransform::StripCellIds => strip_cell_ids(root),
            StructuralTransform::RejectBinaryOutputs => reject_binary_outputs(root),
            StructuralTransform::RemoveEmptyTags => remove_empty_tags(root),
            StructuralTransform::SetNotebookCells(cells) => set_notebook_cells(root, cells),
            StructuralTransform::CheckPinnedRequirements => check_pinned_requirements(root),
            StructuralTransform::PytestAddopts(required) => Ok(pytest_addopts(root, required)),
            StructuralTransform::FormatSetupCfg => format_setup_cfg(root),
            StructuralTransform::CheckLocalHooks(definitions) => {
                check_local_hooks(root, definitions)
            }
            StructuralTransform::Forbid(reason) => Err(TransformError::Violation(reason.clone())),
            StructuralTransform::RemoveKey { path, key } => Ok(remove_key_at(root, path, key)),
            StructuralTransform::RemoveValues { key, values } => Ok(remove_values(root, key, values)),
        }
    }
}

fn remove_hooks(root: &mut Node, ids: &[String]) -> Vec<Change> {
    let mut changes = Vec::new();
    let Some(repos) = root.get_mut("repos").and_then(Node::as_sequence_mut) else {
        return changes;
    };
    let hook_identity = Identity::Key("id".to_owned());
    // Only repos emptied here are dropped; an already empty `hooks` list stays.
    let mut emptied = vec![false; repos.len()];
    for (index, repo) in repos.iter_mut().enumerate() {
        let url = repo.get("repo").and_then(Node::as_str).unwrap_or("?").to_owned();
        if let Some(hooks) = repo.get_mut("hooks").and_then(Node::as_sequence_mut) {
            let before = hooks.len();
            for id in ids {
                let path = format!("repos[{url}].hooks");
                changes.extend(merge::remove_elements(hooks, &hook_identity, &Node::from(id.as_str()), &path));
            }
            emptied[index] = before > 0 && hooks.is_empty();
        }
    }
    let mut emptied = emptied.into_iter();
    repos.retain(|repo| {
        let drop = emptied.next().unwrap_or(false);
        if drop {
            let url = repo.get("repo").and_then(Node::as_str).unwrap_or("?");
            changes.push(Change::Removed(format!("repos[{url}]")));
        }
        !drop
    });
    changes
}

fn remove_key_at(root: &mut Node, path: &[String], key: &str) -> Vec<Change> {
    let keys: Vec<&str> = path.iter().map(String::as_str).collect();
    let Some(mapping) = root.get_path_mut(&keys).and_then(Node::as_mapping_mut) else {
        return Vec::new();
    };
    merge::remove_key(mapping, key, &path.join(".")).into_iter().collect()
}

fn remove_values(root: &mut Node, key: &str, values: &[String]) -> Vec<Change> {
    let Some(items) = root.get_mut(key).and_then(Node::as_sequence_mut) else {
        return Vec::new();
    };
    let mut changes = Vec::new();
    for value in values {
        changes.extend(merge::remove_elements(items, &Identity::Value, &Node::from(value.as_str()), key));
    }
    changes
}

fn cells_mut(root: &mut Node) -> Result<&mut Vec<Node>, TransformError> {
    root.get_mut("cells")
        .and_then(Node::as_sequence_mut)
        .ok_or_else(|| TransformError::Malformed("notebook has no `cells` list".into()))
}

fn cells(root: &Node) -> Result<&Vec<Node>, TransformError> {
    root.get("cells")
        .and_then(Node::as_sequence)
        .ok_or_else(|| TransformError::Malformed("notebook has no `cells` list".into()))
}

fn cell_type(cell: &Node) -> Option<&str> {
    cell.get("cell_type").and_then(Node::as_str)
}

fn cell_source(cell: &Node) -> String {
    cell.get("source").and_then(Node::joined_text).unwrap_or_default()
}

fn set_nbformat_minor(root: &mut Node, minor: i64) -> Result<Vec<Change>, TransformError> {
    let notebook = root
        .as_mapping_mut()
        .ok_or_else(|| TransformError::Malformed("notebook root must be a mapping".into()))?;
    if notebook.get("nbformat_minor").and_then(Node::as_i64) == Some(minor) {
        return Ok(Vec::new());
    }
    notebook.insert("nbformat_minor", Node::from(minor));
    Ok(vec![Change::Updated(format!("nbformat_minor to {minor}"))])
}

fn strip_cell_ids(root: &mut Node) -> Result<Vec<Change>, TransformError> {
    let mut changes = Vec::new();
    for (index, cell) in cells_mut(root)?.iter_mut().enumerate() {
        if let Some(cell) = cell.as_mapping_mut() {
            changes.extend(merge::remove_key(cell, "id", &format!("cells[{index}]")));
        }
    }
    Ok(changes)
}

fn reject_binary_outputs(root: &mut Node) -> Result<Vec<Change>, TransformError> {
    for (index, cell) in cells(root)?.iter().enumerate() {
        let outputs = cell.get("outputs").and_then(Node::as_sequence);
        for output in outputs.into_iter().flatten() {
            let Some(data) = output.get("data").and_then(Node::as_mapping) else {
                continue;
            };
            if let Some(mime) = BINARY_CELL_OUTPUT.iter().find(|mime| data.contains_key(mime)) {
                return Err(TransformError::Violation(format!(
                    "cell {index} contains {mime} output; store it outside the repository and \
                     render it through an external link"
                )));
            }
        }
    }
    Ok(Vec::new())
}

fn remove_empty_tags(root: &mut Node) -> Result<Vec<Change>, TransformError> {
    let mut changes = Vec::new();
    for (index, cell) in cells_mut(root)?.iter_mut().enumerate() {
        let Some(metadata) = cell.get_mut("metadata").and_then(Node::as_mapping_mut) else {
            continue;
        };
        let path = format!("cells[{index}].metadata");
        if metadata
            .get("tags")
            .and_then(Node::as_sequence)
            .is_some_and(Vec::is_empty)
        {
            changes.extend(merge::remove_key(metadata, "tags", &path));
            continue;
        }
        match metadata.get_mut("tags") {
            Some(Node::Sequence(tags)) => {
                let before = tags.len();
                let mut seen: Vec<Node> = Vec::with_capacity(before);
                tags.retain(|tag| {
                    if seen.contains(tag) {
                        return false;
                    }
                    seen.push(tag.clone());
                    true
                });
                if tags.len() < before {
                    changes.push(Change::Removed(format!("{path}.tags duplicates")));
                }
            }
            _ => {}
        }
    }
    Ok(changes)
}

/// The two markers are independent: `<!-- no-set-nb-cells -->` only protects
/// the code cells, `<!-- no autolink-concat -->` only the autolink cell.
fn set_notebook_cells(root: &mut Node, options: &NotebookCells) -> Result<Vec<Change>, TransformError> {
    let mut changes = Vec::new();
    if !contains_marker(cells(root)?, SKIP_CELLS_MARKER) {
        let mut index = 0;
        if let Some(content) = &options.install_cell {
            let metadata = hidden_cell_metadata(&["remove-cell", "skip-execution"]);
            changes.extend(update_code_cell(root, index, content, metadata, "%pip install")?);
            index += 1;
        }
        if options.config_cell {
            let metadata = hidden_cell_metadata(&["remove-cell"]);
            changes.extend(update_code_cell(root, index, CONFIG_CELL, metadata, "STATIC_WEB_PAGE")?);
        }
    }
    if options.autolink_concat && !contains_marker(cells(root)?, SKIP_AUTOLINK_MARKER) {
        changes.extend(insert_autolink_concat(cells_mut(root)?));
    }
    Ok(changes)
}

fn contains_marker(cells: &[Node], marker: &str) -> bool {
    cells
        .iter()
        .filter(|cell| cell_type(cell) == Some("markdown"))
        .any(|cell| cell_source(cell).to_lowercase().contains(marker))
}

fn hidden_cell_metadata(tags: &[&str]) -> Mapping {
    Mapping::from([
        ("hideCode", Node::from(true)),
        ("hideOutput", Node::from(true)),
        ("hidePrompt", Node::from(true)),
        ("jupyter", Node::Mapping(Mapping::from([("source_hidden", Node::from(true))]))),
        ("tags", Node::from(tags.to_vec())),
    ])
}

/// Splits text into lines that keep their line endings, as notebooks store them.
fn source_lines(content: &str) -> Node {
    Node::from(content.split_inclusive('\n').map(str::to_owned).collect::<Vec<_>>())
}

fn new_code_cell(content: &str, metadata: Mapping) -> Node {
    Node::Mapping(Mapping::from([
        ("cell_type", Node::from("code")),
        ("execution_count", Node::null()),
        ("metadata", Node::Mapping(metadata)),
        ("outputs", Node::Sequence(Vec::new())),
        ("source", source_lines(content)),
    ]))
}

/// Keeps a managed code cell at `index`. A code cell already there that
/// contains `marker` is the managed cell and is rewritten when it differs;
/// anything else stays and the managed cell is inserted in front of it.
fn update_code_cell(
    root: &mut Node,
    index: usize,
    content: &str,
    metadata: Mapping,
    marker: &str,
) -> Result<Vec<Change>, TransformError> {
    let cells = cells_mut(root)?;
    let path = format!("cells[{index}]");
    if let Some(existing) = cells.get_mut(index) {
        let source = cell_source(existing);
        if cell_type(existing) == Some("code") && source.contains(marker) {
            let current_metadata = existing.get("metadata").and_then(Node::as_mapping);
            if source == content && current_metadata.is_some_and(|m| m.same_entries(&metadata)) {
                return Ok(Vec::new());
            }
            *existing = new_code_cell(content, metadata);
            return Ok(vec![Change::Updated(path)]);
        }
    }
    let index = index.min(cells.len());
    cells.insert(index, new_code_cell(content, metadata));
    Ok(vec![Change::Added(path)])
}

fn insert_autolink_concat(cells: &mut Vec<Node>) -> Vec<Change> {
    let Some(index) = cells.iter().position(|cell| cell_type(cell) == Some("markdown")) else {
        return Vec::new();
    };
    if cell_source(&cells[index]) == AUTOLINK_CONCAT_CELL {
        return Vec::new();
    }
    let cell = Node::Mapping(Mapping::from([
        ("cell_type", Node::from("markdown")),
        ("metadata", Node::Mapping(Mapping::new())),
        ("source", source_lines(AUTOLINK_CONCAT_CELL)),
    ]));
    cells.insert(index, cell);
    vec![Change::Added(format!("cells[{index}] autolink-concat"))]
}

fn check_pinned_requirements(root: &mut Node) -> Result<Vec<Change>, TransformError> {
    for cell in cells(root)? {
        if cell_type(cell) != Some("code") {
            continue;
        }
        let source = cell_source(cell);
        let statement: String = source.split('\n').map(|line| line.trim_matches('\\')).collect();
        if !statement.starts_with(PIP_INSTALL_STATEMENT) {
            continue;
        }
        check_install_statement(&statement)?;
        check_cell_is_hidden(cell.get("metadata"))?;
        return Ok(Vec::new());
    }
    Err(TransformError::Violation(format!(
        "notebook does not contain a pip install cell of the form \
         {PIP_INSTALL_STATEMENT}some-package==0.1.0 package2==3.2"
    )))
}

fn check_install_statement(statement: &str) -> Result<(), TransformError> {
    if statement.trim_end().ends_with("/dev/null") {
        return Err(TransformError::Violation(
            "remove the /dev/null from the pip install statement".into(),
        ));
    }
    let listing = statement.strip_prefix(PIP_INSTALL_STATEMENT).unwrap_or(statement);
    let requirements: Vec<&str> = listing.split(' ').map(str::trim).filter(|r| !r.is_empty()).collect();
    if requirements.is_empty() {
        return Err(TransformError::Violation(
            "at least one dependency required in the install cell".into(),
        ));
    }
    if let Some(unpinned) = requirements
        .iter()
        .find(|r| !r.contains("git+") && !r.contains("=="))
    {
        return Err(TransformError::Violation(format!(
            "install cell contains a requirement without == ({unpinned})"
        )));
    }
    let pinned: Vec<String> = requirements
        .iter()
        .filter(|r| !r.starts_with("git+"))
        .map(|r| r.to_lowercase())
        .collect();
    let mut sorted = pinned.clone();
    sorted.sort();
    if sorted != pinned {
        let mut expected = requirements.clone();
        expected.sort_by_key(|r| r.to_lowercase());
        return Err(TransformError::Violation(format!(
            "requirements in the install cell are not sorted alphabetically; should be:\n\n    {}",
            expected.join(" ")
        )));
    }
    Ok(())
}

fn check_cell_is_hidden(metadata: Option<&Node>) -> Result<(), TransformError> {
    let hidden = metadata
        .and_then(|m| m.get_path(&["jupyter", "source_hidden"]))
        .and_then(Node::as_bool)
        .unwrap_or(false);
    if !hidden {
        return Err(TransformError::Violation("install cell is not hidden".into()));
    }
    let tagged = metadata
        .and_then(|m| m.get("tags"))
        .and_then(Node::as_sequence)
        .is_some_and(|tags| tags.iter().any(|t| t.as_str() == Some("remove-cell")));
    if !tagged {
        return Err(TransformError::Violation(
            "install cell should have the tag \"remove-cell\"".into(),
        ));
    }
    Ok(())
}

fn pytest_addopts(root: &mut Node, required: &[String]) -> Vec<Change> {
    let Some(options) = root.get_path_mut(&["tool", "pytest", "ini_options"]).and_then(Node::as_mapping_mut) else {
        return Vec::new();
    };
    let current: Vec<String> = match options.get("addopts") {
        Some(Node::Scalar(Scalar::String(text))) => split_options(text),
        Some(Node::Sequence(items)) => items.iter().filter_map(Node::as_str).map(str::to_owned).collect(),
        _ => Vec::new(),
    };
    let mut expected: Vec<String> = current
        .iter()
        .filter(|opt| !opt.starts_with("--color=") || required.contains(opt))
        .cloned()
        .collect();
    for option in required {
        if !expected.contains(option) {
            expected.push(option.clone());
        }
    }
    let expected = Node::from(expected);
    if options.get("addopts") == Some(&expected) {
        return Vec::new();
    }
    options.insert("addopts", expected);
    vec![Change::Updated("tool.pytest.ini_options.addopts".to_owned())]
}

/// Splits a command line into options, attaching values to their flag:
/// `-abc def -ghi "j k l"` becomes `["-abc def", "-ghi \"j k l\""]`.
fn split_options(arg: &str) -> Vec<String> {
    let mut options: Vec<String> = Vec::new();
    for element in arg.split_whitespace() {
        match options.last_mut() {
            Some(last) if !element.starts_with('-') => {
                last.push(' ');
                last.push_str(element);
            }
            _ => options.push(element.to_owned()),
        }
    }
    options
}

fn format_setup_cfg(root: &mut Node) -> Result<Vec<Change>, TransformError> {
    let content = root
        .as_str()
        .ok_or_else(|| TransformError::Malformed("expected a plain text document".into()))?;
    let formatted = format_cfg_text(content).map_err(|e| TransformError::Malformed(e.to_string()))?;
    if formatted == content {
        return Ok(Vec::new());
    }
    *root = Node::from(formatted);
    Ok(vec![Change::Updated("setup.cfg formatting".to_owned())])
}

fn format_cfg_text(content: &str) -> Result<String, regex::Error> {
    let rules: [(&str, &str); 6] = [
        (r"([^\s^\n])[^\S\r\n]+#\s*([^\s])", "${1}  # ${2}"),
        (r"[^\S\r\n]+\n", "\n"),
        (r"(>=?|<=?|==)\s+", "${1}"),
        (r"([^\s])(>=?|<=?)", "${1} ${2}"),
        (r"([^\s])\s\s+(>=?|<=?)", "${1} ${2}"),
        (r"\n{3,}", "\n\n"),
    ];
    let mut content = content.replace('\t', "    ");
    for (index, (pattern, replacement)) in rules.iter().enumerate() {
        content = Regex::new(pattern)?.replace_all(&content, *replacement).into_owned();
        if index == 1 {
            content = format!("{}\n", content.trim());
        }
    }
    Ok(content)
}

fn check_local_hooks(root: &mut Node, definitions: &HookDefinitions) -> Result<Vec<Change>, TransformError> {
    let repos = root.get("repos").and_then(Node::as_sequence);
    let local_hooks = repos
        .into_iter()
        .flatten()
        .filter(|repo| repo.get("repo").and_then(Node::as_str) == Some("local"))
        .filter_map(|repo| repo.get("hooks").and_then(Node::as_sequence))
        .flatten()
        .filter_map(Node::as_mapping);
    let mut mismatches = Vec::new();
    for hook in local_hooks {
        let Some(id) = hook.get("id").and_then(Node::as_str) else {
            continue;
        };
        let Some(expected) = definitions.get(id) else {
            continue;
        };
        let (hook, expected) = (without_args(hook), without_args(expected));
        if !hook.same_entries(&expected) {
            mismatches.push(format!(
                "local hook with ID '{id}' does not match its definition. Should be at least:\n\n{}",
                indent(&to_yaml_string(&Node::from(vec![Node::Mapping(expected)])), "  ")
            ));
        }
    }
    if mismatches.is_empty() {
        Ok(Vec::new())
    } else {
        Err(TransformError::Violation(mismatches.join("\n")))
    }
}

fn without_args(hook: &Mapping) -> Mapping {
    hook.iter()
        .filter(|(key, _)| *key != "args")
        .map(|(key, value)| (key, value.clone()))
        .collect()
}

fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{prefix}{line}\n"))
        .collect()
}
