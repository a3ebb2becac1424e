//! Document model adapter: one tree shape for YAML, TOML, JSON, notebooks and
//! plain text.
//!
//! A [`Document`] remembers the text it was parsed from. As long as its tree
//! has not been modified, [`serialize`] hands back that text untouched, so a
//! hook that decides nothing needs to change never rewrites a file. Modified
//! documents are re-emitted by the format's writer: key order survives, YAML
//! and TOML comments do not.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{FormatError, Location};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Yaml,
    Toml,
    Json,
    /// Jupyter notebook JSON: one-space indent, sorted keys, trailing newline.
    Notebook,
    Text,
}

impl Format {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            Some("toml") => Format::Toml,
            Some("json") => Format::Json,
            Some("ipynb") => Format::Notebook,
            _ => Format::Text,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Format::Yaml => "YAML",
            Format::Toml => "TOML",
            Format::Json => "JSON",
            Format::Notebook => "notebook JSON",
            Format::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    /// TOML offset/local date-times, kept typed so they are written back bare.
    Datetime(toml::value::Datetime),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Null, Scalar::Null) => true,
            (Scalar::Bool(a), Scalar::Bool(b)) => a == b,
            (Scalar::Integer(a), Scalar::Integer(b)) => a == b,
            // Bitwise, so a NaN read from a file equals itself.
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::String(a), Scalar::String(b)) => a == b,
            (Scalar::Datetime(a), Scalar::Datetime(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Integer(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::String(s) => f.write_str(s),
            Scalar::Datetime(dt) => write!(f, "{dt}"),
        }
    }
}

/// A node of a structured document.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Mapping(Mapping),
    Sequence(Vec<Node>),
    Scalar(Scalar),
}

impl Node {
    pub fn null() -> Self {
        Node::Scalar(Scalar::Null)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Node::Mapping(_) => "a mapping",
            Node::Sequence(_) => "a sequence",
            Node::Scalar(Scalar::Null) => "null",
            Node::Scalar(_) => "a scalar",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Scalar(Scalar::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&Vec<Node>> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_sequence_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Mapping lookup; `None` for missing keys and for non-mappings.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_mapping().and_then(|m| m.get(key))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.as_mapping_mut().and_then(|m| m.get_mut(key))
    }

    /// Follows a chain of mapping keys, e.g. `["tool", "pytest", "ini_options"]`.
    pub fn get_path(&self, keys: &[&str]) -> Option<&Node> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    pub fn get_path_mut(&mut self, keys: &[&str]) -> Option<&mut Node> {
        keys.iter().try_fold(self, |node, key| node.get_mut(key))
    }

    /// Sequence of strings from either a list of lines or a single string, the
    /// two shapes notebook cell sources come in.
    pub fn joined_text(&self) -> Option<String> {
        match self {
            Node::Scalar(Scalar::String(s)) => Some(s.clone()),
            Node::Sequence(items) => items.iter().map(Node::as_str).collect(),
            _ => None,
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Node::Scalar(Scalar::String(value.to_owned()))
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Node::Scalar(Scalar::String(value))
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Scalar(Scalar::Bool(value))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Scalar(Scalar::Integer(value))
    }
}

impl From<Mapping> for Node {
    fn from(value: Mapping) -> Self {
        Node::Mapping(value)
    }
}

impl<T: Into<Node>> From<Vec<T>> for Node {
    fn from(value: Vec<T>) -> Self {
        Node::Sequence(value.into_iter().map(Into::into).collect())
    }
}

/// Insertion-ordered mapping with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, Node)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Replaces the value in place when the key exists, appends otherwise.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(existing) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Inserts a new key at `index`, shifting later keys back by one.
    pub fn insert_at(&mut self, index: usize, key: impl Into<String>, value: Node) {
        let index = index.min(self.entries.len());
        self.entries.insert(index, (key.into(), value));
    }

    pub fn remove(&mut self, key: &str) -> Option<Node> {
        let index = self.position(key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Node)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Equality that ignores key order, as used when comparing definitions.
    pub fn same_entries(&self, other: &Mapping) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl<K: Into<String>> FromIterator<(K, Node)> for Mapping {
    fn from_iter<I: IntoIterator<Item = (K, Node)>>(iter: I) -> Self {
        let mut mapping = Mapping::new();
        for (key, value) in iter {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl<K: Into<String>, const N: usize> From<[(K, Node); N]> for Mapping {
    fn from(entries: [(K, Node); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// A parsed file owned by one hook invocation.
#[derive(Debug, Clone)]
pub struct Document {
    path: PathBuf,
    format: Format,
    source: String,
    pristine: Node,
    root: Node,
}

impl Document {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Node {
        &mut self.root
    }

    pub fn into_root(self) -> Node {
        self.root
    }

    pub fn is_modified(&self) -> bool {
        self.root != self.pristine
    }
}

/// Parses `text` as `format`. `path` is only used for error reporting.
pub fn parse(text: &str, format: Format, path: &Path) -> Result<Document, FormatError> {
    let root = match format {
        Format::Yaml => parse_yaml(text, path)?,
        Format::Toml => parse_toml(text, path)?,
        Format::Json | Format::Notebook => parse_json(text, format, path)?,
        Format::Text => Node::from(text),
    };
    debug!(path = %path.display(), %format, "Parsed document");
    Ok(Document {
        path: path.to_path_buf(),
        format,
        source: text.to_owned(),
        pristine: root.clone(),
        root,
    })
}

/// Renders a document back to text; unmodified documents come back verbatim.
pub fn serialize(document: &Document) -> Result<String, FormatError> {
    if !document.is_modified() {
        return Ok(document.source.clone());
    }
    emit(&document.root, document.format, &document.path)
}

/// Renders a node as a standalone YAML snippet, used in violation messages.
pub fn to_yaml_string(node: &Node) -> String {
    serde_yaml::to_string(&to_yaml(node)).unwrap_or_else(|_| format!("{node:?}"))
}

fn emit(root: &Node, format: Format, path: &Path) -> Result<String, FormatError> {
    let unrepresentable = |message: String| FormatError::Unrepresentable {
        path: path.to_path_buf(),
        format,
        message,
    };
    match format {
        Format::Yaml => serde_yaml::to_string(&to_yaml(root)).map_err(|e| unrepresentable(e.to_string())),
        Format::Toml => {
            let table = match to_toml(root).map_err(unrepresentable)? {
                toml::Value::Table(table) => table,
                other => {
                    return Err(unrepresentable(format!(
                        "document root must be a table, found {}",
                        other.type_str()
                    )))
                }
            };
            toml::to_string(&table).map_err(|e| unrepresentable(e.to_string()))
        }
        Format::Json | Format::Notebook => {
            let value = to_json(root, format == Format::Notebook).map_err(unrepresentable)?;
            let indent: &[u8] = if format == Format::Notebook { b" " } else { b"  " };
            let mut buffer = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent);
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            value
                .serialize(&mut serializer)
                .map_err(|e| unrepresentable(e.to_string()))?;
            let mut text = String::from_utf8(buffer).map_err(|e| unrepresentable(e.to_string()))?;
            text.push('\n');
            Ok(text)
        }
        Format::Text => root
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| unrepresentable(format!("expected text, found {}", root.kind()))),
    }
}

fn parse_yaml(text: &str, path: &Path) -> Result<Node, FormatError> {
    let value: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| FormatError::Parse {
        path: path.to_path_buf(),
        format: Format::Yaml,
        location: e
            .location()
            .map(|l| Location::new(l.line(), l.column()))
            .unwrap_or_default(),
        message: e.to_string(),
    })?;
    from_yaml(value).map_err(|message| FormatError::Parse {
        path: path.to_path_buf(),
        format: Format::Yaml,
        location: Location::unknown(),
        message,
    })
}

fn from_yaml(value: serde_yaml::Value) -> Result<Node, String> {
    use serde_yaml::Value;
    Ok(match value {
        Value::Null => Node::null(),
        Value::Bool(b) => Node::from(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Node::from(i),
            None => Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => Node::from(s),
        Value::Sequence(items) => {
            Node::Sequence(items.into_iter().map(from_yaml).collect::<Result<_, _>>()?)
        }
        Value::Mapping(map) => {
            let mut mapping = Mapping::new();
            for (key, value) in map {
                let key = match key {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => return Err(format!("unsupported mapping key {other:?}")),
                };
                mapping.insert(key, from_yaml(value)?);
            }
            Node::Mapping(mapping)
        }
        Value::Tagged(tagged) => from_yaml(tagged.value)?,
    })
}

fn to_yaml(node: &Node) -> serde_yaml::Value {
    use serde_yaml::Value;
    match node {
        Node::Scalar(Scalar::Null) => Value::Null,
        Node::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
        Node::Scalar(Scalar::Integer(i)) => Value::Number((*i).into()),
        Node::Scalar(Scalar::Float(x)) => Value::Number((*x).into()),
        Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
        Node::Scalar(Scalar::Datetime(dt)) => Value::String(dt.to_string()),
        Node::Sequence(items) => Value::Sequence(items.iter().map(to_yaml).collect()),
        Node::Mapping(mapping) => {
            let mut map = serde_yaml::Mapping::new();
            for (key, value) in mapping.iter() {
                map.insert(Value::String(key.to_owned()), to_yaml(value));
            }
            Value::Mapping(map)
        }
    }
}

fn parse_toml(text: &str, path: &Path) -> Result<Node, FormatError> {
    let table: toml::Table = text.parse().map_err(|e: toml::de::Error| FormatError::Parse {
        path: path.to_path_buf(),
        format: Format::Toml,
        location: e
            .span()
            .map(|span| offset_to_location(text, span.start))
            .unwrap_or_default(),
        message: e.message().to_owned(),
    })?;
    Ok(from_toml(toml::Value::Table(table)))
}

fn from_toml(value: toml::Value) -> Node {
    use toml::Value;
    match value {
        Value::String(s) => Node::from(s),
        Value::Integer(i) => Node::from(i),
        Value::Float(x) => Node::Scalar(Scalar::Float(x)),
        Value::Boolean(b) => Node::from(b),
        Value::Datetime(dt) => Node::Scalar(Scalar::Datetime(dt)),
        Value::Array(items) => Node::Sequence(items.into_iter().map(from_toml).collect()),
        Value::Table(table) => Node::Mapping(
            table
                .into_iter()
                .map(|(key, value)| (key, from_toml(value)))
                .collect(),
        ),
    }
}

fn to_toml(node: &Node) -> Result<toml::Value, String> {
    use toml::Value;
    Ok(match node {
        Node::Scalar(Scalar::Null) => return Err("TOML has no null value".to_owned()),
        Node::Scalar(Scalar::Bool(b)) => Value::Boolean(*b),
        Node::Scalar(Scalar::Integer(i)) => Value::Integer(*i),
        Node::Scalar(Scalar::Float(x)) => Value::Float(*x),
        Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
        Node::Scalar(Scalar::Datetime(dt)) => Value::Datetime(*dt),
        Node::Sequence(items) => Value::Array(items.iter().map(to_toml).collect::<Result<_, _>>()?),
        Node::Mapping(mapping) => {
            let mut table = toml::Table::new();
            for (key, value) in mapping.iter() {
                table.insert(key.to_owned(), to_toml(value)?);
            }
            Value::Table(table)
        }
    })
}

fn parse_json(text: &str, format: Format, path: &Path) -> Result<Node, FormatError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(|e| FormatError::Parse {
        path: path.to_path_buf(),
        format,
        location: Location::new(e.line(), e.column()),
        message: e.to_string(),
    })?;
    Ok(from_json(value))
}

fn from_json(value: serde_json::Value) -> Node {
    use serde_json::Value;
    match value {
        Value::Null => Node::null(),
        Value::Bool(b) => Node::from(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Node::from(i),
            None => Node::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Value::String(s) => Node::from(s),
        Value::Array(items) => Node::Sequence(items.into_iter().map(from_json).collect()),
        Value::Object(map) => Node::Mapping(
            map.into_iter()
                .map(|(key, value)| (key, from_json(value)))
                .collect(),
        ),
    }
}

fn to_json(node: &Node, sort_keys: bool) -> Result<serde_json::Value, String> {
    use serde_json::Value;
    Ok(match node {
        Node::Scalar(Scalar::Null) => Value::Null,
        Node::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
        Node::Scalar(Scalar::Integer(i)) => Value::Number((*i).into()),
        Node::Scalar(Scalar::Float(x)) => Value::Number(
            serde_json::Number::from_f64(*x).ok_or_else(|| format!("{x} is not a valid JSON number"))?,
        ),
        Node::Scalar(Scalar::String(s)) => Value::String(s.clone()),
        Node::Scalar(Scalar::Datetime(dt)) => Value::String(dt.to_string()),
        Node::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|item| to_json(item, sort_keys))
                .collect::<Result<_, _>>()?,
        ),
        Node::Mapping(mapping) => {
            let mut entries: Vec<(&str, &Node)> = mapping.iter().collect();
            if sort_keys {
                entries.sort_by(|a, b| a.0.cmp(b.0));
            }
            let mut map = serde_json::Map::new();
            for (key, value) in entries {
                map.insert(key.to_owned(), to_json(value, sort_keys)?);
            }
            Value::Object(map)
        }
    })
}

fn offset_to_location(text: &str, offset: usize) -> Location {
    let before = &text[..offset.min(text.len())];
    let line = before.matches('\n').count() + 1;
    let column = before.rfind('\n').map_or(before.len(), |i| before.len() - i - 1) + 1;
    Location::new(line, column)
}
