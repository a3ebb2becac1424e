//! Merge engine: make an existing document contain at least a desired
//! fragment.
//!
//! The merge is asymmetric. Keys and elements the fragment does not mention are
//! never touched, so downstream repositories can keep their own extra entries.
//! Removing something is a separate, explicit operation ([`remove_key`],
//! [`remove_elements`]).
//!
//! Every edit is recorded as a [`Change`]. Merging a fragment into a document
//! that already satisfies it records nothing, which is what makes the hooks
//! idempotent.

use std::collections::HashMap;
use std::fmt;

use crate::document::{Mapping, Node};
use crate::error::MergeError;

/// Where a missing key or element is inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    End,
    /// Immediately before the key (or element identity) named.
    Before(String),
    /// Immediately after the key (or element identity) named.
    After(String),
}

/// How sequence elements are matched against each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Mapping elements are identified by one field, e.g. a hook's `id`.
    Key(String),
    /// Elements are identified by their whole value.
    Value,
}

impl Identity {
    fn of_existing(&self, element: &Node) -> Option<Node> {
        match self {
            Identity::Key(key) => element.get(key).cloned(),
            Identity::Value => Some(element.clone()),
        }
    }

    fn of_desired(&self, desired: &Desired) -> Option<Node> {
        match (self, desired) {
            (Identity::Value, Desired::Exact(node) | Desired::IfAbsent(node)) => Some(node.clone()),
            (Identity::Value, other) => Some(other.materialize()),
            (Identity::Key(key), Desired::Mapping(fragment)) => fragment.value_of(key),
            (Identity::Key(key), Desired::Exact(node) | Desired::IfAbsent(node)) => {
                node.get(key).cloned()
            }
            (Identity::Key(_), Desired::Elements(_)) => None,
        }
    }
}

/// Required state for one position of a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Desired {
    /// Overwritten whenever the existing value differs.
    Exact(Node),
    /// Written only when the key or element is missing.
    IfAbsent(Node),
    Mapping(Fragment),
    Elements(ElementSet),
}

impl Desired {
    pub fn exact(value: impl Into<Node>) -> Self {
        Desired::Exact(value.into())
    }

    pub fn if_absent(value: impl Into<Node>) -> Self {
        Desired::IfAbsent(value.into())
    }

    /// The value written when nothing exists yet at this position.
    pub fn materialize(&self) -> Node {
        match self {
            Desired::Exact(node) | Desired::IfAbsent(node) => node.clone(),
            Desired::Mapping(fragment) => Node::Mapping(
                fragment
                    .entries
                    .iter()
                    .map(|entry| (entry.key.clone(), entry.desired.materialize()))
                    .collect(),
            ),
            Desired::Elements(set) => Node::Sequence(
                set.elements
                    .iter()
                    .map(|element| element.desired.materialize())
                    .collect(),
            ),
        }
    }
}

impl From<Fragment> for Desired {
    fn from(fragment: Fragment) -> Self {
        Desired::Mapping(fragment)
    }
}

impl From<ElementSet> for Desired {
    fn from(set: ElementSet) -> Self {
        Desired::Elements(set)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub key: String,
    pub desired: Desired,
    pub placement: Placement,
}

/// Partial mapping describing the minimum a document must contain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    entries: Vec<Entry>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: impl Into<String>, desired: impl Into<Desired>) -> Self {
        self.with_placed(key, desired, Placement::End)
    }

    pub fn with_placed(
        mut self,
        key: impl Into<String>,
        desired: impl Into<Desired>,
        placement: Placement,
    ) -> Self {
        self.entries.push(Entry {
            key: key.into(),
            desired: desired.into(),
            placement,
        });
        self
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialised desired value of `key`, if the fragment names it.
    pub fn value_of(&self, key: &str) -> Option<Node> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.desired.materialize())
    }
}

impl From<Node> for Desired {
    fn from(node: Node) -> Self {
        Desired::Exact(node)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub desired: Desired,
    pub placement: Placement,
}

/// Required elements of a sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementSet {
    identity: Identity,
    elements: Vec<Element>,
}

impl ElementSet {
    /// Mapping elements matched on `key`.
    pub fn keyed(key: impl Into<String>) -> Self {
        Self {
            identity: Identity::Key(key.into()),
            elements: Vec::new(),
        }
    }

    /// Elements matched on their whole value.
    pub fn values() -> Self {
        Self {
            identity: Identity::Value,
            elements: Vec::new(),
        }
    }

    pub fn with(self, desired: impl Into<Desired>) -> Self {
        self.with_placed(desired, Placement::End)
    }

    pub fn with_placed(mut self, desired: impl Into<Desired>, placement: Placement) -> Self {
        self.elements.push(Element {
            desired: desired.into(),
            placement,
        });
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }
}

/// One edit applied to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added(String),
    Updated(String),
    Removed(String),
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Added(path) => write!(f, "added {path}"),
            Change::Updated(path) => write!(f, "updated {path}"),
            Change::Removed(path) => write!(f, "removed {path}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeResult {
    pub changed: bool,
    pub document: Node,
    pub changes: Vec<Change>,
}

/// Merges `desired` into a copy of `existing`.
pub fn merge(existing: &Node, desired: &Fragment) -> Result<MergeResult, MergeError> {
    let mut document = existing.clone();
    let changes = merge_in_place(&mut document, desired)?;
    Ok(MergeResult {
        changed: !changes.is_empty(),
        document,
        changes,
    })
}

/// Merges `desired` into `document` directly. On error the document may be
/// partially merged and should be discarded.
pub fn merge_in_place(document: &mut Node, desired: &Fragment) -> Result<Vec<Change>, MergeError> {
    let mut changes = Vec::new();
    match document {
        Node::Mapping(mapping) => merge_mapping(mapping, desired, "", &mut changes)?,
        other => {
            return Err(MergeError::NotAMapping {
                path: "(root)".to_owned(),
                found: other.kind(),
            })
        }
    }
    Ok(changes)
}

fn merge_mapping(
    mapping: &mut Mapping,
    fragment: &Fragment,
    path: &str,
    changes: &mut Vec<Change>,
) -> Result<(), MergeError> {
    let mut inserted_after: HashMap<&str, usize> = HashMap::new();
    for entry in &fragment.entries {
        let entry_path = join_key(path, &entry.key);
        if let Some(current) = mapping.get_mut(&entry.key) {
            merge_value(current, &entry.desired, &entry_path, changes)?;
            continue;
        }
        let anchor_index = |anchor: &str| {
            mapping.position(anchor).ok_or_else(|| MergeError::AnchorNotFound {
                anchor: anchor.to_owned(),
                path: display_path(path),
            })
        };
        let index = match &entry.placement {
            Placement::End => mapping.len(),
            Placement::Before(anchor) => anchor_index(anchor)?,
            Placement::After(anchor) => {
                let position = anchor_index(anchor)?;
                let offset = inserted_after.entry(anchor.as_str()).or_insert(0);
                *offset += 1;
                position + *offset
            }
        };
        mapping.insert_at(index, entry.key.clone(), entry.desired.materialize());
        changes.push(Change::Added(entry_path));
    }
    Ok(())
}

fn merge_value(
    current: &mut Node,
    desired: &Desired,
    path: &str,
    changes: &mut Vec<Change>,
) -> Result<(), MergeError> {
    match desired {
        Desired::IfAbsent(_) => return Ok(()),
        Desired::Exact(node) => {
            if *current != *node {
                *current = node.clone();
                changes.push(Change::Updated(path.to_owned()));
            }
            return Ok(());
        }
        Desired::Mapping(fragment) => {
            if let Node::Mapping(mapping) = current {
                return merge_mapping(mapping, fragment, path, changes);
            }
        }
        Desired::Elements(set) => {
            if let Node::Sequence(items) = current {
                return merge_elements(items, set, path, changes);
            }
        }
    }
    // Wrong shape: the desired structure wins.
    *current = desired.materialize();
    changes.push(Change::Updated(path.to_owned()));
    Ok(())
}

fn merge_elements(
    items: &mut Vec<Node>,
    set: &ElementSet,
    path: &str,
    changes: &mut Vec<Change>,
) -> Result<(), MergeError> {
    let mut inserted_after: HashMap<&str, usize> = HashMap::new();
    for element in &set.elements {
        let identity = set
            .identity
            .of_desired(&element.desired)
            .ok_or_else(|| MergeError::MissingIdentity {
                path: display_path(path),
                key: match &set.identity {
                    Identity::Key(key) => key.clone(),
                    Identity::Value => "value".to_owned(),
                },
            })?;
        let element_path = format!("{}[{}]", display_path(path), describe(&identity));
        let existing = items
            .iter()
            .position(|item| set.identity.of_existing(item).as_ref() == Some(&identity));
        if let Some(index) = existing {
            merge_value(&mut items[index], &element.desired, &element_path, changes)?;
            continue;
        }
        let anchor_index = |anchor: &str| {
            let anchor_node = Node::from(anchor);
            items
                .iter()
                .position(|item| set.identity.of_existing(item).as_ref() == Some(&anchor_node))
                .ok_or_else(|| MergeError::AnchorNotFound {
                    anchor: anchor.to_owned(),
                    path: display_path(path),
                })
        };
        let index = match &element.placement {
            Placement::End => items.len(),
            Placement::Before(anchor) => anchor_index(anchor)?,
            Placement::After(anchor) => {
                let position = anchor_index(anchor)?;
                let offset = inserted_after.entry(anchor.as_str()).or_insert(0);
                *offset += 1;
                position + *offset
            }
        };
        items.insert(index, element.desired.materialize());
        changes.push(Change::Added(element_path));
    }
    Ok(())
}

/// Explicitly deletes a key. Returns the change when something was removed.
pub fn remove_key(mapping: &mut Mapping, key: &str, path: &str) -> Option<Change> {
    mapping
        .remove(key)
        .map(|_| Change::Removed(join_key(path, key)))
}

/// Explicitly deletes every element whose identity equals `value`.
pub fn remove_elements(
    items: &mut Vec<Node>,
    identity: &Identity,
    value: &Node,
    path: &str,
) -> Vec<Change> {
    let before = items.len();
    items.retain(|item| identity.of_existing(item).as_ref() != Some(value));
    (0..before - items.len())
        .map(|_| Change::Removed(format!("{}[{}]", display_path(path), describe(value))))
        .collect()
}

fn join_key(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_owned()
    } else {
        format!("{path}.{key}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "(root)".to_owned()
    } else {
        path.to_owned()
    }
}

fn describe(identity: &Node) -> String {
    match identity {
        Node::Scalar(scalar) => scalar.to_string(),
        other => other.kind().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(node: &Node) -> Vec<&str> {
        node.as_mapping().unwrap().keys().collect()
    }

    #[test]
    fn equal_scalars_are_not_rewritten() {
        let existing = Node::Mapping(Mapping::from([("version", Node::from(2_i64))]));
        let fragment = Fragment::new().with("version", Desired::exact(2_i64));
        let result = merge(&existing, &fragment).unwrap();
        assert!(!result.changed);
        assert_eq!(result.document, existing);
    }

    #[test]
    fn after_anchor_keeps_fragment_order() {
        let existing = Node::Mapping(Mapping::from([("a", Node::null()), ("z", Node::null())]));
        let fragment = Fragment::new()
            .with_placed("b", Desired::exact(1_i64), Placement::After("a".into()))
            .with_placed("c", Desired::exact(2_i64), Placement::After("a".into()));
        let result = merge(&existing, &fragment).unwrap();
        assert_eq!(keys(&result.document), vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn if_absent_never_overwrites() {
        let existing = Node::Mapping(Mapping::from([("rev", Node::from("v1.2.3"))]));
        let fragment = Fragment::new().with("rev", Desired::if_absent("PLEASE-UPDATE"));
        assert!(!merge(&existing, &fragment).unwrap().changed);
    }

    #[test]
    fn root_must_be_a_mapping() {
        let err = merge(&Node::from(vec!["a"]), &Fragment::new()).unwrap_err();
        assert!(matches!(err, MergeError::NotAMapping { .. }));
    }

    #[test]
    fn explicit_removal_reports_each_element() {
        let mut items = vec![Node::from("a"), Node::from("b"), Node::from("a")];
        let changes = remove_elements(&mut items, &Identity::Value, &Node::from("a"), "tags");
        assert_eq!(items, vec![Node::from("b")]);
        assert_eq!(changes.len(), 2);
    }
}
