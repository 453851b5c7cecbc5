//! The untyped "serialized form" of a grammar: a nested map/sequence tree (§9 design note
//! "AST as nested maps vs typed records").
//!
//! [`crate::patch`] operates exclusively on this representation so that a [`crate::patch::PatchOp`]
//! can be expressed as a simple path into a tree, without needing to know the full typed AST.
//! After a patch applies, the tree is serialized back to text and re-validated by
//! [`crate::lint::lint_grammar`] to rebuild the typed [`crate::grammar::ast::Grammar`].
use serde::{Deserialize, Serialize};
use serde_yml::Value;

use crate::error::PatchError;

/// A path segment: either a map key or a sequence index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Navigate to a node by path, returning a reference, or [`PatchError::UnknownPath`].
pub fn get<'a>(root: &'a Value, path: &[PathSegment]) -> Result<&'a Value, PatchError> {
    let mut node = root;
    for segment in path {
        node = step(node, segment, path)?;
    }
    Ok(node)
}

/// Navigate to a node by path, returning a mutable reference, or [`PatchError::UnknownPath`].
pub fn get_mut<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Value, PatchError> {
    let mut node = root;
    for segment in path {
        node = step_mut(node, segment, path)?;
    }
    Ok(node)
}

fn step<'a>(node: &'a Value, segment: &PathSegment, full_path: &[PathSegment]) -> Result<&'a Value, PatchError> {
    match (node, segment) {
        (Value::Mapping(map), PathSegment::Key(key)) => map
            .get(Value::String(key.clone()))
            .ok_or_else(|| PatchError::UnknownPath(path_strings(full_path))),
        (Value::Sequence(seq), PathSegment::Index(i)) => seq
            .get(*i)
            .ok_or_else(|| PatchError::UnknownPath(path_strings(full_path))),
        _ => Err(PatchError::UnknownPath(path_strings(full_path))),
    }
}

fn step_mut<'a>(
    node: &'a mut Value,
    segment: &PathSegment,
    full_path: &[PathSegment],
) -> Result<&'a mut Value, PatchError> {
    match (node, segment) {
        (Value::Mapping(map), PathSegment::Key(key)) => map
            .get_mut(Value::String(key.clone()))
            .ok_or_else(|| PatchError::UnknownPath(path_strings(full_path))),
        (Value::Sequence(seq), PathSegment::Index(i)) => seq
            .get_mut(*i)
            .ok_or_else(|| PatchError::UnknownPath(path_strings(full_path))),
        _ => Err(PatchError::UnknownPath(path_strings(full_path))),
    }
}

fn path_strings(path: &[PathSegment]) -> Vec<String> {
    path.iter()
        .map(|s| match s {
            PathSegment::Key(k) => k.clone(),
            PathSegment::Index(i) => i.to_string(),
        })
        .collect()
}
