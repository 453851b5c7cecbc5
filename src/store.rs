//! Version store: immutable grammar snapshots with parent links and an audit trail (§4.K)
use std::collections::BTreeMap;

use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::{
    error::{LintError, LintWarning},
    grammar::Grammar,
    lint::lint_grammar,
    patch::{self, Patch},
};

/// Unique identifier for a [`SpecVersion`].
pub type VersionId = Uuid;

/// The outcome of linting a piece of grammar text on its way into the store.
#[derive(Debug, Clone)]
pub struct LintOutcome {
    pub valid: bool,
    pub errors: Vec<LintError>,
    pub warnings: Vec<LintWarning>,
}

/// An immutable, versioned grammar snapshot (§3 "SpecVersion").
#[derive(Debug, Clone)]
pub struct SpecVersion {
    pub id: VersionId,
    pub parent_id: Option<VersionId>,
    pub created_at: u64,
    pub spec_text: String,
    pub ast: Option<Grammar>,
    pub patch_applied: Option<Patch>,
    pub lint_valid: bool,
    pub lint_errors: Vec<LintError>,
    pub lint_warnings: Vec<LintWarning>,
}

/// An append-only collection of [`SpecVersion`]s plus one optional working draft (§3 "SpecStore",
/// §5 "single writer discipline").
#[derive(Debug, Clone, Default)]
pub struct SpecStore {
    versions: BTreeMap<VersionId, SpecVersion>,
    roots: Vec<VersionId>,
    working_draft_text: Option<String>,
}

impl SpecStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, id: VersionId) -> Option<&SpecVersion> {
        self.versions.get(&id)
    }

    #[must_use]
    pub fn roots(&self) -> &[VersionId] {
        &self.roots
    }

    /// Walk `parent_id` links from `id` back to a root, inclusive, root-first.
    #[must_use]
    pub fn lineage(&self, id: VersionId) -> Vec<VersionId> {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            chain.push(id);
            current = self.versions.get(&id).and_then(|v| v.parent_id);
        }
        chain.reverse();
        chain
    }

    /// Textual line-level diff between two stored versions' spec text.
    #[must_use]
    pub fn spec_diff(&self, a: VersionId, b: VersionId) -> Option<Vec<String>> {
        let a = &self.versions.get(&a)?.spec_text;
        let b = &self.versions.get(&b)?.spec_text;
        Some(diff_lines(a, b))
    }

    #[must_use]
    pub fn working_draft_text(&self) -> Option<&str> {
        self.working_draft_text.as_deref()
    }

    /// Replace the working draft, invalidating any cached validation of the previous draft.
    pub fn set_working_text(&mut self, text: String) {
        self.working_draft_text = Some(text);
    }

    /// Run [`create_initial_version`] against the current working draft text.
    pub fn commit_working_draft(&mut self) -> (Option<VersionId>, LintOutcome) {
        let Some(text) = self.working_draft_text.take() else {
            return (
                None,
                LintOutcome {
                    valid: false,
                    errors: Vec::new(),
                    warnings: Vec::new(),
                },
            );
        };
        create_initial_version(self, &text)
    }

    fn insert(&mut self, version: SpecVersion) -> VersionId {
        let id = version.id;
        if version.parent_id.is_none() {
            self.roots.push(id);
        }
        self.versions.insert(id, version);
        id
    }
}

/// Lint `text` and, on success, store a new rootless [`SpecVersion`] (§4.K "Create-initial").
///
/// Lint failures are reported but not stored by default, matching §4.K's stated default.
pub fn create_initial_version(store: &mut SpecStore, text: &str) -> (Option<VersionId>, LintOutcome) {
    let (ast, errors, warnings) = lint_grammar(text);
    let valid = errors.is_empty();
    let outcome = LintOutcome {
        valid,
        errors,
        warnings,
    };
    if !valid {
        return (None, outcome);
    }
    let id = Uuid::new_v4();
    let version = SpecVersion {
        id,
        parent_id: None,
        created_at: now_millis(),
        spec_text: text.to_owned(),
        ast,
        patch_applied: None,
        lint_valid: true,
        lint_errors: outcome.errors.clone(),
        lint_warnings: outcome.warnings.clone(),
    };
    let id = store.insert(version);
    (Some(id), outcome)
}

/// Apply `patch` against `parent_id`'s text, re-lint, and on success append a new version
/// (§4.K "Apply-patch"). On failure the store is left unchanged.
pub fn apply_patch(
    store: &mut SpecStore,
    parent_id: VersionId,
    patch: Patch,
) -> (Option<VersionId>, Vec<String>) {
    let Some(parent) = store.get(parent_id) else {
        return (None, vec![format!("unknown parent version `{parent_id}`")]);
    };
    let parent_text = parent.spec_text.clone();

    match patch::apply(&parent_text, &patch) {
        Ok((new_text, ast)) => {
            let id = Uuid::new_v4();
            let version = SpecVersion {
                id,
                parent_id: Some(parent_id),
                created_at: now_millis(),
                spec_text: new_text,
                ast: Some(ast),
                patch_applied: Some(patch),
                lint_valid: true,
                lint_errors: Vec::new(),
                lint_warnings: Vec::new(),
            };
            let id = store.insert(version);
            (Some(id), Vec::new())
        }
        Err(errors) => (None, errors),
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn diff_lines(a: &str, b: &str) -> Vec<String> {
    let a_lines: Vec<&str> = a.lines().collect();
    let b_lines: Vec<&str> = b.lines().collect();
    let mut out = Vec::new();
    for i in 0..a_lines.len().max(b_lines.len()) {
        match (a_lines.get(i), b_lines.get(i)) {
            (Some(x), Some(y)) if x == y => {}
            (Some(x), Some(y)) => {
                out.push(format!("-{x}"));
                out.push(format!("+{y}"));
            }
            (Some(x), None) => out.push(format!("-{x}")),
            (None, Some(y)) => out.push(format!("+{y}")),
            (None, None) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::patch::PatchOp;
    use serde_yml::{Mapping, Value};

    const S1: &str = "
format: record_stream
endian: little
framing: { repeat: until_eof }
types:
  R:
    fields:
      - { name: t, type: u16 }
      - { name: n, type: u8 }
      - { name: p, type: bytes, length: n }
record:
  use: R
";

    #[test]
    fn create_initial_stores_a_root_version() {
        let mut store = SpecStore::new();
        let (id, outcome) = create_initial_version(&mut store, S1);
        assert!(outcome.valid);
        let id = id.expect("valid grammar should be stored");
        assert_eq!(store.roots(), &[id]);
        assert_eq!(store.lineage(id), vec![id]);
    }

    #[test]
    fn invalid_grammar_is_not_stored_by_default() {
        let mut store = SpecStore::new();
        let (id, outcome) = create_initial_version(&mut store, "format: nonsense");
        assert!(id.is_none());
        assert!(!outcome.valid);
        assert!(store.roots().is_empty());
    }

    #[test]
    fn apply_patch_links_to_parent_and_leaves_store_unchanged_on_failure() {
        let mut store = SpecStore::new();
        let (root, _) = create_initial_version(&mut store, S1);
        let root = root.unwrap();

        let mut field_def = Mapping::new();
        field_def.insert(Value::from("name"), Value::from("extra"));
        field_def.insert(Value::from("type"), Value::from("u8"));
        let patch = Patch {
            ops: vec![PatchOp::InsertField {
                type_name: "R".to_owned(),
                index: -1,
                field_def,
            }],
            description: "append a trailing byte field".to_owned(),
        };
        let (new_id, errors) = apply_patch(&mut store, root, patch);
        assert!(errors.is_empty());
        let new_id = new_id.unwrap();
        assert_eq!(store.lineage(new_id), vec![root, new_id]);

        let bad_patch = Patch {
            ops: vec![PatchOp::DeleteField {
                type_name: "NoSuchType".to_owned(),
                index: 0,
            }],
            description: "bad op".to_owned(),
        };
        let versions_before = store.lineage(new_id);
        let (failed_id, errors) = apply_patch(&mut store, new_id, bad_patch);
        assert!(failed_id.is_none());
        assert!(!errors.is_empty());
        assert_eq!(store.lineage(new_id), versions_before);
    }
}
