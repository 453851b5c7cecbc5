//! Patch algebra: typed edit operations with atomic application to the grammar's serialized
//! form (§4.J, §9 "AST as nested maps vs typed records")
use serde_yml::{Mapping, Value};

use crate::{
    error::PatchError,
    grammar::{
        self,
        serialized::{self, PathSegment},
        text, Grammar,
    },
    lint::lint_grammar,
};

/// A single structured edit against a grammar's serialized tree.
#[derive(Debug, Clone)]
pub enum PatchOp {
    /// `InsertField(("types", T), index, field_def)`. `index == -1` means append.
    InsertField {
        type_name: String,
        index: i64,
        field_def: Mapping,
    },
    /// `UpdateField(("types", T, "fields", i), updates)`.
    UpdateField {
        type_name: String,
        index: usize,
        updates: Mapping,
    },
    /// `DeleteField(("types", T, "fields", i))`.
    DeleteField { type_name: String, index: usize },
    /// `AddType(("types", T), type_def)`.
    AddType { type_name: String, type_def: Mapping },
    /// `UpdateType(("types", T), updates)`.
    UpdateType { type_name: String, updates: Mapping },
    /// `AddRegistryEntry(("registry", discriminator), entry)`.
    AddRegistryEntry { discriminator: String, entry: Mapping },
}

impl PatchOp {
    /// Structural validation only — does not require a grammar (§4.J).
    #[must_use]
    pub fn validate(&self) -> (bool, Option<PatchError>) {
        match self {
            PatchOp::InsertField {
                type_name,
                index,
                field_def,
            } => {
                if type_name.is_empty() {
                    return invalid(PatchError::UnknownPath(vec!["types".into()]));
                }
                if *index < -1 {
                    return invalid(PatchError::IndexOutOfRange {
                        path: vec!["types".into(), type_name.clone(), "fields".into()],
                        index: *index,
                        max: 0,
                    });
                }
                if field_def.get(Value::from("name")).is_none() || field_def.get(Value::from("type")).is_none() {
                    return invalid(PatchError::UnknownPath(vec![
                        "types".into(),
                        type_name.clone(),
                        "fields".into(),
                    ]));
                }
                (true, None)
            }
            PatchOp::UpdateField { type_name, .. } | PatchOp::UpdateType { type_name, .. } => {
                if type_name.is_empty() {
                    return invalid(PatchError::UnknownPath(vec!["types".into()]));
                }
                (true, None)
            }
            PatchOp::DeleteField { type_name, .. } => {
                if type_name.is_empty() {
                    return invalid(PatchError::UnknownPath(vec!["types".into()]));
                }
                (true, None)
            }
            PatchOp::AddType { type_name, type_def } => {
                if type_name.is_empty() {
                    return invalid(PatchError::UnknownPath(vec!["types".into()]));
                }
                if type_def.get(Value::from("fields")).is_none() {
                    return invalid(PatchError::UnknownPath(vec!["types".into(), type_name.clone()]));
                }
                (true, None)
            }
            PatchOp::AddRegistryEntry { discriminator, entry } => {
                if grammar::parse_discriminator_value(discriminator).is_none() {
                    return invalid(PatchError::UnknownPath(vec!["registry".into(), discriminator.clone()]));
                }
                if entry.get(Value::from("decode")).is_none() {
                    return invalid(PatchError::UnknownPath(vec!["registry".into(), discriminator.clone()]));
                }
                (true, None)
            }
        }
    }
}

fn invalid(error: PatchError) -> (bool, Option<PatchError>) {
    (false, Some(error))
}

/// An ordered sequence of [`PatchOp`] with a human-readable description.
#[derive(Debug, Clone)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
    pub description: String,
}

/// Apply every op in `patch` against a deep copy of `grammar_text`'s serialized form, then
/// re-lint. Atomic: on any failure, nothing is returned but the error list (§4.J).
pub fn apply(grammar_text: &str, patch: &Patch) -> Result<(String, Grammar), Vec<String>> {
    let mut root = text::parse(grammar_text).map_err(|e| vec![e.to_string()])?;

    for op in &patch.ops {
        let (ok, err) = op.validate();
        if !ok {
            return Err(vec![err.map(|e| e.to_string()).unwrap_or_default()]);
        }
        if let Err(e) = apply_one(&mut root, op) {
            return Err(vec![e.to_string()]);
        }
    }

    let new_text = text::to_text(&root).map_err(|e| vec![e.to_string()])?;
    let (new_grammar, errors, _warnings) = lint_grammar(&new_text);
    match new_grammar {
        Some(grammar) if errors.is_empty() => Ok((new_text, grammar)),
        _ => Err(std::iter::once(PatchError::LintFailed(errors.len()).to_string())
            .chain(errors.iter().map(ToString::to_string))
            .collect()),
    }
}

fn apply_one(root: &mut Value, op: &PatchOp) -> Result<(), PatchError> {
    match op {
        PatchOp::InsertField {
            type_name,
            index,
            field_def,
        } => {
            let fields = fields_seq_mut(root, type_name)?;
            let insert_at = if *index == -1 {
                fields.len()
            } else {
                let idx = usize::try_from(*index).unwrap_or(usize::MAX);
                if idx > fields.len() {
                    return Err(PatchError::IndexOutOfRange {
                        path: vec!["types".into(), type_name.clone(), "fields".into()],
                        index: *index,
                        max: fields.len(),
                    });
                }
                idx
            };
            fields.insert(insert_at, Value::Mapping(field_def.clone()));
            Ok(())
        }
        PatchOp::UpdateField {
            type_name,
            index,
            updates,
        } => {
            let fields = fields_seq_mut(root, type_name)?;
            let field = fields.get_mut(*index).ok_or_else(|| PatchError::IndexOutOfRange {
                path: vec!["types".into(), type_name.clone(), "fields".into()],
                index: i64::try_from(*index).unwrap_or(i64::MAX),
                max: fields.len().saturating_sub(1),
            })?;
            let Value::Mapping(field_map) = field else {
                return Err(PatchError::UnknownPath(vec!["types".into(), type_name.clone()]));
            };
            for (key, value) in updates {
                field_map.insert(key.clone(), value.clone());
            }
            Ok(())
        }
        PatchOp::DeleteField { type_name, index } => {
            let fields = fields_seq_mut(root, type_name)?;
            if *index >= fields.len() {
                return Err(PatchError::IndexOutOfRange {
                    path: vec!["types".into(), type_name.clone(), "fields".into()],
                    index: i64::try_from(*index).unwrap_or(i64::MAX),
                    max: fields.len().saturating_sub(1),
                });
            }
            fields.remove(*index);
            Ok(())
        }
        PatchOp::AddType { type_name, type_def } => {
            let types = types_map_mut(root)?;
            let key = Value::from(type_name.clone());
            if types.get(key.clone()).is_some() {
                return Err(PatchError::DuplicateKey {
                    path: vec!["types".into()],
                    key: type_name.clone(),
                });
            }
            types.insert(key, Value::Mapping(type_def.clone()));
            Ok(())
        }
        PatchOp::UpdateType { type_name, updates } => {
            let types = types_map_mut(root)?;
            let key = Value::from(type_name.clone());
            let Some(Value::Mapping(existing)) = types.get_mut(key) else {
                return Err(PatchError::UnknownPath(vec!["types".into(), type_name.clone()]));
            };
            for (k, v) in updates {
                existing.insert(k.clone(), v.clone());
            }
            Ok(())
        }
        PatchOp::AddRegistryEntry { discriminator, entry } => {
            let path = [PathSegment::Key("registry".to_owned())];
            let registry_node = serialized::get_mut(root, &path)?;
            let Value::Mapping(registry) = registry_node else {
                return Err(PatchError::UnknownPath(vec!["registry".into()]));
            };
            let key = Value::from(discriminator.clone());
            if registry.get(key.clone()).is_some() {
                return Err(PatchError::DuplicateKey {
                    path: vec!["registry".into()],
                    key: discriminator.clone(),
                });
            }
            registry.insert(key, Value::Mapping(entry.clone()));
            Ok(())
        }
    }
}

fn types_map_mut(root: &mut Value) -> Result<&mut Mapping, PatchError> {
    let path = [PathSegment::Key("types".to_owned())];
    match serialized::get_mut(root, &path)? {
        Value::Mapping(m) => Ok(m),
        _ => Err(PatchError::UnknownPath(vec!["types".into()])),
    }
}

fn fields_seq_mut<'a>(root: &'a mut Value, type_name: &str) -> Result<&'a mut Vec<Value>, PatchError> {
    let path = [
        PathSegment::Key("types".to_owned()),
        PathSegment::Key(type_name.to_owned()),
        PathSegment::Key("fields".to_owned()),
    ];
    match serialized::get_mut(root, &path)? {
        Value::Sequence(seq) => Ok(seq),
        _ => Err(PatchError::UnknownPath(vec!["types".into(), type_name.into(), "fields".into()])),
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

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

    fn field_def(name: &str, ty: &str) -> Mapping {
        let mut m = Mapping::new();
        m.insert(Value::from("name"), Value::from(name));
        m.insert(Value::from("type"), Value::from(ty));
        m
    }

    #[test]
    fn s5_insert_field_then_relint_succeeds() {
        let patch = Patch {
            ops: vec![PatchOp::InsertField {
                type_name: "R".to_owned(),
                index: -1,
                field_def: field_def("extra", "u8"),
            }],
            description: "append a trailing byte field".to_owned(),
        };
        let (new_text, grammar) = apply(S1, &patch).expect("patch should apply cleanly");
        assert_eq!(grammar.types["R"].fields.len(), 4);
        assert!(new_text.contains("extra"));
    }

    #[test]
    fn insert_out_of_range_index_fails_atomically() {
        let patch = Patch {
            ops: vec![PatchOp::InsertField {
                type_name: "R".to_owned(),
                index: 99,
                field_def: field_def("extra", "u8"),
            }],
            description: "bad index".to_owned(),
        };
        assert!(apply(S1, &patch).is_err());
    }

    #[test]
    fn duplicate_type_is_rejected() {
        let mut type_def = Mapping::new();
        type_def.insert(Value::from("fields"), Value::Sequence(Vec::new()));
        let patch = Patch {
            ops: vec![PatchOp::AddType {
                type_name: "R".to_owned(),
                type_def,
            }],
            description: "duplicate R".to_owned(),
        };
        assert!(apply(S1, &patch).is_err());
    }
}
