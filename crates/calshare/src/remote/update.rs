use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};
use crate::model::document::object_mut;

/// One field change inside an atomic document update.
///
/// Paths are dotted (`accepted.u1`) and address nested object fields.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set { path: String, value: Value },
    /// Removing an absent field is a no-op.
    Delete { path: String },
    /// Append each value not already present.
    ArrayUnion { path: String, values: Vec<Value> },
    /// Remove every element equal to one of the values.
    ArrayRemove { path: String, values: Vec<Value> },
}

impl FieldUpdate {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        FieldUpdate::Set {
            path: path.into(),
            value,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        FieldUpdate::Delete { path: path.into() }
    }

    pub fn array_union(path: impl Into<String>, values: Vec<Value>) -> Self {
        FieldUpdate::ArrayUnion {
            path: path.into(),
            values,
        }
    }

    pub fn array_remove(path: impl Into<String>, values: Vec<Value>) -> Self {
        FieldUpdate::ArrayRemove {
            path: path.into(),
            values,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            FieldUpdate::Set { path, .. }
            | FieldUpdate::Delete { path }
            | FieldUpdate::ArrayUnion { path, .. }
            | FieldUpdate::ArrayRemove { path, .. } => path,
        }
    }

    pub fn apply(&self, data: &mut Value) -> SyncResult<()> {
        let (parents, leaf) = split_path(self.path())?;
        match self {
            FieldUpdate::Set { value, .. } => {
                let parent = descend(data, &parents, true)?
                    .ok_or_else(|| SyncError::Internal("missing parent".to_string()))?;
                parent.insert(leaf.to_string(), value.clone());
            }
            FieldUpdate::Delete { .. } => {
                if let Some(parent) = descend(data, &parents, false)? {
                    parent.remove(leaf);
                }
            }
            FieldUpdate::ArrayUnion { values, .. } => {
                let parent = descend(data, &parents, true)?
                    .ok_or_else(|| SyncError::Internal("missing parent".to_string()))?;
                let array = array_field(parent, leaf, self.path())?;
                for value in values {
                    if !array.contains(value) {
                        array.push(value.clone());
                    }
                }
            }
            FieldUpdate::ArrayRemove { values, .. } => {
                if let Some(parent) = descend(data, &parents, false)? {
                    if parent.contains_key(leaf) {
                        let array = array_field(parent, leaf, self.path())?;
                        array.retain(|element| !values.contains(element));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Apply every update to a copy; the original is untouched on failure.
pub fn apply_all(data: &Value, updates: &[FieldUpdate]) -> SyncResult<Value> {
    let mut next = data.clone();
    for update in updates {
        update.apply(&mut next)?;
    }
    Ok(next)
}

fn split_path(path: &str) -> SyncResult<(Vec<&str>, &str)> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(SyncError::InvalidInput(format!("invalid field path {path:?}")));
    }
    match segments.split_last() {
        Some((leaf, parents)) => Ok((parents.to_vec(), leaf)),
        None => Err(SyncError::InvalidInput(format!("invalid field path {path:?}"))),
    }
}

/// Walk to the object holding the leaf. With `create`, missing objects are
/// added; otherwise a missing segment yields `None`.
fn descend<'a>(
    data: &'a mut Value,
    parents: &[&str],
    create: bool,
) -> SyncResult<Option<&'a mut Map<String, Value>>> {
    let mut current = object_mut(data)?;
    for segment in parents {
        if !current.contains_key(*segment) {
            if !create {
                return Ok(None);
            }
            current.insert(segment.to_string(), Value::Object(Map::new()));
        }
        current = match current.get_mut(*segment) {
            Some(Value::Object(map)) => map,
            _ => {
                return Err(SyncError::InvalidInput(format!(
                    "field {segment} is not an object"
                )))
            }
        };
    }
    Ok(Some(current))
}

fn array_field<'a>(
    parent: &'a mut Map<String, Value>,
    leaf: &str,
    path: &str,
) -> SyncResult<&'a mut Vec<Value>> {
    match parent
        .entry(leaf.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(array) => Ok(array),
        _ => Err(SyncError::InvalidInput(format!("field {path} is not an array"))),
    }
}
