use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{SyncError, SyncResult};

/// A remote document: its id within the owning collection plus its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

impl Document {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// A model stored as a remote document.
///
/// The document id is not a stored field: it is attached on decode and
/// stripped on encode.
pub trait Record: Serialize + DeserializeOwned {
    fn id(&self) -> Option<&str>;
    fn set_id(&mut self, id: String);

    /// Shape checks that serde cannot express.
    fn validate(&self) -> SyncResult<()> {
        Ok(())
    }

    fn from_document(document: &Document) -> SyncResult<Self> {
        let mut record: Self = serde_json::from_value(document.data.clone()).map_err(|error| {
            SyncError::Decode(format!("document {}: {error}", document.id))
        })?;
        record.set_id(document.id.clone());
        record.validate()?;
        Ok(record)
    }

    /// Stored fields, without the id.
    fn to_fields(&self) -> SyncResult<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.remove("id");
        }
        Ok(value)
    }
}

/// Decode every document, skipping those that fail.
pub fn decode_all<T: Record>(collection: &str, documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|document| match T::from_document(document) {
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(
                    "skipping document {} in {}: {}",
                    document.id,
                    collection,
                    error
                );
                None
            }
        })
        .collect()
}

pub(crate) fn object_mut(value: &mut Value) -> SyncResult<&mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| SyncError::InvalidInput("document data must be an object".to_string()))
}
