use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SyncError, SyncResult};
use crate::storage::Storage;

/// One pretty-printed JSON file per key under `root`; leading keys become
/// directories.
///
/// Writes land in a sibling `.tmp` file first and are renamed into place.
/// A file that is not valid JSON reads as [`SyncError::Decode`].
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, keys: &[&str]) -> SyncResult<PathBuf> {
        let Some((file, dirs)) = keys.split_last() else {
            return Err(SyncError::InvalidInput("storage keys empty".to_string()));
        };
        keys.iter().copied().try_for_each(check_key)?;
        let mut path: PathBuf = dirs.iter().fold(self.root.clone(), |path, dir| path.join(dir));
        path.push(match file.strip_suffix(".json") {
            Some(_) => file.to_string(),
            None => format!("{file}.json"),
        });
        Ok(path)
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn write(&self, keys: &[&str], data: &Value) -> SyncResult<()> {
        let path = self.path_for(keys)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(io_error("create directory", dir))?;
        }
        let bytes = serde_json::to_vec_pretty(data)?;
        let staged = path.with_extension("json.tmp");
        tokio::fs::write(&staged, bytes)
            .await
            .map_err(io_error("write", &staged))?;
        tokio::fs::rename(&staged, &path)
            .await
            .map_err(io_error("replace", &path))
    }

    async fn read(&self, keys: &[&str]) -> SyncResult<Option<Value>> {
        let path = self.path_for(keys)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(io_error("read", &path)(error)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|error| {
            SyncError::Decode(format!("{} is not valid JSON: {error}", path.display()))
        })
    }

    async fn delete(&self, keys: &[&str]) -> SyncResult<()> {
        let path = self.path_for(keys)?;
        match tokio::fs::remove_file(&path).await {
            Err(error) if error.kind() != ErrorKind::NotFound => {
                Err(io_error("delete", &path)(error))
            }
            _ => Ok(()),
        }
    }
}

fn check_key(key: &str) -> SyncResult<()> {
    let traversal = matches!(key, "" | "." | "..");
    if traversal || key.contains(['/', '\\']) {
        return Err(SyncError::InvalidInput(format!("invalid storage key {key:?}")));
    }
    Ok(())
}

fn io_error<'a>(
    action: &'a str,
    path: &'a Path,
) -> impl FnOnce(std::io::Error) -> SyncError + 'a {
    move |error| SyncError::Storage(format!("failed to {action} {}: {error}", path.display()))
}
