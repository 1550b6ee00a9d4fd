//! Filesystem object store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use weather_core::{CityKey, CompactTimestamp, ObjectPath, StorageError, WeatherSnapshot};

use super::{decode_object, encode_pretty, object_name, ObjectStore};

fn io_error(path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// One pretty-printed JSON file per snapshot under a root directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees a half-written object.
pub struct FsObjectStore {
    root: PathBuf,
    tmp_seq: AtomicU64,
}

impl FsObjectStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .await
            .map_err(|e| io_error(&root, e))?;
        Ok(Self {
            root,
            tmp_seq: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the object for `(city, timestamp)` lives.
    pub fn path_for(&self, city: &CityKey, timestamp: &CompactTimestamp) -> PathBuf {
        self.root.join(object_name(city, timestamp))
    }

    fn temp_path_for(&self, name: &str) -> PathBuf {
        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".{}.{}-{}.tmp", name, std::process::id(), seq))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn store(
        &self,
        city: &CityKey,
        timestamp: &CompactTimestamp,
        snapshot: &WeatherSnapshot,
    ) -> Result<ObjectPath, StorageError> {
        let name = object_name(city, timestamp);
        let path = self.root.join(&name);
        let temp_path = self.temp_path_for(&name);
        let data = encode_pretty(snapshot)?;

        // Write atomically
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        file.sync_all()
            .await
            .map_err(|e| io_error(&temp_path, e))?;
        drop(file);

        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_error(&path, e));
        }

        debug!(city = %city, path = %path.display(), bytes = data.len(), "Stored snapshot");
        Ok(ObjectPath::new(path.display().to_string()))
    }

    async fn read(&self, path: &ObjectPath) -> Result<WeatherSnapshot, StorageError> {
        let fs_path = Path::new(path.as_str());
        let bytes = fs::read(fs_path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => StorageError::NotFound {
                path: path.to_string(),
            },
            _ => io_error(fs_path, e),
        })?;
        decode_object(path, &bytes)
    }
}
