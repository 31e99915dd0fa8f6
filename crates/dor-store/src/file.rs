use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{StoreError, StoreResult};
use crate::traits::ContentStore;

const TEMP_SUFFIX: &str = ".tmp";

/// Filesystem-backed content store.
///
/// Each id is stored as one file named by the hex encoding of the id, so
/// ids containing `:` or `+` map to portable file names. Replacements are
/// written to a sibling temp file and renamed into place.
#[derive(Debug)]
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    /// Open (or create) a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> StoreResult<PathBuf> {
        if id.is_empty() {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.root.join(hex::encode(id.as_bytes())))
    }

    fn write_atomically(path: &Path, content: &[u8]) -> StoreResult<()> {
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(TEMP_SUFFIX);
        let tmp = PathBuf::from(tmp);
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(content)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl ContentStore for FileContentStore {
    fn add(&self, id: &str, content: &[u8]) -> StoreResult<()> {
        let path = self.path_for(id)?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content)?;
        file.sync_all()?;
        debug!(id, len = content.len(), "content added");
        Ok(())
    }

    fn replace(&self, id: &str, content: &[u8]) -> StoreResult<()> {
        let path = self.path_for(id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Self::write_atomically(&path, content)?;
        debug!(id, len = content.len(), "content replaced");
        Ok(())
    }

    fn retrieve(&self, id: &str) -> StoreResult<Bytes> {
        let path = self.path_for(id)?;
        match fs::read(&path) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.path_for(id)?.is_file())
    }

    fn list(&self) -> StoreResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| StoreError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            // Foreign files that are not hex-encoded ids are skipped.
            if let Some(id) = hex::decode(name.as_bytes())
                .ok()
                .and_then(|raw| String::from_utf8(raw).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}
