//! Directory-backed storage
//!
//! Layout: `<root>/<id>/<class>_<version>.blob`, ids and classes in
//! fixed-width hex. Blobs are zstd-compressed and written atomically
//! through a temporary file.

use super::storage::DomainStorage;
use crate::error::StorageError;
use crate::logging::{error, trace};
use crate::obj::{ClassId, ObjId};
use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const BLOB_EXTENSION: &str = "blob";

pub struct FileStorage {
    root: PathBuf,
    /// zstd level (1-22)
    compression_level: i32,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(StorageError::NotADirectory(root));
        }
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;

        Ok(Self {
            root,
            compression_level: 3,
        })
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level.clamp(1, 22);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_dir(&self, id: ObjId) -> PathBuf {
        self.root.join(format!("{:08x}", id.raw()))
    }

    fn blob_path(&self, id: ObjId, class: ClassId, version: u8) -> PathBuf {
        self.object_dir(id)
            .join(format!("{:08x}_{}.{}", class.raw(), version, BLOB_EXTENSION))
    }

    fn write_blob(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let compressed = zstd::encode_all(bytes, self.compression_level)?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(&compressed)?;
        file.sync_all()?;

        fs::rename(temp_path, path)
    }

    fn read_blob(path: &Path) -> io::Result<Vec<u8>> {
        let compressed = fs::read(path)?;
        zstd::decode_all(&compressed[..])
    }

    fn parse_class(file_name: &str) -> Option<ClassId> {
        let stem = file_name.strip_suffix(BLOB_EXTENSION)?.strip_suffix('.')?;
        let (class, version) = stem.split_once('_')?;
        version.parse::<u8>().ok()?;
        u32::from_str_radix(class, 16).ok().map(ClassId::from_raw)
    }
}

impl DomainStorage for FileStorage {
    fn store(&self, id: ObjId, class: ClassId, version: u8, bytes: &[u8]) {
        let path = self.blob_path(id, class, version);
        match self.write_blob(&path, bytes) {
            Ok(()) => trace!(event = "blob_store", path = %path.display(), bytes = bytes.len()),
            Err(e) => error!(event = "blob_store_failed", path = %path.display(), error = %e),
        }
    }

    fn enumerate(&self, id: ObjId) -> Vec<ClassId> {
        let dir = self.object_dir(id);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                error!(event = "blob_enumerate_failed", path = %dir.display(), error = %e);
                return Vec::new();
            }
        };

        let classes: BTreeSet<ClassId> = entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().and_then(Self::parse_class))
            .collect();
        classes.into_iter().collect()
    }

    fn load(&self, id: ObjId, class: ClassId, version: u8) -> Option<Vec<u8>> {
        let path = self.blob_path(id, class, version);
        match Self::read_blob(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                error!(event = "blob_load_failed", path = %path.display(), error = %e);
                None
            }
        }
    }

    fn remove(&self, id: ObjId) {
        let dir = self.object_dir(id);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => error!(event = "blob_remove_failed", path = %dir.display(), error = %e),
        }
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage").field("root", &self.root).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_round_trip() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path()).unwrap();
        let id = ObjId::new(0xabc);
        let class = ClassId::of("file_storage::Blob");

        storage.store(id, class, 4, b"payload bytes");

        assert_eq!(storage.load(id, class, 4).as_deref(), Some(&b"payload bytes"[..]));
        assert_eq!(storage.load(id, class, 3), None);
        assert_eq!(storage.enumerate(id), vec![class]);
    }

    #[test]
    fn test_remove_and_missing() {
        let temp = TempDir::new().unwrap();
        let storage = FileStorage::open(temp.path().join("nested")).unwrap();
        let id = ObjId::new(9);

        assert!(storage.enumerate(id).is_empty());
        storage.store(id, ClassId::of("file_storage::Blob"), 0, b"");
        storage.remove(id);
        assert!(storage.enumerate(id).is_empty());
        storage.remove(id);
    }

    #[test]
    fn test_open_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(matches!(FileStorage::open(&file), Err(StorageError::NotADirectory(_))));
    }

    #[test]
    fn test_parse_class() {
        assert_eq!(FileStorage::parse_class("0000002a_3.blob"), Some(ClassId::from_raw(42)));
        assert_eq!(FileStorage::parse_class("0000002a_3.tmp"), None);
        assert_eq!(FileStorage::parse_class("junk.blob"), None);
    }
}
