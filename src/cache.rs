//! Persistent build cache keyed by content fingerprint.
//!
//! Optimized artifacts live under `.cache/img/<hash>.<ext>` next to a cbor
//! manifest with per-entry metadata. The store survives process restarts
//! until explicitly cleared; a hit returns the stored bytes unchanged, so
//! repeated builds over an unchanged source tree are byte-identical.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::hash::Hash32;

const MANIFEST: &str = "manifest.cbor";
const DIR_IMG: &str = "img";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Source path the artifact was computed from, for diagnostics only.
    pub source: String,
    /// Artifact file extension.
    pub ext: String,
    /// Artifact size in bytes.
    pub len: u64,
}

pub struct Store {
    root: Utf8PathBuf,
    manifest: Mutex<HashMap<String, EntryMeta>>,
}

impl Store {
    /// Open or create the store rooted at `root`.
    pub fn open(root: impl Into<Utf8PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        fs::create_dir_all(root.join(DIR_IMG))?;

        let path = root.join(MANIFEST);
        let manifest = if path.exists() {
            let file = BufReader::new(File::open(&path)?);
            ciborium::from_reader(file)?
        } else {
            HashMap::new()
        };

        Ok(Self {
            root,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.manifest.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetch the artifact stored under `hash`, if any. A manifest entry
    /// whose artifact file went missing counts as a miss.
    pub fn lookup(&self, hash: Hash32) -> Result<Option<Vec<u8>>, CacheError> {
        let key = hash.to_hex();
        let meta = match self.manifest.lock().unwrap().get(&key) {
            Some(meta) => meta.clone(),
            None => return Ok(None),
        };

        let path = self.artifact_path(&key, &meta.ext);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store an artifact under `hash`. Entries are keyed uniquely by the
    /// fingerprint, so concurrent writers to different entries never
    /// conflict; the manifest itself is guarded by a lock.
    pub fn save(
        &self,
        hash: Hash32,
        source: &Utf8Path,
        ext: &str,
        bytes: &[u8],
    ) -> Result<(), CacheError> {
        let key = hash.to_hex();
        fs::write(self.artifact_path(&key, ext), bytes)?;

        let mut manifest = self.manifest.lock().unwrap();
        manifest.insert(
            key,
            EntryMeta {
                source: source.to_string(),
                ext: ext.to_string(),
                len: bytes.len() as u64,
            },
        );
        self.persist(&manifest)
    }

    /// Remove every artifact and the manifest.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut manifest = self.manifest.lock().unwrap();
        manifest.clear();

        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        fs::create_dir_all(self.root.join(DIR_IMG))?;

        Ok(())
    }

    fn artifact_path(&self, key: &str, ext: &str) -> Utf8PathBuf {
        self.root.join(DIR_IMG).join(key).with_extension(ext)
    }

    fn persist(&self, manifest: &HashMap<String, EntryMeta>) -> Result<(), CacheError> {
        let file = BufWriter::new(File::create(self.root.join(MANIFEST))?);
        ciborium::into_writer(manifest, file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> Store {
        let root = Utf8PathBuf::try_from(dir.path().join(".cache")).unwrap();
        Store::open(root).unwrap()
    }

    #[test]
    fn save_then_lookup_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let hash = Hash32::hash(b"input");
        store
            .save(hash, Utf8Path::new("app/images/a.png"), "png", b"artifact")
            .unwrap();

        assert_eq!(store.lookup(hash).unwrap().unwrap(), b"artifact");
        assert!(store.lookup(Hash32::hash(b"other")).unwrap().is_none());
    }

    #[test]
    fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().join(".cache")).unwrap();

        let hash = Hash32::hash(b"input");
        {
            let store = Store::open(root.clone()).unwrap();
            store
                .save(hash, Utf8Path::new("a.png"), "png", b"artifact")
                .unwrap();
        }

        let store = Store::open(root).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.lookup(hash).unwrap().unwrap(), b"artifact");
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let hash = Hash32::hash(b"input");
        store
            .save(hash, Utf8Path::new("a.png"), "png", b"artifact")
            .unwrap();
        store.clear().unwrap();

        assert!(store.is_empty());
        assert!(store.lookup(hash).unwrap().is_none());
    }

    #[test]
    fn missing_artifact_file_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);

        let hash = Hash32::hash(b"input");
        store
            .save(hash, Utf8Path::new("a.png"), "png", b"artifact")
            .unwrap();

        fs::remove_file(store.artifact_path(&hash.to_hex(), "png")).unwrap();
        assert!(store.lookup(hash).unwrap().is_none());
    }
}
