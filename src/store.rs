//! Loose-object storage: a zlib-compressed, two-level fan-out filesystem
//! store with atomic writes and a process-local read cache.

use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::object::{Object, ObjectKind};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, trace};

/// A filesystem-backed store for loose objects rooted at `<git_dir>/objects`.
///
/// The read cache is owned by the handle — there is no process-wide
/// singleton — and is guarded by a reader-writer lock so concurrent reads
/// never block each other; writers briefly exclude on cache insertion.
pub struct ObjectStore {
    objects_dir: PathBuf,
    cache: RwLock<HashMap<ObjectId, Object>>,
}

impl ObjectStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        ObjectStore {
            objects_dir: git_dir.as_ref().join("objects"),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Ensures `objects/`, all 256 fan-out subdirectories, `objects/pack/`
    /// and `objects/info/` exist. Idempotent.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.objects_dir)?;
        fs::create_dir_all(self.objects_dir.join("pack"))?;
        fs::create_dir_all(self.objects_dir.join("info"))?;
        for i in 0u16..256 {
            fs::create_dir_all(self.objects_dir.join(format!("{:02x}", i)))?;
        }
        Ok(())
    }

    fn path_for(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_hex();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Returns `true` if `id` is present, checking the cache before
    /// stat-probing the filesystem. No read of file contents is required.
    pub fn has(&self, id: &ObjectId) -> bool {
        if self.cache.read().unwrap().contains_key(id) {
            return true;
        }
        self.path_for(id).is_file()
    }

    /// Writes `obj` to disk if absent. A present id is a no-op success —
    /// the object is content-addressed, so a second write is a duplicate
    /// of identical bytes by construction.
    pub fn write(&self, obj: &Object) -> Result<ObjectId> {
        let id = obj.id();
        if self.has(&id) {
            trace!(id = %id, "object already present, skipping write");
            return Ok(id);
        }
        let payload = obj.serialize();
        let mut framed = Vec::with_capacity(payload.len() + 32);
        framed.extend_from_slice(obj.kind().as_str().as_bytes());
        framed.push(b' ');
        framed.extend_from_slice(payload.len().to_string().as_bytes());
        framed.push(0);
        framed.extend_from_slice(&payload);

        let dir = self.objects_dir.join(&id.to_hex()[..2]);
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        {
            let mut encoder = ZlibEncoder::new(&mut tmp, Compression::default());
            encoder.write_all(&framed)?;
            encoder.finish()?;
        }
        let final_path = self.path_for(&id);
        tmp.as_file().set_permissions(fs::Permissions::from_mode(0o444))?;
        tmp.persist(&final_path)
            .map_err(|e| Error::Io(e.error))?;

        self.cache.write().unwrap().insert(id, obj.clone());
        debug!(id = %id, kind = %obj.kind(), "wrote loose object");
        Ok(id)
    }

    /// Reads and parses the object for `id`, populating the cache on miss.
    pub fn read(&self, id: &ObjectId) -> Result<Object> {
        if let Some(obj) = self.cache.read().unwrap().get(id) {
            return Ok(obj.clone());
        }
        let path = self.path_for(id);
        let file = fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(e)
            }
        })?;
        let mut decoder = ZlibDecoder::new(file);
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| Error::Decompress(e.to_string()))?;

        let nul = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::InvalidFormat("loose object missing header NUL".into()))?;
        let header = std::str::from_utf8(&raw[..nul])
            .map_err(|_| Error::InvalidFormat("loose object header is not UTF-8".into()))?;
        let (kind_text, size_text) = header
            .split_once(' ')
            .ok_or_else(|| Error::InvalidFormat(format!("malformed loose object header {header:?}")))?;
        let kind = ObjectKind::parse(kind_text)?;
        let declared_size: usize = size_text
            .parse()
            .map_err(|_| Error::InvalidFormat(format!("non-numeric size in header {header:?}")))?;
        let payload = &raw[nul + 1..];
        if payload.len() != declared_size {
            return Err(Error::InvalidFormat(format!(
                "size mismatch: header says {declared_size}, payload is {} bytes",
                payload.len()
            )));
        }
        let obj = Object::parse(kind, payload)?;
        if obj.id() != *id {
            return Err(Error::InvalidFormat(format!(
                "object content does not hash to the requested id {id}"
            )));
        }
        self.cache.write().unwrap().insert(*id, obj.clone());
        Ok(obj)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Blob;
    use tempfile::tempdir;

    #[test]
    fn init_creates_fan_out_dirs() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.init().unwrap();
        assert!(dir.path().join("objects/00").is_dir());
        assert!(dir.path().join("objects/ff").is_dir());
        assert!(dir.path().join("objects/pack").is_dir());
        assert!(dir.path().join("objects/info").is_dir());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.init().unwrap();
        let blob = Blob::new(b"hello world\n".to_vec());
        let obj = Object::Blob(blob.clone());
        let id = store.write(&obj).unwrap();
        assert_eq!(id, blob.id());
        assert!(store.has(&id));

        let fresh = ObjectStore::new(dir.path());
        let read_back = fresh.read(&id).unwrap();
        assert_eq!(read_back.id(), id);
        match read_back {
            Object::Blob(b) => assert_eq!(b.content, b"hello world\n"),
            _ => panic!("expected blob"),
        }
    }

    #[test]
    fn idempotent_write() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.init().unwrap();
        let obj = Object::Blob(Blob::new(b"x".to_vec()));
        let id1 = store.write(&obj).unwrap();
        let path = store.path_for(&id1);
        let mtime1 = fs::metadata(&path).unwrap().modified().unwrap();
        let id2 = store.write(&obj).unwrap();
        let mtime2 = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(id1, id2);
        assert_eq!(mtime1, mtime2);
    }

    #[test]
    fn read_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.init().unwrap();
        let missing = ObjectId::parse("0000000000000000000000000000000000000001").unwrap();
        assert!(matches!(store.read(&missing), Err(Error::NotFound)));
    }

    #[test]
    fn loose_file_is_read_only() {
        let dir = tempdir().unwrap();
        let store = ObjectStore::new(dir.path());
        store.init().unwrap();
        let obj = Object::Blob(Blob::new(b"ro".to_vec()));
        let id = store.write(&obj).unwrap();
        let meta = fs::metadata(store.path_for(&id)).unwrap();
        assert!(meta.permissions().readonly());
    }
}
