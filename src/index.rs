//! The binary staging index (format version 2): ordered entries, a
//! trailing SHA-1 checksum, and atomic whole-file replacement.

use crate::error::{Error, Result};
use crate::id::{ObjectId, ID_LEN};
use crate::object::FileMode;
use crate::worktree;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tempfile::NamedTempFile;

const MAGIC: &[u8; 4] = b"DIRC";
const SUPPORTED_VERSIONS: &[u32] = &[2, 3, 4];

/// Merge stage, packed into flags bits 12–13. Stage 0 is "normal", not
/// a conflict; stages 1–3 are base/ours/theirs during a merge.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Stage(u8);

impl Stage {
    pub fn new(value: u8) -> Self {
        Stage(value & 0b11)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct IndexEntry {
    pub ctime_sec: u32,
    pub ctime_nsec: u32,
    pub mtime_sec: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub mode: FileMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u32,
    pub id: ObjectId,
    pub stage: Stage,
    pub path: String,
}

impl IndexEntry {
    fn flags(&self) -> u16 {
        let name_len = self.path.len().min(0xFFF) as u16;
        let stage_bits = (self.stage.value() as u16) << 12;
        stage_bits | name_len
    }

    /// `true` if cached size/mode and current stat info agree — used to
    /// skip re-hashing an unchanged file during `update-index`.
    pub fn stat_matches(&self, size: u64, mode: FileMode) -> bool {
        self.size as u64 == size && self.mode == mode
    }

    /// `true` if cached mtime/ctime agree with freshly-read values.
    pub fn times_match(&self, mtime_sec: u32, mtime_nsec: u32) -> bool {
        self.mtime_sec == mtime_sec && self.mtime_nsec == mtime_nsec
    }
}

pub struct Index {
    version: u32,
    entries: Vec<IndexEntry>,
    by_path: BTreeMap<String, usize>,
}

impl Index {
    pub fn new() -> Self {
        Index {
            version: 2,
            entries: Vec::new(),
            by_path: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.by_path.get(path).map(|&i| &self.entries[i])
    }

    /// Inserts `entry`, replacing any existing entry with the same path,
    /// and keeps the entry list sorted by path.
    pub fn add(&mut self, entry: IndexEntry) -> Result<()> {
        if entry.path.is_empty() {
            return Err(Error::EmptyPath);
        }
        if let Some(&i) = self.by_path.get(&entry.path) {
            self.entries[i] = entry;
        } else {
            self.entries.push(entry);
        }
        self.resort();
        Ok(())
    }

    pub fn remove(&mut self, path: &str) -> Result<()> {
        let i = self.by_path.get(path).copied().ok_or(Error::NotFound)?;
        self.entries.remove(i);
        self.resort();
        Ok(())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_path.clear();
    }

    fn resort(&mut self) {
        self.entries.sort_by(|a, b| a.path.cmp(&b.path));
        self.by_path = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path.clone(), i))
            .collect();
    }

    pub fn write<W: Write>(&self, mut sink: W) -> Result<()> {
        let mut hasher = HashingWriter {
            inner: &mut sink,
            hasher: Sha1::new(),
        };
        hasher.write_all(MAGIC)?;
        hasher.write_all(&self.version.to_be_bytes())?;
        hasher.write_all(&(self.entries.len() as u32).to_be_bytes())?;
        for entry in &self.entries {
            write_entry(&mut hasher, entry)?;
        }
        let digest: [u8; 20] = hasher.hasher.finalize().into();
        sink.write_all(&digest)?;
        Ok(())
    }

    pub fn read<R: Read>(mut source: R) -> Result<Self> {
        let mut all = Vec::new();
        source.read_to_end(&mut all)?;
        if all.len() < 12 + ID_LEN {
            return Err(Error::Truncated);
        }
        let (header_and_entries, trailer) = all.split_at(all.len() - ID_LEN);
        if &header_and_entries[0..4] != MAGIC {
            return Err(Error::InvalidFormat("bad index magic".into()));
        }
        let version = u32::from_be_bytes(header_and_entries[4..8].try_into().unwrap());
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(Error::UnsupportedVersion(version));
        }
        let count = u32::from_be_bytes(header_and_entries[8..12].try_into().unwrap());

        let mut hasher = Sha1::new();
        hasher.update(&header_and_entries[..12]);

        let mut cursor = &header_and_entries[12..];
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (entry, consumed) = read_entry(cursor)?;
            hasher.update(&cursor[..consumed]);
            cursor = &cursor[consumed..];
            entries.push(entry);
        }
        if !cursor.is_empty() {
            return Err(Error::Truncated);
        }
        let computed: [u8; 20] = hasher.finalize().into();
        if computed != *trailer {
            return Err(Error::ChecksumMismatch);
        }

        let mut index = Index {
            version,
            entries: Vec::new(),
            by_path: BTreeMap::new(),
        };
        for entry in entries {
            index.entries.push(entry);
        }
        index.resort();
        Ok(index)
    }

    /// Serializes to `<path>.<random>` in the same directory, then
    /// renames over `path` so readers always see a complete file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        self.write(&mut tmp)?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = fs::File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(e)
            }
        })?;
        Self::read(file)
    }

    /// `true` if `entry`'s cached size, mode, mtime, dev, and inode all
    /// agree with `metadata` — the working-tree file is unchanged since
    /// it was staged, so `update-index` can skip rehashing it.
    pub fn is_up_to_date(entry: &IndexEntry, metadata: &fs::Metadata) -> bool {
        let mode = worktree::mode_from_metadata(metadata);
        entry.stat_matches(metadata.len(), mode)
            && entry.times_match(metadata.mtime() as u32, metadata.mtime_nsec() as u32)
            && entry.dev == metadata.dev() as u32
            && entry.ino == metadata.ino() as u32
    }
}

impl Default for Index {
    fn default() -> Self {
        Index::new()
    }
}

struct HashingWriter<'a, W> {
    inner: &'a mut W,
    hasher: Sha1,
}

impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn write_entry<W: Write>(w: &mut W, entry: &IndexEntry) -> Result<()> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&entry.ctime_sec.to_be_bytes());
    buf.extend_from_slice(&entry.ctime_nsec.to_be_bytes());
    buf.extend_from_slice(&entry.mtime_sec.to_be_bytes());
    buf.extend_from_slice(&entry.mtime_nsec.to_be_bytes());
    buf.extend_from_slice(&entry.dev.to_be_bytes());
    buf.extend_from_slice(&entry.ino.to_be_bytes());
    buf.extend_from_slice(&entry.mode.octal().to_be_bytes());
    buf.extend_from_slice(&entry.uid.to_be_bytes());
    buf.extend_from_slice(&entry.gid.to_be_bytes());
    buf.extend_from_slice(&entry.size.to_be_bytes());
    buf.extend_from_slice(entry.id.as_bytes());
    buf.extend_from_slice(&entry.flags().to_be_bytes());
    buf.extend_from_slice(entry.path.as_bytes());
    buf.push(0);
    while buf.len() % 8 != 0 {
        buf.push(0);
    }
    w.write_all(&buf)?;
    Ok(())
}

/// Parses one entry out of `data`, returning it along with the number of
/// bytes consumed (including NUL terminator and padding).
fn read_entry(data: &[u8]) -> Result<(IndexEntry, usize)> {
    const FIXED: usize = 4 * 10 + ID_LEN + 2;
    if data.len() < FIXED + 1 {
        return Err(Error::Truncated);
    }
    let u32_at = |off: usize| -> u32 { u32::from_be_bytes(data[off..off + 4].try_into().unwrap()) };
    let ctime_sec = u32_at(0);
    let ctime_nsec = u32_at(4);
    let mtime_sec = u32_at(8);
    let mtime_nsec = u32_at(12);
    let dev = u32_at(16);
    let ino = u32_at(20);
    let mode_bits = u32_at(24);
    let uid = u32_at(28);
    let gid = u32_at(32);
    let size = u32_at(36);
    let mut id_bytes = [0u8; ID_LEN];
    id_bytes.copy_from_slice(&data[40..40 + ID_LEN]);
    let id = ObjectId::from_bytes(id_bytes);
    let flags = u16::from_be_bytes(data[40 + ID_LEN..42 + ID_LEN].try_into().unwrap());
    let stage = Stage::new(((flags >> 12) & 0b11) as u8);
    let name_len_hint = (flags & 0xFFF) as usize;

    let name_start = FIXED;
    let path_bytes = &data[name_start..];
    let name_len = if name_len_hint == 0xFFF {
        path_bytes
            .iter()
            .position(|&b| b == 0)
            .ok_or(Error::Truncated)?
    } else {
        if path_bytes.len() < name_len_hint {
            return Err(Error::Truncated);
        }
        name_len_hint
    };
    if path_bytes.len() < name_len + 1 {
        return Err(Error::Truncated);
    }
    if path_bytes[name_len] != 0 {
        return Err(Error::InvalidFormat("index path missing NUL terminator".into()));
    }
    let path = std::str::from_utf8(&path_bytes[..name_len])
        .map_err(|_| Error::InvalidFormat("index path is not valid UTF-8".into()))?
        .to_string();
    let mode = FileMode::parse_octal(&format!("{:o}", mode_bits))
        .map_err(|_| Error::InvalidFormat(format!("invalid index entry mode {mode_bits:#o}")))?;

    let mut consumed = name_start + name_len + 1;
    while consumed % 8 != 0 {
        if consumed >= data.len() {
            break;
        }
        consumed += 1;
    }

    Ok((
        IndexEntry {
            ctime_sec,
            ctime_nsec,
            mtime_sec,
            mtime_nsec,
            dev,
            ino,
            mode,
            uid,
            gid,
            size,
            id,
            stage,
            path,
        },
        consumed,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob_id(content: &[u8]) -> ObjectId {
        crate::id::compute_id(crate::object::ObjectKind::Blob, content)
    }

    fn make_entry(path: &str, content: &[u8]) -> IndexEntry {
        IndexEntry {
            ctime_sec: 1_704_067_200,
            ctime_nsec: 0,
            mtime_sec: 1_704_067_200,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode: FileMode::Regular,
            uid: 0,
            gid: 0,
            size: content.len() as u32,
            id: blob_id(content),
            stage: Stage::default(),
            path: path.to_string(),
        }
    }

    #[test]
    fn round_trips_two_entries() {
        let mut index = Index::new();
        index.add(make_entry("file2.txt", b"test2")).unwrap();
        index.add(make_entry("file1.txt", b"test1")).unwrap();

        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();
        assert!(buf.len() >= 12 + 20);

        let read_back = Index::read(&buf[..]).unwrap();
        assert_eq!(read_back.len(), 2);
        assert_eq!(read_back.entries()[0].path, "file1.txt");
        assert_eq!(read_back.entries()[1].path, "file2.txt");
        assert_eq!(read_back.get("file1.txt").unwrap().id, blob_id(b"test1"));
    }

    #[test]
    fn add_replaces_existing_path() {
        let mut index = Index::new();
        index.add(make_entry("a.txt", b"one")).unwrap();
        index.add(make_entry("a.txt", b"two")).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a.txt").unwrap().id, blob_id(b"two"));
    }

    #[test]
    fn remove_missing_is_not_found() {
        let mut index = Index::new();
        assert!(matches!(index.remove("nope"), Err(Error::NotFound)));
    }

    #[test]
    fn checksum_mismatch_on_any_flipped_byte() {
        let mut index = Index::new();
        index.add(make_entry("a.txt", b"one")).unwrap();
        let mut buf = Vec::new();
        index.write(&mut buf).unwrap();

        let mut corrupted = buf.clone();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xFF;
        assert!(matches!(Index::read(&corrupted[..]), Err(Error::ChecksumMismatch)));

        let mut corrupted_body = buf.clone();
        corrupted_body[13] ^= 0xFF;
        assert!(matches!(
            Index::read(&corrupted_body[..]),
            Err(Error::ChecksumMismatch)
        ));
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&99u32.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        let mut hasher = Sha1::new();
        hasher.update(&buf);
        buf.extend_from_slice(&<[u8; 20]>::from(hasher.finalize()));
        assert!(matches!(
            Index::read(&buf[..]),
            Err(Error::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn stage_mask_is_always_two_bits() {
        for n in 0u8..=255 {
            let s = Stage::new(n);
            assert!(s.value() <= 3);
        }
    }

    #[test]
    fn write_to_file_replaces_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index");
        let mut index = Index::new();
        index.add(make_entry("a.txt", b"one")).unwrap();
        index.write_to_file(&path).unwrap();
        let read_back = Index::read_from_file(&path).unwrap();
        assert_eq!(read_back.get("a.txt").unwrap().id, blob_id(b"one"));
    }

    #[test]
    fn is_up_to_date_tracks_real_stat_fields() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        std::fs::write(&file_path, b"one").unwrap();
        let metadata = std::fs::metadata(&file_path).unwrap();

        let mut index = Index::new();
        let mut entry = make_entry("a.txt", b"one");
        entry.size = metadata.len() as u32;
        entry.mode = FileMode::Regular;
        entry.mtime_sec = metadata.mtime() as u32;
        entry.mtime_nsec = metadata.mtime_nsec() as u32;
        entry.dev = metadata.dev() as u32;
        entry.ino = metadata.ino() as u32;
        index.add(entry).unwrap();

        assert!(Index::is_up_to_date(
            index.get("a.txt").unwrap(),
            &metadata
        ));

        std::fs::write(&file_path, b"changed").unwrap();
        let changed_metadata = std::fs::metadata(&file_path).unwrap();
        assert!(!Index::is_up_to_date(
            index.get("a.txt").unwrap(),
            &changed_metadata
        ));
    }
}
