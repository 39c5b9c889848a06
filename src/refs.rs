//! Reference manager: branches, tags, `HEAD`, packed-refs, and
//! compare-and-swap updates guarded by on-disk lock files.

use crate::error::{Error, Result};
use crate::id::ObjectId;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const RESOLVE_PREFIXES: &[&str] = &[
    "",
    "refs/",
    "refs/heads/",
    "refs/tags/",
    "refs/remotes/",
    "refs/remotes/origin/",
];

const MAX_SYMBOLIC_CHAIN: usize = 5;

pub struct RefStore {
    git_dir: PathBuf,
}

/// The result of reading `HEAD`: the resolved id, and — unless HEAD is
/// detached — the branch ref name it points to.
pub struct Head {
    pub id: ObjectId,
    pub refname: Option<String>,
}

impl RefStore {
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        RefStore {
            git_dir: git_dir.as_ref().to_path_buf(),
        }
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.git_dir.join(name)
    }

    /// Reads a ref file's raw content directly, without following
    /// symbolic refs or searching prefixes. Returns `None` if it is
    /// absent on disk and not present in packed-refs.
    fn read_raw(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.ref_path(name)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let packed = self.read_packed_refs()?;
                Ok(packed.get(name).map(|id| format!("{id}\n")))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// `HEAD` resolution: `"ref: <target>\n"` chases the symbolic target
    /// through [`resolve`]; otherwise the content is a direct 40-hex id.
    pub fn head(&self) -> Result<Head> {
        let content = fs::read_to_string(self.ref_path("HEAD")).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(e)
            }
        })?;
        let trimmed = content.trim();
        if let Some(target) = trimmed.strip_prefix("ref: ") {
            let target = target.trim();
            let id = self.resolve(target)?;
            Ok(Head {
                id,
                refname: Some(target.to_string()),
            })
        } else {
            Ok(Head {
                id: ObjectId::parse(trimmed)?,
                refname: None,
            })
        }
    }

    pub fn set_head_symbolic(&self, refname: &str) -> Result<()> {
        fs::write(self.ref_path("HEAD"), format!("ref: {refname}\n"))?;
        Ok(())
    }

    pub fn set_head_detached(&self, id: ObjectId) -> Result<()> {
        fs::write(self.ref_path("HEAD"), format!("{id}\n"))?;
        Ok(())
    }

    /// Resolves a name to an id, trying it as-is and then under each
    /// prefix in [`RESOLVE_PREFIXES`], chasing symbolic refs with a
    /// bounded chain length to detect cycles.
    pub fn resolve(&self, name: &str) -> Result<ObjectId> {
        self.resolve_chain(name, 0)
    }

    fn resolve_chain(&self, name: &str, depth: usize) -> Result<ObjectId> {
        if depth >= MAX_SYMBOLIC_CHAIN {
            return Err(Error::Cycle);
        }
        for prefix in RESOLVE_PREFIXES {
            let candidate = format!("{prefix}{name}");
            if let Some(content) = self.read_raw(&candidate)? {
                let trimmed = content.trim();
                if let Some(target) = trimmed.strip_prefix("ref: ") {
                    return self.resolve_chain(target.trim(), depth + 1);
                }
                return ObjectId::parse(trimmed);
            }
        }
        Err(Error::NotFound)
    }

    /// Creates or overwrites a direct ref, creating parent directories.
    pub fn update(&self, name: &str, id: ObjectId) -> Result<()> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, format!("{id}\n"))?;
        Ok(())
    }

    /// Compare-and-swap update guarded by a `<refpath>.lock` file created
    /// with exclusive-create semantics.
    pub fn cas_update(
        &self,
        name: &str,
        new_id: ObjectId,
        expected_old_id: Option<ObjectId>,
    ) -> Result<()> {
        let path = self.ref_path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = {
            let mut p = path.clone().into_os_string();
            p.push(".lock");
            PathBuf::from(p)
        };
        let mut lock_file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::Locked
                } else {
                    Error::Io(e)
                }
            })?;
        trace!(refname = name, "acquired ref lock");

        let result = (|| -> Result<()> {
            if let Some(expected) = expected_old_id {
                let current = self.resolve(name).unwrap_or(ObjectId::ZERO);
                if current != expected {
                    return Err(Error::Conflict {
                        expected: expected.to_hex(),
                        actual: current.to_hex(),
                    });
                }
            }
            lock_file.write_all(format!("{new_id}\n").as_bytes())?;
            lock_file.sync_all()?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                fs::rename(&lock_path, &path)?;
                debug!(refname = name, id = %new_id, "cas_update committed");
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&lock_path);
                Err(e)
            }
        }
    }

    pub fn create_branch(&self, name: &str, id: ObjectId) -> Result<()> {
        if !is_valid_ref_name(name) {
            return Err(Error::InvalidFormat(format!("invalid branch name {name:?}")));
        }
        self.update(&format!("refs/heads/{name}"), id)
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let path = self.ref_path(&format!("refs/heads/{name}"));
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(e)
            }
        })
    }

    pub fn create_tag(&self, name: &str, id: ObjectId) -> Result<()> {
        if !is_valid_ref_name(name) {
            return Err(Error::InvalidFormat(format!("invalid tag name {name:?}")));
        }
        self.update(&format!("refs/tags/{name}"), id)
    }

    pub fn delete_tag(&self, name: &str) -> Result<()> {
        let path = self.ref_path(&format!("refs/tags/{name}"));
        fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound
            } else {
                Error::Io(e)
            }
        })
    }

    fn list_under(&self, subtree: &str) -> Result<Vec<String>> {
        let root = self.ref_path(subtree);
        let mut names = Vec::new();
        if root.is_dir() {
            walk_refs(&root, subtree, &mut names)?;
        }
        for (name, _) in self.read_packed_refs()? {
            if name.starts_with(subtree) && !names.contains(&name) {
                names.push(name);
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn list_branches(&self) -> Result<Vec<String>> {
        self.list_under("refs/heads/")
    }

    pub fn list_tags(&self) -> Result<Vec<String>> {
        self.list_under("refs/tags/")
    }

    /// The branch name `HEAD` points to, or an error if `HEAD` is
    /// detached or the ref does not live under `refs/heads/`.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.head()?;
        match head.refname {
            Some(name) => name
                .strip_prefix("refs/heads/")
                .map(str::to_string)
                .ok_or(Error::NotFound),
            None => Err(Error::NotFound),
        }
    }

    /// Parses `<git_dir>/packed-refs`: blank lines and `#` comments are
    /// skipped; malformed lines are silently dropped.
    pub fn read_packed_refs(&self) -> Result<BTreeMap<String, ObjectId>> {
        let path = self.git_dir.join("packed-refs");
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(Error::Io(e)),
        };
        let mut map = BTreeMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            if let Some((hex, name)) = line.split_once(' ') {
                if let Ok(id) = ObjectId::parse(hex) {
                    map.insert(name.to_string(), id);
                }
            }
        }
        Ok(map)
    }
}

fn walk_refs(dir: &Path, prefix: &str, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if path.is_dir() {
            walk_refs(&path, &format!("{prefix}{file_name}/"), out)?;
        } else {
            out.push(format!("{prefix}{file_name}"));
        }
    }
    Ok(())
}

/// Rejects: empty names; a leading or trailing `/`; `//`; and any of
/// `. .. <space> ~ ^ : ? * [ \`. This core treats dots as forbidden
/// anywhere in a segment, which is stricter than real git, which permits
/// dots in tag names like `v1.0`.
pub fn is_valid_ref_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return false;
    }
    const FORBIDDEN: &[char] = &['.', ' ', '~', '^', ':', '?', '*', '[', '\\'];
    !name.chars().any(|c| FORBIDDEN.contains(&c))
}
