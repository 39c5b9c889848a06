//! Working-tree scanning and ignore-pattern filtering: lifts files on
//! disk into the shape the index/object-store need, nothing more.

use crate::object::FileMode;
use std::fs;
use std::io::Read;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use std::time::UNIX_EPOCH;

#[derive(Clone, Debug)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub mode: FileMode,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub is_dir: bool,
}

/// Walks `root`, skipping any directory named `.git` (never descending
/// into it), returning relative POSIX paths for files and directories.
pub fn scan_tree(root: impl AsRef<Path>) -> std::io::Result<Vec<FileInfo>> {
    let root = root.as_ref();
    let mut out = Vec::new();
    walk(root, root, &mut out)?;
    Ok(out)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<FileInfo>) -> std::io::Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    children.sort_by_key(|e| e.file_name());
    for entry in children {
        let path = entry.path();
        if entry.file_name() == ".git" {
            continue;
        }
        let metadata = entry.metadata()?;
        let rel = relative_posix(root, &path);
        let mtime = metadata.modified().unwrap_or(UNIX_EPOCH);
        let since_epoch = mtime.duration_since(UNIX_EPOCH).unwrap_or_default();
        out.push(FileInfo {
            path: rel,
            size: metadata.len(),
            mode: mode_from_metadata(&metadata),
            mtime_sec: since_epoch.as_secs() as i64,
            mtime_nsec: since_epoch.subsec_nanos() as i64,
            is_dir: metadata.is_dir(),
        });
        if metadata.is_dir() {
            walk(root, &path, out)?;
        }
    }
    Ok(())
}

fn relative_posix(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Derives a [`FileMode`] from filesystem metadata: directory, symlink,
/// executable (any of the `0o111` bits set), or a plain regular file.
pub fn mode_from_metadata(metadata: &fs::Metadata) -> FileMode {
    if metadata.is_dir() {
        FileMode::Directory
    } else if metadata.file_type().is_symlink() {
        FileMode::Symlink
    } else if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

/// The file-only projection of [`scan_tree`].
pub fn scan_files(root: impl AsRef<Path>) -> std::io::Result<Vec<FileInfo>> {
    Ok(scan_tree(root)?.into_iter().filter(|f| !f.is_dir).collect())
}

pub fn read_content(path: impl AsRef<Path>) -> std::io::Result<Vec<u8>> {
    let mut file = fs::File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    Ok(buf)
}

pub fn file_mode(path: impl AsRef<Path>) -> std::io::Result<FileMode> {
    let metadata = fs::symlink_metadata(path)?;
    Ok(mode_from_metadata(&metadata))
}

/// A loaded set of gitignore-flavored patterns. Negation (`!`) is
/// recognized but not implemented — matching lines are simply skipped,
/// a known limitation inherited from the scanner's bespoke matcher.
#[derive(Clone, Debug, Default)]
pub struct IgnorePatterns {
    patterns: Vec<Pattern>,
}

#[derive(Clone, Debug)]
enum Pattern {
    /// Anchored to the root (`/foo`).
    Anchored(String),
    /// Directory-only (`foo/`).
    Directory(String),
    /// Contains a `*`; split into (prefix, middle pieces, suffix).
    Glob {
        prefix: String,
        middle: Vec<String>,
        suffix: String,
    },
    /// Plain substring/equality match.
    Plain(String),
}

impl IgnorePatterns {
    /// Loads patterns from `path`. A missing file is not an error and
    /// yields an empty pattern set — the scanner's sole documented
    /// exception to "no silently-swallowed errors".
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(IgnorePatterns::default()),
            Err(e) => return Err(e),
        };
        Ok(Self::from_str(&content))
    }

    pub fn from_str(content: &str) -> Self {
        let mut patterns = Vec::new();
        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('!') {
                continue; // negation: recognized, not implemented
            }
            let pattern = if let Some(anchored) = line.strip_prefix('/') {
                Pattern::Anchored(anchored.to_string())
            } else if let Some(dir) = line.strip_suffix('/') {
                Pattern::Directory(dir.to_string())
            } else if line.contains('*') {
                let mut parts = line.split('*');
                let prefix = parts.next().unwrap_or_default().to_string();
                let rest: Vec<&str> = parts.collect();
                let (middle, suffix) = if let Some((last, init)) = rest.split_last() {
                    (init.iter().map(|s| s.to_string()).collect(), last.to_string())
                } else {
                    (Vec::new(), String::new())
                };
                Pattern::Glob {
                    prefix,
                    middle,
                    suffix,
                }
            } else {
                Pattern::Plain(line.to_string())
            };
            patterns.push(pattern);
        }
        IgnorePatterns { patterns }
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.patterns.iter().any(|p| pattern_matches(p, path))
    }

    pub fn filter(&self, files: Vec<FileInfo>) -> Vec<FileInfo> {
        files
            .into_iter()
            .filter(|f| !self.is_ignored(&f.path))
            .collect()
    }
}

fn pattern_matches(pattern: &Pattern, path: &str) -> bool {
    match pattern {
        Pattern::Anchored(p) => path == p || path.starts_with(&format!("{p}/")),
        Pattern::Directory(p) => {
            path == p.as_str()
                || path.starts_with(&format!("{p}/"))
                || path.split('/').any(|seg| seg == p)
        }
        Pattern::Plain(p) => path.split('/').any(|seg| seg == p) || path.contains(p.as_str()),
        Pattern::Glob { prefix, middle, suffix } => {
            if !path.starts_with(prefix.as_str()) {
                return false;
            }
            if !path.ends_with(suffix.as_str()) {
                return false;
            }
            let mut cursor = prefix.len();
            for piece in middle {
                if piece.is_empty() {
                    continue;
                }
                match path[cursor..].find(piece.as_str()) {
                    Some(found) => cursor += found + piece.len(),
                    None => return false,
                }
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scan_tree_skips_dot_git() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        fs::write(dir.path().join(".git/HEAD"), b"ref: refs/heads/main\n").unwrap();
        fs::write(dir.path().join("file.txt"), b"hi").unwrap();
        let files = scan_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "file.txt");
    }

    #[test]
    fn ignore_patterns_match_anchored_dir_and_glob() {
        let patterns = IgnorePatterns::from_str("/root_only.txt\nbuild/\n*.log\n");
        assert!(patterns.is_ignored("root_only.txt"));
        assert!(!patterns.is_ignored("sub/root_only.txt"));
        assert!(patterns.is_ignored("build/output.o"));
        assert!(patterns.is_ignored("debug.log"));
        assert!(!patterns.is_ignored("keep.txt"));
    }

    #[test]
    fn negation_is_recognized_but_not_applied() {
        let patterns = IgnorePatterns::from_str("*.log\n!keep.log\n");
        assert!(patterns.is_ignored("keep.log"));
    }

    #[test]
    fn file_mode_detects_executable_bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("script.sh");
        fs::write(&path, b"#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        assert_eq!(file_mode(&path).unwrap(), FileMode::Executable);
    }
}
