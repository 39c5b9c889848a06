//! The object model: blob, tree, commit, and annotated tag, their
//! canonical on-the-wire serialization, and parsers back from bytes.
//!
//! Objects are immutable once built — constructors compute the id up
//! front from the serialized payload rather than lazily recomputing a
//! mutable field, per the "pure constructors" guidance for this core.
//! [`Tree`] is the one exception: it is built incrementally via
//! [`Tree::add_entry`], recomputing its id after every mutation so reads
//! always observe an id consistent with the current entry set.

use crate::error::{Error, Result};
use crate::id::{compute_id, ObjectId};
use chrono::{DateTime, FixedOffset, TimeZone};
use std::fmt;

/// The four canonical object kinds.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(ObjectKind::Blob),
            "tree" => Ok(ObjectKind::Tree),
            "commit" => Ok(ObjectKind::Commit),
            "tag" => Ok(ObjectKind::Tag),
            other => Err(Error::InvalidObjectType(other.to_string())),
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// File mode recognized for tree entries.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileMode {
    Directory,
    Regular,
    Executable,
    Symlink,
    Submodule,
}

impl FileMode {
    pub fn octal(self) -> u32 {
        match self {
            FileMode::Directory => 0o040000,
            FileMode::Regular => 0o100644,
            FileMode::Executable => 0o100755,
            FileMode::Symlink => 0o120000,
            FileMode::Submodule => 0o160000,
        }
    }

    /// The exact ASCII form git writes on the wire: no leading zero pad,
    /// so a directory is `"40000"`, not `"040000"`.
    pub fn as_wire_str(self) -> &'static str {
        match self {
            FileMode::Directory => "40000",
            FileMode::Regular => "100644",
            FileMode::Executable => "100755",
            FileMode::Symlink => "120000",
            FileMode::Submodule => "160000",
        }
    }

    pub fn parse_octal(text: &str) -> Result<Self> {
        let value =
            u32::from_str_radix(text, 8).map_err(|_| Error::InvalidMode(text.to_string()))?;
        match value {
            0o040000 => Ok(FileMode::Directory),
            0o100644 => Ok(FileMode::Regular),
            0o100755 => Ok(FileMode::Executable),
            0o120000 => Ok(FileMode::Symlink),
            0o160000 => Ok(FileMode::Submodule),
            _ => Err(Error::InvalidMode(text.to_string())),
        }
    }
}

/// `"<name> <<email>> <unix-seconds> <±HHMM>"`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: DateTime<FixedOffset>,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: DateTime<FixedOffset>) -> Self {
        Signature {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    pub fn serialize(&self) -> String {
        let offset_secs = self.when.offset().local_minus_utc();
        let sign = if offset_secs < 0 { '-' } else { '+' };
        let abs = offset_secs.abs();
        format!(
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.when.timestamp(),
            sign,
            abs / 3600,
            (abs % 3600) / 60
        )
    }

    pub fn parse(text: &str) -> Result<Self> {
        let lt = text.find('<').ok_or_else(|| Error::InvalidSignature(text.to_string()))?;
        let gt = text[lt..]
            .find('>')
            .map(|i| i + lt)
            .ok_or_else(|| Error::InvalidSignature(text.to_string()))?;
        if gt < lt {
            return Err(Error::InvalidSignature(text.to_string()));
        }
        let name = text[..lt].trim_end().to_string();
        let email = text[lt + 1..gt].to_string();
        let rest = text[gt + 1..].trim_start();
        let mut parts = rest.split_whitespace();
        let seconds: i64 = parts
            .next()
            .ok_or_else(|| Error::InvalidSignature(text.to_string()))?
            .parse()
            .map_err(|_| Error::InvalidSignature(text.to_string()))?;
        let offset_text = parts
            .next()
            .ok_or_else(|| Error::InvalidSignature(text.to_string()))?;
        let offset_secs = parse_offset(offset_text)
            .ok_or_else(|| Error::InvalidSignature(text.to_string()))?;
        let tz = FixedOffset::east_opt(offset_secs)
            .ok_or_else(|| Error::InvalidSignature(text.to_string()))?;
        let when = tz
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::InvalidSignature(text.to_string()))?;
        Ok(Signature { name, email, when })
    }
}

fn parse_offset(text: &str) -> Option<i32> {
    if text.len() != 5 {
        return None;
    }
    let sign = match text.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = text[1..3].parse().ok()?;
    let minutes: i32 = text[3..5].parse().ok()?;
    Some(sign * (hours * 3600 + minutes * 60))
}

/// An opaque byte sequence — file contents, stored and hashed as-is.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Blob {
    pub content: Vec<u8>,
    id: ObjectId,
}

impl Blob {
    pub fn new(content: Vec<u8>) -> Self {
        let id = compute_id(ObjectKind::Blob, &content);
        Blob { content, id }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn serialize(&self) -> Vec<u8> {
        self.content.clone()
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        Ok(Blob::new(payload.to_vec()))
    }
}

/// One `{mode, name, id}` triple inside a [`Tree`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub id: ObjectId,
}

/// An ordered set of entries, canonically sorted ascending by name.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tree {
    entries: Vec<TreeEntry>,
    id: ObjectId,
}

impl Tree {
    pub fn new() -> Self {
        let id = compute_id(ObjectKind::Tree, &[]);
        Tree {
            entries: Vec::new(),
            id,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    /// Inserts a new entry in sorted order and recomputes the id.
    /// Rejects an empty name or a name already present in the tree.
    pub fn add_entry(&mut self, mode: FileMode, name: impl Into<String>, id: ObjectId) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::EmptyName);
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(Error::DuplicateName(name));
        }
        let pos = self
            .entries
            .binary_search_by(|e| e.name.as_str().cmp(name.as_str()))
            .unwrap_or_else(|p| p);
        self.entries.insert(pos, TreeEntry { mode, name, id });
        self.id = compute_id(ObjectKind::Tree, &self.serialize());
        Ok(())
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(entry.mode.as_wire_str().as_bytes());
            out.push(b' ');
            out.extend_from_slice(entry.name.as_bytes());
            out.push(0);
            out.extend_from_slice(entry.id.as_bytes());
        }
        out
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let mut entries = Vec::new();
        let mut rest = payload;
        while !rest.is_empty() {
            let sp = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or(Error::MissingSeparator)?;
            let mode_text =
                std::str::from_utf8(&rest[..sp]).map_err(|_| Error::MissingSeparator)?;
            let mode = FileMode::parse_octal(mode_text)?;
            let after_mode = &rest[sp + 1..];
            let nul = after_mode
                .iter()
                .position(|&b| b == 0)
                .ok_or(Error::NoNullTerminator)?;
            let name = std::str::from_utf8(&after_mode[..nul])
                .map_err(|_| Error::NoNullTerminator)?
                .to_string();
            if name.is_empty() {
                return Err(Error::EmptyName);
            }
            let after_name = &after_mode[nul + 1..];
            if after_name.len() < 20 {
                return Err(Error::ShortTrailingHash);
            }
            let mut id_bytes = [0u8; 20];
            id_bytes.copy_from_slice(&after_name[..20]);
            let id = ObjectId::from_bytes(id_bytes);
            if entries.iter().any(|e: &TreeEntry| e.name == name) {
                return Err(Error::DuplicateName(name));
            }
            entries.push(TreeEntry { mode, name, id });
            rest = &after_name[20..];
        }
        let id = compute_id(ObjectKind::Tree, payload);
        Ok(Tree { entries, id })
    }
}

impl Default for Tree {
    fn default() -> Self {
        Tree::new()
    }
}

/// A commit: a tree snapshot, zero or more parents, author/committer
/// signatures, and a free-form message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
    id: ObjectId,
}

impl Commit {
    pub fn new(
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
    ) -> Self {
        let mut message = message.into();
        if !message.is_empty() && !message.ends_with('\n') {
            message.push('\n');
        }
        let mut commit = Commit {
            tree,
            parents,
            author,
            committer,
            message,
            id: ObjectId::ZERO,
        };
        commit.id = compute_id(ObjectKind::Commit, &commit.serialize());
        commit
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("tree {}\n", self.tree));
        for parent in &self.parents {
            out.push_str(&format!("parent {}\n", parent));
        }
        out.push_str(&format!("author {}\n", self.author.serialize()));
        out.push_str(&format!("committer {}\n", self.committer.serialize()));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|_| Error::BadHeader(String::new()))?;
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut offset = 0;
        loop {
            let line_end = text[offset..]
                .find('\n')
                .map(|i| offset + i)
                .ok_or(Error::Truncated)?;
            let line = &text[offset..line_end];
            offset = line_end + 1;
            if line.is_empty() {
                break;
            }
            let (key, value) = line.split_once(' ').ok_or_else(|| Error::BadHeader(line.to_string()))?;
            match key {
                "tree" => tree = Some(ObjectId::parse(value).map_err(|_| Error::InvalidTreeId)?),
                "parent" => {
                    parents.push(ObjectId::parse(value).map_err(|_| Error::InvalidParentId)?)
                }
                "author" => author = Some(Signature::parse(value)?),
                "committer" => committer = Some(Signature::parse(value)?),
                _ => {} // unknown header keys are tolerated, not rejected
            }
        }
        let tree = tree.ok_or_else(|| Error::BadHeader("missing tree".into()))?;
        let author = author.ok_or_else(|| Error::BadHeader("missing author".into()))?;
        let committer = committer.ok_or_else(|| Error::BadHeader("missing committer".into()))?;
        let message = text[offset..].to_string();
        Ok(Commit::new(tree, parents, author, committer, message))
    }
}

/// An annotated tag: shape mirrors [`Commit`] with an `object`/`type`
/// header pair instead of `tree`/`parent`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Tag {
    pub object: ObjectId,
    pub object_type: ObjectKind,
    pub tag: String,
    pub tagger: Signature,
    pub message: String,
    id: ObjectId,
}

impl Tag {
    pub fn new(
        object: ObjectId,
        object_type: ObjectKind,
        tag: impl Into<String>,
        tagger: Signature,
        message: impl Into<String>,
    ) -> Self {
        let mut message = message.into();
        if !message.is_empty() && !message.ends_with('\n') {
            message.push('\n');
        }
        let mut tag_obj = Tag {
            object,
            object_type,
            tag: tag.into(),
            tagger,
            message,
            id: ObjectId::ZERO,
        };
        tag_obj.id = compute_id(ObjectKind::Tag, &tag_obj.serialize());
        tag_obj
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        out.push_str(&format!("object {}\n", self.object));
        out.push_str(&format!("type {}\n", self.object_type));
        out.push_str(&format!("tag {}\n", self.tag));
        out.push_str(&format!("tagger {}\n", self.tagger.serialize()));
        out.push('\n');
        out.push_str(&self.message);
        out.into_bytes()
    }

    pub fn parse(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload).map_err(|_| Error::BadHeader(String::new()))?;
        let mut object = None;
        let mut object_type = None;
        let mut tag = None;
        let mut tagger = None;
        let mut offset = 0;
        loop {
            let line_end = text[offset..]
                .find('\n')
                .map(|i| offset + i)
                .ok_or(Error::Truncated)?;
            let line = &text[offset..line_end];
            offset = line_end + 1;
            if line.is_empty() {
                break;
            }
            let (key, value) = line.split_once(' ').ok_or_else(|| Error::BadHeader(line.to_string()))?;
            match key {
                "object" => object = Some(ObjectId::parse(value).map_err(|_| Error::InvalidTreeId)?),
                "type" => object_type = Some(ObjectKind::parse(value)?),
                "tag" => tag = Some(value.to_string()),
                "tagger" => tagger = Some(Signature::parse(value)?),
                _ => {}
            }
        }
        let object = object.ok_or_else(|| Error::BadHeader("missing object".into()))?;
        let object_type = object_type.ok_or_else(|| Error::BadHeader("missing type".into()))?;
        let tag = tag.ok_or_else(|| Error::BadHeader("missing tag".into()))?;
        let tagger = tagger.ok_or_else(|| Error::BadHeader("missing tagger".into()))?;
        let message = text[offset..].to_string();
        Ok(Tag::new(object, object_type, tag, tagger, message))
    }
}

/// Sum type over the four object kinds — favored over dynamic dispatch
/// because the set of kinds is fixed and closed.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Object {
    Blob(Blob),
    Tree(Tree),
    Commit(Commit),
    Tag(Tag),
}

impl Object {
    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Blob(_) => ObjectKind::Blob,
            Object::Tree(_) => ObjectKind::Tree,
            Object::Commit(_) => ObjectKind::Commit,
            Object::Tag(_) => ObjectKind::Tag,
        }
    }

    pub fn id(&self) -> ObjectId {
        match self {
            Object::Blob(b) => b.id(),
            Object::Tree(t) => t.id(),
            Object::Commit(c) => c.id(),
            Object::Tag(t) => t.id(),
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Object::Blob(b) => b.serialize(),
            Object::Tree(t) => t.serialize(),
            Object::Commit(c) => c.serialize(),
            Object::Tag(t) => t.serialize(),
        }
    }

    pub fn parse(kind: ObjectKind, payload: &[u8]) -> Result<Self> {
        Ok(match kind {
            ObjectKind::Blob => Object::Blob(Blob::parse(payload)?),
            ObjectKind::Tree => Object::Tree(Tree::parse(payload)?),
            ObjectKind::Commit => Object::Commit(Commit::parse(payload)?),
            ObjectKind::Tag => Object::Tag(Tag::parse(payload)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sig(offset_hours: i32) -> Signature {
        let tz = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        let when = tz.timestamp_opt(1704110400 - (offset_hours as i64 * 3600), 0).single().unwrap();
        Signature::new("Test User", "test@example.com", when)
    }

    #[test]
    fn signature_round_trip_utc() {
        let s = sig(0);
        assert_eq!(s.serialize(), "Test User <test@example.com> 1704110400 +0000");
        assert_eq!(Signature::parse(&s.serialize()).unwrap(), s);
    }

    #[test]
    fn signature_plus_0200_offset() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let when = tz.timestamp_opt(1704096000, 0).single().unwrap();
        let s = Signature::new("Test User", "test@example.com", when);
        assert_eq!(s.serialize(), "Test User <test@example.com> 1704096000 +0200");
        assert_eq!(Signature::parse(&s.serialize()).unwrap(), s);
    }

    #[test]
    fn tree_serializes_in_ascending_name_order() {
        let mut tree = Tree::new();
        let id1 = compute_id(ObjectKind::Blob, b"zebra");
        let id2 = compute_id(ObjectKind::Blob, b"apple");
        tree.add_entry(FileMode::Regular, "zebra.txt", id1).unwrap();
        tree.add_entry(FileMode::Regular, "apple.txt", id2).unwrap();
        let bytes = tree.serialize();
        assert!(bytes.starts_with(b"100644 apple.txt\0"));
        let parsed = Tree::parse(&bytes).unwrap();
        assert_eq!(parsed.entries()[0].name, "apple.txt");
        assert_eq!(parsed.entries()[1].name, "zebra.txt");
        assert_eq!(parsed.id(), tree.id());
    }

    #[test]
    fn tree_rejects_duplicate_and_empty_names() {
        let mut tree = Tree::new();
        let id = compute_id(ObjectKind::Blob, b"x");
        tree.add_entry(FileMode::Regular, "a", id).unwrap();
        assert!(matches!(
            tree.add_entry(FileMode::Regular, "a", id),
            Err(Error::DuplicateName(_))
        ));
        assert!(matches!(
            tree.add_entry(FileMode::Regular, "", id),
            Err(Error::EmptyName)
        ));
    }

    #[test]
    fn commit_round_trips_and_ignores_unknown_headers() {
        let tree = compute_id(ObjectKind::Tree, b"");
        let s = sig(0);
        let commit = Commit::new(tree, vec![], s.clone(), s.clone(), "hello\n");
        let parsed = Commit::parse(&commit.serialize()).unwrap();
        assert_eq!(parsed.id(), commit.id());
        assert_eq!(parsed.message, "hello\n");

        let mut raw = String::from_utf8(commit.serialize()).unwrap();
        raw = raw.replacen("tree ", "encoding UTF-8\ntree ", 1);
        let with_unknown = Commit::parse(raw.as_bytes()).unwrap();
        assert_eq!(with_unknown.tree, commit.tree);
    }

    #[test]
    fn commit_message_without_trailing_newline_gets_one() {
        let tree = compute_id(ObjectKind::Tree, b"");
        let s = sig(0);
        let commit = Commit::new(tree, vec![], s.clone(), s, "no newline");
        assert_eq!(commit.message, "no newline\n");
    }

    #[test]
    fn blob_round_trip() {
        let blob = Blob::new(b"hello world\n".to_vec());
        let parsed = Blob::parse(&blob.serialize()).unwrap();
        assert_eq!(parsed.id(), blob.id());
    }

    #[test]
    fn object_id_round_trip_holds_for_every_kind() {
        let tree = Tree::new();
        let obj = Object::Tree(tree.clone());
        let parsed = Object::parse(ObjectKind::Tree, &obj.serialize()).unwrap();
        assert_eq!(parsed.id(), obj.id());
    }
}
