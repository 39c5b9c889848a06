//! Repository façade: init/open a layout rooted at a working directory,
//! wiring the object store, ref manager, and index, plus convenience
//! constructors for the four object kinds.

use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::index::Index;
use crate::object::{Blob, Commit, FileMode, Object, Signature, Tag, Tree};
use crate::refs::RefStore;
use crate::store::ObjectStore;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct Repository {
    worktree: PathBuf,
    git_dir: PathBuf,
    pub store: ObjectStore,
    pub refs: RefStore,
}

const DEFAULT_CONFIG: &str = "[core]\n\trepositoryformatversion = 0\n\tfilemode = true\n\tbare = false\n";
const DEFAULT_DESCRIPTION: &str =
    "Unnamed repository; edit this file 'description' to name the repository.\n";

impl Repository {
    /// `mkdir`s the full `.git` layout and writes `HEAD`, `config`, and
    /// `description`. Safe to call on an already-initialized worktree.
    pub fn init(worktree_path: impl AsRef<Path>) -> Result<Self> {
        let worktree = worktree_path.as_ref().to_path_buf();
        let git_dir = worktree.join(".git");
        for sub in ["refs/heads", "refs/tags", "hooks", "info"] {
            fs::create_dir_all(git_dir.join(sub))?;
        }
        let store = ObjectStore::new(&git_dir);
        store.init()?;

        let head_path = git_dir.join("HEAD");
        if !head_path.exists() {
            fs::write(&head_path, "ref: refs/heads/main\n")?;
        }
        let config_path = git_dir.join("config");
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)?;
        }
        let description_path = git_dir.join("description");
        if !description_path.exists() {
            fs::write(&description_path, DEFAULT_DESCRIPTION)?;
        }

        info!(path = %worktree.display(), "initialized repository");
        Ok(Repository {
            refs: RefStore::new(&git_dir),
            store,
            git_dir,
            worktree,
        })
    }

    /// Opens an existing repository; fails `NotARepository` unless
    /// `.git` is a directory containing a `HEAD` file.
    pub fn open(worktree_path: impl AsRef<Path>) -> Result<Self> {
        let worktree = worktree_path.as_ref().to_path_buf();
        let git_dir = worktree.join(".git");
        if !git_dir.is_dir() || !git_dir.join("HEAD").is_file() {
            return Err(Error::NotARepository);
        }
        Ok(Repository {
            store: ObjectStore::new(&git_dir),
            refs: RefStore::new(&git_dir),
            git_dir,
            worktree,
        })
    }

    pub fn worktree_path(&self) -> &Path {
        &self.worktree
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    pub fn read_index(&self) -> Result<Index> {
        match Index::read_from_file(self.index_path()) {
            Ok(index) => Ok(index),
            Err(Error::NotFound) => Ok(Index::new()),
            Err(e) => Err(e),
        }
    }

    pub fn write_index(&self, index: &Index) -> Result<()> {
        index.write_to_file(self.index_path())
    }

    pub fn write_blob(&self, content: Vec<u8>) -> Result<ObjectId> {
        self.store.write(&Object::Blob(Blob::new(content)))
    }

    pub fn write_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.store.write(&Object::Tree(tree.clone()))
    }

    pub fn write_commit(
        &self,
        tree: ObjectId,
        parents: Vec<ObjectId>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
    ) -> Result<ObjectId> {
        let commit = Commit::new(tree, parents, author, committer, message);
        self.store.write(&Object::Commit(commit))
    }

    pub fn write_tag(
        &self,
        object: ObjectId,
        object_type: crate::object::ObjectKind,
        tag: impl Into<String>,
        tagger: Signature,
        message: impl Into<String>,
    ) -> Result<ObjectId> {
        let tag_obj = Tag::new(object, object_type, tag, tagger, message);
        self.store.write(&Object::Tag(tag_obj))
    }

    pub fn read_object(&self, id: &ObjectId) -> Result<Object> {
        self.store.read(id)
    }

    pub fn mode_from_path(&self, path: &Path) -> std::io::Result<FileMode> {
        crate::worktree::file_mode(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn init_then_open_round_trips() {
        let dir = tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let repo = Repository::open(dir.path()).unwrap();
        assert!(repo.git_dir().join("HEAD").is_file());
        assert_eq!(repo.refs.current_branch().unwrap_err().kind(), "NotFound");
    }

    #[test]
    fn open_rejects_non_repository() {
        let dir = tempdir().unwrap();
        assert!(matches!(Repository::open(dir.path()), Err(Error::NotARepository)));
    }

    #[test]
    fn write_blob_then_read_back() {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let id = repo.write_blob(b"hello world\n".to_vec()).unwrap();
        assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        let obj = repo.read_object(&id).unwrap();
        assert_eq!(obj.id(), id);
    }
}
