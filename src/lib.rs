//! Core of a Git-compatible version-control engine: a content-addressed
//! object store and its companion staging index.
//!
//! See the module docs for the object model (blob/tree/commit/tag),
//! loose-object storage, the reference manager, the staging index, and
//! the working-tree scanner.

pub mod config;
pub mod error;
pub mod id;
pub mod index;
pub mod logging;
pub mod object;
pub mod refs;
pub mod repo;
pub mod store;
pub mod worktree;

pub use error::{Error, Result};
pub use id::ObjectId;
pub use object::{Blob, Commit, FileMode, Object, ObjectKind, Signature, Tag, Tree};
pub use repo::Repository;
