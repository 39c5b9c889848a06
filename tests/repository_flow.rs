//! Black-box end-to-end coverage of init → stage → commit → branch,
//! exercising the object store, index, and ref manager together against
//! a real temp-dir worktree: known-hash blob writes, a commit chain that
//! advances a branch ref, a rejected compare-and-swap on a stale
//! expectation, and an index round trip through disk.

use chrono::{FixedOffset, TimeZone};
use tempfile::tempdir;
use vcscore::index::{IndexEntry, Stage};
use vcscore::object::{FileMode, Object, Signature};
use vcscore::{Error, ObjectId, Repository};

fn sig() -> Signature {
    let tz = FixedOffset::east_opt(0).unwrap();
    let when = tz.timestamp_opt(1_704_110_400, 0).single().unwrap();
    Signature::new("Test User", "test@example.com", when)
}

#[test]
fn empty_blob_matches_known_git_hash() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let id = repo.write_blob(Vec::new()).unwrap();
    assert_eq!(id.to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
}

#[test]
fn hello_world_blob_round_trips_through_storage() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let id = repo.write_blob(b"hello world\n".to_vec()).unwrap();
    assert_eq!(id.to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");

    let obj = repo.read_object(&id).unwrap();
    match obj {
        Object::Blob(blob) => assert_eq!(blob.content, b"hello world\n"),
        _ => panic!("expected blob"),
    }
}

#[test]
fn commit_chain_advances_branch_ref() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();

    std::fs::write(dir.path().join("a.txt"), b"one\n").unwrap();
    let mut tree = vcscore::object::Tree::new();
    let blob_id = repo.write_blob(b"one\n".to_vec()).unwrap();
    tree.add_entry(FileMode::Regular, "a.txt", blob_id).unwrap();
    let tree_id = repo.write_tree(&tree).unwrap();

    let s = sig();
    let first = repo
        .write_commit(tree_id, vec![], s.clone(), s.clone(), "first\n")
        .unwrap();
    repo.refs.create_branch("main", first).unwrap();
    repo.refs.set_head_symbolic("refs/heads/main").unwrap();

    let second = repo
        .write_commit(tree_id, vec![first], s.clone(), s, "second\n")
        .unwrap();
    repo.refs
        .cas_update("refs/heads/main", second, Some(first))
        .unwrap();

    let head = repo.refs.head().unwrap();
    assert_eq!(head.id, second);
    assert_eq!(repo.refs.current_branch().unwrap(), "main");

    let commit_obj = repo.read_object(&second).unwrap();
    match commit_obj {
        Object::Commit(c) => assert_eq!(c.parents, vec![first]),
        _ => panic!("expected commit"),
    }
}

#[test]
fn cas_update_rejects_stale_expectation() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let a = ObjectId::parse("a94a8fe5ccb19ba61c4c0873d391e987982fbbd3").unwrap();
    let b = ObjectId::parse("b94a8fe5ccb19ba61c4c0873d391e987982fbbd4").unwrap();
    let c = ObjectId::parse("c94a8fe5ccb19ba61c4c0873d391e987982fbbd5").unwrap();

    repo.refs.create_branch("atomic", a).unwrap();
    repo.refs
        .cas_update("refs/heads/atomic", b, Some(a))
        .unwrap();
    assert_eq!(repo.refs.resolve("atomic").unwrap(), b);

    let err = repo
        .refs
        .cas_update("refs/heads/atomic", c, Some(a))
        .unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert_eq!(repo.refs.resolve("atomic").unwrap(), b);
}

#[test]
fn index_survives_a_round_trip_through_disk() {
    let dir = tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let mut index = repo.read_index().unwrap();

    let id1 = repo.write_blob(b"test1".to_vec()).unwrap();
    let id2 = repo.write_blob(b"test2".to_vec()).unwrap();
    index
        .add(IndexEntry {
            ctime_sec: 1_704_067_200,
            ctime_nsec: 0,
            mtime_sec: 1_704_067_200,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode: FileMode::Regular,
            uid: 0,
            gid: 0,
            size: 5,
            id: id1,
            stage: Stage::new(0),
            path: "file1.txt".into(),
        })
        .unwrap();
    index
        .add(IndexEntry {
            ctime_sec: 1_704_067_200,
            ctime_nsec: 0,
            mtime_sec: 1_704_067_200,
            mtime_nsec: 0,
            dev: 0,
            ino: 0,
            mode: FileMode::Regular,
            uid: 0,
            gid: 0,
            size: 5,
            id: id2,
            stage: Stage::new(0),
            path: "file2.txt".into(),
        })
        .unwrap();
    repo.write_index(&index).unwrap();

    let read_back = repo.read_index().unwrap();
    assert_eq!(read_back.len(), 2);
    assert_eq!(read_back.get("file1.txt").unwrap().id, id1);
    assert_eq!(read_back.get("file2.txt").unwrap().id, id2);
}

#[test]
fn open_without_init_fails_not_a_repository() {
    let dir = tempdir().unwrap();
    assert!(matches!(Repository::open(dir.path()), Err(Error::NotARepository)));
}
