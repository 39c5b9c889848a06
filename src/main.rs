use anyhow::{bail, ensure, Context, Result};
use chrono::{FixedOffset, Local, TimeZone};
use clap::{Parser, Subcommand};
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use vcscore::config::RepoConfig;
use vcscore::index::{Index, IndexEntry, Stage};
use vcscore::object::{FileMode, Object, ObjectKind, Signature, Tree};
use vcscore::worktree;
use vcscore::{ObjectId, Repository};

#[derive(Parser, Debug)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Init,
    CatFile {
        #[clap(short = 'p')]
        pretty_print: bool,
        hash_object: String,
    },
    HashObject {
        #[clap(short = 'w')]
        write: bool,
        file: PathBuf,
    },
    LsTree {
        #[clap(long)]
        name_only: bool,
        tree_hash: String,
    },
    WriteTree,
    CommitTree {
        #[clap(short = 'm')]
        message: String,
        #[clap(short = 'p')]
        parent_hash: Option<String>,
        tree_hash: String,
    },
    Commit {
        #[clap(short = 'm')]
        message: String,
    },
    UpdateRef {
        refname: String,
        id: String,
    },
    SymbolicRef {
        refname: String,
        target: String,
    },
    ShowRef,
    LsFiles,
    UpdateIndex {
        #[clap(long)]
        add: bool,
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    vcscore::logging::init();
    let args = Args::parse();
    let cwd = std::env::current_dir().context("failed to read current directory")?;

    match args.command {
        Command::Init => {
            Repository::init(&cwd).context("failed to initialize repository")?;
        }
        Command::CatFile {
            pretty_print,
            hash_object,
        } => {
            ensure!(pretty_print, "-p is required (only pretty-print is supported)");
            let repo = Repository::open(&cwd).context("not a repository")?;
            let id = ObjectId::parse(&hash_object).context("invalid object id")?;
            let obj = repo.read_object(&id).context("failed to read object")?;
            print_object(&obj)?;
        }
        Command::HashObject { write, file } => {
            let content = worktree::read_content(&file).context("failed to read file")?;
            if write {
                let repo = Repository::open(&cwd).context("not a repository")?;
                let id = repo.write_blob(content).context("failed to write blob")?;
                println!("{id}");
            } else {
                let id = vcscore::id::compute_id(ObjectKind::Blob, &content);
                println!("{id}");
            }
        }
        Command::LsTree {
            name_only,
            tree_hash,
        } => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            let id = ObjectId::parse(&tree_hash).context("invalid tree id")?;
            let obj = repo.read_object(&id).context("failed to read tree")?;
            let Object::Tree(tree) = obj else {
                bail!("not a tree object");
            };
            for entry in tree.entries() {
                if name_only {
                    println!("{}", entry.name);
                } else {
                    println!(
                        "{:06o} {} {}\t{}",
                        entry.mode.octal(),
                        mode_kind(entry.mode),
                        entry.id,
                        entry.name
                    );
                }
            }
        }
        Command::WriteTree => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            let tree = build_tree_from_worktree(&repo, &cwd)?;
            let id = repo.write_tree(&tree)?;
            println!("{id}");
        }
        Command::CommitTree {
            message,
            parent_hash,
            tree_hash,
        } => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            let tree_id = ObjectId::parse(&tree_hash).context("invalid tree id")?;
            let parents = parent_hash
                .map(|p| ObjectId::parse(&p).context("invalid parent id"))
                .transpose()?
                .into_iter()
                .collect();
            let (author, committer) = signatures(&repo)?;
            let id = repo.write_commit(tree_id, parents, author, committer, message)?;
            println!("{id}");
        }
        Command::Commit { message } => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            let tree = build_tree_from_worktree(&repo, &cwd)?;
            let tree_id = repo.write_tree(&tree)?;

            let head = repo.refs.head().context("you can't commit in a headless state")?;
            let refname = head
                .refname
                .context("you can't commit in a headless state")?;
            let parents = match repo.refs.resolve(&refname) {
                Ok(id) => vec![id],
                Err(_) => Vec::new(), // first commit on an unborn branch
            };
            let (author, committer) = signatures(&repo)?;
            let commit_id =
                repo.write_commit(tree_id, parents.clone(), author, committer, message)?;
            let expected = parents.first().copied();
            repo.refs.cas_update(&refname, commit_id, expected)?;
            println!("{commit_id}");
        }
        Command::UpdateRef { refname, id } => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            let id = ObjectId::parse(&id).context("invalid object id")?;
            repo.refs.update(&refname, id)?;
        }
        Command::SymbolicRef { refname, target } => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            if refname == "HEAD" {
                repo.refs.set_head_symbolic(&target)?;
            } else {
                let resolved = repo.refs.resolve(&target)?;
                repo.refs.update(&refname, resolved)?;
            }
        }
        Command::ShowRef => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            for name in repo.refs.list_branches()? {
                println!("{} {name}", repo.refs.resolve(&name)?);
            }
            for name in repo.refs.list_tags()? {
                println!("{} {name}", repo.refs.resolve(&name)?);
            }
        }
        Command::LsFiles => {
            let repo = Repository::open(&cwd).context("not a repository")?;
            let index = repo.read_index()?;
            for entry in index.entries() {
                println!("{:06o} {} {}", entry.mode.octal(), entry.id, entry.path);
            }
        }
        Command::UpdateIndex { add, path } => {
            ensure!(add, "only --add is supported");
            let repo = Repository::open(&cwd).context("not a repository")?;
            let mut index = repo.read_index()?;
            stage_path(&repo, &mut index, &cwd, &path)?;
            repo.write_index(&index)?;
        }
    }
    Ok(())
}

fn mode_kind(mode: FileMode) -> &'static str {
    match mode {
        FileMode::Directory => "tree",
        FileMode::Submodule => "commit",
        _ => "blob",
    }
}

fn print_object(obj: &Object) -> Result<()> {
    match obj {
        Object::Blob(blob) => {
            use std::io::Write;
            std::io::stdout().write_all(&blob.content)?;
        }
        Object::Tree(tree) => {
            for entry in tree.entries() {
                println!(
                    "{:06o} {} {}\t{}",
                    entry.mode.octal(),
                    mode_kind(entry.mode),
                    entry.id,
                    entry.name
                );
            }
        }
        Object::Commit(commit) => {
            print!("{}", String::from_utf8_lossy(&commit.serialize()));
        }
        Object::Tag(tag) => {
            print!("{}", String::from_utf8_lossy(&tag.serialize()));
        }
    }
    Ok(())
}

fn signatures(repo: &Repository) -> Result<(Signature, Signature)> {
    let config = RepoConfig::load(repo.git_dir());
    let name = config
        .user_name()
        .context("no user.name configured (set it in .git/config or ~/.gitconfig)")?
        .to_string();
    let email = config
        .user_email()
        .context("no user.email configured (set it in .git/config or ~/.gitconfig)")?
        .to_string();
    let now = Local::now();
    let offset_secs = now.offset().local_minus_utc();
    let tz = FixedOffset::east_opt(offset_secs).context("invalid local time zone offset")?;
    let when = tz
        .timestamp_opt(now.timestamp(), 0)
        .single()
        .context("invalid timestamp")?;
    let sig = Signature::new(name, email, when);
    Ok((sig.clone(), sig))
}

/// Builds a tree object from the full worktree, recursing into
/// subdirectories, via [`Repository::write_blob`] for file contents.
fn build_tree_from_worktree(repo: &Repository, root: &std::path::Path) -> Result<Tree> {
    build_tree_dir(repo, root)
}

fn build_tree_dir(repo: &Repository, dir: &std::path::Path) -> Result<Tree> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .collect::<std::result::Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    let mut tree = Tree::new();
    for entry in entries {
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let path = entry.path();
        let metadata = entry.metadata()?;
        let name = name.to_string_lossy().into_owned();
        if metadata.is_dir() {
            let subtree = build_tree_dir(repo, &path)?;
            if subtree.entries().is_empty() {
                continue;
            }
            let id = repo.write_tree(&subtree)?;
            tree.add_entry(FileMode::Directory, name, id)?;
        } else {
            let content = worktree::read_content(&path)?;
            let id = repo.write_blob(content)?;
            let mode = repo.mode_from_path(&path)?;
            tree.add_entry(mode, name, id)?;
        }
    }
    Ok(tree)
}

fn stage_path(
    repo: &Repository,
    index: &mut Index,
    root: &std::path::Path,
    path: &std::path::Path,
) -> Result<()> {
    let full_path = root.join(path);
    let metadata = std::fs::metadata(&full_path)
        .with_context(|| format!("failed to stat {}", full_path.display()))?;
    let rel_path = path.to_string_lossy().into_owned();

    if let Some(existing) = index.get(&rel_path) {
        if Index::is_up_to_date(existing, &metadata) {
            return Ok(());
        }
    }

    let content = worktree::read_content(&full_path)?;
    let id = repo.write_blob(content)?;
    let mode = repo.mode_from_path(&full_path)?;
    let mtime = metadata
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)?;
    let entry = IndexEntry {
        ctime_sec: mtime.as_secs() as u32,
        ctime_nsec: mtime.subsec_nanos(),
        mtime_sec: mtime.as_secs() as u32,
        mtime_nsec: mtime.subsec_nanos(),
        dev: metadata.dev() as u32,
        ino: metadata.ino() as u32,
        mode,
        uid: metadata.uid(),
        gid: metadata.gid(),
        size: metadata.len() as u32,
        id,
        stage: Stage::new(0),
        path: rel_path,
    };
    index.add(entry)?;
    Ok(())
}
