//! Minimal INI-style config reading: `<git-dir>/config` and the user's
//! `~/.gitconfig`, read only for the `[user]` identity used when
//! constructing commit/tag signatures. Parsing (not writing) uses
//! `configparser`, mirroring how the broader pack reads git-style INI.

use configparser::ini::Ini;
use std::path::{Path, PathBuf};

pub struct RepoConfig {
    name: Option<String>,
    email: Option<String>,
}

impl RepoConfig {
    /// Loads `<git_dir>/config`, falling back to `~/.gitconfig` for any
    /// field the repo-local file doesn't set. Missing or unparsable
    /// files are treated as empty, not an error — there is no mandatory
    /// identity in this core; the CLI surfaces a clear failure if one is
    /// needed and absent.
    pub fn load(git_dir: impl AsRef<Path>) -> Self {
        let mut name = None;
        let mut email = None;
        let candidates = [Some(git_dir.as_ref().join("config")), home_gitconfig()];
        for path in candidates.into_iter().flatten() {
            if let Some((n, e)) = read_user_section(&path) {
                name = name.or(n);
                email = email.or(e);
            }
        }
        RepoConfig { name, email }
    }

    pub fn user_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn user_email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

fn home_gitconfig() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".gitconfig"))
}

fn read_user_section(path: &Path) -> Option<(Option<String>, Option<String>)> {
    let mut ini = Ini::new();
    let map = ini.load(path).ok()?;
    let user = map.get("user")?;
    let name = user.get("name").cloned().flatten();
    let email = user.get("email").cloned().flatten();
    Some((name, email))
}
