//! Git ref pointer capture, read straight from the `.git` directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use warden_core::{Result, WardenError};

/// HEAD and a set of refs as they were before the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefCapture {
    pub git_dir: PathBuf,
    /// Raw HEAD contents (`ref: refs/heads/x` or a commit id).
    pub head: String,
    /// `(refs/heads/name, commit)` pairs.
    pub refs: Vec<(String, String)>,
}

impl RefCapture {
    /// Capture HEAD, the branch it points at and any of `branches` that exist.
    pub fn take(cwd: &Path, branches: &[&str]) -> Result<Self> {
        let git_dir = find_git_dir(cwd).ok_or_else(|| {
            WardenError::CheckpointFailed(format!("{} is not inside a git repository", cwd.display()))
        })?;
        let head = fs::read_to_string(git_dir.join("HEAD"))
            .map_err(|e| WardenError::CheckpointFailed(format!("cannot read HEAD: {e}")))?
            .trim()
            .to_string();

        let mut names: Vec<String> = Vec::new();
        if let Some(current) = head.strip_prefix("ref:") {
            names.push(current.trim().to_string());
        }
        for b in branches {
            let name = if b.starts_with("refs/") {
                (*b).to_string()
            } else {
                format!("refs/heads/{b}")
            };
            if !names.contains(&name) {
                names.push(name);
            }
        }

        let refs = names
            .into_iter()
            .filter_map(|name| resolve_ref(&git_dir, &name).map(|sha| (name, sha)))
            .collect();

        Ok(Self {
            git_dir,
            head,
            refs,
        })
    }

    /// Rewrite HEAD and the captured refs as loose ref files.
    pub fn restore(&self) -> io::Result<()> {
        if !self.git_dir.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} no longer exists", self.git_dir.display()),
            ));
        }
        for (name, sha) in &self.refs {
            let path = self.git_dir.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, format!("{sha}\n"))?;
        }
        fs::write(self.git_dir.join("HEAD"), format!("{}\n", self.head))
    }

    pub fn describe(&self) -> String {
        let head = self
            .head
            .strip_prefix("ref:")
            .map(str::trim)
            .unwrap_or(&self.head);
        match self.refs.first() {
            Some((_, sha)) => format!("HEAD {head} at {}", short(sha)),
            None => format!("HEAD {head}"),
        }
    }
}

fn short(sha: &str) -> &str {
    sha.char_indices().nth(12).map_or(sha, |(i, _)| &sha[..i])
}

/// Walk up from `start` to the enclosing repository's git directory.
/// Follows `gitdir:` files used by worktrees and submodules.
pub fn find_git_dir(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(".git");
        if candidate.is_dir() {
            return Some(candidate);
        }
        if candidate.is_file() {
            let text = fs::read_to_string(&candidate).ok()?;
            let target = text.strip_prefix("gitdir:")?.trim();
            let path = Path::new(target);
            return Some(if path.is_absolute() {
                path.to_path_buf()
            } else {
                dir.join(path)
            });
        }
    }
    None
}

/// Commit id of a ref, from its loose file or `packed-refs`.
pub fn resolve_ref(git_dir: &Path, name: &str) -> Option<String> {
    if let Ok(loose) = fs::read_to_string(git_dir.join(name)) {
        let sha = loose.trim();
        if !sha.is_empty() {
            return Some(sha.to_string());
        }
    }
    let packed = fs::read_to_string(git_dir.join("packed-refs")).ok()?;
    packed
        .lines()
        .filter(|l| !l.starts_with('#') && !l.starts_with('^'))
        .find_map(|l| {
            let (sha, r) = l.split_once(' ')?;
            (r.trim() == name).then(|| sha.to_string())
        })
}

/// Name of the checked-out branch, if HEAD is symbolic.
pub fn current_branch(cwd: &Path) -> Option<String> {
    let git_dir = find_git_dir(cwd)?;
    let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
    head.trim()
        .strip_prefix("ref: refs/heads/")
        .map(str::to_string)
        .or_else(|| Some(format!("detached@{}", short(head.trim()))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_repo(root: &Path) -> PathBuf {
        let git = root.join(".git");
        fs::create_dir_all(git.join("refs/heads")).unwrap();
        fs::write(git.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(git.join("refs/heads/main"), "1111111111111111111111111111111111111111\n").unwrap();
        fs::write(
            git.join("packed-refs"),
            "# pack-refs with: peeled fully-peeled sorted\n2222222222222222222222222222222222222222 refs/heads/old\n",
        )
        .unwrap();
        git
    }

    #[test]
    fn finds_git_dir_from_subdirectory() {
        let dir = tempfile::tempdir().unwrap();
        let git = fake_repo(dir.path());
        let sub = dir.path().join("src/deep");
        fs::create_dir_all(&sub).unwrap();
        assert_eq!(find_git_dir(&sub), Some(git));
        assert_eq!(current_branch(&sub).as_deref(), Some("main"));
    }

    #[test]
    fn resolves_loose_and_packed_refs() {
        let dir = tempfile::tempdir().unwrap();
        let git = fake_repo(dir.path());
        assert_eq!(resolve_ref(&git, "refs/heads/main").unwrap(), "1".repeat(40));
        assert_eq!(resolve_ref(&git, "refs/heads/old").unwrap(), "2".repeat(40));
        assert!(resolve_ref(&git, "refs/heads/none").is_none());
    }

    #[test]
    fn capture_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let git = fake_repo(dir.path());
        let capture = RefCapture::take(dir.path(), &["old"]).unwrap();
        assert_eq!(capture.refs.len(), 2);

        fs::write(git.join("refs/heads/main"), "3333333333333333333333333333333333333333\n").unwrap();
        fs::write(git.join("HEAD"), "3333333333333333333333333333333333333333\n").unwrap();
        capture.restore().unwrap();

        assert_eq!(fs::read_to_string(git.join("HEAD")).unwrap(), "ref: refs/heads/main\n");
        assert_eq!(resolve_ref(&git, "refs/heads/main").unwrap(), "1".repeat(40));
        assert_eq!(resolve_ref(&git, "refs/heads/old").unwrap(), "2".repeat(40));
    }

    #[test]
    fn outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RefCapture::take(dir.path(), &[]).is_err());
    }
}
