//! Capturing and restoring file and directory contents.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use warden_core::{Result, WardenError};
use warden_policy::paths;

/// One filesystem entry as it was before the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileEntry {
    Dir {
        path: PathBuf,
    },
    File {
        path: PathBuf,
        /// Base64 file contents.
        contents: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mode: Option<u32>,
    },
    Symlink {
        path: PathBuf,
        target: PathBuf,
    },
    /// Did not exist; restoring removes whatever is there now.
    Missing {
        path: PathBuf,
    },
}

impl FileEntry {
    pub fn path(&self) -> &Path {
        match self {
            Self::Dir { path }
            | Self::File { path, .. }
            | Self::Symlink { path, .. }
            | Self::Missing { path } => path,
        }
    }

    /// Decoded size of the captured contents.
    pub fn size(&self) -> usize {
        match self {
            Self::File { contents, .. } => contents.len() / 4 * 3,
            _ => 0,
        }
    }
}

/// Turn an operation argument into an absolute path with `.` and `..`
/// resolved lexically.
pub fn resolve(raw: &str, cwd: &Path) -> PathBuf {
    let home = dirs::home_dir();
    let joined = match (raw, home) {
        ("~", Some(h)) => h,
        (r, Some(h)) if r.starts_with("~/") => h.join(&r[2..]),
        (r, _) if Path::new(r).is_absolute() => PathBuf::from(r),
        (r, _) => cwd.join(r),
    };
    clean(&joined)
}

/// Drop `.` components and apply `..` to the path built so far. `..` at
/// the root stays at the root.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Archive `path` recursively into `out`. Nonexistent paths are skipped.
///
/// Fails on system paths and once the running total passes `budget` bytes.
pub fn capture_tree(path: &Path, out: &mut Vec<FileEntry>, budget: &mut u64) -> Result<()> {
    refuse_system_path(path)?;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return Ok(());
    };

    if meta.file_type().is_symlink() {
        let target = fs::read_link(path).map_err(failed(path))?;
        out.push(FileEntry::Symlink {
            path: path.to_path_buf(),
            target,
        });
    } else if meta.is_dir() {
        out.push(FileEntry::Dir {
            path: path.to_path_buf(),
        });
        let mut children: Vec<PathBuf> = fs::read_dir(path)
            .map_err(failed(path))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        children.sort();
        for child in children {
            capture_tree(&child, out, budget)?;
        }
    } else {
        out.push(capture_file(path, meta.len(), budget)?);
    }
    Ok(())
}

/// Copy a single file, or record that it does not exist yet.
pub fn capture_file_or_missing(path: &Path, budget: &mut u64) -> Result<FileEntry> {
    refuse_system_path(path)?;
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => capture_file(path, meta.len(), budget),
        Ok(_) => Err(WardenError::CheckpointFailed(format!(
            "{} is not a regular file",
            path.display()
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileEntry::Missing {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(failed(path)(e)),
    }
}

fn capture_file(path: &Path, len: u64, budget: &mut u64) -> Result<FileEntry> {
    if len > *budget {
        return Err(WardenError::CheckpointFailed(format!(
            "{} exceeds the archive size limit",
            path.display()
        )));
    }
    *budget -= len;
    let bytes = fs::read(path).map_err(failed(path))?;
    Ok(FileEntry::File {
        path: path.to_path_buf(),
        contents: STANDARD.encode(bytes),
        mode: file_mode(path),
    })
}

/// Write every entry back, in capture order (directories before their contents).
pub fn restore_entries(entries: &[FileEntry]) -> io::Result<()> {
    if let Some(entry) = entries.iter().find(|e| is_system(e.path())) {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("refusing to restore into system path {}", entry.path().display()),
        ));
    }
    for entry in entries {
        match entry {
            FileEntry::Dir { path } => fs::create_dir_all(path)?,
            FileEntry::File {
                path,
                contents,
                mode,
            } => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                let bytes = STANDARD
                    .decode(contents)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                fs::write(path, bytes)?;
                if let Some(mode) = mode {
                    set_mode(path, *mode)?;
                }
            }
            FileEntry::Symlink { path, target } => {
                if fs::symlink_metadata(path).is_ok() {
                    fs::remove_file(path)?;
                }
                make_symlink(target, path)?;
            }
            FileEntry::Missing { path } => match fs::symlink_metadata(path) {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)?,
                Ok(_) => fs::remove_file(path)?,
                Err(_) => {}
            },
        }
    }
    Ok(())
}

fn is_system(path: &Path) -> bool {
    paths::is_system_path(&paths::normalize(&path.to_string_lossy(), "/"))
}

fn refuse_system_path(path: &Path) -> Result<()> {
    if is_system(path) {
        return Err(WardenError::CheckpointFailed(format!(
            "refusing to archive system path {}",
            path.display()
        )));
    }
    Ok(())
}

fn failed(path: &Path) -> impl Fn(io::Error) -> WardenError + '_ {
    move |e| WardenError::CheckpointFailed(format!("{}: {}", path.display(), e))
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode())
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("cannot recreate symlink {}", link.display()),
    ))
}
