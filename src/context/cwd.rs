//! Working directory tracking and lexical path resolution.
//!
//! Resolution here never touches the filesystem: `.` and `..` are folded
//! textually, symlinks are not followed. That keeps permission checks pure
//! and repeatable.

use std::env;
use std::path::{Component, Path, PathBuf};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurrentDir {
    pub path: PathBuf,
}

impl CurrentDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: normalize(&path.into()),
        }
    }

    /// Capture the current working directory from the process.
    pub fn capture() -> Option<Self> {
        env::current_dir().ok().map(Self::new)
    }

    /// Update the current working directory.
    pub fn update(&mut self, new_path: impl Into<PathBuf>) {
        self.path = normalize(&new_path.into());
    }

    /// Resolve `target` against this directory: absolute targets are taken
    /// as-is, relative ones are joined. The result is normalized.
    pub fn resolve(&self, target: &str) -> PathBuf {
        let target = Path::new(target);
        if target.is_absolute() {
            normalize(target)
        } else {
            normalize(&self.path.join(target))
        }
    }
}

/// Fold `.` and `..` components without consulting the filesystem.
///
/// `..` at the root stays at the root, matching what the kernel does.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                let last_is_name = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if last_is_name {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b/../c/./d")), PathBuf::from("/a/c/d"));
        assert_eq!(normalize(Path::new("/../..")), PathBuf::from("/"));
        assert_eq!(normalize(Path::new("a/../..")), PathBuf::from(".."));
        assert_eq!(normalize(Path::new("./")), PathBuf::from("."));
    }

    #[test]
    fn test_resolve() {
        let cwd = CurrentDir::new("/home/user/project");
        assert_eq!(cwd.resolve("src"), PathBuf::from("/home/user/project/src"));
        assert_eq!(cwd.resolve("../../etc"), PathBuf::from("/home/etc"));
        assert_eq!(cwd.resolve("/tmp/../var"), PathBuf::from("/var"));
        assert_eq!(cwd.resolve("."), PathBuf::from("/home/user/project"));
    }

    #[test]
    fn test_update_normalizes() {
        let mut cwd = CurrentDir::new("/a");
        cwd.update("/a/b/../c");
        assert_eq!(cwd.path, PathBuf::from("/a/c"));
    }
}
