//! Path containment for skill storage.
//!
//! Every boundary that touches on-disk skill storage resolves paths through
//! [`contain`] instead of re-deriving its own traversal check. A path that
//! escapes its root is a [`ContainmentError`], which the HTTP layer maps to
//! a client error.

use std::path::{Component, Path, PathBuf};

/// A relative path tried to escape its storage root.
#[derive(Debug, thiserror::Error)]
pub enum ContainmentError {
    #[error("path '{0}' is absolute; only relative paths are allowed")]
    Absolute(String),
    #[error("path '{0}' escapes the storage root")]
    Traversal(String),
}

/// Resolve `relative` against `root`, guaranteeing the result stays inside
/// `root`. Rejects absolute paths and any `..` component without touching
/// the filesystem, so it works for destinations that do not exist yet.
pub fn contain(root: &Path, relative: &Path) -> Result<PathBuf, ContainmentError> {
    if relative.is_absolute() {
        return Err(ContainmentError::Absolute(relative.display().to_string()));
    }

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(ContainmentError::Traversal(relative.display().to_string()));
            }
        }
    }
    Ok(resolved)
}

/// Whether an existing `path` lives under an existing `root` after symlink
/// resolution. Used before destructive operations on stored skills.
pub fn is_within(root: &Path, path: &Path) -> bool {
    match (root.canonicalize(), path.canonicalize()) {
        (Ok(root), Ok(path)) => path.starts_with(&root),
        _ => false,
    }
}

/// Filesystem-friendly slug for skill and tenant names.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut last_dash = true;
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_') && !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_matches('-').to_string();
    if slug.is_empty() {
        "skill".to_string()
    } else {
        slug
    }
}
