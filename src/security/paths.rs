//! Workspace-confined path resolution.
//!
//! Filesystem actions take their target paths from runbook content, which
//! may come from a shared catalog. Every such path goes through
//! [`resolve_safe`] so it can never land outside the invoking workspace,
//! whether via `..` segments, absolute paths, `~` expansion or symlinks.

use std::path::{Component, Path, PathBuf};

use crate::error::{RunbookError, RunbookResult};

/// Resolve `value` against `base`, rejecting anything that escapes it.
///
/// The result is absolute and canonical for every component that exists
/// on disk; trailing components that do not exist yet (e.g. a file about to
/// be written) are appended lexically.
pub fn resolve_safe(value: &str, base: &Path) -> RunbookResult<PathBuf> {
    let base = canonicalize_lenient(base)?;

    if value.trim().is_empty() {
        return Err(RunbookError::PathTraversal { base: base.clone(), resolved: base });
    }

    let expanded = shellexpand::tilde(value);
    let candidate = Path::new(expanded.as_ref());
    let joined = if candidate.is_absolute() { candidate.to_path_buf() } else { base.join(candidate) };

    let resolved = canonicalize_lenient(&joined)?;

    if resolved == base || resolved.starts_with(&base) {
        tracing::debug!(path = %resolved.display(), "Resolved workspace path");
        Ok(resolved)
    } else {
        tracing::warn!(
            requested = value,
            resolved = %resolved.display(),
            base = %base.display(),
            "Blocked path outside workspace"
        );
        Err(RunbookError::PathTraversal { base, resolved })
    }
}

/// Resolve `value` against the process working directory.
pub fn resolve_safe_cwd(value: &str) -> RunbookResult<PathBuf> {
    let cwd = std::env::current_dir()?;
    resolve_safe(value, &cwd)
}

/// Symlink hops followed before giving up, matching the usual `ELOOP` limit.
const MAX_LINK_DEPTH: usize = 40;

/// Canonicalize a path that may not fully exist.
///
/// Walks the path one component at a time. Existing prefixes are
/// canonicalized (following symlinks), and a dangling symlink is replaced by
/// its own resolved target. Components past the first missing one are joined
/// lexically; a `..` that walks back out of them resumes resolution on disk.
fn canonicalize_lenient(path: &Path) -> RunbookResult<PathBuf> {
    canonicalize_with_depth(path, 0)
}

fn canonicalize_with_depth(path: &Path, depth: usize) -> RunbookResult<PathBuf> {
    if depth > MAX_LINK_DEPTH {
        return Err(std::io::Error::other(format!(
            "too many levels of symbolic links: {}",
            path.display()
        ))
        .into());
    }

    let path = if path.is_absolute() { path.to_path_buf() } else { std::env::current_dir()?.join(path) };

    let mut resolved = PathBuf::new();
    // Trailing components of `resolved` known not to exist on disk.
    let mut missing = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => resolved.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                resolved.pop();
                missing = missing.saturating_sub(1);
            }
            Component::Normal(part) => {
                resolved.push(part);
                if missing > 0 {
                    missing += 1;
                    continue;
                }
                match resolved.canonicalize() {
                    Ok(canonical) => resolved = canonical,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        if let Ok(target) = std::fs::read_link(&resolved) {
                            let parent = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                            resolved = canonicalize_with_depth(&parent.join(target), depth + 1)?;
                        }
                        missing = 1;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    Ok(resolved)
}
