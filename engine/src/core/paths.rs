//! Lexical checks for paths that end up under a session's staging directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{LabError, LabResult};

/// Turn a rendered validator path into a path relative to the staging dir.
///
/// Leading separators are stripped (`/flag.txt` -> `flag.txt`) and `.`
/// segments dropped. Any `..`, root or prefix component is rejected, as is a
/// path that names the staging directory itself.
pub fn staging_relative(rendered: &str) -> LabResult<PathBuf> {
    let trimmed = rendered.trim().trim_start_matches(['/', '\\']);
    let mut relative = PathBuf::new();
    for component in Path::new(trimmed).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(LabError::PathEscapesStaging {
                    path: rendered.to_string(),
                });
            }
        }
    }
    if relative.as_os_str().is_empty() {
        return Err(LabError::PathEscapesStaging {
            path: rendered.to_string(),
        });
    }
    Ok(relative)
}

/// True when `name` is one plain path segment (no separators, not `.`/`..`).
pub fn is_single_segment(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Session ids become directory names, so they are held to `[A-Za-z0-9_-]`.
pub fn validate_session_id(session_id: &str) -> LabResult<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(LabError::InvalidSessionId {
            session_id: session_id.to_string(),
        })
    }
}
