//! Per-session staging directories.
//!
//! Each session owns `<staging_root>/<session_id>`. Rendered artifacts land as
//! `<name>.txt`; `file_exists` validator targets get a placeholder file unless
//! an artifact already produced them. Every write is checked to stay inside
//! the session's directory, both lexically and after resolving symlinks.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::core::paths::{is_single_segment, staging_relative, validate_session_id};
use crate::error::{LabError, LabResult};

/// Staging directory for `session_id` under `staging_root` (not created).
pub fn staging_dir(staging_root: &Path, session_id: &str) -> LabResult<PathBuf> {
    validate_session_id(session_id)?;
    Ok(staging_root.join(session_id))
}

/// Create the session's staging directory and write its files.
///
/// `placeholders` are rendered `file_exists` paths. Fails with
/// [`LabError::StagingConflict`] if the directory already exists. Writes are
/// not transactional: a failure part-way leaves what was written so far.
#[instrument(
    skip_all,
    fields(
        session_id = %session_id,
        artifacts = artifacts.len(),
        placeholders = placeholders.len()
    )
)]
pub fn materialize(
    staging_root: &Path,
    session_id: &str,
    artifacts: &BTreeMap<String, String>,
    placeholders: &[String],
) -> LabResult<PathBuf> {
    for name in artifacts.keys() {
        if !is_single_segment(name) {
            return Err(LabError::InvalidArtifactName { name: name.clone() });
        }
    }
    let relative_placeholders = placeholders
        .iter()
        .map(|path| staging_relative(path))
        .collect::<LabResult<Vec<_>>>()?;

    let dir = staging_dir(staging_root, session_id)?;
    fs::create_dir_all(staging_root)
        .map_err(|err| LabError::io("create staging root", staging_root, err))?;
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            return Err(LabError::StagingConflict {
                session_id: session_id.to_string(),
            });
        }
        Err(err) => return Err(LabError::io("create staging dir", &dir, err)),
    }
    let canonical_dir =
        fs::canonicalize(&dir).map_err(|err| LabError::io("resolve staging dir", &dir, err))?;

    for (name, body) in artifacts {
        let path = dir.join(format!("{name}.txt"));
        fs::write(&path, body).map_err(|err| LabError::io("write artifact", &path, err))?;
        debug!(artifact = %name, "artifact written");
    }

    for (rendered, relative) in placeholders.iter().zip(&relative_placeholders) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| LabError::io("create placeholder dir", parent, err))?;
            ensure_contained(&canonical_dir, parent, rendered)?;
        }
        if fs::symlink_metadata(&path).is_ok() {
            debug!(path = %relative.display(), "placeholder target already present");
            continue;
        }
        let body = format!("placeholder for {}", relative.display());
        fs::write(&path, body).map_err(|err| LabError::io("write placeholder", &path, err))?;
        debug!(path = %relative.display(), "placeholder written");
    }

    Ok(dir)
}

/// Join a rendered validator path under `staging_dir`, refusing escapes.
///
/// An existing target is canonicalized so a symlink pointing elsewhere is
/// rejected too.
pub fn resolve_in_staging(staging_dir: &Path, rendered: &str) -> LabResult<PathBuf> {
    let relative = staging_relative(rendered)?;
    let path = staging_dir.join(relative);
    if path.exists() {
        let canonical_dir = fs::canonicalize(staging_dir)
            .map_err(|err| LabError::io("resolve staging dir", staging_dir, err))?;
        ensure_contained(&canonical_dir, &path, rendered)?;
    }
    Ok(path)
}

fn ensure_contained(canonical_dir: &Path, target: &Path, rendered: &str) -> LabResult<()> {
    let canonical =
        fs::canonicalize(target).map_err(|err| LabError::io("resolve staging path", target, err))?;
    if canonical.starts_with(canonical_dir) {
        Ok(())
    } else {
        Err(LabError::PathEscapesStaging {
            path: rendered.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn artifacts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, body)| (name.to_string(), body.to_string()))
            .collect()
    }

    #[test]
    fn writes_artifacts_and_placeholders() {
        let temp = tempdir().expect("tempdir");
        let dir = materialize(
            temp.path(),
            "sess-1",
            &artifacts(&[("db_flag", "OMNIHACK1234abcd")]),
            &["/flag.txt".to_string(), "/loot/keys/id_rsa".to_string()],
        )
        .expect("materialize");

        assert_eq!(dir, temp.path().join("sess-1"));
        assert_eq!(
            fs::read_to_string(dir.join("db_flag.txt")).expect("artifact"),
            "OMNIHACK1234abcd"
        );
        assert_eq!(
            fs::read_to_string(dir.join("flag.txt")).expect("placeholder"),
            "placeholder for flag.txt"
        );
        assert!(dir.join("loot/keys/id_rsa").is_file());
        assert!(!temp.path().join("flag.txt").exists());
    }

    #[test]
    fn artifact_wins_over_placeholder() {
        let temp = tempdir().expect("tempdir");
        let dir = materialize(
            temp.path(),
            "sess-2",
            &artifacts(&[("db_flag", "real")]),
            &["/db_flag.txt".to_string()],
        )
        .expect("materialize");
        assert_eq!(fs::read_to_string(dir.join("db_flag.txt")).expect("read"), "real");
    }

    #[test]
    fn existing_session_dir_is_a_conflict() {
        let temp = tempdir().expect("tempdir");
        materialize(temp.path(), "sess-3", &BTreeMap::new(), &[]).expect("first");
        let err = materialize(temp.path(), "sess-3", &BTreeMap::new(), &[]).expect_err("second");
        assert!(matches!(err, LabError::StagingConflict { .. }));
    }

    #[test]
    fn traversal_is_rejected_before_writing() {
        let temp = tempdir().expect("tempdir");
        let err = materialize(
            temp.path(),
            "sess-4",
            &BTreeMap::new(),
            &["/../../escape.txt".to_string()],
        )
        .expect_err("escape");
        assert!(matches!(err, LabError::PathEscapesStaging { .. }));
        assert!(!temp.path().join("sess-4").exists());
        assert!(!temp.path().join("escape.txt").exists());
    }

    #[test]
    fn artifact_names_must_be_segments() {
        let temp = tempdir().expect("tempdir");
        let err = materialize(temp.path(), "sess-5", &artifacts(&[("../evil", "x")]), &[])
            .expect_err("bad name");
        assert!(matches!(err, LabError::InvalidArtifactName { .. }));
    }

    #[test]
    fn rejects_unsafe_session_id() {
        let temp = tempdir().expect("tempdir");
        let err = materialize(temp.path(), "../up", &BTreeMap::new(), &[]).expect_err("bad id");
        assert!(matches!(err, LabError::InvalidSessionId { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_parent_cannot_escape() {
        let temp = tempdir().expect("tempdir");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&outside).expect("outside");
        let dir = materialize(temp.path(), "sess-6", &BTreeMap::new(), &[]).expect("stage");
        std::os::unix::fs::symlink(&outside, dir.join("link")).expect("symlink");

        let err = resolve_in_staging(&dir, "/link").expect_err("escape");
        assert!(matches!(err, LabError::PathEscapesStaging { .. }));
        assert!(resolve_in_staging(&dir, "/missing.txt").is_ok());
    }
}
