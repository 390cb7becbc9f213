//! Seeded binary mutation for reverse-engineering labs.
//!
//! A mutated binary is the input bytes followed by [`MUTATION_MARKER`] and the
//! SHA-256 hex digest of the seed, so each session's binary hashes differently
//! while still executing unchanged.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

pub const MUTATION_MARKER: &[u8] = b"\n#OMNIHACK_MUTATION#\n";

/// Bytes appended to a binary mutated with `seed`.
pub fn mutation_trailer(seed: &str) -> Vec<u8> {
    let digest = hex::encode(Sha256::digest(seed.as_bytes()));
    let mut trailer = Vec::with_capacity(MUTATION_MARKER.len() + digest.len());
    trailer.extend_from_slice(MUTATION_MARKER);
    trailer.extend_from_slice(digest.as_bytes());
    trailer
}

/// Copy `input` to `output` with the seed trailer appended.
///
/// Unix permission bits are carried over so executables stay executable.
pub fn mutate_binary(input: &Path, output: &Path, seed: &str) -> Result<()> {
    let mut bytes = fs::read(input).with_context(|| format!("read {}", input.display()))?;
    bytes.extend_from_slice(&mutation_trailer(seed));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(output, &bytes).with_context(|| format!("write {}", output.display()))?;
    let permissions = fs::metadata(input)
        .with_context(|| format!("stat {}", input.display()))?
        .permissions();
    fs::set_permissions(output, permissions)
        .with_context(|| format!("set permissions {}", output.display()))?;
    debug!(
        input = %input.display(),
        output = %output.display(),
        len = bytes.len(),
        "binary mutated"
    );
    Ok(())
}
