//! Stable exit codes for `lab-engine` commands.

use crate::error::{ErrorKind, LabError};

/// Command succeeded (for `submit`: the submission passed).
pub const OK: i32 = 0;
/// Invalid config or lab definition, or any other error.
pub const INVALID: i32 = 1;
/// `submit` evaluated the submission and it failed.
pub const FAILED: i32 = 2;
/// Unknown lab or session.
pub const NOT_FOUND: i32 = 3;

/// Exit code for a command that failed with `err`.
pub fn for_error(err: &LabError) -> i32 {
    match err.kind() {
        ErrorKind::NotFound => NOT_FOUND,
        _ => INVALID,
    }
}
