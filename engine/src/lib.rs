//! Deterministic lab-session engine.
//!
//! A lab definition plus a per-session random seed fully determines a
//! session's parameters, its rendered artifacts and the expectations its
//! validators check. The crate is split like this:
//!
//! - **[`core`]**: Pure, deterministic logic (value derivation, parameter
//!   resolution, template rendering, staging path checks). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, lab catalog, staging
//!   directories, session store, terminal provisioning).
//!
//! [`session::LabRunner`] ties them together for the CLI and the HTTP server;
//! [`validators`] holds the pluggable submission checks.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod lab;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validators;

pub use error::{ErrorKind, LabError, LabResult};
