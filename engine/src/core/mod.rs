//! Deterministic, pure logic for lab sessions.
//!
//! Core modules must be free of I/O side effects. Given the same seed and lab
//! definition they return byte-identical results.

pub mod derive;
pub mod params;
pub mod paths;
pub mod template;
pub mod types;
