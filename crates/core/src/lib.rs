//! Domain building blocks shared by every Pressline crate.
//!
//! Nothing in here performs network or database I/O. File reads are limited
//! to content hashing and the local-file quality check.

pub mod error;
pub mod hashing;
pub mod heuristics;
pub mod ids;
pub mod kinds;
pub mod layout;
pub mod preflight;
pub mod project_config;
pub mod quality_gate;
pub mod types;
