//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are inserted from outside this crate, a
//! create DTO.

pub mod artifact;
pub mod job;
pub mod job_log;
pub mod page;
pub mod status;
