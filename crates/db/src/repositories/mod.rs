//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! a `&PgPool` (or, for inserts that may run inside a transaction, any
//! `PgExecutor`) as the first argument.

pub mod artifact_repo;
pub mod job_log_repo;
pub mod job_repo;
pub mod page_repo;

pub use artifact_repo::ArtifactRepo;
pub use job_log_repo::JobLogRepo;
pub use job_repo::JobRepo;
pub use page_repo::PageRepo;
