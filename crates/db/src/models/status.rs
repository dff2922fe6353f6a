//! String-backed enums for the TEXT status/kind columns.
//!
//! Each enum's stored value matches the CHECK constraint in the migration.

use pressline_core::define_text_enum;

pub use pressline_core::kinds::{ArtifactKind, StorageKind};

define_text_enum! {
    /// Kind of work a job performs. Also selects its default queue.
    JobKind {
        Compile = "compile",
        Workflow = "workflow",
        Export = "export",
    }
}

define_text_enum! {
    /// Job lifecycle status.
    JobStatus {
        Pending = "pending",
        Running = "running",
        Completed = "completed",
        Failed = "failed",
        Cancelled = "cancelled",
    }
}

define_text_enum! {
    /// Severity of a job log entry.
    LogLevel {
        Info = "INFO",
        Warn = "WARN",
        Error = "ERROR",
    }
}

impl JobStatus {
    /// Completed, failed and cancelled jobs never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        let terminal: Vec<_> = JobStatus::ALL.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminal.len(), 3);
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn log_levels_are_upper_case() {
        assert_eq!(LogLevel::Warn.as_str(), "WARN");
        assert_eq!(LogLevel::parse("ERROR").unwrap(), LogLevel::Error);
    }

    #[test]
    fn job_kind_round_trips_through_str() {
        assert_eq!("workflow".parse::<JobKind>().unwrap(), JobKind::Workflow);
    }
}
