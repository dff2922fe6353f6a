/// All primary keys are UUIDs (native `UUID` columns in PostgreSQL).
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
