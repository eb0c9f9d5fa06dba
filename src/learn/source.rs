//! Collaborator contracts consumed by the scheduler.

use crate::learn::types::{Term, TermRecord};

/// Read-only access to the terms of a study set.
pub trait TermSource {
    type Error: std::error::Error + Send + Sync + 'static;

    fn terms_for_set(&self, set_id: &str) -> Result<Vec<Term>, Self::Error>;
}

/// Durable per-user term records. Absence of a record means "never studied".
pub trait RecordStore {
    type Error: std::error::Error + Send + Sync + 'static;

    fn learn_records(&self, user_id: &str, set_id: &str) -> Result<Vec<TermRecord>, Self::Error>;

    fn upsert_learn_records(
        &self,
        user_id: &str,
        set_id: &str,
        records: &[TermRecord],
    ) -> Result<(), Self::Error>;

    fn save_learn_round(&self, user_id: &str, set_id: &str, round: u32) -> Result<(), Self::Error>;
}
