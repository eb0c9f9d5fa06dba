use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::learn::source::RecordStore;
use crate::learn::types::TermRecord;
use crate::store::keys;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StudiableMode {
    Learn,
    Flashcards,
}

impl StudiableMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Learn => "learn",
            Self::Flashcards => "flashcards",
        }
    }
}

/// 持久化的单词条学习记录，按 (user, set, mode, term) 存储
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StudiableTermRecord {
    pub user_id: String,
    pub study_set_id: String,
    pub term_id: String,
    pub mode: StudiableMode,
    pub correctness: u32,
    pub incorrect_count: u32,
    pub appeared_in_round: Option<u32>,
    pub studiable_rank: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl StudiableTermRecord {
    pub fn from_learn(user_id: &str, set_id: &str, record: &TermRecord) -> Self {
        Self {
            user_id: user_id.to_string(),
            study_set_id: set_id.to_string(),
            term_id: record.term_id.clone(),
            mode: StudiableMode::Learn,
            correctness: record.correctness,
            incorrect_count: record.incorrect_count,
            appeared_in_round: record.appeared_in_round,
            studiable_rank: record.studiable_rank,
            updated_at: Utc::now(),
        }
    }

    pub fn to_term_record(&self) -> TermRecord {
        TermRecord {
            term_id: self.term_id.clone(),
            correctness: self.correctness,
            incorrect_count: self.incorrect_count,
            appeared_in_round: self.appeared_in_round,
            studiable_rank: self.studiable_rank,
        }
    }
}

impl Store {
    pub fn list_studiable_terms(
        &self,
        user_id: &str,
        set_id: &str,
        mode: StudiableMode,
    ) -> Result<Vec<StudiableTermRecord>, StoreError> {
        let prefix = keys::studiable_term_prefix(user_id, set_id, mode.as_str());
        let mut records = Vec::new();
        for item in self.studiable_terms.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            records.push(Self::deserialize(&v)?);
        }
        Ok(records)
    }

    /// Writes every record in one atomic batch.
    pub fn upsert_studiable_terms(&self, records: &[StudiableTermRecord]) -> Result<(), StoreError> {
        let mut batch = sled::Batch::default();
        for record in records {
            let key = keys::studiable_term_key(
                &record.user_id,
                &record.study_set_id,
                record.mode.as_str(),
                &record.term_id,
            );
            batch.insert(key.as_bytes(), Self::serialize(record)?);
        }
        self.studiable_terms.apply_batch(batch)?;
        Ok(())
    }

    /// Drops learn progress for the set and rewinds the container to round 1.
    /// Flashcard records are kept.
    pub fn reset_learn_progress(&self, user_id: &str, set_id: &str) -> Result<usize, StoreError> {
        let prefix = keys::studiable_term_prefix(user_id, set_id, StudiableMode::Learn.as_str());
        let mut batch = sled::Batch::default();
        let mut removed = 0usize;
        for item in self.studiable_terms.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            batch.remove(k);
            removed += 1;
        }
        self.studiable_terms.apply_batch(batch)?;
        self.update_container(user_id, set_id, |c| c.learn_round = 1)?;

        tracing::info!(user_id, set_id, removed, "Learn progress reset");
        Ok(removed)
    }
}

impl RecordStore for Store {
    type Error = StoreError;

    fn learn_records(&self, user_id: &str, set_id: &str) -> Result<Vec<TermRecord>, Self::Error> {
        Ok(self
            .list_studiable_terms(user_id, set_id, StudiableMode::Learn)?
            .iter()
            .map(StudiableTermRecord::to_term_record)
            .collect())
    }

    fn upsert_learn_records(
        &self,
        user_id: &str,
        set_id: &str,
        records: &[TermRecord],
    ) -> Result<(), Self::Error> {
        let rows: Vec<StudiableTermRecord> = records
            .iter()
            .map(|r| StudiableTermRecord::from_learn(user_id, set_id, r))
            .collect();
        self.upsert_studiable_terms(&rows)
    }

    fn save_learn_round(&self, user_id: &str, set_id: &str, round: u32) -> Result<(), Self::Error> {
        self.update_container(user_id, set_id, |c| c.learn_round = round.max(1))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(id: &str, correctness: u32, incorrect: u32) -> TermRecord {
        TermRecord {
            term_id: id.to_string(),
            correctness,
            incorrect_count: incorrect,
            appeared_in_round: Some(1),
            studiable_rank: Some(1),
        }
    }

    #[test]
    fn learn_records_roundtrip_through_sled() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();

        store
            .upsert_learn_records("u1", "s1", &[record("a", 1, 0), record("b", 0, 2)])
            .unwrap();
        store
            .upsert_learn_records("u1", "s1", &[record("b", 1, 2)])
            .unwrap();

        let mut records = store.learn_records("u1", "s1").unwrap();
        records.sort_by(|x, y| x.term_id.cmp(&y.term_id));
        assert_eq!(records, vec![record("a", 1, 0), record("b", 1, 2)]);
        assert!(store.learn_records("u2", "s1").unwrap().is_empty());
    }

    #[test]
    fn reset_only_drops_learn_mode() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        store
            .upsert_learn_records("u1", "s1", &[record("a", 1, 0)])
            .unwrap();
        let mut flash = StudiableTermRecord::from_learn("u1", "s1", &record("a", 0, 0));
        flash.mode = StudiableMode::Flashcards;
        store.upsert_studiable_terms(&[flash]).unwrap();
        store.save_learn_round("u1", "s1", 4).unwrap();

        assert_eq!(store.reset_learn_progress("u1", "s1").unwrap(), 1);
        assert!(store.learn_records("u1", "s1").unwrap().is_empty());
        assert_eq!(
            store
                .list_studiable_terms("u1", "s1", StudiableMode::Flashcards)
                .unwrap()
                .len(),
            1
        );
        let container = store.get_container("u1", "s1").unwrap().unwrap();
        assert_eq!(container.learn_round, 1);
    }

    #[test]
    fn saved_round_is_persisted() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("db").to_str().unwrap()).unwrap();
        store.save_learn_round("u1", "s1", 3).unwrap();
        assert_eq!(
            store.get_or_default_container("u1", "s1").unwrap().learn_round,
            3
        );
    }
}
