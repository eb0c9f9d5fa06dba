use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::learn::source::TermSource;
use crate::learn::types::Term;
use crate::store::keys;
use crate::store::{map_tx_error, Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudySet {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTerm {
    pub id: String,
    pub study_set_id: String,
    pub word: String,
    pub definition: String,
    pub rank: i64,
}

impl From<StoredTerm> for Term {
    fn from(stored: StoredTerm) -> Self {
        Term {
            id: stored.id,
            word: stored.word,
            definition: stored.definition,
            rank: stored.rank,
        }
    }
}

impl Store {
    /// 学习集与全部词条在同一事务中写入
    pub fn create_study_set(&self, set: &StudySet, terms: &[StoredTerm]) -> Result<(), StoreError> {
        let mut ranks = HashSet::with_capacity(terms.len());
        let mut ids = HashSet::with_capacity(terms.len());
        for term in terms {
            if term.study_set_id != set.id {
                return Err(StoreError::Validation(format!(
                    "term {} belongs to set {}",
                    term.id, term.study_set_id
                )));
            }
            if !ranks.insert(term.rank) {
                return Err(StoreError::Validation(format!(
                    "duplicate term rank {}",
                    term.rank
                )));
            }
            if !ids.insert(term.id.as_str()) {
                return Err(StoreError::Validation(format!(
                    "duplicate term id {}",
                    term.id
                )));
            }
        }

        let set_key = keys::study_set_key(&set.id);
        let index_key = keys::study_set_user_index(&set.user_id, &set.id);
        let set_bytes = Self::serialize(set)?;
        let mut term_rows = Vec::with_capacity(terms.len());
        for term in terms {
            let key = keys::term_key(&set.id, term.rank, &term.id);
            term_rows.push((key, Self::serialize(term)?));
        }

        (&self.study_sets, &self.terms)
            .transaction(|(tx_sets, tx_terms)| {
                if tx_sets.get(set_key.as_bytes())?.is_some() {
                    return Err(sled::transaction::ConflictableTransactionError::Abort(
                        StoreError::Conflict {
                            entity: "study_set".to_string(),
                            key: set.id.clone(),
                        },
                    ));
                }
                tx_sets.insert(set_key.as_bytes(), set_bytes.as_slice())?;
                tx_sets.insert(index_key.as_bytes(), &[] as &[u8])?;
                for (key, value) in &term_rows {
                    tx_terms.insert(key.as_bytes(), value.as_slice())?;
                }
                Ok(())
            })
            .map_err(map_tx_error)?;

        Ok(())
    }

    pub fn get_study_set(&self, set_id: &str) -> Result<Option<StudySet>, StoreError> {
        let key = keys::study_set_key(set_id);
        match self.study_sets.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn require_study_set(&self, set_id: &str) -> Result<StudySet, StoreError> {
        self.get_study_set(set_id)?.ok_or_else(|| StoreError::NotFound {
            entity: "study_set".to_string(),
            key: set_id.to_string(),
        })
    }

    pub fn list_user_study_sets(&self, user_id: &str) -> Result<Vec<StudySet>, StoreError> {
        let prefix = keys::study_set_user_prefix(user_id);
        let mut sets = Vec::new();
        for item in self.study_sets.scan_prefix(prefix.as_bytes()) {
            let (k, _) = item?;
            let set_id = String::from_utf8_lossy(&k[prefix.len()..]).to_string();
            if let Some(set) = self.get_study_set(&set_id)? {
                sets.push(set);
            }
        }
        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sets)
    }

    /// Terms in author order.
    pub fn list_terms(&self, set_id: &str) -> Result<Vec<StoredTerm>, StoreError> {
        let prefix = keys::term_prefix(set_id);
        let mut terms = Vec::new();
        for item in self.terms.scan_prefix(prefix.as_bytes()) {
            let (_, v) = item?;
            terms.push(Self::deserialize::<StoredTerm>(&v)?);
        }
        Ok(terms)
    }

    pub fn get_term(&self, set_id: &str, term_id: &str) -> Result<Option<StoredTerm>, StoreError> {
        Ok(self
            .list_terms(set_id)?
            .into_iter()
            .find(|t| t.id == term_id))
    }
}

impl TermSource for Store {
    type Error = StoreError;

    fn terms_for_set(&self, set_id: &str) -> Result<Vec<Term>, Self::Error> {
        self.require_study_set(set_id)?;
        Ok(self.list_terms(set_id)?.into_iter().map(Term::from).collect())
    }
}
