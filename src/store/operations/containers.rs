use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::learn::config::ModeConfig;
use crate::learn::types::{AnswerMode, LearnMode};
use crate::store::keys;
use crate::store::{Store, StoreError};

const MAX_CAS_ATTEMPTS: u32 = 8;

fn first_round() -> u32 {
    1
}

/// Per-user preferences and progress pointer for one study set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub user_id: String,
    pub study_set_id: String,
    #[serde(default)]
    pub study_starred: bool,
    #[serde(default)]
    pub starred_terms: Vec<String>,
    #[serde(default)]
    pub learn_mode: LearnMode,
    #[serde(default)]
    pub answer_mode: AnswerMode,
    #[serde(default)]
    pub shuffle_learn: bool,
    #[serde(default = "first_round")]
    pub learn_round: u32,
    pub viewed_at: Option<DateTime<Utc>>,
}

impl Container {
    pub fn new(user_id: &str, set_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            study_set_id: set_id.to_string(),
            study_starred: false,
            starred_terms: Vec::new(),
            learn_mode: LearnMode::Learn,
            answer_mode: AnswerMode::MultipleChoice,
            shuffle_learn: false,
            learn_round: 1,
            viewed_at: None,
        }
    }

    /// 没有收藏词条时强制关闭 studyStarred
    fn normalized(mut self) -> Self {
        if self.starred_terms.is_empty() {
            self.study_starred = false;
        }
        self.learn_round = self.learn_round.max(1);
        self
    }

    pub fn mode_config(&self) -> ModeConfig {
        ModeConfig {
            review_only: self.learn_mode == LearnMode::Review,
            starred_only: self.study_starred,
            starred_term_ids: self.starred_terms.iter().cloned().collect(),
            answer_mode: self.answer_mode,
            mastery_threshold: None,
            shuffle: self.shuffle_learn,
        }
    }
}

impl Store {
    pub fn get_container(
        &self,
        user_id: &str,
        set_id: &str,
    ) -> Result<Option<Container>, StoreError> {
        let key = keys::container_key(user_id, set_id);
        match self.containers.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize::<Container>(&raw)?.normalized())),
            None => Ok(None),
        }
    }

    pub fn get_or_default_container(
        &self,
        user_id: &str,
        set_id: &str,
    ) -> Result<Container, StoreError> {
        Ok(self
            .get_container(user_id, set_id)?
            .unwrap_or_else(|| Container::new(user_id, set_id)))
    }

    /// Read-modify-write through compare-and-swap, so concurrent writers
    /// (HTTP handlers and the sync worker) never lose each other's updates.
    pub fn update_container<F>(
        &self,
        user_id: &str,
        set_id: &str,
        mut apply: F,
    ) -> Result<Container, StoreError>
    where
        F: FnMut(&mut Container),
    {
        let key = keys::container_key(user_id, set_id);
        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.containers.get(key.as_bytes())?;
            let mut container = match &current {
                Some(raw) => Self::deserialize::<Container>(raw)?,
                None => Container::new(user_id, set_id),
            };
            apply(&mut container);
            let container = container.normalized();
            let next = Self::serialize(&container)?;

            let swapped = self
                .containers
                .compare_and_swap(key.as_bytes(), current, Some(next))?;
            if swapped.is_ok() {
                return Ok(container);
            }
        }

        Err(StoreError::CasRetryExhausted {
            entity: "container".to_string(),
            key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }

    pub fn star_term(
        &self,
        user_id: &str,
        set_id: &str,
        term_id: &str,
    ) -> Result<Container, StoreError> {
        if self.get_term(set_id, term_id)?.is_none() {
            return Err(StoreError::NotFound {
                entity: "term".to_string(),
                key: term_id.to_string(),
            });
        }
        self.update_container(user_id, set_id, |c| {
            if !c.starred_terms.iter().any(|t| t == term_id) {
                c.starred_terms.push(term_id.to_string());
            }
        })
    }

    pub fn unstar_term(
        &self,
        user_id: &str,
        set_id: &str,
        term_id: &str,
    ) -> Result<Container, StoreError> {
        self.update_container(user_id, set_id, |c| {
            c.starred_terms.retain(|t| t != term_id);
        })
    }

    pub fn touch_container(&self, user_id: &str, set_id: &str) -> Result<Container, StoreError> {
        self.update_container(user_id, set_id, |c| c.viewed_at = Some(Utc::now()))
    }
}
