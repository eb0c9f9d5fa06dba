use serde::{Deserialize, Serialize};

/// 学习集中的单个词条，调度器只读
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Term {
    pub id: String,
    pub word: String,
    pub definition: String,
    pub rank: i64,
}

/// Per-user mutable study state for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermRecord {
    pub term_id: String,
    pub correctness: u32,
    pub incorrect_count: u32,
    pub appeared_in_round: Option<u32>,
    pub studiable_rank: Option<i64>,
}

impl TermRecord {
    pub fn fresh(term_id: &str) -> Self {
        Self {
            term_id: term_id.to_string(),
            correctness: 0,
            incorrect_count: 0,
            appeared_in_round: None,
            studiable_rank: None,
        }
    }

    pub fn state(&self, mastery_threshold: u32) -> TermState {
        if self.correctness >= mastery_threshold {
            TermState::Mastered
        } else if self.appeared_in_round.is_none() {
            TermState::Unseen
        } else {
            TermState::Active
        }
    }

    pub fn is_mastered(&self, mastery_threshold: u32) -> bool {
        self.correctness >= mastery_threshold
    }
}

/// Derived from a [`TermRecord`]; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TermState {
    Unseen,
    Active,
    Mastered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnswerMode {
    #[default]
    MultipleChoice,
    Written,
}

impl AnswerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MultipleChoice => "multipleChoice",
            Self::Written => "written",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearnMode {
    #[default]
    Learn,
    Review,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub term: Term,
    pub record: TermRecord,
}

impl PoolEntry {
    pub fn new(term: Term, record: TermRecord) -> Self {
        Self { term, record }
    }

    pub fn term_id(&self) -> &str {
        &self.term.id
    }

    /// Rank used for queue order; entries always carry one after initialization.
    pub fn queue_rank(&self) -> i64 {
        self.record.studiable_rank.unwrap_or(self.term.rank)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub round: u32,
    pub total_terms: usize,
    pub mastered: usize,
    pub remaining: usize,
    pub unseen: usize,
    pub presented_this_round: usize,
    pub answered: u32,
    pub incorrect_answers: u32,
    pub session_complete: bool,
}
