use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearnError {
    /// No selectable term is left in the current round.
    #[error("no term available in round {round}")]
    EmptyPool { round: u32 },
    #[error("stale selection: graded {graded}, selected {selected:?}")]
    StaleSelection {
        graded: String,
        selected: Option<String>,
    },
    #[error("invalid mode config: {0}")]
    InvalidModeConfig(String),
    #[error("round {round} still has {selectable} selectable terms")]
    RoundInProgress { round: u32, selectable: usize },
    #[error("term not in pool: {0}")]
    UnknownTerm(String),
}

impl LearnError {
    /// `EmptyPool` marks round/session completion rather than a failure.
    pub fn is_completion_signal(&self) -> bool {
        matches!(self, Self::EmptyPool { .. })
    }
}
