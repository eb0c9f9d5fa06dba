//! Adaptive Learn-mode scheduler.
//!
//! Builds a pool from a set's terms and the learner's persisted records,
//! then drives it round by round: [`session::LearnSession::select_next`]
//! picks, [`session::LearnSession::grade`] mutates the record and re-ranks,
//! [`session::LearnSession::advance_round`] closes a round. Mutated records
//! leave through a [`sync::RecordSink`] and never block the session.

pub mod config;
pub mod error;
pub mod initializer;
pub mod rank;
pub mod registry;
pub mod session;
pub mod source;
pub mod sync;
pub mod types;

pub use config::{MasteryThresholds, ModeConfig, SchedulerConfig};
pub use error::LearnError;
pub use session::{GradeOutcome, LearnSession, RoundTransition, SessionContext};
pub use types::{AnswerMode, LearnMode, PoolEntry, Term, TermRecord, TermState};
