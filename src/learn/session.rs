use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::learn::config::{ModeConfig, SchedulerConfig};
use crate::learn::error::LearnError;
use crate::learn::rank;
use crate::learn::sync::{RecordSink, SyncBatch};
use crate::learn::types::{PoolEntry, SessionStats, TermRecord, TermState};

/// Identity of the learner/set pair a session runs for.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub user_id: String,
    pub set_id: String,
    /// Round to resume from; 1 for a fresh session.
    pub start_round: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
    pub record: TermRecord,
    pub previous_state: TermState,
    pub state: TermState,
    pub newly_mastered: bool,
    pub round_complete: bool,
    pub session_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RoundTransition {
    #[serde(rename_all = "camelCase")]
    NextRound { round: u32, remaining: usize },
    #[serde(rename_all = "camelCase")]
    SessionComplete { round: u32 },
}

#[derive(Debug)]
pub struct TeardownReport {
    pub flushed_records: usize,
    /// Batch the sink refused at teardown; the caller decides how to persist it.
    pub undelivered: Option<SyncBatch>,
}

/// Learn 模式的会话状态机：选词、判分、轮次推进
pub struct LearnSession {
    id: String,
    context: SessionContext,
    mode: ModeConfig,
    mastery_threshold: u32,
    reinsert_offset: usize,
    round: u32,
    entries: Vec<PoolEntry>,
    selected: Option<String>,
    pending: BTreeSet<String>,
    /// Every term ever marked pending, delivered or not.
    touched: HashSet<String>,
    /// 复习会话：词条进入会话时已存储的排名，落盘时写回
    stored_ranks: HashMap<String, Option<i64>>,
    round_dirty: bool,
    answered: u32,
    incorrect_answers: u32,
    sink: Arc<dyn RecordSink>,
}

impl std::fmt::Debug for LearnSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearnSession")
            .field("id", &self.id)
            .field("user_id", &self.context.user_id)
            .field("set_id", &self.context.set_id)
            .field("round", &self.round)
            .field("terms", &self.entries.len())
            .field("selected", &self.selected)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl LearnSession {
    pub fn new(
        context: SessionContext,
        pool: Vec<PoolEntry>,
        mode: ModeConfig,
        config: &SchedulerConfig,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, LearnError> {
        Self::new_with_rng(context, pool, mode, config, sink, &mut rand::thread_rng())
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        context: SessionContext,
        mut pool: Vec<PoolEntry>,
        mode: ModeConfig,
        config: &SchedulerConfig,
        sink: Arc<dyn RecordSink>,
        rng: &mut R,
    ) -> Result<Self, LearnError> {
        mode.validate()?;
        config
            .validate()
            .map_err(LearnError::InvalidModeConfig)?;

        let mastery_threshold = mode.effective_threshold(config);
        let stored_ranks = if mode.review_only {
            pool.iter()
                .map(|e| (e.term.id.clone(), e.record.studiable_rank))
                .collect()
        } else {
            HashMap::new()
        };

        let reordered = if mode.is_filtered() {
            rank::pack_subset_ranks(&mut pool)
        } else {
            rank::normalize_ranks(&mut pool)
        };

        let round = context.start_round.max(1);
        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            context,
            mode,
            mastery_threshold,
            reinsert_offset: config.reinsert_offset,
            round,
            entries: pool,
            selected: None,
            pending: BTreeSet::new(),
            touched: HashSet::new(),
            stored_ranks,
            round_dirty: false,
            answered: 0,
            incorrect_answers: 0,
            sink,
        };
        session.mark_moved(&reordered);
        if session.mode.shuffle {
            let shuffled =
                rank::shuffle_active(&mut session.entries, mastery_threshold, rng);
            session.mark_moved(&shuffled);
        }

        tracing::info!(
            session_id = %session.id,
            user_id = %session.context.user_id,
            set_id = %session.context.set_id,
            terms = session.entries.len(),
            round,
            mastery_threshold,
            answer_mode = session.mode.answer_mode.as_str(),
            "Learn session started"
        );

        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.context.user_id
    }

    pub fn set_id(&self) -> &str {
        &self.context.set_id
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn mode(&self) -> &ModeConfig {
        &self.mode
    }

    pub fn mastery_threshold(&self) -> u32 {
        self.mastery_threshold
    }

    /// Pool in current queue order.
    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_complete(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.record.is_mastered(self.mastery_threshold))
    }

    pub fn is_round_complete(&self) -> bool {
        !self.entries.iter().any(|e| self.is_selectable(e))
    }

    fn is_selectable(&self, entry: &PoolEntry) -> bool {
        !entry.record.is_mastered(self.mastery_threshold)
            && entry.record.appeared_in_round != Some(self.round)
    }

    fn position_of(&self, term_id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.term.id == term_id)
    }

    /// Picks the next term of the current round. Records are not touched;
    /// only the selection cursor moves.
    pub fn select_next(&mut self) -> Result<&PoolEntry, LearnError> {
        if let Some(pos) = self.selected.as_deref().and_then(|id| self.position_of(id)) {
            if self.is_selectable(&self.entries[pos]) {
                return Ok(&self.entries[pos]);
            }
        }

        let pos = self
            .entries
            .iter()
            .position(|e| self.is_selectable(e))
            .ok_or(LearnError::EmptyPool { round: self.round })?;
        self.selected = Some(self.entries[pos].term.id.clone());
        Ok(&self.entries[pos])
    }

    pub fn grade(&mut self, term_id: &str, is_correct: bool) -> Result<GradeOutcome, LearnError> {
        if self.selected.as_deref() != Some(term_id) {
            return Err(LearnError::StaleSelection {
                graded: term_id.to_string(),
                selected: self.selected.clone(),
            });
        }
        let pos = self
            .position_of(term_id)
            .ok_or_else(|| LearnError::UnknownTerm(term_id.to_string()))?;

        let threshold = self.mastery_threshold;
        let round = self.round;
        self.selected = None;

        let record = &mut self.entries[pos].record;
        let previous_state = record.state(threshold);
        record.appeared_in_round = Some(round);
        if is_correct {
            record.correctness += 1;
        } else {
            record.incorrect_count += 1;
            record.correctness = 0;
        }
        let state = record.state(threshold);
        self.mark_pending(term_id.to_string());

        self.answered += 1;
        if !is_correct {
            self.incorrect_answers += 1;
            let offset = self.reinsert_offset;
            let moved = rank::reinsert_after_miss(&mut self.entries, pos, offset, threshold);
            self.mark_moved(&moved);
        }

        let record = self
            .position_of(term_id)
            .map(|p| self.entries[p].record.clone())
            .ok_or_else(|| LearnError::UnknownTerm(term_id.to_string()))?;
        let newly_mastered = state == TermState::Mastered && previous_state != TermState::Mastered;

        tracing::debug!(
            session_id = %self.id,
            term_id,
            is_correct,
            correctness = record.correctness,
            incorrect_count = record.incorrect_count,
            newly_mastered,
            "Term graded"
        );

        self.emit_pending();

        let session_complete = self.is_complete();
        if session_complete {
            tracing::info!(session_id = %self.id, round, "All terms mastered");
        }

        Ok(GradeOutcome {
            record,
            previous_state,
            state,
            newly_mastered,
            round_complete: self.is_round_complete(),
            session_complete,
        })
    }

    /// Closes the current round. Fails while the round still has terms to present.
    pub fn advance_round(&mut self) -> Result<RoundTransition, LearnError> {
        if self.is_complete() {
            return Ok(RoundTransition::SessionComplete { round: self.round });
        }

        let selectable = self.entries.iter().filter(|e| self.is_selectable(e)).count();
        if selectable > 0 {
            return Err(LearnError::RoundInProgress {
                round: self.round,
                selectable,
            });
        }

        self.round += 1;
        self.selected = None;
        // 复习轮次不写回集合的 learnRound
        self.round_dirty = !self.mode.review_only;
        let remaining = self
            .entries
            .iter()
            .filter(|e| !e.record.is_mastered(self.mastery_threshold))
            .count();

        tracing::info!(session_id = %self.id, round = self.round, remaining, "Round advanced");
        self.emit_pending();

        Ok(RoundTransition::NextRound {
            round: self.round,
            remaining,
        })
    }

    pub fn reshuffle(&mut self) -> usize {
        self.reshuffle_with(&mut rand::thread_rng())
    }

    /// Randomizes the order of every non-mastered term. Mastery state is untouched.
    pub fn reshuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let moved = rank::shuffle_active(&mut self.entries, self.mastery_threshold, rng);
        self.mark_moved(&moved);
        tracing::debug!(session_id = %self.id, moved = moved.len(), "Pool reshuffled");
        self.emit_pending();
        moved.len()
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = SessionStats {
            round: self.round,
            total_terms: self.entries.len(),
            answered: self.answered,
            incorrect_answers: self.incorrect_answers,
            ..SessionStats::default()
        };
        for entry in &self.entries {
            match entry.record.state(self.mastery_threshold) {
                TermState::Mastered => stats.mastered += 1,
                TermState::Unseen => stats.unseen += 1,
                TermState::Active => {}
            }
            if entry.record.appeared_in_round == Some(self.round) {
                stats.presented_this_round += 1;
            }
        }
        stats.remaining = stats.total_terms - stats.mastered;
        stats.session_complete = stats.remaining == 0;
        stats
    }

    fn mark_pending(&mut self, term_id: String) {
        self.touched.insert(term_id.clone());
        self.pending.insert(term_id);
    }

    /// Queues terms whose rank moved. Review passes keep their order in memory only.
    fn mark_moved(&mut self, positions: &[usize]) {
        if self.mode.review_only {
            return;
        }
        for &pos in positions {
            let term_id = self.entries[pos].term.id.clone();
            self.mark_pending(term_id);
        }
    }

    fn persisted_record(&self, entry: &PoolEntry) -> TermRecord {
        let mut record = entry.record.clone();
        if let Some(&rank) = self.stored_ranks.get(&entry.term.id) {
            record.studiable_rank = rank;
        }
        record
    }

    /// Records this session has changed, in the form they are written back.
    /// Untouched terms are left out: their stored record is still current.
    pub fn changed_records(&self) -> Vec<TermRecord> {
        self.entries
            .iter()
            .filter(|e| self.touched.contains(&e.term.id))
            .map(|e| self.persisted_record(e))
            .collect()
    }

    fn take_batch(&self) -> Option<SyncBatch> {
        if self.pending.is_empty() && !self.round_dirty {
            return None;
        }
        let records = self
            .entries
            .iter()
            .filter(|e| self.pending.contains(&e.term.id))
            .map(|e| self.persisted_record(e))
            .collect();
        Some(SyncBatch {
            user_id: self.context.user_id.clone(),
            set_id: self.context.set_id.clone(),
            round: (!self.mode.review_only).then_some(self.round),
            records,
        })
    }

    /// Hands pending snapshots to the sink; on refusal they stay pending.
    fn emit_pending(&mut self) {
        let Some(batch) = self.take_batch() else {
            return;
        };
        let count = batch.records.len();
        match self.sink.submit(batch) {
            Ok(()) => {
                self.pending.clear();
                self.round_dirty = false;
            }
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    error = %e,
                    pending = count,
                    "Record sync deferred"
                );
            }
        }
    }

    /// Flushes whatever is still pending and consumes the session.
    pub fn teardown(self) -> TeardownReport {
        let flushed_records = self.pending.len();
        let undelivered = self.take_batch().and_then(|batch| {
            match self.sink.submit(batch.clone()) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(
                        session_id = %self.id,
                        error = %e,
                        pending = batch.records.len(),
                        "Sink refused final flush"
                    );
                    Some(batch)
                }
            }
        });

        tracing::info!(
            session_id = %self.id,
            round = self.round,
            answered = self.answered,
            complete = self.is_complete(),
            "Learn session torn down"
        );

        TeardownReport {
            flushed_records: if undelivered.is_some() { 0 } else { flushed_records },
            undelivered,
        }
    }
}
