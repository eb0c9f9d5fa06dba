use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::learn::config::ModeConfig;
use crate::learn::error::LearnError;
use crate::learn::rank;
use crate::learn::types::{PoolEntry, Term, TermRecord};

fn authored_order(a: &PoolEntry, b: &PoolEntry) -> Ordering {
    a.term
        .rank
        .cmp(&b.term.rank)
        .then_with(|| a.term.id.cmp(&b.term.id))
}

fn studied_order(a: &PoolEntry, b: &PoolEntry) -> Ordering {
    a.record
        .studiable_rank
        .cmp(&b.record.studiable_rank)
        .then_with(|| authored_order(a, b))
}

/// Orders entries by `studiable_rank` where both sides carry one and by the
/// authored `rank` otherwise.
///
/// A pairwise "rank unless both are studied" comparator is not transitive, so
/// it is realised as: lay everything out in authored order, then permute the
/// studied entries among their own slots by `studiable_rank`. Unstudied terms
/// keep their authored positions.
pub fn order_pool(entries: &mut [PoolEntry]) {
    entries.sort_by(authored_order);

    let slots: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| e.record.studiable_rank.is_some())
        .map(|(idx, _)| idx)
        .collect();
    if slots.len() < 2 {
        return;
    }

    let mut studied: Vec<PoolEntry> = slots.iter().map(|&idx| entries[idx].clone()).collect();
    studied.sort_by(studied_order);

    for (slot, entry) in slots.into_iter().zip(studied) {
        entries[slot] = entry;
    }
}

/// 根据词条、历史记录和模式配置构建初始学习池
pub fn build_pool(
    terms: Vec<Term>,
    records: Vec<TermRecord>,
    mode: &ModeConfig,
) -> Result<Vec<PoolEntry>, LearnError> {
    mode.validate()?;

    let mut seen = HashSet::with_capacity(terms.len());
    for term in &terms {
        if !seen.insert(term.id.as_str()) {
            return Err(LearnError::InvalidModeConfig(format!(
                "duplicate term id {}",
                term.id
            )));
        }
    }

    let mut record_by_term: HashMap<String, TermRecord> = records
        .into_iter()
        .map(|r| (r.term_id.clone(), r))
        .collect();

    let mut entries: Vec<PoolEntry> = terms
        .into_iter()
        .map(|term| {
            let record = record_by_term
                .remove(&term.id)
                .unwrap_or_else(|| TermRecord::fresh(&term.id));
            PoolEntry::new(term, record)
        })
        .collect();

    if !record_by_term.is_empty() {
        tracing::debug!(
            orphaned = record_by_term.len(),
            "Ignoring records for terms no longer in the set"
        );
    }

    order_pool(&mut entries);
    let ceiling = entries
        .iter()
        .filter_map(|e| e.record.studiable_rank)
        .max()
        .unwrap_or(0);

    if mode.starred_only {
        entries.retain(|e| mode.starred_term_ids.contains(&e.term.id));
    }

    if mode.review_only {
        entries.retain(|e| e.record.incorrect_count > 0);
        // Review pass re-studies every missed term from scratch.
        for entry in &mut entries {
            entry.record.correctness = 0;
        }
        entries.sort_by(|a, b| b.record.incorrect_count.cmp(&a.record.incorrect_count));
    }

    // 子集会话只能复用子集自己的排名，未排名的词条排到全集最大值之后
    if mode.is_filtered() {
        rank::rank_unranked_above(&mut entries, ceiling);
    }

    Ok(entries)
}
