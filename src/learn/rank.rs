//! 排名重算：维护学习池的队列顺序与 `studiable_rank` 一致
//!
//! The pool is always kept physically sorted by `studiable_rank`. Every
//! operation here permutes entries among a set of positions and then hands
//! those positions their original ranks back, so the multiset of ranks never
//! changes and ranks stay unique.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::learn::types::PoolEntry;

/// Assigns the dense ranks `1..=n` in queue order. Returns the positions
/// whose rank changed.
pub fn normalize_ranks(entries: &mut [PoolEntry]) -> Vec<usize> {
    let mut changed = Vec::new();
    for (idx, entry) in entries.iter_mut().enumerate() {
        let rank = Some(idx as i64 + 1);
        if entry.record.studiable_rank != rank {
            entry.record.studiable_rank = rank;
            changed.push(idx);
        }
    }
    changed
}

/// Re-sorts ranks for a filtered pool without taking any rank from outside
/// it: the subset's own values are dealt out again in queue order. Every
/// entry must already carry a rank. Returns the positions whose rank changed.
pub fn pack_subset_ranks(entries: &mut [PoolEntry]) -> Vec<usize> {
    let mut ranks: Vec<Option<i64>> = entries.iter().map(|e| e.record.studiable_rank).collect();
    ranks.sort_unstable();

    let mut changed = Vec::new();
    for (idx, (entry, rank)) in entries.iter_mut().zip(ranks).enumerate() {
        if entry.record.studiable_rank != rank {
            entry.record.studiable_rank = rank;
            changed.push(idx);
        }
    }
    changed
}

/// Hands unranked entries fresh ranks above `ceiling`, in queue order.
pub fn rank_unranked_above(entries: &mut [PoolEntry], ceiling: i64) {
    let mut next = ceiling;
    for entry in entries
        .iter_mut()
        .filter(|e| e.record.studiable_rank.is_none())
    {
        next += 1;
        entry.record.studiable_rank = Some(next);
    }
}

/// Moves the missed entry at `idx` behind the next `offset` non-mastered
/// entries. Mastered entries in between are not touched. When no Active
/// entry follows, the entry stays where it is.
pub fn reinsert_after_miss(
    entries: &mut [PoolEntry],
    idx: usize,
    offset: usize,
    mastery_threshold: u32,
) -> Vec<usize> {
    let mut positions = vec![idx];
    positions.extend(
        entries
            .iter()
            .enumerate()
            .skip(idx + 1)
            .filter(|(_, e)| !e.record.is_mastered(mastery_threshold))
            .map(|(pos, _)| pos)
            .take(offset),
    );

    if positions.len() < 2 {
        return Vec::new();
    }

    let ranks: Vec<Option<i64>> = positions
        .iter()
        .map(|&pos| entries[pos].record.studiable_rank)
        .collect();

    for window in positions.windows(2) {
        entries.swap(window[0], window[1]);
    }
    restore_ranks(entries, &positions, &ranks);

    positions
}

/// Randomly permutes every non-mastered entry among the non-mastered
/// positions. Returns the positions that received a different term.
pub fn shuffle_active<R: Rng + ?Sized>(
    entries: &mut [PoolEntry],
    mastery_threshold: u32,
    rng: &mut R,
) -> Vec<usize> {
    let positions: Vec<usize> = entries
        .iter()
        .enumerate()
        .filter(|(_, e)| !e.record.is_mastered(mastery_threshold))
        .map(|(pos, _)| pos)
        .collect();
    if positions.len() < 2 {
        return Vec::new();
    }

    let before: Vec<String> = positions
        .iter()
        .map(|&pos| entries[pos].term.id.clone())
        .collect();
    let ranks: Vec<Option<i64>> = positions
        .iter()
        .map(|&pos| entries[pos].record.studiable_rank)
        .collect();

    let mut moving: Vec<PoolEntry> = positions.iter().map(|&pos| entries[pos].clone()).collect();
    moving.shuffle(rng);
    for (&pos, entry) in positions.iter().zip(moving) {
        entries[pos] = entry;
    }
    restore_ranks(entries, &positions, &ranks);

    positions
        .iter()
        .zip(before.iter())
        .filter(|(pos, id)| entries[**pos].term.id != **id)
        .map(|(pos, _)| *pos)
        .collect()
}

fn restore_ranks(entries: &mut [PoolEntry], positions: &[usize], ranks: &[Option<i64>]) {
    for (&pos, &rank) in positions.iter().zip(ranks) {
        entries[pos].record.studiable_rank = rank;
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::learn::types::{Term, TermRecord};

    fn pool(ids: &[&str]) -> Vec<PoolEntry> {
        let mut entries: Vec<PoolEntry> = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| {
                PoolEntry::new(
                    Term {
                        id: id.to_string(),
                        word: id.to_string(),
                        definition: id.to_string(),
                        rank: idx as i64,
                    },
                    TermRecord::fresh(id),
                )
            })
            .collect();
        normalize_ranks(&mut entries);
        entries
    }

    fn ids(entries: &[PoolEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.term.id.as_str()).collect()
    }

    fn assert_sorted_unique(entries: &[PoolEntry]) {
        let ranks: Vec<i64> = entries
            .iter()
            .map(|e| e.record.studiable_rank.unwrap())
            .collect();
        assert!(ranks.windows(2).all(|w| w[0] < w[1]), "ranks {ranks:?}");
    }

    #[test]
    fn normalize_reports_only_changed_positions() {
        let mut entries = pool(&["a", "b", "c"]);
        entries[2].record.studiable_rank = Some(10);
        assert_eq!(normalize_ranks(&mut entries), vec![2]);
        assert_sorted_unique(&entries);
    }

    #[test]
    fn miss_moves_behind_offset_active_terms() {
        let mut entries = pool(&["a", "b", "c", "d", "e"]);
        let changed = reinsert_after_miss(&mut entries, 0, 2, 2);
        assert_eq!(ids(&entries), vec!["b", "c", "a", "d", "e"]);
        assert_eq!(changed, vec![0, 1, 2]);
        assert_sorted_unique(&entries);
    }

    #[test]
    fn miss_skips_mastered_terms_without_touching_them() {
        let mut entries = pool(&["a", "b", "c", "d"]);
        entries[1].record.correctness = 2;
        let mastered_rank = entries[1].record.studiable_rank;

        reinsert_after_miss(&mut entries, 0, 2, 2);

        assert_eq!(ids(&entries), vec!["c", "b", "d", "a"]);
        assert_eq!(entries[1].record.studiable_rank, mastered_rank);
        assert_sorted_unique(&entries);
    }

    #[test]
    fn miss_near_tail_moves_as_far_as_possible() {
        let mut entries = pool(&["a", "b", "c"]);
        reinsert_after_miss(&mut entries, 1, 3, 2);
        assert_eq!(ids(&entries), vec!["a", "c", "b"]);
    }

    #[test]
    fn miss_at_tail_stays_put() {
        let mut entries = pool(&["a", "b"]);
        assert!(reinsert_after_miss(&mut entries, 1, 2, 2).is_empty());
        assert_eq!(ids(&entries), vec!["a", "b"]);
    }

    #[test]
    fn shuffle_leaves_mastered_in_place() {
        let mut entries = pool(&["a", "b", "c", "d", "e", "f"]);
        entries[2].record.correctness = 5;
        let mut rng = StdRng::seed_from_u64(7);

        shuffle_active(&mut entries, 2, &mut rng);

        assert_eq!(entries[2].term.id, "c");
        assert_eq!(entries[2].record.studiable_rank, Some(3));
        assert_sorted_unique(&entries);
        let mut sorted = ids(&entries);
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d", "e", "f"]);
    }

    #[test]
    fn shuffle_with_single_active_is_noop() {
        let mut entries = pool(&["a", "b"]);
        entries[0].record.correctness = 2;
        let mut rng = StdRng::seed_from_u64(1);
        assert!(shuffle_active(&mut entries, 2, &mut rng).is_empty());
    }

    #[test]
    fn subset_pack_reuses_its_own_ranks() {
        let mut entries = pool(&["a", "b", "c"]);
        entries[0].record.studiable_rank = Some(7);
        entries[1].record.studiable_rank = Some(3);
        entries[2].record.studiable_rank = Some(12);

        let changed = pack_subset_ranks(&mut entries);

        assert_eq!(changed, vec![0, 1]);
        let ranks: Vec<Option<i64>> = entries.iter().map(|e| e.record.studiable_rank).collect();
        assert_eq!(ranks, vec![Some(3), Some(7), Some(12)]);
        assert_eq!(ids(&entries), vec!["a", "b", "c"]);
    }

    #[test]
    fn unranked_entries_land_above_ceiling() {
        let mut entries = pool(&["a", "b", "c"]);
        entries[0].record.studiable_rank = None;
        entries[2].record.studiable_rank = None;

        rank_unranked_above(&mut entries, 40);

        assert_eq!(entries[0].record.studiable_rank, Some(41));
        assert_eq!(entries[1].record.studiable_rank, Some(2));
        assert_eq!(entries[2].record.studiable_rank, Some(42));
    }
}
