use std::collections::HashSet;
use std::sync::Arc;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

use learn_backend::learn::initializer::build_pool;
use learn_backend::learn::sync::NullSink;
use learn_backend::learn::{
    LearnError, LearnSession, ModeConfig, RoundTransition, SchedulerConfig, SessionContext, Term,
    TermRecord,
};

fn terms(n: usize) -> Vec<Term> {
    (0..n)
        .map(|i| Term {
            id: format!("t{i}"),
            word: format!("word-{i}"),
            definition: format!("def-{i}"),
            rank: i as i64,
        })
        .collect()
}

fn session(n: usize, records: Vec<TermRecord>, seed: u64, offset: usize) -> LearnSession {
    let mode = ModeConfig {
        shuffle: seed % 2 == 0,
        ..ModeConfig::default()
    };
    let config = SchedulerConfig {
        reinsert_offset: offset,
        ..SchedulerConfig::default()
    };
    let pool = build_pool(terms(n), records, &mode).unwrap();
    LearnSession::new_with_rng(
        SessionContext {
            user_id: "u".to_string(),
            set_id: "s".to_string(),
            start_round: 1,
        },
        pool,
        mode,
        &config,
        Arc::new(NullSink),
        &mut StdRng::seed_from_u64(seed),
    )
    .unwrap()
}

fn ranks_are_unique(s: &LearnSession) -> bool {
    let ranks: HashSet<i64> = s.entries().iter().map(|e| e.queue_rank()).collect();
    ranks.len() == s.entries().len()
}

fn ranks_follow_queue_order(s: &LearnSession) -> bool {
    s.entries()
        .windows(2)
        .all(|w| w[0].queue_rank() < w[1].queue_rank())
}

fn stored_record() -> impl Strategy<Value = (u32, u32, Option<i64>)> {
    (0_u32..4, 0_u32..3, proptest::option::of(-50_i64..50))
}

proptest! {
    #[test]
    fn pt_never_selects_mastered_or_repeats_within_round(
        n in 1_usize..12,
        answers in proptest::collection::vec(any::<bool>(), 1..120),
        seed in any::<u64>(),
        offset in 1_usize..4,
    ) {
        let mut s = session(n, vec![], seed, offset);
        let threshold = s.mastery_threshold();
        let mut presented_this_round: HashSet<String> = HashSet::new();

        for correct in answers {
            let picked = match s.select_next() {
                Ok(entry) => {
                    prop_assert!(entry.record.correctness < threshold);
                    entry.term.id.clone()
                }
                Err(LearnError::EmptyPool { .. }) => {
                    prop_assert!(s.is_round_complete());
                    match s.advance_round().unwrap() {
                        RoundTransition::SessionComplete { .. } => break,
                        RoundTransition::NextRound { .. } => {
                            presented_this_round.clear();
                            continue;
                        }
                    }
                }
                Err(e) => return Err(TestCaseError::fail(e.to_string())),
            };
            prop_assert!(presented_this_round.insert(picked.clone()));
            s.grade(&picked, correct).unwrap();
            prop_assert!(ranks_are_unique(&s));
            prop_assert!(ranks_follow_queue_order(&s));
        }
    }

    #[test]
    fn pt_incorrect_count_never_decreases(
        n in 1_usize..8,
        answers in proptest::collection::vec(any::<bool>(), 1..80),
        seed in any::<u64>(),
    ) {
        let mut s = session(n, vec![], seed, 2);
        let mut last_incorrect = std::collections::HashMap::new();

        for correct in answers {
            let id = match s.select_next() {
                Ok(entry) => entry.term.id.clone(),
                Err(_) => {
                    if matches!(s.advance_round().unwrap(), RoundTransition::SessionComplete { .. }) {
                        break;
                    }
                    continue;
                }
            };
            let outcome = s.grade(&id, correct).unwrap();
            let before = last_incorrect.insert(id.clone(), outcome.record.incorrect_count).unwrap_or(0);
            prop_assert!(outcome.record.incorrect_count >= before);
            if correct {
                prop_assert_eq!(outcome.record.incorrect_count, before);
            } else {
                prop_assert_eq!(outcome.record.correctness, 0);
            }
        }
    }

    #[test]
    fn pt_all_correct_answers_complete_the_session(n in 1_usize..10, seed in any::<u64>()) {
        let mut s = session(n, vec![], seed, 2);
        let mut steps = 0;
        loop {
            steps += 1;
            prop_assert!(steps < 1000);
            let id = match s.select_next() {
                Ok(entry) => entry.term.id.clone(),
                Err(_) => match s.advance_round().unwrap() {
                    RoundTransition::SessionComplete { .. } => break,
                    RoundTransition::NextRound { .. } => continue,
                },
            };
            s.grade(&id, true).unwrap();
        }
        prop_assert!(s.is_complete());
        prop_assert_eq!(s.stats().mastered, n);
        // default multiple-choice threshold is two correct answers per term
        prop_assert_eq!(s.stats().answered as usize, 2 * n);
    }

    #[test]
    fn pt_initial_ranks_are_dense_and_unique(
        stored in proptest::collection::vec(stored_record(), 1..15),
        seed in any::<u64>(),
    ) {
        let n = stored.len();
        let records: Vec<TermRecord> = stored
            .iter()
            .enumerate()
            .map(|(i, (correctness, incorrect, rank))| TermRecord {
                term_id: format!("t{i}"),
                correctness: *correctness,
                incorrect_count: *incorrect,
                appeared_in_round: Some(1),
                studiable_rank: *rank,
            })
            .collect();
        let s = session(n, records, seed, 2);

        let mut ranks: Vec<i64> = s.entries().iter().map(|e| e.queue_rank()).collect();
        ranks.sort_unstable();
        prop_assert_eq!(ranks, (1..=n as i64).collect::<Vec<_>>());
        prop_assert!(ranks_follow_queue_order(&s));
    }

    #[test]
    fn pt_reshuffle_keeps_counters(
        n in 2_usize..10,
        answers in proptest::collection::vec(any::<bool>(), 0..20),
        seed in any::<u64>(),
    ) {
        let mut s = session(n, vec![], seed, 2);
        for correct in answers {
            let Ok(entry) = s.select_next() else { break };
            let id = entry.term.id.clone();
            s.grade(&id, correct).unwrap();
        }

        let mut before: Vec<TermRecord> = s
            .entries()
            .iter()
            .map(|e| TermRecord { studiable_rank: None, ..e.record.clone() })
            .collect();
        let mastered_positions: Vec<(usize, String)> = s
            .entries()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.record.correctness >= s.mastery_threshold())
            .map(|(i, e)| (i, e.term.id.clone()))
            .collect();
        let stats = s.stats();

        s.reshuffle_with(&mut StdRng::seed_from_u64(seed ^ 0x5eed));

        let mut after: Vec<TermRecord> = s
            .entries()
            .iter()
            .map(|e| TermRecord { studiable_rank: None, ..e.record.clone() })
            .collect();
        before.sort_by(|a, b| a.term_id.cmp(&b.term_id));
        after.sort_by(|a, b| a.term_id.cmp(&b.term_id));
        prop_assert_eq!(before, after);
        prop_assert_eq!(stats, s.stats());
        for (pos, id) in mastered_positions {
            prop_assert_eq!(&s.entries()[pos].term.id, &id);
        }
        prop_assert!(ranks_are_unique(&s));
        prop_assert!(ranks_follow_queue_order(&s));
    }
}
