use database::{GradeStore, PutOutcome, RocksGradeStore};
use opr_core::testing::{flat_prices, record};
use opr_core::{GradingResult, RuleSet, Winner};
use tempfile::TempDir;

fn result(height: u64) -> GradingResult {
    let rules = RuleSet::v1(0);
    let winners = (0..3u32)
        .map(|i| {
            let rank = i + 1;
            let miner = format!("miner-{}", i);
            Winner {
                rank,
                tier: rules.tier_for_rank(rank),
                reward: rules.reward_for_rank(rank),
                difficulty: 100 - i as u64,
                record: record(&rules, height, &miner, flat_prices(&rules, 2), 100 - i as u64),
            }
        })
        .collect();
    GradingResult {
        height,
        version: 1,
        winners,
    }
}

#[test]
fn results_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path();

    {
        let store = RocksGradeStore::open(path, 8).expect("open store");
        assert_eq!(store.put(10, &result(10)).unwrap(), PutOutcome::Stored);
        assert_eq!(store.put(11, &result(11)).unwrap(), PutOutcome::Stored);
    }

    let store = RocksGradeStore::open(path, 8).expect("reopen store");
    assert_eq!(store.get(10).unwrap(), Some(result(10)));
    let (height, latest) = store.latest().unwrap().expect("latest after reopen");
    assert_eq!(height, 11);
    assert_eq!(latest, result(11));

    // the order check must also hold across restarts
    assert!(store.put(9, &result(9)).is_err());
    assert_eq!(store.put(11, &result(11)).unwrap(), PutOutcome::Unchanged);
}

#[test]
fn no_winners_result_round_trips() {
    let tmp = TempDir::new().unwrap();
    let store = RocksGradeStore::open(tmp.path(), 8).unwrap();
    let empty = GradingResult::no_winners(42, 1);
    store.put(42, &empty).unwrap();
    assert_eq!(store.get(42).unwrap(), Some(empty));
}
