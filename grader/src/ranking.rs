//! Ordering, de-duplication and the two grading cuts
//!
//! All functions here are pure. Ranking order is difficulty descending, then
//! digest ascending, then nonce ascending, which is a total order over
//! distinct records.

use opr_core::{DeviationRule, OraclePriceRecord};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A record that passed the format filter, with its difficulty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scored {
    pub record: OraclePriceRecord,
    pub difficulty: u64,
}

/// `Less` means `a` ranks ahead of `b`.
pub fn rank_order(a: &Scored, b: &Scored) -> Ordering {
    b.difficulty
        .cmp(&a.difficulty)
        .then_with(|| a.record.digest.cmp(&b.record.digest))
        .then_with(|| a.record.nonce.cmp(&b.record.nonce))
}

/// Keeps only the best-ranked record per miner. Returns the survivors in
/// rank order and how many were superseded.
pub fn dedup_by_miner(scored: Vec<Scored>) -> (Vec<Scored>, usize) {
    let total = scored.len();
    let mut best: BTreeMap<String, Scored> = BTreeMap::new();
    for candidate in scored {
        match best.get(candidate.record.miner_id()) {
            Some(current) if rank_order(current, &candidate) != Ordering::Greater => {}
            _ => {
                best.insert(candidate.record.miner_id().to_string(), candidate);
            }
        }
    }
    let mut survivors: Vec<Scored> = best.into_values().collect();
    survivors.sort_by(rank_order);
    let superseded = total - survivors.len();
    (survivors, superseded)
}

/// Truncates a rank-ordered list to `k_max`. Returns how many were cut.
pub fn top_k(ranked: &mut Vec<Scored>, k_max: usize) -> usize {
    let cut = ranked.len().saturating_sub(k_max);
    ranked.truncate(k_max);
    cut
}

/// Per-asset mean of the surviving prices, summed in rank order.
pub fn asset_means(ranked: &[Scored]) -> Vec<f64> {
    let Some(first) = ranked.first() else {
        return Vec::new();
    };
    let mut sums = vec![0.0f64; first.record.body.prices.len()];
    for s in ranked {
        for (sum, &price) in sums.iter_mut().zip(&s.record.body.prices) {
            *sum += price as f64;
        }
    }
    let n = ranked.len() as f64;
    sums.into_iter().map(|sum| sum / n).collect()
}

/// Removes the most deviant record, one per round, until `k_win` remain.
///
/// Means are recomputed after every removal. On equal scores the record
/// ranked lower goes first. Returns how many were pruned.
pub fn prune_outliers(ranked: &mut Vec<Scored>, k_win: usize, rule: &DeviationRule) -> usize {
    let mut pruned = 0;
    while ranked.len() > k_win {
        let means = asset_means(ranked);
        let mut worst = 0;
        let mut worst_score = f64::NEG_INFINITY;
        for (idx, s) in ranked.iter().enumerate() {
            let score = rule.score(&s.record.body.prices, &means);
            if score >= worst_score {
                worst = idx;
                worst_score = score;
            }
        }
        ranked.remove(worst);
        pruned += 1;
    }
    pruned
}
