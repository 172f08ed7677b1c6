//! Protocol rule sets
//!
//! Grading rules change at fixed heights. A [`ProtocolSchedule`] maps each
//! height to the [`RuleSet`] active there; every consensus-relevant constant
//! (asset list, cut sizes, deviation function, rewards) is read from it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Assets quoted by version 1 records.
pub const V1_ASSETS: &[&str] = &[
    "PEG", "USD", "EUR", "JPY", "GBP", "CAD", "CHF", "XAU", "XAG", "XBT", "ETH", "FCT",
];

/// Assets quoted by version 2 records.
pub const V2_ASSETS: &[&str] = &[
    "PEG", "USD", "EUR", "JPY", "GBP", "CAD", "CHF", "INR", "SGD", "CNY", "HKD", "KRW", "BRL",
    "XAU", "XAG", "XPD", "XPT", "XBT", "ETH", "LTC", "XBC", "FCT",
];

/// One whole token in reward base units.
const TOKEN: u64 = 100_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    MainNet,
    TestNet,
    DevNet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::MainNet => "mainnet",
            Network::TestNet => "testnet",
            Network::DevNet => "devnet",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::MainNet),
            "testnet" => Ok(Network::TestNet),
            "devnet" => Ok(Network::DevNet),
            other => Err(format!("Unknown network: {}", other)),
        }
    }
}

/// Distance measure used by the outlier-pruning cut.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DeviationRule {
    /// Sum over assets of `((price - mean) / mean)^4`.
    RelativeQuartic,
    /// Like `RelativeQuartic`, but relative distances within `band` of the
    /// mean count as zero and only the excess is penalized.
    Banded { band: f64 },
}

impl DeviationRule {
    /// Deviation of one record's prices from the per-asset means.
    ///
    /// Assets whose mean is zero contribute nothing. The summation order is
    /// the asset order, so the result is reproducible across nodes.
    pub fn score(&self, prices: &[u64], means: &[f64]) -> f64 {
        prices
            .iter()
            .zip(means)
            .map(|(&price, &mean)| {
                if mean <= 0.0 {
                    return 0.0;
                }
                let distance = ((price as f64 - mean) / mean).abs();
                let distance = match self {
                    DeviationRule::RelativeQuartic => distance,
                    DeviationRule::Banded { band } => (distance - band).max(0.0),
                };
                distance.powi(4)
            })
            .sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardTier {
    First,
    Second,
    Standard,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewardSchedule {
    /// Distinct payouts for the first two ranks, `rest` for everyone else.
    Tiered { first: u64, second: u64, rest: u64 },
    /// Every winner is paid the same.
    Flat(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct RuleSet {
    pub version: u8,
    pub activation_height: u64,
    pub assets: &'static [&'static str],
    /// Records below this difficulty are not admitted
    pub min_difficulty: u64,
    /// Survivors kept after the difficulty sort
    pub k_max: usize,
    /// Winners kept after outlier pruning
    pub k_win: usize,
    pub deviation: DeviationRule,
    pub rewards: RewardSchedule,
}

impl RuleSet {
    pub fn v1(activation_height: u64) -> Self {
        Self {
            version: 1,
            activation_height,
            assets: V1_ASSETS,
            min_difficulty: 0,
            k_max: 50,
            k_win: 10,
            deviation: DeviationRule::RelativeQuartic,
            rewards: RewardSchedule::Tiered {
                first: 800 * TOKEN,
                second: 600 * TOKEN,
                rest: 450 * TOKEN,
            },
        }
    }

    pub fn v2(activation_height: u64) -> Self {
        Self {
            version: 2,
            activation_height,
            assets: V2_ASSETS,
            min_difficulty: 1 << 40,
            k_max: 50,
            k_win: 25,
            deviation: DeviationRule::Banded { band: 0.01 },
            rewards: RewardSchedule::Flat(200 * TOKEN),
        }
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Tier for a 1-based rank.
    pub fn tier_for_rank(&self, rank: u32) -> RewardTier {
        match (self.rewards, rank) {
            (RewardSchedule::Tiered { .. }, 1) => RewardTier::First,
            (RewardSchedule::Tiered { .. }, 2) => RewardTier::Second,
            _ => RewardTier::Standard,
        }
    }

    pub fn reward_for_rank(&self, rank: u32) -> u64 {
        match (self.rewards, self.tier_for_rank(rank)) {
            (RewardSchedule::Tiered { first, .. }, RewardTier::First) => first,
            (RewardSchedule::Tiered { second, .. }, RewardTier::Second) => second,
            (RewardSchedule::Tiered { rest, .. }, RewardTier::Standard) => rest,
            (RewardSchedule::Flat(amount), _) => amount,
        }
    }
}

/// Rule sets ordered by activation height.
#[derive(Clone, Debug)]
pub struct ProtocolSchedule {
    rule_sets: Vec<RuleSet>,
}

impl ProtocolSchedule {
    pub fn for_network(network: Network) -> Self {
        let v2_activation = match network {
            Network::MainNet => 210_330,
            Network::TestNet => 20_000,
            Network::DevNet => 1_000,
        };
        Self {
            rule_sets: vec![RuleSet::v1(0), RuleSet::v2(v2_activation)],
        }
    }

    /// Builds a schedule from explicit rule sets.
    ///
    /// The first set must activate at height 0, activations must strictly
    /// increase and every set needs `0 < k_win <= k_max`.
    pub fn new(rule_sets: Vec<RuleSet>) -> Result<Self, String> {
        match rule_sets.first() {
            None => return Err("schedule has no rule sets".to_string()),
            Some(first) if first.activation_height != 0 => {
                return Err("first rule set must activate at height 0".to_string())
            }
            Some(_) => {}
        }
        for pair in rule_sets.windows(2) {
            if pair[1].activation_height <= pair[0].activation_height {
                return Err(format!(
                    "rule set v{} does not activate after v{}",
                    pair[1].version, pair[0].version
                ));
            }
        }
        if let Some(bad) = rule_sets.iter().find(|r| r.k_win == 0 || r.k_win > r.k_max) {
            return Err(format!("rule set v{} has invalid cut sizes", bad.version));
        }
        Ok(Self { rule_sets })
    }

    pub fn rules_at(&self, height: u64) -> &RuleSet {
        self.rule_sets
            .iter()
            .rev()
            .find(|r| r.activation_height <= height)
            .unwrap_or(&self.rule_sets[0])
    }

    pub fn min_difficulty(&self, height: u64) -> u64 {
        self.rules_at(height).min_difficulty
    }

    /// All rule sets, in activation order.
    pub fn rule_sets(&self) -> &[RuleSet] {
        &self.rule_sets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_switch_at_activation() {
        let schedule = ProtocolSchedule::for_network(Network::MainNet);
        assert_eq!(schedule.rules_at(0).version, 1);
        assert_eq!(schedule.rules_at(210_329).version, 1);
        assert_eq!(schedule.rules_at(210_330).version, 2);
    }

    #[test]
    fn schedule_rejects_unordered_sets() {
        assert!(ProtocolSchedule::new(vec![RuleSet::v1(0), RuleSet::v2(0)]).is_err());
        assert!(ProtocolSchedule::new(vec![RuleSet::v2(5)]).is_err());
        assert!(ProtocolSchedule::new(vec![]).is_err());
    }

    #[test]
    fn schedule_rejects_bad_cut_sizes() {
        let mut rules = RuleSet::v1(0);
        rules.k_win = 60;
        assert!(ProtocolSchedule::new(vec![rules]).is_err());
    }

    #[test]
    fn tiered_rewards_by_rank() {
        let rules = RuleSet::v1(0);
        assert_eq!(rules.tier_for_rank(1), RewardTier::First);
        assert_eq!(rules.tier_for_rank(2), RewardTier::Second);
        assert_eq!(rules.tier_for_rank(7), RewardTier::Standard);
        assert_eq!(rules.reward_for_rank(1), 800 * TOKEN);
        assert_eq!(rules.reward_for_rank(10), 450 * TOKEN);
    }

    #[test]
    fn flat_rewards_ignore_rank() {
        let rules = RuleSet::v2(0);
        assert_eq!(rules.tier_for_rank(1), RewardTier::Standard);
        assert_eq!(rules.reward_for_rank(1), rules.reward_for_rank(25));
    }

    #[test]
    fn quartic_score_grows_with_distance() {
        let means = [100.0, 200.0];
        let near = DeviationRule::RelativeQuartic.score(&[101, 200], &means);
        let far = DeviationRule::RelativeQuartic.score(&[150, 200], &means);
        assert!(far > near);
        assert_eq!(DeviationRule::RelativeQuartic.score(&[100, 200], &means), 0.0);
    }

    #[test]
    fn banded_score_ignores_small_moves() {
        let rule = DeviationRule::Banded { band: 0.01 };
        let means = [1000.0];
        assert_eq!(rule.score(&[1005], &means), 0.0);
        assert!(rule.score(&[1100], &means) > 0.0);
    }

    #[test]
    fn zero_mean_contributes_nothing() {
        let score = DeviationRule::RelativeQuartic.score(&[5], &[0.0]);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn network_parses_case_insensitively() {
        assert_eq!("TestNet".parse::<Network>().unwrap(), Network::TestNet);
        assert!("moonnet".parse::<Network>().is_err());
    }
}
