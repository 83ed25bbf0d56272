// 🚨 Anomaly Rules - Rules as independent detectors
// Each rule scans the full clean set; the engine concatenates their hits

use crate::config::DetectionConfig;
use crate::model::{AnomalyReason, AnomalyRecord, CleanTransaction};
use std::collections::BTreeMap;
use tracing::debug;

// ============================================================================
// RULE TRAIT
// ============================================================================

/// AnomalyRule - a pure detector: clean transactions in, anomaly records out.
///
/// Rules never see each other's output, so a transaction may be reported by
/// several rules.
pub trait AnomalyRule: Send + Sync {
    /// Reason attached to every record this rule emits
    fn reason(&self) -> AnomalyReason;

    fn detect(&self, transactions: &[CleanTransaction]) -> Vec<AnomalyRecord>;

    /// Rule name for logs
    fn name(&self) -> &str {
        self.reason().as_str()
    }
}

// ============================================================================
// HIGH_VALUE
// ============================================================================

/// Flags transactions already marked `is_high_value` by the cleaner
pub struct HighValueRule;

impl AnomalyRule for HighValueRule {
    fn reason(&self) -> AnomalyReason {
        AnomalyReason::HighValue
    }

    fn detect(&self, transactions: &[CleanTransaction]) -> Vec<AnomalyRecord> {
        transactions
            .iter()
            .filter(|tx| tx.is_high_value)
            .map(|tx| AnomalyRecord::flag(tx, self.reason()))
            .collect()
    }
}

// ============================================================================
// RAPID_REPEAT
// ============================================================================

/// Flags bursts of activity on one account.
///
/// Per account, in time order, transaction `i` is flagged when
/// `ts[i] - ts[i - (min_count - 1)] <= window_secs`. Only the trailing
/// transaction of a qualifying window is reported; the first
/// `min_count - 1` transactions of an account can never be flagged.
pub struct RapidRepeatRule {
    pub window_secs: i64,
    pub min_count: usize,
}

impl RapidRepeatRule {
    pub fn new(window_secs: i64, min_count: usize) -> Self {
        RapidRepeatRule {
            window_secs,
            min_count,
        }
    }

    /// How many positions back the window start sits
    fn look_back(&self) -> usize {
        self.min_count.saturating_sub(1).max(1)
    }
}

impl Default for RapidRepeatRule {
    fn default() -> Self {
        let config = DetectionConfig::default();
        RapidRepeatRule::new(config.rapid_repeat_window_secs, config.rapid_repeat_min_count)
    }
}

impl AnomalyRule for RapidRepeatRule {
    fn reason(&self) -> AnomalyReason {
        AnomalyReason::RapidRepeat
    }

    fn detect(&self, transactions: &[CleanTransaction]) -> Vec<AnomalyRecord> {
        let look_back = self.look_back();

        // BTreeMap keeps account order deterministic across runs
        let mut by_account: BTreeMap<&str, Vec<&CleanTransaction>> = BTreeMap::new();
        for tx in transactions {
            by_account.entry(tx.account_id.as_str()).or_default().push(tx);
        }

        let mut anomalies = Vec::new();

        for (_, mut group) in by_account {
            // Stable: equal timestamps keep input order
            group.sort_by_key(|tx| tx.timestamp);

            let seconds: Vec<i64> = group.iter().map(|tx| tx.epoch_seconds()).collect();

            for i in look_back..group.len() {
                if seconds[i] - seconds[i - look_back] <= self.window_secs {
                    anomalies.push(AnomalyRecord::flag(group[i], self.reason()));
                }
            }
        }

        anomalies
    }
}

// ============================================================================
// NON_POSITIVE_AMOUNT
// ============================================================================

/// Flags zero and negative amounts
pub struct NonPositiveAmountRule;

impl AnomalyRule for NonPositiveAmountRule {
    fn reason(&self) -> AnomalyReason {
        AnomalyReason::NonPositiveAmount
    }

    fn detect(&self, transactions: &[CleanTransaction]) -> Vec<AnomalyRecord> {
        transactions
            .iter()
            .filter(|tx| tx.amount <= 0.0)
            .map(|tx| AnomalyRecord::flag(tx, self.reason()))
            .collect()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct AnomalyEngine {
    rules: Vec<Box<dyn AnomalyRule>>,
}

impl AnomalyEngine {
    /// Engine with no rules
    pub fn new() -> Self {
        AnomalyEngine { rules: Vec::new() }
    }

    /// The three standard rules in evaluation order:
    /// HIGH_VALUE, RAPID_REPEAT, NON_POSITIVE_AMOUNT
    pub fn standard(config: &DetectionConfig) -> Self {
        let mut engine = AnomalyEngine::new();
        engine.add_rule(Box::new(HighValueRule));
        engine.add_rule(Box::new(RapidRepeatRule::new(
            config.rapid_repeat_window_secs,
            config.rapid_repeat_min_count,
        )));
        engine.add_rule(Box::new(NonPositiveAmountRule));
        engine
    }

    /// Rules run in insertion order
    pub fn add_rule(&mut self, rule: Box<dyn AnomalyRule>) {
        self.rules.push(rule);
    }

    /// Run every rule over the same input and concatenate the results
    pub fn detect(&self, transactions: &[CleanTransaction]) -> Vec<AnomalyRecord> {
        let mut anomalies = Vec::new();

        for rule in &self.rules {
            let hits = rule.detect(transactions);
            debug!(rule = rule.name(), hits = hits.len(), "anomaly rule evaluated");
            anomalies.extend(hits);
        }

        anomalies
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for AnomalyEngine {
    fn default() -> Self {
        Self::standard(&DetectionConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn tx(txn_id: &str, account_id: &str, amount: f64, offset_secs: i64) -> CleanTransaction {
        let timestamp = base_time() + Duration::seconds(offset_secs);
        CleanTransaction {
            txn_id: txn_id.to_string(),
            account_id: account_id.to_string(),
            merchant: "Swiggy".to_string(),
            merchant_category: Some("Food".to_string()),
            amount,
            currency: Some("INR".to_string()),
            timestamp,
            hour_of_day: 0,
            is_high_value: amount > 50_000.0,
        }
    }

    fn ids(records: &[AnomalyRecord]) -> Vec<&str> {
        records.iter().map(|r| r.txn_id.as_str()).collect()
    }

    #[test]
    fn test_high_value_rule() {
        let txs = vec![
            tx("t1", "a1", 50_000.0, 0),
            tx("t2", "a1", 50_000.5, 1000),
            tx("t3", "a2", 150_000.0, 2000),
        ];

        let hits = HighValueRule.detect(&txs);
        assert_eq!(ids(&hits), vec!["t2", "t3"]);
        assert!(hits.iter().all(|r| r.reason == AnomalyReason::HighValue));
    }

    #[test]
    fn test_non_positive_rule() {
        let txs = vec![
            tx("t1", "a1", 0.0, 0),
            tx("t2", "a1", -5.0, 1000),
            tx("t3", "a1", 0.01, 2000),
        ];

        let hits = NonPositiveAmountRule.detect(&txs);
        assert_eq!(ids(&hits), vec!["t1", "t2"]);
    }

    #[test]
    fn test_rapid_repeat_flags_third_in_window() {
        let txs = vec![
            tx("t1", "a1", 10.0, 0),
            tx("t2", "a1", 10.0, 10),
            tx("t3", "a1", 10.0, 20),
        ];

        let hits = RapidRepeatRule::default().detect(&txs);
        assert_eq!(ids(&hits), vec!["t3"]);
        assert_eq!(hits[0].timestamp, base_time() + Duration::seconds(20));
    }

    #[test]
    fn test_rapid_repeat_window_is_inclusive() {
        let txs = vec![
            tx("t1", "a1", 10.0, 0),
            tx("t2", "a1", 10.0, 30),
            tx("t3", "a1", 10.0, 60),
            tx("t4", "a1", 10.0, 121),
        ];

        let hits = RapidRepeatRule::default().detect(&txs);
        // t3: 60 - 0 = 60 (flagged); t4: 121 - 30 = 91 (not)
        assert_eq!(ids(&hits), vec!["t3"]);
    }

    #[test]
    fn test_rapid_repeat_spaced_out_account() {
        let txs: Vec<_> = (0..5)
            .map(|i| tx(&format!("t{}", i), "a1", 10.0, i * 100))
            .collect();

        assert!(RapidRepeatRule::default().detect(&txs).is_empty());
    }

    #[test]
    fn test_rapid_repeat_first_two_never_flagged() {
        // Two transactions at the same instant: still nothing two positions back
        let txs = vec![tx("t1", "a1", 10.0, 0), tx("t2", "a1", 10.0, 0)];
        assert!(RapidRepeatRule::default().detect(&txs).is_empty());
    }

    #[test]
    fn test_rapid_repeat_ties_keep_input_order() {
        // x, y, z, w share one second (w is 900ms in); a later row sits between them
        let mut w = tx("w", "a1", 10.0, 5);
        w.timestamp = w.timestamp + Duration::milliseconds(900);
        let txs = vec![
            tx("x", "a1", 10.0, 5),
            tx("y", "a1", 10.0, 5),
            tx("late", "a1", 10.0, 100),
            tx("z", "a1", 10.0, 5),
            w,
        ];

        let hits = RapidRepeatRule::default().detect(&txs);
        assert_eq!(ids(&hits), vec!["z", "w"]);

        // Same result on every run
        assert_eq!(ids(&RapidRepeatRule::default().detect(&txs)), vec!["z", "w"]);
    }

    #[test]
    fn test_rapid_repeat_sorts_by_time_within_account() {
        // Input out of order; in time order t3 (0s), t1 (5s), t2 (50s)
        let txs = vec![
            tx("t1", "a1", 10.0, 5),
            tx("t2", "a1", 10.0, 50),
            tx("t3", "a1", 10.0, 0),
        ];

        let hits = RapidRepeatRule::default().detect(&txs);
        assert_eq!(ids(&hits), vec!["t2"]);
    }

    #[test]
    fn test_rapid_repeat_accounts_are_independent() {
        // Interleaved accounts: 4 transactions within 30s overall, but only 2 per account
        let txs = vec![
            tx("a-1", "a1", 10.0, 0),
            tx("b-1", "b1", 10.0, 10),
            tx("a-2", "a1", 10.0, 20),
            tx("b-2", "b1", 10.0, 30),
        ];

        assert!(RapidRepeatRule::default().detect(&txs).is_empty());
    }

    #[test]
    fn test_rapid_repeat_long_burst_flags_every_trailing_position() {
        let txs: Vec<_> = (0..5)
            .map(|i| tx(&format!("t{}", i), "a1", 10.0, i * 5))
            .collect();

        let hits = RapidRepeatRule::default().detect(&txs);
        assert_eq!(ids(&hits), vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_rapid_repeat_output_ordered_by_account() {
        let txs = vec![
            tx("z3", "zz", 10.0, 2),
            tx("z1", "zz", 10.0, 0),
            tx("z2", "zz", 10.0, 1),
            tx("a3", "aa", 10.0, 2),
            tx("a1", "aa", 10.0, 0),
            tx("a2", "aa", 10.0, 1),
        ];

        let hits = RapidRepeatRule::default().detect(&txs);
        assert_eq!(ids(&hits), vec!["a3", "z3"]);
    }

    #[test]
    fn test_rapid_repeat_custom_min_count() {
        let txs = vec![tx("t1", "a1", 10.0, 0), tx("t2", "a1", 10.0, 30)];

        let hits = RapidRepeatRule::new(60, 2).detect(&txs);
        assert_eq!(ids(&hits), vec!["t2"]);
    }

    #[test]
    fn test_engine_concatenates_in_rule_order() {
        let txs = vec![
            tx("t1", "a1", 10.0, 0),
            tx("t2", "a1", 60_000.0, 10),
            tx("t3", "a1", -5.0, 20),
        ];

        let engine = AnomalyEngine::default();
        assert_eq!(engine.rule_count(), 3);

        let hits = engine.detect(&txs);
        let pairs: Vec<(&str, AnomalyReason)> =
            hits.iter().map(|r| (r.txn_id.as_str(), r.reason)).collect();

        assert_eq!(
            pairs,
            vec![
                ("t2", AnomalyReason::HighValue),
                ("t3", AnomalyReason::RapidRepeat),
                ("t3", AnomalyReason::NonPositiveAmount),
            ]
        );
    }

    #[test]
    fn test_engine_empty_input() {
        assert!(AnomalyEngine::default().detect(&[]).is_empty());
    }

    #[test]
    fn test_empty_engine_reports_nothing() {
        let txs = vec![tx("t1", "a1", -1.0, 0)];
        assert!(AnomalyEngine::new().detect(&txs).is_empty());
    }
}
