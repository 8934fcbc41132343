//! Active-balance change detection between consecutive heights.

use crate::model::{SystemEvent, SystemEventKind};
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use serde_json::json;
use std::collections::BTreeMap;

/// Percentage change `(1 - curr/prev) * 100` (or `curr` when `prev` is zero), rounded half
/// away from zero to one decimal, plus the tier derived from its exact magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceChange {
    pub change: f64,
    pub tier: Option<SystemEventKind>,
}

pub fn balance_change(prev: &BigInt, curr: &BigInt) -> BalanceChange {
    if prev.is_zero() {
        let tenths = curr.abs() * 10u32;
        return BalanceChange {
            change: curr.to_f64().unwrap_or(f64::MAX),
            tier: tier_for_tenths(&tenths),
        };
    }

    // Scaled by ten so integer division yields tenths of a percent.
    let numerator = (prev - curr) * 1000u32;
    let denominator = prev.abs();
    let tenths = numerator.abs() / &denominator;

    let rounded = (numerator.abs() * 2u32 + &denominator) / (&denominator * 2u32);
    let negative = numerator.is_negative() != prev.is_negative() && !numerator.is_zero();
    let magnitude = rounded.to_f64().unwrap_or(f64::MAX) / 10.0;

    BalanceChange {
        change: if negative { -magnitude } else { magnitude },
        tier: tier_for_tenths(&tenths),
    }
}

fn tier_for_tenths(tenths: &BigInt) -> Option<SystemEventKind> {
    if *tenths >= BigInt::from(100) {
        Some(SystemEventKind::ActiveBalanceChange3)
    } else if *tenths >= BigInt::from(10) {
        Some(SystemEventKind::ActiveBalanceChange2)
    } else if *tenths >= BigInt::from(1) {
        Some(SystemEventKind::ActiveBalanceChange1)
    } else {
        None
    }
}

/// Events for `height` given active balances by stash at the previous and current height.
///
/// Without a previous snapshot nothing is emitted, since membership changes cannot be told
/// apart from a first run.
pub fn analyze(
    height: u64,
    time: DateTime<Utc>,
    previous: &BTreeMap<String, BigInt>,
    current: &BTreeMap<String, BigInt>,
) -> Vec<SystemEvent> {
    if previous.is_empty() {
        return Vec::new();
    }
    let mut events = Vec::new();

    for (stash, after) in current {
        match previous.get(stash) {
            Some(before) => {
                let change = balance_change(before, after);
                if let Some(kind) = change.tier {
                    events.push(SystemEvent {
                        height,
                        time,
                        actor: stash.clone(),
                        kind,
                        data: json!({
                            "before": before.to_string(),
                            "after": after.to_string(),
                            "change": change.change,
                        }),
                    });
                }
            }
            None => events.push(SystemEvent {
                height,
                time,
                actor: stash.clone(),
                kind: SystemEventKind::JoinedSet,
                data: json!({ "active_balance": after.to_string() }),
            }),
        }
    }

    for (stash, before) in previous {
        if !current.contains_key(stash) {
            events.push(SystemEvent {
                height,
                time,
                actor: stash.clone(),
                kind: SystemEventKind::LeftSet,
                data: json!({ "active_balance": before.to_string() }),
            });
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(n: i64) -> BigInt {
        BigInt::from(n)
    }

    fn balances(entries: &[(&str, i64)]) -> BTreeMap<String, BigInt> {
        entries.iter().map(|(k, v)| (k.to_string(), big(*v))).collect()
    }

    #[test]
    fn below_a_tenth_of_a_percent_is_ignored() {
        let c = balance_change(&big(10_000), &big(9_991));
        assert_eq!(c.tier, None);
        assert_eq!(c.change, 0.1);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(balance_change(&big(10_000), &big(9_990)).tier, Some(SystemEventKind::ActiveBalanceChange1));
        assert_eq!(balance_change(&big(10_000), &big(9_900)).tier, Some(SystemEventKind::ActiveBalanceChange2));
        assert_eq!(balance_change(&big(10_000), &big(9_000)).tier, Some(SystemEventKind::ActiveBalanceChange3));
        assert_eq!(balance_change(&big(10_000), &big(9_001)).tier, Some(SystemEventKind::ActiveBalanceChange2));
    }

    #[test]
    fn growth_is_negative_change() {
        let c = balance_change(&big(10_000), &big(10_010));
        assert_eq!(c.change, -0.1);
        assert_eq!(c.tier, Some(SystemEventKind::ActiveBalanceChange1));
        assert_eq!(balance_change(&big(10_000), &big(10_000)).change, 0.0);
    }

    #[test]
    fn zero_previous_uses_current() {
        let c = balance_change(&big(0), &big(5));
        assert_eq!(c.change, 5.0);
        assert_eq!(c.tier, Some(SystemEventKind::ActiveBalanceChange3));
        assert_eq!(balance_change(&big(0), &big(0)).tier, None);
    }

    #[test]
    fn analyze_emits_changes_and_membership() {
        let time = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let prev = balances(&[("alice", 10_000), ("bob", 10_000), ("carol", 500)]);
        let curr = balances(&[("alice", 9_000), ("bob", 9_991), ("dave", 42)]);
        let events = analyze(7, time, &prev, &curr);

        let kinds: Vec<_> = events.iter().map(|e| (e.actor.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("alice", SystemEventKind::ActiveBalanceChange3),
                ("dave", SystemEventKind::JoinedSet),
                ("carol", SystemEventKind::LeftSet),
            ]
        );
        assert_eq!(events[0].data["before"], "10000");
        assert_eq!(events[0].data["after"], "9000");
        assert_eq!(events[0].data["change"], 10.0);
    }

    #[test]
    fn no_previous_snapshot_no_events() {
        let time = DateTime::from_timestamp(0, 0).unwrap();
        assert!(analyze(1, time, &BTreeMap::new(), &balances(&[("alice", 1)])).is_empty());
    }
}
