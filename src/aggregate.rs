//! Membership-weighted state averages.
//!
//! Each metric is weighted independently: a record only counts towards a
//! metric when both its membership and that metric's value are present, so a
//! plan that never reported membership moves neither numerator nor
//! denominator.

use crate::process::PlanRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// (fiscal year, state)
pub type StateYear = (i32, String);

/// Running `Σ w·x` and `Σ w` for one metric in one group.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct WeightedMean {
    pub sum_weighted: f64,
    pub sum_membership: f64,
}

impl WeightedMean {
    pub fn add(&mut self, membership: Option<f64>, value: Option<f64>) {
        if let (Some(w), Some(x)) = (membership, value) {
            self.sum_weighted += w * x;
            self.sum_membership += w;
        }
    }

    /// `None` when nothing with positive membership contributed.
    pub fn mean(&self) -> Option<f64> {
        (self.sum_membership > 0.0).then(|| self.sum_weighted / self.sum_membership)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateYearAggregate {
    pub weighted_funded_ratio: Option<f64>,
    pub weighted_assumed_return: Option<f64>,
}

/// Group records by (fiscal year, state) and weight each metric by membership.
///
/// Every key present in the input gets an entry, even when both metrics end
/// up undefined.
#[tracing::instrument(level = "debug", skip(records), fields(records = records.len()))]
pub fn aggregate_states(records: &[PlanRecord]) -> BTreeMap<StateYear, StateYearAggregate> {
    let mut groups: BTreeMap<StateYear, (WeightedMean, WeightedMean)> = BTreeMap::new();
    for r in records {
        let (funded, assumed) = groups
            .entry((r.fiscal_year, r.state.clone()))
            .or_default();
        funded.add(r.membership, r.funded_ratio);
        assumed.add(r.membership, r.assumed_return);
    }

    groups
        .into_iter()
        .map(|(key, (funded, assumed))| {
            (
                key,
                StateYearAggregate {
                    weighted_funded_ratio: funded.mean(),
                    weighted_assumed_return: assumed.mean(),
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(
        fy: i32,
        state: &str,
        plan: &str,
        m: Option<f64>,
        fr: Option<f64>,
        ar: Option<f64>,
    ) -> PlanRecord {
        PlanRecord {
            fiscal_year: fy,
            state: state.into(),
            plan_name: plan.into(),
            membership: m,
            funded_ratio: fr,
            assumed_return: ar,
        }
    }

    fn key(fy: i32, s: &str) -> StateYear {
        (fy, s.to_string())
    }

    #[test]
    fn colorado_2020_weighted_ratio() {
        let records = vec![
            rec(2020, "CO", "A", Some(100.0), Some(0.80), None),
            rec(2020, "CO", "B", Some(300.0), Some(0.60), None),
        ];
        let agg = aggregate_states(&records);
        let co = agg[&key(2020, "CO")];
        assert!((co.weighted_funded_ratio.unwrap() - 0.65).abs() < 1e-12);
        assert_eq!(co.weighted_assumed_return, None);
    }

    #[test]
    fn lone_record_without_membership_is_undefined() {
        let records = vec![rec(2020, "WY", "A", None, Some(0.90), Some(0.07))];
        let agg = aggregate_states(&records);
        let wy = agg[&key(2020, "WY")];
        assert_eq!(wy.weighted_funded_ratio, None);
        assert_eq!(wy.weighted_assumed_return, None);
    }

    #[test]
    fn missing_membership_does_not_touch_sums() {
        let mut with = WeightedMean::default();
        with.add(Some(100.0), Some(0.8));
        let before = with;
        with.add(None, Some(0.2));
        assert_eq!(with, before);

        // and a record missing the metric keeps its membership out of the denominator
        with.add(Some(900.0), None);
        assert_eq!(with, before);
    }

    #[test]
    fn zero_membership_group_is_undefined() {
        let records = vec![rec(2019, "NV", "A", Some(0.0), Some(0.7), Some(0.075))];
        let agg = aggregate_states(&records);
        assert_eq!(agg[&key(2019, "NV")].weighted_funded_ratio, None);
    }

    #[test]
    fn metrics_skip_independently() {
        let records = vec![
            rec(2018, "TX", "A", Some(100.0), Some(0.5), None),
            rec(2018, "TX", "B", Some(100.0), None, Some(0.08)),
        ];
        let tx = aggregate_states(&records)[&key(2018, "TX")];
        assert!((tx.weighted_funded_ratio.unwrap() - 0.5).abs() < 1e-12);
        assert!((tx.weighted_assumed_return.unwrap() - 0.08).abs() < 1e-12);
    }

    #[test]
    fn weighted_mean_stays_within_contributing_range() {
        let values = [
            (1200.0, 0.41),
            (5.0, 1.12),
            (830.0, 0.77),
            (77_000.0, 0.63),
            (12.5, 0.99),
        ];
        for n in 1..=values.len() {
            let records: Vec<_> = values[..n]
                .iter()
                .enumerate()
                .map(|(i, (m, fr))| rec(2015, "IL", &format!("P{i}"), Some(*m), Some(*fr), None))
                .collect();
            let got = aggregate_states(&records)[&key(2015, "IL")]
                .weighted_funded_ratio
                .unwrap();
            let lo = values[..n].iter().map(|v| v.1).fold(f64::INFINITY, f64::min);
            let hi = values[..n].iter().map(|v| v.1).fold(f64::NEG_INFINITY, f64::max);
            assert!(got >= lo - 1e-12 && got <= hi + 1e-12, "{got} not in [{lo}, {hi}]");
        }
    }

    #[test]
    fn groups_are_keyed_by_year_and_state() {
        let records = vec![
            rec(2020, "CO", "A", Some(1.0), Some(0.7), None),
            rec(2021, "CO", "A", Some(1.0), Some(0.8), None),
            rec(2020, "UT", "B", Some(1.0), Some(0.9), None),
        ];
        let agg = aggregate_states(&records);
        let keys: Vec<_> = agg.keys().cloned().collect();
        assert_eq!(keys, vec![key(2020, "CO"), key(2020, "UT"), key(2021, "CO")]);
    }
}
