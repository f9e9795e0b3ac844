//! Gap detection over valid time.
//!
//! Transaction time is chronological, valid time is not: a value can be
//! retracted before we learn when its replacement became true. A *gap* is a
//! retraction for an entity/attribute pair followed, in valid time, by an
//! assertion for the same pair more than `threshold` later. It marks a span in
//! which the recorded knowledge had no value for the pair.
//!
//! Facts are batched by entity/attribute; each batch is sorted by valid time
//! and scanned on the rayon worker pool. The detector is a pure function of
//! its input and never touches storage.

use std::collections::HashMap;

use chrono::Duration;
use rayon::prelude::*;
use tracing::debug;

use crate::{Fact, Ident, Operation};

/// A retracted value and the later assertion that replaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gap {
    pub retracted: Ident,
    pub asserted: Ident,
    /// Valid time between the retraction and the assertion.
    pub duration: Duration,
}

/// Every gap found for one entity/attribute pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GapSet {
    pub entity: Ident,
    pub attribute: Ident,
    pub threshold: Duration,
    /// Ordered by the valid time of the assertion closing each gap.
    pub gaps: Vec<Gap>,
}

/// What happens to the pending retraction once it has produced a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetractionPolicy {
    /// Keep comparing the retraction against later assertions, so one
    /// retraction may close several gaps.
    #[default]
    Retain,
    /// Drop the retraction after its first gap.
    ClearOnMatch,
}

/// Find the entity/attribute pairs whose retract-to-assert lag exceeds
/// `threshold`, using [`RetractionPolicy::Retain`].
///
/// Pairs without gaps are omitted. The order of the returned sets is the
/// order in which pairs first appear in `facts`, but callers should not rely
/// on it.
pub fn gaps(facts: &[Fact], threshold: Duration) -> Vec<GapSet> {
    gaps_with_policy(facts, threshold, RetractionPolicy::default())
}

/// [`gaps`] with an explicit retraction policy.
pub fn gaps_with_policy(
    facts: &[Fact],
    threshold: Duration,
    policy: RetractionPolicy,
) -> Vec<GapSet> {
    let batches = batch_by_pair(facts);
    debug!(
        "checking {} facts in {} entity/attribute batches for gaps",
        facts.len(),
        batches.len()
    );

    // collect() is the fan-in: it returns once every batch has been scanned.
    batches
        .into_par_iter()
        .filter_map(|batch| process_batch(batch, threshold, policy))
        .collect()
}

/// Group facts by entity/attribute, batches in first-seen order.
fn batch_by_pair(facts: &[Fact]) -> Vec<Vec<&Fact>> {
    let mut index: HashMap<(&Ident, &Ident), usize> = HashMap::new();
    let mut batches: Vec<Vec<&Fact>> = Vec::new();

    for f in facts {
        let pos = *index.entry((&f.entity, &f.attribute)).or_insert_with(|| {
            batches.push(Vec::new());
            batches.len() - 1
        });
        batches[pos].push(f);
    }

    batches
}

fn process_batch(
    mut facts: Vec<&Fact>,
    threshold: Duration,
    policy: RetractionPolicy,
) -> Option<GapSet> {
    // Stable: facts sharing a valid time keep their input order.
    facts.sort_by_key(|f| f.time);

    let limit = threshold.num_microseconds().unwrap_or(i64::MAX);
    let mut pending: Option<&Fact> = None;
    let mut gaps = Vec::new();

    for &f in &facts {
        match f.operation {
            Operation::Retract => pending = Some(f),
            Operation::Assert => {
                let Some(r) = pending else { continue };
                let delta = f.time.saturating_sub(r.time);
                if delta > limit {
                    gaps.push(Gap {
                        retracted: r.value.clone(),
                        asserted: f.value.clone(),
                        duration: Duration::microseconds(delta),
                    });
                    if policy == RetractionPolicy::ClearOnMatch {
                        pending = None;
                    }
                }
            }
        }
    }

    if gaps.is_empty() {
        return None;
    }

    let first = facts[0];
    Some(GapSet {
        entity: first.entity.clone(),
        attribute: first.attribute.clone(),
        threshold,
        gaps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Ident {
        Ident::new("test", name)
    }

    fn retraction(e: &str, a: &str, v: &str, t: i64) -> Fact {
        Fact::retract(id(e), id(a), id(v)).with_time(t)
    }

    fn assertion(e: &str, a: &str, v: &str, t: i64) -> Fact {
        Fact::assert(id(e), id(a), id(v)).with_time(t)
    }

    fn us(n: i64) -> Duration {
        Duration::microseconds(n)
    }

    #[test]
    fn lag_above_threshold_is_a_gap() {
        let facts = vec![retraction("E", "A", "V1", 100), assertion("E", "A", "V2", 250)];
        let sets = gaps(&facts, us(100));

        assert_eq!(
            sets,
            vec![GapSet {
                entity: id("E"),
                attribute: id("A"),
                threshold: us(100),
                gaps: vec![Gap {
                    retracted: id("V1"),
                    asserted: id("V2"),
                    duration: us(150),
                }],
            }]
        );
    }

    #[test]
    fn lag_within_threshold_is_not_a_gap() {
        let facts = vec![retraction("E", "A", "V1", 100), assertion("E", "A", "V2", 250)];
        assert!(gaps(&facts, us(200)).is_empty());
        // The threshold is strict: equal lag does not count.
        assert!(gaps(&facts, us(150)).is_empty());
    }

    #[test]
    fn empty_input_yields_nothing() {
        assert!(gaps(&[], us(0)).is_empty());
        assert!(gaps(&[], us(1_000_000)).is_empty());
    }

    #[test]
    fn input_order_does_not_matter_valid_time_does() {
        // Recorded assertion first, retraction later; valid time says otherwise.
        let facts = vec![assertion("E", "A", "V2", 250), retraction("E", "A", "V1", 100)];
        let sets = gaps(&facts, us(100));
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].gaps[0].duration, us(150));
    }

    #[test]
    fn assertion_without_pending_retraction_is_ignored() {
        let facts = vec![
            assertion("E", "A", "V1", 0),
            assertion("E", "A", "V2", 1_000),
            retraction("E", "A", "V2", 2_000),
        ];
        assert!(gaps(&facts, us(10)).is_empty());
    }

    #[test]
    fn latest_retraction_replaces_earlier_ones() {
        let facts = vec![
            retraction("E", "A", "V1", 0),
            retraction("E", "A", "V2", 900),
            assertion("E", "A", "V3", 1_000),
        ];
        // Against V1 the lag would be 1000; only V2 (lag 100) is compared.
        assert!(gaps(&facts, us(500)).is_empty());

        let sets = gaps(&facts, us(50));
        assert_eq!(sets[0].gaps.len(), 1);
        assert_eq!(sets[0].gaps[0].retracted, id("V2"));
    }

    #[test]
    fn retain_policy_matches_one_retraction_many_times() {
        let facts = vec![
            retraction("E", "A", "V1", 0),
            assertion("E", "A", "V2", 200),
            assertion("E", "A", "V3", 400),
        ];

        let retained = gaps(&facts, us(100));
        let asserted: Vec<&Ident> = retained[0].gaps.iter().map(|g| &g.asserted).collect();
        assert_eq!(asserted, vec![&id("V2"), &id("V3")]);
        assert_eq!(retained[0].gaps[1].duration, us(400));

        let cleared = gaps_with_policy(&facts, us(100), RetractionPolicy::ClearOnMatch);
        assert_eq!(cleared[0].gaps.len(), 1);
        assert_eq!(cleared[0].gaps[0].asserted, id("V2"));
    }

    #[test]
    fn pairs_are_analyzed_independently() {
        let facts = vec![
            retraction("E", "A", "V1", 0),
            retraction("E", "B", "V1", 0),
            assertion("F", "A", "V2", 500),
            assertion("E", "A", "V2", 500),
        ];
        let sets = gaps(&facts, us(100));
        assert_eq!(sets.len(), 1);
        assert_eq!((&sets[0].entity, &sets[0].attribute), (&id("E"), &id("A")));
    }

    #[test]
    fn equal_valid_times_keep_input_order() {
        // Retract then assert at the same instant, then a later assertion.
        let facts = vec![
            retraction("E", "A", "V1", 10),
            assertion("E", "A", "V2", 10),
            assertion("E", "A", "V3", 500),
        ];
        let sets = gaps(&facts, us(0));
        assert_eq!(sets[0].gaps.len(), 1);
        assert_eq!(sets[0].gaps[0].asserted, id("V3"));
    }

    #[test]
    fn fifty_pairs_yield_fifty_gap_sets() {
        let mut facts = Vec::new();
        for i in 0..50 {
            let e = format!("e{i}");
            facts.push(assertion(&e, "A", "late", 1_000 + i));
            facts.push(retraction(&e, "A", "early", i));
        }

        let sets = gaps(&facts, us(100));
        assert_eq!(sets.len(), 50);

        let mut entities: Vec<String> =
            sets.iter().map(|s| s.entity.name().to_string()).collect();
        entities.sort();
        entities.dedup();
        assert_eq!(entities.len(), 50);
        assert!(sets.iter().all(|s| s.gaps.len() == 1));
    }
}
