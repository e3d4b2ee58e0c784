use mender_dom::DomSnapshot;
use mender_selector::Selector;
use mender_strategy::{Candidate, HealingContext, StrategyRegistry};
use mender_test_utils::{arb_page, arb_selector_expr, scenario_testid, scenario_unhealable, snapshot};
use proptest::prelude::*;

async fn propose_all(original: &DomSnapshot, broken: &str, current: &DomSnapshot) -> Vec<(&'static str, Vec<Candidate>)> {
    let broken: Selector = broken.parse().unwrap();
    let ctx = HealingContext::new(original, &broken, current);
    let mut out = Vec::new();
    for strategy in StrategyRegistry::with_defaults().iter() {
        out.push((strategy.name(), strategy.propose(&ctx).await.unwrap()));
    }
    out
}

#[tokio::test]
async fn scenario_testid_is_found_by_the_cheapest_strategy() {
    let (original, current) = scenario_testid();
    let results = propose_all(&original, "#submit-btn", &current).await;

    let (name, candidates) = &results[0];
    assert_eq!(*name, "data-testid-recovery");
    assert_eq!(candidates[0].selector.to_string(), r#"[data-testid="submit-btn"]"#);
    assert!(candidates[0].confidence.value() >= 0.9);

    // Every later strategy scores below the testid match.
    for (_, candidates) in &results[1..] {
        assert!(candidates.iter().all(|c| c.confidence.value() <= 0.95));
    }
}

#[tokio::test]
async fn nothing_to_heal_from_an_unmatched_selector() {
    let (original, current) = scenario_unhealable();
    let results = propose_all(&original, ".nonexistent-class", &current).await;
    assert!(results.iter().all(|(_, candidates)| candidates.is_empty()));
}

#[tokio::test]
async fn every_candidate_matches_what_it_claims() {
    let (original, current) = scenario_testid();
    for (name, candidates) in propose_all(&original, "#submit-btn", &current).await {
        for candidate in candidates {
            assert_eq!(candidate.strategy, name);
            assert_eq!(candidate.selector.select(&current), candidate.matched_node_ids);
            assert!(!candidate.matched_node_ids.is_empty());
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_confidence_stays_in_range(
        original in arb_page(),
        current in arb_page(),
        expr in arb_selector_expr(),
    ) {
        let original = snapshot(original);
        let current = snapshot(current);
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let results = runtime.block_on(propose_all(&original, &expr, &current));
        for (_, candidates) in results {
            for candidate in candidates {
                let value = candidate.confidence.value();
                prop_assert!((0.0..=1.0).contains(&value), "{value}");
            }
        }
    }
}
