//! Text and JSON rendering

use anyhow::Result;
use mender_core::dto::{BatchHealResponseDto, HealResponseDto, PlaygroundResponse};
use mender_core::HealingAttempt;
use mender_dom::{DomSnapshot, SnapshotDiff};
use mender_strategy::StrategyInfo;
use serde::Serialize;
use serde_json::json;

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn heal(response: &HealResponseDto, attempt: &HealingAttempt, json: bool) -> Result<()> {
    if json {
        return print_json(&json!({
            "result": response,
            "candidates": attempt.candidates,
            "strategyRuns": attempt.strategy_runs,
            "rationale": attempt.rationale,
        }));
    }

    match &response.healed {
        Some(healed) => println!(
            "{} -> {}  ({:.2}, {})",
            response.original,
            healed,
            response.confidence,
            response.strategy.as_deref().unwrap_or("-")
        ),
        None => println!(
            "{}: could not heal ({})",
            response.original,
            attempt.rationale.as_deref().unwrap_or("no candidate")
        ),
    }
    if attempt.from_cache {
        println!("  (cached)");
    }
    for (rank, candidate) in attempt.candidates.iter().enumerate() {
        println!(
            "  {}. {:<48} {} {}",
            rank + 1,
            candidate.selector.to_string(),
            candidate.confidence,
            candidate.strategy
        );
    }
    for run in &attempt.strategy_runs {
        println!("  {:<24} {:<14} {}ms", run.strategy, run.outcome.to_string(), run.elapsed_ms);
    }
    Ok(())
}

pub(crate) fn batch(response: &BatchHealResponseDto, json: bool) -> Result<()> {
    if json {
        return print_json(response);
    }
    for item in &response.results {
        let label = item.id.as_deref().unwrap_or(&item.result.original);
        match (&item.error, &item.result.healed) {
            (Some(err), _) => println!("{label}: invalid selector: {err}"),
            (None, Some(healed)) if item.result.success => {
                println!("{label}: {healed} ({:.2})", item.result.confidence);
            }
            (None, _) => println!("{label}: could not heal"),
        }
    }
    let summary = &response.summary;
    println!(
        "{} total, {} healed, {} failed{}",
        summary.total,
        summary.successful,
        summary.failed,
        if response.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

pub(crate) fn diff(changes: &SnapshotDiff, json: bool) -> Result<()> {
    if json {
        return print_json(changes);
    }
    if changes.is_unchanged() {
        println!("no changes");
        return Ok(());
    }
    for node in changes.changes() {
        println!("  {}", node.describe());
    }
    println!("{}", changes.summary());
    Ok(())
}

pub(crate) fn query(snapshot: &DomSnapshot, response: &PlaygroundResponse, json: bool) -> Result<()> {
    if json {
        return print_json(response);
    }
    for id in &response.matched_node_ids {
        if let Some(node) = snapshot.node(*id) {
            let text = node.text().map(|t| format!(" \"{t}\"")).unwrap_or_default();
            println!("  {:>4}  <{}>{}", id.0, node.tag(), text);
        }
    }
    println!("{} match(es)", response.count);
    Ok(())
}

pub(crate) fn strategies(catalog: &[StrategyInfo], json: bool) -> Result<()> {
    if json {
        return print_json(&catalog);
    }
    for (priority, info) in catalog.iter().enumerate() {
        println!("{}. {:<24} [{}] {}", priority + 1, info.name, info.kind, info.description);
    }
    Ok(())
}
