//! Terminal rendering for the `urnas` commands.
//!
//! Aggregates print as vertical cards: a `=== title ===` banner, grouped
//! sections, and aligned label/value rows. A single compiled section renders
//! the same way straight from its Arrow row.

use anyhow::Context;
use arrow::array::{Array, BooleanArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use arrow::util::pretty::pretty_format_batches;
use urnas_core::catalog::ElectionCycle;
use urnas_fetch::{DownloadStats, ElectionCatalog, StateManifest};
use urnas_pipeline::PipelineReport;
use urnas_store::{RoundCount, StoreSummary};

const MAX_LIST_ITEMS: usize = 10;

// ── Section card groupings ──

const IDENTITY: &[&str] = &[
    "id",
    "round",
    "state",
    "region",
    "municipality",
    "zone",
    "section",
    "timezone_offset",
];

const EQUIPMENT: &[&str] = &[
    "generation",
    "phase",
    "equipment_model",
    "session_type",
    "is_reserve",
    "software_version",
    "emitted_at",
];

const TURNOUT: &[&str] = &[
    "eligible_voters",
    "turnout",
    "abstention_pct",
    "released_by_code",
    "biometric_matches",
    "biometric_pct",
];

const TIMING: &[&str] = &["open_time", "close_time", "duration_minutes"];

const LOG_EVENTS: &[&str] = &[
    "reboots",
    "log_errors",
    "operator_alerts",
    "logged_votes",
    "substitutions",
];

const AUDIT: &[&str] = &["has_issues", "n_issues"];

// ── Public API ──

pub fn print_cycles(cycles: &[ElectionCycle]) {
    println!("=== Known election cycles ===");
    println!();
    for c in cycles {
        println!("{} ({})", c.cycle, c.description);
        row("first round", format!("{} (election {})", c.first_round, c.first_election));
        row("second round", format!("{} (election {})", c.second_round, c.second_election));
        row("ballot generation", c.generation.as_str());
        println!();
    }
}

pub fn print_catalog(catalog: &ElectionCatalog) {
    println!("=== Published by the authority: {} ===", catalog.cycle);
    if !catalog.generated_on.is_empty() {
        println!("generated {} {}", catalog.generated_on, catalog.generated_at);
    }
    println!();
    for round in &catalog.rounds {
        println!("Round {} ({}) {}", round.round, round.code, round.date);
        for election in round.elections.iter().take(MAX_LIST_ITEMS) {
            row(&election.code, &election.name);
        }
        if round.elections.len() > MAX_LIST_ITEMS {
            println!("  ... and {} more", round.elections.len() - MAX_LIST_ITEMS);
        }
        println!();
    }
}

pub fn print_state_manifest(manifest: &StateManifest, cycle: &str, round: &str) {
    println!("=== {} ({}) ===", manifest.name, manifest.state.to_uppercase());
    println!("{cycle}, round code {round}");
    println!();

    let zones: usize = manifest.municipalities.iter().map(|m| m.zones.len()).sum();
    println!("Totals");
    row("municipalities", manifest.municipalities.len());
    row("zones", zones);
    row("sections", manifest.section_count());
    println!();

    let mut largest: Vec<_> = manifest
        .municipalities
        .iter()
        .map(|m| (m, m.zones.iter().map(|z| z.sections.len()).sum::<usize>()))
        .collect();
    largest.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.code.cmp(&b.0.code)));

    println!("Largest municipalities");
    for (m, sections) in largest.iter().take(MAX_LIST_ITEMS) {
        row(&format!("{} {}", m.code, m.name), format!("{sections} sections"));
    }
    if largest.len() > MAX_LIST_ITEMS {
        println!("  ... and {} more", largest.len() - MAX_LIST_ITEMS);
    }
    println!();
}

pub fn print_download_stats(title: &str, stats: &DownloadStats) {
    println!("=== {title} ===");
    row("sections processed", stats.sections_processed);
    row("files downloaded", stats.downloaded);
    row("already on disk", stats.skipped);
    row("not published", stats.missing);
    row("errors", stats.errors);
    println!();
}

pub fn print_pipeline_report(report: &PipelineReport, elapsed_secs: i64) {
    println!("=== Compilation ===");
    row("compiled this run", report.stats.compiled);
    row("already compiled", report.stats.skipped);
    row("errors", report.stats.errors);
    row("sections in store", report.total_sections);
    for r in &report.rounds {
        row(&format!("round {}", r.round), r.sections);
    }
    row("elapsed", format_elapsed(elapsed_secs));
    println!();
}

pub fn print_summary(path: &std::path::Path, summary: &StoreSummary, rounds: &[RoundCount]) {
    println!("=== {} ===", path.display());
    println!();

    println!("Sections");
    row("compiled", summary.sections);
    row("states", summary.states);
    for r in rounds {
        row(&format!("round {}", r.round), r.sections);
    }
    println!();

    println!("Voters");
    row("eligible", summary.eligible_voters);
    row("turnout", summary.turnout);
    if summary.eligible_voters > 0 {
        let pct = summary.turnout as f64 / summary.eligible_voters as f64 * 100.0;
        row("turnout %", format!("{pct:.2}"));
    }
    println!();

    println!("Audit");
    row("sections ok", summary.sections_ok);
    row("sections with issues", summary.sections_with_issues);
    row("issues", summary.issues);
    row("reboots", summary.reboots);
    println!();
}

/// Print one compiled section as a vertical card grouped by concern.
pub fn print_section_card(batch: &RecordBatch) -> anyhow::Result<()> {
    let id = cell(batch, "id")?.unwrap_or_default();
    println!("=== {id} ===");
    println!();

    print_group(batch, "Identity", IDENTITY)?;
    print_group(batch, "Equipment", EQUIPMENT)?;
    print_group(batch, "Turnout", TURNOUT)?;
    print_group(batch, "Timing", TIMING)?;
    print_group(batch, "Log Events", LOG_EVENTS)?;
    print_group(batch, "Audit", AUDIT)?;
    Ok(())
}

/// Tabular output for ad-hoc SQL.
pub fn print_batches(batches: &[RecordBatch]) -> anyhow::Result<()> {
    let rows: usize = batches.iter().map(RecordBatch::num_rows).sum();
    if rows == 0 {
        println!("(no rows)");
        return Ok(());
    }
    let table = pretty_format_batches(batches).context("formatting query result")?;
    println!("{table}");
    println!("{rows} row(s)");
    Ok(())
}

// ── Rendering helpers ──

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {:<26} {}", label, value);
}

fn print_group(batch: &RecordBatch, header: &str, cols: &[&str]) -> anyhow::Result<()> {
    let mut values = Vec::new();
    for &col in cols {
        if let Some(v) = cell(batch, col)? {
            values.push((col, v));
        }
    }
    if values.is_empty() {
        return Ok(());
    }

    println!("{header}");
    for (col, v) in values {
        row(col, v);
    }
    println!();
    Ok(())
}

/// Display text for the first row of `col`, `None` when absent or null.
fn cell(batch: &RecordBatch, col: &str) -> anyhow::Result<Option<String>> {
    let Ok(idx) = batch.schema().index_of(col) else {
        return Ok(None);
    };
    let array = batch.column(idx);
    if array.is_empty() || array.is_null(0) {
        return Ok(None);
    }
    if let DataType::Boolean = array.data_type()
        && let Some(b) = array.as_any().downcast_ref::<BooleanArray>()
    {
        return Ok(Some(if b.value(0) { "yes" } else { "no" }.to_string()));
    }
    let options = FormatOptions::default();
    let formatter = ArrayFormatter::try_new(array.as_ref(), &options)
        .with_context(|| format!("formatting column {col}"))?;
    Ok(Some(formatter.value(0).to_string()))
}

fn format_elapsed(secs: i64) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h{m:02}m{s:02}s")
    } else if m > 0 {
        format!("{m}m{s:02}s")
    } else {
        format!("{s}s")
    }
}
