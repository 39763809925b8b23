//! DrainScope - Demo CLI
//!
//! Walks the full attribution pipeline on a simulated multi-day
//! timeline: ingestion, ranked views, level series, selection and
//! localized labels.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;

// Import from our library
use drainscope::core::{Config, DiffEntry, SeriesScope, SlotIndex};
use drainscope::i18n::I18n;
use drainscope::labels::{Labeler, PackageHintResolver};
use drainscope::policy::StaticPolicy;
use drainscope::service::UsageService;
use drainscope::source::Sampler;
use drainscope::store::SqliteStore;

/// 30-minute steps; enough to cross several local days and one recharge.
const SIMULATED_BATCHES: usize = 160;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("==============================================");
    println!("           DrainScope - Demo CLI");
    println!("==============================================\n");

    // 1. Configuration
    println!("[1/5] Loading configuration...");
    let mut config = Config::default();
    config.general.language = "en".to_string();
    println!("      Language: {}", config.general.language);
    println!("      Retention: {} hours", config.general.retention_hours);
    println!(
        "      Ranked list cap: {} entries, {:.1}% threshold\n",
        config.ranking.max_displayed_entries, config.ranking.min_percent_threshold
    );

    // 2. Usage service over an in-memory store
    println!("[2/5] Starting usage service...");
    let store = SqliteStore::open_in_memory()?;
    let policy = Arc::new(StaticPolicy::new(&config.policy));
    let service = UsageService::spawn(Box::new(store), policy, &config)?;
    println!("      Store: in-memory SQLite");
    println!("      Worker: running\n");

    // 3. Simulated timeline
    println!("[3/5] Simulating a multi-day timeline...");
    let sampler = Sampler::synthetic(2024, "Europe/Paris");
    for _ in 0..SIMULATED_BATCHES {
        match sampler.next_batch() {
            Ok(batch) => service.ingest(batch),
            Err(e) => eprintln!("      Sampling error: {}", e),
        }
    }
    service.flush().await;

    let snapshot = service.current();
    println!("      Ingested {} samples, 30 simulated minutes apart", SIMULATED_BATCHES);
    println!(
        "      Retained {} snapshots across {} days",
        snapshot.timeline().snapshot_count(),
        snapshot.day_count()
    );
    println!("      Recomputations: {} (the burst collapsed into one)\n", snapshot.generation());

    // 4. Ranked attribution views
    println!("[4/5] Ranked attribution views...\n");

    let mut i18n = I18n::new(&config.general.language);
    let labeler = Labeler::new(
        Box::new(PackageHintResolver),
        &config.general.language,
        config.policy.os_system_id,
    );

    if let Some(series) = service.level_series(SeriesScope::Daily, SlotIndex::All) {
        println!("      Battery level at day boundaries:");
        for point in &series.points {
            println!("        {}  {:>3}%", format_local(point.timestamp_ms), point.level);
        }
        println!();
    }

    println!("      Whole retained window:");
    let entries = service.selected_entries();
    render_table(&i18n, &labeler, &entries).await;

    let displayed: f64 = entries.iter().map(|e| e.consumed_power_delta_mah).sum();
    println!("      Displayed total: {:.2} mAh (equals the device-reported delta)\n", displayed);

    // 5. Selection walkthrough
    println!("[5/5] Selection walkthrough...\n");

    if let Err(e) = service.select(SlotIndex::At(99), SlotIndex::All) {
        println!("      Selecting day #99 is rejected: {}", e);
    }

    match service.select(SlotIndex::At(0), SlotIndex::At(4)) {
        Ok(()) => {
            let (day, hour) = service.selection();
            println!("      Selected day {}, hour window {}:", slot_name(day), slot_name(hour));
            render_table(&i18n, &labeler, &service.selected_entries()).await;
        }
        Err(e) => println!("      Selection failed: {}", e),
    }
    println!();

    if let Some(series) = service.level_series(SeriesScope::Hourly, SlotIndex::At(0)) {
        println!("      Battery level within the selected day:");
        for point in &series.points {
            println!("        {}  {:>3}%", format_local(point.timestamp_ms), point.level);
        }
        println!();
    }

    let (raw_day, raw_hour) = service.save_selection();
    println!("      Selection persists as ({}, {})", raw_day, raw_hour);
    service.restore_selection(99, raw_hour);
    let (day, hour) = service.selection();
    println!(
        "      Restoring a stale day falls back to: day {}, hour window {}\n",
        slot_name(day),
        slot_name(hour)
    );

    println!("      Switching language to French...");
    i18n.set_language("fr");
    labeler.set_language("fr");
    render_table(&i18n, &labeler, &service.selected_entries()).await;

    // What an embedding UI would consume
    println!("\n=== JSON Export ===\n");
    let top: Vec<&DiffEntry> = entries.iter().take(2).collect();
    println!("{}\n", serde_json::to_string_pretty(&top)?);

    // Summary
    let snapshot = service.current();
    println!("=== Session Summary ===\n");
    println!("  Snapshots retained: {}", snapshot.timeline().snapshot_count());
    println!("  Days covered:       {}", snapshot.day_count());
    println!("  Recomputations:     {}", snapshot.generation());
    println!("  Language:           {}", labeler.language());

    println!("\n==============================================\n");

    Ok(())
}

/// Render one ranked list with localized headers and names.
///
/// Labels resolve in the background; the warm-up pass queues the
/// lookups and the short sleep lets the resolver finish them.
async fn render_table(i18n: &I18n, labeler: &Labeler, entries: &[DiffEntry]) {
    for entry in entries {
        let _ = labeler.display_name(entry);
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    println!("      ------------------------------------------------------");
    println!(
        "      {:<24} | {:>13} | {:>9}",
        i18n.get("table.name"),
        i18n.get("table.power"),
        i18n.get("table.percent")
    );
    println!("      ------------------------------------------------------");
    for entry in entries {
        println!(
            "      {:<24} | {:>13.2} | {:>8.1}%",
            labeler.display_name(entry),
            entry.consumed_power_delta_mah,
            entry.percent_of_total
        );
    }
    println!("      ------------------------------------------------------");
}

fn slot_name(slot: SlotIndex) -> String {
    match slot {
        SlotIndex::All => "all".to_string(),
        SlotIndex::At(i) => format!("#{}", i + 1),
    }
}

/// Format a UTC millisecond timestamp in the simulated device's zone.
fn format_local(timestamp_ms: i64) -> String {
    let tz: Tz = "Europe/Paris".parse().unwrap_or(chrono_tz::UTC);
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(utc) => utc.with_timezone(&tz).format("%Y-%m-%d %H:%M").to_string(),
        None => timestamp_ms.to_string(),
    }
}
