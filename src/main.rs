//! DrainScope - Main entry point
//!
//! A lightweight daemon that samples per-consumer battery telemetry,
//! folds it into ranked drain attribution views and keeps a bounded
//! history of device snapshots on disk.

use drainscope::core::Config;
use drainscope::policy::StaticPolicy;
use drainscope::service::UsageService;
use drainscope::source::{Sampler, SyntheticSource};
use drainscope::store::SqliteStore;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting DrainScope v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration
    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config, using defaults: {}", e);
        Config::default()
    });

    // Initialize snapshot storage
    let store = SqliteStore::new().unwrap_or_else(|e| {
        log::error!("Failed to initialize snapshot store: {}", e);
        std::process::exit(1);
    });

    // Start the processing service; it resumes from retained history
    let policy = Arc::new(StaticPolicy::new(&config.policy));
    let service = UsageService::spawn(Box::new(store), policy, &config).unwrap_or_else(|e| {
        log::error!("Failed to start usage service: {}", e);
        std::process::exit(1);
    });

    // No device telemetry provider is wired up on this build; sample the
    // deterministic synthetic device on the daemon clock instead.
    log::warn!("No device telemetry provider available, using synthetic sampling");
    let now_ms = chrono::Utc::now().timestamp_millis();
    let step_ms = (config.general.sampling_interval_secs as i64).saturating_mul(1000);
    let source = SyntheticSource::new(now_ms as u64)
        .with_timezone(&config.general.timezone)
        .with_profile(now_ms, step_ms);
    let sampler = Sampler::with_source(Box::new(source));

    sampling_loop(&service, &sampler, &config).await;
}

/// Background loop that periodically collects a sample, feeds the service
/// and prunes snapshots that fell out of the retention window
async fn sampling_loop(service: &UsageService, sampler: &Sampler, config: &Config) {
    let interval_secs = config.general.sampling_interval_secs.max(1);
    // Prune roughly once an hour regardless of the sampling cadence
    let prune_every = (3_600 / interval_secs).max(1);
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_secs));

    log::info!("Sampling loop initialized with {}s interval", interval_secs);

    let mut count: u64 = 0;
    loop {
        interval.tick().await;

        match sampler.next_batch() {
            Ok(batch) => service.ingest(batch),
            Err(e) => log::warn!("Failed to collect sample: {}", e),
        }

        count += 1;
        if count % prune_every == 0 {
            service.prune();
            service.flush().await;

            let snapshot = service.current();
            log::info!(
                "Retained {} snapshots across {} days (generation {})",
                snapshot.timeline().snapshot_count(),
                snapshot.day_count(),
                snapshot.generation()
            );
        }
    }
}
