//! Sample acquisition module
//!
//! Provides the seam between the processing pipeline and whatever produces
//! attribution telemetry:
//! - Synthetic: deterministic simulated device (demo, tests)
//! - Real collectors plug in behind the same trait

mod synthetic;

pub use synthetic::SyntheticSource;

use crate::core::{Result, SampleBatch};

/// Sampler that abstracts over telemetry providers
pub struct Sampler {
    source: Box<dyn SampleSource + Send + Sync>,
}

impl Sampler {
    /// Create a sampler over the deterministic synthetic provider
    pub fn synthetic(seed: u64, timezone_id: &str) -> Self {
        log::info!("Using synthetic telemetry (seed {})", seed);
        Self {
            source: Box::new(SyntheticSource::new(seed).with_timezone(timezone_id)),
        }
    }

    /// Create a sampler over a caller-supplied provider
    pub fn with_source(source: Box<dyn SampleSource + Send + Sync>) -> Self {
        log::info!("Using {} for attribution sampling", source.name());
        Self { source }
    }

    /// Collect the next attribution sample
    pub fn next_batch(&self) -> Result<SampleBatch> {
        self.source.next_batch()
    }

    /// Get the name of the current provider
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Check if samples are synthesized (not read from a device)
    pub fn is_synthetic(&self) -> bool {
        self.source.is_synthetic()
    }
}

/// Trait for attribution telemetry providers
pub trait SampleSource {
    /// Collect one sample: device reading plus raw consumer tuples
    fn next_batch(&self) -> Result<SampleBatch>;

    /// Name of this provider
    fn name(&self) -> &str;

    /// Whether samples are synthesized
    fn is_synthetic(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_sampler_facade() {
        let sampler = Sampler::synthetic(42, "UTC");
        assert!(sampler.is_synthetic());
        assert!(sampler.source_name().contains("Synthetic"));

        let batch = sampler.next_batch().unwrap();
        assert_eq!(batch.device.battery_level_percent, 100);
        assert!(!batch.consumers.is_empty());
    }
}
