//! Engine configuration.

use std::time::Duration;

/// Tunables for the scheduler, dispatch queue, workers, and reply detector.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How often the scheduler scans active campaigns.
    pub scheduler_interval: Duration,
    /// How often the reply detector polls mailboxes.
    pub detector_interval: Duration,
    /// Number of concurrent send workers.
    pub worker_concurrency: usize,
    /// Page size for the scheduler's lead scan.
    pub lead_page_size: usize,
    /// Minutes of tolerance around the scheduled send minute.
    pub window_tolerance_min: i64,
    /// Maximum delivery attempts per dispatch task.
    pub max_send_attempts: u32,
    /// Base delay for exponential retry backoff.
    pub retry_base_delay: Duration,
    /// Timeout applied to every external call (relay, classifier, generator).
    pub external_call_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(15 * 60),
            detector_interval: Duration::from_secs(2 * 60),
            worker_concurrency: 5,
            lead_page_size: 100,
            window_tolerance_min: 7,
            max_send_attempts: 3,
            retry_base_delay: Duration::from_secs(5),
            external_call_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(secs) = env_u64("DRIPMAIL_SCHEDULER_INTERVAL_SECS") {
            cfg.scheduler_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("DRIPMAIL_DETECTOR_INTERVAL_SECS") {
            cfg.detector_interval = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("DRIPMAIL_WORKERS") {
            cfg.worker_concurrency = (n as usize).max(1);
        }
        if let Some(n) = env_u64("DRIPMAIL_LEAD_PAGE_SIZE") {
            cfg.lead_page_size = (n as usize).max(1);
        }
        if let Some(n) = env_u64("DRIPMAIL_MAX_SEND_ATTEMPTS") {
            cfg.max_send_attempts = (n as u32).max(1);
        }
        if let Some(secs) = env_u64("DRIPMAIL_RETRY_BASE_DELAY_SECS") {
            cfg.retry_base_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("DRIPMAIL_EXTERNAL_TIMEOUT_SECS") {
            cfg.external_call_timeout = Duration::from_secs(secs);
        }

        cfg
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_cadence() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.scheduler_interval, Duration::from_secs(900));
        assert_eq!(cfg.detector_interval, Duration::from_secs(120));
        assert_eq!(cfg.worker_concurrency, 5);
        assert_eq!(cfg.max_send_attempts, 3);
    }
}
