use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolConfig {
    pub collector: CollectorConfig,
    pub anomaly: AnomalyConfig,
    pub scan: ScanConfig,
}

/// Collector retry, deadline and shared rate-limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Max attempts per collector call (first try + retries).
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds; doubles per attempt.
    pub backoff_base_ms: u64,
    /// Deadline per collector call in seconds.
    pub deadline_secs: u64,
}

impl CollectorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Backoff before retry `attempt` (0-based): base × 2^attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_base_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

/// Anomaly engine window and threshold settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Sliding window length in seconds.
    pub window_secs: u64,
    /// Events older than window start minus this tolerance are ignored.
    pub lateness_tolerance_secs: u64,
    /// Minimum deviation score to emit an anomaly record.
    pub deviation_threshold: f64,
}

/// Orchestrator concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Concurrent collector calls across all running scans — enforces the
    /// shared external rate limit.
    pub max_concurrent_collectors: usize,
    /// How long finished jobs stay queryable before the orchestrator drops
    /// them from its in-memory table.
    pub job_retention_secs: u64,
}

impl PatrolConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    pub fn from_env() -> Self {
        Self {
            collector: CollectorConfig {
                max_attempts: env_u32("PATROL_COLLECTOR_MAX_ATTEMPTS", 3),
                backoff_base_ms: env_u64("PATROL_COLLECTOR_BACKOFF_BASE_MS", 200),
                deadline_secs: env_u64("PATROL_COLLECTOR_DEADLINE_SECS", 10),
            },
            anomaly: AnomalyConfig {
                window_secs: env_u64("PATROL_ANOMALY_WINDOW_SECS", 3600),
                lateness_tolerance_secs: env_u64("PATROL_ANOMALY_LATENESS_SECS", 300),
                deviation_threshold: env_f64("PATROL_ANOMALY_THRESHOLD", 3.0),
            },
            scan: ScanConfig {
                max_concurrent_collectors: env_u64("PATROL_MAX_CONCURRENT_COLLECTORS", 4)
                    as usize,
                job_retention_secs: env_u64("PATROL_JOB_RETENTION_SECS", 3600),
            },
        }
    }
}

impl Default for PatrolConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig {
                max_attempts: 3,
                backoff_base_ms: 200,
                deadline_secs: 10,
            },
            anomaly: AnomalyConfig {
                window_secs: 3600,
                lateness_tolerance_secs: 300,
                deviation_threshold: 3.0,
            },
            scan: ScanConfig {
                max_concurrent_collectors: 4,
                job_retention_secs: 3600,
            },
        }
    }
}
