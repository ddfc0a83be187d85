//! Kernel-wide sizing and timing configuration, loadable from TOML.
//!
//! This does not touch the hive's on-disk format — it only sizes the
//! in-memory process/thread/capability tables and the scheduler's timer
//! period. Defaults mirror the literal constants used throughout the
//! design and its test scenarios.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KernelConfig {
    /// Fixed-slot process table capacity.
    pub max_processes: usize,
    /// Fixed-slot thread table capacity across all processes.
    pub max_threads: usize,
    /// Maximum threads a single process may own at once.
    pub max_threads_per_process: usize,
    /// Capability table entries per thread.
    pub cap_table_size: usize,
    /// Kernel stack size allocated per thread, in bytes.
    pub kernel_stack_size: usize,
    /// Timer tick period in milliseconds for priorities below realtime.
    pub timer_period_ms: u64,
    /// Default hive size used by [`crate::hive::Hive::create`] when no
    /// explicit size is given by the caller.
    pub default_hive_size: usize,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_processes: 1024,
            max_threads: 4096,
            max_threads_per_process: 256,
            cap_table_size: 256,
            kernel_stack_size: 16 * 1024,
            timer_period_ms: 10,
            default_hive_size: 65536,
        }
    }
}

impl KernelConfig {
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.max_processes, 1024);
        assert_eq!(cfg.max_threads_per_process, 256);
        assert_eq!(cfg.cap_table_size, 256);
        assert_eq!(cfg.kernel_stack_size, 16 * 1024);
        assert_eq!(cfg.timer_period_ms, 10);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = KernelConfig::default();
        let text = cfg.to_toml().unwrap();
        let parsed = KernelConfig::from_toml(&text).unwrap();
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let parsed = KernelConfig::from_toml("timer_period_ms = 5\n").unwrap();
        assert_eq!(parsed.timer_period_ms, 5);
        assert_eq!(parsed.max_processes, KernelConfig::default().max_processes);
    }
}
