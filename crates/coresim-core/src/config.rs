//! Simulation configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::types::SimTime;

/// Parameters of a simulation run.
///
/// Defaults follow the Azure 2019 trace setup: 200 000 hosts of 32 cores and
/// 224 GiB, statistics every 6 hours, one malicious set at 5%.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Total number of hosts in the data center.
    pub num_hosts: usize,
    /// Hosts activated (uniformly at random) before the first event. The
    /// Han strategies reinterpret this as their group size and perform no
    /// random activation.
    pub active_hosts: usize,
    pub cores_per_host: i64,
    pub memory_per_host: f64,

    /// Trace window; rows created before `min_time` or deleted after
    /// `max_time` are skipped at load time.
    pub min_time: SimTime,
    pub max_time: SimTime,

    /// Statistics tick spacing; the first tick fires at
    /// `stat_min_time + stat_interval`.
    pub stat_interval: i64,
    /// Defaults to `min_time` when unset.
    pub stat_min_time: Option<SimTime>,

    /// One malicious set is simulated per entry; each entry is the
    /// proportion of subscriptions labelled malicious in that set.
    pub malicious_proportions: Vec<f64>,

    /// Han's cap on same-subscription VMs per host.
    pub n_star: u32,
    /// Azar's oversized-VM thresholds.
    pub max_cores: i64,
    pub max_memory: f64,

    /// Beta-PERT mode for malicious subscriptions in the LDBR strategy.
    pub pert_mode: f64,
    pub pert_lambda: f64,

    /// PRNG seed. The labelling stream uses `seed`, placement `seed + 1`,
    /// LDBR `seed + 2`. When unset, all streams draw from OS entropy and
    /// reports show seed 0.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            num_hosts: 200_000,
            active_hosts: 0,
            cores_per_host: 32,
            memory_per_host: 224.0,
            min_time: 0,
            max_time: SimTime::MAX,
            stat_interval: 21_600,
            stat_min_time: None,
            malicious_proportions: vec![0.05],
            n_star: 4,
            max_cores: 16,
            max_memory: 112.0,
            pert_mode: 0.9,
            pert_lambda: 3.0,
            seed: None,
        }
    }
}

impl SimConfig {
    pub fn malicious_sets(&self) -> usize {
        self.malicious_proportions.len()
    }

    pub fn stat_min_time(&self) -> SimTime {
        self.stat_min_time.unwrap_or(self.min_time)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_hosts == 0 {
            return Err(SimError::config("number of hosts must be positive"));
        }
        if self.cores_per_host <= 0 {
            return Err(SimError::config("cores per host must be positive"));
        }
        if self.memory_per_host <= 0.0 {
            return Err(SimError::config("memory per host must be positive"));
        }
        if self.stat_interval <= 0 {
            return Err(SimError::config("stat interval must be positive"));
        }
        if self.max_time < self.min_time {
            return Err(SimError::config("max time lies before min time"));
        }
        if self.malicious_proportions.is_empty() {
            return Err(SimError::config("at least one malicious set is required"));
        }
        for &p in &self.malicious_proportions {
            if !(0.0..=1.0).contains(&p) {
                return Err(SimError::config(format!(
                    "malicious proportion {p} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        SimConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_proportion() {
        let cfg = SimConfig {
            malicious_proportions: vec![1.5],
            ..SimConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_stat_min_time_defaults_to_min_time() {
        let cfg = SimConfig {
            min_time: 500,
            ..SimConfig::default()
        };
        assert_eq!(cfg.stat_min_time(), 500);
    }
}
