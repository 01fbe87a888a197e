//! Placement strategies.
//!
//! A policy is a value holding its own configuration and state; the engine
//! dispatches every creation through [`PlacementPolicy::place`] and every
//! deletion through [`PlacementPolicy::remove`]. The default implementations
//! encode the framework behavior (activate the chosen host if needed, shut
//! an emptied host down); policies override the hooks where their papers
//! demand different lifecycles.

mod agarwal;
mod azar;
mod dedicated;
mod fit;
mod han;
mod known;
mod ldbr;

pub use agarwal::Pcuf;
pub use azar::Azar;
pub use dedicated::DedicatedInstance;
pub use fit::{BestFit, FirstFit, NextFit, RandomActive, WorstFit};
pub use han::HanPssf;
pub use known::KnownProportion;
pub use ldbr::Ldbr;

use std::str::FromStr;

use coresim_core::{HostId, Result, SimConfig, SimError, VmId};

use crate::world::World;

/// A VM placement strategy.
pub trait PlacementPolicy {
    /// Short tag used in reports.
    fn name(&self) -> &'static str;

    /// Choose a host for the VM: either an active host with capacity, or an
    /// inactive one (the framework boots it). `None` means the cluster is
    /// out of capacity, which is fatal.
    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>>;

    /// Process a VM creation.
    fn place(&mut self, world: &mut World, vm: VmId) -> Result<()> {
        let host = match self.pick_host(world, vm)? {
            Some(host) => host,
            None => {
                return Err(SimError::CapacityExhausted {
                    vm: world.vms[vm.0].id.clone(),
                })
            }
        };
        if !world.hosts[host.0].is_active() {
            world.activate_host(host, world.time);
        }
        world.place_vm(vm, host)?;
        self.after_place(world, vm, host)
    }

    /// Hook invoked after a successful placement.
    fn after_place(&mut self, _world: &mut World, _vm: VmId, _host: HostId) -> Result<()> {
        Ok(())
    }

    /// Process a VM deletion. By default an emptied host is shut down.
    fn remove(&mut self, world: &mut World, vm: VmId) -> Result<()> {
        let (host, empty) = world.remove_vm(vm)?;
        if empty {
            world.deactivate_host(host, world.time)?;
        }
        Ok(())
    }

    /// Whether per-subscription "seen subscriptions" statistics should be
    /// generated for this policy.
    fn wants_subs_seen_stats(&self) -> bool {
        false
    }

    /// Whether per-host "subscriptions hosted" statistics should be
    /// generated for this policy.
    fn wants_hosts_seen_stats(&self) -> bool {
        false
    }
}

/// Algorithm selection, parsed from the CLI tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    FirstFit,
    NextFit,
    BestFit,
    WorstFit,
    RandomActive,
    DedicatedInstance,
    Azar,
    Han,
    HanKeepOn,
    KnownUsers { lowest_avg_seen: bool },
    KnownVms { lowest_avg_seen: bool },
    Ldbr,
    Pcuf,
}

impl FromStr for Algorithm {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FirstFit" => Ok(Algorithm::FirstFit),
            "NextFit" => Ok(Algorithm::NextFit),
            "BestFit" => Ok(Algorithm::BestFit),
            "WorstFit" => Ok(Algorithm::WorstFit),
            "RandomActive" => Ok(Algorithm::RandomActive),
            "DedicatedInstance" => Ok(Algorithm::DedicatedInstance),
            "Azar" => Ok(Algorithm::Azar),
            "Han" => Ok(Algorithm::Han),
            "HanKeepOn" => Ok(Algorithm::HanKeepOn),
            "KnownUsers" => Ok(Algorithm::KnownUsers { lowest_avg_seen: false }),
            "KnownUsers-LowestAvgSeen" => Ok(Algorithm::KnownUsers { lowest_avg_seen: true }),
            "KnownVMs" => Ok(Algorithm::KnownVms { lowest_avg_seen: false }),
            "KnownVMs-LowestAvgSeen" => Ok(Algorithm::KnownVms { lowest_avg_seen: true }),
            "LDBR" => Ok(Algorithm::Ldbr),
            "PCUF" | "AgarwalPCUF" => Ok(Algorithm::Pcuf),
            other => Err(SimError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Instantiate the policy for `alg`, performing its initial host
/// activation on the world.
///
/// Most strategies boot `active_hosts` uniformly random hosts up front; the
/// Han strategies reinterpret that value as their group size and bring up
/// group 0 instead.
pub fn build_policy(alg: Algorithm, world: &mut World, cfg: &SimConfig) -> Result<Box<dyn PlacementPolicy>> {
    match alg {
        Algorithm::Han => return Ok(Box::new(HanPssf::new(world, cfg, false)?)),
        Algorithm::HanKeepOn => return Ok(Box::new(HanPssf::new(world, cfg, true)?)),
        _ => world.activate_random_hosts(cfg.active_hosts),
    }

    let policy: Box<dyn PlacementPolicy> = match alg {
        Algorithm::FirstFit => Box::new(FirstFit),
        Algorithm::NextFit => Box::new(NextFit::new(cfg.num_hosts)),
        Algorithm::BestFit => Box::new(BestFit),
        Algorithm::WorstFit => Box::new(WorstFit),
        Algorithm::RandomActive => Box::new(RandomActive),
        Algorithm::DedicatedInstance => Box::new(DedicatedInstance),
        Algorithm::Azar => Box::new(Azar::new(world, cfg)?),
        Algorithm::KnownUsers { lowest_avg_seen } => Box::new(KnownProportion::new(true, lowest_avg_seen)),
        Algorithm::KnownVms { lowest_avg_seen } => Box::new(KnownProportion::new(false, lowest_avg_seen)),
        Algorithm::Ldbr => Box::new(Ldbr::new(cfg)?),
        Algorithm::Pcuf => Box::new(Pcuf),
        Algorithm::Han | Algorithm::HanKeepOn => unreachable!("handled above"),
    };
    Ok(policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("FirstFit".parse::<Algorithm>().unwrap(), Algorithm::FirstFit);
        assert_eq!(
            "KnownUsers-LowestAvgSeen".parse::<Algorithm>().unwrap(),
            Algorithm::KnownUsers { lowest_avg_seen: true }
        );
        assert_eq!("AgarwalPCUF".parse::<Algorithm>().unwrap(), Algorithm::Pcuf);
        assert!(matches!(
            "Magic".parse::<Algorithm>(),
            Err(SimError::UnknownAlgorithm(_))
        ));
    }
}
