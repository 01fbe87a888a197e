//! Classic bin-packing heuristics and the random-active baseline.

use coresim_core::{HostId, Result, VmId};

use crate::policy::PlacementPolicy;
use crate::world::World;

/// First host in index order with capacity, active or not.
pub struct FirstFit;

impl PlacementPolicy for FirstFit {
    fn name(&self) -> &'static str {
        "FirstFit"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let (cores, memory) = world.vm_demand(vm);
        Ok(world
            .hosts
            .iter()
            .find(|h| h.has_capacity_for(cores, memory))
            .map(|h| HostId(h.number)))
    }
}

/// Like first-fit, but the scan resumes after the previously chosen host
/// and wraps around.
pub struct NextFit {
    last_chosen: usize,
}

impl NextFit {
    pub fn new(num_hosts: usize) -> Self {
        NextFit {
            last_chosen: num_hosts.saturating_sub(1),
        }
    }
}

impl PlacementPolicy for NextFit {
    fn name(&self) -> &'static str {
        "NextFit"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let (cores, memory) = world.vm_demand(vm);
        let n = world.hosts.len();
        for i in 0..n {
            let idx = (i + 1 + self.last_chosen) % n;
            if world.hosts[idx].has_capacity_for(cores, memory) {
                self.last_chosen = idx;
                return Ok(Some(HostId(idx)));
            }
        }
        Ok(None)
    }
}

/// Active host with the fewest free cores; ties break uniformly at random.
pub struct BestFit;

impl PlacementPolicy for BestFit {
    fn name(&self) -> &'static str {
        "BestFit"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let (cores, memory) = world.vm_demand(vm);
        let mut fewest = i64::MAX;
        let mut ties: Vec<HostId> = Vec::new();
        for &h in &world.active {
            let host = &world.hosts[h.0];
            if !host.has_capacity_for(cores, memory) {
                continue;
            }
            let free = host.free_cores();
            if free < fewest {
                fewest = free;
                ties.clear();
                ties.push(h);
            } else if free == fewest {
                ties.push(h);
            }
        }

        if ties.is_empty() {
            Ok(world.pick_empty_host(vm))
        } else {
            Ok(world.pick_random(&ties))
        }
    }
}

/// Active host with the most free cores; ties break uniformly at random.
pub struct WorstFit;

impl PlacementPolicy for WorstFit {
    fn name(&self) -> &'static str {
        "WorstFit"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let (cores, memory) = world.vm_demand(vm);
        let mut most = i64::MIN;
        let mut ties: Vec<HostId> = Vec::new();
        for &h in &world.active {
            let host = &world.hosts[h.0];
            if !host.has_capacity_for(cores, memory) {
                continue;
            }
            let free = host.free_cores();
            if free > most {
                most = free;
                ties.clear();
                ties.push(h);
            } else if free == most {
                ties.push(h);
            }
        }

        if ties.is_empty() {
            Ok(world.pick_empty_host(vm))
        } else {
            Ok(world.pick_random(&ties))
        }
    }
}

/// Uniformly random active host with capacity.
pub struct RandomActive;

impl PlacementPolicy for RandomActive {
    fn name(&self) -> &'static str {
        "Random"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let (cores, memory) = world.vm_demand(vm);
        let eligible: Vec<HostId> = world
            .active
            .iter()
            .copied()
            .filter(|&h| world.hosts[h.0].has_capacity_for(cores, memory))
            .collect();

        if eligible.is_empty() {
            Ok(world.pick_empty_host(vm))
        } else {
            Ok(world.pick_random(&eligible))
        }
    }
}
