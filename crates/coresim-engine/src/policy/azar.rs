//! The open-host strategy of Azar et al.

use std::collections::HashSet;

use coresim_core::{HostId, Result, SimConfig, SimError, VmId};

use crate::policy::PlacementPolicy;
use crate::world::World;

/// Keep a fixed-size pool of "open" hosts and place VMs on them at random.
///
/// Azar et al. assume every VM is smaller than half a host, so an open host
/// always has room. Real traces contain larger VMs; those fall back to a
/// capacity-checked draw over the open pool, or to booting a fresh host so
/// the pool does not silently shrink. A host whose remaining capacity drops
/// below the size assumption is moved to a separate full set and replaced
/// by a newly booted host; deletions move it back once it has room again.
pub struct Azar {
    target_open: usize,
    max_cores: i64,
    max_memory: f64,
    /// Open hosts: active hosts still accepting arbitrary standard VMs.
    open: Vec<HostId>,
    full: HashSet<HostId>,
}

impl Azar {
    pub fn new(world: &World, cfg: &SimConfig) -> Result<Self> {
        if cfg.active_hosts == 0 {
            return Err(SimError::config(
                "the Azar strategy needs a positive number of initially active hosts",
            ));
        }
        Ok(Azar {
            target_open: cfg.active_hosts,
            max_cores: cfg.max_cores,
            max_memory: cfg.max_memory,
            open: world.active.clone(),
            full: HashSet::new(),
        })
    }

    fn is_full(&self, world: &World, host: HostId) -> bool {
        let h = &world.hosts[host.0];
        h.free_cores() < self.max_cores || h.free_memory() < self.max_memory
    }

    /// Boot a random inactive host and add it to the open pool.
    fn activate_open(&mut self, world: &mut World) -> Option<HostId> {
        let host = world.activate_random_host()?;
        self.open.push(host);
        Some(host)
    }
}

impl PlacementPolicy for Azar {
    fn name(&self) -> &'static str {
        "Azar"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let (cores, memory) = world.vm_demand(vm);

        if cores <= self.max_cores && memory <= self.max_memory {
            // The standard case: the VM satisfies the size assumption, so
            // every open host can take it.
            if self.open.is_empty() {
                return Ok(self.activate_open(world));
            }
            return Ok(world.pick_random(&self.open));
        }

        // Oversized VM: only some open hosts have room. If too few do, the
        // VM goes to a fresh empty host with a proportional chance so that
        // enough hosts effectively stay open to it.
        let eligible: Vec<HostId> = self
            .open
            .iter()
            .copied()
            .filter(|&h| world.hosts[h.0].has_capacity_for(cores, memory))
            .collect();

        if eligible.is_empty() {
            return Ok(self.activate_open(world));
        }
        if world.rand_below(self.target_open) < eligible.len() || world.inactive.is_empty() {
            Ok(world.pick_random(&eligible))
        } else {
            Ok(self.activate_open(world))
        }
    }

    fn after_place(&mut self, world: &mut World, _vm: VmId, host: HostId) -> Result<()> {
        if self.is_full(world, host) {
            if let Some(pos) = self.open.iter().position(|&h| h == host) {
                self.open.remove(pos);
                self.full.insert(host);
                // Replace the host that just filled up.
                self.activate_open(world);
            }
        }
        Ok(())
    }

    fn remove(&mut self, world: &mut World, vm: VmId) -> Result<()> {
        let host = world.vms[vm.0]
            .current_host
            .ok_or_else(|| SimError::VmNotPlaced(world.vms[vm.0].id.clone()))?;
        let was_full = self.is_full(world, host);

        // Empty hosts stay up here; the pool is trimmed below instead.
        let (host, _empty) = world.remove_vm(vm)?;

        if was_full && !self.is_full(world, host) && self.full.remove(&host) {
            self.open.push(host);
        }

        // A host reverting from full can push the pool over its target; the
        // pool can also still be short if capacity ran out earlier.
        let excess = self.open.len().saturating_sub(self.target_open);
        if excess > 0 {
            for closed in world.deactivate_empty_hosts(excess)? {
                if let Some(pos) = self.open.iter().position(|&h| h == closed) {
                    self.open.remove(pos);
                }
            }
        }
        Ok(())
    }
}
