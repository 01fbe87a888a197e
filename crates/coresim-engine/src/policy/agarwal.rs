//! The PCUF strategy of Agarwal and Duong.

use coresim_core::{HostId, Result, VmId};

use crate::policy::PlacementPolicy;
use crate::world::World;

/// Previously co-located users first.
///
/// A returning subscription may only join hosts where it has already seen
/// every tenant currently present; among those the densest host (fewest
/// free cores) wins. A brand-new subscription has seen nobody, so it gets a
/// uniformly random active host instead.
pub struct Pcuf;

impl PlacementPolicy for Pcuf {
    fn name(&self) -> &'static str {
        "PCUF"
    }

    fn wants_subs_seen_stats(&self) -> bool {
        true
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let sub = world.vms[vm.0].subscription;
        let (cores, memory) = world.vm_demand(vm);

        if world.subs[sub.0].total_vms.is_empty() {
            // New subscription: no co-location history to respect.
            let eligible: Vec<HostId> = world
                .active
                .iter()
                .copied()
                .filter(|&h| world.hosts[h.0].has_capacity_for(cores, memory))
                .collect();
            if eligible.is_empty() {
                return Ok(world.pick_empty_host(vm));
            }
            return Ok(world.pick_random(&eligible));
        }

        let mut eligible: Vec<HostId> = Vec::new();
        for &h in &world.active {
            let host = &world.hosts[h.0];
            if !host.has_capacity_for(cores, memory) {
                continue;
            }
            let seen_all = host
                .current_vms
                .iter()
                .all(|&v| world.subs[sub.0].has_seen(world.vms[v.0].subscription));
            if seen_all {
                eligible.push(h);
            }
        }

        if eligible.is_empty() {
            return Ok(world.pick_empty_host(vm));
        }

        let mut fewest = i64::MAX;
        let mut ties: Vec<HostId> = Vec::new();
        for &h in &eligible {
            let free = world.hosts[h.0].free_cores();
            if free < fewest {
                fewest = free;
                ties.clear();
                ties.push(h);
            } else if free == fewest {
                ties.push(h);
            }
        }
        Ok(world.pick_random(&ties))
    }
}
