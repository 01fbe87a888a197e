//! Dedicated-instance placement.

use coresim_core::{HostId, Result, VmId};

use crate::policy::PlacementPolicy;
use crate::world::World;

/// Keep each subscription on hosts of its own.
///
/// Candidates are the hosts currently running only this subscription's VMs;
/// among those with capacity the densest (fewest free cores) wins. With no
/// candidate, an empty inactive host is picked, so tenants never share.
pub struct DedicatedInstance;

impl PlacementPolicy for DedicatedInstance {
    fn name(&self) -> &'static str {
        "DedInst"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let sub = world.vms[vm.0].subscription;
        let (cores, memory) = world.vm_demand(vm);

        // Distinct hosts currently running this subscription's VMs.
        let mut sub_hosts: Vec<HostId> = Vec::new();
        for &v in &world.subs[sub.0].current_vms {
            if let Some(h) = world.vms[v.0].current_host {
                if !sub_hosts.contains(&h) {
                    sub_hosts.push(h);
                }
            }
        }

        let mut fewest = i64::MAX;
        let mut ties: Vec<HostId> = Vec::new();
        for &h in &sub_hosts {
            let host = &world.hosts[h.0];
            if !host.has_capacity_for(cores, memory) {
                continue;
            }
            let dedicated = host
                .current_vms
                .iter()
                .all(|&v| world.vms[v.0].subscription == sub);
            if !dedicated {
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
