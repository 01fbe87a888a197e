//! The PSSF strategies of Han et al.

use coresim_core::{HostId, Result, SimConfig, SimError, VmId};

use crate::policy::PlacementPolicy;
use crate::world::World;

/// Previously-selected-server-first placement over fixed host groups.
///
/// Hosts are partitioned into groups of `group_size`; groups are switched on
/// and off as a whole. A new VM prefers (1) hosts in active groups already
/// hosting its subscription with fewer than `n_star` of its VMs, then
/// (2) the lowest-numbered group containing a host that has never seen the
/// subscription, placing on that group's most-free host, then (3) the next
/// inactive group.
///
/// `keep_on = false` additionally shuts every emptied host down (the paper's
/// baseline assumption); `keep_on = true` keeps hosts of an active group up
/// until the whole group drains.
pub struct HanPssf {
    keep_on: bool,
    n_star: u32,
    group_size: usize,
    group_active: Vec<bool>,
    group_non_empty: Vec<u32>,
}

impl HanPssf {
    pub fn new(world: &mut World, cfg: &SimConfig, keep_on: bool) -> Result<Self> {
        // The shared `active_hosts` knob is the group size here; no random
        // initial activation takes place.
        let group_size = cfg.active_hosts;
        if group_size == 0 {
            return Err(SimError::config(
                "the Han strategies use active_hosts as their group size; it must be positive",
            ));
        }
        let groups = cfg.num_hosts / group_size;
        if groups == 0 {
            return Err(SimError::config("fewer hosts than one Han group"));
        }

        let mut policy = HanPssf {
            keep_on,
            n_star: cfg.n_star,
            group_size,
            group_active: vec![false; groups],
            group_non_empty: vec![0; groups],
        };
        policy.activate_group(world, 0);
        Ok(policy)
    }

    fn group_of(&self, host: HostId) -> usize {
        host.0 / self.group_size
    }

    fn group_range(&self, group: usize) -> std::ops::Range<usize> {
        group * self.group_size..(group + 1) * self.group_size
    }

    /// Mark a group active. With `keep_on` the whole group boots at once;
    /// otherwise hosts boot lazily as placements reach them.
    fn activate_group(&mut self, world: &mut World, group: usize) {
        if self.keep_on {
            for i in self.group_range(group) {
                world.activate_host(HostId(i), world.time);
            }
        }
        self.group_active[group] = true;
    }
}

impl PlacementPolicy for HanPssf {
    fn name(&self) -> &'static str {
        if self.keep_on {
            "HanKeepOn"
        } else {
            "Han"
        }
    }

    fn wants_hosts_seen_stats(&self) -> bool {
        true
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let sub = world.vms[vm.0].subscription;
        let (cores, memory) = world.vm_demand(vm);

        // Previously-selected servers still under the per-host cap, and
        // hosts that have never hosted this subscription.
        let mut pss: Vec<HostId> = Vec::new();
        let mut npss: Vec<HostId> = Vec::new();
        for group in 0..self.group_active.len() {
            if !self.group_active[group] {
                continue;
            }
            for i in self.group_range(group) {
                let host = &world.hosts[i];
                if !host.has_capacity_for(cores, memory) {
                    continue;
                }
                if host.has_hosted_subscription(sub) {
                    if host.current_vms_of(sub) < self.n_star {
                        pss.push(HostId(i));
                    }
                } else {
                    npss.push(HostId(i));
                }
            }
        }

        if !pss.is_empty() {
            return Ok(world.pick_random(&pss));
        }

        if let Some(lowest) = npss.iter().map(|h| h.0).min() {
            // Place within the lowest-numbered candidate group, on its
            // most-free host.
            let group = lowest / self.group_size;
            let mut most = i64::MIN;
            let mut ties: Vec<HostId> = Vec::new();
            for i in self.group_range(group) {
                let free = world.hosts[i].free_cores();
                if free > most {
                    most = free;
                    ties.clear();
                    ties.push(HostId(i));
                } else if free == most {
                    ties.push(HostId(i));
                }
            }
            return Ok(world.pick_random(&ties));
        }

        // Every host in every active group is out of capacity: bring up the
        // next inactive group.
        for group in 0..self.group_active.len() {
            if !self.group_active[group] {
                self.activate_group(world, group);
                let hosts: Vec<HostId> = self.group_range(group).map(HostId).collect();
                return Ok(world.pick_random(&hosts));
            }
        }

        Ok(None)
    }

    fn after_place(&mut self, world: &mut World, _vm: VmId, host: HostId) -> Result<()> {
        if world.hosts[host.0].current_vms.len() == 1 {
            let group = self.group_of(host);
            self.group_non_empty[group] += 1;
        }
        Ok(())
    }

    fn remove(&mut self, world: &mut World, vm: VmId) -> Result<()> {
        let (host, empty) = world.remove_vm(vm)?;
        if !empty {
            return Ok(());
        }

        if !self.keep_on {
            world.deactivate_host(host, world.time)?;
        }

        let group = self.group_of(host);
        self.group_non_empty[group] -= 1;
        if self.group_non_empty[group] == 0 {
            // Last tenant left the group: switch the whole group off.
            for i in self.group_range(group) {
                world.deactivate_host(HostId(i), world.time)?;
            }
            self.group_active[group] = false;
        }
        Ok(())
    }
}
