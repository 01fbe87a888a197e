//! Shared simulation state and the placement framework helpers.
//!
//! `World` owns the three entity arenas and the active/inactive host lists,
//! performs the full create/delete state transition of a VM on a host
//! (co-residency visibility, malicious periods, tick accounting), and
//! exposes the helpers policies build on: random selection, empty-host
//! lookup and host activation with host-tick bookkeeping.

use num_bigint::BigInt;
use num_traits::Zero;
use rand::rngs::StdRng;
use rand::Rng;

use bigdecimal::BigDecimal;
use coresim_core::ticks::{ratio_or_one, ticks};
use coresim_core::{Host, HostId, Result, SimConfig, SimError, SimTime, Subscription, Trace, Vm, VmId};

/// Global mutable simulation state.
///
/// Entities refer to each other through arena indices; nothing is freed
/// before the run ends. The placement PRNG is owned here so every random
/// draw policies make goes through one deterministic stream.
pub struct World {
    pub hosts: Vec<Host>,
    pub vms: Vec<Vm>,
    pub subs: Vec<Subscription>,

    /// Currently booted hosts, in activation order.
    pub active: Vec<HostId>,
    /// Hosts without power, in deactivation order (initially index order).
    pub inactive: Vec<HostId>,

    /// Simulation clock; advanced by the engine before each event.
    pub time: SimTime,

    rng: StdRng,
    start_time: SimTime,
    malicious_sets: usize,

    // Host-tick accounting: cumulative active-host-seconds plus the
    // per-interval mirror with its own baseline.
    host_ticks: BigInt,
    last_host_event: SimTime,
    interval_host_ticks: BigInt,
    interval_last_host_event: SimTime,

    pub hosts_booted: u64,
    pub hosts_shut_down: u64,
    pub interval_hosts_booted: u64,
    pub interval_hosts_shut_down: u64,

    pub max_hosts_active: usize,
    pub interval_max_hosts: usize,
    pub interval_min_hosts: usize,
}

impl World {
    /// Build the world from a parsed trace. No hosts are active yet; the
    /// policy factory performs initial activation.
    pub fn new(trace: Trace, cfg: &SimConfig, rng: StdRng) -> Self {
        let hosts: Vec<Host> = (0..cfg.num_hosts)
            .map(|i| Host::new(i, cfg.cores_per_host, cfg.memory_per_host, cfg.malicious_sets()))
            .collect();
        let inactive: Vec<HostId> = (0..cfg.num_hosts).map(HostId).collect();

        World {
            hosts,
            vms: trace.vms,
            subs: trace.subs,
            active: Vec::new(),
            inactive,
            time: cfg.min_time,
            rng,
            start_time: cfg.min_time,
            malicious_sets: cfg.malicious_sets(),
            host_ticks: BigInt::zero(),
            last_host_event: cfg.min_time,
            interval_host_ticks: BigInt::zero(),
            interval_last_host_event: cfg.min_time,
            hosts_booted: 0,
            hosts_shut_down: 0,
            interval_hosts_booted: 0,
            interval_hosts_shut_down: 0,
            max_hosts_active: 0,
            interval_max_hosts: 0,
            interval_min_hosts: 0,
        }
    }

    pub fn malicious_sets(&self) -> usize {
        self.malicious_sets
    }

    pub fn start_time(&self) -> SimTime {
        self.start_time
    }

    pub fn running_hosts(&self) -> usize {
        self.active.len()
    }

    /// Resource demand of a VM.
    pub fn vm_demand(&self, vm: VmId) -> (i64, f64) {
        let vm = &self.vms[vm.0];
        (vm.cores, vm.memory)
    }

    pub fn vm_is_malicious(&self, vm: VmId, mal_set: usize) -> bool {
        self.subs[self.vms[vm.0].subscription.0].malicious[mal_set]
    }

    pub fn host_has_capacity(&self, host: HostId, vm: VmId) -> bool {
        let (cores, memory) = self.vm_demand(vm);
        self.hosts[host.0].has_capacity_for(cores, memory)
    }

    /// Uniform draw from a non-empty collection of hosts.
    pub fn pick_random(&mut self, hosts: &[HostId]) -> Option<HostId> {
        if hosts.is_empty() {
            None
        } else {
            Some(hosts[self.rng.gen_range(0..hosts.len())])
        }
    }

    /// Uniform integer in `[0, bound)`.
    pub fn rand_below(&mut self, bound: usize) -> usize {
        self.rng.gen_range(0..bound)
    }

    /// Uniformly random inactive host with capacity for the VM.
    pub fn pick_empty_host(&mut self, vm: VmId) -> Option<HostId> {
        let (cores, memory) = self.vm_demand(vm);
        let eligible: Vec<HostId> = self
            .inactive
            .iter()
            .copied()
            .filter(|h| self.hosts[h.0].has_capacity_for(cores, memory))
            .collect();
        self.pick_random(&eligible)
    }

    /// Boot a uniformly random inactive host at the current time.
    pub fn activate_random_host(&mut self) -> Option<HostId> {
        if self.inactive.is_empty() {
            return None;
        }
        let host = self.inactive[self.rng.gen_range(0..self.inactive.len())];
        self.activate_host(host, self.time);
        Some(host)
    }

    /// Boot `count` random inactive hosts; stops early when none are left.
    pub fn activate_random_hosts(&mut self, count: usize) {
        for _ in 0..count {
            if self.activate_random_host().is_none() {
                break;
            }
        }
    }

    /// Boot a host, closing out the running-host tick accumulators at
    /// `time`. A second activation of an already-active host is a no-op.
    pub fn activate_host(&mut self, host: HostId, time: SimTime) {
        if self.hosts[host.0].is_active() {
            return;
        }

        let running = self.active.len() as i64;
        self.host_ticks += ticks(time - self.last_host_event, running);
        self.interval_host_ticks += ticks(time - self.interval_last_host_event, running);
        self.hosts_booted += 1;
        self.interval_hosts_booted += 1;

        self.hosts[host.0].boot(time);
        if let Some(pos) = self.inactive.iter().position(|&h| h == host) {
            self.inactive.remove(pos);
        }
        self.active.push(host);

        let running = self.active.len();
        if running > self.max_hosts_active {
            self.max_hosts_active = running;
        }
        if running > self.interval_max_hosts {
            self.interval_max_hosts = running;
        }

        self.last_host_event = time;
        self.interval_last_host_event = time;
    }

    /// Shut a host down, closing out the running-host tick accumulators at
    /// `time`. Shutting down an inactive host is a no-op; shutting down a
    /// host with VMs is an error.
    pub fn deactivate_host(&mut self, host: HostId, time: SimTime) -> Result<()> {
        if !self.hosts[host.0].is_active() {
            return Ok(());
        }

        let running = self.active.len() as i64;
        self.host_ticks += ticks(time - self.last_host_event, running);
        self.interval_host_ticks += ticks(time - self.interval_last_host_event, running);
        self.hosts_shut_down += 1;
        self.interval_hosts_shut_down += 1;

        self.hosts[host.0].shutdown(time)?;
        if let Some(pos) = self.active.iter().position(|&h| h == host) {
            self.active.remove(pos);
        }
        self.inactive.push(host);

        let running = self.active.len();
        if running < self.interval_min_hosts {
            self.interval_min_hosts = running;
        }

        self.last_host_event = time;
        self.interval_last_host_event = time;
        Ok(())
    }

    /// Shut down up to `count` currently empty active hosts, in activation
    /// order. Returns the hosts that were shut down.
    pub fn deactivate_empty_hosts(&mut self, count: usize) -> Result<Vec<HostId>> {
        let mut victims = Vec::new();
        for &h in &self.active {
            if self.hosts[h.0].current_vms.is_empty() {
                victims.push(h);
                if victims.len() == count {
                    break;
                }
            }
        }
        for &h in &victims {
            self.deactivate_host(h, self.time)?;
        }
        Ok(victims)
    }

    /// Place a VM on a host at the current time: record mutual visibility
    /// with every tenant already present, update malicious-period state and
    /// the host's capacity and tick accumulators.
    pub fn place_vm(&mut self, vm_id: VmId, host_id: HostId) -> Result<()> {
        let time = self.time;
        let (vm_cores, vm_memory, sub_id) = {
            let vm = &self.vms[vm_id.0];
            (vm.cores, vm.memory, vm.subscription)
        };

        if !self.hosts[host_id.0].has_capacity_for(vm_cores, vm_memory) {
            return Err(SimError::HostOverCommitted {
                host: self.hosts[host_id.0].number,
                vm: self.vms[vm_id.0].id.clone(),
            });
        }

        {
            let vm = &mut self.vms[vm_id.0];
            vm.current_host = Some(host_id);
            if vm.first_host.is_none() {
                vm.first_host = Some(host_id);
            }
        }

        // Every tenant already on the host and the arriving tenant now have
        // seen each other; exposure flags flip where the peer is malicious.
        let resident: Vec<VmId> = self.hosts[host_id.0].current_vms.clone();
        for &other_vm in &resident {
            let other_sub = self.vms[other_vm.0].subscription;
            if other_sub == sub_id {
                continue;
            }
            let my_labels = self.subs[sub_id.0].malicious.clone();
            let their_labels = self.subs[other_sub.0].malicious.clone();
            self.subs[other_sub.0].add_seen(sub_id, &my_labels);
            self.subs[sub_id.0].add_seen(other_sub, &their_labels);
            self.subs[other_sub.0].coresident_added(sub_id, time);
            self.subs[sub_id.0].coresident_added(other_sub, time);
        }

        {
            let host = &mut self.hosts[host_id.0];
            host.subs_hosted.insert(sub_id);
            *host.sub_vms_hosted.entry(sub_id).or_insert(0) += 1;
            host.current_vms.push(vm_id);
            host.all_vms.push(vm_id);
        }

        for ms in 0..self.malicious_sets {
            let had_malicious = self.hosts[host_id.0].has_malicious_vm(ms);
            if had_malicious {
                self.vms[vm_id.0].was_colocated_with_malicious[ms] = true;
            }
            if self.subs[sub_id.0].malicious[ms] {
                if !had_malicious {
                    self.hosts[host_id.0].malicious_periods[ms].open(time);
                    // Everyone already here is retroactively exposed; the
                    // arriving VM does not expose itself.
                    for &other_vm in &resident {
                        self.vms[other_vm.0].was_colocated_with_malicious[ms] = true;
                    }
                }
                self.hosts[host_id.0].current_malicious_vms[ms] += 1;
            }
        }

        {
            let host = &mut self.hosts[host_id.0];
            host.flush_busy_ticks(time)?;
            host.cores_busy += vm_cores;
            host.memory_used += vm_memory;
        }

        self.subs[sub_id.0].note_vm_created(vm_id, time);
        Ok(())
    }

    /// Remove a VM from its host at the current time, closing any malicious
    /// period it was the last contributor to. Returns the host and whether
    /// it is now empty.
    pub fn remove_vm(&mut self, vm_id: VmId) -> Result<(HostId, bool)> {
        let time = self.time;
        let (vm_cores, vm_memory, sub_id, host_id) = {
            let vm = &self.vms[vm_id.0];
            let host = vm
                .current_host
                .ok_or_else(|| SimError::VmNotPlaced(vm.id.clone()))?;
            (vm.cores, vm.memory, vm.subscription, host)
        };

        {
            let host = &mut self.hosts[host_id.0];
            if let Some(pos) = host.current_vms.iter().position(|&v| v == vm_id) {
                host.current_vms.remove(pos);
            }
        }
        self.vms[vm_id.0].current_host = None;

        for ms in 0..self.malicious_sets {
            if self.subs[sub_id.0].malicious[ms] {
                let host = &mut self.hosts[host_id.0];
                host.current_malicious_vms[ms] -= 1;
                if host.current_malicious_vms[ms] == 0 {
                    host.malicious_periods[ms].close(time);
                }
            }
        }

        let resident: Vec<VmId> = self.hosts[host_id.0].current_vms.clone();
        for &other_vm in &resident {
            let other_sub = self.vms[other_vm.0].subscription;
            if other_sub == sub_id {
                continue;
            }
            self.subs[other_sub.0].coresident_removed(sub_id, time);
            self.subs[sub_id.0].coresident_removed(other_sub, time);
        }

        {
            let host = &mut self.hosts[host_id.0];
            if let Some(count) = host.sub_vms_hosted.get_mut(&sub_id) {
                *count -= 1;
                if *count == 0 {
                    host.sub_vms_hosted.remove(&sub_id);
                }
            }
            host.flush_busy_ticks(time)?;
            host.cores_busy -= vm_cores;
            host.memory_used -= vm_memory;
        }

        self.subs[sub_id.0].note_vm_deleted(vm_id, time);
        let empty = self.hosts[host_id.0].current_vms.is_empty();
        Ok((host_id, empty))
    }

    /// Cluster-wide core utilisation up to `time`: busy-core ticks over
    /// total-core ticks, extrapolated on active hosts. 1 when no host has
    /// ever been active.
    pub fn core_utilisation_at(&self, time: SimTime) -> BigDecimal {
        let mut busy = BigInt::zero();
        let mut total = BigInt::zero();
        for h in &self.hosts {
            busy += h.busy_core_ticks_at(time);
            total += h.total_core_ticks_at(time);
        }
        ratio_or_one(&busy, &total)
    }

    /// Core utilisation of the window ending at `time`, resetting every
    /// host's per-interval accumulators. `last_interval` is the previous
    /// statistics boundary.
    pub fn interval_core_utilisation(&mut self, time: SimTime, last_interval: SimTime) -> BigDecimal {
        let mut busy = BigInt::zero();
        let mut total = BigInt::zero();
        for h in &mut self.hosts {
            busy += h.take_interval_busy_core_ticks(time);
            total += h.take_interval_total_core_ticks(time, last_interval);
        }
        ratio_or_one(&busy, &total)
    }

    /// Close the per-interval running-host ticks at a statistics boundary
    /// and return them, resetting the window.
    pub fn take_interval_host_ticks(&mut self, boundary: SimTime) -> BigInt {
        let running = self.active.len() as i64;
        self.interval_host_ticks += ticks(boundary - self.interval_last_host_event, running);
        self.interval_last_host_event = boundary;
        std::mem::take(&mut self.interval_host_ticks)
    }

    /// Bring the lifetime running-host ticks up to the current time and
    /// return a reference to them.
    pub fn flush_host_ticks(&mut self) -> &BigInt {
        let running = self.active.len() as i64;
        self.host_ticks += ticks(self.time - self.last_host_event, running);
        self.last_host_event = self.time;
        &self.host_ticks
    }
}
