//! Physical host state.
//!
//! A host is either inactive (never booted, or shut down) or active. While
//! active it accounts busy-core and total-core ticks, both for the whole run
//! and for the current statistics interval, and tracks per-malicious-set
//! "malicious periods": maximal wall-clock intervals during which at least
//! one malicious VM was present.

use std::collections::{BTreeMap, HashSet};

use num_bigint::BigInt;
use num_traits::Zero;

use crate::error::{Result, SimError};
use crate::ticks::ticks;
use crate::types::{SimTime, SubId, VmId};

/// Per-malicious-set list of malicious periods.
///
/// Starts and ends are parallel vectors; an open period (host currently has
/// a malicious VM) has a start without a matching end and reads as ending at
/// `SimTime::MAX`.
#[derive(Debug, Clone, Default)]
pub struct MaliciousPeriods {
    starts: Vec<SimTime>,
    ends: Vec<SimTime>,
}

impl MaliciousPeriods {
    pub fn open(&mut self, start: SimTime) {
        debug_assert!(self.starts.len() == self.ends.len());
        self.starts.push(start);
    }

    pub fn close(&mut self, end: SimTime) {
        debug_assert!(self.starts.len() == self.ends.len() + 1);
        self.ends.push(end);
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The `index`-th period; an open period ends at `SimTime::MAX`.
    pub fn get(&self, index: usize) -> Option<(SimTime, SimTime)> {
        let start = *self.starts.get(index)?;
        let end = self.ends.get(index).copied().unwrap_or(SimTime::MAX);
        Some((start, end))
    }

    pub fn iter(&self) -> impl Iterator<Item = (SimTime, SimTime)> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }
}

/// One physical host in the simulated data center.
#[derive(Debug, Clone)]
pub struct Host {
    /// Primary identity; equality on hosts is equality of this number.
    pub number: usize,
    pub cores: i64,
    pub memory: f64,

    /// VMs currently placed here, in placement order.
    pub current_vms: Vec<VmId>,
    /// Every VM ever placed here, in placement order.
    pub all_vms: Vec<VmId>,

    /// Count of currently hosted malicious VMs, per malicious set.
    pub current_malicious_vms: Vec<u32>,
    pub malicious_periods: Vec<MaliciousPeriods>,

    /// Subscriptions ever hosted (never pruned).
    pub subs_hosted: HashSet<SubId>,
    /// Currently hosted subscription -> number of its VMs here.
    pub sub_vms_hosted: BTreeMap<SubId, u32>,

    pub cores_busy: i64,
    pub memory_used: f64,

    busy_core_ticks: BigInt,
    total_core_ticks: BigInt,
    last_event: SimTime,

    interval_busy_core_ticks: BigInt,
    last_interval_event: SimTime,
    interval_total_core_ticks: BigInt,
    /// Start of the current statistics window, for total-tick accounting of
    /// hosts that were already up when the window began.
    last_interval_total_baseline: SimTime,

    booted: Option<SimTime>,
    pub number_of_boots: u32,
}

impl Host {
    pub fn new(number: usize, cores: i64, memory: f64, malicious_sets: usize) -> Self {
        Host {
            number,
            cores,
            memory,
            current_vms: Vec::new(),
            all_vms: Vec::new(),
            current_malicious_vms: vec![0; malicious_sets],
            malicious_periods: vec![MaliciousPeriods::default(); malicious_sets],
            subs_hosted: HashSet::new(),
            sub_vms_hosted: BTreeMap::new(),
            cores_busy: 0,
            memory_used: 0.0,
            busy_core_ticks: BigInt::zero(),
            total_core_ticks: BigInt::zero(),
            last_event: 0,
            interval_busy_core_ticks: BigInt::zero(),
            last_interval_event: 0,
            interval_total_core_ticks: BigInt::zero(),
            last_interval_total_baseline: 0,
            booted: None,
            number_of_boots: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.booted.is_some()
    }

    pub fn free_cores(&self) -> i64 {
        self.cores - self.cores_busy
    }

    pub fn free_memory(&self) -> f64 {
        self.memory - self.memory_used
    }

    pub fn has_capacity_for(&self, cores: i64, memory: f64) -> bool {
        self.free_cores() >= cores && self.free_memory() >= memory
    }

    /// Boot the host. Returns false if it was already active.
    pub fn boot(&mut self, time: SimTime) -> bool {
        if self.booted.is_some() {
            return false;
        }
        self.booted = Some(time);
        if self.number_of_boots == 0 {
            self.last_interval_total_baseline = time;
        }
        self.number_of_boots += 1;
        true
    }

    /// Shut the host down, closing out its total-core-tick accumulators.
    ///
    /// Only permitted on an empty active host.
    pub fn shutdown(&mut self, time: SimTime) -> Result<()> {
        let booted = match self.booted {
            Some(b) => b,
            None => return Ok(()), // already inactive
        };
        if time < booted {
            return Err(SimError::EventsOutOfOrder {
                host: self.number,
                time,
                last: booted,
            });
        }
        if !self.current_vms.is_empty() {
            return Err(SimError::ShutdownWithVms { host: self.number });
        }

        self.total_core_ticks += ticks(time - booted, self.cores);

        // The interval window may have started after boot; only count the
        // part of the uptime that falls inside the current window.
        let interval_diff = if booted < self.last_interval_total_baseline {
            time - self.last_interval_total_baseline
        } else {
            time - booted
        };
        self.interval_total_core_ticks += ticks(interval_diff, self.cores);

        self.booted = None;
        Ok(())
    }

    /// Close out busy-core ticks since the last event at the current
    /// `cores_busy` and advance the event clock. Must be called before the
    /// busy-core count changes.
    pub fn flush_busy_ticks(&mut self, time: SimTime) -> Result<()> {
        if time < self.last_event {
            return Err(SimError::EventsOutOfOrder {
                host: self.number,
                time,
                last: self.last_event,
            });
        }
        if time > self.last_event {
            self.busy_core_ticks += ticks(time - self.last_event, self.cores_busy);
            self.last_event = time;
        }
        if time > self.last_interval_event {
            self.interval_busy_core_ticks += ticks(time - self.last_interval_event, self.cores_busy);
            self.last_interval_event = time;
        }
        // time == last_event needs no accounting: no time has passed.
        Ok(())
    }

    pub fn has_malicious_vm(&self, mal_set: usize) -> bool {
        self.current_malicious_vms[mal_set] > 0
    }

    pub fn has_hosted_malicious_subscription(&self, mal_set: usize) -> bool {
        !self.malicious_periods[mal_set].is_empty()
    }

    pub fn has_hosted_subscription(&self, sub: SubId) -> bool {
        self.subs_hosted.contains(&sub)
    }

    /// Currently hosted subscriptions, in id order.
    pub fn current_subscriptions(&self) -> impl Iterator<Item = SubId> + '_ {
        self.sub_vms_hosted.keys().copied()
    }

    /// Number of VMs of `sub` currently placed here.
    pub fn current_vms_of(&self, sub: SubId) -> u32 {
        self.sub_vms_hosted.get(&sub).copied().unwrap_or(0)
    }

    /// Busy-core ticks up to `time`, extrapolating from the last event if
    /// the host is active.
    pub fn busy_core_ticks_at(&self, time: SimTime) -> BigInt {
        if self.is_active() {
            &self.busy_core_ticks + ticks(time - self.last_event, self.cores_busy)
        } else {
            self.busy_core_ticks.clone()
        }
    }

    /// Total-core ticks up to `time` (full capacity while active).
    pub fn total_core_ticks_at(&self, time: SimTime) -> BigInt {
        match self.booted {
            Some(booted) => &self.total_core_ticks + ticks(time - booted, self.cores),
            None => self.total_core_ticks.clone(),
        }
    }

    /// Read and reset the current interval's busy-core ticks.
    pub fn take_interval_busy_core_ticks(&mut self, time: SimTime) -> BigInt {
        let mut out = std::mem::take(&mut self.interval_busy_core_ticks);
        if self.is_active() {
            out += ticks(time - self.last_interval_event, self.cores_busy);
        }
        self.last_interval_event = time;
        out
    }

    /// Read and reset the current interval's total-core ticks.
    ///
    /// `last_interval` is the previous statistics boundary; a host booted
    /// before it only contributes from the boundary onwards.
    pub fn take_interval_total_core_ticks(&mut self, time: SimTime, last_interval: SimTime) -> BigInt {
        let mut out = std::mem::take(&mut self.interval_total_core_ticks);
        if let Some(booted) = self.booted {
            let diff = if booted < last_interval {
                time - last_interval
            } else {
                time - booted
            };
            out += ticks(diff, self.cores);
        }
        self.last_interval_total_baseline = time;
        out
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "host {} ({}/{} cores, {}/{} GiB memory)",
            self.number, self.cores_busy, self.cores, self.memory_used, self.memory
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_shutdown_cycle() {
        let mut h = Host::new(0, 32, 224.0, 1);
        assert!(!h.is_active());

        assert!(h.boot(100));
        assert!(h.is_active());
        assert_eq!(h.number_of_boots, 1);
        assert!(!h.boot(150), "second boot must be refused");

        h.shutdown(200).unwrap();
        assert!(!h.is_active());
        assert_eq!(h.total_core_ticks_at(500), BigInt::from(100 * 32));
    }

    #[test]
    fn test_shutdown_refused_with_vms() {
        let mut h = Host::new(0, 4, 8.0, 1);
        h.boot(0);
        h.current_vms.push(VmId(0));
        assert!(matches!(
            h.shutdown(10),
            Err(SimError::ShutdownWithVms { host: 0 })
        ));
    }

    #[test]
    fn test_busy_ticks_flush() {
        let mut h = Host::new(3, 8, 16.0, 1);
        h.boot(0);

        h.flush_busy_ticks(10).unwrap();
        h.cores_busy = 2;
        h.flush_busy_ticks(25).unwrap();
        // 15 seconds at 2 busy cores
        assert_eq!(h.busy_core_ticks_at(25), BigInt::from(30));

        // extrapolation from the last event
        assert_eq!(h.busy_core_ticks_at(30), BigInt::from(40));

        assert!(matches!(
            h.flush_busy_ticks(5),
            Err(SimError::EventsOutOfOrder { .. })
        ));
    }

    #[test]
    fn test_interval_total_ticks_baseline() {
        let mut h = Host::new(1, 10, 100.0, 1);
        h.boot(0);

        // window [50, 100): host was up the whole window
        let t = h.take_interval_total_core_ticks(50, 0);
        assert_eq!(t, BigInt::from(50 * 10));
        let t = h.take_interval_total_core_ticks(100, 50);
        assert_eq!(t, BigInt::from(50 * 10));
    }

    #[test]
    fn test_malicious_periods_open_end() {
        let mut p = MaliciousPeriods::default();
        p.open(5);
        assert_eq!(p.get(0), Some((5, SimTime::MAX)));
        p.close(9);
        assert_eq!(p.get(0), Some((5, 9)));
        assert_eq!(p.len(), 1);
    }
}
