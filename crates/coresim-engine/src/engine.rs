//! The discrete-event loop.
//!
//! Drains the creation and deletion streams in timestamp order (creations
//! win ties: the trace contains instantly-deleted VMs, and creating first
//! avoids underestimating load), firing interval statistics whenever the
//! clock passes a boundary. Multiple boundaries may fire between two events
//! when the trace goes quiet.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;
use tracing::debug;

use coresim_core::ticks::{one, ratio, ticks, zero};
use coresim_core::{Result, SimConfig, SimTime, VmId};

use crate::metrics;
use crate::policy::PlacementPolicy;
use crate::world::World;

/// Per-interval statistic series, one value per fired boundary.
///
/// Values are kept pre-formatted; report writers join them with `;`.
#[derive(Debug)]
pub struct IntervalSeries {
    pub core_utilisation: Vec<String>,
    pub interval_core_utilisation: Vec<String>,
    /// Indexed by malicious set, then boundary.
    pub user_clr: Vec<Vec<String>>,
    pub vm_clr: Vec<Vec<String>>,
    pub new_vm_clr: Vec<Vec<String>>,
    pub unsafe_sub_vm_clr: Vec<Vec<String>>,
    pub unsafe_sub_new_vm_clr: Vec<Vec<String>>,
    pub coverage: Vec<Vec<String>>,
    pub avg_vms: Vec<String>,
    pub max_vms: Vec<String>,
    pub min_vms: Vec<String>,
    pub avg_hosts: Vec<String>,
    pub max_hosts: Vec<String>,
    pub min_hosts: Vec<String>,
    pub vm_creations: Vec<String>,
    pub vm_deletions: Vec<String>,
    pub hosts_booted: Vec<String>,
    pub hosts_shut_down: Vec<String>,
}

impl IntervalSeries {
    fn new(malicious_sets: usize) -> Self {
        IntervalSeries {
            core_utilisation: Vec::new(),
            interval_core_utilisation: Vec::new(),
            user_clr: vec![Vec::new(); malicious_sets],
            vm_clr: vec![Vec::new(); malicious_sets],
            new_vm_clr: vec![Vec::new(); malicious_sets],
            unsafe_sub_vm_clr: vec![Vec::new(); malicious_sets],
            unsafe_sub_new_vm_clr: vec![Vec::new(); malicious_sets],
            coverage: vec![Vec::new(); malicious_sets],
            avg_vms: Vec::new(),
            max_vms: Vec::new(),
            min_vms: Vec::new(),
            avg_hosts: Vec::new(),
            max_hosts: Vec::new(),
            min_hosts: Vec::new(),
            vm_creations: Vec::new(),
            vm_deletions: Vec::new(),
            hosts_booted: Vec::new(),
            hosts_shut_down: Vec::new(),
        }
    }

    /// Number of boundaries fired so far.
    pub fn len(&self) -> usize {
        self.core_utilisation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.core_utilisation.is_empty()
    }
}

/// Per-malicious-set slice of the end-of-run summary.
#[derive(Debug, Clone)]
pub struct MaliciousSetSummary {
    pub proportion: f64,
    pub user_clr: BigDecimal,
    pub vm_clr: BigDecimal,
    pub unsafe_sub_vm_clr: BigDecimal,
    pub safe_vm_time: BigDecimal,
    pub unsafe_sub_safe_vm_time: BigDecimal,
    pub safe_sub_time: BigDecimal,
    pub total_coverage: BigDecimal,
}

/// End-of-run aggregates for the summary report.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub algorithm: String,
    pub core_utilisation: BigDecimal,
    pub avg_hosts_active: BigDecimal,
    pub max_hosts_active: usize,
    pub hosts_booted: u64,
    pub hosts_shut_down: u64,
    pub vm_creations: usize,
    pub avg_vms_active: BigDecimal,
    pub max_vms_active: i64,
    /// -1 unless the policy asked for subscriptions-seen statistics.
    pub total_sub_known_entries: i64,
    pub avg_subs_known_per_sub: f64,
    /// -1 unless the policy asked for hosts-seen statistics.
    pub total_subs_seen_by_hosts: i64,
    pub avg_subs_seen_per_host: f64,
    pub avg_hosts_seen_per_sub: f64,
    pub vms_with_targets: u64,
    pub vm_targets_hit: u64,
    pub per_set: Vec<MaliciousSetSummary>,
}

/// The simulation engine: entity state plus one placement policy.
pub struct Engine {
    pub world: World,
    policy: Box<dyn PlacementPolicy>,

    stat_interval: i64,
    next_stat: SimTime,
    stats: IntervalSeries,

    vm_ticks: BigInt,
    max_vms_active: i64,
    vms_with_targets: u64,
    vm_targets_hit: u64,
    malicious_proportions: Vec<f64>,
}

impl Engine {
    pub fn new(world: World, policy: Box<dyn PlacementPolicy>, cfg: &SimConfig) -> Self {
        Engine {
            stats: IntervalSeries::new(cfg.malicious_sets()),
            stat_interval: cfg.stat_interval,
            next_stat: cfg.stat_min_time() + cfg.stat_interval,
            world,
            policy,
            vm_ticks: BigInt::zero(),
            max_vms_active: 0,
            vms_with_targets: 0,
            vm_targets_hit: 0,
            malicious_proportions: cfg.malicious_proportions.clone(),
        }
    }

    pub fn series(&self) -> &IntervalSeries {
        &self.stats
    }

    /// Run the simulation over the two pre-sorted event streams.
    ///
    /// `creations` must be sorted by creation time and `deletions` by
    /// deletion time, both stably, so equal timestamps keep trace order.
    pub fn run(&mut self, creations: &[VmId], deletions: &[VmId]) -> Result<()> {
        let mut c = 0usize;
        let mut d = 0usize;

        let mut running: i64 = 0;
        let mut interval_max_vms: i64 = 0;
        let mut interval_min_vms: i64 = 0;
        let mut interval_vm_ticks = BigInt::zero();
        let mut interval_creations: u64 = 0;
        let mut interval_deletions: u64 = 0;
        let mut interval_start_c = 0usize;

        while c < creations.len() || d < deletions.len() {
            // Pick the next event; creation wins on a timestamp tie.
            let take_deletion = match (creations.get(c), deletions.get(d)) {
                (None, Some(_)) => true,
                (Some(&cv), Some(&dv)) => {
                    self.world.vms[dv.0].time_deleted < self.world.vms[cv.0].time_created
                }
                (Some(_), None) => false,
                (None, None) => break,
            };
            let new_time = if take_deletion {
                self.world.vms[deletions[d].0].time_deleted
            } else {
                self.world.vms[creations[c].0].time_created
            };

            // Fire every statistics boundary the clock passes.
            let mut interval_time = self.world.time;
            while new_time > self.next_stat {
                interval_vm_ticks += ticks(self.next_stat - interval_time, running);
                interval_time = self.next_stat;
                self.update_stats(
                    creations,
                    c,
                    interval_start_c,
                    &interval_vm_ticks,
                    interval_max_vms,
                    interval_min_vms,
                    interval_creations,
                    interval_deletions,
                );
                interval_start_c = c;
                interval_vm_ticks = BigInt::zero();
                interval_max_vms = running;
                interval_min_vms = running;
                interval_creations = 0;
                interval_deletions = 0;
            }

            self.vm_ticks += ticks(new_time - self.world.time, running);
            interval_vm_ticks += ticks(new_time - interval_time, running);
            self.world.time = new_time;

            if take_deletion {
                running -= 1;
                if running < interval_min_vms {
                    interval_min_vms = running;
                }
                interval_deletions += 1;

                let vm = deletions[d];
                self.policy.remove(&mut self.world, vm)?;

                d += 1;
                if d % 10_000 == 0 {
                    debug!("processed {d} of {} deletions", deletions.len());
                }
            } else {
                running += 1;
                if running > interval_max_vms {
                    interval_max_vms = running;
                }
                if running > self.max_vms_active {
                    self.max_vms_active = running;
                }
                interval_creations += 1;

                let vm = creations[c];
                self.policy.place(&mut self.world, vm)?;
                self.check_target_hit(vm);

                c += 1;
                if c % 10_000 == 0 {
                    debug!("processed {c} of {} creations", creations.len());
                }
            }
        }

        // One final boundary, extrapolated past the last event.
        interval_vm_ticks += ticks(self.next_stat - self.world.time, running);
        self.update_stats(
            creations,
            c,
            interval_start_c,
            &interval_vm_ticks,
            interval_max_vms,
            interval_min_vms,
            interval_creations,
            interval_deletions,
        );

        Ok(())
    }

    /// Targeted-attack bookkeeping for a just-placed attacker VM: the
    /// attack succeeds when the target VM sits on the chosen host at
    /// placement time.
    fn check_target_hit(&mut self, vm: VmId) {
        if !self.world.vms[vm.0].has_target() {
            return;
        }
        self.vms_with_targets += 1;

        let Some(target) = self.world.vms[vm.0].target_vm else {
            return;
        };
        let Some(host) = self.world.vms[vm.0].current_host else {
            return;
        };
        if self.world.hosts[host.0].current_vms.contains(&target) {
            self.world.vms[vm.0].hit_target = true;
            self.vm_targets_hit += 1;

            let sub = self.world.vms[vm.0].subscription;
            let target_sub = self.world.vms[target.0].subscription;
            self.world.subs[sub.0].record_vm_hit(target);
            self.world.subs[sub.0].record_sub_hit(target_sub);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_stats(
        &mut self,
        creations: &[VmId],
        processed: usize,
        interval_start: usize,
        interval_vm_ticks: &BigInt,
        interval_max_vms: i64,
        interval_min_vms: i64,
        interval_creations: u64,
        interval_deletions: u64,
    ) {
        let boundary = self.next_stat;
        debug!("updating statistics for t={boundary}");

        self.stats
            .core_utilisation
            .push(self.world.core_utilisation_at(boundary).to_string());
        self.stats.interval_core_utilisation.push(
            self.world
                .interval_core_utilisation(boundary, boundary - self.stat_interval)
                .to_string(),
        );

        let processed_slice = &creations[..processed];
        let new_slice = &creations[interval_start..processed];
        for ms in 0..self.malicious_proportions.len() {
            let user = metrics::user_based_clr(
                self.world.subs.iter().filter(|s| s.is_processed()),
                ms,
            );
            self.stats.user_clr[ms].push(user.to_string());

            let (vm_clr, unsafe_sub) = if processed_slice.is_empty() {
                (one(), one())
            } else {
                (
                    metrics::vm_based_clr(&self.world.vms, &self.world.subs, processed_slice, ms),
                    metrics::unsafe_sub_vm_based_clr(&self.world.vms, &self.world.subs, processed_slice, ms),
                )
            };
            self.stats.vm_clr[ms].push(vm_clr.to_string());
            self.stats.unsafe_sub_vm_clr[ms].push(unsafe_sub.to_string());

            let (new_clr, new_unsafe_sub) = if new_slice.is_empty() {
                (one(), one())
            } else {
                (
                    metrics::vm_based_clr(&self.world.vms, &self.world.subs, new_slice, ms),
                    metrics::unsafe_sub_vm_based_clr(&self.world.vms, &self.world.subs, new_slice, ms),
                )
            };
            self.stats.new_vm_clr[ms].push(new_clr.to_string());
            self.stats.unsafe_sub_new_vm_clr[ms].push(new_unsafe_sub.to_string());

            let coverage = self.interval_coverage(ms);
            self.stats.coverage[ms].push(coverage.to_string());
        }

        self.stats
            .avg_vms
            .push(ratio(interval_vm_ticks, &BigInt::from(self.stat_interval)).to_string());
        self.stats.max_vms.push(interval_max_vms.to_string());
        self.stats.min_vms.push(interval_min_vms.to_string());

        self.stats.max_hosts.push(self.world.interval_max_hosts.to_string());
        self.world.interval_max_hosts = self.world.running_hosts();
        self.stats.min_hosts.push(self.world.interval_min_hosts.to_string());
        self.world.interval_min_hosts = self.world.running_hosts();

        let interval_host_ticks = self.world.take_interval_host_ticks(boundary);
        self.stats
            .avg_hosts
            .push(ratio(&interval_host_ticks, &BigInt::from(self.stat_interval)).to_string());

        self.stats.vm_creations.push(interval_creations.to_string());
        self.stats.vm_deletions.push(interval_deletions.to_string());

        self.stats
            .hosts_booted
            .push(self.world.interval_hosts_booted.to_string());
        self.world.interval_hosts_booted = 0;
        self.stats
            .hosts_shut_down
            .push(self.world.interval_hosts_shut_down.to_string());
        self.world.interval_hosts_shut_down = 0;

        self.next_stat += self.stat_interval;
    }

    /// Share of currently running hosts that host a malicious VM of
    /// `mal_set` right now.
    fn interval_coverage(&self, mal_set: usize) -> BigDecimal {
        let running = self.world.running_hosts();
        if running == 0 {
            return zero();
        }
        let at_danger = self
            .world
            .active
            .iter()
            .filter(|h| self.world.hosts[h.0].has_malicious_vm(mal_set))
            .count();
        coresim_core::ticks::count_ratio(at_danger as i64, running as i64)
    }

    /// Compute the end-of-run summary. Call after [`run`](Self::run).
    pub fn summary(&mut self, creations: &[VmId]) -> RunSummary {
        let elapsed = self.world.time - self.world.start_time();
        let elapsed_big = BigInt::from(elapsed);

        let avg_vms_active = if elapsed == 0 {
            zero()
        } else {
            ratio(&self.vm_ticks, &elapsed_big)
        };
        let host_ticks = self.world.flush_host_ticks().clone();
        let avg_hosts_active = if elapsed == 0 {
            zero()
        } else {
            ratio(&host_ticks, &elapsed_big)
        };

        let core_utilisation = self.world.core_utilisation_at(self.world.time);

        let mut per_set = Vec::with_capacity(self.malicious_proportions.len());
        for (ms, &proportion) in self.malicious_proportions.iter().enumerate() {
            let (safe_vm_time, unsafe_sub_safe_vm_time) = metrics::safe_vm_time_proportion(
                &self.world.vms,
                &self.world.subs,
                &self.world.hosts,
                creations,
                ms,
            );
            per_set.push(MaliciousSetSummary {
                proportion,
                user_clr: metrics::user_based_clr(self.world.subs.iter(), ms),
                vm_clr: metrics::vm_based_clr(&self.world.vms, &self.world.subs, creations, ms),
                unsafe_sub_vm_clr: metrics::unsafe_sub_vm_based_clr(
                    &self.world.vms,
                    &self.world.subs,
                    creations,
                    ms,
                ),
                safe_vm_time,
                unsafe_sub_safe_vm_time,
                safe_sub_time: metrics::safe_subscription_time_proportion(
                    &self.world.subs,
                    &self.world.vms,
                    &self.world.hosts,
                    ms,
                ),
                total_coverage: metrics::total_coverage(&self.world.hosts, ms),
            });
        }

        let mut total_sub_known_entries: i64 = -1;
        let mut avg_subs_known_per_sub: f64 = -1.0;
        let processed = self.world.subs.iter().filter(|s| s.is_processed()).count();
        if self.policy.wants_subs_seen_stats() {
            let total: usize = self
                .world
                .subs
                .iter()
                .filter(|s| s.is_processed())
                .map(|s| s.subscriptions_seen())
                .sum();
            total_sub_known_entries = total as i64;
            avg_subs_known_per_sub = if processed == 0 {
                0.0
            } else {
                total as f64 / processed as f64
            };
        }

        let mut total_subs_seen_by_hosts: i64 = -1;
        let mut avg_subs_seen_per_host: f64 = -1.0;
        let mut avg_hosts_seen_per_sub: f64 = -1.0;
        if self.policy.wants_hosts_seen_stats() {
            let total: usize = self.world.hosts.iter().map(|h| h.subs_hosted.len()).sum();
            total_subs_seen_by_hosts = total as i64;
            avg_subs_seen_per_host = total as f64 / self.world.hosts.len() as f64;
            avg_hosts_seen_per_sub = if processed == 0 {
                0.0
            } else {
                total as f64 / processed as f64
            };
        }

        RunSummary {
            algorithm: self.policy.name().to_string(),
            core_utilisation,
            avg_hosts_active,
            max_hosts_active: self.world.max_hosts_active,
            hosts_booted: self.world.hosts_booted,
            hosts_shut_down: self.world.hosts_shut_down,
            vm_creations: creations.len(),
            avg_vms_active,
            max_vms_active: self.max_vms_active,
            total_sub_known_entries,
            avg_subs_known_per_sub,
            total_subs_seen_by_hosts,
            avg_subs_seen_per_host,
            avg_hosts_seen_per_sub,
            vms_with_targets: self.vms_with_targets,
            vm_targets_hit: self.vm_targets_hit,
            per_set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_series_shape() {
        let s = IntervalSeries::new(2);
        assert!(s.is_empty());
        assert_eq!(s.user_clr.len(), 2);
        assert_eq!(s.coverage.len(), 2);
    }
}
