//! Known-proportion placement strategies.

use coresim_core::{HostId, Result, VmId};

use crate::policy::PlacementPolicy;
use crate::world::World;

/// Prefer hosts where the arriving subscription already knows the largest
/// share of the present tenants.
///
/// `subscription_based` scores a host by known subscriptions over total
/// subscriptions; otherwise the analogous VM-level ratio is used, with an
/// early bail-out once a host has accumulated more unknown VMs than the
/// current best proportion would allow. Hosts with no tenants score nothing
/// and are never candidates.
///
/// With `lowest_avg_seen_for_new_subs`, a best proportion of zero switches
/// to the hosts whose tenants have the smallest average acquaintance count,
/// steering strangers towards quiet company. The surviving candidate set is
/// packed densest-first, ties at random.
pub struct KnownProportion {
    subscription_based: bool,
    lowest_avg_seen_for_new_subs: bool,
}

impl KnownProportion {
    pub fn new(subscription_based: bool, lowest_avg_seen_for_new_subs: bool) -> Self {
        KnownProportion {
            subscription_based,
            lowest_avg_seen_for_new_subs,
        }
    }
}

impl PlacementPolicy for KnownProportion {
    fn name(&self) -> &'static str {
        match (self.subscription_based, self.lowest_avg_seen_for_new_subs) {
            (true, false) => "KU",
            (true, true) => "KU-LAvg",
            (false, false) => "KV",
            (false, true) => "KV-LAvg",
        }
    }

    fn wants_subs_seen_stats(&self) -> bool {
        true
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let sub = world.vms[vm.0].subscription;
        let (cores, memory) = world.vm_demand(vm);

        if world.subs[sub.0].total_vms.is_empty() {
            // New subscription: uniformly random active host with capacity.
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

        let mut best = 0.0_f64;
        let mut candidates: Vec<HostId> = Vec::new();
        for &h in &world.active {
            let host = &world.hosts[h.0];
            if !host.has_capacity_for(cores, memory) || host.current_vms.is_empty() {
                continue;
            }

            let proportion = if self.subscription_based {
                let mut known = 0usize;
                let mut total = 0usize;
                for other in host.current_subscriptions() {
                    total += 1;
                    if world.subs[sub.0].has_seen(other) {
                        known += 1;
                    }
                }
                known as f64 / total as f64
            } else {
                let total = host.current_vms.len();
                // Bail out once the host cannot reach the best proportion
                // seen so far.
                let mut unknown_budget = total as i64 - (best * total as f64) as i64;
                let mut known = 0usize;
                let mut disqualified = false;
                for &v in &host.current_vms {
                    if world.subs[sub.0].has_seen(world.vms[v.0].subscription) {
                        known += 1;
                    } else {
                        unknown_budget -= 1;
                        if unknown_budget < 0 {
                            disqualified = true;
                            break;
                        }
                    }
                }
                if disqualified {
                    continue;
                }
                known as f64 / total as f64
            };

            if proportion > best {
                best = proportion;
                candidates.clear();
                candidates.push(h);
            } else if proportion == best {
                candidates.push(h);
            }
        }

        if self.lowest_avg_seen_for_new_subs && best == 0.0 {
            let pool = std::mem::take(&mut candidates);
            let mut lowest = f64::MAX;
            for &h in &pool {
                let host = &world.hosts[h.0];
                let (sum, n) = if self.subscription_based {
                    host.current_subscriptions().fold((0usize, 0usize), |(s, n), other| {
                        (s + world.subs[other.0].subscriptions_seen(), n + 1)
                    })
                } else {
                    host.current_vms.iter().fold((0usize, 0usize), |(s, n), &v| {
                        (s + world.subs[world.vms[v.0].subscription.0].subscriptions_seen(), n + 1)
                    })
                };
                // n > 0: tenantless hosts were filtered out above.
                let avg = sum as f64 / n as f64;
                if avg < lowest {
                    lowest = avg;
                    candidates.clear();
                    candidates.push(h);
                } else if avg == lowest {
                    candidates.push(h);
                }
            }
        }

        if candidates.is_empty() {
            return Ok(world.pick_empty_host(vm));
        }

        let mut fewest = i64::MAX;
        let mut ties: Vec<HostId> = Vec::new();
        for &h in &candidates {
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
