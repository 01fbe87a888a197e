//! Final and interval metric computations over entity state.
//!
//! All ratios are fixed-point decimals (scale 10, half-up); tick sums are
//! arbitrary-precision. Empty denominators yield the conventional safe
//! value: 1 for leakage rates and time proportions, 0 for coverage.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::Zero;

use coresim_core::ticks::{count_ratio, one, ratio_or_one, zero};
use coresim_core::{Host, SimTime, Subscription, Vm, VmId};

/// A sorted list of disjoint half-open time spans, merged on insertion.
///
/// Insertion is a linear scan; adequate for the per-subscription interval
/// counts a trace produces.
#[derive(Debug, Default, Clone)]
pub struct IntervalSet {
    spans: Vec<(SimTime, SimTime)>,
}

impl IntervalSet {
    pub fn insert(&mut self, mut start: SimTime, mut end: SimTime) {
        if end < start {
            return;
        }
        let mut i = 0;
        while i < self.spans.len() && self.spans[i].1 < start {
            i += 1;
        }
        // Absorb every span overlapping or touching the new one.
        while i < self.spans.len() && self.spans[i].0 <= end {
            start = start.min(self.spans[i].0);
            end = end.max(self.spans[i].1);
            self.spans.remove(i);
        }
        self.spans.insert(i, (start, end));
    }

    pub fn total(&self) -> SimTime {
        self.spans.iter().map(|(s, e)| e - s).sum()
    }

    pub fn spans(&self) -> &[(SimTime, SimTime)] {
        &self.spans
    }
}

/// Overlap of a malicious period with a VM lifetime, clipped to the
/// lifetime. Zero when they do not intersect.
fn clipped_overlap(period: (SimTime, SimTime), created: SimTime, deleted: SimTime) -> Option<(SimTime, SimTime)> {
    let start = period.0.max(created);
    let end = period.1.min(deleted);
    (end > start).then_some((start, end))
}

/// User-based CLR: the share of benign subscriptions never exposed to a
/// malicious subscription of set `mal_set`.
pub fn user_based_clr<'a, I>(subs: I, mal_set: usize) -> BigDecimal
where
    I: IntoIterator<Item = &'a Subscription>,
{
    let mut benign: i64 = 0;
    let mut exposed: i64 = 0;
    for sub in subs {
        if !sub.malicious[mal_set] {
            benign += 1;
            if sub.exposed_to_malicious_sub[mal_set] {
                exposed += 1;
            }
        }
    }
    if benign == 0 {
        one()
    } else {
        count_ratio(benign - exposed, benign)
    }
}

/// VM-based CLR: the share of benign VMs in `selection` never co-located
/// with a malicious VM of set `mal_set`.
pub fn vm_based_clr(vms: &[Vm], subs: &[Subscription], selection: &[VmId], mal_set: usize) -> BigDecimal {
    let mut benign: i64 = 0;
    let mut exposed: i64 = 0;
    for &id in selection {
        let vm = &vms[id.0];
        if !subs[vm.subscription.0].malicious[mal_set] {
            benign += 1;
            if vm.was_colocated_with_malicious[mal_set] {
                exposed += 1;
            }
        }
    }
    if benign == 0 {
        one()
    } else {
        count_ratio(benign - exposed, benign)
    }
}

/// VM-based CLR restricted to VMs whose subscription was exposed.
pub fn unsafe_sub_vm_based_clr(vms: &[Vm], subs: &[Subscription], selection: &[VmId], mal_set: usize) -> BigDecimal {
    let mut benign: i64 = 0;
    let mut exposed: i64 = 0;
    for &id in selection {
        let vm = &vms[id.0];
        let sub = &subs[vm.subscription.0];
        if !sub.malicious[mal_set] && sub.exposed_to_malicious_sub[mal_set] {
            benign += 1;
            if vm.was_colocated_with_malicious[mal_set] {
                exposed += 1;
            }
        }
    }
    if benign == 0 {
        one()
    } else {
        count_ratio(benign - exposed, benign)
    }
}

/// Safe-VM time proportion, overall and restricted to VMs of exposed
/// subscriptions.
///
/// For each benign VM, the unsafe time is the intersection of its lifetime
/// with its first host's malicious periods for `mal_set`.
pub fn safe_vm_time_proportion(
    vms: &[Vm],
    subs: &[Subscription],
    hosts: &[Host],
    selection: &[VmId],
    mal_set: usize,
) -> (BigDecimal, BigDecimal) {
    let mut total = BigInt::zero();
    let mut unsafe_time = BigInt::zero();
    let mut unsafe_sub_total = BigInt::zero();
    let mut unsafe_sub_unsafe_time = BigInt::zero();

    for &id in selection {
        let vm = &vms[id.0];
        let sub = &subs[vm.subscription.0];
        if sub.malicious[mal_set] {
            continue;
        }
        let sub_exposed = sub.exposed_to_malicious_sub[mal_set];

        total += vm.lifetime();
        if sub_exposed {
            unsafe_sub_total += vm.lifetime();
        }

        let Some(host) = vm.first_host else { continue };
        for period in hosts[host.0].malicious_periods[mal_set].iter() {
            if let Some((start, end)) = clipped_overlap(period, vm.time_created, vm.time_deleted) {
                unsafe_time += end - start;
                if sub_exposed {
                    unsafe_sub_unsafe_time += end - start;
                }
            }
        }
    }

    let safe = ratio_or_one(&(&total - &unsafe_time), &total);
    let unsafe_sub_safe = ratio_or_one(&(&unsafe_sub_total - &unsafe_sub_unsafe_time), &unsafe_sub_total);
    (safe, unsafe_sub_safe)
}

/// Safe-subscription time proportion.
///
/// For each benign subscription: active time is the union of its VM
/// lifetimes; malicious time is the union, over all its VMs, of the VM's
/// host malicious periods clipped to the VM's lifetime.
pub fn safe_subscription_time_proportion(
    subs: &[Subscription],
    vms: &[Vm],
    hosts: &[Host],
    mal_set: usize,
) -> BigDecimal {
    let mut total_active = BigInt::zero();
    let mut total_unsafe = BigInt::zero();

    for sub in subs {
        if sub.malicious[mal_set] {
            continue;
        }

        let mut active = IntervalSet::default();
        let mut unsafe_spans = IntervalSet::default();
        for &id in &sub.total_vms {
            let vm = &vms[id.0];
            active.insert(vm.time_created, vm.time_deleted);

            let Some(host) = vm.first_host else { continue };
            for period in hosts[host.0].malicious_periods[mal_set].iter() {
                if let Some((start, end)) = clipped_overlap(period, vm.time_created, vm.time_deleted) {
                    unsafe_spans.insert(start, end);
                }
            }
        }

        total_active += active.total();
        total_unsafe += unsafe_spans.total();
    }

    ratio_or_one(&(&total_active - &total_unsafe), &total_active)
}

/// Coverage: the share of ever-booted hosts that ever held a malicious VM
/// of `mal_set`. 0 when no host was ever booted.
pub fn total_coverage(hosts: &[Host], mal_set: usize) -> BigDecimal {
    let mut ever_active: i64 = 0;
    let mut at_danger: i64 = 0;
    for host in hosts {
        if host.number_of_boots > 0 {
            ever_active += 1;
            if host.has_hosted_malicious_subscription(mal_set) {
                at_danger += 1;
            }
        }
    }
    if ever_active == 0 {
        zero()
    } else {
        count_ratio(at_danger, ever_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coresim_core::{HostId, SubId};

    #[test]
    fn test_interval_set_merging() {
        let mut set = IntervalSet::default();
        set.insert(10, 20);
        set.insert(30, 40);
        assert_eq!(set.total(), 20);

        // bridges both existing spans
        set.insert(15, 35);
        assert_eq!(set.spans(), &[(10, 40)]);

        // contained span changes nothing
        set.insert(12, 14);
        assert_eq!(set.total(), 30);

        // insert before everything
        set.insert(0, 5);
        assert_eq!(set.spans(), &[(0, 5), (10, 40)]);

        // touching spans merge
        set.insert(5, 10);
        assert_eq!(set.spans(), &[(0, 40)]);
    }

    #[test]
    fn test_clipped_overlap() {
        // period hangs over the left edge of the lifetime
        assert_eq!(clipped_overlap((0, 5), 2, 10), Some((2, 5)));
        // over the right edge
        assert_eq!(clipped_overlap((8, 20), 2, 10), Some((8, 10)));
        // no intersection
        assert_eq!(clipped_overlap((12, 20), 2, 10), None);
        // open period reaching to the end of time
        assert_eq!(clipped_overlap((4, SimTime::MAX), 2, 10), Some((4, 10)));
    }

    fn benign_sub(i: usize) -> Subscription {
        Subscription::new(format!("s{i}"), SubId(i), 0, 1)
    }

    #[test]
    fn test_user_clr_counts() {
        let mut subs = vec![benign_sub(0), benign_sub(1), benign_sub(2)];
        subs[1].malicious[0] = true;
        subs[2].exposed_to_malicious_sub[0] = true;
        // 2 benign, 1 exposed
        assert_eq!(user_based_clr(subs.iter(), 0).to_string(), "0.5000000000");
    }

    #[test]
    fn test_user_clr_no_benign_subs() {
        let mut subs = vec![benign_sub(0)];
        subs[0].malicious[0] = true;
        assert_eq!(user_based_clr(subs.iter(), 0), one());
    }

    #[test]
    fn test_safe_vm_time_with_open_period() {
        let subs = vec![benign_sub(0)];
        let mut host = Host::new(0, 32, 224.0, 1);
        host.malicious_periods[0].open(5); // never closes

        let mut vm = Vm::new(
            "v".into(),
            VmId(0),
            SubId(0),
            0,
            10,
            2,
            4.0,
            "Unknown".into(),
            1,
            None,
        );
        vm.first_host = Some(HostId(0));
        let vms = vec![vm];
        let hosts = vec![host];

        let (safe, _) = safe_vm_time_proportion(&vms, &subs, &hosts, &[VmId(0)], 0);
        // unsafe from 5 to 10 out of a 10-second lifetime
        assert_eq!(safe.to_string(), "0.5000000000");
    }
}
