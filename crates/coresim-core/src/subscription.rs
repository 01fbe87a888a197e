//! Tenant (subscription) state.

use std::collections::{BTreeMap, HashSet};

use crate::types::{SimTime, SubId, VmId};

/// A tenant owning VMs over the course of the trace.
///
/// Created lazily when the first VM of its id is seen; never destroyed
/// mid-run. Tracks which other subscriptions it has ever been co-resident
/// with, its exposure to malicious subscriptions per malicious set, and
/// running co-residency time per peer.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// External id from the trace; unique per run.
    pub id: String,
    /// This subscription's index in the arena.
    pub index: SubId,
    pub time_first_vm_created: SimTime,
    /// Total number of VM creations attributed to this subscription.
    pub num_vms: u32,

    pub current_vms: Vec<VmId>,
    /// Every VM this subscription ever owned, in creation order.
    pub total_vms: Vec<VmId>,

    /// Per-malicious-set labels.
    pub malicious: Vec<bool>,
    /// Monotonic per-set exposure flags: set once any VM of this
    /// subscription is co-resident with a malicious VM of another
    /// subscription, never cleared.
    pub exposed_to_malicious_sub: Vec<bool>,

    /// Other subscriptions ever seen co-resident.
    pub seen_subs: HashSet<SubId>,

    /// Peer subscription -> number of currently co-resident VM pairs.
    currently_cores_subs: BTreeMap<SubId, u32>,
    /// Peer subscription -> total co-resident time so far.
    pub coresident_time: BTreeMap<SubId, SimTime>,
    last_cores_update: SimTime,

    /// Total time this subscription had at least one running VM.
    pub active_time: SimTime,
    active_since: Option<SimTime>,

    /// Attack targets of this subscription (as attacker) and whether each
    /// has been hit.
    pub target_vms: BTreeMap<VmId, bool>,
    pub target_subscriptions: BTreeMap<SubId, bool>,
}

impl Subscription {
    pub fn new(id: String, index: SubId, time_first_vm_created: SimTime, malicious_sets: usize) -> Self {
        Subscription {
            id,
            index,
            time_first_vm_created,
            num_vms: 0,
            current_vms: Vec::new(),
            total_vms: Vec::new(),
            malicious: vec![false; malicious_sets],
            exposed_to_malicious_sub: vec![false; malicious_sets],
            seen_subs: HashSet::new(),
            currently_cores_subs: BTreeMap::new(),
            coresident_time: BTreeMap::new(),
            last_cores_update: time_first_vm_created,
            active_time: 0,
            active_since: None,
            target_vms: BTreeMap::new(),
            target_subscriptions: BTreeMap::new(),
        }
    }

    pub fn is_malicious(&self, mal_set: usize) -> bool {
        self.malicious[mal_set]
    }

    pub fn is_active(&self) -> bool {
        !self.current_vms.is_empty()
    }

    /// Whether at least one VM creation of this subscription has been
    /// processed by the engine.
    pub fn is_processed(&self) -> bool {
        !self.total_vms.is_empty()
    }

    pub fn note_vm_created(&mut self, vm: VmId, time: SimTime) {
        if self.current_vms.is_empty() {
            self.active_since = Some(time);
        }
        self.current_vms.push(vm);
        self.total_vms.push(vm);
        self.num_vms += 1;
    }

    pub fn note_vm_deleted(&mut self, vm: VmId, time: SimTime) {
        if let Some(pos) = self.current_vms.iter().position(|&v| v == vm) {
            self.current_vms.remove(pos);
        }
        if self.current_vms.is_empty() {
            if let Some(since) = self.active_since.take() {
                self.active_time += time - since;
            }
        }
    }

    /// Record that `other` has been seen co-resident, flipping the exposure
    /// flag for every malicious set `other` belongs to. The flags are
    /// monotonic: once exposed, always exposed.
    pub fn add_seen(&mut self, other: SubId, other_malicious: &[bool]) {
        self.seen_subs.insert(other);
        for (ms, &mal) in other_malicious.iter().enumerate() {
            if mal {
                self.exposed_to_malicious_sub[ms] = true;
            }
        }
    }

    /// A subscription always counts as having seen itself.
    pub fn has_seen(&self, other: SubId) -> bool {
        other == self.index || self.seen_subs.contains(&other)
    }

    pub fn subscriptions_seen(&self) -> usize {
        self.seen_subs.len()
    }

    /// Accumulate co-resident time for every currently co-resident peer up
    /// to `time`. Must be called before the co-residency multiset changes.
    fn flush_coresidence(&mut self, time: SimTime) {
        let diff = time - self.last_cores_update;
        if diff == 0 {
            return;
        }
        for &other in self.currently_cores_subs.keys() {
            *self.coresident_time.entry(other).or_insert(0) += diff;
        }
        self.last_cores_update = time;
    }

    /// A VM of `other` became co-resident with one of ours at `time`.
    pub fn coresident_added(&mut self, other: SubId, time: SimTime) {
        if other == self.index {
            return;
        }
        self.flush_coresidence(time);
        *self.currently_cores_subs.entry(other).or_insert(0) += 1;
    }

    /// A co-resident VM of `other` went away at `time`.
    pub fn coresident_removed(&mut self, other: SubId, time: SimTime) {
        if other == self.index {
            return;
        }
        self.flush_coresidence(time);
        if let Some(count) = self.currently_cores_subs.get_mut(&other) {
            *count -= 1;
            if *count == 0 {
                self.currently_cores_subs.remove(&other);
            }
        }
    }

    /// Total co-resident time with `other`; for `self` this is the
    /// subscription's own active time.
    pub fn coresident_time_with(&self, other: SubId) -> SimTime {
        if other == self.index {
            self.active_time
        } else {
            self.coresident_time.get(&other).copied().unwrap_or(0)
        }
    }

    /// Register an attack target (the VM and its owning subscription).
    pub fn add_target(&mut self, vm: VmId, sub: SubId) {
        self.target_vms.entry(vm).or_insert(false);
        self.target_subscriptions.entry(sub).or_insert(false);
    }

    pub fn record_vm_hit(&mut self, vm: VmId) {
        self.target_vms.insert(vm, true);
    }

    pub fn record_sub_hit(&mut self, sub: SubId) {
        self.target_subscriptions.insert(sub, true);
    }

    pub fn hit_target_vms(&self) -> usize {
        self.target_vms.values().filter(|&&hit| hit).count()
    }

    pub fn hit_target_subscriptions(&self) -> usize {
        self.target_subscriptions.values().filter(|&&hit| hit).count()
    }

    /// Proportion of this subscription's target VMs that were hit, or -1
    /// when it has no targets.
    pub fn proportion_of_hit_target_vms(&self) -> f64 {
        if self.target_vms.is_empty() {
            -1.0
        } else {
            self.hit_target_vms() as f64 / self.target_vms.len() as f64
        }
    }

    /// Proportion of this subscription's target subscriptions that were
    /// hit, or -1 when it has no targets.
    pub fn proportion_of_hit_target_subscriptions(&self) -> f64 {
        if self.target_subscriptions.is_empty() {
            -1.0
        } else {
            self.hit_target_subscriptions() as f64 / self.target_subscriptions.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(idx: usize) -> Subscription {
        Subscription::new(format!("sub-{idx}"), SubId(idx), 0, 2)
    }

    #[test]
    fn test_active_time_accumulates_across_gaps() {
        let mut s = sub(0);
        s.note_vm_created(VmId(0), 10);
        s.note_vm_deleted(VmId(0), 30);
        assert_eq!(s.active_time, 20);

        s.note_vm_created(VmId(1), 100);
        s.note_vm_created(VmId(2), 110);
        s.note_vm_deleted(VmId(1), 120);
        // still active through vm 2
        assert_eq!(s.active_time, 20);
        s.note_vm_deleted(VmId(2), 150);
        assert_eq!(s.active_time, 70);
    }

    #[test]
    fn test_exposure_is_monotonic() {
        let mut s = sub(0);
        s.add_seen(SubId(1), &[true, false]);
        assert!(s.exposed_to_malicious_sub[0]);
        assert!(!s.exposed_to_malicious_sub[1]);

        // a later benign sighting must not clear the flag
        s.add_seen(SubId(2), &[false, false]);
        assert!(s.exposed_to_malicious_sub[0]);
    }

    #[test]
    fn test_has_seen_includes_self() {
        let s = sub(3);
        assert!(s.has_seen(SubId(3)));
        assert!(!s.has_seen(SubId(4)));
    }

    #[test]
    fn test_coresident_time() {
        let mut s = sub(0);
        s.coresident_added(SubId(1), 10);
        s.coresident_added(SubId(1), 20); // second co-resident VM pair
        s.coresident_removed(SubId(1), 35);
        // one pair remains
        s.coresident_removed(SubId(1), 50);
        assert_eq!(s.coresident_time_with(SubId(1)), 40);

        // self-coresidence is never recorded
        s.coresident_added(SubId(0), 60);
        assert!(s.currently_cores_subs.is_empty());
    }

    #[test]
    fn test_target_hit_proportions() {
        let mut s = sub(0);
        assert_eq!(s.proportion_of_hit_target_vms(), -1.0);

        s.add_target(VmId(5), SubId(2));
        s.add_target(VmId(6), SubId(2));
        s.record_vm_hit(VmId(5));
        s.record_sub_hit(SubId(2));
        assert_eq!(s.proportion_of_hit_target_vms(), 0.5);
        assert_eq!(s.proportion_of_hit_target_subscriptions(), 1.0);
    }
}
