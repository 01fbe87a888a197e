//! The parsed workload: VM and subscription arenas plus id lookup.

use std::collections::HashMap;

use crate::error::{Result, SimError};
use crate::subscription::Subscription;
use crate::types::{SimTime, SubId, VmId};
use crate::vm::Vm;

/// All VM requests and subscriptions loaded for one run.
///
/// Entities are appended in file order and never removed, so arena indices
/// are stable and iteration order is deterministic.
#[derive(Debug, Default, Clone)]
pub struct Trace {
    pub vms: Vec<Vm>,
    pub subs: Vec<Subscription>,
    vm_ids: HashMap<String, VmId>,
    sub_ids: HashMap<String, SubId>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vm_by_id(&self, id: &str) -> Option<VmId> {
        self.vm_ids.get(id).copied()
    }

    pub fn sub_by_id(&self, id: &str) -> Option<SubId> {
        self.sub_ids.get(id).copied()
    }

    /// Look up a subscription by external id, creating it on first sight.
    ///
    /// Creation assumes trace rows arrive in creation order: the first VM's
    /// creation time becomes `time_first_vm_created`.
    pub fn sub_or_insert(&mut self, id: &str, time_created: SimTime, malicious_sets: usize) -> SubId {
        if let Some(&sub) = self.sub_ids.get(id) {
            return sub;
        }
        let index = SubId(self.subs.len());
        self.subs
            .push(Subscription::new(id.to_string(), index, time_created, malicious_sets));
        self.sub_ids.insert(id.to_string(), index);
        index
    }

    /// Append a VM. Duplicate VM ids are fatal.
    #[allow(clippy::too_many_arguments)]
    pub fn add_vm(
        &mut self,
        id: &str,
        subscription: SubId,
        time_created: SimTime,
        time_deleted: SimTime,
        cores: i64,
        memory: f64,
        category: String,
        malicious_sets: usize,
        target_vm_id: Option<String>,
    ) -> Result<VmId> {
        if self.vm_ids.contains_key(id) {
            return Err(SimError::DuplicateVmId(id.to_string()));
        }
        let index = VmId(self.vms.len());
        self.vms.push(Vm::new(
            id.to_string(),
            index,
            subscription,
            time_created,
            time_deleted,
            cores,
            memory,
            category,
            malicious_sets,
            target_vm_id,
        ));
        self.vm_ids.insert(id.to_string(), index);
        Ok(index)
    }

    /// VM ids ordered by creation time. The sort is stable, so
    /// equally-timestamped requests keep their trace order.
    pub fn sorted_by_creation(&self) -> Vec<VmId> {
        let mut order: Vec<VmId> = self.vms.iter().map(|vm| vm.index).collect();
        order.sort_by_key(|&vm| self.vms[vm.0].time_created);
        order
    }

    /// VM ids ordered by deletion time, stable like
    /// [`sorted_by_creation`](Self::sorted_by_creation).
    pub fn sorted_by_deletion(&self) -> Vec<VmId> {
        let mut order: Vec<VmId> = self.vms.iter().map(|vm| vm.index).collect();
        order.sort_by_key(|&vm| self.vms[vm.0].time_deleted);
        order
    }

    /// Resolve `target_vm_id` references to arena indices and register each
    /// attacker's targets on its subscription. Targets referring to VMs
    /// outside the loaded window stay unresolved.
    pub fn resolve_targets(&mut self) {
        for i in 0..self.vms.len() {
            let Some(target_id) = self.vms[i].target_vm_id.clone() else {
                continue;
            };
            let Some(target) = self.vm_by_id(&target_id) else {
                continue;
            };
            self.vms[i].target_vm = Some(target);
            let attacker_sub = self.vms[i].subscription;
            let target_sub = self.vms[target.0].subscription;
            self.subs[attacker_sub.0].add_target(target, target_sub);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(trace: &mut Trace, id: &str, sub: &str, created: SimTime, deleted: SimTime) -> VmId {
        let sub = trace.sub_or_insert(sub, created, 1);
        trace
            .add_vm(id, sub, created, deleted, 2, 4.0, "Unknown".into(), 1, None)
            .unwrap()
    }

    #[test]
    fn test_duplicate_vm_id_is_fatal() {
        let mut trace = Trace::new();
        add(&mut trace, "v1", "s1", 0, 10);
        let sub = trace.sub_by_id("s1").unwrap();
        let err = trace
            .add_vm("v1", sub, 5, 15, 1, 1.0, "Unknown".into(), 1, None)
            .unwrap_err();
        assert!(matches!(err, SimError::DuplicateVmId(_)));
    }

    #[test]
    fn test_subscription_created_on_first_vm() {
        let mut trace = Trace::new();
        add(&mut trace, "v1", "s1", 7, 10);
        add(&mut trace, "v2", "s1", 9, 12);
        assert_eq!(trace.subs.len(), 1);
        assert_eq!(trace.subs[0].time_first_vm_created, 7);
    }

    #[test]
    fn test_sort_is_stable_for_equal_timestamps() {
        let mut trace = Trace::new();
        let a = add(&mut trace, "a", "s1", 5, 20);
        let b = add(&mut trace, "b", "s2", 5, 10);
        let c = add(&mut trace, "c", "s3", 1, 10);
        assert_eq!(trace.sorted_by_creation(), vec![c, a, b]);
        // b and c tie on deletion; trace order is preserved
        assert_eq!(trace.sorted_by_deletion(), vec![b, c, a]);
    }

    #[test]
    fn test_resolve_targets() {
        let mut trace = Trace::new();
        let victim = add(&mut trace, "v1", "s1", 0, 100);
        let sub = trace.sub_or_insert("attacker", 5, 1);
        let atk = trace
            .add_vm("a1", sub, 5, 50, 2, 4.0, "Unknown".into(), 1, Some("v1".into()))
            .unwrap();
        trace.resolve_targets();
        assert_eq!(trace.vms[atk.0].target_vm, Some(victim));
        let victim_sub = trace.vms[victim.0].subscription;
        assert_eq!(trace.subs[sub.0].target_subscriptions.get(&victim_sub), Some(&false));
    }
}
