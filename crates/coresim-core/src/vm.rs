//! Virtual machine records.

use crate::types::{HostId, SimTime, SubId, VmId};

/// One VM request from the trace.
///
/// A VM exists on exactly one host between its creation and deletion events;
/// `created == deleted` is permitted and means the VM is created and
/// immediately removed.
#[derive(Debug, Clone)]
pub struct Vm {
    /// External id from the trace; unique per run.
    pub id: String,
    /// This VM's index in the arena.
    pub index: VmId,
    /// Owning subscription. Rewritten when malicious VMs are collapsed onto
    /// a single synthetic subscription.
    pub subscription: SubId,
    pub time_created: SimTime,
    pub time_deleted: SimTime,
    pub cores: i64,
    pub memory: f64,
    /// Opaque workload category tag from the trace.
    pub category: String,

    /// Target VM id for attack traces; presence marks this VM an attacker.
    pub target_vm_id: Option<String>,
    /// Resolved target, if the target VM exists in the loaded trace.
    pub target_vm: Option<VmId>,
    pub hit_target: bool,

    /// Monotonic per-malicious-set exposure flags: set once this VM shares
    /// its host with a malicious VM of that set, never cleared.
    pub was_colocated_with_malicious: Vec<bool>,

    pub current_host: Option<HostId>,
    /// The host this VM was first placed on; survives deletion and is the
    /// host consulted by the time-based safety metrics.
    pub first_host: Option<HostId>,
}

impl Vm {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        index: VmId,
        subscription: SubId,
        time_created: SimTime,
        time_deleted: SimTime,
        cores: i64,
        memory: f64,
        category: String,
        malicious_sets: usize,
        target_vm_id: Option<String>,
    ) -> Self {
        Vm {
            id,
            index,
            subscription,
            time_created,
            time_deleted,
            cores,
            memory,
            category,
            target_vm_id,
            target_vm: None,
            hit_target: false,
            was_colocated_with_malicious: vec![false; malicious_sets],
            current_host: None,
            first_host: None,
        }
    }

    /// Whether this VM carries an attack target.
    pub fn has_target(&self) -> bool {
        self.target_vm_id.is_some()
    }

    pub fn lifetime(&self) -> SimTime {
        self.time_deleted - self.time_created
    }
}

impl std::fmt::Display for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VM {} ({} cores, {} GiB, created {}, deleted {})",
            self.id, self.cores, self.memory, self.time_created, self.time_deleted
        )
    }
}
