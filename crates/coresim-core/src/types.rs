//! Identifier and clock types shared across the simulator.

use serde::{Deserialize, Serialize};

/// Simulation clock value, in seconds since the epoch of the trace.
///
/// The clock is monotonic within a run; products of time and capacity are
/// accumulated as `BigInt` ticks (see [`crate::ticks`]) because they exceed
/// 64 bits for realistic traces.
pub type SimTime = i64;

/// Index of a host in the host arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(pub usize);

/// Index of a VM in the VM arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VmId(pub usize);

/// Index of a subscription in the subscription arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubId(pub usize);

impl std::fmt::Display for HostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "host {}", self.0)
    }
}

impl std::fmt::Display for VmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vm {}", self.0)
    }
}

impl std::fmt::Display for SubId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription {}", self.0)
    }
}
