//! Error types for the simulator.

use thiserror::Error;

use crate::types::SimTime;

/// Simulator result type
pub type Result<T> = std::result::Result<T, SimError>;

/// Errors that can occur while loading a trace or running a simulation
#[derive(Error, Debug)]
pub enum SimError {
    /// The trace contains the same VM id twice
    #[error("duplicate VM id: {0}")]
    DuplicateVmId(String),

    /// A malicious-subscription file reuses a subscription id from the base trace
    #[error("duplicate subscription id: {0}")]
    DuplicateSubscriptionId(String),

    /// A trace row could not be parsed
    #[error("malformed trace row {line}: {reason}")]
    MalformedRow { line: u64, reason: String },

    /// A host observed an event earlier than its previous one
    #[error("events out of order on host {host}: {time} < {last}")]
    EventsOutOfOrder {
        host: usize,
        time: SimTime,
        last: SimTime,
    },

    /// Shutdown was requested for a host that still hosts VMs
    #[error("cannot shut down host {host}: VMs still running")]
    ShutdownWithVms { host: usize },

    /// A VM was placed on a host without room for it
    #[error("host {host} lacks capacity for VM {vm}")]
    HostOverCommitted { host: usize, vm: String },

    /// A deletion arrived for a VM that is not on any host
    #[error("VM {0} is not placed on any host")]
    VmNotPlaced(String),

    /// No host in the cluster can take the VM
    #[error("out of capacity: no host can take VM {vm}")]
    CapacityExhausted { vm: String },

    /// The requested placement algorithm tag is not known
    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    /// A configuration value is invalid
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a malformed-row error
    pub fn row(line: u64, reason: impl Into<String>) -> Self {
        Self::MalformedRow {
            line,
            reason: reason.into(),
        }
    }
}
