//! Coresim core - entity model and arithmetic primitives
//!
//! This crate defines the simulation state shared across:
//! - coresim-engine (event loop, placement policies, metrics)
//! - coresim-cli (trace parsing, report writers)
//!
//! Key types:
//! - `Host`, `Vm`, `Subscription` entities held in typed arenas
//! - `HostId` / `VmId` / `SubId` arena indices (entity identity)
//! - `Trace` (the parsed workload) and `SimConfig`
//! - tick accumulators (`BigInt`) and fixed-point ratios (`BigDecimal`)

pub mod config;
pub mod error;
pub mod host;
pub mod subscription;
pub mod ticks;
pub mod trace;
pub mod types;
pub mod vm;

pub use config::SimConfig;
pub use error::{Result, SimError};
pub use host::Host;
pub use subscription::Subscription;
pub use trace::Trace;
pub use types::{HostId, SimTime, SubId, VmId};
pub use vm::Vm;
