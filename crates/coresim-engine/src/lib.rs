//! Coresim engine - event loop, placement framework and metrics
//!
//! The engine drains two pre-sorted event streams (VM creations and
//! deletions) into mutations of the shared entity state, firing statistics
//! callbacks at fixed boundaries. Placement decisions are delegated to a
//! [`policy::PlacementPolicy`] picked by algorithm tag.
//!
//! Determinism: given a seed, the labelling stream (`seed`), the placement
//! stream (`seed + 1`) and the LDBR beta stream (`seed + 2`) are independent,
//! so experiments can vary one dimension without perturbing the others.

pub mod engine;
pub mod label;
pub mod metrics;
pub mod pert;
pub mod policy;
pub mod world;

pub use engine::{Engine, IntervalSeries, MaliciousSetSummary, RunSummary};
pub use label::mark_malicious_subscriptions;
pub use policy::{build_policy, Algorithm, PlacementPolicy};
pub use world::World;
