//! Shared helpers for engine integration tests.

use rand::rngs::StdRng;
use rand::SeedableRng;

use coresim_core::{SimConfig, SimTime, SubId, Trace, VmId};
use coresim_engine::{build_policy, Algorithm, Engine, World};

/// Builds small in-memory traces without going through CSV.
pub struct TraceBuilder {
    trace: Trace,
    malicious_sets: usize,
}

impl TraceBuilder {
    pub fn new(malicious_sets: usize) -> Self {
        TraceBuilder {
            trace: Trace::new(),
            malicious_sets,
        }
    }

    pub fn vm(
        &mut self,
        id: &str,
        sub: &str,
        created: SimTime,
        deleted: SimTime,
        cores: i64,
        memory: f64,
    ) -> VmId {
        let sub = self
            .trace
            .sub_or_insert(sub, created, self.malicious_sets);
        self.trace
            .add_vm(id, sub, created, deleted, cores, memory, "Unknown".into(), self.malicious_sets, None)
            .expect("unique VM id")
    }

    pub fn mark_malicious(&mut self, sub: &str, mal_set: usize) {
        let sub = self.trace.sub_by_id(sub).expect("known subscription");
        self.trace.subs[sub.0].malicious[mal_set] = true;
    }

    pub fn sub_id(&self, sub: &str) -> SubId {
        self.trace.sub_by_id(sub).expect("known subscription")
    }

    pub fn build(self) -> Trace {
        self.trace
    }
}

/// Run a trace to completion and hand back the engine plus the creation
/// order used.
pub fn run_simulation(trace: Trace, cfg: &SimConfig, alg: Algorithm) -> (Engine, Vec<VmId>) {
    let creations = trace.sorted_by_creation();
    let deletions = trace.sorted_by_deletion();
    let rng = StdRng::seed_from_u64(cfg.seed.unwrap_or(0).wrapping_add(1));
    let mut world = World::new(trace, cfg, rng);
    let policy = build_policy(alg, &mut world, cfg).expect("policy construction");
    let mut engine = Engine::new(world, policy, cfg);
    engine.run(&creations, &deletions).expect("simulation run");
    (engine, creations)
}

/// End-of-run structural invariants that must hold for every policy.
pub fn assert_world_invariants(world: &World) {
    for host in &world.hosts {
        // capacity accounting sums over the VMs present
        let cores: i64 = host.current_vms.iter().map(|v| world.vms[v.0].cores).sum();
        let memory: f64 = host.current_vms.iter().map(|v| world.vms[v.0].memory).sum();
        assert_eq!(host.cores_busy, cores, "host {} core accounting", host.number);
        assert!(
            (host.memory_used - memory).abs() < 1e-9,
            "host {} memory accounting",
            host.number
        );
        assert!(host.cores_busy >= 0 && host.cores_busy <= host.cores);
        assert!(host.memory_used >= -1e-9 && host.memory_used <= host.memory + 1e-9);

        // malicious periods are sorted and disjoint
        for ms in 0..world.malicious_sets() {
            let periods: Vec<_> = host.malicious_periods[ms].iter().collect();
            for pair in periods.windows(2) {
                assert!(pair[0].1 <= pair[1].0, "host {} periods overlap", host.number);
            }
        }

        // busy ticks can never outrun uptime ticks
        assert!(
            host.busy_core_ticks_at(world.time) <= host.total_core_ticks_at(world.time),
            "host {} busier than up",
            host.number
        );
    }

    // co-residency knowledge is symmetric
    for sub in &world.subs {
        for &other in &sub.seen_subs {
            assert!(
                world.subs[other.0].seen_subs.contains(&sub.index),
                "{} saw {} but not vice versa",
                sub.id,
                world.subs[other.0].id
            );
        }
    }
}

/// A config sized for unit-scale clusters.
pub fn small_config(num_hosts: usize, cores: i64, memory: f64) -> SimConfig {
    SimConfig {
        num_hosts,
        cores_per_host: cores,
        memory_per_host: memory,
        stat_interval: 1_000_000,
        seed: Some(42),
        ..SimConfig::default()
    }
}
