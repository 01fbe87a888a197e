//! End-to-end placement scenarios, one per strategy family.

mod common;

use common::{assert_world_invariants, run_simulation, small_config, TraceBuilder};

use coresim_core::HostId;
use coresim_engine::{Algorithm, PlacementPolicy};

#[test]
fn first_fit_exposes_coresident_tenant() {
    let mut b = TraceBuilder::new(1);
    let v1 = b.vm("v1", "s1", 0, 10, 2, 4.0);
    let v2 = b.vm("v2", "s2", 0, 10, 2, 4.0);
    let v3 = b.vm("v3", "s3", 5, 10, 2, 4.0);
    b.mark_malicious("s2", 0);
    let (s1, s3) = (b.sub_id("s1"), b.sub_id("s3"));

    let cfg = small_config(2, 4, 8.0);
    let (mut engine, creations) = run_simulation(b.build(), &cfg, Algorithm::FirstFit);
    let world = &engine.world;

    // v1 and v2 fill host 0; v3 spills onto host 1
    assert_eq!(world.vms[v1.0].first_host, Some(HostId(0)));
    assert_eq!(world.vms[v2.0].first_host, Some(HostId(0)));
    assert_eq!(world.vms[v3.0].first_host, Some(HostId(1)));

    assert!(world.subs[s1.0].exposed_to_malicious_sub[0]);
    assert!(!world.subs[s3.0].exposed_to_malicious_sub[0]);
    assert!(world.vms[v1.0].was_colocated_with_malicious[0]);
    assert!(!world.vms[v3.0].was_colocated_with_malicious[0]);

    assert_world_invariants(world);
    let summary = engine.summary(&creations);
    assert_eq!(summary.per_set[0].user_clr.to_string(), "0.5000000000");
}

#[test]
fn best_fit_prefers_densest_host() {
    let mut b = TraceBuilder::new(1);
    let v1 = b.vm("v1", "s1", 0, 10, 1, 1.0);
    let v2 = b.vm("v2", "s2", 1, 3, 1, 1.0);
    let v3 = b.vm("v3", "s3", 4, 10, 1, 1.0);
    let (s1, s2, s3) = (b.sub_id("s1"), b.sub_id("s2"), b.sub_id("s3"));

    let cfg = small_config(3, 2, 2.0);
    let (engine, _) = run_simulation(b.build(), &cfg, Algorithm::BestFit);
    let world = &engine.world;

    let h = world.vms[v1.0].first_host.unwrap();
    // v2 joins v1 (only active host); v3 joins v1 again after v2 left,
    // because the half-used host beats any empty one
    assert_eq!(world.vms[v2.0].first_host, Some(h));
    assert_eq!(world.vms[v3.0].first_host, Some(h));

    // co-residency: s1 met both, but v2 and v3 never overlapped
    assert!(world.subs[s1.0].seen_subs.contains(&s2));
    assert!(world.subs[s1.0].seen_subs.contains(&s3));
    assert!(!world.subs[s2.0].seen_subs.contains(&s3));
    assert_world_invariants(world);
}

#[test]
fn han_keeps_subscription_inside_first_group() {
    let mut b = TraceBuilder::new(1);
    let vms: Vec<_> = (0..5)
        .map(|i| b.vm(&format!("v{i}"), "s1", i, 100, 1, 1.0))
        .collect();
    let s1 = b.sub_id("s1");

    let mut cfg = small_config(8, 4, 8.0);
    cfg.active_hosts = 4; // group size
    cfg.n_star = 2;
    let (engine, _) = run_simulation(b.build(), &cfg, Algorithm::Han);
    let world = &engine.world;

    // everything stays in group 0, and no foreign tenant is ever met
    let mut per_host = std::collections::HashMap::new();
    for vm in &vms {
        let host = world.vms[vm.0].first_host.unwrap();
        assert!(host.0 < 4, "placement left group 0");
        *per_host.entry(host).or_insert(0u32) += 1;
    }
    assert!(world.subs[s1.0].seen_subs.is_empty());

    // n* = 2 caps each host at two of s1's VMs, so three hosts were used
    assert!(per_host.values().all(|&n| n <= 2));
    assert_eq!(per_host.len(), 3);
    assert_world_invariants(world);
}

#[test]
fn azar_replaces_filled_host() {
    let mut b = TraceBuilder::new(1);
    // oversized by cores (6 > 2); fills memory below the threshold
    b.vm("big", "s1", 0, 10, 6, 13.0);

    let mut cfg = small_config(4, 8, 16.0);
    cfg.active_hosts = 2;
    cfg.max_cores = 2;
    cfg.max_memory = 4.0;
    let (engine, _) = run_simulation(b.build(), &cfg, Algorithm::Azar);
    let world = &engine.world;

    // two initial boots plus the replacement for the host that filled up;
    // the deletion reverts the host and trims the pool back to two
    assert_eq!(world.hosts_booted, 3);
    assert_eq!(world.hosts_shut_down, 1);
    assert_eq!(world.running_hosts(), 2);
    assert_world_invariants(world);
}

#[test]
fn ldbr_separates_malicious_and_benign_tenants() {
    let mut b = TraceBuilder::new(1);
    let v_mal = b.vm("m1", "evil", 0, 100, 2, 4.0);
    let v_b1 = b.vm("b1", "good1", 1, 100, 2, 4.0);
    let v_b2 = b.vm("b2", "good2", 2, 100, 2, 4.0);
    b.mark_malicious("evil", 0);
    let good1 = b.sub_id("good1");

    let mut cfg = small_config(4, 8, 16.0);
    cfg.active_hosts = 2;
    // concentrate the PERT draws tightly around their modes
    cfg.pert_lambda = 20.0;
    let (engine, _) = run_simulation(b.build(), &cfg, Algorithm::Ldbr);
    let world = &engine.world;

    let mal_host = world.vms[v_mal.0].first_host.unwrap();
    let b1_host = world.vms[v_b1.0].first_host.unwrap();
    let b2_host = world.vms[v_b2.0].first_host.unwrap();

    // the first benign VM avoids the malicious host; the second prefers
    // the benign-only host over the malicious one
    assert_ne!(b1_host, mal_host);
    assert_eq!(b2_host, b1_host);
    assert!(!world.subs[good1.0].exposed_to_malicious_sub[0]);
    assert_world_invariants(world);
}

#[test]
fn dedicated_instance_reuses_own_host_and_skips_mixed_ones() {
    let mut b = TraceBuilder::new(1);
    let v1 = b.vm("v1", "s1", 0, 100, 2, 4.0);
    let v2 = b.vm("v2", "s2", 1, 100, 2, 4.0);
    let v3 = b.vm("v3", "s1", 2, 100, 2, 4.0);

    let cfg = small_config(4, 8, 16.0);
    let (engine, _) = run_simulation(b.build(), &cfg, Algorithm::DedicatedInstance);
    let world = &engine.world;

    // s1 returns to its own host; s2 got a host of its own
    assert_eq!(world.vms[v3.0].first_host, world.vms[v1.0].first_host);
    assert_ne!(world.vms[v2.0].first_host, world.vms[v1.0].first_host);
    assert_world_invariants(world);
}

#[test]
fn dedicated_instance_rejects_host_with_foreign_tenant() {
    // Build the mixed-tenancy state by hand: host 0 runs s1 and s2
    // together, so it is no candidate for s1 even with spare capacity.
    use coresim_core::Trace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    let mut b = TraceBuilder::new(1);
    let v1 = b.vm("v1", "s1", 0, 100, 1, 1.0);
    let v2 = b.vm("v2", "s2", 0, 100, 1, 1.0);
    let v3 = b.vm("v3", "s1", 1, 100, 1, 1.0);
    let trace: Trace = b.build();

    let cfg = small_config(3, 8, 16.0);
    let rng = StdRng::seed_from_u64(1);
    let mut world = coresim_engine::World::new(trace, &cfg, rng);
    let mut policy = coresim_engine::policy::DedicatedInstance;

    world.activate_host(HostId(0), 0);
    world.place_vm(v1, HostId(0)).unwrap();
    world.place_vm(v2, HostId(0)).unwrap();

    world.time = 1;
    let picked = policy.pick_host(&mut world, v3).unwrap().unwrap();
    assert_ne!(picked, HostId(0), "mixed host must be skipped");
    assert!(!world.hosts[picked.0].is_active(), "fallback is an empty host");
}

#[test]
fn pcuf_reunites_acquainted_subscriptions() {
    let mut b = TraceBuilder::new(1);
    // s1, s2 and s3 fill one host and get acquainted
    let v1 = b.vm("v1", "s1", 0, 50, 2, 4.0);
    let v2 = b.vm("v2", "s2", 1, 50, 2, 4.0);
    let v3 = b.vm("v3", "s3", 2, 50, 2, 4.0);
    // s2 returns while there is still room next to its acquaintances
    let v4 = b.vm("v4", "s2", 3, 50, 2, 4.0);
    // a stranger gets pushed to a fresh host once the first one is full
    let v5 = b.vm("v5", "s4", 4, 50, 2, 4.0);
    // s2 again; the only active host with room hosts the unseen s4
    let v6 = b.vm("v6", "s2", 5, 50, 2, 4.0);

    let mut cfg = small_config(4, 8, 16.0);
    cfg.active_hosts = 1;
    let (engine, _) = run_simulation(b.build(), &cfg, Algorithm::Pcuf);
    let world = &engine.world;

    let shared = world.vms[v1.0].first_host.unwrap();
    assert_eq!(world.vms[v2.0].first_host, Some(shared));
    assert_eq!(world.vms[v3.0].first_host, Some(shared));
    assert_eq!(world.vms[v4.0].first_host, Some(shared), "s2 packs with acquaintances");

    let stranger = world.vms[v5.0].first_host.unwrap();
    assert_ne!(stranger, shared);
    let h6 = world.vms[v6.0].first_host.unwrap();
    assert_ne!(h6, stranger, "s2 must not join the unseen tenant");
    assert_ne!(h6, shared, "the shared host is out of capacity");
    assert_world_invariants(world);
}

#[test]
fn known_users_returns_to_familiar_company() {
    for alg in [
        Algorithm::KnownUsers { lowest_avg_seen: false },
        Algorithm::KnownVms { lowest_avg_seen: false },
    ] {
        let mut b = TraceBuilder::new(1);
        // s1 and s2 become acquainted, then s1 leaves
        let v1 = b.vm("v1", "s1", 0, 30, 4, 8.0);
        let v2 = b.vm("v2", "s2", 1, 100, 4, 8.0);
        // s3 lands on a separate host and stays a stranger to s1
        let v3 = b.vm("v3", "s3", 2, 100, 4, 8.0);
        // s1 returns: the host with s2 is fully known, the one with s3 is not
        let v4 = b.vm("v4", "s1", 70, 100, 2, 4.0);

        let cfg = small_config(4, 8, 16.0);
        let (engine, _) = run_simulation(b.build(), &cfg, alg);
        let world = &engine.world;

        let h12 = world.vms[v1.0].first_host.unwrap();
        assert_eq!(world.vms[v2.0].first_host, Some(h12));
        let h3 = world.vms[v3.0].first_host.unwrap();
        assert_ne!(h3, h12);
        assert_eq!(
            world.vms[v4.0].first_host,
            Some(h12),
            "{alg:?} ignored acquaintance"
        );
        assert_world_invariants(world);
    }
}

#[test]
fn known_proportion_lowest_avg_seen_picks_quietest_company() {
    use coresim_core::Trace;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    // Host 0 runs the acquainted pair s1+s2 (one known peer each); host 1
    // runs the solitary s3. The returning s4 knows nobody, so its best
    // proportion is zero on both.
    let mut b = TraceBuilder::new(1);
    let v0 = b.vm("v0", "s4", 0, 5, 1, 1.0);
    let v1 = b.vm("v1", "s1", 0, 100, 2, 2.0);
    let v2 = b.vm("v2", "s2", 0, 100, 2, 2.0);
    let v3 = b.vm("v3", "s3", 0, 100, 1, 1.0);
    let v4 = b.vm("v4", "s4", 10, 100, 1, 1.0);
    let trace: Trace = b.build();

    let cfg = small_config(3, 8, 16.0);

    for (lowest_avg, expected) in [(true, HostId(1)), (false, HostId(0))] {
        let rng = StdRng::seed_from_u64(3);
        let mut world = coresim_engine::World::new(trace.clone(), &cfg, rng);
        world.activate_host(HostId(0), 0);
        world.activate_host(HostId(1), 0);
        world.activate_host(HostId(2), 0);
        world.place_vm(v0, HostId(2)).unwrap();
        world.place_vm(v1, HostId(0)).unwrap();
        world.place_vm(v2, HostId(0)).unwrap();
        world.place_vm(v3, HostId(1)).unwrap();
        world.time = 5;
        world.remove_vm(v0).unwrap();
        world.deactivate_host(HostId(2), 5).unwrap();

        world.time = 10;
        let mut policy = coresim_engine::policy::KnownProportion::new(true, lowest_avg);
        let picked = policy.pick_host(&mut world, v4).unwrap().unwrap();
        // with the average-acquaintance rule the quiet host 1 wins; the
        // plain rule densest-packs onto host 0
        assert_eq!(picked, expected);
    }
}

#[test]
fn every_algorithm_survives_a_churny_trace() {
    for alg in [
        Algorithm::FirstFit,
        Algorithm::NextFit,
        Algorithm::BestFit,
        Algorithm::WorstFit,
        Algorithm::RandomActive,
        Algorithm::DedicatedInstance,
        Algorithm::Azar,
        Algorithm::Han,
        Algorithm::HanKeepOn,
        Algorithm::KnownUsers { lowest_avg_seen: false },
        Algorithm::KnownUsers { lowest_avg_seen: true },
        Algorithm::KnownVms { lowest_avg_seen: false },
        Algorithm::KnownVms { lowest_avg_seen: true },
        Algorithm::Ldbr,
        Algorithm::Pcuf,
    ] {
        let mut b = TraceBuilder::new(1);
        for i in 0i64..40 {
            let sub = format!("s{}", i % 7);
            let created = (i * 13) % 500;
            let deleted = created + 50 + (i * 7) % 200;
            b.vm(&format!("vm{i}"), &sub, created, deleted, 1 + i % 4, 2.0);
        }
        b.mark_malicious("s3", 0);

        let mut cfg = small_config(24, 8, 16.0);
        cfg.active_hosts = 2;
        cfg.stat_interval = 100;
        // size-assumption thresholds at half a host, as in the real setup
        cfg.max_cores = 4;
        cfg.max_memory = 8.0;
        let (mut engine, creations) = run_simulation(b.build(), &cfg, alg);
        assert_world_invariants(&engine.world);

        // all VMs are gone at the end, so every malicious period is closed
        for host in &engine.world.hosts {
            assert!(host.current_vms.is_empty());
        }
        let summary = engine.summary(&creations);
        assert_eq!(summary.vm_creations, 40);
    }
}
