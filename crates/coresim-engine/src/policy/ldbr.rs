//! The LDBR strategy of Xiao et al.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;

use coresim_core::{HostId, Result, SimConfig, SimError, SubId, VmId};

use crate::pert::PertSampler;
use crate::policy::PlacementPolicy;
use crate::world::World;

/// Least-danger placement driven by per-subscription threat probabilities.
///
/// Xiao et al. assume a detector that assigns every subscription a
/// probability of being malicious but leave its construction open; here
/// each subscription draws its probability on first placement from a
/// beta-PERT distribution whose mode depends on its actual label. The
/// danger score of a candidate host with `n` VMs and tenant probabilities
/// `p_1..p_n` for an arrival with probability `p` is
/// `n * prod(p_i) * (1 - p) + (1 - prod(p_i)) * p`; the minimum wins.
///
/// Host selection consults the actual label, so this strategy supports
/// exactly one malicious set.
pub struct Ldbr {
    p_values: HashMap<SubId, f64>,
    malicious_dist: PertSampler,
    benign_dist: PertSampler,
    /// Independent stream (engine seed + 2) so probability draws do not
    /// perturb the engine's placement randomness.
    rng: StdRng,
}

impl Ldbr {
    pub fn new(cfg: &SimConfig) -> Result<Self> {
        if cfg.malicious_sets() != 1 {
            return Err(SimError::config(
                "the LDBR strategy must be used with exactly one malicious set",
            ));
        }
        let malicious_dist = PertSampler::new(0.0, 1.0, cfg.pert_mode, cfg.pert_lambda)?;
        let benign_dist = PertSampler::new(0.0, 1.0, 1.0 - cfg.pert_mode, cfg.pert_lambda)?;
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(2)),
            None => StdRng::from_entropy(),
        };
        Ok(Ldbr {
            p_values: HashMap::new(),
            malicious_dist,
            benign_dist,
            rng,
        })
    }

    fn p_value(&mut self, world: &World, sub: SubId) -> f64 {
        if let Some(&p) = self.p_values.get(&sub) {
            return p;
        }
        let p = if world.subs[sub.0].malicious[0] {
            self.malicious_dist.sample(&mut self.rng)
        } else {
            self.benign_dist.sample(&mut self.rng)
        };
        self.p_values.insert(sub, p);
        p
    }
}

impl PlacementPolicy for Ldbr {
    fn name(&self) -> &'static str {
        "LDBR"
    }

    fn pick_host(&mut self, world: &mut World, vm: VmId) -> Result<Option<HostId>> {
        let sub = world.vms[vm.0].subscription;
        let (cores, memory) = world.vm_demand(vm);
        let p_new = self.p_value(world, sub);

        let mut min_score = f64::MAX;
        let mut ties: Vec<HostId> = Vec::new();
        for &h in &world.active {
            let host = &world.hosts[h.0];
            if !host.has_capacity_for(cores, memory) {
                continue;
            }

            let n = host.current_vms.len() as f64;
            let mut p_product = 1.0;
            for &v in &host.current_vms {
                // Every resident VM went through this policy, so its
                // subscription has a probability on record.
                p_product *= self.p_values[&world.vms[v.0].subscription];
            }

            let score = n * p_product * (1.0 - p_new) + (1.0 - p_product) * p_new;
            if score < min_score {
                min_score = score;
                ties.clear();
                ties.push(h);
            } else if score == min_score {
                ties.push(h);
            }
        }

        if ties.is_empty() {
            Ok(world.pick_empty_host(vm))
        } else {
            Ok(world.pick_random(&ties))
        }
    }
}
