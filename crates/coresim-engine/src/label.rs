//! Seeded malicious-subscription labelling.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use coresim_core::Subscription;

/// Label a proportion of subscriptions malicious, independently per set.
///
/// Every set draws from an identically-seeded stream over the same arena
/// order, so a smaller proportion labels a subset of what a larger one
/// labels; experiments comparing adversary sizes stay aligned.
pub fn mark_malicious_subscriptions(subs: &mut [Subscription], proportions: &[f64], seed: u64) {
    for (ms, &proportion) in proportions.iter().enumerate() {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut remaining = (subs.len() as f64 * proportion).round() as u64;

        while remaining > 0 {
            let r = rng.gen_range(0..subs.len());
            if !subs[r].malicious[ms] {
                subs[r].malicious[ms] = true;
                remaining -= 1;
            }
            // already malicious: draw again
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coresim_core::SubId;

    fn subs(n: usize, sets: usize) -> Vec<Subscription> {
        (0..n)
            .map(|i| Subscription::new(format!("s{i}"), SubId(i), 0, sets))
            .collect()
    }

    #[test]
    fn test_labels_requested_proportion() {
        let mut s = subs(200, 1);
        mark_malicious_subscriptions(&mut s, &[0.1], 42);
        let malicious = s.iter().filter(|x| x.malicious[0]).count();
        assert_eq!(malicious, 20);
    }

    #[test]
    fn test_same_seed_nests_sets() {
        let mut s = subs(100, 2);
        mark_malicious_subscriptions(&mut s, &[0.05, 0.2], 7);
        for sub in &s {
            if sub.malicious[0] {
                assert!(sub.malicious[1], "5% set must be inside the 20% set");
            }
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let mut a = subs(150, 1);
        let mut b = subs(150, 1);
        mark_malicious_subscriptions(&mut a, &[0.3], 99);
        mark_malicious_subscriptions(&mut b, &[0.3], 99);
        let la: Vec<bool> = a.iter().map(|s| s.malicious[0]).collect();
        let lb: Vec<bool> = b.iter().map(|s| s.malicious[0]).collect();
        assert_eq!(la, lb);
    }
}
