//! Attacker workload generation.
//!
//! Synthesizes trace files in the simulator's input format representing two
//! adversary shapes: an isochronous attacker that launches bursts of VMs at
//! a fixed cadence, and a targeted attacker that aims bursts at victim VMs
//! sampled from a real dataset.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::Rng;

use coresim_core::{Result, SimTime, Trace};

use crate::parser::{self, ParseOptions};

/// One trace row in the simulator's input format. The deployment id and
/// CPU statistics are ignored by the parser and filled with placeholders.
fn trace_row(
    vm_id: &str,
    sub_id: &str,
    created: SimTime,
    deleted: SimTime,
    cores: i64,
    memory: i64,
    target_vm_id: Option<&str>,
) -> String {
    let deployment: u32 = rand::random();
    let mut row =
        format!("{vm_id},{sub_id},{deployment},{created},{deleted},0,0,0,Unknown,{cores},{memory}");
    if let Some(target) = target_vm_id {
        row.push(',');
        row.push_str(target);
    }
    row
}

/// Parameters of the isochronous attacker.
#[derive(Debug, Clone)]
pub struct IntervalAttackSpec {
    pub interval: i64,
    pub vms_per_interval: u32,
    pub lifetime: i64,
    pub min_time: SimTime,
    pub max_time: SimTime,
    pub cores: i64,
    pub memory: i64,
    pub subscription_id: String,
    /// Use a fresh subscription id per interval, with the configured id as
    /// prefix.
    pub new_sub_id_per_interval: bool,
}

/// Emit `vms_per_interval` VMs every `interval` seconds across the window.
pub fn generate_interval_attack(spec: &IntervalAttackSpec, out_path: &Path) -> Result<()> {
    let mut out = BufWriter::new(File::create(out_path)?);

    let mut i: u64 = 0;
    let mut time = spec.min_time;
    while time < spec.max_time {
        let sub_id = if spec.new_sub_id_per_interval {
            format!("{}-{}", spec.subscription_id, time)
        } else {
            spec.subscription_id.clone()
        };

        for _ in 0..spec.vms_per_interval {
            let vm_id = format!("{sub_id}-{i}");
            let row = trace_row(
                &vm_id,
                &sub_id,
                time,
                time + spec.lifetime,
                spec.cores,
                spec.memory,
                None,
            );
            writeln!(out, "{row}")?;
            i += 1;
        }

        time += spec.interval;
    }

    out.flush()?;
    Ok(())
}

/// Parameters of the targeted attacker.
#[derive(Debug, Clone)]
pub struct TargetedAttackSpec {
    /// Spacing between successive victim selections.
    pub interval: i64,
    pub lifetime: i64,
    pub min_time: SimTime,
    pub max_time: SimTime,
    pub cores: i64,
    pub memory: i64,
    pub subscription_id: String,
    pub new_sub_id_per_interval: bool,
    /// Dataset the victims are sampled from.
    pub dataset: PathBuf,
    pub dataset_min_time: SimTime,
    pub dataset_max_time: SimTime,
    pub bursts: u32,
    pub vms_per_burst: u32,
    pub burst_interval: i64,
    /// How long before the victim's creation the first burst fires.
    pub lead_time: i64,
}

/// For every interval, pick a victim among the dataset VMs created next and
/// emit attack bursts aimed at it.
pub fn generate_targeted_attack(
    spec: &TargetedAttackSpec,
    out_path: &Path,
    rng: &mut StdRng,
) -> Result<()> {
    let mut trace = Trace::new();
    parser::parse_trace_file(
        &mut trace,
        &spec.dataset,
        &ParseOptions {
            min_time: spec.dataset_min_time,
            max_time: spec.dataset_max_time,
            malicious_sets: 1,
            includes_targets: false,
            forbid_existing_subs: false,
        },
    )?;
    let order = trace.sorted_by_creation();

    let mut out = BufWriter::new(File::create(out_path)?);

    let mut vm_idx = 0usize;
    let mut time = spec.min_time;
    'intervals: while time < spec.max_time && vm_idx < order.len() {
        let sub_id = if spec.new_sub_id_per_interval {
            format!("{}-{}", spec.subscription_id, time)
        } else {
            spec.subscription_id.clone()
        };

        // Move to the first VM created at or after this interval start.
        while trace.vms[order[vm_idx].0].time_created < time {
            vm_idx += 1;
            if vm_idx >= order.len() {
                break 'intervals;
            }
        }

        // The victim is drawn among all VMs sharing that creation time.
        let victim_time = trace.vms[order[vm_idx].0].time_created;
        let mut candidates = Vec::new();
        while trace.vms[order[vm_idx].0].time_created == victim_time {
            candidates.push(order[vm_idx]);
            vm_idx += 1;
            if vm_idx >= order.len() {
                break;
            }
        }
        let victim = &trace.vms[candidates[rng.gen_range(0..candidates.len())].0];

        let mut burst_time = victim.time_created - spec.lead_time;
        for _ in 0..spec.bursts {
            for v in 0..spec.vms_per_burst {
                let vm_id = format!("{sub_id}-{burst_time}-{v}");
                let row = trace_row(
                    &vm_id,
                    &sub_id,
                    burst_time,
                    burst_time + spec.lifetime,
                    spec.cores,
                    spec.memory,
                    Some(&victim.id),
                );
                writeln!(out, "{row}")?;
            }
            burst_time += spec.burst_interval;
        }

        // Keep the next interval start beyond the victim just handled.
        while victim_time >= time + spec.interval {
            time += spec.interval;
        }
        time += spec.interval;
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_interval_attack_row_count() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("attack.csv");
        let spec = IntervalAttackSpec {
            interval: 100,
            vms_per_interval: 3,
            lifetime: 50,
            min_time: 0,
            max_time: 1000,
            cores: 2,
            memory: 4,
            subscription_id: "attacker".into(),
            new_sub_id_per_interval: false,
        };
        generate_interval_attack(&spec, &out).unwrap();
        let content = std::fs::read_to_string(&out).unwrap();
        assert_eq!(content.lines().count(), 30);
        // the generated rows parse back in
        let mut trace = Trace::new();
        let vms = parser::parse_trace_file(
            &mut trace,
            &out,
            &ParseOptions {
                min_time: 0,
                max_time: SimTime::MAX,
                malicious_sets: 1,
                includes_targets: false,
                forbid_existing_subs: false,
            },
        )
        .unwrap();
        assert_eq!(vms.len(), 30);
        assert_eq!(trace.subs.len(), 1);
    }

    #[test]
    fn test_interval_attack_fresh_sub_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("attack.csv");
        let spec = IntervalAttackSpec {
            interval: 100,
            vms_per_interval: 1,
            lifetime: 50,
            min_time: 0,
            max_time: 300,
            cores: 2,
            memory: 4,
            subscription_id: "atk".into(),
            new_sub_id_per_interval: true,
        };
        generate_interval_attack(&spec, &out).unwrap();
        let mut trace = Trace::new();
        parser::parse_trace_file(
            &mut trace,
            &out,
            &ParseOptions {
                min_time: 0,
                max_time: SimTime::MAX,
                malicious_sets: 1,
                includes_targets: false,
                forbid_existing_subs: false,
            },
        )
        .unwrap();
        assert_eq!(trace.subs.len(), 3);
        assert!(trace.sub_by_id("atk-0").is_some());
        assert!(trace.sub_by_id("atk-200").is_some());
    }

    #[test]
    fn test_targeted_attack_rows_reference_victims() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dataset.csv");
        std::fs::write(
            &dataset,
            "v1,s1,d,100,500,0,0,0,Unknown,2,4\n\
             v2,s2,d,100,600,0,0,0,Unknown,2,4\n\
             v3,s3,d,900,1200,0,0,0,Unknown,2,4\n",
        )
        .unwrap();
        let out = dir.path().join("attack.csv");
        let spec = TargetedAttackSpec {
            interval: 400,
            lifetime: 60,
            min_time: 0,
            max_time: 2000,
            cores: 2,
            memory: 4,
            subscription_id: "atk".into(),
            new_sub_id_per_interval: false,
            dataset: dataset.clone(),
            dataset_min_time: 0,
            dataset_max_time: SimTime::MAX,
            bursts: 2,
            vms_per_burst: 3,
            burst_interval: 30,
            lead_time: 0,
        };
        let mut rng = StdRng::seed_from_u64(1);
        generate_targeted_attack(&spec, &out, &mut rng).unwrap();

        let content = std::fs::read_to_string(&out).unwrap();
        // two victims get selected (t=100 and t=900), 6 attack VMs each
        assert_eq!(content.lines().count(), 12);
        for row in content.lines() {
            let target = row.rsplit(',').next().unwrap();
            assert!(["v1", "v2", "v3"].contains(&target));
        }
    }
}
