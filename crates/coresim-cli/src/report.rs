//! CSV report writers.
//!
//! All report files share a prefix and are opened in append mode so that
//! several runs (seeds, malicious datasets) accumulate into one file per
//! metric; the header is written only when the file is created. Time-series
//! files share the schema `seed;maldata;v1;...;vk` with the interval
//! boundary timestamps in the header.

use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use coresim_core::{Result, SimConfig, SimTime, VmId};
use coresim_engine::{IntervalSeries, RunSummary, World};

const SEP: char = ';';

/// Append `row` to `path`, writing `header` first if the file is new.
fn append_row(path: &Path, header: &str, row: &str) -> Result<()> {
    let add_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if add_header {
        writeln!(file, "{header}")?;
    }
    writeln!(file, "{row}")?;
    Ok(())
}

fn prefixed(prefix: &str, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}{suffix}"))
}

/// Append the one-row-per-run summary to `<prefix>.csv`.
pub fn write_summary(
    prefix: &str,
    summary: &RunSummary,
    seed: u64,
    maldata: &str,
    proportions: &[f64],
) -> Result<()> {
    let mut header = [
        "algorithm",
        "seed",
        "maldata",
        "CU",
        "avgHosts",
        "maxHosts",
        "hostBoots",
        "hostShutdowns",
        "numVMCreations",
        "avgActiveVMs",
        "maxActiveVMs",
        "totalSubKnownEntries",
        "avgSubsKnownPerSub",
        "totalSubsSeenByHosts",
        "avgSubsSeenPerHost",
        "avgHostsSeenPerSub",
    ]
    .join(&SEP.to_string());
    for name in [
        "userCLR",
        "vmCLR",
        "unsafeSubVMCLR",
        "safeVMTimeProp",
        "unsafeSubSafeVMTimeProp",
        "safeSubTimeProp",
        "totalCoverage",
    ] {
        for p in proportions {
            header.push(SEP);
            header.push_str(&format!("{name}-ms{p}"));
        }
    }

    let mut row = format!(
        "{alg}{s}{seed}{s}{maldata}{s}{cu}{s}{avg_hosts}{s}{max_hosts}{s}{boots}{s}{shutdowns}{s}{creations}{s}{avg_vms}{s}{max_vms}{s}{known}{s}{avg_known}{s}{seen_by_hosts}{s}{avg_per_host}{s}{avg_per_sub}",
        alg = summary.algorithm,
        s = SEP,
        seed = seed,
        maldata = maldata,
        cu = summary.core_utilisation,
        avg_hosts = summary.avg_hosts_active,
        max_hosts = summary.max_hosts_active,
        boots = summary.hosts_booted,
        shutdowns = summary.hosts_shut_down,
        creations = summary.vm_creations,
        avg_vms = summary.avg_vms_active,
        max_vms = summary.max_vms_active,
        known = summary.total_sub_known_entries,
        avg_known = summary.avg_subs_known_per_sub,
        seen_by_hosts = summary.total_subs_seen_by_hosts,
        avg_per_host = summary.avg_subs_seen_per_host,
        avg_per_sub = summary.avg_hosts_seen_per_sub,
    );
    for value in summary.per_set.iter().map(|m| m.user_clr.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }
    for value in summary.per_set.iter().map(|m| m.vm_clr.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }
    for value in summary.per_set.iter().map(|m| m.unsafe_sub_vm_clr.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }
    for value in summary.per_set.iter().map(|m| m.safe_vm_time.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }
    for value in summary.per_set.iter().map(|m| m.unsafe_sub_safe_vm_time.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }
    for value in summary.per_set.iter().map(|m| m.safe_sub_time.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }
    for value in summary.per_set.iter().map(|m| m.total_coverage.to_string()) {
        row.push(SEP);
        row.push_str(&value);
    }

    append_row(&prefixed(prefix, ".csv"), &header, &row)
}

/// Append one time-series row, deriving the boundary timestamps in the
/// header from the number of recorded values.
fn write_stat_series(
    path: &Path,
    values: &[String],
    seed: u64,
    maldata: &str,
    stat_min_time: SimTime,
    stat_interval: i64,
) -> Result<()> {
    let mut header = format!("seed{SEP}maldata");
    for k in 0..values.len() {
        header.push(SEP);
        header.push_str(&(stat_min_time + (k as i64 + 1) * stat_interval).to_string());
    }
    let row = format!("{seed}{SEP}{maldata}{SEP}{}", values.join(&SEP.to_string()));
    append_row(path, &header, &row)
}

/// Write every per-interval metric file.
pub fn write_series(
    prefix: &str,
    series: &IntervalSeries,
    cfg: &SimConfig,
    seed: u64,
    maldata: &str,
) -> Result<()> {
    let smt = cfg.stat_min_time();
    let si = cfg.stat_interval;
    let mut write = |suffix: &str, values: &[String]| -> Result<()> {
        write_stat_series(&prefixed(prefix, suffix), values, seed, maldata, smt, si)
    };

    write("-overallcu.csv", &series.core_utilisation)?;
    write("-intcu.csv", &series.interval_core_utilisation)?;
    write("-avgvms.csv", &series.avg_vms)?;
    write("-maxvms.csv", &series.max_vms)?;
    write("-minvms.csv", &series.min_vms)?;
    write("-avghosts.csv", &series.avg_hosts)?;
    write("-maxhosts.csv", &series.max_hosts)?;
    write("-minhosts.csv", &series.min_hosts)?;
    write("-vmcreations.csv", &series.vm_creations)?;
    write("-vmdeletions.csv", &series.vm_deletions)?;
    write("-hostboots.csv", &series.hosts_booted)?;
    write("-hostshutdowns.csv", &series.hosts_shut_down)?;

    for (ms, &p) in cfg.malicious_proportions.iter().enumerate() {
        write(&format!("-mal{p}-userclr.csv"), &series.user_clr[ms])?;
        write(&format!("-mal{p}-vmclr.csv"), &series.vm_clr[ms])?;
        write(&format!("-mal{p}-newvmclr.csv"), &series.new_vm_clr[ms])?;
        write(&format!("-mal{p}-unsafesubvmclr.csv"), &series.unsafe_sub_vm_clr[ms])?;
        write(
            &format!("-mal{p}-unsafesubnewvmclr.csv"),
            &series.unsafe_sub_new_vm_clr[ms],
        )?;
        write(&format!("-mal{p}-coverage.csv"), &series.coverage[ms])?;
    }
    Ok(())
}

/// Write the attack-simulation outcome files: the aggregate `-target.csv`
/// plus per-run hit and malicious-event logs.
pub fn write_target_reports(
    prefix: &str,
    maldata: &str,
    world: &World,
    mal_vms: &[VmId],
    no_malevents: bool,
) -> Result<()> {
    let total_hosts = world.hosts.len();
    let covered_hosts = world
        .hosts
        .iter()
        .filter(|h| h.has_hosted_malicious_subscription(0))
        .count();
    let covered_prop = covered_hosts as f64 / total_hosts as f64;

    let mut target_vms: BTreeSet<VmId> = BTreeSet::new();
    let mut target_vms_hit: BTreeSet<VmId> = BTreeSet::new();
    let mut target_subs = BTreeSet::new();
    let mut target_subs_hit = BTreeSet::new();

    let hits_path = prefixed(prefix, &format!("-{maldata}-hits.csv"));
    let malevents_path = prefixed(prefix, &format!("-{maldata}-malevents.csv"));
    let hits_header = ["time", "vm", "subscription", "host", "targetVM", "targetSub"].join(&SEP.to_string());
    let malevents_header =
        ["time", "hit?", "vm", "subscription", "host", "targetVM", "targetSub"].join(&SEP.to_string());

    let mut hit_rows = Vec::new();
    let mut event_rows = Vec::new();

    for &id in mal_vms {
        let vm = &world.vms[id.0];
        let time = vm.time_created;
        let sub = &world.subs[vm.subscription.0];
        let host = vm.first_host.map(|h| h.0.to_string()).unwrap_or_default();

        match vm.target_vm {
            Some(target_id) => {
                let target = &world.vms[target_id.0];
                let target_sub = &world.subs[target.subscription.0];
                target_vms.insert(target_id);
                target_subs.insert(target.subscription);

                if vm.hit_target {
                    target_vms_hit.insert(target_id);
                    target_subs_hit.insert(target.subscription);
                    hit_rows.push(format!(
                        "{time}{SEP}{}{SEP}{}{SEP}{host}{SEP}{}{SEP}{}",
                        vm.id, sub.id, target.id, target_sub.id
                    ));
                }
                event_rows.push(format!(
                    "{time}{SEP}{}{SEP}{}{SEP}{}{SEP}{host}{SEP}{}{SEP}{}",
                    vm.hit_target, vm.id, sub.id, target.id, target_sub.id
                ));
            }
            None => {
                event_rows.push(format!(
                    "{time}{SEP}n/a{SEP}{}{SEP}{}{SEP}{host}{SEP}{SEP}",
                    vm.id, sub.id
                ));
            }
        }
    }

    append_rows(&hits_path, &hits_header, &hit_rows)?;
    if !no_malevents {
        append_rows(&malevents_path, &malevents_header, &event_rows)?;
    }

    let target_header = [
        "malsubdata",
        "totalHosts",
        "hostsSeen",
        "hostsSeenProp",
        "totalTargetVMs",
        "targetVMsSeen",
        "targetVMsSeenProp",
        "totalTargetSubs",
        "targetSubsSeen",
        "targetSubsSeenProp",
    ]
    .join(&SEP.to_string());

    // Hit proportions are -1 when the dataset carried no targets.
    let vm_prop = if target_vms.is_empty() {
        -1.0
    } else {
        target_vms_hit.len() as f64 / target_vms.len() as f64
    };
    let sub_prop = if target_subs.is_empty() {
        -1.0
    } else {
        target_subs_hit.len() as f64 / target_subs.len() as f64
    };
    let target_row = format!(
        "{maldata}{SEP}{total_hosts}{SEP}{covered_hosts}{SEP}{covered_prop}{SEP}{}{SEP}{}{SEP}{vm_prop}{SEP}{}{SEP}{}{SEP}{sub_prop}",
        target_vms.len(),
        target_vms_hit.len(),
        target_subs.len(),
        target_subs_hit.len(),
    );
    append_row(&prefixed(prefix, "-target.csv"), &target_header, &target_row)
}

fn append_rows(path: &Path, header: &str, rows: &[String]) -> Result<()> {
    let add_header = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if add_header {
        writeln!(file, "{header}")?;
    }
    for row in rows {
        writeln!(file, "{row}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_row_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        append_row(&path, "a;b", "1;2").unwrap();
        append_row(&path, "a;b", "3;4").unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a;b\n1;2\n3;4\n");
    }

    #[test]
    fn test_series_header_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("series.csv");
        let values = vec!["0.5".to_string(), "0.6".to_string(), "0.7".to_string()];
        write_stat_series(&path, &values, 42, "none", 0, 21_600).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "seed;maldata;21600;43200;64800\n42;none;0.5;0.6;0.7\n"
        );
    }
}
