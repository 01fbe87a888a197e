//! Trace CSV ingestion.
//!
//! One VM per row, comma-separated, no header:
//! `vm_id, subscription_id, deployment_id, created, deleted, max_cpu,
//! avg_cpu, p95_cpu, category, cores, memory[, target_vm_id]`.
//!
//! The deployment id and the three CPU statistics are ignored. Rows whose
//! cores or memory token contains `>` encode a greater-than range in the
//! public dataset and are skipped, as are rows outside the configured time
//! window. Duplicate VM ids are fatal.

use std::path::Path;

use coresim_core::{Result, SimError, SimTime, Trace, VmId};
use tracing::debug;

/// Options for one file parse.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    pub min_time: SimTime,
    pub max_time: SimTime,
    pub malicious_sets: usize,
    /// Rows carry a trailing target VM id column.
    pub includes_targets: bool,
    /// Reject subscription ids that already exist in the trace (used for
    /// malicious-subscription files, which must not collide with the base
    /// trace).
    pub forbid_existing_subs: bool,
}

/// Parse one trace file into `trace`, returning the VMs it contributed.
pub fn parse_trace_file(trace: &mut Trace, path: &Path, opts: &ParseOptions) -> Result<Vec<VmId>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(io) => SimError::Io(io),
            other => SimError::row(0, format!("{other:?}")),
        })?;

    // Subscriptions below this index predate this file.
    let preexisting_subs = trace.subs.len();
    let mut added = Vec::new();
    let mut line: u64 = 0;

    for record in reader.records() {
        line += 1;
        let record = record.map_err(|e| SimError::row(line, e.to_string()))?;

        let field = |idx: usize| -> Result<&str> {
            record
                .get(idx)
                .ok_or_else(|| SimError::row(line, format!("missing field {idx}")))
        };

        let vm_id = field(0)?.to_string();
        let sub_id = field(1)?.to_string();
        // field 2 is the deployment id; ignored
        let time_created: SimTime = field(3)?
            .parse()
            .map_err(|e| SimError::row(line, format!("bad creation time: {e}")))?;
        let time_deleted: SimTime = field(4)?
            .parse()
            .map_err(|e| SimError::row(line, format!("bad deletion time: {e}")))?;
        // fields 5-7 are CPU usage statistics; ignored
        let category = field(8)?.to_string();

        let cores_token = field(9)?;
        let memory_token = field(10)?;
        if cores_token.contains('>') || memory_token.contains('>') {
            // greater-than buckets from the public dataset
            continue;
        }
        let cores: i64 = cores_token
            .parse()
            .map_err(|e| SimError::row(line, format!("bad core count: {e}")))?;
        let memory: f64 = memory_token
            .parse()
            .map_err(|e| SimError::row(line, format!("bad memory size: {e}")))?;

        let target_vm_id = if opts.includes_targets {
            Some(field(11)?.to_string())
        } else {
            None
        };

        // Ignore VMs created or deleted outside the configured window.
        if time_created < opts.min_time || time_deleted > opts.max_time {
            continue;
        }

        if let Some(existing) = trace.sub_by_id(&sub_id) {
            if opts.forbid_existing_subs && existing.0 < preexisting_subs {
                return Err(SimError::DuplicateSubscriptionId(sub_id));
            }
        }
        let sub = trace.sub_or_insert(&sub_id, time_created, opts.malicious_sets);

        let vm = trace.add_vm(
            &vm_id,
            sub,
            time_created,
            time_deleted,
            cores,
            memory,
            category,
            opts.malicious_sets,
            target_vm_id,
        )?;
        added.push(vm);
    }

    debug!("parsed {} VMs from {}", added.len(), path.display());
    Ok(added)
}
