//! coresim - adversarial VM placement simulator
//!
//! Replays a cloud VM trace against a placement strategy under a threat
//! model where a fraction of subscriptions is malicious, and reports how
//! often benign tenants end up co-resident with them.
//!
//! Subcommands:
//! - `simulate`: run a trace against one placement strategy
//! - `gen-interval-attack`: synthesize an isochronous attacker workload
//! - `gen-targeted-attack`: synthesize a targeted attacker workload
//!
//! Binary: coresim

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coresim_core::{SimConfig, SimTime, Trace, VmId};
use coresim_engine::{build_policy, mark_malicious_subscriptions, Algorithm, Engine, World};

mod gen;
mod parser;
mod report;

use parser::ParseOptions;

/// coresim - VM placement simulation under an adversarial tenant model
#[derive(Parser)]
#[command(name = "coresim")]
#[command(about = "Simulate VM placement strategies against malicious tenants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a placement simulation over a VM trace
    Simulate(SimulateArgs),

    /// Generate a workload of VMs launched in bursts at a fixed cadence
    GenIntervalAttack(GenIntervalArgs),

    /// Generate a workload of VM bursts aimed at victims from a dataset
    GenTargetedAttack(GenTargetedArgs),
}

#[derive(clap::Args)]
struct SimulateArgs {
    /// VM trace CSV file
    #[arg(short, long, default_value = "vmtable.csv")]
    vm_file: PathBuf,

    /// Placement strategy: Azar, BestFit, DedicatedInstance, FirstFit,
    /// Han, HanKeepOn, KnownUsers, KnownUsers-LowestAvgSeen, KnownVMs,
    /// KnownVMs-LowestAvgSeen, LDBR, NextFit, PCUF, RandomActive, WorstFit
    #[arg(short, long)]
    alg: String,

    /// PRNG seed; omit for a nondeterministic run
    #[arg(short, long)]
    seed: Option<u64>,

    /// Number of hosts
    #[arg(short = 'n', long, default_value_t = 200_000)]
    hosts: usize,

    /// Hosts initially active (group size for the Han strategies)
    #[arg(short = 'b', long, default_value_t = 0)]
    active_hosts: usize,

    /// Cores per host
    #[arg(short, long, default_value_t = 32)]
    cores: i64,

    /// Memory per host (GiB)
    #[arg(short, long, default_value_t = 224.0)]
    memory: f64,

    /// Lower bound of the simulated window
    #[arg(long)]
    min_time: Option<SimTime>,

    /// Upper bound of the simulated window
    #[arg(long)]
    max_time: Option<SimTime>,

    /// Interval between statistics ticks (seconds)
    #[arg(long, default_value_t = 21_600)]
    stat_interval: i64,

    /// First time for which statistics are generated (default: min time)
    #[arg(long)]
    stat_min_time: Option<SimTime>,

    /// Comma-separated proportions of malicious subscriptions, one
    /// malicious set each
    #[arg(long = "malsubs", value_delimiter = ',', default_value = "0.05")]
    malicious_proportions: Vec<f64>,

    /// Comma-separated trace files whose subscriptions are forced
    /// malicious in every set
    #[arg(long = "malsubdata", value_delimiter = ',')]
    malicious_data: Vec<PathBuf>,

    /// Parse target VM ids from the malicious data files
    #[arg(long = "malsubdata-has-targets")]
    malicious_data_has_targets: bool,

    /// Rewrite every malicious VM loaded from data files to this
    /// subscription id
    #[arg(long = "replace-malicious-sub-id")]
    replace_malicious_sub_id: Option<String>,

    /// Skip the malicious-event log file
    #[arg(long)]
    no_malevents: bool,

    /// Han cap on same-subscription VMs per host
    #[arg(long, default_value_t = 4)]
    n_star: u32,

    /// Azar threshold: cores of the largest standard VM
    #[arg(long, default_value_t = 16)]
    max_cores: i64,

    /// Azar threshold: memory of the largest standard VM (GiB)
    #[arg(long, default_value_t = 112.0)]
    max_memory: f64,

    /// Mode of the PERT distribution for malicious subscriptions (LDBR)
    #[arg(long, default_value_t = 0.9)]
    pert_mode: f64,

    /// Lambda of the PERT distribution (LDBR)
    #[arg(long, default_value_t = 3.0)]
    pert_lambda: f64,

    /// Filename prefix for CSV result output
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(clap::Args)]
struct GenIntervalArgs {
    /// Interval between attack bursts (seconds)
    #[arg(short, long)]
    interval: i64,

    /// VMs launched per interval
    #[arg(short, long)]
    vms_per_interval: u32,

    /// Lifetime of each VM (seconds)
    #[arg(short, long)]
    lifetime: i64,

    /// First burst time
    #[arg(long)]
    min_time: SimTime,

    /// End of the attack window
    #[arg(long)]
    max_time: SimTime,

    /// Cores per attack VM
    #[arg(short, long, default_value_t = 2)]
    cores: i64,

    /// Memory per attack VM (GiB)
    #[arg(short, long, default_value_t = 4)]
    memory: i64,

    /// Subscription id of the attacker
    #[arg(long = "sub-id")]
    subscription_id: String,

    /// Use a fresh subscription id per interval (the configured id becomes
    /// a prefix)
    #[arg(long)]
    new_sub_id_per_interval: bool,

    /// Output file
    #[arg(short = 'f', long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct GenTargetedArgs {
    /// Interval between victim selections (seconds)
    #[arg(short, long)]
    interval: i64,

    /// Lifetime of each attack VM (seconds)
    #[arg(short, long)]
    lifetime: i64,

    /// Start of the attack window
    #[arg(long)]
    min_time: SimTime,

    /// End of the attack window
    #[arg(long)]
    max_time: SimTime,

    /// Cores per attack VM
    #[arg(short, long, default_value_t = 2)]
    cores: i64,

    /// Memory per attack VM (GiB)
    #[arg(short, long, default_value_t = 4)]
    memory: i64,

    /// Subscription id of the attacker
    #[arg(long = "sub-id")]
    subscription_id: String,

    /// Use a fresh subscription id per interval
    #[arg(long)]
    new_sub_id_per_interval: bool,

    /// Dataset to sample victim VMs from
    #[arg(short, long)]
    dataset: PathBuf,

    /// Minimum time for loading the dataset (default: min time)
    #[arg(long)]
    dataset_min_time: Option<SimTime>,

    /// Maximum time for loading the dataset (default: max time)
    #[arg(long)]
    dataset_max_time: Option<SimTime>,

    /// PRNG seed for victim selection
    #[arg(short, long)]
    seed: Option<u64>,

    /// Attack bursts per victim
    #[arg(long)]
    bursts: u32,

    /// VMs per burst
    #[arg(long = "burst-vms")]
    vms_per_burst: u32,

    /// Interval between bursts (seconds)
    #[arg(long)]
    burst_interval: i64,

    /// Time of the first burst before the victim's creation
    #[arg(long, default_value_t = 0)]
    lead_time: i64,

    /// Output file
    #[arg(short = 'f', long)]
    output: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coresim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    let result = match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::GenIntervalAttack(args) => run_gen_interval(args),
        Commands::GenTargetedAttack(args) => run_gen_targeted(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            // semantic failures exit with -1, i.e. 255
            ExitCode::from(255)
        }
    }
}

fn run_simulate(args: SimulateArgs) -> anyhow::Result<()> {
    let cfg = SimConfig {
        num_hosts: args.hosts,
        active_hosts: args.active_hosts,
        cores_per_host: args.cores,
        memory_per_host: args.memory,
        min_time: args.min_time.unwrap_or(0),
        max_time: args.max_time.unwrap_or(SimTime::MAX),
        stat_interval: args.stat_interval,
        stat_min_time: args.stat_min_time,
        malicious_proportions: args.malicious_proportions.clone(),
        n_star: args.n_star,
        max_cores: args.max_cores,
        max_memory: args.max_memory,
        pert_mode: args.pert_mode,
        pert_lambda: args.pert_lambda,
        seed: args.seed,
    };
    cfg.validate()?;
    let alg: Algorithm = args.alg.parse()?;

    info!("parsing {}", args.vm_file.display());
    let mut trace = Trace::new();
    let base_opts = ParseOptions {
        min_time: cfg.min_time,
        max_time: cfg.max_time,
        malicious_sets: cfg.malicious_sets(),
        includes_targets: false,
        forbid_existing_subs: false,
    };
    parser::parse_trace_file(&mut trace, &args.vm_file, &base_opts)?;

    // The labelling stream uses the seed directly; 0 when unspecified.
    mark_malicious_subscriptions(
        &mut trace.subs,
        &cfg.malicious_proportions,
        cfg.seed.unwrap_or(0),
    );

    let mut mal_vms: Vec<VmId> = Vec::new();
    for file in &args.malicious_data {
        info!("parsing malicious data {}", file.display());
        let opts = ParseOptions {
            includes_targets: args.malicious_data_has_targets,
            forbid_existing_subs: true,
            ..base_opts.clone()
        };
        let added = parser::parse_trace_file(&mut trace, file, &opts)?;
        for &vm in &added {
            let sub = trace.vms[vm.0].subscription;
            for ms in 0..cfg.malicious_sets() {
                trace.subs[sub.0].malicious[ms] = true;
            }
        }
        mal_vms.extend(added);
    }

    let creations = trace.sorted_by_creation();
    let deletions = trace.sorted_by_deletion();

    // Rewriting after sorting keeps event order identical between runs
    // with constant and dynamic attacker subscription ids.
    if let Some(replacement_id) = &args.replace_malicious_sub_id {
        replace_malicious_subscription(&mut trace, &mal_vms, replacement_id, cfg.malicious_sets());
    }
    if args.malicious_data_has_targets {
        trace.resolve_targets();
    }

    let placement_rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    let mut world = World::new(trace, &cfg, placement_rng);
    let policy = build_policy(alg, &mut world, &cfg)?;
    let mut engine = Engine::new(world, policy, &cfg);

    info!("simulating {} VM requests with {}", creations.len(), args.alg);
    engine.run(&creations, &deletions)?;

    let summary = engine.summary(&creations);
    info!("algorithm: {}", summary.algorithm);
    if let Some(seed) = cfg.seed {
        info!("seed: {seed}");
    }
    info!("core utilisation: {}", summary.core_utilisation);

    if let Some(prefix) = &args.output {
        let seed = cfg.seed.unwrap_or(0);
        let maldata = maldata_tag(&args.malicious_data);
        report::write_summary(prefix, &summary, seed, &maldata, &cfg.malicious_proportions)?;
        report::write_series(prefix, engine.series(), &cfg, seed, &maldata)?;
        if !args.malicious_data.is_empty() {
            report::write_target_reports(prefix, &maldata, &engine.world, &mal_vms, args.no_malevents)?;
        }
        info!("results written to {prefix}*");
    }

    Ok(())
}

/// Collapse every malicious VM onto one subscription id. An existing
/// subscription of that id is reused as-is; otherwise a new one is created,
/// malicious in every set, first seen at the earliest malicious creation.
fn replace_malicious_subscription(
    trace: &mut Trace,
    mal_vms: &[VmId],
    replacement_id: &str,
    malicious_sets: usize,
) {
    if mal_vms.is_empty() {
        return;
    }
    let sub = match trace.sub_by_id(replacement_id) {
        Some(sub) => sub,
        None => {
            let first_created = mal_vms
                .iter()
                .map(|v| trace.vms[v.0].time_created)
                .min()
                .unwrap_or(0);
            let sub = trace.sub_or_insert(replacement_id, first_created, malicious_sets);
            for ms in 0..malicious_sets {
                trace.subs[sub.0].malicious[ms] = true;
            }
            sub
        }
    };
    for &vm in mal_vms {
        trace.vms[vm.0].subscription = sub;
    }
}

/// Tag identifying the malicious dataset in report rows: the first file's
/// name without its `.csv` extension, or "none".
fn maldata_tag(files: &[PathBuf]) -> String {
    match files.first() {
        Some(file) => {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            name.strip_suffix(".csv").unwrap_or(&name).to_string()
        }
        None => "none".to_string(),
    }
}

fn run_gen_interval(args: GenIntervalArgs) -> anyhow::Result<()> {
    let spec = gen::IntervalAttackSpec {
        interval: args.interval,
        vms_per_interval: args.vms_per_interval,
        lifetime: args.lifetime,
        min_time: args.min_time,
        max_time: args.max_time,
        cores: args.cores,
        memory: args.memory,
        subscription_id: args.subscription_id,
        new_sub_id_per_interval: args.new_sub_id_per_interval,
    };
    gen::generate_interval_attack(&spec, &args.output)?;
    info!("attack workload written to {}", args.output.display());
    Ok(())
}

fn run_gen_targeted(args: GenTargetedArgs) -> anyhow::Result<()> {
    let spec = gen::TargetedAttackSpec {
        interval: args.interval,
        lifetime: args.lifetime,
        min_time: args.min_time,
        max_time: args.max_time,
        cores: args.cores,
        memory: args.memory,
        subscription_id: args.subscription_id,
        new_sub_id_per_interval: args.new_sub_id_per_interval,
        dataset: args.dataset,
        dataset_min_time: args.dataset_min_time.unwrap_or(args.min_time),
        dataset_max_time: args.dataset_max_time.unwrap_or(args.max_time),
        bursts: args.bursts,
        vms_per_burst: args.vms_per_burst,
        burst_interval: args.burst_interval,
        lead_time: args.lead_time,
    };
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_entropy(),
    };
    gen::generate_targeted_attack(&spec, &args.output, &mut rng)?;
    info!("attack workload written to {}", args.output.display());
    Ok(())
}
