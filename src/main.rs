use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use average::Estimate;
use clap::Parser;
use mlfq_model::core::FileSystem;
use mlfq_model::io::{read_processes, DiskSpec};
use mlfq_model::{KernelConfig, KernelError, KernelResult, MlfqScheduler, ProcessRecord, Sim};
use rand::prelude::*;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mlfq-model")]
#[command(version)]
#[command(about = "Multilevel feedback queue kernel model")]
struct Cli {
    /// Process description file
    #[arg(required_unless_present = "synthetic")]
    processes: Option<PathBuf>,

    /// File-system description file
    files: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Generate this many ticks of random arrivals instead of reading a process file
    #[arg(long, value_name = "TICKS")]
    synthetic: Option<u64>,

    /// Seed for --synthetic
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log filter, overrides -v (e.g. "info" or "mlfq_model::sim=debug")
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let log_level = cli.log_level.as_deref().unwrap_or(match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> KernelResult<()> {
    let config = match &cli.config {
        Some(path) => KernelConfig::load(path)?,
        None => KernelConfig::default(),
    };

    let records = match (cli.synthetic, &cli.processes) {
        (Some(ticks), _) => bernoulli_processes(ticks, 0.3, 0.1, cli.seed),
        (None, Some(path)) => read_processes(path)?,
        (None, None) => {
            return Err(KernelError::InvalidConfiguration(
                "a process file or --synthetic is required".into(),
            ))
        }
    };

    let disk = match &cli.files {
        Some(path) => DiskSpec::from_file(path)?,
        None => DiskSpec {
            total_blocks: 16,
            existing: Vec::new(),
            ops: Vec::new(),
        },
    };
    let mut files = FileSystem::new(disk.total_blocks);
    files.load_existing(&disk.existing)?;

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            println!("{event}");
        }
    });

    let sim = Sim::<MlfqScheduler>::new(config, files)?;
    let report = sim.run(records, &disk.ops, tx)?;
    // All senders are gone once run() returns.
    let _ = printer.join();

    let turnaround = report.processes_map(|p| p.turnaround().map(|t| t as f64));
    let response = report.processes_map(|p| p.response().map(|t| t as f64));

    println!();
    println!("Completed processes: {}", report.completed());
    println!("Dropped processes: {}", report.dropped.len());
    println!("Total ticks: {}", report.total_ticks);
    println!("Average response time: {:.2} ticks", avg(response));
    println!("Average turnaround time: {:.2} ticks", avg(turnaround));
    Ok(())
}

/// Random workload: each tick a process arrives with probability `p_arrival`,
/// real-time with probability `p_real_time`.
fn bernoulli_processes(ticks: u64, p_arrival: f64, p_real_time: f64, seed: u64) -> Vec<ProcessRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::new();

    for t in 0..ticks {
        if rng.random::<f64>() < p_arrival {
            let real_time = rng.random::<f64>() < p_real_time;
            let flag = |rng: &mut StdRng| u32::from(rng.random::<f64>() < 0.2);
            records.push(ProcessRecord {
                arrival_delay: t,
                tier: if real_time { 0 } else { rng.random_range(1..=5) },
                total_cpu: rng.random_range(1..=12),
                memory_size: if real_time {
                    rng.random_range(1..=16)
                } else {
                    rng.random_range(1..=128)
                },
                printer: if real_time { 0 } else { rng.random_range(0..=2) },
                scanner: if real_time { 0 } else { flag(&mut rng) },
                modem: if real_time { 0 } else { flag(&mut rng) },
                port: if real_time { 0 } else { rng.random_range(0..=3) },
            });
        }
    }

    records
}

fn avg(values: Vec<f64>) -> f64 {
    values.into_iter().collect::<average::Mean>().estimate()
}
