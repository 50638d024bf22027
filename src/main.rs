use std::{
    path::PathBuf,
    process,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use average::Estimate;
use clap::Parser;
use memsched::{
    Policy, PolicyKind, Result, Sim, SimConfig, SimReport, WorkloadSpec,
    clock::{RealtimeClock, SimClock, TickSource},
    exec::{InlineLauncher, Launcher, ThreadLauncher},
    scheduler::{Hpf, RoundRobin, Srtn},
};
use rand::prelude::*;

#[derive(Debug, Parser)]
#[command(about = "Simulate CPU scheduling with buddy-allocated memory admission")]
struct Args {
    /// hpf, srtn or rr
    #[arg(short = 's', long, default_value = "hpf")]
    policy: PolicyKind,
    /// Round robin quantum in ticks
    #[arg(short, long, default_value_t = memsched::config::DEFAULT_QUANTUM)]
    quantum: u64,
    /// Total memory, a power of two
    #[arg(short, long, default_value_t = memsched::config::DEFAULT_MEMORY_CAPACITY)]
    memory: u64,
    /// Ticks over which workloads may arrive
    #[arg(long, default_value_t = 100)]
    horizon: u64,
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Write scheduler.log, memory.log and scheduler.perf here
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Wall-clock length of a tick; ticks are instant when unset
    #[arg(long)]
    tick_ms: Option<u64>,
    /// Back each workload with a worker thread
    #[arg(long)]
    threads: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut config = SimConfig::new(args.policy)
        .with_quantum(args.quantum)
        .with_memory_capacity(args.memory);
    if let Some(dir) = &args.log_dir {
        config = config.with_log_dir(dir);
    }

    // Ctrl-C tears the simulation down instead of killing it mid-tick
    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst)) {
        log::warn!("could not install the interrupt handler: {err}");
    }

    let workloads = bernoulli_workloads(args.horizon, 0.3, 0.3, 2, 6, args.memory, args.seed);
    let result = match args.policy {
        PolicyKind::Hpf => simulate::<Hpf>(&args, config, workloads, interrupt),
        PolicyKind::Srtn => simulate::<Srtn>(&args, config, workloads, interrupt),
        PolicyKind::RoundRobin => simulate::<RoundRobin>(&args, config, workloads, interrupt),
    };

    match result {
        Ok(report) => print_report(&report),
        Err(err) => {
            eprintln!("memsched: {err}");
            process::exit(1);
        }
    }
}

fn simulate<P: Policy>(
    args: &Args,
    config: SimConfig,
    workloads: Vec<WorkloadSpec>,
    interrupt: Arc<AtomicBool>,
) -> Result<SimReport> {
    match (args.threads, args.tick_ms) {
        (false, None) => drive(Sim::<P>::new(config, workloads)?, interrupt),
        (true, None) => drive(
            Sim::<P, _, _>::with_parts(
                config,
                workloads,
                ThreadLauncher::default(),
                SimClock::default(),
            )?,
            interrupt,
        ),
        (false, Some(ms)) => drive(
            Sim::<P, _, _>::with_parts(
                config,
                workloads,
                InlineLauncher,
                RealtimeClock::new(Duration::from_millis(ms)),
            )?,
            interrupt,
        ),
        (true, Some(ms)) => drive(
            Sim::<P, _, _>::with_parts(
                config,
                workloads,
                ThreadLauncher::default(),
                RealtimeClock::new(Duration::from_millis(ms)),
            )?,
            interrupt,
        ),
    }
}

fn drive<P: Policy, L: Launcher, C: TickSource>(
    sim: Sim<P, L, C>,
    interrupt: Arc<AtomicBool>,
) -> Result<SimReport> {
    let mut sim = sim.with_interrupt_flag(interrupt);
    let mut current_idle = 0;
    let mut max_idle = 0;

    while !sim.is_done() && !sim.check_interrupt() {
        let tick = sim.step()?;
        for event in &tick.memory {
            println!("t={} {}", tick.at, event);
        }
        for event in &tick.scheduling {
            println!("t={} {}", tick.at, event);
        }

        if sim.running().is_none() && !sim.is_done() {
            current_idle += 1;
            max_idle = max_idle.max(current_idle);
        } else {
            current_idle = 0;
        }
    }

    println!("Longest idle period: {max_idle} ticks");
    sim.into_report()
}

fn print_report(report: &SimReport) {
    let response_times = report
        .finished
        .iter()
        .filter_map(|r| r.start_time.map(|s| (s - r.arrival_time) as f64));

    if report.interrupted {
        println!("Interrupted before the schedule drained");
    }
    println!("Policy: {}", report.policy);
    println!("Finished workloads: {}", report.finished.len());
    // Time to first run
    println!("Average response time: {:.2} ticks", avg(response_times));
    println!("{}", report.summary);
}

fn bernoulli_workloads(
    ticks: u64,
    p_arrival: f64,
    p_short: f64,
    short_ticks: u64,
    long_ticks: u64,
    memory: u64,
    seed: u64,
) -> Vec<WorkloadSpec> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut workloads = Vec::new();
    let max_request = (memory / 4).max(1);

    for t in 0..ticks {
        if rng.random::<f64>() < p_arrival {
            let runtime = if rng.random::<f64>() < p_short {
                short_ticks
            } else {
                long_ticks
            };

            workloads.push(WorkloadSpec {
                id: workloads.len() as u64 + 1,
                arrival_time: t,
                runtime,
                priority: rng.random_range(0..=10),
                memory_size: rng.random_range(1..=max_request),
            });
        }
    }

    workloads
}

fn avg(iter: impl Iterator<Item = f64>) -> f64 {
    iter.collect::<average::Mean>().estimate()
}
