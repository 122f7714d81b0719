//! shm-worker - demo driver for shared-memory workers.

mod cli;

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::{OwoColorize, Stream::Stderr};
use rand::Rng;
use shm_worker::logging::{self, LogConfig};
use shm_worker::{Array, Doubler, Interrupt, SharedMemoryManager, Worker, WorkerConfig};
use tracing::{debug, info};

use cli::{Cli, Commands, RunArgs};

/// How often the driver polls the output channel while waiting for a result.
const OUTPUT_POLL: Duration = Duration::from_millis(10);

/// Program entry point: parses CLI arguments, runs the selected command, and
/// prints the error chain on failure before exiting with status 1.
fn main() {
    let cli = Cli::parse();

    if cli.no_color {
        owo_colors::set_override(false);
    }
    init_logging(&cli);

    let result = match &cli.command {
        Commands::Run(args) => cmd_run(args),
    };

    if let Err(e) = result {
        eprintln!(
            "{}: {}",
            "error"
                .if_supports_color(Stderr, |text| text.red())
                .if_supports_color(Stderr, |text| text.bold()),
            e
        );
        for cause in e.chain().skip(1) {
            eprintln!(
                "  {}: {}",
                "caused by".if_supports_color(Stderr, |text| text.yellow()),
                cause
            );
        }
        std::process::exit(1);
    }
}

/// Set up tracing. Flags win over environment variables.
fn init_logging(cli: &Cli) {
    let mut config = LogConfig::from_verbosity(cli.verbose, cli.quiet).with_no_color(cli.no_color);
    if let Some(level) = &cli.log_level {
        config = config.with_filter(level.clone());
    }
    config = config.with_env_overrides();
    if let Some(format) = cli.log_format {
        config = config.with_format(format.into());
    }
    logging::init(config);
}

fn worker_config(args: &RunArgs) -> Result<WorkerConfig> {
    let mut config = WorkerConfig::default().with_env_overrides();

    if let Some(secs) = args.launch_timeout {
        let timeout = Duration::try_from_secs_f64(secs).with_context(|| {
            format!("--launch-timeout must be a non-negative number of seconds, got {secs}")
        })?;
        config = config.with_launch_timeout(timeout);
    }
    if let Some(capacity) = args.capacity {
        config = config.with_capacity(capacity as usize);
    }
    if let Some(ms) = args.poll_interval_ms {
        config = config.with_poll_interval(Duration::from_millis(ms));
    }
    if args.worker_verbose {
        config = config.with_verbose(true);
    }

    config.validate()?;
    Ok(config)
}

/// Feed random arrays to a doubling worker, printing each input and result.
fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = worker_config(args)?;
    let interrupt = Interrupt::install().context("Failed to install Ctrl+C handler")?;

    let shape = args.shape.0.clone();
    let period = Duration::from_millis(args.period_ms);
    let manager = SharedMemoryManager::start();
    let example = Array::<i32>::zeros(shape.clone());
    let unit = Doubler::new(&example);
    let mut worker = Worker::new(&manager, &example, &example, unit, config)
        .context("Failed to set up worker channels")?;
    let mut rng = rand::rng();

    let started = Instant::now();
    let rounds = worker.scope(|worker| -> Result<u64> {
        let mut round = 0u64;
        while !interrupt.is_set() && args.count.is_none_or(|n| round < n) {
            let data: Vec<i32> = (0..example.len())
                .map(|_| rng.random_range(0..100))
                .collect();
            let input = Array::from_vec(shape.clone(), data)?;
            worker.put_to_input(&input);

            let Some(output) = wait_for_output(worker, &interrupt)? else {
                break;
            };
            println!("Input:\n{}", input);
            println!("Output (2 x Input):\n{}", output);
            round += 1;

            if args.count.is_none_or(|n| round < n) {
                sleep_unless_interrupted(period, &interrupt);
            }
        }
        Ok(round)
    })?;

    info!(rounds, elapsed = ?started.elapsed(), "Demo finished");
    debug!(stats = ?worker.stats(), "Worker counters");

    drop(worker);
    manager.stop();
    Ok(())
}

/// Poll the output channel until one result arrives.
///
/// Returns `None` if interrupted first, and an error if the worker died.
fn wait_for_output(
    worker: &mut Worker<'_, i32, i32, Doubler>,
    interrupt: &Interrupt,
) -> Result<Option<Array<i32>>> {
    loop {
        if let Some(output) = worker.get_from_output(1).pop() {
            return Ok(Some(output));
        }
        if interrupt.is_set() {
            return Ok(None);
        }
        if !worker.is_alive() {
            let reason = worker
                .termination()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unknown reason".to_string());
            anyhow::bail!("Worker exited unexpectedly: {}", reason);
        }
        std::thread::sleep(OUTPUT_POLL);
    }
}

fn sleep_unless_interrupted(period: Duration, interrupt: &Interrupt) {
    let deadline = Instant::now() + period;
    while !interrupt.is_set() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep(OUTPUT_POLL.min(deadline - now));
    }
}
