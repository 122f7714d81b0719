//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use shm_worker::logging::LogFormat;
use std::str::FromStr;

/// Run a computation in a worker process fed through shared memory.
#[derive(Parser, Debug)]
#[command(name = "shm-worker")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    pub quiet: bool,

    /// Log output format.
    #[arg(long, value_enum, env = "SHM_WORKER_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormatArg>,

    /// Log level (overrides -v).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Disable colored output.
    #[arg(long, env = "NO_COLOR", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Feed random arrays to a doubling worker and print each result.
    Run(RunArgs),
}

/// Arguments for the run command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Shape of the input arrays, e.g. `1x3` or `2x2x4`.
    #[arg(long, default_value = "1x3")]
    pub shape: Shape,

    /// Milliseconds to sleep between rounds.
    #[arg(long, default_value_t = 1000)]
    pub period_ms: u64,

    /// Stop after this many rounds (runs until Ctrl-C if omitted).
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Seconds to wait for the worker to become ready.
    #[arg(long, env = "SHM_WORKER_LAUNCH_TIMEOUT")]
    pub launch_timeout: Option<f64>,

    /// Capacity of each shared-memory channel.
    #[arg(long, env = "SHM_WORKER_CAPACITY", value_parser = clap::value_parser!(u64).range(1..))]
    pub capacity: Option<u64>,

    /// Milliseconds the worker sleeps between ticks.
    #[arg(long, env = "SHM_WORKER_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Report dropped items and empty reads.
    #[arg(long)]
    pub worker_verbose: bool,
}

/// Log format argument (maps to logging::LogFormat).
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Compact => LogFormat::Compact,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

/// Array shape given as dimensions joined by `x`, e.g. `1x3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape(pub Vec<usize>);

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dims = s
            .split(['x', 'X', ','])
            .map(|part| {
                part.trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid dimension '{}' in shape '{}'", part, s))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if dims.contains(&0) {
            return Err(format!("shape '{}' has a zero dimension", s));
        }
        Ok(Self(dims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_shape() {
        assert_eq!("1x3".parse::<Shape>().unwrap(), Shape(vec![1, 3]));
        assert_eq!("2X2x4".parse::<Shape>().unwrap(), Shape(vec![2, 2, 4]));
        assert_eq!("5".parse::<Shape>().unwrap(), Shape(vec![5]));
        assert!("1x".parse::<Shape>().is_err());
        assert!("0x3".parse::<Shape>().is_err());
        assert!("axb".parse::<Shape>().is_err());
    }

    #[test]
    fn test_run_defaults() {
        let cli = Cli::try_parse_from(["shm-worker", "run"]).unwrap();
        let Commands::Run(args) = cli.command;
        assert_eq!(args.shape, Shape(vec![1, 3]));
        assert_eq!(args.period_ms, 1000);
        assert!(args.count.is_none());
        assert!(!args.worker_verbose);
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::try_parse_from([
            "shm-worker",
            "-vv",
            "run",
            "--shape",
            "2x2",
            "--period-ms",
            "5",
            "--count",
            "3",
            "--capacity",
            "2",
            "--worker-verbose",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command;
        assert_eq!(args.shape, Shape(vec![2, 2]));
        assert_eq!(args.count, Some(3));
        assert_eq!(args.capacity, Some(2));
        assert!(args.worker_verbose);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(Cli::try_parse_from(["shm-worker", "run", "--capacity", "0"]).is_err());
    }
}
