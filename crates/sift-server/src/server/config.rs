use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use sift_ingest::sift_pool::PoolConfig;
use std::path::PathBuf;

/// Runtime configuration for the `sift-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first if present).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sift-server",
    version,
    about = "Classifies a stream of transactions and persists those of interest"
)]
pub struct CliArgs {
    /// Number of concurrent worker slots.
    ///
    /// This is the only concurrency knob: at most this many messages are
    /// processed at once, and reading stops while all slots are busy. Defaults
    /// to the number of logical CPUs.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS")]
    pub num_workers: Option<usize>,

    /// Amount above which a transaction is of interest.
    ///
    /// The comparison is strict: an amount equal to the threshold is not
    /// persisted.
    ///
    /// Environment variable: `THRESHOLD`
    #[arg(long, env = "THRESHOLD", default_value_t = 10_000.0)]
    pub threshold: f64,

    /// Newline-delimited input, or `-` for stdin.
    ///
    /// Environment variable: `INPUT`
    #[arg(long, env = "INPUT", default_value = "-")]
    pub input: String,

    /// JSON-lines output for persisted records, or `-` for stdout.
    ///
    /// Environment variable: `OUTPUT`
    #[arg(long, env = "OUTPUT", default_value = "-")]
    pub output: String,

    /// Longest input line kept, in bytes. Longer lines are truncated and
    /// counted as parse errors.
    ///
    /// Environment variable: `MAX_LINE_BYTES`
    #[arg(long, env = "MAX_LINE_BYTES", default_value_t = sift_ingest::DEFAULT_MAX_LINE_LEN)]
    pub max_line_bytes: usize,

    /// Seconds to wait for in-flight messages on shutdown. `0` waits
    /// indefinitely.
    ///
    /// Environment variable: `DRAIN_TIMEOUT_SECS`
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 0)]
    pub drain_timeout_secs: u64,

    /// Seconds between counter reports in the log. `0` disables the report.
    ///
    /// Environment variable: `REPORT_INTERVAL_SECS`
    #[arg(long, env = "REPORT_INTERVAL_SECS", default_value_t = 10)]
    pub report_interval_secs: u64,
}

/// Where messages come from or records go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Stdio,
    File(PathBuf),
}

impl From<String> for Endpoint {
    fn from(value: String) -> Self {
        if value == "-" {
            Self::Stdio
        } else {
            Self::File(PathBuf::from(value))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub pool: PoolConfig,
    pub threshold: f64,
    pub input: Endpoint,
    pub output: Endpoint,
    pub max_line_bytes: usize,
    pub report_interval: Option<Duration>,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let num_workers = args.num_workers.unwrap_or_else(num_cpus::get);
        if num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.max_line_bytes == 0 {
            bail!("MAX_LINE_BYTES must be greater than 0");
        }

        if !args.threshold.is_finite() {
            bail!("THRESHOLD must be a finite number (got {})", args.threshold);
        }

        let mut pool = PoolConfig::new(num_workers);
        if args.drain_timeout_secs > 0 {
            pool = pool.with_drain_timeout(Duration::from_secs(args.drain_timeout_secs));
        }

        let report_interval =
            (args.report_interval_secs > 0).then(|| Duration::from_secs(args.report_interval_secs));

        Ok(Self {
            pool,
            threshold: args.threshold,
            input: args.input.into(),
            output: args.output.into(),
            max_line_bytes: args.max_line_bytes,
            report_interval,
        })
    }
}
