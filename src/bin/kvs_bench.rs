//! Key/value store benchmark.
//!
//! Writes or reads a batch of keys against one or more stores from several
//! threads and prints the achieved throughput.

use clap::Parser;
use logkv::bench::{self, BenchConfig, EngineKind, Op, ValueGen};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kvs-bench")]
#[command(about = "Throughput benchmark for the logkv storage engines")]
struct Args {
    /// Number of operations
    #[arg(short = 'n', default_value = "1000000")]
    n: u64,

    /// Number of distinct keys (defaults to the number of operations)
    #[arg(short = 'N', long = "keys", default_value = "0")]
    key_space: u64,

    /// First key id
    #[arg(long = "start", default_value = "0")]
    start_key: u64,

    /// Operation to run
    #[arg(long, value_enum, default_value = "randwrite")]
    op: Op,

    /// Progress report interval per thread, 0 disables it
    #[arg(short = 'r', default_value = "100000")]
    report_interval: u64,

    /// Smallest value size
    #[arg(short = 's', default_value = "50")]
    value_size_small: usize,

    /// Value size upper bound (exclusive)
    #[arg(short = 'S', default_value = "51")]
    value_size_big: usize,

    /// Worker threads
    #[arg(short = 't', default_value = "8")]
    threads: usize,

    /// Verbosity, 0 (errors only) to 5 (every operation)
    #[arg(short = 'v', default_value = "3")]
    verbosity: u8,

    /// Number of stores keys are sharded over
    #[arg(long = "dbn", default_value = "1")]
    stores: usize,

    /// Storage engine
    #[arg(long = "db", value_enum, default_value = "log")]
    engine: EngineKind,

    /// Value generator
    #[arg(short = 'V', value_enum, default_value = "fnv")]
    value_gen: ValueGen,

    /// Directory for the data files
    #[arg(short, long, default_value = ".")]
    data_dir: PathBuf,
}

impl Args {
    fn into_config(self) -> BenchConfig {
        BenchConfig {
            n: self.n,
            key_space: self.key_space,
            start_key: self.start_key,
            op: self.op,
            report_interval: self.report_interval,
            value_size_small: self.value_size_small,
            value_size_big: self.value_size_big,
            threads: self.threads,
            stores: self.stores,
            engine: self.engine,
            value_gen: self.value_gen,
            data_dir: self.data_dir,
        }
    }
}

fn level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 | 2 => "warn",
        3 => "info",
        4 => "debug",
        _ => "trace",
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level(args.verbosity)));
    fmt().with_env_filter(filter).with_thread_ids(true).init();

    let config = args.into_config();
    tracing::info!(
        op = ?config.op,
        engine = ?config.engine,
        n = config.n,
        threads = config.threads,
        "starting benchmark"
    );

    let report = bench::run(&config)?;
    println!(
        "used time {:.6}, ops {:.6}",
        report.elapsed.as_secs_f64(),
        report.ops_per_sec()
    );

    Ok(())
}
