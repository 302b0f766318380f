//! Query service benchmark CLI.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use query_bench::{
    workload, BenchConfig, BenchRun, BulkLoader, ConcurrencySpec, DurationSource, HostRotator,
    QueryClient, QueryRunner,
};

#[derive(Parser)]
#[command(name = "query-bench")]
#[command(about = "Latency benchmarks against HTTP query services", long_about = None)]
struct Cli {
    /// YAML file with benchmark settings; flags override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Target hosts, comma separated (e.g. localhost:4200,node2:4200)
    #[arg(long, env = "QUERY_BENCH_HOSTS", value_delimiter = ',', global = true)]
    hosts: Vec<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Measure client-observed latency instead of the server-reported duration
    #[arg(long, global = true)]
    wall_clock: bool,

    /// Disable the progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Time statements given via --stmt or stdin (one per line)
    Timeit {
        /// Statement to benchmark; read from stdin if omitted
        #[arg(short, long)]
        stmt: Option<String>,

        /// Number of unmeasured warmup executions
        #[arg(short, long)]
        warmup: Option<u64>,

        /// Number of measured executions
        #[arg(short, long)]
        repeat: Option<u64>,

        /// Concurrency level, or a range `start..end:step`
        #[arg(short, long)]
        concurrency: Option<ConcurrencySpec>,
    },

    /// Insert JSON objects read from stdin (one per line) using bulk requests
    Insert {
        /// Target table
        #[arg(short, long)]
        table: String,

        /// Rows per bulk request
        #[arg(short, long, default_value = "5000")]
        bulk_size: usize,

        /// Concurrent bulk requests
        #[arg(short, long, default_value = "50")]
        concurrency: u32,

        /// Expected number of records, for progress display
        #[arg(long)]
        num_records: Option<u64>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => BenchConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BenchConfig::default(),
    };

    // Apply overrides
    if !cli.hosts.is_empty() {
        config.hosts = cli.hosts.clone();
    }
    if let Some(t) = cli.timeout {
        config.timeout_secs = t;
    }
    if cli.wall_clock {
        config.duration_source = DurationSource::WallClock;
    }
    if cli.no_progress {
        config.progress = false;
    }

    match cli.command {
        Commands::Timeit {
            stmt,
            warmup,
            repeat,
            concurrency,
        } => {
            if let Some(w) = warmup {
                config.warmup = w;
            }
            if let Some(r) = repeat {
                config.repeats = r;
            }
            if let Some(c) = concurrency {
                config.concurrency = c;
            }
            config.validate()?;
            timeit(&config, stmt).await
        }
        Commands::Insert {
            table,
            bulk_size,
            concurrency,
            num_records,
        } => {
            config.concurrency = ConcurrencySpec::Fixed(concurrency);
            config.validate()?;
            insert(&config, table, bulk_size, num_records).await
        }
    }
}

fn build_client(config: &BenchConfig) -> Result<Arc<QueryClient>> {
    let hosts = HostRotator::from_hosts(&config.hosts)?;
    Ok(Arc::new(QueryClient::new(hosts, &config.client_config())?))
}

async fn timeit(config: &BenchConfig, stmt: Option<String>) -> Result<()> {
    let statements: Box<dyn Iterator<Item = String>> = match stmt {
        Some(stmt) => Box::new(std::iter::once(stmt)),
        None if io::stdin().is_terminal() => Box::new(std::iter::empty()),
        None => Box::new(workload::statements_from_lines(io::stdin().lock())),
    };

    let client = build_client(config)?;
    let runner = QueryRunner::new(client).with_progress(config.progress);

    let mut num_statements = 0;
    for stmt in statements {
        for concurrency in config.concurrency.levels() {
            runner.warmup(&stmt, config.warmup).await;
            let run = runner.run(&stmt, config.repeats, concurrency).await?;
            print_run(&run)?;
        }
        num_statements += 1;
    }

    if num_statements == 0 {
        bail!("No SQL statements provided. Use --stmt or provide statements via stdin");
    }
    Ok(())
}

async fn insert(
    config: &BenchConfig,
    table: String,
    bulk_size: usize,
    num_records: Option<u64>,
) -> Result<()> {
    let client = build_client(config)?;
    let loader = BulkLoader::new(client, bulk_size)?.with_progress(config.progress);

    let stdin = io::stdin();
    let rows = workload::inserts_from_json_lines(stdin.lock(), table);
    let concurrency = config.concurrency.max_level();
    let run = loader.load(rows, concurrency, num_records).await?;

    info!(
        requests = run.stats.count,
        secs = run.elapsed_secs(),
        "Bulk load finished"
    );
    print_run(&run)
}

fn print_run(run: &BenchRun) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, run)?;
    writeln!(out)?;
    Ok(())
}

