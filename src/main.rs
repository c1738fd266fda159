//! flowrt - CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowrt::util::config::RuntimeConfig;
use flowrt::util::logger::{self, LogLevel};
use flowrt::workload::{self, WorkloadReport};
use flowrt::{NAME, VERSION};
use std::path::PathBuf;

/// Dataflow task runtime: event-driven tasks on a work-stealing pool
#[derive(Parser, Debug)]
#[command(name = "flowrt")]
#[command(version = VERSION)]
#[command(about = NAME, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Worker threads (overrides config file and FLOWRT_WORKERS)
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// RON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print the run report as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a chain of dependent tasks
    Chain {
        /// Number of tasks in the chain
        #[arg(value_name = "LEN", default_value_t = 1000)]
        len: u64,
    },

    /// Run a tree of nested finish scopes
    Tree {
        /// Levels below the root
        #[arg(value_name = "DEPTH", default_value_t = 4)]
        depth: u32,

        /// Children per node
        #[arg(value_name = "FANOUT", default_value_t = 4)]
        fanout: u64,
    },

    /// Print the effective configuration as RON
    Config,

    /// Print version information
    Version,
}

fn load_config(args: &Args) -> Result<RuntimeConfig> {
    let mut config = match &args.config {
        Some(path) => RuntimeConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => RuntimeConfig::default(),
    };
    config.apply_env();
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if args.verbose {
        config.log_level = LogLevel::Debug.to_string();
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn print_report(
    report: &WorkloadReport,
    json: bool,
) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(report).context("Failed to encode report")?;
        println!("{}", text);
    } else {
        let stats = &report.stats;
        println!(
            "{}: {} tasks on {} workers in {:.3} ms",
            report.workload, report.tasks, report.workers, report.elapsed_ms
        );
        println!("  result      {} (expected {})", report.result, report.expected);
        println!(
            "  scheduler   given {}, local {}, stolen {}, empty cycles {}",
            stats.given, stats.taken_local, stats.stolen, stats.empty_steal_cycles
        );
    }
    if !report.is_correct() {
        bail!(
            "{} produced {} instead of {}",
            report.workload,
            report.result,
            report.expected
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let level = config.log_level.parse().unwrap_or(LogLevel::Info);
    match std::env::var("RUST_LOG") {
        Ok(directive) => logger::init_with_filter(&directive, level),
        Err(_) => logger::init_with_level(level),
    }

    if args.verbose {
        eprintln!("flowrt version: {}", VERSION);
        eprintln!("Host: {}", std::env::consts::OS);
        eprintln!("Workers: {}", config.workers);
    }

    match args.command {
        Commands::Chain { len } => {
            let report = workload::run_chain(&config, len)
                .with_context(|| format!("Failed to run chain of {}", len))?;
            print_report(&report, args.json)?;
        }
        Commands::Tree { depth, fanout } => {
            let report = workload::run_tree(&config, depth, fanout)
                .with_context(|| format!("Failed to run tree {}x{}", depth, fanout))?;
            print_report(&report, args.json)?;
        }
        Commands::Config => {
            print!("{}", config.to_ron().context("Failed to render config")?);
            println!();
        }
        Commands::Version => {
            println!("{} {}", NAME, VERSION);
        }
    }

    Ok(())
}
