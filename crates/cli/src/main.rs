//! deferkv CLI: workload harness for the transaction client.
//!
//! - `deferkv bench [...]`: run payment transactions from independent clients
//!   against an in-process store and print the results table
//! - `deferkv config init [path]`: write the default `deferkv.toml`

mod bench;
mod commands;
mod stats;

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context};
use clap::ArgMatches;
use tracing_subscriber::EnvFilter;

use deferkv_core::{ClientConfig, CONFIG_FILE_NAME};

use bench::BenchOptions;
use commands::build_cli;
use stats::Report;

fn main() {
    init_tracing();

    let matches = build_cli().get_matches();
    if let Err(e) = dispatch(&matches) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn dispatch(matches: &ArgMatches) -> anyhow::Result<()> {
    match matches.subcommand() {
        Some(("bench", sub)) => {
            let config = load_config(matches)?;
            let opts = bench_options(sub, config)?;
            let outcome = bench::run(&opts)?;
            print!(
                "{}",
                Report {
                    clients: &outcome.clients,
                    elapsed: outcome.elapsed,
                }
            );
            println!("Rejected commits: {}", outcome.rejected);
            Ok(())
        }
        Some(("config", sub)) => match sub.subcommand() {
            Some(("init", init)) => {
                let path = init
                    .get_one::<String>("path")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
                init_config(&path, init.get_flag("force"))?;
                println!("Wrote {}", path.display());
                Ok(())
            }
            _ => bail!("Unknown config command"),
        },
        _ => bail!("Unknown command"),
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<ClientConfig> {
    let path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
    ClientConfig::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

fn bench_options(sub: &ArgMatches, config: ClientConfig) -> anyhow::Result<BenchOptions> {
    let reject_rate = sub.get_one::<f64>("reject-rate").copied().unwrap_or(0.0);
    if !(0.0..=1.0).contains(&reject_rate) {
        bail!("--reject-rate must be between 0.0 and 1.0, got {}", reject_rate);
    }
    let max_retries = sub
        .get_one::<u32>("max-retries")
        .copied()
        .unwrap_or(config.max_retries);

    Ok(BenchOptions {
        clients: sub.get_one::<u32>("clients").copied().unwrap_or(4),
        transactions: sub.get_one::<u64>("transactions").copied().unwrap_or(1000),
        warehouses: sub.get_one::<u64>("warehouses").copied().unwrap_or(1),
        reject_rate,
        max_retries,
        seed: sub.get_one::<u64>("seed").copied(),
        config,
    })
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if force {
        std::fs::write(path, ClientConfig::default_toml())
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        ClientConfig::write_default_if_missing(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}
