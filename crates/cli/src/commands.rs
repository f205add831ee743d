//! Clap command tree definition.

use clap::{value_parser, Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("deferkv")
        .about("Workload harness for the deferkv transaction client")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .help("Client config file (default: ./deferkv.toml)")
                .global(true),
        )
        .subcommand(build_bench())
        .subcommand(build_config())
}

fn build_bench() -> Command {
    Command::new("bench")
        .about("Run payment-style transactions from independent clients over an in-process store")
        .arg(
            Arg::new("clients")
                .long("clients")
                .help("Number of concurrent clients")
                .value_parser(value_parser!(u32).range(1..))
                .default_value("4"),
        )
        .arg(
            Arg::new("transactions")
                .long("transactions")
                .help("Transactions per client")
                .value_parser(value_parser!(u64))
                .default_value("1000"),
        )
        .arg(
            Arg::new("warehouses")
                .long("warehouses")
                .help("Warehouses to load")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("1"),
        )
        .arg(
            Arg::new("reject-rate")
                .long("reject-rate")
                .help("Probability that the store refuses a commit (0.0 - 1.0)")
                .value_parser(value_parser!(f64))
                .default_value("0.0"),
        )
        .arg(
            Arg::new("max-retries")
                .long("max-retries")
                .help("Retries per transaction (default: max_retries from config)")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Seed for the workload generator")
                .value_parser(value_parser!(u64)),
        )
}

fn build_config() -> Command {
    Command::new("config")
        .about("Manage the client config file")
        .subcommand_required(true)
        .subcommand(
            Command::new("init")
                .about("Write the default config file if it does not exist")
                .arg(Arg::new("path").help("Target path (default: ./deferkv.toml)"))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help("Overwrite an existing file")
                        .action(ArgAction::SetTrue),
                ),
        )
}
