use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ethrex::http::deliver;
use ethrex::{ClientError, Closer, Ethrex, Network, Sender, Subscription};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

mod config;
mod output;
mod utils;

use config::Config;
use output::Printer;

/// Explore blocks, transactions, accounts and nodes through the Ethrex API.
#[derive(Debug, Parser)]
#[command(name = "ethrex", version)]
struct Cli {
    /// Watch and display changes
    #[arg(short, long, global = true)]
    watch: bool,

    /// Network to use (homestead or morden)
    #[arg(short, long, global = true)]
    network: Option<Network>,

    /// Disable colored output
    #[arg(short = 'd', long, global = true)]
    disable_colors: bool,

    /// Output in machine-readable JSON
    #[arg(short, long, global = true)]
    json: bool,

    /// Display verbose debugging output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Display network information
    Net,
    /// Display information about a block
    Blk { id: String },
    /// Display information about a transaction
    Txn { id: String },
    /// Display information about an account or contract
    Acc { id: String },
    /// Display information about a node
    Node { id: String },
    /// Search across blocks, transactions, accounts, contracts, and nodes
    Search { query: String },
    /// Trace a transaction
    Trace { hash: String },
    /// Verify the source code of a contract
    Verify {
        address: String,
        name: String,
        version: String,
        filename: PathBuf,
        /// URL to associate with the contract
        #[arg(short, long)]
        url: Option<String>,
        /// Compile with optimizations disabled
        #[arg(short = 'o', long)]
        disable_optimizations: bool,
    },
    /// Call a function on a contract (pass args JSON-encoded)
    Call {
        address: String,
        method: String,
        #[arg(allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// List compiler versions accepted by verify
    Solc,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::logger::init_logger(cli.verbose);

    let config = Config::load()
        .context("Failed to load configuration")?
        .with_network(cli.network);
    utils::config_logger::log_config(&config);

    if cli.disable_colors {
        colored::control::set_override(false);
    }
    let printer = Printer {
        json: cli.json,
        colors: !cli.disable_colors,
        timestamps: cli.watch,
    };

    let ethrex = Ethrex::new(config.client_config(cli.verbose)).context("Failed to create client")?;

    if cli.watch {
        if let Some(subscription) = watch(&ethrex, &cli.command, printer)? {
            info!("Watching {}, press Ctrl+C to stop", subscription.channel());
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            let closed = ethrex.shutdown();
            info!("Closed {} subscriptions, exiting", closed);
            return Ok(());
        }
    }

    run(&ethrex, cli.command, printer).await
}

/// Start a live subscription for commands that support watch mode.
fn watch(ethrex: &Ethrex, command: &Command, printer: Printer) -> Result<Option<Subscription>> {
    let on_data = move |value: Value| printer.value(&value);
    let on_open = |_send: Sender, _close: Closer| info!("Subscription open");
    let on_latency = |latency: Duration| debug!("Latency: {:?}", latency);

    let subscription = match command {
        Command::Net => ethrex.network().live(on_data, on_open, on_latency),
        Command::Blk { id } => ethrex.block(id.as_str()).live(on_data, on_open, on_latency),
        Command::Txn { id } => ethrex.transaction(id.as_str()).live(on_data, on_open, on_latency),
        Command::Acc { id } => ethrex.account(id.as_str()).live(on_data, on_open, on_latency),
        Command::Node { id } => ethrex.node(id.as_str()).live(on_data, on_open, on_latency),
        _ => return Ok(None),
    };
    subscription
        .map(Some)
        .context("Failed to start live subscription")
}

async fn run(ethrex: &Ethrex, command: Command, printer: Printer) -> Result<()> {
    let result = match command {
        Command::Net => ethrex.network().fetch().await,
        Command::Blk { id } => ethrex.block(id).fetch().await,
        Command::Txn { id } => ethrex.transaction(id).fetch().await,
        Command::Acc { id } => ethrex.account(id).fetch().await,
        Command::Node { id } => ethrex.node(id).fetch().await,
        Command::Search { query } => {
            match ethrex.search().fetch(query).await {
                Ok(results) => printer.search_results(&results),
                Err(e) => printer.error(&e.callback_message()),
            }
            return Ok(());
        }
        Command::Trace { hash } => {
            printer.notice("Tracing transaction; this may take several seconds.");
            ethrex.transaction(hash).trace().await
        }
        Command::Verify {
            address,
            name,
            version,
            filename,
            url,
            disable_optimizations,
        } => {
            printer.notice("Verifying contract; this may take 5-10 seconds.");
            let source = tokio::fs::read_to_string(&filename)
                .await
                .with_context(|| format!("Failed to read {}", filename.display()))?;
            ethrex
                .account(address)
                .verify(&name, source, &version, !disable_optimizations, url.as_deref())
                .await
        }
        Command::Call {
            address,
            method,
            args,
        } => {
            let args = parse_args(&args)?;
            ethrex.account(address).call(&method, &args).await
        }
        Command::Solc => ethrex.solc().versions().await,
    };

    report(printer, result);
    Ok(())
}

/// Print a call result; a 404 prints `null` followed by the error.
fn report(printer: Printer, result: Result<Value, ClientError>) {
    deliver(result, |value| printer.value(&value), |message| printer.error(&message));
}

fn parse_args(args: &[String]) -> Result<Vec<Value>> {
    args.iter()
        .map(|arg| {
            serde_json::from_str(arg).with_context(|| format!("Argument '{}' is not valid JSON", arg))
        })
        .collect()
}
