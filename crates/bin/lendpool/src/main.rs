//! lendpool - operator CLI for the lending pool engine
//!
//! Opens (or creates) a pool in a sled database, runs typed requests
//! against it and prints results as JSON on stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lendpool_core::{
    Address, Clock, LendingPoolEngine, LendingRequest, LoanId, PoolConfig, RetryingOracle,
    SledStore, StaticOracle, SystemClock,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "lendpool")]
#[command(about = "collateralized lending pool engine", long_about = None)]
struct Args {
    /// Pool config (TOML); built-in defaults when omitted
    #[arg(long, env = "LENDPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// sled database path
    #[arg(long, default_value = "./lendpool.db")]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one request, e.g. '{"op":"claim_rewards","provider":"0x.."}'
    Exec {
        /// Address the request is sent from
        #[arg(long)]
        caller: Address,

        /// Request as JSON
        request: String,
    },

    /// Run a JSON array of {"caller", "request"} steps, stopping at the first error
    Replay { file: PathBuf },

    /// Show an account
    Account { address: Address },

    /// Show every loan of an account
    Loans { address: Address },

    /// Show pool totals
    Pool,

    /// Show a loan
    Loan { id: u64 },

    /// Show a loan's risk at the current price
    Health { id: u64 },
}

#[derive(Deserialize)]
struct ReplayStep {
    caller: Address,
    request: LendingRequest,
}

type Engine = LendingPoolEngine<SledStore, RetryingOracle<StaticOracle>>;

fn open_engine(args: &Args) -> Result<Engine> {
    let config = match &args.config {
        Some(path) => PoolConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PoolConfig::default(),
    };

    // configured prices are quoted as of now
    let now = SystemClock.now();
    let quotes = config
        .prices
        .iter()
        .fold(StaticOracle::new(), |oracle, (asset, price)| {
            oracle.with_price(asset.clone(), *price, now)
        });
    let oracle = RetryingOracle::new(quotes, &config.oracle);

    let store = SledStore::open(&args.db)
        .with_context(|| format!("failed to open database {}", args.db.display()))?;
    let engine = LendingPoolEngine::open(config, store, oracle).context("failed to open pool")?;
    let config = engine.config();
    info!(
        "pool {}/{} at {}, max ltv {}",
        config.base_asset, config.collateral_asset, config.interest_rate_bps, config.max_ltv_bps
    );
    Ok(engine)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lendpool=info,lendpool_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let engine = open_engine(&args)?;

    match args.command {
        Command::Exec { caller, request } => {
            let request: LendingRequest =
                serde_json::from_str(&request).context("invalid request JSON")?;
            let name = request.name();
            let response = engine
                .execute(caller, request)
                .await
                .with_context(|| format!("{} failed", name))?;
            print_json(&response)?;
        }
        Command::Replay { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let steps: Vec<ReplayStep> =
                serde_json::from_str(&contents).context("invalid replay file")?;
            info!("replaying {} steps from {}", steps.len(), file.display());

            for (i, step) in steps.into_iter().enumerate() {
                let name = step.request.name();
                let response = engine
                    .execute(step.caller, step.request)
                    .await
                    .with_context(|| format!("step {} ({}) failed", i + 1, name))?;
                print_json(&response)?;
            }
        }
        Command::Account { address } => print_json(&engine.get_account(&address).await?)?,
        Command::Loans { address } => print_json(&engine.loans_of(&address).await?)?,
        Command::Pool => print_json(&engine.get_pool().await?)?,
        Command::Loan { id } => print_json(&engine.loan(LoanId(id)).await?)?,
        Command::Health { id } => print_json(&engine.assess_loan(LoanId(id)).await?)?,
    }

    Ok(())
}
