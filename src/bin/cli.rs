use birds_nest::{
    BirdsNest, BirdsNestConfig, RuleType, TimestampKey, TxFilter,
};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a fresh timestamp transaction id
    GenKey {
        /// Number of ids to print
        #[arg(short, long, default_value = "1")]
        count: usize,
    },

    /// Split a transaction id into its timestamp and random part
    ParseKey {
        /// Hex encoded transaction id
        tx_id: String,
    },

    /// Print the default nest configuration as JSON
    DefaultConfig,

    /// Open a nest and print its state
    Info {
        /// Nest configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Add transaction ids and persist the nest
    Add {
        #[arg(short, long)]
        config: PathBuf,

        /// Hex encoded transaction ids
        #[arg(required = true)]
        tx_ids: Vec<String>,
    },

    /// Check whether a transaction id was seen
    Contains {
        #[arg(short, long)]
        config: PathBuf,

        tx_id: String,

        /// Also apply the expiry rule
        #[arg(long)]
        check_expiry: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::GenKey { count } => {
            for _ in 0..count {
                println!("{}", TimestampKey::generate()?.to_tx_id());
            }
        }
        Commands::ParseKey { tx_id } => {
            let key = TimestampKey::from_tx_id(&tx_id)?;
            let [stamp, random] = key.parse()?;
            println!("Transaction id: {key}");
            println!("  Timestamp (ns): {}", key.nano()?);
            println!("  Timestamp bytes: {}", hex::encode(stamp));
            println!("  Random part: {}", hex::encode(random));
        }
        Commands::DefaultConfig => {
            let config = BirdsNestConfig::default();
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
        Commands::Info { config } => {
            let nest = open_nest(&config)?;
            let info = nest.info()?;
            println!("Birds nest {}:", nest.config().chain_id);
            println!(
                "  Snapshot dir: {}",
                nest.config().snapshot_dir(None).display()
            );
            println!("  {info}");
        }
        Commands::Add { config, tx_ids } => {
            let nest = open_nest(&config)?;
            let keys = tx_ids
                .iter()
                .map(|tx_id| TimestampKey::from_tx_id(tx_id))
                .collect::<Result<Vec<_>, _>>()?;
            nest.adds(&keys)?;
            nest.flush()?;
            println!("Added {} transaction ids", keys.len());
        }
        Commands::Contains {
            config,
            tx_id,
            check_expiry,
        } => {
            let nest = open_nest(&config)?;
            let key = TimestampKey::from_tx_id(&tx_id)?;
            let rules: &[RuleType] = if check_expiry {
                &[RuleType::AbsoluteExpireTime]
            } else {
                &[]
            };
            if nest.contains(&key, rules)? {
                println!("Transaction id '{tx_id}' was seen before");
            } else {
                println!("Transaction id '{tx_id}' is new");
            }
        }
    }

    Ok(())
}

fn open_nest(path: &Path) -> Result<BirdsNest, Box<dyn std::error::Error>> {
    let config = BirdsNestConfig::from_bytes(&std::fs::read(path)?)?;
    Ok(BirdsNest::open(config)?)
}
