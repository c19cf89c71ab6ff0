//! dApp Scaffold CLI
//!
//! Command-line client for the dApp scaffold core: manage clusters, read
//! account balances, tokens and history, request airdrops and send SOL.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dapp_scaffold_core::prelude::*;
use dapp_scaffold_core::wallet::KeypairWallet;
use dapp_scaffold_core::NotificationSink;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

/// dApp Scaffold CLI
#[derive(Parser, Debug)]
#[command(
    name = "dapp-scaffold-cli",
    version = env!("CARGO_PKG_VERSION"),
    about = "Command-line client for Solana clusters and accounts",
    long_about = "Manage Solana RPC clusters and inspect accounts: switch between \
                 devnet, testnet, mainnet and custom endpoints, read balances, token \
                 accounts and history, request airdrops and transfer SOL."
)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "~/.config/dapp-scaffold/config.yaml")]
    config: String,

    /// Override the directory holding persisted clusters
    #[arg(long, global = true, env = "DAPP_SCAFFOLD_STORAGE")]
    storage: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Main CLI commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Cluster management commands
    #[command(subcommand, alias = "c")]
    Cluster(ClusterCommands),

    /// Account reads and transactions
    #[command(subcommand, alias = "a")]
    Account(AccountCommands),

    /// Configuration management
    #[command(subcommand, alias = "cfg")]
    Config(ConfigCommands),

    /// Print the explorer link for a path on the active cluster
    Explorer {
        /// Explorer path, e.g. `tx/<signature>` or `address/<address>`
        path: String,
    },

    /// Show current version
    Version,
}

/// Cluster subcommands
#[derive(Subcommand, Debug)]
enum ClusterCommands {
    /// List known clusters
    List {
        /// Print as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Add a cluster
    Add {
        /// Unique cluster name
        name: String,

        /// RPC endpoint URL
        endpoint: String,

        /// Known network behind the endpoint (devnet, testnet, mainnet-beta)
        #[arg(short, long)]
        network: Option<String>,
    },

    /// Remove an inactive cluster
    Remove {
        /// Cluster name
        name: String,
    },

    /// Make a cluster active
    Use {
        /// Cluster name
        name: String,
    },

    /// Check that the active cluster answers
    Check,
}

/// Account subcommands
#[derive(Subcommand, Debug)]
enum AccountCommands {
    /// Show SOL balance
    Balance {
        /// Account address
        address: String,
    },

    /// List token accounts
    Tokens {
        /// Owner address
        address: String,

        /// Print as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show signature history
    History {
        /// Account address
        address: String,

        /// Number of signatures to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Request an airdrop
    Airdrop {
        /// Address to credit
        address: String,

        /// Amount in SOL
        #[arg(short, long, default_value_t = 1.0)]
        amount: f64,
    },

    /// Transfer SOL from a keypair
    Transfer {
        /// Recipient address
        to: String,

        /// Amount in SOL
        amount: f64,

        /// Keypair file signing the transfer
        #[arg(short, long, default_value = "~/.config/solana/id.json")]
        keypair: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write a default configuration file
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration
    Show {
        /// Show as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Notification sink printing to the terminal
struct TerminalNotifier;

impl NotificationSink for TerminalNotifier {
    fn notify(&self, notification: Notification) {
        match notification.kind {
            NotificationKind::Error | NotificationKind::Warning => {
                eprintln!("{}: {}", notification.title, notification.message)
            }
            NotificationKind::Success | NotificationKind::Info => {
                println!("{}: {}", notification.title, notification.message)
            }
        }
        if let Some(link) = notification.link {
            println!("  {}", link);
        }
    }
}

/// Initialize logging based on verbosity
fn init_logging(verbose: bool, config: &ClientConfig) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.logging.level.to_tracing_level()
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

/// Load the config file when present, defaults otherwise
fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let path = expand_path(&cli.config);
    let mut config = if path.exists() {
        ClientConfig::from_file(&path)
            .with_context(|| format!("loading {}", path.display()))?
    } else {
        ClientConfig::default()
    };

    if let Some(storage) = &cli.storage {
        config.storage.path = expand_path(storage);
    }
    Ok(config)
}

fn build_client(config: ClientConfig, wallet: Option<KeypairWallet>) -> Result<DappClient> {
    let store = FileStore::new(&config.storage)?;
    let mut builder = DappClient::builder(config)
        .store(Arc::new(store))
        .notifier(Arc::new(TerminalNotifier));
    if let Some(wallet) = wallet {
        builder = builder.wallet(Arc::new(wallet));
    }
    Ok(builder.build()?)
}

fn parse_address(address: &str) -> Result<Pubkey> {
    Ok(Pubkey::from_str(address.trim()).map_err(Error::from)?)
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Main entry point
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_logging(cli.verbose, &config)?;

    debug!("dApp Scaffold CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Cluster(cmd) => handle_cluster_command(cmd, config).await?,
        Commands::Account(cmd) => handle_account_command(cmd, config).await?,
        Commands::Config(cmd) => handle_config_command(cmd, &cli.config, &config)?,
        Commands::Explorer { path } => {
            let client = build_client(config, None)?;
            println!("{}", client.explorer_url(&path)?);
        }
        Commands::Version => {
            println!("dApp Scaffold CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Core library: {}", dapp_scaffold_core::VERSION);
        }
    }

    Ok(())
}

/// Handle cluster commands
async fn handle_cluster_command(cmd: ClusterCommands, config: ClientConfig) -> Result<()> {
    let client = build_client(config, None)?;

    match cmd {
        ClusterCommands::List { json } => {
            let clusters = client.clusters();
            if json {
                println!("{}", serde_json::to_string_pretty(&clusters)?);
            } else {
                for cluster in clusters {
                    let marker = if cluster.active { "*" } else { " " };
                    let network = cluster
                        .network
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "custom".to_string());
                    println!("{} {:<12} {:<14} {}", marker, cluster.name, network, cluster.endpoint);
                }
            }
        }
        ClusterCommands::Add {
            name,
            endpoint,
            network,
        } => {
            let mut cluster = ClusterConfig::new(name.clone(), endpoint);
            if let Some(network) = network {
                cluster = cluster.with_network(network.parse::<ClusterNetwork>()?);
            }
            client.add_cluster(cluster)?;
            info!("Cluster '{}' added", name);
            println!("Added cluster {}", name);
        }
        ClusterCommands::Remove { name } => {
            client.remove_cluster(&name)?;
            println!("Removed cluster {}", name);
        }
        ClusterCommands::Use { name } => {
            client.set_active_cluster(&name)?;
            println!("Active cluster: {}", name);
        }
        ClusterCommands::Check => {
            let cluster = client.active_cluster()?;
            match client.check_cluster().await {
                Ok(version) => println!(
                    "{} ({}) is up, solana-core {}",
                    cluster.name, cluster.endpoint, version.solana_core
                ),
                Err(err) => bail!(
                    "Error connecting to cluster {} ({}): {}",
                    cluster.name,
                    cluster.endpoint,
                    err
                ),
            }
        }
    }
    Ok(())
}

/// Handle account commands
async fn handle_account_command(cmd: AccountCommands, config: ClientConfig) -> Result<()> {
    match cmd {
        AccountCommands::Balance { address } => {
            let client = build_client(config, None)?;
            let address = parse_address(&address)?;
            let lamports = client.get_balance(&address).await?;
            println!("{} SOL", format_sol_balance(lamports));
        }
        AccountCommands::Tokens { address, json } => {
            let client = build_client(config, None)?;
            let address = parse_address(&address)?;
            let accounts = client.get_token_accounts(&address).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&accounts)?);
            } else if accounts.is_empty() {
                println!("No token accounts found.");
            } else {
                for account in &accounts {
                    println!(
                        "{:<12} {:<12} {}",
                        ellipsify(&account.pubkey.to_string(), 4),
                        ellipsify(account.mint().unwrap_or("-"), 4),
                        account
                            .ui_amount()
                            .map(|amount| amount.to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }
        AccountCommands::History { address, limit } => {
            let client = build_client(config, None)?;
            let address = parse_address(&address)?;
            let signatures = client.get_signatures(&address).await?;
            if signatures.is_empty() {
                println!("No transactions found.");
            }
            for item in signatures.iter().take(limit) {
                let status = match &item.err {
                    None => "Success".to_string(),
                    Some(err) => format!("Failed: {}", err),
                };
                let time = item
                    .block_time
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<12} {:>10} {:>12} {}",
                    ellipsify(&item.signature, 4),
                    item.slot,
                    time,
                    status
                );
            }
        }
        AccountCommands::Airdrop { address, amount } => {
            let client = build_client(config, None)?;
            let address = parse_address(&address)?;
            let progress = spinner("Requesting airdrop...");
            let result = client
                .request_airdrop(AirdropRequest {
                    address,
                    amount_sol: amount,
                })
                .await;
            progress.finish_and_clear();
            result?;
        }
        AccountCommands::Transfer {
            to,
            amount,
            keypair,
            yes,
        } => {
            let wallet = KeypairWallet::from_file(expand_path(&keypair))?;
            let source = wallet.pubkey();
            let client = build_client(config, Some(wallet))?;

            if !yes {
                let proceed = dialoguer::Confirm::new()
                    .with_prompt(format!(
                        "Send {} SOL from {} to {} on {}?",
                        amount,
                        source,
                        to,
                        client.active_cluster()?.name
                    ))
                    .default(false)
                    .interact()?;
                if !proceed {
                    println!("Transfer cancelled.");
                    return Ok(());
                }
            }

            let progress = spinner("Sending transaction...");
            let result = client
                .transfer_sol(TransferRequest {
                    source,
                    destination: to,
                    amount_sol: amount,
                })
                .await;
            progress.finish_and_clear();
            result?;
        }
    }
    Ok(())
}

/// Handle configuration commands
fn handle_config_command(cmd: ConfigCommands, path: &str, config: &ClientConfig) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => {
            let path = expand_path(path);
            if path.exists() && !force {
                bail!("{} already exists, use --force to overwrite", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            ClientConfig::default().save_to_file(&path)?;
            println!("Wrote {}", path.display());
        }
        ConfigCommands::Show { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                print!("{}", serde_yaml::to_string(config)?);
            }
        }
    }
    Ok(())
}
