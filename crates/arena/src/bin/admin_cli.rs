//! `arena-admin`: whitelist bootstrap CLI (spec.md §4.8). Until an admin API
//! surface exists, approving the first linking keys (including the first
//! admin) has to happen out of band, against the same database the server
//! runs against. Grounded on `server/src/bin/wallet_cli.rs`'s
//! `clap::Subcommand` + `get_settings_with_cli`/`setup_logger` shape.

use anyhow::Result;
use arena::config::{get_settings_with_cli, setup_logger, CliSettings, Settings};
use arena::domain::whitelist::WhitelistStore;
use arena::infra::db::{DBConnection, DatabasePoolConfig, DatabaseType};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser, Clone)]
#[command(name = "arena-admin")]
#[command(about = "Arena whitelist administration", long_about = None)]
struct Cli {
    #[arg(short, long)]
    config: Option<String>,

    #[arg(short, long)]
    level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    /// Approve a linking key, optionally as an admin
    Approve {
        linking_key: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        admin: bool,
    },
    /// Revoke a linking key
    Revoke { linking_key: String },
    /// List all whitelisted linking keys
    List,
}

impl From<Cli> for CliSettings {
    fn from(cli: Cli) -> Self {
        Self {
            config: cli.config,
            level: cli.level,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings: Settings = get_settings_with_cli(cli.clone().into())
        .inspect_err(|e| eprintln!("Error reading config: {e}"))?;

    setup_logger(
        settings.level.clone(),
        vec![String::from("hyper"), String::from("reqwest")],
    )?;

    let pool_config: DatabasePoolConfig = settings.db_settings.clone().into();
    let db = DBConnection::new(
        &settings.db_settings.data_folder,
        "arena",
        pool_config,
        DatabaseType::Arena,
    )
    .await?;
    let whitelist = WhitelistStore::new(db);

    match cli.command {
        Commands::Approve {
            linking_key,
            display_name,
            admin,
        } => {
            let entry = whitelist
                .approve(&linking_key, display_name.as_deref(), admin, "arena-admin")
                .await?;
            info!("approved {} (admin: {})", entry.linking_key, entry.is_admin);
            println!("approved {} (admin: {})", entry.linking_key, entry.is_admin);
        }
        Commands::Revoke { linking_key } => {
            let removed = whitelist.revoke(&linking_key).await?;
            if removed {
                println!("revoked {linking_key}");
            } else {
                println!("{linking_key} was not whitelisted");
            }
        }
        Commands::List => {
            let entries = whitelist.list().await?;
            for entry in entries {
                println!(
                    "{}\t{}\t{}",
                    entry.linking_key,
                    entry.display_name.unwrap_or_default(),
                    if entry.is_admin { "admin" } else { "player" }
                );
            }
        }
    }

    Ok(())
}
