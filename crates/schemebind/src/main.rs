// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 schemebind contributors

//! SchemeBind service CLI
//!
//! Runs the binding registry service, or administers the configured
//! store directly.
//!
//! # Usage
//!
//! ```bash
//! # Run the service with the default SQLite backend
//! schemebind --db bindings.db
//!
//! # Run against a TOML config (backend selection, instance name)
//! schemebind --config schemebind.toml
//!
//! # Inspect the store
//! schemebind --db bindings.db list
//! schemebind --db bindings.db show github
//! schemebind --db bindings.db remove github --confirm
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use schemebind::handlers::default_catalog;
use schemebind::{BindingStore, Config, RegistryService, StoreBackend};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "schemebind")]
#[command(about = "Dynamic protocol scheme binding registry", long_about = None)]
struct Args {
    /// TOML configuration file (overrides --db)
    #[arg(short, long)]
    config: Option<String>,

    /// SQLite database path used when no config file is given
    #[arg(short, long, default_value = "schemebind.db")]
    db: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored bindings
    List,
    /// Show one binding
    Show {
        /// Scheme name
        scheme: String,
    },
    /// Remove a binding
    Remove {
        /// Scheme name
        scheme: String,
        /// Confirm deletion
        #[arg(long)]
        confirm: bool,
    },
    /// Remove every stored binding
    Clear {
        /// Confirm deletion
        #[arg(long)]
        confirm: bool,
    },
    /// Show store statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::builder()
            .store(StoreBackend::Sqlite {
                path: args.db.clone(),
            })
            .build(),
    };

    if let Some(cmd) = args.command {
        let store = config.open_store()?;
        return handle_command(cmd, store.as_ref()).await;
    }

    tracing::info!("SchemeBind service starting...");
    tracing::info!("  Store: {:?}", config.store);
    tracing::info!("  Instance: {}", config.instance_name);

    let service = RegistryService::new(config, default_catalog())?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            shutdown.cancel();
        }
    });

    service.run(cancel).await?;
    Ok(())
}

async fn handle_command(cmd: Commands, store: &dyn BindingStore) -> Result<()> {
    let cancel = CancellationToken::new();

    match cmd {
        Commands::List => {
            let mut records = store.list_all(&cancel).await?;
            records.sort_by(|a, b| a.scheme.cmp(&b.scheme));
            println!("Stored bindings:");
            for record in &records {
                println!(
                    "  {} ({}) handler={}",
                    record.scheme, record.display_name, record.handler_type
                );
            }
        }
        Commands::Show { scheme } => match store.find_by_scheme(&scheme, &cancel).await? {
            Some(record) => {
                println!("scheme:       {}", record.scheme);
                println!("display name: {}", record.display_name);
                println!("handler type: {}", record.handler_type);
                println!("token:        {}", record.token);
                println!("options:      {}", serde_json::to_string_pretty(&record.options)?);
            }
            None => println!("No binding for scheme '{scheme}'."),
        },
        Commands::Remove { scheme, confirm } => {
            if !confirm {
                println!("Use --confirm to actually remove the binding.");
                return Ok(());
            }
            match store.find_by_scheme(&scheme, &cancel).await? {
                Some(record) => {
                    store.remove(&scheme, &record.token, &cancel).await?;
                    println!("Binding '{scheme}' removed.");
                }
                None => println!("No binding for scheme '{scheme}'."),
            }
        }
        Commands::Clear { confirm } => {
            if !confirm {
                println!("Use --confirm to actually remove all bindings.");
                return Ok(());
            }
            let records = store.list_all(&cancel).await?;
            let total = records.len();
            for record in &records {
                store.remove(&record.scheme, &record.token, &cancel).await?;
            }
            println!("Removed {total} binding(s).");
        }
        Commands::Stats => {
            let records = store.list_all(&cancel).await?;
            println!("Total bindings: {}", records.len());
            let mut handlers: Vec<String> =
                records.iter().map(|r| r.handler_type.clone()).collect();
            handlers.sort();
            handlers.dedup();
            println!("Distinct handler types: {}", handlers.len());
        }
    }

    Ok(())
}
