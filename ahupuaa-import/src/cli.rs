//! Définition et implémentation des commandes CLI
//!
//! - défaut: import GeoJSON → table
//! - `wipe`: purge de la table
//! - `status`: état de la table

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tracing::{info, warn};

use crate::config::{resolve_table_name, Environment, ImportConfig, DEFAULT_TEST_LIMIT};
use crate::error::ImportError;
use crate::importer::Importer;
use crate::report::ImportReport;
use crate::store::{
    DiscardStore, DynamoDbConfig, DynamoDbStore, RecordStore, StoreLifecycle, TableStatus,
};

/// Capacité provisionnée normale (lecture et écriture)
pub const BASE_CAPACITY: i64 = 5;

#[derive(Subcommand)]
pub enum Commands {
    /// Delete every record from the table
    Wipe {
        #[command(flatten)]
        target: TargetArgs,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show the table status (exit code 1 when not ACTIVE)
    Status {
        #[command(flatten)]
        target: TargetArgs,
    },
}

/// Sélection de la table cible
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Target environment (dev, staging, prod)
    #[arg(long, default_value = "dev")]
    pub env: Environment,

    /// Directory holding `<env>.tfvars` files
    #[arg(long, default_value = "terraform")]
    pub terraform_dir: PathBuf,

    /// Explicit table name (overrides --env)
    #[arg(long)]
    pub table: Option<String>,
}

impl TargetArgs {
    /// Nom de table: `--table`, sinon le fichier de variables, sinon le défaut
    pub fn table_name(&self) -> Result<String> {
        match &self.table {
            Some(table) => Ok(table.clone()),
            None => resolve_table_name(self.env, Some(&self.terraform_dir)),
        }
    }
}

/// Arguments de l'import (commande par défaut)
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Path to the GeoJSON FeatureCollection
    #[arg(short, long)]
    pub input: PathBuf,

    /// Test mode: import only --limit records
    #[arg(long)]
    pub test: bool,

    /// Number of records imported in test mode
    #[arg(long, default_value_t = DEFAULT_TEST_LIMIT)]
    pub limit: usize,

    /// Wipe the table before a test import (always done in production)
    #[arg(long)]
    pub recreate_table: bool,

    /// Answer yes to confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Temporary write capacity (WCU) during a production import
    #[arg(long, value_name = "WCU")]
    pub boost_capacity: Option<i64>,

    /// Build and count records without writing to DynamoDB
    #[arg(long)]
    pub dry_run: bool,

    /// Save the import report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Exécute la commande import
pub async fn cmd_import(args: ImportArgs) -> Result<()> {
    let table = args.target.table_name()?;
    let config = ImportConfig::new(&table).with_limit(args.test.then_some(args.limit));
    config.validate()?;

    print_banner(&config, &args.input, args.target.env);

    let report = if args.dry_run {
        info!("Dry run: records are built and counted, nothing is stored");
        let store = DiscardStore::new(&table);
        run_import(&store, &args, &config).await?
    } else {
        let store = DynamoDbStore::connect(DynamoDbConfig::from_env().with_table(&table)).await;
        run_import(&store, &args, &config).await?
    };

    report.display();
    if let Some(path) = &args.report {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to save report to {}", path.display()))?;
        info!(path = %path.display(), "Report saved");
    }

    if !report.is_success() {
        bail!(
            "Import failed: {}",
            report.fatal_error.as_deref().unwrap_or("unknown error")
        );
    }
    info!("{}", report.summary());
    Ok(())
}

async fn run_import<S>(store: &S, args: &ImportArgs, config: &ImportConfig) -> Result<ImportReport>
where
    S: RecordStore + StoreLifecycle,
{
    // Avant toute opération sur la table
    if !args.input.is_file() {
        return Err(ImportError::InputNotFound(args.input.clone()).into());
    }

    wait_ready(store, config).await?;

    // Purge: toujours en production, sur demande en test
    if !args.test || args.recreate_table {
        let confirmed = if args.dry_run {
            info!("Dry run: table wipe simulated, nothing is deleted");
            true
        } else {
            let prompt = format!(
                "This will delete ALL records from {}. Continue?",
                store.table_name()
            );
            args.yes || confirm(&prompt)?
        };
        if !confirmed {
            bail!("Import cancelled: table wipe not confirmed");
        }
        let deleted = store.delete_all(confirmed).await?;
        info!(table = %store.table_name(), deleted, "Table wiped before import");
    }

    // Capacité temporaire, jamais en test
    let boosted = match args.boost_capacity {
        Some(write) if !args.test => boost_capacity(store, config, write).await,
        Some(_) => {
            info!("Capacity boost skipped in test mode");
            false
        }
        None => false,
    };

    let result = Importer::new(store, config).run(&args.input).await;

    if boosted {
        match store.set_throughput(BASE_CAPACITY, BASE_CAPACITY).await {
            Ok(()) => info!(
                read = BASE_CAPACITY,
                write = BASE_CAPACITY,
                "Provisioned capacity restored"
            ),
            Err(e) => warn!(error = %e, "Failed to restore provisioned capacity"),
        }
    }

    Ok(result?)
}

async fn wait_ready<S: StoreLifecycle + ?Sized>(store: &S, config: &ImportConfig) -> Result<()> {
    info!(table = %store.table_name(), "Checking table status");
    let ready = store
        .is_ready(config.ready_timeout, config.ready_poll_interval)
        .await?;
    if !ready {
        return Err(ImportError::StoreUnavailable {
            table: store.table_name().to_string(),
            waited_secs: config.ready_timeout.as_secs(),
        }
        .into());
    }
    Ok(())
}

async fn boost_capacity<S: StoreLifecycle + ?Sized>(
    store: &S,
    config: &ImportConfig,
    write: i64,
) -> bool {
    info!(write, "Boosting write capacity for the import");
    if let Err(e) = store.set_throughput(BASE_CAPACITY, write).await {
        warn!(error = %e, "Failed to boost capacity, continuing with current capacity");
        return false;
    }
    match store
        .is_ready(config.ready_timeout, config.ready_poll_interval)
        .await
    {
        Ok(true) => {}
        Ok(false) => warn!("Table still updating after capacity change"),
        Err(e) => warn!(error = %e, "Failed to check table after capacity change"),
    }
    true
}

/// Exécute la commande wipe
pub async fn cmd_wipe(target: TargetArgs, yes: bool) -> Result<()> {
    let table = target.table_name()?;
    let store = DynamoDbStore::connect(DynamoDbConfig::from_env().with_table(&table)).await;

    let confirmed = yes || confirm(&format!("Delete ALL records from {}?", table))?;
    let deleted = store.delete_all(confirmed).await?;
    if confirmed {
        println!("Deleted {} records from {}", deleted, table);
    } else {
        println!("Deletion cancelled");
    }
    Ok(())
}

/// Exécute la commande status
pub async fn cmd_status(target: TargetArgs) -> Result<()> {
    let table = target.table_name()?;
    let store = DynamoDbStore::connect(DynamoDbConfig::from_env().with_table(&table)).await;

    let status = store.table_status().await?;
    println!("{}: {}", table, status);
    if status != TableStatus::Active {
        bail!("Table {} is not active ({})", table, status);
    }
    Ok(())
}

fn print_banner(config: &ImportConfig, input: &Path, env: Environment) {
    println!("{}", "=".repeat(60));
    println!("AHUPUAA IMPORT");
    println!("{}", "=".repeat(60));
    println!("Environment: {}", env);
    println!("Target table: {}", config.table_name);
    println!("Source file: {}", input.display());
    println!("Import mode: {}", config.mode_label());
    println!("{}", "=".repeat(60));
}

/// Demande une confirmation `yes` sur l'entrée standard
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} Type 'yes' to confirm: ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_confirmation(&answer))
}

fn is_confirmation(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
