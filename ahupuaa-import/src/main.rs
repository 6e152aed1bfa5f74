//! Point d'entrée CLI pour ahupuaa-import

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use ahupuaa_import::cli::{self, Commands, ImportArgs};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

/// Importer les ahupuaʻa GeoJSON dans la table DynamoDB des tuiles
#[derive(Parser)]
#[command(name = "ahupuaa-import")]
#[command(author, version)]
#[command(about = "Importer les ahupuaʻa GeoJSON dans DynamoDB (défaut) ou gérer la table")]
#[command(long_about = "Import en flux d'une FeatureCollection d'ahupuaʻa vers DynamoDB, avec niveaux de détail, geohash et écriture par lots avec reprise.\n\nPar défaut, lance l'import. Utilisez 'wipe' ou 'status' pour administrer la table.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: import)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments de l'import (commande par défaut)
    #[command(flatten)]
    import: Option<ImportArgs>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::Wipe { target, yes }) => {
            info!(env = %target.env, "Wiping table");
            cli::cmd_wipe(target, yes).await?;
        }
        Some(Commands::Status { target }) => {
            cli::cmd_status(target).await?;
        }
        None => {
            // Commande par défaut: import
            let args = cli.import.context("Import requires --input <PATH>")?;
            info!(input = %args.input.display(), env = %args.target.env, "Import to DynamoDB");
            cli::cmd_import(args).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
