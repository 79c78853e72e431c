//! Point d'entrée CLI pour esri-pg

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

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

mod cli;

use cli::{Commands, ImportArgs};

/// Importer une couche ArcGIS Server dans PostGIS
#[derive(Parser)]
#[command(name = "esri-pg")]
#[command(author, version)]
#[command(about = "Importer une couche ArcGIS Server (query) dans PostGIS (défaut) ou un script SQL")]
#[command(long_about = "Import par tranches d'identifiants d'un point d'accès ArcGIS Server vers PostGIS, avec reprise.\n\nPar défaut, importe vers PostGIS. Utilisez 'to-sql' pour écrire un script SQL.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: import vers PostGIS)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments pour l'import PostGIS (commande par défaut)
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
        Some(Commands::ToSql(args)) => {
            info!(url = %args.source.url, output = %args.output.display(), "Export vers SQL");
            cli::cmd_to_sql(args).await?;
        }
        Some(Commands::Import(args)) => {
            info!(url = %args.source.url, table = %args.source.table, "Import vers PostGIS");
            cli::cmd_import(args).await?;
        }
        None => {
            // Commande par défaut: PostGIS
            let Some(args) = cli.import else {
                anyhow::bail!("Arguments --url and --table are required (see --help)");
            };
            info!(url = %args.source.url, table = %args.source.table, "Import vers PostGIS");
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
