//! Définition et implémentation des commandes CLI
//!
//! - `import` (défaut): service ArcGIS → PostGIS, avec reprise
//! - `to-sql`: service ArcGIS → script SQL (sans base de données)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tracing::info;

use esri_pg::export::pool::{create_pool, test_connection, DatabaseConfig};
use esri_pg::source::http::HttpOptions;
use esri_pg::{
    HttpFeatureSource, ImportConfig, ImportOptions, ImportReport, Importer, PostgresSink,
    SqlScriptSink,
};
use esrijson::TableName;

#[derive(Subcommand)]
pub enum Commands {
    /// Import an ArcGIS Server layer into PostGIS (default command)
    Import(ImportArgs),

    /// Write the DDL and INSERT statements to a SQL script (no database required)
    ToSql(ToSqlArgs),
}

/// Options communes: source, table cible, paramètres d'import
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Query endpoint (e.g. https://host/arcgis/rest/services/Base/MapServer/0/query)
    #[arg(short, long)]
    pub url: String,

    /// Target table, optionally schema-qualified (schema.table)
    #[arg(short, long)]
    pub table: String,

    /// JSON config file with import settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Width of the object id ranges requested per query
    #[arg(long)]
    pub chunk_size: Option<u32>,

    /// Object id field (default: advertised by the layer, else objectid)
    #[arg(long)]
    pub id_field: Option<String>,

    /// Strip control characters and collapse whitespace in text values
    #[arg(long)]
    pub sanitize: bool,

    /// Output spatial reference requested from the server (outSR)
    #[arg(long)]
    pub out_sr: Option<i32>,

    /// Save the import report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / gisdata)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ToSqlArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output SQL file
    #[arg(short, long)]
    pub output: PathBuf,
}

/// Configuration du fichier, surchargée par la ligne de commande
fn resolve_config(args: &SourceArgs) -> Result<ImportConfig> {
    let mut config = ImportConfig::load_or_default(args.config.as_deref())?;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(id_field) = &args.id_field {
        config.id_field = Some(id_field.clone());
    }
    if args.sanitize {
        config.sanitize = true;
    }
    if args.out_sr.is_some() {
        config.out_sr = args.out_sr;
    }
    config.validate()?;
    Ok(config)
}

fn parse_table(table: &str) -> Result<TableName> {
    table
        .parse()
        .with_context(|| format!("Invalid table name: {}", table))
}

fn finish(report: &ImportReport, report_path: Option<&Path>) -> Result<()> {
    report.display();
    if let Some(path) = report_path {
        report
            .save_to_file(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report saved");
    }
    Ok(())
}

/// Exécute la commande import
pub async fn cmd_import(args: ImportArgs) -> Result<()> {
    let config = resolve_config(&args.source)?;
    let table = parse_table(&args.source.table)?;

    println!("=== Import {} ===", table);
    println!("Source: {}", args.source.url);
    println!("Chunk size: {}", config.chunk_size);
    println!(
        "Id field: {}",
        config.id_field.as_deref().unwrap_or("(from layer)")
    );
    println!("Sanitize: {}", config.sanitize);

    let mut db_config = DatabaseConfig::from_env();
    db_config.apply_overrides(
        args.host,
        args.database,
        args.user,
        args.password,
        args.port,
        args.ssl.as_deref(),
    )?;
    println!(
        "Database: {}@{}:{}/{} (SSL: {:?})",
        db_config.user, db_config.host, db_config.port, db_config.dbname, db_config.ssl_mode
    );

    let pool = create_pool(&db_config).await?;
    test_connection(&pool).await?;
    println!("Connected to PostgreSQL");

    let source = HttpFeatureSource::new(&args.source.url, HttpOptions::from(&config))?;
    let options = ImportOptions::from_config(table.clone(), &config)?;
    let mut report = ImportReport::new(&args.source.url, &table.to_string());

    let mut importer = Importer::new(source, PostgresSink::new(pool), options);
    let result = importer.run(&mut report).await;

    finish(&report, args.source.report.as_deref())?;
    result.context("Import failed")?;

    info!("{}", report.summary());
    Ok(())
}

/// Exécute la commande to-sql
pub async fn cmd_to_sql(args: ToSqlArgs) -> Result<()> {
    let config = resolve_config(&args.source)?;
    let table = parse_table(&args.source.table)?;

    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let source = HttpFeatureSource::new(&args.source.url, HttpOptions::from(&config))?;
    let options = ImportOptions::from_config(table.clone(), &config)?;
    let mut report = ImportReport::new(&args.source.url, &table.to_string());

    let mut importer = Importer::new(source, SqlScriptSink::new(BufWriter::new(file)), options);
    let result = importer.run(&mut report).await;

    let (_, sink) = importer.into_parts();
    sink.into_inner()
        .flush()
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    finish(&report, args.source.report.as_deref())?;
    result.context("SQL export failed")?;

    println!("SQL script written to {}", args.output.display());
    Ok(())
}
