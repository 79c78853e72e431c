//! Pool de connexions PostgreSQL

use anyhow::{Context, Result};
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;

/// Mode SSL pour la connexion PostgreSQL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SslMode {
    #[default]
    Disable,
    Prefer,
    Require,
}

impl std::str::FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Ok(SslMode::Disable),
            "prefer" => Ok(SslMode::Prefer),
            "require" | "on" | "true" | "yes" => Ok(SslMode::Require),
            _ => Err(format!("Invalid SSL mode: {}. Use: disable, prefer, require", s)),
        }
    }
}

/// Configuration de la base de données
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    /// Un seul écrivain: une connexion suffit
    pub pool_size: usize,
    pub ssl_mode: SslMode,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "gisdata".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 1,
            ssl_mode: SslMode::Disable,
        }
    }
}

impl DatabaseConfig {
    /// Charge la configuration depuis les variables d'environnement
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: var("PGPORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("PGDATABASE").unwrap_or(defaults.dbname),
            user: var("PGUSER").unwrap_or(defaults.user),
            password: var("PGPASSWORD"),
            pool_size: var("POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.pool_size),
            ssl_mode: var("PGSSLMODE")
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// Surcharge par les options de la ligne de commande
    pub fn apply_overrides(
        &mut self,
        host: Option<String>,
        database: Option<String>,
        user: Option<String>,
        password: Option<String>,
        port: Option<u16>,
        ssl: Option<&str>,
    ) -> Result<()> {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(database) = database {
            self.dbname = database;
        }
        if let Some(user) = user {
            self.user = user;
        }
        if let Some(password) = password {
            self.password = Some(password);
        }
        if let Some(port) = port {
            self.port = port;
        }
        if let Some(ssl) = ssl {
            self.ssl_mode = ssl.parse().map_err(anyhow::Error::msg)?;
        }
        Ok(())
    }
}

/// Crée la configuration TLS pour rustls
fn make_tls_connector() -> MakeRustlsConnect {
    let root_store = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    MakeRustlsConnect::new(config)
}

/// Crée un pool de connexions
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = config.password.clone();

    cfg.pool = Some(PoolConfig {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(Duration::from_secs(30)),
            create: Some(Duration::from_secs(10)),
            recycle: Some(Duration::from_secs(30)),
        },
        ..Default::default()
    });

    match config.ssl_mode {
        SslMode::Disable => cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .context("Failed to create database pool"),
        SslMode::Prefer | SslMode::Require => cfg
            .create_pool(Some(Runtime::Tokio1), make_tls_connector())
            .context("Failed to create database pool with TLS"),
    }
}

/// Teste la connexion et la présence de PostGIS
pub async fn test_connection(pool: &Pool) -> Result<()> {
    let client = pool
        .get()
        .await
        .context("Failed to get connection from pool")?;
    client
        .execute("SELECT 1", &[])
        .await
        .context("Connection test failed")?;

    let postgis = client
        .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
        .await
        .context("Failed to check pg_extension")?;
    if postgis.is_none() {
        anyhow::bail!("PostGIS extension is not installed in the target database");
    }
    Ok(())
}
