//! # esri-pg
//!
//! Import d'une couche ArcGIS Server (point d'accès `query`) vers PostGIS.
//!
//! ## Features
//!
//! - Pagination par tranches d'identifiants (`outStatistics` ou `returnCountOnly`)
//! - Reprise d'un import interrompu (tranches couvertes ou déjà peuplées ignorées)
//! - Une transaction par tranche, table créée dans la première
//! - Export en script SQL autonome (sans base de données)
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import vers PostGIS
//! esri-pg --url https://example.com/arcgis/rest/services/Base/MapServer/0/query --table gisdata.parcels
//!
//! # Script SQL (sans base de données)
//! esri-pg to-sql --url https://example.com/arcgis/rest/services/Base/MapServer/0/query --table parcels --output parcels.sql
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod report;
pub mod source;

pub use config::ImportConfig;
pub use error::ImportError;
pub use export::pool::{create_pool, DatabaseConfig, SslMode};
pub use export::{ChunkWrite, FeatureSink, PostgresSink, SqlScriptSink};
pub use import::{ImportOptions, Importer};
pub use report::{ImportReport, ImportStatus};
pub use source::{FeatureSource, HttpFeatureSource};
