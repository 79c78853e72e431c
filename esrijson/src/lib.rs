//! # esrijson
//!
//! Traduction des réponses Esri JSON d'un service ArcGIS Server (`.../query`)
//! en schéma et lignes PostGIS.
//!
//! ## Features
//!
//! - Validation typée des réponses `query`, statistiques et métadonnées
//! - Traduction du schéma (types Esri → types PostgreSQL, `AddGeometryColumn`)
//! - Encodage EWKT des points et polygones via `geo` + `geozero`
//! - Découpage en tranches d'identifiants et logique de reprise
//!
//! ## Usage
//!
//! ```rust,ignore
//! use esrijson::{parse_query_response, InsertTemplate, RecordTranslator, SchemaTranslator};
//!
//! let response = parse_query_response(&body)?;
//! let schema = SchemaTranslator::default().translate_response(&response)?;
//! let table = "gisdata.parcels".parse()?;
//!
//! for sql in schema.ddl_statements(&table, response.srid()) {
//!     println!("{}", sql);
//! }
//!
//! let template = InsertTemplate::new(&table, &schema);
//! let srid = response.srid();
//! for row in RecordTranslator::new(&schema, srid).translate_all(response.features) {
//!     // ...
//! }
//! ```

pub mod error;
pub mod geometry;
pub mod range;
pub mod record;
pub mod response;
pub mod resume;
pub mod schema;
pub mod types;

pub use error::EsriJsonError;
pub use geometry::GeometryValue;
pub use range::{ChunkPlan, IdBounds, RangePlanner, StatisticsDialect, DEFAULT_CHUNK_SIZE};
pub use record::{InsertTemplate, RecordTranslator, Row, Rows, Translated};
pub use response::{
    parse_layer_info, parse_query_response, parse_server_info, parse_statistics, LayerInfo,
    ServerInfo,
};
pub use resume::{ImportState, ResumeController, ResumeDecision, SkipReason};
pub use schema::{Column, ColumnType, SchemaTranslator, TableSchema, DEFAULT_LENGTH_PADDING};
pub use types::{
    Feature, FieldDescriptor, FieldType, GeometryKind, IdField, ObjectIdRange, QueryResponse,
    TableName,
};
