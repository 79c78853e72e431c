//! Modules d'export (PostgreSQL, script SQL)

pub mod pool;
pub mod postgres;
pub mod script;
pub mod transaction;

use async_trait::async_trait;

use esrijson::{IdField, ImportState, InsertTemplate, ObjectIdRange, Row, TableName};

use crate::error::ImportError;

pub use postgres::PostgresSink;
pub use script::SqlScriptSink;

/// Une tranche prête à être écrite
#[derive(Debug, Clone, Copy)]
pub struct ChunkWrite<'a> {
    pub range: ObjectIdRange,
    /// DDL à exécuter avant les lignes (première tranche seulement)
    pub ddl: &'a [String],
    pub template: &'a InsertTemplate,
    pub rows: &'a [Row],
}

/// Destination des lignes
///
/// Une tranche est écrite en une seule transaction: soit toutes ses lignes
/// (et la DDL éventuelle) sont validées, soit aucune.
#[async_trait]
pub trait FeatureSink: Send {
    /// État de la table cible, lu une fois au démarrage
    async fn import_state(
        &mut self,
        table: &TableName,
        id_field: &IdField,
    ) -> Result<ImportState, ImportError>;

    /// La table contient-elle déjà au moins une ligne dans `range` ?
    async fn chunk_populated(
        &mut self,
        table: &TableName,
        id_field: &IdField,
        range: ObjectIdRange,
    ) -> Result<bool, ImportError>;

    /// Écrit et valide une tranche, retourne le nombre de lignes insérées
    async fn write_chunk(&mut self, chunk: ChunkWrite<'_>) -> Result<u64, ImportError>;
}
