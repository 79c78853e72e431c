//! Export vers PostgreSQL/PostGIS

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tracing::{debug, info};

use esrijson::{IdField, ImportState, ObjectIdRange, Row, TableName};

use super::transaction::ChunkTransaction;
use super::{ChunkWrite, FeatureSink};
use crate::error::ImportError;

/// Schéma supposé pour une table non qualifiée
pub const DEFAULT_SCHEMA: &str = "public";

const TABLE_EXISTS_SQL: &str = "SELECT 1 FROM information_schema.tables \
     WHERE table_schema = $1::text AND table_name = $2::text";

/// Écriture des tranches dans PostGIS, une transaction par tranche
pub struct PostgresSink {
    pool: Pool,
}

impl PostgresSink {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self, chunk: Option<ObjectIdRange>) -> Result<Object, ImportError> {
        self.pool
            .get()
            .await
            .map_err(|e| ImportError::persistence(chunk, "CONNECT", e))
    }
}

/// `SELECT MAX(<id>)::bigint FROM <table>`
pub fn max_id_sql(table: &TableName, id_field: &IdField) -> String {
    format!("SELECT MAX({})::bigint FROM {}", id_field, table)
}

/// Sonde « au moins une ligne dans la tranche »
pub fn chunk_probe_sql(table: &TableName, id_field: &IdField) -> String {
    format!(
        "SELECT 1 FROM {} WHERE {} BETWEEN $1::bigint AND $2::bigint LIMIT 1",
        table, id_field
    )
}

/// Noms tels que PostgreSQL les range dans `information_schema` (identifiants non quotés)
fn catalog_names(table: &TableName) -> (String, String) {
    let schema = table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA);
    (schema.to_lowercase(), table.table.to_lowercase())
}

async fn write_rows(tx: &mut ChunkTransaction<'_>, chunk: &ChunkWrite<'_>) -> Result<u64, ImportError> {
    for sql in chunk.ddl {
        debug!(chunk = %chunk.range, sql = %sql, "DDL");
        tx.batch_execute(sql).await?;
    }
    tx.execute_all(chunk.template.sql(), chunk.rows.iter().map(Row::params))
        .await
}

#[async_trait]
impl FeatureSink for PostgresSink {
    async fn import_state(
        &mut self,
        table: &TableName,
        id_field: &IdField,
    ) -> Result<ImportState, ImportError> {
        let client = self.client(None).await?;
        let (schema, name) = catalog_names(table);

        let exists = client
            .query_opt(TABLE_EXISTS_SQL, &[&schema, &name])
            .await
            .map_err(|e| ImportError::persistence(None, TABLE_EXISTS_SQL, e))?
            .is_some();

        if !exists {
            info!(table = %table, "Target table does not exist, it will be created");
            return Ok(ImportState::default());
        }

        let sql = max_id_sql(table, id_field);
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| ImportError::persistence(None, sql.as_str(), e))?;
        let max_ingested_id: Option<i64> = row
            .try_get(0)
            .map_err(|e| ImportError::persistence(None, sql.as_str(), e))?;

        info!(table = %table, max_id = ?max_ingested_id, "Target table exists");
        Ok(ImportState {
            table_exists: true,
            max_ingested_id,
        })
    }

    async fn chunk_populated(
        &mut self,
        table: &TableName,
        id_field: &IdField,
        range: ObjectIdRange,
    ) -> Result<bool, ImportError> {
        let client = self.client(Some(range)).await?;
        let sql = chunk_probe_sql(table, id_field);
        let row = client
            .query_opt(&sql, &[&range.low, &range.high])
            .await
            .map_err(|e| ImportError::persistence(Some(range), sql.as_str(), e))?;
        Ok(row.is_some())
    }

    async fn write_chunk(&mut self, chunk: ChunkWrite<'_>) -> Result<u64, ImportError> {
        let mut client = self.client(Some(chunk.range)).await?;
        let mut tx = ChunkTransaction::begin(&mut client, chunk.range).await?;

        match write_rows(&mut tx, &chunk).await {
            Ok(_) => tx.commit().await,
            Err(e) => {
                tx.rollback(&e.to_string()).await;
                Err(e)
            }
        }
    }
}
