//! Transaction atomique pour l'écriture d'une tranche
//!
//! Garantit le rollback de la tranche (et de la DDL de la première tranche)
//! en cas d'erreur.

use deadpool_postgres::{Object, Transaction};
use tokio_postgres::types::ToSql;
use tracing::{debug, error, info};

use esrijson::ObjectIdRange;

use crate::error::ImportError;

/// Transaction PostgreSQL couvrant une tranche d'identifiants
pub struct ChunkTransaction<'a> {
    transaction: Transaction<'a>,
    range: ObjectIdRange,
    rows_written: u64,
}

impl<'a> ChunkTransaction<'a> {
    /// Démarre la transaction de la tranche
    pub async fn begin(client: &'a mut Object, range: ObjectIdRange) -> Result<Self, ImportError> {
        let transaction = client
            .transaction()
            .await
            .map_err(|e| ImportError::persistence(Some(range), "BEGIN", e))?;

        debug!(chunk = %range, "Starting chunk transaction");

        Ok(Self {
            transaction,
            range,
            rows_written: 0,
        })
    }

    /// Exécute une instruction sans paramètres (DDL)
    pub async fn batch_execute(&self, sql: &str) -> Result<(), ImportError> {
        self.transaction
            .batch_execute(sql)
            .await
            .map_err(|e| ImportError::persistence(Some(self.range), sql, e))
    }

    /// Prépare puis exécute `sql` pour chaque jeu de paramètres
    pub async fn execute_all<'p, I>(&mut self, sql: &str, rows: I) -> Result<u64, ImportError>
    where
        I: IntoIterator<Item = Vec<Option<&'p str>>>,
    {
        let statement = self
            .transaction
            .prepare(sql)
            .await
            .map_err(|e| ImportError::persistence(Some(self.range), sql, e))?;

        let mut written = 0;
        for params in rows {
            let refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            written += self
                .transaction
                .execute(&statement, &refs)
                .await
                .map_err(|e| ImportError::persistence(Some(self.range), sql, e))?;
        }
        self.rows_written += written;
        Ok(written)
    }

    /// Valide la tranche
    pub async fn commit(self) -> Result<u64, ImportError> {
        let range = self.range;
        let rows = self.rows_written;
        self.transaction
            .commit()
            .await
            .map_err(|e| ImportError::persistence(Some(range), "COMMIT", e))?;

        info!(chunk = %range, rows = rows, "Chunk committed");
        Ok(rows)
    }

    /// Annule la tranche
    ///
    /// La transaction est également annulée si elle est droppée.
    pub async fn rollback(self, reason: &str) {
        error!(
            chunk = %self.range,
            reason = %reason,
            rows_attempted = self.rows_written,
            "Rolling back chunk"
        );

        if let Err(e) = self.transaction.rollback().await {
            error!(error = %e, "Explicit rollback failed (will rollback on drop anyway)");
        }
    }
}
