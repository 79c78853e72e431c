//! Export vers un script SQL autonome (sans base de données)
//!
//! Chaque tranche est encadrée par `BEGIN;` / `COMMIT;`. L'état de reprise est
//! toujours vide: toutes les tranches sont écrites.

use std::io::Write;

use async_trait::async_trait;

use esrijson::{IdField, ImportState, ObjectIdRange, TableName};

use super::{ChunkWrite, FeatureSink};
use crate::error::ImportError;

pub struct SqlScriptSink<W> {
    out: W,
}

impl<W: Write + Send> SqlScriptSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, chunk: ObjectIdRange, sql: &str) -> Result<(), ImportError> {
        writeln!(self.out, "{}", sql).map_err(|e| ImportError::persistence(Some(chunk), sql, e))
    }
}

#[async_trait]
impl<W: Write + Send> FeatureSink for SqlScriptSink<W> {
    async fn import_state(
        &mut self,
        _table: &TableName,
        _id_field: &IdField,
    ) -> Result<ImportState, ImportError> {
        Ok(ImportState::default())
    }

    async fn chunk_populated(
        &mut self,
        _table: &TableName,
        _id_field: &IdField,
        _range: ObjectIdRange,
    ) -> Result<bool, ImportError> {
        Ok(false)
    }

    async fn write_chunk(&mut self, chunk: ChunkWrite<'_>) -> Result<u64, ImportError> {
        let range = chunk.range;
        self.line(range, &format!("-- chunk {}", range))?;
        self.line(range, "BEGIN;")?;
        for sql in chunk.ddl {
            self.line(range, sql)?;
        }
        for row in chunk.rows {
            self.line(range, &chunk.template.render_literal(row))?;
        }
        self.line(range, "COMMIT;")?;
        self.out
            .flush()
            .map_err(|e| ImportError::persistence(Some(range), "COMMIT;", e))?;

        Ok(chunk.rows.len() as u64)
    }
}
