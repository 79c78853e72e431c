//! Erreurs fatales de l'import
//!
//! Toutes ces erreurs interrompent l'import. Les tranches déjà validées restent
//! en base; une relance reprend grâce à la logique de reprise.

use esrijson::{EsriJsonError, ObjectIdRange};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    /// Type de champ ou de géométrie sans équivalent (avant toute écriture)
    #[error("Schema error: {0}")]
    Schema(#[from] EsriJsonError),

    /// Échec d'une requête vers le service (HTTP, JSON, objet `error`)
    #[error("Source query failed for {url}: {reason}")]
    SourceQuery { url: String, reason: String },

    /// Échec d'une instruction SQL
    #[error("Persistence failed{}: {reason} (statement: {statement})", chunk_label(.chunk))]
    Persistence {
        chunk: Option<ObjectIdRange>,
        statement: String,
        reason: String,
    },

    /// Configuration invalide
    #[error("Invalid configuration: {0}")]
    Config(String),
}

fn chunk_label(chunk: &Option<ObjectIdRange>) -> String {
    match chunk {
        Some(range) => format!(" on chunk {}", range),
        None => String::new(),
    }
}

impl ImportError {
    pub fn source_query(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceQuery {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(
        chunk: Option<ObjectIdRange>,
        statement: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Persistence {
            chunk,
            statement: statement.into(),
            reason: reason.to_string(),
        }
    }
}
