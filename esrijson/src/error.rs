//! Types d'erreurs pour le crate esrijson

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture ou de la traduction d'une réponse Esri JSON
#[derive(Debug, Error)]
pub enum EsriJsonError {
    /// Type de champ Esri sans équivalent PostgreSQL
    #[error("Unmapped field type {tag} for field {field}")]
    UnknownFieldType { field: String, tag: String },

    /// Type de géométrie Esri sans équivalent PostGIS
    #[error("Unmapped geometry type: {0}")]
    UnknownGeometryType(String),

    /// Document JSON valide mais ne respectant pas le format attendu
    #[error("Invalid {document} response: {reason}")]
    InvalidResponse { document: String, reason: String },

    /// Nom de table cible invalide (attendu: `table` ou `schema.table`)
    #[error("Invalid table name: '{0}'")]
    InvalidTableName(String),

    /// Erreur renvoyée par le serveur ArcGIS (objet `error`)
    #[error("Service error {code}: {message}")]
    Service { code: i64, message: String },

    /// JSON illisible
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EsriJsonError {
    /// Crée une erreur de réponse invalide avec contexte
    pub fn invalid_response(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            document: document.into(),
            reason: reason.into(),
        }
    }

    /// Indique si l'erreur vient de la traduction du schéma (type non supporté)
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownFieldType { .. } | Self::UnknownGeometryType(_)
        )
    }
}
