//! Configuration de l'import

use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use esrijson::{IdField, DEFAULT_CHUNK_SIZE, DEFAULT_LENGTH_PADDING};

/// Délai réseau par défaut (secondes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 360;

pub const DEFAULT_USER_AGENT: &str = concat!("esri-pg/", env!("CARGO_PKG_VERSION"));

/// Paramètres de l'import, chargeables depuis un fichier JSON
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Largeur des tranches d'identifiants
    pub chunk_size: u32,

    /// Marge ajoutée à la longueur des champs texte
    pub length_padding: u32,

    /// Nettoyer les valeurs texte (caractères non imprimables, espaces multiples)
    pub sanitize: bool,

    /// Champ identifiant forcé (sinon celui annoncé par la couche, sinon `objectid`)
    pub id_field: Option<String>,

    /// Réduire la taille des tranches au `maxRecordCount` de la couche
    pub respect_max_record_count: bool,

    /// Projection demandée au serveur (`outSR`)
    pub out_sr: Option<i32>,

    /// Délai réseau (secondes)
    pub timeout_secs: u64,

    pub user_agent: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            length_padding: DEFAULT_LENGTH_PADDING,
            sanitize: false,
            id_field: None,
            respect_max_record_count: true,
            out_sr: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ImportConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Charge le fichier s'il est fourni, sinon les valeurs par défaut
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be greater than 0");
        }
        if matches!(&self.id_field, Some(f) if f.trim().is_empty()) {
            anyhow::bail!("id_field must not be empty");
        }
        Ok(())
    }

    pub fn chunk_size(&self) -> Result<NonZeroU32> {
        NonZeroU32::new(self.chunk_size).context("chunk_size must be greater than 0")
    }

    pub fn id_field(&self) -> Option<IdField> {
        self.id_field.as_deref().map(IdField::new)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
