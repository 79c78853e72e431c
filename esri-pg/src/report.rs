//! Rapport d'import
//!
//! Compteurs par tranche et par feature, affichés en fin d'import et
//! sauvegardables en JSON.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use esrijson::ObjectIdRange;

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    /// Toutes les tranches planifiées ont été traitées ou ignorées
    Success,
    /// Arrêt sur erreur: les tranches déjà validées restent en base
    Failed,
}

/// Rapport complet d'import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub endpoint: String,
    pub table: String,
    pub id_field: String,
    pub srid: Option<i32>,
    pub duration_secs: f64,
    pub status: ImportStatus,

    // Tranches
    pub chunks_planned: usize,
    pub chunks_processed: usize,
    /// Couvertes par l'identifiant maximal déjà importé
    pub chunks_skipped_covered: usize,
    /// Au moins une ligne déjà présente dans la tranche
    pub chunks_skipped_populated: usize,

    // Features
    pub features_fetched: usize,
    pub rows_inserted: u64,
    /// Géométrie absente, dégénérée ou non encodable
    pub geometries_omitted: usize,
    pub table_created: bool,

    /// Tranche sur laquelle l'import s'est arrêté
    pub failed_chunk: Option<String>,
    pub error: Option<String>,
}

impl Default for ImportReport {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            table: String::new(),
            id_field: String::new(),
            srid: None,
            duration_secs: 0.0,
            status: ImportStatus::Success,
            chunks_planned: 0,
            chunks_processed: 0,
            chunks_skipped_covered: 0,
            chunks_skipped_populated: 0,
            features_fetched: 0,
            rows_inserted: 0,
            geometries_omitted: 0,
            table_created: false,
            failed_chunk: None,
            error: None,
        }
    }
}

impl ImportReport {
    pub fn new(endpoint: &str, table: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            table: table.to_string(),
            ..Default::default()
        }
    }

    /// Enregistre une tranche validée
    pub fn record_chunk(&mut self, fetched: usize, inserted: u64, omitted: usize) {
        self.chunks_processed += 1;
        self.features_fetched += fetched;
        self.rows_inserted += inserted;
        self.geometries_omitted += omitted;
    }

    /// Enregistre l'erreur fatale
    pub fn record_failure(&mut self, chunk: Option<ObjectIdRange>, message: &str) {
        self.failed_chunk = chunk.map(|c| c.to_string());
        self.error = Some(message.to_string());
    }

    pub fn chunks_skipped(&self) -> usize {
        self.chunks_skipped_covered + self.chunks_skipped_populated
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        self.status = if self.error.is_some() {
            ImportStatus::Failed
        } else {
            ImportStatus::Success
        };
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("IMPORT REPORT - {}", self.table);
        println!("{}", "=".repeat(60));

        println!("\nSource: {}", self.endpoint);
        println!("Status: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);
        if let Some(srid) = self.srid {
            println!("SRID: {}", srid);
        }

        println!("\n--- CHUNKS ---");
        println!(
            "{} planned, {} processed, {} skipped ({} covered, {} populated)",
            self.chunks_planned,
            self.chunks_processed,
            self.chunks_skipped(),
            self.chunks_skipped_covered,
            self.chunks_skipped_populated
        );

        println!("\n--- FEATURES ---");
        println!(
            "{} fetched, {} inserted, {} without usable geometry",
            self.features_fetched, self.rows_inserted, self.geometries_omitted
        );
        if self.table_created {
            println!("Table {} created", self.table);
        }

        if let Some(error) = &self.error {
            println!("\n--- ERROR ---");
            match &self.failed_chunk {
                Some(chunk) => println!("  chunk {}: {}", chunk, error),
                None => println!("  {}", error),
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} chunks processed, {} skipped, {} rows inserted, {} geometries omitted",
            self.table,
            self.chunks_processed,
            self.chunks_skipped(),
            self.rows_inserted,
            self.geometries_omitted
        )
    }
}
