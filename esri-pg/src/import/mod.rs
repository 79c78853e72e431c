//! Boucle d'import: statistiques → tranches → reprise → fetch → écriture
//!
//! Les tranches sont traitées une à une, dans l'ordre croissant. Le schéma de
//! la table est déduit de la première tranche récupérée et réutilisé pour
//! toutes les suivantes. Toute erreur (réseau, schéma, SQL) arrête l'import;
//! les tranches déjà validées restent en base.

use std::num::NonZeroU32;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use esrijson::{
    IdField, InsertTemplate, LayerInfo, ObjectIdRange, QueryResponse, RangePlanner,
    RecordTranslator, ResumeController, ResumeDecision, SchemaTranslator, SkipReason, TableName,
    TableSchema, Translated, DEFAULT_CHUNK_SIZE, DEFAULT_LENGTH_PADDING,
};

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::export::{ChunkWrite, FeatureSink};
use crate::report::ImportReport;
use crate::source::FeatureSource;

/// Paramètres d'un import
#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub table: TableName,
    pub chunk_size: NonZeroU32,
    pub length_padding: u32,
    pub sanitize: bool,
    /// Champ identifiant forcé; sinon celui annoncé par le service
    pub id_field: Option<IdField>,
    /// Réduire les tranches au `maxRecordCount` de la couche
    pub respect_max_record_count: bool,
}

impl ImportOptions {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            chunk_size: NonZeroU32::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroU32::MIN),
            length_padding: DEFAULT_LENGTH_PADDING,
            sanitize: false,
            id_field: None,
            respect_max_record_count: true,
        }
    }

    pub fn from_config(table: TableName, config: &ImportConfig) -> Result<Self, ImportError> {
        let chunk_size = config
            .chunk_size()
            .map_err(|e| ImportError::Config(e.to_string()))?;
        Ok(Self {
            table,
            chunk_size,
            length_padding: config.length_padding,
            sanitize: config.sanitize,
            id_field: config.id_field(),
            respect_max_record_count: config.respect_max_record_count,
        })
    }
}

/// Schéma et requête d'insertion, fixés par la première tranche
struct Target {
    schema: TableSchema,
    template: InsertTemplate,
    srid: i32,
}

impl Target {
    fn from_response(
        response: &QueryResponse,
        table: &TableName,
        translator: &SchemaTranslator,
    ) -> Result<Self, ImportError> {
        let schema = translator.translate_response(response)?;
        let template = InsertTemplate::new(table, &schema);
        Ok(Self {
            schema,
            template,
            srid: response.srid(),
        })
    }
}

/// Orchestrateur d'un import
pub struct Importer<S, K> {
    source: S,
    sink: K,
    options: ImportOptions,
    current_chunk: Option<ObjectIdRange>,
}

impl<S: FeatureSource, K: FeatureSink> Importer<S, K> {
    pub fn new(source: S, sink: K, options: ImportOptions) -> Self {
        Self {
            source,
            sink,
            options,
            current_chunk: None,
        }
    }

    pub fn into_parts(self) -> (S, K) {
        (self.source, self.sink)
    }

    /// Exécute l'import complet et remplit `report`
    pub async fn run(&mut self, report: &mut ImportReport) -> Result<(), ImportError> {
        let started = Instant::now();
        self.current_chunk = None;

        let result = self.run_chunks(report).await;

        if let Err(e) = &result {
            error!(chunk = ?self.current_chunk.map(|c| c.to_string()), error = %e, "Import aborted");
            report.record_failure(self.current_chunk, &e.to_string());
        }
        report.set_duration(started.elapsed());
        report.finalize();
        result
    }

    async fn run_chunks(&mut self, report: &mut ImportReport) -> Result<(), ImportError> {
        let table = self.options.table.clone();

        let server = self.source.server_info().await?;
        let dialect = server.dialect();
        info!(
            endpoint = self.source.endpoint(),
            version = server.current_version,
            dialect = ?dialect,
            "ArcGIS Server detected"
        );

        let layer = match self.source.layer_info().await {
            Ok(layer) => layer,
            Err(e) => {
                warn!(error = %e, "Layer metadata unavailable, using defaults");
                LayerInfo::default()
            }
        };

        let mut id_field = self
            .options
            .id_field
            .clone()
            .or_else(|| layer.object_id_field.as_deref().map(IdField::new))
            .unwrap_or_default();

        let bounds = self.source.statistics(&id_field, dialect).await?;
        if self.options.id_field.is_none() && layer.object_id_field.is_none() {
            if let Some(advertised) = bounds.id_field.clone() {
                id_field = advertised;
            }
        }
        report.id_field = id_field.to_string();

        let chunk_size = self.effective_chunk_size(&layer);
        let plan = RangePlanner::new(chunk_size).plan(&bounds);
        report.chunks_planned = plan.len();
        info!(
            id_field = %id_field,
            min = bounds.min,
            max = bounds.max,
            count = ?bounds.count,
            chunk_size = chunk_size.get(),
            chunks = plan.len(),
            "Import planned"
        );
        if bounds.is_empty() {
            info!("Source layer is empty, nothing to import");
            return Ok(());
        }

        let state = self.sink.import_state(&table, &id_field).await?;
        let mut resume = ResumeController::new(state);
        let schema_translator = SchemaTranslator::new(self.options.length_padding);
        let mut prepared: Option<Target> = None;

        for range in plan {
            self.current_chunk = Some(range);

            let decision = match resume.check(range) {
                ResumeDecision::Probe => {
                    let populated = self.sink.chunk_populated(&table, &id_field, range).await?;
                    resume.after_probe(populated)
                }
                decision => decision,
            };
            match decision {
                ResumeDecision::Skip(SkipReason::Covered) => {
                    debug!(chunk = %range, "Chunk already imported (max id), skipping");
                    report.chunks_skipped_covered += 1;
                    continue;
                }
                ResumeDecision::Skip(SkipReason::Populated) => {
                    debug!(chunk = %range, "Chunk already has rows, skipping");
                    report.chunks_skipped_populated += 1;
                    continue;
                }
                ResumeDecision::Probe | ResumeDecision::Process => {}
            }

            info!(chunk = %range, "Requesting chunk");
            let response = self.source.fetch_chunk(&id_field, range).await?;
            let fetched = response.features.len();

            if prepared.is_none() {
                let first = Target::from_response(&response, &table, &schema_translator)?;
                report.srid = Some(first.srid);
                prepared = Some(first);
            }
            let Some(target) = prepared.as_ref() else {
                continue;
            };

            let create_table = resume.needs_table_creation();
            let ddl = if create_table {
                target.schema.ddl_statements(&table, target.srid)
            } else {
                Vec::new()
            };

            let translator = RecordTranslator::new(&target.schema, target.srid)
                .with_sanitize(self.options.sanitize)
                .with_id_field(id_field.clone());
            let mut rows = Vec::with_capacity(fetched);
            let mut omitted = 0;
            for translated in translator.translate_all(response.features) {
                match translated {
                    Translated::Row(row) => rows.push(row),
                    Translated::GeometryOmitted { object_id } => {
                        debug!(object_id = ?object_id, "Feature without usable geometry, skipped");
                        omitted += 1;
                    }
                }
            }

            let inserted = self
                .sink
                .write_chunk(ChunkWrite {
                    range,
                    ddl: &ddl,
                    template: &target.template,
                    rows: &rows,
                })
                .await?;

            if create_table {
                resume.mark_table_created();
                report.table_created = true;
                info!(table = %table, srid = target.srid, "Table created");
            }
            report.record_chunk(fetched, inserted, omitted);
            info!(
                chunk = %range,
                features = fetched,
                rows = inserted,
                omitted = omitted,
                "Chunk imported"
            );
        }

        self.current_chunk = None;
        Ok(())
    }

    fn effective_chunk_size(&self, layer: &LayerInfo) -> NonZeroU32 {
        let requested = self.options.chunk_size;
        match layer.max_record_count.and_then(NonZeroU32::new) {
            Some(max) if self.options.respect_max_record_count && max < requested => {
                warn!(
                    requested = requested.get(),
                    max_record_count = max.get(),
                    "Chunk size exceeds the layer maxRecordCount, using maxRecordCount"
                );
                max
            }
            _ => requested,
        }
    }
}
