//! Tests d'intégration de la boucle d'import
//!
//! Source et destination simulées: aucun accès réseau ni base de données.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use esri_pg::{
    ChunkWrite, FeatureSink, FeatureSource, ImportError, ImportOptions, ImportReport,
    ImportStatus, Importer, SqlScriptSink,
};
use esrijson::{
    parse_query_response, IdBounds, IdField, ImportState, LayerInfo, ObjectIdRange,
    QueryResponse, ServerInfo, StatisticsDialect, TableName,
};

/// Service simulé: une couche en mémoire
struct FakeSource {
    version: f64,
    layer: LayerInfo,
    bounds: IdBounds,
    geometry_type: Option<&'static str>,
    fields: Value,
    features: Vec<Value>,
    fail_statistics: bool,
    fail_fetch_on: Option<ObjectIdRange>,
    statistics_calls: Mutex<Vec<(String, StatisticsDialect)>>,
    fetched: Mutex<Vec<(String, ObjectIdRange)>>,
}

impl FakeSource {
    fn new(bounds: IdBounds, fields: Value, features: Vec<Value>) -> Self {
        Self {
            version: 10.81,
            layer: LayerInfo::default(),
            bounds,
            geometry_type: Some("esriGeometryPoint"),
            fields,
            features,
            fail_statistics: false,
            fail_fetch_on: None,
            statistics_calls: Mutex::new(Vec::new()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    fn fetched_ranges(&self) -> Vec<ObjectIdRange> {
        self.fetched.lock().unwrap().iter().map(|(_, r)| *r).collect()
    }
}

#[async_trait]
impl FeatureSource for FakeSource {
    fn endpoint(&self) -> &str {
        "http://example.com/arcgis/rest/services/Test/MapServer/0/query"
    }

    async fn server_info(&self) -> Result<ServerInfo, ImportError> {
        Ok(ServerInfo {
            current_version: self.version,
        })
    }

    async fn layer_info(&self) -> Result<LayerInfo, ImportError> {
        Ok(self.layer.clone())
    }

    async fn statistics(
        &self,
        id_field: &IdField,
        dialect: StatisticsDialect,
    ) -> Result<IdBounds, ImportError> {
        self.statistics_calls
            .lock()
            .unwrap()
            .push((id_field.to_string(), dialect));
        if self.fail_statistics {
            return Err(ImportError::source_query(self.endpoint(), "HTTP 500"));
        }
        Ok(self.bounds.clone())
    }

    async fn fetch_chunk(
        &self,
        id_field: &IdField,
        range: ObjectIdRange,
    ) -> Result<QueryResponse, ImportError> {
        self.fetched
            .lock()
            .unwrap()
            .push((id_field.to_string(), range));
        if self.fail_fetch_on == Some(range) {
            return Err(ImportError::source_query(self.endpoint(), "HTTP 503"));
        }

        let features: Vec<&Value> = self
            .features
            .iter()
            .filter(|f| {
                f["attributes"]["objectid"]
                    .as_i64()
                    .is_some_and(|id| range.contains(id))
            })
            .collect();

        let mut doc = json!({
            "spatialReference": {"wkid": 4326, "latestWkid": 4326},
            "fields": self.fields,
            "features": features,
        });
        if let Some(geometry_type) = self.geometry_type {
            doc["geometryType"] = json!(geometry_type);
        }

        parse_query_response(&doc.to_string())
            .map_err(|e| ImportError::source_query(self.endpoint(), e))
    }
}

/// Destination en mémoire
#[derive(Default)]
struct MemorySink {
    state: ImportState,
    populated: Vec<ObjectIdRange>,
    fail_on: Option<ObjectIdRange>,
    probes: Vec<ObjectIdRange>,
    written: Vec<ObjectIdRange>,
    statements: Vec<String>,
}

#[async_trait]
impl FeatureSink for MemorySink {
    async fn import_state(
        &mut self,
        _table: &TableName,
        _id_field: &IdField,
    ) -> Result<ImportState, ImportError> {
        Ok(self.state)
    }

    async fn chunk_populated(
        &mut self,
        _table: &TableName,
        _id_field: &IdField,
        range: ObjectIdRange,
    ) -> Result<bool, ImportError> {
        self.probes.push(range);
        Ok(self.populated.contains(&range))
    }

    async fn write_chunk(&mut self, chunk: ChunkWrite<'_>) -> Result<u64, ImportError> {
        if self.fail_on == Some(chunk.range) {
            return Err(ImportError::persistence(
                Some(chunk.range),
                chunk.template.sql(),
                "simulated failure",
            ));
        }
        self.written.push(chunk.range);
        self.statements.extend(chunk.ddl.iter().cloned());
        self.statements
            .extend(chunk.rows.iter().map(|r| chunk.template.render_literal(r)));
        Ok(chunk.rows.len() as u64)
    }
}

fn point_fields() -> Value {
    json!([
        {"name": "objectid", "type": "esriFieldTypeOID", "alias": "objectid"},
        {"name": "name", "type": "esriFieldTypeString", "alias": "name", "length": 10}
    ])
}

fn point_features(ids: impl IntoIterator<Item = i64>) -> Vec<Value> {
    ids.into_iter()
        .map(|id| {
            json!({
                "attributes": {"objectid": id, "name": format!("n{}", id)},
                "geometry": {"x": id, "y": -id}
            })
        })
        .collect()
}

fn options(table: &str, chunk_size: u32) -> ImportOptions {
    let mut options = ImportOptions::new(table.parse().unwrap());
    options.chunk_size = std::num::NonZeroU32::new(chunk_size).unwrap();
    options
}

#[tokio::test]
async fn test_script_import_skips_missing_geometry() {
    let source = FakeSource::new(
        IdBounds::new(1, 2),
        json!([{"name": "name", "type": "esriFieldTypeString", "length": 10}]),
        vec![
            json!({"attributes": {"objectid": 1, "name": "first"}, "geometry": {"x": 1.5, "y": 2}}),
            json!({"attributes": {"objectid": 2, "name": "second"}, "geometry": null}),
        ],
    );

    let mut report = ImportReport::new(source.endpoint(), "parcels");
    let mut importer = Importer::new(
        source,
        SqlScriptSink::new(Vec::new()),
        options("parcels", 1000),
    );
    importer.run(&mut report).await.unwrap();

    let (_, sink) = importer.into_parts();
    let script = String::from_utf8(sink.into_inner()).unwrap();

    assert_eq!(script.matches("CREATE TABLE").count(), 1);
    assert!(script.contains("CREATE TABLE parcels (\n    name character varying (15)\n);"));
    assert_eq!(script.matches("AddGeometryColumn").count(), 1);
    assert!(script.contains("SELECT AddGeometryColumn('parcels', 'shape', 4326, 'POINT', 2, True);"));
    assert_eq!(script.matches("INSERT INTO").count(), 1);
    assert!(script.contains(
        "INSERT INTO parcels (name, shape) VALUES ('first', ST_GeomFromEWKT('SRID=4326;POINT(1.5 2)'));"
    ));

    assert_eq!(report.status, ImportStatus::Success);
    assert_eq!(report.chunks_planned, 1);
    assert_eq!(report.chunks_processed, 1);
    assert_eq!(report.features_fetched, 2);
    assert_eq!(report.rows_inserted, 1);
    assert_eq!(report.geometries_omitted, 1);
    assert_eq!(report.srid, Some(4326));
    assert!(report.table_created);
}

#[tokio::test]
async fn test_resume_skips_imported_chunks() {
    let source = FakeSource::new(
        IdBounds::new(0, 3500),
        point_fields(),
        point_features([10, 1500, 2500, 3100, 3500]),
    );
    let sink = MemorySink {
        state: ImportState {
            table_exists: true,
            max_ingested_id: Some(1999),
        },
        populated: vec![ObjectIdRange::new(2000, 2999)],
        ..Default::default()
    };

    let mut report = ImportReport::new(source.endpoint(), "gis.points");
    let mut importer = Importer::new(source, sink, options("gis.points", 1000));
    importer.run(&mut report).await.unwrap();

    let (source, sink) = importer.into_parts();
    assert_eq!(source.fetched_ranges(), vec![ObjectIdRange::new(3000, 3999)]);
    assert_eq!(
        sink.probes,
        vec![ObjectIdRange::new(2000, 2999), ObjectIdRange::new(3000, 3999)]
    );
    assert_eq!(sink.written, vec![ObjectIdRange::new(3000, 3999)]);
    // Table existante: pas de DDL
    assert!(sink.statements.iter().all(|s| s.starts_with("INSERT INTO gis.points")));
    assert_eq!(sink.statements.len(), 2);

    assert_eq!(report.chunks_planned, 4);
    assert_eq!(report.chunks_skipped_covered, 2);
    assert_eq!(report.chunks_skipped_populated, 1);
    assert_eq!(report.chunks_processed, 1);
    assert_eq!(report.rows_inserted, 2);
    assert!(!report.table_created);
}

#[tokio::test]
async fn test_fail_fast_on_persistence_error() {
    let source = FakeSource::new(
        IdBounds::new(0, 2999),
        point_fields(),
        point_features([1, 1001, 2001]),
    );
    let sink = MemorySink {
        fail_on: Some(ObjectIdRange::new(1000, 1999)),
        ..Default::default()
    };

    let mut report = ImportReport::new(source.endpoint(), "points");
    let mut importer = Importer::new(source, sink, options("points", 1000));
    let err = importer.run(&mut report).await.unwrap_err();

    match &err {
        ImportError::Persistence { chunk, .. } => {
            assert_eq!(*chunk, Some(ObjectIdRange::new(1000, 1999)))
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let (source, sink) = importer.into_parts();
    // La troisième tranche n'est jamais demandée
    assert_eq!(
        source.fetched_ranges(),
        vec![ObjectIdRange::new(0, 999), ObjectIdRange::new(1000, 1999)]
    );
    assert_eq!(sink.written, vec![ObjectIdRange::new(0, 999)]);
    assert_eq!(
        sink.statements
            .iter()
            .filter(|s| s.starts_with("CREATE TABLE"))
            .count(),
        1
    );

    assert_eq!(report.status, ImportStatus::Failed);
    assert_eq!(report.chunks_processed, 1);
    assert_eq!(report.failed_chunk.as_deref(), Some("[1000, 1999]"));
    assert!(report.error.as_deref().unwrap().contains("simulated failure"));
}

#[tokio::test]
async fn test_fail_fast_on_fetch_error() {
    let mut source = FakeSource::new(
        IdBounds::new(0, 2999),
        point_fields(),
        point_features([1, 1001, 2001]),
    );
    source.fail_fetch_on = Some(ObjectIdRange::new(1000, 1999));

    let mut report = ImportReport::new(source.endpoint(), "points");
    let mut importer = Importer::new(source, MemorySink::default(), options("points", 1000));
    let err = importer.run(&mut report).await.unwrap_err();
    assert!(matches!(err, ImportError::SourceQuery { .. }), "{:?}", err);

    let (source, sink) = importer.into_parts();
    assert_eq!(
        source.fetched_ranges(),
        vec![ObjectIdRange::new(0, 999), ObjectIdRange::new(1000, 1999)]
    );
    // La première tranche reste écrite
    assert_eq!(sink.written, vec![ObjectIdRange::new(0, 999)]);

    assert_eq!(report.status, ImportStatus::Failed);
    assert_eq!(report.chunks_processed, 1);
    assert_eq!(report.failed_chunk.as_deref(), Some("[1000, 1999]"));
    assert!(report.error.as_deref().unwrap().contains("HTTP 503"));
}

#[tokio::test]
async fn test_statistics_error_aborts_before_any_chunk() {
    let mut source = FakeSource::new(IdBounds::new(0, 999), point_fields(), point_features([1]));
    source.fail_statistics = true;

    let mut report = ImportReport::new(source.endpoint(), "points");
    let mut importer = Importer::new(source, MemorySink::default(), options("points", 1000));
    let err = importer.run(&mut report).await.unwrap_err();
    assert!(matches!(err, ImportError::SourceQuery { .. }), "{:?}", err);

    let (source, sink) = importer.into_parts();
    assert!(source.fetched_ranges().is_empty());
    assert!(sink.written.is_empty());
    assert_eq!(report.status, ImportStatus::Failed);
    assert_eq!(report.failed_chunk, None);
}

#[tokio::test]
async fn test_legacy_server_and_layer_id_field() {
    let mut source = FakeSource::new(
        IdBounds::from_count(3),
        point_fields(),
        point_features([0, 1, 2, 3]),
    );
    source.version = 10.0;
    source.layer = LayerInfo {
        object_id_field: Some("FID".to_string()),
        max_record_count: Some(2),
    };

    let mut report = ImportReport::new(source.endpoint(), "points");
    let mut importer = Importer::new(source, MemorySink::default(), options("points", 1000));
    importer.run(&mut report).await.unwrap();

    let (source, sink) = importer.into_parts();
    assert_eq!(
        *source.statistics_calls.lock().unwrap(),
        vec![("FID".to_string(), StatisticsDialect::CountOnly)]
    );

    // Tranches réduites au maxRecordCount: [0, 1], [2, 3]
    let fetched = source.fetched.lock().unwrap().clone();
    assert_eq!(
        fetched,
        vec![
            ("FID".to_string(), ObjectIdRange::new(0, 1)),
            ("FID".to_string(), ObjectIdRange::new(2, 3)),
        ]
    );
    assert_eq!(sink.written.len(), 2);
    assert_eq!(report.id_field, "FID");
    assert_eq!(report.rows_inserted, 4);
}

#[tokio::test]
async fn test_unknown_field_type_aborts_before_writing() {
    let source = FakeSource::new(
        IdBounds::new(1, 1),
        json!([{"name": "raster", "type": "esriFieldTypeRaster"}]),
        point_features([1]),
    );

    let mut report = ImportReport::new(source.endpoint(), "points");
    let mut importer = Importer::new(source, MemorySink::default(), options("points", 1000));
    let err = importer.run(&mut report).await.unwrap_err();

    assert!(matches!(err, ImportError::Schema(_)));
    let (_, sink) = importer.into_parts();
    assert!(sink.written.is_empty());
    assert_eq!(report.status, ImportStatus::Failed);
}

#[tokio::test]
async fn test_empty_layer_imports_nothing() {
    let source = FakeSource::new(IdBounds::empty(), point_fields(), Vec::new());

    let mut report = ImportReport::new(source.endpoint(), "points");
    let mut importer = Importer::new(source, MemorySink::default(), options("points", 1000));
    importer.run(&mut report).await.unwrap();

    let (source, sink) = importer.into_parts();
    assert!(source.fetched_ranges().is_empty());
    assert!(sink.written.is_empty());
    assert_eq!(report.chunks_planned, 0);
    assert_eq!(report.status, ImportStatus::Success);
}
