//! Tests d'intégration PostgreSQL
//!
//! Ces tests nécessitent une base PostgreSQL avec PostGIS.
//! Configuration via variables d'environnement:
//! - PGHOST, PGPORT, PGUSER, PGPASSWORD, PGDATABASE
//!
//! Exécution:
//! ```bash
//! # Avec PostgreSQL local
//! cargo test --test postgres_integration -- --ignored
//!
//! # Avec Docker
//! docker run -d --name postgres-test -e POSTGRES_PASSWORD=test -p 5432:5432 postgis/postgis
//! PGPASSWORD=test cargo test --test postgres_integration -- --ignored
//! ```

use anyhow::Result;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;

use esri_pg::{ChunkWrite, FeatureSink, ImportError, PostgresSink};
use esrijson::{
    Feature, FieldDescriptor, FieldType, GeometryKind, IdField, InsertTemplate, ObjectIdRange,
    RecordTranslator, Row, SchemaTranslator, TableName, TableSchema, Translated,
};

/// Configuration de test
fn test_config() -> Config {
    let mut cfg = Config::new();
    cfg.host = Some(std::env::var("PGHOST").unwrap_or_else(|_| "localhost".into()));
    cfg.port = Some(
        std::env::var("PGPORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(5432),
    );
    cfg.dbname = Some(std::env::var("PGDATABASE").unwrap_or_else(|_| "esri_pg_test".into()));
    cfg.user = Some(std::env::var("PGUSER").unwrap_or_else(|_| "postgres".into()));
    cfg.password = std::env::var("PGPASSWORD").ok();
    cfg
}

async fn create_test_pool() -> Result<Pool> {
    let cfg = test_config();
    let pool = cfg.create_pool(Some(Runtime::Tokio1), NoTls)?;
    Ok(pool)
}

/// Recrée un schéma vide (un par test, les tests tournent en parallèle)
async fn reset_schema(pool: &Pool, schema: &str) -> Result<()> {
    let client = pool.get().await?;
    client
        .batch_execute(&format!(
            "CREATE EXTENSION IF NOT EXISTS postgis;
             DROP SCHEMA IF EXISTS {schema} CASCADE;
             CREATE SCHEMA {schema};"
        ))
        .await?;
    Ok(())
}

fn points_schema() -> TableSchema {
    let fields = vec![
        FieldDescriptor {
            name: "OBJECTID".to_string(),
            field_type: FieldType::Oid,
            length: None,
            alias: None,
        },
        FieldDescriptor {
            name: "NAME".to_string(),
            field_type: FieldType::String,
            length: Some(10),
            alias: Some("Point name".to_string()),
        },
    ];
    SchemaTranslator::default().translate(&fields, Some(GeometryKind::Point))
}

fn rows(schema: &TableSchema, features: &str) -> Vec<Row> {
    let features: Vec<Feature> = serde_json::from_str(features).unwrap();
    RecordTranslator::new(schema, 4326)
        .translate_all(features)
        .filter_map(|t| match t {
            Translated::Row(row) => Some(row),
            Translated::GeometryOmitted { .. } => None,
        })
        .collect()
}

/// Test de connexion basique
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_database_connection() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    let client = pool.get().await.expect("Failed to get client");

    let row = client
        .query_one("SELECT 1 as test", &[])
        .await
        .expect("Query failed");
    let value: i32 = row.get("test");
    assert_eq!(value, 1);
}

/// Création de table, insertion et sondes de reprise
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_sink_creates_table_and_resumes() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    reset_schema(&pool, "esri_pg_roundtrip")
        .await
        .expect("Failed to reset schema");

    let table: TableName = "esri_pg_roundtrip.points".parse().unwrap();
    let id = IdField::new("OBJECTID");
    let mut sink = PostgresSink::new(pool.clone());

    let state = sink.import_state(&table, &id).await.unwrap();
    assert!(!state.table_exists);
    assert_eq!(state.max_ingested_id, None);

    let schema = points_schema();
    let template = InsertTemplate::new(&table, &schema);
    let ddl = schema.ddl_statements(&table, 4326);
    let rows = rows(
        &schema,
        r#"[
            {"attributes": {"OBJECTID": 1, "NAME": "O'Neil"}, "geometry": {"x": 5.72, "y": 45.18}},
            {"attributes": {"OBJECTID": 2, "NAME": null}, "geometry": {"x": 5.73, "y": 45.19}},
            {"attributes": {"OBJECTID": 3, "NAME": "nowhere"}}
        ]"#,
    );
    assert_eq!(rows.len(), 2);

    let written = sink
        .write_chunk(ChunkWrite {
            range: ObjectIdRange::new(0, 999),
            ddl: &ddl,
            template: &template,
            rows: &rows,
        })
        .await
        .expect("Chunk write failed");
    assert_eq!(written, 2);

    let state = sink.import_state(&table, &id).await.unwrap();
    assert!(state.table_exists);
    assert_eq!(state.max_ingested_id, Some(2));

    assert!(sink
        .chunk_populated(&table, &id, ObjectIdRange::new(0, 999))
        .await
        .unwrap());
    assert!(!sink
        .chunk_populated(&table, &id, ObjectIdRange::new(1000, 1999))
        .await
        .unwrap());

    let client = pool.get().await.unwrap();
    let row = client
        .query_one(
            "SELECT name, ST_AsText(shape), ST_SRID(shape) FROM esri_pg_roundtrip.points WHERE objectid = 1",
            &[],
        )
        .await
        .unwrap();
    let name: String = row.get(0);
    let wkt: String = row.get(1);
    let srid: i32 = row.get(2);
    assert_eq!(name, "O'Neil");
    assert_eq!(wkt, "POINT(5.72 45.18)");
    assert_eq!(srid, 4326);

    let comment: Option<String> = client
        .query_one(
            "SELECT col_description('esri_pg_roundtrip.points'::regclass, 2)",
            &[],
        )
        .await
        .unwrap()
        .get(0);
    assert_eq!(comment.as_deref(), Some("Point name"));
}

/// Une erreur au milieu d'une tranche annule toute la tranche
#[tokio::test]
#[ignore = "Requires PostgreSQL database"]
async fn test_chunk_rollback_on_error() {
    let pool = create_test_pool().await.expect("Failed to create pool");
    reset_schema(&pool, "esri_pg_rollback")
        .await
        .expect("Failed to reset schema");

    let table: TableName = "esri_pg_rollback.points".parse().unwrap();
    let schema = points_schema();
    let template = InsertTemplate::new(&table, &schema);
    let ddl = schema.ddl_statements(&table, 4326);
    let mut sink = PostgresSink::new(pool.clone());

    // Deuxième ligne invalide: identifiant non numérique
    let mut bad_rows = rows(
        &schema,
        r#"[
            {"attributes": {"OBJECTID": 1, "NAME": "a"}, "geometry": {"x": 1, "y": 1}},
            {"attributes": {"OBJECTID": 2, "NAME": "b"}, "geometry": {"x": 2, "y": 2}}
        ]"#,
    );
    bad_rows[1].values[0] = Some("not a number".to_string());

    let err = sink
        .write_chunk(ChunkWrite {
            range: ObjectIdRange::new(0, 999),
            ddl: &ddl,
            template: &template,
            rows: &bad_rows,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ImportError::Persistence {
            chunk: Some(range),
            ..
        } if range == ObjectIdRange::new(0, 999)
    ));

    // La DDL de la première tranche est annulée avec elle
    let state = sink
        .import_state(&table, &IdField::new("OBJECTID"))
        .await
        .unwrap();
    assert!(!state.table_exists);
}
