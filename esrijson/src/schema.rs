//! Traduction du schéma Esri (champs + type de géométrie) en définition de table PostGIS

use std::borrow::Cow;
use std::collections::HashSet;

use tracing::debug;

use crate::types::{FieldDescriptor, FieldType, GeometryKind, QueryResponse, TableName};
use crate::EsriJsonError;

/// Marge ajoutée à la longueur des champs texte (échappements, normalisation)
pub const DEFAULT_LENGTH_PADDING: u32 = 5;

/// Au-delà de cette longueur, un champ texte devient `text` sans limite
pub const UNBOUNDED_TEXT_THRESHOLD: u32 = 256;

/// Nom de la colonne géométrique ajoutée en fin de table
pub const SHAPE_COLUMN: &str = "shape";

/// Type SQL d'une colonne attributaire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    DoublePrecision,
    Varchar(u32),
    Text,
    /// Dates Esri: millisecondes depuis l'epoch, conservées telles quelles
    BigInt,
    Serial,
    Bytea,
    Uuid,
    Xml,
}

impl ColumnType {
    /// Nom du type tel qu'écrit dans le `CREATE TABLE`
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::DoublePrecision => "double precision",
            Self::Varchar(_) => "character varying",
            Self::Text => "text",
            Self::BigInt => "bigint",
            Self::Serial => "serial",
            Self::Bytea => "bytea",
            Self::Uuid => "uuid",
            Self::Xml => "xml",
        }
    }

    pub fn length(self) -> Option<u32> {
        match self {
            Self::Varchar(len) => Some(len),
            _ => None,
        }
    }

    /// Type cible des paramètres d'insertion (transmis en texte)
    pub fn cast_name(self) -> &'static str {
        match self {
            Self::Serial => "integer",
            Self::Varchar(_) => "text",
            other => other.sql_name(),
        }
    }

    /// Définition de colonne: `character varying (15)`, `integer`...
    pub fn definition(self) -> String {
        match self.length() {
            Some(len) => format!("{} ({})", self.sql_name(), len),
            None => self.sql_name().to_string(),
        }
    }
}

/// Colonne attributaire de la table cible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// Nom du champ source retenu, clé des attributs des features
    pub source_name: String,
    pub column_type: ColumnType,
    /// Alias Esri conservé uniquement s'il diffère du nom
    pub alias: Option<String>,
}

/// Définition de la table cible
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub geometry: Option<GeometryKind>,
}

impl TableSchema {
    /// Noms des colonnes dans l'ordre d'insertion (`shape` en dernier)
    pub fn column_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.columns.iter().map(|c| c.name.as_str()).collect();
        if self.geometry.is_some() {
            names.push(SHAPE_COLUMN);
        }
        names
    }

    /// `CREATE TABLE` des colonnes attributaires
    ///
    /// La colonne `shape` n'y figure pas: elle est ajoutée par `AddGeometryColumn`.
    pub fn create_table_sql(&self, table: &TableName) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {} {}", c.name, c.column_type.definition()))
            .collect();
        format!("CREATE TABLE {} (\n{}\n);", table, columns.join(",\n"))
    }

    /// Enregistrement de la colonne géométrique (forme à 6 arguments si la
    /// table est qualifiée par un schéma, à 5 sinon)
    pub fn add_geometry_column_sql(&self, table: &TableName, srid: i32) -> Option<String> {
        let kind = self.geometry?;
        let sql = match &table.schema {
            Some(schema) => format!(
                "SELECT AddGeometryColumn('{}', '{}', '{}', {}, '{}', 2, True);",
                schema, table.table, SHAPE_COLUMN, srid, kind
            ),
            None => format!(
                "SELECT AddGeometryColumn('{}', '{}', {}, '{}', 2, True);",
                table.table, SHAPE_COLUMN, srid, kind
            ),
        };
        Some(sql)
    }

    /// Un `COMMENT ON COLUMN` par champ dont l'alias diffère du nom
    pub fn comment_sql(&self, table: &TableName) -> Vec<String> {
        self.columns
            .iter()
            .filter_map(|c| {
                let alias = c.alias.as_ref()?;
                Some(format!(
                    "COMMENT ON COLUMN {}.{} IS '{}';",
                    table,
                    c.name,
                    alias.replace('\'', "''")
                ))
            })
            .collect()
    }

    /// Script complet de création, une instruction par élément
    pub fn ddl_statements(&self, table: &TableName, srid: i32) -> Vec<String> {
        let mut statements = vec![self.create_table_sql(table)];
        statements.extend(self.add_geometry_column_sql(table, srid));
        statements.extend(self.comment_sql(table));
        statements
    }
}

/// Nettoie un nom de champ qualifié (`sde.PARCELS.AREA` → `AREA`,
/// `Shape.STArea()` → `STArea`)
pub fn clean_field_name(name: &str) -> Cow<'_, str> {
    match name.rsplit_once('.') {
        Some((_, last)) => Cow::Owned(last.replace(['(', ')'], "")),
        None => Cow::Borrowed(name),
    }
}

/// Traducteur de schéma
#[derive(Debug, Clone, Copy)]
pub struct SchemaTranslator {
    length_padding: u32,
}

impl Default for SchemaTranslator {
    fn default() -> Self {
        Self {
            length_padding: DEFAULT_LENGTH_PADDING,
        }
    }
}

impl SchemaTranslator {
    pub fn new(length_padding: u32) -> Self {
        Self { length_padding }
    }

    /// Traduit la réponse complète: champs + `geometryType`
    pub fn translate_response(&self, response: &QueryResponse) -> Result<TableSchema, EsriJsonError> {
        let geometry = response.geometry_kind()?;
        let fields = response.field_descriptors()?;
        Ok(self.translate(&fields, geometry))
    }

    /// Traduit une liste de champs typés
    ///
    /// Les doublons après nettoyage (comparaison insensible à la casse, comme
    /// les identifiants PostgreSQL non quotés) sont ignorés: le premier gagne.
    /// Un champ attributaire nommé `shape` est écarté si une géométrie est présente.
    pub fn translate(
        &self,
        fields: &[FieldDescriptor],
        geometry: Option<GeometryKind>,
    ) -> TableSchema {
        let mut seen: HashSet<String> = HashSet::new();
        if geometry.is_some() {
            seen.insert(SHAPE_COLUMN.to_string());
        }

        let mut columns = Vec::with_capacity(fields.len());
        for field in fields {
            let name = clean_field_name(&field.name).into_owned();
            if name.is_empty() {
                debug!(field = %field.name, "Dropping field with empty cleaned name");
                continue;
            }
            if !seen.insert(name.to_lowercase()) {
                debug!(field = %field.name, "Dropping duplicate field");
                continue;
            }

            let column_type = self.column_type(field);
            let alias = field.alias.clone().filter(|alias| *alias != name);

            columns.push(Column {
                name,
                source_name: field.name.clone(),
                column_type,
                alias,
            });
        }

        TableSchema { columns, geometry }
    }

    fn column_type(&self, field: &FieldDescriptor) -> ColumnType {
        match field.field_type {
            FieldType::SmallInteger | FieldType::Integer => ColumnType::Integer,
            FieldType::Single | FieldType::Double => ColumnType::DoublePrecision,
            FieldType::String => match field.length {
                Some(len) => {
                    let padded = len.saturating_add(self.length_padding);
                    if padded >= UNBOUNDED_TEXT_THRESHOLD {
                        ColumnType::Text
                    } else {
                        ColumnType::Varchar(padded)
                    }
                }
                None => ColumnType::Text,
            },
            FieldType::Date => ColumnType::BigInt,
            FieldType::Oid => ColumnType::Serial,
            FieldType::Blob => ColumnType::Bytea,
            FieldType::Guid | FieldType::GlobalId => ColumnType::Uuid,
            FieldType::Xml => ColumnType::Xml,
        }
    }
}
