//! Traduction des features en lignes à insérer

use std::collections::HashMap;

use serde_json::Value;

use crate::geometry::{self, GeometryValue};
use crate::schema::{clean_field_name, Column, ColumnType, TableSchema, SHAPE_COLUMN};
use crate::types::{Feature, IdField, TableName};

/// Requête `INSERT` paramétrée, construite une fois par schéma
///
/// Les valeurs sont transmises en texte puis converties côté serveur
/// (`$1::text::integer`); la géométrie passe par `ST_GeomFromEWKT`.
#[derive(Debug, Clone)]
pub struct InsertTemplate {
    sql: String,
    table: TableName,
    columns: Vec<(String, ColumnType)>,
    has_shape: bool,
}

impl InsertTemplate {
    pub fn new(table: &TableName, schema: &TableSchema) -> Self {
        let columns: Vec<(String, ColumnType)> = schema
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.column_type))
            .collect();
        let has_shape = schema.geometry.is_some();

        let mut placeholders: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (_, column_type))| placeholder(i + 1, *column_type))
            .collect();
        if has_shape {
            placeholders.push(format!("ST_GeomFromEWKT(${})", columns.len() + 1));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({});",
            table,
            schema.column_names().join(", "),
            placeholders.join(", ")
        );

        Self {
            sql,
            table: table.clone(),
            columns,
            has_shape,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Nombre de paramètres attendus par ligne
    pub fn param_count(&self) -> usize {
        self.columns.len() + usize::from(self.has_shape)
    }

    /// Rend l'`INSERT` avec les valeurs littérales (script SQL autonome)
    pub fn render_literal(&self, row: &Row) -> String {
        let mut values: Vec<String> = self
            .columns
            .iter()
            .zip(&row.values)
            .map(|((_, column_type), value)| match value {
                None => "NULL".to_string(),
                Some(v) => match column_type.cast_name() {
                    "text" => quote_literal(v),
                    cast => format!("{}::{}", quote_literal(v), cast),
                },
            })
            .collect();
        if self.has_shape {
            match &row.shape {
                Some(shape) => values.push(format!("ST_GeomFromEWKT({})", quote_literal(shape))),
                None => values.push("NULL".to_string()),
            }
        }

        let names: Vec<&str> = self
            .columns
            .iter()
            .map(|(name, _)| name.as_str())
            .chain(self.has_shape.then_some(SHAPE_COLUMN))
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({});",
            self.table,
            names.join(", "),
            values.join(", ")
        )
    }
}

fn placeholder(index: usize, column_type: ColumnType) -> String {
    match column_type.cast_name() {
        "text" => format!("${}::text", index),
        cast => format!("${}::text::{}", index, cast),
    }
}

/// Littéral SQL entre apostrophes (apostrophes doublées)
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Supprime les caractères non imprimables et réduit les suites d'espaces à un seul
pub fn sanitize_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;
    for c in value.chars() {
        if c.is_whitespace() {
            pending_space = true;
        } else if c.is_control() {
            continue;
        } else {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        }
    }
    out
}

/// Ligne prête à être insérée, valeurs dans l'ordre des colonnes du schéma
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub object_id: Option<i64>,
    pub values: Vec<Option<String>>,
    /// EWKT, absent uniquement pour une table sans colonne géométrique
    pub shape: Option<String>,
}

impl Row {
    /// Paramètres dans l'ordre de [`InsertTemplate::sql`]
    pub fn params(&self) -> Vec<Option<&str>> {
        self.values
            .iter()
            .map(|v| v.as_deref())
            .chain(self.shape.as_deref().map(Some))
            .collect()
    }
}

/// Résultat de la traduction d'une feature
#[derive(Debug, Clone, PartialEq)]
pub enum Translated {
    Row(Row),
    /// Géométrie absente, dégénérée ou non encodable: la feature n'est pas insérée
    GeometryOmitted { object_id: Option<i64> },
}

/// Traducteur de features pour un schéma donné
#[derive(Debug, Clone)]
pub struct RecordTranslator<'a> {
    schema: &'a TableSchema,
    column_keys: Vec<ColumnKey>,
    srid: i32,
    sanitize: bool,
    id_field: IdField,
}

impl<'a> RecordTranslator<'a> {
    pub fn new(schema: &'a TableSchema, srid: i32) -> Self {
        Self {
            schema,
            column_keys: schema.columns.iter().map(ColumnKey::new).collect(),
            srid,
            sanitize: false,
            id_field: IdField::default(),
        }
    }

    /// Active le nettoyage des valeurs texte
    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn with_id_field(mut self, id_field: IdField) -> Self {
        self.id_field = id_field;
        self
    }

    /// Traduit une feature
    pub fn translate(&self, feature: &Feature) -> Translated {
        let object_id = feature.object_id(&self.id_field);

        let shape = match self.schema.geometry {
            Some(kind) => {
                let value = GeometryValue::from_esri(feature.geometry.as_ref());
                match geometry::encode(&value, kind, self.srid) {
                    Some(ewkt) => Some(ewkt),
                    None => return Translated::GeometryOmitted { object_id },
                }
            }
            None => None,
        };

        // Clé exacte du champ retenu, puis sans casse, puis par nom nettoyé
        let mut by_name: HashMap<String, &Value> = HashMap::with_capacity(feature.attributes.len());
        let mut by_clean: HashMap<String, &Value> = HashMap::with_capacity(feature.attributes.len());
        for (name, value) in &feature.attributes {
            by_name.entry(name.to_lowercase()).or_insert(value);
            by_clean
                .entry(clean_field_name(name).to_lowercase())
                .or_insert(value);
        }

        let values = self
            .column_keys
            .iter()
            .map(|key| {
                feature
                    .attributes
                    .get(&key.source)
                    .or_else(|| by_name.get(&key.source_lower).copied())
                    .or_else(|| by_clean.get(&key.clean_lower).copied())
                    .and_then(|v| self.value_text(v))
            })
            .collect();

        Translated::Row(Row {
            object_id,
            values,
            shape,
        })
    }

    /// Traduit un lot de features, paresseusement et en une seule passe
    pub fn translate_all(self, features: Vec<Feature>) -> Rows<'a> {
        Rows {
            translator: self,
            features: features.into_iter(),
        }
    }

    fn value_text(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) if self.sanitize => Some(sanitize_text(s)),
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// Clés de recherche d'une colonne dans les attributs
#[derive(Debug, Clone)]
struct ColumnKey {
    source: String,
    source_lower: String,
    clean_lower: String,
}

impl ColumnKey {
    fn new(column: &Column) -> Self {
        Self {
            source: column.source_name.clone(),
            source_lower: column.source_name.to_lowercase(),
            clean_lower: column.name.to_lowercase(),
        }
    }
}

/// Itérateur consommant les features d'une tranche
///
/// Non redémarrable: les features sont consommées au fur et à mesure.
#[derive(Debug)]
pub struct Rows<'a> {
    translator: RecordTranslator<'a>,
    features: std::vec::IntoIter<Feature>,
}

impl Iterator for Rows<'_> {
    type Item = Translated;

    fn next(&mut self) -> Option<Self::Item> {
        let feature = self.features.next()?;
        Some(self.translator.translate(&feature))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.features.size_hint()
    }
}

impl ExactSizeIterator for Rows<'_> {}
