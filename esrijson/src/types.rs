//! Types de données pour le crate esrijson

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::EsriJsonError;

/// Identifiant de la projection Web Mercator historiquement utilisé par Esri
pub const ESRI_WEB_MERCATOR: i32 = 102100;

/// Code EPSG de Web Mercator
pub const EPSG_WEB_MERCATOR: i32 = 3857;

/// SRID utilisé lorsque la réponse ne décrit aucune référence spatiale
pub const UNKNOWN_SRID: i32 = -1;

/// Nom conventionnel du champ identifiant
pub const DEFAULT_ID_FIELD: &str = "objectid";

/// Types de champs Esri (`esriFieldType*`) supportés
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    SmallInteger,
    Integer,
    Single,
    Double,
    String,
    Date,
    Oid,
    Blob,
    Guid,
    GlobalId,
    Xml,
}

impl FieldType {
    /// Tag Esri correspondant
    pub fn tag(self) -> &'static str {
        match self {
            Self::SmallInteger => "esriFieldTypeSmallInteger",
            Self::Integer => "esriFieldTypeInteger",
            Self::Single => "esriFieldTypeSingle",
            Self::Double => "esriFieldTypeDouble",
            Self::String => "esriFieldTypeString",
            Self::Date => "esriFieldTypeDate",
            Self::Oid => "esriFieldTypeOID",
            Self::Blob => "esriFieldTypeBlob",
            Self::Guid => "esriFieldTypeGUID",
            Self::GlobalId => "esriFieldTypeGlobalID",
            Self::Xml => "esriFieldTypeXML",
        }
    }

    /// Parse un tag Esri, `None` si le tag n'a pas d'équivalent
    pub fn from_tag(tag: &str) -> Option<Self> {
        let field_type = match tag {
            "esriFieldTypeSmallInteger" => Self::SmallInteger,
            "esriFieldTypeInteger" => Self::Integer,
            "esriFieldTypeSingle" => Self::Single,
            "esriFieldTypeDouble" => Self::Double,
            "esriFieldTypeString" => Self::String,
            "esriFieldTypeDate" => Self::Date,
            "esriFieldTypeOID" => Self::Oid,
            "esriFieldTypeBlob" => Self::Blob,
            "esriFieldTypeGUID" => Self::Guid,
            "esriFieldTypeGlobalID" => Self::GlobalId,
            "esriFieldTypeXML" => Self::Xml,
            _ => return None,
        };
        Some(field_type)
    }
}

/// Type de géométrie PostGIS cible, déduit du `geometryType` Esri
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryKind {
    Geometry,
    Point,
    MultiPoint,
    LineString,
    Curve,
    MultiLineString,
    Polygon,
    MultiPolygon,
    MultiSurface,
    GeometryCollection,
}

impl GeometryKind {
    /// Nom PostGIS (utilisé dans `AddGeometryColumn` et en tête d'EWKT)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Geometry => "GEOMETRY",
            Self::Point => "POINT",
            Self::MultiPoint => "MULTIPOINT",
            Self::LineString => "LINESTRING",
            Self::Curve => "CURVE",
            Self::MultiLineString => "MULTILINESTRING",
            Self::Polygon => "POLYGON",
            Self::MultiPolygon => "MULTIPOLYGON",
            Self::MultiSurface => "MULTISURFACE",
            Self::GeometryCollection => "GEOMCOLLECTION",
        }
    }
}

impl FromStr for GeometryKind {
    type Err = EsriJsonError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let kind = match tag {
            "esriGeometryNull" => Self::Geometry,
            "esriGeometryPoint" => Self::Point,
            "esriGeometryMultipoint" => Self::MultiPoint,
            "esriGeometryLine" => Self::LineString,
            "esriGeometryCircularArc"
            | "esriGeometryEllipticArc"
            | "esriGeometryBezier3Curve"
            | "esriGeometryPath" => Self::Curve,
            "esriGeometryPolyline" => Self::MultiLineString,
            "esriGeometryRing" | "esriGeometryEnvelope" => Self::Polygon,
            "esriGeometryPolygon" => Self::MultiPolygon,
            "esriGeometryMultiPatch"
            | "esriGeometryTriangleStrip"
            | "esriGeometryTriangleFan"
            | "esriGeometryTriangles" => Self::MultiSurface,
            "esriGeometryAny" => Self::GeometryCollection,
            other => return Err(EsriJsonError::UnknownGeometryType(other.to_string())),
        };
        Ok(kind)
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Référence spatiale (`spatialReference`)
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    pub wkid: Option<i32>,
    pub latest_wkid: Option<i32>,
}

impl SpatialReference {
    /// SRID PostGIS: `latestWkid` prioritaire, 102100 ramené à 3857
    pub fn srid(&self) -> i32 {
        match self.latest_wkid.or(self.wkid) {
            Some(ESRI_WEB_MERCATOR) => EPSG_WEB_MERCATOR,
            Some(wkid) => wkid,
            None => UNKNOWN_SRID,
        }
    }
}

/// Description brute d'un champ, telle que renvoyée par le serveur
#[derive(Debug, Clone, Deserialize)]
pub struct RawField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub length: Option<u32>,
    #[serde(default)]
    pub alias: Option<String>,
}

/// Champ source typé
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub length: Option<u32>,
    pub alias: Option<String>,
}

impl TryFrom<&RawField> for FieldDescriptor {
    type Error = EsriJsonError;

    fn try_from(raw: &RawField) -> Result<Self, Self::Error> {
        let field_type =
            FieldType::from_tag(&raw.type_tag).ok_or_else(|| EsriJsonError::UnknownFieldType {
                field: raw.name.clone(),
                tag: raw.type_tag.clone(),
            })?;
        Ok(Self {
            name: raw.name.clone(),
            field_type,
            length: raw.length.filter(|l| *l > 0),
            alias: raw.alias.clone(),
        })
    }
}

/// Une feature Esri: attributs + géométrie brute
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// Géométrie au format Esri JSON (`{x, y}`, `{rings}`, `{paths}`...)
    #[serde(default)]
    pub geometry: Option<Value>,
}

impl Feature {
    /// Identifiant de la feature (recherche insensible à la casse)
    pub fn object_id(&self, id_field: &IdField) -> Option<i64> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(id_field.as_str()))
            .and_then(|(_, v)| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }
}

/// Réponse d'une requête `query` du service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default)]
    pub object_id_field_name: Option<String>,

    #[serde(default)]
    pub geometry_type: Option<String>,

    #[serde(default)]
    pub spatial_reference: Option<SpatialReference>,

    pub fields: Vec<RawField>,

    pub features: Vec<Feature>,

    /// Positionné par le serveur quand `maxRecordCount` a tronqué le résultat
    #[serde(default)]
    pub exceeded_transfer_limit: bool,
}

impl QueryResponse {
    /// SRID de la réponse (-1 si absent)
    pub fn srid(&self) -> i32 {
        self.spatial_reference
            .map(|sr| sr.srid())
            .unwrap_or(UNKNOWN_SRID)
    }

    /// Type de géométrie cible, `None` si la réponse n'en décrit pas
    pub fn geometry_kind(&self) -> Result<Option<GeometryKind>, EsriJsonError> {
        self.geometry_type.as_deref().map(str::parse).transpose()
    }

    /// Convertit les champs bruts en descripteurs typés
    pub fn field_descriptors(&self) -> Result<Vec<FieldDescriptor>, EsriJsonError> {
        self.fields.iter().map(FieldDescriptor::try_from).collect()
    }
}

/// Nom du champ identifiant utilisé pour la pagination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdField(String);

impl IdField {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for IdField {
    fn default() -> Self {
        Self(DEFAULT_ID_FIELD.to_string())
    }
}

impl fmt::Display for IdField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Intervalle fermé d'identifiants `[low, high]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectIdRange {
    pub low: i64,
    pub high: i64,
}

impl ObjectIdRange {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.low <= id && id <= self.high
    }
}

impl fmt::Display for ObjectIdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.low, self.high)
    }
}

/// Nom de table cible, éventuellement qualifié par un schéma
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub table: String,
}

impl TableName {
    pub fn new(schema: Option<&str>, table: &str) -> Self {
        Self {
            schema: schema.map(str::to_string),
            table: table.to_string(),
        }
    }
}

impl FromStr for TableName {
    type Err = EsriJsonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EsriJsonError::InvalidTableName(s.to_string());
        match s.split_once('.') {
            Some((schema, table)) => {
                if schema.is_empty() || table.is_empty() || table.contains('.') {
                    return Err(invalid());
                }
                Ok(Self::new(Some(schema), table))
            }
            None if !s.is_empty() => Ok(Self::new(None, s)),
            None => Err(invalid()),
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.table),
            None => f.write_str(&self.table),
        }
    }
}
