//! Validation des documents renvoyés par le service (query, statistiques, métadonnées)
//!
//! Chaque document est converti une seule fois en structure typée. Un objet
//! `error` renvoyé par ArcGIS Server (avec un statut HTTP 200) est remonté en
//! [`EsriJsonError::Service`].

use serde::Deserialize;
use serde_json::{json, Value};

use crate::range::{IdBounds, StatisticsDialect};
use crate::types::{FieldType, IdField, QueryResponse};
use crate::EsriJsonError;

/// Noms des statistiques demandées au serveur
pub const STAT_COUNT: &str = "oidcount";
pub const STAT_MIN: &str = "oidmin";
pub const STAT_MAX: &str = "oidmax";

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<String>,
}

/// Métadonnées du serveur (`/rest/services?f=pjson`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerInfo {
    pub current_version: f64,
}

impl ServerInfo {
    pub fn dialect(&self) -> StatisticsDialect {
        StatisticsDialect::for_version(self.current_version)
    }
}

/// Métadonnées de la couche interrogée (`<layer>?f=pjson`)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerInfo {
    /// Nom du champ identifiant déclaré par la couche
    pub object_id_field: Option<String>,
    /// Nombre maximal d'enregistrements renvoyés par requête
    pub max_record_count: Option<u32>,
}

/// Parse une réponse texte en JSON en remontant les erreurs du service
fn parse_document(text: &str) -> Result<Value, EsriJsonError> {
    let doc: Value = serde_json::from_str(text)?;
    check_service_error(&doc)?;
    Ok(doc)
}

/// Vérifie l'absence d'objet `error` dans un document
pub fn check_service_error(doc: &Value) -> Result<(), EsriJsonError> {
    match doc.get("error") {
        Some(err) => {
            let body: ServiceErrorBody = serde_json::from_value(err.clone())?;
            let mut message = body.message;
            if !body.details.is_empty() {
                message = format!("{} ({})", message, body.details.join("; "));
            }
            Err(EsriJsonError::Service {
                code: body.code,
                message,
            })
        }
        None => Ok(()),
    }
}

/// Parse et valide une réponse de requête `query`
pub fn parse_query_response(text: &str) -> Result<QueryResponse, EsriJsonError> {
    let doc: Value = serde_json::from_str(text)?;
    query_response_from_value(doc)
}

/// Valide un document `query` déjà parsé
pub fn query_response_from_value(doc: Value) -> Result<QueryResponse, EsriJsonError> {
    check_service_error(&doc)?;
    serde_json::from_value(doc).map_err(|e| EsriJsonError::invalid_response("query", e.to_string()))
}

/// Parse les métadonnées du serveur
pub fn parse_server_info(text: &str) -> Result<ServerInfo, EsriJsonError> {
    let doc = parse_document(text)?;
    let current_version = doc
        .get("currentVersion")
        .and_then(version_number)
        .ok_or_else(|| EsriJsonError::invalid_response("server info", "missing currentVersion"))?;
    Ok(ServerInfo { current_version })
}

/// `currentVersion` est un nombre (10.81) ou, sur de vieux serveurs, une chaîne ("10.0")
fn version_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            // "10.8.1" → 10.8
            let mut parts = s.split('.');
            let major = parts.next()?;
            match parts.next() {
                Some(minor) => format!("{}.{}", major, minor).parse().ok(),
                None => major.parse().ok(),
            }
        }
        _ => None,
    }
}

/// Parse les métadonnées d'une couche
pub fn parse_layer_info(text: &str) -> Result<LayerInfo, EsriJsonError> {
    let doc = parse_document(text)?;

    let declared = doc
        .get("objectIdField")
        .and_then(Value::as_str)
        .map(str::to_string);

    // À défaut, le premier champ de type OID
    let from_fields = || {
        doc.get("fields")?
            .as_array()?
            .iter()
            .find(|f| {
                f.get("type").and_then(Value::as_str) == Some(FieldType::Oid.tag())
            })
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let max_record_count = doc
        .get("maxRecordCount")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .filter(|n| *n > 0);

    Ok(LayerInfo {
        object_id_field: declared.or_else(from_fields),
        max_record_count,
    })
}

/// Définition `outStatistics` (count/min/max) sur le champ identifiant
pub fn out_statistics(id_field: &IdField) -> String {
    json!([
        {
            "statisticType": "count",
            "onStatisticField": id_field.as_str(),
            "outStatisticFieldName": STAT_COUNT,
        },
        {
            "statisticType": "min",
            "onStatisticField": id_field.as_str(),
            "outStatisticFieldName": STAT_MIN,
        },
        {
            "statisticType": "max",
            "onStatisticField": id_field.as_str(),
            "outStatisticFieldName": STAT_MAX,
        }
    ])
    .to_string()
}

/// Parse une réponse de statistiques selon le dialecte du serveur
pub fn parse_statistics(
    text: &str,
    dialect: StatisticsDialect,
) -> Result<IdBounds, EsriJsonError> {
    let doc = parse_document(text)?;
    statistics_from_value(&doc, dialect)
}

/// Extrait les bornes d'identifiants d'un document de statistiques
pub fn statistics_from_value(
    doc: &Value,
    dialect: StatisticsDialect,
) -> Result<IdBounds, EsriJsonError> {
    let id_field = doc
        .get("objectIdFieldName")
        .and_then(Value::as_str)
        .map(IdField::new);

    match dialect {
        StatisticsDialect::CountOnly => {
            let count = doc
                .get("count")
                .and_then(as_integer)
                .ok_or_else(|| EsriJsonError::invalid_response("statistics", "missing count"))?;
            Ok(IdBounds {
                id_field,
                ..IdBounds::from_count(count)
            })
        }
        StatisticsDialect::OutStatistics => {
            let attributes = doc
                .get("features")
                .and_then(Value::as_array)
                .and_then(|features| features.first())
                .and_then(|f| f.get("attributes"))
                .and_then(Value::as_object)
                .ok_or_else(|| {
                    EsriJsonError::invalid_response("statistics", "missing features[0].attributes")
                })?;

            // La casse des noms de statistiques varie selon le serveur (OIDMIN, oidmin...)
            let lookup = |name: &str| {
                attributes
                    .iter()
                    .find(|(k, _)| k.to_lowercase() == name)
                    .map(|(_, v)| v)
            };

            let bound = |name: &str| -> Result<Option<i64>, EsriJsonError> {
                match lookup(name) {
                    None => Err(EsriJsonError::invalid_response(
                        "statistics",
                        format!("missing {}", name),
                    )),
                    Some(Value::Null) => Ok(None),
                    Some(v) => as_integer(v).map(Some).ok_or_else(|| {
                        EsriJsonError::invalid_response(
                            "statistics",
                            format!("{} is not an integer: {}", name, v),
                        )
                    }),
                }
            };

            let min = bound(STAT_MIN)?;
            let max = bound(STAT_MAX)?;
            let count = lookup(STAT_COUNT).and_then(as_integer);

            match (min, max) {
                (Some(min), Some(max)) => Ok(IdBounds {
                    min,
                    max,
                    count,
                    id_field,
                }),
                // Couche vide: min/max nuls
                _ => Ok(IdBounds {
                    id_field,
                    ..IdBounds::empty()
                }),
            }
        }
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
}
