//! Conversion des géométries Esri JSON en EWKT (`SRID=<srid>;<WKT>`)
//!
//! Seuls les points et les polygones sont encodés. Les lignes sont reconnues
//! mais leur encodage n'est pas implémenté: elles donnent `None`, comme une
//! géométrie absente ou dégénérée. `None` signifie « ne pas insérer cette
//! feature », ce n'est pas une erreur.

use geo::{Coord, Geometry, LineString, MultiPolygon, Point, Polygon};
use geozero::wkt::WktWriter;
use geozero::GeozeroGeometry;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::GeometryKind;

/// Nombre de sommets en dessous duquel (inclus) un anneau est rejeté
pub const MIN_RING_VERTICES: usize = 3;

/// Géométrie d'une feature, décodée depuis le JSON Esri
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryValue {
    Point { x: f64, y: f64 },
    Rings(Vec<Vec<Coord>>),
    /// Polylignes (`paths`), encodage non implémenté
    Paths(Vec<Vec<Coord>>),
    None,
}

impl GeometryValue {
    /// Décode une géométrie Esri JSON (`{x, y}`, `{rings}`, `{paths}`)
    ///
    /// Toute forme non reconnue ou mal formée donne [`GeometryValue::None`].
    pub fn from_esri(value: Option<&Value>) -> Self {
        let Some(obj) = value.and_then(Value::as_object) else {
            return Self::None;
        };

        if let Some(rings) = obj.get("rings") {
            return parse_parts(rings).map_or(Self::None, Self::Rings);
        }
        if let Some(paths) = obj.get("paths") {
            return parse_parts(paths).map_or(Self::None, Self::Paths);
        }
        match (
            obj.get("x").and_then(Value::as_f64),
            obj.get("y").and_then(Value::as_f64),
        ) {
            (Some(x), Some(y)) => Self::Point { x, y },
            _ => Self::None,
        }
    }
}

/// `[[[x, y, (z), (m)], ...], ...]`
fn parse_parts(value: &Value) -> Option<Vec<Vec<Coord>>> {
    value
        .as_array()?
        .iter()
        .map(|part| -> Option<Vec<Coord>> { part.as_array()?.iter().map(parse_coord).collect() })
        .collect()
}

fn parse_coord(value: &Value) -> Option<Coord> {
    let values = value.as_array()?;
    let x = values.first()?.as_f64()?;
    let y = values.get(1)?.as_f64()?;
    Some(Coord { x, y })
}

/// Encode une géométrie en EWKT pour le type de colonne `kind`
pub fn encode(geometry: &GeometryValue, kind: GeometryKind, srid: i32) -> Option<String> {
    let geom = to_geo(geometry, kind)?;

    let mut wkt_buf = Vec::new();
    {
        let mut writer = WktWriter::new(&mut wkt_buf);
        if let Err(e) = geom.process_geom(&mut writer) {
            warn!("Failed to encode geometry to WKT: {}", e);
            return None;
        }
    }
    let wkt = String::from_utf8(wkt_buf).ok()?;
    Some(format!("SRID={};{}", srid, wkt))
}

fn to_geo(geometry: &GeometryValue, kind: GeometryKind) -> Option<Geometry> {
    match (geometry, kind) {
        (GeometryValue::Point { x, y }, GeometryKind::Point) => {
            Some(Geometry::Point(Point::new(*x, *y)))
        }
        (GeometryValue::Rings(rings), GeometryKind::Polygon | GeometryKind::MultiPolygon) => {
            let polygon = rings_to_polygon(rings)?;
            if kind == GeometryKind::MultiPolygon {
                Some(Geometry::MultiPolygon(MultiPolygon::new(vec![polygon])))
            } else {
                Some(Geometry::Polygon(polygon))
            }
        }
        (GeometryValue::Paths(_), GeometryKind::LineString | GeometryKind::MultiLineString) => {
            debug!(kind = %kind, "Line geometries are not encoded");
            None
        }
        _ => None,
    }
}

/// Premier anneau en extérieur, les suivants en intérieurs.
/// Un anneau de 3 sommets ou moins invalide toute la géométrie.
fn rings_to_polygon(rings: &[Vec<Coord>]) -> Option<Polygon> {
    let (exterior, interiors) = rings.split_first()?;
    if rings.iter().any(|ring| ring.len() <= MIN_RING_VERTICES) {
        return None;
    }
    Some(Polygon::new(
        LineString::new(exterior.clone()),
        interiors.iter().cloned().map(LineString::new).collect(),
    ))
}
