//! Découpage de l'espace des identifiants en tranches (chunks)
//!
//! Chaque tranche est un intervalle fermé `[low, high]` de largeur
//! `chunk_size`. Les tranches démarrent à `min`, sont contiguës et couvrent
//! `[min, max]`; la dernière peut dépasser `max`, ce qui est sans effet puisque
//! le filtre envoyé au serveur est inclusif (une tranche vide renvoie zéro ligne).

use std::num::NonZeroU32;

use crate::types::{IdField, ObjectIdRange};

/// Taille de tranche par défaut
pub const DEFAULT_CHUNK_SIZE: u32 = 1000;

/// Version minimale d'ArcGIS Server supportant `outStatistics`
pub const OUT_STATISTICS_MIN_VERSION: f64 = 10.1;

/// Dialecte de la requête de statistiques supporté par le serveur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticsDialect {
    /// `outStatistics` count/min/max (serveurs >= 10.1)
    OutStatistics,
    /// `returnCountOnly=true` (serveurs plus anciens)
    CountOnly,
}

impl StatisticsDialect {
    pub fn for_version(current_version: f64) -> Self {
        if current_version >= OUT_STATISTICS_MIN_VERSION {
            Self::OutStatistics
        } else {
            Self::CountOnly
        }
    }
}

/// Bornes des identifiants présents côté source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdBounds {
    pub min: i64,
    pub max: i64,
    pub count: Option<i64>,
    /// Nom du champ identifiant annoncé par la réponse, si présent
    pub id_field: Option<IdField>,
}

impl IdBounds {
    pub fn new(min: i64, max: i64) -> Self {
        Self {
            min,
            max,
            count: None,
            id_field: None,
        }
    }

    /// Approximation des serveurs anciens: les identifiants sont supposés
    /// aller de 0 à `count`
    pub fn from_count(count: i64) -> Self {
        Self {
            min: 0,
            max: count,
            count: Some(count),
            id_field: None,
        }
    }

    /// Couche sans aucun enregistrement
    pub fn empty() -> Self {
        Self {
            min: 0,
            max: -1,
            count: Some(0),
            id_field: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

/// Planificateur de tranches
#[derive(Debug, Clone, Copy)]
pub struct RangePlanner {
    chunk_size: NonZeroU32,
}

impl Default for RangePlanner {
    fn default() -> Self {
        Self {
            chunk_size: NonZeroU32::new(DEFAULT_CHUNK_SIZE).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl RangePlanner {
    pub fn new(chunk_size: NonZeroU32) -> Self {
        Self { chunk_size }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size.get()
    }

    /// Planifie les tranches couvrant `bounds`
    pub fn plan(&self, bounds: &IdBounds) -> ChunkPlan {
        ChunkPlan {
            next: Some(bounds.min),
            max: bounds.max,
            step: i64::from(self.chunk_size.get()),
        }
    }
}

/// Suite ordonnée des tranches à importer
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    next: Option<i64>,
    max: i64,
    step: i64,
}

impl Iterator for ChunkPlan {
    type Item = ObjectIdRange;

    fn next(&mut self) -> Option<Self::Item> {
        let low = self.next.filter(|low| *low <= self.max)?;
        let high = low.saturating_add(self.step - 1);
        self.next = high.checked_add(1);
        Some(ObjectIdRange::new(low, high))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next {
            Some(low) if low <= self.max => {
                let span = (self.max as i128) - (low as i128);
                let n = span / (self.step as i128) + 1;
                usize::try_from(n).unwrap_or(usize::MAX)
            }
            _ => 0,
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}

#[cfg(test)]
mod tests {
    use super::*;

    fn planner(size: u32) -> RangePlanner {
        RangePlanner::new(NonZeroU32::new(size).unwrap())
    }

    #[test]
    fn test_plan_spans_past_max() {
        let ranges: Vec<_> = planner(1000).plan(&IdBounds::new(0, 2500)).collect();
        assert_eq!(
            ranges,
            vec![
                ObjectIdRange::new(0, 999),
                ObjectIdRange::new(1000, 1999),
                ObjectIdRange::new(2000, 2999),
            ]
        );
    }

    #[test]
    fn test_plan_is_contiguous_and_covers_bounds() {
        let bounds = IdBounds::new(17, 12_345);
        let ranges: Vec<_> = planner(250).plan(&bounds).collect();

        assert_eq!(ranges.first().unwrap().low, 17);
        assert!(ranges.last().unwrap().high >= 12_345);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].high + 1, pair[1].low);
        }
        for r in &ranges {
            assert_eq!(r.high - r.low + 1, 250);
        }
    }

    #[test]
    fn test_plan_exact_multiple() {
        let ranges: Vec<_> = planner(1000).plan(&IdBounds::new(1, 2000)).collect();
        assert_eq!(
            ranges,
            vec![ObjectIdRange::new(1, 1000), ObjectIdRange::new(1001, 2000)]
        );
    }

    #[test]
    fn test_plan_single_id() {
        let ranges: Vec<_> = planner(1000).plan(&IdBounds::new(5, 5)).collect();
        assert_eq!(ranges, vec![ObjectIdRange::new(5, 1004)]);
    }

    #[test]
    fn test_plan_empty_bounds() {
        assert_eq!(planner(1000).plan(&IdBounds::empty()).count(), 0);
        assert_eq!(planner(10).plan(&IdBounds::new(10, 3)).count(), 0);
    }

    #[test]
    fn test_plan_legacy_count() {
        let ranges: Vec<_> = planner(1000).plan(&IdBounds::from_count(2500)).collect();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0], ObjectIdRange::new(0, 999));
    }

    #[test]
    fn test_plan_len_matches_count() {
        let plan = planner(300).plan(&IdBounds::new(0, 1000));
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.count(), 4);
    }

    #[test]
    fn test_plan_near_i64_max_terminates() {
        let ranges: Vec<_> = planner(10).plan(&IdBounds::new(i64::MAX - 5, i64::MAX)).collect();
        assert_eq!(ranges, vec![ObjectIdRange::new(i64::MAX - 5, i64::MAX)]);
    }

    #[test]
    fn test_dialect_for_version() {
        assert_eq!(StatisticsDialect::for_version(10.1), StatisticsDialect::OutStatistics);
        assert_eq!(StatisticsDialect::for_version(11.3), StatisticsDialect::OutStatistics);
        assert_eq!(StatisticsDialect::for_version(10.05), StatisticsDialect::CountOnly);
    }
}
