//! Reprise d'un import interrompu ou relancé
//!
//! L'état de la table cible est lu une fois au démarrage. Une tranche est
//! ignorée si l'identifiant maximal déjà importé la couvre, ou si au moins une
//! ligne de la table tombe dans son intervalle. Cette seconde vérification est
//! grossière: une tranche partiellement importée est considérée comme faite.

use crate::types::ObjectIdRange;

/// État de la table cible au démarrage de l'import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportState {
    pub table_exists: bool,
    /// Absent si la table n'existe pas ou est vide
    pub max_ingested_id: Option<i64>,
}

/// Raison pour laquelle une tranche est ignorée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `max(id) >= high`
    Covered,
    /// Au moins une ligne existe dans `[low, high]`
    Populated,
}

/// Décision pour une tranche
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Skip(SkipReason),
    /// Interroger la table cible sur la présence de lignes dans la tranche
    Probe,
    Process,
}

/// Filtre les tranches déjà importées et décide de la création de table
#[derive(Debug, Clone)]
pub struct ResumeController {
    state: ImportState,
    table_created: bool,
}

impl ResumeController {
    pub fn new(state: ImportState) -> Self {
        Self {
            state,
            table_created: false,
        }
    }

    /// Première décision, sans accès à la base
    pub fn check(&self, range: ObjectIdRange) -> ResumeDecision {
        if !self.state.table_exists {
            return ResumeDecision::Process;
        }
        match self.state.max_ingested_id {
            Some(max) if max >= range.high => ResumeDecision::Skip(SkipReason::Covered),
            _ => ResumeDecision::Probe,
        }
    }

    /// Décision finale après la sonde « tranche déjà peuplée »
    pub fn after_probe(&self, populated: bool) -> ResumeDecision {
        if populated {
            ResumeDecision::Skip(SkipReason::Populated)
        } else {
            ResumeDecision::Process
        }
    }

    /// La table doit-elle être créée avant d'écrire la prochaine tranche ?
    pub fn needs_table_creation(&self) -> bool {
        !self.state.table_exists && !self.table_created
    }

    /// À appeler une fois la première tranche (et donc la table) validée
    pub fn mark_table_created(&mut self) {
        self.table_created = true;
    }
}
