//! Sources de features (service ArcGIS Server)

pub mod http;

use async_trait::async_trait;

use esrijson::{
    IdBounds, IdField, LayerInfo, ObjectIdRange, QueryResponse, ServerInfo, StatisticsDialect,
};

use crate::error::ImportError;

pub use http::HttpFeatureSource;

/// Accès en lecture à un point d'accès `query`
///
/// Chaque appel correspond à une requête; aucune relance n'est faite ici.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    /// URL du point d'accès, pour les logs et les erreurs
    fn endpoint(&self) -> &str;

    /// Version du serveur (choix du dialecte de statistiques)
    async fn server_info(&self) -> Result<ServerInfo, ImportError>;

    /// Métadonnées de la couche (champ identifiant, `maxRecordCount`)
    async fn layer_info(&self) -> Result<LayerInfo, ImportError>;

    /// Bornes des identifiants côté source
    async fn statistics(
        &self,
        id_field: &IdField,
        dialect: StatisticsDialect,
    ) -> Result<IdBounds, ImportError>;

    /// Features dont l'identifiant tombe dans `range`
    async fn fetch_chunk(
        &self,
        id_field: &IdField,
        range: ObjectIdRange,
    ) -> Result<QueryResponse, ImportError>;
}
