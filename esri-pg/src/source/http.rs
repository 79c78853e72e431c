//! Source HTTP: requêtes vers un point d'accès `.../MapServer/<n>/query`

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use esrijson::response::{out_statistics, query_response_from_value};
use esrijson::{
    parse_layer_info, parse_server_info, parse_statistics, IdBounds, IdField, LayerInfo,
    ObjectIdRange, QueryResponse, ServerInfo, StatisticsDialect,
};

use super::FeatureSource;
use crate::config::{ImportConfig, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use crate::error::ImportError;

/// Racine des services quand elle n'apparaît pas dans l'URL
pub const DEFAULT_SERVICES_ROOT: &str = "arcgis";

const QUERY_SUFFIX: &str = "/query";

fn services_root_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^/([\w/]*)/rest/services").expect("static services root regex")
    })
}

/// Paramètres du client HTTP
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub timeout: Duration,
    pub user_agent: String,
    /// Projection demandée pour les géométries (`outSR`)
    pub out_sr: Option<i32>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            out_sr: None,
        }
    }
}

impl From<&ImportConfig> for HttpOptions {
    fn from(config: &ImportConfig) -> Self {
        Self {
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            out_sr: config.out_sr,
        }
    }
}

/// Client d'un point d'accès `query` ArcGIS Server
#[derive(Debug, Clone)]
pub struct HttpFeatureSource {
    client: Client,
    endpoint: Url,
    endpoint_str: String,
    out_sr: Option<i32>,
}

impl HttpFeatureSource {
    pub fn new(endpoint: &str, options: HttpOptions) -> Result<Self, ImportError> {
        let mut url = Url::parse(endpoint)
            .map_err(|e| ImportError::Config(format!("Invalid endpoint URL {}: {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ImportError::Config(format!(
                "Unsupported endpoint scheme: {}",
                url.scheme()
            )));
        }
        // Les paramètres sont reconstruits à chaque requête
        url.set_query(None);
        url.set_fragment(None);

        let client = Client::builder()
            .user_agent(&options.user_agent)
            .connect_timeout(options.timeout)
            .timeout(options.timeout)
            .build()
            .map_err(|e| ImportError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint_str: url.to_string(),
            endpoint: url,
            out_sr: options.out_sr,
        })
    }

    /// `/<racine>/rest/services?f=pjson` sur le même hôte
    pub fn server_info_url(&self) -> Url {
        let root = services_root_regex()
            .captures(self.endpoint.path())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|root| !root.is_empty())
            .unwrap_or(DEFAULT_SERVICES_ROOT);

        let mut url = self.endpoint.clone();
        url.set_path(&format!("/{}/rest/services", root));
        url.query_pairs_mut().append_pair("f", "pjson");
        url
    }

    /// Description de la couche: l'URL du point d'accès sans `/query`
    pub fn layer_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        let path = url.path().trim_end_matches('/');
        let split = path.len().checked_sub(QUERY_SUFFIX.len());
        let layer_path = match split.and_then(|i| path.get(i..).map(|suffix| (i, suffix))) {
            Some((i, suffix)) if suffix.eq_ignore_ascii_case(QUERY_SUFFIX) => path[..i].to_string(),
            _ => path.to_string(),
        };
        url.set_path(&layer_path);
        url.query_pairs_mut().append_pair("f", "pjson");
        url
    }

    pub fn statistics_url(&self, id_field: &IdField, dialect: StatisticsDialect) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut q = url.query_pairs_mut();
            match dialect {
                StatisticsDialect::OutStatistics => {
                    q.append_pair("where", "1=1")
                        .append_pair("returnGeometry", "false")
                        .append_pair("outStatistics", &out_statistics(id_field));
                }
                StatisticsDialect::CountOnly => {
                    q.append_pair("where", &format!("{} > -1", id_field))
                        .append_pair("returnCountOnly", "true")
                        .append_pair("returnGeometry", "false");
                }
            }
            q.append_pair("f", "pjson");
        }
        url
    }

    pub fn chunk_url(&self, id_field: &IdField, range: ObjectIdRange) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair(
                "where",
                &format!(
                    "{id} >= {} AND {id} <= {}",
                    range.low,
                    range.high,
                    id = id_field
                ),
            )
            .append_pair("outFields", "*")
            .append_pair("returnGeometry", "true");
            if let Some(out_sr) = self.out_sr {
                q.append_pair("outSR", &out_sr.to_string());
            }
            q.append_pair("f", "pjson");
        }
        url
    }

    async fn get_text(&self, url: &Url) -> Result<String, ImportError> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ImportError::source_query(url.as_str(), e))?
            .error_for_status()
            .map_err(|e| ImportError::source_query(url.as_str(), e))?;

        response
            .text()
            .await
            .map_err(|e| ImportError::source_query(url.as_str(), e))
    }
}

#[async_trait]
impl FeatureSource for HttpFeatureSource {
    fn endpoint(&self) -> &str {
        &self.endpoint_str
    }

    async fn server_info(&self) -> Result<ServerInfo, ImportError> {
        let url = self.server_info_url();
        let body = self.get_text(&url).await?;
        parse_server_info(&body).map_err(|e| ImportError::source_query(url.as_str(), e))
    }

    async fn layer_info(&self) -> Result<LayerInfo, ImportError> {
        let url = self.layer_url();
        let body = self.get_text(&url).await?;
        parse_layer_info(&body).map_err(|e| ImportError::source_query(url.as_str(), e))
    }

    async fn statistics(
        &self,
        id_field: &IdField,
        dialect: StatisticsDialect,
    ) -> Result<IdBounds, ImportError> {
        let url = self.statistics_url(id_field, dialect);
        let body = self.get_text(&url).await?;
        parse_statistics(&body, dialect).map_err(|e| ImportError::source_query(url.as_str(), e))
    }

    async fn fetch_chunk(
        &self,
        id_field: &IdField,
        range: ObjectIdRange,
    ) -> Result<QueryResponse, ImportError> {
        let url = self.chunk_url(id_field, range);
        let body = self.get_text(&url).await?;

        let doc: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ImportError::source_query(url.as_str(), e))?;
        let response = query_response_from_value(doc)
            .map_err(|e| ImportError::source_query(url.as_str(), e))?;

        if response.exceeded_transfer_limit {
            warn!(
                chunk = %range,
                features = response.features.len(),
                "Server truncated the chunk (exceededTransferLimit), lower the chunk size"
            );
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(endpoint: &str) -> HttpFeatureSource {
        HttpFeatureSource::new(endpoint, HttpOptions::default()).unwrap()
    }

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[test]
    fn test_server_info_url_default_root() {
        let s = source("http://example.com:6080/arcgis/rest/services/Base/MapServer/0/query");
        assert_eq!(
            s.server_info_url().as_str(),
            "http://example.com:6080/arcgis/rest/services?f=pjson"
        );
    }

    #[test]
    fn test_server_info_url_custom_root() {
        let s = source("https://gis.example.org/server/gis/rest/services/Parcels/FeatureServer/2/query");
        assert_eq!(
            s.server_info_url().as_str(),
            "https://gis.example.org/server/gis/rest/services?f=pjson"
        );

        // Pas de racine détectable
        let s = source("http://example.com/rest/services/Base/MapServer/0/query");
        assert_eq!(
            s.server_info_url().path(),
            "/arcgis/rest/services"
        );
    }

    #[test]
    fn test_layer_url_strips_query() {
        let s = source("http://example.com/arcgis/rest/services/Base/MapServer/0/query?where=1%3D1");
        assert_eq!(
            s.layer_url().as_str(),
            "http://example.com/arcgis/rest/services/Base/MapServer/0?f=pjson"
        );
        assert!(!s.endpoint().contains("where"));
    }

    #[test]
    fn test_chunk_url() {
        let s = HttpFeatureSource::new(
            "http://example.com/arcgis/rest/services/Base/MapServer/0/query",
            HttpOptions {
                out_sr: Some(4326),
                ..Default::default()
            },
        )
        .unwrap();

        let url = s.chunk_url(&IdField::new("FID"), ObjectIdRange::new(1000, 1999));
        assert_eq!(
            query_value(&url, "where").as_deref(),
            Some("FID >= 1000 AND FID <= 1999")
        );
        assert_eq!(query_value(&url, "outFields").as_deref(), Some("*"));
        assert_eq!(query_value(&url, "returnGeometry").as_deref(), Some("true"));
        assert_eq!(query_value(&url, "outSR").as_deref(), Some("4326"));
        assert_eq!(query_value(&url, "f").as_deref(), Some("pjson"));
    }

    #[test]
    fn test_statistics_urls() {
        let s = source("http://example.com/arcgis/rest/services/Base/MapServer/0/query");
        let id = IdField::default();

        let modern = s.statistics_url(&id, StatisticsDialect::OutStatistics);
        let stats = query_value(&modern, "outStatistics").unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&stats).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 3);
        assert_eq!(parsed[1]["outStatisticFieldName"], "oidmin");
        assert_eq!(query_value(&modern, "returnGeometry").as_deref(), Some("false"));

        let legacy = s.statistics_url(&id, StatisticsDialect::CountOnly);
        assert_eq!(query_value(&legacy, "where").as_deref(), Some("objectid > -1"));
        assert_eq!(query_value(&legacy, "returnCountOnly").as_deref(), Some("true"));
        assert_eq!(query_value(&legacy, "outStatistics"), None);
    }

    #[test]
    fn test_rejects_invalid_endpoint() {
        assert!(matches!(
            HttpFeatureSource::new("not a url", HttpOptions::default()),
            Err(ImportError::Config(_))
        ));
        assert!(matches!(
            HttpFeatureSource::new("ftp://example.com/query", HttpOptions::default()),
            Err(ImportError::Config(_))
        ));
    }
}
