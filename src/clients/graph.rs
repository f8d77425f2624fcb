//! Lead-data fetcher backed by the Graph API.

use async_trait::async_trait;
use reqwest::Url;
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::LeadFetcher;
use crate::config::GraphConfig;
use crate::error::{Error, Result};
use crate::model::LeadData;

/// External ids with this prefix get synthetic data and never hit the network.
pub const TEST_LEAD_PREFIX: &str = "TEST_LEAD_";

const NAME_FIELDS: &[&str] = &["full_name", "full name", "name"];
const PHONE_FIELDS: &[&str] = &["número_de_teléfono", "phone_number", "phone", "telefono", "tel"];
const CITY_FIELDS: &[&str] = &["city", "ciudad", "localidad"];
const PRODUCT_FIELDS: &[&str] = &["product", "producto", "servicio"];

#[derive(Debug, Deserialize)]
struct LeadResponse {
    #[serde(default)]
    field_data: Vec<FieldData>,
}

#[derive(Debug, Deserialize)]
struct FieldData {
    name: String,
    #[serde(default)]
    values: Vec<String>,
}

pub struct GraphLeadFetcher {
    http: reqwest::Client,
    config: GraphConfig,
}

impl GraphLeadFetcher {
    pub fn new(http: reqwest::Client, config: GraphConfig) -> Self {
        if config.access_token.is_none() {
            warn!("GRAPH_ACCESS_TOKEN not set, only test leads can be fetched");
        }
        Self { http, config }
    }

    fn lead_url(&self, external_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| Error::Config(format!("invalid Graph base url: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config("Graph base url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(&self.config.api_version)
            .push(external_id);
        Ok(url)
    }
}

#[async_trait]
impl LeadFetcher for GraphLeadFetcher {
    async fn fetch(&self, external_id: &str) -> Result<LeadData> {
        if external_id.starts_with(TEST_LEAD_PREFIX) {
            info!(external_id, "test lead, using synthetic contact data");
            return Ok(synthetic_lead());
        }

        let Some(token) = &self.config.access_token else {
            return Err(Error::NotConfigured("Graph API"));
        };

        let response = self
            .http
            .get(self.lead_url(external_id)?)
            .query(&[("access_token", token.expose_secret())])
            .send()
            .await
            .map_err(|e| Error::Fetch(format!("request for {external_id} failed: {e}")))?;

        let status = response.status();
        debug!(external_id, %status, "graph response received");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Fetch(format!("Graph API returned {status}: {body}")));
        }

        let lead: LeadResponse = response
            .json()
            .await
            .map_err(|e| Error::Fetch(format!("malformed lead {external_id}: {e}")))?;

        Ok(extract_lead_data(&lead.field_data))
    }
}

fn synthetic_lead() -> LeadData {
    LeadData {
        name: "Juan Pérez (TEST)".to_string(),
        phone: "5512345678".to_string(),
        city: "Irapuato".to_string(),
        product: "Membrana Tensilada".to_string(),
    }
}

fn extract_lead_data(fields: &[FieldData]) -> LeadData {
    LeadData {
        name: first_value(fields, NAME_FIELDS).unwrap_or_else(|| "No name".to_string()),
        phone: first_value(fields, PHONE_FIELDS).unwrap_or_default(),
        city: first_value(fields, CITY_FIELDS).unwrap_or_else(|| "Not specified".to_string()),
        product: first_value(fields, PRODUCT_FIELDS)
            .unwrap_or_else(|| "General inquiry".to_string()),
    }
}

/// Value of the first field matching a candidate, candidates tried in order.
///
/// A field matches a candidate when its name equals it or contains it. Empty
/// values count as missing.
fn first_value(fields: &[FieldData], candidates: &[&str]) -> Option<String> {
    candidates.iter().find_map(|candidate| {
        fields
            .iter()
            .find(|f| f.name == *candidate || f.name.contains(candidate))
            .and_then(|f| f.values.first())
            .filter(|v| !v.trim().is_empty())
            .cloned()
    })
}
