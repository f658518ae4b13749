use super::{
    select_zone,
    NewRRSet,
    RRSet,
    RRSetRepository,
    RRSetRepositoryFactory,
    RecordType,
    RepositoryConfig,
    RepositoryError,
    Zone,
    ZoneRepository,
    ZoneRepositoryFactory,
};
use async_stream::try_stream;
use async_trait::async_trait;
use chrono::prelude::*;
use futures::{
    Stream,
    TryStreamExt as _,
};
use reqwest::{
    Method,
    Response,
};
use serde::{
    de::DeserializeOwned,
    Deserialize,
    Serialize,
};
use std::time::Duration;

const ZONE_PAGE_SIZE: usize = 100;

/// RRSet states after which the record set is gone or about to be.
const DELETED_STATES: &[&str] = &["DELETING", "DELETE_SUCCEEDED"];

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-
// zones

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZonesResponse {
    zones: Vec<ZoneInfo>,
    #[serde(default)]
    total_pages: Option<usize>,
}

/// A STACKIT DNS zone.
///
/// See https://docs.api.stackit.cloud/documentation/dns/version/v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneInfo {
    pub id: String,
    pub name: String,
    pub dns_name: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub creation_finished: Option<DateTime<Utc>>,
}

impl From<ZoneInfo> for Zone {
    fn from(info: ZoneInfo) -> Self {
        Zone {
            id: info.id,
            dns_name: info.dns_name,
        }
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-
// rrsets

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RRSetsResponse {
    rr_sets: Vec<RRSetInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RRSetInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub ttl: i64,
    #[serde(default)]
    pub records: Vec<RecordInfo>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInfo {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
}

/// Request payload for creating a record set.
#[derive(Debug, Serialize, Deserialize)]
struct RRSetCreation {
    name: String,
    #[serde(rename = "type")]
    record_type: RecordType,
    ttl: i64,
    records: Vec<RecordContent>,
}

/// Request payload for patching a record set.
#[derive(Debug, Serialize, Deserialize)]
struct RRSetModification {
    ttl: i64,
    records: Vec<RecordContent>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordContent {
    content: String,
}

fn record_contents(records: Vec<String>) -> Vec<RecordContent> {
    records.into_iter().map(|content| RecordContent { content }).collect()
}

fn same_name(a: &str, b: &str) -> bool {
    a.trim_end_matches('.').eq_ignore_ascii_case(b.trim_end_matches('.'))
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Thin client for the project scoped part of the STACKIT DNS API.
#[derive(Clone, Debug)]
pub struct StackitApi {
    client: reqwest::Client,
    config: RepositoryConfig,
}

impl StackitApi {
    pub fn new(client: reqwest::Client, config: RepositoryConfig) -> Self {
        Self { client, config }
    }

    fn project_url(&self, path: &str) -> String {
        format!(
            "{}/v1/projects/{}{path}",
            self.config.api_base_path, self.config.project_id
        )
    }

    fn rrsets_url(&self, zone_id: &str) -> String {
        self.project_url(&format!("/zones/{zone_id}/rrsets"))
    }

    /// All active zones of the project, fetched page by page.
    pub fn zones(&self) -> impl Stream<Item = Result<ZoneInfo, RepositoryError>> + Send + '_ {
        try_stream! {
            let url = self.project_url("/zones");
            let mut page = 1;
            loop {
                let query = [
                    ("active[eq]", "true".to_string()),
                    ("page", page.to_string()),
                    ("pageSize", ZONE_PAGE_SIZE.to_string()),
                ];
                let response: ZonesResponse = self.request_json(Method::GET, &url, &query).await?;
                let count = response.zones.len();
                for zone in response.zones {
                    yield zone;
                }
                if count == 0 || page >= response.total_pages.unwrap_or(1) {
                    break;
                }
                page += 1;
            }
        }
    }

    pub async fn list_zones(&self) -> Result<Vec<ZoneInfo>, RepositoryError> {
        self.zones().try_collect().await
    }

    pub async fn list_rrsets(
        &self,
        zone_id: &str,
        name: &str,
        record_type: RecordType,
    ) -> Result<Vec<RRSetInfo>, RepositoryError> {
        let query = [
            ("name[eq]", name.to_string()),
            ("type[eq]", record_type.to_string()),
        ];
        let response: RRSetsResponse = self
            .request_json(Method::GET, &self.rrsets_url(zone_id), &query)
            .await?;
        Ok(response.rr_sets)
    }

    pub async fn create_rrset(&self, zone_id: &str, rrset: NewRRSet) -> Result<(), RepositoryError> {
        info!(%zone_id, name = %rrset.name, r#type = %rrset.record_type, "creating rrset");
        let body = RRSetCreation {
            name: rrset.name,
            record_type: rrset.record_type,
            ttl: rrset.ttl,
            records: record_contents(rrset.records),
        };
        self.send(self.client.post(self.rrsets_url(zone_id)).json(&body)).await?;
        Ok(())
    }

    pub async fn update_rrset(&self, zone_id: &str, rrset: RRSet) -> Result<(), RepositoryError> {
        info!(%zone_id, id = %rrset.id, name = %rrset.name, records = rrset.records.len(), "updating rrset");
        let url = format!("{}/{}", self.rrsets_url(zone_id), rrset.id);
        let body = RRSetModification {
            ttl: rrset.ttl,
            records: record_contents(rrset.records),
        };
        self.send(self.client.patch(url).json(&body)).await?;
        Ok(())
    }

    pub async fn delete_rrset(&self, zone_id: &str, id: &str) -> Result<(), RepositoryError> {
        info!(%zone_id, %id, "deleting rrset");
        let url = format!("{}/{id}", self.rrsets_url(zone_id));
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn request_json<R>(&self, method: Method, url: &str, query: &[(&str, String)]) -> Result<R, RepositoryError>
    where
        R: DeserializeOwned,
    {
        let res = self.send(self.client.request(method, url).query(query)).await?;
        Ok(res.json().await?)
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<Response, RepositoryError> {
        let res = req
            .bearer_auth(&self.config.auth_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), %body, "stackit api error");
            return Err(RepositoryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(res)
    }
}

pub struct StackitZoneRepository {
    api: StackitApi,
}

#[async_trait]
impl ZoneRepository for StackitZoneRepository {
    async fn fetch_zone(&self, domain: &str) -> Result<Zone, RepositoryError> {
        let zones = self.api.list_zones().await?;
        debug!(%domain, count = zones.len(), "selecting zone");
        select_zone(zones.into_iter().map(Zone::from), domain).ok_or_else(|| RepositoryError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }
}

pub struct StackitRRSetRepository {
    api: StackitApi,
    zone: Zone,
}

#[async_trait]
impl RRSetRepository for StackitRRSetRepository {
    async fn fetch_rrset_for_zone(&self, name: &str, record_type: RecordType) -> Result<RRSet, RepositoryError> {
        let rrsets = self.api.list_rrsets(&self.zone.id, name, record_type).await?;

        let rrset = rrsets
            .into_iter()
            .filter(|rrset| same_name(&rrset.name, name) && rrset.record_type == record_type.as_str())
            .find(|rrset| !rrset.state.as_deref().is_some_and(|state| DELETED_STATES.contains(&state)));

        let Some(rrset) = rrset else {
            return Err(RepositoryError::RRSetNotFound { name: name.to_string() });
        };

        Ok(RRSet {
            id: rrset.id,
            name: rrset.name,
            record_type,
            ttl: rrset.ttl,
            records: rrset.records.into_iter().map(|record| record.content).collect(),
        })
    }

    async fn create_rrset(&self, rrset: NewRRSet) -> Result<(), RepositoryError> {
        self.api.create_rrset(&self.zone.id, rrset).await
    }

    async fn update_rrset(&self, rrset: RRSet) -> Result<(), RepositoryError> {
        self.api.update_rrset(&self.zone.id, rrset).await
    }

    async fn delete_rrset(&self, id: &str) -> Result<(), RepositoryError> {
        self.api.delete_rrset(&self.zone.id, id).await
    }
}

/// Builds STACKIT backed repositories sharing one HTTP connection pool.
#[derive(Clone, Debug, Default)]
pub struct StackitRepositoryFactory {
    client: reqwest::Client,
}

impl StackitRepositoryFactory {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// A factory whose requests give up after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(client))
    }

    pub fn api(&self, config: &RepositoryConfig) -> StackitApi {
        StackitApi::new(self.client.clone(), config.clone())
    }
}

impl ZoneRepositoryFactory for StackitRepositoryFactory {
    fn new_zone_repository(&self, config: &RepositoryConfig) -> Box<dyn ZoneRepository> {
        Box::new(StackitZoneRepository { api: self.api(config) })
    }
}

impl RRSetRepositoryFactory for StackitRepositoryFactory {
    fn new_rrset_repository(&self, config: &RepositoryConfig, zone: &Zone) -> Box<dyn RRSetRepository> {
        Box::new(StackitRRSetRepository {
            api: self.api(config),
            zone: zone.clone(),
        })
    }
}
