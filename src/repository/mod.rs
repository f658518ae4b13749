//! Provider-side entities and the repository interfaces the resolver talks to.
//!
//! Repositories are bound to one API token (and, for rrsets, one zone) and are cheap to
//! construct; the resolver builds fresh ones for every challenge.

use crate::config::StackitConfig;
use async_trait::async_trait;
use serde::{
    Deserialize,
    Serialize,
};

pub mod stackit;

#[derive(thiserror::Error, Debug)]
pub enum RepositoryError {
    #[error("no zone found for domain {domain}")]
    ZoneNotFound { domain: String },

    #[error("rrset {name} not found")]
    RRSetNotFound { name: String },

    #[error("stackit api error: status={status}, body={body}")]
    Api { status: u16, body: String },

    #[error("stackit api request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl RepositoryError {
    pub fn is_rrset_not_found(&self) -> bool {
        matches!(self, RepositoryError::RRSetNotFound { .. })
    }
}

/// Everything needed to talk to the DNS API on behalf of one project.
#[derive(Clone, PartialEq)]
pub struct RepositoryConfig {
    pub api_base_path: String,
    pub project_id: String,
    pub auth_token: String,
}

impl RepositoryConfig {
    pub fn new(config: &StackitConfig, auth_token: String) -> Self {
        Self {
            api_base_path: config.api_base_path.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            auth_token,
        }
    }
}

impl std::fmt::Debug for RepositoryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryConfig")
            .field("api_base_path", &self.api_base_path)
            .field("project_id", &self.project_id)
            .field("auth_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    /// Zone apex without trailing dot, e.g. `example.com`
    pub dns_name: String,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    #[default]
    TXT,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::TXT => "TXT",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An existing record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RRSet {
    pub id: String,
    pub name: String,
    pub record_type: RecordType,
    pub ttl: i64,
    pub records: Vec<String>,
}

/// A record set to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRRSet {
    pub name: String,
    pub record_type: RecordType,
    pub ttl: i64,
    pub records: Vec<String>,
}

#[async_trait]
pub trait ZoneRepository: Send + Sync {
    /// The zone owning `domain`, i.e. the registered zone with the longest matching suffix.
    async fn fetch_zone(&self, domain: &str) -> Result<Zone, RepositoryError>;
}

#[async_trait]
pub trait RRSetRepository: Send + Sync {
    /// Fails with [`RepositoryError::RRSetNotFound`] if the zone has no such record set.
    async fn fetch_rrset_for_zone(&self, name: &str, record_type: RecordType) -> Result<RRSet, RepositoryError>;

    async fn create_rrset(&self, rrset: NewRRSet) -> Result<(), RepositoryError>;

    /// Replaces records and ttl of the record set identified by `rrset.id`.
    async fn update_rrset(&self, rrset: RRSet) -> Result<(), RepositoryError>;

    async fn delete_rrset(&self, id: &str) -> Result<(), RepositoryError>;
}

pub trait ZoneRepositoryFactory: Send + Sync {
    fn new_zone_repository(&self, config: &RepositoryConfig) -> Box<dyn ZoneRepository>;
}

pub trait RRSetRepositoryFactory: Send + Sync {
    fn new_rrset_repository(&self, config: &RepositoryConfig, zone: &Zone) -> Box<dyn RRSetRepository>;
}

fn normalize_dns_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

fn is_within_zone(domain: &str, zone: &str) -> bool {
    domain == zone
        || domain
            .strip_suffix(zone)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Picks the zone whose apex is the longest suffix of `domain` on a label boundary.
pub fn select_zone(zones: impl IntoIterator<Item = Zone>, domain: &str) -> Option<Zone> {
    let domain = normalize_dns_name(domain);
    zones
        .into_iter()
        .filter(|zone| {
            let apex = normalize_dns_name(&zone.dns_name);
            !apex.is_empty() && is_within_zone(&domain, &apex)
        })
        .max_by_key(|zone| normalize_dns_name(&zone.dns_name).len())
}
