//! Test doubles for the resolver's collaborators.
//!
//! Every double counts its calls so tests can assert which stages ran. The DNS double keeps
//! record sets in memory, so sequences of present / clean-up calls see each other's writes.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use stackit_dns01_solver::{
    config::{
        ConfigError,
        ConfigProvider,
        JsonConfigProvider,
        StackitConfig,
    },
    repository::{
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
    },
    secrets::{
        SecretError,
        SecretFetcher,
    },
    ChallengeRequest,
    Resolver,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
        Mutex,
    },
};

pub const TOKEN: &str = "test-token";
pub const PROJECT_ID: &str = "test";

pub fn challenge_request(dns_name: &str, key: &str) -> ChallengeRequest {
    ChallengeRequest {
        uid: "uid".to_string(),
        type_: "dns-01".to_string(),
        dns_name: dns_name.to_string(),
        key: key.to_string(),
        resource_namespace: "default".to_string(),
        config: Some(serde_json::json!({ "projectId": PROJECT_ID })),
        ..Default::default()
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Decodes like [`JsonConfigProvider`] unless told to fail.
#[derive(Default)]
pub struct RecordingConfigProvider {
    fail: bool,
    calls: AtomicUsize,
}

impl RecordingConfigProvider {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConfigProvider for RecordingConfigProvider {
    fn load_config(&self, raw: Option<&Value>) -> Result<StackitConfig, ConfigError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ConfigError::Invalid {
                field: "projectId",
                reason: "error decoding solver config".to_string(),
            });
        }
        JsonConfigProvider.load_config(raw)
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

/// Hands out a fixed token, or fails as if the key was missing from the secret.
pub struct RecordingSecretFetcher {
    token: Option<String>,
    requests: Mutex<Vec<(String, String, String)>>,
}

impl RecordingSecretFetcher {
    pub fn returning(token: &str) -> Self {
        Self {
            token: Some(token.to_string()),
            requests: Default::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            token: None,
            requests: Default::default(),
        }
    }

    /// `(namespace, secret name, key)` of every lookup.
    pub fn requests(&self) -> Vec<(String, String, String)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl SecretFetcher for RecordingSecretFetcher {
    async fn string_from_secret(&self, namespace: &str, secret_name: &str, key: &str) -> Result<String, SecretError> {
        self.requests
            .lock()
            .unwrap()
            .push((namespace.to_string(), secret_name.to_string(), key.to_string()));

        self.token.clone().ok_or_else(|| SecretError::MissingKey {
            namespace: namespace.to_string(),
            name: secret_name.to_string(),
            key: key.to_string(),
        })
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

#[derive(Default)]
struct DnsState {
    zones: Vec<Zone>,
    rrsets: Mutex<HashMap<(String, String), RRSet>>,
    next_id: AtomicUsize,

    zone_error: Mutex<Option<String>>,
    fetch_error: Mutex<Option<String>>,
    write_error: Mutex<Option<String>>,
    delete_status: Mutex<Option<u16>>,

    repository_configs: Mutex<Vec<RepositoryConfig>>,
    zone_repositories: AtomicUsize,
    rrset_repositories: AtomicUsize,
    fetches: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

fn api_error(message: &str) -> RepositoryError {
    RepositoryError::Api {
        status: 500,
        body: message.to_string(),
    }
}

/// In-memory DNS provider serving as both repository factories.
#[derive(Clone, Default)]
pub struct InMemoryDns {
    state: Arc<DnsState>,
}

impl InMemoryDns {
    pub fn with_zones(dns_names: &[&str]) -> Self {
        let zones = dns_names
            .iter()
            .enumerate()
            .map(|(i, dns_name)| Zone {
                id: format!("zone-{i}"),
                dns_name: dns_name.to_string(),
            })
            .collect();
        Self {
            state: Arc::new(DnsState {
                zones,
                ..Default::default()
            }),
        }
    }

    pub fn fail_zone_lookup(&self, message: &str) {
        *self.state.zone_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_rrset_fetch(&self, message: &str) {
        *self.state.fetch_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn fail_rrset_writes(&self, message: &str) {
        *self.state.write_error.lock().unwrap() = Some(message.to_string());
    }

    /// Makes deletes answer with an API error of the given status, e.g. 404 for a record set
    /// somebody else removed in the meantime.
    pub fn fail_rrset_deletes_with(&self, status: u16) {
        *self.state.delete_status.lock().unwrap() = Some(status);
    }

    /// Seeds a record set into the zone owning `name`.
    pub fn insert_rrset(&self, name: &str, records: &[&str]) -> RRSet {
        let zone = select_zone(self.state.zones.clone(), name).expect("zone for rrset");
        let rrset = RRSet {
            id: self.next_id(),
            name: name.to_string(),
            record_type: RecordType::TXT,
            ttl: 300,
            records: records.iter().map(|it| it.to_string()).collect(),
        };
        self.state
            .rrsets
            .lock()
            .unwrap()
            .insert((zone.id, name.to_string()), rrset.clone());
        rrset
    }

    pub fn rrset(&self, name: &str) -> Option<RRSet> {
        self.state
            .rrsets
            .lock()
            .unwrap()
            .iter()
            .find(|((_, rrset_name), _)| rrset_name == name)
            .map(|(_, rrset)| rrset.clone())
    }

    pub fn repository_configs(&self) -> Vec<RepositoryConfig> {
        self.state.repository_configs.lock().unwrap().clone()
    }

    pub fn zone_repositories(&self) -> usize {
        self.state.zone_repositories.load(Ordering::SeqCst)
    }

    pub fn rrset_repositories(&self) -> usize {
        self.state.rrset_repositories.load(Ordering::SeqCst)
    }

    pub fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.state.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.state.updates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.state.deletes.load(Ordering::SeqCst)
    }

    fn next_id(&self) -> String {
        format!("rrset-{}", self.state.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl ZoneRepositoryFactory for InMemoryDns {
    fn new_zone_repository(&self, config: &RepositoryConfig) -> Box<dyn ZoneRepository> {
        self.state.zone_repositories.fetch_add(1, Ordering::SeqCst);
        self.state.repository_configs.lock().unwrap().push(config.clone());
        Box::new(InMemoryZoneRepository { dns: self.clone() })
    }
}

impl RRSetRepositoryFactory for InMemoryDns {
    fn new_rrset_repository(&self, _config: &RepositoryConfig, zone: &Zone) -> Box<dyn RRSetRepository> {
        self.state.rrset_repositories.fetch_add(1, Ordering::SeqCst);
        Box::new(InMemoryRRSetRepository {
            dns: self.clone(),
            zone: zone.clone(),
        })
    }
}

struct InMemoryZoneRepository {
    dns: InMemoryDns,
}

#[async_trait]
impl ZoneRepository for InMemoryZoneRepository {
    async fn fetch_zone(&self, domain: &str) -> Result<Zone, RepositoryError> {
        if let Some(message) = self.dns.state.zone_error.lock().unwrap().as_deref() {
            return Err(api_error(message));
        }
        select_zone(self.dns.state.zones.clone(), domain).ok_or_else(|| RepositoryError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }
}

struct InMemoryRRSetRepository {
    dns: InMemoryDns,
    zone: Zone,
}

impl InMemoryRRSetRepository {
    fn check_write(&self) -> Result<(), RepositoryError> {
        match self.dns.state.write_error.lock().unwrap().as_deref() {
            Some(message) => Err(api_error(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RRSetRepository for InMemoryRRSetRepository {
    async fn fetch_rrset_for_zone(&self, name: &str, _record_type: RecordType) -> Result<RRSet, RepositoryError> {
        self.dns.state.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.dns.state.fetch_error.lock().unwrap().as_deref() {
            return Err(api_error(message));
        }
        self.dns
            .state
            .rrsets
            .lock()
            .unwrap()
            .get(&(self.zone.id.clone(), name.to_string()))
            .cloned()
            .ok_or_else(|| RepositoryError::RRSetNotFound { name: name.to_string() })
    }

    async fn create_rrset(&self, rrset: NewRRSet) -> Result<(), RepositoryError> {
        self.dns.state.creates.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        let rrset = RRSet {
            id: self.dns.next_id(),
            name: rrset.name,
            record_type: rrset.record_type,
            ttl: rrset.ttl,
            records: rrset.records,
        };
        self.dns
            .state
            .rrsets
            .lock()
            .unwrap()
            .insert((self.zone.id.clone(), rrset.name.clone()), rrset);
        Ok(())
    }

    async fn update_rrset(&self, rrset: RRSet) -> Result<(), RepositoryError> {
        self.dns.state.updates.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        self.dns
            .state
            .rrsets
            .lock()
            .unwrap()
            .insert((self.zone.id.clone(), rrset.name.clone()), rrset);
        Ok(())
    }

    async fn delete_rrset(&self, id: &str) -> Result<(), RepositoryError> {
        self.dns.state.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_write()?;
        if let Some(status) = *self.dns.state.delete_status.lock().unwrap() {
            return Err(RepositoryError::Api {
                status,
                body: format!("rrset {id} not deletable"),
            });
        }
        self.dns.state.rrsets.lock().unwrap().retain(|_, rrset| rrset.id != id);
        Ok(())
    }
}

// -=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-=-

pub struct Harness {
    pub resolver: Resolver,
    pub dns: InMemoryDns,
    pub secrets: Arc<RecordingSecretFetcher>,
    pub config: Arc<RecordingConfigProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(
            InMemoryDns::with_zones(&["example.com", "sub.example.com"]),
            RecordingSecretFetcher::returning(TOKEN),
            RecordingConfigProvider::default(),
        )
    }

    pub fn with(dns: InMemoryDns, secrets: RecordingSecretFetcher, config: RecordingConfigProvider) -> Self {
        let secrets = Arc::new(secrets);
        let config = Arc::new(config);
        let resolver = Resolver::new(
            Arc::new(dns.clone()),
            Arc::new(dns.clone()),
            secrets.clone(),
            config.clone(),
        );
        Self {
            resolver,
            dns,
            secrets,
            config,
        }
    }
}
