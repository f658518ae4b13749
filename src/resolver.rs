use crate::{
    challenge::ChallengeRequest,
    cluster::ClusterConfig,
    config::{
        ConfigProvider,
        JsonConfigProvider,
        StackitConfig,
    },
    error::{
        Error,
        WriteAction,
    },
    repository::{
        stackit::StackitRepositoryFactory,
        NewRRSet,
        RRSetRepository,
        RRSetRepositoryFactory,
        RecordType,
        RepositoryConfig,
        RepositoryError,
        Zone,
        ZoneRepositoryFactory,
    },
    secrets::{
        KubeSecretFetcher,
        SecretFetcher,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// Name the host routes challenges by. Issuers refer to it as `solverName`.
pub const SOLVER_NAME: &str = "stackit";

/// The contract a DNS-01 solver fulfills towards its webhook host.
#[async_trait]
pub trait Solver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once before any challenge is handed out.
    async fn initialize(&mut self, config: ClusterConfig, stop: Option<watch::Receiver<bool>>) -> Result<(), Error>;

    /// Makes sure the TXT record for `request` exists and holds the key.
    async fn present(&self, request: &ChallengeRequest) -> Result<(), Error>;

    /// Removes the key from the TXT record for `request`, and the record once it is empty.
    async fn clean_up(&self, request: &ChallengeRequest) -> Result<(), Error>;
}

/// Solves challenges against the STACKIT DNS API.
///
/// Holds nothing but its collaborators: config, token, zone and rrset are looked up anew for
/// every call. Two calls for the same record race on the fetch-then-write; the provider is
/// the only arbiter.
#[derive(Default, Clone)]
pub struct Resolver {
    zone_repository_factory: Option<Arc<dyn ZoneRepositoryFactory>>,
    rrset_repository_factory: Option<Arc<dyn RRSetRepositoryFactory>>,
    secret_fetcher: Option<Arc<dyn SecretFetcher>>,
    config_provider: Option<Arc<dyn ConfigProvider>>,
}

/// Per call state, once config, token and zone are known.
struct PreparedChallenge {
    config: StackitConfig,
    zone: Zone,
    record_name: String,
    rrsets: Box<dyn RRSetRepository>,
}

impl Resolver {
    pub fn new(
        zone_repository_factory: Arc<dyn ZoneRepositoryFactory>,
        rrset_repository_factory: Arc<dyn RRSetRepositoryFactory>,
        secret_fetcher: Arc<dyn SecretFetcher>,
        config_provider: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            zone_repository_factory: Some(zone_repository_factory),
            rrset_repository_factory: Some(rrset_repository_factory),
            secret_fetcher: Some(secret_fetcher),
            config_provider: Some(config_provider),
        }
    }

    /// A resolver using the STACKIT API and JSON issuer config. Secrets are read through the
    /// Kubernetes client created by [`Solver::initialize`].
    pub fn stackit(factory: StackitRepositoryFactory) -> Self {
        let factory = Arc::new(factory);
        Self {
            zone_repository_factory: Some(factory.clone()),
            rrset_repository_factory: Some(factory),
            secret_fetcher: None,
            config_provider: Some(Arc::new(JsonConfigProvider)),
        }
    }

    pub fn with_secret_fetcher(mut self, secret_fetcher: Arc<dyn SecretFetcher>) -> Self {
        self.secret_fetcher = Some(secret_fetcher);
        self
    }

    async fn prepare(&self, request: &ChallengeRequest) -> Result<PreparedChallenge, Error> {
        let config_provider = self
            .config_provider
            .as_deref()
            .ok_or(Error::Uninitialized("config provider"))?;
        let config = config_provider.load_config(request.config.as_ref())?;
        trace!(project_id = %config.project_id, "config decoded");

        let secret_fetcher = self
            .secret_fetcher
            .as_deref()
            .ok_or(Error::Uninitialized("secret fetcher"))?;
        let namespace = config.secret_namespace(request.namespace());
        let auth_token = secret_fetcher
            .string_from_secret(namespace, &config.auth_token_secret_ref, &config.auth_token_secret_key)
            .await
            .map_err(|source| Error::Credential {
                namespace: namespace.to_string(),
                name: config.auth_token_secret_ref.clone(),
                source,
            })?;
        let repository_config = RepositoryConfig::new(&config, auth_token);

        let zone_repository_factory = self
            .zone_repository_factory
            .as_deref()
            .ok_or(Error::Uninitialized("zone repository factory"))?;
        // the zone has to own the record we write, which differs from the challenged domain
        // once the host followed a CNAME into another zone
        let record_name = request.record_name();
        let zone = zone_repository_factory
            .new_zone_repository(&repository_config)
            .fetch_zone(&record_name)
            .await
            .map_err(|source| Error::ZoneLookup {
                domain: record_name.clone(),
                source,
            })?;
        debug!(zone_id = %zone.id, zone = %zone.dns_name, "zone resolved");

        let rrset_repository_factory = self
            .rrset_repository_factory
            .as_deref()
            .ok_or(Error::Uninitialized("rrset repository factory"))?;
        let rrsets = rrset_repository_factory.new_rrset_repository(&repository_config, &zone);

        Ok(PreparedChallenge {
            config,
            zone,
            record_name,
            rrsets,
        })
    }
}

impl PreparedChallenge {
    fn write_error(&self, action: WriteAction) -> impl FnOnce(RepositoryError) -> Error + '_ {
        move |source| Error::RRSetWrite {
            action,
            name: self.record_name.clone(),
            zone: self.zone.dns_name.clone(),
            source,
        }
    }

    fn lookup_error(&self, source: RepositoryError) -> Error {
        Error::RRSetLookup {
            name: self.record_name.clone(),
            zone: self.zone.dns_name.clone(),
            source,
        }
    }
}

/// TXT values compare equal regardless of surrounding quotes.
fn same_txt_value(a: &str, b: &str) -> bool {
    a.trim_matches('"') == b.trim_matches('"')
}

#[async_trait]
impl Solver for Resolver {
    fn name(&self) -> &'static str {
        SOLVER_NAME
    }

    async fn initialize(&mut self, config: ClusterConfig, _stop: Option<watch::Receiver<bool>>) -> Result<(), Error> {
        let client = config.client()?;
        if self.secret_fetcher.is_none() {
            debug!("using kubernetes secret fetcher");
            self.secret_fetcher = Some(Arc::new(KubeSecretFetcher::new(client)));
        }
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(domain = %request.dns_name, uid = %request.uid))]
    async fn present(&self, request: &ChallengeRequest) -> Result<(), Error> {
        let challenge = self.prepare(request).await?;
        let name = &challenge.record_name;

        match challenge.rrsets.fetch_rrset_for_zone(name, RecordType::TXT).await {
            Ok(mut rrset) => {
                if rrset.records.iter().any(|value| same_txt_value(value, &request.key)) {
                    debug!(%name, "challenge value already present");
                } else {
                    rrset.records.push(request.key.clone());
                }
                info!(%name, id = %rrset.id, "updating challenge record");
                challenge
                    .rrsets
                    .update_rrset(rrset)
                    .await
                    .map_err(challenge.write_error(WriteAction::Update))
            }
            Err(err) if err.is_rrset_not_found() => {
                info!(%name, zone = %challenge.zone.dns_name, "creating challenge record");
                let rrset = NewRRSet {
                    name: name.clone(),
                    record_type: RecordType::TXT,
                    ttl: challenge.config.acme_txt_record_ttl,
                    records: vec![request.key.clone()],
                };
                challenge
                    .rrsets
                    .create_rrset(rrset)
                    .await
                    .map_err(challenge.write_error(WriteAction::Create))
            }
            Err(err) => Err(challenge.lookup_error(err)),
        }
    }

    #[instrument(level = "debug", skip_all, fields(domain = %request.dns_name, uid = %request.uid))]
    async fn clean_up(&self, request: &ChallengeRequest) -> Result<(), Error> {
        let challenge = self.prepare(request).await?;
        let name = &challenge.record_name;

        let mut rrset = match challenge.rrsets.fetch_rrset_for_zone(name, RecordType::TXT).await {
            Ok(rrset) => rrset,
            Err(err) if err.is_rrset_not_found() => {
                debug!(%name, "challenge record already gone");
                return Ok(());
            }
            Err(err) => return Err(challenge.lookup_error(err)),
        };

        let before = rrset.records.len();
        rrset.records.retain(|value| !same_txt_value(value, &request.key));
        if rrset.records.len() == before {
            debug!(%name, "challenge value not present, nothing to clean up");
            return Ok(());
        }

        if rrset.records.is_empty() {
            info!(%name, id = %rrset.id, "deleting challenge record");
            match challenge.rrsets.delete_rrset(&rrset.id).await {
                Err(RepositoryError::Api { status: 404, .. }) => {
                    debug!(%name, "challenge record deleted concurrently");
                    Ok(())
                }
                result => result.map_err(challenge.write_error(WriteAction::Delete)),
            }
        } else {
            info!(%name, id = %rrset.id, remaining = rrset.records.len(), "removing challenge value");
            challenge
                .rrsets
                .update_rrset(rrset)
                .await
                .map_err(challenge.write_error(WriteAction::Update))
        }
    }
}
