use crate::{
    cluster::ClusterConfigError,
    config::ConfigError,
    repository::RepositoryError,
    secrets::SecretError,
};

/// The step of a present / clean-up call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Initialize,
    /// A present / clean-up call found a collaborator missing, `initialize` was skipped.
    Setup,
    DecodeConfig,
    ResolveCredential,
    FetchZone,
    FetchRRSet,
    WriteRRSet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteAction::Create => "create",
            WriteAction::Update => "update",
            WriteAction::Delete => "delete",
        })
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("{0} not configured, was the solver initialized?")]
    Uninitialized(&'static str),

    #[error("invalid kubernetes client config: {0}")]
    ClusterConfig(#[from] ClusterConfigError),

    #[error("unable to load solver config: {0}")]
    Config(#[from] ConfigError),

    #[error("unable to fetch auth token from secret {namespace}/{name}: {source}")]
    Credential {
        namespace: String,
        name: String,
        #[source]
        source: SecretError,
    },

    #[error("unable to fetch zone for {domain}: {source}")]
    ZoneLookup {
        domain: String,
        #[source]
        source: RepositoryError,
    },

    #[error("unable to fetch rrset {name} in zone {zone}: {source}")]
    RRSetLookup {
        name: String,
        zone: String,
        #[source]
        source: RepositoryError,
    },

    #[error("unable to {action} rrset {name} in zone {zone}: {source}")]
    RRSetWrite {
        action: WriteAction,
        name: String,
        zone: String,
        #[source]
        source: RepositoryError,
    },
}

impl Error {
    pub fn stage(&self) -> Stage {
        match self {
            Error::Uninitialized(_) => Stage::Setup,
            Error::ClusterConfig(_) => Stage::Initialize,
            Error::Config(_) => Stage::DecodeConfig,
            Error::Credential { .. } => Stage::ResolveCredential,
            Error::ZoneLookup { .. } => Stage::FetchZone,
            Error::RRSetLookup { .. } => Stage::FetchRRSet,
            Error::RRSetWrite { .. } => Stage::WriteRRSet,
        }
    }
}
