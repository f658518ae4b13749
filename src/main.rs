#[macro_use]
extern crate tracing;

use clap::Parser;
use eyre::{
    Context as _,
    Result,
};
use stackit_dns01_solver::{
    challenge::ChallengeAction,
    cluster::ClusterConfig,
    config::{
        StackitConfig,
        DEFAULT_API_BASE_PATH,
    },
    dns::lookup::{
        self as dns_lookup,
        DEFAULT_NAMESERVER,
    },
    repository::{
        stackit::StackitRepositoryFactory,
        RepositoryConfig,
    },
    ChallengeRequest,
    Resolver,
    Solver as _,
};
use std::{
    net::SocketAddr,
    time::Duration,
};
use tracing_subscriber::EnvFilter;

const PROPAGATION_CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(version, about)]
enum Args {
    /// Print the JSON schema of the issuer's solver config
    ConfigSchema,
    /// Publish the challenge TXT record
    Present(ArgsPresent),
    /// Remove the challenge value again
    CleanUp(ArgsChallenge),
    /// List the active zones of a project
    ListZones(ArgsListZones),
}

#[derive(Parser)]
struct ArgsChallenge {
    #[clap(long, help = "Domain under challenge, e.g. example.com")]
    dns_name: String,

    #[clap(long, help = "Key authorization the TXT record has to hold")]
    key: String,

    #[clap(
        long,
        default_value = "default",
        help = "Namespace the auth token secret is looked up in, unless the config overrides it"
    )]
    namespace: String,

    #[clap(long, env = "STACKIT_SOLVER_CONFIG", help = "Solver config as JSON, e.g. {\"projectId\":\"...\"}")]
    config: String,

    #[clap(
        long,
        default_value = "30s",
        value_parser = humantime::parse_duration,
        help = "Timeout for STACKIT API requests"
    )]
    http_timeout: Duration,
}

#[derive(Parser)]
struct ArgsPresent {
    #[clap(flatten)]
    challenge: ArgsChallenge,

    #[clap(
        long,
        value_parser = humantime::parse_duration,
        help = "Wait up to this long for the record to become visible. If not set, no DNS check is done"
    )]
    wait: Option<Duration>,

    #[clap(long, default_value = DEFAULT_NAMESERVER, help = "Nameserver and port to use for the DNS check")]
    nameserver: SocketAddr,
}

#[derive(Parser)]
struct ArgsListZones {
    #[clap(long, env = "STACKIT_AUTH_TOKEN", help = "STACKIT DNS API token")]
    auth_token: String,

    #[clap(long, env = "STACKIT_PROJECT_ID")]
    project_id: String,

    #[clap(long, default_value = DEFAULT_API_BASE_PATH)]
    api_base_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Args::parse() {
        Args::ConfigSchema => {
            let schema = schemars::schema_for!(StackitConfig);
            print!("{}", serde_yaml::to_string(&schema)?);
        }
        Args::Present(ArgsPresent {
            challenge,
            wait,
            nameserver,
        }) => {
            let (resolver, request) = prepare(challenge, ChallengeAction::Present).await?;
            resolver.present(&request).await?;

            if let Some(wait) = wait {
                dns_lookup::wait_for_txt_record(
                    &request.record_name(),
                    &request.key,
                    nameserver,
                    Some(wait),
                    PROPAGATION_CHECK_INTERVAL,
                )
                .await?;
            }
        }
        Args::CleanUp(challenge) => {
            let (resolver, request) = prepare(challenge, ChallengeAction::CleanUp).await?;
            resolver.clean_up(&request).await?;
        }
        Args::ListZones(ArgsListZones {
            auth_token,
            project_id,
            api_base_path,
        }) => {
            let api = StackitRepositoryFactory::default().api(&RepositoryConfig {
                api_base_path: api_base_path.trim_end_matches('/').to_string(),
                project_id,
                auth_token,
            });
            for zone in api.list_zones().await? {
                println!(
                    "id={} dns_name={} state={}",
                    zone.id,
                    zone.dns_name,
                    zone.state.as_deref().unwrap_or("-")
                );
            }
        }
    }

    Ok(())
}

async fn prepare(args: ArgsChallenge, action: ChallengeAction) -> Result<(Resolver, ChallengeRequest)> {
    let ArgsChallenge {
        dns_name,
        key,
        namespace,
        config,
        http_timeout,
    } = args;

    let config: serde_json::Value = serde_json::from_str(&config).context("solver config is not valid json")?;

    let mut resolver = Resolver::stackit(StackitRepositoryFactory::with_timeout(http_timeout)?);
    resolver.initialize(ClusterConfig::infer().await?, None).await?;

    info!(?action, %dns_name, "solving challenge");

    let request = ChallengeRequest {
        action,
        type_: "dns-01".to_string(),
        dns_name,
        key,
        resource_namespace: namespace,
        config: Some(config),
        ..Default::default()
    };

    Ok((resolver, request))
}
