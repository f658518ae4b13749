use eyre::{
    bail,
    Result,
};
use rsdns::{
    clients::{
        tokio::Client,
        ClientConfig,
    },
    records::{
        data::Txt,
        Class,
    },
};
use std::{
    net::SocketAddr,
    time::{
        Duration,
        Instant,
    },
};
use tokio::time::sleep;

pub const DEFAULT_NAMESERVER: &str = "1.1.1.1:53";

/// TXT values published for `qname`, as seen by `nameserver`.
pub async fn txt_records(qname: &str, nameserver: SocketAddr) -> Result<Vec<String>> {
    debug!(?qname, %nameserver, "TXT record lookup...");
    let config = ClientConfig::with_nameserver(nameserver);
    let mut client = Client::new(config).await?;
    let rrset = client.query_rrset::<Txt>(qname, Class::IN).await?;
    Ok(rrset
        .rdata
        .iter()
        .map(|txt| String::from_utf8_lossy(&txt.text).to_string())
        .collect())
}

pub async fn check_txt_record(qname: &str, value: &str, nameserver: SocketAddr) -> bool {
    match txt_records(qname, nameserver).await {
        Ok(values) => values.iter().any(|it| it == value),
        Err(e) => {
            warn!("Failed to resolve TXT record {qname:?}: {e}");
            false
        }
    }
}

/// Polls `nameserver` every `step` until `qname` carries `value`.
pub async fn wait_for_txt_record(
    qname: &str,
    value: &str,
    nameserver: SocketAddr,
    max_wait: Option<Duration>,
    step: Duration,
) -> Result<()> {
    debug!("Waiting for TXT record {qname:?} to propagate...");
    let start = Instant::now();

    loop {
        if check_txt_record(qname, value, nameserver).await {
            info!("TXT record {qname:?} propagated successfully");
            return Ok(());
        }

        if let Some(max_wait) = max_wait {
            if start.elapsed() > max_wait {
                bail!("TXT record {qname:?} did not propagate within {max_wait:?}");
            }
        }

        warn!("TXT record {qname:?} not propagated yet. Waiting...");
        sleep(step).await;
    }
}
