use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;

/// Label prepended to the challenged domain to form the TXT record name.
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeAction {
    #[default]
    Present,
    CleanUp,
}

/// A DNS-01 challenge as handed to the solver by the host (cert-manager's `ChallengeRequest`).
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub action: ChallengeAction,
    #[serde(default, rename = "type")]
    pub type_: String,
    /// The domain under challenge, e.g. `example.com` or `*.example.com`.
    pub dns_name: String,
    /// Key authorization, the value the TXT record has to hold.
    pub key: String,
    /// Namespace of the resource (Issuer/Challenge) that triggered the request.
    #[serde(default)]
    pub resource_namespace: String,
    /// Fully qualified record name computed by the host, CNAMEs already followed.
    #[serde(default, rename = "resolvedFQDN", skip_serializing_if = "Option::is_none")]
    pub resolved_fqdn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_zone: Option<String>,
    #[serde(default)]
    pub allow_ambient_credentials: bool,
    /// Opaque solver configuration taken from the issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

impl ChallengeRequest {
    /// The domain the challenge is for, without a wildcard prefix or trailing dot.
    pub fn domain(&self) -> &str {
        let domain = self.dns_name.trim_end_matches('.');
        domain.strip_prefix("*.").unwrap_or(domain)
    }

    pub fn namespace(&self) -> &str {
        if self.resource_namespace.is_empty() {
            "default"
        } else {
            &self.resource_namespace
        }
    }

    /// Fully qualified name (with trailing dot) of the TXT record proving the challenge.
    pub fn record_name(&self) -> String {
        match self.resolved_fqdn.as_deref().filter(|fqdn| !fqdn.is_empty()) {
            Some(fqdn) => fqdn_with_dot(fqdn),
            None => format!("{ACME_CHALLENGE_LABEL}.{}.", self.domain()),
        }
    }
}

fn fqdn_with_dot(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}
