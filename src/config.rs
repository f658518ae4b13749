use reqwest::Url;
use schemars::JsonSchema;
use serde::{
    de::{
        self,
        Unexpected,
    },
    Deserialize,
    Serialize,
};
use serde_json::Value;

pub const DEFAULT_API_BASE_PATH: &str = "https://dns.api.stackit.cloud";
pub const DEFAULT_AUTH_TOKEN_SECRET_REF: &str = "stackit-cert-manager-webhook";
pub const DEFAULT_AUTH_TOKEN_SECRET_KEY: &str = "auth-token";
pub const DEFAULT_ACME_TXT_RECORD_TTL: i64 = 60;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no solver config provided")]
    Missing,

    #[error("error decoding solver config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid solver config field {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Solver configuration, as found in the `config` section of a cert-manager webhook issuer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackitConfig {
    /// The STACKIT project owning the DNS zones
    pub project_id: String,
    /// Base URL of the STACKIT DNS API
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
    /// Name of the secret holding the API token
    #[serde(default = "default_auth_token_secret_ref")]
    pub auth_token_secret_ref: String,
    /// Key of the API token within the secret
    #[serde(default = "default_auth_token_secret_key")]
    pub auth_token_secret_key: String,
    /// Namespace of the secret. Defaults to the namespace of the challenge resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token_secret_namespace: Option<String>,
    /// TTL in seconds for newly created challenge records
    #[serde(default = "default_acme_txt_record_ttl")]
    pub acme_txt_record_ttl: i64,
}

fn default_api_base_path() -> String {
    DEFAULT_API_BASE_PATH.to_string()
}

fn default_auth_token_secret_ref() -> String {
    DEFAULT_AUTH_TOKEN_SECRET_REF.to_string()
}

fn default_auth_token_secret_key() -> String {
    DEFAULT_AUTH_TOKEN_SECRET_KEY.to_string()
}

fn default_acme_txt_record_ttl() -> i64 {
    DEFAULT_ACME_TXT_RECORD_TTL
}

impl StackitConfig {
    /// Namespace to read the token secret from. An empty override counts as unset.
    pub fn secret_namespace<'a>(&'a self, resource_namespace: &'a str) -> &'a str {
        self.auth_token_secret_namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(resource_namespace)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "projectId",
                reason: "must not be empty".to_string(),
            });
        }

        let url = Url::parse(&self.api_base_path).map_err(|err| ConfigError::Invalid {
            field: "apiBasePath",
            reason: err.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                field: "apiBasePath",
                reason: format!("unsupported scheme {:?}", url.scheme()),
            });
        }

        if self.auth_token_secret_ref.is_empty() || self.auth_token_secret_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "authTokenSecretRef",
                reason: "secret name and key must not be empty".to_string(),
            });
        }

        if self.acme_txt_record_ttl <= 0 {
            return Err(ConfigError::Invalid {
                field: "acmeTxtRecordTtl",
                reason: format!("must be positive, got {}", self.acme_txt_record_ttl),
            });
        }

        Ok(())
    }
}

/// Turns the opaque config blob of a challenge into a [`StackitConfig`].
pub trait ConfigProvider: Send + Sync {
    fn load_config(&self, raw: Option<&Value>) -> Result<StackitConfig, ConfigError>;
}

/// Decodes the config blob as JSON and applies defaults.
#[derive(Default, Debug, Clone, Copy)]
pub struct JsonConfigProvider;

impl ConfigProvider for JsonConfigProvider {
    fn load_config(&self, raw: Option<&Value>) -> Result<StackitConfig, ConfigError> {
        let raw = match raw {
            None | Some(Value::Null) => return Err(ConfigError::Missing),
            Some(raw @ Value::Object(_)) => raw,
            // derived struct visitors also accept the sequence form
            Some(other) => {
                return Err(ConfigError::Json(de::Error::invalid_type(
                    unexpected(other),
                    &"a solver config object",
                )))
            }
        };

        let config = StackitConfig::deserialize(raw)?;
        config.validate()?;
        Ok(config)
    }
}

fn unexpected(value: &Value) -> Unexpected<'_> {
    match value {
        Value::Bool(b) => Unexpected::Bool(*b),
        Value::Number(_) => Unexpected::Other("number"),
        Value::String(s) => Unexpected::Str(s),
        Value::Array(_) => Unexpected::Seq,
        Value::Null => Unexpected::Unit,
        Value::Object(_) => Unexpected::Map,
    }
}
