use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::Api;

#[derive(thiserror::Error, Debug)]
pub enum SecretError {
    #[error("secret {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("key {key:?} not found in secret {namespace}/{name}")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("key {key:?} of secret {namespace}/{name} is not valid utf8")]
    InvalidEncoding {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("unable to read secret {namespace}/{name}: {source}")]
    Kube {
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

/// Reads a single string value out of a Kubernetes secret.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn string_from_secret(&self, namespace: &str, secret_name: &str, key: &str) -> Result<String, SecretError>;
}

/// [`SecretFetcher`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretFetcher {
    client: kube::Client,
}

impl KubeSecretFetcher {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretFetcher for KubeSecretFetcher {
    async fn string_from_secret(&self, namespace: &str, secret_name: &str, key: &str) -> Result<String, SecretError> {
        trace!(name = %secret_name, %namespace, %key, "secret lookup");

        let secret = Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get(secret_name)
            .await
            .map_err(|err| match err {
                kube::Error::Api(response) if response.code == 404 => SecretError::NotFound {
                    namespace: namespace.to_string(),
                    name: secret_name.to_string(),
                },
                source => SecretError::Kube {
                    namespace: namespace.to_string(),
                    name: secret_name.to_string(),
                    source,
                },
            })?;

        value_from_secret(&secret, namespace, secret_name, key)
    }
}

/// Extracts `key` from a secret. `stringData` wins over `data`. Surrounding whitespace is
/// dropped, tokens written with `echo` end in a newline.
pub fn value_from_secret(secret: &Secret, namespace: &str, name: &str, key: &str) -> Result<String, SecretError> {
    if let Some(value) = secret.string_data.as_ref().and_then(|data| data.get(key)) {
        trace!("secret lookup result from stringData");
        return Ok(value.trim().to_string());
    }

    let Some(bytes) = secret.data.as_ref().and_then(|data| data.get(key)) else {
        return Err(SecretError::MissingKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
            key: key.to_string(),
        });
    };

    match String::from_utf8(bytes.0.clone()) {
        Ok(decoded) => Ok(decoded.trim().to_string()),
        Err(_) => {
            error!(%name, %namespace, "unable to decode secret value as utf8");
            Err(SecretError::InvalidEncoding {
                namespace: namespace.to_string(),
                name: name.to_string(),
                key: key.to_string(),
            })
        }
    }
}
