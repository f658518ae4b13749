//! Kubernetes client configuration handed to the solver by its host.

pub const DEFAULT_QPS: f32 = 5.0;
pub const DEFAULT_BURST: i32 = 10;

#[derive(thiserror::Error, Debug)]
pub enum ClusterConfigError {
    #[error("burst is required to be greater than 0 when no rate limiter is set and qps is greater than 0")]
    Burst,

    #[error("qps must be a finite, non-negative number, got {0}")]
    Qps(f32),

    #[error("unable to infer kubernetes config: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("unable to build kubernetes client: {0}")]
    Client(#[from] kube::Error),
}

/// An explicit client-side rate limiter. When present it supersedes `qps`/`burst`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimiter {
    pub qps: f32,
    pub burst: u32,
}

/// Connection settings plus the client-side throttling parameters of the host's Kubernetes
/// client. The throttling parameters are checked with the same rules client-go applies.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub kube: kube::Config,
    pub qps: f32,
    pub burst: i32,
    pub rate_limiter: Option<RateLimiter>,
}

impl ClusterConfig {
    pub fn new(kube: kube::Config) -> Self {
        Self {
            kube,
            qps: DEFAULT_QPS,
            burst: DEFAULT_BURST,
            rate_limiter: None,
        }
    }

    /// Kubeconfig or in-cluster configuration, whichever is available.
    pub async fn infer() -> Result<Self, ClusterConfigError> {
        Ok(Self::new(kube::Config::infer().await?))
    }

    pub fn validate(&self) -> Result<(), ClusterConfigError> {
        if self.rate_limiter.is_some() {
            return Ok(());
        }
        if !self.qps.is_finite() || self.qps < 0.0 {
            return Err(ClusterConfigError::Qps(self.qps));
        }
        if self.qps > 0.0 && self.burst <= 0 {
            return Err(ClusterConfigError::Burst);
        }
        Ok(())
    }

    /// Validates the configuration and constructs a client from it. Needs a tokio runtime.
    pub fn client(self) -> Result<kube::Client, ClusterConfigError> {
        self.validate()?;
        Ok(kube::Client::try_from(self.kube)?)
    }
}
