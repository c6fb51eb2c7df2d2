//! Controller configuration.
//!
//! Everything the controller needs at runtime is read once at startup into a
//! [`ControllerConfig`] and handed to the components that need it.

use crate::error::ControllerError;
use std::time::Duration;

/// Cluster-wide proxy settings, injected by OLM into the operator's environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyConfig {
    /// `HTTP_PROXY`
    pub http_proxy: Option<String>,
    /// `HTTPS_PROXY`
    pub https_proxy: Option<String>,
    /// `NO_PROXY`
    pub no_proxy: Option<String>,
}

impl ProxyConfig {
    /// Whether any proxy variable is set
    pub fn is_configured(&self) -> bool {
        self.http_proxy.is_some() || self.https_proxy.is_some() || self.no_proxy.is_some()
    }

    /// `(name, value)` pairs for the variables that are set, in a fixed order
    pub fn env_vars(&self) -> Vec<(&'static str, &str)> {
        [
            ("HTTP_PROXY", self.http_proxy.as_deref()),
            ("HTTPS_PROXY", self.https_proxy.as_deref()),
            ("NO_PROXY", self.no_proxy.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }
}

/// What to do with deployment containers the operator does not recognise
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnknownContainerPolicy {
    /// Leave them in place and log a warning
    #[default]
    Skip,
    /// Remove them from the pod template
    Prune,
}

/// Runtime configuration for the UpdateService Controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the operator watches and deploys into
    pub watch_namespace: String,
    /// Image for the graph-builder and policy-engine containers
    pub operand_image: String,
    /// Cluster proxy settings passed through to graph-builder
    pub proxy: ProxyConfig,
    /// Requeue interval after a successful pass
    pub resync_interval: Duration,
    /// First requeue delay after a failed pass
    pub error_backoff_min: Duration,
    /// Cap on the requeue delay after repeated failures
    pub error_backoff_max: Duration,
    /// Delay before retrying a create that raced with another writer
    pub create_retry_delay: Duration,
    /// Deadline for each API call
    pub store_call_timeout: Duration,
    /// Handling of unrecognised deployment containers
    pub unknown_containers: UnknownContainerPolicy,
}

impl ControllerConfig {
    /// Defaults for everything except the two required settings
    pub fn new(watch_namespace: impl Into<String>, operand_image: impl Into<String>) -> Self {
        Self {
            watch_namespace: watch_namespace.into(),
            operand_image: operand_image.into(),
            proxy: ProxyConfig::default(),
            resync_interval: Duration::from_secs(300),
            error_backoff_min: Duration::from_secs(5),
            error_backoff_max: Duration::from_secs(300),
            create_retry_delay: Duration::from_secs(1),
            store_call_timeout: Duration::from_secs(30),
            unknown_containers: UnknownContainerPolicy::Skip,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let required = |key: &str| {
            get(key).ok_or_else(|| {
                ControllerError::InvalidConfig(format!("{key} environment variable is required"))
            })
        };
        let seconds = |key: &str, default: Duration| -> Result<Duration, ControllerError> {
            match get(key) {
                Some(raw) => raw.parse::<u64>().map(Duration::from_secs).map_err(|e| {
                    ControllerError::InvalidConfig(format!("{key}={raw:?} is not a number of seconds: {e}"))
                }),
                None => Ok(default),
            }
        };

        let mut config = Self::new(required("WATCH_NAMESPACE")?, required("OPERAND_IMAGE")?);
        config.proxy = ProxyConfig {
            http_proxy: get("HTTP_PROXY"),
            https_proxy: get("HTTPS_PROXY"),
            no_proxy: get("NO_PROXY"),
        };
        config.resync_interval = seconds("RESYNC_INTERVAL_SECS", config.resync_interval)?;
        config.error_backoff_min = seconds("ERROR_REQUEUE_SECS", config.error_backoff_min)?;
        config.error_backoff_max = seconds("ERROR_REQUEUE_MAX_SECS", config.error_backoff_max)?;
        config.store_call_timeout = seconds("STORE_CALL_TIMEOUT_SECS", config.store_call_timeout)?;
        if let Some(raw) = get("CREATE_RETRY_DELAY_MS") {
            let millis = raw.parse::<u64>().map_err(|e| {
                ControllerError::InvalidConfig(format!("CREATE_RETRY_DELAY_MS={raw:?} is not a number: {e}"))
            })?;
            config.create_retry_delay = Duration::from_millis(millis);
        }
        config.unknown_containers = match get("UNKNOWN_CONTAINER_POLICY").as_deref() {
            None | Some("skip") => UnknownContainerPolicy::Skip,
            Some("prune") => UnknownContainerPolicy::Prune,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "UNKNOWN_CONTAINER_POLICY must be \"skip\" or \"prune\", got {other:?}"
                )));
            }
        };
        if config.error_backoff_max < config.error_backoff_min {
            return Err(ControllerError::InvalidConfig(
                "ERROR_REQUEUE_MAX_SECS must not be lower than ERROR_REQUEUE_SECS".to_string(),
            ));
        }
        Ok(config)
    }
}
