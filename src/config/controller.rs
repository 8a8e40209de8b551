//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::reconciler::ReconcilerSettings;
use crate::controller::stages::StageSettings;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Identity endpoint, also rendered into `octavia.conf`
    pub keystone_url: String,
    /// Compute endpoint for quota calls
    pub nova_url: String,
    /// Network endpoint for quota calls
    pub neutron_url: String,
    /// Token sent as `X-Auth-Token` on identity and quota calls
    pub auth_token: Option<String>,
    /// Timeout of every identity and quota call (seconds)
    pub http_timeout_secs: u64,
    /// Exponential backoff starting value (seconds)
    pub backoff_min_secs: u64,
    /// Exponential backoff maximum value (seconds)
    pub backoff_max_secs: u64,
    /// Requeue interval once every stage is complete (seconds)
    pub resync_interval_secs: u64,
    /// Port of the metrics and probe server
    pub metrics_port: u16,
    /// Log format (json, text)
    pub log_format: String,
    /// Watch stream restart delay (seconds)
    pub watch_restart_delay_secs: u64,
    /// Maximum concurrent reconciliations
    /// Limits how many resources can be reconciled simultaneously
    pub max_concurrent_reconciliations: u16,
    /// Image of the db-sync job
    pub db_sync_image: String,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("keystone_url", &self.keystone_url)
            .field("nova_url", &self.nova_url)
            .field("neutron_url", &self.neutron_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("backoff_min_secs", &self.backoff_min_secs)
            .field("backoff_max_secs", &self.backoff_max_secs)
            .field("resync_interval_secs", &self.resync_interval_secs)
            .field("metrics_port", &self.metrics_port)
            .field("log_format", &self.log_format)
            .field("watch_restart_delay_secs", &self.watch_restart_delay_secs)
            .field("max_concurrent_reconciliations", &self.max_concurrent_reconciliations)
            .field("db_sync_image", &self.db_sync_image)
            .finish()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            keystone_url: DEFAULT_KEYSTONE_URL.to_string(),
            nova_url: DEFAULT_NOVA_URL.to_string(),
            neutron_url: DEFAULT_NEUTRON_URL.to_string(),
            auth_token: None,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "json".to_string(),
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            db_sync_image: DEFAULT_DB_SYNC_IMAGE.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            keystone_url: env_var_or_default_str("KEYSTONE_URL", DEFAULT_KEYSTONE_URL),
            nova_url: env_var_or_default_str("NOVA_URL", DEFAULT_NOVA_URL),
            neutron_url: env_var_or_default_str("NEUTRON_URL", DEFAULT_NEUTRON_URL),
            auth_token: std::env::var("OPENSTACK_AUTH_TOKEN")
                .ok()
                .filter(|token| !token.is_empty()),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            db_sync_image: env_var_or_default_str("DB_SYNC_IMAGE", DEFAULT_DB_SYNC_IMAGE),
        }
    }

    #[must_use]
    pub fn http_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Settings handed to the reconciler
    #[must_use]
    pub fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            stage: StageSettings {
                keystone_url: self.keystone_url.clone(),
            },
            backoff_min: Duration::from_secs(self.backoff_min_secs),
            backoff_max: Duration::from_secs(self.backoff_max_secs),
            resync_interval: Duration::from_secs(self.resync_interval_secs),
        }
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.metrics_port, 5000);
        assert_eq!(config.max_concurrent_reconciliations, 10);
        assert!(config.auth_token.is_none());

        let settings = config.reconciler_settings();
        assert_eq!(settings.backoff_min, Duration::from_secs(2));
        assert_eq!(settings.backoff_max, Duration::from_secs(300));
        assert_eq!(settings.resync_interval, Duration::from_secs(600));
        assert_eq!(settings.stage.keystone_url, config.keystone_url);
    }

    #[test]
    fn test_unparsable_value_falls_back() {
        assert_eq!(env_var_or_default("OCTAVIA_TEST_UNSET_VARIABLE", 7u64), 7);
    }

    #[test]
    fn test_debug_hides_token() {
        let config = ControllerConfig {
            auth_token: Some("s3cr3t".to_string()),
            ..ControllerConfig::default()
        };
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
