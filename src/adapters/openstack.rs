//! # OpenStack HTTP Adapters
//!
//! Identity (Keystone), compute quota (Nova) and network quota (Neutron)
//! adapters over reqwest.
//!
//! Endpoint layout, relative to each configured base URL:
//!
//! - Keystone: `GET {identity}/v3/projects?name=<name>`
//! - Nova: `GET|PUT {compute}/os-quota-sets/{project}` with a `quota_set` envelope
//! - Neutron: `GET|PUT {network}/v2.0/quotas/{project}` with a `quota` envelope

use super::{
    AdapterError, AdapterResult, IdentityAdapter, QuotaAdapter, QuotaAssignment, QuotaFamily,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Shared HTTP client with bounded timeouts and optional token auth
#[derive(Clone)]
pub struct OpenStackHttp {
    client: reqwest::Client,
    auth_token: Option<String>,
}

impl std::fmt::Debug for OpenStackHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenStackHttp")
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .finish_non_exhaustive()
    }
}

impl OpenStackHttp {
    /// Build a client whose every request is bounded by `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration, auth_token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client, auth_token })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.header(AUTH_TOKEN_HEADER, token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> AdapterResult<T> {
        debug!(url = url, "openstack.get");
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, context))?;
        decode(response, context).await
    }

    async fn put_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        context: &str,
    ) -> AdapterResult<T> {
        debug!(url = url, "openstack.put");
        let response = self
            .authorize(self.client.put(url).json(body))
            .send()
            .await
            .map_err(|e| classify_transport_error(&e, context))?;
        decode(response, context).await
    }
}

fn classify_transport_error(error: &reqwest::Error, context: &str) -> AdapterError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        AdapterError::Transient(format!("{context}: {error}"))
    } else {
        AdapterError::Internal(format!("{context}: {error}"))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, context: &str) -> AdapterResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(AdapterError::from_status(status.as_u16(), context));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AdapterError::Internal(format!("{context}: failed to decode response: {e}")))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Debug, Deserialize)]
struct ProjectList {
    projects: Vec<Project>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    name: String,
}

/// Project lookup against Keystone
#[derive(Debug, Clone)]
pub struct KeystoneIdentity {
    http: OpenStackHttp,
    base_url: String,
}

impl KeystoneIdentity {
    #[must_use]
    pub fn new(http: OpenStackHttp, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }
}

#[async_trait]
impl IdentityAdapter for KeystoneIdentity {
    async fn project_id(&self, project_name: &str) -> AdapterResult<String> {
        let mut url = reqwest::Url::parse(&format!("{}/v3/projects", self.base_url))
            .map_err(|e| AdapterError::Permanent(format!("invalid identity endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("name", project_name);

        let list: ProjectList = self.http.get_json(url.as_str(), "keystone projects").await?;
        list.projects
            .into_iter()
            .find(|p| p.name == project_name)
            .map(|p| p.id)
            .ok_or_else(|| AdapterError::Permanent(format!("project {project_name} not found")))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct QuotaSetEnvelope {
    quota_set: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NetworkQuotaEnvelope {
    quota: BTreeMap<String, serde_json::Value>,
}

/// Keep integer-valued entries; Nova also returns the project id in the set
fn integer_limits(values: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, i64> {
    values
        .into_iter()
        .filter_map(|(key, value)| value.as_i64().map(|v| (key, v)))
        .collect()
}

fn to_json_limits(limits: &BTreeMap<String, i64>) -> BTreeMap<String, serde_json::Value> {
    limits
        .iter()
        .map(|(key, value)| (key.clone(), serde_json::Value::from(*value)))
        .collect()
}

/// Compute quota sets on Nova
#[derive(Debug, Clone)]
pub struct NovaQuota {
    http: OpenStackHttp,
    base_url: String,
}

impl NovaQuota {
    #[must_use]
    pub fn new(http: OpenStackHttp, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }

    fn url(&self, project_id: &str) -> String {
        format!("{}/os-quota-sets/{project_id}", self.base_url)
    }
}

#[async_trait]
impl QuotaAdapter for NovaQuota {
    fn family(&self) -> QuotaFamily {
        QuotaFamily::Compute
    }

    async fn get_quota(&self, project_id: &str) -> AdapterResult<BTreeMap<String, i64>> {
        let envelope: QuotaSetEnvelope = self
            .http
            .get_json(&self.url(project_id), "nova quota-sets")
            .await?;
        Ok(integer_limits(envelope.quota_set))
    }

    async fn set_quota(
        &self,
        assignment: &QuotaAssignment,
    ) -> AdapterResult<BTreeMap<String, i64>> {
        let body = QuotaSetEnvelope {
            quota_set: to_json_limits(&assignment.limits),
        };
        let envelope: QuotaSetEnvelope = self
            .http
            .put_json(&self.url(&assignment.project_id), &body, "nova quota-sets")
            .await?;
        Ok(integer_limits(envelope.quota_set))
    }
}

/// Network quotas on Neutron
#[derive(Debug, Clone)]
pub struct NeutronQuota {
    http: OpenStackHttp,
    base_url: String,
}

impl NeutronQuota {
    #[must_use]
    pub fn new(http: OpenStackHttp, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base(base_url),
        }
    }

    fn url(&self, project_id: &str) -> String {
        format!("{}/v2.0/quotas/{project_id}", self.base_url)
    }
}

#[async_trait]
impl QuotaAdapter for NeutronQuota {
    fn family(&self) -> QuotaFamily {
        QuotaFamily::Network
    }

    async fn get_quota(&self, project_id: &str) -> AdapterResult<BTreeMap<String, i64>> {
        let envelope: NetworkQuotaEnvelope = self
            .http
            .get_json(&self.url(project_id), "neutron quotas")
            .await?;
        Ok(integer_limits(envelope.quota))
    }

    async fn set_quota(
        &self,
        assignment: &QuotaAssignment,
    ) -> AdapterResult<BTreeMap<String, i64>> {
        let body = NetworkQuotaEnvelope {
            quota: to_json_limits(&assignment.limits),
        };
        let envelope: NetworkQuotaEnvelope = self
            .http
            .put_json(&self.url(&assignment.project_id), &body, "neutron quotas")
            .await?;
        Ok(integer_limits(envelope.quota))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_limits_drops_non_numeric_entries() {
        let values = BTreeMap::from([
            ("id".to_string(), serde_json::json!("abc")),
            ("ram".to_string(), serde_json::json!(-1)),
            ("cores".to_string(), serde_json::json!(100)),
        ]);
        let limits = integer_limits(values);
        assert_eq!(limits.len(), 2);
        assert_eq!(limits["ram"], -1);
    }

    #[test]
    fn test_urls_ignore_trailing_slash() {
        let http = OpenStackHttp::new(Duration::from_secs(1), None).unwrap();
        let nova = NovaQuota::new(http.clone(), "http://nova/compute/");
        assert_eq!(nova.url("p1"), "http://nova/compute/os-quota-sets/p1");
        let neutron = NeutronQuota::new(http, "http://neutron/networking");
        assert_eq!(neutron.url("p1"), "http://neutron/networking/v2.0/quotas/p1");
    }

    #[test]
    fn test_debug_hides_token() {
        let http = OpenStackHttp::new(Duration::from_secs(1), Some("secret-token".into())).unwrap();
        assert!(!format!("{http:?}").contains("secret-token"));
    }
}
