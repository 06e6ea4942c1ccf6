//! Client configuration and service endpoints

use std::collections::HashMap;

use crate::error::{ClientError, ClientResult};

pub const ENV_ACCESS_KEY: &str = "NIFCLOUD_ACCESS_KEY_ID";
pub const ENV_SECRET_KEY: &str = "NIFCLOUD_SECRET_ACCESS_KEY";
pub const ENV_REGION: &str = "NIFCLOUD_DEFAULT_REGION";
pub const DEFAULT_REGION: &str = "jp-east-1";

/// NIFCLOUD API families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Computing query API (servers, networks, load balancers, ...)
    Computing,
    /// RDB query API
    Rdb,
    /// DNS REST API
    Dns,
}

impl Service {
    pub fn default_endpoint(&self, region: &str) -> String {
        match self {
            Service::Computing => format!("https://{}.computing.api.nifcloud.com/api/", region),
            Service::Rdb => format!("https://rdb.{}.api.nifcloud.com/", region),
            Service::Dns => "https://dns.api.nifcloud.com/2012-12-12N2013-12-16/".to_string(),
        }
    }

    /// Value of the `Version` query parameter
    pub fn version(&self) -> &'static str {
        match self {
            Service::Computing => "3.0",
            Service::Rdb => "2013-05-15N2013-12-16",
            Service::Dns => "2012-12-12N2013-12-16",
        }
    }

    /// Service name used in the signature scope
    pub fn signing_name(&self) -> &'static str {
        match self {
            Service::Computing => "computing",
            Service::Rdb => "rdb",
            Service::Dns => "dns",
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.signing_name())
    }
}

/// Credentials, region and endpoint overrides
#[derive(Clone)]
pub struct ClientConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub endpoints: HashMap<Service, String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: region.into(),
            endpoints: HashMap::new(),
        }
    }

    /// Build a configuration from the standard environment variables
    pub fn from_env() -> ClientResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let access_key = lookup(ENV_ACCESS_KEY).unwrap_or_default();
        let secret_key = lookup(ENV_SECRET_KEY).unwrap_or_default();
        let region = lookup(ENV_REGION)
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let config = Self::new(access_key, secret_key, region);
        config.validate()?;
        Ok(config)
    }

    pub fn with_endpoint(mut self, service: Service, endpoint: impl Into<String>) -> Self {
        self.endpoints.insert(service, endpoint.into());
        self
    }

    /// Endpoint for a service, override first
    pub fn endpoint(&self, service: Service) -> String {
        self.endpoints
            .get(&service)
            .cloned()
            .unwrap_or_else(|| service.default_endpoint(&self.region))
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.access_key.is_empty() {
            return Err(ClientError::config(format!(
                "access key is required (set access_key or {})",
                ENV_ACCESS_KEY
            )));
        }
        if self.secret_key.is_empty() {
            return Err(ClientError::config(format!(
                "secret key is required (set secret_key or {})",
                ENV_SECRET_KEY
            )));
        }
        if self.region.is_empty() {
            return Err(ClientError::config("region must not be empty"));
        }
        for (service, endpoint) in &self.endpoints {
            url::Url::parse(endpoint).map_err(|e| {
                ClientError::config(format!("invalid {} endpoint '{}': {}", service, endpoint, e))
            })?;
        }
        Ok(())
    }
}
