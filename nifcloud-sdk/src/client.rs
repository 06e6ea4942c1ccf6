//! HTTP client for the NIFCLOUD APIs

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

use crate::config::{ClientConfig, Service};
use crate::error::{ClientError, ClientResult};
use crate::json::str_at;
use crate::params::Params;
use crate::signer;
use crate::xml;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const XML_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Calls against the NIFCLOUD APIs
///
/// Responses are returned as decoded JSON (see `xml::to_json`). Resource
/// code depends on this trait only, so tests can substitute a fake.
#[async_trait]
pub trait Api: Send + Sync {
    /// Call a query API action (Computing, RDB)
    async fn query(&self, service: Service, action: &str, params: &Params) -> ClientResult<Value>;

    /// Call a REST API path (DNS), relative to the service endpoint
    async fn rest(
        &self,
        service: Service,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> ClientResult<Value>;
}

/// reqwest based `Api` implementation
pub struct NifcloudClient {
    http: reqwest::Client,
    config: ClientConfig,
}

impl NifcloudClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("terraform-provider-nifcloud/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[async_trait]
impl Api for NifcloudClient {
    async fn query(&self, service: Service, action: &str, params: &Params) -> ClientResult<Value> {
        let url = self.config.endpoint(service);
        let body = params.encode(action, service.version());
        log::debug!("{} {}", service, action);

        let signed = signer::sign_v4(
            &self.config.access_key,
            &self.config.secret_key,
            &self.config.region,
            service.signing_name(),
            &url,
            &[("content-type", FORM_CONTENT_TYPE)],
            body.as_bytes(),
            SystemTime::now(),
        )?;

        let mut request = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(body);
        for (name, value) in signed {
            request = request.header(name, value);
        }

        let response = request.send().await?;
        decode(response, action).await
    }

    async fn rest(
        &self,
        service: Service,
        method: Method,
        path: &str,
        body: Option<String>,
    ) -> ClientResult<Value> {
        let url = format!(
            "{}/{}",
            self.config.endpoint(service).trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        log::debug!("{} {} {}", service, method, path);

        let mut request = self.http.request(method, &url);
        for (name, value) in
            signer::nifty3_headers(&self.config.access_key, &self.config.secret_key, Utc::now())?
        {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, XML_CONTENT_TYPE).body(body);
        }

        let response = request.send().await?;
        decode(response, path).await
    }
}

async fn decode(response: reqwest::Response, operation: &str) -> ClientResult<Value> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        return xml::to_json(&text);
    }

    let err = parse_error(status.as_u16(), &text);
    log::debug!("{} failed: {}", operation, err);
    Err(err)
}

/// Build an API error from an error response body
///
/// Query APIs answer `<Response><Errors><Error>`, RDB and DNS answer
/// `<ErrorResponse><Error>`.
pub fn parse_error(status: u16, body: &str) -> ClientError {
    let Ok(doc) = xml::to_json(body) else {
        return ClientError::api(status, format!("HTTP{}", status), body.trim());
    };

    let error = ["Errors.Error", "Error"]
        .iter()
        .find_map(|path| crate::json::at(&doc, path).filter(|v| v.is_object()));

    match error {
        Some(error) => ClientError::api(
            status,
            str_at(error, "Code").unwrap_or("Unknown"),
            str_at(error, "Message").unwrap_or_default(),
        ),
        None => ClientError::api(status, format!("HTTP{}", status), body.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_computing_error() {
        let body = r#"<Response>
  <Errors><Error><Code>Client.InvalidParameterNotFound.Instance</Code><Message>The instance 'web001' does not exist.</Message></Error></Errors>
  <RequestID>req-1</RequestID>
</Response>"#;

        let err = parse_error(400, body);
        assert_eq!(err.code(), Some("Client.InvalidParameterNotFound.Instance"));
        assert!(err.is_not_found());
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn parse_rdb_error() {
        let body = r#"<ErrorResponse>
  <Error><Type>Sender</Type><Code>DBInstanceNotFound</Code><Message>DBInstance db01 not found.</Message></Error>
  <RequestId>req-2</RequestId>
</ErrorResponse>"#;

        let err = parse_error(404, body);
        assert_eq!(err.code(), Some("DBInstanceNotFound"));
        assert!(err.is_not_found());
    }

    #[test]
    fn non_xml_error_keeps_status() {
        let err = parse_error(503, "Service Unavailable");
        assert_eq!(err.code(), Some("HTTP503"));
        assert!(matches!(err, ClientError::Api { status: 503, .. }));
    }

    #[test]
    fn client_rejects_invalid_config() {
        assert!(NifcloudClient::new(ClientConfig::new("", "sk", "jp-east-1")).is_err());
        assert!(NifcloudClient::new(ClientConfig::new("ak", "sk", "jp-east-1")).is_ok());
    }
}
