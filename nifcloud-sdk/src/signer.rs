//! Request signing
//!
//! The Computing and RDB query APIs accept AWS Signature Version 4. The DNS
//! REST API uses NIFTY3-HTTPS: an HMAC-SHA256 of the request date.

use std::time::SystemTime;

use aws_credential_types::Credentials;
use aws_sigv4::http_request::{
    SignableBody, SignableRequest, SigningParams, SigningSettings, sign,
};
use aws_sigv4::sign::v4;
use aws_smithy_runtime_api::client::identity::Identity;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ClientError, ClientResult};

pub const NIFTY_DATE_HEADER: &str = "x-nifty-date";
pub const NIFTY_AUTHORIZATION_HEADER: &str = "X-Nifty-Authorization";

/// Headers to add to a SigV4 signed POST request
#[allow(clippy::too_many_arguments)]
pub fn sign_v4(
    access_key: &str,
    secret_key: &str,
    region: &str,
    service_name: &str,
    url: &str,
    headers: &[(&str, &str)],
    body: &[u8],
    time: SystemTime,
) -> ClientResult<Vec<(String, String)>> {
    let identity: Identity =
        Credentials::new(access_key, secret_key, None, None, "nifcloud").into();

    let v4_params = v4::SigningParams::builder()
        .identity(&identity)
        .region(region)
        .name(service_name)
        .time(time)
        .settings(SigningSettings::default())
        .build()
        .map_err(|e| ClientError::Signing(e.to_string()))?;
    let params: SigningParams<'_> = v4_params.into();

    let request = SignableRequest::new(
        "POST",
        url,
        headers.iter().copied(),
        SignableBody::Bytes(body),
    )
    .map_err(|e| ClientError::Signing(e.to_string()))?;

    let (instructions, _signature) = sign(request, &params)
        .map_err(|e| ClientError::Signing(e.to_string()))?
        .into_parts();

    Ok(instructions
        .headers()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect())
}

/// Headers authenticating a DNS API request made at `date`
pub fn nifty3_headers(
    access_key: &str,
    secret_key: &str,
    date: DateTime<Utc>,
) -> ClientResult<Vec<(String, String)>> {
    let date = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let signature = hmac_sha256_base64(secret_key, &date)?;

    Ok(vec![
        (NIFTY_DATE_HEADER.to_string(), date),
        (
            NIFTY_AUTHORIZATION_HEADER.to_string(),
            format!(
                "NIFTY3-HTTPS NiftyAccessKeyId={},Algorithm=HmacSHA256,Signature={}",
                access_key, signature
            ),
        ),
    ])
}

fn hmac_sha256_base64(key: &str, message: &str) -> ClientResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| ClientError::Signing(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn hmac_known_vector() {
        assert_eq!(
            hmac_sha256_base64("key", "The quick brown fox jumps over the lazy dog").unwrap(),
            "97yD9DBThCSxMpjmqm+xQ+9NWaFJRhdZl0edvC0aPNg="
        );
    }

    #[test]
    fn nifty3_header_layout() {
        let date = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let headers = nifty3_headers("AKID", "SECRET", date).unwrap();

        assert_eq!(
            headers[0],
            (NIFTY_DATE_HEADER.to_string(), "Tue, 02 Jan 2024 03:04:05 GMT".to_string())
        );
        assert_eq!(headers[1].0, NIFTY_AUTHORIZATION_HEADER);
        assert!(headers[1].1.starts_with(
            "NIFTY3-HTTPS NiftyAccessKeyId=AKID,Algorithm=HmacSHA256,Signature="
        ));
    }

    #[test]
    fn sigv4_scope_uses_region_and_service() {
        // 2024-01-02T00:00:00Z
        let time = SystemTime::UNIX_EPOCH + Duration::from_secs(1_704_153_600);
        let headers = sign_v4(
            "AKID",
            "SECRET",
            "jp-east-1",
            "computing",
            "https://jp-east-1.computing.api.nifcloud.com/api/",
            &[("content-type", "application/x-www-form-urlencoded; charset=utf-8")],
            b"Action=DescribeInstances&Version=3.0",
            time,
        )
        .unwrap();

        let authorization = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.as_str())
            .unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKID/20240102/jp-east-1/computing/aws4_request"
        ));
        assert!(
            headers
                .iter()
                .any(|(name, value)| name == "x-amz-date" && value == "20240102T000000Z")
        );
    }
}
