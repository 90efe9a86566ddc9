//! AWS Signature Version 4 for SageMaker Runtime requests.

use crate::credentials::AwsCredentials;
use crate::error::CredentialsError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use url::Url;

const AWS_ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SAGEMAKER_SIGNING_NAME: &str = "sagemaker";

#[derive(Debug, Clone)]
pub struct RequestSigner {
    region: String,
    service: String,
}

impl RequestSigner {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn sagemaker(region: impl Into<String>) -> Self {
        Self::new(region, SAGEMAKER_SIGNING_NAME)
    }

    /// Sign a request and return the headers that must be added to it.
    ///
    /// `headers` are the caller's own headers; they are all covered by the
    /// signature together with `host`, `x-amz-date` and `x-amz-content-sha256`.
    pub fn sign(
        &self,
        credentials: &AwsCredentials,
        method: &str,
        url: &Url,
        headers: &[(String, String)],
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, CredentialsError> {
        let payload_hash = sha256_hex(body);
        let amz_date = format_datetime(&timestamp);

        let mut signing_headers = vec![
            ("host".to_string(), host_header(url)),
            ("x-amz-date".to_string(), amz_date.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ];
        for (name, value) in headers {
            let lower = name.to_lowercase();
            if lower != "host" && lower != "x-amz-date" && lower != "x-amz-content-sha256" {
                signing_headers.push((lower, value.clone()));
            }
        }

        let authorization = sign_request(
            method,
            url.path(),
            &signing_headers,
            &payload_hash,
            credentials,
            &self.region,
            &self.service,
            &timestamp,
        )?;

        let mut added = vec![
            ("x-amz-date".to_string(), amz_date),
            ("x-amz-content-sha256".to_string(), payload_hash),
            ("authorization".to_string(), authorization),
        ];
        if let Some(token) = credentials.session_token() {
            added.push(("x-amz-security-token".to_string(), token.to_string()));
        }
        Ok(added)
    }
}

fn host_header(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn format_date_stamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d").to_string()
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CredentialsError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|e| CredentialsError::Invalid {
        message: format!("signing key rejected: {}", e),
    })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn derive_signing_key(
    secret_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, CredentialsError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn build_signed_headers(headers: &[(String, String)]) -> String {
    let mut names: Vec<String> = headers.iter().map(|(n, _)| n.to_lowercase()).collect();
    names.sort();
    names.join(";")
}

fn build_canonical_headers(headers: &[(String, String)]) -> String {
    let mut sorted: Vec<(String, String)> = headers
        .iter()
        .map(|(n, v)| (n.to_lowercase(), v.trim().to_string()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    sorted.iter().map(|(n, v)| format!("{}:{}\n", n, v)).collect()
}

fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => result.push('/'),
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

fn build_canonical_request(
    method: &str,
    path: &str,
    headers: &[(String, String)],
    payload_hash: &str,
) -> String {
    let canonical_path = if path.is_empty() { "/" } else { path };

    // `path` comes already percent-encoded from `Url`; encoding it again
    // yields the double encoding SigV4 expects for non-S3 services. The
    // query line stays empty: invocation URLs never carry a query string.
    format!(
        "{}\n{}\n\n{}\n{}\n{}",
        method,
        uri_encode(canonical_path, false),
        build_canonical_headers(headers),
        build_signed_headers(headers),
        payload_hash
    )
}

#[allow(clippy::too_many_arguments)]
fn sign_request(
    method: &str,
    path: &str,
    headers: &[(String, String)],
    payload_hash: &str,
    credentials: &AwsCredentials,
    region: &str,
    service: &str,
    timestamp: &DateTime<Utc>,
) -> Result<String, CredentialsError> {
    let date_stamp = format_date_stamp(timestamp);
    let amz_date = format_datetime(timestamp);

    let canonical_request = build_canonical_request(method, path, headers, payload_hash);
    let credential_scope = format!("{}/{}/{}/aws4_request", date_stamp, region, service);

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        AWS_ALGORITHM,
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(credentials.secret_access_key(), &date_stamp, region, service)?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{} Credential={}/{}, SignedHeaders={}, Signature={}",
        AWS_ALGORITHM,
        credentials.access_key_id(),
        credential_scope,
        build_signed_headers(headers),
        signature
    ))
}
