// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! AWS Signature Version 4 request signing.

use sha2::{Digest, Sha256};
use std::fmt;

/// AWS credentials
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &crate::config::mask(&self.access_key_id))
            .field(
                "secret_access_key",
                &crate::config::mask(&self.secret_access_key),
            )
            .field(
                "session_token",
                &self.session_token.as_deref().map(crate::config::mask),
            )
            .finish()
    }
}

/// Hex-encode bytes
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// HMAC-SHA256 (RFC 2104)
fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    const BLOCK: usize = 64;

    let mut key_block = [0u8; BLOCK];
    if key.len() > BLOCK {
        key_block[..32].copy_from_slice(&sha256(key));
    } else {
        key_block[..key.len()].copy_from_slice(key);
    }

    let mut inner = Sha256::new();
    inner.update(key_block.map(|b| b ^ 0x36));
    inner.update(data);
    let inner = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(key_block.map(|b| b ^ 0x5c));
    outer.update(inner);
    outer.finalize().into()
}

/// URI-encode a string per AWS rules (RFC 3986 with / not encoded in paths)
fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut result = String::with_capacity(input.len() * 2);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            b'/' if !encode_slash => {
                result.push('/');
            }
            _ => {
                result.push('%');
                result.push_str(&format!("{:02X}", byte));
            }
        }
    }
    result
}

fn canonical_request(
    method: &str,
    path: &str,
    query_string: &str,
    headers: &[(String, String)],
    signed_headers: &str,
    payload_hash: &str,
) -> String {
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name.to_lowercase(), value.trim()))
        .collect();

    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        uri_encode(path, false),
        query_string,
        canonical_headers,
        signed_headers,
        payload_hash,
    )
}

fn string_to_sign(scope: &str, datetime: &str, canonical_request_hash: &str) -> String {
    format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        datetime, scope, canonical_request_hash
    )
}

/// Derive the signing key: HMAC chain
fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> [u8; 32] {
    let k_secret = format!("AWS4{}", secret);
    let k_date = hmac_sha256(k_secret.as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// What is being signed, and where it goes.
#[derive(Debug, Clone, Copy)]
pub struct SigningScope<'a> {
    pub region: &'a str,
    pub service: &'a str,
    /// `YYYYMMDDTHHMMSSZ`
    pub datetime: &'a str,
}

impl SigningScope<'_> {
    fn date(&self) -> &str {
        self.datetime.get(..8).unwrap_or(self.datetime)
    }

    fn credential_scope(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date(),
            self.region,
            self.service
        )
    }
}

/// Sign a request and return the `Authorization` header value.
///
/// `headers` must contain `host`; `x-amz-date`, `x-amz-content-sha256` and
/// (with temporary credentials) `x-amz-security-token` are added when absent.
/// On return `headers` is sorted and holds every header that was signed.
pub fn sign_request(
    credentials: &AwsCredentials,
    method: &str,
    path: &str,
    query_string: &str,
    headers: &mut Vec<(String, String)>,
    body: &[u8],
    scope: SigningScope<'_>,
) -> String {
    let payload_hash = hex_encode(&sha256(body));

    let mut ensure = |name: &str, value: &str| {
        if !headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(name)) {
            headers.push((name.to_string(), value.to_string()));
        }
    };
    ensure("x-amz-content-sha256", &payload_hash);
    ensure("x-amz-date", scope.datetime);
    if let Some(token) = &credentials.session_token {
        ensure("x-amz-security-token", token);
    }

    headers.sort_by_key(|(k, _)| k.to_lowercase());

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.to_lowercase())
        .collect::<Vec<_>>()
        .join(";");

    let creq = canonical_request(
        method,
        path,
        query_string,
        headers,
        &signed_headers,
        &payload_hash,
    );
    let creq_hash = hex_encode(&sha256(creq.as_bytes()));

    let credential_scope = scope.credential_scope();
    let sts = string_to_sign(&credential_scope, scope.datetime, &creq_hash);

    let key = signing_key(
        &credentials.secret_access_key,
        scope.date(),
        scope.region,
        scope.service,
    );
    let signature = hex_encode(&hmac_sha256(&key, sts.as_bytes()));

    format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, credential_scope, signed_headers, signature
    )
}
