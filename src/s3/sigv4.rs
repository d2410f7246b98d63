//! AWS Signature Version 4 query-string presigning
//!
//! Produces URLs that authorize a single request (method + key + signed
//! headers) until `X-Amz-Date + X-Amz-Expires`. The payload is not signed
//! (`UNSIGNED-PAYLOAD`), so the client streams the body straight to storage.

use super::Credentials;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha2::{Digest, Sha256};

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";
const SERVICE: &str = "s3";

/// RFC 3986 unreserved characters stay literal, everything else is escaped
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Same as [`QUERY_ENCODE`] but keeps `/` so key prefixes stay path segments
const PATH_ENCODE: &AsciiSet = &QUERY_ENCODE.remove(b'/');

type HmacSha256 = Hmac<Sha256>;

/// One request to presign
#[derive(Debug)]
pub struct PresignRequest<'a> {
    pub method: &'a str,
    /// `scheme://authority` the final URL is rooted at
    pub base_url: &'a str,
    /// Value of the `host` header as the store will see it
    pub host: &'a str,
    /// Already-encoded absolute path, e.g. `/bucket/key`
    pub canonical_uri: &'a str,
    /// Additional headers the client must send verbatim
    pub headers: &'a [(&'a str, &'a str)],
    pub region: &'a str,
    pub expires_in: u64,
    pub now: DateTime<Utc>,
}

/// Percent-encode an object key for use as a URI path
pub fn encode_path(key: &str) -> String {
    utf8_percent_encode(key, PATH_ENCODE).to_string()
}

fn encode_query(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE).to_string()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")
fn signing_key(secret_key: &str, date: &str, region: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{}", secret_key).as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, SERVICE.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Build a presigned URL for `request`
pub fn presign(credentials: &Credentials, request: &PresignRequest<'_>) -> String {
    let amz_date = request.now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.now.format("%Y%m%d").to_string();
    let scope = format!("{}/{}/{}/aws4_request", date, request.region, SERVICE);

    let mut headers: Vec<(String, String)> = request
        .headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    headers.push(("host".to_string(), request.host.to_string()));
    headers.sort();

    let signed_headers = headers
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value))
        .collect();

    let mut query = vec![
        ("X-Amz-Algorithm".to_string(), ALGORITHM.to_string()),
        (
            "X-Amz-Credential".to_string(),
            format!("{}/{}", credentials.access_key_id(), scope),
        ),
        ("X-Amz-Date".to_string(), amz_date.clone()),
        ("X-Amz-Expires".to_string(), request.expires_in.to_string()),
        ("X-Amz-SignedHeaders".to_string(), signed_headers.clone()),
    ];
    if let Some(token) = credentials.session_token() {
        query.push(("X-Amz-Security-Token".to_string(), token.to_string()));
    }
    query.sort();

    let canonical_query = query
        .iter()
        .map(|(name, value)| format!("{}={}", encode_query(name), encode_query(value)))
        .collect::<Vec<_>>()
        .join("&");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        request.canonical_uri,
        canonical_query,
        canonical_headers,
        signed_headers,
        UNSIGNED_PAYLOAD
    );

    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(credentials.secret_access_key(), &date, request.region);
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    format!(
        "{}{}?{}&X-Amz-Signature={}",
        request.base_url, request.canonical_uri, canonical_query, signature
    )
}
