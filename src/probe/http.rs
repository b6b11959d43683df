//! HTTP(S) probe implementation.

use chrono::{DateTime, Utc};
use std::time::Duration;

use super::ProbeError;

/// What a completed HTTP exchange tells us.
#[derive(Debug, Clone)]
pub struct HttpOutcome {
    pub status_code: u16,
    /// `NotAfter` of the leaf certificate, when the connection was TLS.
    pub cert_expiry: Option<DateTime<Utc>>,
}

/// Build the client shared by every worker.
pub fn build_probe_client(timeout: Duration) -> Result<reqwest::Client, ProbeError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30))
        .tls_info(true)
        .build()
        .map_err(|e| ProbeError::Config(e.to_string()))
}

/// Issue a GET against `url` and drain the body.
pub async fn run_http_probe(client: &reqwest::Client, url: &str) -> Result<HttpOutcome, ProbeError> {
    let response = client.get(url).send().await.map_err(classify_error)?;

    let status_code = response.status().as_u16();
    let cert_expiry = peer_cert_expiry(&response);

    // Read the full body to measure complete transfer time
    if let Err(e) = response.bytes().await {
        tracing::debug!("Body read failed for {}: {}", url, e);
    }

    Ok(HttpOutcome {
        status_code,
        cert_expiry,
    })
}

fn classify_error(e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout(e.to_string())
    } else {
        ProbeError::Network(e.to_string())
    }
}

fn peer_cert_expiry(response: &reqwest::Response) -> Option<DateTime<Utc>> {
    let info = response.extensions().get::<reqwest::tls::TlsInfo>()?;
    cert_not_after(info.peer_certificate()?)
}

/// Extract `NotAfter` from a DER-encoded certificate.
pub fn cert_not_after(der: &[u8]) -> Option<DateTime<Utc>> {
    let (_, cert) = x509_parser::parse_x509_certificate(der).ok()?;
    DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
}
