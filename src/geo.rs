//! Best-effort login region lookup.
//!
//! Callers treat every failure as "region unknown"; nothing here may fail a
//! login.

use async_trait::async_trait;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("geolocation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("geolocation response has no country code")]
    MissingCountry,
}

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// Resolve an IP address to an ISO country code.
    async fn locate(&self, ip: IpAddr) -> Result<String, GeoError>;
}

/// Looks up `GET {endpoint}/{ip}` and reads `isoCountryCode` from the JSON body.
pub struct HttpGeoLocator {
    endpoint: Url,
    http: reqwest::Client,
}

impl HttpGeoLocator {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, GeoError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, http })
    }

    fn lookup_url(&self, ip: IpAddr) -> String {
        format!("{}/{}", self.endpoint.as_str().trim_end_matches('/'), ip)
    }
}

#[async_trait]
impl GeoLocator for HttpGeoLocator {
    async fn locate(&self, ip: IpAddr) -> Result<String, GeoError> {
        let body: serde_json::Value = self
            .http
            .get(self.lookup_url(ip))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.get("isoCountryCode")
            .and_then(|v| v.as_str())
            .filter(|code| !code.is_empty())
            .map(str::to_string)
            .ok_or(GeoError::MissingCountry)
    }
}
