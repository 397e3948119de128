//! HTTP client for the vendor realtime passage API.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::RealtimeError;

/// vendor statuses worth retrying; everything else fails the station
const RETRIABLE_STATUSES: [u16; 3] = [500, 503, 504];

/// total time allowed for one station, retries included
pub const DEFAULT_RETRY_TIMEOUT_SECS: u64 = 20;

/// credentials and endpoint for the vendor passage API
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub core_url: String,
    pub user: String,
    pub password: String,
}

pub struct ApiClient {
    http: reqwest::Client,
    credentials: ApiCredentials,
    retry_timeout: Duration,
}

impl ApiClient {
    pub fn new(credentials: ApiCredentials) -> Result<ApiClient, RealtimeError> {
        ApiClient::with_retry_timeout(
            credentials,
            Duration::from_secs(DEFAULT_RETRY_TIMEOUT_SECS),
        )
    }

    pub fn with_retry_timeout(
        credentials: ApiCredentials,
        retry_timeout: Duration,
    ) -> Result<ApiClient, RealtimeError> {
        if credentials.core_url.is_empty() {
            return Err(RealtimeError::Configuration(String::from(
                "vendor API base url is empty",
            )));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RealtimeError::Http(format!("failure building http client: {e}")))?;
        Ok(ApiClient {
            http,
            credentials,
            retry_timeout,
        })
    }

    pub fn departures_url(&self, station: &str) -> String {
        format!(
            "{}/gare/{}/depart",
            self.credentials.core_url.trim_end_matches('/'),
            station
        )
    }

    /// fetches the departures board for one station (8-digit code).
    ///
    /// 500/503/504 responses are retried with sleeps of 0.5 * 1.5^(k-1)
    /// seconds while the retry timeout allows; other non-2xx statuses and
    /// transport errors fail immediately.
    pub async fn request_station(&self, station: &str) -> Result<String, RealtimeError> {
        let url = self.departures_url(station);
        let first_request = Instant::now();
        let mut retry_counter: u32 = 0;

        loop {
            if first_request.elapsed() > self.retry_timeout {
                return Err(RealtimeError::RetryTimeout(
                    self.retry_timeout.as_secs(),
                    station.to_string(),
                ));
            }
            if retry_counter > 0 {
                tokio::time::sleep(retry_delay(retry_counter)).await;
            }

            let response = self
                .http
                .get(&url)
                .basic_auth(&self.credentials.user, Some(&self.credentials.password))
                .send()
                .await
                .map_err(|e| RealtimeError::Http(format!("GET {url}: {e}")))?;

            let status = response.status().as_u16();
            if RETRIABLE_STATUSES.contains(&status) {
                retry_counter += 1;
                log::debug!("station {station} returned {status}, retry {retry_counter}");
                continue;
            }
            if !response.status().is_success() {
                return Err(RealtimeError::Http(format!(
                    "GET {url} returned status {status}"
                )));
            }
            return response
                .text()
                .await
                .map_err(|e| RealtimeError::Http(format!("reading body of {url}: {e}")));
        }
    }
}

/// sleep before retry k (k >= 1): 0.5 * 1.5^(k-1) seconds
fn retry_delay(retry_counter: u32) -> Duration {
    let secs = 0.5 * 1.5f64.powi(retry_counter as i32 - 1);
    Duration::from_secs_f64(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_geometrically() {
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(750));
        assert_eq!(retry_delay(3), Duration::from_millis(1125));
    }

    #[test]
    fn test_departures_url() {
        let client = ApiClient::new(ApiCredentials {
            core_url: "http://vendor.example.com/".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
        })
        .unwrap();
        assert_eq!(
            client.departures_url("87393009"),
            "http://vendor.example.com/gare/87393009/depart"
        );
    }

    #[test]
    fn test_empty_base_url_is_rejected() {
        let result = ApiClient::new(ApiCredentials {
            core_url: String::new(),
            user: "u".to_string(),
            password: "p".to_string(),
        });
        assert!(result.is_err());
    }
}
