//! Authenticated requests against the Garmin Connect API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::client::tokens::OAuth2Token;
use crate::collect::StatsSource;
use crate::error::{LedgerError, Result};

/// User agent for Connect API requests
const API_USER_AGENT: &str = "GCM-iOS-5.7.2.1";

/// Path of the profile lookup used to resolve the display name.
const SOCIAL_PROFILE_PATH: &str = "/userprofile-service/socialProfile";

/// Bearer-authenticated HTTP access to one Connect API host.
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Client for the given Garmin domain.
    pub fn new(domain: &str) -> Result<Self> {
        Self::with_base_url(&format!("https://connectapi.{}", domain))
    }

    /// Client against an explicit base URL (for testing).
    #[doc(hidden)]
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(LedgerError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Authenticated GET returning the raw response.
    pub async fn get(&self, token: &OAuth2Token, path: &str) -> Result<Response> {
        let response = self
            .client
            .get(self.build_url(path))
            .header(USER_AGENT, API_USER_AGENT)
            .header(AUTHORIZATION, token.authorization_header())
            .send()
            .await
            .map_err(LedgerError::Http)?;

        check_status(path, response).await
    }

    /// Authenticated GET deserializing the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        token: &OAuth2Token,
        path: &str,
    ) -> Result<T> {
        let response = self.get(token, path).await?;
        response.json().await.map_err(|e| {
            LedgerError::invalid_response(format!("Failed to parse JSON response: {}", e))
        })
    }
}

/// Map error statuses onto the crate error taxonomy.
async fn check_status(path: &str, response: Response) -> Result<Response> {
    let status = response.status();
    match status {
        _ if status.is_success() => Ok(response),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LedgerError::NotAuthenticated),
        StatusCode::TOO_MANY_REQUESTS => Err(LedgerError::RateLimited),
        StatusCode::NOT_FOUND => Err(LedgerError::NotFound(path.to_string())),
        _ => {
            let message = response.text().await.unwrap_or_default();
            Err(LedgerError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Fetch the signed-in account's display name, the user key in the
/// wellness endpoint paths. Also serves as the session validity probe.
pub async fn fetch_display_name(client: &ApiClient, token: &OAuth2Token) -> Result<String> {
    let profile: Value = client.get_json(token, SOCIAL_PROFILE_PATH).await?;
    profile
        .get("displayName")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| LedgerError::invalid_response("Profile response missing displayName"))
}

/// An authenticated session bound to one account.
pub struct ApiSession {
    client: ApiClient,
    token: OAuth2Token,
    display_name: String,
}

impl ApiSession {
    pub fn new(client: ApiClient, token: OAuth2Token, display_name: String) -> Self {
        Self {
            client,
            token,
            display_name,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

#[async_trait]
impl StatsSource for ApiSession {
    async fn daily_stats(&self, date: NaiveDate) -> Result<Value> {
        let path = format!(
            "/usersummary-service/usersummary/daily/{}?calendarDate={}",
            self.display_name,
            date.format("%Y-%m-%d"),
        );
        self.client.get_json(&self.token, &path).await
    }

    async fn sleep_data(&self, date: NaiveDate) -> Result<Value> {
        let path = format!(
            "/wellness-service/wellness/dailySleepData/{}?date={}&nonSleepBufferMinutes=60",
            self.display_name,
            date.format("%Y-%m-%d"),
        );
        self.client.get_json(&self.token, &path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url() {
        let client = ApiClient::new("garmin.com").unwrap();
        assert_eq!(
            client.build_url("/usersummary-service/usersummary/daily/u?calendarDate=2024-01-01"),
            "https://connectapi.garmin.com/usersummary-service/usersummary/daily/u?calendarDate=2024-01-01"
        );
    }

    #[test]
    fn test_new_targets_connect_api_host() {
        let client = ApiClient::new("garmin.com").unwrap();
        assert_eq!(client.base_url, "https://connectapi.garmin.com");
    }

    #[test]
    fn test_with_base_url_is_verbatim() {
        let client = ApiClient::with_base_url("http://127.0.0.1:9999").unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9999");
    }
}
