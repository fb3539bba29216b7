//! HTTP clients for the Strava API.
//!
//! - [`StravaClient`] reads the paged athlete activity list with a bearer token
//! - [`OAuthClient`] builds the authorization URL and exchanges the callback
//!   code for an access token
//!
//! Neither client retries. A failed request surfaces as a single error and the
//! caller decides whether to run again.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::DateTime;
use log::{debug, info, warn};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::auth::{AccessToken, TokenState};
use crate::config::{FeedConfig, OAuthConfig};
use crate::error::{RideError, Result};
use crate::feed::ActivityFeed;
use crate::RemoteActivity;

const OAUTH_SCOPE: &str = "read,activity:read,read_all";

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(timeout)
        .build()
        .map_err(|e| RideError::Config {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

// ============================================================================
// Activity Feed
// ============================================================================

/// Activity feed client for `GET {api_base}/athlete/activities`.
pub struct StravaClient {
    client: Client,
    activities_url: String,
}

impl StravaClient {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout)?,
            activities_url: format!(
                "{}/athlete/activities",
                config.api_base_url.trim_end_matches('/')
            ),
        })
    }
}

#[async_trait]
impl ActivityFeed for StravaClient {
    async fn fetch_page(
        &self,
        page: u32,
        per_page: u32,
        token: &AccessToken,
    ) -> Result<Vec<RemoteActivity>> {
        let req_start = Instant::now();

        // Phase 1: Send request, receive headers
        let resp = self
            .client
            .get(&self.activities_url)
            .bearer_auth(token.secret())
            .query(&[("per_page", per_page), ("page", page)])
            .send()
            .await
            .map_err(|e| RideError::fetch(Some(page), None, format!("Request error: {}", e)))?;

        let headers_elapsed = req_start.elapsed();
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!("[StravaClient] Page {} rejected with 401", page);
            return Err(RideError::unauthenticated(
                "access token rejected by provider",
            ));
        }
        if !status.is_success() {
            warn!("[StravaClient] Page {} failed: HTTP {}", page, status);
            return Err(RideError::fetch(
                Some(page),
                Some(status.as_u16()),
                format!("HTTP {}", status),
            ));
        }

        // Phase 2: Download response body
        let bytes = resp.bytes().await.map_err(|e| {
            RideError::fetch(Some(page), None, format!("Body download error: {}", e))
        })?;

        // Phase 3: JSON deserialization
        let activities: Vec<RemoteActivity> = serde_json::from_slice(&bytes).map_err(|e| {
            RideError::fetch(Some(page), None, format!("JSON parse error: {}", e))
        })?;

        debug!(
            "[StravaClient] Page {}: {} activities, headers={:?} total={:?} ({:.1}KB)",
            page,
            activities.len(),
            headers_elapsed,
            req_start.elapsed(),
            bytes.len() as f64 / 1024.0
        );

        Ok(activities)
    }
}

// ============================================================================
// OAuth
// ============================================================================

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    grant_type: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Unix timestamp (seconds)
    #[serde(default)]
    expires_at: Option<i64>,
}

/// Authorization-code flow against `{oauth_base}/authorize` and `{oauth_base}/token`.
pub struct OAuthClient {
    client: Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self> {
        if config.client_id.is_empty() {
            return Err(RideError::Config {
                message: "OAuth client_id is not set".to_string(),
            });
        }
        Ok(Self {
            client: build_client(config.timeout)?,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// URL the user is redirected to in order to grant access.
    pub fn authorize_url(&self) -> Result<Url> {
        Url::parse_with_params(
            &self.endpoint("authorize"),
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", OAUTH_SCOPE),
            ],
        )
        .map_err(|e| RideError::Config {
            message: format!("Invalid OAuth base URL: {}", e),
        })
    }

    /// Exchange the authorization code from the callback for a token.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenState> {
        if code.trim().is_empty() {
            return Err(RideError::unauthenticated("no authorization code received"));
        }

        let resp = self
            .client
            .post(self.endpoint("token"))
            .json(&TokenRequest {
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                code,
                grant_type: "authorization_code",
            })
            .send()
            .await
            .map_err(|e| RideError::fetch(None, None, format!("Token request error: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("[OAuthClient] Token exchange failed: HTTP {}", status);
            return Err(RideError::unauthenticated(format!(
                "token exchange rejected (HTTP {})",
                status.as_u16()
            )));
        }

        let body: TokenResponse = resp.json().await.map_err(|e| {
            RideError::fetch(None, Some(status.as_u16()), format!("JSON parse error: {}", e))
        })?;

        info!("[OAuthClient] Access token obtained");
        Ok(TokenState::Authorized {
            token: AccessToken::new(body.access_token),
            expires_at: body
                .expires_at
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        })
    }
}
