//! Environment configuration.
//!
//! [`Config`] is read from the environment and split into the typed
//! per-component configs consumed by the clients and the synchronizer.

use std::time::Duration;

use envconfig::Envconfig;

use crate::sync::{SyncConfig, TerminationPolicy};

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "RIDEBANK_DATABASE_PATH", default = "ridebank.db")]
    pub database_path: String,

    #[envconfig(from = "STRAVA_API_BASE_URL", default = "https://www.strava.com/api/v3")]
    pub api_base_url: String,

    #[envconfig(from = "STRAVA_OAUTH_BASE_URL", default = "https://www.strava.com/oauth")]
    pub oauth_base_url: String,

    #[envconfig(from = "STRAVA_CLIENT_ID", default = "")]
    pub client_id: String,

    #[envconfig(from = "STRAVA_CLIENT_SECRET", default = "")]
    pub client_secret: String,

    #[envconfig(
        from = "STRAVA_REDIRECT_URI",
        default = "http://localhost:3000/callback"
    )]
    pub redirect_uri: String,

    #[envconfig(from = "HTTP_TIMEOUT_SECS", default = "30")]
    pub http_timeout_secs: u64,

    // Provider maximum
    #[envconfig(from = "SYNC_PAGE_SIZE", default = "200")]
    pub page_size: u32,

    #[envconfig(from = "SYNC_ACTIVITY_TYPE", default = "Ride")]
    pub activity_type: String,

    // false keeps the historical behaviour of stopping at the first page
    // without qualifying activities
    #[envconfig(from = "SYNC_SKIP_UNQUALIFIED_PAGES", default = "false")]
    pub skip_unqualified_pages: bool,
}

/// Activity feed client settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub api_base_url: String,
    pub timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.strava.com/api/v3".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// OAuth authorization-code flow settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub timeout: Duration,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.strava.com/oauth".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig {
            api_base_url: self.api_base_url.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig {
            base_url: self.oauth_base_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            redirect_uri: self.redirect_uri.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
        }
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            per_page: self.page_size,
            activity_type: self.activity_type.clone(),
            termination: if self.skip_unqualified_pages {
                TerminationPolicy::SkipUnqualifiedPages
            } else {
                TerminationPolicy::StopOnUnqualifiedPage
            },
        }
    }
}
