use chrono::{DateTime, Utc};
use http::header::{AUTHORIZATION, InvalidHeaderValue};
use http::{HeaderMap, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, instrument};

use crate::util::request::{OutboundRequest, RequestError, RequestQueue, Response};

pub const HELIX_URN_USERS: &str = "users";
pub const HELIX_URN_GLOBAL_BADGES: &str = "chat/badges/global";
pub const HELIX_URN_CHANNEL_BADGES: &str = "chat/badges";

#[derive(Debug, Clone, Copy)]
pub enum HelixUri {
    Users,
    GlobalBadges,
    ChannelBadges,
}

impl From<HelixUri> for &'static str {
    fn from(value: HelixUri) -> Self {
        match value {
            HelixUri::Users => HELIX_URN_USERS,
            HelixUri::GlobalBadges => HELIX_URN_GLOBAL_BADGES,
            HelixUri::ChannelBadges => HELIX_URN_CHANNEL_BADGES,
        }
    }
}

/// Typed Helix endpoints; every call goes out through the shared request queue
#[derive(Debug, Clone)]
pub struct Helix {
    base_url: String,
    headers: HeaderMap,
    queue: RequestQueue,
}

impl Helix {
    pub fn new(
        base_url: &str,
        client_id: &str,
        token: &str,
        queue: RequestQueue,
    ) -> HelixResult<Self> {
        let token = token.trim_start_matches("oauth:");

        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))?,
        );
        headers.insert("client-id", HeaderValue::from_str(client_id)?);

        debug!("built AUTHORIZATION headers for Bearer token");

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            headers,
            queue,
        })
    }

    fn uri(&self, uri: HelixUri) -> String {
        format!("{}/{}", self.base_url, <&'static str>::from(uri))
    }

    /// Looks up a single user by login
    #[instrument(skip(self))]
    pub async fn fetch_user(&self, login: &str) -> HelixResult<HelixUser> {
        let request = OutboundRequest::get(&self.uri(HelixUri::Users))
            .query("login", &login.to_lowercase());

        let mut users = self.fetch::<HelixDataResponse<HelixUser>>(request).await?.data;
        if users.is_empty() {
            return Err(HelixErr::UserNotFound(login.to_string()));
        }

        Ok(users.swap_remove(0))
    }

    #[instrument(skip(self))]
    pub async fn fetch_global_badges(&self) -> HelixResult<Vec<HelixBadgeSet>> {
        let request = OutboundRequest::get(&self.uri(HelixUri::GlobalBadges));
        let sets = self.fetch::<HelixDataResponse<HelixBadgeSet>>(request).await?.data;

        debug!(set_count = sets.len(), "fetched global badges");
        Ok(sets)
    }

    #[instrument(skip(self))]
    pub async fn fetch_channel_badges(
        &self,
        broadcaster_id: &str,
    ) -> HelixResult<Vec<HelixBadgeSet>> {
        let request = OutboundRequest::get(&self.uri(HelixUri::ChannelBadges))
            .query("broadcaster_id", broadcaster_id);
        let sets = self.fetch::<HelixDataResponse<HelixBadgeSet>>(request).await?.data;

        debug!(set_count = sets.len(), "fetched channel badges");
        Ok(sets)
    }

    /// Downloads raw bytes (icons, profile images); CDN hosts need no auth headers
    #[instrument(skip(self))]
    pub async fn download(&self, url: &str) -> HelixResult<Vec<u8>> {
        let res = self.queue.send(OutboundRequest::get(url)).await?;
        if !res.is_success() {
            return Err(status_error(&res));
        }

        Ok(res.body)
    }

    async fn fetch<T>(&self, request: OutboundRequest) -> HelixResult<T>
    where
        T: DeserializeOwned,
    {
        let res = self.queue.send(request.headers(&self.headers)).await?;

        if !res.is_success() {
            return Err(status_error(&res));
        }

        if let Some(remaining) = res.header("ratelimit-remaining")
            && let Some(total) = res.header("ratelimit-limit")
        {
            info!(ratelimit_available = remaining, ratelimit_total = total, "rate-limit bucket");
        }

        Ok(res.json::<T>()?)
    }
}

/// Builds a status error, keeping Helix's `message` field when the body carries one
fn status_error(res: &Response) -> HelixErr {
    let message = res
        .json::<Value>()
        .ok()
        .and_then(|body| body["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| res.status.to_string());

    error!(code = %res.status, %message, "non-success response");
    HelixErr::Status {
        status: res.status.as_u16(),
        message,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HelixDataResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HelixUser {
    pub id: String,
    pub login: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HelixBadgeSet {
    pub set_id: String,
    pub versions: Vec<HelixBadgeVersion>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HelixBadgeVersion {
    pub id: String,
    pub image_url_1x: String,
}

pub type HelixResult<T> = core::result::Result<T, HelixErr>;

#[derive(Debug, Error)]
pub enum HelixErr {
    #[error("request error: {0}")]
    Request(#[from] RequestError),

    #[error("while creating a HeaderValue ({0})")]
    HeaderError(#[from] InvalidHeaderValue),

    #[error("helix responded {status}: {message}")]
    Status { status: u16, message: String },

    #[error("no helix user with login '{0}'")]
    UserNotFound(String),
}

impl From<serde_json::Error> for HelixErr {
    fn from(value: serde_json::Error) -> Self {
        HelixErr::Request(RequestError::Decode(value))
    }
}
