use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::util::helix::{Helix, HelixErr, HelixResult, HelixUser};

pub type ViewerResult<T> = core::result::Result<T, ViewerError>;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to resolve viewer '{login}': {source}")]
    Lookup {
        login: String,
        #[source]
        source: HelixErr,
    },
}

/// A resolved chat identity
#[derive(Debug, Clone, PartialEq)]
pub struct Viewer {
    pub name: String,
    pub id: String,
    pub display_name: String,
    pub profile_image_url: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl From<HelixUser> for Viewer {
    fn from(user: HelixUser) -> Self {
        Self {
            name: user.login,
            id: user.id,
            display_name: user.display_name,
            profile_image_url: user.profile_image_url,
            description: user.description,
            created_at: user.created_at,
        }
    }
}

/// Identity lookup backend
#[async_trait]
pub trait ViewerLookup: Send + Sync {
    async fn lookup(&self, login: &str) -> HelixResult<HelixUser>;
}

#[async_trait]
impl ViewerLookup for Helix {
    async fn lookup(&self, login: &str) -> HelixResult<HelixUser> {
        self.fetch_user(login).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Viewer,
    /// The channel owner; a failed lookup means the credentials need renewing
    Administrator,
}

/// Sent when an administrator lookup fails
#[derive(Debug, Clone, PartialEq)]
pub struct ReauthRequired {
    pub login: String,
    pub reason: String,
}

/// One-shot resolution of a login to a `Viewer`
///
/// `resolve` consumes the resolver, so each instance performs exactly one lookup and yields
/// exactly one outcome.
pub struct ViewerResolver {
    lookup: Arc<dyn ViewerLookup>,
    login: String,
    role: Role,
    reauth: Option<mpsc::UnboundedSender<ReauthRequired>>,
}

impl ViewerResolver {
    pub fn new(lookup: Arc<dyn ViewerLookup>, login: &str) -> Self {
        Self {
            lookup,
            login: login.trim_start_matches('@').to_lowercase(),
            role: Role::Viewer,
            reauth: None,
        }
    }

    /// Marks this lookup as the administrator's; failure is reported on `reauth`
    pub fn administrator(mut self, reauth: mpsc::UnboundedSender<ReauthRequired>) -> Self {
        self.role = Role::Administrator;
        self.reauth = Some(reauth);
        self
    }

    #[instrument(skip(self), fields(login = %self.login, role = ?self.role))]
    pub async fn resolve(self) -> ViewerResult<Viewer> {
        match self.lookup.lookup(&self.login).await {
            Ok(user) => {
                debug!(id = %user.id, "viewer recognized");
                Ok(Viewer::from(user))
            }
            Err(source) => {
                warn!(error = %source, "viewer lookup failed");

                if self.role == Role::Administrator
                    && let Some(reauth) = &self.reauth
                {
                    let signal = ReauthRequired {
                        login: self.login.clone(),
                        reason: source.to_string(),
                    };
                    if reauth.send(signal).is_err() {
                        debug!("no listener for re-authorization requests");
                    }
                }

                Err(ViewerError::Lookup {
                    login: self.login,
                    source,
                })
            }
        }
    }
}
