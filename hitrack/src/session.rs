//! Session state: the single source of truth for who is logged in.

use crate::auth::{parse_claims_from_jwt, AuthEndpoints, Claims};
use crate::error::{Error, Result};
use crate::storage::{TokenStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::transport::Transport;
use log::{debug, info, warn};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
}

/// An access token present means the caller is authenticated. `user` is only known after a
/// login in this process and may be absent while authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
}

/// Owns the [`Session`] and its persisted copy.
///
/// Construct one per process and share it (behind an `Arc`) with the API client and the
/// navigation guard. The lock is only ever held for whole-value reads and writes, never across
/// a network call.
pub struct TokenStore {
    session: RwLock<Session>,
    storage: Arc<dyn TokenStorage>,
    endpoints: AuthEndpoints,
}

impl TokenStore {
    /// Loads any tokens already persisted in `storage`
    pub fn new(transport: Arc<dyn Transport>, storage: Arc<dyn TokenStorage>) -> Result<Self> {
        let session = Session {
            access_token: storage.get(ACCESS_TOKEN_KEY)?,
            refresh_token: storage.get(REFRESH_TOKEN_KEY)?,
            user: None,
        };
        debug!(
            "loaded session access_token={} refresh_token={}",
            session.access_token.is_some(),
            session.refresh_token.is_some()
        );
        Ok(TokenStore {
            session: RwLock::new(session),
            storage,
            endpoints: AuthEndpoints::new(transport),
        })
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access_token
            .clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh_token
            .clone()
    }

    pub fn user(&self) -> Option<User> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    /// Unverified claims of the current access token
    pub fn claims(&self) -> Result<Claims> {
        let token = self
            .access_token()
            .ok_or_else(|| Error::Jwt("no access token".to_string()))?;
        parse_claims_from_jwt(&token)
    }

    pub fn persisted_access_token(&self) -> Result<Option<String>> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    pub fn persisted_refresh_token(&self) -> Result<Option<String>> {
        self.storage.get(REFRESH_TOKEN_KEY)
    }

    /// Logs in. On failure the existing session is left exactly as it was.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<()> {
        let pair = match self.endpoints.obtain_pair(username, password).await {
            Ok(pair) => pair,
            Err(Error::Api { message, .. }) => return Err(Error::Authentication(message)),
            Err(e) => {
                warn!("login request failed: {}", e);
                return Err(Error::Authentication("Authentication failed".to_string()));
            }
        };
        self.storage.set(ACCESS_TOKEN_KEY, &pair.access)?;
        self.storage.set(REFRESH_TOKEN_KEY, &pair.refresh)?;
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        *session = Session {
            access_token: Some(pair.access),
            refresh_token: Some(pair.refresh),
            user: Some(User {
                id: 0,
                username: username.to_string(),
                email: String::new(),
            }),
        };
        info!("logged in as {}", username);
        Ok(())
    }

    /// Asks the server whether the current access token is still valid. Never mutates state.
    pub async fn verify_current_token(&self) -> bool {
        let token = match self.access_token() {
            Some(t) => t,
            None => return false,
        };
        match self.endpoints.verify(&token).await {
            Ok(()) => true,
            Err(e) => {
                debug!("token verification failed: {}", e);
                false
            }
        }
    }

    /// Swaps the refresh token for a new access token. The refresh token itself is kept as-is.
    /// Any failure clears the whole session.
    pub async fn refresh(&self) -> bool {
        let refresh_token = match self.refresh_token() {
            Some(t) => t,
            None => {
                self.clear_quietly();
                return false;
            }
        };
        match self.endpoints.refresh(&refresh_token).await {
            Ok(access) => match self.accept_refreshed(&access) {
                Ok(()) => true,
                Err(e) => {
                    warn!("couldn't persist refreshed access token: {}", e);
                    self.clear_quietly();
                    false
                }
            },
            Err(e) => {
                warn!("token refresh failed: {}", e);
                self.clear_quietly();
                false
            }
        }
    }

    /// Verifies the access token, falling back to a single refresh
    pub async fn check_auth(&self) -> bool {
        if self.access_token().is_none() {
            self.clear_quietly();
            return false;
        }
        if self.verify_current_token().await {
            return true;
        }
        self.refresh().await
    }

    /// Installs a freshly issued access token, in memory and in storage
    pub fn accept_refreshed(&self, access: &str) -> Result<()> {
        self.storage.set(ACCESS_TOKEN_KEY, access)?;
        let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
        session.access_token = Some(access.to_string());
        Ok(())
    }

    /// Erases both tokens and the user, in memory and in storage
    pub fn clear(&self) -> Result<()> {
        {
            let mut session = self.session.write().unwrap_or_else(PoisonError::into_inner);
            *session = Session::default();
        }
        self.storage.remove(ACCESS_TOKEN_KEY)?;
        self.storage.remove(REFRESH_TOKEN_KEY)?;
        Ok(())
    }

    pub(crate) fn clear_quietly(&self) {
        if let Err(e) = self.clear() {
            warn!("couldn't clear persisted tokens: {}", e);
        }
    }
}
