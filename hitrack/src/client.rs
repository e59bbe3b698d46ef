//! Authenticated access to the HITrack REST API.
//!
//! Every request gets the current access token attached as a bearer credential. A 401 on a
//! request that has not been retried yet triggers one refresh (using the refresh token found in
//! persisted storage) and one replay of the request with the new token. Anything else, including
//! a 401 on the replay, is returned to the caller as an error.

use crate::auth::is_auth_endpoint;
use crate::error::{Error, Result};
use crate::guard::{Navigator, LOGIN_PATH};
use crate::notify::NotificationService;
use crate::session::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use log::{debug, error, warn};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    navigator: Arc<dyn Navigator>,
    notifications: Arc<NotificationService>,
    // held for the duration of a refresh, so parallel 401s share one refresh call; keeps the
    // last failed attempt so waiters behind it don't expire the session a second time
    refresh_lock: tokio::sync::Mutex<Option<FailedRefresh>>,
}

/// A refresh that ended the session, keyed by the bearer credential that got the 401
struct FailedRefresh {
    rejected: Option<String>,
    outcome: RefreshFailure,
}

enum RefreshFailure {
    NoRefreshToken,
    Rejected(Arc<Error>),
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        tokens: Arc<TokenStore>,
        navigator: Arc<dyn Navigator>,
        notifications: Arc<NotificationService>,
    ) -> Self {
        ApiClient {
            transport,
            tokens,
            navigator,
            notifications,
            refresh_lock: tokio::sync::Mutex::new(None),
        }
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn notifications(&self) -> &Arc<NotificationService> {
        &self.notifications
    }

    /// Sends a request, recovering once from an expired access token.
    ///
    /// Returns the response only if it was successful (2xx).
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        request.headers.remove(reqwest::header::AUTHORIZATION);
        if let Some(token) = self.tokens.access_token() {
            request.set_bearer(&token)?;
        }
        let res = self.transport.send(&request).await?;
        if res.status == StatusCode::UNAUTHORIZED
            && !request.retried
            && !is_auth_endpoint(&request.path)
        {
            request.retried = true;
            return self.refresh_and_replay(request, res).await;
        }
        self.finish(&request, res)
    }

    async fn refresh_and_replay(
        &self,
        mut request: ApiRequest,
        unauthorized: ApiResponse,
    ) -> Result<ApiResponse> {
        warn!(
            "got 401 from {} {}, attempting token refresh",
            request.method, request.path
        );
        let stale = request.bearer().map(|s| s.to_string());
        let access = {
            let mut last_failure = self.refresh_lock.lock().await;
            match self.tokens.persisted_access_token() {
                // someone else refreshed while we were waiting for the lock
                Ok(Some(current)) if Some(&current) != stale.as_ref() => {
                    debug!("reusing access token refreshed by a concurrent request");
                    self.tokens.accept_refreshed(&current)?;
                    current
                }
                Ok(None) => match last_failure.as_ref() {
                    // session already expired by a concurrent request for the same credential
                    Some(failed) if failed.rejected == stale => {
                        debug!("session already expired by a concurrent request");
                        return Err(match &failed.outcome {
                            RefreshFailure::Rejected(e) => Error::SessionExpired(e.clone()),
                            RefreshFailure::NoRefreshToken => unauthorized
                                .into_error("Authentication credentials were not provided"),
                        });
                    }
                    _ => self.refresh_recorded(&mut last_failure, stale, unauthorized).await?,
                },
                _ => self.refresh_recorded(&mut last_failure, stale, unauthorized).await?,
            }
        };
        request.set_bearer(&access)?;
        let res = self.transport.send(&request).await?;
        self.finish(&request, res)
    }

    async fn refresh_recorded(
        &self,
        last_failure: &mut Option<FailedRefresh>,
        rejected: Option<String>,
        unauthorized: ApiResponse,
    ) -> Result<String> {
        match self.refresh_persisted(unauthorized).await {
            Ok(access) => {
                *last_failure = None;
                Ok(access)
            }
            Err(err) => {
                let outcome = match &err {
                    Error::SessionExpired(e) => RefreshFailure::Rejected(e.clone()),
                    _ => RefreshFailure::NoRefreshToken,
                };
                *last_failure = Some(FailedRefresh { rejected, outcome });
                Err(err)
            }
        }
    }

    /// Runs the refresh endpoint with the persisted refresh token. On any failure the session
    /// is cleared and the user is sent to the login page.
    async fn refresh_persisted(&self, unauthorized: ApiResponse) -> Result<String> {
        let refresh_token = match self.tokens.persisted_refresh_token() {
            Ok(Some(t)) => t,
            Ok(None) => {
                warn!("no refresh token available");
                self.expire_session();
                return Err(
                    unauthorized.into_error("Authentication credentials were not provided")
                );
            }
            Err(e) => {
                warn!("couldn't read refresh token: {}", e);
                self.expire_session();
                return Err(
                    unauthorized.into_error("Authentication credentials were not provided")
                );
            }
        };
        let refreshed = match self.tokens.endpoints().refresh(&refresh_token).await {
            Ok(access) => self.tokens.accept_refreshed(&access).map(|_| access),
            Err(e) => Err(e),
        };
        match refreshed {
            Ok(access) => {
                debug!("access token refreshed");
                Ok(access)
            }
            Err(e) => {
                warn!("token refresh failed: {}", e);
                self.expire_session();
                Err(Error::SessionExpired(Arc::new(e)))
            }
        }
    }

    fn expire_session(&self) {
        self.tokens.clear_quietly();
        self.notifications
            .warning("Your session has expired, please log in again");
        self.navigator.navigate(LOGIN_PATH);
    }

    fn finish(&self, request: &ApiRequest, res: ApiResponse) -> Result<ApiResponse> {
        if res.is_success() {
            return Ok(res);
        }
        let err = res.into_error("An error occurred");
        if let Error::Api { message, .. } = &err {
            error!("API Error: {} {}: {}", request.method, request.path, message);
            self.notifications.error(message);
        }
        Err(err)
    }

    /// Free-form request returning the raw JSON body, if any
    pub async fn request_value(&self, request: ApiRequest) -> Result<Option<Value>> {
        self.send(request).await?.value()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<T> {
        self.send(ApiRequest::get(path).query(query)).await?.json()
    }

    pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Option<Value>) -> Result<T> {
        let mut req = ApiRequest::new(Method::POST, path);
        req.body = body;
        self.send(req).await?.json()
    }
}
