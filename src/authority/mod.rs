//! Session authority.
//!
//! Issues a short-lived auth token and a long-lived refresh token per login,
//! each signed with its own random secret:
//! - Auth tokens: validity is gated by the secret cache (`auth token -> secret`).
//!   Removing the cache entry revokes the token immediately.
//! - Refresh tokens: verified against the secret stored on the session row.
//!   Never cached, never re-issued.
//!
//! Per session the authority moves through ACTIVE (cache entry present),
//! STALE (cache entry gone, row intact) and TERMINATED (row removed).

mod error;

use async_trait::async_trait;
use serde::Serialize;
use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::SecretCache;
use crate::clock::Clock;
use crate::db::Session;
use crate::geo::GeoLocator;
use crate::jwt::{CodecError, REFRESH_TOKEN_DURATION_SECS, TokenCodec, TokenType};
use crate::secret::SessionSecrets;

pub use error::{BackendError, SessionError};

/// Durable storage for session rows. Every method is a single-row or
/// single-user point operation.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), BackendError>;

    async fn find_by_tokens(
        &self,
        user_id: &str,
        refresh_token: &str,
        auth_token: &str,
    ) -> Result<Option<Session>, BackendError>;

    async fn find_by_auth_token(&self, auth_token: &str) -> Result<Option<Session>, BackendError>;

    /// The session an auth token belonged to before an extend replaced it.
    async fn find_by_superseded_auth_token(
        &self,
        auth_token: &str,
    ) -> Result<Option<Session>, BackendError>;

    /// Replace the auth token on row `id` if it still holds `old_auth_token`.
    async fn swap_auth_token(
        &self,
        id: &str,
        old_auth_token: &str,
        new_auth_token: &str,
    ) -> Result<bool, BackendError>;

    async fn remove_by_auth_token(&self, auth_token: &str) -> Result<bool, BackendError>;

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, BackendError>;
}

/// Timeouts applied around external calls.
#[derive(Debug, Clone, Copy)]
pub struct AuthoritySettings {
    /// Bound on every cache and store call.
    pub io_timeout: Duration,
    /// Bound on the geolocation lookup during create.
    pub geo_timeout: Duration,
}

impl Default for AuthoritySettings {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(2),
            geo_timeout: Duration::from_millis(1500),
        }
    }
}

/// Input to [`SessionAuthority::create`]. The user has already been
/// authenticated by the account service.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub device_type: i32,
    pub duration_secs: u32,
    pub login_ip: String,
}

#[derive(Debug, Clone)]
pub struct ExtendRequest {
    pub user_id: String,
    pub refresh_token: String,
    pub auth_token: String,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedTokens {
    pub auth_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub valid: bool,
    /// Empty when invalid, or when the row could not be read.
    pub user_id: String,
}

impl Verification {
    fn invalid() -> Self {
        Self {
            valid: false,
            user_id: String::new(),
        }
    }
}

/// Session metadata for listings. Carries no tokens or secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub id: String,
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "deviceType")]
    pub device_type: i32,
    #[serde(rename = "loginTime")]
    pub login_time: i64,
    #[serde(rename = "loginIP")]
    pub login_ip: String,
    #[serde(rename = "loginRegion")]
    pub login_region: String,
    #[serde(rename = "refreshExpiresAt")]
    pub refresh_expires_at: i64,
}

impl From<Session> for SessionInfo {
    fn from(s: Session) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            device_type: s.device_type,
            login_time: s.login_time,
            login_ip: s.login_ip,
            login_region: s.login_region,
            refresh_expires_at: s.refresh_expires_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Row present and the auth token's cache entry is live.
    Active,
    /// Row present but the cache entry expired or was superseded.
    Stale,
    /// No row. The refresh token can never be used again.
    Terminated,
}

pub struct SessionAuthority {
    store: Arc<dyn SessionRepository>,
    cache: Arc<dyn SecretCache>,
    geo: Option<Arc<dyn GeoLocator>>,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    settings: AuthoritySettings,
}

impl SessionAuthority {
    pub fn new(
        store: Arc<dyn SessionRepository>,
        cache: Arc<dyn SecretCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            cache,
            geo: None,
            codec: TokenCodec::new(clock.clone()),
            clock,
            settings: AuthoritySettings::default(),
        }
    }

    pub fn with_geo_locator(mut self, geo: Arc<dyn GeoLocator>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_settings(mut self, settings: AuthoritySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Issue a new session for an authenticated user.
    ///
    /// The row is written before the cache entry. If the row cannot be
    /// written nothing is cached.
    pub async fn create(&self, req: NewSession) -> Result<IssuedTokens, SessionError> {
        if req.duration_secs == 0 {
            return Err(SessionError::InvalidArgument(
                "durationSeconds must be positive".into(),
            ));
        }

        let secrets = SessionSecrets::generate();
        let login_region = self.resolve_region(&req.login_ip).await;

        let auth_token = self.codec.sign(
            &secrets.secret_handle,
            TokenType::Auth,
            u64::from(req.duration_secs),
            &secrets.auth_signing_secret,
        )?;
        let refresh_token = self.codec.sign(
            &secrets.secret_handle,
            TokenType::Refresh,
            REFRESH_TOKEN_DURATION_SECS,
            &secrets.refresh_signing_secret,
        )?;

        let now = self.clock.now_secs() as i64;
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: req.user_id,
            auth_token: auth_token.clone(),
            refresh_token: refresh_token.clone(),
            refresh_secret: secrets.refresh_signing_secret,
            device_type: req.device_type,
            login_ip: req.login_ip,
            login_region,
            login_time: now,
            refresh_expires_at: now + REFRESH_TOKEN_DURATION_SECS as i64,
        };

        if let Err(e) = self.bounded(self.store.insert(&session)).await {
            error!(user_id = %session.user_id, error = %e, "Failed to persist session");
            return Err(e.into());
        }

        let ttl = Duration::from_secs(u64::from(req.duration_secs));
        if let Err(e) = self
            .bounded(self.cache.put(&auth_token, &secrets.auth_signing_secret, ttl))
            .await
        {
            error!(user_id = %session.user_id, error = %e, "Failed to cache auth secret");
            if let Err(cleanup) = self
                .bounded(self.store.remove_by_auth_token(&auth_token))
                .await
            {
                warn!(
                    session_id = %session.id,
                    error = %cleanup,
                    "Failed to remove uncached session"
                );
            }
            return Err(e.into());
        }

        info!(
            user_id = %session.user_id,
            session_id = %session.id,
            device_type = session.device_type,
            region = %session.login_region,
            "Session created"
        );

        Ok(IssuedTokens {
            auth_token,
            refresh_token,
        })
    }

    /// Check an auth token. Never fails; every problem yields `valid = false`.
    pub async fn verify(&self, auth_token: &str) -> Verification {
        let secret = match self.bounded(self.cache.get(auth_token)).await {
            Ok(Some(secret)) => secret,
            Ok(None) => return Verification::invalid(),
            Err(e) => {
                warn!(error = %e, "Secret cache lookup failed during verify");
                return Verification::invalid();
            }
        };

        let claims = match self.codec.verify(auth_token, &secret) {
            Ok(claims) => claims,
            Err(CodecError::InvalidSignature) => {
                warn!("Cached secret does not match auth token signature");
                return Verification::invalid();
            }
            Err(e) => {
                debug!(error = %e, "Auth token rejected");
                return Verification::invalid();
            }
        };

        if claims.token_type != TokenType::Auth {
            return Verification::invalid();
        }

        let user_id = match self.bounded(self.store.find_by_auth_token(auth_token)).await {
            Ok(Some(session)) => session.user_id,
            Ok(None) => {
                warn!("No session row for a cache-valid auth token");
                String::new()
            }
            Err(e) => {
                warn!(error = %e, "Failed to look up session during verify");
                String::new()
            }
        };

        Verification {
            valid: true,
            user_id,
        }
    }

    /// Mint a new auth token from a refresh token.
    ///
    /// Only allowed while the presented auth token's cache entry is live; a
    /// stale session has to log in again. The refresh token is returned
    /// unchanged.
    pub async fn extend(&self, req: ExtendRequest) -> Result<IssuedTokens, SessionError> {
        if req.duration_secs == 0 {
            return Err(SessionError::InvalidArgument(
                "durationSeconds must be positive".into(),
            ));
        }

        let session = self
            .bounded(
                self.store
                    .find_by_tokens(&req.user_id, &req.refresh_token, &req.auth_token),
            )
            .await?
            .ok_or(SessionError::NotFound)?;

        let claims = self
            .codec
            .verify(&req.refresh_token, &session.refresh_secret)
            .inspect_err(|e| {
                debug!(session_id = %session.id, error = %e, "Refresh token rejected");
            })?;

        if claims.token_type != TokenType::Refresh {
            return Err(SessionError::Unauthenticated(
                "not a refresh token".into(),
            ));
        }

        let auth_secret = self
            .bounded(self.cache.get(&req.auth_token))
            .await?
            .ok_or_else(|| SessionError::InvalidArgument("authToken already expired".into()))?;

        let new_auth_token = self.codec.sign(
            &claims.secret_handle,
            TokenType::Auth,
            u64::from(req.duration_secs),
            &auth_secret,
        )?;

        let swapped = self
            .bounded(
                self.store
                    .swap_auth_token(&session.id, &req.auth_token, &new_auth_token),
            )
            .await?;
        if !swapped {
            // Another extend or a logout got there first
            return Err(SessionError::NotFound);
        }

        let ttl = Duration::from_secs(u64::from(req.duration_secs));
        if let Err(e) = self
            .bounded(self.cache.put(&new_auth_token, &auth_secret, ttl))
            .await
        {
            error!(session_id = %session.id, error = %e, "Failed to cache extended auth secret");
            if let Err(revert) = self
                .bounded(
                    self.store
                        .swap_auth_token(&session.id, &new_auth_token, &req.auth_token),
                )
                .await
            {
                warn!(
                    session_id = %session.id,
                    error = %revert,
                    "Failed to restore previous auth token"
                );
            }
            return Err(e.into());
        }

        if let Err(e) = self.bounded(self.cache.delete(&req.auth_token)).await {
            warn!(session_id = %session.id, error = %e, "Failed to drop superseded auth secret");
        }

        info!(user_id = %session.user_id, session_id = %session.id, "Session extended");

        Ok(IssuedTokens {
            auth_token: new_auth_token,
            refresh_token: req.refresh_token,
        })
    }

    /// Revoke a session. Both removals are always attempted; only the store
    /// removal decides the outcome. Returns whether a row was removed.
    pub async fn delete(&self, auth_token: &str) -> Result<bool, SessionError> {
        let removed = self
            .bounded(self.store.remove_by_auth_token(auth_token))
            .await;

        if let Err(e) = self.bounded(self.cache.delete(auth_token)).await {
            warn!(error = %e, "Failed to drop auth secret on logout");
        }

        let removed = removed.map_err(|e| {
            error!(error = %e, "Failed to delete session");
            SessionError::from(e)
        })?;

        if removed {
            info!("Session deleted");
        }
        Ok(removed)
    }

    /// All sessions of a user, newest login first.
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionInfo>, SessionError> {
        let sessions = self
            .bounded(self.store.list_for_user(user_id))
            .await
            .inspect_err(|e| {
                error!(user_id = %user_id, error = %e, "Failed to list sessions");
            })?;

        Ok(sessions.into_iter().map(SessionInfo::from).collect())
    }

    /// Where the session owning `auth_token` sits in its lifecycle.
    ///
    /// A token superseded by an extend reports its session as stale while the
    /// row survives.
    pub async fn state(&self, auth_token: &str) -> Result<SessionState, SessionError> {
        let current = self
            .bounded(self.store.find_by_auth_token(auth_token))
            .await?;
        if current.is_none() {
            let superseded = self
                .bounded(self.store.find_by_superseded_auth_token(auth_token))
                .await?;
            return Ok(match superseded {
                Some(_) => SessionState::Stale,
                None => SessionState::Terminated,
            });
        }

        match self.bounded(self.cache.get(auth_token)).await? {
            Some(_) => Ok(SessionState::Active),
            None => Ok(SessionState::Stale),
        }
    }

    /// Best-effort region lookup. Any failure leaves the region empty.
    async fn resolve_region(&self, login_ip: &str) -> String {
        let Some(geo) = &self.geo else {
            return String::new();
        };

        // Forwarded addresses may be a comma-separated chain; the client is first
        let candidate = login_ip.split(',').next().unwrap_or("").trim();
        let Ok(ip) = candidate.parse::<IpAddr>() else {
            return String::new();
        };

        match tokio::time::timeout(self.settings.geo_timeout, geo.locate(ip)).await {
            Ok(Ok(region)) => region,
            Ok(Err(e)) => {
                warn!(ip = %ip, error = %e, "Geolocation lookup failed");
                String::new()
            }
            Err(_) => {
                warn!(ip = %ip, "Geolocation lookup timed out");
                String::new()
            }
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, BackendError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        tokio::time::timeout(self.settings.io_timeout, call)
            .await
            .map_err(|_| BackendError::Timeout)?
    }
}
