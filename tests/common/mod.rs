#![allow(dead_code)]

use async_trait::async_trait;
use session_authority::authority::{
    AuthoritySettings, BackendError, SessionAuthority, SessionRepository,
};
use session_authority::cache::{MemorySecretCache, SecretCache};
use session_authority::clock::{Clock, ManualClock};
use session_authority::db::{Database, Session, SessionStore};
use session_authority::geo::{GeoError, GeoLocator};
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Fixed starting point for simulated time.
pub const START: u64 = 1_700_000_000;

pub struct TestContext {
    pub authority: SessionAuthority,
    pub db: Database,
    pub cache: Arc<MemorySecretCache>,
    pub clock: Arc<ManualClock>,
}

pub async fn setup() -> TestContext {
    TestSetup::new().build().await
}

/// Builder for test setup with various options
pub struct TestSetup {
    geo: Option<Arc<dyn GeoLocator>>,
    settings: AuthoritySettings,
}

impl TestSetup {
    pub fn new() -> Self {
        Self {
            geo: None,
            settings: AuthoritySettings::default(),
        }
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoLocator>) -> Self {
        self.geo = Some(geo);
        self
    }

    pub fn with_settings(mut self, settings: AuthoritySettings) -> Self {
        self.settings = settings;
        self
    }

    pub async fn build(self) -> TestContext {
        let db = Database::open(":memory:")
            .await
            .expect("Failed to open test database");
        let clock = Arc::new(ManualClock::at(START));
        let cache = Arc::new(MemorySecretCache::new(clock.clone()));

        let mut authority =
            SessionAuthority::new(Arc::new(db.sessions()), cache.clone(), clock.clone())
                .with_settings(self.settings);
        if let Some(geo) = self.geo {
            authority = authority.with_geo_locator(geo);
        }

        TestContext {
            authority,
            db,
            cache,
            clock,
        }
    }
}

/// Session store wrapper that can be told to fail or hang.
pub struct FlakyStore {
    pub inner: SessionStore,
    pub fail_insert: AtomicBool,
    pub fail_remove: AtomicBool,
    pub hang: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SessionStore) -> Self {
        Self {
            inner,
            fail_insert: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
            hang: AtomicBool::new(false),
        }
    }

    async fn maybe_hang(&self) {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

fn unavailable() -> BackendError {
    BackendError::Unavailable("injected failure".into())
}

#[async_trait]
impl SessionRepository for FlakyStore {
    async fn insert(&self, session: &Session) -> Result<(), BackendError> {
        self.maybe_hang().await;
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.insert(session).await
    }

    async fn find_by_tokens(
        &self,
        user_id: &str,
        refresh_token: &str,
        auth_token: &str,
    ) -> Result<Option<Session>, BackendError> {
        self.maybe_hang().await;
        self.inner
            .find_by_tokens(user_id, refresh_token, auth_token)
            .await
    }

    async fn find_by_auth_token(&self, auth_token: &str) -> Result<Option<Session>, BackendError> {
        self.maybe_hang().await;
        self.inner.find_by_auth_token(auth_token).await
    }

    async fn find_by_superseded_auth_token(
        &self,
        auth_token: &str,
    ) -> Result<Option<Session>, BackendError> {
        self.maybe_hang().await;
        self.inner.find_by_superseded_auth_token(auth_token).await
    }

    async fn swap_auth_token(
        &self,
        id: &str,
        old_auth_token: &str,
        new_auth_token: &str,
    ) -> Result<bool, BackendError> {
        self.maybe_hang().await;
        self.inner
            .swap_auth_token(id, old_auth_token, new_auth_token)
            .await
    }

    async fn remove_by_auth_token(&self, auth_token: &str) -> Result<bool, BackendError> {
        self.maybe_hang().await;
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.remove_by_auth_token(auth_token).await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>, BackendError> {
        self.maybe_hang().await;
        self.inner.list_for_user(user_id).await
    }
}

/// Secret cache wrapper that can be told to fail.
pub struct FlakyCache {
    pub inner: MemorySecretCache,
    pub fail_put: AtomicBool,
    pub fail_get: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemorySecretCache::new(clock),
            fail_put: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl SecretCache for FlakyCache {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BackendError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.put(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.inner.delete(key).await
    }
}

/// What a fake geolocator does when asked.
pub enum GeoBehavior {
    Answer(&'static str),
    Fail,
    Hang,
}

pub struct FakeGeo {
    behavior: GeoBehavior,
    pub calls: AtomicUsize,
}

impl FakeGeo {
    pub fn new(behavior: GeoBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoLocator for FakeGeo {
    async fn locate(&self, _ip: IpAddr) -> Result<String, GeoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            GeoBehavior::Answer(code) => Ok(code.to_string()),
            GeoBehavior::Fail => Err(GeoError::MissingCountry),
            GeoBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("XX".to_string())
            }
        }
    }
}
