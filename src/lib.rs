pub mod api;
pub mod authority;
pub mod cache;
pub mod cleanup;
pub mod cli;
pub mod clock;
pub mod db;
pub mod geo;
pub mod jwt;
pub mod secret;

use api::create_api_router;
use authority::{AuthoritySettings, SessionAuthority};
use axum::Router;
use cache::MemorySecretCache;
use clock::Clock;
use db::Database;
use geo::HttpGeoLocator;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::warn;
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Time source for token expiry, cache TTLs and session timestamps
    pub clock: Arc<dyn Clock>,
    /// Geolocation service base URL. Region lookup is skipped when unset.
    pub geo_endpoint: Option<Url>,
    /// Timeouts for store, cache and geolocation calls
    pub settings: AuthoritySettings,
}

/// Long-lived handles shared by every request, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub cache: Arc<MemorySecretCache>,
    pub clock: Arc<dyn Clock>,
    pub authority: Arc<SessionAuthority>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let cache = Arc::new(MemorySecretCache::new(config.clock.clone()));

        let mut authority = SessionAuthority::new(
            Arc::new(config.db.sessions()),
            cache.clone(),
            config.clock.clone(),
        )
        .with_settings(config.settings);

        if let Some(endpoint) = &config.geo_endpoint {
            match HttpGeoLocator::new(endpoint.clone(), config.settings.geo_timeout) {
                Ok(locator) => authority = authority.with_geo_locator(Arc::new(locator)),
                Err(e) => warn!(error = %e, "Geolocation disabled"),
            }
        }

        Self {
            db: config.db.clone(),
            cache,
            clock: config.clock.clone(),
            authority: Arc::new(authority),
        }
    }
}

/// Create the application router.
pub fn create_app(state: &AppState) -> Router {
    Router::new().nest("/api", create_api_router(state.authority.clone()))
}

/// Run cleanup once and spawn the background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(state: &AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    cleanup::run_cleanup(&state.db, &state.cache, state.clock.as_ref()).await;
    cleanup::spawn_cleanup_scheduler(
        state.db.clone(),
        state.cache.clone(),
        state.clock.clone(),
        every,
    )
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(state: AppState, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&state);
    axum::serve(listener, app).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> (tokio::task::JoinHandle<()>, SocketAddr) {
    let state = AppState::new(&config);

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await.expect("Failed to bind");
    let local_addr = listener.local_addr().expect("Failed to get local address");

    let handle = tokio::spawn(async move {
        run_server(state, listener).await.ok();
    });

    (handle, local_addr)
}
