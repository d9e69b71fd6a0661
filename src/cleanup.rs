//! Scheduled expiry bookkeeping.
//!
//! Verification never depends on this running: the cache drops expired
//! entries on read and refresh tokens carry their own expiry. This only keeps
//! the cache and the sessions table from growing without bound.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::cache::MemorySecretCache;
use crate::clock::Clock;
use crate::db::Database;

/// Run all cleanup tasks once.
pub async fn run_cleanup(db: &Database, cache: &MemorySecretCache, clock: &dyn Clock) {
    // Sessions whose refresh token has lapsed can never be extended again
    match db.sessions().delete_expired(clock.now_secs() as i64).await {
        Ok(count) if count > 0 => info!("Cleaned up {} expired sessions", count),
        Ok(_) => {}
        Err(e) => error!("Failed to clean up expired sessions: {}", e),
    }

    let purged = cache.purge_expired();
    if purged > 0 {
        info!("Purged {} expired auth secrets", purged);
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(
    db: Database,
    cache: Arc<MemorySecretCache>,
    clock: Arc<dyn Clock>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            run_cleanup(&db, &cache, clock.as_ref()).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::SessionRepository;
    use crate::cache::SecretCache;
    use crate::clock::ManualClock;
    use crate::db::Session;

    #[tokio::test]
    async fn test_cleanup_removes_lapsed_sessions_and_secrets() {
        let db = Database::open(":memory:").await.unwrap();
        let clock = Arc::new(ManualClock::at(10_000));
        let cache = MemorySecretCache::new(clock.clone());

        db.sessions()
            .insert(&Session {
                id: "s1".into(),
                user_id: "u1".into(),
                auth_token: "auth".into(),
                refresh_token: "refresh".into(),
                refresh_secret: "sign".into(),
                device_type: 0,
                login_ip: String::new(),
                login_region: String::new(),
                login_time: 10_000,
                refresh_expires_at: 10_100,
            })
            .await
            .unwrap();
        cache
            .put("auth", "secret", Duration::from_secs(50))
            .await
            .unwrap();

        run_cleanup(&db, &cache, clock.as_ref()).await;
        assert_eq!(db.sessions().list_for_user("u1").await.unwrap().len(), 1);
        assert_eq!(cache.len(), 1);

        clock.advance(Duration::from_secs(100));
        run_cleanup(&db, &cache, clock.as_ref()).await;
        assert!(db.sessions().list_for_user("u1").await.unwrap().is_empty());
        assert!(cache.is_empty());
    }
}
