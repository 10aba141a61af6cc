//! Per-session carts for the HTTP surface, each persisted in its own
//! directory.
//!
//! Sessions stay in memory while in use. A session is evicted when its cart
//! is checked out or cleared, or after it has been idle for longer than the
//! configured window.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::services::cart_store::{CartSettings, CartStore};
use crate::storage::{CartPersistence, FileStore};
use crate::{Result, StorefrontError};

const MAX_SESSION_LEN: usize = 64;

pub type SharedCart = Arc<Mutex<CartStore>>;

#[derive(Debug)]
struct Session {
    cart: SharedCart,
    last_used: Instant,
}

#[derive(Debug)]
pub struct CartSessions {
    data_dir: PathBuf,
    settings: CartSettings,
    sessions: Mutex<HashMap<String, Session>>,
}

impl CartSessions {
    pub fn new(data_dir: impl Into<PathBuf>, settings: CartSettings) -> Self {
        Self { data_dir: data_dir.into(), settings, sessions: Mutex::new(HashMap::new()) }
    }

    /// Returns the session's cart, loading it from disk on first use.
    pub async fn open(&self, session: &str) -> Result<SharedCart> {
        validate_session_id(session)?;
        let mut sessions = self.sessions.lock().await;
        if let Some(entry) = sessions.get_mut(session) {
            entry.last_used = Instant::now();
            return Ok(entry.cart.clone());
        }
        let persistence = CartPersistence::new(Arc::new(FileStore::new(self.data_dir.join(session))));
        let cart = Arc::new(Mutex::new(CartStore::load(persistence, &self.settings)));
        sessions.insert(session.to_string(), Session { cart: cart.clone(), last_used: Instant::now() });
        tracing::debug!(session, "cart session opened");
        Ok(cart)
    }

    /// Drops the session from memory after settling its storage. An empty
    /// cart leaves nothing behind on disk.
    pub async fn close(&self, session: &str) {
        let Some(entry) = self.sessions.lock().await.remove(session) else {
            return;
        };
        let mut store = entry.cart.lock().await;
        store.close();
        if store.cart().is_empty() {
            self.remove_session_dir(session);
        }
        tracing::debug!(session, "cart session closed");
    }

    /// Closes sessions untouched for longer than `idle`. Sessions with a
    /// request in flight are kept.
    pub async fn evict_idle(&self, idle: Duration) -> usize {
        let stale: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .filter(|(_, s)| s.last_used.elapsed() > idle && Arc::strong_count(&s.cart) == 1)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for session in &stale {
            self.close(session).await;
        }
        if !stale.is_empty() {
            let remaining = self.open_sessions().await;
            tracing::info!(evicted = stale.len(), remaining, "idle cart sessions evicted");
        }
        stale.len()
    }

    /// Runs [`evict_idle`](Self::evict_idle) on a fixed interval.
    pub fn spawn_sweeper(self: Arc<Self>, idle: Duration) -> JoinHandle<()> {
        let period = (idle / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                self.evict_idle(idle).await;
            }
        })
    }

    pub async fn open_sessions(&self) -> usize { self.sessions.lock().await.len() }

    /// Writes every open cart now. Used on shutdown.
    pub async fn flush_all(&self) {
        let carts: Vec<SharedCart> = self.sessions.lock().await.values().map(|s| s.cart.clone()).collect();
        for cart in carts {
            cart.lock().await.close();
        }
        tracing::info!("cart sessions flushed");
    }

    fn remove_session_dir(&self, session: &str) {
        match std::fs::remove_dir(self.data_dir.join(session)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(session, error = %e, "session directory left in place"),
        }
    }
}

fn validate_session_id(session: &str) -> Result<()> {
    let valid = !session.is_empty()
        && session.len() <= MAX_SESSION_LEN
        && session.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid { Ok(()) } else { Err(StorefrontError::InvalidSession(session.to_string())) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::CartProduct;
    use rust_decimal::Decimal;

    fn mug() -> CartProduct {
        CartProduct { product_id: "P1".into(), name: "Mug".into(), unit_price: Decimal::new(250, 0), max_quantity: None, selected_options: None }
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_and_reloadable() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = CartSessions::new(dir.path(), CartSettings::default());
        let a = sessions.open("alice").await.unwrap();
        let b = sessions.open("bob").await.unwrap();
        a.lock().await.add_item(mug(), 2).unwrap();
        assert!(b.lock().await.cart().is_empty());
        assert!(Arc::ptr_eq(&a, &sessions.open("alice").await.unwrap()));

        sessions.flush_all().await;
        let fresh = CartSessions::new(dir.path(), CartSettings::default());
        assert_eq!(fresh.open("alice").await.unwrap().lock().await.total_items(), 2);
    }

    #[tokio::test]
    async fn test_close_evicts_and_cleans_up_empty_cart() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = CartSessions::new(dir.path(), CartSettings::default());
        {
            let cart = sessions.open("carol").await.unwrap();
            let mut store = cart.lock().await;
            store.add_item(mug(), 1).unwrap();
            store.flush();
            store.clear_cart();
        }
        assert!(dir.path().join("carol").exists());
        sessions.close("carol").await;
        assert_eq!(sessions.open_sessions().await, 0);
        assert!(!dir.path().join("carol").exists());
        sessions.close("carol").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sessions_evicted_with_cart_kept_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let sessions = CartSessions::new(dir.path(), CartSettings::default());
        sessions.open("dave").await.unwrap().lock().await.add_item(mug(), 3).unwrap();
        sessions.open("erin").await.unwrap();
        let held = sessions.open("frank").await.unwrap();

        tokio::time::advance(Duration::from_secs(600)).await;
        sessions.open("erin").await.unwrap();
        assert_eq!(sessions.evict_idle(Duration::from_secs(300)).await, 1);
        assert_eq!(sessions.open_sessions().await, 2);
        drop(held);

        let reopened = sessions.open("dave").await.unwrap();
        assert_eq!(reopened.lock().await.total_items(), 3);
    }

    #[tokio::test]
    async fn test_rejects_path_like_sessions() {
        let sessions = CartSessions::new("/tmp/unused", CartSettings::default());
        let long = "x".repeat(MAX_SESSION_LEN + 1);
        for bad in ["", "../etc", "a/b", long.as_str()] {
            assert!(matches!(sessions.open(bad).await, Err(StorefrontError::InvalidSession(_))));
        }
    }
}
