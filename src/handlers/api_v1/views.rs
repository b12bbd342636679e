use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use actix_session::Session;
use rand::Rng;

use crate::engine::RosterView;
use crate::errors::AppError;

const VIEW_KEY: &str = "roster_view";
const DEFAULT_IDLE: Duration = Duration::from_secs(2 * 60 * 60);
const DEFAULT_CAPACITY: usize = 1024;

pub type SharedView = Arc<tokio::sync::Mutex<RosterView>>;

struct Entry {
    view: SharedView,
    last_used: Instant,
}

/// Server-side roster views, one per browser session that loaded a roster.
///
/// Views idle for longer than `idle` are closed and dropped. When the map is
/// full, opening a new view drops the least recently used one.
pub struct ViewRegistry {
    views: Mutex<HashMap<String, Entry>>,
    idle: Duration,
    capacity: usize,
}

impl Default for ViewRegistry {
    fn default() -> Self {
        Self::with_limits(DEFAULT_IDLE, DEFAULT_CAPACITY)
    }
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(idle: Duration, capacity: usize) -> Self {
        Self { views: Mutex::new(HashMap::new()), idle, capacity: capacity.max(1) }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.views.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The view for `key`, created empty if there is none. Only a roster
    /// load opens views.
    pub fn open(&self, key: &str) -> SharedView {
        let now = Instant::now();
        let mut views = self.entries();
        self.evict_idle(&mut views, now);

        if let Some(entry) = views.get_mut(key) {
            entry.last_used = now;
            return Arc::clone(&entry.view);
        }
        if views.len() >= self.capacity {
            let oldest = views.iter().min_by_key(|(_, e)| e.last_used).map(|(k, _)| k.clone());
            if let Some(oldest) = oldest.and_then(|k| views.remove(&k)) {
                log::warn!("Roster view registry full ({} views), dropping least recently used", self.capacity);
                close(&oldest.view);
            }
        }
        let view = SharedView::default();
        views.insert(key.to_string(), Entry { view: Arc::clone(&view), last_used: now });
        view
    }

    /// The existing view for `key`. Never creates one.
    pub fn get(&self, key: &str) -> Result<SharedView, AppError> {
        let now = Instant::now();
        let mut views = self.entries();
        self.evict_idle(&mut views, now);
        match views.get_mut(key) {
            Some(entry) => {
                entry.last_used = now;
                Ok(Arc::clone(&entry.view))
            }
            None => Err(no_roster()),
        }
    }

    /// Drop the view for `key`, returning it so the caller can close it.
    pub fn remove(&self, key: &str) -> Option<SharedView> {
        self.entries().remove(key).map(|e| e.view)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn evict_idle(&self, views: &mut HashMap<String, Entry>, now: Instant) {
        views.retain(|_, entry| {
            let live = now.duration_since(entry.last_used) < self.idle;
            if !live {
                close(&entry.view);
            }
            live
        });
    }
}

/// Close a view nobody holds; a view locked by a running request is left to
/// finish and is dropped with its last handle.
fn close(view: &SharedView) {
    if let Ok(mut view) = view.try_lock() {
        view.close();
    }
}

fn no_roster() -> AppError {
    AppError::InvalidState("no roster loaded".to_string())
}

/// Get the view key from the session, or generate a new one.
pub fn view_key(session: &Session) -> Result<String, AppError> {
    if let Some(key) = existing_view_key(session)? {
        return Ok(key);
    }
    let key = generate_key();
    session
        .insert(VIEW_KEY, &key)
        .map_err(|e| AppError::Session(format!("Failed to store view key: {}", e)))?;
    Ok(key)
}

/// The view key stored in the session, if a roster was ever loaded.
pub fn existing_view_key(session: &Session) -> Result<Option<String>, AppError> {
    session
        .get::<String>(VIEW_KEY)
        .map_err(|e| AppError::Session(format!("Failed to read view key: {}", e)))
}

/// The key of the caller's view; 409 when no roster was loaded.
pub fn current_view_key(session: &Session) -> Result<String, AppError> {
    existing_view_key(session)?.ok_or_else(no_roster)
}

/// Generate a random 32-byte hex key.
fn generate_key() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_never_creates() {
        let views = ViewRegistry::new();
        assert!(matches!(views.get("missing"), Err(AppError::InvalidState(_))));
        assert!(views.is_empty());
    }

    #[test]
    fn test_open_reuses_view() {
        let views = ViewRegistry::new();
        let first = views.open("a");
        let again = views.open("a");
        assert!(Arc::ptr_eq(&first, &again));
        assert!(Arc::ptr_eq(&first, &views.get("a").unwrap()));
        assert_eq!(views.len(), 1);
    }

    #[test]
    fn test_idle_views_are_evicted() {
        let views = ViewRegistry::with_limits(Duration::ZERO, 16);
        views.open("a");
        views.open("b");
        assert_eq!(views.len(), 1);
        assert!(views.get("a").is_err());
    }

    #[test]
    fn test_full_registry_drops_least_recently_used() {
        let tick = || std::thread::sleep(Duration::from_millis(2));
        let views = ViewRegistry::with_limits(DEFAULT_IDLE, 2);
        views.open("a");
        tick();
        views.open("b");
        tick();
        views.get("a").unwrap();
        tick();
        views.open("c");
        assert_eq!(views.len(), 2);
        assert!(views.get("b").is_err());
        assert!(views.get("a").is_ok());
    }

    #[test]
    fn test_remove_forgets_view() {
        let views = ViewRegistry::new();
        views.open("a");
        assert!(views.remove("a").is_some());
        assert!(views.get("a").is_err());
    }
}
