//! Capped log of past notifications for the history viewer.
//!
//! Newest first. Appending past capacity silently drops the oldest entry
//! (ring behavior). The store optionally round-trips through a JSON
//! snapshot file so history survives restarts.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use modus_notifications_util::{Notification, NotificationUrgency};
use serde::{Deserialize, Serialize};

/// Snapshot of a retired notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u32,
    pub app_name: String,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub urgency: NotificationUrgency,
    pub time: SystemTime,
    /// Cached image file the entry took ownership of, if any
    pub cached_image: Option<PathBuf>,
}

impl HistoryEntry {
    pub fn new(notification: &Notification, cached_image: Option<PathBuf>) -> Self {
        Self {
            id: notification.id,
            app_name: notification.app_name.clone(),
            app_icon: notification.app_icon.clone(),
            summary: notification.summary.clone(),
            body: notification.body.clone(),
            urgency: notification.urgency(),
            time: notification.time,
            cached_image,
        }
    }
}

/// Optional constraints for [`HistoryStore::list`]
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub urgency: Option<NotificationUrgency>,
    pub app_name: Option<String>,
}

pub struct HistoryStore {
    entries: VecDeque<HistoryEntry>,
    limit: usize,
}

impl HistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a retired notification, newest first. Returns the entry
    /// dropped from the far end when the store is at capacity, so the
    /// caller can release its cached image.
    pub fn append(&mut self, entry: HistoryEntry) -> Option<HistoryEntry> {
        self.entries.push_front(entry);
        if self.entries.len() > self.limit {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Fresh snapshot of matching entries, newest first. Re-querying
    /// yields a new snapshot, never a live view.
    pub fn list(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| filter.urgency.is_none_or(|u| e.urgency == u))
            .filter(|e| {
                filter
                    .app_name
                    .as_deref()
                    .is_none_or(|app| e.app_name == app)
            })
            .cloned()
            .collect()
    }

    /// Whether any entry still owns the cached image at `path`
    pub fn retains_image(&self, path: &Path) -> bool {
        self.entries
            .iter()
            .any(|e| e.cached_image.as_deref() == Some(path))
    }

    /// Empty the store, returning the removed entries for image cleanup.
    /// Active notifications are unaffected.
    pub fn clear(&mut self) -> Vec<HistoryEntry> {
        self.entries.drain(..).collect()
    }

    /// Drop every entry belonging to `app_name`, returning them for image
    /// cleanup.
    pub fn clear_app(&mut self, app_name: &str) -> Vec<HistoryEntry> {
        let mut removed = Vec::new();
        self.entries.retain(|e| {
            if e.app_name == app_name {
                removed.push(e.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let snapshot: Vec<&HistoryEntry> = self.entries.iter().collect();
        let raw = serde_json::to_string(&snapshot)?;
        std::fs::write(path, raw)
    }

    /// Restore from a snapshot file. A missing file yields an empty store;
    /// a corrupt one is logged and ignored.
    pub fn load(path: &Path, limit: usize) -> Self {
        let mut store = Self::new(limit);
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("failed to read history snapshot {}: {err}", path.display());
                }
                return store;
            }
        };
        match serde_json::from_str::<Vec<HistoryEntry>>(&raw) {
            Ok(entries) => {
                // Snapshot is newest first; refill oldest first so the cap
                // drops the right end
                for entry in entries.into_iter().rev() {
                    store.append(entry);
                }
            }
            Err(err) => {
                tracing::error!("corrupt history snapshot {}: {err}", path.display());
            }
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: u32, app: &str, urgency: NotificationUrgency) -> HistoryEntry {
        HistoryEntry {
            id,
            app_name: app.to_string(),
            app_icon: String::new(),
            summary: format!("summary {id}"),
            body: String::new(),
            urgency,
            time: SystemTime::now(),
            cached_image: None,
        }
    }

    #[test]
    fn test_append_newest_first() {
        let mut store = HistoryStore::new(10);
        store.append(entry(1, "a", NotificationUrgency::Normal));
        store.append(entry(2, "a", NotificationUrgency::Normal));

        let all = store.list(&HistoryFilter::default());
        assert_eq!(all[0].id, 2);
        assert_eq!(all[1].id, 1);
    }

    #[test]
    fn test_ring_drops_oldest_past_capacity() {
        let mut store = HistoryStore::new(3);
        for id in 1..=3 {
            assert!(store
                .append(entry(id, "a", NotificationUrgency::Normal))
                .is_none());
        }

        let dropped = store.append(entry(4, "a", NotificationUrgency::Normal));
        assert_eq!(dropped.unwrap().id, 1);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_list_filters() {
        let mut store = HistoryStore::new(10);
        store.append(entry(1, "mail", NotificationUrgency::Normal));
        store.append(entry(2, "chat", NotificationUrgency::Critical));
        store.append(entry(3, "mail", NotificationUrgency::Critical));

        let critical = store.list(&HistoryFilter {
            urgency: Some(NotificationUrgency::Critical),
            app_name: None,
        });
        assert_eq!(critical.len(), 2);

        let mail_critical = store.list(&HistoryFilter {
            urgency: Some(NotificationUrgency::Critical),
            app_name: Some("mail".to_string()),
        });
        assert_eq!(mail_critical.len(), 1);
        assert_eq!(mail_critical[0].id, 3);
    }

    #[test]
    fn test_list_is_a_snapshot() {
        let mut store = HistoryStore::new(10);
        store.append(entry(1, "a", NotificationUrgency::Normal));
        let first = store.list(&HistoryFilter::default());

        store.append(entry(2, "a", NotificationUrgency::Normal));
        assert_eq!(first.len(), 1);
        assert_eq!(store.list(&HistoryFilter::default()).len(), 2);
    }

    #[test]
    fn test_clear_app() {
        let mut store = HistoryStore::new(10);
        store.append(entry(1, "spotify", NotificationUrgency::Normal));
        store.append(entry(2, "mail", NotificationUrgency::Normal));
        store.append(entry(3, "spotify", NotificationUrgency::Normal));

        let removed = store.clear_app("spotify");
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.list(&HistoryFilter::default())[0].app_name, "mail");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = HistoryStore::new(5);
        for id in 1..=8 {
            store.append(entry(id, "a", NotificationUrgency::Normal));
        }
        store.save(&path).unwrap();

        let restored = HistoryStore::load(&path, 5);
        let original: Vec<u32> = store
            .list(&HistoryFilter::default())
            .iter()
            .map(|e| e.id)
            .collect();
        let reloaded: Vec<u32> = restored
            .list(&HistoryFilter::default())
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(original, reloaded);
        assert_eq!(reloaded, vec![8, 7, 6, 5, 4]);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let store = HistoryStore::load(Path::new("/nonexistent/history.json"), 10);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = HistoryStore::load(&path, 10);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_caps_oversized_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut store = HistoryStore::new(50);
        for id in 1..=10 {
            store.append(entry(id, "a", NotificationUrgency::Normal));
        }
        store.save(&path).unwrap();

        let restored = HistoryStore::load(&path, 4);
        let ids: Vec<u32> = restored
            .list(&HistoryFilter::default())
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![10, 9, 8, 7]);
    }
}
