//! Disk-backed cache for decoded notification images.
//!
//! Each active notification owns at most one cached file, named by its
//! record id. Named icons and file paths resolve synchronously and are
//! never cached; only inline pixel payloads are decoded and persisted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::DecodeError;
use crate::image::ProcessedImage;
use crate::Image;

/// Icon the renderer can display without further lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IconHandle {
    /// Theme icon name, resolved by the renderer's icon theme
    Named(String),
    /// Path of an image file (cached or sender-provided)
    Path(PathBuf),
}

/// Fallback icon when a notification carries nothing usable
pub const DEFAULT_ICON: &str = "dialog-information-symbolic";

/// Resolve an icon reference string without touching the cache.
///
/// Senders pass `file://` URLs, absolute paths, or theme icon names in the
/// same field.
pub fn resolve_icon_name(icon: &str) -> IconHandle {
    if icon.starts_with("file://") {
        if let Ok(url) = url::Url::parse(icon) {
            if let Ok(path) = url.to_file_path() {
                return IconHandle::Path(path);
            }
        }
        tracing::warn!("unparseable file:// icon reference: {icon}");
        return IconHandle::Named(DEFAULT_ICON.to_string());
    }
    if icon.starts_with('/') {
        return IconHandle::Path(PathBuf::from(icon));
    }
    IconHandle::Named(icon.to_string())
}

pub struct ImageCache {
    dir: PathBuf,
    entries: HashMap<u32, PathBuf>,
}

impl ImageCache {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            entries: HashMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn path_for(&self, id: u32) -> PathBuf {
        self.dir.join(format!("notification_{id}.png"))
    }

    /// Resolve an icon reference, decoding and persisting inline data.
    ///
    /// Decode failures are reported so the caller can fall back to the
    /// default icon; they never fail the notification itself.
    pub fn acquire(&mut self, id: u32, image: &Image) -> Result<IconHandle, DecodeError> {
        match image {
            Image::Name(name) => Ok(resolve_icon_name(name)),
            Image::File(path) => Ok(IconHandle::Path(path.clone())),
            Image::Data {
                width,
                height,
                data,
            } => {
                let processed = ProcessedImage::from_rgba(*width, *height, data.to_vec())?;
                Ok(IconHandle::Path(self.store(id, &processed)?))
            }
        }
    }

    /// Persist a decoded image for `id`, returning the cached path.
    ///
    /// Decode-once: a second store for the same id returns the existing
    /// path without re-encoding.
    pub fn store(&mut self, id: u32, image: &ProcessedImage) -> Result<PathBuf, DecodeError> {
        if let Some(existing) = self.entries.get(&id) {
            tracing::debug!("cache hit for notification {id}");
            return Ok(existing.clone());
        }

        let path = self.path_for(id);
        image::save_buffer(
            &path,
            &image.data,
            image.width,
            image.height,
            image::ExtendedColorType::Rgba8,
        )?;
        tracing::debug!("cached image for notification {id} at {}", path.display());
        self.entries.insert(id, path.clone());
        Ok(path)
    }

    pub fn path(&self, id: u32) -> Option<&Path> {
        self.entries.get(&id).map(PathBuf::as_path)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.entries.contains_key(&id)
    }

    /// Drop the entry without deleting the file. Used when ownership of
    /// the file moves to a history entry.
    pub fn take(&mut self, id: u32) -> Option<PathBuf> {
        self.entries.remove(&id)
    }

    /// Delete the cached file for `id`. Idempotent; releasing an id with
    /// no cached file is not an error.
    pub fn release(&mut self, id: u32) {
        if let Some(path) = self.entries.remove(&id) {
            remove_file(&path);
        }
    }

    /// Whether any active entry points at `path`.
    pub fn is_active_path(&self, path: &Path) -> bool {
        self.entries.values().any(|p| p == path)
    }

    /// Delete every cached file, active or orphaned.
    pub fn clear(&mut self) {
        self.entries.clear();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("failed to read cache dir {}: {err}", self.dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                remove_file(&path);
            }
        }
    }

    /// Delete cache files last modified more than `max_age` ago. Run at
    /// startup to reclaim files orphaned by a previous crash.
    pub fn sweep_stale(&self, max_age: Duration) {
        let cutoff = SystemTime::now() - max_age;
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("failed to read cache dir {}: {err}", self.dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| modified < cutoff)
                .unwrap_or(false);
            if stale && !self.is_active_path(&path) {
                tracing::debug!("sweeping stale cache file {}", path.display());
                remove_file(&path);
            }
        }
    }
}

/// Best-effort file removal; a missing file is not an error.
pub fn remove_file(path: &Path) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("failed to remove cached image {}: {err}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn data_image(width: u32, height: u32) -> Image {
        Image::Data {
            width,
            height,
            data: Arc::new(vec![255u8; (width * height * 4) as usize]),
        }
    }

    #[test]
    fn test_acquire_persists_inline_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        let handle = cache.acquire(1, &data_image(16, 16)).unwrap();
        let IconHandle::Path(path) = handle else {
            panic!("inline data should resolve to a cached path");
        };
        assert!(path.exists());
        assert_eq!(path.file_name().unwrap(), "notification_1.png");
    }

    #[test]
    fn test_acquire_named_icon_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        let handle = cache
            .acquire(2, &Image::Name("battery-low".to_string()))
            .unwrap();
        assert_eq!(handle, IconHandle::Named("battery-low".to_string()));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_decode_once_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        let first = cache.acquire(3, &data_image(8, 8)).unwrap();
        let second = cache.acquire(3, &data_image(8, 8)).unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        cache.acquire(4, &data_image(8, 8)).unwrap();
        let path = cache.path(4).unwrap().to_path_buf();
        assert!(path.exists());

        cache.release(4);
        assert!(!path.exists());

        // Second release is a no-op, not an error
        cache.release(4);
        cache.release(999);
    }

    #[test]
    fn test_malformed_data_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        let bad = Image::Data {
            width: 64,
            height: 64,
            data: Arc::new(vec![0u8; 16]),
        };
        assert!(matches!(
            cache.acquire(5, &bad),
            Err(DecodeError::Truncated { .. })
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_resolve_icon_name_variants() {
        assert_eq!(
            resolve_icon_name("file:///usr/share/icons/app.png"),
            IconHandle::Path(PathBuf::from("/usr/share/icons/app.png"))
        );
        assert_eq!(
            resolve_icon_name("/opt/app/icon.png"),
            IconHandle::Path(PathBuf::from("/opt/app/icon.png"))
        );
        assert_eq!(
            resolve_icon_name("dialog-warning"),
            IconHandle::Named("dialog-warning".to_string())
        );
    }

    #[test]
    fn test_clear_removes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        cache.acquire(6, &data_image(8, 8)).unwrap();
        cache.acquire(7, &data_image(8, 8)).unwrap();

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_sweep_stale_spares_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = ImageCache::new(dir.path()).unwrap();

        cache.acquire(8, &data_image(8, 8)).unwrap();
        cache.sweep_stale(Duration::from_secs(60));
        assert!(cache.path(8).unwrap().exists());
    }
}
