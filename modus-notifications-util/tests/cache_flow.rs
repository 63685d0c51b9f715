//! End-to-end cache flow: inline payload in, persisted file out, file
//! reclaimed on release.

use std::sync::Arc;
use std::time::Duration;

use modus_notifications_util::{
    resolve_icon_name, IconHandle, Image, ImageCache, ImageData, ProcessedImage, MAX_IMAGE_WIDTH,
};

fn inline_image(width: u32, height: u32) -> Image {
    Image::Data {
        width,
        height,
        data: Arc::new(vec![200u8; (width * height * 4) as usize]),
    }
}

#[test]
fn test_full_caching_flow() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = ImageCache::new(dir.path()).unwrap();

    // A large inline payload is decoded, downscaled, and persisted once
    let handle = cache.acquire(1, &inline_image(512, 512)).unwrap();
    let IconHandle::Path(path) = handle else {
        panic!("inline data should produce a cached file");
    };
    assert!(path.exists());

    // The persisted file is a readable image within the size bounds
    let reloaded = ProcessedImage::from_path(&path).unwrap();
    assert_eq!(reloaded.width, MAX_IMAGE_WIDTH);

    // A second acquire for the same record reuses the file
    let again = cache.acquire(1, &inline_image(512, 512)).unwrap();
    assert_eq!(again, IconHandle::Path(path.clone()));

    // Release reclaims the file; doing it twice is fine
    cache.release(1);
    assert!(!path.exists());
    cache.release(1);
}

#[test]
fn test_wire_payload_to_cache() {
    // RGB payload with stride padding, as a sender would deliver it
    let width = 3;
    let height = 2;
    let rowstride = 12; // 3 pixels * 3 channels + 3 bytes padding
    let mut data = Vec::new();
    for _ in 0..height {
        data.extend_from_slice(&[10, 20, 30, 40, 50, 60, 70, 80, 90]);
        data.extend_from_slice(&[0, 0, 0]);
    }
    let payload = ImageData {
        width,
        height,
        rowstride,
        has_alpha: false,
        bits_per_sample: 8,
        channels: 3,
        data,
    };

    let rgba = payload.into_rgba().unwrap();
    assert_eq!(rgba.channels, 4);
    assert_eq!(rgba.data.len(), (width * height * 4) as usize);

    let dir = tempfile::tempdir().unwrap();
    let mut cache = ImageCache::new(dir.path()).unwrap();
    let image = Image::Data {
        width: rgba.width as u32,
        height: rgba.height as u32,
        data: Arc::new(rgba.data),
    };
    let IconHandle::Path(path) = cache.acquire(7, &image).unwrap() else {
        panic!("expected cached path");
    };
    assert_eq!(path.file_name().unwrap(), "notification_7.png");
}

#[test]
fn test_named_and_file_references_bypass_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut cache = ImageCache::new(dir.path()).unwrap();

    let named = cache
        .acquire(1, &Image::Name("audio-volume-high".to_string()))
        .unwrap();
    assert_eq!(named, IconHandle::Named("audio-volume-high".to_string()));

    let file = cache
        .acquire(2, &Image::File("/usr/share/pixmaps/app.png".into()))
        .unwrap();
    assert_eq!(
        file,
        IconHandle::Path("/usr/share/pixmaps/app.png".into())
    );

    assert!(cache.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_file_url_resolution() {
    assert_eq!(
        resolve_icon_name("file:///home/user/pic.png"),
        IconHandle::Path("/home/user/pic.png".into())
    );
}

#[test]
fn test_sweep_reclaims_orphans_only() {
    let dir = tempfile::tempdir().unwrap();

    // Orphan left behind by a previous run, a week old
    let orphan = dir.path().join("notification_99.png");
    {
        let mut stale_cache = ImageCache::new(dir.path()).unwrap();
        stale_cache.acquire(99, &inline_image(8, 8)).unwrap();
    }
    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&orphan)
        .unwrap();
    file.set_modified(std::time::SystemTime::now() - Duration::from_secs(8 * 24 * 3600))
        .unwrap();
    drop(file);

    let mut cache = ImageCache::new(dir.path()).unwrap();
    cache.acquire(1, &inline_image(8, 8)).unwrap();

    cache.sweep_stale(Duration::from_secs(7 * 24 * 3600));
    assert!(!orphan.exists());
    assert!(cache.path(1).unwrap().exists());
}
