//! Domain value types shared by the notification engine and anything
//! that renders or browses notifications.

pub mod error;
pub mod image;
pub mod image_cache;
pub mod urgency;

pub use error::{DecodeError, EngineError};
pub use image::{ImageData, ProcessedImage, MAX_IMAGE_HEIGHT, MAX_IMAGE_WIDTH};
pub use image_cache::{resolve_icon_name, IconHandle, ImageCache, DEFAULT_ICON};
pub use urgency::NotificationUrgency;

use serde::{Deserialize, Serialize};
use std::{
    convert::Infallible, fmt, path::PathBuf, str::FromStr, sync::Arc, time::SystemTime,
};

#[cfg(feature = "zbus_notifications")]
use std::collections::HashMap;

/// One notification as delivered by the source. Text fields are immutable
/// after construction; mutable presentation state (position, timers)
/// lives in the engine, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Notification {
    pub id: u32,
    pub app_name: String,
    pub app_icon: String,
    pub summary: String,
    pub body: String,
    pub actions: Vec<(ActionId, String)>,
    pub hints: Vec<Hint>,
    pub expire_timeout: i32,
    pub time: SystemTime,
}

impl Notification {
    /// Build a record from the raw bus call. Action pairs arrive as a
    /// flat `[key, label, key, label, ...]` list; an odd trailing element
    /// is dropped. Unknown or ill-typed hints are skipped.
    #[allow(clippy::too_many_arguments)]
    #[cfg(feature = "zbus_notifications")]
    pub fn new(
        app_name: &str,
        id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<&str>,
        hints: HashMap<&str, zbus::zvariant::Value<'_>>,
        expire_timeout: i32,
    ) -> Self {
        let actions = actions
            .chunks_exact(2)
            .map(|pair| {
                let key = pair[0].parse().unwrap_or(ActionId::Default);
                (key, pair[1].to_string())
            })
            .collect();

        let hints = hints
            .into_iter()
            .filter_map(|(key, value)| Hint::parse(key, value))
            .collect();

        Notification {
            id,
            app_name: app_name.to_string(),
            app_icon: app_icon.to_string(),
            summary: summary.to_string(),
            body: body.to_string(),
            actions,
            hints,
            expire_timeout,
            time: SystemTime::now(),
        }
    }

    pub fn transient(&self) -> bool {
        self.hints.iter().any(|h| matches!(h, Hint::Transient(true)))
    }

    pub fn category(&self) -> Option<&str> {
        self.hints.iter().find_map(|h| match h {
            Hint::Category(category) => Some(category.as_str()),
            _ => None,
        })
    }

    pub fn desktop_entry(&self) -> Option<&str> {
        self.hints.iter().find_map(|h| match h {
            Hint::DesktopEntry(entry) => Some(entry.as_str()),
            _ => None,
        })
    }

    /// Urgency from the hints, Normal when absent or out of range
    pub fn urgency(&self) -> NotificationUrgency {
        self.hints
            .iter()
            .find_map(|h| match h {
                Hint::Urgency(raw) => Some(NotificationUrgency::from(*raw)),
                _ => None,
            })
            .unwrap_or_default()
    }

    pub fn image(&self) -> Option<&Image> {
        self.hints.iter().find_map(|h| match h {
            Hint::Image(image) => Some(image),
            _ => None,
        })
    }

    /// Whether `key` is one of the declared action identifiers
    pub fn declares_action(&self, key: &ActionId) -> bool {
        self.actions.iter().any(|(id, _)| id == key)
    }

    pub fn duration_since(&self) -> Option<std::time::Duration> {
        SystemTime::now().duration_since(self.time).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionId {
    Default,
    Custom(String),
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionId::Default => f.write_str("default"),
            ActionId::Custom(key) => f.write_str(key),
        }
    }
}

impl FromStr for ActionId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "default" => ActionId::Default,
            key => ActionId::Custom(key.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hint {
    Category(String),
    DesktopEntry(String),
    Image(Image),
    Resident(bool),
    SenderPid(u32),
    Transient(bool),
    Urgency(u8),
}

#[cfg(feature = "zbus_notifications")]
impl Hint {
    /// Interpret one wire hint. Returns `None` for hints this engine does
    /// not carry and for values of the wrong variant type.
    fn parse(key: &str, value: zbus::zvariant::Value<'_>) -> Option<Hint> {
        match key {
            "urgency" => u8::try_from(value).map(Hint::Urgency).ok(),
            "category" => String::try_from(value).map(Hint::Category).ok(),
            "desktop-entry" => String::try_from(value).map(Hint::DesktopEntry).ok(),
            "transient" => bool::try_from(value).map(Hint::Transient).ok(),
            "resident" => bool::try_from(value).map(Hint::Resident).ok(),
            "sender-pid" => u32::try_from(value).map(Hint::SenderPid).ok(),
            "image-path" | "image_path" => String::try_from(value)
                .ok()
                .map(|reference| Hint::Image(Image::from_reference(reference))),
            "image-data" | "image_data" | "icon_data" => {
                let zbus::zvariant::Value::Structure(fields) = value else {
                    tracing::warn!("hint {key} is not a structure");
                    return None;
                };
                let decoded = ImageData::try_from(fields)
                    .map_err(DecodeError::from_variant)
                    .and_then(ImageData::into_rgba);
                match decoded {
                    Ok(image) => Some(Hint::Image(Image::Data {
                        width: image.width as u32,
                        height: image.height as u32,
                        data: Arc::new(image.data),
                    })),
                    Err(err) => {
                        tracing::warn!("discarding malformed {key} hint: {err}");
                        None
                    }
                }
            }
            _ => {
                tracing::debug!("ignoring hint {key}");
                None
            }
        }
    }
}

#[cfg(feature = "zbus_notifications")]
impl DecodeError {
    fn from_variant(err: zbus::zvariant::Error) -> Self {
        DecodeError::Payload(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Image {
    Name(String),
    File(PathBuf),
    /// RGBA
    Data {
        width: u32,
        height: u32,
        data: Arc<Vec<u8>>,
    },
}

impl Image {
    /// Classify an `image-path` hint value. Senders put `file://` URLs,
    /// absolute paths, and theme icon names in the same string field.
    pub fn from_reference(reference: String) -> Image {
        if let Some(path) = url::Url::parse(&reference)
            .ok()
            .and_then(|url| url.to_file_path().ok())
        {
            return Image::File(path);
        }
        if reference.starts_with('/') {
            return Image::File(PathBuf::from(reference));
        }
        Image::Name(reference)
    }
}

/// Close reason reported to the source, freedesktop.org wire values
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    Expired = 1,
    Dismissed = 2,
    CloseNotification = 3,
    /// The record was evicted without being shown to completion, e.g.
    /// when the source went away.
    Undelivered = 4,
}
