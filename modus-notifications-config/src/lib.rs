use std::path::{Path, PathBuf};

pub const ID: &str = "org.modus.Notifications";

/// Screen edge the popup container is anchored to.
///
/// This is positioning intent only; pixel layout belongs to the renderer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Anchor {
    #[default]
    Top,
    Bottom,
    Right,
    Left,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub do_not_disturb: bool,
    #[serde(default)]
    pub anchor: Anchor,
    /// The maximum number of notifications that can be displayed at once.
    #[serde(default = "default_max_notifications")]
    pub max_notifications: u32,
    /// The maximum number of entries retained in the notification history.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Time in milliseconds a normal notification is displayed when the
    /// sender left the timeout to the server.
    #[serde(default = "default_timeout_normal")]
    pub default_timeout_normal: u32,
    /// Time in milliseconds a low priority notification is displayed when
    /// the sender left the timeout to the server.
    #[serde(default = "default_timeout_low")]
    pub default_timeout_low: u32,
    /// Max time in milliseconds a critical notification can be displayed before being removed.
    #[serde(default)]
    pub max_timeout_urgent: Option<u32>,
    /// Max time in milliseconds a normal notification can be displayed before being removed.
    #[serde(default)]
    pub max_timeout_normal: Option<u32>,
    /// Max time in milliseconds a low priority notification can be displayed before being removed.
    #[serde(default)]
    pub max_timeout_low: Option<u32>,
    /// Apps whose notifications are dropped without being displayed or recorded.
    #[serde(default)]
    pub ignored_apps: Vec<String>,
    /// Apps that may only ever have one notification on screen; a new one
    /// replaces the previous one and clears the app's history.
    #[serde(default = "default_single_instance_apps")]
    pub single_instance_apps: Vec<String>,
    /// Directory for cached notification images. Defaults to
    /// `$XDG_CACHE_HOME/modus/notifications`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    /// Path of the history snapshot file. Defaults to
    /// `notification_history.json` inside the cache directory.
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            do_not_disturb: false,
            anchor: Anchor::default(),
            max_notifications: default_max_notifications(),
            history_limit: default_history_limit(),
            default_timeout_normal: default_timeout_normal(),
            default_timeout_low: default_timeout_low(),
            max_timeout_urgent: None,
            max_timeout_normal: None,
            max_timeout_low: None,
            ignored_apps: Vec::new(),
            single_instance_apps: default_single_instance_apps(),
            cache_dir: None,
            history_file: None,
        }
    }
}

// Default value helpers for serde
const fn default_max_notifications() -> u32 {
    5
}

const fn default_history_limit() -> usize {
    100
}

const fn default_timeout_normal() -> u32 {
    5000
}

const fn default_timeout_low() -> u32 {
    3000
}

fn default_single_instance_apps() -> Vec<String> {
    vec!["Spotify".to_string()]
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

impl NotificationsConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load from `path` (or the default location), falling back to defaults
    /// when the file is missing or malformed.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(PathBuf::from).or_else(Self::default_path) {
            Some(p) => p,
            None => return Self::default(),
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("failed to load config from {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/modus/notifications.json`, falling back to
    /// `~/.config/modus/notifications.json`.
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("modus").join("notifications.json"))
    }
}
