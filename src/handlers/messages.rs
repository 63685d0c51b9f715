use modus_notifications_config::NotificationsConfig;
use modus_notifications_util::{DecodeError, Notification, ProcessedImage};

/// Cursor movement through the on-screen stack
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

/// Everything the engine reacts to, serialized onto one channel: source
/// events, timer expiry, decode completions, and user interactions.
///
/// The user-interaction variants are fed in by whatever renders the
/// container.
#[allow(dead_code)]
#[derive(Debug)]
pub enum Message {
    /// New notification from the source
    Notification(Notification),
    /// The source re-sent an active id; swap the record in place
    Replace(Notification),
    /// CloseNotification call from the source
    CloseNotification(u32),
    /// A per-record countdown ran out. Stale generations are discarded.
    Timeout { id: u32, generation: u64 },
    /// Off-loop image decode finished
    ImageDecoded {
        id: u32,
        generation: u64,
        result: Result<ProcessedImage, DecodeError>,
    },
    /// User dismissed the record under the cursor
    Dismiss,
    /// User invoked an action button
    InvokeAction { id: u32, key: String },
    /// User navigated the stack
    Navigate(Direction),
    /// Pointer entered the popup container
    PointerEnter,
    /// Pointer left the popup container
    PointerLeave,
    /// User closed every visible notification
    CloseAll,
    /// History viewer emptied the log
    ClearHistory,
    /// Source went away; abandon all active records
    EvictAll,
    /// Configuration updated
    Config(NotificationsConfig),
}
