//! The presentation engine.
//!
//! `PresentationController` owns every piece of mutable notification
//! state: the visible stack, per-record expiry timers, the image cache,
//! and the history log. All mutation funnels through [`update`] on one
//! task; timers, the bus adapter, and decode workers only ever talk to it
//! by sending [`Message`]s into the same channel, so nothing here needs a
//! lock.
//!
//! [`update`]: PresentationController::update

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use modus_notifications_config::NotificationsConfig;
use modus_notifications_util::{
    image_cache, ActionId, CloseReason, EngineError, IconHandle, Image, ImageCache, Notification,
    NotificationUrgency, ProcessedImage, DEFAULT_ICON,
};
use tokio::sync::{mpsc, watch};

use crate::handlers::messages::Message;
use crate::state::history::{HistoryEntry, HistoryFilter, HistoryStore};
use crate::state::stack::NotificationStack;
use crate::subscriptions::notifications::Input;
use crate::timers::TimeoutController;

/// What the rendering layer needs to draw the popup container. Published
/// through a watch channel after every state change; the renderer is a
/// plain consumer of this and owns pixel layout itself.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadModel {
    pub visible: bool,
    pub cursor: Option<usize>,
    pub records: Vec<CardView>,
}

/// One notification plus its resolved icon
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub notification: Notification,
    pub icon: IconHandle,
}

pub struct PresentationController {
    config: NotificationsConfig,
    stack: NotificationStack,
    timers: HashMap<u32, TimeoutController>,
    /// Pending decode generation per record; completions with a stale or
    /// missing generation are discarded. Generations come from one
    /// monotonic counter, so a completion for a retired record can never
    /// match a later record that reuses its id.
    decodes: HashMap<u32, u64>,
    decode_seq: u64,
    icons: HashMap<u32, IconHandle>,
    history: HistoryStore,
    history_file: Option<PathBuf>,
    cache: ImageCache,
    visible: bool,
    /// Pointer is inside the container; every countdown is frozen
    paused: bool,
    messages: mpsc::Sender<Message>,
    feedback: mpsc::UnboundedSender<Input>,
    view: watch::Sender<ReadModel>,
}

impl PresentationController {
    pub fn new(
        config: NotificationsConfig,
        cache: ImageCache,
        history: HistoryStore,
        history_file: Option<PathBuf>,
        messages: mpsc::Sender<Message>,
        feedback: mpsc::UnboundedSender<Input>,
    ) -> (Self, watch::Receiver<ReadModel>) {
        let (view, rx) = watch::channel(ReadModel::default());
        let controller = Self {
            stack: NotificationStack::new(config.max_notifications as usize),
            config,
            timers: HashMap::new(),
            decodes: HashMap::new(),
            decode_seq: 0,
            icons: HashMap::new(),
            history,
            history_file,
            cache,
            visible: false,
            paused: false,
            messages,
            feedback,
            view,
        };
        (controller, rx)
    }

    /// Drain the engine's message stream until every sender is gone.
    pub async fn run(mut self, mut messages: mpsc::Receiver<Message>) {
        while let Some(message) = messages.recv().await {
            self.update(message);
        }
        tracing::debug!("message channel closed, presentation loop ending");
    }

    pub fn update(&mut self, message: Message) {
        match message {
            Message::Notification(notification) => {
                if let Err(err) = self.push_notification(notification) {
                    tracing::warn!("rejected notification: {err}");
                }
            }
            Message::Replace(notification) => self.replace_notification(notification),
            Message::CloseNotification(id) => self.close(id, CloseReason::CloseNotification),
            Message::Timeout { id, generation } => {
                let expired = self
                    .timers
                    .get_mut(&id)
                    .is_some_and(|t| t.note_expired(generation));
                if expired {
                    self.close(id, CloseReason::Expired);
                } else {
                    tracing::trace!("discarding stale expiry for notification {id}");
                }
            }
            Message::ImageDecoded {
                id,
                generation,
                result,
            } => self.finish_decode(id, generation, result),
            Message::Dismiss => self.dismiss_current(),
            Message::InvokeAction { id, key } => {
                if let Err(err) = self.invoke_action(id, &key) {
                    tracing::warn!("{err}");
                }
            }
            Message::Navigate(direction) => {
                self.stack.navigate(direction);
            }
            Message::PointerEnter => self.pause_all(),
            Message::PointerLeave => self.resume_all(),
            Message::CloseAll => self.close_all(CloseReason::Dismissed),
            Message::ClearHistory => self.clear_history(),
            Message::EvictAll => self.close_all(CloseReason::Undelivered),
            Message::Config(config) => self.apply_config(config),
        }
        self.publish();
    }

    /// Snapshot of the current read model, mirroring what the watch
    /// channel last published.
    pub fn read_model(&self) -> ReadModel {
        ReadModel {
            visible: self.visible,
            cursor: self.stack.cursor(),
            records: self
                .stack
                .records()
                .iter()
                .map(|n| CardView {
                    icon: self
                        .icons
                        .get(&n.id)
                        .cloned()
                        .unwrap_or_else(|| IconHandle::Named(DEFAULT_ICON.to_string())),
                    notification: n.clone(),
                })
                .collect(),
        }
    }

    /// Browse retired notifications, newest first. The history viewer's
    /// entry point.
    #[allow(dead_code)]
    pub fn history(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.history.list(filter)
    }

    fn publish(&self) {
        self.view.send_replace(self.read_model());
    }

    fn push_notification(&mut self, notification: Notification) -> Result<(), EngineError> {
        if notification.id == 0 {
            return Err(EngineError::Validation("notification id 0".to_string()));
        }

        if self
            .config
            .ignored_apps
            .iter()
            .any(|app| *app == notification.app_name)
        {
            tracing::debug!("ignoring notification from {}", notification.app_name);
            return Ok(());
        }

        if self.config.do_not_disturb {
            tracing::debug!(
                "do not disturb: notification {} goes straight to history",
                notification.id
            );
            self.record_history(&notification, None);
            return Ok(());
        }

        if self
            .config
            .single_instance_apps
            .iter()
            .any(|app| *app == notification.app_name)
        {
            let stale = self.history.clear_app(&notification.app_name);
            self.drop_entries(stale);
            if let Some(existing) = self
                .stack
                .records()
                .iter()
                .find(|n| n.app_name == notification.app_name)
                .map(|n| n.id)
            {
                self.close(existing, CloseReason::Dismissed);
            }
        }

        let id = notification.id;
        self.icons.insert(id, self.resolve_icon(&notification));
        self.spawn_decode(&notification);

        let timeout = self.effective_timeout(&notification);
        let mut timer = TimeoutController::start(id, timeout, self.messages.clone());
        if self.paused {
            timer.pause();
        }
        self.timers.insert(id, timer);

        let evicted = self.stack.insert(notification);
        for old in evicted {
            self.retire(old, CloseReason::Undelivered);
        }

        self.visible = true;
        Ok(())
    }

    fn replace_notification(&mut self, notification: Notification) {
        if !self.stack.contains(notification.id) {
            tracing::debug!(
                "replace for inactive notification {}, inserting instead",
                notification.id
            );
            if let Err(err) = self.push_notification(notification) {
                tracing::warn!("rejected replacement notification: {err}");
            }
            return;
        }

        let id = notification.id;
        let timeout = self.effective_timeout(&notification);
        if let Some(timer) = self.timers.get_mut(&id) {
            timer.restart(timeout);
            if self.paused {
                timer.pause();
            }
        }

        // The replacement may carry different pixels; the old cached file
        // would otherwise satisfy the decode-once check and keep showing
        if let Some(path) = self.cache.take(id) {
            if !self.history.retains_image(&path) {
                image_cache::remove_file(&path);
            }
        }
        self.icons.insert(id, self.resolve_icon(&notification));
        self.spawn_decode(&notification);
        self.stack.replace(notification);
    }

    /// Compute how long the record stays on screen. An explicit request is
    /// clamped by the per-urgency maximum; a request of zero never
    /// expires; an unset request falls back to policy, which for critical
    /// notifications is to stay until acted on.
    fn effective_timeout(&self, notification: &Notification) -> Option<Duration> {
        let urgency = notification.urgency();
        let millis = match notification.expire_timeout {
            requested if requested > 0 => {
                let max = match urgency {
                    NotificationUrgency::Critical => self.config.max_timeout_urgent,
                    NotificationUrgency::Normal => self.config.max_timeout_normal,
                    NotificationUrgency::Low => self.config.max_timeout_low,
                };
                let requested = requested as u32;
                Some(max.map_or(requested, |max| requested.min(max)))
            }
            0 => None,
            _ => match urgency {
                NotificationUrgency::Critical => None,
                NotificationUrgency::Normal => Some(self.config.default_timeout_normal),
                NotificationUrgency::Low => Some(self.config.default_timeout_low),
            },
        };
        millis.map(|ms| Duration::from_millis(u64::from(ms)))
    }

    /// Synchronously resolvable icon for the record. Inline pixel data
    /// starts out on the app-icon fallback and upgrades once the off-loop
    /// decode lands.
    fn resolve_icon(&self, notification: &Notification) -> IconHandle {
        match notification.image() {
            Some(Image::Name(name)) => image_cache::resolve_icon_name(name),
            Some(Image::File(path)) => IconHandle::Path(path.clone()),
            Some(Image::Data { .. }) | None => {
                if notification.app_icon.is_empty() {
                    IconHandle::Named(DEFAULT_ICON.to_string())
                } else {
                    image_cache::resolve_icon_name(&notification.app_icon)
                }
            }
        }
    }

    fn spawn_decode(&mut self, notification: &Notification) {
        let Some(Image::Data {
            width,
            height,
            data,
        }) = notification.image()
        else {
            return;
        };
        let id = notification.id;
        let generation = self.decode_seq;
        self.decode_seq += 1;
        self.decodes.insert(id, generation);

        let (width, height) = (*width, *height);
        let data = Arc::clone(data);
        let messages = self.messages.clone();
        tokio::task::spawn_blocking(move || {
            let result = ProcessedImage::from_rgba(width, height, data.to_vec());
            _ = messages.blocking_send(Message::ImageDecoded {
                id,
                generation,
                result,
            });
        });
    }

    fn finish_decode(
        &mut self,
        id: u32,
        generation: u64,
        result: Result<ProcessedImage, modus_notifications_util::DecodeError>,
    ) {
        if self.decodes.get(&id) != Some(&generation) {
            tracing::debug!("discarding stale decode result for notification {id}");
            return;
        }
        self.decodes.remove(&id);
        if !self.stack.contains(id) {
            tracing::debug!("notification {id} retired before its decode completed");
            return;
        }
        match result {
            Ok(image) => match self.cache.store(id, &image) {
                Ok(path) => {
                    self.icons.insert(id, IconHandle::Path(path));
                }
                Err(err) => {
                    tracing::warn!("failed to cache image for notification {id}: {err}");
                }
            },
            Err(err) => {
                tracing::warn!("image decode failed for notification {id}: {err}");
            }
        }
    }

    fn dismiss_current(&mut self) {
        if let Some(id) = self.stack.current().map(|n| n.id) {
            self.close(id, CloseReason::Dismissed);
        }
    }

    fn invoke_action(&mut self, id: u32, key: &str) -> Result<(), EngineError> {
        let Some(notification) = self.stack.get(id) else {
            return Err(EngineError::NotFound(id));
        };
        let action = key.parse::<ActionId>().unwrap_or(ActionId::Default);
        if !notification.declares_action(&action) {
            return Err(EngineError::InvalidAction {
                id,
                key: key.to_string(),
            });
        }
        _ = self.feedback.send(Input::ActionInvoked {
            id,
            key: action.to_string(),
        });
        self.close(id, CloseReason::Dismissed);
        Ok(())
    }

    /// Remove the record if present. A close racing a dismissal is
    /// expected; the id being gone already is not an error.
    fn close(&mut self, id: u32, reason: CloseReason) {
        let Some(notification) = self.stack.remove(id) else {
            tracing::debug!("close for inactive notification {id}, ignoring");
            return;
        };
        self.retire(notification, reason);
        if self.stack.is_empty() {
            self.visible = false;
        }
    }

    fn close_all(&mut self, reason: CloseReason) {
        for notification in self.stack.drain() {
            self.retire(notification, reason);
        }
        self.visible = false;
    }

    /// Shared retirement tail: stop the timer, move the cached image into
    /// history ownership, log the record, and tell the source.
    fn retire(&mut self, notification: Notification, reason: CloseReason) {
        let id = notification.id;
        if let Some(mut timer) = self.timers.remove(&id) {
            timer.cancel();
        }
        self.decodes.remove(&id);
        self.icons.remove(&id);

        let cached = self.cache.take(id);
        if notification.transient() {
            // Transient notifications leave no trace
            if let Some(path) = cached {
                if !self.history.retains_image(&path) {
                    image_cache::remove_file(&path);
                }
            }
        } else {
            self.record_history(&notification, cached);
        }

        _ = self.feedback.send(Input::Closed { id, reason });
    }

    fn record_history(&mut self, notification: &Notification, cached_image: Option<PathBuf>) {
        let dropped = self
            .history
            .append(HistoryEntry::new(notification, cached_image));
        self.drop_entries(dropped.into_iter().collect());
        self.save_history();
    }

    fn drop_entries(&mut self, dropped: Vec<HistoryEntry>) {
        for entry in dropped {
            let Some(path) = entry.cached_image else {
                continue;
            };
            if !self.history.retains_image(&path) && !self.cache.is_active_path(&path) {
                image_cache::remove_file(&path);
            }
        }
    }

    /// Empty the history log and reclaim its cached images. Active
    /// notifications are unaffected.
    fn clear_history(&mut self) {
        let removed = self.history.clear();
        self.drop_entries(removed);
        self.save_history();
    }

    fn save_history(&self) {
        if let Some(path) = &self.history_file {
            if let Err(err) = self.history.save(path) {
                tracing::warn!("failed to save history snapshot: {err}");
            }
        }
    }

    /// Freeze every countdown while the pointer is over the container.
    /// Idempotent; the whole stack freezes so a hidden record cannot
    /// silently expire while the user is navigating.
    fn pause_all(&mut self) {
        if self.paused {
            return;
        }
        self.paused = true;
        for timer in self.timers.values_mut() {
            timer.pause();
        }
    }

    fn resume_all(&mut self) {
        if !self.paused {
            return;
        }
        self.paused = false;
        for timer in self.timers.values_mut() {
            timer.resume();
        }
    }

    fn apply_config(&mut self, config: NotificationsConfig) {
        self.config = config;
        for old in self.stack.set_capacity(self.config.max_notifications as usize) {
            self.retire(old, CloseReason::Undelivered);
        }
        if self.stack.is_empty() {
            self.visible = false;
        }
    }
}
