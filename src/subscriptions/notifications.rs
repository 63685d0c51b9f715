//! D-Bus boundary with the notification source.
//!
//! Serves `org.freedesktop.Notifications` and forwards inbound calls into
//! the engine's message channel. Outbound engine feedback (closes, action
//! invocations) comes back through [`serve`] and leaves as bus signals.
//! The engine never blocks on the bus and the bus task never touches
//! engine state.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::time::Instant;

use modus_notifications_util::{CloseReason, Notification};
use tokio::sync::mpsc;
use tracing::error;

use zbus::{
    Connection, connection::Builder as ConnectionBuilder, interface,
    object_server::SignalEmitter,
};

use crate::constants::{
    BUS_CONNECT_ATTEMPTS, BUS_CONNECT_RETRY_DELAY, RATE_LIMIT_CLEANUP_INTERVAL,
    RATE_LIMIT_MAX_APPS, RATE_LIMIT_PER_MINUTE, RATE_LIMIT_WINDOW, VERSION,
};
use crate::handlers::messages::Message;

/// Engine feedback destined for the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Closed { id: u32, reason: CloseReason },
    ActionInvoked { id: u32, key: String },
}

#[derive(Debug)]
pub struct Conns {
    notifications: Connection,
}

impl Conns {
    /// Claim the well-known name and serve the interface, retrying a few
    /// times in case a previous daemon instance is still letting go of it.
    pub async fn new(messages: mpsc::Sender<Message>) -> zbus::Result<Self> {
        let mut last_err = None;
        for attempt in 1..=BUS_CONNECT_ATTEMPTS {
            match Self::connect(messages.clone()).await {
                Ok(conn) => {
                    return Ok(Self {
                        notifications: conn,
                    });
                }
                Err(err) => {
                    error!("bus connection attempt {attempt} failed: {err}");
                    last_err = Some(err);
                    tokio::time::sleep(BUS_CONNECT_RETRY_DELAY).await;
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| zbus::Error::Failure("could not claim the bus name".to_string())))
    }

    async fn connect(messages: mpsc::Sender<Message>) -> zbus::Result<Connection> {
        ConnectionBuilder::session()?
            .name("org.freedesktop.Notifications")?
            .serve_at(
                "/org/freedesktop/Notifications",
                Notifications {
                    messages,
                    next_id: NonZeroU64::MIN,
                    limiter: RateLimiter::default(),
                },
            )?
            .build()
            .await
    }
}

/// Relay engine feedback onto the bus until the engine goes away.
pub async fn serve(conns: Conns, mut feedback: mpsc::UnboundedReceiver<Input>) {
    while let Some(input) = feedback.recv().await {
        let object_server = conns.notifications.object_server();
        let Ok(iface_ref) = object_server
            .interface::<_, Notifications>("/org/freedesktop/Notifications")
            .await
        else {
            continue;
        };
        let emitter = iface_ref.signal_emitter();
        let sent = match input {
            Input::Closed { id, reason } => {
                Notifications::notification_closed(emitter, id, reason as u32).await
            }
            Input::ActionInvoked { id, key } => {
                Notifications::action_invoked(emitter, id, &key).await
            }
        };
        if let Err(err) = sent {
            error!("failed to emit bus signal: {err}");
        }
    }
}

/// Per-app admission window guarding against notification floods.
///
/// Tracks one (window start, count) pair per app name and refuses
/// notifications past the per-minute budget until the window rolls over.
#[derive(Default)]
struct RateLimiter {
    windows: HashMap<String, (Instant, u32)>,
}

impl RateLimiter {
    /// Whether a notification from `app_name` fits in its current window.
    fn admit(&mut self, app_name: &str) -> bool {
        if self.windows.len() >= RATE_LIMIT_MAX_APPS {
            self.prune();
        }
        // Still saturated after pruning: refuse rather than grow unbounded
        if self.windows.len() >= RATE_LIMIT_MAX_APPS {
            tracing::warn!(
                "rate limiter saturated ({} apps tracked), refusing '{app_name}'",
                self.windows.len()
            );
            return false;
        }

        let now = Instant::now();
        let (start, count) = self
            .windows
            .entry(app_name.to_string())
            .or_insert((now, 0));

        if now.duration_since(*start) > RATE_LIMIT_WINDOW {
            *start = now;
            *count = 1;
            return true;
        }
        if *count >= RATE_LIMIT_PER_MINUTE {
            tracing::warn!(
                "rate limiting '{app_name}': over {RATE_LIMIT_PER_MINUTE} notifications per minute"
            );
            return false;
        }
        *count += 1;
        true
    }

    /// Drop windows that have already rolled over.
    fn prune(&mut self) {
        let now = Instant::now();
        self.windows
            .retain(|_, (start, _)| now.duration_since(*start) <= RATE_LIMIT_WINDOW);
    }
}

pub struct Notifications {
    messages: mpsc::Sender<Message>,
    next_id: NonZeroU64,
    limiter: RateLimiter,
}

#[interface(name = "org.freedesktop.Notifications")]
impl Notifications {
    async fn close_notification(&self, id: u32) {
        if let Err(err) = self.messages.send(Message::CloseNotification(id)).await {
            tracing::error!("failed to forward CloseNotification: {err}");
        }
    }

    async fn get_capabilities(&self) -> Vec<&'static str> {
        // Retired notifications are browsable through history, hence
        // "persistence"; "icon-static" because animated frames are not
        // rendered.
        vec!["body", "icon-static", "persistence", "actions"]
    }

    #[zbus(out_args("name", "vendor", "version", "spec_version"))]
    async fn get_server_information(
        &self,
    ) -> (&'static str, &'static str, &'static str, &'static str) {
        ("modus-notifications", "Modus", VERSION, "1.2")
    }

    /// Inbound notification. `replaces_id` of 0 allocates a fresh id;
    /// anything else re-delivers an existing record. `expire_timeout` is
    /// milliseconds, with -1 leaving the choice to the server and 0
    /// meaning never expire.
    #[allow(clippy::too_many_arguments)]
    async fn notify(
        &mut self,
        app_name: &str,
        replaces_id: u32,
        app_icon: &str,
        summary: &str,
        body: &str,
        actions: Vec<&str>,
        hints: HashMap<&str, zbus::zvariant::Value<'_>>,
        expire_timeout: i32,
    ) -> u32 {
        // Amortized limiter upkeep, once per ~100 ids
        if self.next_id.get() % RATE_LIMIT_CLEANUP_INTERVAL == 0 {
            self.limiter.prune();
        }

        // Replacements do not count against the budget; the app already
        // paid for the record being replaced
        if replaces_id == 0 && !self.limiter.admit(app_name) {
            // Refused. Return a fixed non-zero id: 0 would read as an
            // error and make well-behaved clients retry, which is the
            // opposite of what a flood needs.
            tracing::debug!("rate limited '{app_name}'");
            return 1;
        }

        let id = if replaces_id == 0 {
            let id = self.next_id;
            self.next_id = self.next_id.checked_add(1).unwrap_or_else(|| {
                tracing::warn!("notification id counter wrapped");
                NonZeroU64::MIN
            });
            // The bus speaks u32; the truncation is harmless given the
            // 4.2B wrap distance against short record lifetimes
            id.get() as u32
        } else {
            replaces_id
        };

        let notification = Notification::new(
            app_name,
            id,
            app_icon,
            summary,
            body,
            actions,
            hints,
            expire_timeout,
        );
        let message = if replaces_id == 0 {
            Message::Notification(notification)
        } else {
            Message::Replace(notification)
        };
        if let Err(err) = self.messages.send(message).await {
            tracing::error!("failed to forward notification: {err}");
        }

        id
    }

    #[zbus(signal)]
    async fn action_invoked(
        signal_ctxt: &SignalEmitter<'_>,
        id: u32,
        action_key: &str,
    ) -> zbus::Result<()>;

    /// Close reasons on the wire: 1 expired, 2 dismissed by the user,
    /// 3 CloseNotification call, 4 undefined/reserved.
    #[zbus(signal)]
    async fn notification_closed(
        signal_ctxt: &SignalEmitter<'_>,
        id: u32,
        reason: u32,
    ) -> zbus::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_limiter_admits_up_to_budget() {
        let mut limiter = RateLimiter::default();
        for _ in 0..RATE_LIMIT_PER_MINUTE {
            assert!(limiter.admit("mail"));
        }
        assert!(!limiter.admit("mail"));
    }

    #[test]
    fn test_limiter_window_rolls_over() {
        let mut limiter = RateLimiter::default();
        for _ in 0..RATE_LIMIT_PER_MINUTE {
            limiter.admit("mail");
        }
        assert!(!limiter.admit("mail"));

        // Age the window past its length
        let (start, _) = limiter.windows.get_mut("mail").unwrap();
        *start = Instant::now() - (RATE_LIMIT_WINDOW + Duration::from_secs(1));

        assert!(limiter.admit("mail"));
    }

    #[test]
    fn test_limiter_apps_are_isolated() {
        let mut limiter = RateLimiter::default();
        for _ in 0..RATE_LIMIT_PER_MINUTE {
            limiter.admit("chatty");
        }
        assert!(!limiter.admit("chatty"));
        assert!(limiter.admit("quiet"));
    }

    #[test]
    fn test_prune_drops_expired_windows_only() {
        let mut limiter = RateLimiter::default();
        limiter.admit("old");
        limiter.admit("fresh");

        let (start, _) = limiter.windows.get_mut("old").unwrap();
        *start = Instant::now() - (RATE_LIMIT_WINDOW + Duration::from_secs(1));
        limiter.prune();

        assert!(!limiter.windows.contains_key("old"));
        assert!(limiter.windows.contains_key("fresh"));
    }

    #[test]
    fn test_limiter_handles_blank_app_name() {
        let mut limiter = RateLimiter::default();
        for _ in 0..RATE_LIMIT_PER_MINUTE {
            assert!(limiter.admit(""));
        }
        assert!(!limiter.admit(""));
    }
}
