//! Per-notification expiry countdowns.
//!
//! Each controller owns at most one armed sleep task. Expiry is pushed
//! into the engine's message channel; every other transition is driven
//! synchronously by the engine. Cancellation bumps a generation counter so
//! an expiry message that was already in flight is recognized as stale and
//! dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::handlers::messages::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Running,
    Paused,
    Expired,
    Cancelled,
}

pub struct TimeoutController {
    id: u32,
    state: TimerState,
    /// Budget left on the countdown; `None` never expires
    remaining: Option<Duration>,
    /// When the current running stretch began
    resumed_at: Option<Instant>,
    generation: u64,
    task: Option<JoinHandle<()>>,
    messages: mpsc::Sender<Message>,
}

impl TimeoutController {
    /// Create a running controller. `timeout` of `None` means the record
    /// never expires on its own; it still participates in pause/resume and
    /// can only be ended by cancel.
    pub fn start(id: u32, timeout: Option<Duration>, messages: mpsc::Sender<Message>) -> Self {
        let mut controller = Self {
            id,
            state: TimerState::Running,
            remaining: timeout,
            resumed_at: None,
            generation: 0,
            task: None,
            messages,
        };
        controller.arm();
        controller
    }

    #[allow(dead_code)]
    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Budget left right now, accounting for time elapsed since the last
    /// resume. `None` for never-expiring controllers.
    #[allow(dead_code)]
    pub fn remaining(&self) -> Option<Duration> {
        let remaining = self.remaining?;
        match (self.state, self.resumed_at) {
            (TimerState::Running, Some(resumed_at)) => {
                Some(remaining.saturating_sub(resumed_at.elapsed()))
            }
            _ => Some(remaining),
        }
    }

    fn arm(&mut self) {
        let Some(remaining) = self.remaining else {
            return;
        };
        self.resumed_at = Some(Instant::now());
        let messages = self.messages.clone();
        let id = self.id;
        let generation = self.generation;
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            _ = messages.send(Message::Timeout { id, generation }).await;
        }));
    }

    fn disarm(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Freeze the countdown, preserving the remaining budget exactly.
    /// Pausing an already-paused or terminal controller is a no-op.
    pub fn pause(&mut self) {
        if self.state != TimerState::Running {
            return;
        }
        self.disarm();
        if let (Some(remaining), Some(resumed_at)) = (self.remaining, self.resumed_at) {
            self.remaining = Some(remaining.saturating_sub(resumed_at.elapsed()));
        }
        self.resumed_at = None;
        self.state = TimerState::Paused;
    }

    /// Re-arm a paused countdown with its preserved budget. Resuming a
    /// running or terminal controller is a no-op.
    pub fn resume(&mut self) {
        if self.state != TimerState::Paused {
            return;
        }
        self.state = TimerState::Running;
        self.arm();
    }

    /// Restart the countdown from a fresh budget, e.g. when the source
    /// replaces the record.
    pub fn restart(&mut self, timeout: Option<Duration>) {
        if matches!(self.state, TimerState::Expired | TimerState::Cancelled) {
            return;
        }
        self.disarm();
        self.remaining = timeout;
        self.resumed_at = None;
        self.state = TimerState::Running;
        self.arm();
    }

    /// Terminal stop. No expiry message is delivered after this returns,
    /// even one already in flight.
    pub fn cancel(&mut self) {
        if matches!(self.state, TimerState::Expired | TimerState::Cancelled) {
            return;
        }
        self.disarm();
        self.resumed_at = None;
        self.state = TimerState::Cancelled;
    }

    /// Acknowledge a delivered expiry message. Returns false for stale
    /// generations and non-running states; true marks the controller
    /// expired.
    pub fn note_expired(&mut self, generation: u64) -> bool {
        if self.state != TimerState::Running || generation != self.generation {
            return false;
        }
        self.task = None;
        self.remaining = Some(Duration::ZERO);
        self.resumed_at = None;
        self.state = TimerState::Expired;
        true
    }
}

impl Drop for TimeoutController {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
