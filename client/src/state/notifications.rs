//! Ephemeral user-facing notifications.
//!
//! Each notification lives for `NOTIFICATION_TTL` and then removes itself.
//! The list is ordered oldest first. Watchers see a revision bump on every
//! push, dismissal and expiry.

#[cfg(test)]
#[path = "notifications_test.rs"]
mod notifications_test;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::util::timer::TimerHandle;

/// Lifetime of a notification.
pub const NOTIFICATION_TTL: Duration = Duration::from_millis(5000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub message: String,
    pub severity: Severity,
}

/// Shared notification list. Clones see the same list.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

#[derive(Default)]
struct Entries {
    active: Vec<Notification>,
    timers: HashMap<Uuid, TimerHandle>,
}

struct CenterInner {
    entries: Mutex<Entries>,
    revision: watch::Sender<u64>,
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationCenter {
    #[must_use]
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self { inner: Arc::new(CenterInner { entries: Mutex::new(Entries::default()), revision }) }
    }

    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.inner.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.inner.revision.send_modify(|revision| *revision += 1);
    }

    /// Show `message` until it expires. Returns its id.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn push(&self, message: impl Into<String>, severity: Severity) -> Uuid {
        let notification = Notification { id: Uuid::new_v4(), message: message.into(), severity };
        let id = notification.id;
        debug!(%id, severity = severity.as_str(), message = %notification.message, "notification");

        let weak: Weak<CenterInner> = Arc::downgrade(&self.inner);
        let timer = TimerHandle::after(NOTIFICATION_TTL, move || {
            if let Some(inner) = weak.upgrade() {
                NotificationCenter { inner }.dismiss(id);
            }
        });
        {
            let mut entries = self.entries();
            entries.active.push(notification);
            entries.timers.insert(id, timer);
        }
        self.bump();
        id
    }

    /// Remove a notification early. Returns `false` if it already expired.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let removed = {
            let mut entries = self.entries();
            entries.timers.remove(&id);
            let before = entries.active.len();
            entries.active.retain(|notification| notification.id != id);
            entries.active.len() != before
        };
        if removed {
            self.bump();
        }
        removed
    }

    /// Live notifications, oldest first.
    #[must_use]
    pub fn active(&self) -> Vec<Notification> {
        self.entries().active.clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    /// Drop every notification and cancel their expiry timers.
    pub fn shutdown(&self) {
        let taken = std::mem::take(&mut *self.entries());
        if !taken.active.is_empty() {
            self.bump();
        }
    }
}
