//! User-facing notices
//!
//! Remote failures in the favorites subsystem never propagate as panics or
//! unhandled errors; they are turned into notices here. The front end drains
//! pending notices and decides how to present them.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Notices kept when nobody drains the board
const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);

    fn info(&self, message: &str) {
        self.notify(NoticeLevel::Info, message);
    }

    fn error(&self, message: &str) {
        self.notify(NoticeLevel::Error, message);
    }
}

/// Bounded queue of pending notices; the oldest are dropped once full
pub struct NoticeBoard {
    pending: Mutex<VecDeque<Notice>>,
    capacity: usize,
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NoticeBoard {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Notice>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending().is_empty()
    }

    /// Removes and returns every pending notice, oldest first
    pub fn take_pending(&self) -> Vec<Notice> {
        self.pending().drain(..).collect()
    }
}

impl Notifier for NoticeBoard {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => tracing::info!(notice = %message, "User notice"),
            NoticeLevel::Error => tracing::warn!(notice = %message, "User error notice"),
        }

        let mut pending = self.pending();
        if pending.len() == self.capacity {
            pending.pop_front();
        }
        pending.push_back(Notice {
            level,
            message: message.to_string(),
            at: Utc::now(),
        });
    }
}
