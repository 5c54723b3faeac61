//! User-facing outcome messages, collected per operation and drained by the caller.

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// One message for the user, e.g. "Module updated" or "Could not remove course".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub detail: Option<String>,
}

impl Notice {
    #[must_use]
    pub fn success(title: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn error(title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// Inbox of pending notices shared by the services.
#[derive(Debug, Default)]
pub struct Notifications {
    inbox: Mutex<Vec<Notice>>,
}

impl Notifications {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, notice: Notice) {
        self.inbox.lock().push(notice);
    }

    /// Remove and return every pending notice, oldest first.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.inbox.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inbox.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inbox.lock().is_empty()
    }
}
