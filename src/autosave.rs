use std::time::{Duration, Instant};

use time::OffsetDateTime;

use crate::config::AutoSaveConfig;
use crate::notes::NoteId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoSaveStatus {
    Disabled,
    Idle {
        last_saved_at: Option<OffsetDateTime>,
    },
    Pending {
        since: OffsetDateTime,
    },
    Error {
        message: String,
        occurred_at: OffsetDateTime,
    },
}

#[derive(Debug, Clone)]
pub enum AutoSaveEvent {
    Saved {
        note_id: NoteId,
        timestamp: OffsetDateTime,
    },
    Error {
        note_id: NoteId,
        message: String,
    },
}

/// Debounces editor change events into a single commit.
///
/// Owns one cancelable single-shot timer. Every edit re-arms it for the full
/// debounce window; [`poll`](Self::poll) reports when it has elapsed. Time is
/// passed in by the caller so tests can step it deterministically.
#[derive(Debug)]
pub struct AutosaveScheduler {
    enabled: bool,
    debounce: Duration,
    deadline: Option<Instant>,
    pending_since: Option<OffsetDateTime>,
    last_saved_at: Option<OffsetDateTime>,
    last_error: Option<AutoSaveFailure>,
    torn_down: bool,
}

#[derive(Debug, Clone)]
struct AutoSaveFailure {
    message: String,
    occurred_at: OffsetDateTime,
}

impl AutosaveScheduler {
    pub fn new(config: &AutoSaveConfig) -> Self {
        Self {
            enabled: config.enabled,
            debounce: config.debounce(),
            deadline: None,
            pending_since: None,
            last_saved_at: None,
            last_error: None,
            torn_down: false,
        }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn status(&self) -> AutoSaveStatus {
        if !self.enabled {
            return AutoSaveStatus::Disabled;
        }
        if let Some(failure) = &self.last_error {
            return AutoSaveStatus::Error {
                message: failure.message.clone(),
                occurred_at: failure.occurred_at,
            };
        }
        if let Some(since) = self.pending_since {
            return AutoSaveStatus::Pending { since };
        }
        AutoSaveStatus::Idle {
            last_saved_at: self.last_saved_at,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// When the armed timer fires, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels any armed timer and arms a new one a full window after `now`.
    pub fn note_edit(&mut self, now: Instant) {
        if !self.enabled || self.torn_down {
            return;
        }
        self.deadline = Some(now + self.debounce);
        if self.pending_since.is_none() {
            self.pending_since = Some(OffsetDateTime::now_utc());
        }
    }

    /// Fires the timer if its window has elapsed. A fired timer is disarmed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
        self.pending_since = None;
    }

    /// Cancels the timer for good; later edits no longer arm it.
    pub fn teardown(&mut self) {
        self.cancel();
        self.torn_down = true;
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn record_saved(&mut self, note_id: NoteId) -> AutoSaveEvent {
        let timestamp = OffsetDateTime::now_utc();
        self.pending_since = None;
        self.last_saved_at = Some(timestamp);
        self.last_error = None;
        AutoSaveEvent::Saved { note_id, timestamp }
    }

    pub fn record_error(&mut self, note_id: NoteId, message: String) -> AutoSaveEvent {
        self.last_error = Some(AutoSaveFailure {
            message: message.clone(),
            occurred_at: OffsetDateTime::now_utc(),
        });
        AutoSaveEvent::Error { note_id, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(debounce_ms: u64) -> AutosaveScheduler {
        AutosaveScheduler::new(&AutoSaveConfig {
            enabled: true,
            debounce_ms,
        })
    }

    #[test]
    fn fires_once_after_quiet_window() {
        let mut autosave = scheduler(1000);
        let start = Instant::now();
        autosave.note_edit(start);
        assert!(!autosave.poll(start + Duration::from_millis(999)));
        assert!(autosave.poll(start + Duration::from_millis(1000)));
        assert!(!autosave.poll(start + Duration::from_secs(5)));
    }

    #[test]
    fn each_edit_restarts_the_window() {
        let mut autosave = scheduler(1000);
        let start = Instant::now();
        autosave.note_edit(start);
        autosave.note_edit(start + Duration::from_millis(800));
        assert!(!autosave.poll(start + Duration::from_millis(1500)));
        assert!(autosave.poll(start + Duration::from_millis(1800)));
    }

    #[test]
    fn cancel_and_teardown_disarm() {
        let mut autosave = scheduler(10);
        let start = Instant::now();
        autosave.note_edit(start);
        autosave.cancel();
        assert!(!autosave.poll(start + Duration::from_secs(1)));

        autosave.teardown();
        autosave.note_edit(start);
        assert!(!autosave.is_armed());
        assert!(!autosave.poll(start + Duration::from_secs(1)));
    }

    #[test]
    fn disabled_scheduler_never_arms() {
        let mut autosave = AutosaveScheduler::new(&AutoSaveConfig {
            enabled: false,
            debounce_ms: 0,
        });
        autosave.note_edit(Instant::now());
        assert!(!autosave.is_armed());
        assert_eq!(autosave.status(), AutoSaveStatus::Disabled);
    }

    #[test]
    fn status_tracks_pending_and_saved() {
        let mut autosave = scheduler(1000);
        assert_eq!(autosave.status(), AutoSaveStatus::Idle { last_saved_at: None });
        autosave.note_edit(Instant::now());
        assert!(matches!(autosave.status(), AutoSaveStatus::Pending { .. }));
        autosave.record_saved(NoteId::new(1));
        assert!(matches!(
            autosave.status(),
            AutoSaveStatus::Idle { last_saved_at: Some(_) }
        ));
        autosave.record_error(NoteId::new(1), "disk full".into());
        assert!(matches!(autosave.status(), AutoSaveStatus::Error { .. }));
    }
}
