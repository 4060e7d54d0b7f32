use std::time::Instant;

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::{EditingSurface, Workspace};
use crate::error::NoteError;
use crate::notes::{NoteId, MAX_NOTES};
use crate::storage::KeyValueStore;

/// Everything a host UI can ask of the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// The surface content changed.
    Edited,
    Save,
    NewNote,
    Select(NoteId),
    Delete(NoteId),
    Rename { id: NoteId, title: String },
    /// Copies a note into a new one at the front.
    Duplicate(NoteId),
    ClearContent,
    /// Literal find and replace over the visible text of the active note.
    Replace { find: String, replacement: String },
    InsertDateTime,
    ToggleDarkMode,
    ToggleViewLock,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Scheduled,
    Saved { written: bool },
    Created(NoteId),
    Selected { changed: bool },
    Deleted { removed: bool },
    Renamed { changed: bool },
    Duplicated(NoteId),
    Cleared,
    Replaced { count: usize },
    Inserted(String),
    DarkMode(bool),
    ViewLock(bool),
    TornDown,
}

impl<S: KeyValueStore, E: EditingSurface> Workspace<S, E> {
    pub fn dispatch(&mut self, intent: Intent, now: Instant) -> Result<Outcome, NoteError> {
        match intent {
            Intent::Edited => {
                if !self.accepts_edits() {
                    return Ok(Outcome::Ignored);
                }
                self.autosave.note_edit(now);
                Ok(Outcome::Scheduled)
            }
            Intent::Save => {
                let written = self.flush()?;
                Ok(Outcome::Saved { written })
            }
            Intent::NewNote => {
                if self.store.is_full() {
                    tracing::warn!(max = MAX_NOTES, "new note rejected at limit");
                    return Err(NoteError::NoteLimitReached { max: MAX_NOTES });
                }
                self.commit()?;
                let id = self.store.create()?;
                self.bind_active();
                Ok(Outcome::Created(id))
            }
            Intent::Select(id) => {
                if id == self.store.active_id() && !self.detached {
                    return Ok(Outcome::Selected { changed: false });
                }
                self.commit()?;
                let changed = self.store.select(id)?;
                self.bind_active();
                Ok(Outcome::Selected { changed })
            }
            Intent::Delete(id) => {
                self.commit()?;
                let before = self.store.active_id();
                let removed = self.store.delete(id)?;
                if self.store.active_id() != before {
                    self.bind_active();
                }
                Ok(Outcome::Deleted { removed })
            }
            Intent::Rename { id, title } => {
                let changed = self.store.rename(id, &title)?;
                Ok(Outcome::Renamed { changed })
            }
            Intent::Duplicate(id) => {
                if self.store.is_full() {
                    tracing::warn!(max = MAX_NOTES, "duplicate rejected at limit");
                    return Err(NoteError::NoteLimitReached { max: MAX_NOTES });
                }
                self.commit()?;
                match self.store.duplicate(id)? {
                    Some(copy) => {
                        self.bind_active();
                        Ok(Outcome::Duplicated(copy))
                    }
                    None => Ok(Outcome::Ignored),
                }
            }
            Intent::Replace { find, replacement } => {
                if !self.accepts_edits() || find.is_empty() {
                    return Ok(Outcome::Ignored);
                }
                let count = self.surface.replace_text(&find, &replacement);
                if count > 0 {
                    self.autosave.note_edit(now);
                }
                Ok(Outcome::Replaced { count })
            }
            Intent::InsertDateTime => {
                if !self.accepts_edits() {
                    return Ok(Outcome::Ignored);
                }
                let stamp = timestamp_text(OffsetDateTime::now_utc());
                if !self.surface.insert_text(&stamp) {
                    return Ok(Outcome::Ignored);
                }
                self.autosave.note_edit(now);
                Ok(Outcome::Inserted(stamp))
            }
            Intent::ClearContent => {
                if self.view_locked || self.detached {
                    return Ok(Outcome::Ignored);
                }
                self.surface.set_content("");
                self.commit()?;
                Ok(Outcome::Cleared)
            }
            Intent::ToggleDarkMode => {
                self.set_dark_mode(!self.dark_mode)?;
                Ok(Outcome::DarkMode(self.dark_mode))
            }
            Intent::ToggleViewLock => {
                self.set_view_locked(!self.view_locked)?;
                Ok(Outcome::ViewLock(self.view_locked))
            }
            Intent::Teardown => {
                let flushed = self.commit();
                self.autosave.teardown();
                flushed?;
                Ok(Outcome::TornDown)
            }
        }
    }

    fn accepts_edits(&self) -> bool {
        !(self.view_locked || self.detached || self.autosave.is_torn_down())
    }
}

/// Local wall-clock time in a fixed, sortable layout. Falls back to UTC
/// when the local offset is unknown.
fn timestamp_text(now: OffsetDateTime) -> String {
    let local = UtcOffset::current_local_offset()
        .map(|offset| now.to_offset(offset))
        .unwrap_or(now);
    local
        .format(&format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"))
        .unwrap_or_else(|_| now.unix_timestamp().to_string())
}
