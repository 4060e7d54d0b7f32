use anyhow::{Context, Result};

use super::KeyValueStore;
use crate::notes::{Note, NoteId};

pub const KEY_NOTES: &str = "notepad_notes";
pub const KEY_ACTIVE_NOTE: &str = "notepad_activeNoteId";
pub const KEY_DARK_MODE: &str = "notepad_darkMode";
pub const KEY_VIEW_LOCK: &str = "notepad_viewLocked";

/// What the store found on disk, before any invariant repair.
#[derive(Debug, Clone, Default)]
pub struct LoadedNotes {
    pub notes: Vec<Note>,
    pub active: Option<NoteId>,
    /// Something stored was unreadable and got replaced by a default.
    pub degraded: bool,
}

/// Reads and writes the note collection and preferences through a
/// [`KeyValueStore`].
#[derive(Debug)]
pub struct Persistence<S> {
    store: S,
}

impl<S: KeyValueStore> Persistence<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    /// Never fails: unreadable values degrade to an empty collection or a
    /// missing active id.
    pub fn load_notes(&self) -> LoadedNotes {
        let mut loaded = LoadedNotes::default();

        match self.store.get(KEY_NOTES) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Note>>(&raw) {
                Ok(notes) => loaded.notes = notes,
                Err(err) => {
                    tracing::warn!(?err, "stored notes are malformed, starting empty");
                    loaded.degraded = true;
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(?err, "could not read stored notes, starting empty");
                loaded.degraded = true;
            }
        }

        match self.store.get(KEY_ACTIVE_NOTE) {
            Ok(Some(raw)) => match raw.trim().parse::<NoteId>() {
                Ok(id) => loaded.active = Some(id),
                Err(err) => {
                    tracing::debug!(?err, raw = %raw, "stored active note id is not numeric");
                    loaded.degraded = true;
                }
            },
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(?err, "could not read active note id");
                loaded.degraded = true;
            }
        }

        loaded
    }

    /// Writes the collection and the active id as one logical write.
    pub fn save_notes(&mut self, notes: &[Note], active: NoteId) -> Result<()> {
        let json = serde_json::to_string(notes).context("serialising notes")?;
        let active = active.to_string();
        self.store
            .set_many(&[(KEY_NOTES, json.as_str()), (KEY_ACTIVE_NOTE, active.as_str())])
            .context("persisting notes")
    }

    pub fn dark_mode(&self) -> bool {
        self.read_flag(KEY_DARK_MODE)
    }

    pub fn set_dark_mode(&mut self, enabled: bool) -> Result<()> {
        self.write_flag(KEY_DARK_MODE, enabled)
    }

    pub fn view_locked(&self) -> bool {
        self.read_flag(KEY_VIEW_LOCK)
    }

    pub fn set_view_locked(&mut self, locked: bool) -> Result<()> {
        self.write_flag(KEY_VIEW_LOCK, locked)
    }

    fn read_flag(&self, key: &str) -> bool {
        match self.store.get(key) {
            Ok(value) => value.as_deref() == Some("true"),
            Err(err) => {
                tracing::warn!(?err, key, "could not read preference");
                false
            }
        }
    }

    fn write_flag(&mut self, key: &str, value: bool) -> Result<()> {
        let raw = if value { "true" } else { "false" };
        self.store
            .set(key, raw)
            .with_context(|| format!("persisting preference {key}"))
    }
}
