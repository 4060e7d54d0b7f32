use std::collections::HashSet;

use super::{derive_title, Note, NoteId, DEFAULT_TITLE, MAX_NOTES};
use crate::error::NoteError;
use crate::storage::{KeyValueStore, Persistence};

/// Ordered note collection plus the active-note pointer.
///
/// Every committed mutation writes the whole collection and the active id
/// back through the persistence adapter before returning. The collection is
/// never empty and the active id always names a note in it.
#[derive(Debug)]
pub struct NoteStore<S> {
    persistence: Persistence<S>,
    notes: Vec<Note>,
    active: NoteId,
}

impl<S: KeyValueStore> NoteStore<S> {
    /// Loads the stored collection, repairing whatever breaks the store's
    /// invariants. Unreadable storage yields a single default note.
    pub fn load(persistence: Persistence<S>) -> Self {
        let loaded = persistence.load_notes();
        let mut repaired = loaded.degraded;

        let mut seen = HashSet::new();
        let mut notes = Vec::with_capacity(loaded.notes.len().min(MAX_NOTES));
        for note in loaded.notes {
            if !seen.insert(note.id) {
                tracing::warn!(note_id = %note.id, "dropping note with duplicate id");
                repaired = true;
                continue;
            }
            notes.push(note);
        }
        if notes.len() > MAX_NOTES {
            tracing::warn!(stored = notes.len(), "stored notes exceed the limit, truncating");
            notes.truncate(MAX_NOTES);
            repaired = true;
        }

        if notes.is_empty() {
            let note = Note::blank(NoteId::next_after([]));
            let id = note.id;
            notes.push(note);
            let mut store = Self {
                persistence,
                notes,
                active: id,
            };
            if let Err(err) = store.persist() {
                tracing::warn!(?err, "could not persist default note");
            }
            return store;
        }

        let first = notes[0].id;
        let active = match loaded.active {
            Some(id) if notes.iter().any(|note| note.id == id) => id,
            other => {
                if other.is_some() {
                    tracing::debug!(missing = ?other, "active note missing, using first note");
                }
                repaired = true;
                first
            }
        };

        let mut store = Self {
            persistence,
            notes,
            active,
        };
        if repaired {
            if let Err(err) = store.persist() {
                tracing::warn!(?err, "could not persist repaired notes");
            }
        }
        store
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.notes.len() >= MAX_NOTES
    }

    pub fn active_id(&self) -> NoteId {
        self.active
    }

    pub fn active_note(&self) -> &Note {
        // load() and every mutation keep `active` pointing into `notes`
        match self.position(self.active) {
            Some(index) => &self.notes[index],
            None => &self.notes[0],
        }
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == id)
    }

    pub fn persistence(&self) -> &Persistence<S> {
        &self.persistence
    }

    pub fn persistence_mut(&mut self) -> &mut Persistence<S> {
        &mut self.persistence
    }

    /// Inserts an empty note at the front and makes it active.
    pub fn create(&mut self) -> Result<NoteId, NoteError> {
        self.ensure_capacity()?;
        let note = Note::blank(self.next_id());
        Ok(self.insert_front(note)?)
    }

    /// Makes `id` active. Unknown ids fall back to the first note. Returns
    /// whether the active pointer moved.
    pub fn select(&mut self, id: NoteId) -> Result<bool, NoteError> {
        if id == self.active {
            return Ok(false);
        }
        let target = if self.position(id).is_some() {
            id
        } else {
            tracing::debug!(note_id = %id, "selected note missing, using first note");
            self.notes[0].id
        };
        if target == self.active {
            return Ok(false);
        }
        let saved = self.snapshot();
        self.active = target;
        self.persist_or_restore(saved)?;
        Ok(true)
    }

    /// Removes `id`. Deleting the active note activates the first remaining
    /// one; deleting the last note synthesises a fresh default note.
    pub fn delete(&mut self, id: NoteId) -> Result<bool, NoteError> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let saved = self.snapshot();
        self.notes.remove(index);
        if self.notes.is_empty() {
            let note = Note::blank(self.next_id_after(id));
            self.active = note.id;
            self.notes.push(note);
        } else if self.active == id {
            self.active = self.notes[0].id;
        }
        self.persist_or_restore(saved)?;
        Ok(true)
    }

    /// Sets a user-chosen title; the title is never derived again.
    pub fn rename(&mut self, id: NoteId, new_title: &str) -> Result<bool, NoteError> {
        let new_title = new_title.trim();
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        if new_title.is_empty() || self.notes[index].title == new_title {
            return Ok(false);
        }
        let saved = self.snapshot();
        let note = &mut self.notes[index];
        note.title = new_title.to_string();
        note.is_renamed = true;
        self.persist_or_restore(saved)?;
        Ok(true)
    }

    /// Stores new content for `id`, re-deriving the title from `plain_text`
    /// unless the note was renamed. Writes only when something changed.
    pub fn update_content(
        &mut self,
        id: NoteId,
        content: &str,
        plain_text: &str,
    ) -> Result<bool, NoteError> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let saved = self.snapshot();
        let note = &mut self.notes[index];
        let mut changed = false;
        if !note.is_renamed {
            let title = derive_title(plain_text);
            if title != note.title {
                note.title = title;
                changed = true;
            }
        }
        if note.content != content {
            note.content = content.to_string();
            changed = true;
        }
        if changed {
            self.persist_or_restore(saved)?;
        }
        Ok(changed)
    }

    /// Like [`create`](Self::create) but with the shared content and a fixed
    /// title.
    pub fn import_from_share(&mut self, content: String, title: String) -> Result<NoteId, NoteError> {
        self.import(content, title)
    }

    pub fn import(&mut self, content: String, title: String) -> Result<NoteId, NoteError> {
        self.ensure_capacity()?;
        let title = if title.trim().is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            title
        };
        let note = Note::imported(self.next_id(), title, content);
        Ok(self.insert_front(note)?)
    }

    /// Copies `id` into a new note at the front, keeping its content and
    /// title, and makes the copy active.
    pub fn duplicate(&mut self, id: NoteId) -> Result<Option<NoteId>, NoteError> {
        let Some(source) = self.get(id) else {
            return Ok(None);
        };
        let (title, content, is_renamed) =
            (source.title.clone(), source.content.clone(), source.is_renamed);
        self.ensure_capacity()?;
        let mut note = Note::imported(self.next_id(), title, content);
        note.is_renamed = is_renamed;
        Ok(Some(self.insert_front(note)?))
    }

    fn ensure_capacity(&self) -> Result<(), NoteError> {
        if self.is_full() {
            tracing::warn!(max = MAX_NOTES, "note limit reached");
            return Err(NoteError::NoteLimitReached { max: MAX_NOTES });
        }
        Ok(())
    }

    fn insert_front(&mut self, note: Note) -> anyhow::Result<NoteId> {
        let id = note.id;
        let saved = self.snapshot();
        self.notes.insert(0, note);
        self.active = id;
        self.persist_or_restore(saved)?;
        Ok(id)
    }

    fn next_id(&self) -> NoteId {
        NoteId::next_after(self.notes.iter().map(|note| &note.id))
    }

    fn next_id_after(&self, removed: NoteId) -> NoteId {
        NoteId::next_after(std::iter::once(&removed))
    }

    fn position(&self, id: NoteId) -> Option<usize> {
        self.notes.iter().position(|note| note.id == id)
    }

    fn persist(&mut self) -> anyhow::Result<()> {
        self.persistence.save_notes(&self.notes, self.active)
    }

    fn snapshot(&self) -> (Vec<Note>, NoteId) {
        (self.notes.clone(), self.active)
    }

    /// A write that fails leaves the in-memory collection as it was before
    /// the mutation.
    fn persist_or_restore(&mut self, (notes, active): (Vec<Note>, NoteId)) -> anyhow::Result<()> {
        if let Err(err) = self.persist() {
            tracing::warn!(?err, "write failed, rolling back in-memory notes");
            self.notes = notes;
            self.active = active;
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, KEY_ACTIVE_NOTE, KEY_NOTES};
    use assert_matches::assert_matches;

    fn empty_store() -> NoteStore<MemoryStore> {
        NoteStore::load(Persistence::new(MemoryStore::new()))
    }

    fn writes(store: &NoteStore<MemoryStore>) -> usize {
        store.persistence().store().writes()
    }

    #[test]
    fn load_from_empty_storage_synthesises_default_note() {
        let store = empty_store();
        assert_eq!(store.len(), 1);
        let note = store.active_note();
        assert_eq!(note.title, DEFAULT_TITLE);
        assert_eq!(note.content, "");
        assert!(!note.is_renamed);
        assert_eq!(store.persistence().store().raw(KEY_ACTIVE_NOTE), Some(note.id.to_string().as_str()));
    }

    #[test]
    fn load_repairs_duplicates_overflow_and_dangling_active() {
        let notes: Vec<Note> = (1..=12)
            .chain([3])
            .map(|n| Note::blank(NoteId::new(n)))
            .collect();
        let raw = serde_json::to_string(&notes).expect("serialise");
        let store = NoteStore::load(Persistence::new(MemoryStore::with_entries([
            (KEY_NOTES, raw.as_str()),
            (KEY_ACTIVE_NOTE, "99"),
        ])));
        assert_eq!(store.len(), MAX_NOTES);
        assert_eq!(store.active_id(), NoteId::new(1));
        let ids: HashSet<_> = store.notes().iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), MAX_NOTES);
        assert_eq!(store.persistence().store().raw(KEY_ACTIVE_NOTE), Some("1"));
    }

    #[test]
    fn load_keeps_valid_state_without_writing() {
        let notes = vec![Note::blank(NoteId::new(1)), Note::blank(NoteId::new(2))];
        let raw = serde_json::to_string(&notes).expect("serialise");
        let store = NoteStore::load(Persistence::new(MemoryStore::with_entries([
            (KEY_NOTES, raw.as_str()),
            (KEY_ACTIVE_NOTE, "2"),
        ])));
        assert_eq!(store.active_id(), NoteId::new(2));
        assert_eq!(writes(&store), 0);
    }

    #[test]
    fn create_inserts_at_front_and_activates() -> anyhow::Result<()> {
        let mut store = empty_store();
        let first = store.active_id();
        let created = store.create()?;
        assert_eq!(store.notes()[0].id, created);
        assert_eq!(store.notes()[1].id, first);
        assert_eq!(store.active_id(), created);
        assert!(created > first);
        Ok(())
    }

    #[test]
    fn create_at_capacity_is_rejected_without_change() -> anyhow::Result<()> {
        let mut store = empty_store();
        while store.len() < MAX_NOTES {
            store.create()?;
        }
        let before = store.notes().to_vec();
        let active = store.active_id();
        let writes_before = writes(&store);

        assert_matches!(store.create(), Err(NoteError::NoteLimitReached { max: 10 }));
        assert_eq!(store.notes(), before.as_slice());
        assert_eq!(store.active_id(), active);
        assert_eq!(writes(&store), writes_before);
        Ok(())
    }

    #[test]
    fn select_same_note_is_noop_and_unknown_falls_back_to_first() -> anyhow::Result<()> {
        let mut store = empty_store();
        let older = store.active_id();
        let newer = store.create()?;
        assert!(!store.select(newer)?);

        assert!(store.select(older)?);
        assert_eq!(store.active_id(), older);

        assert!(store.select(NoteId::new(-1))?);
        assert_eq!(store.active_id(), newer);
        Ok(())
    }

    #[test]
    fn deleting_active_note_activates_first_remaining() -> anyhow::Result<()> {
        let mut store = empty_store();
        let a = store.active_id();
        let b = store.create()?;
        let c = store.create()?;
        store.select(b)?;

        assert!(store.delete(b)?);
        assert_eq!(store.active_id(), c);
        assert_eq!(store.len(), 2);

        assert!(store.delete(a)?);
        assert_eq!(store.active_id(), c);
        assert!(!store.delete(a)?);
        Ok(())
    }

    #[test]
    fn deleting_sole_note_synthesises_a_fresh_active_note() -> anyhow::Result<()> {
        let mut store = empty_store();
        let only = store.active_id();
        store.update_content(only, "<p>bye</p>", "bye")?;

        store.delete(only)?;
        assert_eq!(store.len(), 1);
        let fresh = store.active_note();
        assert_ne!(fresh.id, only);
        assert_eq!(fresh.content, "");
        assert_eq!(fresh.title, DEFAULT_TITLE);
        assert_eq!(store.active_id(), fresh.id);
        Ok(())
    }

    #[test]
    fn rename_ignores_blank_and_identical_titles() -> anyhow::Result<()> {
        let mut store = empty_store();
        let id = store.active_id();
        assert!(!store.rename(id, "   ")?);
        assert!(!store.rename(id, DEFAULT_TITLE)?);
        assert!(!store.active_note().is_renamed);

        assert!(store.rename(id, "  Shopping ")?);
        assert_eq!(store.active_note().title, "Shopping");
        assert!(store.active_note().is_renamed);
        Ok(())
    }

    #[test]
    fn update_content_derives_title_until_renamed() -> anyhow::Result<()> {
        let mut store = empty_store();
        let id = store.active_id();
        store.update_content(id, "<p>Draft</p><p>body</p>", "Draft\nbody")?;
        assert_eq!(store.active_note().title, "Draft");

        store.rename(id, "Pinned title")?;
        for (markup, text) in [("<p>Other</p>", "Other"), ("", ""), ("<p>x</p>", "x")] {
            store.update_content(id, markup, text)?;
            assert_eq!(store.active_note().title, "Pinned title");
        }
        Ok(())
    }

    #[test]
    fn update_content_without_change_does_not_write() -> anyhow::Result<()> {
        let mut store = empty_store();
        let id = store.active_id();
        assert!(store.update_content(id, "<p>a</p>", "a")?);
        let after_first = writes(&store);
        assert!(!store.update_content(id, "<p>a</p>", "a")?);
        assert_eq!(writes(&store), after_first);
        Ok(())
    }

    #[test]
    fn import_marks_title_as_renamed_and_respects_limit() -> anyhow::Result<()> {
        let mut store = empty_store();
        let id = store.import_from_share("<p>Hello</p>".into(), "Hello".into())?;
        assert_eq!(store.notes()[0].id, id);
        assert_eq!(store.active_id(), id);
        assert!(store.active_note().is_renamed);

        while !store.is_full() {
            store.create()?;
        }
        assert_matches!(
            store.import_from_share("x".into(), "x".into()),
            Err(NoteError::NoteLimitReached { .. })
        );
        assert_eq!(store.len(), MAX_NOTES);
        Ok(())
    }

    #[test]
    fn failed_write_surfaces_as_persistence_error() {
        let mut backing = MemoryStore::new();
        backing.fail_writes(true);
        let mut store = NoteStore::load(Persistence::new(backing));
        assert_eq!(store.len(), 1);
        assert_matches!(store.create(), Err(NoteError::Persistence(_)));
    }

    #[test]
    fn failed_writes_leave_collection_and_active_untouched() -> anyhow::Result<()> {
        let mut store = empty_store();
        let older = store.active_id();
        store.update_content(older, "<p>first</p>", "first")?;
        let newer = store.create()?;
        store.update_content(newer, "<p>second</p>", "second")?;
        let before = store.notes().to_vec();

        store.persistence_mut().store_mut().fail_writes(true);
        assert_matches!(store.select(older), Err(NoteError::Persistence(_)));
        assert_matches!(store.delete(newer), Err(NoteError::Persistence(_)));
        assert_matches!(store.create(), Err(NoteError::Persistence(_)));
        assert_matches!(store.duplicate(older), Err(NoteError::Persistence(_)));
        assert_matches!(store.rename(older, "Other"), Err(NoteError::Persistence(_)));
        assert_matches!(
            store.update_content(newer, "<p>lost</p>", "lost"),
            Err(NoteError::Persistence(_))
        );
        assert_eq!(store.notes(), before.as_slice());
        assert_eq!(store.active_id(), newer);

        store.persistence_mut().store_mut().fail_writes(false);
        assert!(store.select(older)?);
        assert_eq!(store.active_note().content, "<p>first</p>");
        Ok(())
    }

    #[test]
    fn create_after_an_id_at_the_ceiling_stays_unique() -> anyhow::Result<()> {
        let notes = vec![Note::blank(NoteId::new(i64::MAX))];
        let raw = serde_json::to_string(&notes)?;
        let mut store = NoteStore::load(Persistence::new(MemoryStore::with_entries([
            (KEY_NOTES, raw.as_str()),
            (KEY_ACTIVE_NOTE, "9223372036854775807"),
        ])));
        let first = store.create()?;
        let second = store.create()?;
        let ids: HashSet<_> = store.notes().iter().map(|n| n.id).collect();
        assert_eq!(ids.len(), 3);
        assert_ne!(first, NoteId::new(i64::MAX));
        assert_ne!(second, first);
        Ok(())
    }

    #[test]
    fn duplicate_copies_content_and_title_to_the_front() -> anyhow::Result<()> {
        let mut store = empty_store();
        let source = store.active_id();
        store.update_content(source, "<p>Plan</p><p>steps</p>", "Plan\nsteps")?;
        store.rename(source, "Pinned")?;

        let copy = store.duplicate(source)?.expect("source exists");
        assert_eq!(store.notes()[0].id, copy);
        assert_eq!(store.active_id(), copy);
        let note = store.active_note();
        assert_eq!(note.content, "<p>Plan</p><p>steps</p>");
        assert_eq!(note.title, "Pinned");
        assert!(note.is_renamed);
        assert_eq!(store.get(source).map(|n| n.content.as_str()), Some("<p>Plan</p><p>steps</p>"));

        assert_eq!(store.duplicate(NoteId::new(-5))?, None);
        while !store.is_full() {
            store.create()?;
        }
        assert_matches!(store.duplicate(source), Err(NoteError::NoteLimitReached { .. }));
        Ok(())
    }

    #[test]
    fn state_survives_reload() -> anyhow::Result<()> {
        let mut store = empty_store();
        let id = store.create()?;
        store.update_content(id, "<p>kept</p>", "kept")?;
        let backing = store.persistence.into_inner();

        let reloaded = NoteStore::load(Persistence::new(backing));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.active_id(), id);
        assert_eq!(reloaded.active_note().content, "<p>kept</p>");
        assert_eq!(reloaded.active_note().title, "kept");
        Ok(())
    }
}
