//! Composition root binding the note store, the autosave timer, and an
//! editing surface.

use std::time::Instant;

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use url::Url;

use crate::autosave::{AutoSaveEvent, AutoSaveStatus, AutosaveScheduler};
use crate::config::AutoSaveConfig;
use crate::error::NoteError;
use crate::markup::{self, TextStats};
use crate::notes::{derive_title, NoteId, NoteStore};
use crate::share;
use crate::sidebar::{self, SidebarView};
use crate::storage::{KeyValueStore, Persistence};

mod intent;
mod surface;

pub use intent::{Intent, Outcome};
pub use surface::{BufferSurface, EditingSurface};

pub const SHARE_ERROR_NOTE: &str =
    "<p>Error: Could not load the shared note. It might be corrupted.</p>";

static DOCUMENT_EXTENSION: Lazy<Regex> = Lazy::new(|| {
    RegexBuilder::new(r"\.(txt|html|htm)$")
        .case_insensitive(true)
        .build()
        .expect("valid extension pattern")
});

/// Result of the one-shot import from a launch URL.
#[derive(Debug)]
pub enum ShareImport {
    Imported(NoteId),
    LimitReached,
    /// Always [`NoteError::CorruptShareToken`].
    Corrupt(NoteError),
}

#[derive(Debug, Default)]
pub struct Startup {
    pub import: Option<ShareImport>,
    /// The launch URL with the share parameter removed.
    pub visible_url: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNote {
    pub file_name: String,
    pub text: String,
}

pub struct Workspace<S, E> {
    store: NoteStore<S>,
    autosave: AutosaveScheduler,
    surface: E,
    /// The surface shows something other than the active note.
    detached: bool,
    dark_mode: bool,
    view_locked: bool,
}

impl<S: KeyValueStore, E: EditingSurface> Workspace<S, E> {
    /// Loads the store, binds the surface to the active note, and runs the
    /// share import if `launch_url` carries a token. Never fails.
    pub fn open(
        backend: S,
        surface: E,
        auto_save: &AutoSaveConfig,
        launch_url: Option<&Url>,
    ) -> (Self, Startup) {
        let store = NoteStore::load(Persistence::new(backend));
        let dark_mode = store.persistence().dark_mode();
        let view_locked = store.persistence().view_locked();
        let mut workspace = Self {
            store,
            autosave: AutosaveScheduler::new(auto_save),
            surface,
            detached: false,
            dark_mode,
            view_locked,
        };
        workspace.bind_active();

        let mut startup = Startup::default();
        if let Some(url) = launch_url {
            if let Some(token) = share::extract_token(url) {
                startup.import = Some(workspace.import_shared(&token));
            }
            startup.visible_url = Some(share::strip_share_param(url));
        }
        (workspace, startup)
    }

    pub fn store(&self) -> &NoteStore<S> {
        &self.store
    }

    pub fn surface(&self) -> &E {
        &self.surface
    }

    /// Hosts edit through this and then dispatch [`Intent::Edited`].
    pub fn surface_mut(&mut self) -> &mut E {
        &mut self.surface
    }

    pub fn active_id(&self) -> NoteId {
        self.store.active_id()
    }

    pub fn sidebar(&self) -> SidebarView {
        sidebar::project(self.store.notes(), self.store.active_id())
    }

    pub fn autosave_status(&self) -> AutoSaveStatus {
        self.autosave.status()
    }

    pub fn autosave_deadline(&self) -> Option<Instant> {
        self.autosave.deadline()
    }

    pub fn stats(&self) -> TextStats {
        TextStats::of(&self.surface.plain_text())
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn view_locked(&self) -> bool {
        self.view_locked
    }

    pub fn is_torn_down(&self) -> bool {
        self.autosave.is_torn_down()
    }

    pub fn set_dark_mode(&mut self, enabled: bool) -> Result<(), NoteError> {
        self.store.persistence_mut().set_dark_mode(enabled)?;
        self.dark_mode = enabled;
        Ok(())
    }

    /// Locking makes the surface read-only; management intents still work.
    pub fn set_view_locked(&mut self, locked: bool) -> Result<(), NoteError> {
        self.store.persistence_mut().set_view_locked(locked)?;
        self.view_locked = locked;
        if !self.detached {
            self.surface.set_read_only(locked);
        }
        Ok(())
    }

    /// Fires the debounce timer if it is due and commits the surface.
    pub fn tick(&mut self, now: Instant) -> Option<AutoSaveEvent> {
        if !self.autosave.poll(now) {
            return None;
        }
        match self.commit() {
            Ok(event) => event,
            Err(err) => Some(AutoSaveEvent::Error {
                note_id: self.store.active_id(),
                message: err.to_string(),
            }),
        }
    }

    /// Commits the surface into the active note right away. Returns whether
    /// anything was written.
    pub fn flush(&mut self) -> Result<bool, NoteError> {
        Ok(self.commit()?.is_some())
    }

    /// Decodes `token` into a new note. Limit and corruption are reported,
    /// not raised.
    pub fn import_shared(&mut self, token: &str) -> ShareImport {
        if self.store.is_full() {
            tracing::warn!("note limit reached, skipping shared note import");
            return ShareImport::LimitReached;
        }
        let content = match share::decode(token) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(%err, "shared note could not be decoded");
                self.show_error_note();
                return ShareImport::Corrupt(err);
            }
        };
        if let Err(err) = self.commit() {
            tracing::error!(%err, "could not save active note before import");
        }
        let title = derive_title(&markup::plain_text(&content));
        match self.store.import_from_share(content, title) {
            Ok(id) => {
                tracing::info!(note_id = %id, "imported shared note");
                self.bind_active();
                ShareImport::Imported(id)
            }
            Err(NoteError::NoteLimitReached { .. }) => ShareImport::LimitReached,
            Err(err) => {
                tracing::error!(%err, "imported shared note was not persisted");
                self.bind_active();
                ShareImport::Imported(self.store.active_id())
            }
        }
    }

    /// Imports a text or HTML document as a new note titled after the file.
    pub fn import_document(&mut self, file_name: &str, text: &str) -> Result<NoteId, NoteError> {
        if self.store.is_full() {
            return Err(NoteError::NoteLimitReached {
                max: crate::notes::MAX_NOTES,
            });
        }
        self.commit()?;
        let (title, content) = document_note(file_name, text);
        let id = self.store.import(content, title)?;
        self.bind_active();
        Ok(id)
    }

    pub fn share_url(&self, base: &Url, id: NoteId) -> Option<Url> {
        let note = self.store.get(id)?;
        let content = if id == self.store.active_id() && !self.detached {
            self.surface.content()
        } else {
            note.content.clone()
        };
        Some(share::share_url(base, &content))
    }

    pub fn export(&self, id: NoteId) -> Option<ExportedNote> {
        let note = self.store.get(id)?;
        Some(ExportedNote {
            file_name: markup::export_file_name(&note.title),
            text: markup::plain_text(&note.content),
        })
    }

    fn commit(&mut self) -> Result<Option<AutoSaveEvent>, NoteError> {
        self.autosave.cancel();
        if self.detached {
            return Ok(None);
        }
        let id = self.store.active_id();
        let content = self.surface.content();
        let plain_text = self.surface.plain_text();
        match self.store.update_content(id, &content, &plain_text) {
            Ok(true) => {
                tracing::debug!(note_id = %id, "committed editor content");
                Ok(Some(self.autosave.record_saved(id)))
            }
            Ok(false) => Ok(None),
            Err(err) => {
                self.autosave.record_error(id, err.to_string());
                Err(err)
            }
        }
    }

    fn bind_active(&mut self) {
        let content = self.store.active_note().content.clone();
        self.surface.set_content(&content);
        self.surface.set_read_only(self.view_locked);
        self.detached = false;
    }

    fn show_error_note(&mut self) {
        self.autosave.cancel();
        self.surface.set_content(SHARE_ERROR_NOTE);
        self.surface.set_read_only(true);
        self.detached = true;
    }
}

fn document_note(file_name: &str, text: &str) -> (String, String) {
    let is_html = DOCUMENT_EXTENSION
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|ext| ext.as_str().to_ascii_lowercase().starts_with("htm"))
        .unwrap_or(false);
    let title = DOCUMENT_EXTENSION.replace(file_name, "").trim().to_string();
    let content = if is_html {
        text.replace("\r\n", "\n")
    } else {
        markup::text_to_markup(text)
    };
    (title, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{DEFAULT_TITLE, MAX_NOTES};
    use crate::storage::MemoryStore;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn config() -> AutoSaveConfig {
        AutoSaveConfig {
            enabled: true,
            debounce_ms: 1000,
        }
    }

    fn open(url: Option<&str>) -> (Workspace<MemoryStore, BufferSurface>, Startup) {
        let url = url.map(|raw| Url::parse(raw).expect("valid url"));
        Workspace::open(MemoryStore::new(), BufferSurface::new(), &config(), url.as_ref())
    }

    fn writes(workspace: &Workspace<MemoryStore, BufferSurface>) -> usize {
        workspace.store().persistence().store().writes()
    }

    fn type_text(workspace: &mut Workspace<MemoryStore, BufferSurface>, text: &str, now: Instant) {
        for ch in text.chars() {
            workspace.surface_mut().insert_char(ch);
        }
        workspace
            .dispatch(Intent::Edited, now)
            .expect("edit accepted");
    }

    #[test]
    fn debounced_edit_commits_once_window_elapses() {
        let (mut ws, _) = open(None);
        let start = Instant::now();
        type_text(&mut ws, "Hello", start);
        assert!(ws.tick(start + Duration::from_millis(500)).is_none());
        assert_eq!(ws.store().active_note().content, "");

        let event = ws.tick(start + Duration::from_millis(1000));
        assert_matches!(event, Some(AutoSaveEvent::Saved { .. }));
        assert_eq!(ws.store().active_note().content, "Hello");
        assert_eq!(ws.store().active_note().title, "Hello");
    }

    #[test]
    fn flushing_twice_writes_once() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        type_text(&mut ws, "abc", Instant::now());
        let before = writes(&ws);
        assert!(ws.flush()?);
        assert!(!ws.flush()?);
        assert_eq!(writes(&ws), before + 1);
        Ok(())
    }

    #[test]
    fn switching_notes_flushes_pending_edits() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let first = ws.active_id();
        let now = Instant::now();
        assert_matches!(ws.dispatch(Intent::NewNote, now)?, Outcome::Created(_));
        type_text(&mut ws, "second", now);
        let second = ws.active_id();

        ws.dispatch(Intent::Select(first), now)?;
        assert_eq!(ws.store().get(second).map(|n| n.content.as_str()), Some("second"));
        assert_eq!(ws.surface().buffer(), "");
        assert!(ws.tick(now + Duration::from_secs(5)).is_none());
        Ok(())
    }

    #[test]
    fn new_note_at_limit_is_rejected() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        while ws.store().len() < MAX_NOTES {
            ws.dispatch(Intent::NewNote, now)?;
        }
        let err = ws.dispatch(Intent::NewNote, now).expect_err("limit");
        assert!(err.is_limit_reached());
        assert_eq!(ws.store().len(), MAX_NOTES);
        assert!(ws.sidebar().limit_reached);
        Ok(())
    }

    #[test]
    fn deleting_active_note_rebinds_surface() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        type_text(&mut ws, "older", now);
        ws.dispatch(Intent::NewNote, now)?;
        type_text(&mut ws, "newer", now);
        let newer = ws.active_id();

        ws.dispatch(Intent::Delete(newer), now)?;
        assert_eq!(ws.surface().buffer(), "older");
        assert_eq!(ws.store().len(), 1);

        let only = ws.active_id();
        ws.dispatch(Intent::Delete(only), now)?;
        assert_eq!(ws.store().len(), 1);
        assert_ne!(ws.active_id(), only);
        assert_eq!(ws.surface().buffer(), "");
        assert_eq!(ws.store().active_note().title, DEFAULT_TITLE);
        Ok(())
    }

    #[test]
    fn renamed_title_survives_later_edits() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        let id = ws.active_id();
        ws.dispatch(
            Intent::Rename {
                id,
                title: "Mine".into(),
            },
            now,
        )?;
        type_text(&mut ws, "Something else", now);
        ws.dispatch(Intent::Save, now)?;
        assert_eq!(ws.store().active_note().title, "Mine");
        assert_eq!(ws.store().active_note().content, "Something else");
        Ok(())
    }

    #[test]
    fn clear_content_commits_immediately() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        type_text(&mut ws, "temp", now);
        ws.flush()?;
        assert_eq!(ws.dispatch(Intent::ClearContent, now)?, Outcome::Cleared);
        assert_eq!(ws.store().active_note().content, "");
        assert_eq!(ws.store().active_note().title, DEFAULT_TITLE);
        assert!(ws.autosave_deadline().is_none());
        Ok(())
    }

    #[test]
    fn view_lock_blocks_edits_and_persists() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        assert_eq!(ws.dispatch(Intent::ToggleViewLock, now)?, Outcome::ViewLock(true));
        assert!(!ws.surface_mut().insert_char('x'));
        assert_eq!(ws.dispatch(Intent::Edited, now)?, Outcome::Ignored);
        assert_eq!(ws.dispatch(Intent::ClearContent, now)?, Outcome::Ignored);
        assert_eq!(
            ws.store().persistence().store().raw(crate::storage::KEY_VIEW_LOCK),
            Some("true")
        );
        assert_eq!(ws.dispatch(Intent::ToggleDarkMode, now)?, Outcome::DarkMode(true));
        Ok(())
    }

    #[test]
    fn teardown_flushes_and_stops_the_timer() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        type_text(&mut ws, "last words", now);
        assert_eq!(ws.dispatch(Intent::Teardown, now)?, Outcome::TornDown);
        assert_eq!(ws.store().active_note().content, "last words");

        ws.surface_mut().insert_char('!');
        assert_eq!(ws.dispatch(Intent::Edited, now)?, Outcome::Ignored);
        assert!(ws.tick(now + Duration::from_secs(10)).is_none());
        Ok(())
    }

    #[test]
    fn launch_url_imports_shared_note_and_strips_parameter() {
        let token = share::encode("<p>Hello</p>");
        let (ws, startup) = open(Some(&format!("https://pad.example/?note={token}")));
        let imported = ws.store().notes()[0].clone();
        assert_matches!(startup.import, Some(ShareImport::Imported(id)) if id == imported.id);
        assert_eq!(ws.active_id(), imported.id);
        assert!(imported.is_renamed);
        assert_eq!(imported.title, "Hello");
        assert_eq!(ws.surface().buffer(), "<p>Hello</p>");
        let visible = startup.visible_url.expect("url reported");
        assert_eq!(visible.as_str(), "https://pad.example/");
    }

    #[test]
    fn corrupt_token_shows_error_note_without_inserting() -> anyhow::Result<()> {
        let (mut ws, startup) = open(Some("https://pad.example/?note=%25%25%25&x=1"));
        assert_matches!(
            startup.import,
            Some(ShareImport::Corrupt(NoteError::CorruptShareToken { ref reason })) if reason.contains("base64")
        );
        assert_eq!(ws.store().len(), 1);
        assert!(ws.is_detached());
        assert_eq!(ws.surface().buffer(), SHARE_ERROR_NOTE);
        let visible = startup.visible_url.expect("url reported");
        assert_eq!(visible.as_str(), "https://pad.example/?x=1");

        assert!(!ws.flush()?);
        assert_eq!(ws.store().active_note().content, "");

        let active = ws.active_id();
        ws.dispatch(Intent::Select(active), Instant::now())?;
        assert!(!ws.is_detached());
        assert_eq!(ws.surface().buffer(), "");
        Ok(())
    }

    #[test]
    fn import_at_limit_is_skipped_but_url_is_stripped() -> anyhow::Result<()> {
        let (mut seeded, _) = open(None);
        let now = Instant::now();
        while seeded.store().len() < MAX_NOTES {
            seeded.dispatch(Intent::NewNote, now)?;
        }
        let backend = seeded.store.persistence().store().clone();

        let token = share::encode("<p>overflow</p>");
        let url = Url::parse(&format!("https://pad.example/?note={token}"))?;
        let (ws, startup) = Workspace::open(backend, BufferSurface::new(), &config(), Some(&url));
        assert_matches!(startup.import, Some(ShareImport::LimitReached));
        assert_eq!(ws.store().len(), MAX_NOTES);
        assert_eq!(
            startup.visible_url.map(|u| u.to_string()),
            Some("https://pad.example/".to_string())
        );
        Ok(())
    }

    #[test]
    fn documents_import_with_file_title() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let id = ws.import_document("Groceries.TXT", "milk\neggs")?;
        let note = ws.store().get(id).expect("imported");
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "milk<br>eggs");
        assert!(note.is_renamed);

        let html = ws.import_document("page.html", "<p>hi</p>\r\n<p>there</p>")?;
        assert_eq!(
            ws.store().get(html).map(|n| n.content.as_str()),
            Some("<p>hi</p>\n<p>there</p>")
        );

        let export = ws.export(id).expect("exported");
        assert_eq!(export.file_name, "groceries.txt");
        assert_eq!(export.text, "milk\neggs");
        Ok(())
    }

    #[test]
    fn failed_switch_keeps_surface_on_the_note_it_shows() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        let first = ws.active_id();
        type_text(&mut ws, "first", now);
        ws.dispatch(Intent::NewNote, now)?;
        type_text(&mut ws, "second", now);
        ws.flush()?;
        let second = ws.active_id();

        ws.store.persistence_mut().store_mut().fail_writes(true);
        assert_matches!(
            ws.dispatch(Intent::Select(first), now),
            Err(NoteError::Persistence(_))
        );
        assert_matches!(ws.dispatch(Intent::Delete(second), now), Err(NoteError::Persistence(_)));
        assert_matches!(ws.dispatch(Intent::NewNote, now), Err(NoteError::Persistence(_)));
        assert_eq!(ws.active_id(), second);
        assert_eq!(ws.store().len(), 2);

        ws.store.persistence_mut().store_mut().fail_writes(false);
        ws.dispatch(Intent::Save, now)?;
        assert_eq!(ws.store().get(first).map(|n| n.content.as_str()), Some("first"));
        assert_eq!(ws.store().get(second).map(|n| n.content.as_str()), Some("second"));
        Ok(())
    }

    #[test]
    fn replace_edits_visible_text_and_schedules_a_save() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        ws.surface_mut().set_content("<p>p</p>");
        let outcome = ws.dispatch(
            Intent::Replace {
                find: "p".into(),
                replacement: "pen".into(),
            },
            now,
        )?;
        assert_eq!(outcome, Outcome::Replaced { count: 1 });
        assert_eq!(ws.surface().buffer(), "<p>pen</p>");
        assert!(ws.autosave_deadline().is_some());

        let empty = Intent::Replace {
            find: String::new(),
            replacement: "x".into(),
        };
        assert_eq!(ws.dispatch(empty, now)?, Outcome::Ignored);

        ws.dispatch(Intent::ToggleViewLock, now)?;
        let locked = Intent::Replace {
            find: "pen".into(),
            replacement: "ink".into(),
        };
        assert_eq!(ws.dispatch(locked, now)?, Outcome::Ignored);
        assert_eq!(ws.surface().buffer(), "<p>pen</p>");
        Ok(())
    }

    #[test]
    fn insert_date_time_lands_at_the_cursor() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        type_text(&mut ws, "Due: ", now);
        let stamp = match ws.dispatch(Intent::InsertDateTime, now)? {
            Outcome::Inserted(stamp) => stamp,
            other => panic!("unexpected outcome {other:?}"),
        };
        let layout = Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$")?;
        assert!(layout.is_match(&stamp), "{stamp}");
        assert_eq!(ws.surface().buffer(), format!("Due: {stamp}"));

        ws.dispatch(Intent::ToggleViewLock, now)?;
        assert_eq!(ws.dispatch(Intent::InsertDateTime, now)?, Outcome::Ignored);
        Ok(())
    }

    #[test]
    fn duplicate_flushes_then_activates_the_copy() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        let now = Instant::now();
        let source = ws.active_id();
        type_text(&mut ws, "<p>Recipe</p>", now);

        let copy = match ws.dispatch(Intent::Duplicate(source), now)? {
            Outcome::Duplicated(copy) => copy,
            other => panic!("unexpected outcome {other:?}"),
        };
        assert_eq!(ws.active_id(), copy);
        assert_eq!(ws.surface().buffer(), "<p>Recipe</p>");
        assert_eq!(ws.store().get(source).map(|n| n.content.as_str()), Some("<p>Recipe</p>"));
        assert_eq!(ws.store().active_note().title, "Recipe");
        assert_eq!(ws.dispatch(Intent::Duplicate(NoteId::new(-1)), now)?, Outcome::Ignored);

        while !ws.store().is_full() {
            ws.dispatch(Intent::NewNote, now)?;
        }
        let err = ws.dispatch(Intent::Duplicate(source), now).expect_err("limit");
        assert!(err.is_limit_reached());
        Ok(())
    }

    #[test]
    fn share_url_uses_live_editor_content_for_active_note() -> anyhow::Result<()> {
        let (mut ws, _) = open(None);
        type_text(&mut ws, "<p>draft</p>", Instant::now());
        let base = Url::parse("https://pad.example/")?;
        let url = ws.share_url(&base, ws.active_id()).expect("note exists");
        let token = share::extract_token(&url).expect("token");
        assert_eq!(share::decode(&token)?, "<p>draft</p>");
        assert!(ws.share_url(&base, NoteId::new(-5)).is_none());
        Ok(())
    }
}
