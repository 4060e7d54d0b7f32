use crate::notes::NoteId;
use crate::sidebar::{SidebarEntry, SidebarView};

const MAX_TITLE_INPUT: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusPane {
    Sidebar,
    Editor,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameDraft {
    pub note_id: NoteId,
    pub label: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteDraft {
    pub note_id: NoteId,
    pub label: String,
    pub title: String,
}

/// Find and replace inputs; `on_replacement` marks which field takes keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceDraft {
    pub find: String,
    pub replacement: String,
    pub on_replacement: bool,
}

impl ReplaceDraft {
    fn field_mut(&mut self) -> &mut String {
        if self.on_replacement {
            &mut self.replacement
        } else {
            &mut self.find
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayState {
    Rename(RenameDraft),
    ConfirmDelete(DeleteDraft),
    Replace(ReplaceDraft),
    Share { label: String, url: String },
}

/// Terminal-only view state. Everything about notes lives in the workspace.
#[derive(Debug, Clone)]
pub struct AppState {
    pub focus: FocusPane,
    /// Highlighted sidebar row; may differ from the active note.
    pub cursor: usize,
    /// Editor scroll offset from the last frame.
    pub scroll: u16,
    status_message: Option<String>,
    overlay: Option<OverlayState>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            focus: FocusPane::Editor,
            cursor: 0,
            scroll: 0,
            status_message: None,
            overlay: None,
        }
    }
}

impl AppState {
    pub fn new(view: &SidebarView) -> Self {
        let mut state = Self::default();
        state.follow_active(view);
        state
    }

    /// Moves the sidebar cursor onto the active note.
    pub fn follow_active(&mut self, view: &SidebarView) {
        self.cursor = view.active_index().unwrap_or(0);
    }

    pub fn clamp_cursor(&mut self, len: usize) {
        self.cursor = self.cursor.min(len.saturating_sub(1));
    }

    pub fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            return;
        }
        let next = (self.cursor as isize + delta).clamp(0, len as isize - 1);
        self.cursor = next as usize;
    }

    pub fn highlighted<'a>(&self, view: &'a SidebarView) -> Option<&'a SidebarEntry> {
        view.entries.get(self.cursor)
    }

    pub fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            FocusPane::Sidebar => FocusPane::Editor,
            FocusPane::Editor => FocusPane::Sidebar,
        };
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn open_overlay(&mut self, overlay: OverlayState) {
        self.overlay = Some(overlay);
    }

    pub fn close_overlay(&mut self) -> Option<OverlayState> {
        self.overlay.take()
    }

    pub fn open_rename(&mut self, entry: &SidebarEntry) {
        self.overlay = Some(OverlayState::Rename(RenameDraft {
            note_id: entry.id,
            label: entry.label(),
            title: entry.title.clone(),
        }));
    }

    pub fn open_delete(&mut self, entry: &SidebarEntry) {
        self.overlay = Some(OverlayState::ConfirmDelete(DeleteDraft {
            note_id: entry.id,
            label: entry.label(),
            title: entry.title.clone(),
        }));
    }

    pub fn rename_push(&mut self, ch: char) {
        if let Some(OverlayState::Rename(draft)) = self.overlay.as_mut() {
            if draft.title.chars().count() < MAX_TITLE_INPUT {
                draft.title.push(ch);
            }
        }
    }

    pub fn rename_pop(&mut self) {
        if let Some(OverlayState::Rename(draft)) = self.overlay.as_mut() {
            draft.title.pop();
        }
    }

    pub fn open_replace(&mut self) {
        self.overlay = Some(OverlayState::Replace(ReplaceDraft::default()));
    }

    pub fn replace_push(&mut self, ch: char) {
        if let Some(OverlayState::Replace(draft)) = self.overlay.as_mut() {
            let field = draft.field_mut();
            if field.chars().count() < MAX_TITLE_INPUT {
                field.push(ch);
            }
        }
    }

    pub fn replace_pop(&mut self) {
        if let Some(OverlayState::Replace(draft)) = self.overlay.as_mut() {
            draft.field_mut().pop();
        }
    }

    pub fn replace_switch_field(&mut self) {
        if let Some(OverlayState::Replace(draft)) = self.overlay.as_mut() {
            draft.on_replacement = !draft.on_replacement;
        }
    }
}
