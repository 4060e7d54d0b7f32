use crate::notes::{Note, NoteId, MAX_NOTES};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarEntry {
    pub id: NoteId,
    pub title: String,
    pub is_active: bool,
    /// 1-based position in display order
    pub display_index: usize,
}

impl SidebarEntry {
    pub fn label(&self) -> String {
        format!("#{}", self.display_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarView {
    pub entries: Vec<SidebarEntry>,
    pub limit_reached: bool,
}

impl SidebarView {
    pub fn active_index(&self) -> Option<usize> {
        self.entries.iter().position(|entry| entry.is_active)
    }

    pub fn capacity_label(&self) -> String {
        format!("{}/{}", self.entries.len(), MAX_NOTES)
    }
}

/// Read-side view of the collection in store order.
pub fn project(notes: &[Note], active: NoteId) -> SidebarView {
    let entries = notes
        .iter()
        .enumerate()
        .map(|(idx, note)| SidebarEntry {
            id: note.id,
            title: note.title.clone(),
            is_active: note.id == active,
            display_index: idx + 1,
        })
        .collect();
    SidebarView {
        entries,
        limit_reached: notes.len() >= MAX_NOTES,
    }
}
