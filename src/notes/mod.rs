use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use time::OffsetDateTime;

mod store;
pub mod title;

pub use store::NoteStore;
pub use title::{derive_title, DEFAULT_TITLE};

/// Hard cap on the number of notes a collection may hold.
pub const MAX_NOTES: usize = 10;

/// Note identifier: creation time in Unix milliseconds, bumped past any
/// existing id so two notes created in the same millisecond stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    pub(crate) fn next_after<'a>(existing: impl IntoIterator<Item = &'a NoteId>) -> Self {
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let taken: Vec<i64> = existing.into_iter().map(|id| id.0).collect();
        let (Some(&max), Some(&min)) = (taken.iter().max(), taken.iter().min()) else {
            return Self(now_ms);
        };
        if let Some(next) = max.checked_add(1) {
            return Self(now_ms.max(next));
        }
        // Nothing fits above i64::MAX, so hand out the first free id below.
        let free = min
            .checked_sub(1)
            .or_else(|| (i64::MIN..=i64::MAX).find(|candidate| !taken.contains(candidate)))
            .unwrap_or(now_ms);
        Self(free)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(NoteId)
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    // Older browser builds stored some ids as strings.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub id: NoteId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub is_renamed: bool,
}

impl Note {
    pub fn blank(id: NoteId) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            content: String::new(),
            is_renamed: false,
        }
    }

    /// A note whose title was chosen outside the editor and stays fixed.
    pub fn imported(id: NoteId, title: String, content: String) -> Self {
        Self {
            id,
            title,
            content,
            is_renamed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_ids_accept_numbers_and_numeric_strings() -> anyhow::Result<()> {
        let raw = r#"[
            {"id": 1700000000000, "title": "A", "content": "<p>a</p>", "isRenamed": false},
            {"id": "1700000000001", "title": "B", "content": ""}
        ]"#;
        let notes: Vec<Note> = serde_json::from_str(raw)?;
        assert_eq!(notes[0].id, NoteId::new(1_700_000_000_000));
        assert_eq!(notes[1].id, NoteId::new(1_700_000_000_001));
        assert!(!notes[1].is_renamed);

        let written = serde_json::to_string(&notes[1])?;
        assert!(written.contains(r#""id":1700000000001"#));
        assert!(written.contains(r#""isRenamed":false"#));
        Ok(())
    }

    #[test]
    fn next_id_is_past_every_existing_id() {
        let far_future = NoteId::new(i64::MAX / 2);
        let next = NoteId::next_after([&far_future]);
        assert_eq!(next, NoteId::new(i64::MAX / 2 + 1));

        let fresh = NoteId::next_after([]);
        assert!(fresh.get() > 0);
    }

    #[test]
    fn next_id_below_the_range_when_the_ceiling_is_taken() {
        let ceiling = NoteId::new(i64::MAX);
        let below = NoteId::new(i64::MAX - 1);
        assert_eq!(NoteId::next_after([&ceiling]), below);
        assert_eq!(NoteId::next_after([&ceiling, &below]), NoteId::new(i64::MAX - 2));

        let both_ends = [NoteId::new(i64::MIN), ceiling];
        assert_eq!(NoteId::next_after(&both_ends), NoteId::new(i64::MIN + 1));
    }

    #[test]
    fn note_id_parsing_is_strict() {
        assert_eq!("42".parse::<NoteId>().ok(), Some(NoteId::new(42)));
        assert!("42abc".parse::<NoteId>().is_err());
        assert!("".parse::<NoteId>().is_err());
    }
}
