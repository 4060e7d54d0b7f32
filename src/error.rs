use thiserror::Error;

/// Failures a note operation can report to its caller.
///
/// A missing active note is not represented here: the store re-resolves the
/// active pointer on its own and never hands that condition back.
#[derive(Debug, Error)]
pub enum NoteError {
    #[error("maximum number of notes ({max}) reached")]
    NoteLimitReached { max: usize },
    #[error("could not load the shared note, it might be corrupted: {reason}")]
    CorruptShareToken { reason: String },
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl NoteError {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        NoteError::CorruptShareToken {
            reason: reason.into(),
        }
    }

    pub fn is_limit_reached(&self) -> bool {
        matches!(self, NoteError::NoteLimitReached { .. })
    }
}
