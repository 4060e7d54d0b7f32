pub mod app;
pub mod autosave;
pub mod cli;
pub mod config;
pub mod error;
pub mod markup;
pub mod notes;
pub mod share;
pub mod sidebar;
pub mod storage;
pub mod ui;
pub mod workspace;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
pub use error::NoteError;
pub use notes::{Note, NoteId, NoteStore, MAX_NOTES};
pub use workspace::{BufferSurface, EditingSurface, Intent, Outcome, Workspace};
