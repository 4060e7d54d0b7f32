use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;
use url::Url;

use crate::autosave::AutoSaveEvent;
use crate::config::AppConfig;
use crate::error::NoteError;
use crate::notes::{NoteId, MAX_NOTES};
use crate::storage::StorageHandle;
use crate::ui;
use crate::workspace::{BufferSurface, Intent, Outcome, ShareImport, Startup, Workspace};

pub mod state;

pub use state::{AppState, FocusPane, OverlayState};

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    ToggleFocus,
    OpenNote,
    NewNote,
    RenameNote,
    DeleteNote,
    ClearNote,
    DuplicateNote,
    FindReplace,
    InsertDateTime,
    ManualSave,
    ShowShare,
    ToggleDarkMode,
    ToggleViewLock,
}

pub struct App {
    pub config: Arc<AppConfig>,
    workspace: Workspace<StorageHandle, BufferSurface>,
    state: AppState,
    list_state: ListState,
    share_base: Url,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(config: Arc<AppConfig>, storage: StorageHandle, launch_url: Option<Url>) -> Result<Self> {
        let share_base = config.share.base()?;
        let (workspace, startup) = Workspace::open(
            storage,
            BufferSurface::new(),
            &config.auto_save,
            launch_url.as_ref(),
        );
        let state = AppState::new(&workspace.sidebar());
        let mut app = Self {
            config,
            workspace,
            state,
            list_state: ListState::default(),
            share_base,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        };
        app.report_startup(startup);
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn workspace(&self) -> &Workspace<StorageHandle, BufferSurface> {
        &self.workspace
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal
                .draw(|frame| {
                    let screen = ui::Screen::new(&self.workspace, &self.state);
                    self.list_state.select(Some(self.state.cursor));
                    let viewport = ui::draw_app(frame, &screen, &mut self.list_state);
                    self.state.scroll = viewport.scroll;
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            // Wake up in time for a pending autosave.
            let now = Instant::now();
            let timeout = self
                .workspace
                .autosave_deadline()
                .map(|deadline| deadline.saturating_duration_since(now))
                .map_or(self.tick_rate, |until| until.min(self.tick_rate));

            if event::poll(timeout).context("polling for terminal events")? {
                if let Event::Key(key) = event::read().context("reading terminal event")? {
                    self.handle_key(key);
                }
            }

            self.on_tick(Instant::now());
        }
        Ok(())
    }

    fn report_startup(&mut self, startup: Startup) {
        if let Some(url) = &startup.visible_url {
            tracing::debug!(%url, "launch url without share parameter");
        }
        let message = match startup.import {
            Some(ShareImport::Imported(_)) => "Imported shared note".to_string(),
            Some(ShareImport::LimitReached) => limit_message(),
            Some(ShareImport::Corrupt(_)) => {
                "Could not load the shared note. Select a note to continue.".to_string()
            }
            None => return,
        };
        self.state.follow_active(&self.workspace.sidebar());
        self.state.set_status_message(Some(message));
    }

    fn on_tick(&mut self, now: Instant) {
        match self.workspace.tick(now) {
            Some(AutoSaveEvent::Saved { timestamp, .. }) => {
                self.state
                    .set_status_message(Some(format!("Auto-saved at {}", ui::format_clock(timestamp))));
            }
            Some(AutoSaveEvent::Error { message, .. }) => {
                tracing::error!(%message, "autosave failed");
                self.state
                    .set_status_message(Some(format!("Autosave failed: {message}")));
            }
            None => {}
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.state.focus == FocusPane::Editor && self.handle_editor_key(key) {
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('q') if plain => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Tab | KeyCode::Esc => Some(Action::ToggleFocus),
            KeyCode::Enter => Some(Action::OpenNote),
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::ManualSave)
            }
            KeyCode::Char('a') if plain => Some(Action::NewNote),
            KeyCode::Char('r') if plain => Some(Action::RenameNote),
            KeyCode::Char('d') if plain => Some(Action::DeleteNote),
            KeyCode::Char('x') if plain => Some(Action::ClearNote),
            KeyCode::Char('c') if plain => Some(Action::DuplicateNote),
            KeyCode::Char('f') if plain => Some(Action::FindReplace),
            KeyCode::Char('t') if plain => Some(Action::InsertDateTime),
            KeyCode::Char('s') if plain => Some(Action::ManualSave),
            KeyCode::Char('y') if plain => Some(Action::ShowShare),
            KeyCode::Char('D') => Some(Action::ToggleDarkMode),
            KeyCode::Char('L') => Some(Action::ToggleViewLock),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        let len = self.workspace.store().len();
        match action {
            Action::Quit => self.quit(),
            Action::SelectNext => self.state.move_selection(1, len),
            Action::SelectPrevious => self.state.move_selection(-1, len),
            Action::ToggleFocus => self.state.toggle_focus(),
            Action::OpenNote => {
                if let Some(id) = self.highlighted_id() {
                    self.apply(Intent::Select(id));
                    self.state.focus = FocusPane::Editor;
                }
            }
            Action::NewNote => {
                self.apply(Intent::NewNote);
                self.state.focus = FocusPane::Editor;
            }
            Action::RenameNote => {
                let view = self.workspace.sidebar();
                if let Some(entry) = self.state.highlighted(&view).cloned() {
                    self.state.open_rename(&entry);
                }
            }
            Action::DeleteNote => {
                let view = self.workspace.sidebar();
                if let Some(entry) = self.state.highlighted(&view).cloned() {
                    self.state.open_delete(&entry);
                }
            }
            Action::ClearNote => self.apply(Intent::ClearContent),
            Action::DuplicateNote => {
                if let Some(id) = self.highlighted_id() {
                    self.apply(Intent::Duplicate(id));
                }
            }
            Action::FindReplace => self.state.open_replace(),
            Action::InsertDateTime => self.apply(Intent::InsertDateTime),
            Action::ManualSave => self.apply(Intent::Save),
            Action::ShowShare => self.show_share(),
            Action::ToggleDarkMode => self.apply(Intent::ToggleDarkMode),
            Action::ToggleViewLock => self.apply(Intent::ToggleViewLock),
        }
    }

    fn handle_editor_key(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            // Ctrl-s and Ctrl-c fall through to the global bindings.
            return false;
        }
        let surface = self.workspace.surface_mut();
        let edited = match key.code {
            KeyCode::Esc | KeyCode::Tab => {
                self.state.focus = FocusPane::Sidebar;
                return true;
            }
            KeyCode::Left => {
                surface.move_left();
                return true;
            }
            KeyCode::Right => {
                surface.move_right();
                return true;
            }
            KeyCode::Up => {
                surface.move_up();
                return true;
            }
            KeyCode::Down => {
                surface.move_down();
                return true;
            }
            KeyCode::Home => {
                surface.move_home();
                return true;
            }
            KeyCode::End => {
                surface.move_end();
                return true;
            }
            KeyCode::Enter => surface.insert_newline(),
            KeyCode::Backspace => surface.backspace(),
            KeyCode::Delete => surface.delete(),
            KeyCode::Char(ch) => surface.insert_char(ch),
            _ => return false,
        };
        if edited {
            self.apply(Intent::Edited);
        } else if self.workspace.surface().is_read_only() {
            let message = if self.workspace.view_locked() {
                "View is locked (L to unlock)"
            } else {
                "Select a note to continue editing"
            };
            self.state.set_status_message(Some(message));
        }
        true
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::Rename(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Rename canceled"));
                    }
                    KeyCode::Enter => {
                        if let Some(OverlayState::Rename(draft)) = self.state.close_overlay() {
                            self.apply(Intent::Rename {
                                id: draft.note_id,
                                title: draft.title,
                            });
                        }
                    }
                    KeyCode::Backspace => self.state.rename_pop(),
                    KeyCode::Char(ch)
                        if !key.modifiers.intersects(
                            KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                        ) =>
                    {
                        self.state.rename_push(ch);
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::ConfirmDelete(_)) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Char('n') => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Delete canceled"));
                    }
                    KeyCode::Enter | KeyCode::Char('y') => {
                        if let Some(OverlayState::ConfirmDelete(draft)) = self.state.close_overlay()
                        {
                            self.apply(Intent::Delete(draft.note_id));
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::Replace(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Replace canceled"));
                    }
                    KeyCode::Tab => self.state.replace_switch_field(),
                    KeyCode::Enter => {
                        if let Some(OverlayState::Replace(draft)) = self.state.close_overlay() {
                            if draft.find.is_empty() {
                                self.state.set_status_message(Some("Enter text to find"));
                            } else {
                                self.apply(Intent::Replace {
                                    find: draft.find,
                                    replacement: draft.replacement,
                                });
                            }
                        }
                    }
                    KeyCode::Backspace => self.state.replace_pop(),
                    KeyCode::Char(ch)
                        if !key.modifiers.intersects(
                            KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                        ) =>
                    {
                        self.state.replace_push(ch);
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::Share { .. }) => {
                self.state.close_overlay();
                true
            }
            None => false,
        }
    }

    fn show_share(&mut self) {
        let view = self.workspace.sidebar();
        let Some(entry) = self.state.highlighted(&view) else {
            return;
        };
        match self.workspace.share_url(&self.share_base, entry.id) {
            Some(url) => self.state.open_overlay(OverlayState::Share {
                label: entry.label(),
                url: url.to_string(),
            }),
            None => self.state.set_status_message(Some("Note not found")),
        }
    }

    fn quit(&mut self) {
        if let Err(err) = self.workspace.dispatch(Intent::Teardown, Instant::now()) {
            tracing::error!(?err, "final save failed");
        }
        self.should_quit = true;
    }

    fn apply(&mut self, intent: Intent) {
        let follows_active = matches!(
            intent,
            Intent::NewNote | Intent::Select(_) | Intent::Delete(_) | Intent::Duplicate(_)
        );
        match self.workspace.dispatch(intent, Instant::now()) {
            Ok(outcome) => {
                if let Some(message) = outcome_message(&outcome) {
                    self.state.set_status_message(Some(message));
                }
            }
            Err(err @ NoteError::NoteLimitReached { .. }) => {
                tracing::debug!(%err, "intent rejected");
                self.state.set_status_message(Some(limit_message()));
            }
            Err(err) => {
                tracing::error!(?err, "note operation failed");
                self.state.set_status_message(Some(format!("Error: {err}")));
            }
        }
        let view = self.workspace.sidebar();
        if follows_active {
            self.state.follow_active(&view);
        } else {
            self.state.clamp_cursor(view.entries.len());
        }
    }

    fn highlighted_id(&self) -> Option<NoteId> {
        let view = self.workspace.sidebar();
        self.state.highlighted(&view).map(|entry| entry.id)
    }
}

fn outcome_message(outcome: &Outcome) -> Option<String> {
    let message = match outcome {
        Outcome::Replaced { count: 0 } => "Text not found",
        Outcome::Replaced { count } => return Some(format!("Replaced {count} occurrence(s)")),
        Outcome::Inserted(stamp) => return Some(format!("Inserted {stamp}")),
        Outcome::Duplicated(_) => "Note duplicated",
        Outcome::Saved { written: true } => "Saved",
        Outcome::Saved { written: false } => "Nothing to save",
        Outcome::Created(_) => "Created new note",
        Outcome::Deleted { removed: true } => "Note deleted",
        Outcome::Renamed { changed: true } => "Note renamed",
        Outcome::Cleared => "Note cleared",
        Outcome::DarkMode(true) => "Dark mode on",
        Outcome::DarkMode(false) => "Dark mode off",
        Outcome::ViewLock(true) => "View locked",
        Outcome::ViewLock(false) => "View unlocked",
        _ => return None,
    };
    Some(message.to_string())
}

fn limit_message() -> String {
    format!("Maximum number of notes ({MAX_NOTES}) reached")
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("creating terminal backend")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("restoring screen state")?;
    Ok(())
}
