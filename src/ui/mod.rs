use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::Frame;
use time::{macros::format_description, OffsetDateTime, UtcOffset};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

use crate::app::state::{AppState, FocusPane, OverlayState};
use crate::autosave::AutoSaveStatus;
use crate::markup::TextStats;
use crate::sidebar::SidebarView;
use crate::storage::KeyValueStore;
use crate::workspace::{BufferSurface, Workspace};

/// Everything one frame needs, captured from the workspace.
pub struct Screen<'a> {
    pub sidebar: SidebarView,
    pub title: String,
    pub surface: &'a BufferSurface,
    pub stats: TextStats,
    pub autosave: AutoSaveStatus,
    pub dark_mode: bool,
    pub view_locked: bool,
    pub detached: bool,
    pub state: &'a AppState,
}

impl<'a> Screen<'a> {
    pub fn new<S: KeyValueStore>(
        workspace: &'a Workspace<S, BufferSurface>,
        state: &'a AppState,
    ) -> Self {
        Self {
            sidebar: workspace.sidebar(),
            title: workspace.store().active_note().title.clone(),
            surface: workspace.surface(),
            stats: workspace.stats(),
            autosave: workspace.autosave_status(),
            dark_mode: workspace.dark_mode(),
            view_locked: workspace.view_locked(),
            detached: workspace.is_detached(),
            state,
        }
    }
}

/// Editor scroll offset after the frame kept the cursor visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub scroll: u16,
}

struct Palette {
    base: Style,
    muted: Style,
    focus: Style,
    active: Style,
    highlight: Style,
}

impl Palette {
    fn new(dark_mode: bool) -> Self {
        if dark_mode {
            Self {
                base: Style::default().fg(Color::Gray).bg(Color::Black),
                muted: Style::default().fg(Color::DarkGray),
                focus: Style::default().fg(Color::Cyan),
                active: Style::default()
                    .fg(Color::White)
                    .add_modifier(Modifier::BOLD),
                highlight: Style::default()
                    .bg(Color::Blue)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            }
        } else {
            Self {
                base: Style::default().fg(Color::Black).bg(Color::White),
                muted: Style::default().fg(Color::Gray),
                focus: Style::default().fg(Color::Blue),
                active: Style::default()
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
                highlight: Style::default()
                    .bg(Color::LightBlue)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD),
            }
        }
    }

    fn border(&self, focused: bool) -> Style {
        if focused {
            self.focus
        } else {
            self.muted
        }
    }
}

pub fn draw_app(frame: &mut Frame, screen: &Screen, list_state: &mut ListState) -> Viewport {
    let palette = Palette::new(screen.dark_mode);
    let state = screen.state;
    let area = frame.size();
    frame.render_widget(Block::default().style(palette.base), area);

    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(2)])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(32), Constraint::Min(20)])
        .split(vertical[0]);

    let items: Vec<ListItem> = screen
        .sidebar
        .entries
        .iter()
        .map(|entry| {
            let title_style = if entry.is_active {
                palette.active
            } else {
                Style::default()
            };
            let marker = if entry.is_active { "● " } else { "  " };
            ListItem::new(Line::from(vec![
                Span::styled(marker, palette.focus),
                Span::styled(format!("{:<4}", entry.label()), palette.muted),
                Span::styled(entry.title.clone(), title_style),
            ]))
        })
        .collect();

    let mut list_title = format!("Notes {}", screen.sidebar.capacity_label());
    if screen.sidebar.limit_reached {
        list_title.push_str(" (full)");
    }
    let list = List::new(items)
        .block(
            Block::default()
                .title(list_title)
                .borders(Borders::ALL)
                .border_style(palette.border(state.focus == FocusPane::Sidebar)),
        )
        .highlight_style(palette.highlight);
    frame.render_stateful_widget(list, columns[0], list_state);

    let editor_area = columns[1];
    let inner_height = editor_area.height.saturating_sub(2);
    let inner_width = editor_area.width.saturating_sub(2);
    let buffer = screen.surface.buffer();
    let (cursor_row, cursor_col) = cursor_offset(buffer, screen.surface.cursor());
    let scroll = keep_visible(state.scroll, cursor_row, inner_height);

    let mut editor_title = screen.title.clone();
    if screen.detached {
        editor_title.push_str(" [read-only]");
    } else if screen.view_locked {
        editor_title.push_str(" [locked]");
    }
    let body: Text = buffer.lines().map(Line::from).collect::<Vec<_>>().into();
    let editor = Paragraph::new(body)
        .block(
            Block::default()
                .title(editor_title)
                .borders(Borders::ALL)
                .border_style(palette.border(state.focus == FocusPane::Editor)),
        )
        .scroll((scroll, 0));
    frame.render_widget(editor, editor_area);

    let editable = state.focus == FocusPane::Editor
        && state.overlay().is_none()
        && !screen.surface.is_read_only();
    if editable && inner_width > 0 && inner_height > 0 {
        let col = cursor_col.min(inner_width.saturating_sub(1) as usize) as u16;
        let row = cursor_row.saturating_sub(scroll);
        frame.set_cursor(editor_area.x + 1 + col, editor_area.y + 1 + row);
    }

    let status = Paragraph::new(build_status_line(screen, &palette)).style(palette.muted);
    frame.render_widget(status, vertical[1]);

    render_overlay(frame, state, &palette);
    Viewport { scroll }
}

fn build_status_line(screen: &Screen, palette: &Palette) -> Text<'static> {
    let mut spans = vec![
        Span::raw(format!("Chars: {}", screen.stats.chars)),
        Span::raw(format!(" | Words: {}", screen.stats.words)),
        Span::raw(format!(" | Notes: {}", screen.sidebar.capacity_label())),
        Span::raw(" | "),
    ];
    spans.push(match &screen.autosave {
        AutoSaveStatus::Error { .. } => {
            Span::styled(autosave_label(&screen.autosave), Style::default().fg(Color::Red))
        }
        AutoSaveStatus::Pending { .. } => Span::styled(
            autosave_label(&screen.autosave),
            Style::default().fg(Color::Yellow),
        ),
        other => Span::raw(autosave_label(other)),
    });
    if screen.view_locked {
        spans.push(Span::raw(" | "));
        spans.push(Span::styled("Locked", palette.active));
    }

    let second = match screen.state.status_message() {
        Some(message) => Line::from(Span::styled(message.to_string(), palette.active)),
        None => Line::from(Span::raw(
            "a new • Enter open • r rename • c copy • d delete • x clear • f replace • t date • s save • y share • D dark • L lock • q quit",
        )),
    };
    Text::from(vec![Line::from(spans), second])
}

fn autosave_label(status: &AutoSaveStatus) -> String {
    match status {
        AutoSaveStatus::Disabled => "Autosave: off".to_string(),
        AutoSaveStatus::Idle {
            last_saved_at: Some(ts),
        } => format!("Saved {}", format_clock(*ts)),
        AutoSaveStatus::Idle { last_saved_at: None } => "Autosave: on".to_string(),
        AutoSaveStatus::Pending { .. } => "Unsaved changes".to_string(),
        AutoSaveStatus::Error { message, .. } => format!("Save failed ({message})"),
    }
}

/// Wall-clock `HH:MM` in the local offset when it can be determined.
pub(crate) fn format_clock(dt: OffsetDateTime) -> String {
    let local = UtcOffset::current_local_offset()
        .map(|offset| dt.to_offset(offset))
        .unwrap_or(dt);
    local
        .format(&format_description!("[hour]:[minute]"))
        .unwrap_or_else(|_| dt.unix_timestamp().to_string())
}

/// Row and display column of the byte offset `cursor` in `buffer`.
fn cursor_offset(buffer: &str, cursor: usize) -> (u16, usize) {
    let cursor = cursor.min(buffer.len());
    let mut row = 0u16;
    let mut col = 0usize;
    for grapheme in buffer[..cursor].graphemes(true) {
        if grapheme.ends_with('\n') {
            row = row.saturating_add(1);
            col = 0;
        } else {
            col += UnicodeWidthStr::width(grapheme);
        }
    }
    (row, col)
}

fn keep_visible(scroll: u16, row: u16, height: u16) -> u16 {
    if height == 0 || row < scroll {
        row
    } else if row >= scroll + height {
        row + 1 - height
    } else {
        scroll
    }
}

fn render_overlay(frame: &mut Frame, state: &AppState, palette: &Palette) {
    let (title, lines) = match state.overlay() {
        Some(OverlayState::Rename(draft)) => {
            let mut input = draft.title.clone();
            input.push('▌');
            (
                "Rename Note",
                vec![
                    Line::from(Span::styled(
                        format!("Rename {}", draft.label),
                        palette.active,
                    )),
                    Line::from(""),
                    Line::from(input),
                    Line::from(""),
                    Line::from(Span::styled(
                        "Enter to save • Esc to cancel • empty keeps the current title",
                        palette.muted,
                    )),
                ],
            )
        }
        Some(OverlayState::ConfirmDelete(draft)) => (
            "Delete Note",
            vec![
                Line::from(Span::styled(
                    format!("Delete {} \"{}\"?", draft.label, draft.title),
                    palette.active,
                )),
                Line::from(""),
                Line::from(Span::styled("y/Enter to delete • n/Esc to keep", palette.muted)),
            ],
        ),
        Some(OverlayState::Replace(draft)) => {
            let field = |label: &str, value: &str, focused: bool| {
                let mut text = format!("{label}: {value}");
                if focused {
                    text.push('▌');
                }
                Line::from(Span::styled(text, if focused { palette.active } else { palette.base }))
            };
            (
                "Find & Replace",
                vec![
                    field("Find", &draft.find, !draft.on_replacement),
                    field("Replace with", &draft.replacement, draft.on_replacement),
                    Line::from(""),
                    Line::from(Span::styled(
                        "Tab switches field • Enter to replace all • Esc to cancel",
                        palette.muted,
                    )),
                ],
            )
        }
        Some(OverlayState::Share { label, url }) => (
            "Share Link",
            vec![
                Line::from(Span::styled(format!("Share URL for {label}"), palette.active)),
                Line::from(""),
                Line::from(url.clone()),
                Line::from(""),
                Line::from(Span::styled("Any key to close", palette.muted)),
            ],
        ),
        None => return,
    };

    let area = centered_rect(60, 30, frame.size());
    frame.render_widget(Clear, area);
    let paragraph = Paragraph::new(lines)
        .style(palette.base)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(palette.focus),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(paragraph, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
