use unicode_segmentation::UnicodeSegmentation;

use crate::markup;

/// The document-editing surface the active note is bound to.
///
/// Formatting commands live entirely on the host side; the workspace only
/// reads and replaces the markup and asks for its plain-text rendering.
pub trait EditingSurface {
    fn content(&self) -> String;

    fn set_content(&mut self, markup: &str);

    fn plain_text(&self) -> String;

    fn set_read_only(&mut self, _read_only: bool) {}

    /// Replaces `find` in the visible text, never inside tags. Returns the
    /// number of replacements.
    fn replace_text(&mut self, find: &str, replacement: &str) -> usize {
        let (updated, count) = markup::replace_in_text(&self.content(), find, replacement);
        if count > 0 {
            self.set_content(&updated);
        }
        count
    }

    /// Inserts `text` at the insertion point; surfaces without one append.
    fn insert_text(&mut self, text: &str) -> bool {
        let mut content = self.content();
        content.push_str(text);
        self.set_content(&content);
        true
    }
}

/// Markup-source editor: the buffer holds the note's markup verbatim and the
/// cursor moves over grapheme clusters.
#[derive(Debug, Clone, Default)]
pub struct BufferSurface {
    buffer: String,
    cursor: usize,
    read_only: bool,
    preferred_column: Option<usize>,
}

impl EditingSurface for BufferSurface {
    fn content(&self) -> String {
        self.buffer.clone()
    }

    fn set_content(&mut self, markup: &str) {
        self.buffer.clear();
        self.buffer.push_str(markup);
        self.cursor = self.buffer.len();
        self.preferred_column = None;
    }

    fn plain_text(&self) -> String {
        markup::plain_text(&self.buffer)
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn replace_text(&mut self, find: &str, replacement: &str) -> usize {
        if self.read_only {
            return 0;
        }
        let (updated, count) = markup::replace_in_text(&self.buffer, find, replacement);
        if count > 0 {
            self.buffer = updated;
            if self.cursor > self.buffer.len() || !self.buffer.is_char_boundary(self.cursor) {
                self.cursor = self.buffer.len();
            }
            self.preferred_column = None;
        }
        count
    }

    fn insert_text(&mut self, text: &str) -> bool {
        if self.read_only {
            return false;
        }
        self.buffer.insert_str(self.cursor, text);
        self.cursor += text.len();
        self.preferred_column = None;
        true
    }
}

impl BufferSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        if self.read_only {
            return false;
        }
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.buffer.insert_str(self.cursor, encoded);
        self.cursor += encoded.len();
        self.preferred_column = None;
        true
    }

    pub fn insert_newline(&mut self) -> bool {
        if self.read_only {
            return false;
        }
        self.buffer.insert(self.cursor, '\n');
        self.cursor += 1;
        self.preferred_column = Some(0);
        true
    }

    pub fn backspace(&mut self) -> bool {
        if self.read_only || self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(prev..self.cursor);
        self.cursor = prev;
        self.preferred_column = None;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.read_only || self.cursor >= self.buffer.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.buffer, self.cursor);
        self.buffer.drain(self.cursor..next);
        self.preferred_column = None;
        true
    }

    pub fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.buffer, self.cursor);
        self.preferred_column = None;
        true
    }

    pub fn move_right(&mut self) -> bool {
        if self.cursor >= self.buffer.len() {
            return false;
        }
        self.cursor = next_grapheme_boundary(&self.buffer, self.cursor);
        self.preferred_column = None;
        true
    }

    pub fn move_home(&mut self) -> bool {
        let start = line_start(&self.buffer, self.cursor);
        if self.cursor == start {
            return false;
        }
        self.cursor = start;
        self.preferred_column = Some(0);
        true
    }

    pub fn move_end(&mut self) -> bool {
        let end = line_end(&self.buffer, self.cursor);
        if self.cursor == end {
            return false;
        }
        self.cursor = end;
        self.preferred_column = None;
        true
    }

    pub fn move_up(&mut self) -> bool {
        let start = line_start(&self.buffer, self.cursor);
        let column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.buffer, start, self.cursor));
        if start == 0 {
            return false;
        }
        let prev_start = line_start(&self.buffer, start - 1);
        self.cursor = position_for_column(&self.buffer, prev_start, column);
        self.preferred_column = Some(column);
        true
    }

    pub fn move_down(&mut self) -> bool {
        let start = line_start(&self.buffer, self.cursor);
        let column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.buffer, start, self.cursor));
        let end = line_end(&self.buffer, self.cursor);
        if end == self.buffer.len() {
            return false;
        }
        self.cursor = position_for_column(&self.buffer, end + 1, column);
        self.preferred_column = Some(column);
        true
    }

    /// Line index and grapheme column of the cursor.
    pub fn cursor_line_column(&self) -> (usize, usize) {
        let line = self.buffer[..self.cursor].matches('\n').count();
        let start = line_start(&self.buffer, self.cursor);
        (line, column_at(&self.buffer, start, self.cursor))
    }
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[..cursor]
        .grapheme_indices(true)
        .last()
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

fn next_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .graphemes(true)
        .next()
        .map(|grapheme| cursor + grapheme.len())
        .unwrap_or(text.len())
}

fn line_start(text: &str, cursor: usize) -> usize {
    text[..cursor].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

fn line_end(text: &str, cursor: usize) -> usize {
    text[cursor..]
        .find('\n')
        .map(|idx| cursor + idx)
        .unwrap_or(text.len())
}

fn column_at(text: &str, line_start: usize, cursor: usize) -> usize {
    text[line_start..cursor].graphemes(true).count()
}

fn position_for_column(text: &str, line_start: usize, column: usize) -> usize {
    let end = line_end(text, line_start);
    text[line_start..end]
        .grapheme_indices(true)
        .nth(column)
        .map(|(idx, _)| line_start + idx)
        .unwrap_or(end)
}
