use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// One editable text pane: the text plus a caret kept on a grapheme boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextBuffer {
    text: String,
    cursor: usize,
    preferred_column: Option<usize>,
    scroll_top: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    WordLeft,
    WordRight,
    BufferStart,
    BufferEnd,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self {
            text,
            cursor,
            preferred_column: None,
            scroll_top: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Lines as displayed; an empty buffer still shows one line.
    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.split('\n')
    }

    /// Zero-based line of the caret.
    pub fn cursor_line(&self) -> usize {
        self.text[..self.cursor].matches('\n').count()
    }

    /// Display column of the caret within its line.
    pub fn cursor_column(&self) -> usize {
        let start = line_start(&self.text, self.cursor);
        self.text[start..self.cursor].width()
    }

    /// Replaces the whole text, keeping the caret where it was when still valid.
    pub fn replace(&mut self, text: String) {
        self.text = text;
        self.preferred_column = None;
        self.set_cursor(self.cursor);
    }

    /// Moves the caret, clamping it onto the nearest grapheme boundary at or before `position`.
    pub fn set_cursor(&mut self, position: usize) {
        let clamped = position.min(self.text.len());
        self.cursor = grapheme_floor(&self.text, clamped);
    }

    pub fn insert_str(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.text.insert_str(self.cursor, fragment);
        self.cursor += fragment.len();
        self.preferred_column = None;
        true
    }

    pub fn insert_char(&mut self, ch: char) -> bool {
        let mut scratch = [0u8; 4];
        let encoded = ch.encode_utf8(&mut scratch);
        self.insert_str(encoded)
    }

    pub fn insert_newline(&mut self) -> bool {
        self.text.insert(self.cursor, '\n');
        self.cursor += 1;
        self.preferred_column = Some(0);
        true
    }

    /// Tab inserts spaces rather than a tab character.
    pub fn insert_tab(&mut self, width: u8) -> bool {
        let spaces = " ".repeat(usize::from(width.max(1)));
        self.insert_str(&spaces)
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let prev = prev_grapheme_boundary(&self.text, self.cursor);
        self.text.drain(prev..self.cursor);
        self.cursor = prev;
        self.preferred_column = None;
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.text, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.text.drain(self.cursor..next);
        self.preferred_column = None;
        true
    }

    pub fn move_cursor(&mut self, motion: Motion) -> bool {
        match motion {
            Motion::Left => self.move_left(),
            Motion::Right => self.move_right(),
            Motion::Up => self.move_up(),
            Motion::Down => self.move_down(),
            Motion::Home => self.move_home(),
            Motion::End => self.move_end(),
            Motion::WordLeft => self.move_word_left(),
            Motion::WordRight => self.move_word_right(),
            Motion::BufferStart => self.jump_to(0),
            Motion::BufferEnd => self.jump_to(self.text.len()),
        }
    }

    /// Adjusts the first visible line so the caret stays inside `height` rows.
    pub fn scroll_to_cursor(&mut self, height: usize) -> usize {
        let height = height.max(1);
        let line = self.cursor_line();
        if line < self.scroll_top {
            self.scroll_top = line;
        } else if line >= self.scroll_top + height {
            self.scroll_top = line + 1 - height;
        }
        let max_top = self.line_count().saturating_sub(1);
        self.scroll_top = self.scroll_top.min(max_top);
        self.scroll_top
    }

    pub fn scroll_top(&self) -> usize {
        self.scroll_top
    }

    fn jump_to(&mut self, position: usize) -> bool {
        if self.cursor == position {
            return false;
        }
        self.cursor = position;
        self.preferred_column = None;
        true
    }

    fn move_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor = prev_grapheme_boundary(&self.text, self.cursor);
        self.preferred_column = None;
        true
    }

    fn move_right(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        let next = next_grapheme_boundary(&self.text, self.cursor);
        if next == self.cursor {
            return false;
        }
        self.cursor = next;
        self.preferred_column = None;
        true
    }

    fn move_home(&mut self) -> bool {
        let start = line_start(&self.text, self.cursor);
        if self.cursor == start {
            return false;
        }
        self.cursor = start;
        self.preferred_column = Some(0);
        true
    }

    fn move_end(&mut self) -> bool {
        let end = line_end(&self.text, self.cursor);
        if self.cursor == end {
            return false;
        }
        self.cursor = end;
        self.preferred_column = Some(column_at(
            &self.text,
            line_start(&self.text, self.cursor),
            self.cursor,
        ));
        true
    }

    fn move_up(&mut self) -> bool {
        let current_line_start = line_start(&self.text, self.cursor);
        let column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.text, current_line_start, self.cursor));
        if current_line_start == 0 {
            if self.cursor == 0 {
                return false;
            }
            self.cursor = 0;
            self.preferred_column = Some(column);
            return true;
        }
        let prev_line_start = line_start(&self.text, current_line_start - 1);
        self.cursor = position_for_column(&self.text, prev_line_start, column);
        self.preferred_column = Some(column);
        true
    }

    fn move_down(&mut self) -> bool {
        let current_line_start = line_start(&self.text, self.cursor);
        let column = self
            .preferred_column
            .unwrap_or_else(|| column_at(&self.text, current_line_start, self.cursor));
        let current_line_end = line_end(&self.text, self.cursor);
        if current_line_end == self.text.len() {
            if self.cursor == self.text.len() {
                return false;
            }
            self.cursor = self.text.len();
            self.preferred_column = Some(column);
            return true;
        }
        self.cursor = position_for_column(&self.text, current_line_end + 1, column);
        self.preferred_column = Some(column);
        true
    }

    fn move_word_left(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        let mut idx = self.cursor;
        while idx > 0 {
            let prev = prev_grapheme_boundary(&self.text, idx);
            if !self.text[prev..idx].trim().is_empty() {
                break;
            }
            idx = prev;
        }
        while idx > 0 {
            let prev = prev_grapheme_boundary(&self.text, idx);
            if self.text[prev..idx].trim().is_empty() {
                break;
            }
            idx = prev;
        }
        self.cursor = idx;
        self.preferred_column = None;
        true
    }

    fn move_word_right(&mut self) -> bool {
        let len = self.text.len();
        if self.cursor >= len {
            return false;
        }
        let mut idx = self.cursor;
        while idx < len {
            let next = next_grapheme_boundary(&self.text, idx);
            if self.text[idx..next].trim().is_empty() {
                break;
            }
            idx = next;
        }
        while idx < len {
            let next = next_grapheme_boundary(&self.text, idx);
            if !self.text[idx..next].trim().is_empty() {
                break;
            }
            idx = next;
        }
        if idx == self.cursor {
            return false;
        }
        self.cursor = idx;
        self.preferred_column = None;
        true
    }
}

fn grapheme_floor(text: &str, position: usize) -> usize {
    if position >= text.len() {
        return text.len();
    }
    let mut floor = 0;
    for (idx, _) in text.grapheme_indices(true) {
        if idx > position {
            break;
        }
        floor = idx;
    }
    floor
}

fn prev_grapheme_boundary(text: &str, cursor: usize) -> usize {
    text[..cursor]
        .grapheme_indices(true)
        .next_back()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_inserts_configured_spaces() {
        let mut buffer = TextBuffer::new("fn main() {\n}");
        buffer.set_cursor(12);
        assert!(buffer.insert_tab(2));
        assert_eq!(buffer.text(), "fn main() {\n  }");
        assert_eq!(buffer.cursor(), 14);
    }

    #[test]
    fn backspace_removes_whole_grapheme() {
        let mut buffer = TextBuffer::new("cafe\u{301}");
        assert!(buffer.backspace());
        assert_eq!(buffer.text(), "caf");
        assert!(buffer.backspace());
        assert_eq!(buffer.text(), "ca");
    }

    #[test]
    fn vertical_motion_remembers_column() {
        let mut buffer = TextBuffer::new("abcdef\nab\nabcdef");
        buffer.set_cursor(5);
        assert!(buffer.move_cursor(Motion::Down));
        assert_eq!(buffer.cursor(), 9);
        assert!(buffer.move_cursor(Motion::Down));
        assert_eq!(buffer.cursor(), 15);
        assert!(buffer.move_cursor(Motion::Up));
        assert!(buffer.move_cursor(Motion::Up));
        assert_eq!(buffer.cursor(), 5);
    }

    #[test]
    fn word_motion_skips_whitespace() {
        let mut buffer = TextBuffer::new("alpha  beta");
        assert!(buffer.move_cursor(Motion::WordLeft));
        assert_eq!(buffer.cursor(), 7);
        assert!(buffer.move_cursor(Motion::WordLeft));
        assert_eq!(buffer.cursor(), 0);
        assert!(buffer.move_cursor(Motion::WordRight));
        assert_eq!(buffer.cursor(), 7);
    }

    #[test]
    fn replace_revalidates_cursor() {
        let mut buffer = TextBuffer::new("a long line of text");
        buffer.replace("e\u{301}x".to_string());
        assert_eq!(buffer.cursor(), "e\u{301}x".len());
        buffer.set_cursor(2);
        assert_eq!(buffer.cursor(), 0);
        buffer.replace(String::new());
        assert_eq!(buffer.cursor(), 0);
    }

    #[test]
    fn counts_track_lines_and_chars() {
        let buffer = TextBuffer::new("");
        assert_eq!(buffer.line_count(), 1);
        assert_eq!(buffer.char_count(), 0);
        let buffer = TextBuffer::new("héllo\nworld\n");
        assert_eq!(buffer.line_count(), 3);
        assert_eq!(buffer.char_count(), 12);
        assert_eq!(buffer.cursor_line(), 2);
    }

    #[test]
    fn scroll_follows_cursor() {
        let mut buffer = TextBuffer::new("1\n2\n3\n4\n5\n6");
        assert_eq!(buffer.scroll_to_cursor(3), 3);
        buffer.move_cursor(Motion::BufferStart);
        assert_eq!(buffer.scroll_to_cursor(3), 0);
    }
}
