use std::sync::Arc;

use strum::IntoEnumIterator;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{SettingKey, Settings};
use crate::editor::EditorSession;
use crate::format::EngineState;
use crate::notes::{Note, NoteId};
use crate::shortcuts::ShortcutStatus;

const MAX_NAME_CHARS: usize = 120;

#[derive(Debug, Clone)]
pub struct RenameOverlay {
    pub note_id: NoteId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct DeleteOverlay {
    pub note_id: NoteId,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct SettingsOverlay {
    pub selected: usize,
    /// Draft for a free-text key while it is being typed.
    pub input: Option<String>,
    pub error: Option<String>,
}

impl SettingsOverlay {
    pub fn keys() -> impl Iterator<Item = SettingKey> {
        SettingKey::iter()
    }

    pub fn selected_key(&self) -> SettingKey {
        Self::keys()
            .nth(self.selected)
            .unwrap_or(SettingKey::AutoLaunch)
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = Self::keys().count() as isize;
        if len == 0 {
            return;
        }
        let next = (self.selected as isize + delta).rem_euclid(len);
        self.selected = next as usize;
        self.input = None;
        self.error = None;
    }
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    Rename(RenameOverlay),
    DeleteConfirm(DeleteOverlay),
    Settings(SettingsOverlay),
    FormatErrorDetails { message: String },
}

/// Everything the renderer needs for one frame.
#[derive(Debug)]
pub struct AppState {
    pub session: EditorSession,
    pub notes: Arc<[Arc<Note>]>,
    pub settings: Settings,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
    pub shortcut: ShortcutStatus,
    pub engine: EngineState,
    pub storage_error: Option<String>,
}

impl AppState {
    pub fn new(session: EditorSession, notes: Arc<[Arc<Note>]>, settings: Settings) -> Self {
        Self {
            session,
            notes,
            settings,
            status_message: None,
            overlay: None,
            shortcut: ShortcutStatus::Inactive {
                reason: "not registered yet".to_string(),
            },
            engine: EngineState::Uninitialized,
            storage_error: None,
        }
    }

    pub fn set_notes(&mut self, notes: Arc<[Arc<Note>]>) {
        self.notes = notes;
    }

    pub fn current_note(&self) -> Option<&Arc<Note>> {
        let id = self.session.note_id();
        self.notes.iter().find(|note| &note.id == id)
    }

    /// Zero-based index of the open note in the collection.
    pub fn note_position(&self) -> Option<usize> {
        let id = self.session.note_id();
        self.notes.iter().position(|note| &note.id == id)
    }

    /// The note `delta` steps away from the open one, wrapping at both ends.
    pub fn neighbour(&self, delta: isize) -> Option<Arc<Note>> {
        let len = self.notes.len() as isize;
        if len < 2 {
            return None;
        }
        let position = self.note_position()? as isize;
        let next = (position + delta).rem_euclid(len) as usize;
        self.notes.get(next).cloned()
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn clear_status_message(&mut self) {
        self.status_message = None;
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn open_rename(&mut self) -> bool {
        let Some(note) = self.current_note() else {
            return false;
        };
        self.overlay = Some(OverlayState::Rename(RenameOverlay {
            note_id: note.id.clone(),
            name: note.name.clone(),
        }));
        true
    }

    pub fn open_delete(&mut self) -> bool {
        let Some(note) = self.current_note() else {
            return false;
        };
        self.overlay = Some(OverlayState::DeleteConfirm(DeleteOverlay {
            note_id: note.id.clone(),
            name: note.name.clone(),
        }));
        true
    }

    pub fn open_settings(&mut self) {
        self.overlay = Some(OverlayState::Settings(SettingsOverlay::default()));
    }

    /// Shows the details of the sticky format error. Returns false when there is none.
    pub fn open_format_error(&mut self) -> bool {
        let Some(message) = self.session.format_error() else {
            return false;
        };
        self.overlay = Some(OverlayState::FormatErrorDetails {
            message: message.to_string(),
        });
        true
    }

    pub fn rename_overlay_mut(&mut self) -> Option<&mut RenameOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Rename(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn settings_overlay_mut(&mut self) -> Option<&mut SettingsOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::Settings(overlay)) => Some(overlay),
            _ => None,
        }
    }
}

/// Appends to a one-line text field, capped at a sane length.
pub fn push_input_char(input: &mut String, ch: char) {
    if !ch.is_control() && input.graphemes(true).count() < MAX_NAME_CHARS {
        input.push(ch);
    }
}

/// Removes the last grapheme so combined characters go away in one keystroke.
pub fn pop_input_grapheme(input: &mut String) {
    if let Some((offset, _)) = input.grapheme_indices(true).next_back() {
        input.truncate(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::notes::ContentMode;

    fn state_with(notes: Vec<Note>, open: usize) -> AppState {
        let notes: Arc<[Arc<Note>]> = notes.into_iter().map(Arc::new).collect();
        let session = EditorSession::new(
            EditorConfig::default(),
            &notes[open],
            ContentMode::Plaintext,
        );
        AppState::new(session, notes, Settings::default())
    }

    #[test]
    fn neighbour_wraps_around() {
        let state = state_with(vec![Note::default(), Note::default(), Note::default()], 0);
        let previous = state.neighbour(-1).expect("previous");
        assert_eq!(previous.id, state.notes[2].id);
        let next = state.neighbour(1).expect("next");
        assert_eq!(next.id, state.notes[1].id);
    }

    #[test]
    fn single_note_has_no_neighbour() {
        let state = state_with(vec![Note::default()], 0);
        assert_eq!(state.note_position(), Some(0));
        assert!(state.neighbour(1).is_none());
    }

    #[test]
    fn rename_overlay_starts_from_current_name() {
        let mut state = state_with(vec![Note::default()], 0);
        assert!(state.open_rename());
        let overlay = state.rename_overlay_mut().expect("rename overlay");
        assert_eq!(overlay.name, "New Flick");
        pop_input_grapheme(&mut overlay.name);
        push_input_char(&mut overlay.name, '!');
        assert_eq!(overlay.name, "New Flic!");
    }

    #[test]
    fn format_details_need_an_error() {
        let mut state = state_with(vec![Note::default()], 0);
        assert!(!state.open_format_error());
        assert!(state.overlay().is_none());
    }

    #[test]
    fn settings_selection_wraps_and_clears_draft() {
        let mut overlay = SettingsOverlay {
            input: Some("draft".into()),
            ..SettingsOverlay::default()
        };
        overlay.move_selection(-1);
        assert_eq!(overlay.selected_key(), SettingKey::FontFamilyCode);
        assert!(overlay.input.is_none());
        overlay.move_selection(1);
        assert_eq!(overlay.selected_key(), SettingKey::AutoLaunch);
    }

    #[test]
    fn pop_removes_whole_grapheme() {
        let mut input = String::from("cafe\u{301}");
        pop_input_grapheme(&mut input);
        assert_eq!(input, "caf");
    }
}
