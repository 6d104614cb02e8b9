use std::sync::Arc;

use crate::editor::{FormatRequest, SessionEffect};
use crate::notes::{Note, NoteId, NoteStore};

/// Built-in key bindings, shown in the help line and kept away from the
/// activation shortcut.
pub const KEY_BINDINGS: &[(&str, &str)] = &[
    ("ctrl+n", "new flick"),
    ("ctrl+q", "quit"),
    ("ctrl+l", "switch language"),
    ("ctrl+t", "tab mode"),
    ("ctrl+f", "format"),
    ("ctrl+w", "switch pane"),
    ("ctrl+r", "rename"),
    ("ctrl+d", "delete"),
    ("ctrl+o", "settings"),
    ("ctrl+e", "format error details"),
    ("ctrl+g", "reload formatter"),
    ("ctrl+s", "save now"),
    ("ctrl+c", "quit"),
];

/// Applies session side effects and list operations to the note store.
pub struct ActionDispatcher<'a> {
    store: &'a mut NoteStore,
}

impl<'a> ActionDispatcher<'a> {
    pub fn new(store: &'a mut NoteStore) -> Self {
        Self { store }
    }

    /// Carries out store effects and hands back the format jobs for the worker.
    pub fn dispatch(&mut self, effects: Vec<SessionEffect>) -> Vec<FormatRequest> {
        let mut requests = Vec::new();
        for effect in effects {
            match effect {
                SessionEffect::Commit {
                    note_id,
                    content,
                    at,
                } => {
                    self.store.commit(&note_id, content, at);
                }
                SessionEffect::SwapStoredBuffers { note_id } => {
                    self.store.swap_buffers(&note_id);
                }
                SessionEffect::Format(request) => requests.push(request),
            }
        }
        requests
    }

    pub fn create_note(&mut self) -> Arc<Note> {
        self.store.create()
    }

    pub fn rename_note(&mut self, note_id: &NoteId, name: &str) -> bool {
        self.store.rename(note_id, name)
    }

    /// Removes the note and returns the one that should be shown next.
    pub fn delete_note(&mut self, note_id: &NoteId) -> Option<Arc<Note>> {
        let index = self.store.position(note_id)?;
        self.store.remove(note_id)?;
        let notes = self.store.notes();
        let next = index.min(notes.len().saturating_sub(1));
        notes.get(next).cloned()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use anyhow::Result;
    use parking_lot::Mutex;
    use time::macros::datetime;

    use super::*;
    use crate::classify::LanguageTag;
    use crate::editor::FormatTrigger;
    use crate::notes::NoteContent;
    use crate::shortcuts::Accelerator;
    use crate::storage::KeyValueStore;

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
    }

    impl KeyValueStore for MemoryStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            Ok(self.values.lock().get(key).cloned())
        }

        fn set(&self, key: &str, value: &str) -> Result<()> {
            self.values.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }
    }

    fn store() -> NoteStore {
        NoteStore::load(Arc::new(MemoryStore::default()))
    }

    #[test]
    fn commits_and_swaps_reach_the_store_and_formats_are_returned() {
        let mut store = store();
        let id = store.notes()[0].id.clone();
        let content = NoteContent {
            plaintext: "prose".into(),
            code: "let a = 1;".into(),
        };
        let request = FormatRequest {
            note_id: id.clone(),
            generation: 0,
            ticket: 1,
            text: "let a = 1;".into(),
            language: LanguageTag::Javascript,
            trigger: FormatTrigger::Paste,
        };
        let requests = ActionDispatcher::new(&mut store).dispatch(vec![
            SessionEffect::Commit {
                note_id: id.clone(),
                content,
                at: datetime!(2024-03-01 12:00 UTC),
            },
            SessionEffect::Format(request.clone()),
            SessionEffect::SwapStoredBuffers { note_id: id.clone() },
        ]);
        assert_eq!(requests, vec![request]);
        let note = store.get(&id).expect("note");
        assert_eq!(note.content.plaintext, "let a = 1;");
        assert_eq!(note.content.code, "prose");
        assert!(note.is_edited);
    }

    #[test]
    fn deleting_moves_to_the_neighbour() {
        let mut store = store();
        let first = store.notes()[0].id.clone();
        let second = store.create().id.clone();
        let third = store.create().id.clone();

        let next = ActionDispatcher::new(&mut store).delete_note(&second);
        assert_eq!(next.map(|note| note.id.clone()), Some(third.clone()));
        let next = ActionDispatcher::new(&mut store).delete_note(&third);
        assert_eq!(next.map(|note| note.id.clone()), Some(first));
        assert!(ActionDispatcher::new(&mut store)
            .delete_note(&NoteId::from("missing"))
            .is_none());
    }

    #[test]
    fn builtin_bindings_parse_as_accelerators() {
        for (keys, action) in KEY_BINDINGS {
            assert!(keys.parse::<Accelerator>().is_ok(), "{action}: {keys}");
        }
    }
}
