use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, EnumString};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::storage::KeyValueStore;

/// Key the whole note collection is stored under.
pub const STORE_KEY: &str = "flick";
pub const DEFAULT_NOTE_NAME: &str = "New Flick";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which of a note's two buffers is in front.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ContentMode {
    #[default]
    Plaintext,
    Code,
}

impl ContentMode {
    pub fn other(self) -> Self {
        match self {
            ContentMode::Plaintext => ContentMode::Code,
            ContentMode::Code => ContentMode::Plaintext,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ContentMode::Plaintext => "Plain Text",
            ContentMode::Code => "Code",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteContent {
    pub plaintext: String,
    pub code: String,
}

impl NoteContent {
    pub fn get(&self, mode: ContentMode) -> &str {
        match mode {
            ContentMode::Plaintext => &self.plaintext,
            ContentMode::Code => &self.code,
        }
    }

    pub fn set(&mut self, mode: ContentMode, text: String) {
        match mode {
            ContentMode::Plaintext => self.plaintext = text,
            ContentMode::Code => self.code = text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub name: String,
    pub content: NoteContent,
    /// Time of the last committed save, never of a keystroke.
    pub updated_at: OffsetDateTime,
    /// Set by the first commit and never cleared.
    pub is_edited: bool,
}

impl Note {
    pub fn new(name: impl Into<String>, content: NoteContent) -> Self {
        Self {
            id: NoteId::generate(),
            name: name.into(),
            content,
            updated_at: OffsetDateTime::now_utc(),
            is_edited: false,
        }
    }

    pub fn buffer(&self, mode: ContentMode) -> &str {
        self.content.get(mode)
    }
}

impl Default for Note {
    fn default() -> Self {
        Note::new(DEFAULT_NOTE_NAME, NoteContent::default())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredNote<'a> {
    id: &'a NoteId,
    name: &'a str,
    content: &'a NoteContent,
    updated_at: String,
    is_edited: bool,
}

impl<'a> From<&'a Note> for StoredNote<'a> {
    fn from(note: &'a Note) -> Self {
        Self {
            id: &note.id,
            name: &note.name,
            content: &note.content,
            updated_at: note
                .updated_at
                .format(&Rfc3339)
                .unwrap_or_else(|_| note.updated_at.unix_timestamp().to_string()),
            is_edited: note.is_edited,
        }
    }
}

pub fn encode_notes(notes: &[Arc<Note>]) -> Result<String> {
    let stored: Vec<StoredNote<'_>> = notes.iter().map(|note| StoredNote::from(&**note)).collect();
    serde_json::to_string(&stored).context("serializing note collection")
}

/// Parses a stored collection, upgrading older shapes on the way in.
pub fn decode_notes(raw: &str) -> Result<Vec<Note>> {
    let value: Value = serde_json::from_str(raw).context("parsing stored note collection")?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(single) => vec![Value::Object(single)],
        other => anyhow::bail!("stored note collection is {}, expected an array", kind(&other)),
    };

    let now = OffsetDateTime::now_utc();
    let notes = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match entry {
            Value::Object(fields) => Some(migrate_entry(fields, now)),
            other => {
                tracing::warn!(index, kind = kind(&other), "skipping stored note that is not an object");
                None
            }
        })
        .collect();
    Ok(notes)
}

fn migrate_entry(mut fields: Map<String, Value>, now: OffsetDateTime) -> Note {
    let id = match fields.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => NoteId(id),
        Some(Value::Number(id)) => NoteId(id.to_string()),
        _ => NoteId::generate(),
    };
    let name = match fields.remove("name") {
        Some(Value::String(name)) => name,
        _ => DEFAULT_NOTE_NAME.to_string(),
    };
    let content = match fields.remove("content") {
        Some(Value::String(plaintext)) => NoteContent {
            plaintext,
            code: String::new(),
        },
        Some(Value::Object(mut buffers)) => NoteContent {
            plaintext: take_string(&mut buffers, "plaintext"),
            code: take_string(&mut buffers, "code"),
        },
        _ => NoteContent::default(),
    };
    let updated_at = match fields.remove("updatedAt") {
        Some(Value::String(stamp)) => OffsetDateTime::parse(&stamp, &Rfc3339).unwrap_or(now),
        Some(Value::Number(millis)) => millis
            .as_i64()
            .and_then(|ms| OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok())
            .unwrap_or(now),
        _ => now,
    };
    let is_edited = matches!(fields.remove("isEdited"), Some(Value::Bool(true)));

    Note {
        id,
        name,
        content,
        updated_at,
        is_edited,
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> String {
    match fields.remove(key) {
        Some(Value::String(text)) => text,
        _ => String::new(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// What has to happen before the stored collection may be overwritten.
#[derive(Debug, Clone, PartialEq, Eq)]
enum WriteGuard {
    Open,
    /// The stored value did not parse; it is copied aside first.
    BackupFirst(String),
    /// The stored value could not be read; it is read again first.
    Reread,
}

/// In-memory note collection mirrored to a [`KeyValueStore`].
///
/// Each mutation builds a fresh snapshot, sharing untouched notes with the
/// previous one, and writes the whole collection back. Write failures are
/// logged and leave the in-memory collection as the source of truth.
///
/// A collection that failed to load is never overwritten blind: unparseable
/// text is copied to a `flick.corrupt-<unix time>` key before the first
/// write, and a value that could not be read at all blocks writes until a
/// later read succeeds.
pub struct NoteStore {
    backend: Arc<dyn KeyValueStore>,
    notes: Arc<[Arc<Note>]>,
    last_error: Option<String>,
    guard: WriteGuard,
    backup_key: Option<String>,
}

impl NoteStore {
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        let (notes, last_error, guard) = match read_collection(backend.as_ref()) {
            Ok(notes) if !notes.is_empty() => (notes, None, WriteGuard::Open),
            Ok(_) => (vec![Note::default()], None, WriteGuard::Open),
            Err(failure) => {
                let err = failure.error();
                tracing::error!(?err, "failed to read stored notes; starting from a fresh note");
                let message = format!("{err:#}");
                let guard = match failure {
                    ReadFailure::Unparseable { raw, .. } => WriteGuard::BackupFirst(raw),
                    ReadFailure::Unreachable(_) => WriteGuard::Reread,
                };
                (vec![Note::default()], Some(message), guard)
            }
        };
        tracing::debug!(count = notes.len(), "note collection loaded");
        Self {
            backend,
            notes: notes.into_iter().map(Arc::new).collect(),
            last_error,
            guard,
            backup_key: None,
        }
    }

    /// Key the unreadable collection was copied to, reported once.
    pub fn take_backup_key(&mut self) -> Option<String> {
        self.backup_key.take()
    }

    pub fn notes(&self) -> Arc<[Arc<Note>]> {
        self.notes.clone()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn get(&self, id: &NoteId) -> Option<Arc<Note>> {
        self.notes.iter().find(|note| &note.id == id).cloned()
    }

    /// The most recently appended note, which is the one opened at startup.
    pub fn latest(&self) -> Option<Arc<Note>> {
        self.notes.last().cloned()
    }

    pub fn position(&self, id: &NoteId) -> Option<usize> {
        self.notes.iter().position(|note| &note.id == id)
    }

    /// Message of the most recent failed read or write, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn create(&mut self) -> Arc<Note> {
        self.create_with(DEFAULT_NOTE_NAME, NoteContent::default())
    }

    pub fn create_with(&mut self, name: &str, content: NoteContent) -> Arc<Note> {
        let note = Arc::new(Note::new(normalize_name(name), content));
        let mut next: Vec<Arc<Note>> = self.notes.iter().cloned().collect();
        next.push(note.clone());
        self.replace(next);
        tracing::info!(note_id = %note.id, "note created");
        note
    }

    pub fn rename(&mut self, id: &NoteId, name: &str) -> bool {
        let name = normalize_name(name);
        self.update(id, |note| note.name = name)
    }

    /// Writes both buffers of a note and stamps it as edited at `at`.
    pub fn commit(&mut self, id: &NoteId, content: NoteContent, at: OffsetDateTime) -> bool {
        self.update(id, |note| {
            note.content = content;
            note.updated_at = at;
            note.is_edited = true;
        })
    }

    /// Exchanges the stored plaintext and code buffers of a note.
    pub fn swap_buffers(&mut self, id: &NoteId) -> bool {
        self.update(id, |note| {
            std::mem::swap(&mut note.content.plaintext, &mut note.content.code);
        })
    }

    /// Deletes a note. Removing the last one seeds a fresh default note.
    pub fn remove(&mut self, id: &NoteId) -> Option<Arc<Note>> {
        let index = self.position(id)?;
        let mut next: Vec<Arc<Note>> = self.notes.iter().cloned().collect();
        let removed = next.remove(index);
        if next.is_empty() {
            next.push(Arc::new(Note::default()));
        }
        self.replace(next);
        tracing::info!(note_id = %removed.id, "note removed");
        Some(removed)
    }

    fn update<F>(&mut self, id: &NoteId, apply: F) -> bool
    where
        F: FnOnce(&mut Note),
    {
        let Some(index) = self.position(id) else {
            tracing::warn!(note_id = %id, "mutation for unknown note ignored");
            return false;
        };
        let mut next: Vec<Arc<Note>> = self.notes.iter().cloned().collect();
        let mut note = (*next[index]).clone();
        apply(&mut note);
        next[index] = Arc::new(note);
        self.replace(next);
        true
    }

    fn replace(&mut self, next: Vec<Arc<Note>>) {
        self.notes = next.into();
        match self.persist() {
            Ok(()) => self.last_error = None,
            Err(err) => {
                tracing::error!(?err, "failed to persist notes; keeping in-memory copy");
                self.last_error = Some(format!("{err:#}"));
            }
        }
    }

    fn persist(&mut self) -> Result<()> {
        self.release_guard()?;
        let encoded = encode_notes(&self.notes)?;
        self.backend.set(STORE_KEY, &encoded)
    }

    fn release_guard(&mut self) -> Result<()> {
        if self.guard == WriteGuard::Reread {
            let raw = self
                .backend
                .get(STORE_KEY)
                .context("stored flicks are still unreadable; changes kept in memory only")?;
            self.guard = match raw {
                Some(raw) => WriteGuard::BackupFirst(raw),
                None => WriteGuard::Open,
            };
        }
        if let WriteGuard::BackupFirst(raw) = &self.guard {
            let key = format!(
                "{STORE_KEY}.corrupt-{}",
                OffsetDateTime::now_utc().unix_timestamp()
            );
            self.backend
                .set(&key, raw)
                .with_context(|| format!("copying unreadable flicks to {key}"))?;
            tracing::warn!(backup = %key, "unreadable flicks copied aside before overwriting");
            self.backup_key = Some(key);
            self.guard = WriteGuard::Open;
        }
        Ok(())
    }
}

enum ReadFailure {
    Unreachable(anyhow::Error),
    Unparseable { raw: String, error: anyhow::Error },
}

impl ReadFailure {
    fn error(&self) -> &anyhow::Error {
        match self {
            ReadFailure::Unreachable(error) | ReadFailure::Unparseable { error, .. } => error,
        }
    }
}

fn read_collection(backend: &dyn KeyValueStore) -> Result<Vec<Note>, ReadFailure> {
    match backend.get(STORE_KEY).map_err(ReadFailure::Unreachable)? {
        Some(raw) => decode_notes(&raw).map_err(|error| ReadFailure::Unparseable { raw, error }),
        None => Ok(Vec::new()),
    }
}

fn normalize_name(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        DEFAULT_NOTE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}
