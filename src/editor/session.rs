use std::time::Instant;

use time::OffsetDateTime;

use super::buffer::{Motion, TextBuffer};
use super::timers::{earliest, SaveEvent, SaveState, Timer};
use crate::classify::{classify, LanguageTag};
use crate::config::EditorConfig;
use crate::format::{FormatOutcome, FORMATTABLE_LANGUAGES};
use crate::notes::{ContentMode, Note, NoteContent, NoteId};

const FALLBACK_FORMAT_ERROR: &str = "Failed to format code";

/// The primary pane shows the buffer of the current mode; the secondary pane
/// holds the other buffer and is only visible in tab mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Insert(char),
    Newline,
    Tab,
    Backspace,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatTrigger {
    Paste,
    Detection,
    Manual,
}

/// Work handed to the formatter. Results are matched back by `generation` and `ticket`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRequest {
    pub note_id: NoteId,
    pub generation: u64,
    pub ticket: u64,
    pub text: String,
    pub language: LanguageTag,
    pub trigger: FormatTrigger,
}

impl FormatRequest {
    pub fn complete(self, outcome: FormatOutcome) -> FormatResult {
        FormatResult {
            note_id: self.note_id,
            generation: self.generation,
            ticket: self.ticket,
            source: self.text,
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatResult {
    pub note_id: NoteId,
    pub generation: u64,
    pub ticket: u64,
    pub source: String,
    pub outcome: FormatOutcome,
}

/// Side effects the host must carry out, drained with [`EditorSession::take_effects`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEffect {
    Commit {
        note_id: NoteId,
        content: NoteContent,
        at: OffsetDateTime,
    },
    Format(FormatRequest),
    SwapStoredBuffers {
        note_id: NoteId,
    },
}

/// User gestures the presentation layer forwards to the session.
pub trait EditorGestures {
    /// Applies a keystroke to the focused pane. Returns whether the text changed.
    fn on_edit(&mut self, edit: Edit, now: Instant) -> bool;
    fn on_paste(&mut self, text: &str, now: Instant);
    fn on_language_switch(&mut self, mode: ContentMode);
    /// Manual "Format" action. Returns false when the action is disabled.
    fn on_format_request(&mut self) -> bool;
    fn on_tab_mode_toggle(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct EditStamp {
    instant: Instant,
    wall: OffsetDateTime,
}

/// Controller for the note currently open in the editor.
///
/// All timing is driven by the host: gestures and [`EditorSession::poll`]
/// take the current [`Instant`], and [`EditorSession::next_deadline`] says
/// when the next timer is due. Three timers run independently: the save
/// chain, background language detection, and the format-success badge.
#[derive(Debug)]
pub struct EditorSession {
    config: EditorConfig,
    note_id: NoteId,
    generation: u64,
    mode: ContentMode,
    tab_mode: bool,
    primary: TextBuffer,
    secondary: TextBuffer,
    focus: Pane,
    save_state: SaveState,
    detected_language: Option<LanguageTag>,
    has_detected_once: bool,
    is_first_paste: bool,
    format_error: Option<String>,
    format_success: bool,
    pending_format: Option<u64>,
    next_ticket: u64,
    dirty: bool,
    last_edit: Option<EditStamp>,
    last_edited: OffsetDateTime,
    save_timer: Timer,
    detect_timer: Timer,
    format_success_timer: Timer,
    effects: Vec<SessionEffect>,
}

impl EditorSession {
    pub fn new(config: EditorConfig, note: &Note, mode: ContentMode) -> Self {
        let mut session = Self {
            config,
            note_id: note.id.clone(),
            generation: 0,
            mode,
            tab_mode: false,
            primary: TextBuffer::default(),
            secondary: TextBuffer::default(),
            focus: Pane::Primary,
            save_state: SaveState::Empty,
            detected_language: None,
            has_detected_once: false,
            is_first_paste: true,
            format_error: None,
            format_success: false,
            pending_format: None,
            next_ticket: 0,
            dirty: false,
            last_edit: None,
            last_edited: note.updated_at,
            save_timer: Timer::default(),
            detect_timer: Timer::default(),
            format_success_timer: Timer::default(),
            effects: Vec::new(),
        };
        session.load_note(note);
        session
    }

    /// Points the session at another note.
    ///
    /// Unsaved text goes to the previous note first. Pending timers are
    /// dropped and any format result still in flight will be discarded.
    pub fn bind(&mut self, note: &Note, now: Instant) {
        self.flush(now);
        self.generation += 1;
        self.load_note(note);
        tracing::debug!(note_id = %note.id, generation = self.generation, "editor bound to note");
    }

    /// Commits unsaved text right away, short-circuiting the save chain.
    pub fn flush(&mut self, now: Instant) {
        if self.dirty {
            let at = self.wall_clock(now);
            self.emit_commit(at);
        }
        self.save_timer.cancel();
        if self.save_state.is_transient() {
            self.save_state = SaveState::Saved;
        }
    }

    pub fn update_config(&mut self, config: EditorConfig) {
        if !config.auto_detect_language {
            self.detect_timer.cancel();
        }
        self.config = config;
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn note_id(&self) -> &NoteId {
        &self.note_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self) -> ContentMode {
        self.mode
    }

    pub fn tab_mode(&self) -> bool {
        self.tab_mode
    }

    pub fn focus(&self) -> Pane {
        self.focus
    }

    pub fn save_state(&self) -> SaveState {
        self.save_state
    }

    pub fn detected_language(&self) -> Option<LanguageTag> {
        self.detected_language
    }

    pub fn has_detected_once(&self) -> bool {
        self.has_detected_once
    }

    pub fn is_first_paste(&self) -> bool {
        self.is_first_paste
    }

    pub fn format_error(&self) -> Option<&str> {
        self.format_error.as_deref()
    }

    pub fn format_success(&self) -> bool {
        self.format_success
    }

    pub fn is_formatting(&self) -> bool {
        self.pending_format.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Wall-clock time of the last keystroke, or of the last save before any typing.
    pub fn last_edited(&self) -> OffsetDateTime {
        self.last_edited
    }

    pub fn pane(&self, pane: Pane) -> &TextBuffer {
        match pane {
            Pane::Primary => &self.primary,
            Pane::Secondary => &self.secondary,
        }
    }

    pub fn pane_mut(&mut self, pane: Pane) -> &mut TextBuffer {
        match pane {
            Pane::Primary => &mut self.primary,
            Pane::Secondary => &mut self.secondary,
        }
    }

    /// Mode label of the buffer shown in `pane`.
    pub fn pane_mode(&self, pane: Pane) -> ContentMode {
        match pane {
            Pane::Primary => self.mode,
            Pane::Secondary => self.mode.other(),
        }
    }

    /// Both working buffers mapped back onto the note's stored layout.
    pub fn content(&self) -> NoteContent {
        let mut content = NoteContent::default();
        content.set(self.mode, self.primary.text().to_string());
        content.set(self.mode.other(), self.secondary.text().to_string());
        content
    }

    pub fn focus_pane(&mut self, pane: Pane) {
        if self.tab_mode || pane == Pane::Primary {
            self.focus = pane;
        }
    }

    pub fn toggle_focus(&mut self) {
        let next = match self.focus {
            Pane::Primary => Pane::Secondary,
            Pane::Secondary => Pane::Primary,
        };
        self.focus_pane(next);
    }

    pub fn move_cursor(&mut self, motion: Motion) -> bool {
        let focus = self.focus;
        self.pane_mut(focus).move_cursor(motion)
    }

    /// Whether the manual Format action is enabled.
    pub fn can_format(&self) -> bool {
        self.mode == ContentMode::Code
            && self
                .detected_language
                .is_some_and(|language| !language.is_generic())
            && (!self.primary.is_blank() || self.is_first_paste)
            && self.format_error.is_none()
            && self.pending_format.is_none()
    }

    pub fn take_effects(&mut self) -> Vec<SessionEffect> {
        std::mem::take(&mut self.effects)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        earliest([
            self.save_timer.deadline(),
            self.detect_timer.deadline(),
            self.format_success_timer.deadline(),
        ])
    }

    /// Fires every timer due at `now`. Returns whether anything visible changed.
    ///
    /// Each save phase is armed from the deadline of the one before it, so a
    /// late poll walks through every phase it missed.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Some(deadline) = self.save_timer.fire_if_due(now) {
            let next = self.save_state.advance(SaveEvent::Elapsed);
            changed |= next != self.save_state;
            self.save_state = next;
            self.enter_phase(next, deadline);
        }
        if self.detect_timer.fire_if_due(now).is_some() {
            changed |= self.detect_in_background();
        }
        if self.format_success_timer.fire_if_due(now).is_some() {
            changed |= self.format_success;
            self.format_success = false;
        }
        changed
    }

    /// Applies a finished format job. Returns false when the result was stale.
    pub fn apply_format(&mut self, result: FormatResult, now: Instant) -> bool {
        if result.generation != self.generation || result.note_id != self.note_id {
            tracing::debug!(
                note_id = %result.note_id,
                generation = result.generation,
                "discarding format result for a previous note"
            );
            return false;
        }
        if self.pending_format != Some(result.ticket) {
            tracing::debug!(ticket = result.ticket, "discarding superseded format result");
            return false;
        }
        self.pending_format = None;
        if self.primary.text() != result.source {
            tracing::debug!(ticket = result.ticket, "buffer changed while formatting; result dropped");
            return false;
        }

        let FormatOutcome {
            code,
            success,
            error,
        } = result.outcome;
        if success {
            if code != result.source {
                self.primary.replace(code);
                self.after_edit(Pane::Primary, now);
            }
            self.format_error = None;
            self.format_success = true;
            self.has_detected_once = true;
            self.format_success_timer
                .arm(now, self.config.format_success_display());
        } else {
            let message = error.unwrap_or_else(|| FALLBACK_FORMAT_ERROR.to_string());
            tracing::info!(note_id = %self.note_id, %message, "format failed");
            self.format_error = Some(message);
        }
        true
    }

    fn load_note(&mut self, note: &Note) {
        self.save_timer.cancel();
        self.detect_timer.cancel();
        self.format_success_timer.cancel();

        self.note_id = note.id.clone();
        self.primary = TextBuffer::new(note.buffer(self.mode));
        self.secondary = TextBuffer::new(note.buffer(self.mode.other()));
        self.focus = Pane::Primary;
        self.save_state = if self.primary.is_empty() {
            SaveState::Empty
        } else {
            SaveState::Saved
        };
        self.detected_language = None;
        self.has_detected_once = false;
        self.is_first_paste = true;
        self.format_error = None;
        self.format_success = false;
        self.pending_format = None;
        self.dirty = false;
        self.last_edit = None;
        self.last_edited = note.updated_at;
        self.classify_current();
    }

    fn classify_current(&mut self) {
        if self.mode == ContentMode::Code && self.config.auto_detect_language {
            self.detected_language = classify(self.primary.text());
        }
    }

    fn after_edit(&mut self, pane: Pane, now: Instant) {
        let wall = OffsetDateTime::now_utc();
        self.dirty = true;
        self.last_edit = Some(EditStamp { instant: now, wall });
        self.last_edited = wall;
        self.format_error = None;
        self.format_success = false;
        self.format_success_timer.cancel();

        // Only the visible buffer decides emptiness; the tab-mode pane saves
        // through the normal debounce.
        if pane == Pane::Primary && self.primary.is_empty() {
            self.save_state = self.save_state.advance(SaveEvent::BufferEmptied);
            self.save_timer.cancel();
            self.detect_timer.cancel();
            self.detected_language = None;
            // The save chain is not armed for an empty buffer, so store it now.
            self.emit_commit(wall);
            return;
        }

        self.save_state = self.save_state.advance(SaveEvent::BufferChanged);
        self.save_timer.arm(now, self.config.save_debounce());
        if pane == Pane::Primary
            && self.mode == ContentMode::Code
            && self.config.auto_detect_language
            && self.primary.char_count() > self.config.detection_min_chars
        {
            self.detect_timer.arm(now, self.config.detection_debounce());
        }
    }

    fn enter_phase(&mut self, state: SaveState, at: Instant) {
        tracing::trace!(note_id = %self.note_id, state = <&str>::from(state), "save phase");
        match state {
            SaveState::Waiting => {
                self.classify_on_pause();
                self.save_timer.arm(at, self.config.waiting_pause());
            }
            SaveState::Saving => {
                if self.dirty {
                    let wall = self.wall_clock(at);
                    self.emit_commit(wall);
                }
                self.save_timer.arm(at, self.config.saving_pause());
            }
            SaveState::Empty | SaveState::Editing | SaveState::Saved => {}
        }
    }

    fn classify_on_pause(&mut self) {
        if self.mode != ContentMode::Code || !self.config.auto_detect_language {
            return;
        }
        let Some(language) = classify(self.primary.text()) else {
            return;
        };
        self.detected_language = Some(language);
        if self.config.auto_format
            && !self.has_detected_once
            && FORMATTABLE_LANGUAGES.contains(&language)
            && self.format_error.is_none()
            && self.pending_format.is_none()
        {
            self.queue_format(language, FormatTrigger::Detection);
        }
        self.has_detected_once = true;
    }

    fn detect_in_background(&mut self) -> bool {
        if self.mode != ContentMode::Code || !self.config.auto_detect_language {
            return false;
        }
        match classify(self.primary.text()) {
            Some(language) if self.detected_language != Some(language) => {
                self.detected_language = Some(language);
                true
            }
            _ => false,
        }
    }

    fn queue_format(&mut self, language: LanguageTag, trigger: FormatTrigger) {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending_format = Some(ticket);
        self.effects.push(SessionEffect::Format(FormatRequest {
            note_id: self.note_id.clone(),
            generation: self.generation,
            ticket,
            text: self.primary.text().to_string(),
            language,
            trigger,
        }));
    }

    fn emit_commit(&mut self, at: OffsetDateTime) {
        self.effects.push(SessionEffect::Commit {
            note_id: self.note_id.clone(),
            content: self.content(),
            at,
        });
        self.dirty = false;
    }

    /// Wall-clock reading for a host instant, anchored on the last keystroke.
    fn wall_clock(&self, at: Instant) -> OffsetDateTime {
        match self.last_edit {
            Some(stamp) => stamp.wall + at.saturating_duration_since(stamp.instant),
            None => OffsetDateTime::now_utc(),
        }
    }
}

impl EditorGestures for EditorSession {
    fn on_edit(&mut self, edit: Edit, now: Instant) -> bool {
        let tab_width = self.config.tab_width;
        let pane = self.focus;
        let buffer = self.pane_mut(pane);
        let changed = match edit {
            Edit::Insert(ch) => buffer.insert_char(ch),
            Edit::Newline => buffer.insert_newline(),
            Edit::Tab => buffer.insert_tab(tab_width),
            Edit::Backspace => buffer.backspace(),
            Edit::Delete => buffer.delete(),
        };
        if changed {
            self.after_edit(pane, now);
        }
        changed
    }

    fn on_paste(&mut self, text: &str, now: Instant) {
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let pane = self.focus;
        let code_pane = self.mode == ContentMode::Code && pane == Pane::Primary;
        self.is_first_paste = false;

        if code_pane && self.config.auto_detect_language {
            if let Some(language) = classify(&text) {
                self.detected_language = Some(language);
                self.has_detected_once = false;
            }
        }

        if !self.pane_mut(pane).insert_str(&text) {
            return;
        }
        self.after_edit(pane, now);

        if code_pane && self.config.auto_format {
            let language = self.detected_language.unwrap_or(LanguageTag::Code);
            self.queue_format(language, FormatTrigger::Paste);
        }
    }

    fn on_language_switch(&mut self, mode: ContentMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        if self.tab_mode {
            // Panes keep their text; the stored buffers are relabelled to match.
            self.effects.push(SessionEffect::SwapStoredBuffers {
                note_id: self.note_id.clone(),
            });
        } else {
            std::mem::swap(&mut self.primary, &mut self.secondary);
            self.focus = Pane::Primary;
        }

        self.detect_timer.cancel();
        self.format_success_timer.cancel();
        self.pending_format = None;
        self.format_error = None;
        self.format_success = false;
        self.has_detected_once = false;
        self.detected_language = None;
        self.classify_current();

        if !self.save_state.is_transient() {
            self.save_state = if self.primary.is_empty() {
                SaveState::Empty
            } else {
                SaveState::Saved
            };
        }
        tracing::debug!(note_id = %self.note_id, %mode, tab_mode = self.tab_mode, "content mode switched");
    }

    fn on_format_request(&mut self) -> bool {
        if !self.can_format() {
            return false;
        }
        let Some(language) = self.detected_language else {
            return false;
        };
        self.format_error = None;
        self.format_success = false;
        self.format_success_timer.cancel();
        self.queue_format(language, FormatTrigger::Manual);
        true
    }

    fn on_tab_mode_toggle(&mut self) {
        self.tab_mode = !self.tab_mode;
        if !self.tab_mode {
            self.focus = Pane::Primary;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn note(plaintext: &str, code: &str) -> Note {
        Note::new(
            "Test",
            NoteContent {
                plaintext: plaintext.to_string(),
                code: code.to_string(),
            },
        )
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn type_text(session: &mut EditorSession, text: &str, now: Instant) {
        for ch in text.chars() {
            let edit = if ch == '\n' {
                Edit::Newline
            } else {
                Edit::Insert(ch)
            };
            session.on_edit(edit, now);
        }
    }

    fn commits(effects: &[SessionEffect]) -> Vec<(&NoteId, &NoteContent, OffsetDateTime)> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                SessionEffect::Commit {
                    note_id,
                    content,
                    at,
                } => Some((note_id, content, *at)),
                _ => None,
            })
            .collect()
    }

    fn format_requests(effects: Vec<SessionEffect>) -> Vec<FormatRequest> {
        effects
            .into_iter()
            .filter_map(|effect| match effect {
                SessionEffect::Format(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    fn success(code: &str) -> FormatOutcome {
        FormatOutcome {
            code: code.to_string(),
            success: true,
            error: None,
        }
    }

    fn failure(original: &str, message: &str) -> FormatOutcome {
        FormatOutcome {
            code: original.to_string(),
            success: false,
            error: Some(message.to_string()),
        }
    }

    #[test]
    fn typing_walks_from_empty_to_saved() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", ""),
            ContentMode::Plaintext,
        );
        assert_eq!(session.save_state(), SaveState::Empty);

        session.on_edit(Edit::Insert('x'), t0);
        assert_eq!(session.save_state(), SaveState::Editing);
        assert_eq!(session.next_deadline(), Some(t0 + ms(1500)));

        session.poll(t0 + ms(1499));
        assert_eq!(session.save_state(), SaveState::Editing);
        session.poll(t0 + ms(1500));
        assert_eq!(session.save_state(), SaveState::Waiting);
        assert!(commits(&session.take_effects()).is_empty());

        session.poll(t0 + ms(1700));
        assert_eq!(session.save_state(), SaveState::Saving);
        let effects = session.take_effects();
        let committed = commits(&effects);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].1.plaintext, "x");

        session.poll(t0 + ms(2500));
        assert_eq!(session.save_state(), SaveState::Saved);
        assert_eq!(session.next_deadline(), None);
        assert!(!session.is_dirty());
    }

    #[test]
    fn late_poll_cascades_through_every_phase() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", ""),
            ContentMode::Plaintext,
        );
        session.on_edit(Edit::Insert('x'), t0);
        assert!(session.poll(t0 + Duration::from_secs(30)));
        assert_eq!(session.save_state(), SaveState::Saved);
        assert_eq!(commits(&session.take_effects()).len(), 1);
    }

    #[test]
    fn burst_of_edits_commits_once_with_final_text() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", ""),
            ContentMode::Plaintext,
        );
        let mut now = t0;
        for ch in "hello".chars() {
            session.on_edit(Edit::Insert(ch), now);
            session.poll(now);
            now += ms(1000);
        }
        let last_edit = now - ms(1000);
        let last_wall = session.last_edited();
        assert!(commits(&session.take_effects()).is_empty());
        assert_eq!(session.save_state(), SaveState::Editing);

        session.poll(last_edit + ms(10_000));
        let effects = session.take_effects();
        let committed = commits(&effects);
        assert_eq!(committed.len(), 1);
        let (note_id, content, at) = committed[0];
        assert_eq!(note_id, session.note_id());
        assert_eq!(content.plaintext, "hello");
        assert!(at > last_wall);
    }

    #[test]
    fn emptying_cancels_timers_and_forgets_language() {
        let t0 = Instant::now();
        let source = "const value = compute(1);";
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", source),
            ContentMode::Code,
        );
        assert_eq!(session.detected_language(), Some(LanguageTag::Javascript));
        assert_eq!(session.save_state(), SaveState::Saved);

        for _ in 0..source.len() {
            session.on_edit(Edit::Backspace, t0);
        }
        assert_eq!(session.pane(Pane::Primary).text(), "");
        assert_eq!(session.save_state(), SaveState::Empty);
        assert_eq!(session.detected_language(), None);
        assert_eq!(session.next_deadline(), None);

        let effects = session.take_effects();
        let committed = commits(&effects);
        assert_eq!(committed.last().map(|c| c.1.code.as_str()), Some(""));
    }

    #[test]
    fn tab_toggle_round_trip_leaves_buffers_alone() {
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("prose", "let x = 1;"),
            ContentMode::Plaintext,
        );
        let before = session.content();
        session.on_tab_mode_toggle();
        assert!(session.tab_mode());
        session.on_tab_mode_toggle();
        assert!(!session.tab_mode());
        assert_eq!(session.content(), before);
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn emptying_the_tab_pane_saves_like_any_edit() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("prose", "x"),
            ContentMode::Plaintext,
        );
        session.on_tab_mode_toggle();
        session.focus_pane(Pane::Secondary);
        session.on_edit(Edit::Backspace, t0);

        assert_eq!(session.pane(Pane::Primary).text(), "prose");
        assert_eq!(session.pane(Pane::Secondary).text(), "");
        assert_eq!(session.save_state(), SaveState::Editing);
        assert!(commits(&session.take_effects()).is_empty());

        session.poll(t0 + Duration::from_secs(10));
        assert_eq!(session.save_state(), SaveState::Saved);
        let effects = session.take_effects();
        let committed = commits(&effects);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].1.plaintext, "prose");
        assert_eq!(committed[0].1.code, "");
    }

    #[test]
    fn switching_without_tab_mode_only_changes_the_visible_buffer() {
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("prose", "let x = 1;"),
            ContentMode::Plaintext,
        );
        let before = session.content();
        session.on_language_switch(ContentMode::Code);
        assert_eq!(session.mode(), ContentMode::Code);
        assert_eq!(session.pane(Pane::Primary).text(), "let x = 1;");
        assert_eq!(session.pane(Pane::Secondary).text(), "prose");
        assert_eq!(session.content(), before);
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn switching_in_tab_mode_swaps_stored_buffers() {
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("prose", "let x = 1;"),
            ContentMode::Plaintext,
        );
        session.on_tab_mode_toggle();
        session.on_language_switch(ContentMode::Code);

        assert_eq!(session.pane(Pane::Primary).text(), "prose");
        assert_eq!(session.pane(Pane::Secondary).text(), "let x = 1;");
        assert_eq!(session.pane_mode(Pane::Primary), ContentMode::Code);
        let content = session.content();
        assert_eq!(content.code, "prose");
        assert_eq!(content.plaintext, "let x = 1;");
        assert_matches!(
            session.take_effects().as_slice(),
            [SessionEffect::SwapStoredBuffers { note_id }] if note_id == session.note_id()
        );
    }

    #[test]
    fn paste_classifies_fragment_and_requests_format() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        session.on_paste("{\"a\":1,\"b\":2}", t0);

        assert!(!session.is_first_paste());
        assert_eq!(session.detected_language(), Some(LanguageTag::Json));
        let requests = format_requests(session.take_effects());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].language, LanguageTag::Json);
        assert_eq!(requests[0].trigger, FormatTrigger::Paste);
        assert_eq!(requests[0].text, "{\"a\":1,\"b\":2}");
        assert!(session.is_formatting());
    }

    #[test]
    fn paste_is_classified_on_its_own_text() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", "# heading notes\n"),
            ContentMode::Code,
        );
        assert_eq!(session.detected_language(), Some(LanguageTag::Markdown));
        session.on_paste("{\"a\":1,\"b\":2}", t0);

        assert_eq!(session.detected_language(), Some(LanguageTag::Json));
        let requests = format_requests(session.take_effects());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].language, LanguageTag::Json);
        assert_eq!(requests[0].text, "# heading notes\n{\"a\":1,\"b\":2}");
    }

    #[test]
    fn unrecognised_paste_is_sent_as_generic_code() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        session.on_paste("short", t0);
        let requests = format_requests(session.take_effects());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].language, LanguageTag::Code);
    }

    #[test]
    fn paste_in_plaintext_is_just_an_edit() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", ""),
            ContentMode::Plaintext,
        );
        session.on_paste("const a = 1;\r\nconst b = 2;", t0);
        assert_eq!(
            session.pane(Pane::Primary).text(),
            "const a = 1;\nconst b = 2;"
        );
        assert_eq!(session.detected_language(), None);
        assert!(format_requests(session.take_effects()).is_empty());
        assert_eq!(session.save_state(), SaveState::Editing);
    }

    #[test]
    fn failed_format_keeps_buffer_and_sticks_until_next_edit() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        session.on_paste("{bad json, still braces}", t0);
        let request = format_requests(session.take_effects())
            .pop()
            .expect("paste queues a format");
        let source = request.text.clone();

        let applied = session.apply_format(
            request.complete(failure(&source, "Invalid JSON syntax. Could not format.")),
            t0 + ms(10),
        );
        assert!(applied);
        assert_eq!(session.pane(Pane::Primary).text(), source);
        assert_eq!(
            session.format_error(),
            Some("Invalid JSON syntax. Could not format.")
        );
        assert!(!session.can_format());

        session.poll(t0 + Duration::from_secs(60));
        assert!(session.format_error().is_some());

        session.on_edit(Edit::Insert(' '), t0 + Duration::from_secs(61));
        assert_eq!(session.format_error(), None);
    }

    #[test]
    fn successful_format_replaces_buffer_and_badge_decays() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        session.on_paste("{\"a\":1,\"b\":2}", t0);
        let request = format_requests(session.take_effects())
            .pop()
            .expect("paste queues a format");

        let formatted = "{\n  \"a\": 1,\n  \"b\": 2\n}";
        assert!(session.apply_format(request.complete(success(formatted)), t0 + ms(5)));
        assert_eq!(session.pane(Pane::Primary).text(), formatted);
        assert!(session.format_success());
        assert!(session.has_detected_once());
        assert_eq!(session.save_state(), SaveState::Editing);

        session.poll(t0 + ms(5) + ms(1999));
        assert!(session.format_success());
        session.poll(t0 + ms(5) + ms(2000));
        assert!(!session.format_success());
    }

    #[test]
    fn results_for_a_previous_note_are_discarded() {
        let t0 = Instant::now();
        let first = note("", "");
        let second = note("other", "print('x')");
        let mut session = EditorSession::new(EditorConfig::default(), &first, ContentMode::Code);
        session.on_paste("{\"a\":1}", t0);
        let request = format_requests(session.take_effects())
            .pop()
            .expect("paste queues a format");

        session.bind(&second, t0 + ms(1));
        let effects = session.take_effects();
        let committed = commits(&effects);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].0, &first.id);
        assert_eq!(committed[0].1.code, "{\"a\":1}");

        assert!(!session.apply_format(request.complete(success("{ \"a\": 1 }")), t0 + ms(2)));
        assert_eq!(session.pane(Pane::Primary).text(), "print('x')");
        assert_eq!(session.next_deadline(), None);
        assert_eq!(session.save_state(), SaveState::Saved);
    }

    #[test]
    fn results_for_stale_text_are_discarded() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        session.on_paste("{\"a\":1}", t0);
        let request = format_requests(session.take_effects())
            .pop()
            .expect("paste queues a format");
        session.on_edit(Edit::Insert(' '), t0 + ms(1));

        assert!(!session.apply_format(request.complete(success("{}")), t0 + ms(2)));
        assert_eq!(session.pane(Pane::Primary).text(), "{\"a\":1} ");
        assert!(!session.is_formatting());
    }

    #[test]
    fn manual_format_requires_a_specific_language() {
        let mut plain = EditorSession::new(
            EditorConfig::default(),
            &note("const a = 1;", ""),
            ContentMode::Plaintext,
        );
        assert!(!plain.can_format());
        assert!(!plain.on_format_request());

        let mut generic = EditorSession::new(
            EditorConfig::default(),
            &note("", "some words that are not code"),
            ContentMode::Code,
        );
        assert_eq!(generic.detected_language(), Some(LanguageTag::Code));
        assert!(!generic.on_format_request());

        let mut js = EditorSession::new(
            EditorConfig::default(),
            &note("", "const a = compute(1);"),
            ContentMode::Code,
        );
        assert!(js.can_format());
        assert!(js.on_format_request());
        let requests = format_requests(js.take_effects());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger, FormatTrigger::Manual);
        assert_eq!(requests[0].language, LanguageTag::Javascript);
        assert!(!js.can_format());
    }

    #[test]
    fn background_detection_runs_without_touching_save_state() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        type_text(
            &mut session,
            "function greet(name) {\n  return 'hello ' + name;\n}\n",
            t0,
        );
        assert_eq!(session.detected_language(), None);
        assert_eq!(session.next_deadline(), Some(t0 + ms(500)));

        assert!(session.poll(t0 + ms(500)));
        assert_eq!(session.detected_language(), Some(LanguageTag::Javascript));
        assert_eq!(session.save_state(), SaveState::Editing);
    }

    #[test]
    fn short_code_skips_background_detection() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        type_text(&mut session, "let a = 1;", t0);
        assert_eq!(session.next_deadline(), Some(t0 + ms(1500)));
    }

    #[test]
    fn pause_auto_formats_once_per_detection() {
        let t0 = Instant::now();
        let mut session =
            EditorSession::new(EditorConfig::default(), &note("", ""), ContentMode::Code);
        type_text(&mut session, "let total = sum(a, b);", t0);

        session.poll(t0 + ms(1500));
        assert_eq!(session.save_state(), SaveState::Waiting);
        let requests = format_requests(session.take_effects());
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].trigger, FormatTrigger::Detection);
        assert!(session.has_detected_once());

        let request = requests.into_iter().next().expect("one request");
        let text = request.text.clone();
        assert!(session.apply_format(request.complete(success(&text)), t0 + ms(1600)));

        type_text(&mut session, " ", t0 + ms(3000));
        session.poll(t0 + ms(4500));
        assert!(format_requests(session.take_effects()).is_empty());
    }

    #[test]
    fn bind_classifies_code_buffer_once() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("", ""),
            ContentMode::Code,
        );
        assert_eq!(session.detected_language(), None);
        let generation = session.generation();
        session.bind(&note("", "<!DOCTYPE html><html></html>"), t0);
        assert_eq!(session.detected_language(), Some(LanguageTag::Html));
        assert_eq!(session.generation(), generation + 1);
        assert!(session.take_effects().is_empty());
    }

    #[test]
    fn secondary_pane_edits_commit_both_buffers() {
        let t0 = Instant::now();
        let mut session = EditorSession::new(
            EditorConfig::default(),
            &note("prose", "code"),
            ContentMode::Plaintext,
        );
        session.focus_pane(Pane::Secondary);
        assert_eq!(session.focus(), Pane::Primary);

        session.on_tab_mode_toggle();
        session.focus_pane(Pane::Secondary);
        type_text(&mut session, "!", t0);
        session.poll(t0 + ms(5000));
        let effects = session.take_effects();
        let committed = commits(&effects);
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].1.plaintext, "prose");
        assert_eq!(committed[0].1.code, "code!");
    }

    #[test]
    fn tab_key_inserts_configured_width() {
        let t0 = Instant::now();
        let config = EditorConfig {
            tab_width: 4,
            ..EditorConfig::default()
        };
        let mut session = EditorSession::new(config, &note("", ""), ContentMode::Plaintext);
        assert!(session.on_edit(Edit::Tab, t0));
        assert_eq!(session.pane(Pane::Primary).text(), "    ");
    }
}
