use std::io::Stdout;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use crate::config::{AppConfig, ConfigLoader, SettingKey, Settings};
use crate::editor::{Edit, EditorGestures, EditorSession, Motion};
use crate::format::FormatterGateway;
use crate::notes::{Note, NoteStore};
use crate::shortcuts::{ShortcutManager, ShortcutStatus, TerminalShortcuts};
use crate::storage::StorageHandle;
use crate::ui;

mod actions;
pub mod state;
mod worker;

pub use actions::KEY_BINDINGS;
pub use state::{AppState, DeleteOverlay, OverlayState, RenameOverlay, SettingsOverlay};

use actions::ActionDispatcher;
use state::{pop_input_grapheme, push_input_char};
use worker::FormatWorker;

const FORMAT_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Quit,
    NewNote,
    SwitchLanguage,
    ToggleTabMode,
    Format,
    SwitchPane,
    RenameNote,
    DeleteNote,
    OpenSettings,
    ShowFormatError,
    ReloadFormatter,
    SaveNow,
    PreviousNote,
    NextNote,
}

pub struct App {
    loader: ConfigLoader,
    config: AppConfig,
    store: NoteStore,
    state: AppState,
    gateway: Arc<FormatterGateway>,
    worker: FormatWorker,
    shortcuts: ShortcutManager<TerminalShortcuts>,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(loader: ConfigLoader, config: AppConfig, storage: StorageHandle) -> Result<Self> {
        let mut store = NoteStore::load(Arc::new(storage));
        let note = match store.latest() {
            Some(note) => note,
            None => store.create(),
        };
        let session = EditorSession::new(
            config.editor.clone(),
            &note,
            config.settings.default_language,
        );
        let mut state = AppState::new(session, store.notes(), config.settings.clone());
        state.storage_error = store.last_error().map(str::to_string);

        let gateway = Arc::new(FormatterGateway::new(config.formatter.loader()));
        let worker =
            FormatWorker::spawn(gateway.clone()).context("starting the formatter worker")?;
        let shortcuts = ShortcutManager::new(TerminalShortcuts::new(KEY_BINDINGS.iter().copied()));

        let mut app = Self {
            loader,
            config,
            store,
            state,
            gateway,
            worker,
            shortcuts,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        };
        let command = app.config.settings.activation_key_command.clone();
        app.activate_shortcut(&command);
        app.drain_effects();
        Ok(app)
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        self.shutdown();
        restore_terminal(&mut terminal)?;
        result
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal
                .draw(|frame| ui::draw_app(frame, &mut self.state))
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            let timeout = self.poll_timeout(Instant::now());
            if event::poll(timeout).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Paste(text) => self.handle_paste(&text),
                    Event::Resize(_, _) => {
                        // next draw picks up the new size
                    }
                    _ => {}
                }
            }

            self.on_tick(Instant::now());
        }
        Ok(())
    }

    /// Sleeps until the next session timer, but wakes often enough to pick
    /// up format results.
    fn poll_timeout(&self, now: Instant) -> Duration {
        let cap = if self.state.session.is_formatting() {
            FORMAT_POLL_INTERVAL
        } else {
            self.tick_rate
        };
        self.state
            .session
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
            .map_or(cap, |until| until.min(cap))
    }

    fn on_tick(&mut self, now: Instant) {
        while let Some(result) = self.worker.try_recv() {
            self.state.session.apply_format(result, now);
        }
        self.state.session.poll(now);
        self.drain_effects();
        self.state.engine = self.gateway.state();
    }

    /// Hands session effects to the store and the format worker.
    fn drain_effects(&mut self) {
        let effects = self.state.session.take_effects();
        if effects.is_empty() {
            return;
        }
        let requests = ActionDispatcher::new(&mut self.store).dispatch(effects);
        for request in requests {
            self.worker.submit(request);
        }
        self.sync_notes();
    }

    fn sync_notes(&mut self) {
        self.state.set_notes(self.store.notes());
        self.state.storage_error = self.store.last_error().map(str::to_string);
        if let Some(key) = self.store.take_backup_key() {
            self.state
                .set_status_message(Some(format!("Unreadable flicks kept as {key}")));
        }
    }

    fn shutdown(&mut self) {
        self.state.session.flush(Instant::now());
        self.drain_effects();
        self.shortcuts.deactivate();
        tracing::info!(
            close_behavior = %self.config.settings.close_behavior,
            "editor closed"
        );
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        if self.shortcuts.matches(&key) {
            tracing::debug!("activation shortcut fired");
            self.handle_action(Action::NewNote);
            return;
        }

        if let Some(action) = action_for(key) {
            self.handle_action(action);
            return;
        }

        self.handle_editor_key(key);
    }

    fn handle_editor_key(&mut self, key: KeyEvent) {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let now = Instant::now();
        let edit = match key.code {
            KeyCode::Char(ch)
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER) =>
            {
                Some(Edit::Insert(ch))
            }
            KeyCode::Enter => Some(Edit::Newline),
            KeyCode::Tab => Some(Edit::Tab),
            KeyCode::Backspace => Some(Edit::Backspace),
            KeyCode::Delete => Some(Edit::Delete),
            _ => None,
        };
        if let Some(edit) = edit {
            if self.state.session.on_edit(edit, now) {
                self.state.clear_status_message();
                self.drain_effects();
            }
            return;
        }

        let motion = match key.code {
            KeyCode::Left if ctrl => Motion::WordLeft,
            KeyCode::Right if ctrl => Motion::WordRight,
            KeyCode::Left => Motion::Left,
            KeyCode::Right => Motion::Right,
            KeyCode::Up => Motion::Up,
            KeyCode::Down => Motion::Down,
            KeyCode::Home if ctrl => Motion::BufferStart,
            KeyCode::End if ctrl => Motion::BufferEnd,
            KeyCode::Home => Motion::Home,
            KeyCode::End => Motion::End,
            KeyCode::Esc => {
                self.state.clear_status_message();
                return;
            }
            _ => return,
        };
        self.state.session.move_cursor(motion);
    }

    fn handle_paste(&mut self, text: &str) {
        let first_line = text.lines().next().unwrap_or_default();
        if let Some(overlay) = self.state.rename_overlay_mut() {
            first_line
                .chars()
                .for_each(|ch| push_input_char(&mut overlay.name, ch));
            return;
        }
        if let Some(input) = self
            .state
            .settings_overlay_mut()
            .and_then(|overlay| overlay.input.as_mut())
        {
            first_line.chars().for_each(|ch| push_input_char(input, ch));
            return;
        }
        if self.state.overlay().is_some() {
            return;
        }
        self.state.session.on_paste(text, Instant::now());
        self.state.clear_status_message();
        self.drain_effects();
    }

    fn handle_action(&mut self, action: Action) {
        let now = Instant::now();
        match action {
            Action::Quit => self.should_quit = true,
            Action::NewNote => {
                let note = ActionDispatcher::new(&mut self.store).create_note();
                self.open_note(&note, now);
                self.state.set_status_message(Some("Created a new Flick"));
            }
            Action::SwitchLanguage => {
                let mode = self.state.session.mode().other();
                self.state.session.on_language_switch(mode);
                self.drain_effects();
                self.state
                    .set_status_message(Some(format!("Switched to {}", mode.label())));
            }
            Action::ToggleTabMode => {
                self.state.session.on_tab_mode_toggle();
                let message = if self.state.session.tab_mode() {
                    "Tab mode on: both buffers side by side"
                } else {
                    "Tab mode off"
                };
                self.state.set_status_message(Some(message));
            }
            Action::Format => {
                if self.state.session.on_format_request() {
                    self.drain_effects();
                    self.state.set_status_message(Some("Formatting..."));
                } else {
                    self.state.set_status_message(Some(
                        "Format needs code mode and a detected language",
                    ));
                }
            }
            Action::SwitchPane => {
                if self.state.session.tab_mode() {
                    self.state.session.toggle_focus();
                }
            }
            Action::RenameNote => {
                if self.state.open_rename() {
                    self.state
                        .set_status_message(Some("Rename: Enter confirm • Esc cancel"));
                }
            }
            Action::DeleteNote => {
                if self.state.open_delete() {
                    self.state
                        .set_status_message(Some("Delete Flick: Enter confirm • Esc cancel"));
                }
            }
            Action::OpenSettings => {
                self.state.open_settings();
                self.state.set_status_message(Some(
                    "Settings: ↑/↓ select • ←/→ change • Enter edit • Esc close",
                ));
            }
            Action::ShowFormatError => {
                if !self.state.open_format_error() {
                    self.state.set_status_message(Some("No format error to show"));
                }
            }
            Action::ReloadFormatter => {
                self.gateway.reload();
                self.state.engine = self.gateway.state();
                self.state
                    .set_status_message(Some("Formatter will reload on next use"));
            }
            Action::SaveNow => {
                self.state.session.flush(now);
                self.drain_effects();
                match self.store.last_error() {
                    Some(_) => self
                        .state
                        .set_status_message(Some("Save failed; see logs")),
                    None => self.state.set_status_message(Some("Flick saved")),
                }
            }
            Action::PreviousNote | Action::NextNote => {
                let delta = if action == Action::NextNote { 1 } else { -1 };
                match self.state.neighbour(delta) {
                    Some(note) => self.open_note(&note, now),
                    None => self.state.set_status_message(Some("Only one Flick")),
                }
            }
        }
    }

    /// Binds the session to `note`, committing what was typed into the previous one.
    fn open_note(&mut self, note: &Note, now: Instant) {
        self.state.session.bind(note, now);
        self.drain_effects();
        self.sync_notes();
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        match self.state.overlay() {
            Some(OverlayState::Rename(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Rename canceled"));
                    }
                    KeyCode::Enter => self.submit_rename(),
                    KeyCode::Backspace => {
                        if let Some(overlay) = self.state.rename_overlay_mut() {
                            pop_input_grapheme(&mut overlay.name);
                        }
                    }
                    KeyCode::Char(ch)
                        if !key.modifiers.intersects(
                            KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                        ) =>
                    {
                        if let Some(overlay) = self.state.rename_overlay_mut() {
                            push_input_char(&mut overlay.name, ch);
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::DeleteConfirm(_)) => {
                match key.code {
                    KeyCode::Esc | KeyCode::Char('n') => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Delete canceled"));
                    }
                    KeyCode::Enter | KeyCode::Char('y') => self.submit_delete(),
                    _ => {}
                }
                true
            }
            Some(OverlayState::FormatErrorDetails { .. }) => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                    self.state.close_overlay();
                }
                true
            }
            Some(OverlayState::Settings(_)) => {
                self.handle_settings_key(key);
                true
            }
            None => false,
        }
    }

    fn handle_settings_key(&mut self, key: KeyEvent) {
        let Some(overlay) = self.state.settings_overlay_mut() else {
            return;
        };
        let setting = overlay.selected_key();

        if let Some(input) = overlay.input.as_mut() {
            match key.code {
                KeyCode::Esc => overlay.input = None,
                KeyCode::Backspace => pop_input_grapheme(input),
                KeyCode::Char(ch)
                    if !key.modifiers.intersects(
                        KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER,
                    ) =>
                {
                    push_input_char(input, ch)
                }
                KeyCode::Enter => {
                    let raw = overlay.input.take().unwrap_or_default();
                    let mut settings = self.config.settings.clone();
                    match setting.apply(&mut settings, &raw) {
                        Ok(()) => self.commit_settings(settings),
                        Err(err) => {
                            if let Some(overlay) = self.state.settings_overlay_mut() {
                                overlay.error = Some(format!("{err:#}"));
                            }
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                self.state.close_overlay();
                self.state.clear_status_message();
            }
            KeyCode::Up | KeyCode::Char('k') => overlay.move_selection(-1),
            KeyCode::Down | KeyCode::Char('j') => overlay.move_selection(1),
            KeyCode::Enter if setting.is_free_text() => {
                overlay.error = None;
                overlay.input = Some(setting.value(&self.config.settings));
            }
            KeyCode::Left | KeyCode::Char('h') => self.cycle_setting(setting, false),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Enter | KeyCode::Char(' ') => {
                self.cycle_setting(setting, true)
            }
            _ => {}
        }
    }

    fn cycle_setting(&mut self, setting: SettingKey, forward: bool) {
        let mut settings = self.config.settings.clone();
        setting.cycle(&mut settings, forward);
        self.commit_settings(settings);
    }

    /// Applies new settings and writes the whole config file back.
    fn commit_settings(&mut self, settings: Settings) {
        if settings == self.config.settings {
            return;
        }
        let shortcut_changed =
            settings.activation_key_command != self.config.settings.activation_key_command;
        self.config.settings = settings;
        self.state.settings = self.config.settings.clone();
        if let Some(overlay) = self.state.settings_overlay_mut() {
            overlay.error = None;
        }

        if shortcut_changed {
            let command = self.config.settings.activation_key_command.clone();
            self.activate_shortcut(&command);
        }

        match self.loader.save(&self.config) {
            Ok(()) => self.state.set_status_message(Some("Settings saved")),
            Err(err) => {
                tracing::error!(?err, "failed to save settings");
                self.state
                    .set_status_message(Some("Failed to save settings; see logs"));
            }
        }
    }

    fn activate_shortcut(&mut self, command: &str) {
        let status = self.shortcuts.activate(command).clone();
        match &status {
            ShortcutStatus::Active(accelerator) => {
                tracing::info!(%accelerator, "activation shortcut registered");
            }
            ShortcutStatus::Inactive { reason } => {
                tracing::warn!(command, %reason, "activation shortcut not active");
                self.state.set_status_message(Some(format!(
                    "Shortcut {command} is not active: {reason}"
                )));
            }
        }
        self.state.shortcut = status;
    }

    fn submit_rename(&mut self) {
        let Some(OverlayState::Rename(overlay)) = self.state.overlay.take() else {
            return;
        };
        if ActionDispatcher::new(&mut self.store).rename_note(&overlay.note_id, &overlay.name) {
            self.sync_notes();
            self.state.set_status_message(Some("Flick renamed"));
        } else {
            self.state.set_status_message(Some("Failed to rename Flick"));
        }
    }

    fn submit_delete(&mut self) {
        let Some(OverlayState::DeleteConfirm(overlay)) = self.state.overlay.take() else {
            return;
        };
        let now = Instant::now();
        // Pending text must land before the note disappears, not after.
        self.state.session.flush(now);
        self.drain_effects();
        let next = ActionDispatcher::new(&mut self.store).delete_note(&overlay.note_id);
        match next {
            Some(note) => {
                self.open_note(&note, now);
                self.state
                    .set_status_message(Some(format!("Deleted \"{}\"", overlay.name)));
            }
            None => {
                self.sync_notes();
                self.state.set_status_message(Some("Failed to delete Flick"));
            }
        }
    }
}

fn action_for(key: KeyEvent) -> Option<Action> {
    if !key.modifiers.contains(KeyModifiers::CONTROL)
        || key.modifiers.intersects(KeyModifiers::ALT | KeyModifiers::SUPER)
    {
        return None;
    }
    let action = match key.code {
        KeyCode::Char('q') | KeyCode::Char('c') => Action::Quit,
        KeyCode::Char('n') => Action::NewNote,
        KeyCode::Char('l') => Action::SwitchLanguage,
        KeyCode::Char('t') => Action::ToggleTabMode,
        KeyCode::Char('f') => Action::Format,
        KeyCode::Char('w') => Action::SwitchPane,
        KeyCode::Char('r') => Action::RenameNote,
        KeyCode::Char('d') => Action::DeleteNote,
        KeyCode::Char('o') => Action::OpenSettings,
        KeyCode::Char('e') => Action::ShowFormatError,
        KeyCode::Char('g') => Action::ReloadFormatter,
        KeyCode::Char('s') => Action::SaveNow,
        KeyCode::PageUp => Action::PreviousNote,
        KeyCode::PageDown => Action::NextNote,
        _ => return None,
    };
    Some(action)
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)
        .context("switching to alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("creating terminal backend")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    terminal.show_cursor().ok();
    disable_raw_mode().context("disabling raw mode")?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )
    .context("restoring screen state")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;
    use tempfile::TempDir;

    use super::*;
    use crate::editor::SaveState;
    use crate::notes::{ContentMode, STORE_KEY};
    use crate::storage::{self, test_support::temp_paths, KeyValueStore};

    fn app() -> anyhow::Result<(TempDir, App)> {
        let dir = TempDir::new()?;
        let loader = ConfigLoader::from_paths(temp_paths(&dir));
        let config = loader.load_or_init()?;
        let storage = storage::init(loader.paths(), &config.storage)?;
        let app = App::new(loader, config, storage)?;
        Ok((dir, app))
    }

    fn press(app: &mut App, code: KeyCode, modifiers: KeyModifiers) {
        app.handle_key(KeyEvent::new(code, modifiers));
    }

    fn type_text(app: &mut App, text: &str) {
        for ch in text.chars() {
            press(app, KeyCode::Char(ch), KeyModifiers::NONE);
        }
    }

    fn settle(app: &mut App) {
        app.on_tick(Instant::now() + Duration::from_secs(30));
    }

    #[test]
    fn typing_is_committed_once_timers_run_out() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        type_text(&mut app, "hello");
        assert_eq!(app.state.session.save_state(), SaveState::Editing);
        settle(&mut app);
        assert_eq!(app.state.session.save_state(), SaveState::Saved);
        let note = app.state.current_note().expect("open note");
        assert_eq!(note.content.plaintext, "hello");
        assert!(note.is_edited);
        Ok(())
    }

    #[test]
    fn new_note_flushes_previous_text() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        let first = app.state.session.note_id().clone();
        type_text(&mut app, "draft");
        press(&mut app, KeyCode::Char('n'), KeyModifiers::CONTROL);

        assert_eq!(app.store.len(), 2);
        assert_ne!(app.state.session.note_id(), &first);
        let previous = app.store.get(&first).expect("first note");
        assert_eq!(previous.content.plaintext, "draft");
        Ok(())
    }

    #[test]
    fn activation_shortcut_creates_a_note() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        assert!(app.state.shortcut.is_active());
        press(
            &mut app,
            KeyCode::Char('n'),
            KeyModifiers::CONTROL | KeyModifiers::ALT,
        );
        assert_eq!(app.store.len(), 2);
        Ok(())
    }

    #[test]
    fn unreadable_collection_survives_the_first_save() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let loader = ConfigLoader::from_paths(temp_paths(&dir));
        let config = loader.load_or_init()?;
        let storage = storage::init(loader.paths(), &config.storage)?;
        let truncated = r#"[{"id":"a","name":"precious","content":"#;
        storage.set(STORE_KEY, truncated)?;

        let mut app = App::new(loader, config, storage.clone())?;
        assert!(app.state.storage_error.is_some());
        type_text(&mut app, "fresh start");
        settle(&mut app);

        assert!(app.state.storage_error.is_none());
        let status = app.state.status_message.clone().expect("backup reported");
        let key = status
            .strip_prefix("Unreadable flicks kept as ")
            .expect("backup key in status");
        assert_eq!(storage.get(key)?.as_deref(), Some(truncated));
        let current = storage.get(STORE_KEY)?.expect("collection written");
        assert!(current.contains("fresh start"), "{current}");
        Ok(())
    }

    #[test]
    fn rename_overlay_updates_store() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        press(&mut app, KeyCode::Char('r'), KeyModifiers::CONTROL);
        assert_matches!(app.state.overlay(), Some(OverlayState::Rename(_)));
        for _ in 0.."New Flick".len() {
            press(&mut app, KeyCode::Backspace, KeyModifiers::NONE);
        }
        type_text(&mut app, "Groceries");
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert!(app.state.overlay().is_none());
        assert_eq!(
            app.state.current_note().map(|note| note.name.as_str()),
            Some("Groceries")
        );
        Ok(())
    }

    #[test]
    fn deleting_the_only_note_opens_a_fresh_one() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        let first = app.state.session.note_id().clone();
        press(&mut app, KeyCode::Char('d'), KeyModifiers::CONTROL);
        press(&mut app, KeyCode::Enter, KeyModifiers::NONE);
        assert_eq!(app.store.len(), 1);
        assert!(app.store.get(&first).is_none());
        assert!(app.state.current_note().is_some());
        Ok(())
    }

    #[test]
    fn settings_changes_are_written_immediately() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        press(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL);
        // default_language is the fourth entry
        for _ in 0..3 {
            press(&mut app, KeyCode::Down, KeyModifiers::NONE);
        }
        press(&mut app, KeyCode::Right, KeyModifiers::NONE);
        assert_eq!(app.state.settings.default_language, ContentMode::Code);

        let saved = fs::read_to_string(&app.loader.paths().config_file)?;
        assert!(saved.contains("default_language = \"code\""), "{saved}");
        Ok(())
    }

    #[test]
    fn changing_the_shortcut_swaps_the_registration() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        press(&mut app, KeyCode::Char('o'), KeyModifiers::CONTROL);
        for _ in 0..2 {
            press(&mut app, KeyCode::Down, KeyModifiers::NONE);
        }
        press(&mut app, KeyCode::Right, KeyModifiers::NONE);
        assert_eq!(app.config.settings.activation_key_command, "ctrl+shift+n");
        assert_eq!(app.shortcuts.backend().registered().len(), 1);
        assert_matches!(
            &app.state.shortcut,
            ShortcutStatus::Active(accelerator) if accelerator.to_string() == "ctrl+shift+n"
        );
        Ok(())
    }

    #[test]
    fn language_switch_and_json_paste_format_in_background() -> anyhow::Result<()> {
        let (_dir, mut app) = app()?;
        press(&mut app, KeyCode::Char('l'), KeyModifiers::CONTROL);
        assert_eq!(app.state.session.mode(), ContentMode::Code);
        app.handle_paste("{\"a\":1,\"b\":2}");
        assert!(app.state.session.is_formatting());

        let deadline = Instant::now() + Duration::from_secs(5);
        while app.state.session.is_formatting() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
            app.on_tick(Instant::now());
        }
        assert_eq!(
            app.state.session.pane(crate::editor::Pane::Primary).text(),
            "{\n  \"a\": 1,\n  \"b\": 2\n}"
        );
        assert!(app.state.session.format_success());
        Ok(())
    }
}
