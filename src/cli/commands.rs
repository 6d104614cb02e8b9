use std::fmt::Write as _;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use strum::IntoEnumIterator;
use time::macros::format_description;

use crate::app::App;
use crate::classify::{classify, LanguageTag};
use crate::config::{AppConfig, ConfigLoader, ConfigPaths, SettingKey};
use crate::format::FormatterGateway;
use crate::notes::{ContentMode, Note, NoteContent, NoteStore, DEFAULT_NOTE_NAME};
use crate::storage::{self, StorageHandle};

#[derive(Args, Debug, Clone)]
pub struct NewArgs {
    /// Name for the flick
    #[arg(long)]
    pub name: Option<String>,
    /// Provide the body inline. If omitted, reads from stdin when piped.
    #[arg(long)]
    pub body: Option<String>,
    /// Store the body in the code buffer instead of plain text
    #[arg(long)]
    pub code: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Flick id (a unique prefix is enough)
    pub id: String,
    /// Print the code buffer instead of plain text
    #[arg(long)]
    pub code: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Flick id (a unique prefix is enough)
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
    /// File to inspect; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct FormatArgs {
    /// Language of the input (json, javascript, typescript, html, css, markdown)
    #[arg(long)]
    pub lang: LanguageTag,
    /// File to format; stdin when omitted
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print every setting
    Show,
    /// Change one setting and save the config file
    Set(SettingsSetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SettingsSetArgs {
    /// Setting key, e.g. close_behavior or font_size.code
    pub key: SettingKey,
    pub value: String,
}

pub fn run_tui(loader: ConfigLoader, config: AppConfig, storage: StorageHandle) -> Result<()> {
    let mut app = App::new(loader, config, storage)?;
    app.run()
}

/// Opens the note collection, refusing to go on when the stored value is unreadable.
pub fn open_store(paths: &ConfigPaths, config: &AppConfig) -> Result<NoteStore> {
    let storage = storage::init(paths, &config.storage)?;
    let store = NoteStore::load(Arc::new(storage));
    if let Some(err) = store.last_error() {
        bail!("stored flicks could not be read: {err}");
    }
    Ok(store)
}

pub fn new_note(store: &mut NoteStore, args: NewArgs) -> Result<String> {
    let body = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    let mode = if args.code {
        ContentMode::Code
    } else {
        ContentMode::Plaintext
    };
    let mut content = NoteContent::default();
    content.set(mode, body);
    let name = args.name.as_deref().unwrap_or(DEFAULT_NOTE_NAME);
    let note = store.create_with(name, content);
    if let Some(err) = store.last_error() {
        bail!("flick created but not saved: {err}");
    }
    Ok(format!("Created flick {} ({})\n", note.id, note.name))
}

pub fn list_notes(store: &NoteStore) -> String {
    let notes = store.notes();
    let mut output = String::new();
    for note in notes.iter() {
        let updated = note
            .updated_at
            .format(&format_description!("[year]-[month]-[day] [hour]:[minute]"))
            .unwrap_or_else(|_| note.updated_at.unix_timestamp().to_string());
        let _ = writeln!(
            output,
            "{}  {}  {}  plain:{} code:{}{}",
            note.id,
            updated,
            note.name,
            note.content.plaintext.chars().count(),
            note.content.code.chars().count(),
            if note.is_edited { "" } else { "  (untouched)" }
        );
    }
    output
}

pub fn show_note(store: &NoteStore, args: &ShowArgs) -> Result<String> {
    let note = find_note(store, &args.id)?;
    let mode = if args.code {
        ContentMode::Code
    } else {
        ContentMode::Plaintext
    };
    let mut body = note.buffer(mode).to_string();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    Ok(body)
}

pub fn delete_note(store: &mut NoteStore, args: &DeleteArgs) -> Result<String> {
    let note = find_note(store, &args.id)?;
    store
        .remove(&note.id)
        .ok_or_else(|| anyhow!("flick {} disappeared before it could be deleted", note.id))?;
    if let Some(err) = store.last_error() {
        bail!("flick removed in memory but not saved: {err}");
    }
    Ok(format!("Deleted flick {} ({})\n", note.id, note.name))
}

pub fn detect(args: &DetectArgs) -> Result<String> {
    let text = read_input(args.file.as_ref())?;
    let label = classify(&text).map_or_else(|| "unknown".to_string(), |tag| tag.to_string());
    Ok(format!("{label}\n"))
}

pub fn format(config: &AppConfig, args: &FormatArgs) -> Result<String> {
    let text = read_input(args.file.as_ref())?;
    let gateway = FormatterGateway::new(config.formatter.loader());
    let mut formatted = gateway
        .try_format(&text, args.lang)
        .with_context(|| format!("formatting as {}", args.lang))?;
    if !formatted.ends_with('\n') {
        formatted.push('\n');
    }
    Ok(formatted)
}

pub fn settings(loader: &ConfigLoader, mut config: AppConfig, command: SettingsCommand) -> Result<String> {
    match command {
        SettingsCommand::Show => {
            let mut output = String::new();
            for key in SettingKey::iter() {
                let _ = writeln!(output, "{key} = {}", key.value(&config.settings));
            }
            Ok(output)
        }
        SettingsCommand::Set(args) => {
            args.key.apply(&mut config.settings, &args.value)?;
            loader.save(&config).context("saving settings")?;
            Ok(format!("{} = {}\n", args.key, args.key.value(&config.settings)))
        }
    }
}

/// Matches a full id first, then a unique prefix.
fn find_note(store: &NoteStore, id: &str) -> Result<Arc<Note>> {
    let notes = store.notes();
    if let Some(note) = notes.iter().find(|note| note.id.as_str() == id) {
        return Ok(note.clone());
    }
    let mut matches = notes.iter().filter(|note| note.id.as_str().starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(note), None) if !id.is_empty() => Ok(note.clone()),
        (Some(_), Some(_)) => bail!("id prefix {id:?} matches more than one flick"),
        _ => bail!("no flick with id {id:?}"),
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<String> {
    match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
        }
        None => read_stdin()?.ok_or_else(|| anyhow!("no input: pass a FILE or pipe text on stdin")),
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}
