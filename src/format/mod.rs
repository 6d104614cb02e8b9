use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

use crate::classify::LanguageTag;

pub mod command;

pub use command::CommandEngineLoader;

/// Languages the gateway can format, in the order they are listed to users.
pub const FORMATTABLE_LANGUAGES: [LanguageTag; 6] = [
    LanguageTag::Javascript,
    LanguageTag::Typescript,
    LanguageTag::Json,
    LanguageTag::Html,
    LanguageTag::Css,
    LanguageTag::Markdown,
];

const FALLBACK_ENGINE_MESSAGE: &str = "Failed to format code.";

/// Per-language adapter of the pretty-printing engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PluginKind {
    Babel,
    Typescript,
    Html,
    Postcss,
    Markdown,
}

impl PluginKind {
    pub fn for_language(tag: LanguageTag) -> Option<Self> {
        match tag {
            LanguageTag::Javascript => Some(PluginKind::Babel),
            LanguageTag::Typescript => Some(PluginKind::Typescript),
            LanguageTag::Html => Some(PluginKind::Html),
            LanguageTag::Css => Some(PluginKind::Postcss),
            LanguageTag::Markdown => Some(PluginKind::Markdown),
            LanguageTag::Json | LanguageTag::Python | LanguageTag::Code => None,
        }
    }

    pub fn parser(self) -> &'static str {
        match self {
            PluginKind::Babel => "babel",
            PluginKind::Typescript => "typescript",
            PluginKind::Html => "html",
            PluginKind::Postcss => "css",
            PluginKind::Markdown => "markdown",
        }
    }

    fn language_label(self) -> &'static str {
        match self {
            PluginKind::Babel => LanguageTag::Javascript.label(),
            PluginKind::Typescript => LanguageTag::Typescript.label(),
            PluginKind::Html => LanguageTag::Html.label(),
            PluginKind::Postcss => LanguageTag::Css.label(),
            PluginKind::Markdown => LanguageTag::Markdown.label(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    pub parser: &'static str,
    pub single_quote: bool,
    pub tab_width: u8,
    pub prose_wrap_always: bool,
}

impl FormatOptions {
    pub fn for_plugin(kind: PluginKind) -> Self {
        Self {
            parser: kind.parser(),
            single_quote: true,
            tab_width: 2,
            prose_wrap_always: kind == PluginKind::Markdown,
        }
    }
}

pub trait FormatPlugin: Send + Sync {
    fn format(&self, text: &str, options: &FormatOptions) -> anyhow::Result<String>;
}

/// Brings the external engine up and reports which adapters it provides.
pub trait EngineLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<PluginSet>;
}

#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: IndexMap<PluginKind, Arc<dyn FormatPlugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: PluginKind, plugin: Arc<dyn FormatPlugin>) {
        self.plugins.insert(kind, plugin);
    }

    pub fn get(&self, kind: PluginKind) -> Option<Arc<dyn FormatPlugin>> {
        self.plugins.get(&kind).cloned()
    }
}

impl fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.plugins.keys()).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Invalid JSON syntax. Could not format.")]
    InvalidJson,
    #[error("{language} formatter plugin not available")]
    PluginUnavailable { language: &'static str },
    #[error("Unsupported language: {0}")]
    Unsupported(LanguageTag),
    #[error("Formatter engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("{0}")]
    Engine(String),
}

/// Result of a format call: on failure `code` is the caller's text, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOutcome {
    pub code: String,
    pub success: bool,
    pub error: Option<String>,
}

impl FormatOutcome {
    pub fn from_result(original: &str, result: Result<String, FormatError>) -> Self {
        match result {
            Ok(code) => Self {
                code,
                success: true,
                error: None,
            },
            Err(err) => Self {
                code: original.to_string(),
                success: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Loading,
    Ready,
    Failed,
}

#[derive(Default)]
struct EngineSlot {
    cell: OnceCell<Result<PluginSet, String>>,
    loading: AtomicBool,
}

/// Shared front door to the pretty-printer.
///
/// The engine is loaded on the first request that needs it and kept for
/// the lifetime of the gateway. Callers arriving while a load is in flight
/// block on the same load instead of starting another one. A failed load
/// stays failed until [`FormatterGateway::reload`] is called.
pub struct FormatterGateway {
    loader: Arc<dyn EngineLoader>,
    slot: Mutex<Arc<EngineSlot>>,
}

impl FormatterGateway {
    pub fn new<L>(loader: L) -> Self
    where
        L: EngineLoader + 'static,
    {
        Self {
            loader: Arc::new(loader),
            slot: Mutex::new(Arc::new(EngineSlot::default())),
        }
    }

    pub fn state(&self) -> EngineState {
        let slot = self.slot.lock().clone();
        match slot.cell.get() {
            Some(Ok(_)) => EngineState::Ready,
            Some(Err(_)) => EngineState::Failed,
            None if slot.loading.load(Ordering::Acquire) => EngineState::Loading,
            None => EngineState::Uninitialized,
        }
    }

    /// Forget the current engine (loaded or failed) so the next request loads again.
    pub fn reload(&self) {
        let mut slot = self.slot.lock();
        *slot = Arc::new(EngineSlot::default());
        tracing::info!("formatter engine reset; next request will reload it");
    }

    pub fn format(&self, text: &str, language: LanguageTag) -> FormatOutcome {
        FormatOutcome::from_result(text, self.try_format(text, language))
    }

    pub fn try_format(&self, text: &str, language: LanguageTag) -> Result<String, FormatError> {
        if text.trim().is_empty() {
            return Ok(text.to_string());
        }
        if language == LanguageTag::Json {
            return format_json(text);
        }
        let Some(kind) = PluginKind::for_language(language) else {
            return Err(FormatError::Unsupported(language));
        };
        let plugin = self.plugin(kind)?;
        let options = FormatOptions::for_plugin(kind);
        plugin.format(text, &options).map_err(|err| {
            tracing::debug!(?err, %language, "formatter engine rejected input");
            FormatError::Engine(first_line(&format!("{err:#}")))
        })
    }

    fn plugin(&self, kind: PluginKind) -> Result<Arc<dyn FormatPlugin>, FormatError> {
        let slot = self.slot.lock().clone();
        let loaded = slot.cell.get_or_init(|| {
            slot.loading.store(true, Ordering::Release);
            let result = match self.loader.load() {
                Ok(plugins) => {
                    tracing::info!(?plugins, "formatter engine loaded");
                    Ok(plugins)
                }
                Err(err) => {
                    tracing::warn!(?err, "formatter engine failed to load");
                    Err(first_line(&format!("{err:#}")))
                }
            };
            slot.loading.store(false, Ordering::Release);
            result
        });
        match loaded {
            Ok(plugins) => plugins.get(kind).ok_or(FormatError::PluginUnavailable {
                language: kind.language_label(),
            }),
            Err(message) => Err(FormatError::EngineUnavailable(message.clone())),
        }
    }
}

impl fmt::Debug for FormatterGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatterGateway")
            .field("state", &self.state())
            .finish()
    }
}

fn format_json(text: &str) -> Result<String, FormatError> {
    let mut value: Value = serde_json::from_str(text).map_err(|err| {
        tracing::debug!(%err, "invalid json handed to formatter");
        FormatError::InvalidJson
    })?;
    normalize_numbers(&mut value);
    serde_json::to_string_pretty(&value).map_err(|_| FormatError::InvalidJson)
}

/// Largest integer an f64 holds exactly.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Writes integral floats (`1.0`, `1e3`) as integers.
fn normalize_numbers(value: &mut Value) {
    match value {
        Value::Number(number) if number.is_f64() => {
            if let Some(float) = number.as_f64() {
                if float.fract() == 0.0 && float.abs() <= MAX_EXACT_FLOAT_INT {
                    *value = Value::from(float as i64);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(normalize_numbers),
        Value::Object(fields) => fields.values_mut().for_each(normalize_numbers),
        _ => {}
    }
}

fn first_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_ENGINE_MESSAGE.to_string())
}
