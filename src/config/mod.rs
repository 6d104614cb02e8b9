use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::format::{CommandEngineLoader, PluginKind};
use crate::notes::ContentMode;

pub mod choices;

pub use choices::{CloseBehavior, SettingKey, ACTIVATION_KEY_COMMANDS, FONT_SIZE_RANGE};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "Flick";
const APP_NAME: &str = "flick";

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn from_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let default_cfg = AppConfig::default();
            self.save(&default_cfg)
                .context("writing default config")?;
            return Ok(default_cfg);
        }

        Ok(self.load())
    }

    /// Reads the config file, falling back to defaults for anything unreadable.
    pub fn load(&self) -> AppConfig {
        let raw = match fs::read_to_string(&self.paths.config_file) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(
                    ?err,
                    path = %self.paths.config_file.display(),
                    "config unreadable, using defaults"
                );
                return AppConfig::default();
            }
        };
        AppConfig::from_toml_str(&raw)
    }

    /// Rewrites the whole config file.
    pub fn save(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let final_path = &self.paths.config_file;
        let tmp_path = final_path.with_extension("toml.tmp");
        fs::write(&tmp_path, toml.as_bytes())
            .with_context(|| format!("writing temporary config {}", tmp_path.display()))?;
        fs::rename(&tmp_path, final_path)
            .with_context(|| format!("persisting config {}", final_path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    pub state_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var("FLICK_CONFIG").ok().map(PathBuf::from);
        let override_data = env::var("FLICK_DATA").ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        let database_path = data_root.join("flick.db");

        let cache_dir = project_dirs.cache_dir().to_path_buf();
        let state_dir = project_dirs
            .state_dir()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| data_root.join("state"));
        let log_dir = state_dir.join("logs");

        Ok(Self {
            config_dir,
            config_file,
            data_dir: data_root,
            database_path,
            cache_dir,
            log_dir,
            state_dir,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.cache_dir,
            &self.log_dir,
            &self.state_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settings: Settings,
    pub editor: EditorConfig,
    pub formatter: FormatterConfig,
    pub storage: StorageOptions,
}

impl AppConfig {
    /// Parses config text, validating `[settings]` key by key and every other
    /// section as a whole. Nothing here fails: bad input means defaults.
    pub fn from_toml_str(raw: &str) -> Self {
        let table: toml::Table = match toml::from_str(raw) {
            Ok(table) => table,
            Err(err) => {
                tracing::warn!(%err, "config is not valid TOML, using defaults");
                return AppConfig::default();
            }
        };

        let settings = match table.get("settings") {
            Some(toml::Value::Table(section)) => Settings::from_table(section),
            Some(_) => {
                tracing::warn!("[settings] is not a table, using default settings");
                Settings::default()
            }
            None => Settings::default(),
        };

        AppConfig {
            settings,
            editor: read_section(&table, "editor"),
            formatter: read_section(&table, "formatter"),
            storage: read_section(&table, "storage"),
        }
    }
}

fn read_section<T>(table: &toml::Table, name: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(value) = table.get(name) else {
        return T::default();
    };
    match value.clone().try_into::<T>() {
        Ok(section) => section,
        Err(err) => {
            tracing::warn!(section = name, %err, "invalid config section, using defaults");
            T::default()
        }
    }
}

pub(crate) fn read_key<T>(table: &toml::Table, key: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = table.get(key)?;
    match value.clone().try_into::<T>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            tracing::warn!(key, %err, "invalid setting, using default");
            None
        }
    }
}

/// User preferences edited from the settings panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub auto_launch: bool,
    pub close_behavior: CloseBehavior,
    pub activation_key_command: String,
    pub default_language: ContentMode,
    pub font_size: FontSizes,
    pub font_family: FontFamilies,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_launch: false,
            close_behavior: CloseBehavior::Tray,
            activation_key_command: ACTIVATION_KEY_COMMANDS[0].to_string(),
            default_language: ContentMode::Plaintext,
            font_size: FontSizes::default(),
            font_family: FontFamilies::default(),
        }
    }
}

impl Settings {
    pub fn from_table(table: &toml::Table) -> Self {
        let defaults = Settings::default();
        let activation_key_command = read_key::<String>(table, "activation_key_command")
            .filter(|command| {
                let known = choices::is_known_activation_key(command);
                if !known {
                    tracing::warn!(%command, "unknown activation key command, using default");
                }
                known
            })
            .unwrap_or(defaults.activation_key_command);

        Settings {
            auto_launch: read_key(table, "auto_launch").unwrap_or(defaults.auto_launch),
            close_behavior: read_key(table, "close_behavior").unwrap_or(defaults.close_behavior),
            activation_key_command,
            default_language: read_key(table, "default_language")
                .unwrap_or(defaults.default_language),
            font_size: read_key::<FontSizeRepr>(table, "font_size")
                .map(FontSizes::from_repr)
                .unwrap_or(defaults.font_size),
            font_family: read_key::<FontFamilyRepr>(table, "font_family")
                .map(FontFamilies::from_repr)
                .unwrap_or(defaults.font_family),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontSizes {
    pub plaintext: u16,
    pub code: u16,
}

impl Default for FontSizes {
    fn default() -> Self {
        Self {
            plaintext: 14,
            code: 14,
        }
    }
}

impl FontSizes {
    pub fn get(&self, mode: ContentMode) -> u16 {
        match mode {
            ContentMode::Plaintext => self.plaintext,
            ContentMode::Code => self.code,
        }
    }

    pub fn set(&mut self, mode: ContentMode, size: u16) {
        let size = clamp_font_size(size);
        match mode {
            ContentMode::Plaintext => self.plaintext = size,
            ContentMode::Code => self.code = size,
        }
    }

    fn from_repr(repr: FontSizeRepr) -> Self {
        let defaults = FontSizes::default();
        match repr {
            FontSizeRepr::Uniform(size) => {
                let size = validated_font_size(size).unwrap_or(defaults.plaintext);
                Self {
                    plaintext: size,
                    code: size,
                }
            }
            FontSizeRepr::PerMode { plaintext, code } => Self {
                plaintext: plaintext
                    .and_then(validated_font_size)
                    .unwrap_or(defaults.plaintext),
                code: code.and_then(validated_font_size).unwrap_or(defaults.code),
            },
        }
    }
}

/// Older configs stored one size for both buffers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FontSizeRepr {
    Uniform(u16),
    PerMode {
        plaintext: Option<u16>,
        code: Option<u16>,
    },
}

fn validated_font_size(size: u16) -> Option<u16> {
    if FONT_SIZE_RANGE.contains(&size) {
        Some(size)
    } else {
        tracing::warn!(size, "font size out of range, using default");
        None
    }
}

fn clamp_font_size(size: u16) -> u16 {
    size.clamp(*FONT_SIZE_RANGE.start(), *FONT_SIZE_RANGE.end())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontFamilies {
    pub plaintext: String,
    pub code: String,
}

impl Default for FontFamilies {
    fn default() -> Self {
        Self {
            plaintext: "Inter".to_string(),
            code: "JetBrains Mono".to_string(),
        }
    }
}

impl FontFamilies {
    pub fn get(&self, mode: ContentMode) -> &str {
        match mode {
            ContentMode::Plaintext => &self.plaintext,
            ContentMode::Code => &self.code,
        }
    }

    fn from_repr(repr: FontFamilyRepr) -> Self {
        let defaults = FontFamilies::default();
        let pick = |value: Option<String>, fallback: String| {
            value
                .map(|family| family.trim().to_string())
                .filter(|family| !family.is_empty())
                .unwrap_or(fallback)
        };
        match repr {
            FontFamilyRepr::Uniform(family) => Self {
                plaintext: pick(Some(family.clone()), defaults.plaintext),
                code: pick(Some(family), defaults.code),
            },
            FontFamilyRepr::PerMode { plaintext, code } => Self {
                plaintext: pick(plaintext, defaults.plaintext),
                code: pick(code, defaults.code),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FontFamilyRepr {
    Uniform(String),
    PerMode {
        plaintext: Option<String>,
        code: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub save_debounce_ms: u64,
    pub waiting_pause_ms: u64,
    pub saving_pause_ms: u64,
    pub detection_debounce_ms: u64,
    /// Background re-detection only runs above this many characters.
    pub detection_min_chars: usize,
    pub format_success_display_ms: u64,
    pub auto_detect_language: bool,
    pub auto_format: bool,
    pub tab_width: u8,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            save_debounce_ms: 1500,
            waiting_pause_ms: 200,
            saving_pause_ms: 800,
            detection_debounce_ms: 500,
            detection_min_chars: 50,
            format_success_display_ms: 2000,
            auto_detect_language: true,
            auto_format: true,
            tab_width: 2,
        }
    }
}

impl EditorConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn waiting_pause(&self) -> Duration {
        Duration::from_millis(self.waiting_pause_ms)
    }

    pub fn saving_pause(&self) -> Duration {
        Duration::from_millis(self.saving_pause_ms)
    }

    pub fn detection_debounce(&self) -> Duration {
        Duration::from_millis(self.detection_debounce_ms)
    }

    pub fn format_success_display(&self) -> Duration {
        Duration::from_millis(self.format_success_display_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterConfig {
    pub command: String,
    pub plugins: Vec<PluginKind>,
}

impl Default for FormatterConfig {
    fn default() -> Self {
        Self {
            command: "prettier".to_string(),
            plugins: vec![
                PluginKind::Babel,
                PluginKind::Typescript,
                PluginKind::Html,
                PluginKind::Postcss,
                PluginKind::Markdown,
            ],
        }
    }
}

impl FormatterConfig {
    pub fn loader(&self) -> CommandEngineLoader {
        CommandEngineLoader::new(self.command.clone(), self.plugins.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            wal_autocheckpoint: 1000,
        }
    }
}
