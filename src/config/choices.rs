use std::ops::RangeInclusive;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::Settings;
use crate::notes::ContentMode;

/// Accelerators offered for the global "new note" shortcut.
pub const ACTIVATION_KEY_COMMANDS: [&str; 3] = ["ctrl+alt+n", "ctrl+shift+n", "ctrl+alt+space"];

pub const FONT_SIZE_RANGE: RangeInclusive<u16> = 8..=48;

pub fn is_known_activation_key(command: &str) -> bool {
    ACTIVATION_KEY_COMMANDS.contains(&command)
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CloseBehavior {
    Tray,
    Dock,
    Quit,
}

impl CloseBehavior {
    pub fn label(self) -> &'static str {
        match self {
            CloseBehavior::Tray => "Minimize to the system tray",
            CloseBehavior::Dock => "Minimize to the dock",
            CloseBehavior::Quit => "Quit the application",
        }
    }
}

/// Addressable keys of `[settings]`, shared by the CLI and the settings overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter)]
pub enum SettingKey {
    #[strum(serialize = "auto_launch")]
    AutoLaunch,
    #[strum(serialize = "close_behavior")]
    CloseBehavior,
    #[strum(serialize = "activation_key_command")]
    ActivationKeyCommand,
    #[strum(serialize = "default_language")]
    DefaultLanguage,
    #[strum(serialize = "font_size.plaintext")]
    FontSizePlaintext,
    #[strum(serialize = "font_size.code")]
    FontSizeCode,
    #[strum(serialize = "font_family.plaintext")]
    FontFamilyPlaintext,
    #[strum(serialize = "font_family.code")]
    FontFamilyCode,
}

impl SettingKey {
    pub fn label(self) -> &'static str {
        match self {
            SettingKey::AutoLaunch => "Launch at login",
            SettingKey::CloseBehavior => "When closing",
            SettingKey::ActivationKeyCommand => "New Flick shortcut",
            SettingKey::DefaultLanguage => "Default language",
            SettingKey::FontSizePlaintext => "Plain text font size",
            SettingKey::FontSizeCode => "Code font size",
            SettingKey::FontFamilyPlaintext => "Plain text font",
            SettingKey::FontFamilyCode => "Code font",
        }
    }

    pub fn value(self, settings: &Settings) -> String {
        match self {
            SettingKey::AutoLaunch => settings.auto_launch.to_string(),
            SettingKey::CloseBehavior => settings.close_behavior.to_string(),
            SettingKey::ActivationKeyCommand => settings.activation_key_command.clone(),
            SettingKey::DefaultLanguage => settings.default_language.to_string(),
            SettingKey::FontSizePlaintext => settings.font_size.plaintext.to_string(),
            SettingKey::FontSizeCode => settings.font_size.code.to_string(),
            SettingKey::FontFamilyPlaintext => settings.font_family.plaintext.clone(),
            SettingKey::FontFamilyCode => settings.font_family.code.clone(),
        }
    }

    /// Parses `raw` for this key and stores it. Rejected values leave `settings` untouched.
    pub fn apply(self, settings: &mut Settings, raw: &str) -> Result<()> {
        let raw = raw.trim();
        match self {
            SettingKey::AutoLaunch => {
                settings.auto_launch = raw
                    .parse()
                    .with_context(|| format!("{self} expects true or false, got {raw:?}"))?;
            }
            SettingKey::CloseBehavior => {
                settings.close_behavior = raw
                    .parse()
                    .with_context(|| format!("{self} expects tray, dock or quit, got {raw:?}"))?;
            }
            SettingKey::ActivationKeyCommand => {
                let command = raw.to_ascii_lowercase();
                if !is_known_activation_key(&command) {
                    bail!(
                        "{self} must be one of {}, got {raw:?}",
                        ACTIVATION_KEY_COMMANDS.join(", ")
                    );
                }
                settings.activation_key_command = command;
            }
            SettingKey::DefaultLanguage => {
                settings.default_language = raw
                    .parse::<ContentMode>()
                    .with_context(|| format!("{self} expects plaintext or code, got {raw:?}"))?;
            }
            SettingKey::FontSizePlaintext | SettingKey::FontSizeCode => {
                let size: u16 = raw
                    .parse()
                    .with_context(|| format!("{self} expects a number, got {raw:?}"))?;
                if !FONT_SIZE_RANGE.contains(&size) {
                    bail!(
                        "{self} must be between {} and {}",
                        FONT_SIZE_RANGE.start(),
                        FONT_SIZE_RANGE.end()
                    );
                }
                settings.font_size.set(self.mode(), size);
            }
            SettingKey::FontFamilyPlaintext | SettingKey::FontFamilyCode => {
                if raw.is_empty() {
                    bail!("{self} cannot be empty");
                }
                match self.mode() {
                    ContentMode::Plaintext => settings.font_family.plaintext = raw.to_string(),
                    ContentMode::Code => settings.font_family.code = raw.to_string(),
                }
            }
        }
        Ok(())
    }

    /// Steps the value one notch, for the settings overlay's left/right keys.
    pub fn cycle(self, settings: &mut Settings, forward: bool) {
        match self {
            SettingKey::AutoLaunch => settings.auto_launch = !settings.auto_launch,
            SettingKey::CloseBehavior => {
                settings.close_behavior = step(
                    &CloseBehavior::iter().collect::<Vec<_>>(),
                    &settings.close_behavior,
                    forward,
                );
            }
            SettingKey::ActivationKeyCommand => {
                let current = settings.activation_key_command.as_str();
                settings.activation_key_command =
                    step(&ACTIVATION_KEY_COMMANDS, &current, forward).to_string();
            }
            SettingKey::DefaultLanguage => {
                settings.default_language = settings.default_language.other();
            }
            SettingKey::FontSizePlaintext | SettingKey::FontSizeCode => {
                let mode = self.mode();
                let current = settings.font_size.get(mode);
                let next = if forward {
                    current.saturating_add(1)
                } else {
                    current.saturating_sub(1)
                };
                settings.font_size.set(mode, next);
            }
            // Free text: edited through `apply`.
            SettingKey::FontFamilyPlaintext | SettingKey::FontFamilyCode => {}
        }
    }

    pub fn is_free_text(self) -> bool {
        matches!(
            self,
            SettingKey::FontFamilyPlaintext | SettingKey::FontFamilyCode
        )
    }

    fn mode(self) -> ContentMode {
        match self {
            SettingKey::FontSizeCode | SettingKey::FontFamilyCode => ContentMode::Code,
            _ => ContentMode::Plaintext,
        }
    }
}

fn step<T: PartialEq + Clone>(options: &[T], current: &T, forward: bool) -> T {
    let len = options.len();
    let index = options.iter().position(|o| o == current).unwrap_or(0);
    let next = if forward {
        (index + 1) % len
    } else {
        (index + len - 1) % len
    };
    options[next].clone()
}
