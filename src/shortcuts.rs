use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use indexmap::IndexMap;
use thiserror::Error;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        const CTRL = 1;
        const ALT = 1 << 1;
        const SHIFT = 1 << 2;
        const SUPER = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcceleratorKey {
    Char(char),
    Space,
    Enter,
}

/// A key chord such as `ctrl+alt+n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Accelerator {
    modifiers: Modifiers,
    key: AcceleratorKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShortcutError {
    #[error("invalid accelerator {input:?}: {reason}")]
    Parse { input: String, reason: String },
    #[error("{accelerator} is already bound to {action}")]
    Conflict { accelerator: String, action: String },
    #[error("shortcut backend failed: {0}")]
    Backend(String),
}

impl Accelerator {
    pub fn new(modifiers: Modifiers, key: AcceleratorKey) -> Self {
        Self { modifiers, key }
    }

    pub fn modifiers(&self) -> Modifiers {
        self.modifiers
    }

    pub fn key(&self) -> AcceleratorKey {
        self.key
    }

    /// Normalizes a terminal key press; uppercase letters count as shifted.
    pub fn from_key_event(event: &KeyEvent) -> Option<Self> {
        let mut modifiers = Modifiers::empty();
        for (terminal, ours) in [
            (KeyModifiers::CONTROL, Modifiers::CTRL),
            (KeyModifiers::ALT, Modifiers::ALT),
            (KeyModifiers::SHIFT, Modifiers::SHIFT),
            (KeyModifiers::SUPER, Modifiers::SUPER),
        ] {
            if event.modifiers.contains(terminal) {
                modifiers |= ours;
            }
        }
        let key = match event.code {
            KeyCode::Char(' ') => AcceleratorKey::Space,
            KeyCode::Char(ch) => {
                if ch.is_ascii_uppercase() {
                    modifiers |= Modifiers::SHIFT;
                }
                AcceleratorKey::Char(ch.to_ascii_lowercase())
            }
            KeyCode::Enter => AcceleratorKey::Enter,
            _ => return None,
        };
        Some(Self { modifiers, key })
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        Self::from_key_event(event).is_some_and(|pressed| pressed == *self)
    }
}

impl FromStr for Accelerator {
    type Err = ShortcutError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let fail = |reason: &str| ShortcutError::Parse {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let normalized = input.trim().to_ascii_lowercase();
        let mut parts: Vec<&str> = normalized.split('+').map(str::trim).collect();
        let key_part = parts.pop().filter(|part| !part.is_empty()).ok_or_else(|| fail("missing key"))?;

        let mut modifiers = Modifiers::empty();
        for part in parts {
            let modifier = match part {
                "ctrl" | "control" => Modifiers::CTRL,
                "alt" | "option" => Modifiers::ALT,
                "shift" => Modifiers::SHIFT,
                "super" | "cmd" | "command" | "meta" => Modifiers::SUPER,
                "" => return Err(fail("empty modifier")),
                _ => return Err(fail(&format!("unknown modifier {part:?}"))),
            };
            if modifiers.contains(modifier) {
                return Err(fail(&format!("modifier {part:?} repeated")));
            }
            modifiers |= modifier;
        }
        if modifiers.is_empty() {
            return Err(fail("at least one modifier is required"));
        }

        let key = match key_part {
            "space" => AcceleratorKey::Space,
            "enter" | "return" => AcceleratorKey::Enter,
            single => {
                let mut chars = single.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) if !ch.is_whitespace() && !ch.is_control() => {
                        AcceleratorKey::Char(ch)
                    }
                    _ => return Err(fail(&format!("unsupported key {single:?}"))),
                }
            }
        };
        Ok(Self { modifiers, key })
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, name) in [
            (Modifiers::CTRL, "ctrl"),
            (Modifiers::ALT, "alt"),
            (Modifiers::SHIFT, "shift"),
            (Modifiers::SUPER, "super"),
        ] {
            if self.modifiers.contains(flag) {
                write!(f, "{name}+")?;
            }
        }
        match self.key {
            AcceleratorKey::Char(ch) => write!(f, "{ch}"),
            AcceleratorKey::Space => f.write_str("space"),
            AcceleratorKey::Enter => f.write_str("enter"),
        }
    }
}

/// Where accelerators actually get registered.
pub trait ShortcutBackend {
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), ShortcutError>;
    fn unregister(&mut self, accelerator: &Accelerator) -> Result<(), ShortcutError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortcutStatus {
    Active(Accelerator),
    Inactive { reason: String },
}

impl ShortcutStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ShortcutStatus::Active(_))
    }
}

/// Keeps at most one "new note" accelerator registered.
pub struct ShortcutManager<B> {
    backend: B,
    active: Option<Accelerator>,
    status: ShortcutStatus,
}

impl<B: ShortcutBackend> ShortcutManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            active: None,
            status: ShortcutStatus::Inactive {
                reason: "no shortcut configured".to_string(),
            },
        }
    }

    /// Switches to `command`, unregistering the previous accelerator first.
    pub fn activate(&mut self, command: &str) -> &ShortcutStatus {
        let parsed = command.parse::<Accelerator>();
        if let Ok(accelerator) = &parsed {
            if self.active.as_ref() == Some(accelerator) {
                return &self.status;
            }
        }

        self.deactivate();
        let registered = parsed.and_then(|accelerator| {
            self.backend
                .register(&accelerator)
                .map(|()| accelerator)
        });
        match registered {
            Ok(accelerator) => {
                tracing::info!(%accelerator, "shortcut registered");
                self.active = Some(accelerator);
                self.status = ShortcutStatus::Active(accelerator);
            }
            Err(err) => {
                tracing::warn!(%command, %err, "shortcut not active");
                self.status = ShortcutStatus::Inactive {
                    reason: err.to_string(),
                };
            }
        }
        &self.status
    }

    pub fn deactivate(&mut self) {
        if let Some(previous) = self.active.take() {
            if let Err(err) = self.backend.unregister(&previous) {
                tracing::warn!(accelerator = %previous, %err, "failed to unregister shortcut");
            }
            self.status = ShortcutStatus::Inactive {
                reason: "shortcut cleared".to_string(),
            };
        }
    }

    pub fn status(&self) -> &ShortcutStatus {
        &self.status
    }

    pub fn active(&self) -> Option<&Accelerator> {
        self.active.as_ref()
    }

    pub fn matches(&self, event: &KeyEvent) -> bool {
        self.active
            .as_ref()
            .is_some_and(|accelerator| accelerator.matches(event))
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// In-process registry used while the terminal front end has focus.
///
/// Accelerators that collide with a built-in key binding are refused.
#[derive(Debug, Default)]
pub struct TerminalShortcuts {
    reserved: IndexMap<Accelerator, String>,
    registered: Vec<Accelerator>,
}

impl TerminalShortcuts {
    pub fn new<'a, I>(reserved: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let reserved = reserved
            .into_iter()
            .filter_map(|(keys, action)| match keys.parse::<Accelerator>() {
                Ok(accelerator) => Some((accelerator, action.to_string())),
                Err(err) => {
                    tracing::warn!(%err, "ignoring unparseable reserved binding");
                    None
                }
            })
            .collect();
        Self {
            reserved,
            registered: Vec::new(),
        }
    }

    pub fn registered(&self) -> &[Accelerator] {
        &self.registered
    }
}

impl ShortcutBackend for TerminalShortcuts {
    fn register(&mut self, accelerator: &Accelerator) -> Result<(), ShortcutError> {
        if let Some(action) = self.reserved.get(accelerator) {
            return Err(ShortcutError::Conflict {
                accelerator: accelerator.to_string(),
                action: action.clone(),
            });
        }
        if !self.registered.contains(accelerator) {
            self.registered.push(*accelerator);
        }
        Ok(())
    }

    fn unregister(&mut self, accelerator: &Accelerator) -> Result<(), ShortcutError> {
        let before = self.registered.len();
        self.registered.retain(|existing| existing != accelerator);
        if self.registered.len() == before {
            return Err(ShortcutError::Backend(format!(
                "{accelerator} was not registered"
            )));
        }
        Ok(())
    }
}
