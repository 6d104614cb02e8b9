//! Per-note editing controller: text panes, the save-state timer chain,
//! paste and format interception, and the dual-buffer tab mode.

pub mod buffer;
pub mod session;
pub mod timers;

pub use buffer::{Motion, TextBuffer};
pub use session::{
    Edit, EditorGestures, EditorSession, FormatRequest, FormatResult, FormatTrigger, Pane,
    SessionEffect,
};
pub use timers::{SaveEvent, SaveState, Timer};
