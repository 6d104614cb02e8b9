pub mod app;
pub mod classify;
pub mod cli;
pub mod config;
pub mod editor;
pub mod format;
pub mod notes;
pub mod shortcuts;
pub mod storage;
pub mod ui;

pub use config::{AppConfig, ConfigLoader, ConfigPaths};
