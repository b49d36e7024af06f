//! # delve-settings
//!
//! Layered configuration for the delve research client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`DelveSettings::default()`]
//! 2. **User file** — `~/.delve/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `DELVE_*` overrides (highest priority)
//!
//! Callers load once at startup via [`load_settings`] (or
//! [`load_settings_from_path`] when the path is explicit) and pass the value
//! down; nothing in this crate holds global state.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
