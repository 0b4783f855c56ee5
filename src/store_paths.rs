//! Purpose: Resolve which store snapshot the CLI opens.
//! Exports: `default_store_path`, `resolve_store_path`, `STORE_ENV`.
//! Role: Keep flag, environment and default path semantics in one place.
//! Invariants: Default store remains `~/.vistascope/store.json`.
//! Invariants: An explicit `--store` flag always wins over the environment.

use std::ffi::OsString;
use std::path::PathBuf;

pub(crate) const STORE_ENV: &str = "VISTASCOPE_STORE";

pub(crate) fn default_store_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".vistascope").join("store.json")
}

pub(crate) fn resolve_store_path(flag: Option<PathBuf>, env_value: Option<OsString>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }
    match env_value {
        Some(value) if !value.is_empty() => PathBuf::from(value),
        _ => default_store_path(),
    }
}
