//! JSON state files.

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

use crate::runtime::Runtime;

/// Loads a state file. A file containing `null` means "absent".
pub fn load<T: DeserializeOwned>(runtime: &dyn Runtime, path: &Path) -> Result<Option<T>> {
    let text = runtime.read_to_string(path)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Like [`load`], but the object must be present.
pub fn load_required<T: DeserializeOwned>(runtime: &dyn Runtime, path: &Path) -> Result<T> {
    load(runtime, path)?.with_context(|| format!("{} describes no object", path.display()))
}

/// Writes `value` as pretty JSON, creating parent directories as needed.
pub fn save<T: Serialize>(runtime: &dyn Runtime, path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !runtime.exists(parent) {
            runtime.create_dir_all(parent)?;
        }
    }
    let mut json = to_json(value)?;
    json.push('\n');
    debug!("Saving state to {}", path.display());
    runtime.write(path, json.as_bytes())
}

/// Removes a state file if it exists.
pub fn remove(runtime: &dyn Runtime, path: &Path) -> Result<()> {
    if runtime.exists(path) {
        debug!("Removing state file {}", path.display());
        runtime.remove_file(path)?;
    }
    Ok(())
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize state")
}
