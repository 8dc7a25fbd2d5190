//! JSON config file loading.
use std::path::Path;

use super::{ConfigEntry, RawEntry};
use crate::error::ConfigError;

/// Load and validate every entry of one config file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not a JSON array of
/// entries, or any entry fails validation.
pub fn load_file(path: &Path) -> Result<Vec<ConfigEntry>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content, path)
}

/// Load several config files, concatenating their entries in order.
///
/// # Errors
///
/// Fails on the first file that cannot be loaded.
pub fn load_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ConfigEntry>, ConfigError> {
    let mut entries = Vec::new();
    for path in paths {
        entries.extend(load_file(path.as_ref())?);
    }
    Ok(entries)
}

/// Parse config text; `origin` only labels errors.
///
/// # Errors
///
/// Returns an error if `content` is not valid config JSON.
pub fn parse(content: &str, origin: &Path) -> Result<Vec<ConfigEntry>, ConfigError> {
    let raw: Vec<RawEntry> = serde_json::from_str(content).map_err(|source| ConfigError::Json {
        path: origin.to_path_buf(),
        source,
    })?;
    raw.into_iter().map(ConfigEntry::from_raw).collect()
}
