pub mod log;

use crate::Result;
use std::fs;
use std::path::Path;

/// Creates `dir` and its parents when missing. Returns whether anything was
/// created.
pub fn ensure_dir(dir: &Path) -> Result<bool> {
    if dir.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(dir)?;
    Ok(true)
}
