pub mod retry;

use anyhow::Result;
use std::path::Path;

/// Create a directory (and parents) if it does not exist
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Current UTC time as RFC 3339, the timestamp format used across the schema
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
