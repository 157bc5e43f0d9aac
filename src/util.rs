//! Small filesystem helpers.

use std::io::Write;
use std::path::Path;

/// Write `content` to `path` atomically: stage in a temp file in the same
/// directory, then rename over the target. Readers never observe a partial
/// write.
pub fn atomic_write_str(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
