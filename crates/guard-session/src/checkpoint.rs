//! Checkpoint persistence
//!
//! One JSON-encoded [`Session`] per file, written 0600 and replaced
//! atomically on each transition via a same-directory temp file and rename.

use crate::supervisor::Session;
use guard_core::Result;
use std::io::Write;
use std::path::Path;

/// Atomically replace the checkpoint at `path` with `session`
pub fn write_checkpoint(path: &Path, session: &Session) -> Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => {
            std::fs::create_dir_all(dir)?;
            dir.to_path_buf()
        }
        _ => std::path::PathBuf::from("."),
    };

    let body = serde_json::to_vec(session)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(&body)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }

    tmp.persist(path)
        .map_err(|e| guard_core::Error::checkpoint(e.to_string()))?;
    Ok(())
}

/// Read and parse a checkpoint
pub fn read_checkpoint(path: &Path) -> Result<Session> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
