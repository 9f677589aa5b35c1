//! Raw model-response dumps for offline inspection.
//!
//! When `debug_dir` is set, every fallback response is written under
//! `debug_dir/{source-stem}/` so a bad extraction can be replayed against
//! the parser without re-calling the model. Dumping is best-effort; a
//! failed write logs and moves on.

use std::path::Path;
use tracing::{debug, warn};

/// Write one raw response under `debug_dir/{stem}/{label}.txt`.
pub fn dump_response(debug_dir: &Path, stem: &str, label: &str, content: &str) {
    let dir = debug_dir.join(stem);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!("debug dump: cannot create {}: {e}", dir.display());
        return;
    }
    let path = dir.join(format!("{label}.txt"));
    match std::fs::write(&path, content) {
        Ok(()) => debug!("dumped response to {}", path.display()),
        Err(e) => warn!("debug dump: cannot write {}: {e}", path.display()),
    }
}

/// Remove the dump directory for one source, ignoring a missing one.
pub fn clear_source(debug_dir: &Path, stem: &str) {
    let dir = debug_dir.join(stem);
    match std::fs::remove_dir_all(&dir) {
        Ok(()) => debug!("cleared debug dumps at {}", dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("debug dump: cannot clear {}: {e}", dir.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dump_and_clear_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        dump_response(dir.path(), "liste", "page-3", "[{\"Fiyat\": 1}]");
        let path = dir.path().join("liste/page-3.txt");
        assert!(path.exists());

        clear_source(dir.path(), "liste");
        assert!(!path.exists());
        // clearing again must be a no-op
        clear_source(dir.path(), "liste");
    }
}
