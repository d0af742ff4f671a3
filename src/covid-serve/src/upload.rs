//! Validation and scoped storage of uploaded files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, warn};

use crate::config::ALLOWED_EXTENSIONS;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// True when `filename` ends in one of the allowed image extensions.
pub fn allowed_file(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            ALLOWED_EXTENSIONS.iter().any(|allowed| *allowed == ext)
        }
        None => false,
    }
}

/// Reduce a client supplied name to something safe to join onto a directory.
///
/// Non-ASCII characters are dropped, path separators and whitespace runs
/// become a single `_`, anything outside `[A-Za-z0-9._-]` is removed and
/// leading or trailing dots and underscores are trimmed. The result may be
/// empty.
pub fn secure_filename(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");

    joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c == '_')
        .to_owned()
}

/// An uploaded file on disk. The file is removed when the guard drops.
#[derive(Debug)]
pub struct SavedUpload {
    path: PathBuf,
}

impl SavedUpload {
    /// Write `data` into `dir` under a unique name derived from `filename`.
    pub fn save(dir: &Path, filename: &str, data: &[u8]) -> io::Result<Self> {
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!("{}_{}", seq, filename));

        fs::write(&path, data)?;
        debug!("Saved {} bytes to {}", data.len(), path.display());

        Ok(SavedUpload { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SavedUpload {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) => warn!("Could not remove {}: {}", self.path.display(), e),
        }
    }
}
