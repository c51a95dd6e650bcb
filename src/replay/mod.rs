//! Durable replay cursor storage.
//!
//! The cursor marks the last event this client is known to have processed.
//! It is submitted with every subscribe request so the server resends only
//! events after that point, and it is overwritten on every notification that
//! carries a timestamp.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::PathBuf;

use chrono::Utc;

use crate::error::{ClientError, Result};

/// Fixed width of the canonical cursor form: ISO-8601 UTC with millisecond
/// precision, e.g. `2024-01-01T00:00:00.000Z`.
pub const CURSOR_LEN: usize = 24;

const CURSOR_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Current UTC time in the canonical 24-character cursor form.
pub fn now_cursor() -> String {
    Utc::now().format(CURSOR_FORMAT).to_string()
}

/// Loads and saves the last-processed event timestamp.
///
/// Reads are error-tolerant: a missing or unusable stored value falls back to
/// the configured override cursor, then to the current time. Only values of
/// exactly [`CURSOR_LEN`] characters are accepted, in either direction.
pub struct ReplayCursorStore {
    path: PathBuf,
    override_cursor: Option<String>,
}

impl ReplayCursorStore {
    pub fn new(path: impl Into<PathBuf>, override_cursor: Option<String>) -> Self {
        Self {
            path: path.into(),
            override_cursor,
        }
    }

    /// Read the persisted cursor, falling back to the override or the current
    /// time when the stored value is absent or invalid. Never fails.
    pub fn load(&self) -> String {
        match fs::read_to_string(&self.path) {
            Ok(stored) if stored.chars().count() == CURSOR_LEN => {
                tracing::info!(cursor = %stored, "Loaded replay cursor from storage");
                stored
            }
            Ok(stored) => {
                tracing::warn!(
                    path = %self.path.display(),
                    len = stored.chars().count(),
                    "Invalid replay cursor in storage"
                );
                self.fallback()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No stored replay cursor");
                self.fallback()
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %self.path.display(),
                    "Failed to read replay cursor"
                );
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> String {
        match &self.override_cursor {
            Some(cursor) if cursor.chars().count() == CURSOR_LEN => {
                tracing::info!(cursor = %cursor, "Loaded replay cursor from override");
                cursor.clone()
            }
            Some(cursor) => {
                tracing::warn!(
                    len = cursor.chars().count(),
                    "Ignoring override replay cursor with invalid length"
                );
                now_cursor()
            }
            None => now_cursor(),
        }
    }

    /// Persist the cursor. The value is written to a sibling temporary file
    /// and renamed into place, so a reader never observes a partial write.
    pub fn save(&self, cursor: &str) -> Result<()> {
        if cursor.chars().count() != CURSOR_LEN {
            return Err(ClientError::Persistence(io::Error::new(
                ErrorKind::InvalidData,
                format!(
                    "replay cursor must be {CURSOR_LEN} characters, got {}",
                    cursor.chars().count()
                ),
            )));
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, cursor)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use tempfile::tempdir;

    const CURSOR: &str = "2024-01-01T00:00:00.000Z";

    #[test]
    fn test_now_cursor_is_canonical() {
        let cursor = now_cursor();
        assert_eq!(cursor.chars().count(), CURSOR_LEN);
        assert!(DateTime::parse_from_rfc3339(&cursor).is_ok());
    }

    #[test]
    fn test_load_returns_stored_cursor_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay");
        let store = ReplayCursorStore::new(&path, None);

        store.save(CURSOR).unwrap();
        assert_eq!(store.load(), CURSOR);
    }

    #[test]
    fn test_load_falls_back_to_override_when_absent() {
        let dir = tempdir().unwrap();
        let store = ReplayCursorStore::new(dir.path().join("replay"), Some(CURSOR.to_string()));

        assert_eq!(store.load(), CURSOR);
    }

    #[test]
    fn test_load_falls_back_to_override_when_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay");
        fs::write(&path, "truncated").unwrap();

        let store = ReplayCursorStore::new(&path, Some(CURSOR.to_string()));
        assert_eq!(store.load(), CURSOR);
    }

    #[test]
    fn test_load_falls_back_to_current_time_without_override() {
        let dir = tempdir().unwrap();
        let store = ReplayCursorStore::new(dir.path().join("replay"), None);

        let cursor = store.load();
        assert_eq!(cursor.chars().count(), CURSOR_LEN);
        assert!(DateTime::parse_from_rfc3339(&cursor).is_ok());
    }

    #[test]
    fn test_load_rejects_stored_cursor_longer_than_canonical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay");
        fs::write(&path, "2024-01-01T00:00:00.000Z plus trailing junk").unwrap();

        let store = ReplayCursorStore::new(&path, Some(CURSOR.to_string()));
        assert_eq!(store.load(), CURSOR);
    }

    #[test]
    fn test_invalid_override_falls_back_to_current_time() {
        let dir = tempdir().unwrap();
        let store = ReplayCursorStore::new(dir.path().join("replay"), Some("bogus".to_string()));

        let cursor = store.load();
        assert_ne!(cursor, "bogus");
        assert_eq!(cursor.chars().count(), CURSOR_LEN);
    }

    #[test]
    fn test_save_rejects_invalid_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay");
        let store = ReplayCursorStore::new(&path, None);

        store.save(CURSOR).unwrap();
        let result = store.save("2024-01-01");
        assert!(matches!(result, Err(ClientError::Persistence(_))));

        // The previously stored value is untouched
        assert_eq!(store.load(), CURSOR);
    }

    #[test]
    fn test_save_overwrites_completely() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replay");
        let store = ReplayCursorStore::new(&path, None);

        store.save(CURSOR).unwrap();
        store.save("2025-06-15T12:30:45.678Z").unwrap();
        assert_eq!(store.load(), "2025-06-15T12:30:45.678Z");
    }
}
