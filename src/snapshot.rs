//! File persistence for deal documents.
//!
//! Each deal is stored as one JSON document at
//! `<base_dir>/deals/<deal_id>.json` holding the entity and its complete
//! event log. Writes are atomic via a temp-rename pattern so readers never
//! see a partially written file.

use std::io;
use std::path::{Path, PathBuf};

use crate::deal::Deal;
use crate::error::StoreError;

/// Directory holding every deal document.
pub fn deals_dir(base_dir: &Path) -> PathBuf {
    base_dir.join("deals")
}

/// Compute the filesystem path for a deal document.
///
/// # Returns
///
/// `<base_dir>/deals/<deal_id>.json`
pub fn document_path(base_dir: &Path, deal_id: &str) -> PathBuf {
    deals_dir(base_dir).join(format!("{deal_id}.json"))
}

/// Save a deal document atomically.
///
/// Writes `<deal_id>.json.tmp` in the same directory, then renames it over
/// `<deal_id>.json`.
///
/// # Errors
///
/// Returns [`StoreError`] if serialization, directory creation, writing or
/// renaming fails.
pub fn save_document(base_dir: &Path, deal: &Deal) -> Result<(), StoreError> {
    let dir = deals_dir(base_dir);
    std::fs::create_dir_all(&dir)?;

    let path = document_path(base_dir, &deal.id);
    let tmp_path = path.with_extension("json.tmp");
    let json = serde_json::to_vec_pretty(deal)?;
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// Load a deal document.
///
/// # Returns
///
/// - `Ok(Some(deal))` if the file exists and agrees with its own event log.
/// - `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns [`StoreError::Corrupt`] if the document does not parse or its
/// cached fields contradict its event log, and [`StoreError::Io`] for any
/// other I/O failure.
pub fn load_document(base_dir: &Path, deal_id: &str) -> Result<Option<Deal>, StoreError> {
    let path = document_path(base_dir, deal_id);
    let bytes = match std::fs::read(&path) {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let deal: Deal = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to parse deal document");
        StoreError::Corrupt {
            id: deal_id.to_string(),
            reason: e.to_string(),
        }
    })?;

    if deal.id != deal_id {
        return Err(StoreError::Corrupt {
            id: deal_id.to_string(),
            reason: format!("document holds deal {}", deal.id),
        });
    }
    deal.check_consistency().map_err(|reason| {
        tracing::warn!(path = %path.display(), %reason, "deal document failed replay check");
        StoreError::Corrupt {
            id: deal_id.to_string(),
            reason,
        }
    })?;

    Ok(Some(deal))
}
