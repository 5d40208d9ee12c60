//! Pluggable key-value storage for deal documents.
//!
//! The repository only ever talks to a [`DealStore`]. Two backends ship
//! with the crate: [`MemoryStore`] for tests and demos, and [`FileStore`]
//! which keeps one JSON document per deal on disk.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use crate::deal::Deal;
use crate::error::StoreError;
use crate::snapshot::{deals_dir, load_document, save_document};

/// Durable map of deal id to deal document.
///
/// Implementations must make [`save`](DealStore::save) atomic per document:
/// a reader sees either the previous document or the new one.
pub trait DealStore: Send + Sync + 'static {
    /// Load a deal, or `None` if no document exists for `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read or the document
    /// is corrupt.
    fn load(&self, id: &str) -> Result<Option<Deal>, StoreError>;

    /// Insert or replace the document for `deal.id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the document cannot be written.
    fn save(&self, deal: &Deal) -> Result<(), StoreError>;

    /// All stored deal ids, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the backend cannot be read.
    fn list_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Remove every document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if documents cannot be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

/// In-process store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    deals: RwLock<HashMap<String, Deal>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl DealStore for MemoryStore {
    fn load(&self, id: &str) -> Result<Option<Deal>, StoreError> {
        let deals = self.deals.read().unwrap_or_else(PoisonError::into_inner);
        Ok(deals.get(id).cloned())
    }

    fn save(&self, deal: &Deal) -> Result<(), StoreError> {
        let mut deals = self.deals.write().unwrap_or_else(PoisonError::into_inner);
        deals.insert(deal.id.clone(), deal.clone());
        Ok(())
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let deals = self.deals.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = deals.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.deals
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }
}

/// On-disk store with one document per deal.
///
/// The layout follows this structure:
/// ```text
/// <base_dir>/
///     deals/
///         DL-1A2B3C4D.json
///         DL-5E6F7A8B.json
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `base_dir`.
    ///
    /// The directory does not need to exist yet; it is created on the first
    /// save.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl DealStore for FileStore {
    fn load(&self, id: &str) -> Result<Option<Deal>, StoreError> {
        load_document(&self.base_dir, id)
    }

    fn save(&self, deal: &Deal) -> Result<(), StoreError> {
        save_document(&self.base_dir, deal)
    }

    fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(deals_dir(&self.base_dir)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids: Vec<String> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                // Only finished documents; `*.json.tmp` has extension `tmp`.
                if path.extension()? != "json" {
                    return None;
                }
                Some(path.file_stem()?.to_string_lossy().into_owned())
            })
            .collect();

        ids.sort();
        Ok(ids)
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_dir_all(deals_dir(&self.base_dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Memory store whose writes can be switched off to simulate a full
    /// disk.
    #[derive(Debug, Default)]
    pub(crate) struct FlakyStore {
        pub inner: MemoryStore,
        pub fail_writes: AtomicBool,
        /// Writes still accepted before the disk "fills up"; `None` is
        /// unlimited.
        budget: Mutex<Option<usize>>,
    }

    impl FlakyStore {
        pub(crate) fn set_failing(&self, failing: bool) {
            self.fail_writes.store(failing, Ordering::SeqCst);
        }

        /// Accept `writes` more saves, then fail every one after.
        pub(crate) fn fail_after(&self, writes: usize) {
            *self.budget.lock().unwrap_or_else(PoisonError::into_inner) = Some(writes);
        }
    }

    impl DealStore for FlakyStore {
        fn load(&self, id: &str) -> Result<Option<Deal>, StoreError> {
            self.inner.load(id)
        }

        fn save(&self, deal: &Deal) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::other("disk full").into());
            }
            let mut budget = self.budget.lock().unwrap_or_else(PoisonError::into_inner);
            match budget.as_mut() {
                Some(0) => return Err(io::Error::other("disk full").into()),
                Some(left) => *left -= 1,
                None => {}
            }
            drop(budget);
            self.inner.save(deal)
        }

        fn list_ids(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_ids()
        }

        fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear()
        }
    }
}
