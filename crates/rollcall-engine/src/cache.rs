//! Per-session gallery cache.
//!
//! Each active session owns a slot holding its current `GalleryIndex`. The
//! outer map lock is held only long enough to fetch or create a slot; the
//! slot's own lock serializes same-session frames across the rebuild-check,
//! match, and commit steps. Rebuilds copy every row out of the store before
//! installing the new index, so readers never observe a partial gallery.

use rollcall_core::GalleryIndex;
use rollcall_store::{Store, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub(crate) struct GalleryCache {
    slots: Mutex<HashMap<i64, Arc<Mutex<SessionSlot>>>>,
}

/// Cache state for one session. `None` until the first frame builds it.
#[derive(Default)]
pub(crate) struct SessionSlot {
    index: Option<Arc<GalleryIndex>>,
}

impl GalleryCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch the slot for `session_id`, creating an empty one if absent.
    pub fn slot(&self, session_id: i64) -> Arc<Mutex<SessionSlot>> {
        let mut slots = self.slots.lock().expect("cache map lock poisoned");
        slots.entry(session_id).or_default().clone()
    }

    /// Drop the slot for an ended session.
    pub fn discard(&self, session_id: i64) {
        let mut slots = self.slots.lock().expect("cache map lock poisoned");
        if slots.remove(&session_id).is_some() {
            tracing::debug!(session_id, "gallery cache slot discarded");
        }
    }
}

impl SessionSlot {
    /// Return a ready index, rebuilding when none exists or when the
    /// enrolled-subject count no longer matches the index baseline.
    ///
    /// The count comparison is a heuristic: an embedding replaced in place
    /// without a count change goes undetected until the next rebuild
    /// trigger. A store failure propagates and leaves any previous index in
    /// place for future attempts.
    pub fn ensure_fresh(
        &mut self,
        session_id: i64,
        store: &Store,
    ) -> Result<Arc<GalleryIndex>, StoreError> {
        let current = store.enrolled_count()?;
        match &self.index {
            Some(index) if !index.is_stale(current) => Ok(index.clone()),
            Some(index) => {
                tracing::info!(
                    session_id,
                    cached = index.baseline_count(),
                    current,
                    "gallery cache stale, rebuilding"
                );
                self.rebuild(session_id, store)
            }
            None => self.rebuild(session_id, store),
        }
    }

    /// Unconditionally rebuild this session's index from the store.
    pub fn rebuild(
        &mut self,
        session_id: i64,
        store: &Store,
    ) -> Result<Arc<GalleryIndex>, StoreError> {
        // Copy everything out of the store before installing, so the new
        // index becomes visible in a single assignment.
        let entries = store.enrolled_faces()?;
        let baseline = entries.len();
        let index = Arc::new(GalleryIndex::new(entries, baseline));
        self.index = Some(index.clone());
        tracing::info!(session_id, entries = baseline, "gallery index built");
        Ok(index)
    }
}
