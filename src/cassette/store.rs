//! Cassette store: in-memory entry list backed by a JSON file
//!
//! All access happens on the fixture's single event loop; the mutex only
//! satisfies the borrow checker across await points, it is never contended
//! cross-thread.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::Matcher;
use crate::request::InboundRequest;
use crate::{DeckError, Result};

use super::{Cassette, Interaction};

/// Ordered, file-backed collection of recorded interactions
pub struct CassetteStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

struct StoreState {
    entries: Vec<Interaction>,
    loaded: bool,
}

/// Borrowing view for persistence, avoids cloning the entry list per write
#[derive(Serialize)]
struct CassetteView<'a> {
    entries: &'a [Interaction],
}

impl CassetteStore {
    /// Create a store for the given cassette path; nothing is read yet
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: Mutex::new(StoreState {
                entries: Vec::new(),
                loaded: false,
            }),
        }
    }

    /// Cassette file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry and immediately persist the full cassette
    ///
    /// # Errors
    ///
    /// Returns error if the cassette cannot be written; the caller must
    /// surface this, a lost recording breaks future replay
    pub async fn append(&self, entry: Interaction) -> Result<()> {
        let mut state = self.state.lock().await;
        // Capture owns the in-memory list from the first append on; never
        // clobber it with stale file contents later.
        state.loaded = true;
        state.entries.push(entry);
        self.persist(&state.entries)?;

        debug!(
            entries = state.entries.len(),
            path = %self.path.display(),
            "Cassette persisted"
        );
        Ok(())
    }

    /// Remove and return the first entry the matcher accepts, scanning in
    /// insertion order; `None` when nothing matches
    pub async fn take_matching(
        &self,
        request: &InboundRequest,
        matcher: &Matcher,
    ) -> Option<Interaction> {
        let mut state = self.state.lock().await;
        if !state.loaded {
            state.entries = load_cassette(&self.path).entries;
            state.loaded = true;
        }

        let index = state.entries.iter().position(|entry| matcher(entry, request))?;
        Some(state.entries.remove(index))
    }

    /// Number of entries currently held in memory
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    /// Whether the in-memory cassette is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn persist(&self, entries: &[Interaction]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| DeckError::Persist {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }

        let data = serde_json::to_vec_pretty(&CassetteView { entries })?;
        fs::write(&self.path, data).map_err(|source| DeckError::Persist {
            path: self.path.clone(),
            source,
        })
    }
}

/// Read a cassette from disk; missing or malformed files yield an empty
/// cassette so a first run can start from nothing
fn load_cassette(path: &Path) -> Cassette {
    let Ok(data) = fs::read(path) else {
        debug!(path = %path.display(), "No cassette file, starting empty");
        return Cassette::default();
    };

    match serde_json::from_slice(&data) {
        Ok(cassette) => cassette,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed cassette, treating as empty");
            Cassette::default()
        }
    }
}
