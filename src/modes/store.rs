//! Mode registry: current-mode pointer, built-in and generated bundles,
//! best-effort disk snapshot.
//!
//! Shared process-wide behind an `Arc` (the demo keeps one global mode), so
//! all interior state sits behind a `RwLock`; the tokio runtime is
//! multi-threaded and plain read-modify-write would race.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::modes::builtin::builtin_modes;
use crate::modes::types::Mode;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    current_id: String,
    generated: Vec<Mode>,
}

struct StoreInner {
    /// The active bundle. May be a company-renamed copy of a stored mode,
    /// so it is held wholesale rather than as an id lookup.
    current: Mode,
    builtin: HashMap<String, Mode>,
    generated: HashMap<String, Mode>,
}

/// Registry of mode bundles plus the "current mode" pointer.
pub struct ModeStore {
    inner: RwLock<StoreInner>,
    snapshot_path: Option<PathBuf>,
}

impl ModeStore {
    /// Create a store seeded with the built-in modes (banking active) and any
    /// previously generated modes from the snapshot file.
    pub fn new(snapshot_path: Option<PathBuf>) -> Self {
        let builtin: HashMap<String, Mode> = builtin_modes()
            .into_iter()
            .map(|m| (m.id.clone(), m))
            .collect();

        let mut current = builtin.get("banking").cloned().expect("banking is built in");
        let mut generated = HashMap::new();

        if let Some(path) = &snapshot_path {
            match std::fs::read_to_string(path) {
                Ok(contents) => match serde_json::from_str::<Snapshot>(&contents) {
                    Ok(snapshot) => {
                        for mode in snapshot.generated {
                            generated.insert(mode.id.clone(), mode);
                        }
                        if let Some(mode) = builtin
                            .get(&snapshot.current_id)
                            .or_else(|| generated.get(&snapshot.current_id))
                        {
                            current = mode.clone();
                        }
                        info!(
                            "Loaded mode snapshot: {} generated mode(s), current={}",
                            generated.len(),
                            current.id
                        );
                    }
                    Err(e) => warn!("Ignoring corrupt mode snapshot: {}", e),
                },
                Err(_) => {} // first run, nothing persisted yet
            }
        }

        Self {
            inner: RwLock::new(StoreInner {
                current,
                builtin,
                generated,
            }),
            snapshot_path,
        }
    }

    /// The active mode bundle.
    pub fn get_current(&self) -> Mode {
        self.inner.read().unwrap().current.clone()
    }

    /// Activate a bundle wholesale (possibly a company-renamed copy).
    pub fn activate(&self, mode: Mode) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.current = mode;
        }
        self.persist();
    }

    /// Activate a stored mode by id. Returns the activated bundle, or `None`
    /// for an unknown id (the previous mode stays active).
    pub fn set_current(&self, id: &str) -> Option<Mode> {
        let mode = self.get(id)?;
        self.activate(mode.clone());
        Some(mode)
    }

    /// Look up a mode (built-in first, then generated).
    pub fn get(&self, id: &str) -> Option<Mode> {
        let inner = self.inner.read().unwrap();
        inner
            .builtin
            .get(id)
            .or_else(|| inner.generated.get(id))
            .cloned()
    }

    /// Look up a previously generated mode only.
    pub fn find_generated(&self, id: &str) -> Option<Mode> {
        self.inner.read().unwrap().generated.get(id).cloned()
    }

    /// Persist a newly generated mode.
    pub fn insert_generated(&self, mode: Mode) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.generated.insert(mode.id.clone(), mode);
        }
        self.persist();
    }

    /// Best-effort snapshot of generated modes + current pointer to disk.
    fn persist(&self) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let snapshot = {
            let inner = self.inner.read().unwrap();
            Snapshot {
                current_id: inner.current.id.clone(),
                generated: inner.generated.values().cloned().collect(),
            }
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("Failed to write mode snapshot to {}: {}", path.display(), e);
                }
            }
            Err(e) => warn!("Failed to serialize mode snapshot: {}", e),
        }
    }
}
