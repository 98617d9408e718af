//! Ledger persistence.
//!
//! Layout: `{ledger_path}` holds the full ledger as JSON, `{ledger_path}.meta.json`
//! a sidecar with counts and a BLAKE3 hash of the ledger bytes.
//!
//! - Atomic writes (write to `.tmp`, rename into place)
//! - A missing ledger loads as empty
//! - Loading never touches the files; an unparsable ledger is reported as
//!   corrupt and left in place
//! - `quarantine` moves a corrupt ledger aside (`.quarantined`, then
//!   `.quarantined.1`, ...) so the next save cannot overwrite the evidence
//! - The sidecar is advisory: failing to write it does not fail the save

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ledger::{Ledger, LedgerStats};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("persisted ledger is corrupt ({path}): {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Load/save capability over the persisted ledger.
pub trait LedgerStore {
    /// Load the full ledger. A store with nothing saved yet returns an empty ledger.
    fn load(&self) -> Result<Ledger, StoreError>;

    /// Replace the persisted ledger with `ledger`.
    fn save(&self, ledger: &Ledger) -> Result<(), StoreError>;

    /// Move a corrupt ledger out of the way. Returns where it went, or `None`
    /// if the store keeps nothing to move.
    fn quarantine(&self) -> Result<Option<PathBuf>, StoreError> {
        Ok(None)
    }
}

/// Metadata sidecar written next to the ledger on every save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub stats: LedgerStats,
    pub data_hash: String,
    pub saved_at: DateTime<Utc>,
}

/// JSON-file ledger store.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `{ledger_path}.meta.json`
    pub fn meta_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "meta.json")
    }

    /// Where the first quarantined ledger goes.
    pub fn quarantine_path(&self) -> PathBuf {
        sibling_with_suffix(&self.path, "quarantined")
    }

    /// First quarantine slot not already taken.
    fn free_quarantine_path(&self) -> PathBuf {
        let base = self.quarantine_path();
        if !base.exists() {
            return base;
        }
        (1_u32..)
            .map(|n| sibling_with_suffix(&base, &n.to_string()))
            .find(|p| !p.exists())
            .unwrap_or(base)
    }

    pub fn read_meta(&self) -> Option<LedgerMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Hash the ledger file on disk and compare with the sidecar.
    ///
    /// `None` if either file is missing.
    pub fn verify(&self) -> Option<bool> {
        let meta = self.read_meta()?;
        let bytes = fs::read(&self.path).ok()?;
        Some(blake3::hash(&bytes).to_hex().to_string() == meta.data_hash)
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self) -> Result<Ledger, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Ledger::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        match serde_json::from_slice::<Ledger>(&bytes) {
            Ok(ledger) => Ok(ledger),
            Err(e) => Err(StoreError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn save(&self, ledger: &Ledger) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(ledger)?;
        write_atomic(&self.path, &bytes)?;

        let meta = LedgerMeta {
            stats: ledger.stats(),
            data_hash: blake3::hash(&bytes).to_hex().to_string(),
            saved_at: Utc::now(),
        };
        // The ledger is already committed at this point.
        if let Err(e) = serde_json::to_vec_pretty(&meta)
            .map_err(StoreError::from)
            .and_then(|bytes| write_atomic(&self.meta_path(), &bytes))
        {
            tracing::warn!("ledger saved but sidecar write failed: {e}");
            let _ = fs::remove_file(self.meta_path());
        }
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<PathBuf>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let target = self.free_quarantine_path();
        fs::rename(&self.path, &target).map_err(|e| StoreError::io(&self.path, e))?;
        tracing::warn!(
            "quarantined corrupt ledger {} -> {}",
            self.path.display(),
            target.display()
        );
        Ok(Some(target))
    }
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Write to a `.tmp` sibling, then rename into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    let tmp_path = sibling_with_suffix(path, "tmp");
    let mut file = fs::File::create(&tmp_path).map_err(|e| StoreError::io(&tmp_path, e))?;
    file.write_all(bytes)
        .and_then(|()| file.sync_all())
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, e)
    })
}

/// `foo.json` + `tmp` -> `foo.json.tmp`
fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
