use std::{collections::BTreeMap, fs, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ViewerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowDimensions {
    pub logical_width: u32,
    pub logical_height: u32,
    pub window_width: u32,
    pub window_height: u32,
}

/// Persists version tokens and window dimensions between runs.
pub trait StateStore: Send {
    fn version(&self, drawing_name: &str) -> Option<String>;
    fn set_version(&mut self, drawing_name: &str, version: &str) -> Result<()>;
    fn dimensions(&self, key: &str) -> Option<WindowDimensions>;
    fn set_dimensions(&mut self, key: &str, dimensions: WindowDimensions) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct PersistedState {
    #[serde(default)]
    versions: BTreeMap<String, String>,
    #[serde(default)]
    dimensions: BTreeMap<String, WindowDimensions>,
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    state: PersistedState,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn version(&self, drawing_name: &str) -> Option<String> {
        self.state.versions.get(drawing_name).cloned()
    }

    fn set_version(&mut self, drawing_name: &str, version: &str) -> Result<()> {
        self.state
            .versions
            .insert(drawing_name.to_string(), version.to_string());
        Ok(())
    }

    fn dimensions(&self, key: &str) -> Option<WindowDimensions> {
        self.state.dimensions.get(key).copied()
    }

    fn set_dimensions(&mut self, key: &str, dimensions: WindowDimensions) -> Result<()> {
        self.state.dimensions.insert(key.to_string(), dimensions);
        Ok(())
    }
}

/// JSON file backed store, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: PersistedState,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse state file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "state file missing; starting empty");
            PersistedState::default()
        };
        Ok(Self { path, state })
    }

    fn save(&self) -> Result<()> {
        let persist_error = |source| ViewerError::Persist {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persist_error)?;
        }
        let raw = serde_json::to_string_pretty(&self.state)?;
        fs::write(&self.path, raw).map_err(persist_error)?;
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn version(&self, drawing_name: &str) -> Option<String> {
        self.state.versions.get(drawing_name).cloned()
    }

    fn set_version(&mut self, drawing_name: &str, version: &str) -> Result<()> {
        let previous = self
            .state
            .versions
            .insert(drawing_name.to_string(), version.to_string());
        if previous.as_deref() == Some(version) {
            return Ok(());
        }
        self.save()
    }

    fn dimensions(&self, key: &str) -> Option<WindowDimensions> {
        self.state.dimensions.get(key).copied()
    }

    fn set_dimensions(&mut self, key: &str, dimensions: WindowDimensions) -> Result<()> {
        self.state.dimensions.insert(key.to_string(), dimensions);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("viewer-store-{}-{name}", std::process::id()))
            .join("state.json")
    }

    #[test]
    fn file_store_round_trips_between_opens() {
        let path = temp_path("reopen");
        let _ = fs::remove_file(&path);
        let dimensions = WindowDimensions {
            logical_width: 100,
            logical_height: 80,
            window_width: 800,
            window_height: 640,
        };

        let mut store = JsonFileStore::open(&path).expect("open");
        assert!(store.version("home").is_none());
        store.set_version("home", "V7").expect("version");
        store.set_dimensions("main", dimensions).expect("dimensions");

        let reopened = JsonFileStore::open(&path).expect("reopen");
        assert_eq!(reopened.version("home").as_deref(), Some("V7"));
        assert_eq!(reopened.dimensions("main"), Some(dimensions));

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }

    #[test]
    fn corrupt_state_file_is_an_error() {
        let path = temp_path("corrupt");
        fs::create_dir_all(path.parent().expect("parent")).expect("dir");
        fs::write(&path, "{ not json").expect("write");

        let err = JsonFileStore::open(&path).expect_err("corrupt file should fail");
        assert!(err.to_string().contains("failed to parse state file"));

        let _ = fs::remove_dir_all(path.parent().expect("parent"));
    }
}
