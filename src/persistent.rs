use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

use crate::store::ViewState;

/// How many traces keep their view preferences. The least recently saved ones are dropped.
const MAX_REMEMBERED_TRACES: usize = 200;

/// Persistent data structure that holds view preferences of previously opened traces.
/// If the data structure changes, it should be versioned to maintain compatibility with data saved
/// using older versions of traceview.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum PersistentData {
    V1(PersistentDataV1),
}

impl Default for PersistentData {
    fn default() -> Self {
        PersistentData::V1(PersistentDataV1::default())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct PersistentDataV1 {
    /// Zoom used for traces that were never opened before.
    last_zoom: Option<f64>,
    /// Trace key -> preferences
    traces: BTreeMap<String, RememberedView>,
    /// Bumped on every save, used to find the least recently saved traces.
    save_counter: u64,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RememberedView {
    state: ViewState,
    saved_at: u64,
}

impl PersistentData {
    fn latest(&mut self) -> &mut PersistentDataV1 {
        match self {
            PersistentData::V1(data) => data,
        }
    }

    /// Preferences saved for `trace_key`, or just the last zoom for a trace seen for the first
    /// time.
    pub fn view_state(&self, trace_key: &str) -> Option<ViewState> {
        let PersistentData::V1(data) = self;
        match data.traces.get(trace_key) {
            Some(remembered) => Some(remembered.state.clone()),
            None => data.last_zoom.map(|zoom| ViewState {
                zoom,
                ..ViewState::default()
            }),
        }
    }

    pub fn remember(&mut self, trace_key: &str, state: ViewState) {
        let data = self.latest();
        data.save_counter += 1;
        data.last_zoom = Some(state.zoom);
        data.traces.insert(
            trace_key.to_string(),
            RememberedView {
                state,
                saved_at: data.save_counter,
            },
        );

        while data.traces.len() > MAX_REMEMBERED_TRACES {
            let oldest = data
                .traces
                .iter()
                .min_by_key(|(_, view)| view.saved_at)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => data.traces.remove(&key),
                None => break,
            };
        }
    }
}

/// Location of the persistent data file.
#[derive(Debug, Clone)]
pub struct PersistentStorage {
    folder: PathBuf,
}

impl PersistentStorage {
    pub fn new(folder: impl Into<PathBuf>) -> PersistentStorage {
        PersistentStorage {
            folder: folder.into(),
        }
    }

    /// The platform data directory, e.g. `~/.local/share/traceview` on Linux.
    pub fn default_location() -> Result<PersistentStorage> {
        let dirs = directories::ProjectDirs::from("org", "traceview", "traceview")
            .ok_or_else(|| anyhow!("no home directory, cannot store persistent data"))?;
        Ok(PersistentStorage::new(dirs.data_dir()))
    }

    pub fn save(&self, data: &PersistentData) -> Result<()> {
        let persistent_data_file = self.persistent_data_file_path();
        tracing::debug!(
            "Writing persistent data to {}",
            persistent_data_file.display()
        );

        // Create the directory if it doesn't exist
        std::fs::create_dir_all(&self.folder)?;

        // First write the data to a temporary file
        let write_file_path = self.temporary_write_file_path();
        let mut file = std::fs::File::create(&write_file_path)?;
        serde_json::to_writer_pretty(&mut file, &data)?;
        file.sync_all()?;

        // Then move the temporary file to the final location
        // Makes things more robust against crashes
        std::fs::rename(&write_file_path, persistent_data_file)?;

        Ok(())
    }

    pub fn load(&self) -> Result<PersistentData> {
        let path = self.persistent_data_file_path();
        tracing::debug!("Reading persistent data from {}", path.display());
        if !path.try_exists()? {
            tracing::info!("No persistent data found, using defaults");
            return Ok(PersistentData::default());
        }
        let file = std::fs::File::open(&path)?;
        let data: PersistentData = serde_json::from_reader(file)?;
        Ok(data)
    }

    fn persistent_data_file_path(&self) -> PathBuf {
        self.folder.join("persistent_data.json")
    }

    fn temporary_write_file_path(&self) -> PathBuf {
        let random_number: u64 = rand::random();
        self.folder
            .join(format!("temporary_persistent_data{}.json", random_number))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let storage = PersistentStorage::new(dir.path().join("nested"));

        let mut data = storage.load().unwrap();
        assert!(data.view_state("trace").is_none());

        data.remember(
            "trace",
            ViewState {
                zoom: 2.5,
                collapsed: BTreeSet::from(["a".to_string()]),
            },
        );
        storage.save(&data).unwrap();

        let loaded = storage.load().unwrap();
        let state = loaded.view_state("trace").unwrap();
        assert_eq!(state.zoom, 2.5);
        assert!(state.collapsed.contains("a"));

        // Unknown traces start with the last zoom and nothing collapsed
        let other = loaded.view_state("other").unwrap();
        assert_eq!(other.zoom, 2.5);
        assert!(other.collapsed.is_empty());
    }

    #[test]
    fn oldest_traces_are_forgotten() {
        let mut data = PersistentData::default();
        for i in 0..(MAX_REMEMBERED_TRACES + 5) {
            data.remember(&format!("trace-{i}"), ViewState::default());
        }
        assert!(data.view_state("trace-0").unwrap().collapsed.is_empty());
        let PersistentData::V1(inner) = &data;
        assert_eq!(inner.traces.len(), MAX_REMEMBERED_TRACES);
        assert!(!inner.traces.contains_key("trace-0"));
        assert!(inner.traces.contains_key(&format!("trace-{}", MAX_REMEMBERED_TRACES + 4)));
    }
}
