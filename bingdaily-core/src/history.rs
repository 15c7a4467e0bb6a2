use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::settings::{SettingsStore, KEY_FAVOURITES, KEY_PREVIOUS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub filename: String,
    pub favourite: bool,
}

impl HistoryEntry {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            favourite: false,
        }
    }
}

/// What happens to files whose entries drop out of the history.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionPolicy {
    pub delete_evicted: bool,
    /// Keep the files of favourite entries even when deleting evicted ones.
    pub skip_favourites: bool,
}

/// Downloaded images, oldest first.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(settings: &dyn SettingsStore) -> Self {
        let favourites = settings.get_string(KEY_FAVOURITES);
        let favourites: Vec<&str> = split_list(&favourites).collect();

        let entries = split_list(&settings.get_string(KEY_PREVIOUS))
            .map(|filename| HistoryEntry {
                filename: filename.to_string(),
                favourite: favourites.contains(&filename),
            })
            .collect();
        Self { entries }
    }

    pub fn save(&self, settings: &mut dyn SettingsStore) -> Result<()> {
        let previous: Vec<&str> = self.entries.iter().map(|e| e.filename.as_str()).collect();
        let favourites: Vec<&str> = self
            .entries
            .iter()
            .filter(|e| e.favourite)
            .map(|e| e.filename.as_str())
            .collect();
        settings.set_string(KEY_PREVIOUS, &previous.join(","))?;
        settings.set_string(KEY_FAVOURITES, &favourites.join(","))?;
        Ok(())
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.iter().any(|e| e.filename == filename)
    }

    /// Returns false when `filename` is not in the history.
    pub fn set_favourite(&mut self, filename: &str, favourite: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.filename == filename) {
            Some(entry) => {
                entry.favourite = favourite;
                true
            }
            None => false,
        }
    }

    /// Appends `filename` and evicts the oldest entries until at most
    /// `max_entries` previous images remain next to the new one.
    ///
    /// Evicted entries are always dropped from the list. Their files are
    /// removed only when `policy.delete_evicted` is set, and favourites are
    /// spared when `policy.skip_favourites` is set. Delete failures are logged.
    pub fn record_and_evict(&mut self, filename: &str, max_entries: usize, policy: EvictionPolicy) -> Vec<HistoryEntry> {
        self.entries.push(HistoryEntry::new(filename));

        let mut evicted = Vec::new();
        while self.entries.len() > max_entries + 1 {
            let entry = self.entries.remove(0);
            if policy.delete_evicted && !(policy.skip_favourites && entry.favourite) {
                delete_evicted_file(&entry.filename);
            }
            evicted.push(entry);
        }
        evicted
    }
}

fn delete_evicted_file(filename: &str) {
    // A later entry may point at the same file; it is gone already or still wanted
    let path = Path::new(filename);
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => log::info!("Deleted evicted image {}", path.display()),
        Err(e) => log::warn!("Failed to delete evicted image {}: {}", path.display(), e),
    }
}
