use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const KEY_MARKET: &str = "market";
pub const KEY_RESOLUTION: &str = "resolution";
pub const KEY_DOWNLOAD_FOLDER: &str = "download-folder";
pub const KEY_PREVIOUS: &str = "previous";
pub const KEY_PREVIOUS_DAYS: &str = "previous-days";
pub const KEY_DELETE_PREVIOUS: &str = "delete-previous";
pub const KEY_SKIP_FAVOURITES: &str = "skip-favourites";
pub const KEY_FAVOURITES: &str = "favourites";
pub const KEY_NOTIFY: &str = "notify";
pub const KEY_SET_BACKGROUND: &str = "set-background";
pub const KEY_SET_LOCK_SCREEN: &str = "set-lock-screen";
pub const KEY_REQUEST_TIMEOUT: &str = "request-timeout";

pub const DEFAULTS: [(&str, &str); 12] = [
    (KEY_MARKET, "en-US"),
    (KEY_RESOLUTION, "auto"),
    (KEY_DOWNLOAD_FOLDER, ""),
    (KEY_PREVIOUS, ""),
    (KEY_PREVIOUS_DAYS, "8"),
    (KEY_DELETE_PREVIOUS, "true"),
    (KEY_SKIP_FAVOURITES, "true"),
    (KEY_FAVOURITES, ""),
    (KEY_NOTIFY, "true"),
    (KEY_SET_BACKGROUND, "true"),
    (KEY_SET_LOCK_SCREEN, "false"),
    (KEY_REQUEST_TIMEOUT, "30"),
];

pub fn default_value(key: &str) -> Option<&'static str> {
    DEFAULTS.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Typed key/value store. A single writer is assumed: callers read, modify
/// and write back while holding exclusive access to the store.
pub trait SettingsStore: Send {
    fn get_string(&self, key: &str) -> String;
    fn set_string(&mut self, key: &str, value: &str) -> Result<()>;

    fn get_int(&self, key: &str) -> i64 {
        let raw = self.get_string(key);
        raw.trim().parse().unwrap_or_else(|_| {
            default_value(key).and_then(|d| d.parse().ok()).unwrap_or(0)
        })
    }

    fn set_int(&mut self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string())
    }

    fn get_bool(&self, key: &str) -> bool {
        match self.get_string(key).trim() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default_value(key) == Some("true"),
        }
    }

    fn set_bool(&mut self, key: &str, value: bool) -> Result<()> {
        self.set_string(key, if value { "true" } else { "false" })
    }
}

/// Settings persisted as `key|value` lines.
#[derive(Debug, Clone)]
pub struct ConfStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl ConfStore {
    pub fn open(path: &Path) -> Result<Self> {
        let mut values = BTreeMap::new();
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            for line in content.lines() {
                if let Some((key, value)) = line.split_once('|') {
                    values.insert(key.trim().to_string(), value.to_string());
                }
            }
        }
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every known key with its effective value, defaults included.
    pub fn all(&self) -> Vec<(String, String)> {
        let mut merged: BTreeMap<String, String> = DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        merged.extend(self.values.clone());
        merged.into_iter().collect()
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut content = String::new();
        for (key, value) in &self.values {
            content.push_str(&format!("{}|{}\n", key, value));
        }
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))?;
        Ok(())
    }
}

impl SettingsStore for ConfStore {
    fn get_string(&self, key: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .or_else(|| default_value(key).map(str::to_string))
            .unwrap_or_default()
    }

    fn set_string(&mut self, key: &str, value: &str) -> Result<()> {
        if value.contains('\n') {
            anyhow::bail!("Setting values cannot span lines: {}", key);
        }
        self.values.insert(key.to_string(), value.to_string());
        self.save()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub config_dir: PathBuf,
    pub settings_file: PathBuf,
    pub marketcodes_file: PathBuf,
}

impl Config {
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "bingdaily", "bingdaily")
            .context("Failed to get project directories")?;
        Self::with_config_dir(proj_dirs.config_dir())
    }

    pub fn with_config_dir(config_dir: &Path) -> Result<Self> {
        fs::create_dir_all(config_dir)
            .with_context(|| format!("Failed to create {}", config_dir.display()))?;

        Ok(Config {
            config_dir: config_dir.to_path_buf(),
            settings_file: config_dir.join("settings.conf"),
            marketcodes_file: config_dir.join("marketcodes.conf"),
        })
    }

    pub fn open_settings(&self) -> Result<ConfStore> {
        ConfStore::open(&self.settings_file)
    }
}

/// Folder images are downloaded into: the `download-folder` setting, or
/// `BingWallpaper` under the user's pictures folder.
pub fn download_dir(settings: &dyn SettingsStore) -> PathBuf {
    let configured = settings.get_string(KEY_DOWNLOAD_FOLDER);
    if !configured.trim().is_empty() {
        return PathBuf::from(configured.trim());
    }

    let pictures = UserDirs::new()
        .and_then(|dirs| dirs.picture_dir().map(Path::to_path_buf))
        .or_else(|| UserDirs::new().map(|dirs| dirs.home_dir().join("Pictures")))
        .unwrap_or_else(|| PathBuf::from("."));
    pictures.join("BingWallpaper")
}
