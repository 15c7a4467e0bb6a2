use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::download::{CancelToken, DownloadOutcome, ImageHistoryManager};
use crate::error::{DownloadError, FetchError};
use crate::fetcher::{MetadataFetcher, ResolutionRequest, METADATA_ENDPOINT};
use crate::history::{EvictionPolicy, History, HistoryEntry};
use crate::http::HttpClient;
use crate::notify::{LogNotifier, Notifier};
use crate::record::WallpaperRecord;
use crate::resolution::ScreenSizeProvider;
use crate::schedule::{next_refresh_delay, retry_delay};
use crate::settings::{self, SettingsStore};
use crate::wallpaper::{BackgroundIntent, BackgroundSink};

#[derive(Debug)]
pub enum RefreshOutcome {
    Updated {
        record: WallpaperRecord,
        path: PathBuf,
        evicted: Vec<HistoryEntry>,
    },
    CacheHit {
        record: WallpaperRecord,
        path: PathBuf,
    },
    NoImageAvailable,
    FetchFailed(FetchError),
    DownloadFailed {
        record: WallpaperRecord,
        error: DownloadError,
    },
}

#[derive(Debug)]
pub struct RefreshReport {
    pub outcome: RefreshOutcome,
    pub next_delay: Duration,
}

// Snapshot of the settings one cycle needs
struct CycleSettings {
    market: String,
    resolution: String,
    download_dir: PathBuf,
    max_entries: usize,
    policy: EvictionPolicy,
    notify: bool,
    set_background: bool,
    set_lock_screen: bool,
}

impl CycleSettings {
    fn read(store: &dyn SettingsStore) -> Self {
        Self {
            market: store.get_string(settings::KEY_MARKET),
            resolution: store.get_string(settings::KEY_RESOLUTION),
            download_dir: settings::download_dir(store),
            max_entries: store.get_int(settings::KEY_PREVIOUS_DAYS).max(0) as usize,
            policy: EvictionPolicy {
                delete_evicted: store.get_bool(settings::KEY_DELETE_PREVIOUS),
                skip_favourites: store.get_bool(settings::KEY_SKIP_FAVOURITES),
            },
            notify: store.get_bool(settings::KEY_NOTIFY),
            set_background: store.get_bool(settings::KEY_SET_BACKGROUND),
            set_lock_screen: store.get_bool(settings::KEY_SET_LOCK_SCREEN),
        }
    }
}

// Clears the pending flag when the cycle ends, however it ends
struct PendingGuard<'a>(&'a AtomicBool);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Everything one refresh cycle needs, passed explicitly instead of living
/// in globals. The settings store is only mutated on the active cycle's
/// completion path, under its mutex.
pub struct Refresher {
    http: Arc<dyn HttpClient>,
    settings: Mutex<Box<dyn SettingsStore>>,
    sink: Box<dyn BackgroundSink>,
    notifier: Box<dyn Notifier>,
    screen: Option<Box<dyn ScreenSizeProvider>>,
    endpoint: String,
    update_pending: AtomicBool,
    cancel: CancelToken,
}

impl Refresher {
    pub fn new(http: Arc<dyn HttpClient>, settings: Box<dyn SettingsStore>, sink: Box<dyn BackgroundSink>) -> Self {
        Self {
            http,
            settings: Mutex::new(settings),
            sink,
            notifier: Box::new(LogNotifier),
            screen: None,
            endpoint: METADATA_ENDPOINT.to_string(),
            update_pending: AtomicBool::new(false),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_screen_size_provider(mut self, screen: Box<dyn ScreenSizeProvider>) -> Self {
        self.screen = Some(screen);
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    pub fn is_update_pending(&self) -> bool {
        self.update_pending.load(Ordering::SeqCst)
    }

    /// Aborts the in-flight download, if any. Used on teardown.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Exclusive access to the settings store.
    pub fn settings(&self) -> MutexGuard<'_, Box<dyn SettingsStore>> {
        // A panicked cycle leaves the store itself intact
        self.settings.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn history(&self) -> History {
        History::load(self.settings().as_ref())
    }

    pub fn refresh(&self) -> Option<RefreshReport> {
        self.refresh_at(Utc::now())
    }

    /// Runs one fetch, download, record cycle. Returns `None` without doing
    /// anything when another cycle is still in flight.
    pub fn refresh_at(&self, now: DateTime<Utc>) -> Option<RefreshReport> {
        if self
            .update_pending
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("Update already pending, skipping refresh");
            return None;
        }
        let _pending = PendingGuard(&self.update_pending);

        let cycle = CycleSettings::read(self.settings().as_ref());
        let request = ResolutionRequest {
            preferred: cycle.resolution.clone(),
            screen: self.screen_size(),
        };

        let fetcher = MetadataFetcher::with_endpoint(Arc::clone(&self.http), &self.endpoint);
        let record = match fetcher.fetch(&cycle.market, &request) {
            Ok(record) => record,
            Err(FetchError::NoImageAvailable { full_start_date }) => {
                log::info!("No image available today for {}", cycle.market);
                if cycle.notify {
                    self.notifier.notify("Bing Wallpaper of the Day", "No wallpaper available today");
                }
                let next_delay = match full_start_date {
                    Some(date) => next_refresh_delay(&date, now),
                    None => retry_delay(),
                };
                return Some(RefreshReport {
                    outcome: RefreshOutcome::NoImageAvailable,
                    next_delay,
                });
            }
            Err(e) => {
                log::warn!("Failed to fetch wallpaper metadata: {}", e);
                return Some(RefreshReport {
                    outcome: RefreshOutcome::FetchFailed(e),
                    next_delay: retry_delay(),
                });
            }
        };
        log::info!("Today's wallpaper: {} ({})", record.title, record.copyright_text);

        let manager = ImageHistoryManager::new(Arc::clone(&self.http), &cycle.download_dir);
        let outcome = match manager.ensure_downloaded(&record, &self.cancel) {
            Ok(DownloadOutcome::CacheHit(path)) => {
                self.apply_background(&path, &cycle);
                RefreshOutcome::CacheHit { record, path }
            }
            Ok(DownloadOutcome::Downloaded(path)) => {
                let evicted = self.record_download(&manager, &path, &cycle);
                self.apply_background(&path, &cycle);
                if cycle.notify {
                    self.notifier.notify(&record.title, &record.copyright_text);
                }
                RefreshOutcome::Updated { record, path, evicted }
            }
            Err(error) => {
                log::error!("Failed to download {}: {}", record.resolved_url, error);
                return Some(RefreshReport {
                    outcome: RefreshOutcome::DownloadFailed { record, error },
                    next_delay: retry_delay(),
                });
            }
        };

        let full_start_date = match &outcome {
            RefreshOutcome::Updated { record, .. } | RefreshOutcome::CacheHit { record, .. } => {
                record.full_start_date.clone()
            }
            _ => String::new(),
        };
        Some(RefreshReport {
            outcome,
            next_delay: next_refresh_delay(&full_start_date, now),
        })
    }

    fn screen_size(&self) -> Option<(u32, u32)> {
        let provider = self.screen.as_ref()?;
        match provider.get_screen_size() {
            Ok(size) => Some(size),
            Err(e) => {
                log::debug!("Screen size unavailable: {}", e);
                None
            }
        }
    }

    fn record_download(&self, manager: &ImageHistoryManager, path: &Path, cycle: &CycleSettings) -> Vec<HistoryEntry> {
        let filename = path.to_string_lossy();
        let mut store = self.settings();
        let mut history = History::load(store.as_ref());
        if history.contains(&filename) {
            return Vec::new();
        }

        let evicted = manager.record_and_evict(&mut history, &filename, cycle.max_entries, cycle.policy);
        if let Err(e) = history.save(store.as_mut()) {
            log::error!("Failed to save image history: {}", e);
        }
        evicted
    }

    fn apply_background(&self, path: &Path, cycle: &CycleSettings) {
        let mut intents = Vec::new();
        if cycle.set_background {
            intents.push(BackgroundIntent::Desktop);
        }
        if cycle.set_lock_screen {
            intents.push(BackgroundIntent::LockScreen);
        }

        for intent in intents {
            match self.sink.apply(path, intent) {
                Ok(true) => {}
                Ok(false) => log::warn!("{:?} background was not changed", intent),
                Err(e) => log::error!("Failed to set {:?} background: {}", intent, e),
            }
        }
    }
}
