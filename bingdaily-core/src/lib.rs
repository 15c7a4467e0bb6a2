//! Daily Bing wallpaper workflow: fetch the day's metadata, download the
//! image once, keep a bounded history of downloaded images and time the next
//! refresh from the record's publication window.

pub mod changelog;
pub mod download;
pub mod error;
pub mod fetcher;
pub mod history;
pub mod http;
pub mod markets;
pub mod notify;
pub mod record;
pub mod refresh;
pub mod resolution;
pub mod schedule;
pub mod settings;
pub mod wallpaper;

pub use download::{CancelToken, DownloadOutcome, ImageHistoryManager};
pub use error::{DownloadError, FetchError, HttpError, ParseError};
pub use fetcher::{MetadataFetcher, ResolutionRequest};
pub use history::{EvictionPolicy, History, HistoryEntry};
pub use http::{AttoHttpClient, HttpClient, HttpResponse};
pub use notify::{DesktopNotifier, LogNotifier, Notifier};
pub use record::WallpaperRecord;
pub use refresh::{RefreshOutcome, RefreshReport, Refresher};
pub use resolution::{ScreenSizeProvider, XrandrScreenSize};
pub use schedule::{next_refresh_delay, Scheduler};
pub use settings::{Config, ConfStore, SettingsStore};
pub use wallpaper::{BackgroundIntent, BackgroundSink, SystemBackground};
