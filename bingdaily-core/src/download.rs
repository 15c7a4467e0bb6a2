use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::DownloadError;
use crate::history::{EvictionPolicy, History, HistoryEntry};
use crate::http::HttpClient;
use crate::record::WallpaperRecord;

const CHUNK_SIZE: usize = 64 * 1024;

/// Shared flag aborting in-flight transfers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// A non-empty file was already present.
    CacheHit(PathBuf),
    Downloaded(PathBuf),
}

impl DownloadOutcome {
    pub fn path(&self) -> &Path {
        match self {
            DownloadOutcome::CacheHit(path) | DownloadOutcome::Downloaded(path) => path,
        }
    }
}

// Removes the in-progress file on drop unless it was moved into place
struct PartialFile {
    path: PathBuf,
    complete: bool,
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.complete {
            remove_partial(&self.path);
        }
    }
}

fn remove_partial(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed partial download {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => log::error!("Failed to remove partial download {}: {}", path.display(), e),
    }
}

// Transfers land next to the target and are renamed onto it once complete,
// so the target path only ever holds a whole image.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

fn is_complete_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

pub struct ImageHistoryManager {
    http: Arc<dyn HttpClient>,
    download_dir: PathBuf,
}

impl ImageHistoryManager {
    pub fn new(http: Arc<dyn HttpClient>, download_dir: &Path) -> Self {
        Self {
            http,
            download_dir: download_dir.to_path_buf(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    pub fn local_path(&self, record: &WallpaperRecord) -> PathBuf {
        record.local_filename(&self.download_dir)
    }

    /// Makes sure the record's image exists locally. Never re-downloads a
    /// present non-empty file and never leaves a partial file behind.
    pub fn ensure_downloaded(&self, record: &WallpaperRecord, cancel: &CancelToken) -> Result<DownloadOutcome, DownloadError> {
        let path = self.local_path(record);
        if is_complete_file(&path) {
            log::info!("Image already present: {}", path.display());
            return Ok(DownloadOutcome::CacheHit(path));
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        log::info!("Downloading {} to {}", record.resolved_url, path.display());
        let response = match self.http.get(&record.resolved_url) {
            Ok(response) => response,
            Err(e) => {
                remove_partial(&path);
                return Err(e.into());
            }
        };
        if response.status != 200 {
            remove_partial(&path);
            return Err(DownloadError::Network(format!(
                "HTTP {} from {}",
                response.status, record.resolved_url
            )));
        }

        let mut guard = PartialFile {
            path: part_path(&path),
            complete: false,
        };
        let written = stream_to_file(response.body, &guard.path, cancel)?;
        if written == 0 {
            return Err(DownloadError::Network(format!("empty body from {}", record.resolved_url)));
        }
        fs::rename(&guard.path, &path)?;
        guard.complete = true;

        log::info!("Downloaded {} bytes to {}", written, path.display());
        Ok(DownloadOutcome::Downloaded(path))
    }

    /// Appends `filename` to `history` and evicts beyond `max_entries`.
    pub fn record_and_evict(
        &self,
        history: &mut History,
        filename: &str,
        max_entries: usize,
        policy: EvictionPolicy,
    ) -> Vec<HistoryEntry> {
        let evicted = history.record_and_evict(filename, max_entries, policy);
        if !evicted.is_empty() {
            log::info!("Evicted {} image(s) from history", evicted.len());
        }
        evicted
    }
}

fn stream_to_file(mut body: Box<dyn Read + Send>, path: &Path, cancel: &CancelToken) -> Result<u64, DownloadError> {
    let mut file = File::create(path)?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        let n = match body.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(DownloadError::Network(e.to_string())),
        };
        file.write_all(&buf[..n])?;
        written += n as u64;
    }

    file.flush()?;
    file.sync_all()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;
    use crate::http::testing::ScriptedClient;
    use crate::http::HttpResponse;
    use tempfile::TempDir;

    fn record() -> WallpaperRecord {
        WallpaperRecord {
            market: "en-US".into(),
            start_date: "20170804".into(),
            full_start_date: "201708041400".into(),
            title: "Abu Simbel".into(),
            copyright_text: "© Getty Images".into(),
            copyright_link: String::new(),
            image_url_base: "/th?id=OHR.AbuSimbel_EN-US1".into(),
            resolved_url: "https://www.bing.com/th?id=OHR.AbuSimbel_EN-US1_UHD.jpg".into(),
            resolution: "UHD".into(),
            is_wallpaper_eligible: true,
        }
    }

    #[test]
    fn downloads_into_deterministic_path() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("walls");
        let client = Arc::new(ScriptedClient::new().respond(200, vec![7u8; 200_000]));
        let manager = ImageHistoryManager::new(client.clone(), &target);

        let outcome = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap();

        let expected = target.join("20170804-AbuSimbel_EN-US1_UHD.jpg");
        assert_eq!(outcome, DownloadOutcome::Downloaded(expected.clone()));
        assert_eq!(fs::metadata(&expected).unwrap().len(), 200_000);
        assert_eq!(client.urls(), vec![record().resolved_url]);
    }

    #[test]
    fn second_call_is_a_cache_hit_without_network() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().respond(200, "jpeg"));
        let manager = ImageHistoryManager::new(client.clone(), dir.path());

        manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap();
        let second = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap();

        assert!(matches!(second, DownloadOutcome::CacheHit(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn zero_byte_file_is_downloaded_again() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().respond(200, "jpeg"));
        let manager = ImageHistoryManager::new(client.clone(), dir.path());
        fs::write(manager.local_path(&record()), b"").unwrap();

        let outcome = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap();

        assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
        assert_eq!(client.call_count(), 1);
        assert_eq!(fs::read(outcome.path()).unwrap(), b"jpeg");
    }

    #[test]
    fn failed_status_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().respond(404, "missing"));
        let manager = ImageHistoryManager::new(client, dir.path());
        let path = manager.local_path(&record());
        fs::write(&path, b"").unwrap();

        let err = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
        assert!(!path.exists());
    }

    #[test]
    fn empty_body_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().respond(200, Vec::new()));
        let manager = ImageHistoryManager::new(client, dir.path());

        let err = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
        assert!(!manager.local_path(&record()).exists());
    }

    #[test]
    fn cancelled_transfer_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().respond(200, vec![1u8; 10]));
        let manager = ImageHistoryManager::new(client, dir.path());
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = manager.ensure_downloaded(&record(), &cancel).unwrap_err();

        assert!(matches!(err, DownloadError::Cancelled));
        assert!(!manager.local_path(&record()).exists());
    }

    // Yields one chunk per read and notes whether the target existed meanwhile
    struct WatchedBody {
        target: PathBuf,
        chunks: Vec<&'static [u8]>,
        seen: Arc<std::sync::Mutex<Vec<(bool, bool)>>>,
    }

    impl Read for WatchedBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.seen
                .lock()
                .unwrap()
                .push((self.target.exists(), part_path(&self.target).exists()));
            if self.chunks.is_empty() {
                return Ok(0);
            }
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            Ok(chunk.len())
        }
    }

    #[test]
    fn target_only_appears_once_complete() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("20170804-AbuSimbel_EN-US1_UHD.jpg");
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let body = WatchedBody {
            target: target.clone(),
            chunks: vec![&b"jp"[..], &b"eg"[..]],
            seen: seen.clone(),
        };
        let client = Arc::new(ScriptedClient::new().respond_stream(200, body));
        let manager = ImageHistoryManager::new(client, dir.path());

        let outcome = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap();

        assert_eq!(outcome, DownloadOutcome::Downloaded(target.clone()));
        assert_eq!(seen.lock().unwrap().clone(), vec![(false, true), (false, true), (false, true)]);
        assert_eq!(fs::read(&target).unwrap(), b"jpeg");
        assert!(!part_path(&target).exists());
    }

    #[test]
    fn stale_part_file_is_not_a_cache_hit() {
        let dir = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new().respond(200, "jpeg"));
        let manager = ImageHistoryManager::new(client.clone(), dir.path());
        let target = manager.local_path(&record());
        fs::write(part_path(&target), b"ha").unwrap();

        let outcome = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap();

        assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
        assert_eq!(client.call_count(), 1);
        assert_eq!(fs::read(&target).unwrap(), b"jpeg");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    struct BrokenBody {
        sent: bool,
    }

    impl Read for BrokenBody {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.sent {
                return Err(std::io::Error::new(ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            buf[..4].copy_from_slice(b"half");
            Ok(4)
        }
    }

    struct BrokenClient;

    impl HttpClient for BrokenClient {
        fn get(&self, _url: &str) -> Result<HttpResponse, HttpError> {
            Ok(HttpResponse::new(200, Box::new(BrokenBody { sent: false })))
        }
    }

    #[test]
    fn truncated_transfer_leaves_no_file() {
        let dir = TempDir::new().unwrap();
        let manager = ImageHistoryManager::new(Arc::new(BrokenClient), dir.path());

        let err = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn transport_error_is_network() {
        let dir = TempDir::new().unwrap();
        let manager = ImageHistoryManager::new(Arc::new(ScriptedClient::new()), dir.path());

        let err = manager.ensure_downloaded(&record(), &CancelToken::new()).unwrap_err();

        assert!(matches!(err, DownloadError::Network(_)));
    }
}
