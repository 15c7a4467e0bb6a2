use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::ParseError;
use crate::refresh::Refresher;

pub const REFRESH_INTERVAL_SECS: i64 = 24 * 60 * 60;
pub const MIN_DELAY_SECS: i64 = 60;
pub const FALLBACK_DELAY_SECS: i64 = 3600;
/// Added after clamping to absorb clock drift against the server.
pub const SAFETY_MARGIN_SECS: i64 = 300;
/// Next attempt after a failed fetch or download.
pub const RETRY_DELAY_SECS: u64 = 3600;

/// Parses `YYYYMMDDHHMM` as UTC.
pub fn parse_full_start_date(value: &str) -> Result<DateTime<Utc>, ParseError> {
    NaiveDateTime::parse_from_str(value.trim(), "%Y%m%d%H%M")
        .map(|naive| naive.and_utc())
        .map_err(|_| ParseError::MalformedDate(value.to_string()))
}

/// Seconds until the record expires, before clamping and margin.
pub fn raw_delay_secs(full_start_date: &str, now: DateTime<Utc>) -> Result<i64, ParseError> {
    let due = parse_full_start_date(full_start_date)? + ChronoDuration::seconds(REFRESH_INTERVAL_SECS);
    Ok((due - now).num_seconds())
}

pub fn clamp_delay_secs(delay: i64) -> i64 {
    if (MIN_DELAY_SECS..=REFRESH_INTERVAL_SECS).contains(&delay) {
        delay
    } else {
        FALLBACK_DELAY_SECS
    }
}

/// Time to wait before the next fetch for a record published at `full_start_date`.
pub fn next_refresh_delay(full_start_date: &str, now: DateTime<Utc>) -> Duration {
    let delay = match raw_delay_secs(full_start_date, now) {
        Ok(delay) => clamp_delay_secs(delay),
        Err(e) => {
            log::warn!("{}, using fallback refresh interval", e);
            FALLBACK_DELAY_SECS
        }
    };
    Duration::from_secs((delay + SAFETY_MARGIN_SECS) as u64)
}

pub fn retry_delay() -> Duration {
    Duration::from_secs(RETRY_DELAY_SECS)
}

enum Command {
    RefreshNow,
    Shutdown,
}

/// Timer thread running one refresh cycle at a time.
pub struct Scheduler {
    refresher: Arc<Refresher>,
    tx: Sender<Command>,
    requested: Arc<AtomicBool>,
    armed: Arc<Mutex<Option<Duration>>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts the timer thread; the first cycle runs immediately.
    pub fn start(refresher: Arc<Refresher>) -> Self {
        let (tx, rx) = mpsc::channel();
        let requested = Arc::new(AtomicBool::new(false));
        let armed = Arc::new(Mutex::new(None));

        let worker = Arc::clone(&refresher);
        let worker_requested = Arc::clone(&requested);
        let worker_armed = Arc::clone(&armed);
        let handle = thread::spawn(move || loop {
            set_armed(&worker_armed, None);
            let delay = match worker.refresh() {
                Some(report) => report.next_delay,
                None => retry_delay(),
            };
            // A request taken up by this cycle is satisfied by it
            worker_requested.store(false, Ordering::SeqCst);
            set_armed(&worker_armed, Some(delay));
            log::info!("Next refresh in {} seconds", delay.as_secs());

            match rx.recv_timeout(delay) {
                Ok(Command::RefreshNow) | Err(RecvTimeoutError::Timeout) => continue,
                Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self {
            refresher,
            tx,
            requested,
            armed,
            handle: Some(handle),
        }
    }

    /// Requests an immediate refresh. A no-op returning false while a cycle
    /// is in flight or another request is already queued.
    pub fn refresh_now(&self) -> bool {
        if self.refresher.is_update_pending() {
            log::info!("Refresh already in progress, ignoring request");
            return false;
        }
        if self
            .requested
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            log::info!("Refresh already requested, ignoring request");
            return false;
        }
        self.tx.send(Command::RefreshNow).is_ok()
    }

    /// Delay the timer is currently waiting out, `None` while a cycle runs.
    pub fn next_delay(&self) -> Option<Duration> {
        *self.armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Aborts any in-flight download and waits for the timer thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.refresher.cancel();
        let _ = self.tx.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Refresh thread panicked");
            }
        }
    }
}

fn set_armed(armed: &Mutex<Option<Duration>>, delay: Option<Duration>) {
    *armed.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = delay;
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}
