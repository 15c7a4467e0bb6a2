pub use crate::app::{validate_setting, BingDailyApp};

mod app {
    use anyhow::{bail, Context, Result};
    use bingdaily_core::markets::load_market_codes;
    use bingdaily_core::resolution;
    use bingdaily_core::settings::{self, KEY_REQUEST_TIMEOUT};
    use bingdaily_core::*;
    use rand::seq::SliceRandom;
    use std::io::{self, BufRead, Write};
    use std::path::{Path, PathBuf};
    use std::sync::Arc;
    use std::time::Duration;

    pub struct BingDailyApp {
        config: Config,
        http: Arc<AttoHttpClient>,
        refresher: Arc<Refresher>,
    }

    /// Rejects unknown keys and values the workflow could not use.
    pub fn validate_setting(key: &str, value: &str) -> Result<()> {
        let default = match settings::default_value(key) {
            Some(default) => default,
            None => bail!("Unknown setting '{}'", key),
        };

        if key == settings::KEY_RESOLUTION && !resolution::is_supported(value) {
            bail!("Unsupported resolution '{}', expected one of {:?}", value, resolution::RESOLUTIONS);
        }
        if default.parse::<i64>().is_ok() && value.parse::<u32>().is_err() {
            bail!("Setting '{}' expects a non-negative number", key);
        }
        if matches!(default, "true" | "false") && !matches!(value, "true" | "false") {
            bail!("Setting '{}' expects true or false", key);
        }
        if value.contains(['\n', '|']) {
            bail!("Setting values cannot contain newlines or '|'");
        }
        // Image paths are stored comma-separated in the history
        if key == settings::KEY_DOWNLOAD_FOLDER && value.contains(',') {
            bail!("Download folder cannot contain ','");
        }
        Ok(())
    }

    impl BingDailyApp {
        pub fn new(config_dir: Option<&Path>) -> Result<Self> {
            let config = match config_dir {
                Some(dir) => Config::with_config_dir(dir)?,
                None => Config::new()?,
            };
            let store = config.open_settings()?;

            let timeout = store.get_int(KEY_REQUEST_TIMEOUT).max(1) as u64;
            let http = Arc::new(AttoHttpClient::new(Duration::from_secs(timeout)));

            let refresher = Refresher::new(http.clone(), Box::new(store), Box::new(SystemBackground))
                .with_notifier(Box::new(DesktopNotifier))
                .with_screen_size_provider(Box::new(XrandrScreenSize));

            Ok(Self {
                config,
                http,
                refresher: Arc::new(refresher),
            })
        }

        pub fn refresh_once(&self) -> Result<()> {
            match self.refresher.refresh() {
                Some(report) => {
                    print_report(&report);
                    match report.outcome {
                        RefreshOutcome::FetchFailed(e) => Err(e.into()),
                        RefreshOutcome::DownloadFailed { error, .. } => Err(error.into()),
                        _ => Ok(()),
                    }
                }
                None => {
                    println!("A refresh is already in progress");
                    Ok(())
                }
            }
        }

        /// Keeps refreshing on schedule until stdin closes or `q` is entered.
        pub fn run(&self) -> Result<()> {
            let scheduler = Scheduler::start(Arc::clone(&self.refresher));
            println!("Bing wallpaper running. Enter 'r' to refresh now, 'q' to quit.");

            for line in io::stdin().lock().lines() {
                match line?.trim() {
                    "r" => {
                        if !scheduler.refresh_now() {
                            println!("A refresh is already in progress");
                        }
                    }
                    "q" => break,
                    "" => {}
                    other => println!("Unknown command '{}'", other),
                }
            }

            println!("Stopping...");
            scheduler.shutdown();
            log::info!("Scheduler stopped");
            Ok(())
        }

        pub fn show_history(&self) {
            let history = self.refresher.history();
            if history.is_empty() {
                println!("No images downloaded yet.");
                return;
            }
            for (index, entry) in history.entries().iter().enumerate() {
                let marker = if entry.favourite { "*" } else { " " };
                let missing = if Path::new(&entry.filename).exists() { "" } else { " (missing)" };
                println!("{:>3} {} {}{}", index + 1, marker, entry.filename, missing);
            }
        }

        pub fn set_favourite(&self, filename: &str, favourite: bool) -> Result<()> {
            let mut store = self.refresher.settings();
            let mut history = History::load(store.as_ref());

            let resolved = resolve_history_name(&history, filename)
                .with_context(|| format!("'{}' is not in the image history", filename))?;
            history.set_favourite(&resolved, favourite);
            history.save(store.as_mut())?;

            println!("{} {}", if favourite { "Favourited" } else { "Unfavourited" }, resolved);
            Ok(())
        }

        pub fn set_random(&self, favourites_only: bool) -> Result<bool> {
            let history = self.refresher.history();
            let candidates: Vec<&HistoryEntry> = history
                .entries()
                .iter()
                .filter(|e| !favourites_only || e.favourite)
                .filter(|e| Path::new(&e.filename).exists())
                .collect();

            let entry = match candidates.choose(&mut rand::thread_rng()) {
                Some(entry) => entry,
                None => {
                    println!("No downloaded images to choose from.");
                    return Ok(false);
                }
            };

            let path = PathBuf::from(&entry.filename);
            let applied = SystemBackground.apply(&path, BackgroundIntent::Desktop)?;
            if applied {
                println!("Set wallpaper: {}", path.display());
            }
            Ok(applied)
        }

        pub fn get(&self, key: Option<&str>) -> Result<()> {
            let store = self.config.open_settings()?;
            match key {
                Some(key) => {
                    if settings::default_value(key).is_none() {
                        bail!("Unknown setting '{}'", key);
                    }
                    println!("{}", store.get_string(key));
                }
                None => {
                    for (key, value) in store.all() {
                        println!("{} = {}", key, value);
                    }
                }
            }
            Ok(())
        }

        pub fn set(&self, key: &str, value: &str) -> Result<()> {
            validate_setting(key, value)?;
            self.refresher.settings().set_string(key, value)?;
            println!("{} = {}", key, value);
            Ok(())
        }

        pub fn show_markets(&self) {
            let current = self.refresher.settings().get_string(settings::KEY_MARKET);
            for code in load_market_codes(&self.config, self.http.as_ref()) {
                let marker = if code == current { "*" } else { " " };
                println!("{} {}", marker, code);
            }
        }

        pub fn show_changelog(&self, version: &str) -> Result<()> {
            let notes = changelog::fetch_changelog(self.http.as_ref(), version)?;
            let mut out = io::stdout().lock();
            writeln!(out, "{}", notes)?;
            Ok(())
        }
    }

    // Accepts a full path or just the file name
    fn resolve_history_name(history: &History, filename: &str) -> Option<String> {
        history
            .entries()
            .iter()
            .find(|e| {
                e.filename == filename
                    || Path::new(&e.filename).file_name().and_then(|n| n.to_str()) == Some(filename)
            })
            .map(|e| e.filename.clone())
    }

    fn print_report(report: &RefreshReport) {
        match &report.outcome {
            RefreshOutcome::Updated { record, path, evicted } => {
                println!("New wallpaper: {}", record.title);
                println!("  {}", record.copyright_text);
                println!("  saved to {}", path.display());
                for entry in evicted {
                    println!("  evicted {}", entry.filename);
                }
            }
            RefreshOutcome::CacheHit { record, path } => {
                println!("Wallpaper up to date: {} ({})", record.title, path.display());
            }
            RefreshOutcome::NoImageAvailable => println!("No wallpaper available today."),
            RefreshOutcome::FetchFailed(e) => println!("Fetching metadata failed: {}", e),
            RefreshOutcome::DownloadFailed { record, error } => {
                println!("Downloading {} failed: {}", record.resolved_url, error)
            }
        }
        println!("Next refresh in {}", format_delay(report.next_delay));
    }

    pub(crate) fn format_delay(delay: Duration) -> String {
        let secs = delay.as_secs();
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    }
}
