use std::process::Command;

pub trait Notifier: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, summary: &str, body: &str) {
        log::info!("{}: {}", summary, body);
    }
}

/// Desktop notification through `notify-send`, logged when unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, summary: &str, body: &str) {
        let sent = Command::new("notify-send")
            .args(["--app-name=Bing Wallpaper", summary, body])
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        if !sent {
            log::debug!("notify-send unavailable, logging notification instead");
            LogNotifier.notify(summary, body);
        }
    }
}
