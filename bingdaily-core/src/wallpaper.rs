use anyhow::{anyhow, Result};
use std::path::Path;
use std::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundIntent {
    Desktop,
    LockScreen,
}

/// Receives the image to show once it is on disk.
pub trait BackgroundSink: Send + Sync {
    fn apply(&self, path: &Path, intent: BackgroundIntent) -> Result<bool>;
}

pub fn get_desktop_environment() -> String {
    if let Ok(desktop_session) = std::env::var("DESKTOP_SESSION") {
        let session = desktop_session.to_lowercase();
        if ["gnome", "unity", "cinnamon", "mate", "xfce4", "lxde", "fluxbox",
            "blackbox", "openbox", "icewm", "jwm", "afterstep", "trinity", "kde"].contains(&session.as_str()) {
            return session;
        }

        if session.contains("xfce") || session.starts_with("xubuntu") {
            return "xfce4".to_string();
        } else if session.starts_with("ubuntu") {
            return "gnome".to_string();
        } else if session.starts_with("lubuntu") {
            return "lxde".to_string();
        } else if session.starts_with("kubuntu") {
            return "kde".to_string();
        }
    }

    if std::env::var("KDE_FULL_SESSION").unwrap_or_default() == "true" {
        return "kde".to_string();
    }

    if std::env::var("GNOME_DESKTOP_SESSION_ID").is_ok() {
        return "gnome".to_string();
    }

    "unknown".to_string()
}

/// Applies images through the `wallpaper` crate, falling back to the
/// desktop environment's own tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackground;

impl BackgroundSink for SystemBackground {
    fn apply(&self, path: &Path, intent: BackgroundIntent) -> Result<bool> {
        match intent {
            BackgroundIntent::Desktop => set_desktop_background(path),
            BackgroundIntent::LockScreen => set_lock_screen_background(path),
        }
    }
}

fn set_desktop_background(file_path: &Path) -> Result<bool> {
    let file_loc = file_path.to_string_lossy();
    match wallpaper::set_from_path(&file_loc) {
        Ok(_) => {
            log::info!("Wallpaper set to {}", file_loc);
            Ok(true)
        }
        Err(e) => {
            log::warn!("Failed to set wallpaper through the wallpaper crate: {}", e);
            if cfg!(target_os = "linux") {
                return set_desktop_background_fallback(file_path);
            }
            Ok(false)
        }
    }
}

fn gsettings_set(schema: &str, key: &str, value: &str) -> Result<bool> {
    let output = Command::new("gsettings").args(["set", schema, key, value]).output()?;
    Ok(output.status.success())
}

fn set_lock_screen_background(file_path: &Path) -> Result<bool> {
    let uri = format!("file://{}", file_path.to_string_lossy());
    match get_desktop_environment().as_str() {
        "gnome" | "unity" | "cinnamon" => {
            let ok = gsettings_set("org.gnome.desktop.screensaver", "picture-uri", &uri)?;
            if ok {
                log::info!("Lock screen background set to {}", uri);
            }
            Ok(ok)
        }
        other => Err(anyhow!("Lock screen background not supported on '{}'", other)),
    }
}

fn set_desktop_background_fallback(file_path: &Path) -> Result<bool> {
    let file_loc = file_path.to_string_lossy();
    let desktop_env = get_desktop_environment();

    match desktop_env.as_str() {
        "gnome" | "unity" | "cinnamon" => {
            let uri = format!("file://{}", file_loc);
            let light = gsettings_set("org.gnome.desktop.background", "picture-uri", &uri)?;
            // Dark style reads its own key; older releases don't have it
            let _ = gsettings_set("org.gnome.desktop.background", "picture-uri-dark", &uri);
            Ok(light)
        }
        "mate" => gsettings_set("org.mate.background", "picture-filename", &file_loc),
        "xfce4" => {
            let list_output = Command::new("xfconf-query")
                .args(["-c", "xfce4-desktop", "-l"])
                .output()?;

            if list_output.status.success() {
                let paths = String::from_utf8_lossy(&list_output.stdout);
                for path in paths.lines().filter(|line| line.contains("workspace0/last-image")) {
                    Command::new("xfconf-query")
                        .args(["-c", "xfce4-desktop", "-p", path.trim(), "-s", file_loc.as_ref()])
                        .output()?;
                }
            }

            let output = Command::new("xfdesktop").arg("--reload").output()?;
            Ok(output.status.success())
        }
        "lxde" => {
            let output = Command::new("pcmanfm")
                .arg(format!("--set-wallpaper={}", file_loc))
                .arg("--wallpaper-mode=crop")
                .output()?;
            Ok(output.status.success())
        }
        "fluxbox" | "jwm" | "openbox" | "afterstep" => {
            let output = Command::new("fbsetbg").arg(file_loc.as_ref()).output()?;
            Ok(output.status.success())
        }
        _ => {
            log::error!("Desktop environment '{}' not supported", desktop_env);
            Ok(false)
        }
    }
}
