use std::io;
use std::process::Command;

pub const AUTO: &str = "auto";
pub const SAFE_RESOLUTION: &str = "1920x1080";
/// Default size of the endpoint; it carries a logo overlay.
pub const LOGO_RESOLUTION: &str = "1920x1200";

pub const RESOLUTIONS: [&str; 8] = [
    AUTO, "UHD", "1920x1200", "1920x1080", "1366x768", "1280x720", "1024x768", "800x600",
];

// Fixed sizes, smallest first
const FIXED_SIZES: [(&str, u32, u32); 6] = [
    ("800x600", 800, 600),
    ("1024x768", 1024, 768),
    ("1280x720", 1280, 720),
    ("1366x768", 1366, 768),
    ("1920x1080", 1920, 1080),
    ("1920x1200", 1920, 1200),
];

pub trait ScreenSizeProvider: Send + Sync {
    fn get_screen_size(&self) -> io::Result<(u32, u32)>;
}

/// Reads the current screen size from `xrandr --current`.
pub struct XrandrScreenSize;

impl ScreenSizeProvider for XrandrScreenSize {
    fn get_screen_size(&self) -> io::Result<(u32, u32)> {
        let output = Command::new("xrandr").arg("--current").output()?;
        if !output.status.success() {
            return Err(io::Error::new(io::ErrorKind::Other, "xrandr exited with an error"));
        }
        parse_xrandr_current(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no current screen size in xrandr output"))
    }
}

// "Screen 0: minimum 8 x 8, current 2560 x 1440, maximum 32767 x 32767"
fn parse_xrandr_current(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().find(|line| line.starts_with("Screen "))?;
    let current = line.split(',').find_map(|part| part.trim().strip_prefix("current "))?;
    let (w, h) = current.split_once(" x ")?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

pub fn is_supported(resolution: &str) -> bool {
    RESOLUTIONS.contains(&resolution)
}

/// Smallest fixed resolution covering the whole screen, `UHD` when the screen
/// is larger than all of them.
pub fn best_fit(width: u32, height: u32) -> &'static str {
    FIXED_SIZES
        .iter()
        .find(|(_, w, h)| *w >= width && *h >= height)
        .map(|(name, _, _)| *name)
        .unwrap_or("UHD")
}

/// Resolution token substituted into the remote image URL.
pub fn select_resolution(preferred: &str, screen: Option<(u32, u32)>, wallpaper_eligible: bool) -> &'static str {
    if !wallpaper_eligible {
        return SAFE_RESOLUTION;
    }

    if preferred == AUTO {
        let fitted = screen.map(|(w, h)| best_fit(w, h)).unwrap_or(SAFE_RESOLUTION);
        if fitted == LOGO_RESOLUTION {
            return SAFE_RESOLUTION;
        }
        return fitted;
    }

    RESOLUTIONS
        .iter()
        .skip(1)
        .find(|r| **r == preferred)
        .copied()
        .unwrap_or(SAFE_RESOLUTION)
}
