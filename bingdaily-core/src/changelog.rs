use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::http::HttpClient;

pub const RELEASES_URL: &str = "https://api.github.com/repos/neffo/bing-wallpaper-gnome-extension/releases/tags";

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    body: String,
}

pub fn changelog_url(version: &str) -> String {
    format!("{}/v{}", RELEASES_URL, version.trim_start_matches('v'))
}

/// Release notes for `version`.
pub fn fetch_changelog(http: &dyn HttpClient, version: &str) -> Result<String> {
    let url = changelog_url(version);
    let response = http.get(&url).with_context(|| format!("Failed to request {}", url))?;
    if response.status != 200 {
        bail!("HTTP {} while fetching release notes for v{}", response.status, version);
    }

    let text = response.text()?;
    let release: Release = serde_json::from_str(&text).context("Invalid release document")?;
    Ok(release.body)
}
