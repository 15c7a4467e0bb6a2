use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::ParseError;
use crate::resolution::select_resolution;

pub const BING_URL: &str = "https://www.bing.com";

fn default_wp() -> bool {
    true
}

/// One entry of the `images` array of the metadata document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BingImage {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub urlbase: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub copyrightlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub startdate: String,
    #[serde(default)]
    pub fullstartdate: String,
    #[serde(default = "default_wp")]
    pub wp: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketInfo {
    #[serde(default)]
    pub mkt: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BingResponse {
    #[serde(default)]
    pub market: Option<MarketInfo>,
    #[serde(default)]
    pub images: Vec<BingImage>,
}

impl BingResponse {
    pub fn market_code(&self) -> Option<&str> {
        self.market.as_ref().map(|m| m.mkt.as_str())
    }
}

/// Canonical, immutable description of one day's wallpaper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WallpaperRecord {
    pub market: String,
    pub start_date: String,
    pub full_start_date: String,
    pub title: String,
    pub copyright_text: String,
    pub copyright_link: String,
    /// Resolution independent remote path, used as identity key.
    pub image_url_base: String,
    pub resolved_url: String,
    pub resolution: String,
    pub is_wallpaper_eligible: bool,
}

impl WallpaperRecord {
    pub fn from_image(image: &BingImage, market: &str, preferred: &str, screen: Option<(u32, u32)>) -> Self {
        let (title, copyright_text) = match split_title_and_copyright(&image.copyright) {
            Ok(parts) => parts,
            Err(e) => {
                log::debug!("{}, keeping raw copyright", e);
                (image.copyright.trim().to_string(), image.copyright.trim().to_string())
            }
        };

        let image_url_base = if image.urlbase.is_empty() {
            strip_resolution_suffix(&image.url)
        } else {
            image.urlbase.clone()
        };
        let resolution = select_resolution(preferred, screen, image.wp);

        Self {
            market: market.to_string(),
            start_date: image.startdate.clone(),
            full_start_date: image.fullstartdate.clone(),
            title,
            copyright_text,
            copyright_link: absolute_url(&image.copyrightlink),
            resolved_url: format!("{}_{}.jpg", absolute_url(&image_url_base), resolution),
            image_url_base,
            resolution: resolution.to_string(),
            is_wallpaper_eligible: image.wp,
        }
    }

    /// `{dir}/{startDate}-{basename(resolvedUrl)}`
    pub fn local_filename(&self, download_dir: &Path) -> PathBuf {
        download_dir.join(format!("{}-{}", self.start_date, remote_basename(&self.resolved_url)))
    }
}

fn absolute_url(url: &str) -> String {
    if url.is_empty() || url.starts_with("http") {
        url.to_string()
    } else {
        format!("{}{}", BING_URL, url)
    }
}

// "/th?id=OHR.Foo_EN-US123_1920x1080.jpg&rf=..." -> "/th?id=OHR.Foo_EN-US123"
fn strip_resolution_suffix(url: &str) -> String {
    let path = url.split('&').next().unwrap_or(url);
    match path.rfind('_') {
        Some(idx) if path.ends_with(".jpg") => path[..idx].to_string(),
        _ => path.to_string(),
    }
}

/// Filesystem friendly last segment of a remote image URL.
pub fn remote_basename(url: &str) -> String {
    let last = url.rsplit('/').next().unwrap_or(url);
    let last = last.strip_prefix("th?id=").unwrap_or(last);
    let last = last.split('&').next().unwrap_or(last);
    let last = last.strip_prefix("OHR.").unwrap_or(last);
    sanitize_filename(last)
}

pub fn sanitize_filename(filename: &str) -> String {
    let sanitized = filename
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect::<String>();

    if sanitized.chars().count() > 100 {
        sanitized.chars().take(100).collect()
    } else {
        sanitized
    }
}

fn parenthetical_group() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[(（]([^)）]*)[)）]").expect("literal pattern"))
}

fn parenthetical_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*[(（][^)）]*[)）]\s*").expect("literal pattern"))
}

/// Interior of the first parenthetical group.
pub fn parse_copyright(raw: &str) -> Result<String, ParseError> {
    parenthetical_group()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| ParseError::MalformedCopyright(raw.to_string()))
}

/// Raw text with every parenthetical group removed.
pub fn strip_parentheticals(raw: &str) -> String {
    parenthetical_suffix().replace_all(raw, " ").trim().to_string()
}

pub fn split_title_and_copyright(raw: &str) -> Result<(String, String), ParseError> {
    let copyright = parse_copyright(raw)?;
    Ok((strip_parentheticals(raw), copyright))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image() -> BingImage {
        BingImage {
            url: "/th?id=OHR.AbuSimbel_EN-US1234_1920x1080.jpg&rf=LaDigue_1920x1080.jpg&pid=hp".into(),
            urlbase: "/th?id=OHR.AbuSimbel_EN-US1234".into(),
            copyright: "Abu Simbel (© Getty Images)".into(),
            copyrightlink: "https://www.bing.com/search?q=abu+simbel".into(),
            title: "Info".into(),
            startdate: "20170804".into(),
            fullstartdate: "201708041400".into(),
            wp: true,
        }
    }

    #[test]
    fn title_and_copyright_are_split() {
        let (title, copyright) = split_title_and_copyright("Abu Simbel (© Getty Images)").unwrap();
        assert_eq!(title, "Abu Simbel");
        assert_eq!(copyright, "© Getty Images");
    }

    #[test]
    fn full_width_parentheses_are_recognised() {
        let (title, copyright) = split_title_and_copyright("阿布辛拜勒神庙 （© Getty Images）").unwrap();
        assert_eq!(title, "阿布辛拜勒神庙");
        assert_eq!(copyright, "© Getty Images");
    }

    #[test]
    fn missing_parenthetical_is_malformed() {
        assert_eq!(
            parse_copyright("Abu Simbel"),
            Err(ParseError::MalformedCopyright("Abu Simbel".into()))
        );
    }

    #[test]
    fn malformed_copyright_keeps_raw_text() {
        let mut img = image();
        img.copyright = "Just a title".into();
        let record = WallpaperRecord::from_image(&img, "en-US", "UHD", None);
        assert_eq!(record.title, "Just a title");
        assert_eq!(record.copyright_text, "Just a title");
    }

    #[test]
    fn record_is_normalised() {
        let record = WallpaperRecord::from_image(&image(), "en-US", "UHD", None);
        assert_eq!(record.title, "Abu Simbel");
        assert_eq!(record.copyright_text, "© Getty Images");
        assert_eq!(record.image_url_base, "/th?id=OHR.AbuSimbel_EN-US1234");
        assert_eq!(record.resolved_url, "https://www.bing.com/th?id=OHR.AbuSimbel_EN-US1234_UHD.jpg");
        assert_eq!(record.resolution, "UHD");
    }

    #[test]
    fn ineligible_record_uses_safe_resolution() {
        let mut img = image();
        img.wp = false;
        let record = WallpaperRecord::from_image(&img, "en-US", "UHD", None);
        assert_eq!(record.resolution, "1920x1080");
        assert!(record.resolved_url.ends_with("_1920x1080.jpg"));
        assert!(!record.is_wallpaper_eligible);
    }

    #[test]
    fn urlbase_is_derived_when_missing() {
        let mut img = image();
        img.urlbase.clear();
        let record = WallpaperRecord::from_image(&img, "en-US", "1366x768", None);
        assert_eq!(record.image_url_base, "/th?id=OHR.AbuSimbel_EN-US1234");
        assert!(record.resolved_url.ends_with("AbuSimbel_EN-US1234_1366x768.jpg"));
    }

    #[test]
    fn local_filename_is_deterministic() {
        let record = WallpaperRecord::from_image(&image(), "en-US", "UHD", None);
        let dir = Path::new("/tmp/wall");
        let first = record.local_filename(dir);
        assert_eq!(first, record.local_filename(dir));
        assert_eq!(first, PathBuf::from("/tmp/wall/20170804-AbuSimbel_EN-US1234_UHD.jpg"));
    }

    #[test]
    fn document_parses_with_missing_fields() {
        let doc: BingResponse = serde_json::from_str(
            r#"{"market":{"mkt":"en-US"},"images":[{"url":"/a.jpg","startdate":"20240101"}]}"#,
        )
        .unwrap();
        assert_eq!(doc.market_code(), Some("en-US"));
        assert!(doc.images[0].wp);
        assert!(doc.images[0].copyright.is_empty());
    }
}
