use std::sync::Arc;

use crate::error::FetchError;
use crate::http::HttpClient;
use crate::record::{BingResponse, WallpaperRecord};

pub const METADATA_ENDPOINT: &str = "https://www.bing.com/HPImageArchive.aspx";
/// Worldwide market, used once when the endpoint answers for a different market.
pub const FALLBACK_MARKET: &str = "en-WW";
/// Accepts whatever market the endpoint negotiates.
pub const AUTO_MARKET: &str = "auto";

/// User preferences needed to turn a document into a record.
#[derive(Debug, Clone, Default)]
pub struct ResolutionRequest {
    pub preferred: String,
    pub screen: Option<(u32, u32)>,
}

pub struct MetadataFetcher {
    http: Arc<dyn HttpClient>,
    endpoint: String,
}

impl MetadataFetcher {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self::with_endpoint(http, METADATA_ENDPOINT)
    }

    pub fn with_endpoint(http: Arc<dyn HttpClient>, endpoint: &str) -> Self {
        Self {
            http,
            endpoint: endpoint.to_string(),
        }
    }

    pub fn metadata_url(&self, market: &str) -> String {
        if market == AUTO_MARKET {
            format!("{}?format=js&idx=0&n=1", self.endpoint)
        } else {
            format!("{}?format=js&idx=0&n=1&mkt={}", self.endpoint, market)
        }
    }

    /// Fetches today's record for `market`, retrying once against
    /// [`FALLBACK_MARKET`] when the endpoint reports another market.
    pub fn fetch(&self, market: &str, resolution: &ResolutionRequest) -> Result<WallpaperRecord, FetchError> {
        let mut document = self.request_document(market)?;

        let reported = document.market_code().unwrap_or_default().to_string();
        if market != AUTO_MARKET && !reported.eq_ignore_ascii_case(market) {
            log::warn!(
                "Requested market {} but endpoint answered for {:?}, retrying with {}",
                market, reported, FALLBACK_MARKET
            );
            document = self.request_document(FALLBACK_MARKET)?;
        }

        normalize(document, resolution)
    }

    fn request_document(&self, market: &str) -> Result<BingResponse, FetchError> {
        let url = self.metadata_url(market);
        let response = self.http.get(&url)?;

        match response.status {
            200 => {
                let body = response.text()?;
                Ok(serde_json::from_str(&body)?)
            }
            403 => Err(FetchError::AccessDenied),
            status => Err(FetchError::Network(format!("HTTP {} from {}", status, url))),
        }
    }
}

fn normalize(document: BingResponse, resolution: &ResolutionRequest) -> Result<WallpaperRecord, FetchError> {
    let market = document.market_code().unwrap_or_default().to_string();
    let image = match document.images.first() {
        Some(image) => image,
        None => return Err(FetchError::NoImageAvailable { full_start_date: None }),
    };

    if image.url.is_empty() {
        let full_start_date = Some(image.fullstartdate.clone()).filter(|d| !d.is_empty());
        return Err(FetchError::NoImageAvailable { full_start_date });
    }

    Ok(WallpaperRecord::from_image(image, &market, &resolution.preferred, resolution.screen))
}
