use anyhow::{anyhow, bail, Context, Result};
use std::fs;

use crate::http::HttpClient;
use crate::settings::Config;

pub const MARKET_CODES_URL: &str =
    "https://learn.microsoft.com/en-us/bing/search-apis/bing-web-search/reference/market-codes";

/// Used when the published table cannot be fetched.
pub const FALLBACK_MARKETS: [&str; 12] = [
    "auto", "en-US", "en-GB", "en-AU", "en-CA", "en-IN", "en-WW", "de-DE", "fr-FR", "ja-JP", "zh-CN", "pt-BR",
];

pub fn parse_market_codes(html: &str) -> Result<Vec<String>> {
    let document = scraper::Html::parse_document(html);
    let table_selector = scraper::Selector::parse("table").map_err(|e| anyhow!("Invalid selector: {:?}", e))?;
    let row_selector = scraper::Selector::parse("tr").map_err(|e| anyhow!("Invalid selector: {:?}", e))?;
    let cell_selector = scraper::Selector::parse("td").map_err(|e| anyhow!("Invalid selector: {:?}", e))?;

    let mut market_codes = Vec::new();
    for table in document.select(&table_selector) {
        for row in table.select(&row_selector) {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            if cells.len() < 2 {
                continue;
            }
            if let Some(cell) = cells.last() {
                let code = cell.text().collect::<String>().trim().to_string();
                if code.contains('-') && !market_codes.contains(&code) {
                    market_codes.push(code);
                }
            }
        }
    }
    Ok(market_codes)
}

pub fn get_market_codes(http: &dyn HttpClient) -> Result<Vec<String>> {
    let response = http.get(MARKET_CODES_URL).context("Failed to request market codes")?;
    if response.status != 200 {
        bail!("HTTP {} while fetching market codes", response.status);
    }
    parse_market_codes(&response.text()?)
}

/// Market codes from the local cache, fetching and caching them on first use.
pub fn load_market_codes(config: &Config, http: &dyn HttpClient) -> Vec<String> {
    if let Ok(content) = fs::read_to_string(&config.marketcodes_file) {
        let cached: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if !cached.is_empty() {
            return cached;
        }
    }

    match get_market_codes(http) {
        Ok(codes) if !codes.is_empty() => {
            log::info!("Fetched {} market codes", codes.len());
            if let Err(e) = fs::write(&config.marketcodes_file, codes.join("\n") + "\n") {
                log::error!("Failed to cache market codes in {}: {}", config.marketcodes_file.display(), e);
            }
            codes
        }
        Ok(_) => {
            log::warn!("Market code table was empty, using built-in list");
            FALLBACK_MARKETS.iter().map(|m| m.to_string()).collect()
        }
        Err(e) => {
            log::warn!("Failed to fetch market codes: {}, using built-in list", e);
            FALLBACK_MARKETS.iter().map(|m| m.to_string()).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedClient;
    use tempfile::TempDir;

    const TABLE: &str = r#"<html><body><table>
        <tr><th>Country</th><th>Language</th><th>Market code</th></tr>
        <tr><td>Germany</td><td>German</td><td>de-DE</td></tr>
        <tr><td>United States</td><td>English</td><td>en-US</td></tr>
        <tr><td>Nowhere</td><td>None</td><td>n/a</td></tr>
    </table></body></html>"#;

    #[test]
    fn codes_are_scraped_from_table() {
        assert_eq!(parse_market_codes(TABLE).unwrap(), vec!["de-DE", "en-US"]);
    }

    #[test]
    fn codes_are_cached_after_first_fetch() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_config_dir(dir.path()).unwrap();
        let client = ScriptedClient::new().respond(200, TABLE);

        assert_eq!(load_market_codes(&config, &client), vec!["de-DE", "en-US"]);
        assert_eq!(load_market_codes(&config, &client), vec!["de-DE", "en-US"]);
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn offline_uses_builtin_list() {
        let dir = TempDir::new().unwrap();
        let config = Config::with_config_dir(dir.path()).unwrap();

        let codes = load_market_codes(&config, &ScriptedClient::new());

        assert!(codes.contains(&"en-US".to_string()));
        assert!(!config.marketcodes_file.exists());
    }
}
