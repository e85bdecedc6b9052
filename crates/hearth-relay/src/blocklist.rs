//! Startup fetch of the content-filter word lists.

use futures::future::join_all;
use std::time::Duration;
use tracing::{info, warn};

use hearth_core::ContentFilter;

use crate::error::RelayError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Fetch every source concurrently and merge what arrives. A failed source
/// is logged and skipped; if all fail the filter is empty.
pub async fn load(client: &reqwest::Client, urls: &[String]) -> ContentFilter {
    let fetches = urls.iter().map(|url| fetch(client, url));
    let mut filter = ContentFilter::default();
    for (url, result) in urls.iter().zip(join_all(fetches).await) {
        match result {
            Ok(words) => {
                info!("Loaded {} blocked words from {url}", words.len());
                filter.extend(words);
            }
            Err(e) => warn!("Blocklist source {url} unavailable: {e}"),
        }
    }
    if filter.is_empty() {
        warn!("Content filter is empty; messages will not be filtered");
    } else {
        info!("Content filter holds {} words", filter.len());
    }
    filter
}

async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<String>, RelayError> {
    let body = client
        .get(url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(parse_words(&body))
}

/// A JSON array of strings is taken as-is; anything else is one word per line.
pub fn parse_words(body: &str) -> Vec<String> {
    if let Ok(words) = serde_json::from_str::<Vec<String>>(body) {
        return words;
    }
    body.lines().map(str::to_string).collect()
}
