
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const USER_AGENT: &str = "Mozilla/5.0";
const TIMEOUT_SECONDS: u64 = 10;

/// Result titles must mention one of these to count as agriculture-related.
const RELEVANCE_KEYWORDS: &[&str] = &[
    "crop",
    "soil",
    "farming",
    "irrigation",
    "india",
    "kisan",
    "agriculture",
];

/// Best-effort web fallback: return a DuckDuckGo result link relevant to
/// the query, or None. Every failure mode degrades to None; this path is
/// purely supplementary and must never fail an otherwise answered query.
#[inline]
pub fn fallback_search_link(query: &str) -> Option<String> {
    let url = match search_url(query) {
        Ok(url) => url,
        Err(e) => {
            warn!("Failed to build web search URL: {e}");
            return None;
        }
    };

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(TIMEOUT_SECONDS)))
        .build()
        .into();

    let body = match agent
        .get(url.as_str())
        .header("User-Agent", USER_AGENT)
        .call()
        .and_then(|mut resp| resp.body_mut().read_to_string())
    {
        Ok(body) => body,
        Err(e) => {
            warn!("Web fallback request failed: {e}");
            return None;
        }
    };

    let link = extract_result_link(&body);
    if link.is_none() {
        debug!("Web fallback found no relevant result");
    }
    link
}

fn search_url(query: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(SEARCH_ENDPOINT)?;
    url.query_pairs_mut()
        .append_pair("q", &format!("{query} agriculture india"));
    Ok(url)
}

/// Pick the first result anchor whose title looks agriculture-related.
fn extract_result_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a.result__a").ok()?;

    for link in document.select(&selector) {
        let title = link.text().collect::<String>().to_lowercase();
        if RELEVANCE_KEYWORDS.iter().any(|word| title.contains(word)) {
            if let Some(href) = link.value().attr("href") {
                return Some(href.to_string());
            }
        }
    }

    None
}
