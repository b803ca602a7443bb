//! Listing fetcher for the it.pracuj.pl job board.
//!
//! Listing pages are server-rendered Next.js documents. The offers are read
//! from the `<script id="__NEXT_DATA__">` JSON payload at
//! `props.pageProps.data.jobOffers.groupedOffers`.
//!
//! ## Failure classification
//!
//! | Condition | Kind |
//! |-----------|------|
//! | Timeout, connection error, HTTP 429, HTTP 5xx | transient |
//! | Page without `__NEXT_DATA__` (bot interstitial) | transient |
//! | Other HTTP 4xx | permanent |
//! | Payload without the expected offer structure | permanent |

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument, warn};

use jobwatch_core::defaults::{FETCH_TIMEOUT_SECS, PRACUJ_BASE_URL, PRACUJ_RECENT_DAYS};
use jobwatch_core::{Error, FetchError, ListingFetcher, Posting, Result, SearchDefinition};

/// Browser-like User-Agent; the board serves an interstitial to obvious bots.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// JSON pointer to the grouped offers inside `__NEXT_DATA__`.
const OFFERS_POINTER: &str = "/props/pageProps/data/jobOffers/groupedOffers";

/// pracuj.pl listing fetcher.
pub struct PracujFetcher {
    client: Client,
    base_url: String,
}

impl PracujFetcher {
    /// Create a fetcher against the public board.
    pub fn new() -> Result<Self> {
        Self::with_base_url(PRACUJ_BASE_URL)
    }

    /// Create a fetcher against a custom base URL (mirrors, tests).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            reqwest::header::ACCEPT_LANGUAGE,
            reqwest::header::HeaderValue::from_static("pl-PL,pl;q=0.9,en-US;q=0.8,en;q=0.7"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Listing page URL for a search.
    pub fn search_url(&self, search: &SearchDefinition) -> String {
        let query = urlencoding::encode(&search.query);
        match &search.location {
            Some(location) => format!(
                "{}/{};kw/{};wp?rd={}",
                self.base_url,
                query,
                urlencoding::encode(location),
                PRACUJ_RECENT_DAYS
            ),
            None => format!("{}/{};kw", self.base_url, query),
        }
    }

    async fn fetch_html(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("Failed to read response body: {e}")))
    }
}

#[async_trait]
impl ListingFetcher for PracujFetcher {
    fn source_name(&self) -> &str {
        "pracuj"
    }

    #[instrument(skip(self, search), fields(search = %search.key()))]
    async fn fetch(&self, search: &SearchDefinition) -> std::result::Result<Vec<Posting>, FetchError> {
        let start = Instant::now();
        let url = self.search_url(search);
        debug!(%url, "Fetching listing page");

        let html = self.fetch_html(&url).await?;
        let postings = parse_listing_page(&html)?;

        info!(
            fetched = postings.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Fetched listing page"
        );
        Ok(postings)
    }
}

/// Extract postings from a listing page document.
pub fn parse_listing_page(html: &str) -> std::result::Result<Vec<Posting>, FetchError> {
    let payload = extract_next_data(html)?;
    let data: JsonValue = serde_json::from_str(&payload)
        .map_err(|e| FetchError::Permanent(format!("__NEXT_DATA__ is not valid JSON: {e}")))?;

    let offers = data
        .pointer(OFFERS_POINTER)
        .and_then(JsonValue::as_array)
        .ok_or_else(|| {
            FetchError::Permanent(format!("Listing payload has no array at {OFFERS_POINTER}"))
        })?;

    let mut postings = Vec::with_capacity(offers.len());
    for raw in offers {
        match serde_json::from_value::<GroupedOffer>(raw.clone()) {
            Ok(offer) => match offer.into_posting() {
                Some(posting) => postings.push(posting),
                None => warn!("Skipping offer without id or URL"),
            },
            Err(e) => warn!(error = %e, "Skipping malformed offer"),
        }
    }
    Ok(postings)
}

fn extract_next_data(html: &str) -> std::result::Result<String, FetchError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script#__NEXT_DATA__")
        .map_err(|e| FetchError::Permanent(format!("Invalid selector: {e}")))?;

    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| FetchError::Transient("No __NEXT_DATA__ script on listing page".into()))
}

fn classify_status(status: StatusCode, url: &str) -> FetchError {
    let message = format!("HTTP {status} for {url}");
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        FetchError::Transient(message)
    } else {
        FetchError::Permanent(message)
    }
}

fn classify_transport_error(e: reqwest::Error) -> FetchError {
    if e.is_builder() {
        FetchError::Permanent(format!("Invalid request: {e}"))
    } else {
        FetchError::Transient(format!("Request failed: {e}"))
    }
}

/// One grouped offer as rendered in `__NEXT_DATA__`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupedOffer {
    group_id: Option<JsonValue>,
    job_title: String,
    #[serde(default)]
    company_name: String,
    #[serde(default)]
    position_levels: Vec<String>,
    #[serde(default)]
    technologies: Vec<String>,
    salary_display_text: Option<String>,
    last_publicated: Option<String>,
    #[serde(default)]
    offers: Vec<OfferLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferLocation {
    display_workplace: Option<String>,
    offer_absolute_uri: Option<String>,
}

impl GroupedOffer {
    fn into_posting(self) -> Option<Posting> {
        let id = match self.group_id? {
            JsonValue::String(s) if !s.is_empty() => s,
            JsonValue::Number(n) => n.to_string(),
            _ => return None,
        };
        let first = self.offers.into_iter().next()?;
        let url = first.offer_absolute_uri.filter(|u| !u.is_empty())?;

        let published_at = self
            .last_publicated
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));

        Some(
            Posting::new(id, self.job_title, url)
                .with_company(self.company_name)
                .with_location(first.display_workplace.unwrap_or_default())
                .with_seniority(self.position_levels)
                .with_technologies(self.technologies)
                .with_salary(self.salary_display_text)
                .with_published_at(published_at),
        )
    }
}
