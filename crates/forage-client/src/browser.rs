//! Browser-driven scraper for web3.career.
//!
//! Uses headless Chromium via the Chrome DevTools Protocol to render the
//! listing table (the site lazy-loads rows), then extracts rows from the
//! rendered DOM. A single Chromium process is shared across all clones;
//! each fetch opens a tab, grabs the HTML, and closes it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig};
use chrono::NaiveDate;
use futures::StreamExt;
use scraper::{ElementRef, Html, Selector};

use forage_core::{AppError, JobSource, Query, RawListing};

const BACKEND: &str = "web3career";
const SITE: &str = "https://web3.career";

/// Listings older than this are dropped.
const MAX_AGE_DAYS: i64 = 30;

/// Rows containing these markers are bootcamp ads, not jobs.
const AD_MARKERS: &[&str] = &["bootcamp", "course", "guaranteed", "learn", "training"];

/// Job source that scrapes web3.career with a headless browser.
#[derive(Clone)]
pub struct Web3CareerSource {
    browser: Arc<Browser>,
    timeout: Duration,
}

impl Web3CareerSource {
    /// Launches a headless Chromium with a 30 s navigation timeout.
    ///
    /// Requires a Chrome/Chromium binary reachable via `$PATH`, the
    /// well-known install locations, or `$CHROME_BIN`.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(30)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder();
        builder = builder.no_sandbox().disable_default_args();

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::Generic(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::Generic(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
        })
    }

    /// Listing URL for a query, e.g. `https://web3.career/rust+remote-jobs`.
    fn listing_url(query: &Query) -> String {
        let slug = query.normalized_terms().replace(' ', "-");
        match (slug.is_empty(), query.remote_only) {
            (true, _) => format!("{SITE}/remote-jobs"),
            (false, true) => format!("{SITE}/{slug}+remote-jobs"),
            (false, false) => format!("{SITE}/{slug}-jobs"),
        }
    }

    async fn rendered_html(&self, url: &str) -> Result<String, AppError> {
        let result = tokio::time::timeout(self.timeout, async {
            let page = self
                .browser
                .new_page(url)
                .await
                .map_err(|e| AppError::NetworkError(format!("Failed to navigate to {url}: {e}")))?;

            // The listing table is the render-complete signal.
            page.find_element("tr[data-jobid]")
                .await
                .map_err(|e| AppError::ContractViolation {
                    backend: BACKEND.to_string(),
                    detail: format!("listing table did not render: {e}"),
                })?;

            let html = page
                .content()
                .await
                .map_err(|e| AppError::NetworkError(format!("Failed to read page content: {e}")))?;

            let _ = page.close().await;
            Ok::<String, AppError>(html)
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(AppError::Timeout(self.timeout.as_secs())),
        }
    }
}

impl JobSource for Web3CareerSource {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<RawListing>, AppError> {
        let url = Self::listing_url(query);
        tracing::debug!(%url, "Scraping web3.career");

        let html = self.rendered_html(&url).await?;
        let today = chrono::Utc::now().date_naive();
        let mut listings = extract_listings(&html, today)?;
        listings.truncate(query.max_results);
        Ok(listings)
    }
}

/// Extract job rows from a rendered listing page.
///
/// `today` anchors the relative "3d"-style posting ages; rows older than
/// [`MAX_AGE_DAYS`] and sponsored/bootcamp rows are dropped.
fn extract_listings(html: &str, today: NaiveDate) -> Result<Vec<RawListing>, AppError> {
    let document = Html::parse_document(html);
    let rows = selector("tr[data-jobid]")?;
    let title_sel = selector("h2")?;
    let company_sel = selector("h3")?;
    let salary_sel = selector(r#"p[class*="text-salary"]"#)?;
    let time_sel = selector("time")?;
    let tags_sel = selector("span.my-badge a")?;
    let location_sel = selector("td:nth-of-type(4) span, td:nth-of-type(4) a")?;

    let mut listings = Vec::new();
    for row in document.select(&rows) {
        let Some(job_id) = row.value().attr("data-jobid") else {
            continue;
        };

        let row_text = row.text().collect::<String>().to_lowercase();
        let sponsored = row
            .value()
            .attr("id")
            .is_some_and(|id| id.to_lowercase().contains("sponsor"));
        if sponsored || AD_MARKERS.iter().any(|marker| row_text.contains(marker)) {
            continue;
        }

        let Some(title_el) = row.select(&title_sel).next() else {
            continue;
        };
        let title = element_text(&title_el);
        if title.is_empty() {
            continue;
        }
        let company = row
            .select(&company_sel)
            .next()
            .map(|el| element_text(&el))
            .unwrap_or_default();

        let posted = row
            .select(&time_sel)
            .next()
            .and_then(|el| parse_relative_age(&element_text(&el), today));
        let fresh = posted
            .is_some_and(|date| (today - date).num_days() <= MAX_AGE_DAYS);
        if !fresh {
            continue;
        }

        let salary = row
            .select(&salary_sel)
            .next()
            .map(|el| element_text(&el))
            .and_then(|s| s.lines().next().map(str::trim).map(String::from))
            .filter(|s| !s.is_empty());
        let location = row
            .select(&location_sel)
            .next()
            .map(|el| element_text(&el))
            .filter(|l| !l.is_empty());
        let tags: Vec<String> = row
            .select(&tags_sel)
            .map(|el| element_text(&el))
            .filter(|t| !t.is_empty())
            .collect();

        let url = title_el
            .parent()
            .and_then(ElementRef::wrap)
            .and_then(|parent| parent.value().attr("href"))
            .map(|href| {
                if href.starts_with('/') {
                    format!("{SITE}{href}")
                } else {
                    href.to_string()
                }
            })
            .unwrap_or_else(|| format!("{SITE}/jobs/{job_id}"));

        let remote = location
            .as_deref()
            .is_some_and(|l| l.to_lowercase().contains("remote"));

        listings.push(RawListing {
            source_id: Some(job_id.to_string()),
            title,
            company,
            location,
            salary,
            url,
            tags,
            posted,
            description: None,
            remote,
        });
    }

    Ok(listings)
}

fn selector(css: &str) -> Result<Selector, AppError> {
    Selector::parse(css).map_err(|e| AppError::Generic(format!("Invalid selector '{css}': {e}")))
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parse web3.career's relative posting age ("3d", "today") into a date.
fn parse_relative_age(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let text = text.trim().to_lowercase();
    if text == "today" {
        return Some(today);
    }
    let days: i64 = text.strip_suffix('d')?.trim().parse().ok()?;
    Some(today - chrono::Duration::days(days))
}

fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // Snap wrappers strip Chrome CLI flags; prefer the real binary.
    let candidates: &[&str] = &[
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];
    candidates.iter().map(PathBuf::from).find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <table><tbody>
        <tr data-jobid="101">
            <td><a href="/rust-engineer-acme-101"><h2>Rust Engineer</h2></a><h3>Acme</h3></td>
            <td><time>3d</time></td>
            <td><p class="ps-0 text-salary">$140k - $180k
per year</p></td>
            <td><span style="color: #d5d3d3">Remote</span></td>
            <td><span class="my-badge my-badge-secondary"><a>rust</a></span>
                <span class="my-badge my-badge-secondary"><a>backend</a></span></td>
        </tr>
        <tr data-jobid="102" id="sponsor-row">
            <td><a href="/sponsored-102"><h2>Sponsored Role</h2></a><h3>SponsorCo</h3></td>
            <td><time>1d</time></td>
        </tr>
        <tr data-jobid="103">
            <td><a href="/bootcamp-103"><h2>Learn Solidity Bootcamp</h2></a><h3>BootcampCo</h3></td>
            <td><time>2d</time></td>
        </tr>
        <tr data-jobid="104">
            <td><a href="/old-role-104"><h2>Ancient Role</h2></a><h3>OldCo</h3></td>
            <td><time>45d</time></td>
        </tr>
        </tbody></table>
    "#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    #[test]
    fn extracts_real_rows_and_drops_ads_and_stale_listings() {
        let listings = extract_listings(PAGE, today()).unwrap();
        assert_eq!(listings.len(), 1);

        let listing = &listings[0];
        assert_eq!(listing.source_id.as_deref(), Some("101"));
        assert_eq!(listing.title, "Rust Engineer");
        assert_eq!(listing.company, "Acme");
        assert_eq!(listing.url, "https://web3.career/rust-engineer-acme-101");
        assert_eq!(listing.salary.as_deref(), Some("$140k - $180k"));
        assert_eq!(listing.tags, vec!["rust".to_string(), "backend".to_string()]);
        assert_eq!(
            listing.posted,
            Some(NaiveDate::from_ymd_opt(2025, 6, 7).unwrap())
        );
        assert!(listing.remote);
    }

    #[test]
    fn relative_ages_parse() {
        assert_eq!(parse_relative_age("today", today()), Some(today()));
        assert_eq!(
            parse_relative_age("5d", today()),
            Some(NaiveDate::from_ymd_opt(2025, 6, 5).unwrap())
        );
        assert_eq!(parse_relative_age("soon", today()), None);
    }

    #[test]
    fn listing_urls_follow_site_conventions() {
        assert_eq!(
            Web3CareerSource::listing_url(&Query::new("rust")),
            "https://web3.career/rust+remote-jobs"
        );
        assert_eq!(
            Web3CareerSource::listing_url(&Query::new("front end").with_remote_only(false)),
            "https://web3.career/front-end-jobs"
        );
        assert_eq!(
            Web3CareerSource::listing_url(&Query::new("")),
            "https://web3.career/remote-jobs"
        );
    }
}
