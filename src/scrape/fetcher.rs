use std::ffi::OsStr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::error::BrowserError;
use crate::scrape::extract::{extract_links, extract_metadata, BookLink, BookMetadata};
use crate::utils::config::ScrapingConfig;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(60);
/// Time given to client-side rendering after the initial load.
const SETTLE_DELAY: Duration = Duration::from_secs(3);
const SELECTOR_TIMEOUT: Duration = Duration::from_secs(10);
const SEARCH_SUBMIT_DELAY: Duration = Duration::from_secs(5);
const SEARCH_INPUT: &str = r#"input[type="text"]"#;

/// Paces a single sequential stream of fetches.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// How long a fetch issued at `now` still has to wait.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn wait(&mut self) {
        let pause = self.remaining(Instant::now());
        if !pause.is_zero() {
            debug!("Rate limit: sleeping {:?}", pause);
            thread::sleep(pause);
        }
        self.last = Some(Instant::now());
    }
}

/// Something that can load rendered review-site pages.
pub trait PageSource {
    /// Loads `url` and returns its HTML. A `wait_selector` that never shows
    /// up is not an error; whatever content loaded is returned.
    fn fetch_page(&mut self, url: &str, wait_selector: Option<&str>) -> Result<String, BrowserError>;

    /// Runs `query` through the site's interactive search box and returns
    /// the resulting page HTML.
    fn interactive_search(&mut self, base_url: &str, query: &str) -> Result<String, BrowserError>;
}

/// A headless Chrome session kept open for a whole command run. Dropping
/// the fetcher drops the owned `Browser`, which kills the Chrome process.
pub struct BrowserFetcher {
    _browser: Browser,
    tab: Arc<Tab>,
    limiter: RateLimiter,
}

impl BrowserFetcher {
    pub fn launch(config: &ScrapingConfig) -> Result<Self, BrowserError> {
        info!("Launching browser (headless: {})", config.headless);

        let args: Vec<&OsStr> = vec![
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-dev-shm-usage"),
        ];
        let options = LaunchOptions::default_builder()
            .headless(config.headless)
            .idle_browser_timeout(Duration::from_secs(300))
            .args(args)
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| BrowserError::Launch(e.to_string()))?;
        let tab = browser.new_tab().map_err(|e| BrowserError::Tab(e.to_string()))?;
        tab.set_default_timeout(NAVIGATION_TIMEOUT);
        tab.set_user_agent(USER_AGENT, None, None)
            .map_err(|e| BrowserError::Tab(e.to_string()))?;

        Ok(Self {
            _browser: browser,
            tab,
            limiter: RateLimiter::new(config.rate_limit()),
        })
    }

    fn content(&self) -> Result<String, BrowserError> {
        self.tab
            .get_content()
            .map_err(|e| BrowserError::HtmlExtraction(e.to_string()))
    }
}

impl PageSource for BrowserFetcher {
    fn fetch_page(&mut self, url: &str, wait_selector: Option<&str>) -> Result<String, BrowserError> {
        self.limiter.wait();
        debug!("Navigating to {}", url);

        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| BrowserError::Navigation(format!("{}: {}", url, e)))?;

        thread::sleep(SETTLE_DELAY);

        if let Some(selector) = wait_selector {
            if let Err(e) = self.tab.wait_for_element_with_custom_timeout(selector, SELECTOR_TIMEOUT) {
                debug!("Selector '{}' did not appear on {}: {}", selector, url, e);
            }
        }

        self.content()
    }

    fn interactive_search(&mut self, base_url: &str, query: &str) -> Result<String, BrowserError> {
        self.fetch_page(&format!("{}/books/similar", base_url), None)?;

        let input = self
            .tab
            .wait_for_element(SEARCH_INPUT)
            .map_err(|e| BrowserError::ElementNotFound(format!("{}: {}", SEARCH_INPUT, e)))?;
        input
            .click()
            .map_err(|e| BrowserError::Interaction(e.to_string()))?;
        self.tab
            .type_str(query)
            .and_then(|tab| tab.press_key("Enter"))
            .map_err(|e| BrowserError::Interaction(e.to_string()))?;

        thread::sleep(SEARCH_SUBMIT_DELAY);
        self.content()
    }
}

/// Finds the site's page for a book. The first result wins; there is no
/// ranking of candidates. Fetch errors are swallowed and yield `None`.
pub fn search(pages: &mut dyn PageSource, base_url: &str, title: &str, author: &str) -> Option<BookLink> {
    let query = format!("{} {}", title, author);
    let search_url = format!("{}/search?q={}", base_url, urlencoding::encode(&query));

    match pages.fetch_page(&search_url, None) {
        Ok(html) => {
            if let Some(first) = extract_links(&html).into_iter().next() {
                return Some(first);
            }
        }
        Err(e) => debug!("Search page failed for '{}': {}", query, e),
    }

    match pages.interactive_search(base_url, &query) {
        Ok(html) => extract_links(&html).into_iter().next(),
        Err(e) => {
            debug!("Interactive search failed for '{}': {}", query, e);
            None
        }
    }
}

pub fn scrape(
    pages: &mut dyn PageSource,
    base_url: &str,
    external_id: &str,
    slug: &str,
) -> Result<BookMetadata, BrowserError> {
    let url = format!("{}/books/{}/{}", base_url, external_id, slug);
    let html = pages.fetch_page(&url, None)?;
    Ok(extract_metadata(&html))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::testing::FakePages;

    const BASE: &str = "https://www.romance.io";
    const HIT: &str = r#"<a href="/books/aaaaaaaaaaaaaaaaaaaaaaaa/first-hit">x</a>
                         <a href="/books/bbbbbbbbbbbbbbbbbbbbbbbb/second-hit">y</a>"#;

    #[test]
    fn test_rate_limiter_remaining() {
        let mut limiter = RateLimiter::new(Duration::from_secs(3));
        let start = Instant::now();
        assert_eq!(limiter.remaining(start), Duration::ZERO);

        limiter.last = Some(start);
        assert_eq!(limiter.remaining(start + Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(limiter.remaining(start + Duration::from_secs(5)), Duration::ZERO);
    }

    #[test]
    fn test_rate_limiter_zero_interval_never_sleeps() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let before = Instant::now();
        limiter.wait();
        limiter.wait();
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_search_uses_query_results_first() {
        let mut pages = FakePages::default()
            .with_page("https://www.romance.io/search?q=Book%20Author", HIT);

        let hit = search(&mut pages, BASE, "Book", "Author").unwrap();
        assert_eq!(hit.external_id, "aaaaaaaaaaaaaaaaaaaaaaaa");
        assert_eq!(hit.slug, "first-hit");
        assert!(pages.searched.is_empty());
    }

    #[test]
    fn test_search_falls_back_to_interactive() {
        let mut pages = FakePages::default()
            .with_page("https://www.romance.io/search?q=Book%20Author", "<p>no results</p>")
            .with_interactive(HIT);

        let hit = search(&mut pages, BASE, "Book", "Author").unwrap();
        assert_eq!(hit.slug, "first-hit");
        assert_eq!(pages.searched, vec!["Book Author".to_string()]);
    }

    #[test]
    fn test_search_errors_yield_none() {
        let mut pages = FakePages::default();
        assert!(search(&mut pages, BASE, "Missing", "Nobody").is_none());
        assert_eq!(pages.fetched.len(), 1);
    }

    #[test]
    fn test_scrape_fetches_detail_page() {
        let mut pages = FakePages::default().with_page(
            "https://www.romance.io/books/aaaaaaaaaaaaaaaaaaaaaaaa/first-hit",
            r#"<a href="/topics/best/slow-burn/1">slow-burn</a> Open door"#,
        );
        let meta = scrape(&mut pages, BASE, "aaaaaaaaaaaaaaaaaaaaaaaa", "first-hit").unwrap();
        assert_eq!(meta.tags, vec!["slow-burn"]);
        assert_eq!(meta.intensity_level, Some(3));

        assert!(scrape(&mut pages, BASE, "bbbbbbbbbbbbbbbbbbbbbbbb", "nope").is_err());
    }

    #[test]
    #[ignore] // Requires Chrome to be installed
    fn test_browser_fetch() {
        let config = ScrapingConfig {
            rate_limit_seconds: 0,
            ..ScrapingConfig::default()
        };
        let mut fetcher = BrowserFetcher::launch(&config).unwrap();
        let html = fetcher.fetch_page("https://example.com", Some("h1")).unwrap();
        assert!(html.contains("Example"));
    }
}
