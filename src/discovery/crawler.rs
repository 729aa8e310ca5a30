//! Breadth-first crawler over same-site HTML pages.
//!
//! Pages are fetched level by level with bounded concurrency. Every
//! `<a href>` is resolved against its page, stripped of its fragment and
//! checked against the domain allow-list. Links whose path ends in a
//! candidate extension go to the scheduler; everything else is a page to
//! crawl on the next level.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{DiscoveryError, LinkSource};
use crate::queue::DedupScheduler;
use crate::user_agent;

/// File extensions offered to the scheduler by default.
pub const DEFAULT_CANDIDATE_EXTENSIONS: &[&str] = &[".exe"];

/// Pages fetched concurrently within one crawl level by default.
pub const DEFAULT_PAGE_CONCURRENCY: usize = 8;

const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for [`SiteCrawler`].
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Pages the crawl starts from.
    pub seeds: Vec<String>,
    /// Hosts the crawl may visit. Empty means any host.
    pub allowed_domains: Vec<String>,
    /// Path suffixes that mark a link as a download candidate.
    pub candidate_extensions: Vec<String>,
    /// Deepest page level parsed for links; seeds are level 0. `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Pages fetched concurrently within one level.
    pub page_concurrency: usize,
    /// Per-page request timeout. `None` means unbounded.
    pub fetch_timeout: Option<Duration>,
    /// Skip TLS certificate verification for page requests.
    pub accept_invalid_certs: bool,
}

impl CrawlConfig {
    /// Creates a config with defaults for the given seeds.
    pub fn new<I, S>(seeds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            seeds: seeds.into_iter().map(Into::into).collect(),
            allowed_domains: Vec::new(),
            candidate_extensions: DEFAULT_CANDIDATE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            max_depth: None,
            page_concurrency: DEFAULT_PAGE_CONCURRENCY,
            fetch_timeout: Some(DEFAULT_PAGE_TIMEOUT),
            accept_invalid_certs: false,
        }
    }

    /// Restricts the crawl to these hosts and their subdomains.
    #[must_use]
    pub fn with_allowed_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Replaces the candidate extensions.
    #[must_use]
    pub fn with_candidate_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidate_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Limits how deep the crawl goes.
    #[must_use]
    pub fn with_max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets how many pages of one level are fetched at once.
    #[must_use]
    pub fn with_page_concurrency(mut self, concurrency: usize) -> Self {
        self.page_concurrency = concurrency;
        self
    }

    /// Sets the per-page timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Same-site HTML crawler implementing [`LinkSource`].
#[derive(Debug)]
pub struct SiteCrawler {
    seeds: Vec<Url>,
    allowed_domains: Vec<String>,
    candidate_extensions: Vec<String>,
    max_depth: Option<usize>,
    page_concurrency: usize,
    client: Client,
}

impl SiteCrawler {
    /// Validates the seeds and builds the page client.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::NoSeeds`], [`DiscoveryError::InvalidSeed`]
    /// for unparseable or non-http(s) seeds, or [`DiscoveryError::Client`].
    pub fn new(config: CrawlConfig) -> Result<Self, DiscoveryError> {
        if config.seeds.is_empty() {
            return Err(DiscoveryError::NoSeeds);
        }
        let seeds = config
            .seeds
            .iter()
            .map(String::as_str)
            .map(parse_seed)
            .collect::<Result<Vec<_>, _>>()?;

        let mut builder = Client::builder().user_agent(user_agent::default_user_agent());
        if let Some(timeout) = config.fetch_timeout {
            builder = builder.timeout(timeout);
        }
        if config.accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(DiscoveryError::Client)?;

        Ok(Self {
            seeds,
            allowed_domains: config
                .allowed_domains
                .iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            candidate_extensions: config
                .candidate_extensions
                .iter()
                .map(String::as_str)
                .map(normalize_extension)
                .filter(|ext| ext.len() > 1)
                .collect(),
            max_depth: config.max_depth,
            page_concurrency: config.page_concurrency.max(1),
            client,
        })
    }

    /// True if the URL's host is allow-listed (exact match or subdomain).
    #[must_use]
    pub fn is_allowed(&self, url: &Url) -> bool {
        if self.allowed_domains.is_empty() {
            return true;
        }
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.allowed_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// True if the URL's path ends in a candidate extension.
    #[must_use]
    pub fn is_candidate(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        self.candidate_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
    }

    fn may_descend(&self, depth: usize) -> bool {
        self.max_depth.is_none_or(|max| depth < max)
    }

    async fn fetch_html(&self, url: &Url) -> Option<String> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "page fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(%url, status = response.status().as_u16(), "page skipped");
            return None;
        }
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("text/html"));
        if !is_html {
            debug!(%url, "not an HTML page");
            return None;
        }
        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!(%url, error = %e, "page body read failed");
                None
            }
        }
    }
}

#[async_trait]
impl LinkSource for SiteCrawler {
    #[instrument(skip(self, scheduler), fields(seeds = self.seeds.len()))]
    async fn discover(&self, scheduler: &DedupScheduler) -> Result<(), DiscoveryError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut frontier = Vec::new();

        for seed in &self.seeds {
            if self.is_candidate(seed) {
                scheduler.offer(seed.as_str()).await;
            } else if !self.is_allowed(seed) {
                warn!(url = %seed, "seed host not in allowed domains, skipping");
            } else if visited.insert(seed.to_string()) {
                frontier.push(seed.clone());
            }
        }

        let mut depth = 0_usize;
        let mut pages_crawled = 0_usize;
        while !frontier.is_empty() {
            debug!(depth, pages = frontier.len(), "crawling level");
            let pages: Vec<(Url, Option<String>)> = stream::iter(std::mem::take(&mut frontier))
                .map(|url| async move {
                    let html = self.fetch_html(&url).await;
                    (url, html)
                })
                .buffer_unordered(self.page_concurrency)
                .collect()
                .await;

            for (page, html) in pages {
                let Some(html) = html else {
                    continue;
                };
                pages_crawled += 1;
                for link in extract_links(&html, &page) {
                    // The allow-list bounds which pages are crawled, not where files live.
                    if self.is_candidate(&link) {
                        scheduler.offer(link.as_str()).await;
                    } else if self.may_descend(depth)
                        && self.is_allowed(&link)
                        && visited.insert(link.to_string())
                    {
                        frontier.push(link);
                    }
                }
            }
            depth += 1;
        }

        info!(pages_crawled, "crawl finished");
        Ok(())
    }
}

fn parse_seed(seed: &str) -> Result<Url, DiscoveryError> {
    let mut url = Url::parse(seed.trim()).map_err(|e| DiscoveryError::InvalidSeed {
        url: seed.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(DiscoveryError::InvalidSeed {
            url: seed.to_string(),
            reason: format!("unsupported scheme {}", url.scheme()),
        });
    }
    url.set_fragment(None);
    Ok(url)
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_ascii_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{ext}")
    }
}

/// Extracts absolute http(s) links from a page, fragments removed.
fn extract_links(html: &str, page: &Url) -> Vec<Url> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(page, href))
        .collect()
}

fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let mut url = base.join(href).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
