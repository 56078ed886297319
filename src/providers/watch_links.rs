//! Watch-link discovery by scraping a web search results page

use super::ProviderError;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

const PROVIDER: &str = "google";
const SEARCH_URL: &str = "https://www.google.com/search";
const GOOGLE_ORIGIN: &str = "https://www.google.com";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:108.0) Gecko/20100101 Firefox/108.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

pub const DEFAULT_LINKS_COUNT: usize = 5;
pub const DEFAULT_QUERY_SUFFIX: &str = "смотреть онлайн бесплатно";

/// One place to watch a movie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchLink {
    /// Registrable domain of the target site, e.g. `example.com`
    pub source: String,
    pub url: String,
}

/// Watch links keyed by source, in first-seen order. A later hit for the same
/// source replaces the earlier URL but keeps its position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchLinks(Vec<WatchLink>);

impl WatchLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: String, url: String) {
        match self.0.iter_mut().find(|link| link.source == source) {
            Some(existing) => existing.url = url,
            None => self.0.push(WatchLink { source, url }),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WatchLink> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for WatchLinks {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut links = Self::new();
        for (source, url) in iter {
            links.insert(source, url);
        }
        links
    }
}

/// Finds watch links through Google search results
pub struct GoogleLinkFinder {
    client: Client,
    links_count: usize,
    query_suffix: String,
}

impl GoogleLinkFinder {
    pub fn new(links_count: usize, query_suffix: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            links_count,
            query_suffix: query_suffix.into(),
        })
    }

    /// Search for `title` and collect up to `links_count` links
    pub async fn find(&self, title: &str) -> Result<WatchLinks, ProviderError> {
        let query = format!("{title} {}", self.query_suffix);
        let response = self
            .client
            .get(SEARCH_URL)
            .query(&[("q", query.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
            });
        }

        let html = response.text().await?;
        let links = parse_search_page(&html, self.links_count)?;
        tracing::debug!(title, found = links.len(), "Scraped watch links");
        Ok(links)
    }
}

/// Extract result links from a search page.
///
/// Only organic results are considered: anchors inside `div#rso` carrying
/// the `data-ved` and `data-usg` tracking attributes, excluding links back
/// to the search page itself.
pub fn parse_search_page(html: &str, limit: usize) -> Result<WatchLinks, ProviderError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("div#rso a[href][data-ved][data-usg]")
        .map_err(|e| ProviderError::parse(PROVIDER, format!("Invalid selector: {e:?}")))?;

    let origin = Url::parse(GOOGLE_ORIGIN)?;
    let mut links = WatchLinks::new();

    for element in document.select(&selector) {
        if links.len() >= limit {
            break;
        }

        let attrs = element.value();
        let (Some(href), Some(ved), Some(usg)) =
            (attrs.attr("href"), attrs.attr("data-ved"), attrs.attr("data-usg"))
        else {
            continue;
        };
        if href.starts_with("/search") {
            continue;
        }

        let Some((source, url)) = resolve_result(&origin, href, ved, usg) else {
            continue;
        };
        links.insert(source, url);
    }

    Ok(links)
}

/// Source domain and click-through URL of one result
fn resolve_result(origin: &Url, href: &str, ved: &str, usg: &str) -> Option<(String, String)> {
    if href.starts_with('/') {
        // Already a redirect through the search engine, the target is in the query
        let redirect = origin.join(href).ok()?;
        let target = redirect
            .query_pairs()
            .find(|(key, _)| key == "url" || key == "q")
            .map(|(_, value)| value.into_owned())?;
        let source = registrable_domain(&Url::parse(&target).ok()?)?;
        return Some((source, redirect.to_string()));
    }

    let target = Url::parse(href).ok()?;
    let source = registrable_domain(&target)?;
    let url = format!(
        "{GOOGLE_ORIGIN}/url?sa=t&rct=j&q=&esrc=s&source=web&cd=&ved={ved}&url={href}&usg={usg}"
    );
    Some((source, url))
}

/// Last two labels of the host name
fn registrable_domain(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    match labels.as_slice() {
        [] => None,
        [single] => Some((*single).to_string()),
        [.., domain, suffix] => Some(format!("{domain}.{suffix}")),
    }
}
