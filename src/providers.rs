//! External movie and link providers
//!
//! Thin HTTP integrations: the unofficial Kinopoisk API for search and
//! details, and a search-page scraper for watch links.

mod error;
mod kinopoisk;
mod watch_links;

pub use error::ProviderError;
pub use kinopoisk::KinopoiskClient;
pub use watch_links::{GoogleLinkFinder, WatchLinks, DEFAULT_LINKS_COUNT, DEFAULT_QUERY_SUFFIX};
