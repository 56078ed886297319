//! Movie records shared by the session, the providers and the renderer

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Provider-assigned movie identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub i64);

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A search hit. Details are fetched lazily on first render and kept for the
/// rest of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieCandidate {
    pub id: MovieId,
    pub details: Option<Arc<MovieDetails>>,
}

impl MovieCandidate {
    pub fn new(id: MovieId) -> Self {
        Self { id, details: None }
    }
}

/// Full descriptive record for a movie or series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: MovieId,
    pub name_ru: Option<String>,
    pub name_en: Option<String>,
    pub name_original: Option<String>,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub rating_kinopoisk: Option<f64>,
    pub rating_imdb: Option<f64>,
    pub genres: Vec<String>,
    pub countries: Vec<String>,
    /// Runtime in minutes (per episode for series)
    pub film_length: Option<u32>,
    pub year: Option<i32>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub serial: bool,
    pub poster_url: Option<String>,
}

/// Placeholder used when a record carries no usable title
pub const UNKNOWN_TITLE: &str = "-";

impl MovieDetails {
    /// Title shown to the user and stored in view statistics: the Russian
    /// title, then the English one, then the original one.
    pub fn display_name(&self) -> &str {
        [&self.name_ru, &self.name_en, &self.name_original]
            .into_iter()
            .find_map(|name| name.as_deref().filter(|n| !n.trim().is_empty()))
            .unwrap_or(UNKNOWN_TITLE)
    }
}
