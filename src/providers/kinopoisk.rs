//! Unofficial Kinopoisk API client

use super::ProviderError;
use crate::movie::{MovieDetails, MovieId};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

const PROVIDER: &str = "kinopoisk";
const DEFAULT_BASE_URL: &str = "https://kinopoiskapiunofficial.tech/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Search and detail lookups against kinopoiskapiunofficial.tech
pub struct KinopoiskClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl KinopoiskClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Movie ids matching a keyword, in provider order. "Not found" is an
    /// empty list, not an error.
    pub async fn search_by_keyword(&self, keyword: &str) -> Result<Vec<MovieId>, ProviderError> {
        let url = format!("{}/v2.1/films/search-by-keyword", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .query(&[("keyword", keyword)])
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(vec![]);
        }
        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        parse_search(&body)
    }

    /// Full record for one movie
    pub async fn fetch_details(&self, id: MovieId) -> Result<MovieDetails, ProviderError> {
        let url = format!("{}/v2.2/films/{id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("X-API-KEY", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        parse_details(id, &body)
    }
}

fn parse_search(body: &str) -> Result<Vec<MovieId>, ProviderError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::parse(PROVIDER, e.to_string()))?;
    Ok(response.films.into_iter().map(|f| MovieId(f.film_id)).collect())
}

fn parse_details(id: MovieId, body: &str) -> Result<MovieDetails, ProviderError> {
    let film: FilmResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::parse(PROVIDER, e.to_string()))?;

    Ok(MovieDetails {
        id,
        name_ru: film.name_ru,
        name_en: film.name_en,
        name_original: film.name_original,
        description: film.description,
        short_description: film.short_description,
        rating_kinopoisk: film.rating_kinopoisk,
        rating_imdb: film.rating_imdb,
        genres: film.genres.into_iter().map(|g| g.genre).collect(),
        countries: film.countries.into_iter().map(|c| c.country).collect(),
        film_length: film.film_length,
        year: film.year,
        start_year: film.start_year,
        end_year: film.end_year,
        serial: film.serial.unwrap_or(false),
        poster_url: film.poster_url,
    })
}

// Kinopoisk API response structures

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    films: Vec<SearchFilm>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchFilm {
    film_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilmResponse {
    name_ru: Option<String>,
    name_en: Option<String>,
    name_original: Option<String>,
    poster_url: Option<String>,
    rating_kinopoisk: Option<f64>,
    rating_imdb: Option<f64>,
    year: Option<i32>,
    film_length: Option<u32>,
    description: Option<String>,
    short_description: Option<String>,
    #[serde(default)]
    countries: Vec<Country>,
    #[serde(default)]
    genres: Vec<Genre>,
    serial: Option<bool>,
    start_year: Option<i32>,
    end_year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct Country {
    country: String,
}

#[derive(Debug, Deserialize)]
struct Genre {
    genre: String,
}
