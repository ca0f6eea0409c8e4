use serde::{Deserialize, Serialize};

pub mod favorite;
pub mod identity;
pub mod message;

pub use favorite::{normalize_id, FavoriteRecord, LooseMovie, MovieKey, MovieRef};
pub use identity::Identity;
pub use message::{SupportMessage, SupportRequest, CREATED_AT_FIELD};

// ============================================================================
// TMDB API Types
// ============================================================================

/// A movie as listed by the catalog (upcoming releases)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    /// `YYYY-MM-DD`; TMDB sends an empty string for unknown dates
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

impl Movie {
    /// Release year for display, `TBA` when unknown
    pub fn release_year(&self) -> &str {
        self.release_date
            .as_deref()
            .and_then(|date| date.split('-').next())
            .filter(|year| !year.is_empty())
            .unwrap_or("TBA")
    }
}

impl From<&Movie> for MovieRef {
    fn from(movie: &Movie) -> Self {
        MovieRef {
            movie_id: movie.id,
            title: Some(movie.title.clone()),
            poster_path: movie.poster_path.clone(),
            release_date: movie.release_date.clone(),
            vote_average: Some(movie.vote_average),
            genre_ids: movie.genre_ids.clone(),
        }
    }
}

/// Paged list response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub total_results: u32,
}

fn first_page() -> u32 {
    1
}

/// Catalog genre id → name mapping entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Response from `/genre/movie/list`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreList {
    #[serde(default)]
    pub genres: Vec<Genre>,
}

/// A video reference attached to a movie
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub key: String,
    pub site: String,
    #[serde(rename = "type")]
    pub video_type: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Video {
    /// Playable YouTube trailer or teaser
    pub fn is_trailer(&self) -> bool {
        self.site == "YouTube" && (self.video_type == "Trailer" || self.video_type == "Teaser")
    }
}

/// Response from `/movie/{id}/videos`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoList {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub results: Vec<Video>,
}
