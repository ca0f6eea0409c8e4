use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};

/// Canonical string form of a catalog movie id
///
/// Every membership lookup and every remote document path goes through this
/// type, so two references to the same movie always agree on their key no
/// matter which id field or representation they were read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MovieKey {
    id: i64,
    canonical: String,
}

impl MovieKey {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            canonical: id.to_string(),
        }
    }

    /// Numeric catalog id
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Normalizes a value exposing its id under the primary field and/or the
    /// legacy field. The primary field wins when it holds a usable number.
    pub fn normalize(primary: Option<&Value>, legacy: Option<&Value>) -> AppResult<Self> {
        primary
            .and_then(normalize_id)
            .or_else(|| legacy.and_then(normalize_id))
            .ok_or_else(|| {
                AppError::InvalidMovieReference(format!(
                    "no numeric id in movieId={} id={}",
                    describe(primary),
                    describe(legacy)
                ))
            })
    }
}

impl Display for MovieKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.canonical)
    }
}

impl From<i64> for MovieKey {
    fn from(id: i64) -> Self {
        MovieKey::new(id)
    }
}

fn describe(value: Option<&Value>) -> String {
    value.map_or_else(|| "<absent>".to_string(), |v| v.to_string())
}

/// Converts a loosely-typed id (JSON number or numeric string) into a key
pub fn normalize_id(value: &Value) -> Option<MovieKey> {
    let id = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    id.map(MovieKey::new)
}

fn integral(f: f64) -> Option<i64> {
    (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
}

/// The minimal data needed to identify and render a favorited movie
///
/// Serialized with the document field names used by the remote store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MovieRef {
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

impl MovieRef {
    pub fn key(&self) -> MovieKey {
        MovieKey::new(self.movie_id)
    }
}

/// A movie as handed over by a caller: either a catalog entry (`id`) or a
/// previously stored favorite (`movieId`, possibly stringly typed)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LooseMovie {
    #[serde(rename = "movieId", default, skip_serializing_if = "Option::is_none")]
    pub movie_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub genre_ids: Option<Vec<i64>>,
}

impl LooseMovie {
    pub fn key(&self) -> AppResult<MovieKey> {
        MovieKey::normalize(self.movie_id.as_ref(), self.id.as_ref())
    }

    /// Full reference shape with the id normalized and `genre_ids` defaulted
    pub fn into_movie_ref(self) -> AppResult<MovieRef> {
        let key = self.key()?;
        Ok(MovieRef {
            movie_id: key.id(),
            title: self.title,
            poster_path: self.poster_path,
            release_date: self.release_date,
            vote_average: self.vote_average,
            genre_ids: self.genre_ids.unwrap_or_default(),
        })
    }
}

impl From<MovieRef> for LooseMovie {
    fn from(movie: MovieRef) -> Self {
        LooseMovie {
            movie_id: Some(Value::from(movie.movie_id)),
            id: None,
            title: movie.title,
            poster_path: movie.poster_path,
            release_date: movie.release_date,
            vote_average: movie.vote_average,
            genre_ids: Some(movie.genre_ids),
        }
    }
}

/// A Movie Reference persisted under a user, as read back from the store
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FavoriteRecord {
    /// Remote document key
    pub id: String,
    #[serde(flatten)]
    pub movie: MovieRef,
}

impl FavoriteRecord {
    /// Decodes a stored document. Older documents may carry `movieId` as a
    /// string or omit it entirely, in which case the document key is used.
    pub fn from_document(id: &str, data: &Value) -> AppResult<Self> {
        let legacy_id = Value::String(id.to_string());
        let key = MovieKey::normalize(data.get("movieId"), Some(&legacy_id))?;

        let text = |field: &str| data.get(field).and_then(Value::as_str).map(str::to_string);
        let genre_ids = data
            .get("genre_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_i64).collect())
            .unwrap_or_default();

        Ok(FavoriteRecord {
            id: id.to_string(),
            movie: MovieRef {
                movie_id: key.id(),
                title: text("title"),
                poster_path: text("poster_path"),
                release_date: text("release_date"),
                vote_average: data.get("vote_average").and_then(Value::as_f64),
                genre_ids,
            },
        })
    }

    /// True when this record refers to the movie behind `key`
    ///
    /// Numeric id, document key and stringified id are all compared so that
    /// records written under older shapes keep matching.
    pub fn matches(&self, key: &MovieKey) -> bool {
        self.movie.movie_id == key.id()
            || self.id == key.as_str()
            || self.movie.movie_id.to_string() == key.as_str()
    }
}
