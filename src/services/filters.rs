use crate::{
    error::{AppError, AppResult},
    models::{Genre, Movie},
};

/// Genre names shown per movie card
const MAX_GENRE_NAMES: usize = 2;

/// Narrowing applied to the upcoming list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MovieFilter {
    genre: Option<i64>,
    month: Option<String>,
}

impl MovieFilter {
    /// Builds a filter; `month` must be `YYYY-MM`. Empty values mean no filter.
    pub fn new(genre: Option<i64>, month: Option<&str>) -> AppResult<Self> {
        let month = match month.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) if is_year_month(m) => Some(m.to_string()),
            Some(m) => {
                return Err(AppError::InvalidInput(format!(
                    "month must be formatted as YYYY-MM, got {}",
                    m
                )))
            }
            None => None,
        };

        Ok(Self { genre, month })
    }

    pub fn matches(&self, movie: &Movie) -> bool {
        if let Some(genre) = self.genre {
            if !movie.genre_ids.contains(&genre) {
                return false;
            }
        }
        if let Some(month) = &self.month {
            let released_in = movie
                .release_date
                .as_deref()
                .map(|date| date.starts_with(month.as_str()))
                .unwrap_or(false);
            if !released_in {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, movies: Vec<Movie>) -> Vec<Movie> {
        movies.into_iter().filter(|m| self.matches(m)).collect()
    }
}

fn is_year_month(s: &str) -> bool {
    let Some((year, month)) = s.split_once('-') else {
        return false;
    };
    year.len() == 4
        && year.bytes().all(|b| b.is_ascii_digit())
        && matches!(month.parse::<u8>(), Ok(1..=12))
        && month.len() == 2
}

/// Names of the movie's first genres, skipping ids missing from `genres`
pub fn genre_names(movie: &Movie, genres: &[Genre]) -> Vec<String> {
    movie
        .genre_ids
        .iter()
        .filter_map(|id| genres.iter().find(|g| g.id == *id))
        .map(|g| g.name.clone())
        .take(MAX_GENRE_NAMES)
        .collect()
}
