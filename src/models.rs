use serde::{Deserialize, Serialize};

pub const NO_GENRES: &str = "(no genres listed)";
pub const UNKNOWN_YEAR: &str = "9999";

#[derive(Debug, Clone)]
pub struct RatingEvent {
    pub movie_id: i64,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingSummary {
    #[serde(rename = "_id")]
    pub movie_id: i64,
    pub avg_rating: f64,
    pub rating_count: i64,
}

#[derive(Debug, Clone)]
pub struct MovieRecord {
    pub movie_id: i64,
    pub title: Option<String>,
    pub year: String,
    pub genres: Vec<String>,
}

/// Movie body returned by `GET /mongo/movies/{movie_id}`: the record without its id.
#[derive(Debug, Clone, Serialize)]
pub struct MovieFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub year: String,
    pub genres: Vec<String>,
}

impl From<MovieRecord> for MovieFields {
    fn from(record: MovieRecord) -> Self {
        MovieFields {
            title: record.title,
            year: record.year,
            genres: record.genres,
        }
    }
}

/// One row of `GET /movies_with_ratings`: catalog fields joined with the
/// rating summary, genres flattened to a comma-joined string.
#[derive(Debug, Clone, Serialize)]
pub struct MovieWithRating {
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub title: Option<String>,
    pub year: String,
    pub genres: String,
    pub avg_rating: f64,
    pub rating_count: i64,
}

/// Genres arrive either as a comma-separated string or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum GenresInput {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Deserialize)]
pub struct CreateMovie {
    #[serde(rename = "movieId")]
    pub movie_id: i64,
    pub title: Option<String>,
    pub year: Option<String>,
    pub genres: Option<GenresInput>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMovie {
    pub title: Option<String>,
    pub year: Option<String>,
    pub genres: Option<GenresInput>,
}

pub fn normalize_year(year: Option<String>) -> String {
    match year {
        Some(value) if !value.trim().is_empty() => value,
        _ => UNKNOWN_YEAR.to_string(),
    }
}

pub fn normalize_genres(input: Option<GenresInput>) -> Vec<String> {
    let genres: Vec<String> = match input {
        Some(GenresInput::Text(raw)) => raw
            .split(',')
            .map(str::trim)
            .filter(|genre| !genre.is_empty())
            .map(str::to_string)
            .collect(),
        Some(GenresInput::List(list)) => list
            .into_iter()
            .map(|genre| genre.trim().to_string())
            .filter(|genre| !genre.is_empty())
            .collect(),
        None => Vec::new(),
    };

    if genres.is_empty() {
        vec![NO_GENRES.to_string()]
    } else {
        genres
    }
}

/// Splits a MovieLens-style title such as "Toy Story (1995)" into the bare
/// title and its release year; titles without a trailing year keep the
/// unknown-year default.
pub fn split_title_year(raw: &str) -> (String, String) {
    let trimmed = raw.trim();
    if let Some(open) = trimmed.rfind(" (") {
        let tail = &trimmed[open + 2..];
        if let Some(year) = tail.strip_suffix(')') {
            if year.len() == 4 && year.chars().all(|c| c.is_ascii_digit()) {
                return (trimmed[..open].trim_end().to_string(), year.to_string());
            }
        }
    }
    (trimmed.to_string(), UNKNOWN_YEAR.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_defaults_when_absent_or_blank() {
        assert_eq!(normalize_year(None), "9999");
        assert_eq!(normalize_year(Some(String::new())), "9999");
        assert_eq!(normalize_year(Some("   ".to_string())), "9999");
        assert_eq!(normalize_year(Some("1995".to_string())), "1995");
    }

    #[test]
    fn genres_split_on_commas_and_trim() {
        let genres = normalize_genres(Some(GenresInput::Text(
            "Action, Comedy , Thriller".to_string(),
        )));
        assert_eq!(genres, vec!["Action", "Comedy", "Thriller"]);
    }

    #[test]
    fn empty_genre_inputs_fall_back_to_placeholder() {
        assert_eq!(normalize_genres(None), vec![NO_GENRES]);
        assert_eq!(
            normalize_genres(Some(GenresInput::Text(String::new()))),
            vec![NO_GENRES]
        );
        assert_eq!(
            normalize_genres(Some(GenresInput::Text(" , , ".to_string()))),
            vec![NO_GENRES]
        );
        assert_eq!(
            normalize_genres(Some(GenresInput::List(vec![
                String::new(),
                "  ".to_string()
            ]))),
            vec![NO_GENRES]
        );
    }

    #[test]
    fn genre_lists_pass_through_trimmed() {
        let genres = normalize_genres(Some(GenresInput::List(vec![
            " Drama ".to_string(),
            "Romance".to_string(),
        ])));
        assert_eq!(genres, vec!["Drama", "Romance"]);
    }

    #[test]
    fn genres_deserialize_from_string_or_list() {
        let body: CreateMovie =
            serde_json::from_str(r#"{"movieId": 7, "genres": "Action,Comedy"}"#).unwrap();
        assert_eq!(normalize_genres(body.genres), vec!["Action", "Comedy"]);

        let body: CreateMovie =
            serde_json::from_str(r#"{"movieId": 7, "genres": ["Action", "Comedy"]}"#).unwrap();
        assert_eq!(normalize_genres(body.genres), vec!["Action", "Comedy"]);
    }

    #[test]
    fn title_year_split_handles_movielens_titles() {
        assert_eq!(
            split_title_year("Toy Story (1995)"),
            ("Toy Story".to_string(), "1995".to_string())
        );
        assert_eq!(
            split_title_year("Heat"),
            ("Heat".to_string(), "9999".to_string())
        );
        assert_eq!(
            split_title_year("Blade Runner (Director's Cut)"),
            (
                "Blade Runner (Director's Cut)".to_string(),
                "9999".to_string()
            )
        );
    }
}
