use anyhow::Context;
use chrono::DateTime;
use sqlx::{PgPool, Row};

use crate::models::{
    split_title_year, MovieRecord, MovieWithRating, RatingEvent, RatingSummary, NO_GENRES,
};

pub async fn init_catalog(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations/catalog").run(pool).await?;
    Ok(())
}

pub async fn init_ratings(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations/ratings").run(pool).await?;
    Ok(())
}

pub async fn seed_catalog(pool: &PgPool) -> anyhow::Result<()> {
    let movies = vec![
        (
            1_i64,
            "Toy Story",
            "1995",
            vec!["Adventure", "Animation", "Children", "Comedy", "Fantasy"],
        ),
        (2, "Jumanji", "1995", vec!["Adventure", "Children", "Fantasy"]),
        (3, "Heat", "1995", vec!["Action", "Crime", "Thriller"]),
        (4, "Casino", "1995", vec!["Crime", "Drama"]),
    ];

    for (id, title, year, genres) in movies {
        let genres: Vec<String> = genres.into_iter().map(str::to_string).collect();
        sqlx::query(
            r#"
            INSERT INTO movies (id, title, year, genres)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, year = EXCLUDED.year, genres = EXCLUDED.genres
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(year)
        .bind(&genres)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn seed_ratings(pool: &PgPool) -> anyhow::Result<()> {
    let ratings = vec![
        ("seed-001", 1_i64, 1_i64, 4.0),
        ("seed-002", 2, 1, 5.0),
        ("seed-003", 3, 1, 3.5),
        ("seed-004", 1, 2, 3.0),
        ("seed-005", 2, 3, 4.5),
        ("seed-006", 3, 3, 4.0),
    ];

    for (source_key, user_id, movie_id, rating) in ratings {
        sqlx::query(
            r#"
            INSERT INTO ratings (user_id, movie_id, rating, source_key)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(movie_id)
        .bind(rating)
        .bind(source_key)
        .execute(pool)
        .await?;
    }

    Ok(())
}

pub async fn import_movies_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        #[serde(rename = "movieId")]
        movie_id: i64,
        title: String,
        genres: String,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let (title, year) = split_title_year(&row.title);
        let genres: Vec<String> = row
            .genres
            .split('|')
            .map(str::trim)
            .filter(|genre| !genre.is_empty())
            .map(str::to_string)
            .collect();
        let genres = if genres.is_empty() {
            vec![NO_GENRES.to_string()]
        } else {
            genres
        };

        let result = sqlx::query(
            r#"
            INSERT INTO movies (id, title, year, genres)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET title = EXCLUDED.title, year = EXCLUDED.year, genres = EXCLUDED.genres
            "#,
        )
        .bind(row.movie_id)
        .bind(title)
        .bind(year)
        .bind(&genres)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_ratings_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        #[serde(rename = "userId")]
        user_id: i64,
        #[serde(rename = "movieId")]
        movie_id: i64,
        rating: f64,
        timestamp: i64,
    }

    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut inserted = 0usize;

    for result in reader.deserialize::<CsvRow>() {
        let row = result?;
        let rated_at = DateTime::from_timestamp(row.timestamp, 0)
            .with_context(|| format!("invalid rating timestamp {}", row.timestamp))?;
        let source_key = format!("{}-{}-{}", row.user_id, row.movie_id, row.timestamp);

        let result = sqlx::query(
            r#"
            INSERT INTO ratings (user_id, movie_id, rating, rated_at, source_key)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(row.user_id)
        .bind(row.movie_id)
        .bind(row.rating)
        .bind(rated_at)
        .bind(source_key)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn fetch_rating_events(pool: &PgPool) -> Result<Vec<RatingEvent>, sqlx::Error> {
    let rows = sqlx::query("SELECT movie_id, rating FROM ratings")
        .fetch_all(pool)
        .await?;

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        events.push(RatingEvent {
            movie_id: row.get("movie_id"),
            rating: row.get("rating"),
        });
    }

    Ok(events)
}

/// Replaces the whole summary table in one transaction so readers never see a
/// partially written run.
pub async fn replace_summaries(
    pool: &PgPool,
    summaries: &[RatingSummary],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM movie_ratings_summary")
        .execute(&mut *tx)
        .await?;

    for summary in summaries {
        sqlx::query(
            r#"
            INSERT INTO movie_ratings_summary (movie_id, avg_rating, rating_count)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(summary.movie_id)
        .bind(summary.avg_rating)
        .bind(summary.rating_count)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn fetch_movies_with_ratings(
    pool: &PgPool,
) -> Result<Vec<MovieWithRating>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT m.id, m.title, m.year, m.genres,
               COALESCE(s.avg_rating, 0.0) AS avg_rating,
               COALESCE(s.rating_count, 0) AS rating_count
        FROM movies m
        LEFT JOIN movie_ratings_summary s ON s.movie_id = m.id
        ORDER BY m.id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut movies = Vec::with_capacity(rows.len());
    for row in rows {
        let genres: Vec<String> = row.get("genres");
        movies.push(MovieWithRating {
            movie_id: row.get("id"),
            title: row.get("title"),
            year: row.get("year"),
            genres: genres.join(", "),
            avg_rating: row.get("avg_rating"),
            rating_count: row.get("rating_count"),
        });
    }

    Ok(movies)
}

/// Inserts the movie and its zeroed summary row together; returns false without
/// touching either table when the id is already taken.
pub async fn create_movie(pool: &PgPool, movie: &MovieRecord) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let inserted = sqlx::query(
        r#"
        INSERT INTO movies (id, title, year, genres)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(movie.movie_id)
    .bind(&movie.title)
    .bind(&movie.year)
    .bind(&movie.genres)
    .execute(&mut *tx)
    .await?
    .rows_affected()
        > 0;

    if !inserted {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO movie_ratings_summary (movie_id, avg_rating, rating_count)
        VALUES ($1, 0.0, 0)
        ON CONFLICT (movie_id) DO NOTHING
        "#,
    )
    .bind(movie.movie_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn get_movie(pool: &PgPool, movie_id: i64) -> Result<Option<MovieRecord>, sqlx::Error> {
    let row = sqlx::query("SELECT id, title, year, genres FROM movies WHERE id = $1")
        .bind(movie_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(|row| MovieRecord {
        movie_id: row.get("id"),
        title: row.get("title"),
        year: row.get("year"),
        genres: row.get("genres"),
    }))
}

#[derive(Debug, Clone, Default)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub year: Option<String>,
    pub genres: Option<Vec<String>>,
}

pub async fn update_movie(
    pool: &PgPool,
    movie_id: i64,
    changes: &MovieChanges,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE movies
        SET title = COALESCE($2, title),
            year = COALESCE($3, year),
            genres = COALESCE($4, genres)
        WHERE id = $1
        "#,
    )
    .bind(movie_id)
    .bind(&changes.title)
    .bind(&changes.year)
    .bind(&changes.genres)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete_movie(pool: &PgPool, movie_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM movies WHERE id = $1")
        .bind(movie_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
