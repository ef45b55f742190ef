use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sqlx::PgPool;
use thiserror::Error;

use crate::db;
use crate::models::{RatingEvent, RatingSummary};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("ratings source unavailable")]
    SourceUnavailable(#[source] sqlx::Error),
    #[error("summary sink write failed")]
    SinkWrite(#[source] sqlx::Error),
    #[error("snapshot write failed for {path}")]
    SnapshotWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct AggregateReport {
    pub event_count: usize,
    pub summary_count: usize,
}

/// Folds rating events into one summary per movie. Accumulation is
/// commutative, so input order only matters up to float rounding noise;
/// a movie with no events never gains an entry.
pub fn summarize(events: impl IntoIterator<Item = RatingEvent>) -> Vec<RatingSummary> {
    let mut totals: HashMap<i64, (i64, f64)> = HashMap::new();

    for event in events {
        let entry = totals.entry(event.movie_id).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += event.rating;
    }

    totals
        .into_iter()
        .map(|(movie_id, (count, sum))| RatingSummary {
            movie_id,
            avg_rating: round_to_cents(sum / count as f64),
            rating_count: count,
        })
        .collect()
}

/// Rounds to two fractional digits, half away from zero (4.125 -> 4.13).
pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Writes the snapshot next to its final path and renames it into place, so a
/// failed run cannot leave a truncated file behind.
pub fn write_snapshot(path: &Path, summaries: &[RatingSummary]) -> std::io::Result<()> {
    let mut ordered = summaries.to_vec();
    ordered.sort_by_key(|summary| summary.movie_id);

    let json = serde_json::to_vec_pretty(&ordered)?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, &json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub async fn run(
    ratings: &PgPool,
    catalog: &PgPool,
    snapshot: Option<&Path>,
) -> Result<AggregateReport, AggregateError> {
    let events = db::fetch_rating_events(ratings)
        .await
        .map_err(AggregateError::SourceUnavailable)?;
    let event_count = events.len();

    let summaries = summarize(events);

    db::replace_summaries(catalog, &summaries)
        .await
        .map_err(AggregateError::SinkWrite)?;

    if let Some(path) = snapshot {
        write_snapshot(path, &summaries).map_err(|source| AggregateError::SnapshotWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }

    Ok(AggregateReport {
        event_count,
        summary_count: summaries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(movie_id: i64, rating: f64) -> RatingEvent {
        RatingEvent { movie_id, rating }
    }

    fn sorted(mut summaries: Vec<RatingSummary>) -> Vec<RatingSummary> {
        summaries.sort_by_key(|summary| summary.movie_id);
        summaries
    }

    #[test]
    fn averages_group_by_movie() {
        let events = vec![event(1, 4.0), event(1, 5.0), event(2, 3.0)];
        let summaries = sorted(summarize(events));

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].movie_id, 1);
        assert_eq!(summaries[0].rating_count, 2);
        assert_eq!(summaries[0].avg_rating, 4.5);
        assert_eq!(summaries[1].movie_id, 2);
        assert_eq!(summaries[1].rating_count, 1);
        assert_eq!(summaries[1].avg_rating, 3.0);
    }

    #[test]
    fn repeated_runs_produce_identical_output() {
        let events = vec![event(1, 4.0), event(2, 2.5), event(1, 3.0), event(3, 5.0)];
        let first = sorted(summarize(events.clone()));
        let second = sorted(summarize(events));
        assert_eq!(first, second);
    }

    #[test]
    fn no_summary_has_a_zero_count() {
        let events = vec![event(5, 1.0), event(6, 2.0), event(5, 3.0)];
        for summary in summarize(events) {
            assert!(summary.rating_count > 0);
        }
    }

    #[test]
    fn empty_input_yields_no_summaries() {
        assert!(summarize(Vec::new()).is_empty());
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_to_cents(4.125), 4.13);
        assert_eq!(round_to_cents(0.005), 0.01);
        assert_eq!(round_to_cents(3.0), 3.0);

        // 1/3 truncates down.
        let summaries = summarize(vec![event(1, 1.0), event(1, 0.0), event(1, 0.0)]);
        assert_eq!(summaries[0].avg_rating, 0.33);
    }

    #[test]
    fn snapshot_replaces_previous_contents() {
        let dir = std::env::temp_dir().join("movie-catalog-snapshot-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("aggregated_ratings.json");

        write_snapshot(&path, &summarize(vec![event(1, 4.0), event(1, 5.0)])).unwrap();
        write_snapshot(&path, &summarize(vec![event(2, 3.0)])).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<RatingSummary> = serde_json::from_str(&contents).unwrap();
        assert_eq!(
            parsed,
            vec![RatingSummary {
                movie_id: 2,
                avg_rating: 3.0,
                rating_count: 1
            }]
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
