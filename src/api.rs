use anyhow::Context;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info};

use crate::db::{self, MovieChanges};
use crate::models::{
    normalize_genres, normalize_year, CreateMovie, MovieFields, MovieRecord, UpdateMovie,
};

#[derive(Clone)]
pub struct AppState {
    pub catalog: PgPool,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] sqlx::Error),
}

impl ApiError {
    fn movie_not_found() -> Self {
        ApiError::NotFound("Movie not found".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Conflict(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::Internal(err) => {
                error!("request failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/movies_with_ratings", get(list_movies_handler))
        .route("/mongo/movies", post(create_movie_handler))
        .route(
            "/mongo/movies/:movie_id",
            get(read_movie_handler)
                .put(update_movie_handler)
                .delete(delete_movie_handler),
        )
        .layer(from_fn(cors_middleware))
        .with_state(state)
}

async fn landing_handler() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Movie API. Try /movies_with_ratings" }))
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(include_str!("../assets/dashboard.html"))
}

async fn list_movies_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let movies = db::fetch_movies_with_ratings(&state.catalog).await?;
    Ok(Json(movies))
}

async fn create_movie_handler(
    State(state): State<AppState>,
    Json(body): Json<CreateMovie>,
) -> Result<Json<Value>, ApiError> {
    let record = MovieRecord {
        movie_id: body.movie_id,
        title: body.title,
        year: normalize_year(body.year),
        genres: normalize_genres(body.genres),
    };

    if !db::create_movie(&state.catalog, &record).await? {
        return Err(ApiError::Conflict(
            "Movie with this id already exists".to_string(),
        ));
    }

    Ok(Json(json!({
        "id": record.movie_id.to_string(),
        "avg_rating": 0.0,
        "rating_count": 0,
    })))
}

async fn read_movie_handler(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> Result<Json<MovieFields>, ApiError> {
    let movie = db::get_movie(&state.catalog, movie_id)
        .await?
        .ok_or_else(ApiError::movie_not_found)?;
    Ok(Json(movie.into()))
}

async fn update_movie_handler(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
    Json(body): Json<UpdateMovie>,
) -> Result<Json<Value>, ApiError> {
    let changes = MovieChanges {
        title: body.title,
        year: body.year.map(|year| normalize_year(Some(year))),
        genres: body.genres.map(|genres| normalize_genres(Some(genres))),
    };

    if !db::update_movie(&state.catalog, movie_id, &changes).await? {
        return Err(ApiError::movie_not_found());
    }
    Ok(Json(json!({ "status": "updated" })))
}

async fn delete_movie_handler(
    State(state): State<AppState>,
    Path(movie_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    if !db::delete_movie(&state.catalog, movie_id).await? {
        return Err(ApiError::movie_not_found());
    }
    Ok(Json(json!({ "status": "deleted" })))
}

fn apply_cors_headers(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,PUT,DELETE,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type"),
    );
}

async fn cors_middleware(req: Request, next: Next) -> Response {
    if req.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut response);
        return response;
    }

    let mut response = next.run(req).await;
    apply_cors_headers(&mut response);
    response
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

pub async fn serve(catalog: PgPool, bind: &str) -> anyhow::Result<()> {
    let app = build_router(AppState { catalog });
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    info!("movie catalog API listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .context("server failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError::movie_not_found().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_400() {
        let response = ApiError::Conflict("Movie with this id already exists".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_errors_map_to_500() {
        let response = ApiError::Internal(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_body_carries_detail_message() {
        let response = ApiError::movie_not_found().into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "detail": "Movie not found" }));
    }

    #[test]
    fn preflight_headers_are_permissive() {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(&mut response);
        assert_eq!(
            response.headers().get("access-control-allow-origin"),
            Some(&HeaderValue::from_static("*"))
        );
    }
}
