use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod aggregate;
mod api;
mod db;
mod models;

#[derive(Parser)]
#[command(name = "movie-catalog")]
#[command(about = "Movie catalog API with batch rating aggregation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade both database schemas
    InitDb,
    /// Load a small demo catalog with ratings
    Seed,
    /// Import movies or ratings from a CSV file
    #[command(group(
        ArgGroup::new("input")
            .args(["movies", "ratings"])
            .required(true)
            .multiple(false)
    ))]
    Import {
        #[arg(long)]
        movies: Option<PathBuf>,
        #[arg(long)]
        ratings: Option<PathBuf>,
    },
    /// Recompute per-movie rating summaries from the ratings store
    Aggregate {
        /// Also write a JSON snapshot of the summaries
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Run the catalog HTTP API and dashboard
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        bind: String,
    },
}

async fn connect(env_var: &str) -> anyhow::Result<PgPool> {
    let url = std::env::var(env_var)
        .with_context(|| format!("{env_var} must be set to a Postgres instance"))?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .with_context(|| format!("failed to connect to the {env_var} database"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::InitDb => {
            let catalog = connect("CATALOG_DATABASE_URL").await?;
            let ratings = connect("RATINGS_DATABASE_URL").await?;
            db::init_catalog(&catalog).await?;
            db::init_ratings(&ratings).await?;
            println!("Schemas ready.");
        }
        Commands::Seed => {
            let catalog = connect("CATALOG_DATABASE_URL").await?;
            let ratings = connect("RATINGS_DATABASE_URL").await?;
            db::seed_catalog(&catalog).await?;
            db::seed_ratings(&ratings).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { movies, ratings } => {
            if let Some(csv) = movies {
                let catalog = connect("CATALOG_DATABASE_URL").await?;
                let inserted = db::import_movies_csv(&catalog, &csv).await?;
                println!("Imported {inserted} movies from {}.", csv.display());
            } else if let Some(csv) = ratings {
                let pool = connect("RATINGS_DATABASE_URL").await?;
                let inserted = db::import_ratings_csv(&pool, &csv).await?;
                println!("Inserted {inserted} ratings from {}.", csv.display());
            }
        }
        Commands::Aggregate { out } => {
            let ratings = connect("RATINGS_DATABASE_URL").await?;
            let catalog = connect("CATALOG_DATABASE_URL").await?;
            let report = aggregate::run(&ratings, &catalog, out.as_deref()).await?;
            println!(
                "Aggregated {} ratings into {} movie summaries.",
                report.event_count, report.summary_count
            );
            if let Some(path) = out {
                println!("Snapshot written to {}.", path.display());
            }
        }
        Commands::Serve { bind } => {
            let catalog = connect("CATALOG_DATABASE_URL").await?;
            api::serve(catalog, &bind).await?;
        }
    }

    Ok(())
}
