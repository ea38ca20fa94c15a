use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use progression_builder::batch::run_batch;
use progression_builder::catalog::SignatureCatalog;
use progression_builder::config::AppConfig;
use progression_builder::db::{self, PgStore};
use progression_builder::engine::ProgressionEngine;
use progression_builder::registry::MajorRegistry;
use progression_builder::store::ProgressionStore;
use progression_builder::{report, telemetry};

#[derive(Parser)]
#[command(name = "progression-builder")]
#[command(about = "Academic journey and progression builder for Group Scholar", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load the major catalog and a small demo cohort
    Seed,
    /// Import enrollments from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Rebuild journeys, milestones and progressions
    Rebuild {
        /// Only rebuild this student
        #[arg(long)]
        student: Option<Uuid>,
        /// Reference date for recency checks (defaults to today)
        #[arg(long)]
        as_of: Option<NaiveDate>,
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Generate a markdown progression report
    Report {
        #[arg(long, default_value = "progression-report.md")]
        out: PathBuf,
    },
}

fn load_catalog(config: &AppConfig) -> anyhow::Result<SignatureCatalog> {
    let catalog = match &config.catalog_path {
        Some(path) => SignatureCatalog::from_path(path)
            .with_context(|| format!("failed to load catalog from {}", path.display()))?,
        None => SignatureCatalog::builtin().context("built-in catalog is invalid")?,
    };
    Ok(catalog)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("invalid configuration")?;
    telemetry::init(&config.log_level).context("failed to initialise logging")?;

    let database_url = config
        .database_url()
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(config.concurrency.max(1) as u32 + 1)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let catalog = load_catalog(&config)?;
            db::seed(&pool, &catalog).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} enrollments from {}.", csv.display());
        }
        Commands::Rebuild {
            student,
            as_of,
            concurrency,
        } => {
            let catalog = load_catalog(&config)?;
            let registry = db::load_registry(&pool).await?;
            let registry: Arc<dyn MajorRegistry> = if registry.is_empty() {
                tracing::warn!("No majors in the database, using the catalog's programs");
                Arc::new(catalog.reference_registry())
            } else {
                Arc::new(registry)
            };

            let engine = ProgressionEngine::new(
                Arc::new(catalog),
                registry,
                Arc::new(config.engine.clone()),
            );
            let store = Arc::new(PgStore::new(pool.clone()));
            let students = match student {
                Some(student_id) => vec![student_id],
                None => store.student_ids().await?,
            };

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, finishing in-flight students");
                    on_signal.cancel();
                }
            });

            let summary = run_batch(
                store,
                engine,
                students,
                as_of.unwrap_or_else(|| Utc::now().date_naive()),
                concurrency.unwrap_or(config.concurrency),
                cancel,
            )
            .await;
            print!("{}", report::format_batch_summary(&summary));
        }
        Commands::Report { out } => {
            let rows = db::fetch_progression_summaries(&pool).await?;
            let report = report::build_report(Utc::now().date_naive(), &rows);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
