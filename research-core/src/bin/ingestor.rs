// research-core/src/bin/ingestor.rs
// CLI entry point: register a dataset and ingest a workbook

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use research_common::data::repository::MetricRepository;
use research_common::data::types::{DataError, Dataset, DatasetStatus};
use research_common::data::MetricStore;
use research_core::config::Settings;
use research_core::ingest::month::{month_from_file_name, parse_month_text};
use research_core::service::IngestionService;

struct Args {
    workbook: PathBuf,
    dataset_id: String,
    category_id: String,
    category_name: Option<String>,
    month: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let workbook = args
        .next()
        .ok_or_else(|| anyhow!(usage()))
        .map(PathBuf::from)?;
    let dataset_id = args.next().ok_or_else(|| anyhow!(usage()))?;
    let category_id = args.next().ok_or_else(|| anyhow!(usage()))?;
    let category_name = args.next();
    let month = match args.next() {
        Some(raw) => Some(
            parse_month_text(&raw)
                .ok_or_else(|| anyhow!("Invalid month '{}', expected YYYY-MM", raw))?,
        ),
        None => None,
    };

    Ok(Args {
        workbook,
        dataset_id,
        category_id,
        category_name,
        month,
    })
}

fn usage() -> String {
    "Usage: ingestor <workbook.xlsx> <dataset-id> <category-id> [category-name] [month]"
        .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = parse_args()?;
    let settings = Settings::new().context("Failed to load settings")?;

    println!("[INGESTOR] Database: {}", settings.database.url);

    let options = SqliteConnectOptions::from_str(&settings.database.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .max_lifetime(Duration::from_secs(settings.database.max_lifetime * 60))
        .connect_with(options)
        .await?;

    let repository = Arc::new(MetricRepository::from_pool(pool));
    repository.ensure_schema().await?;

    let category_name = args
        .category_name
        .clone()
        .unwrap_or_else(|| args.category_id.clone());
    repository
        .upsert_category(&args.category_id, &category_name)
        .await?;

    // Reuse the dataset on re-ingestion, register it on first run.
    match repository.get_dataset(&args.dataset_id).await {
        Ok(_) => {
            println!("[INGESTOR] Re-ingesting dataset {}", args.dataset_id);
        }
        Err(DataError::NotFound(_)) => {
            let file_name = args
                .workbook
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let time_from = args
                .month
                .clone()
                .or_else(|| month_from_file_name(&file_name));
            repository
                .insert_dataset(&Dataset {
                    id: args.dataset_id.clone(),
                    category_id: args.category_id.clone(),
                    name: file_name,
                    status: DatasetStatus::Uploaded,
                    time_from,
                    created_at: Utc::now(),
                })
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    let service = Arc::new(IngestionService::new(
        repository.clone(),
        repository.clone(),
    ));
    let reports = service
        .ingest_workbook_file(&args.dataset_id, &args.workbook)
        .await?;

    if reports.is_empty() {
        println!("⚠️ [INGESTOR] No recognized sheets in {:?}", args.workbook);
        return Ok(());
    }

    for report in &reports {
        match &report.error {
            None => println!(
                "✅ [INGESTOR] {}: {} records",
                report.sheet, report.records
            ),
            Some(error) => println!("⚠️ [INGESTOR] {}: {}", report.sheet, error),
        }
    }

    let ok = reports.iter().filter(|r| r.error.is_none()).count();
    println!(
        "[INGESTOR] Done: {}/{} sheets ingested for dataset {}",
        ok,
        reports.len(),
        args.dataset_id
    );

    if ok == 0 {
        return Err(anyhow!("All sheets failed"));
    }
    Ok(())
}
