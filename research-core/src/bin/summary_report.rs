// research-core/src/bin/summary_report.rs
// Print the reconciled metric series of a dataset

use anyhow::{anyhow, Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

use research_common::data::repository::MetricRepository;
use research_core::config::Settings;
use research_core::service::metric_summary;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let dataset_id = args
        .next()
        .ok_or_else(|| anyhow!("Usage: summary_report <dataset-id> [from-month] [to-month]"))?;
    let from = args.next();
    let to = args.next();

    let settings = Settings::new().context("Failed to load settings")?;
    let options = SqliteConnectOptions::from_str(&settings.database.url)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(settings.database.max_connections)
        .connect_with(options)
        .await?;
    let repository = MetricRepository::from_pool(pool);

    let summary = metric_summary(
        &repository,
        &dataset_id,
        None,
        from.as_deref(),
        to.as_deref(),
    )
    .await?;

    if summary.series_by_metric.is_empty() {
        println!("[SUMMARY] No records for dataset {}", dataset_id);
        return Ok(());
    }

    println!("[SUMMARY] Dataset {}", dataset_id);
    println!("[SUMMARY] Buckets: {}", summary.time_buckets.join(", "));
    for (metric, by_bucket) in &summary.series_by_metric {
        for (bucket, value) in by_bucket {
            println!("{:<28} {:<10} {:>14.4}", metric, bucket, value);
        }
    }

    Ok(())
}
