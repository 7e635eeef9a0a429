/// Reddit ETL
///
/// An ETL pipeline that extracts subreddit posts and comments, derives features,
/// and loads them into SQLite together with daily statistics.
mod cli;
mod db;
mod error;
mod etl;
mod logging;
mod models;
mod pipeline;
mod reddit;
mod source;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use db::Database;
use reddit::{Credentials, RedditClient};
use std::env;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    cli.validate()?;

    let log_sink = logging::build_log_sink(&cli.log_file)?;

    run(cli, log_sink.clone()).with_subscriber(log_sink).await
}

async fn run(cli: Cli, log_sink: Dispatch) -> Result<()> {
    println!("🚀 Starting Reddit ETL...");

    let credentials = Credentials::from_env().context("Reddit credentials missing. Please check your .env file")?;
    let client = RedditClient::new(credentials).context("Failed to create Reddit client")?;

    client.test_connection().await.context("Failed to authenticate with Reddit")?;
    println!("✅ Authenticated with Reddit");

    let database_url = cli
        .database_url
        .clone()
        .or_else(|| env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| db::DEFAULT_DATABASE_URL.to_string());

    println!("\n💾 Opening database at {}...", database_url);
    let database = Database::new(&database_url).await.context("Failed to open database")?;
    database.init_schema().await.context("Failed to create database schema")?;
    println!("✅ Database schema ready");

    let config = cli.pipeline_config();
    tracing::info!(
        "Processing {} subreddits, {} {} posts each",
        config.subreddits.len(),
        config.limit,
        config.sort
    );

    let pipeline = pipeline::Pipeline::new(client, database, config).with_log_sink(log_sink);
    pipeline::run_and_report(&pipeline).await.context("Pipeline execution failed")?;

    tracing::info!("ETL pipeline execution completed!");
    println!("\n✨ Data stored in: {}", database_url);

    Ok(())
}
