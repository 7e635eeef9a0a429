/// Pipeline Module
///
/// Orchestrates the ETL run per subreddit: Extract → Transform → Load → comments →
/// daily stats, with each subreddit isolated from the failures of the others.
use crate::db::Database;
use crate::etl::{
    extract::{extract_comments, extract_posts},
    load::{append_comments, append_posts, upsert_daily_stat, upsert_daily_stat_on, ConflictPolicy},
    transform::transform_posts,
};
use crate::models::{EnrichedPost, SortMode};
use crate::source::Source;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument};

/// Pipeline execution statistics
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub subreddits_attempted: usize,
    pub subreddits_completed: usize,
    /// Runs that stopped early because there was nothing to load
    pub subreddits_empty: usize,
    pub subreddits_failed: usize,
    pub posts_loaded: usize,
    pub comments_loaded: usize,
    pub elapsed_time: Duration,
    pub errors: Vec<PipelineError>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success_rate(&self) -> f64 {
        if self.subreddits_attempted == 0 {
            0.0
        } else {
            (self.subreddits_completed as f64 / self.subreddits_attempted as f64) * 100.0
        }
    }
}

/// A subreddit run that was aborted
#[derive(Debug, Clone)]
pub struct PipelineError {
    pub subreddit: String,
    pub stage: PipelineStage,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Load,
    Stats,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStage::Load => write!(f, "Load"),
            PipelineStage::Stats => write!(f, "Stats"),
        }
    }
}

/// How a single subreddit run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubredditOutcome {
    /// Extraction returned nothing
    NoPosts,
    /// Transformation returned nothing
    NoRows,
    Completed { posts_loaded: usize, comments_loaded: usize },
}

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub subreddits: Vec<String>,
    pub limit: usize,
    pub sort: SortMode,
    pub extract_comments: bool,
    /// How many of the highest scoring posts get their comments pulled
    pub top_posts_for_comments: usize,
    pub comments_per_post: usize,
    /// Pause between consecutive post records
    pub post_delay: Duration,
    /// Pause after each post's comment extraction
    pub comment_delay: Duration,
    pub conflict_policy: ConflictPolicy,
    /// Day to roll up; the current UTC date when unset
    pub stats_date: Option<NaiveDate>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subreddits: vec!["python".to_string(), "datascience".to_string(), "MachineLearning".to_string()],
            limit: 50,
            sort: SortMode::Hot,
            extract_comments: true,
            top_posts_for_comments: 10,
            comments_per_post: 20,
            post_delay: Duration::from_millis(100),
            comment_delay: Duration::from_secs(1),
            conflict_policy: ConflictPolicy::Fail,
            stats_date: None,
        }
    }
}

/// Error raised inside a subreddit run, tagged with the stage it came from
struct StageError {
    stage: PipelineStage,
    error: anyhow::Error,
}

trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> std::result::Result<T, StageError>;
}

impl<T, E: Into<anyhow::Error>> AtStage<T> for std::result::Result<T, E> {
    fn at(self, stage: PipelineStage) -> std::result::Result<T, StageError> {
        self.map_err(|e| StageError { stage, error: e.into() })
    }
}

/// Main ETL Pipeline
pub struct Pipeline<S: Source> {
    source: S,
    database: Database,
    config: PipelineConfig,
    log_sink: Dispatch,
}

impl<S: Source> Pipeline<S> {
    /// Create a new pipeline; it logs to whatever subscriber is current at this point
    pub fn new(source: S, database: Database, config: PipelineConfig) -> Self {
        let log_sink = tracing::dispatcher::get_default(|current| current.clone());
        Self { source, database, config, log_sink }
    }

    /// Route this pipeline's logs to `sink`
    pub fn with_log_sink(mut self, sink: Dispatch) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Run every configured subreddit in order. A failed subreddit is logged and
    /// recorded; it never stops the remaining ones.
    pub async fn run(&self) -> PipelineStats {
        let start_time = Instant::now();
        let mut stats = PipelineStats::new();

        for subreddit in &self.config.subreddits {
            stats.subreddits_attempted += 1;

            let span = tracing::info_span!("subreddit", name = %subreddit);
            let result =
                self.run_subreddit(subreddit).instrument(span).with_subscriber(self.log_sink.clone()).await;

            match result {
                Ok(SubredditOutcome::Completed { posts_loaded, comments_loaded }) => {
                    stats.subreddits_completed += 1;
                    stats.posts_loaded += posts_loaded;
                    stats.comments_loaded += comments_loaded;
                }
                Ok(SubredditOutcome::NoPosts | SubredditOutcome::NoRows) => stats.subreddits_empty += 1,
                Err(e) => {
                    stats.subreddits_failed += 1;
                    stats.errors.push(e);
                }
            }
        }

        stats.elapsed_time = start_time.elapsed();
        stats
    }

    /// Run the complete pipeline for one subreddit, logging (not raising) failures
    pub async fn run_subreddit(&self, subreddit: &str) -> std::result::Result<SubredditOutcome, PipelineError> {
        tracing::info!("Starting ETL pipeline for r/{}", subreddit);

        match self.process_subreddit(subreddit).await {
            Ok(outcome) => Ok(outcome),
            Err(StageError { stage, error }) => {
                tracing::error!("Failed to process r/{} at {} stage: {:#}", subreddit, stage, error);
                Err(PipelineError { subreddit: subreddit.to_string(), stage, message: format!("{:#}", error) })
            }
        }
    }

    async fn process_subreddit(&self, subreddit: &str) -> std::result::Result<SubredditOutcome, StageError> {
        // Extract
        let raw_posts =
            extract_posts(&self.source, subreddit, self.config.limit, self.config.sort, self.config.post_delay).await;

        if raw_posts.is_empty() {
            tracing::warn!("No posts extracted, stopping pipeline");
            return Ok(SubredditOutcome::NoPosts);
        }

        // Transform
        let posts = transform_posts(&raw_posts);

        if posts.is_empty() {
            tracing::warn!("No data after transformation, stopping pipeline");
            return Ok(SubredditOutcome::NoRows);
        }

        // Load
        let report = append_posts(&self.database, &posts, self.config.conflict_policy)
            .await
            .context(format!("Failed to load {} posts", posts.len()))
            .at(PipelineStage::Load)?;

        let comments_loaded = if self.config.extract_comments { self.load_top_comments(&posts).await } else { 0 };

        let stat = match self.config.stats_date {
            Some(date) => upsert_daily_stat_on(&self.database, subreddit, date).await,
            None => upsert_daily_stat(&self.database, subreddit).await,
        };
        stat.context("Failed to generate statistics").at(PipelineStage::Stats)?;

        tracing::info!("ETL pipeline completed successfully");
        Ok(SubredditOutcome::Completed { posts_loaded: report.inserted, comments_loaded })
    }

    /// Pull and store comments of the highest scoring posts. A failure on one post
    /// is logged and the next post is processed.
    async fn load_top_comments(&self, posts: &[EnrichedPost]) -> usize {
        let top = top_post_ids(posts, self.config.top_posts_for_comments);
        tracing::info!("Extracting comments for top {} posts...", top.len());

        let mut loaded = 0;
        for post_id in top {
            let comments = extract_comments(&self.source, post_id, self.config.comments_per_post).await;

            match append_comments(&self.database, &comments, self.config.conflict_policy).await {
                Ok(report) => loaded += report.inserted,
                Err(e) => tracing::error!("Error loading comments for post {}: {}", post_id, e),
            }

            sleep_for(self.config.comment_delay).await;
        }

        loaded
    }

    /// Print final statistics
    pub fn print_final_stats(&self, stats: &PipelineStats) {
        println!("\n📊 Pipeline Statistics:");
        println!("   ⏱️  Total time: {:.2}s", stats.elapsed_time.as_secs_f64());
        println!(
            "   📦 Subreddits: {} attempted, {} completed, {} empty, {} failed",
            stats.subreddits_attempted, stats.subreddits_completed, stats.subreddits_empty, stats.subreddits_failed
        );
        println!("   ✅ Success rate: {:.1}%", stats.success_rate());
        println!("   📝 Posts loaded: {}", stats.posts_loaded);
        println!("   💬 Comments loaded: {}", stats.comments_loaded);

        if !stats.errors.is_empty() {
            println!("\n❌ Errors encountered: {}", stats.errors.len());
            for (i, error) in stats.errors.iter().enumerate() {
                println!("   {}. [{}] r/{}: {}", i + 1, error.stage, error.subreddit, error.message);
            }
        }
    }
}

async fn sleep_for(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// Ids of the `n` highest scoring posts. Ties keep dataset order.
pub fn top_post_ids(posts: &[EnrichedPost], n: usize) -> Vec<&str> {
    let mut ranked: Vec<&EnrichedPost> = posts.iter().collect();
    // stable sort, equal scores stay in input order
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.into_iter().take(n).map(|p| p.id.as_str()).collect()
}

/// Convenience wrapper used by the binary: run and fail only on bootstrap problems
pub async fn run_and_report<S: Source>(pipeline: &Pipeline<S>) -> Result<PipelineStats> {
    pipeline.database().test_connection().await.context("Store is not reachable")?;

    let stats = pipeline.run().await;
    pipeline.print_final_stats(&stats);

    println!("\n📈 Daily statistics:");
    for subreddit in &pipeline.config.subreddits {
        let stored = pipeline.database().count_posts(Some(subreddit)).await?;
        match pipeline.database().daily_stats(subreddit).await?.last() {
            Some(day) => println!(
                "   r/{} on {}: {} posts today (avg score {:.1}, avg comments {:.1}, top {}) | {} stored",
                subreddit, day.date, day.total_posts, day.avg_score, day.avg_comments, day.top_post_score, stored
            ),
            None => println!("   r/{}: no posts today | {} stored", subreddit, stored),
        }
    }

    Ok(stats)
}
