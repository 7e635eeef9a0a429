/// CLI Module
///
/// Command-line interface configuration using clap.
use crate::etl::load::ConflictPolicy;
use crate::logging::DEFAULT_LOG_FILE;
use crate::models::SortMode;
use crate::pipeline::PipelineConfig;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest pause allowed between post records
pub const MIN_POST_DELAY_MS: u64 = 100;
/// Smallest pause allowed between comment extractions
pub const MIN_COMMENT_DELAY_MS: u64 = 1000;

/// Reddit ETL - Subreddit trend pipeline
///
/// Extract posts and comments from Reddit, derive features, and load them into SQLite
#[derive(Parser, Debug)]
#[command(name = "reddit-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subreddit to process, repeatable (defaults to python, datascience, MachineLearning)
    #[arg(short = 'r', long = "subreddit", value_name = "NAME")]
    pub subreddits: Vec<String>,

    /// Posts to extract per subreddit
    #[arg(short = 'n', long, value_name = "COUNT", default_value = "50")]
    pub limit: usize,

    /// Listing order: hot, new or top (top of the day). Unknown values fall back to hot
    #[arg(short = 's', long, value_name = "MODE", default_value = "hot")]
    pub sort: String,

    /// Skip comment extraction for the top posts
    #[arg(long)]
    pub no_comments: bool,

    /// Database path or sqlite: URL (overrides DATABASE_URL env var)
    #[arg(short = 'd', long, value_name = "URL")]
    pub database_url: Option<String>,

    /// What to do with posts and comments that are already stored
    #[arg(long, value_enum, default_value_t = ConflictPolicy::Fail)]
    pub on_conflict: ConflictPolicy,

    /// Pause between post records in milliseconds
    #[arg(long, value_name = "MS", default_value = "100")]
    pub post_delay_ms: u64,

    /// Pause between comment extractions in milliseconds
    #[arg(long, value_name = "MS", default_value = "1000")]
    pub comment_delay_ms: u64,

    /// Day to roll up in the daily statistics (defaults to the current UTC date)
    #[arg(long, value_name = "YYYY-MM-DD")]
    pub stats_date: Option<NaiveDate>,

    /// Log file, written in addition to stdout
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    pub log_file: PathBuf,
}

impl Cli {
    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.limit == 0 {
            anyhow::bail!("Limit must be greater than 0");
        }

        if let Some(name) = self.subreddits.iter().find(|s| s.trim().is_empty()) {
            anyhow::bail!("Subreddit name '{}' is blank", name);
        }

        if self.post_delay_ms < MIN_POST_DELAY_MS {
            anyhow::bail!("Post delay must be at least {}ms to respect rate limits", MIN_POST_DELAY_MS);
        }

        if self.comment_delay_ms < MIN_COMMENT_DELAY_MS {
            anyhow::bail!("Comment delay must be at least {}ms to respect rate limits", MIN_COMMENT_DELAY_MS);
        }

        Ok(())
    }

    /// Build the pipeline configuration from the arguments
    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        let subreddits = if self.subreddits.is_empty() {
            defaults.subreddits.clone()
        } else {
            self.subreddits.iter().map(|s| s.trim().trim_start_matches("r/").to_string()).collect()
        };

        PipelineConfig {
            subreddits,
            limit: self.limit,
            sort: SortMode::parse_lenient(&self.sort),
            extract_comments: !self.no_comments,
            post_delay: Duration::from_millis(self.post_delay_ms),
            comment_delay: Duration::from_millis(self.comment_delay_ms),
            conflict_policy: self.on_conflict,
            stats_date: self.stats_date,
            ..defaults
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["reddit-etl"]).unwrap();
        cli.validate().unwrap();

        let config = cli.pipeline_config();
        assert_eq!(config.subreddits, vec!["python", "datascience", "MachineLearning"]);
        assert_eq!(config.limit, 50);
        assert_eq!(config.sort, SortMode::Hot);
        assert!(config.extract_comments);
        assert_eq!(config.conflict_policy, ConflictPolicy::Fail);
        assert_eq!(config.post_delay, Duration::from_millis(100));
        assert_eq!(config.comment_delay, Duration::from_secs(1));
        assert_eq!(config.stats_date, None);
    }

    #[test]
    fn test_explicit_arguments() {
        let cli = Cli::try_parse_from([
            "reddit-etl",
            "-r",
            "rust",
            "--subreddit",
            "r/golang",
            "-n",
            "10",
            "--sort",
            "top",
            "--no-comments",
            "--on-conflict",
            "skip",
            "--stats-date",
            "2024-03-01",
        ])
        .unwrap();
        cli.validate().unwrap();

        let config = cli.pipeline_config();
        assert_eq!(config.subreddits, vec!["rust", "golang"]);
        assert_eq!(config.limit, 10);
        assert_eq!(config.sort, SortMode::TopDay);
        assert!(!config.extract_comments);
        assert_eq!(config.conflict_policy, ConflictPolicy::Skip);
        assert_eq!(config.stats_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    }

    #[test]
    fn test_unknown_sort_falls_back() {
        let cli = Cli::try_parse_from(["reddit-etl", "--sort", "rising"]).unwrap();
        assert_eq!(cli.pipeline_config().sort, SortMode::Hot);
    }

    #[test]
    fn test_validation() {
        let zero = Cli::try_parse_from(["reddit-etl", "-n", "0"]).unwrap();
        assert!(zero.validate().is_err());

        let fast = Cli::try_parse_from(["reddit-etl", "--post-delay-ms", "10"]).unwrap();
        assert!(fast.validate().is_err());

        let fast_comments = Cli::try_parse_from(["reddit-etl", "--comment-delay-ms", "500"]).unwrap();
        assert!(fast_comments.validate().is_err());

        let blank = Cli::try_parse_from(["reddit-etl", "-r", " "]).unwrap();
        assert!(blank.validate().is_err());
    }
}
