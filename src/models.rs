/// Data Models Module
///
/// This module defines the core data structures used throughout the application.
/// Raw records mirror what the Reddit API hands back; enriched posts, comments and
/// daily stats are what ends up in the database.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Author handle stored when the API reports no author (deleted or suspended accounts)
pub const DELETED_AUTHOR: &str = "[deleted]";

/// Listing order used when pulling posts from a subreddit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortMode {
    #[default]
    Hot,
    New,
    /// Top posts of the last day
    TopDay,
}

impl SortMode {
    /// Parse a sort mode, falling back to `Hot` for anything unrecognized
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hot" => Self::Hot,
            "new" => Self::New,
            "top" | "top-day" | "top_day" => Self::TopDay,
            other => {
                tracing::warn!("Unknown sort mode '{}', falling back to hot", other);
                Self::Hot
            }
        }
    }

    /// Listing path segment on the API
    pub fn path(&self) -> &str {
        match self {
            Self::Hot => "hot",
            Self::New => "new",
            Self::TopDay => "top",
        }
    }

    /// Time filter query value, only meaningful for top listings
    pub fn time_filter(&self) -> Option<&str> {
        match self {
            Self::TopDay => Some("day"),
            _ => None,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TopDay => write!(f, "top-day"),
            other => write!(f, "{}", other.path()),
        }
    }
}

/// A submission exactly as the API describes it (the `data` of a `t3` thing)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawPost {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub subreddit: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: i64,
    /// Seconds since the Unix epoch
    pub created_utc: f64,
    pub selftext: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_original_content: bool,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub locked: bool,
}

/// A comment exactly as the API describes it (the `data` of a `t1` thing)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawComment {
    pub id: String,
    pub author: Option<String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    pub created_utc: f64,
    /// Fullname of the parent, `t3_*` for top-level comments, `t1_*` for replies
    pub parent_id: String,
    #[serde(default)]
    pub is_submitter: bool,
}

/// Score buckets, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScoreCategory {
    Negative,
    Low,
    Medium,
    High,
    Viral,
}

impl ScoreCategory {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Negative => "Negative",
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Viral => "Viral",
        }
    }
}

impl FromStr for ScoreCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Negative" => Ok(Self::Negative),
            "Low" => Ok(Self::Low),
            "Medium" => Ok(Self::Medium),
            "High" => Ok(Self::High),
            "Viral" => Ok(Self::Viral),
            other => Err(format!("unknown score category '{}'", other)),
        }
    }
}

/// One row of the enriched dataset: source attributes plus derived features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedPost {
    pub id: String,
    /// Title with punctuation stripped and surrounding whitespace trimmed
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub score: i64,
    pub upvote_ratio: f64,
    pub num_comments: i64,
    pub created_utc: DateTime<Utc>,
    pub selftext: String,
    pub url: Option<String>,
    pub is_video: bool,
    pub is_original_content: bool,
    pub over_18: bool,
    pub stickied: bool,
    pub locked: bool,
    pub title_length: i64,
    pub selftext_length: i64,
    pub has_selftext: bool,
    pub hour_posted: u32,
    /// 0 = Monday .. 6 = Sunday
    pub day_of_week: u32,
    pub engagement_rate: f64,
    pub score_category: ScoreCategory,
}

/// A stored post row, including the load timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPost {
    pub post: EnrichedPost,
    pub extracted_at: DateTime<Utc>,
}

/// A comment ready to be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: DateTime<Utc>,
    pub parent_id: String,
    pub is_submitter: bool,
}

/// Daily aggregate for one subreddit
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SubredditDailyStat {
    pub subreddit: String,
    pub date: NaiveDate,
    pub total_posts: i64,
    pub avg_score: f64,
    pub avg_comments: f64,
    pub top_post_score: i64,
}
