/// Transform Module
///
/// Turns raw posts into the enriched dataset: cleaned text plus derived features.
/// Pure and deterministic, no I/O.
use crate::error::{EtlError, EtlResult};
use crate::models::{EnrichedPost, RawPost, ScoreCategory, DELETED_AUTHOR};
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Upper bounds (inclusive) of each score bucket, lowest first. Anything above
/// the last bound is `Viral`.
const SCORE_BOUNDS: [(i64, ScoreCategory); 4] = [
    (0, ScoreCategory::Negative),
    (10, ScoreCategory::Low),
    (100, ScoreCategory::Medium),
    (1000, ScoreCategory::High),
];

/// Transform a batch of raw posts, fail-empty.
///
/// On any invalid record the whole batch is dropped and the error is logged;
/// callers see an empty dataset and nothing partial.
pub fn transform_posts(raw_posts: &[RawPost]) -> Vec<EnrichedPost> {
    if raw_posts.is_empty() {
        return Vec::new();
    }

    tracing::info!("Transforming data...");

    match try_transform_posts(raw_posts) {
        Ok(posts) => {
            tracing::info!("Data transformation completed for {} posts", posts.len());
            posts
        }
        Err(e) => {
            tracing::error!("Error transforming data: {}", e);
            Vec::new()
        }
    }
}

/// Transform a batch, stopping at the first invalid record
pub fn try_transform_posts(raw_posts: &[RawPost]) -> EtlResult<Vec<EnrichedPost>> {
    raw_posts.iter().map(enrich_post).collect()
}

/// Derive every feature for a single post
pub fn enrich_post(raw: &RawPost) -> EtlResult<EnrichedPost> {
    if raw.id.trim().is_empty() {
        return Err(EtlError::transform("", "post has an empty id"));
    }
    if !(0.0..=1.0).contains(&raw.upvote_ratio) {
        return Err(EtlError::transform(&raw.id, format!("upvote ratio {} is outside 0..=1", raw.upvote_ratio)));
    }

    let created_utc = timestamp_from_epoch(raw.created_utc)
        .ok_or_else(|| EtlError::transform(&raw.id, format!("invalid creation timestamp {}", raw.created_utc)))?;

    let selftext = raw.selftext.clone().unwrap_or_default();
    let title_length = raw.title.chars().count() as i64;
    let selftext_length = selftext.chars().count() as i64;

    Ok(EnrichedPost {
        id: raw.id.clone(),
        title: clean_title(&raw.title),
        author: raw.author.clone().unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        subreddit: raw.subreddit.clone(),
        score: raw.score,
        upvote_ratio: raw.upvote_ratio,
        num_comments: raw.num_comments,
        created_utc,
        selftext,
        url: raw.url.clone(),
        is_video: raw.is_video,
        is_original_content: raw.is_original_content,
        over_18: raw.over_18,
        stickied: raw.stickied,
        locked: raw.locked,
        title_length,
        selftext_length,
        has_selftext: selftext_length > 0,
        hour_posted: created_utc.hour(),
        day_of_week: created_utc.weekday().num_days_from_monday(),
        engagement_rate: engagement_rate(raw.score, raw.num_comments),
        score_category: score_category(raw.score),
    })
}

/// Comments per point of score, offset by one: `comments / (score + 1)`.
///
/// Negative scores are kept as-is, so the result can be negative. A score of -1
/// divides by zero and yields an IEEE infinity (or NaN with zero comments).
pub fn engagement_rate(score: i64, num_comments: i64) -> f64 {
    num_comments as f64 / (score as f64 + 1.0)
}

/// Bucket a score; each bound is inclusive on the right
pub fn score_category(score: i64) -> ScoreCategory {
    SCORE_BOUNDS
        .iter()
        .find(|(upper, _)| score <= *upper)
        .map(|(_, category)| *category)
        .unwrap_or(ScoreCategory::Viral)
}

/// Drop every character that is neither alphanumeric nor whitespace, then trim
pub fn clean_title(title: &str) -> String {
    let kept: String = title.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    kept.trim().to_string()
}

/// Convert epoch seconds into a UTC timestamp, whole seconds
pub fn timestamp_from_epoch(epoch_secs: f64) -> Option<DateTime<Utc>> {
    if !epoch_secs.is_finite() {
        return None;
    }
    let secs = epoch_secs.trunc();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}
