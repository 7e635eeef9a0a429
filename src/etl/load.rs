/// Load Module
///
/// Handles storing enriched posts and comments into the database and rolling up
/// the daily subreddit statistics.
use crate::db::Database;
use crate::error::EtlResult;
use crate::models::{Comment, EnrichedPost, SubredditDailyStat};
use chrono::{NaiveDate, Utc};

/// What to do when a row's primary key is already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConflictPolicy {
    /// Plain insert: the conflicting row is rejected and logged, the rest of the batch is kept
    #[default]
    Fail,
    /// Keep the stored row and silently skip the new one
    Skip,
    /// Overwrite the stored row
    Replace,
}

impl ConflictPolicy {
    fn insert_verb(&self) -> &str {
        match self {
            Self::Fail => "INSERT",
            Self::Skip => "INSERT OR IGNORE",
            Self::Replace => "INSERT OR REPLACE",
        }
    }
}

/// Row counts of one append call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub skipped: usize,
    pub rejected: usize,
}

enum RowResult {
    Inserted,
    Skipped,
    Rejected,
}

/// Append enriched posts.
///
/// All rows are written in one transaction. Key conflicts are resolved per row
/// according to `policy`; any other error aborts the whole call.
pub async fn append_posts(
    database: &Database,
    posts: &[EnrichedPost],
    policy: ConflictPolicy,
) -> EtlResult<LoadReport> {
    if posts.is_empty() {
        return Ok(LoadReport::default());
    }

    tracing::info!("Loading posts data into database...");

    let sql = format!(
        "{} INTO posts (
            id, title, author, subreddit, score, upvote_ratio, num_comments, created_utc,
            selftext, url, is_video, is_original_content, over_18, stickied, locked,
            title_length, selftext_length, has_selftext, hour_posted, day_of_week,
            engagement_rate, score_category, extracted_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        policy.insert_verb()
    );

    let extracted_at = Utc::now().naive_utc();
    let mut tx = database.pool().begin().await?;
    let mut report = LoadReport::default();

    for post in posts {
        let result = sqlx::query(&sql)
            .bind(&post.id)
            .bind(&post.title)
            .bind(&post.author)
            .bind(&post.subreddit)
            .bind(post.score)
            .bind(post.upvote_ratio)
            .bind(post.num_comments)
            .bind(post.created_utc.naive_utc())
            .bind(&post.selftext)
            .bind(&post.url)
            .bind(post.is_video)
            .bind(post.is_original_content)
            .bind(post.over_18)
            .bind(post.stickied)
            .bind(post.locked)
            .bind(post.title_length)
            .bind(post.selftext_length)
            .bind(post.has_selftext)
            .bind(post.hour_posted)
            .bind(post.day_of_week)
            .bind(post.engagement_rate)
            .bind(post.score_category.as_str())
            .bind(extracted_at)
            .execute(&mut *tx)
            .await;

        tally(&mut report, classify("post", &post.id, result)?);
    }

    tx.commit().await?;

    tracing::info!(
        "Successfully loaded {} posts to database ({} skipped, {} rejected)",
        report.inserted,
        report.skipped,
        report.rejected
    );
    Ok(report)
}

/// Append comments; no-op for an empty batch
pub async fn append_comments(
    database: &Database,
    comments: &[Comment],
    policy: ConflictPolicy,
) -> EtlResult<LoadReport> {
    if comments.is_empty() {
        return Ok(LoadReport::default());
    }

    tracing::info!("Loading {} comments into database...", comments.len());

    let sql = format!(
        "{} INTO comments (id, post_id, author, body, score, created_utc, parent_id, is_submitter, extracted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        policy.insert_verb()
    );

    let extracted_at = Utc::now().naive_utc();
    let mut tx = database.pool().begin().await?;
    let mut report = LoadReport::default();

    for comment in comments {
        let result = sqlx::query(&sql)
            .bind(&comment.id)
            .bind(&comment.post_id)
            .bind(&comment.author)
            .bind(&comment.body)
            .bind(comment.score)
            .bind(comment.created_utc.naive_utc())
            .bind(&comment.parent_id)
            .bind(comment.is_submitter)
            .bind(extracted_at)
            .execute(&mut *tx)
            .await;

        tally(&mut report, classify("comment", &comment.id, result)?);
    }

    tx.commit().await?;

    tracing::info!("Successfully loaded {} comments", report.inserted);
    Ok(report)
}

fn classify(
    kind: &str,
    id: &str,
    result: Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>,
) -> EtlResult<RowResult> {
    match result {
        Ok(done) if done.rows_affected() == 0 => Ok(RowResult::Skipped),
        Ok(_) => Ok(RowResult::Inserted),
        Err(e) if e.as_database_error().is_some_and(|db| db.is_unique_violation()) => {
            tracing::warn!("Rejected duplicate {} {}: {}", kind, id, e);
            Ok(RowResult::Rejected)
        }
        Err(e) => Err(e.into()),
    }
}

fn tally(report: &mut LoadReport, row: RowResult) {
    match row {
        RowResult::Inserted => report.inserted += 1,
        RowResult::Skipped => report.skipped += 1,
        RowResult::Rejected => report.rejected += 1,
    }
}

/// Recompute today's (UTC) aggregate for a subreddit
pub async fn upsert_daily_stat(database: &Database, subreddit: &str) -> EtlResult<Option<SubredditDailyStat>> {
    upsert_daily_stat_on(database, subreddit, Utc::now().date_naive()).await
}

/// Recompute the aggregate of `subreddit` on `date` from the posts table and
/// replace any existing row for that key.
///
/// Returns the stored row, or `None` when no post of that subreddit was created on
/// that date (nothing is written then).
pub async fn upsert_daily_stat_on(
    database: &Database,
    subreddit: &str,
    date: NaiveDate,
) -> EtlResult<Option<SubredditDailyStat>> {
    let day = date.format("%Y-%m-%d").to_string();

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO subreddit_stats (subreddit, date, total_posts, avg_score, avg_comments, top_post_score)
        SELECT
            subreddit,
            DATE(created_utc) AS date,
            COUNT(*) AS total_posts,
            AVG(score) AS avg_score,
            AVG(num_comments) AS avg_comments,
            MAX(score) AS top_post_score
        FROM posts
        WHERE subreddit = ? AND DATE(created_utc) = ?
        GROUP BY subreddit, DATE(created_utc)
        "#,
    )
    .bind(subreddit)
    .bind(&day)
    .execute(database.pool())
    .await?;

    let stat = sqlx::query_as::<_, SubredditDailyStat>(
        "SELECT subreddit, date, total_posts, avg_score, avg_comments, top_post_score
         FROM subreddit_stats WHERE subreddit = ? AND date = ?",
    )
    .bind(subreddit)
    .bind(&day)
    .fetch_optional(database.pool())
    .await?;

    tracing::info!("Generated statistics for r/{}", subreddit);
    Ok(stat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_database;
    use crate::etl::transform::enrich_post;
    use crate::models::RawPost;
    use chrono::{TimeZone, Utc};

    fn raw(id: &str, subreddit: &str, score: i64, created: chrono::DateTime<Utc>) -> RawPost {
        RawPost {
            id: id.to_string(),
            title: format!("What's new in {}?", id),
            author: None,
            subreddit: subreddit.to_string(),
            score,
            upvote_ratio: 0.87,
            num_comments: score / 5,
            created_utc: created.timestamp() as f64,
            selftext: Some("some body text".to_string()),
            url: Some(format!("https://reddit.com/{}", id)),
            is_video: true,
            is_original_content: false,
            over_18: false,
            stickied: true,
            locked: false,
        }
    }

    fn post(id: &str, subreddit: &str, score: i64, created: chrono::DateTime<Utc>) -> EnrichedPost {
        enrich_post(&raw(id, subreddit, score, created)).unwrap()
    }

    fn comment(id: &str, post_id: &str) -> Comment {
        Comment {
            id: id.to_string(),
            post_id: post_id.to_string(),
            author: "someone".to_string(),
            body: "nice".to_string(),
            score: 2,
            created_utc: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
            parent_id: format!("t3_{}", post_id),
            is_submitter: false,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn at(hour: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, hour, 15, 0).unwrap()
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let (_dir, database) = temp_database().await;
        let original = post("abc", "rust", 42, at(9));

        let report = append_posts(&database, &[original.clone()], ConflictPolicy::Fail).await.unwrap();
        assert_eq!(report.inserted, 1);

        let stored = database.fetch_post("abc").await.unwrap().unwrap();
        assert_eq!(stored.post, original);
        assert!(stored.extracted_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_degenerate_engagement_rates_survive_round_trip() {
        let (_dir, database) = temp_database().await;
        // score -1: 0 / 0 and 2 / 0
        let undefined = post("n", "rust", -1, at(3));
        let mut commented = raw("i", "rust", -1, at(4));
        commented.num_comments = 2;
        let infinite = enrich_post(&commented).unwrap();
        assert!(undefined.engagement_rate.is_nan());
        assert_eq!(infinite.engagement_rate, f64::INFINITY);

        append_posts(&database, &[undefined.clone(), infinite.clone()], ConflictPolicy::Fail).await.unwrap();

        let stored_nan = database.fetch_post("n").await.unwrap().unwrap().post;
        assert!(stored_nan.engagement_rate.is_nan());
        assert_eq!(stored_nan.score, -1);
        assert_eq!(stored_nan.num_comments, 0);
        assert_eq!(stored_nan.title, undefined.title);

        let stored_inf = database.fetch_post("i").await.unwrap().unwrap().post;
        assert_eq!(stored_inf, infinite);
    }

    #[tokio::test]
    async fn test_duplicate_rejected_under_fail_policy() {
        let (_dir, database) = temp_database().await;
        append_posts(&database, &[post("a", "rust", 1, at(1))], ConflictPolicy::Fail).await.unwrap();

        let report = append_posts(
            &database,
            &[post("a", "rust", 99, at(1)), post("b", "rust", 2, at(2))],
            ConflictPolicy::Fail,
        )
        .await
        .unwrap();

        assert_eq!(report, LoadReport { inserted: 1, skipped: 0, rejected: 1 });
        assert_eq!(database.count_posts(Some("rust")).await.unwrap(), 2);
        assert_eq!(database.fetch_post("a").await.unwrap().unwrap().post.score, 1);
    }

    #[tokio::test]
    async fn test_skip_and_replace_policies() {
        let (_dir, database) = temp_database().await;
        append_posts(&database, &[post("a", "rust", 1, at(1))], ConflictPolicy::Fail).await.unwrap();

        let skipped = append_posts(&database, &[post("a", "rust", 50, at(1))], ConflictPolicy::Skip).await.unwrap();
        assert_eq!(skipped, LoadReport { inserted: 0, skipped: 1, rejected: 0 });
        assert_eq!(database.fetch_post("a").await.unwrap().unwrap().post.score, 1);

        let replaced = append_posts(&database, &[post("a", "rust", 50, at(1))], ConflictPolicy::Replace).await.unwrap();
        assert_eq!(replaced.inserted, 1);
        assert_eq!(database.fetch_post("a").await.unwrap().unwrap().post.score, 50);
        assert_eq!(database.count_posts(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_comments() {
        let (_dir, database) = temp_database().await;

        let empty = append_comments(&database, &[], ConflictPolicy::Fail).await.unwrap();
        assert_eq!(empty, LoadReport::default());

        // the owning post does not need to be stored
        let report =
            append_comments(&database, &[comment("c1", "p1"), comment("c2", "p1")], ConflictPolicy::Fail).await.unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(database.count_comments(Some("p1")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_daily_stat_rollup_and_overwrite() {
        let (_dir, database) = temp_database().await;
        let posts = vec![
            post("a", "x", 5, at(1)),
            post("b", "x", 15, at(5)),
            post("c", "x", 1000, at(23)),
            // other subreddit and other day are ignored
            post("d", "y", 7, at(2)),
            post("e", "x", 3, Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 0).unwrap()),
        ];
        append_posts(&database, &posts, ConflictPolicy::Fail).await.unwrap();

        let stat = upsert_daily_stat_on(&database, "x", day()).await.unwrap().unwrap();
        assert_eq!(stat.total_posts, 3);
        assert_eq!(stat.avg_score, 340.0);
        assert_eq!(stat.top_post_score, 1000);
        assert_eq!(stat.date, day());

        append_posts(&database, &[post("f", "x", 20, at(12))], ConflictPolicy::Fail).await.unwrap();
        let updated = upsert_daily_stat_on(&database, "x", day()).await.unwrap().unwrap();
        assert_eq!(updated.total_posts, 4);
        assert_eq!(updated.avg_score, 260.0);

        let rows = database.daily_stats("x").await.unwrap();
        assert_eq!(rows, vec![updated]);
    }

    #[tokio::test]
    async fn test_daily_stat_without_posts_writes_nothing() {
        let (_dir, database) = temp_database().await;

        assert!(upsert_daily_stat_on(&database, "empty", day()).await.unwrap().is_none());
        assert!(database.daily_stats("empty").await.unwrap().is_empty());
    }
}
