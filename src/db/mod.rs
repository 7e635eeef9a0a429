/// Database Module
///
/// This module handles the SQLite store:
/// - Connection pool management
/// - Schema creation
/// - Read helpers for posts, comments and daily stats
use crate::models::{EnrichedPost, ScoreCategory, StoredPost, SubredditDailyStat};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "reddit_data.db";

const CREATE_POSTS: &str = r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        title TEXT,
        author TEXT,
        subreddit TEXT,
        score INTEGER,
        upvote_ratio REAL,
        num_comments INTEGER,
        created_utc TIMESTAMP,
        selftext TEXT,
        url TEXT,
        is_video BOOLEAN,
        is_original_content BOOLEAN,
        over_18 BOOLEAN,
        stickied BOOLEAN,
        locked BOOLEAN,
        title_length INTEGER,
        selftext_length INTEGER,
        has_selftext BOOLEAN,
        hour_posted INTEGER,
        day_of_week INTEGER,
        engagement_rate REAL,
        score_category TEXT,
        extracted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )
"#;

const CREATE_COMMENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT,
        author TEXT,
        body TEXT,
        score INTEGER,
        created_utc TIMESTAMP,
        parent_id TEXT,
        is_submitter BOOLEAN,
        extracted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        FOREIGN KEY (post_id) REFERENCES posts (id)
    )
"#;

const CREATE_SUBREDDIT_STATS: &str = r#"
    CREATE TABLE IF NOT EXISTS subreddit_stats (
        subreddit TEXT,
        date DATE,
        total_posts INTEGER,
        avg_score REAL,
        avg_comments REAL,
        top_post_score INTEGER,
        PRIMARY KEY (subreddit, date)
    )
"#;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `database_url`.
    ///
    /// Accepts either a `sqlite:` URL or a plain file path. Foreign keys are
    /// declared in the schema but not enforced on the connection.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url).context("Invalid SQLite database URL")?
        } else {
            SqliteConnectOptions::new().filename(database_url)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options.create_if_missing(true).foreign_keys(false))
            .await
            .context("Failed to open SQLite database")?;

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create tables and indexes if they don't exist. Safe to call on every start.
    pub async fn init_schema(&self) -> Result<()> {
        for statement in [CREATE_POSTS, CREATE_COMMENTS, CREATE_SUBREDDIT_STATS] {
            sqlx::query(statement).execute(&self.pool).await.context("Failed to create table")?;
        }

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_subreddit_created ON posts(subreddit, created_utc)")
            .execute(&self.pool)
            .await
            .context("Failed to create posts index")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)")
            .execute(&self.pool)
            .await
            .context("Failed to create comments index")?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// Test the database connection
    pub async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.context("Database connection test failed")?;

        Ok(())
    }

    /// Load a stored post by id
    #[allow(dead_code)]
    pub async fn fetch_post(&self, id: &str) -> Result<Option<StoredPost>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context(format!("Failed to load post {}", id))?;

        row.map(|r| stored_post_from_row(&r)).transpose()
    }

    pub async fn count_posts(&self, subreddit: Option<&str>) -> Result<i64> {
        let count = match subreddit {
            Some(name) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts WHERE subreddit = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await,
            None => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM posts").fetch_one(&self.pool).await,
        }
        .context("Failed to count posts")?;

        Ok(count)
    }

    #[allow(dead_code)]
    pub async fn count_comments(&self, post_id: Option<&str>) -> Result<i64> {
        let count = match post_id {
            Some(id) => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments WHERE post_id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await,
            None => sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM comments").fetch_one(&self.pool).await,
        }
        .context("Failed to count comments")?;

        Ok(count)
    }

    /// All daily stat rows of a subreddit, oldest first
    pub async fn daily_stats(&self, subreddit: &str) -> Result<Vec<SubredditDailyStat>> {
        let stats = sqlx::query_as::<_, SubredditDailyStat>(
            "SELECT subreddit, date, total_posts, avg_score, avg_comments, top_post_score
             FROM subreddit_stats WHERE subreddit = ? ORDER BY date",
        )
        .bind(subreddit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load subreddit stats")?;

        Ok(stats)
    }
}

#[allow(dead_code)]
fn stored_post_from_row(row: &SqliteRow) -> Result<StoredPost> {
    let created_utc: NaiveDateTime = row.try_get("created_utc")?;
    let extracted_at: NaiveDateTime = row.try_get("extracted_at")?;
    let category: String = row.try_get("score_category")?;
    // SQLite stores a NaN REAL as NULL
    let engagement_rate: Option<f64> = row.try_get("engagement_rate")?;

    let post = EnrichedPost {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        subreddit: row.try_get("subreddit")?,
        score: row.try_get("score")?,
        upvote_ratio: row.try_get("upvote_ratio")?,
        num_comments: row.try_get("num_comments")?,
        created_utc: created_utc.and_utc(),
        selftext: row.try_get("selftext")?,
        url: row.try_get("url")?,
        is_video: row.try_get("is_video")?,
        is_original_content: row.try_get("is_original_content")?,
        over_18: row.try_get("over_18")?,
        stickied: row.try_get("stickied")?,
        locked: row.try_get("locked")?,
        title_length: row.try_get("title_length")?,
        selftext_length: row.try_get("selftext_length")?,
        has_selftext: row.try_get("has_selftext")?,
        hour_posted: row.try_get("hour_posted")?,
        day_of_week: row.try_get("day_of_week")?,
        engagement_rate: engagement_rate.unwrap_or(f64::NAN),
        score_category: category.parse::<ScoreCategory>().map_err(anyhow::Error::msg)?,
    };

    Ok(StoredPost { post, extracted_at: extracted_at.and_utc() })
}


#[cfg(test)]
mod tests {
    use super::test_support::temp_database;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let (_dir, database) = temp_database().await;

        database.init_schema().await.unwrap();
        database.init_schema().await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(database.pool())
        .await
        .unwrap();

        assert_eq!(tables, vec!["comments", "posts", "subreddit_stats"]);
    }

    #[tokio::test]
    async fn test_empty_store_counts() {
        let (_dir, database) = temp_database().await;

        database.test_connection().await.unwrap();
        assert_eq!(database.count_posts(None).await.unwrap(), 0);
        assert_eq!(database.count_comments(Some("nope")).await.unwrap(), 0);
        assert!(database.fetch_post("nope").await.unwrap().is_none());
        assert!(database.daily_stats("rust").await.unwrap().is_empty());
    }
}
