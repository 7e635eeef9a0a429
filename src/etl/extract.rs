/// Extract Module
///
/// Pulls posts and comments from a `Source`. Both operations are fail-empty: a
/// source error is logged and an empty list is returned.
use crate::error::{EtlError, EtlResult};
use crate::etl::transform::timestamp_from_epoch;
use crate::models::{Comment, RawComment, RawPost, SortMode, DELETED_AUTHOR};
use crate::reddit::MAX_PAGE_SIZE;
use crate::source::Source;
use std::time::Duration;
use tokio::time::sleep;

/// Extract up to `limit` posts, pausing `delay` between consecutive records
pub async fn extract_posts<S: Source + ?Sized>(
    source: &S,
    subreddit: &str,
    limit: usize,
    sort: SortMode,
    delay: Duration,
) -> Vec<RawPost> {
    tracing::info!("Extracting {} {} posts from r/{}", limit, sort, subreddit);

    match try_extract_posts(source, subreddit, limit, sort, delay).await {
        Ok(posts) => {
            tracing::info!("Successfully extracted {} posts", posts.len());
            posts
        }
        Err(e) => {
            tracing::error!("Error extracting posts: {}", e);
            Vec::new()
        }
    }
}

/// Walk listing pages lazily. A new page is only requested once every record of
/// the previous one has been handed out, so the per-record delay also spaces
/// out the requests.
pub async fn try_extract_posts<S: Source + ?Sized>(
    source: &S,
    subreddit: &str,
    limit: usize,
    sort: SortMode,
    delay: Duration,
) -> EtlResult<Vec<RawPost>> {
    let mut posts = Vec::with_capacity(limit.min(MAX_PAGE_SIZE));
    let mut after: Option<String> = None;

    while posts.len() < limit {
        let page_size = (limit - posts.len()).min(MAX_PAGE_SIZE);
        let page = source
            .fetch_post_page(subreddit, sort, page_size, after.as_deref())
            .await
            .map_err(|e| EtlError::source_unavailable(format!("listing r/{}", subreddit), e))?;

        if page.posts.is_empty() {
            break;
        }

        for post in page.posts.into_iter().take(limit - posts.len()) {
            if !posts.is_empty() && !delay.is_zero() {
                sleep(delay).await;
            }
            posts.push(post);
        }

        match page.after {
            Some(cursor) => after = Some(cursor),
            None => break,
        }
    }

    Ok(posts)
}

/// Extract up to `limit` comments of a post as rows ready to load
pub async fn extract_comments<S: Source + ?Sized>(source: &S, post_id: &str, limit: usize) -> Vec<Comment> {
    match source.fetch_comments(post_id, limit).await {
        Ok(raw) => raw.into_iter().take(limit).filter_map(|c| comment_from_raw(c, post_id)).collect(),
        Err(e) => {
            let err = EtlError::source_unavailable(format!("listing comments of {}", post_id), e);
            tracing::error!("Error extracting comments for post {}: {}", post_id, err);
            Vec::new()
        }
    }
}

fn comment_from_raw(raw: RawComment, post_id: &str) -> Option<Comment> {
    let Some(created_utc) = timestamp_from_epoch(raw.created_utc) else {
        tracing::warn!("Skipping comment {} with invalid timestamp {}", raw.id, raw.created_utc);
        return None;
    };

    Some(Comment {
        id: raw.id,
        post_id: post_id.to_string(),
        author: raw.author.unwrap_or_else(|| DELETED_AUTHOR.to_string()),
        body: raw.body,
        score: raw.score,
        created_utc,
        parent_id: raw.parent_id,
        is_submitter: raw.is_submitter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::mock::{raw_comment, raw_post, MockSource};

    fn posts(n: usize) -> Vec<RawPost> {
        (0..n).map(|i| raw_post(&format!("p{}", i), "rust", i as i64, 0)).collect()
    }

    #[tokio::test]
    async fn test_extract_stops_at_limit() {
        let source = MockSource::default().with_posts("rust", posts(250));

        let extracted = extract_posts(&source, "rust", 130, SortMode::Hot, Duration::ZERO).await;

        assert_eq!(extracted.len(), 130);
        assert_eq!(extracted[129].id, "p129");
        // one full page, then only what is still missing
        let calls = source.page_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, 100);
        assert_eq!(calls[1].1, 30);
        assert_eq!(calls[1].2.as_deref(), Some("p99"));
    }

    #[tokio::test]
    async fn test_extract_stops_when_listing_ends() {
        let source = MockSource::default().with_posts("rust", posts(5));

        let extracted = extract_posts(&source, "rust", 50, SortMode::New, Duration::ZERO).await;

        assert_eq!(extracted.len(), 5);
        assert_eq!(source.page_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_returns_empty() {
        let source = MockSource::default().with_posts("rust", posts(5)).failing("rust");

        let extracted = extract_posts(&source, "rust", 5, SortMode::Hot, Duration::ZERO).await;
        assert!(extracted.is_empty());

        let err = try_extract_posts(&source, "rust", 5, SortMode::Hot, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, EtlError::SourceUnavailable { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_records_are_throttled() {
        let source = MockSource::default().with_posts("rust", posts(4));
        let started = tokio::time::Instant::now();

        let extracted = extract_posts(&source, "rust", 4, SortMode::Hot, Duration::from_millis(100)).await;

        assert_eq!(extracted.len(), 4);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_extract_comments_maps_rows() {
        let source =
            MockSource::default().with_comments("p1", vec![raw_comment("c1", "p1"), raw_comment("c2", "p1")]);

        let comments = extract_comments(&source, "p1", 20).await;

        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].post_id, "p1");
        assert_eq!(comments[0].author, DELETED_AUTHOR);
        assert_eq!(comments[0].parent_id, "t3_p1");
        assert!(extract_comments(&source, "missing", 20).await.is_empty());
    }

    #[tokio::test]
    async fn test_extract_comments_failure_returns_empty() {
        let mut source = MockSource::default().with_comments("p1", vec![raw_comment("c1", "p1")]);
        source.failing_posts.push("p1".to_string());

        assert!(extract_comments(&source, "p1", 20).await.is_empty());
    }
}
