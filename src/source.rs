/// Source Module
///
/// The read-only content provider the pipeline pulls from. `RedditClient` is the
/// production implementation; tests drive the pipeline with an in-memory one.
use crate::models::{RawComment, RawPost, SortMode};
use anyhow::Result;
use async_trait::async_trait;

/// One page of a post listing
#[derive(Debug, Clone, Default)]
pub struct PostPage {
    pub posts: Vec<RawPost>,
    /// Cursor for the next page, `None` once the listing is exhausted
    pub after: Option<String>,
}

#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch a single listing page of at most `page_size` posts
    async fn fetch_post_page(
        &self,
        subreddit: &str,
        sort: SortMode,
        page_size: usize,
        after: Option<&str>,
    ) -> Result<PostPage>;

    /// Fetch up to `limit` comments of a post, fully expanded and flattest first
    async fn fetch_comments(&self, post_id: &str, limit: usize) -> Result<Vec<RawComment>>;
}
