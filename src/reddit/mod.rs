/// Reddit Client Module
///
/// This module handles all interactions with the Reddit API. It authenticates with
/// application-only OAuth, pages through subreddit listings and pulls fully
/// expanded comment trees.
pub mod listing;

use crate::models::{RawComment, SortMode};
use crate::source::{PostPage, Source};
use anyhow::{Context, Result};
use async_trait::async_trait;
use listing::{CommentForest, Listing, MoreChildrenResponse};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

/// Largest page the listing endpoints will serve
pub const MAX_PAGE_SIZE: usize = 100;
/// Largest id batch `/api/morechildren` accepts
const MORE_CHILDREN_BATCH: usize = 100;
/// Renew the token this long before the API says it expires
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// OAuth application credentials
#[derive(Debug, Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl Credentials {
    /// Read credentials from `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET` and `REDDIT_USER_AGENT`
    pub fn from_env() -> Result<Self> {
        let client_id = env::var("REDDIT_CLIENT_ID").context("REDDIT_CLIENT_ID not found in environment")?;
        let client_secret =
            env::var("REDDIT_CLIENT_SECRET").context("REDDIT_CLIENT_SECRET not found in environment")?;
        let user_agent = env::var("REDDIT_USER_AGENT").context("REDDIT_USER_AGENT not found in environment")?;

        Ok(Self { client_id, client_secret, user_agent })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

pub struct RedditClient {
    http: reqwest::Client,
    credentials: Credentials,
    token: Mutex<Option<AccessToken>>,
}

impl RedditClient {
    /// Create a new client; no request is made until the first call
    pub fn new(credentials: Credentials) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, credentials, token: Mutex::new(None) })
    }

    /// Test the credentials by obtaining an access token
    pub async fn test_connection(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        tracing::debug!("Requesting new Reddit access token");

        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("Failed to reach Reddit token endpoint")?
            .error_for_status()
            .context("Reddit rejected the application credentials")?
            .json()
            .await
            .context("Failed to parse token response")?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = response.access_token;
        *cached = Some(AccessToken { value: value.clone(), expires_at: Instant::now() + lifetime });

        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let token = self.access_token().await?;
        let url = format!("{}{}", API_BASE, path);

        tracing::debug!("GET {}", url);

        self.http
            .get(&url)
            .bearer_auth(token)
            .query(&[("raw_json", "1")])
            .query(query)
            .send()
            .await
            .context(format!("Request to {} failed", path))?
            .error_for_status()
            .context(format!("Reddit returned an error for {}", path))?
            .json()
            .await
            .context(format!("Failed to parse response from {}", path))
    }
}

#[async_trait]
impl Source for RedditClient {
    async fn fetch_post_page(
        &self,
        subreddit: &str,
        sort: SortMode,
        page_size: usize,
        after: Option<&str>,
    ) -> Result<PostPage> {
        let mut query = vec![("limit", page_size.min(MAX_PAGE_SIZE).to_string())];
        if let Some(filter) = sort.time_filter() {
            query.push(("t", filter.to_string()));
        }
        if let Some(cursor) = after {
            query.push(("after", cursor.to_string()));
        }

        let page: Listing = self.get_json(&format!("/r/{}/{}", subreddit, sort.path()), &query).await?;

        listing::post_page(page)
    }

    async fn fetch_comments(&self, post_id: &str, limit: usize) -> Result<Vec<RawComment>> {
        // The response is [post listing, comment listing]
        let mut listings: Vec<Listing> = self.get_json(&format!("/comments/{}", post_id), &[]).await?;
        if listings.len() < 2 {
            anyhow::bail!("Comment response for {} has {} listings, expected 2", post_id, listings.len());
        }
        let tree = listings.swap_remove(1);

        let mut forest = CommentForest::new();
        forest.absorb(tree.data.children)?;

        while forest.has_pending() {
            let batch = forest.take_pending(MORE_CHILDREN_BATCH);
            tracing::debug!("Expanding {} collapsed comments of {}", batch.len(), post_id);

            let query = [
                ("api_type", "json".to_string()),
                ("link_id", format!("t3_{}", post_id)),
                ("children", batch.join(",")),
            ];
            let response: MoreChildrenResponse = self.get_json("/api/morechildren", &query).await?;
            if !response.json.errors.is_empty() {
                anyhow::bail!("Comment expansion for {} failed: {:?}", post_id, response.json.errors);
            }
            if let Some(data) = response.json.data {
                forest.absorb(data.things)?;
            }
        }

        tracing::debug!("Collected {} comments for {}", forest.len(), post_id);
        Ok(forest.flatten(post_id, limit))
    }
}
