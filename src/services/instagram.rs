//! Instagram feed
//!
//! Reads recent posts from the Instagram Graph API. Without an access token,
//! or when the API fails, a fixed set of mock posts is served so the site's
//! feed section never renders empty.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::SharedCache;
use crate::config::InstagramConfig;

const FIELDS: &str = "id,caption,media_type,media_url,permalink,thumbnail_url,timestamp";

/// Largest page the Graph API is asked for
pub const MAX_POSTS: u32 = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default)]
    pub caption: Option<String>,
    pub media_type: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub permalink: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSource {
    Instagram,
    Mock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub posts: Vec<Post>,
    pub source: FeedSource,
}

#[derive(Debug, thiserror::Error)]
enum FeedError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Graph API returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<Post>,
}

pub struct InstagramService {
    client: Client,
    endpoint: String,
    access_token: Option<String>,
    default_limit: u32,
    timeout: Duration,
    cache: SharedCache,
}

impl InstagramService {
    pub fn new(config: &InstagramConfig, client: Client, cache: SharedCache) -> Self {
        Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            access_token: config
                .access_token
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from),
            default_limit: config.limit.clamp(1, MAX_POSTS),
            timeout: Duration::from_secs(config.timeout_seconds.max(1)),
            cache,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.access_token.is_some()
    }

    /// Recent posts, newest first. Never fails; falls back to mock posts.
    pub async fn recent_posts(&self, limit: Option<u32>) -> Feed {
        let limit = limit.unwrap_or(self.default_limit).clamp(1, MAX_POSTS);

        let Some(token) = self.access_token.as_deref() else {
            return mock_feed(limit);
        };

        let key = format!("instagram:feed:{}", limit);
        if let Some(posts) = self.cache.get::<Vec<Post>>(&key).await {
            return Feed {
                posts,
                source: FeedSource::Instagram,
            };
        }

        match self.fetch(token, limit).await {
            Ok(posts) => {
                if let Err(e) = self.cache.set(&key, &posts).await {
                    tracing::warn!("Failed to cache Instagram feed: {}", e);
                }
                tracing::debug!(count = posts.len(), "Fetched Instagram feed");
                Feed {
                    posts,
                    source: FeedSource::Instagram,
                }
            }
            Err(e) => {
                tracing::warn!("Instagram feed unavailable, serving mock posts: {}", e);
                mock_feed(limit)
            }
        }
    }

    async fn fetch(&self, token: &str, limit: u32) -> Result<Vec<Post>, FeedError> {
        let url = format!("{}/me/media", self.endpoint);
        let limit_param = limit.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("fields", FIELDS),
                ("access_token", token),
                ("limit", limit_param.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FeedError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let page: MediaPage = response.json().await?;
        let mut posts = page.data;
        posts.truncate(limit as usize);
        Ok(posts)
    }
}

const MOCK_POSTS: &[(&str, &str)] = &[
    ("Just listed: sun-filled craftsman with a wraparound porch.", "/images/instagram/craftsman.jpg"),
    ("Sold over asking in 6 days. Congratulations to our buyers!", "/images/instagram/sold.jpg"),
    ("Open house this Saturday, 1-4pm. Come say hi!", "/images/instagram/open-house.jpg"),
    ("Downtown condo living with skyline views.", "/images/instagram/condo.jpg"),
    ("Market update: inventory is up and rates are easing.", "/images/instagram/market.jpg"),
    ("Meet the team behind your next move.", "/images/instagram/team.jpg"),
    ("Backyard goals: pool, patio and room to grow.", "/images/instagram/backyard.jpg"),
    ("Thinking of selling? Ask us for a free valuation.", "/images/instagram/valuation.jpg"),
    ("Keys delivered! Welcome home to the Nguyen family.", "/images/instagram/keys.jpg"),
];

/// Static posts shown when the live feed is unavailable
pub fn mock_posts(limit: u32) -> Vec<Post> {
    MOCK_POSTS
        .iter()
        .enumerate()
        .take(limit as usize)
        .map(|(i, (caption, image))| Post {
            id: format!("mock-{}", i + 1),
            caption: Some((*caption).to_string()),
            media_type: "IMAGE".to_string(),
            media_url: Some((*image).to_string()),
            permalink: None,
            thumbnail_url: None,
            timestamp: None,
        })
        .collect()
}

fn mock_feed(limit: u32) -> Feed {
    Feed {
        posts: mock_posts(limit),
        source: FeedSource::Mock,
    }
}
