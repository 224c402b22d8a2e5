//! Reddit hot feed over the OAuth API (application-only grant).

use crate::upstream;
use chrono::{DateTime, Utc};
use mugshot_core::{PostFeed, RawPost, UpstreamError};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};

const SERVICE: &str = "reddit";
const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";
const PLATFORM: &str = "Reddit";
/// Reddit caps a listing page at 100 posts.
const PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Refresh the token this long before Reddit says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    children: Vec<Child>,
    after: Option<String>,
}

#[derive(Deserialize)]
struct Child {
    data: PostData,
}

#[derive(Deserialize)]
struct PostData {
    title: String,
    #[serde(default)]
    url: String,
    score: i64,
    num_comments: i64,
    created_utc: f64,
    #[serde(default)]
    over_18: bool,
}

impl From<PostData> for RawPost {
    fn from(p: PostData) -> Self {
        RawPost {
            title: p.title,
            url: p.url,
            score: p.score,
            num_comments: p.num_comments,
            created_at: DateTime::<Utc>::from_timestamp(p.created_utc as i64, 0).unwrap_or_default(),
            over_18: p.over_18,
        }
    }
}

/// "Hot" listing of one or more subreddits joined with `+`.
pub struct RedditFeed {
    http: Client,
    credentials: RedditCredentials,
    subreddits: String,
    token: Option<AccessToken>,
}

impl RedditFeed {
    pub fn new(credentials: RedditCredentials, subreddits: &str) -> reqwest::Result<Self> {
        let http = Client::builder()
            .user_agent(credentials.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            credentials,
            subreddits: subreddits.to_string(),
            token: None,
        })
    }

    fn access_token(&mut self) -> Result<String, UpstreamError> {
        if let Some(token) = self.token.as_ref().filter(|t| t.expires_at > Instant::now()) {
            return Ok(token.value.clone());
        }

        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.credentials.client_id, Some(&self.credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| upstream(SERVICE, e))?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        tracing::debug!(expires_in = response.expires_in, "reddit token refreshed");
        self.token = Some(AccessToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(response.access_token)
    }

    fn page(&mut self, limit: usize, after: Option<&str>) -> Result<ListingData, UpstreamError> {
        let token = self.access_token()?;
        let url = format!("{API_BASE}/r/{}/hot", self.subreddits);
        let mut query = vec![("limit", limit.to_string()), ("raw_json", "1".to_string())];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let body = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(&query)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text())
            .map_err(|e| upstream(SERVICE, e))?;

        parse_listing(&body)
    }
}

impl PostFeed for RedditFeed {
    fn platform(&self) -> &str {
        PLATFORM
    }

    fn hot(&mut self, limit: usize) -> Result<Vec<RawPost>, UpstreamError> {
        let mut posts = Vec::with_capacity(limit.min(PAGE_SIZE));
        let mut after: Option<String> = None;

        while posts.len() < limit {
            let want = (limit - posts.len()).min(PAGE_SIZE);
            let page = self.page(want, after.as_deref())?;
            let got = page.children.len();
            posts.extend(page.children.into_iter().map(|c| RawPost::from(c.data)));

            after = page.after;
            if got == 0 || after.is_none() {
                break;
            }
        }

        posts.truncate(limit);
        tracing::debug!(subreddits = %self.subreddits, count = posts.len(), "fetched hot posts");
        Ok(posts)
    }
}

fn parse_listing(body: &str) -> Result<ListingData, UpstreamError> {
    serde_json::from_str::<Listing>(body)
        .map(|l| l.data)
        .map_err(|e| UpstreamError::Malformed { service: SERVICE, reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_abc",
            "children": [
                {"kind": "t3", "data": {
                    "title": "when the build is green",
                    "url": "https://i.redd.it/x1.jpg",
                    "score": 4321, "num_comments": 87,
                    "created_utc": 1700000000.0, "over_18": false,
                    "stickied": false
                }},
                {"kind": "t3", "data": {
                    "title": "self post",
                    "score": 12, "num_comments": 3,
                    "created_utc": 1700000100.0
                }}
            ]
        }
    }"#;

    #[test]
    fn test_parse_listing() {
        let data = parse_listing(LISTING).unwrap();
        assert_eq!(data.after.as_deref(), Some("t3_abc"));
        let posts: Vec<RawPost> = data.children.into_iter().map(|c| c.data.into()).collect();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "when the build is green");
        assert_eq!(posts[0].score, 4321);
        assert_eq!(posts[0].num_comments, 87);
        assert_eq!(posts[0].created_at.timestamp(), 1_700_000_000);
        assert!(!posts[0].over_18);
        // Missing url/over_18 default rather than failing the page.
        assert_eq!(posts[1].url, "");
        assert!(!posts[1].over_18);
    }

    #[test]
    fn test_parse_listing_malformed() {
        let err = parse_listing(r#"{"error": 401}"#).err().unwrap();
        assert!(matches!(err, UpstreamError::Malformed { service: "reddit", .. }));
    }
}
