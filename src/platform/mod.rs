//! HTTP client for the external platform, and the service trait the
//! orchestrator consumes.
//!
//! Every outbound call is admitted through the shared [`AdmissionGate`], and
//! rate-limit headers from every response are recorded into the shared
//! [`RateLimitTracker`]. Write actions are dispatched exactly once; the
//! idempotent discovery reads are wrapped in the retry policy.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::rate_limit::RateLimitTracker;
use crate::retry::{with_retry, RetryPolicy};
use crate::session::SessionStore;

pub mod model;

use model::{
    ActionOutcome, ErrorPayload, FollowActionRaw, MentionsResponse, SearchResponse,
    TweetActionRaw, TweetSummary,
};

pub const CREATE_TWEET: &str = "/twitter/create_tweet_v2";
pub const LIKE_TWEET: &str = "/twitter/like_tweet_v2";
pub const FOLLOW_USER: &str = "/twitter/follow_user_v2";
pub const MENTIONS: &str = "/twitter/user/mentions";
pub const SEARCH: &str = "/twitter/tweet/advanced_search";

/// The per-action REST surface the orchestrator depends on. Implemented by
/// [`PlatformClient`] in production and by test doubles in the test suite.
#[async_trait]
pub trait PlatformService: Send + Sync {
    async fn create_post(&self, text: &str) -> Result<ActionOutcome>;
    async fn create_reply(&self, text: &str, tweet_id: &str) -> Result<ActionOutcome>;
    async fn like_tweet(&self, tweet_id: &str) -> Result<ActionOutcome>;
    async fn follow_user(&self, user_id: &str) -> Result<ActionOutcome>;
    async fn fetch_mentions(&self, username: &str) -> Result<Vec<TweetSummary>>;
    async fn search_top(&self, query: &str) -> Result<Vec<TweetSummary>>;
}

#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    base_url: Url,
    api_key: String,
    session: Arc<SessionStore>,
    gate: AdmissionGate,
    limits: Arc<RateLimitTracker>,
    retry: RetryPolicy,
}

impl fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    pub fn new(
        base_url: Url,
        api_key: String,
        session: Arc<SessionStore>,
        gate: AdmissionGate,
        limits: Arc<RateLimitTracker>,
        retry: RetryPolicy,
    ) -> Self {
        let http = Client::builder()
            .user_agent("tw-viralbot/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url,
            api_key,
            session,
            gate,
            limits,
            retry,
        }
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|err| Error::transport(format!("invalid endpoint url {endpoint}: {err}")))
    }

    fn build_post(&self, endpoint: &str, body: &Value) -> Result<reqwest::Request> {
        self.http
            .post(self.endpoint_url(endpoint)?)
            .header("x-api-key", &self.api_key)
            .json(body)
            .build()
            .map_err(Error::from)
    }

    fn build_get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<reqwest::Request> {
        self.http
            .get(self.endpoint_url(endpoint)?)
            .header("x-api-key", &self.api_key)
            .query(params)
            .build()
            .map_err(Error::from)
    }

    /// Execute one request through the admission gate, recording the
    /// response's rate-limit headers before handing it back.
    async fn send_admitted(
        &self,
        request: reqwest::Request,
        endpoint: &'static str,
    ) -> Result<reqwest::Response> {
        let http = self.http.clone();
        let limits = Arc::clone(&self.limits);
        let admitted = self.gate.submit(async move {
            let response = http.execute(request).await.map_err(Error::from)?;
            record_rate_limit(&limits, endpoint, response.headers());
            Ok::<_, Error>(response)
        });
        admitted
            .await
            .map_err(|_| Error::transport("call dropped before it started"))?
    }

    async fn tweet_action(&self, endpoint: &'static str, body: Value) -> Result<ActionOutcome> {
        let request = self.build_post(endpoint, &body)?;
        let response = self.send_admitted(request, endpoint).await?;
        let raw: TweetActionRaw = decode(response).await?;
        Ok(ActionOutcome::from_tweet_action(raw))
    }

    async fn mentions_once(&self, username: &str) -> Result<Vec<TweetSummary>> {
        let request = self.build_get(MENTIONS, &[("userName", username)])?;
        let response = self.send_admitted(request, MENTIONS).await?;
        let payload: MentionsResponse = decode(response).await?;
        Ok(payload.mentions.into_iter().map(Into::into).collect())
    }

    async fn search_once(&self, query: &str) -> Result<Vec<TweetSummary>> {
        let request = self.build_get(SEARCH, &[("query", query), ("queryType", "Top")])?;
        let response = self.send_admitted(request, SEARCH).await?;
        let payload: SearchResponse = decode(response).await?;
        Ok(payload.tweets.into_iter().map(Into::into).collect())
    }

    fn login_cookie(&self) -> Result<String> {
        self.session.cookie().ok_or(Error::AuthRequired)
    }
}

/// Map a non-2xx response to `Error::Api`, otherwise decode the body.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let payload = response.json::<ErrorPayload>().await.unwrap_or_default();
        let code = payload.code.unwrap_or_else(|| "API_ERROR".to_string());
        let message = payload
            .message
            .unwrap_or_else(|| format!("http status {status}"));
        warn!(%status, code, message, "platform api error");
        return Err(Error::api(code, status.as_u16(), message));
    }
    response.json::<T>().await.map_err(Error::from)
}

fn record_rate_limit(limits: &RateLimitTracker, endpoint: &str, headers: &HeaderMap) {
    let header_num = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(0)
    };
    let limit = header_num("x-rate-limit-limit");
    let remaining = header_num("x-rate-limit-remaining");
    let reset = header_num("x-rate-limit-reset");
    limits.record(endpoint, limit.max(0) as u32, remaining.max(0) as u32, reset);
}

#[async_trait]
impl PlatformService for PlatformClient {
    async fn create_post(&self, text: &str) -> Result<ActionOutcome> {
        let body = json!({
            "login_cookies": self.login_cookie()?,
            "tweet_text": text,
        });
        self.tweet_action(CREATE_TWEET, body).await
    }

    async fn create_reply(&self, text: &str, tweet_id: &str) -> Result<ActionOutcome> {
        let body = json!({
            "login_cookies": self.login_cookie()?,
            "tweet_text": text,
            "reply_to_tweet_id": tweet_id,
        });
        self.tweet_action(CREATE_TWEET, body).await
    }

    async fn like_tweet(&self, tweet_id: &str) -> Result<ActionOutcome> {
        let body = json!({
            "login_cookies": self.login_cookie()?,
            "tweet_id": tweet_id,
        });
        self.tweet_action(LIKE_TWEET, body).await
    }

    async fn follow_user(&self, user_id: &str) -> Result<ActionOutcome> {
        let body = json!({ "user_id": user_id });
        let request = self.build_post(FOLLOW_USER, &body)?;
        let response = self.send_admitted(request, FOLLOW_USER).await?;
        let raw: FollowActionRaw = decode(response).await?;
        Ok(ActionOutcome::from_follow_action(raw))
    }

    async fn fetch_mentions(&self, username: &str) -> Result<Vec<TweetSummary>> {
        with_retry(|| self.mentions_once(username), self.retry).await
    }

    async fn search_top(&self, query: &str) -> Result<Vec<TweetSummary>> {
        with_retry(|| self.search_once(query), self.retry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateConfig;
    use reqwest::header::HeaderValue;

    fn client(session: SessionStore) -> PlatformClient {
        PlatformClient::new(
            Url::parse("https://api.example.test").unwrap(),
            "key-123".into(),
            Arc::new(session),
            AdmissionGate::new(GateConfig::default()),
            Arc::new(RateLimitTracker::new()),
            RetryPolicy::default(),
        )
    }

    #[tokio::test]
    async fn build_post_sets_api_key_and_path() {
        let client = client(SessionStore::new());
        let body = json!({"tweet_text": "hi"});
        let request = client.build_post(CREATE_TWEET, &body).unwrap();
        assert_eq!(request.method(), reqwest::Method::POST);
        assert_eq!(request.url().path(), "/twitter/create_tweet_v2");
        assert_eq!(
            request.headers().get("x-api-key").unwrap(),
            &HeaderValue::from_static("key-123")
        );
        assert_eq!(
            request.headers().get("content-type").unwrap(),
            &HeaderValue::from_static("application/json")
        );
    }

    #[tokio::test]
    async fn build_get_carries_query_params() {
        let client = client(SessionStore::new());
        let request = client
            .build_get(SEARCH, &[("query", "rust"), ("queryType", "Top")])
            .unwrap();
        assert_eq!(request.url().path(), "/twitter/tweet/advanced_search");
        assert_eq!(
            request.url().query(),
            Some("query=rust&queryType=Top")
        );
    }

    #[tokio::test]
    async fn write_actions_require_a_session() {
        let client = client(SessionStore::new());
        assert!(matches!(
            client.create_post("hello").await,
            Err(Error::AuthRequired)
        ));
        assert!(matches!(
            client.like_tweet("1").await,
            Err(Error::AuthRequired)
        ));
    }

    #[test]
    fn rate_limit_headers_are_recorded() {
        let limits = RateLimitTracker::new();
        let mut headers = HeaderMap::new();
        headers.insert("x-rate-limit-limit", HeaderValue::from_static("100"));
        headers.insert("x-rate-limit-remaining", HeaderValue::from_static("0"));
        let reset = (chrono::Utc::now() + chrono::TimeDelta::seconds(120)).timestamp();
        headers.insert(
            "x-rate-limit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        record_rate_limit(&limits, CREATE_TWEET, &headers);
        assert!(limits.is_limited(CREATE_TWEET));
    }

    #[test]
    fn absent_rate_limit_headers_are_ignored() {
        let limits = RateLimitTracker::new();
        record_rate_limit(&limits, CREATE_TWEET, &HeaderMap::new());
        assert_eq!(limits.info(CREATE_TWEET), None);
    }
}
