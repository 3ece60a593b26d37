//! Wire models for the platform API, with one explicit adapter per known
//! response shape. The API has shipped two tweet payload namings over time;
//! each gets its own typed shape and adapter instead of inline field
//! fallbacks.

use serde::Deserialize;

/// Normalized view of a tweet, whatever shape it arrived in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetSummary {
    pub id: String,
    pub text: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
    pub likes: u32,
}

/// Current tweet payload naming.
#[derive(Debug, Deserialize)]
pub struct TweetV2 {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub likes_count: u32,
}

/// Older tweet payload naming still returned by some endpoints.
#[derive(Debug, Deserialize)]
pub struct TweetLegacy {
    pub tweet_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub author_username: Option<String>,
    #[serde(default)]
    pub favorite_count: u32,
}

/// Either known tweet shape. `TweetV2` is tried first; its `id` field is
/// what distinguishes it from the legacy shape's `tweet_id`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TweetPayload {
    V2(TweetV2),
    Legacy(TweetLegacy),
}

impl TweetSummary {
    pub fn from_v2(raw: TweetV2) -> Self {
        Self {
            id: raw.id,
            text: raw.text,
            user_id: raw.user_id,
            username: raw.username,
            likes: raw.likes_count,
        }
    }

    pub fn from_legacy(raw: TweetLegacy) -> Self {
        Self {
            id: raw.tweet_id,
            text: raw.content,
            user_id: raw.author_id,
            username: raw.author_username,
            likes: raw.favorite_count,
        }
    }
}

impl From<TweetPayload> for TweetSummary {
    fn from(payload: TweetPayload) -> Self {
        match payload {
            TweetPayload::V2(raw) => TweetSummary::from_v2(raw),
            TweetPayload::Legacy(raw) => TweetSummary::from_legacy(raw),
        }
    }
}

/// Application-level outcome of a write action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub success: bool,
    pub tweet_id: Option<String>,
    pub message: Option<String>,
}

/// Envelope returned by tweet write endpoints: `{status, tweet_id?, msg?}`.
#[derive(Debug, Deserialize)]
pub struct TweetActionRaw {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub tweet_id: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ActionOutcome {
    pub fn from_tweet_action(raw: TweetActionRaw) -> Self {
        Self {
            success: raw.status == "success",
            tweet_id: raw.tweet_id,
            message: raw.msg,
        }
    }

    pub fn from_follow_action(raw: FollowActionRaw) -> Self {
        Self {
            success: raw.success,
            tweet_id: None,
            message: raw.message,
        }
    }
}

/// Envelope returned by the follow endpoint: `{success, message?}`.
#[derive(Debug, Deserialize)]
pub struct FollowActionRaw {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error payload carried by non-2xx responses.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MentionsResponse {
    #[serde(default)]
    pub mentions: Vec<TweetPayload>,
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tweets: Vec<TweetPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn adapts_v2_tweet_shape() {
        let payload: TweetPayload = serde_json::from_value(json!({
            "id": "100",
            "text": "hello",
            "user_id": "u1",
            "username": "ada",
            "likes_count": 12
        }))
        .unwrap();
        let summary = TweetSummary::from(payload);
        assert_eq!(
            summary,
            TweetSummary {
                id: "100".into(),
                text: "hello".into(),
                user_id: Some("u1".into()),
                username: Some("ada".into()),
                likes: 12,
            }
        );
    }

    #[test]
    fn adapts_legacy_tweet_shape() {
        let payload: TweetPayload = serde_json::from_value(json!({
            "tweet_id": "200",
            "content": "older shape",
            "author_id": "u2",
            "author_username": "grace",
            "favorite_count": 3
        }))
        .unwrap();
        let summary = TweetSummary::from(payload);
        assert_eq!(summary.id, "200");
        assert_eq!(summary.text, "older shape");
        assert_eq!(summary.username.as_deref(), Some("grace"));
        assert_eq!(summary.likes, 3);
    }

    #[test]
    fn tweet_action_success_and_failure() {
        let ok: TweetActionRaw = serde_json::from_value(json!({
            "status": "success",
            "tweet_id": "900",
        }))
        .unwrap();
        let outcome = ActionOutcome::from_tweet_action(ok);
        assert!(outcome.success);
        assert_eq!(outcome.tweet_id.as_deref(), Some("900"));

        let bad: TweetActionRaw = serde_json::from_value(json!({
            "status": "error",
            "msg": "duplicate tweet",
        }))
        .unwrap();
        let outcome = ActionOutcome::from_tweet_action(bad);
        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("duplicate tweet"));
    }

    #[test]
    fn follow_action_envelope() {
        let raw: FollowActionRaw =
            serde_json::from_value(json!({"success": true, "message": "ok"})).unwrap();
        let outcome = ActionOutcome::from_follow_action(raw);
        assert!(outcome.success);
        assert_eq!(outcome.tweet_id, None);
    }

    #[test]
    fn mentions_response_accepts_mixed_shapes() {
        let response: MentionsResponse = serde_json::from_value(json!({
            "mentions": [
                {"id": "1", "text": "a", "likes_count": 0},
                {"tweet_id": "2", "content": "b", "favorite_count": 1}
            ]
        }))
        .unwrap();
        let summaries: Vec<TweetSummary> =
            response.mentions.into_iter().map(Into::into).collect();
        assert_eq!(summaries[0].id, "1");
        assert_eq!(summaries[1].id, "2");
    }
}
