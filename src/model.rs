//! Domain model: work items, the durable queue, and the bot state document.
//!
//! Serde shapes here mirror the persisted JSON documents exactly; renames are
//! deliberate and load-bearing (`type`, `tweetId`, `repliedMentions`, ...).

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Kind of automated action a work item performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Reply,
    Post,
    Engagement,
    Like,
    Follow,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Reply => "reply",
            ActionKind::Post => "post",
            ActionKind::Engagement => "engagement",
            ActionKind::Like => "like",
            ActionKind::Follow => "follow",
        }
    }

    /// Whether the item must carry generated text before it can be executed.
    /// Likes and follows are mechanical and are created directly `ready`.
    pub fn needs_generated_text(&self) -> bool {
        matches!(
            self,
            ActionKind::Reply | ActionKind::Post | ActionKind::Engagement
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    Pending,
    Ready,
    Completed,
    Failed,
}

impl WorkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkStatus::Pending => "pending",
            WorkStatus::Ready => "ready",
            WorkStatus::Completed => "completed",
            WorkStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkStatus::Completed | WorkStatus::Failed)
    }
}

/// Target identifiers and source text for an action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkContext {
    #[serde(rename = "tweetId", skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Identifier of the entity the platform created for a completed action.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkResult {
    #[serde(rename = "tweetId", skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub status: WorkStatus,
    pub context: WorkContext,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_response: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkResult>,
}

impl WorkItem {
    /// An item awaiting generated content.
    pub fn pending(
        id: impl Into<String>,
        kind: ActionKind,
        context: WorkContext,
        prompt: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            status: WorkStatus::Pending,
            context,
            prompt: prompt.into(),
            llm_response: None,
            created_at,
            processed_at: None,
            error: None,
            result: None,
        }
    }

    /// A mechanical item (like/follow) that needs no content.
    pub fn ready(
        id: impl Into<String>,
        kind: ActionKind,
        context: WorkContext,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            status: WorkStatus::Ready,
            ..Self::pending(id, kind, context, "", created_at)
        }
    }

    /// Mechanical actions (like/follow) complete without a created-entity id.
    pub fn mark_completed(&mut self, now: DateTime<Utc>, result: Option<WorkResult>) {
        self.status = WorkStatus::Completed;
        self.processed_at = Some(now);
        self.result = result;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = WorkStatus::Failed;
        self.error = Some(error.into());
    }
}

/// The durable action queue, persisted whole-document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Queue {
    pub items: Vec<WorkItem>,
    pub last_updated: DateTime<Utc>,
}

impl Queue {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            items: Vec::new(),
            last_updated: now,
        }
    }
}

/// Per-action-type daily counter. The count is only meaningful together with
/// its date: any access on a new UTC day must roll it over first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyCounter {
    pub date: NaiveDate,
    pub count: u32,
}

impl DailyCounter {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, count: 0 }
    }

    /// Reset the count if the stored date is not `today`. Unused headroom
    /// from a previous day is discarded, never rolled forward.
    pub fn roll_over(&mut self, today: NaiveDate) {
        if self.date != today {
            self.date = today;
            self.count = 0;
        }
    }

    /// Roll over, then consume one unit of headroom if any remains.
    pub fn check_and_increment(&mut self, ceiling: u32, today: NaiveDate) -> bool {
        self.roll_over(today);
        if self.count < ceiling {
            self.count += 1;
            true
        } else {
            false
        }
    }

    /// Roll over, then report remaining headroom under `ceiling`.
    pub fn headroom(&mut self, ceiling: u32, today: NaiveDate) -> u32 {
        self.roll_over(today);
        ceiling.saturating_sub(self.count)
    }
}

/// Dedup sets, daily ledgers, and posting recency, persisted whole-document.
/// Owned by the orchestrator; single active writer by design.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BotState {
    #[serde(default)]
    pub replied_mentions: Vec<String>,
    pub daily_likes: DailyCounter,
    pub daily_follows: DailyCounter,
    pub last_post_time: DateTime<Utc>,
    #[serde(default)]
    pub engaged_tweets: Vec<String>,
    #[serde(default)]
    pub liked_tweets: Vec<String>,
    #[serde(default)]
    pub followed_accounts: Vec<String>,
}

impl BotState {
    /// A fresh state. The last post time is backdated two hours so the first
    /// producer pass considers an original post immediately.
    pub fn fresh(now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        Self {
            replied_mentions: Vec::new(),
            daily_likes: DailyCounter::new(today),
            daily_follows: DailyCounter::new(today),
            last_post_time: now - TimeDelta::hours(2),
            engaged_tweets: Vec::new(),
            liked_tweets: Vec::new(),
            followed_accounts: Vec::new(),
        }
    }

    pub fn reset_daily_counters(&mut self, today: NaiveDate) {
        self.daily_likes.roll_over(today);
        self.daily_follows.roll_over(today);
    }
}
