//! Producer and consumer passes over the action queue.
//!
//! The producer derives candidate work from platform signals and appends it;
//! the consumer executes `ready` items strictly sequentially. The two passes
//! are deliberately decoupled so content generation can happen in between,
//! transitioning items `pending -> ready` via [`Orchestrator::attach_response`].

use chrono::{NaiveDate, TimeDelta, Utc};
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config;
use crate::error::{Error, Result};
use crate::gate::AdmissionGate;
use crate::model::{ActionKind, BotState, Queue, WorkContext, WorkItem, WorkResult, WorkStatus};
use crate::platform::model::TweetSummary;
use crate::platform::PlatformService;
use crate::queue::{QueueCounts, COMPLETED_RETENTION};
use crate::rate_limit::{RateLimitInfo, RateLimitTracker};
use crate::store::DocumentStore;

/// Runtime policy knobs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct Limits {
    pub daily_likes: u32,
    pub daily_follows: u32,
    pub item_delay: Duration,
    pub mentions_per_cycle: usize,
    pub engagements_per_cycle: usize,
    pub likes_per_cycle: u32,
    pub follows_per_cycle: u32,
    pub stale_post_after: TimeDelta,
}

impl From<&config::Limits> for Limits {
    fn from(cfg: &config::Limits) -> Self {
        Self {
            daily_likes: cfg.daily_likes,
            daily_follows: cfg.daily_follows,
            item_delay: Duration::from_millis(cfg.item_delay_ms),
            mentions_per_cycle: cfg.mentions_per_cycle,
            engagements_per_cycle: cfg.engagements_per_cycle,
            likes_per_cycle: cfg.likes_per_cycle,
            follows_per_cycle: cfg.follows_per_cycle,
            stale_post_after: TimeDelta::milliseconds(
                (cfg.stale_post_hours * 3_600_000.0) as i64,
            ),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::from(&config::Limits::default())
    }
}

/// End-of-pass accounting, surfaced to the caller and the logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceSummary {
    pub added: usize,
    pub counts: QueueCounts,
}

enum ItemOutcome {
    Completed,
    Failed,
    Skipped,
}

pub struct Orchestrator {
    platform: Arc<dyn PlatformService>,
    store: DocumentStore,
    limits: Limits,
    target_username: String,
    search_query: String,
    gate: AdmissionGate,
    rate_limits: Arc<RateLimitTracker>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        platform: Arc<dyn PlatformService>,
        store: DocumentStore,
        limits: Limits,
        target_username: impl Into<String>,
        search_query: impl Into<String>,
        gate: AdmissionGate,
        rate_limits: Arc<RateLimitTracker>,
    ) -> Self {
        Self {
            platform,
            store,
            limits,
            target_username: target_username.into(),
            search_query: search_query.into(),
            gate,
            rate_limits,
        }
    }

    /// Producer pass: trim history, derive candidate work from platform
    /// signals, dedup, and append. A missing queue document starts fresh;
    /// failed discovery fetches are logged and skipped.
    #[instrument(skip_all)]
    pub async fn produce_pass(&self) -> Result<ProduceSummary> {
        let now = Utc::now();
        let today = now.date_naive();
        let mut queue = self.store.load_queue_or_default().await;
        let mut state = self.store.load_state_or_default().await;
        state.reset_daily_counters(today);
        queue.retain_completed(COMPLETED_RETENTION);

        let mut added = 0;

        match self.platform.fetch_mentions(&self.target_username).await {
            Ok(mentions) => {
                let mut picked = 0;
                for mention in mentions {
                    if picked >= self.limits.mentions_per_cycle {
                        break;
                    }
                    if state.replied_mentions.contains(&mention.id)
                        || queue.contains_target(ActionKind::Reply, &mention.id)
                    {
                        continue;
                    }
                    let prompt = reply_prompt(&mention);
                    let item = WorkItem::pending(
                        format!("reply-{}", mention.id),
                        ActionKind::Reply,
                        context_for_tweet(&mention),
                        prompt,
                        now,
                    );
                    if push_logged(&mut queue, item) {
                        added += 1;
                        picked += 1;
                    }
                }
            }
            Err(err) => warn!(%err, "could not fetch mentions"),
        }

        let since_last_post = now - state.last_post_time;
        if since_last_post > self.limits.stale_post_after
            && !queue.has_pending_of_kind(ActionKind::Post)
        {
            let item = WorkItem::pending(
                format!("post-{}", Uuid::new_v4().simple()),
                ActionKind::Post,
                WorkContext::default(),
                post_prompt(),
                now,
            );
            if push_logged(&mut queue, item) {
                added += 1;
            }
        }

        let search_results = match self.platform.search_top(&self.search_query).await {
            Ok(tweets) => tweets,
            Err(err) => {
                warn!(%err, "could not search for engagement targets");
                Vec::new()
            }
        };

        let mut picked = 0;
        for tweet in &search_results {
            if picked >= self.limits.engagements_per_cycle {
                break;
            }
            if state.engaged_tweets.contains(&tweet.id)
                || queue.contains_target(ActionKind::Engagement, &tweet.id)
            {
                continue;
            }
            let item = WorkItem::pending(
                format!("engagement-{}", tweet.id),
                ActionKind::Engagement,
                context_for_tweet(tweet),
                engagement_prompt(tweet),
                now,
            );
            if push_logged(&mut queue, item) {
                added += 1;
                picked += 1;
            }
        }

        // Mechanical likes, bounded by per-cycle cap and ledger headroom.
        let like_budget = self
            .limits
            .likes_per_cycle
            .min(state.daily_likes.headroom(self.limits.daily_likes, today))
            as usize;
        let mut picked = 0;
        for tweet in &search_results {
            if picked >= like_budget {
                break;
            }
            if state.liked_tweets.contains(&tweet.id)
                || queue.contains_target(ActionKind::Like, &tweet.id)
            {
                continue;
            }
            let item = WorkItem::ready(
                format!("like-{}", tweet.id),
                ActionKind::Like,
                context_for_tweet(tweet),
                now,
            );
            if push_logged(&mut queue, item) {
                added += 1;
                picked += 1;
            }
        }

        // Mechanical follows, keyed by unique author username.
        let follow_budget = self
            .limits
            .follows_per_cycle
            .min(state.daily_follows.headroom(self.limits.daily_follows, today))
            as usize;
        let mut picked = 0;
        let mut seen = Vec::new();
        for tweet in &search_results {
            if picked >= follow_budget {
                break;
            }
            let Some(username) = tweet.username.clone() else {
                continue;
            };
            if seen.contains(&username)
                || state.followed_accounts.contains(&username)
                || queue.contains_target(ActionKind::Follow, &username)
            {
                continue;
            }
            seen.push(username.clone());
            let user_id = tweet.user_id.clone().unwrap_or_else(|| username.clone());
            let item = WorkItem::ready(
                format!("follow-{}-{}", username, Uuid::new_v4().simple()),
                ActionKind::Follow,
                WorkContext {
                    username: Some(username),
                    user_id: Some(user_id),
                    ..Default::default()
                },
                now,
            );
            if push_logged(&mut queue, item) {
                added += 1;
                picked += 1;
            }
        }

        self.store.save_queue(&mut queue).await?;
        self.store.save_state(&state).await?;

        let counts = queue.counts();
        info!(
            added,
            pending = counts.pending,
            ready = counts.ready,
            completed = counts.completed,
            "producer pass complete"
        );
        Ok(ProduceSummary { added, counts })
    }

    /// Consumer pass: execute `ready` items in stored order, one fully
    /// resolved (including its post-action delay) before the next begins.
    /// A missing queue document is fatal here — there is nothing to execute.
    #[instrument(skip_all)]
    pub async fn process_pass(&self) -> Result<PassSummary> {
        let mut queue = self.store.load_queue().await?;
        let mut state = self.store.load_state_or_default().await;
        let today = Utc::now().date_naive();
        state.reset_daily_counters(today);

        let mut summary = PassSummary::default();
        for index in 0..queue.items.len() {
            if queue.items[index].status != WorkStatus::Ready {
                continue;
            }
            let outcome = self
                .execute_item(&mut queue.items[index], &mut state, today)
                .await;
            match outcome {
                ItemOutcome::Completed => summary.succeeded += 1,
                ItemOutcome::Failed => summary.failed += 1,
                ItemOutcome::Skipped => summary.skipped += 1,
            }
            // Behavioral pacing distinct from the gate's QPS budget: applied
            // after every item, whatever the outcome.
            tokio::time::sleep(self.limits.item_delay).await;
        }

        self.store.save_queue(&mut queue).await?;
        self.store.save_state(&state).await?;

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "consumer pass complete"
        );
        Ok(summary)
    }

    async fn execute_item(
        &self,
        item: &mut WorkItem,
        state: &mut BotState,
        today: NaiveDate,
    ) -> ItemOutcome {
        let now = Utc::now();
        if item.kind.needs_generated_text() && item.llm_response.is_none() {
            warn!(id = %item.id, kind = item.kind.as_str(), "no generated content; skipping");
            return ItemOutcome::Skipped;
        }

        match item.kind {
            ActionKind::Reply => {
                let (Some(tweet_id), Some(text)) =
                    (item.context.tweet_id.clone(), item.llm_response.clone())
                else {
                    warn!(id = %item.id, "reply item missing target; skipping");
                    return ItemOutcome::Skipped;
                };
                match self.platform.create_reply(&text, &tweet_id).await {
                    Ok(outcome) if outcome.success && outcome.tweet_id.is_some() => {
                        item.mark_completed(
                            now,
                            Some(WorkResult {
                                tweet_id: outcome.tweet_id,
                            }),
                        );
                        state.replied_mentions.push(tweet_id);
                        ItemOutcome::Completed
                    }
                    Ok(outcome) => {
                        item.mark_failed(failure_message(outcome.message));
                        ItemOutcome::Failed
                    }
                    Err(err) => {
                        item.mark_failed(err.to_string());
                        ItemOutcome::Failed
                    }
                }
            }
            ActionKind::Post => {
                let Some(text) = item.llm_response.clone() else {
                    return ItemOutcome::Skipped;
                };
                match self.platform.create_post(&text).await {
                    Ok(outcome) if outcome.success && outcome.tweet_id.is_some() => {
                        item.mark_completed(
                            now,
                            Some(WorkResult {
                                tweet_id: outcome.tweet_id,
                            }),
                        );
                        state.last_post_time = now;
                        ItemOutcome::Completed
                    }
                    Ok(outcome) => {
                        item.mark_failed(
                            outcome
                                .message
                                .unwrap_or_else(|| "could not extract tweet id".to_string()),
                        );
                        ItemOutcome::Failed
                    }
                    Err(err) => {
                        item.mark_failed(err.to_string());
                        ItemOutcome::Failed
                    }
                }
            }
            ActionKind::Engagement => {
                let (Some(tweet_id), Some(text)) =
                    (item.context.tweet_id.clone(), item.llm_response.clone())
                else {
                    warn!(id = %item.id, "engagement item missing target; skipping");
                    return ItemOutcome::Skipped;
                };
                match self.platform.create_reply(&text, &tweet_id).await {
                    Ok(outcome) if outcome.success && outcome.tweet_id.is_some() => {
                        item.mark_completed(
                            now,
                            Some(WorkResult {
                                tweet_id: outcome.tweet_id,
                            }),
                        );
                        state.engaged_tweets.push(tweet_id.clone());
                        self.bonus_like(&tweet_id, state, today).await;
                        ItemOutcome::Completed
                    }
                    Ok(outcome) => {
                        item.mark_failed(failure_message(outcome.message));
                        ItemOutcome::Failed
                    }
                    Err(err) => {
                        item.mark_failed(err.to_string());
                        ItemOutcome::Failed
                    }
                }
            }
            ActionKind::Like => {
                let Some(tweet_id) = item.context.tweet_id.clone() else {
                    warn!(id = %item.id, "like item missing tweet id; skipping");
                    return ItemOutcome::Skipped;
                };
                if state.daily_likes.headroom(self.limits.daily_likes, today) == 0 {
                    item.mark_failed(Error::QuotaExceeded { kind: "likes" }.to_string());
                    return ItemOutcome::Failed;
                }
                match self.platform.like_tweet(&tweet_id).await {
                    Ok(outcome) if outcome.success => {
                        item.mark_completed(now, None);
                        state
                            .daily_likes
                            .check_and_increment(self.limits.daily_likes, today);
                        state.liked_tweets.push(tweet_id);
                        ItemOutcome::Completed
                    }
                    Ok(outcome) => {
                        item.mark_failed(failure_message(outcome.message));
                        ItemOutcome::Failed
                    }
                    Err(err) => {
                        item.mark_failed(err.to_string());
                        ItemOutcome::Failed
                    }
                }
            }
            ActionKind::Follow => {
                let Some(user_id) = item.context.user_id.clone() else {
                    warn!(id = %item.id, "follow item missing user id; skipping");
                    return ItemOutcome::Skipped;
                };
                if state.daily_follows.headroom(self.limits.daily_follows, today) == 0 {
                    item.mark_failed(Error::QuotaExceeded { kind: "follows" }.to_string());
                    return ItemOutcome::Failed;
                }
                match self.platform.follow_user(&user_id).await {
                    Ok(outcome) if outcome.success => {
                        item.mark_completed(now, None);
                        state
                            .daily_follows
                            .check_and_increment(self.limits.daily_follows, today);
                        if let Some(username) = item.context.username.clone() {
                            state.followed_accounts.push(username);
                        }
                        ItemOutcome::Completed
                    }
                    Ok(outcome) => {
                        item.mark_failed(failure_message(outcome.message));
                        ItemOutcome::Failed
                    }
                    Err(err) => {
                        item.mark_failed(err.to_string());
                        ItemOutcome::Failed
                    }
                }
            }
        }
    }

    /// After a successful engagement reply, also like the target tweet when
    /// the ledger has headroom. Best effort: failures are ignored.
    async fn bonus_like(&self, tweet_id: &str, state: &mut BotState, today: NaiveDate) {
        if state.daily_likes.headroom(self.limits.daily_likes, today) == 0 {
            return;
        }
        if let Ok(outcome) = self.platform.like_tweet(tweet_id).await {
            if outcome.success {
                state
                    .daily_likes
                    .check_and_increment(self.limits.daily_likes, today);
                state.liked_tweets.push(tweet_id.to_string());
            }
        }
    }

    /// External content-generation hook: attach a generated response to a
    /// pending item, flipping it `ready`.
    pub async fn attach_response(&self, id: &str, response: &str) -> Result<()> {
        let mut queue = self.store.load_queue().await?;
        queue.attach_response(id, response)?;
        self.store.save_queue(&mut queue).await?;
        info!(id, "response attached; item is ready");
        Ok(())
    }

    /// Batch form of [`attach_response`](Self::attach_response): one queue
    /// load and save for the whole set. Individual rejections are logged and
    /// skipped; returns the number attached.
    pub async fn attach_batch(&self, responses: &[(String, String)]) -> Result<usize> {
        let mut queue = self.store.load_queue().await?;
        let mut attached = 0;
        for (id, response) in responses {
            match queue.attach_response(id, response) {
                Ok(()) => {
                    info!(id, "response attached; item is ready");
                    attached += 1;
                }
                Err(err) => warn!(id, %err, "response not attached"),
            }
        }
        self.store.save_queue(&mut queue).await?;
        Ok(attached)
    }

    pub async fn queue_snapshot(&self) -> Queue {
        self.store.load_queue_or_default().await
    }

    pub fn rate_limit_info(&self, endpoint: &str) -> Option<RateLimitInfo> {
        self.rate_limits.info(endpoint)
    }

    // Admission gate controls, surfaced for callers.

    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    pub fn clear_queued_calls(&self) {
        self.gate.clear();
    }

    pub fn gate_size(&self) -> usize {
        self.gate.size()
    }

    pub fn gate_pending(&self) -> usize {
        self.gate.pending()
    }

    pub async fn idle(&self) {
        self.gate.on_idle().await;
    }
}

fn push_logged(queue: &mut Queue, item: WorkItem) -> bool {
    let id = item.id.clone();
    let kind = item.kind;
    match queue.push(item) {
        Ok(()) => {
            info!(id, kind = kind.as_str(), "queued new work item");
            true
        }
        Err(err) => {
            warn!(id, %err, "skipping candidate");
            false
        }
    }
}

fn failure_message(message: Option<String>) -> String {
    message.unwrap_or_else(|| "platform reported failure".to_string())
}

fn context_for_tweet(tweet: &TweetSummary) -> WorkContext {
    WorkContext {
        tweet_id: Some(tweet.id.clone()),
        username: tweet.username.clone(),
        text: Some(tweet.text.clone()),
        user_id: tweet.user_id.clone(),
    }
}

fn reply_prompt(mention: &TweetSummary) -> String {
    let who = mention.username.as_deref().unwrap_or("someone");
    format!(
        "You are replying to this tweet from @{who}: \"{}\"\n\n\
         Generate a sharp, insightful reply that:\n\
         - Is under 80 characters (IMPORTANT: max 80 chars!)\n\
         - Is contextually relevant to what they said\n\
         - Adds value, not just acknowledges\n\n\
         Reply (max 80 chars):",
        mention.text
    )
}

fn post_prompt() -> String {
    "Generate an original tweet that:\n\
     - Is thought-provoking about AI, agents, autonomy, or technology\n\
     - Under 280 characters\n\
     - Fresh and engaging\n\n\
     Tweet:"
        .to_string()
}

fn engagement_prompt(tweet: &TweetSummary) -> String {
    let who = tweet.username.as_deref().unwrap_or("someone");
    format!(
        "You found this interesting tweet from @{who}: \"{}\"\n\n\
         Generate a thoughtful reply that:\n\
         - Shows you understood their point\n\
         - Adds a unique perspective or insight\n\
         - Is under 280 characters\n\
         - Encourages further discussion\n\n\
         Reply:",
        tweet.text
    )
}
