//! Operations on the durable action queue.
//!
//! Status transitions are monotonic: `pending -> ready` happens only here via
//! [`Queue::attach_response`] when generated content arrives; `ready ->
//! completed | failed` happens only inside the consumer pass. Nothing ever
//! returns to `pending`.

use crate::error::{Error, Result};
use crate::model::{ActionKind, Queue, WorkItem, WorkStatus};
use serde::Serialize;

/// Completed items retained per producer pass, most recent by original order.
pub const COMPLETED_RETENTION: usize = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub ready: usize,
    pub completed: usize,
    pub failed: usize,
}

impl Queue {
    /// Append a new item. Item ids are unique within the queue.
    pub fn push(&mut self, item: WorkItem) -> Result<()> {
        if self.items.iter().any(|existing| existing.id == item.id) {
            return Err(Error::validation(&item.id, "duplicate work item id"));
        }
        self.items.push(item);
        Ok(())
    }

    /// Attach generated content to a pending item, transitioning it to
    /// `ready`. Any other starting status is rejected.
    pub fn attach_response(&mut self, id: &str, response: impl Into<String>) -> Result<()> {
        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == id)
            .ok_or_else(|| Error::validation(id, "no such work item"))?;
        if item.status != WorkStatus::Pending {
            return Err(Error::validation(
                id,
                format!("cannot attach response in status {}", item.status.as_str()),
            ));
        }
        item.llm_response = Some(response.into());
        item.status = WorkStatus::Ready;
        Ok(())
    }

    /// Trim `completed` items down to the most recent `keep`, preserving
    /// original order. Pending, ready, and failed items are never trimmed.
    pub fn retain_completed(&mut self, keep: usize) {
        let completed = self
            .items
            .iter()
            .filter(|item| item.status == WorkStatus::Completed)
            .count();
        let mut to_drop = completed.saturating_sub(keep);
        self.items.retain(|item| {
            if item.status == WorkStatus::Completed && to_drop > 0 {
                to_drop -= 1;
                false
            } else {
                true
            }
        });
    }

    /// Whether any queued item already targets this (kind, target) pair.
    /// Follows are keyed by username; everything else by tweet id.
    pub fn contains_target(&self, kind: ActionKind, target: &str) -> bool {
        self.items.iter().any(|item| {
            item.kind == kind
                && match kind {
                    ActionKind::Follow => item.context.username.as_deref() == Some(target),
                    _ => item.context.tweet_id.as_deref() == Some(target),
                }
        })
    }

    /// Whether a pending item of this kind exists (used for the staleness
    /// post check, which must not double-enqueue).
    pub fn has_pending_of_kind(&self, kind: ActionKind) -> bool {
        self.items
            .iter()
            .any(|item| item.kind == kind && item.status == WorkStatus::Pending)
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for item in &self.items {
            match item.status {
                WorkStatus::Pending => counts.pending += 1,
                WorkStatus::Ready => counts.ready += 1,
                WorkStatus::Completed => counts.completed += 1,
                WorkStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}
