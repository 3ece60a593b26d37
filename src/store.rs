//! Whole-document JSON persistence for the queue and bot state.
//!
//! Documents are read and overwritten in full. A single active process is
//! assumed; there is no locking, so concurrent runs risk lost updates. That
//! constraint is accepted and documented rather than patched here.

use crate::error::{Error, Result};
use crate::model::{BotState, Queue};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

pub struct DocumentStore {
    queue_path: PathBuf,
    state_path: PathBuf,
}

impl DocumentStore {
    pub fn new(queue_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            queue_path: queue_path.into(),
            state_path: state_path.into(),
        }
    }

    pub fn queue_path(&self) -> &Path {
        &self.queue_path
    }

    /// Producer-pass load: a missing or unreadable queue document yields a
    /// fresh empty queue.
    pub async fn load_queue_or_default(&self) -> Queue {
        match self.try_load_queue().await {
            Ok(queue) => queue,
            Err(err) => {
                warn!(%err, "queue document unavailable; starting fresh");
                Queue::empty(Utc::now())
            }
        }
    }

    /// Consumer-pass load: without a readable queue document there is nothing
    /// meaningful to execute, so the failure is surfaced.
    pub async fn load_queue(&self) -> Result<Queue> {
        self.try_load_queue().await
    }

    async fn try_load_queue(&self) -> Result<Queue> {
        let raw = fs::read_to_string(&self.queue_path)
            .await
            .map_err(|err| Error::state_io(&self.queue_path, err))?;
        serde_json::from_str(&raw).map_err(|err| Error::state_io(&self.queue_path, err))
    }

    /// Overwrite the queue document, stamping `last_updated`.
    pub async fn save_queue(&self, queue: &mut Queue) -> Result<()> {
        queue.last_updated = Utc::now();
        write_json(&self.queue_path, queue).await
    }

    /// A missing or unreadable state document yields a fresh state; dedup
    /// sets and ledgers start empty.
    pub async fn load_state_or_default(&self) -> BotState {
        match fs::read_to_string(&self.state_path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(state) => state,
                Err(err) => {
                    warn!(%err, "state document malformed; starting fresh");
                    BotState::fresh(Utc::now())
                }
            },
            Err(_) => BotState::fresh(Utc::now()),
        }
    }

    pub async fn save_state(&self, state: &BotState) -> Result<()> {
        write_json(&self.state_path, state).await
    }
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let body =
        serde_json::to_string_pretty(value).map_err(|err| Error::state_io(path, err))?;
    fs::write(path, body)
        .await
        .map_err(|err| Error::state_io(path, err))
}
