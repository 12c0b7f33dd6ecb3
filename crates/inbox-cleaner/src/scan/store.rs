//! Aggregate store: folds scanned messages into per-sender counters.
//!
//! Mutations are staged in a [`PageBatch`] while a page is fetched and
//! written by [`AggregateStore::commit`] in one transaction, so a page is
//! either fully applied or not applied at all.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::message_repo::{self, MessageRow};
use crate::db::sender_repo::{self, SenderEncounter};
use crate::db::{Database, DatabaseError};

use super::unsubscribe::UnsubscribeSignal;

/// How re-encountered message ids affect sender counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Every encounter increments `unread_count`, including message ids
    /// that are already stored. Counts "times re-surfaced".
    #[default]
    EveryEncounter,
    /// Only the first encounter of a message id is counted.
    FirstSeenOnly,
}

/// One message staged for the next commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMessage {
    pub sender: String,
    pub signal: UnsubscribeSignal,
    pub message_id: String,
    pub thread_id: String,
}

/// The unit of work for one page of scanned messages.
#[derive(Debug, Default)]
pub struct PageBatch {
    messages: Vec<StagedMessage>,
}

impl PageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            messages: Vec::with_capacity(capacity),
        }
    }

    /// Stages a message. Nothing is written until the batch is committed.
    pub fn stage(
        &mut self,
        sender: impl Into<String>,
        signal: UnsubscribeSignal,
        message_id: impl Into<String>,
        thread_id: impl Into<String>,
    ) {
        self.messages.push(StagedMessage {
            sender: sender.into(),
            signal,
            message_id: message_id.into(),
            thread_id: thread_id.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[StagedMessage] {
        &self.messages
    }
}

/// What a commit changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    pub messages_staged: usize,
    pub messages_inserted: usize,
    /// Staged ids that were already stored (or repeated within the batch).
    pub duplicates: usize,
    pub senders_created: usize,
}

/// Upserts per-sender counters and records message ids.
#[derive(Debug, Clone)]
pub struct AggregateStore {
    db: Database,
    counting: CountingMode,
}

impl AggregateStore {
    pub fn new(db: Database, counting: CountingMode) -> Self {
        Self { db, counting }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn counting_mode(&self) -> CountingMode {
        self.counting
    }

    /// Applies a single message immediately, as a batch of one.
    pub fn apply(
        &self,
        sender: &str,
        signal: &UnsubscribeSignal,
        message_id: &str,
        thread_id: &str,
    ) -> Result<CommitOutcome, DatabaseError> {
        let mut batch = PageBatch::with_capacity(1);
        batch.stage(sender, signal.clone(), message_id, thread_id);
        self.commit(batch)
    }

    /// Writes every staged message in one transaction.
    ///
    /// Any error (including a staged row that fails validation) rolls the
    /// whole batch back.
    pub fn commit(&self, batch: PageBatch) -> Result<CommitOutcome, DatabaseError> {
        if batch.is_empty() {
            return Ok(CommitOutcome::default());
        }

        let now = Utc::now().to_rfc3339();
        let counting = self.counting;

        let outcome = self.db.with_transaction(|tx| {
            let mut outcome = CommitOutcome {
                messages_staged: batch.len(),
                ..CommitOutcome::default()
            };

            for staged in batch.messages() {
                let row = MessageRow::new(
                    &staged.message_id,
                    &staged.thread_id,
                    &staged.sender,
                    &now,
                )?;
                let already_stored = message_repo::exists(tx, &row.gmail_id)?;
                let unread_increment = match (counting, already_stored) {
                    (CountingMode::FirstSeenOnly, true) => 0,
                    _ => 1,
                };

                let encounter = SenderEncounter {
                    email: &staged.sender,
                    unread_increment,
                    has_list_unsubscribe: staged.signal.has_signal,
                    unsubscribe_mailto: staged.signal.mailto_target.as_deref(),
                    unsubscribe_http: staged.signal.http_target.as_deref(),
                    unsubscribe_one_click: staged.signal.one_click,
                    seen_at: &now,
                };
                if sender_repo::record_encounter(tx, &encounter)? {
                    outcome.senders_created += 1;
                }

                if message_repo::insert_if_absent(tx, &row)? {
                    outcome.messages_inserted += 1;
                } else {
                    outcome.duplicates += 1;
                }
            }

            Ok(outcome)
        })?;

        debug!(
            staged = outcome.messages_staged,
            inserted = outcome.messages_inserted,
            duplicates = outcome.duplicates,
            senders_created = outcome.senders_created,
            "Committed page batch"
        );

        Ok(outcome)
    }
}
