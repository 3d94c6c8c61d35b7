//! Mailbox polling pipeline.
//!
//! This module owns the periodic loop: wake on an interval, pull unread
//! messages, drop already-processed ids, run the remainder through
//! extraction, merge resulting action items into the todo store, and mark
//! the source messages read best-effort. A manual trigger reuses the same
//! pipeline body; the two can never run concurrently.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use extract_module::{ActionItem, ExtractError, ExtractionClient};
use mailbox_module::{MailboxClient, MailboxError, Message};

use crate::todo_store::{StoreError, Todo, TodoCreate, TodoStore};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
/// Shutdown is checked in one-second slices so a long interval does not
/// delay join.
const STOP_CHECK_SLICE: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where and how often to poll, and how created todos are tagged.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub folder: String,
    pub page_size: usize,
    pub poll_interval: Duration,
    /// Written into every todo's `source` field.
    pub source_tag: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            folder: "INBOX".to_string(),
            page_size: 10,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            source_tag: "mailbox".to_string(),
        }
    }
}

/// Run statistics, read by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PollStats {
    pub last_run_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub interval_seconds: u64,
    pub total_messages_seen: u64,
    pub total_todos_created: u64,
    pub processed_count: usize,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PollSummary {
    pub messages_seen: usize,
    pub new_messages: usize,
    pub todos_created: usize,
}

/// Result of one trigger. A trigger arriving while a run is in flight is
/// rejected, not queued.
#[derive(Debug)]
pub enum PollOutcome {
    Completed(PollSummary),
    AlreadyRunning,
}

/// Mailbox operations the pipeline needs. [`MailboxClient`] is the
/// production implementation; tests substitute stubs.
pub trait MailSource: Send + 'static {
    fn list_messages(
        &mut self,
        folder: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Message>, MailboxError>;

    /// Best effort; `false` reports a rejected flag change.
    fn mark_read(&mut self, message_id: &str) -> bool;

    fn list_folders(&mut self) -> Result<Vec<String>, MailboxError>;
}

impl MailSource for MailboxClient {
    fn list_messages(
        &mut self,
        folder: &str,
        limit: usize,
        unread_only: bool,
    ) -> Result<Vec<Message>, MailboxError> {
        MailboxClient::list_messages(self, folder, limit, unread_only)
    }

    fn mark_read(&mut self, message_id: &str) -> bool {
        MailboxClient::mark_read(self, message_id)
    }

    fn list_folders(&mut self) -> Result<Vec<String>, MailboxError> {
        MailboxClient::list_folders(self)
    }
}

/// Extraction operation the pipeline needs.
pub trait ActionItemExtractor: Send + Sync + 'static {
    fn extract_action_item(&self, message: &Message) -> Result<ActionItem, ExtractError>;
}

impl ActionItemExtractor for ExtractionClient {
    fn extract_action_item(&self, message: &Message) -> Result<ActionItem, ExtractError> {
        ExtractionClient::extract_action_item(self, message)
    }
}

pub type ServicePoller = MailPoller<MailboxClient, ExtractionClient>;

pub struct MailPoller<M: MailSource, X: ActionItemExtractor> {
    config: PollerConfig,
    mailbox: Mutex<M>,
    extractor: X,
    store: Arc<TodoStore>,
    /// Dedup keys already run through extraction this process lifetime.
    processed: Mutex<HashSet<String>>,
    stats: Mutex<PollStats>,
    /// Unit of mutual exclusion for the pipeline body.
    pipeline: Mutex<()>,
}

impl<M: MailSource, X: ActionItemExtractor> MailPoller<M, X> {
    pub fn new(config: PollerConfig, mailbox: M, extractor: X, store: Arc<TodoStore>) -> Self {
        let stats = PollStats {
            last_run_at: None,
            is_active: false,
            interval_seconds: config.poll_interval.as_secs(),
            total_messages_seen: 0,
            total_todos_created: 0,
            processed_count: 0,
            last_error: None,
        };
        Self {
            config,
            mailbox: Mutex::new(mailbox),
            extractor,
            store,
            processed: Mutex::new(HashSet::new()),
            stats: Mutex::new(stats),
            pipeline: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<TodoStore> {
        &self.store
    }

    pub fn stats(&self) -> PollStats {
        self.lock_stats().clone()
    }

    /// Run one poll over the configured folder with the configured page
    /// size, unread messages only.
    pub fn poll_once(&self) -> Result<PollOutcome, PollerError> {
        self.run_guarded(self.config.page_size, true)
    }

    /// Run the same pipeline with a caller-supplied limit and read-state
    /// filter. Shares the pipeline lock and the processed set with the
    /// periodic poll.
    pub fn full_sync(&self, count: usize, unread_only: bool) -> Result<PollOutcome, PollerError> {
        self.run_guarded(count, unread_only)
    }

    /// Connect and list folders; `false` on any failure.
    pub fn test_connection(&self) -> bool {
        let mut mailbox = self.lock_mailbox();
        match mailbox.list_folders() {
            Ok(folders) => {
                debug!("connection test ok, {} folders", folders.len());
                true
            }
            Err(err) => {
                warn!("connection test failed: {}", err);
                false
            }
        }
    }

    /// Run one ad-hoc message through extraction and merge any action item
    /// into the store. Used by the manual message endpoint; bypasses the
    /// processed set and flag mutation.
    pub fn process_message(&self, message: &Message, source: &str) -> Result<Vec<Todo>, PollerError> {
        let item = self.extractor.extract_action_item(message)?;
        let mut created = Vec::new();
        if let Some(todo) = self.merge_action_item(&item, message, source)? {
            created.push(todo);
        }
        Ok(created)
    }

    fn run_guarded(&self, limit: usize, unread_only: bool) -> Result<PollOutcome, PollerError> {
        let _guard = match self.pipeline.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                debug!("poll rejected: pipeline already in flight");
                return Ok(PollOutcome::AlreadyRunning);
            }
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
        };

        match self.run_pipeline(limit, unread_only) {
            Ok(summary) => {
                let mut stats = self.lock_stats();
                stats.last_run_at = Some(Utc::now());
                stats.last_error = None;
                stats.total_messages_seen += summary.new_messages as u64;
                stats.total_todos_created += summary.todos_created as u64;
                stats.processed_count = self.lock_processed().len();
                Ok(PollOutcome::Completed(summary))
            }
            Err(err) => {
                // last_run_at keeps pointing at the last good run.
                self.lock_stats().last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn run_pipeline(&self, limit: usize, unread_only: bool) -> Result<PollSummary, PollerError> {
        let messages = {
            let mut mailbox = self.lock_mailbox();
            mailbox.list_messages(&self.config.folder, limit, unread_only)?
        };

        let mut summary = PollSummary {
            messages_seen: messages.len(),
            ..PollSummary::default()
        };
        let mut handled_ids = Vec::new();

        for message in &messages {
            let key = dedup_key(message);
            if self.lock_processed().contains(&key) {
                continue;
            }
            summary.new_messages += 1;

            match self.extractor.extract_action_item(message) {
                Ok(item) => {
                    match self.merge_action_item(&item, message, &self.config.source_tag) {
                        Ok(Some(todo)) => {
                            summary.todos_created += 1;
                            info!("created todo {} from {}", todo.id, message.id);
                        }
                        Ok(None) => {}
                        Err(err) => warn!("could not store todo for {}: {}", message.id, err),
                    }
                }
                // Contained per message; the batch keeps going.
                Err(err) => warn!("extraction failed for {}: {}", message.id, err),
            }

            // Recorded regardless of extraction outcome so a message that
            // yielded nothing is not retried on the next poll.
            self.lock_processed().insert(key);
            handled_ids.push(message.id.clone());
        }

        if !handled_ids.is_empty() {
            let mut mailbox = self.lock_mailbox();
            for id in &handled_ids {
                if !mailbox.mark_read(id) {
                    warn!("could not mark {} read", id);
                }
            }
        }

        info!(
            "poll complete: {} seen, {} new, {} todos",
            summary.messages_seen, summary.new_messages, summary.todos_created
        );
        Ok(summary)
    }

    fn merge_action_item(
        &self,
        item: &ActionItem,
        message: &Message,
        source: &str,
    ) -> Result<Option<Todo>, StoreError> {
        let Some(title) = item.title.as_deref().filter(|_| item.is_action_item) else {
            return Ok(None);
        };
        let description = format!(
            "From: {} <{}>\nSubject: {}",
            message.sender_display_name, message.sender_address, message.subject
        );
        let todo = self.store.create(TodoCreate {
            title: title.to_string(),
            description: Some(description),
            priority: item.priority.unwrap_or_default(),
            due_date: item.due_date,
            source: source.to_string(),
        })?;
        Ok(Some(todo))
    }

    /// The blocking poll loop: runs until `stop` is set, finishing any
    /// in-flight run before returning.
    pub fn run_loop(&self, stop: &AtomicBool) {
        info!(
            "mail poller started, polling {} every {}s",
            self.config.folder,
            self.config.poll_interval.as_secs()
        );
        self.lock_stats().is_active = true;

        while !stop.load(Ordering::Relaxed) {
            match self.poll_once() {
                Ok(PollOutcome::Completed(summary)) if summary.todos_created > 0 => {
                    info!("poll created {} todos", summary.todos_created);
                }
                Ok(_) => {}
                // Absorbed: transient outages must not stop the loop.
                Err(err) => error!("poll failed: {}", err),
            }

            let mut waited = Duration::ZERO;
            while waited < self.config.poll_interval && !stop.load(Ordering::Relaxed) {
                thread::sleep(STOP_CHECK_SLICE);
                waited += STOP_CHECK_SLICE;
            }
        }

        self.lock_stats().is_active = false;
        info!("mail poller stopped");
    }

    fn lock_mailbox(&self) -> std::sync::MutexGuard<'_, M> {
        self.mailbox.lock().expect("mailbox lock poisoned")
    }

    fn lock_processed(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.processed.lock().expect("processed set lock poisoned")
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, PollStats> {
        self.stats.lock().expect("stats lock poisoned")
    }
}

/// IMAP uids are only stable within one session, so deduplication prefers
/// the RFC 5322 Message-ID header and falls back to the mailbox-scoped id.
fn dedup_key(message: &Message) -> String {
    message
        .message_id
        .clone()
        .unwrap_or_else(|| message.id.clone())
}

pub struct PollerControl {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl PollerControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Start the background polling thread.
pub fn start_poller_thread<M, X>(poller: Arc<MailPoller<M, X>>) -> PollerControl
where
    M: MailSource,
    X: ActionItemExtractor,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let handle = thread::spawn(move || poller.run_loop(&stop_flag));
    PollerControl {
        stop,
        handle: Some(handle),
    }
}
