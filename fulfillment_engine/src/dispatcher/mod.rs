//! Durable, retrying delivery of transactional messages.
//!
//! The protocol, in order:
//! 1. Persist a [`crate::db_types::NotificationRecord`] in PENDING state. This write happens before any network
//!    call, so a crash mid-send still leaves an auditable, retryable trace.
//! 2. Enqueue a [`NotificationJob`] referencing the record onto a bounded work queue. If the queue is unavailable,
//!    fall back to a synchronous send in the calling path and update the record directly.
//! 3. A worker pool drains the queue with bounded concurrency and executes the provider call, retrying with
//!    exponential backoff up to a fixed ceiling. A job that exhausts its retries is copied to the dead-letter
//!    store with the failure reason; it is never silently dropped.
//!
//! Delivery is at-least-once: a duplicate send is an acceptable, bounded cost compared to silent message loss.
mod orchestrator;

use std::time::Duration;

use futures_util::StreamExt;
use log::*;
use tokio::sync::mpsc;

pub use orchestrator::NotificationOrchestrator;

use crate::{
    db_types::{Correlation, NewNotificationRecord, NotificationChannel, NotificationRecord},
    traits::{
        AttemptOutcome,
        AuditEvent,
        AuditRecorder,
        ChannelError,
        ChatProvider,
        ChatTarget,
        FulfillmentDatabase,
        FulfillmentDbError,
        ProviderReceipt,
        SmsProvider,
    },
};

/// A queued unit of work. The tagged variants keep the worker exhaustive; there is no untyped bag of optional
/// fields travelling through the queue.
#[derive(Debug, Clone)]
pub enum NotificationJob {
    Chat { record_id: i64, chat_id: String, message: String, target: ChatTarget },
    Sms { record_id: i64, phone: String, message: String },
}

impl NotificationJob {
    pub fn record_id(&self) -> i64 {
        match self {
            Self::Chat { record_id, .. } | Self::Sms { record_id, .. } => *record_id,
        }
    }

    pub fn channel(&self) -> NotificationChannel {
        match self {
            Self::Chat { .. } => NotificationChannel::Chat,
            Self::Sms { .. } => NotificationChannel::Sms,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub queue_depth: usize,
    /// Concurrent provider calls across the worker pool.
    pub concurrency: usize,
    pub max_attempts: u32,
    /// First retry delay; subsequent retries double it.
    pub backoff_base: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { queue_depth: 128, concurrency: 5, max_attempts: 5, backoff_base: Duration::from_secs(3) }
    }
}

/// The producer half: creates write-ahead records and enqueues jobs. Cheap to clone and share across request
/// handlers.
#[derive(Clone)]
pub struct NotificationDispatcher<B, C, S> {
    db: B,
    chat: C,
    sms: S,
    tx: mpsc::Sender<NotificationJob>,
    config: DispatcherConfig,
}

/// The consumer half. Hand it to `tokio::spawn` at composition time; it runs until every dispatcher clone is
/// dropped and the queue drains.
pub struct DispatchWorker<B, C, S> {
    db: B,
    chat: C,
    sms: S,
    rx: mpsc::Receiver<NotificationJob>,
    config: DispatcherConfig,
}

/// Build the dispatcher pair sharing one bounded queue.
pub fn dispatch_channel<B, C, S>(
    db: B,
    chat: C,
    sms: S,
    config: DispatcherConfig,
) -> (NotificationDispatcher<B, C, S>, DispatchWorker<B, C, S>)
where
    B: Clone,
    C: Clone,
    S: Clone,
{
    let (tx, rx) = mpsc::channel(config.queue_depth);
    let dispatcher =
        NotificationDispatcher { db: db.clone(), chat: chat.clone(), sms: sms.clone(), tx, config: config.clone() };
    let worker = DispatchWorker { db, chat, sms, rx, config };
    (dispatcher, worker)
}

impl<B, C, S> NotificationDispatcher<B, C, S>
where
    B: FulfillmentDatabase + AuditRecorder,
    C: ChatProvider,
    S: SmsProvider,
{
    /// Queue a chat message. Returns the id of the write-ahead record.
    pub async fn send_chat(
        &self,
        chat_id: &str,
        message: &str,
        target: ChatTarget,
        correlation: Correlation,
    ) -> Result<i64, FulfillmentDbError> {
        let record = self
            .db
            .insert_notification(NewNotificationRecord {
                channel: NotificationChannel::Chat,
                recipient: chat_id.to_string(),
                message: message.to_string(),
                correlation,
            })
            .await?;
        let job = NotificationJob::Chat {
            record_id: record.id,
            chat_id: chat_id.to_string(),
            message: message.to_string(),
            target,
        };
        self.enqueue_or_deliver(job).await;
        Ok(record.id)
    }

    /// Queue an SMS. Returns the id of the write-ahead record.
    pub async fn send_sms(
        &self,
        phone: &str,
        message: &str,
        correlation: Correlation,
    ) -> Result<i64, FulfillmentDbError> {
        let record = self
            .db
            .insert_notification(NewNotificationRecord {
                channel: NotificationChannel::Sms,
                recipient: phone.to_string(),
                message: message.to_string(),
                correlation,
            })
            .await?;
        let job =
            NotificationJob::Sms { record_id: record.id, phone: phone.to_string(), message: message.to_string() };
        self.enqueue_or_deliver(job).await;
        Ok(record.id)
    }

    async fn enqueue_or_deliver(&self, job: NotificationJob) {
        match self.tx.try_send(job) {
            Ok(()) => {},
            Err(e) => {
                let job = e.into_inner();
                warn!(
                    "📬️ Work queue unavailable; sending notification record {} synchronously",
                    job.record_id()
                );
                // Single attempt on the fallback path; the record is updated either way.
                let outcome = attempt_once(&self.chat, &self.sms, &job).await;
                finalize_attempt(&self.db, &job, outcome, true).await;
            },
        }
    }
}

impl<B, C, S> DispatchWorker<B, C, S>
where
    B: FulfillmentDatabase + AuditRecorder,
    C: ChatProvider,
    S: SmsProvider,
{
    /// Drain the queue until all producers are gone. Provider calls run with bounded concurrency; each job owns
    /// its retry schedule.
    pub async fn run(self) {
        let DispatchWorker { db, chat, sms, rx, config } = self;
        info!("📬️ Notification worker pool started (concurrency {})", config.concurrency);
        let jobs = futures_util::stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|job| (job, rx)) });
        jobs.for_each_concurrent(Some(config.concurrency), |job| {
            let db = db.clone();
            let chat = chat.clone();
            let sms = sms.clone();
            let config = config.clone();
            async move {
                process_job(db, chat, sms, config, job).await;
            }
        })
        .await;
        info!("📬️ Notification worker pool drained; shutting down");
    }
}

async fn process_job<B, C, S>(db: B, chat: C, sms: S, config: DispatcherConfig, job: NotificationJob)
where
    B: FulfillmentDatabase + AuditRecorder,
    C: ChatProvider,
    S: SmsProvider,
{
    for attempt in 1..=config.max_attempts {
        match attempt_once(&chat, &sms, &job).await {
            Ok(receipt) => {
                finalize_attempt(&db, &job, Ok(receipt), true).await;
                return;
            },
            Err(e) => {
                let exhausted = attempt == config.max_attempts;
                debug!(
                    "📬️ Notification record {} attempt {attempt}/{} failed: {e}",
                    job.record_id(),
                    config.max_attempts
                );
                finalize_attempt(&db, &job, Err(e), exhausted).await;
                if exhausted {
                    return;
                }
                let delay = config.backoff_base * 2u32.saturating_pow(attempt - 1);
                tokio::time::sleep(delay).await;
            },
        }
    }
}

async fn attempt_once<C, S>(chat: &C, sms: &S, job: &NotificationJob) -> Result<ProviderReceipt, ChannelError>
where
    C: ChatProvider,
    S: SmsProvider,
{
    match job {
        NotificationJob::Chat { chat_id, message, target, .. } => chat.send_message(chat_id, message, *target).await,
        NotificationJob::Sms { phone, message, .. } => sms.send_sms(phone, message).await,
    }
}

/// Update the write-ahead record for one attempt and, when the series is over, emit the analytics event and
/// dead-letter exhausted jobs. Storage failures here are logged, never propagated: the provider call already
/// happened and must not be repeated because bookkeeping hiccupped.
async fn finalize_attempt<B>(
    db: &B,
    job: &NotificationJob,
    outcome: Result<ProviderReceipt, ChannelError>,
    is_final: bool,
) where
    B: FulfillmentDatabase + AuditRecorder,
{
    let record_id = job.record_id();
    match outcome {
        Ok(receipt) => {
            let attempt = AttemptOutcome::Delivered {
                provider_message_id: receipt.provider_message_id,
                provider_status: receipt.provider_status,
            };
            match db.record_notification_attempt(record_id, attempt).await {
                Ok(record) => audit_notification(db, "notification_sent", &record).await,
                Err(e) => error!("📬️ Could not record delivery of notification {record_id}: {e}"),
            }
        },
        Err(send_error) => {
            let attempt = AttemptOutcome::Failed { error: send_error.to_string() };
            match db.record_notification_attempt(record_id, attempt).await {
                Ok(record) => {
                    if is_final {
                        if let Err(e) = db.push_dead_letter(&record, &send_error.to_string()).await {
                            error!("📬️ Could not dead-letter notification {record_id}: {e}");
                        }
                        audit_notification(db, "notification_failed", &record).await;
                    }
                },
                Err(e) => error!("📬️ Could not record failure of notification {record_id}: {e}"),
            }
        },
    }
}

async fn audit_notification<B: AuditRecorder>(db: &B, event_name: &str, record: &NotificationRecord) {
    let event = AuditEvent {
        order_id: record.order_id.clone(),
        customer_id: record.customer_id.clone(),
        vendor_id: record.vendor_id.clone(),
        actor_type: None,
        metadata: serde_json::json!({ "channel": record.channel.as_str(), "attempts": record.attempts }),
    };
    if let Err(e) = db.record(event_name, event).await {
        warn!("📬️ Could not record audit event {event_name}: {e}");
    }
}
