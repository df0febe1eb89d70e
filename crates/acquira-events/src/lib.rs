#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Core event bus for the Acquira platform.
//!
//! The bus provides a typed event enum, sequential identifiers, and support
//! for replaying recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; when the channel overflows, the
//! oldest events are dropped.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use acquira_core::{DownloadState, FeedItemStatus, PipelineStatus, Stage, StageStatus};
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};
use tracing::error;
use uuid::Uuid;

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed domain events surfaced across the system.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A pipeline run row was created.
    RunCreated {
        /// Identifier of the new run.
        run_id: i64,
        /// Title of the content being acquired.
        content_title: String,
    },
    /// A stage of a run changed status.
    StageChanged {
        /// Run the stage belongs to.
        run_id: i64,
        /// Stage that changed.
        stage: Stage,
        /// Status the stage entered.
        status: StageStatus,
    },
    /// A run reached a terminal (or parked) aggregate status.
    RunFinished {
        /// Run that finished.
        run_id: i64,
        /// Aggregate status the run settled in.
        status: PipelineStatus,
    },
    /// A download transitioned between states.
    DownloadStateChanged {
        /// Download that transitioned.
        download_id: Uuid,
        /// State before the transition; `None` on creation.
        from: Option<DownloadState>,
        /// State after the transition.
        to: DownloadState,
    },
    /// A feed check started.
    FeedCheckStarted {
        /// Feed being checked.
        feed_id: Uuid,
    },
    /// A feed check finished successfully.
    FeedCheckCompleted {
        /// Feed that was checked.
        feed_id: Uuid,
        /// Items stored for the first time during this check.
        new_items: usize,
    },
    /// A feed check failed.
    FeedCheckFailed {
        /// Feed whose check failed.
        feed_id: Uuid,
        /// Human-readable failure detail.
        message: String,
    },
    /// An ingested item changed status after matching.
    ItemEvaluated {
        /// Item that was evaluated.
        item_id: Uuid,
        /// Status the item settled in.
        status: FeedItemStatus,
        /// Subscription the item matched, when matched.
        subscription_id: Option<Uuid>,
    },
    /// A rule with the `notify` action fired for a matched item.
    RuleNotification {
        /// Item the rule fired for.
        item_id: Uuid,
        /// Rule that fired.
        rule_id: Uuid,
    },
}

impl Event {
    /// Machine-friendly discriminator for stream consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RunCreated { .. } => "run_created",
            Self::StageChanged { .. } => "stage_changed",
            Self::RunFinished { .. } => "run_finished",
            Self::DownloadStateChanged { .. } => "download_state_changed",
            Self::FeedCheckStarted { .. } => "feed_check_started",
            Self::FeedCheckCompleted { .. } => "feed_check_completed",
            Self::FeedCheckFailed { .. } => "feed_check_failed",
            Self::ItemEvaluated { .. } => "item_evaluated",
            Self::RuleNotification { .. } => "rule_notification",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// The broadcast channel uses the same capacity as the in-memory replay
    /// buffer, ensuring dropped events impact both structures consistently.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self
            .next_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than
    /// `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            for item in buffer.iter() {
                if item.id > since {
                    backlog.push_back(item.clone());
                }
            }
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Return a snapshot of buffered events newer than the supplied
    /// identifier, without establishing a subscription.
    #[must_use]
    pub fn backlog_since(&self, since_id: EventId) -> Vec<EventEnvelope> {
        let buffer = self.lock_buffer();
        buffer
            .iter()
            .filter(|item| item.id > since_id)
            .cloned()
            .collect()
    }

    /// Returns the last assigned identifier, if any events have been
    /// published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self.lock_buffer();
        buffer.back().map(|event| event.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        match self.buffer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("event buffer mutex poisoned; continuing with recovered guard");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from
/// the live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => self.receiver.recv().await.ok(),
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const PUBLISH_TIMEOUT: Duration = Duration::from_secs(1);

    fn sample_stage_event(run_id: i64) -> Event {
        Event::StageChanged {
            run_id,
            stage: Stage::Torrent,
            status: StageStatus::Running,
        }
    }

    #[test]
    fn event_kinds_cover_all_variants() {
        let item_id = Uuid::new_v4();
        let events = [
            Event::RunCreated {
                run_id: 1,
                content_title: "Dune".to_string(),
            },
            Event::StageChanged {
                run_id: 1,
                stage: Stage::Vpn,
                status: StageStatus::Completed,
            },
            Event::RunFinished {
                run_id: 1,
                status: PipelineStatus::Completed,
            },
            Event::DownloadStateChanged {
                download_id: item_id,
                from: Some(DownloadState::Created),
                to: DownloadState::VpnConnecting,
            },
            Event::FeedCheckStarted { feed_id: item_id },
            Event::FeedCheckCompleted {
                feed_id: item_id,
                new_items: 3,
            },
            Event::FeedCheckFailed {
                feed_id: item_id,
                message: "timed out".to_string(),
            },
            Event::ItemEvaluated {
                item_id,
                status: FeedItemStatus::Matched,
                subscription_id: Some(item_id),
            },
            Event::RuleNotification {
                item_id,
                rule_id: item_id,
            },
        ];

        let kinds: Vec<&str> = events.iter().map(Event::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "run_created",
                "stage_changed",
                "run_finished",
                "download_state_changed",
                "feed_check_started",
                "feed_check_completed",
                "feed_check_failed",
                "item_evaluated",
                "rule_notification",
            ]
        );
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_stage_event(i));
        }
        assert_eq!(last_id, 5);

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event);
            }
        }

        assert_eq!(received.len(), 3);
        assert_eq!(received.first().map(|event| event.id), Some(3));
        assert_eq!(received.last().map(|event| event.id), Some(5));
    }

    #[tokio::test]
    async fn last_event_id_reflects_recent_publish() {
        let bus = EventBus::with_capacity(2);
        assert!(bus.last_event_id().is_none(), "no events published yet");
        let published = bus.publish(sample_stage_event(0));
        assert_eq!(bus.last_event_id(), Some(published));
    }

    #[tokio::test]
    async fn backlog_since_filters_older_events() {
        let bus = EventBus::with_capacity(8);
        for i in 0..4 {
            let _ = bus.publish(sample_stage_event(i));
        }
        let backlog = bus.backlog_since(2);
        assert_eq!(backlog.len(), 2);
        assert!(backlog.iter().all(|event| event.id > 2));
    }

    #[tokio::test]
    async fn subscribe_with_since_zero_replays_all() {
        let bus = EventBus::with_capacity(4);
        for i in 0..3 {
            let _ = bus.publish(sample_stage_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        for expected_id in 1..=3 {
            let envelope = timeout(PUBLISH_TIMEOUT, stream.next())
                .await
                .expect("stream stalled")
                .expect("stream closed");
            assert_eq!(envelope.id, expected_id);
        }
    }

    #[tokio::test]
    async fn stream_returns_none_after_sender_dropped() {
        let mut stream = {
            let bus = EventBus::with_capacity(1);
            let stream = bus.subscribe(None);
            drop(bus);
            stream
        };
        assert!(
            stream.next().await.is_none(),
            "closing the sender should end the stream"
        );
    }
}
