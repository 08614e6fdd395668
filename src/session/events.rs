//! Per-session server-to-client event buffer and stream
//!
//! Events are numbered from 1 in generation order. The most recent events are
//! retained in memory so a reconnecting client can resume from the last event
//! it saw; at most one live subscriber receives new events at a time.

use std::{
    collections::VecDeque,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
};

use futures::Stream;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::SessionError;

pub type EventId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: EventId,
    pub data: String,
}

#[derive(Debug)]
struct Subscriber {
    token: u64,
    tx: mpsc::UnboundedSender<StoredEvent>,
}

#[derive(Debug)]
struct ChannelState {
    next_id: EventId,
    next_token: u64,
    capacity: usize,
    retained: VecDeque<StoredEvent>,
    subscriber: Option<Subscriber>,
    closed: bool,
}

impl ChannelState {
    fn oldest_available(&self) -> EventId {
        self.retained
            .front()
            .map(|event| event.id)
            .unwrap_or(self.next_id)
    }

    fn replay_after(&self, marker: EventId) -> Result<VecDeque<StoredEvent>, SessionError> {
        let oldest_available = self.oldest_available();
        if marker.saturating_add(1) < oldest_available {
            return Err(SessionError::ResumeGap {
                requested: marker,
                oldest_available,
            });
        }

        Ok(self
            .retained
            .iter()
            .filter(|event| event.id > marker)
            .cloned()
            .collect())
    }

    fn has_live_subscriber(&self) -> bool {
        self.subscriber
            .as_ref()
            .is_some_and(|subscriber| !subscriber.tx.is_closed())
    }
}

/// Cloneable handle to one session's event buffer.
#[derive(Debug, Clone)]
pub struct EventChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChannelState {
                next_id: 1,
                next_token: 1,
                capacity: capacity.max(1),
                retained: VecDeque::new(),
                subscriber: None,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends an event and forwards it to the live subscriber, if any.
    ///
    /// Returns `None` once the channel has been closed.
    pub fn publish(&self, data: String) -> Option<EventId> {
        let mut state = self.lock();
        if state.closed {
            return None;
        }

        let event = StoredEvent {
            id: state.next_id,
            data,
        };
        state.next_id += 1;
        state.retained.push_back(event.clone());
        while state.retained.len() > state.capacity {
            state.retained.pop_front();
        }

        let delivered = state
            .subscriber
            .as_ref()
            .map(|subscriber| subscriber.tx.send(event.clone()).is_ok());
        if delivered == Some(false) {
            debug!(event_id = event.id, "event stream receiver gone, releasing");
            state.subscriber = None;
        }

        Some(event.id)
    }

    /// Serializes a JSON-RPC message and publishes it.
    pub fn publish_json(&self, message: &Value) -> Option<EventId> {
        self.publish(message.to_string())
    }

    /// Opens the single live stream.
    ///
    /// With a resume marker, events generated strictly after it are replayed
    /// first; without one, the stream starts with the next published event.
    pub fn open(&self, resume_after: Option<EventId>) -> Result<EventStream, SessionError> {
        let mut state = self.lock();
        if state.closed {
            return Err(SessionError::SessionClosed);
        }

        if state.has_live_subscriber() {
            return Err(SessionError::StreamAlreadyOpen);
        }

        let replay = match resume_after {
            Some(marker) => state.replay_after(marker)?,
            None => VecDeque::new(),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let token = state.next_token;
        state.next_token += 1;
        state.subscriber = Some(Subscriber { token, tx });

        Ok(EventStream {
            replay,
            rx,
            _lease: StreamLease {
                channel: self.clone(),
                token,
            },
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().has_live_subscriber()
    }

    pub fn last_event_id(&self) -> Option<EventId> {
        let state = self.lock();
        (state.next_id > 1).then(|| state.next_id - 1)
    }

    pub fn retained_len(&self) -> usize {
        self.lock().retained.len()
    }

    /// Terminates the live stream after its queued events and rejects further publishing.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.subscriber = None;
        state.retained.clear();
    }

    fn release(&self, token: u64) {
        let mut state = self.lock();
        if state
            .subscriber
            .as_ref()
            .is_some_and(|subscriber| subscriber.token == token)
        {
            state.subscriber = None;
            debug!(token, "event stream released");
        }
    }
}

/// Releases the subscriber slot when the owning stream is dropped.
#[derive(Debug)]
struct StreamLease {
    channel: EventChannel,
    token: u64,
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.channel.release(self.token);
    }
}

/// Replayed events followed by live events, in generation order.
#[derive(Debug)]
pub struct EventStream {
    replay: VecDeque<StoredEvent>,
    rx: mpsc::UnboundedReceiver<StoredEvent>,
    _lease: StreamLease,
}

impl Stream for EventStream {
    type Item = StoredEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.replay.pop_front() {
            return Poll::Ready(Some(event));
        }

        self.rx.poll_recv(cx)
    }
}
