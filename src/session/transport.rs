//! Per-session transport state machine
//!
//! A transport moves `Pending -> Active -> Closing -> Closed`. Calls and
//! stream opens are only admitted while `Active`; closing waits for the calls
//! already admitted to finish.

use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard, OnceLock, PoisonError,
    },
};

use serde_json::Value;
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::errors::SessionError;
use crate::mcp::{dispatcher::ToolDispatcher, server::handle_json_rpc_payload};
use crate::session::{
    events::{EventChannel, EventId, EventStream},
    SessionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Pending,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed,
    AlreadyClosed,
}

/// Result of the protocol handshake performed by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: String,
    pub client_name: Option<String>,
}

pub struct Transport {
    session_id: SessionId,
    state: Mutex<TransportState>,
    dispatcher: OnceLock<Arc<ToolDispatcher>>,
    handshake: OnceLock<Handshake>,
    events: EventChannel,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .field("handshake", &self.handshake.get())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Marks one admitted call; dropping it may wake a pending close.
pub(crate) struct CallGuard<'a> {
    transport: &'a Transport,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.transport.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.transport.drained.notify_waiters();
        }
    }
}

impl Transport {
    pub fn new(session_id: SessionId, event_buffer_capacity: usize) -> Self {
        Self {
            session_id,
            state: Mutex::new(TransportState::Pending),
            dispatcher: OnceLock::new(),
            handshake: OnceLock::new(),
            events: EventChannel::new(event_buffer_capacity),
            in_flight: AtomicUsize::new(0),
            drained: Notify::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> TransportState {
        *self.lock_state()
    }

    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn handshake(&self) -> Option<&Handshake> {
        self.handshake.get()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Connects the dispatcher and moves `Pending` to `Active`.
    pub fn attach(&self, dispatcher: Arc<ToolDispatcher>) -> Result<(), SessionError> {
        let mut state = self.lock_state();
        match *state {
            TransportState::Pending => {
                let _ = self.dispatcher.set(dispatcher);
                *state = TransportState::Active;
                Ok(())
            }
            TransportState::Active => Ok(()),
            TransportState::Closing | TransportState::Closed => Err(SessionError::SessionClosed),
        }
    }

    /// Records the initialize handshake; returns `false` if one already happened.
    pub fn record_handshake(&self, handshake: Handshake) -> bool {
        self.handshake.set(handshake).is_ok()
    }

    pub(crate) fn admit_call(&self) -> Result<CallGuard<'_>, SessionError> {
        let state = self.lock_state();
        match *state {
            TransportState::Active => {
                self.in_flight.fetch_add(1, Ordering::AcqRel);
                Ok(CallGuard { transport: self })
            }
            TransportState::Pending => Err(SessionError::NotAttached),
            TransportState::Closing | TransportState::Closed => Err(SessionError::SessionClosed),
        }
    }

    /// Handles one JSON-RPC message or batch.
    ///
    /// `Ok(None)` means the payload only held notifications or responses.
    pub async fn handle_call(&self, payload: Value) -> Result<Option<Value>, SessionError> {
        let _guard = self.admit_call()?;
        let dispatcher = self.dispatcher.get().ok_or(SessionError::NotAttached)?;
        Ok(handle_json_rpc_payload(self, dispatcher, payload).await)
    }

    pub fn open_stream(&self, resume_after: Option<EventId>) -> Result<EventStream, SessionError> {
        match self.state() {
            TransportState::Active => {}
            TransportState::Pending => return Err(SessionError::NotAttached),
            TransportState::Closing | TransportState::Closed => {
                return Err(SessionError::SessionClosed)
            }
        }

        let stream = self.events.open(resume_after)?;
        info!(session_id = %self.session_id, resume_after = ?resume_after, "event stream opened");
        Ok(stream)
    }

    /// Stops admitting work, ends the open stream and waits for in-flight calls.
    ///
    /// Closing twice is a no-op. Delivery of queued events to a dropped client
    /// is best-effort.
    pub async fn close(&self) -> CloseOutcome {
        {
            let mut state = self.lock_state();
            match *state {
                TransportState::Closing | TransportState::Closed => {
                    return CloseOutcome::AlreadyClosed
                }
                TransportState::Pending | TransportState::Active => {
                    *state = TransportState::Closing;
                }
            }
        }

        self.events.close();
        self.wait_for_drain().await;

        *self.lock_state() = TransportState::Closed;
        debug!(session_id = %self.session_id, "transport closed");
        CloseOutcome::Closed
    }

    async fn wait_for_drain(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }

            notified.await;
        }
    }
}
