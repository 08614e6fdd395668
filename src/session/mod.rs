//! Stateful MCP sessions over stateless HTTP requests
//!
//! A session is created by an `initialize` POST, addressed afterwards through
//! the `session-id` header, and owns exactly one [`Transport`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

pub mod events;
pub mod id;
pub mod registry;
pub mod transport;

pub use id::SessionId;
pub use registry::SessionRegistry;
pub use transport::{Transport, TransportState};

pub type SessionHandle = Arc<Session>;

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    created_at: DateTime<Utc>,
    transport: Transport,
}

impl Session {
    pub fn new(id: SessionId, event_buffer_capacity: usize) -> Self {
        Self {
            transport: Transport::new(id.clone(), event_buffer_capacity),
            id,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.created_at
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}
