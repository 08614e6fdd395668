use std::fmt;

use uuid::Uuid;

/// Upper bound on accepted session id length.
pub const MAX_SESSION_ID_LEN: usize = 256;

/// Opaque identifier handed to a client on successful initialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Creates a random v4 UUID from the OS entropy source.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Validates a client-supplied id: non-empty, bounded, visible ASCII only.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || value.len() > MAX_SESSION_ID_LEN {
            return None;
        }

        if !value.bytes().all(|byte| (0x21..=0x7e).contains(&byte)) {
            return None;
        }

        Some(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
