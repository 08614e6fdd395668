//! Typed MCP transport headers

use std::iter;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum_extra::headers::{self, Header, HeaderMapExt};

use crate::errors::SessionError;
use crate::session::{events::EventId, SessionId};

pub static SESSION_ID: HeaderName = HeaderName::from_static("session-id");
/// Streamable-HTTP spelling, accepted and echoed alongside `session-id`.
pub static MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");
pub static LAST_EVENT_ID: HeaderName = HeaderName::from_static("last-event-id");

fn decode_session_id<'i, I>(values: &mut I) -> Result<SessionId, headers::Error>
where
    I: Iterator<Item = &'i HeaderValue>,
{
    values
        .next()
        .and_then(|value| value.to_str().ok())
        .and_then(SessionId::parse)
        .ok_or_else(headers::Error::invalid)
}

fn encode_session_id<E: Extend<HeaderValue>>(id: &SessionId, values: &mut E) {
    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        values.extend(iter::once(value));
    }
}

/// `session-id`: issued on initialize, required on every later request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdHeader(pub SessionId);

impl Header for SessionIdHeader {
    fn name() -> &'static HeaderName {
        &SESSION_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        decode_session_id(values).map(Self)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        encode_session_id(&self.0, values);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpSessionIdHeader(pub SessionId);

impl Header for McpSessionIdHeader {
    fn name() -> &'static HeaderName {
        &MCP_SESSION_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        decode_session_id(values).map(Self)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        encode_session_id(&self.0, values);
    }
}

/// Session id named by the request, `session-id` taking precedence.
///
/// A missing header is `Ok(None)`; a malformed one is treated as unknown.
pub fn requested_session(headers: &HeaderMap) -> Result<Option<SessionId>, SessionError> {
    match headers.typed_try_get::<SessionIdHeader>() {
        Ok(Some(SessionIdHeader(id))) => return Ok(Some(id)),
        Ok(None) => {}
        Err(_) => return Err(SessionError::UnknownSession),
    }

    match headers.typed_try_get::<McpSessionIdHeader>() {
        Ok(found) => Ok(found.map(|McpSessionIdHeader(id)| id)),
        Err(_) => Err(SessionError::UnknownSession),
    }
}

/// Raw session id for logging, whichever spelling the client used.
pub fn session_id_for_log(headers: &HeaderMap) -> Option<String> {
    headers
        .get(&SESSION_ID)
        .or_else(|| headers.get(&MCP_SESSION_ID))
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// `last-event-id`: resume marker sent by a reconnecting event-stream client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastEventId(pub EventId);

impl Header for LastEventId {
    fn name() -> &'static HeaderName {
        &LAST_EVENT_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        values
            .next()
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<EventId>().ok())
            .map(Self)
            .ok_or_else(headers::Error::invalid)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(iter::once(HeaderValue::from(self.0)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "3f1c2a9e-0000-4000-8000-000000000001";

    #[test]
    fn decodes_valid_session_id() {
        let value = HeaderValue::from_static(ID);
        let decoded = SessionIdHeader::decode(&mut iter::once(&value)).expect("valid");
        assert_eq!(decoded.0.as_str(), ID);
    }

    #[test]
    fn rejects_missing_or_malformed_values() {
        assert!(SessionIdHeader::decode(&mut iter::empty()).is_err());
        assert!(LastEventId::decode(&mut iter::once(&HeaderValue::from_static("abc"))).is_err());
    }

    #[test]
    fn round_trips_last_event_id() {
        let mut encoded = Vec::new();
        LastEventId(42).encode(&mut encoded);
        let decoded = LastEventId::decode(&mut encoded.iter()).expect("valid");
        assert_eq!(decoded, LastEventId(42));
    }

    #[test]
    fn session_id_header_wins_over_alias() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_ID.clone(), HeaderValue::from_static(ID));
        headers.insert(MCP_SESSION_ID.clone(), HeaderValue::from_static("other"));

        let found = requested_session(&headers).expect("valid").expect("present");
        assert_eq!(found.as_str(), ID);
    }

    #[test]
    fn alias_is_accepted_alone() {
        let mut headers = HeaderMap::new();
        headers.insert(MCP_SESSION_ID.clone(), HeaderValue::from_static(ID));

        let found = requested_session(&headers).expect("valid").expect("present");
        assert_eq!(found.as_str(), ID);
        assert_eq!(session_id_for_log(&headers).as_deref(), Some(ID));
    }

    #[test]
    fn missing_and_malformed_headers() {
        assert_eq!(requested_session(&HeaderMap::new()), Ok(None));

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_ID.clone(), HeaderValue::from_static("has space"));
        assert_eq!(
            requested_session(&headers),
            Err(SessionError::UnknownSession)
        );
    }
}
