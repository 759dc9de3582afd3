//! Per-request correlation identity.
//!
//! Inbound `context-id` headers are only honoured when they carry a
//! time-ordered UUID (version 7) minted within the last five minutes.
//! Anything else (absent, malformed, other versions, stale or
//! future-dated ids) is replaced with a freshly minted one.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::http::HeaderName;
use uuid::Uuid;

/// Header carrying the correlation id, in both directions.
pub const CONTEXT_ID: HeaderName = HeaderName::from_static("context-id");

/// How old an inbound id may be before it is replaced.
pub const FRESHNESS_WINDOW: Duration = Duration::from_secs(5 * 60);

/// A request's correlation id. Inserted into request extensions by the
/// correlation middleware so handlers can read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    /// Mint a new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Accept `header` if it is a fresh v7 id, otherwise mint one.
    pub fn resolve(header: Option<&str>) -> Self {
        Self::resolve_at(header, SystemTime::now())
    }

    /// [`ContextId::resolve`] against an explicit clock reading.
    pub fn resolve_at(header: Option<&str>, now: SystemTime) -> Self {
        header
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
            .filter(|id| is_fresh_v7(id, now))
            .map(Self)
            .unwrap_or_else(Self::new)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

fn is_fresh_v7(id: &Uuid, now: SystemTime) -> bool {
    if id.get_version_num() != 7 {
        return false;
    }
    let Some(timestamp) = id.get_timestamp() else {
        return false;
    };
    let (secs, nanos) = timestamp.to_unix();
    let created = UNIX_EPOCH + Duration::new(secs, nanos);

    // A creation time after `now` is clock skew and is rejected.
    match now.duration_since(created) {
        Ok(age) => age <= FRESHNESS_WINDOW,
        Err(_) => false,
    }
}
