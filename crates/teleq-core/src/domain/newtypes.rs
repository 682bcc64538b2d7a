//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for queue identifiers and
//! event tags. Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// EventId
// ============================================================================

/// Surrogate key assigned by the store on insert
///
/// Ids are strictly increasing within a store and never reused, so ordering
/// two ids also orders the inserts that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(i64);

impl EventId {
    /// Wrap a raw row id
    ///
    /// # Errors
    /// Returns `DomainError::InvalidId` if the value is not positive
    pub fn new(raw: i64) -> Result<Self, DomainError> {
        if raw <= 0 {
            return Err(DomainError::InvalidId(format!(
                "Event id must be positive: {raw}"
            )));
        }
        Ok(Self(raw))
    }

    /// Get the raw row id
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: i64 = s
            .trim()
            .parse()
            .map_err(|e| DomainError::InvalidId(format!("{s}: {e}")))?;
        Self::new(raw)
    }
}

impl TryFrom<i64> for EventId {
    type Error = DomainError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

// ============================================================================
// EventType
// ============================================================================

/// Maximum length of an event type tag
pub const MAX_EVENT_TYPE_LEN: usize = 64;

/// Classification tag attached to every queued event
///
/// The queue never interprets it beyond grouping uploads, but it must be a
/// short lowercase token (`[a-z0-9_.-]`, 1 to 64 chars) so that it stays
/// usable as a metrics label and an upload routing key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventType(String);

impl EventType {
    pub const CRASH: &'static str = "crash";
    pub const BREADCRUMB: &'static str = "breadcrumb";
    pub const METRIC: &'static str = "metric";
    pub const LOG: &'static str = "log";
    pub const SPAN: &'static str = "span";

    /// Create a new EventType
    ///
    /// # Errors
    /// Returns `DomainError::InvalidEventType` if the tag is empty, too long
    /// or contains characters outside `[a-z0-9_.-]`
    pub fn new(tag: impl Into<String>) -> Result<Self, DomainError> {
        let tag = tag.into();
        if tag.is_empty() {
            return Err(DomainError::InvalidEventType(
                "Event type cannot be empty".to_string(),
            ));
        }
        if tag.len() > MAX_EVENT_TYPE_LEN {
            return Err(DomainError::InvalidEventType(format!(
                "Event type exceeds {MAX_EVENT_TYPE_LEN} characters: {tag}"
            )));
        }
        if !tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '_' | '.' | '-'))
        {
            return Err(DomainError::InvalidEventType(format!(
                "Event type contains invalid characters: {tag}"
            )));
        }
        Ok(Self(tag))
    }

    /// Tag for crash reports
    #[must_use]
    pub fn crash() -> Self {
        Self(Self::CRASH.to_string())
    }

    /// Tag for breadcrumbs
    #[must_use]
    pub fn breadcrumb() -> Self {
        Self(Self::BREADCRUMB.to_string())
    }

    /// Tag for metric samples
    #[must_use]
    pub fn metric() -> Self {
        Self(Self::METRIC.to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for EventType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EventType {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<EventType> for String {
    fn from(t: EventType) -> Self {
        t.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod event_id_tests {
        use super::*;

        #[test]
        fn test_new_rejects_non_positive() {
            assert!(EventId::new(0).is_err());
            assert!(EventId::new(-7).is_err());
            assert_eq!(EventId::new(1).unwrap().as_i64(), 1);
        }

        #[test]
        fn test_from_str() {
            let id: EventId = "42".parse().unwrap();
            assert_eq!(id.as_i64(), 42);
            assert_eq!(id.to_string(), "42");
        }

        #[test]
        fn test_from_str_invalid() {
            assert!("abc".parse::<EventId>().is_err());
            assert!("0".parse::<EventId>().is_err());
        }

        #[test]
        fn test_ordering_follows_raw_value() {
            let a = EventId::new(3).unwrap();
            let b = EventId::new(10).unwrap();
            assert!(a < b);
        }
    }

    mod event_type_tests {
        use super::*;

        #[test]
        fn test_accepts_common_tags() {
            for tag in ["crash", "breadcrumb", "metric", "app.start", "net-req_2"] {
                assert!(EventType::new(tag).is_ok(), "{tag} should be valid");
            }
        }

        #[test]
        fn test_rejects_empty() {
            assert!(matches!(
                EventType::new(""),
                Err(DomainError::InvalidEventType(_))
            ));
        }

        #[test]
        fn test_rejects_uppercase_and_spaces() {
            assert!(EventType::new("Crash").is_err());
            assert!(EventType::new("a b").is_err());
            assert!(EventType::new("ümlaut").is_err());
        }

        #[test]
        fn test_rejects_too_long() {
            let tag = "a".repeat(MAX_EVENT_TYPE_LEN + 1);
            assert!(EventType::new(tag).is_err());
            let tag = "a".repeat(MAX_EVENT_TYPE_LEN);
            assert!(EventType::new(tag).is_ok());
        }

        #[test]
        fn test_constructors_match_constants() {
            assert_eq!(EventType::crash().as_str(), EventType::CRASH);
            assert_eq!(EventType::breadcrumb().as_str(), EventType::BREADCRUMB);
            assert_eq!(EventType::metric().as_str(), EventType::METRIC);
        }

        #[test]
        fn test_serde_rejects_invalid_tag() {
            let ok: EventType = serde_json::from_str("\"metric\"").unwrap();
            assert_eq!(ok, EventType::metric());
            assert!(serde_json::from_str::<EventType>("\"NOPE\"").is_err());
        }
    }
}
