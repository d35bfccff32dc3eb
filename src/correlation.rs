use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Token linking one outgoing request to its reply.
///
/// A fresh id is generated per request and only lives for that round trip.
/// It travels as message metadata, never inside the payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Generate a new unique correlation ID (UUID v4, hyphenated).
    pub fn generate() -> Self {
        // ---
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        // ---
        &self.0
    }

    /// Shared handle suitable for placing on an [`Envelope`](crate::Envelope).
    pub fn as_shared(&self) -> Arc<str> {
        // ---
        Arc::clone(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<Arc<str>> for CorrelationId {
    fn from(value: Arc<str>) -> Self {
        Self(value)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_generate_unique() {
        // ---
        let id1 = CorrelationId::generate();
        let id2 = CorrelationId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_format() {
        // ---
        let id = CorrelationId::generate();
        assert_eq!(id.to_string().len(), 36); // hyphenated UUID
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_shared_round_trip() {
        // ---
        let id = CorrelationId::generate();
        let back = CorrelationId::from(id.as_shared());
        assert_eq!(id, back);
    }
}
