//! Domain identifier types with validation
//!
//! Newtype wrappers for the identifiers that flow through a batch. Delivery
//! metadata (service, system, exchange, batch) are UUIDs; record-local ids are
//! opaque non-empty strings; destination ids are integers allocated by the
//! identifier-mapping store.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID
            pub fn new(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random identifier
            pub fn random() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the underlying UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|e| format!("Invalid {} '{}': {}", $label, s, e))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_id!(
    /// Identifies the publishing service (the organization feed) a record came from
    ServiceId,
    "service ID"
);

uuid_id!(
    /// Identifies the source clinical system within a service
    SystemId,
    "system ID"
);

uuid_id!(
    /// Identifies the upstream exchange (delivery) a batch belongs to
    ExchangeId,
    "exchange ID"
);

uuid_id!(
    /// Identifies a single batch within an exchange
    BatchId,
    "batch ID"
);

/// Record-local identifier
///
/// Unique within a record type and source service. Opaque to the orchestrator.
///
/// # Examples
///
/// ```
/// use conduit::domain::ids::LocalId;
///
/// let id = LocalId::new("f3c1a2").unwrap();
/// assert_eq!(id.as_str(), "f3c1a2");
/// assert!(LocalId::new("  ").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocalId(String);

impl LocalId {
    /// Creates a new LocalId, rejecting blank values
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Local ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the local ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for LocalId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LocalId> for String {
    fn from(id: LocalId) -> Self {
        id.0
    }
}

impl AsRef<str> for LocalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Stable integer identity of a record in the destination schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DestinationId(i64);

impl DestinationId {
    /// Wraps a raw destination id
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for DestinationId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_id_valid() {
        let id = LocalId::new("abc-123").unwrap();
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(id.to_string(), "abc-123");
    }

    #[test]
    fn test_local_id_empty() {
        assert!(LocalId::new("").is_err());
        assert!(LocalId::new("   ").is_err());
    }

    #[test]
    fn test_local_id_deserialize_rejects_blank() {
        let result: Result<LocalId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_service_id_from_str() {
        let id = ServiceId::from_str("7d44b88c-4199-4bad-97dc-d78268e01398").unwrap();
        assert_eq!(id.to_string(), "7d44b88c-4199-4bad-97dc-d78268e01398");
    }

    #[test]
    fn test_batch_id_invalid() {
        let err = BatchId::from_str("not-a-uuid").unwrap_err();
        assert!(err.contains("batch ID"));
    }

    #[test]
    fn test_uuid_ids_serialize_transparently() {
        let id = ExchangeId::from_str("84d7c3f5-1f6a-4f87-aa95-5d9c6b8f3a29").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"84d7c3f5-1f6a-4f87-aa95-5d9c6b8f3a29\"");
    }

    #[test]
    fn test_destination_id_ordering() {
        assert!(DestinationId::new(1) < DestinationId::new(2));
        assert_eq!(DestinationId::from(7).value(), 7);
    }
}
