//! Wire records exchanged with the run service.
//!
//! These types are the request/response contract: the server decodes a
//! [`RunRequest`] and answers with a [`RunList`]. Both sides encode them as
//! Avro binary against the record schemas declared here, which must stay
//! identical to the server's `com.hopped.runner.avro` records.

use apache_avro::Schema;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A type with a fixed Avro record schema.
pub trait AvroRecord {
    /// Avro JSON schema of the record.
    const SCHEMA: &'static str;

    /// Parsed form of [`SCHEMA`](Self::SCHEMA).
    fn schema() -> Result<Schema> {
        Ok(Schema::parse_str(Self::SCHEMA)?)
    }
}

/// A runner. Only the driver uses the display name; requests carry a [`UserRef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name_or_alias: String,
    pub id: i64,
}

impl User {
    pub fn new(name_or_alias: impl Into<String>, id: i64) -> Self {
        Self {
            name_or_alias: name_or_alias.into(),
            id,
        }
    }

    pub fn to_ref(&self) -> UserRef {
        UserRef { id: self.id }
    }
}

/// Reference to a user by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: i64,
}

impl AvroRecord for UserRef {
    const SCHEMA: &'static str = r#"{
        "type": "record",
        "name": "UserRef",
        "namespace": "com.hopped.runner.avro",
        "fields": [{"name": "id", "type": "long"}]
    }"#;
}

/// Ask for all runs recorded for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub user: UserRef,
}

impl AvroRecord for RunRequest {
    const SCHEMA: &'static str = r#"{
        "type": "record",
        "name": "RunRequest",
        "namespace": "com.hopped.runner.avro",
        "fields": [{
            "name": "user",
            "type": {
                "type": "record",
                "name": "UserRef",
                "fields": [{"name": "id", "type": "long"}]
            }
        }]
    }"#;
}

impl RunRequest {
    pub fn for_user(user: UserRef) -> Self {
        Self { user }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub distance_meters: f64,
}

impl AvroRecord for Run {
    const SCHEMA: &'static str = r#"{
        "type": "record",
        "name": "Run",
        "namespace": "com.hopped.runner.avro",
        "fields": [{"name": "distanceMeters", "type": "double"}]
    }"#;
}

impl Run {
    pub fn new(distance_meters: f64) -> Self {
        Self { distance_meters }
    }
}

/// Ordered collection of runs returned for a [`RunRequest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunList {
    pub runs: Vec<Run>,
}

impl AvroRecord for RunList {
    const SCHEMA: &'static str = r#"{
        "type": "record",
        "name": "RunList",
        "namespace": "com.hopped.runner.avro",
        "fields": [{
            "name": "runs",
            "type": {
                "type": "array",
                "items": {
                    "type": "record",
                    "name": "Run",
                    "fields": [{"name": "distanceMeters", "type": "double"}]
                }
            }
        }]
    }"#;
}

impl RunList {
    pub fn new(runs: Vec<Run>) -> Self {
        Self { runs }
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Sum of `distance_meters` over all runs, in list order.
    pub fn total_distance_meters(&self) -> f64 {
        self.runs.iter().map(|run| run.distance_meters).sum()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_total_distance() {
        // ---
        let list = RunList::new(vec![Run::new(1000.0), Run::new(2500.5)]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.total_distance_meters(), 3500.5);
    }

    #[test]
    fn test_empty_total_is_zero() {
        // ---
        let list = RunList::default();
        assert!(list.is_empty());
        assert_eq!(list.total_distance_meters(), 0.0);
    }

    #[test]
    fn test_request_for_user() {
        // ---
        let user = User::new("Dennis", 1);
        let request = RunRequest::for_user(user.to_ref());
        assert_eq!(request.user.id, 1);
    }

    #[test]
    fn test_record_schemas_parse() {
        // ---
        assert!(UserRef::schema().is_ok());
        assert!(RunRequest::schema().is_ok());
        assert!(Run::schema().is_ok());
        assert!(RunList::schema().is_ok());
    }
}
