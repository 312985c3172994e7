//! Collected records and per-identifier collection outcomes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One collected application.
///
/// List and map fields deserialize from an absent key *or* an explicit
/// `null` as empty, so after decoding they are always present.
///
/// # Examples
///
/// ```
/// use archi_pipeline::AppRecord;
///
/// let record: AppRecord = serde_json::from_str(
///     r#"{"app_id": "billing", "dependencies": null}"#,
/// ).unwrap();
/// assert!(record.dependencies.is_empty());
/// assert!(record.config.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AppRecord {
    /// Identifier, unique within a batch. Gateways overwrite it with the
    /// identifier they were asked for.
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,

    /// Identifiers of applications this one depends on.
    #[serde(default, deserialize_with = "null_as_default")]
    pub dependencies: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub databases: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub services: Vec<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub config: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: Map<String, Value>,

    /// RFC 3339 timestamp set by the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_at: Option<String>,
}

impl AppRecord {
    /// Creates a record with only the identifier and name set.
    pub fn new(app_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            name: name.into(),
            ..Self::default()
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of one identifier lookup at the collection gateway.
///
/// Gateways never raise: every internal failure becomes an outcome with
/// `success == false` and an `error_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionOutcome {
    /// Identifier that was looked up.
    pub app_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<AppRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl CollectionOutcome {
    /// A successful lookup.
    pub fn collected(record: AppRecord) -> Self {
        Self {
            app_id: record.app_id.clone(),
            success: true,
            record: Some(record),
            error_message: None,
        }
    }

    /// A failed lookup.
    pub fn failed(app_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            success: false,
            record: None,
            error_message: Some(error.into()),
        }
    }

    /// The record, if this outcome is a success that carries one.
    pub fn into_record(self) -> Option<AppRecord> {
        if self.success {
            self.record
        } else {
            None
        }
    }
}
