//! Record normalization and filtering.
//!
//! Cleaning never fails a batch. Records that cannot be used are dropped
//! one by one and the survivors are returned. Cleaning is idempotent:
//! `clean_records(&clean_records(x)) == clean_records(x)`.

use std::collections::HashSet;

use crate::types::AppRecord;

/// Normalizes one record, or returns `None` if it must be dropped.
///
/// Every text field is trimmed. Optional text that is blank after trimming
/// becomes `None`. List entries are trimmed and blank entries removed.
/// A record whose identifier is blank after trimming is dropped.
///
/// # Examples
///
/// ```
/// use archi_pipeline::validator::clean_record;
/// use archi_pipeline::AppRecord;
///
/// let cleaned = clean_record(AppRecord::new(" billing ", " Billing ")).unwrap();
/// assert_eq!(cleaned.app_id, "billing");
/// assert_eq!(cleaned.name, "Billing");
///
/// assert!(clean_record(AppRecord::new("  ", "orphan")).is_none());
/// ```
pub fn clean_record(mut record: AppRecord) -> Option<AppRecord> {
    trim_in_place(&mut record.app_id);
    if record.app_id.is_empty() {
        return None;
    }
    trim_in_place(&mut record.name);

    for field in [
        &mut record.description,
        &mut record.version,
        &mut record.language,
        &mut record.framework,
        &mut record.runtime,
        &mut record.deployment_type,
        &mut record.environment,
        &mut record.cluster,
        &mut record.collected_at,
    ] {
        clean_optional(field);
    }

    for list in [
        &mut record.dependencies,
        &mut record.databases,
        &mut record.services,
    ] {
        clean_list(list);
    }

    Some(record)
}

/// Cleans a batch, keeping the first record for each identifier.
///
/// Order of the survivors follows the input.
pub fn clean_records(records: Vec<AppRecord>) -> Vec<AppRecord> {
    let mut seen = HashSet::with_capacity(records.len());
    let mut accepted = Vec::with_capacity(records.len());

    for record in records {
        let original_id = record.app_id.clone();
        match clean_record(record) {
            Some(record) if seen.insert(record.app_id.clone()) => accepted.push(record),
            Some(record) => {
                tracing::debug!(app_id = %record.app_id, "dropping duplicate record");
            },
            None => {
                tracing::debug!(app_id = ?original_id, "dropping record with empty identifier");
            },
        }
    }

    accepted
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn clean_optional(value: &mut Option<String>) {
    if let Some(text) = value.as_mut() {
        trim_in_place(text);
        if text.is_empty() {
            *value = None;
        }
    }
}

fn clean_list(values: &mut Vec<String>) {
    for entry in values.iter_mut() {
        trim_in_place(entry);
    }
    values.retain(|entry| !entry.is_empty());
}
