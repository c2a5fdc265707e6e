//! Data preparer: raw rows to target-schema records
//!
//! Applies the field mapping, null-handling policy, and date format to each
//! raw row, then resolves related-record references through the remote API
//! with a bounded concurrency window. Rows that cannot be prepared are
//! collected as non-fatal preparation errors; the session only fails when
//! zero rows survive.

use std::collections::{HashMap, HashSet};

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::client::RemoteApi;
use crate::core::types::{
    DuplicateLookupPolicy, FieldKind, FieldMappingItem, PrepareError, PrepareOutcome,
    PrepareRequest, PreparedRecord, RecordObject,
};
use crate::utils::error::Result;

/// Match values sent per lookup call
const LOOKUP_CHUNK_SIZE: usize = 100;

/// Key identifying one lookup target: related object + match field
type LookupKey = (String, String);

/// Transform raw rows and resolve lookups, reporting progress as 0-100.
pub async fn prepare_records(
    client: &dyn RemoteApi,
    request: &PrepareRequest,
    lookup_concurrency: usize,
    mut progress: impl FnMut(u8),
) -> Result<PrepareOutcome> {
    if request.mapping.is_empty() || request.object.is_empty() {
        return Err(crate::utils::error::LoadError::Prepare(
            "The required parameters were not included in the request".to_string(),
        ));
    }
    debug!(
        rows = request.rows.len(),
        object = %request.object,
        "Preparing records"
    );

    let mut row_errors: Vec<Vec<String>> = vec![Vec::new(); request.rows.len()];
    let mut transformed: Vec<RecordObject> = Vec::with_capacity(request.rows.len());

    for (row_index, row) in request.rows.iter().enumerate() {
        transformed.push(transform_row(
            row,
            &request.mapping,
            request.insert_nulls,
            &request.date_format,
            &mut row_errors[row_index],
        ));
    }

    let resolutions = resolve_lookups(
        client,
        request,
        &transformed,
        lookup_concurrency,
        &mut progress,
    )
    .await;

    apply_resolutions(
        &request.mapping,
        &mut transformed,
        &resolutions.matches,
        request.insert_nulls,
        &mut row_errors,
    );

    progress(100);

    let mut outcome = PrepareOutcome {
        query_errors: resolutions.query_errors,
        ..Default::default()
    };
    for (row_index, fields) in transformed.into_iter().enumerate() {
        if row_errors[row_index].is_empty() {
            outcome.records.push(PreparedRecord {
                row: row_index,
                fields,
            });
        } else {
            outcome.errors.push(PrepareError {
                row: row_index,
                record: request.rows[row_index].clone(),
                errors: std::mem::take(&mut row_errors[row_index]),
            });
        }
    }

    if !outcome.errors.is_empty() {
        warn!(
            failed = outcome.errors.len(),
            survived = outcome.records.len(),
            "Some rows failed preparation"
        );
    }

    Ok(outcome)
}

/// Map one raw row onto the target schema. Lookup-mapped fields keep their
/// raw match value until resolution.
fn transform_row(
    row: &RecordObject,
    mapping: &[FieldMappingItem],
    insert_nulls: bool,
    date_format: &str,
    errors: &mut Vec<String>,
) -> RecordObject {
    let mut fields = RecordObject::new();

    for item in mapping {
        let raw = match row.get(&item.source_column) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.trim().is_empty() => None,
            Some(value) => Some(value),
        };

        let Some(raw) = raw else {
            if insert_nulls {
                fields.insert(item.target_field.clone(), Value::Null);
            }
            continue;
        };

        match item.kind {
            FieldKind::Text => {
                fields.insert(item.target_field.clone(), raw.clone());
            }
            FieldKind::Date => match normalize_date(raw, date_format) {
                Ok(value) => {
                    fields.insert(item.target_field.clone(), value);
                }
                Err(message) => errors.push(format!(
                    "Invalid value for field \"{}\": {}",
                    item.target_field, message
                )),
            },
        }
    }

    fields
}

/// Parse a raw date against the caller's format and re-emit it as ISO-8601.
fn normalize_date(raw: &Value, date_format: &str) -> std::result::Result<Value, String> {
    let text = raw
        .as_str()
        .ok_or_else(|| format!("expected a date string, got {}", raw))?;

    chrono::NaiveDate::parse_from_str(text, date_format)
        .map(|date| Value::String(date.format("%Y-%m-%d").to_string()))
        .map_err(|_| format!("\"{}\" does not match the date format \"{}\"", text, date_format))
}

struct LookupResolutions {
    /// (related object, match field) -> match value -> matching remote ids
    matches: HashMap<LookupKey, HashMap<String, Vec<String>>>,
    query_errors: Vec<String>,
}

/// Resolve all distinct lookup values, a bounded number of calls in flight.
async fn resolve_lookups(
    client: &dyn RemoteApi,
    request: &PrepareRequest,
    transformed: &[RecordObject],
    lookup_concurrency: usize,
    progress: &mut impl FnMut(u8),
) -> LookupResolutions {
    let mut values_by_key: HashMap<LookupKey, HashSet<String>> = HashMap::new();

    for item in &request.mapping {
        let Some(lookup) = &item.lookup else { continue };
        let key = (lookup.related_object.clone(), lookup.match_field.clone());
        let values = values_by_key.entry(key).or_default();
        for fields in transformed {
            if let Some(Value::String(value)) = fields.get(&item.target_field) {
                values.insert(value.clone());
            }
        }
    }

    // One work item per value chunk so no single call carries an unbounded
    // IN-list and progress can advance between chunks.
    let mut chunks: Vec<(LookupKey, Vec<String>)> = Vec::new();
    for (key, values) in values_by_key {
        let mut values: Vec<String> = values.into_iter().collect();
        values.sort();
        for chunk in values.chunks(LOOKUP_CHUNK_SIZE) {
            chunks.push((key.clone(), chunk.to_vec()));
        }
    }

    let total_chunks = chunks.len();
    let mut matches: HashMap<LookupKey, HashMap<String, Vec<String>>> = HashMap::new();
    let mut query_errors = Vec::new();

    if total_chunks == 0 {
        return LookupResolutions {
            matches,
            query_errors,
        };
    }

    let org = &request.org;
    let mut results = stream::iter(chunks.into_iter().map(|(key, values)| async move {
        let resolved = client
            .resolve_references(org, &key.0, &key.1, &values)
            .await;
        (key, resolved)
    }))
    .buffer_unordered(lookup_concurrency.max(1));

    let mut done = 0usize;
    while let Some((key, resolved)) = results.next().await {
        done += 1;
        match resolved {
            Ok(chunk_matches) => {
                matches.entry(key).or_default().extend(chunk_matches);
            }
            Err(e) => {
                warn!(object = %key.0, field = %key.1, "Related-record lookup failed: {}", e);
                query_errors.push(format!(
                    "Lookup against {}.{} failed: {}",
                    key.0, key.1, e
                ));
            }
        }
        progress(((done * 100) / total_chunks).min(99) as u8);
    }

    LookupResolutions {
        matches,
        query_errors,
    }
}

/// Replace raw match values with resolved ids, applying the no-match and
/// duplicate policies.
fn apply_resolutions(
    mapping: &[FieldMappingItem],
    transformed: &mut [RecordObject],
    matches: &HashMap<LookupKey, HashMap<String, Vec<String>>>,
    insert_nulls: bool,
    row_errors: &mut [Vec<String>],
) {
    for item in mapping {
        let Some(lookup) = &item.lookup else { continue };
        let key = (lookup.related_object.clone(), lookup.match_field.clone());
        let resolved = matches.get(&key);

        for (row_index, fields) in transformed.iter_mut().enumerate() {
            let Some(Value::String(value)) = fields.get(&item.target_field) else {
                continue;
            };
            let value = value.clone();

            let ids = resolved.and_then(|m| m.get(&value));
            match ids.map(Vec::as_slice) {
                None | Some([]) => {
                    if lookup.null_if_no_match {
                        if insert_nulls {
                            fields.insert(item.target_field.clone(), Value::Null);
                        } else {
                            fields.remove(&item.target_field);
                        }
                    } else {
                        row_errors[row_index].push(format!(
                            "No {} record found where {} is \"{}\"",
                            lookup.related_object, lookup.match_field, value
                        ));
                    }
                }
                Some([id]) => {
                    fields.insert(item.target_field.clone(), Value::String(id.clone()));
                }
                Some(ids) => match lookup.duplicate_policy {
                    DuplicateLookupPolicy::FirstMatch => {
                        fields.insert(item.target_field.clone(), Value::String(ids[0].clone()));
                    }
                    DuplicateLookupPolicy::Error => {
                        row_errors[row_index].push(format!(
                            "{} {} records found where {} is \"{}\"",
                            ids.len(),
                            lookup.related_object,
                            lookup.match_field,
                            value
                        ));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::MockRemoteApi;
    use crate::core::types::{ApiMode, LookupMapping, OrgRef};
    use serde_json::json;
    use uuid::Uuid;

    fn row(pairs: &[(&str, Value)]) -> RecordObject {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn text_mapping(source: &str, target: &str) -> FieldMappingItem {
        FieldMappingItem {
            source_column: source.to_string(),
            target_field: target.to_string(),
            kind: FieldKind::Text,
            lookup: None,
        }
    }

    fn request(rows: Vec<RecordObject>, mapping: Vec<FieldMappingItem>) -> PrepareRequest {
        PrepareRequest {
            session: Uuid::new_v4(),
            org: OrgRef::new("org-1"),
            rows,
            mapping,
            object: "Account".to_string(),
            insert_nulls: false,
            date_format: "%m/%d/%Y".to_string(),
            api_mode: ApiMode::Bulk,
        }
    }

    #[tokio::test]
    async fn test_transform_copies_mapped_fields() {
        let client = MockRemoteApi::new();
        let rows = vec![row(&[
            ("Account Name", json!("Acme")),
            ("Ignored", json!("x")),
        ])];
        let req = request(rows, vec![text_mapping("Account Name", "Name")]);

        let outcome = prepare_records(&client, &req, 3, |_| {}).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].fields.get("Name"), Some(&json!("Acme")));
        assert!(!outcome.records[0].fields.contains_key("Ignored"));
    }

    #[tokio::test]
    async fn test_date_normalization_and_errors() {
        let client = MockRemoteApi::new();
        let mut mapping = text_mapping("Close Date", "CloseDate");
        mapping.kind = FieldKind::Date;
        let rows = vec![
            row(&[("Close Date", json!("01/31/2024"))]),
            row(&[("Close Date", json!("not-a-date"))]),
        ];
        let req = request(rows, vec![mapping]);

        let outcome = prepare_records(&client, &req, 3, |_| {}).await.unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].fields.get("CloseDate"),
            Some(&json!("2024-01-31"))
        );
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].row, 1);
        assert!(outcome.errors[0].errors[0].contains("date format"));
    }

    #[tokio::test]
    async fn test_insert_nulls_policy() {
        let client = MockRemoteApi::new();
        let rows = vec![row(&[("Site", json!(""))])];
        let mut req = request(rows.clone(), vec![text_mapping("Site", "Site")]);

        let outcome = prepare_records(&client, &req, 3, |_| {}).await.unwrap();
        assert!(!outcome.records[0].fields.contains_key("Site"));

        req.rows = rows;
        req.insert_nulls = true;
        let outcome = prepare_records(&client, &req, 3, |_| {}).await.unwrap();
        assert_eq!(outcome.records[0].fields.get("Site"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_lookup_resolution() {
        let mut client = MockRemoteApi::new();
        client
            .expect_resolve_references()
            .times(1)
            .returning(|_, _, _, values| {
                let mut matches = HashMap::new();
                for value in values {
                    if value.as_str() == "EXT-1" {
                        matches.insert(value.clone(), vec!["001aa".to_string()]);
                    }
                }
                Ok(matches)
            });

        let mapping = FieldMappingItem {
            source_column: "Account External Id".to_string(),
            target_field: "AccountId".to_string(),
            kind: FieldKind::Text,
            lookup: Some(LookupMapping {
                related_object: "Account".to_string(),
                match_field: "ExternalId__c".to_string(),
                duplicate_policy: DuplicateLookupPolicy::FirstMatch,
                null_if_no_match: false,
            }),
        };
        let rows = vec![
            row(&[("Account External Id", json!("EXT-1"))]),
            row(&[("Account External Id", json!("EXT-MISSING"))]),
        ];
        let req = request(rows, vec![mapping]);

        let mut last_progress = 0u8;
        let outcome = prepare_records(&client, &req, 3, |p| last_progress = p)
            .await
            .unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.records[0].fields.get("AccountId"),
            Some(&json!("001aa"))
        );
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].errors[0].contains("No Account record found"));
        assert_eq!(last_progress, 100);
    }

    #[tokio::test]
    async fn test_lookup_duplicate_policy_error() {
        let mut client = MockRemoteApi::new();
        client.expect_resolve_references().returning(|_, _, _, values| {
            let mut matches = HashMap::new();
            for value in values {
                matches.insert(value.clone(), vec!["001aa".to_string(), "001bb".to_string()]);
            }
            Ok(matches)
        });

        let mapping = FieldMappingItem {
            source_column: "Ref".to_string(),
            target_field: "AccountId".to_string(),
            kind: FieldKind::Text,
            lookup: Some(LookupMapping {
                related_object: "Account".to_string(),
                match_field: "Name".to_string(),
                duplicate_policy: DuplicateLookupPolicy::Error,
                null_if_no_match: false,
            }),
        };
        let req = request(vec![row(&[("Ref", json!("Acme"))])], vec![mapping]);

        let outcome = prepare_records(&client, &req, 3, |_| {}).await.unwrap();
        assert!(outcome.records.is_empty());
        assert!(outcome.errors[0].errors[0].contains("2 Account records found"));
    }

    #[tokio::test]
    async fn test_missing_mapping_is_rejected() {
        let client = MockRemoteApi::new();
        let req = request(vec![row(&[("Name", json!("Acme"))])], Vec::new());

        let err = prepare_records(&client, &req, 3, |_| {}).await.unwrap_err();
        assert!(err.to_string().contains("required parameters"));
    }

    #[tokio::test]
    async fn test_lookup_query_failure_is_collected() {
        let mut client = MockRemoteApi::new();
        client
            .expect_resolve_references()
            .returning(|_, _, _, _| Err(crate::utils::error::LoadError::RemoteApi("boom".into())));

        let mapping = FieldMappingItem {
            source_column: "Ref".to_string(),
            target_field: "AccountId".to_string(),
            kind: FieldKind::Text,
            lookup: Some(LookupMapping {
                related_object: "Account".to_string(),
                match_field: "Name".to_string(),
                duplicate_policy: DuplicateLookupPolicy::FirstMatch,
                null_if_no_match: false,
            }),
        };
        let req = request(vec![row(&[("Ref", json!("Acme"))])], vec![mapping]);

        let outcome = prepare_records(&client, &req, 3, |_| {}).await.unwrap();
        assert_eq!(outcome.query_errors.len(), 1);
        // The unresolved row is carried as a preparation error, not dropped.
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.input_len(), 1);
    }
}
