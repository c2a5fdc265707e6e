//! Batch partitioner: prepared records to ordered submission batches
//!
//! Count-based splitting for plain loads, size-based splitting when batches
//! carry binary attachment payloads. `batch_number` is assigned here and is
//! the only ordering key trusted for the rest of the run.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::{
    AttachmentArchive, Batch, BatchPayload, PreparedRecord, RecordObject,
};
use crate::utils::error::Result;

/// Thresholds that close an attachment batch
#[derive(Debug, Clone, Copy)]
pub struct AttachmentThresholds {
    /// Base64-encoded attachment bytes per batch
    pub max_bytes: usize,
    /// Records per batch
    pub max_records: usize,
}

/// Batches plus the records excluded before batching
#[derive(Debug, Default)]
pub struct BatchPlan {
    /// Ordered submission batches
    pub batches: Vec<Batch>,
    /// Records dropped because their attachment could not be located
    pub dropped: Vec<RecordObject>,
}

/// Split prepared records into CSV-encoded batches for the queue model.
///
/// N records with batch size B yield `ceil(N / B)` batches numbered from 0.
pub fn build_bulk_batches(records: &[PreparedRecord], batch_size: usize) -> Result<Vec<Batch>> {
    let batches = records
        .chunks(batch_size.max(1))
        .enumerate()
        .map(|(batch_number, chunk)| {
            Ok(Batch::new(
                batch_number,
                BatchPayload::Encoded(encode_csv(chunk)?),
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        records = records.len(),
        batch_size,
        batches = batches.len(),
        "Partitioned records for the queue model"
    );
    Ok(batches)
}

/// Encode one chunk of records as CSV with a header row covering the union
/// of field names, in first-seen order.
fn encode_csv(records: &[PreparedRecord]) -> Result<String> {
    let mut columns: Vec<&str> = Vec::new();
    for record in records {
        for key in record.fields.keys() {
            if !columns.contains(&key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| match record.fields.get(*column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer.write_record(&row)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| crate::utils::error::LoadError::Internal(format!("CSV flush failed: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| crate::utils::error::LoadError::Internal(format!("CSV encoding: {}", e)))
}

/// Build record-collection batches for the synchronous model.
///
/// Without attachments this is a plain count-based split. With attachments,
/// records accumulate into a batch until either threshold is reached; a
/// record whose archive entry is missing is excluded from all batches and
/// reported in `dropped`.
pub fn build_collection_batches(
    records: &[PreparedRecord],
    object: &str,
    batch_size: usize,
    attachments: Option<(&AttachmentArchive, &str)>,
    thresholds: AttachmentThresholds,
) -> BatchPlan {
    match attachments {
        Some((archive, binary_field)) => {
            build_attachment_batches(records, object, archive, binary_field, thresholds)
        }
        None => {
            let batches = records
                .chunks(batch_size.max(1))
                .enumerate()
                .map(|(batch_number, chunk)| {
                    let outbound = chunk
                        .iter()
                        .map(|record| tag_record(&record.fields, object))
                        .collect();
                    let originals = chunk.iter().map(|record| record.fields.clone()).collect();
                    Batch::new(batch_number, BatchPayload::Records { outbound, originals })
                })
                .collect();
            BatchPlan {
                batches,
                dropped: Vec::new(),
            }
        }
    }
}

fn build_attachment_batches(
    records: &[PreparedRecord],
    object: &str,
    archive: &AttachmentArchive,
    binary_field: &str,
    thresholds: AttachmentThresholds,
) -> BatchPlan {
    let mut plan = BatchPlan::default();
    let mut outbound: Vec<RecordObject> = Vec::new();
    let mut originals: Vec<RecordObject> = Vec::new();
    let mut current_bytes = 0usize;

    for record in records {
        let entry_name = record
            .fields
            .get(binary_field)
            .and_then(Value::as_str)
            .map(str::to_string);

        let mut tagged = tag_record(&record.fields, object);
        if let Some(name) = entry_name {
            match archive.get(&name) {
                Some(content) => {
                    let encoded = BASE64.encode(content);
                    current_bytes += encoded.len();
                    tagged.insert(binary_field.to_string(), Value::String(encoded));
                }
                None => {
                    warn!(entry = %name, "Attachment not found in archive, dropping record");
                    plan.dropped.push(record.fields.clone());
                    continue;
                }
            }
        }

        outbound.push(tagged);
        originals.push(record.fields.clone());

        if current_bytes >= thresholds.max_bytes || outbound.len() >= thresholds.max_records {
            plan.batches.push(Batch::new(
                plan.batches.len(),
                BatchPayload::Records {
                    outbound: std::mem::take(&mut outbound),
                    originals: std::mem::take(&mut originals),
                },
            ));
            current_bytes = 0;
        }
    }

    if !outbound.is_empty() {
        plan.batches.push(Batch::new(
            plan.batches.len(),
            BatchPayload::Records { outbound, originals },
        ));
    }

    debug!(
        batches = plan.batches.len(),
        dropped = plan.dropped.len(),
        "Partitioned records for the collection model"
    );
    plan
}

/// Attach the `attributes.type` tag the collection API expects.
fn tag_record(fields: &RecordObject, object: &str) -> RecordObject {
    let mut tagged = RecordObject::new();
    tagged.insert(
        "attributes".to_string(),
        serde_json::json!({ "type": object }),
    );
    for (key, value) in fields {
        tagged.insert(key.clone(), value.clone());
    }
    tagged
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;
    use std::collections::HashMap;

    fn prepared(row: usize, pairs: &[(&str, Value)]) -> PreparedRecord {
        PreparedRecord {
            row,
            fields: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn thresholds(max_bytes: usize, max_records: usize) -> AttachmentThresholds {
        AttachmentThresholds {
            max_bytes,
            max_records,
        }
    }

    #[test]
    fn test_count_partitioning_yields_ceil_batches() {
        let records: Vec<PreparedRecord> = (0..250)
            .map(|i| prepared(i, &[("Name", json!(format!("r{}", i)))]))
            .collect();

        let batches = build_bulk_batches(&records, 100).unwrap();
        assert_eq!(batches.len(), 3);
        let numbers: Vec<usize> = batches.iter().map(|b| b.batch_number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(batches[0].payload.record_count(), 100);
        assert_eq!(batches[2].payload.record_count(), 50);
    }

    #[test]
    fn test_csv_header_covers_field_union() {
        let records = vec![
            prepared(0, &[("Name", json!("Acme"))]),
            prepared(1, &[("Name", json!("Globex")), ("Site", json!("LA"))]),
        ];

        let batches = build_bulk_batches(&records, 10).unwrap();
        let BatchPayload::Encoded(body) = &batches[0].payload else {
            panic!("expected encoded payload");
        };
        let mut lines = body.lines();
        assert_eq!(lines.next(), Some("Name,Site"));
        assert_eq!(lines.next(), Some("Acme,"));
        assert_eq!(lines.next(), Some("Globex,LA"));
    }

    #[test]
    fn test_collection_batches_tag_records() {
        let records = vec![prepared(0, &[("Name", json!("Acme"))])];
        let plan = build_collection_batches(&records, "Account", 200, None, thresholds(1024, 10));

        assert_eq!(plan.batches.len(), 1);
        let BatchPayload::Records { outbound, originals } = &plan.batches[0].payload else {
            panic!("expected record payload");
        };
        assert_eq!(outbound[0]["attributes"]["type"], "Account");
        // Originals stay untagged for reconciliation.
        assert!(!originals[0].contains_key("attributes"));
    }

    #[test]
    fn test_attachment_record_threshold_starts_new_batch() {
        let archive = AttachmentArchive::new(HashMap::from([(
            "a.txt".to_string(),
            Bytes::from_static(b"hello"),
        )]));
        let records: Vec<PreparedRecord> = (0..5)
            .map(|i| prepared(i, &[("Name", json!(format!("r{}", i))), ("Body", json!("a.txt"))]))
            .collect();

        let plan = build_collection_batches(
            &records,
            "Attachment",
            200,
            Some((&archive, "Body")),
            thresholds(usize::MAX, 2),
        );

        assert_eq!(plan.batches.len(), 3);
        assert_eq!(plan.batches[0].payload.record_count(), 2);
        assert_eq!(plan.batches[2].payload.record_count(), 1);
        assert!(plan.dropped.is_empty());
    }

    #[test]
    fn test_attachment_size_threshold_starts_new_batch() {
        let archive = AttachmentArchive::new(HashMap::from([(
            "big.bin".to_string(),
            Bytes::from(vec![0u8; 100]),
        )]));
        let records: Vec<PreparedRecord> = (0..3)
            .map(|i| prepared(i, &[("Body", json!("big.bin"))]))
            .collect();

        // Each encoded attachment is ~136 bytes, over the 100-byte threshold.
        let plan = build_collection_batches(
            &records,
            "Attachment",
            200,
            Some((&archive, "Body")),
            thresholds(100, 200),
        );

        assert_eq!(plan.batches.len(), 3);
    }

    #[test]
    fn test_missing_attachment_drops_record_without_aborting() {
        let archive = AttachmentArchive::new(HashMap::from([(
            "found.txt".to_string(),
            Bytes::from_static(b"ok"),
        )]));
        let records = vec![
            prepared(0, &[("Name", json!("keep")), ("Body", json!("found.txt"))]),
            prepared(1, &[("Name", json!("drop")), ("Body", json!("missing.txt"))]),
        ];

        let plan = build_collection_batches(
            &records,
            "Attachment",
            200,
            Some((&archive, "Body")),
            thresholds(usize::MAX, 200),
        );

        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0].payload.record_count(), 1);
        assert_eq!(plan.dropped.len(), 1);
        assert_eq!(plan.dropped[0]["Name"], "drop");
    }

    #[test]
    fn test_attachment_content_is_base64_encoded() {
        let archive = AttachmentArchive::new(HashMap::from([(
            "doc.txt".to_string(),
            Bytes::from_static(b"hello"),
        )]));
        let records = vec![prepared(0, &[("Body", json!("doc.txt"))])];

        let plan = build_collection_batches(
            &records,
            "Attachment",
            200,
            Some((&archive, "Body")),
            thresholds(usize::MAX, 200),
        );

        let BatchPayload::Records { outbound, originals } = &plan.batches[0].payload else {
            panic!("expected record payload");
        };
        assert_eq!(outbound[0]["Body"], json!("aGVsbG8="));
        // The original keeps the entry name, not the encoded content.
        assert_eq!(originals[0]["Body"], json!("doc.txt"));
    }
}
