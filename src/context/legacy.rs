//! Load-boundary migration of older context record shapes.
//!
//! Version 1 records were written with camelCase keys and inconsistent names
//! for the same concept across releases. They are rewritten into the current
//! shape here so nothing past `decode_record` ever sees a legacy key.

use crate::context::types::{CombinedContext, CONTEXT_VERSION};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Top-level legacy key -> current key. First match wins for each current key.
const TOP_LEVEL_RENAMES: &[(&str, &str)] = &[
    ("ipfsRootCid", "content_hash"),
    ("rootCid", "content_hash"),
    ("contentHash", "content_hash"),
    ("carPath", "archive_ref"),
    ("archivePath", "archive_ref"),
    ("artifactName", "artifact_identity"),
    ("runId", "producing_run_id"),
    ("eventName", "trigger_kind"),
    ("uploadStatus", "status"),
    ("blockReason", "block_reason"),
    ("pr", "pr"),
];

const PUBLISH_RENAMES: &[(&str, &str)] = &[
    ("pieceCid", "piece_id"),
    ("pieceId", "piece_id"),
    ("dataSetId", "dataset_id"),
    ("datasetId", "dataset_id"),
    ("providerName", "provider"),
    ("providerId", "provider"),
    ("provider", "provider"),
    ("previewUrl", "preview_locator"),
    ("previewURL", "preview_locator"),
];

const PAYMENT_RENAMES: &[(&str, &str)] = &[
    ("currentBalance", "balance"),
    ("balanceFormatted", "balance"),
    ("balance", "balance"),
    ("runwayDays", "runway_days"),
    ("runway", "runway_days"),
    ("depositedAmount", "deposited_this_run"),
    ("topUpAmount", "deposited_this_run"),
    ("depositAmount", "deposited_this_run"),
];

const PR_RENAMES: &[(&str, &str)] = &[
    ("number", "number"),
    ("sha", "commit_sha"),
    ("commitSha", "commit_sha"),
    ("title", "title"),
    ("author", "author"),
];

/// Decode a stored record, migrating legacy shapes first.
pub(crate) fn decode_record(bytes: &[u8]) -> Result<CombinedContext, serde_json::Error> {
    let value: Value = serde_json::from_slice(bytes)?;
    let version = value.get("version").and_then(Value::as_u64);

    match version {
        Some(v) if v >= u64::from(CONTEXT_VERSION) => {
            if v > u64::from(CONTEXT_VERSION) {
                warn!(
                    record_version = v,
                    supported_version = CONTEXT_VERSION,
                    "Context record was written by a newer release; unknown fields are dropped"
                );
            }
            let mut record: CombinedContext = serde_json::from_value(value)?;
            record.version = CONTEXT_VERSION;
            Ok(record)
        }
        _ => {
            debug!(?version, "Migrating legacy context record");
            serde_json::from_value(migrate_v1(value))
        }
    }
}

fn migrate_v1(value: Value) -> Value {
    let Value::Object(legacy) = value else {
        return value;
    };

    let mut current = rename_keys(&legacy, TOP_LEVEL_RENAMES);
    current.insert("version".to_string(), Value::from(CONTEXT_VERSION));

    if let Some(kind) = current.get("trigger_kind").and_then(Value::as_str) {
        // Legacy records stored the raw CI event name.
        let mapped = match kind {
            "pull_request" | "pull_request_target" | "workflow_run" => "pull_request",
            "push" => "push",
            "workflow_dispatch" | "manual" => "manual",
            "schedule" | "scheduled" => "scheduled",
            _ => "",
        };
        if mapped.is_empty() {
            current.remove("trigger_kind");
        } else {
            current.insert("trigger_kind".to_string(), Value::from(mapped));
        }
    }

    if let Some(Value::Object(pr)) = legacy.get("pr") {
        current.insert("pr".to_string(), Value::Object(rename_keys(pr, PR_RENAMES)));
    }

    let publish_source = legacy
        .get("uploadResult")
        .or_else(|| legacy.get("upload"))
        .and_then(Value::as_object);
    if let Some(upload) = publish_source {
        let mut publish = rename_keys(upload, PUBLISH_RENAMES);
        // Some releases wrote numeric ids.
        for key in ["piece_id", "dataset_id", "provider"] {
            let numeric = publish.get(key).filter(|v| v.is_number()).map(Value::to_string);
            if let Some(text) = numeric {
                publish.insert(key.to_string(), Value::from(text));
            }
        }
        if let Some(hash) = current.get("content_hash").cloned() {
            publish.entry("content_hash").or_insert(hash);
        }
        current.insert("publish_result".to_string(), Value::Object(publish));
    }

    let payment_source = legacy
        .get("paymentStatus")
        .or_else(|| legacy.get("payment"))
        .and_then(Value::as_object);
    if let Some(payment) = payment_source {
        let mut snapshot = rename_keys(payment, PAYMENT_RENAMES);
        // Fractional runway from older releases is truncated to whole days.
        if let Some(days) = snapshot.get("runway_days").and_then(Value::as_f64) {
            snapshot.insert("runway_days".to_string(), Value::from(days.max(0.0) as u64));
        }
        current.insert("payment_snapshot".to_string(), Value::Object(snapshot));
    }

    Value::Object(current)
}

fn rename_keys(source: &Map<String, Value>, renames: &[(&str, &str)]) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in source {
        if renames.iter().any(|(legacy, _)| legacy == key) {
            continue;
        }
        out.insert(key.clone(), value.clone());
    }
    for (legacy, current) in renames {
        if let Some(value) = source.get(*legacy) {
            if value.is_null() {
                continue;
            }
            out.entry((*current).to_string())
                .or_insert_with(|| value.clone());
        }
    }
    out
}
