//! Record validation and normalization.
//!
//! Converts backend-native [`RawRecord`]s into [`NormalizedSubmission`]s and
//! [`NormalizedItem`]s. A record missing a required property is rejected as a
//! whole; batch normalization drops rejected records and counts them, so the
//! normalized count can be smaller than the backend's count.
//!
//! # Required properties (submissions)
//!
//! | Property | Becomes |
//! |----------|---------|
//! | `_id` | `id` |
//! | `formId` | `source_id` |
//! | `namespace` | `namespace` |
//! | `_createdDate` | `created_at` |
//!
//! # Date handling
//!
//! Dates never fail normalization: an unparseable `_updatedDate` falls back to
//! `created_at`, and an unparseable (but present) `_createdDate` falls back to
//! the current time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::error::Rejected;
use crate::models::{
    NormalizedItem, NormalizedSubmission, RawRecord, SubmissionStatus, Submitter,
};

/// Properties of a CMS row that are not user fields.
pub const SYSTEM_FIELDS: [&str; 4] = ["_id", "_createdDate", "_updatedDate", "_owner"];

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Output of a batch normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch<T> {
    pub items: Vec<T>,
    /// Number of records rejected and dropped.
    pub dropped: usize,
}

/// Parses a date-bearing string.
///
/// Accepts RFC 3339, RFC 2822, naive ISO timestamps (taken as UTC), and
/// `YYYY-MM-DD` dates. Bare numbers are not dates.
pub fn parse_date_str(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parses a date from a backend value: a string (see [`parse_date_str`]), an
/// epoch-milliseconds number, or a `{"$date": ...}` wrapper.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => map.get("$date").and_then(parse_date),
        _ => None,
    }
}

/// Reads a non-empty identifier. Numbers are accepted and stringified.
fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required(raw: &RawRecord, key: &'static str) -> Result<String, Rejected> {
    text_of(raw.get(key)).ok_or(Rejected::MissingField(key))
}

fn parse_submitter(raw: &RawRecord) -> Option<Submitter> {
    let submitter = Submitter {
        member_id: text_of(raw.get("memberId")),
        visitor_id: text_of(raw.get("visitorId")),
        user_id: text_of(raw.get("userId")),
        application_id: text_of(raw.get("applicationId")),
    };
    (!submitter.is_empty()).then_some(submitter)
}

/// Normalizes one raw submission.
///
/// Returns [`Rejected`] when `_id`, `formId`, `namespace` or `_createdDate`
/// is missing, null or empty. Never panics on malformed input.
pub fn normalize(raw: &RawRecord) -> Result<NormalizedSubmission, Rejected> {
    let id = required(raw, "_id")?;
    let source_id = required(raw, "formId")?;
    let namespace = required(raw, "namespace")?;

    let created_raw = raw
        .get("_createdDate")
        .filter(|v| !v.is_null() && v.as_str().map_or(true, |s| !s.trim().is_empty()))
        .ok_or(Rejected::MissingField("_createdDate"))?;

    let created_at = parse_date(created_raw).unwrap_or_else(|| {
        tracing::debug!(%id, "Unparseable _createdDate, using current time");
        Utc::now()
    });
    let updated_at = raw
        .get("_updatedDate")
        .and_then(parse_date)
        .unwrap_or(created_at);

    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .map(SubmissionStatus::parse)
        .unwrap_or(SubmissionStatus::Unknown);

    Ok(NormalizedSubmission {
        id,
        created_at,
        updated_at,
        source_id,
        namespace,
        status,
        fields: raw
            .get("submissions")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        submitter: raw
            .get("submitter")
            .and_then(Value::as_object)
            .and_then(parse_submitter),
        seen: raw.get("seen").and_then(Value::as_bool).unwrap_or(false),
        contact_id: text_of(raw.get("contactId")),
        revision: text_of(raw.get("revision")),
    })
}

/// Normalizes a page of raw submissions, dropping and counting rejects.
pub fn normalize_batch(raws: &[RawRecord]) -> NormalizedBatch<NormalizedSubmission> {
    let mut items = Vec::with_capacity(raws.len());
    let mut dropped = 0;

    for raw in raws {
        match normalize(raw) {
            Ok(submission) => items.push(submission),
            Err(reason) => {
                dropped += 1;
                tracing::debug!(
                    id = %raw.get("_id").map(|v| v.to_string()).unwrap_or_default(),
                    %reason,
                    "Dropping invalid submission"
                );
            }
        }
    }

    NormalizedBatch { items, dropped }
}

/// Normalizes one CMS row. Only `_id` is required.
pub fn normalize_item(raw: &RawRecord) -> Result<NormalizedItem, Rejected> {
    let id = required(raw, "_id")?;
    let created_at = raw
        .get("_createdDate")
        .and_then(parse_date)
        .unwrap_or_else(Utc::now);
    let updated_at = raw
        .get("_updatedDate")
        .and_then(parse_date)
        .unwrap_or(created_at);

    let fields: RawRecord = raw
        .iter()
        .filter(|(key, _)| !SYSTEM_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(NormalizedItem {
        id,
        created_at,
        updated_at,
        owner: text_of(raw.get("_owner")),
        fields,
    })
}

/// Normalizes a page of CMS rows, dropping and counting rows without an id.
pub fn normalize_items(raws: &[RawRecord]) -> NormalizedBatch<NormalizedItem> {
    let mut items = Vec::with_capacity(raws.len());
    let mut dropped = 0;
    for raw in raws {
        match normalize_item(raw) {
            Ok(item) => items.push(item),
            Err(reason) => {
                dropped += 1;
                tracing::debug!(%reason, "Dropping invalid collection row");
            }
        }
    }
    NormalizedBatch { items, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn valid() -> RawRecord {
        raw(json!({
            "_id": "sub-1",
            "_createdDate": "2024-03-01T10:00:00Z",
            "_updatedDate": "2024-03-02T10:00:00Z",
            "formId": "form-a",
            "namespace": "wix.form_app.form",
            "status": "CONFIRMED",
            "submissions": { "name": "Ada", "email": "ada@example.com" },
            "submitter": { "memberId": "m-1", "visitorId": null, "userId": "" },
            "seen": true,
            "contactId": "c-9"
        }))
    }

    #[test]
    fn test_normalize_valid_record() {
        let s = normalize(&valid()).unwrap();
        assert_eq!(s.id, "sub-1");
        assert_eq!(s.source_id, "form-a");
        assert_eq!(s.status, SubmissionStatus::Confirmed);
        assert_eq!(
            s.created_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
        );
        assert!(s.seen);
        assert_eq!(s.contact_id.as_deref(), Some("c-9"));
        let submitter = s.submitter.unwrap();
        assert_eq!(submitter.member_id.as_deref(), Some("m-1"));
        assert_eq!(submitter.visitor_id, None);
        assert_eq!(submitter.user_id, None);
    }

    #[test]
    fn test_field_order_preserved() {
        let s = normalize(&valid()).unwrap();
        let keys: Vec<&String> = s.fields.keys().collect();
        assert_eq!(keys, vec!["name", "email"]);
    }

    #[test]
    fn test_each_required_field_rejects() {
        for key in ["_id", "formId", "namespace", "_createdDate"] {
            let mut r = valid();
            r.remove(key);
            assert_eq!(normalize(&r), Err(Rejected::MissingField(key)));

            let mut r = valid();
            r.insert(key.to_string(), Value::Null);
            assert_eq!(normalize(&r), Err(Rejected::MissingField(key)));
        }
    }

    #[test]
    fn test_defaults_for_optional_fields() {
        let r = raw(json!({
            "_id": "x",
            "_createdDate": "2024-01-01",
            "formId": "f",
            "namespace": "ns"
        }));
        let s = normalize(&r).unwrap();
        assert_eq!(s.status, SubmissionStatus::Unknown);
        assert!(!s.seen);
        assert!(s.fields.is_empty());
        assert!(s.submitter.is_none());
        assert_eq!(s.updated_at, s.created_at);
    }

    #[test]
    fn test_unparseable_dates_fall_back() {
        let mut r = valid();
        r.insert("_updatedDate".into(), json!("yesterday-ish"));
        let s = normalize(&r).unwrap();
        assert_eq!(s.updated_at, s.created_at);

        let before = Utc::now();
        let mut r = valid();
        r.insert("_createdDate".into(), json!("not a date"));
        r.remove("_updatedDate");
        let s = normalize(&r).unwrap();
        assert!(s.created_at >= before);
        assert_eq!(s.updated_at, s.created_at);
    }

    #[test]
    fn test_unknown_status_strings() {
        let mut r = valid();
        r.insert("status".into(), json!("UNKNOWN_SUBMISSION_STATUS"));
        assert_eq!(normalize(&r).unwrap().status, SubmissionStatus::Unknown);
        r.insert("status".into(), json!("payment_waiting"));
        assert_eq!(
            normalize(&r).unwrap().status,
            SubmissionStatus::PaymentWaiting
        );
    }

    #[test]
    fn test_batch_drops_missing_namespace() {
        let mut bad = valid();
        bad.remove("namespace");
        let mut other = valid();
        other.insert("_id".into(), json!("sub-2"));

        let batch = normalize_batch(&[valid(), bad, other]);
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.dropped, 1);
        assert!(batch.items.iter().all(|s| s.namespace == "wix.form_app.form"));
    }

    #[test]
    fn test_parse_date_variants() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_date(&json!("2024-05-06T07:08:09Z")), Some(expected));
        assert_eq!(parse_date(&json!("2024-05-06T07:08:09")), Some(expected));
        assert_eq!(parse_date(&json!({"$date": "2024-05-06T07:08:09Z"})), Some(expected));
        assert_eq!(
            parse_date(&json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert!(parse_date(&json!("30")).is_none());
        assert!(parse_date(&json!(true)).is_none());
    }

    #[test]
    fn test_normalize_item_splits_system_fields() {
        let r = raw(json!({
            "_id": "p1",
            "_createdDate": "2024-01-01T00:00:00Z",
            "_owner": "owner-1",
            "title": "Lamp",
            "price": 20
        }));
        let item = normalize_item(&r).unwrap();
        assert_eq!(item.owner.as_deref(), Some("owner-1"));
        assert_eq!(item.fields.len(), 2);
        assert!(item.fields.get("_id").is_none());

        let batch = normalize_items(&[r, raw(json!({"title": "no id"}))]);
        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.dropped, 1);
    }
}
