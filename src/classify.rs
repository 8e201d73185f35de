//! Field classification: column order, semantic type inference, statistics,
//! and per-cell rendering classification.
//!
//! Everything here is a pure function of its inputs. The same records always
//! produce the same order, type, and statistics.
//!
//! # Type inference cascade
//!
//! Runs over the non-null, non-empty values of one field; first match wins.
//!
//! | # | Type | Name hint | Value test |
//! |---|------|-----------|------------|
//! | 1 | `email` | contains `email` | any string matches `\S+@\S+\.\S+` |
//! | 2 | `phone` | contains `phone` | any non-date string matches `^\+?[\d\s()-]+$` with ≥ 7 digits |
//! | 3 | `url` | contains `url` / `website` | any string starts with `http(s)://` |
//! | 4 | `date` | contains `date` | any value is date-parseable |
//! | 5 | `number` |  | **every** value parses as a number |
//! | 6 | `textarea` |  | any string longer than 100 chars |
//! | 7 | `text` |  | default |

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::models::{CellValue, DateRange, FieldBag, FieldStatistics, FieldType, MostCommon, RawRecord};
use crate::normalize::{parse_date, parse_date_str, SYSTEM_FIELDS};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("valid email regex"));
static STRICT_EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s()-]+$").expect("valid phone regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://").expect("valid url regex"));

/// Minimum digit count for a value to count as a phone number.
const MIN_PHONE_DIGITS: usize = 7;
const TEXTAREA_THRESHOLD: usize = 100;
const CELL_TRUNCATE_AT: usize = 50;

/// Keys whose presence marks an object as a media reference.
pub const MEDIA_KEYS: [&str; 4] = ["displayName", "fileName", "url", "src"];

/// Stringifies a value for display and substring search.
///
/// Strings are returned verbatim, arrays are joined with `,`, objects are
/// rendered as compact JSON, and null is empty.
pub fn display_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(display_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Structural capability test: does `value` carry any of `keys`?
pub fn has_any_of(value: &Value, keys: &[&str]) -> bool {
    value
        .as_object()
        .map(|obj| keys.iter().any(|k| obj.contains_key(*k)))
        .unwrap_or(false)
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// The non-null, non-empty values of `field_name` across `records`.
pub fn sample_values<'a, R: FieldBag>(field_name: &str, records: &'a [R]) -> Vec<&'a Value> {
    records
        .iter()
        .filter_map(|r| r.field(field_name))
        .filter(|v| is_present(v))
        .collect()
}

/// Date parse used for classification. Numbers are never dates here.
fn as_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(_) | Value::Object(_) => parse_date(value),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

/// Digit runs like `2024-02-01` also fit the phone pattern; they are dates.
fn looks_like_phone(s: &str) -> bool {
    PHONE_RE.is_match(s)
        && s.chars().filter(char::is_ascii_digit).count() >= MIN_PHONE_DIGITS
        && parse_date_str(s).is_none()
}

/// Column order: the first record's own key order, then names that only
/// appear in later records, in first-encounter order.
pub fn extract_field_order<R: FieldBag>(records: &[R]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut order = Vec::new();
    for record in records {
        for key in record.fields().keys() {
            if seen.insert(key.as_str()) {
                order.push(key.clone());
            }
        }
    }
    order
}

/// Column order for raw CMS rows.
///
/// System fields present on the first row come first, then up to
/// `max_custom` non-underscore keys of the first row, then keys first seen
/// in later rows while the column count stays below
/// `max_custom + SYSTEM_FIELDS.len()`.
pub fn extract_collection_field_order(items: &[RawRecord], max_custom: usize) -> Vec<String> {
    let Some(first) = items.first() else {
        return Vec::new();
    };
    let cap = max_custom + SYSTEM_FIELDS.len();
    let mut seen: HashSet<String> = HashSet::new();
    let mut order = Vec::new();

    for field in SYSTEM_FIELDS {
        if first.contains_key(field) && seen.insert(field.to_string()) {
            order.push(field.to_string());
        }
    }
    for key in first.keys().filter(|k| !k.starts_with('_')).take(max_custom) {
        if seen.insert(key.clone()) {
            order.push(key.clone());
        }
    }
    for item in items {
        for key in item.keys() {
            if order.len() >= cap {
                return order;
            }
            if seen.insert(key.clone()) {
                order.push(key.clone());
            }
        }
    }
    order
}

/// Infers the semantic type of `field_name` from its sampled values.
pub fn infer_type<R: FieldBag>(field_name: &str, records: &[R]) -> FieldType {
    let values = sample_values(field_name, records);
    if values.is_empty() {
        return FieldType::Text;
    }

    let name = field_name.to_lowercase();
    let strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).collect();

    if name.contains("email") || strings.iter().any(|s| EMAIL_RE.is_match(s)) {
        return FieldType::Email;
    }
    if name.contains("phone") || strings.iter().any(|s| looks_like_phone(s)) {
        return FieldType::Phone;
    }
    if name.contains("url")
        || name.contains("website")
        || strings.iter().any(|s| URL_RE.is_match(s))
    {
        return FieldType::Url;
    }
    if name.contains("date") || values.iter().any(|v| as_date(v).is_some()) {
        return FieldType::Date;
    }
    if values.iter().all(|v| as_number(v).is_some()) {
        return FieldType::Number;
    }
    if strings
        .iter()
        .any(|s| s.chars().count() > TEXTAREA_THRESHOLD)
    {
        return FieldType::Textarea;
    }
    FieldType::Text
}

/// Most frequent value. On a tie, the value that reached the winning count
/// first during a left-to-right scan wins.
fn most_common(values: &[&Value]) -> Option<MostCommon> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut best: Option<(&Value, usize)> = None;

    for &value in values {
        let count = counts.entry(value.to_string()).or_insert(0);
        *count += 1;
        if best.map_or(true, |(_, max)| *count > max) {
            best = Some((value, *count));
        }
    }

    best.map(|(value, count)| MostCommon {
        value: value.clone(),
        count,
    })
}

/// Computes statistics over the non-null, non-empty values of `field_name`.
///
/// Distinctness uses structural JSON equality, so `"30"` and `30` are
/// different values.
pub fn compute_statistics<R: FieldBag>(field_name: &str, records: &[R]) -> FieldStatistics {
    let values = sample_values(field_name, records);
    if values.is_empty() {
        return FieldStatistics::empty();
    }

    let unique_values = values
        .iter()
        .map(|v| v.to_string())
        .collect::<HashSet<_>>()
        .len();

    let lengths: Vec<usize> = values
        .iter()
        .filter_map(|v| v.as_str())
        .map(|s| s.chars().count())
        .collect();
    let average_length = (!lengths.is_empty())
        .then(|| lengths.iter().sum::<usize>() as f64 / lengths.len() as f64);

    let dates: Vec<DateTime<Utc>> = values.iter().filter_map(|v| as_date(v)).collect();
    let date_range = match (dates.iter().min(), dates.iter().max()) {
        (Some(min), Some(max)) => Some(DateRange {
            min: *min,
            max: *max,
        }),
        _ => None,
    };

    FieldStatistics {
        total_responses: values.len(),
        unique_values,
        most_common: most_common(&values),
        is_empty: false,
        average_length,
        date_range,
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Classifies one field value for rendering.
///
/// The check order is fixed: null, boolean, array (media detection on its
/// elements), object, URL string, long string, everything else.
pub fn classify_cell(value: Option<&Value>) -> CellValue {
    let Some(value) = value else {
        return CellValue::Null;
    };
    match value {
        Value::Null => CellValue::Null,
        Value::Bool(b) => CellValue::Boolean { value: *b },
        Value::Array(items) => {
            if items.iter().any(|item| has_any_of(item, &MEDIA_KEYS)) {
                CellValue::MediaArray {
                    value: items.clone(),
                }
            } else {
                CellValue::Array {
                    value: items.clone(),
                }
            }
        }
        Value::Object(_) => CellValue::Object,
        Value::String(s) if URL_RE.is_match(s) => CellValue::Url { value: s.clone() },
        Value::String(s) if s.chars().count() > CELL_TRUNCATE_AT => CellValue::Text {
            value: format!("{}...", truncate_chars(s, CELL_TRUNCATE_AT)),
            full_value: Some(s.clone()),
        },
        other => CellValue::Text {
            value: display_string(other),
            full_value: None,
        },
    }
}

fn format_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() == 10 {
        format!("({}) {}-{}", &digits[..3], &digits[3..6], &digits[6..])
    } else {
        raw.to_string()
    }
}

fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        format!("{}...", truncate_chars(s, max))
    } else {
        s.to_string()
    }
}

/// Formats a value for a plain-text table column of the given type.
pub fn format_value(value: Option<&Value>, field_type: FieldType) -> String {
    let Some(value) = value.filter(|v| is_present(v)) else {
        return "-".to_string();
    };
    let text = display_string(value);
    match field_type {
        FieldType::Date => parse_date(value)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or(text),
        FieldType::Email => text.to_lowercase(),
        FieldType::Phone => format_phone(&text),
        FieldType::Url => text,
        FieldType::Textarea => truncate_with_ellipsis(&text, TEXTAREA_THRESHOLD),
        FieldType::Number | FieldType::Text => truncate_with_ellipsis(&text, CELL_TRUNCATE_AT),
    }
}

/// Checks a value against its field type. Empty values are always valid.
pub fn validate_value(value: Option<&Value>, field_type: FieldType) -> Result<(), String> {
    let Some(value) = value.filter(|v| is_present(v)) else {
        return Ok(());
    };
    let text = display_string(value);
    let ok = match field_type {
        FieldType::Email => STRICT_EMAIL_RE.is_match(&text),
        FieldType::Phone => PHONE_RE.is_match(&text),
        FieldType::Url => reqwest::Url::parse(&text).is_ok(),
        FieldType::Number => as_number(value).is_some(),
        FieldType::Date => parse_date(value).is_some(),
        FieldType::Textarea | FieldType::Text => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("invalid {} value: '{}'", field_type, text))
    }
}
