//! In-memory backend for fixtures, tests, and local runs.
//!
//! Holds submissions and collection rows behind `std::sync::RwLock` and
//! evaluates [`NativeQuery`]s by brute force. Cursors are opaque base64
//! tokens wrapping a row offset into the filtered, sorted sequence.
//!
//! Fixture files are JSON:
//!
//! ```json
//! {
//!   "submissions": [ { "_id": "s1", "formId": "f1", "namespace": "wix.form_app.form", ... } ],
//!   "collections": { "Products": [ { "_id": "p1", "title": "Lamp" } ] }
//! }
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::backend::{
    CollectionBackend, CollectionMeta, NativePage, NativeQuery, SubmissionBackend,
};
use crate::classify::display_string;
use crate::error::BackendError;
use crate::models::{Cursors, RawRecord, SortOrder};

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    submissions: Vec<RawRecord>,
    #[serde(default)]
    collections: HashMap<String, Vec<RawRecord>>,
}

/// In-memory implementation of both backend contracts.
pub struct InMemoryBackend {
    submissions: RwLock<Vec<RawRecord>>,
    collections: RwLock<HashMap<String, Vec<RawRecord>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            submissions: RwLock::new(Vec::new()),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Loads a fixture file (see module docs for the shape).
    pub fn from_fixture(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse fixture file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            submissions = fixture.submissions.len(),
            collections = fixture.collections.len(),
            "Loaded fixture"
        );

        Ok(Self {
            submissions: RwLock::new(fixture.submissions),
            collections: RwLock::new(fixture.collections),
        })
    }

    pub fn with_submissions(self, records: Vec<RawRecord>) -> Self {
        self.submissions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(records);
        self
    }

    pub fn with_collection(self, collection_id: impl Into<String>, rows: Vec<RawRecord>) -> Self {
        self.collections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(collection_id.into(), rows);
        self
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_cursor(offset: usize) -> String {
    URL_SAFE_NO_PAD.encode(format!("offset:{}", offset))
}

fn decode_cursor(cursor: &str) -> Result<usize, BackendError> {
    let invalid = || BackendError::QueryBuild(format!("invalid cursor: '{}'", cursor));
    let bytes = URL_SAFE_NO_PAD.decode(cursor.trim()).map_err(|_| invalid())?;
    let text = String::from_utf8(bytes).map_err(|_| invalid())?;
    text.strip_prefix("offset:")
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(invalid)
}

/// Orders JSON values: missing/null first, then numbers numerically, then
/// everything else by its display string.
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => display_string(x).cmp(&display_string(y)),
    }
}

fn record_matches(record: &RawRecord, query: &NativeQuery) -> bool {
    let eq_ok = query
        .eq
        .iter()
        .all(|p| record.get(&p.field).unwrap_or(&Value::Null) == &p.value);
    if !eq_ok {
        return false;
    }
    if query.contains_any.is_empty() {
        return true;
    }
    query.contains_any.iter().any(|p| {
        record
            .get(&p.field)
            .filter(|v| !v.is_null())
            .map(|v| {
                display_string(v)
                    .to_lowercase()
                    .contains(&p.text.to_lowercase())
            })
            .unwrap_or(false)
    })
}

/// Filters, sorts, and slices `rows` according to `query`.
fn run_query(rows: &[RawRecord], query: &NativeQuery) -> Result<NativePage, BackendError> {
    let mut selected: Vec<&RawRecord> = rows
        .iter()
        .filter(|r| record_matches(r, query))
        .collect();

    if let Some(sort) = &query.sort {
        selected.sort_by(|a, b| {
            let ord = compare_json(a.get(&sort.field), b.get(&sort.field));
            match sort.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }

    let total = selected.len();
    let offset = match &query.skip_to {
        Some(cursor) => decode_cursor(cursor)?,
        None => 0,
    };
    if offset > total {
        return Err(BackendError::QueryBuild(format!(
            "cursor offset {} is past the end ({} rows)",
            offset, total
        )));
    }
    let limit = query.limit.max(1);
    let end = offset.saturating_add(limit).min(total);
    let items: Vec<RawRecord> = selected[offset..end]
        .iter()
        .map(|r| (*r).clone())
        .collect();

    let has_next = end < total;
    let has_prev = offset > 0;
    Ok(NativePage {
        items,
        has_next,
        has_prev,
        cursors: Cursors {
            next: has_next.then(|| encode_cursor(end)),
            prev: has_prev.then(|| encode_cursor(offset.saturating_sub(limit))),
        },
        total_count: Some(total),
    })
}

#[async_trait]
impl SubmissionBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find(&self, query: &NativeQuery) -> Result<NativePage, BackendError> {
        let rows = self
            .submissions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        run_query(&rows, query)
    }
}

#[async_trait]
impl CollectionBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find(
        &self,
        collection_id: &str,
        query: &NativeQuery,
    ) -> Result<NativePage, BackendError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let rows = collections.get(collection_id).ok_or_else(|| {
            BackendError::Unavailable(format!("collection '{}' not found", collection_id))
        })?;
        run_query(rows, query)
    }

    /// Fixture collection ids, alphabetically.
    async fn list_collections(&self) -> Result<Vec<CollectionMeta>, BackendError> {
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<&String> = collections.keys().collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .map(|id| CollectionMeta {
                id: id.clone(),
                display_name: None,
            })
            .collect())
    }
}
