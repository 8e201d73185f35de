//! Core data models used throughout formdeck.
//!
//! These types represent the raw and normalized records, query options and
//! results, and the field metadata that flow from the backends to the table
//! view.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend-native record. Untyped; any property may be missing or null.
pub type RawRecord = serde_json::Map<String, Value>;

/// Lifecycle status of a form submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Confirmed,
    Pending,
    PaymentWaiting,
    PaymentCanceled,
    Unknown,
}

impl SubmissionStatus {
    /// Parses a backend status string. Anything unrecognised is `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Self::Confirmed,
            "PENDING" => Self::Pending,
            "PAYMENT_WAITING" => Self::PaymentWaiting,
            "PAYMENT_CANCELED" => Self::PaymentCanceled,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Pending => "PENDING",
            Self::PaymentWaiting => "PAYMENT_WAITING",
            Self::PaymentCanceled => "PAYMENT_CANCELED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The value the submission backend stores for this status.
    pub fn backend_value(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN_SUBMISSION_STATUS",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    /// Strict parse used for user input: unknown strings are an error.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" | "UNKNOWN_SUBMISSION_STATUS" => Ok(Self::Unknown),
            other => match Self::parse(other) {
                Self::Unknown => Err(format!("unknown submission status: '{}'", s)),
                status => Ok(status),
            },
        }
    }
}

/// Identity of whoever submitted a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visitor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<String>,
}

impl Submitter {
    pub fn is_empty(&self) -> bool {
        self.member_id.is_none()
            && self.visitor_id.is_none()
            && self.user_id.is_none()
            && self.application_id.is_none()
    }
}

/// A validated form submission.
///
/// `id`, `source_id`, `namespace` and `created_at` are always present; a raw
/// record missing any of them never becomes a `NormalizedSubmission`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSubmission {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// The form id the submission belongs to.
    #[serde(rename = "formId")]
    pub source_id: String,
    pub namespace: String,
    pub status: SubmissionStatus,
    /// Submitted values, in the order the backend returned them.
    pub fields: RawRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitter: Option<Submitter>,
    pub seen: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
}

/// A CMS collection row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Every non-system key of the row.
    pub fields: RawRecord,
}

/// Anything that carries a bag of dynamically named fields.
pub trait FieldBag {
    fn fields(&self) -> &RawRecord;

    fn field(&self, name: &str) -> Option<&Value> {
        self.fields().get(name)
    }
}

impl FieldBag for NormalizedSubmission {
    fn fields(&self) -> &RawRecord {
        &self.fields
    }
}

impl FieldBag for NormalizedItem {
    fn fields(&self) -> &RawRecord {
        &self.fields
    }
}

impl FieldBag for RawRecord {
    fn fields(&self) -> &RawRecord {
        self
    }
}

// ============ Field metadata ============

/// Semantic type inferred for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Email,
    Phone,
    Url,
    Date,
    Number,
    Textarea,
    Text,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Url => "url",
            Self::Date => "date",
            Self::Number => "number",
            Self::Textarea => "textarea",
            Self::Text => "text",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata about one discovered field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub label: String,
    /// Display position among visible fields; `None` while hidden.
    pub order: Option<usize>,
    pub visible: bool,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Number of records carrying a non-null value for this field.
    pub usage_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MostCommon {
    pub value: Value,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: DateTime<Utc>,
    pub max: DateTime<Utc>,
}

/// Statistics over the non-empty values of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatistics {
    pub total_responses: usize,
    pub unique_values: usize,
    pub most_common: Option<MostCommon>,
    pub is_empty: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
}

impl FieldStatistics {
    pub fn empty() -> Self {
        Self {
            total_responses: 0,
            unique_values: 0,
            most_common: None,
            is_empty: true,
            average_length: None,
            date_range: None,
        }
    }
}

/// Rendering-ready classification of one field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CellValue {
    Null,
    Boolean {
        value: bool,
    },
    Array {
        value: Vec<Value>,
    },
    MediaArray {
        value: Vec<Value>,
    },
    Url {
        value: String,
    },
    Text {
        value: String,
        #[serde(rename = "fullValue", skip_serializing_if = "Option::is_none")]
        full_value: Option<String>,
    },
    Object,
}

// ============ Queries ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" => Ok(Self::Desc),
            other => Err(format!("invalid sort order: '{}'. Must be asc or desc.", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Namespace,
    Collection,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace => f.write_str("namespace"),
            Self::Collection => f.write_str("collection"),
        }
    }
}

/// The unit the gateway queries: a submission namespace or a CMS collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum SourceRef {
    Namespace(String),
    Collection(String),
}

impl SourceRef {
    pub fn id(&self) -> &str {
        match self {
            Self::Namespace(id) | Self::Collection(id) => id,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Namespace(_) => SourceKind::Namespace,
            Self::Collection(_) => SourceKind::Collection,
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Options for one gateway query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub source: SourceRef,
    /// Page size; `None` uses the gateway default. Clamped to `1..=200`.
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub equality_filters: BTreeMap<String, Value>,
    pub sort_field: Option<String>,
    pub sort_order: SortOrder,
    pub search_query: Option<String>,
}

impl QueryOptions {
    pub fn new(source: SourceRef) -> Self {
        Self {
            source,
            limit: None,
            cursor: None,
            equality_filters: BTreeMap::new(),
            sort_field: None,
            sort_order: SortOrder::Desc,
            search_query: None,
        }
    }

    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self::new(SourceRef::Namespace(namespace.into()))
    }

    pub fn collection(collection_id: impl Into<String>) -> Self {
        Self::new(SourceRef::Collection(collection_id.into()))
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equality_filters.insert(field.into(), value.into());
        self
    }

    pub fn sorted_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_field = Some(field.into());
        self.sort_order = order;
        self
    }

    pub fn with_search(mut self, query: Option<String>) -> Self {
        self.search_query = query.filter(|q| !q.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next: bool,
    pub has_previous: bool,
}

/// One page of results.
///
/// `has_next` implies `cursors.next` is present; [`QueryResult::new`]
/// enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub has_next: bool,
    pub has_prev: bool,
    pub cursors: Cursors,
    pub page_info: PageInfo,
}

impl<T> QueryResult<T> {
    pub fn new(
        items: Vec<T>,
        total_count: usize,
        has_next: bool,
        has_prev: bool,
        cursors: Cursors,
    ) -> Self {
        let has_next = has_next && cursors.next.is_some();
        Self {
            items,
            total_count,
            has_next,
            has_prev,
            cursors,
            page_info: PageInfo {
                has_next,
                has_previous: has_prev,
            },
        }
    }

    /// A single complete page with no continuation.
    pub fn complete(items: Vec<T>) -> Self {
        let total = items.len();
        Self::new(items, total, false, false, Cursors::default())
    }

    /// Replaces the items, keeping paging state.
    pub fn with_items<U>(self, items: Vec<U>, total_count: usize) -> QueryResult<U> {
        QueryResult {
            items,
            total_count,
            has_next: self.has_next,
            has_prev: self.has_prev,
            cursors: self.cursors,
            page_info: self.page_info,
        }
    }
}

// ============ Summaries ============

/// A non-empty source found by discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    pub source_id: String,
    pub kind: SourceKind,
    pub label: String,
    pub record_count: usize,
    /// Distinct form ids within a namespace, in first-seen order.
    pub secondary_ids: Vec<String>,
}

/// One form within a namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormSummary {
    pub form_id: String,
    pub form_name: String,
    pub submission_count: usize,
    pub last_submission_date: DateTime<Utc>,
}

/// A collection with its probed row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSummary {
    pub collection_id: String,
    pub display_name: String,
    /// `0` when the count probe failed.
    pub item_count: usize,
}
