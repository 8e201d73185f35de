//! In-memory table engine: search, status filter, sort, and paging over a
//! loaded page of normalized submissions.
//!
//! Search only looks at the submission id, its status, and the fields the
//! [`FieldRegistry`] currently marks visible. Sorting on `createdAt`,
//! `updatedAt` and `status` compares the typed values; any other key is a
//! field lookup where a missing value sorts as the empty string.

use std::cmp::Ordering;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::classify::{display_string, format_value};
use crate::config::Config;
use crate::fields::FieldRegistry;
use crate::gateway::build_gateway;
use crate::models::{FieldBag, NormalizedSubmission, QueryOptions, SortOrder, SubmissionStatus};

pub const DEFAULT_SORT_FIELD: &str = "createdAt";
pub const DEFAULT_ROWS_PER_PAGE: usize = 25;

/// Which fields a search looks at.
#[derive(Debug, Clone, Copy)]
pub enum SearchScope<'a> {
    AllFields,
    Fields(&'a [String]),
}

/// Does any in-scope field value contain `needle` (already lower-cased)?
pub fn fields_contain<R: FieldBag>(record: &R, needle: &str, scope: SearchScope<'_>) -> bool {
    let hit = |value: &Value| {
        !value.is_null() && display_string(value).to_lowercase().contains(needle)
    };
    match scope {
        SearchScope::AllFields => record.fields().values().any(hit),
        SearchScope::Fields(names) => names
            .iter()
            .filter_map(|name| record.field(name))
            .any(hit),
    }
}

/// Case-insensitive substring match over id, status, and in-scope fields.
pub fn matches_search(
    submission: &NormalizedSubmission,
    needle: &str,
    scope: SearchScope<'_>,
) -> bool {
    submission.id.to_lowercase().contains(needle)
        || submission.status.as_str().to_lowercase().contains(needle)
        || fields_contain(submission, needle, scope)
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    if let (Some(Value::Number(x)), Some(Value::Number(y))) = (a, b) {
        if let (Some(x), Some(y)) = (x.as_f64(), y.as_f64()) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    let a = a.map(display_string).unwrap_or_default();
    let b = b.map(display_string).unwrap_or_default();
    a.cmp(&b)
}

/// Ascending comparison of two submissions on `field`.
pub fn compare_by(a: &NormalizedSubmission, b: &NormalizedSubmission, field: &str) -> Ordering {
    match field {
        "createdAt" | "createdDate" => a.created_at.cmp(&b.created_at),
        "updatedAt" | "updatedDate" => a.updated_at.cmp(&b.updated_at),
        "status" => a.status.as_str().cmp(b.status.as_str()),
        other => compare_values(a.field(other), b.field(other)),
    }
}

/// Search, filter, and sort state of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableQuery {
    pub search: Option<String>,
    pub status: Option<SubmissionStatus>,
    pub sort_field: String,
    pub sort_order: SortOrder,
}

impl Default for TableQuery {
    fn default() -> Self {
        Self {
            search: None,
            status: None,
            sort_field: DEFAULT_SORT_FIELD.to_string(),
            sort_order: SortOrder::Desc,
        }
    }
}

impl TableQuery {
    /// Back to no search, no status filter, newest first.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Applies `query` to `records`. Ties keep their incoming order.
pub fn apply<'a>(
    records: &'a [NormalizedSubmission],
    registry: &FieldRegistry,
    query: &TableQuery,
) -> Vec<&'a NormalizedSubmission> {
    let visible = registry.visible_names();
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let mut rows: Vec<&NormalizedSubmission> = records
        .iter()
        .filter(|s| match &needle {
            Some(n) => matches_search(s, n, SearchScope::Fields(&visible)),
            None => true,
        })
        .filter(|s| query.status.map_or(true, |status| s.status == status))
        .collect();

    rows.sort_by(|a, b| {
        let ord = compare_by(a, b, &query.sort_field);
        match query.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
    rows
}

/// One rendered page of the filtered set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableView<'a> {
    pub rows: Vec<&'a NormalizedSubmission>,
    pub total_matched: usize,
    /// 1-based.
    pub page: usize,
    pub page_count: usize,
    pub rows_per_page: usize,
}

/// Slices `rows` to the 1-based `page`, clamped into range.
pub fn paginate<'a>(
    rows: Vec<&'a NormalizedSubmission>,
    page: usize,
    rows_per_page: usize,
) -> TableView<'a> {
    let rows_per_page = rows_per_page.max(1);
    let total_matched = rows.len();
    let page_count = total_matched.div_ceil(rows_per_page).max(1);
    let page = page.clamp(1, page_count);
    let start = (page - 1) * rows_per_page;

    TableView {
        rows: rows.into_iter().skip(start).take(rows_per_page).collect(),
        total_matched,
        page,
        page_count,
        rows_per_page,
    }
}

/// Stateful table: the query plus the current page.
#[derive(Debug, Clone)]
pub struct TableEngine {
    query: TableQuery,
    page: usize,
    rows_per_page: usize,
}

impl Default for TableEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ROWS_PER_PAGE)
    }
}

impl TableEngine {
    pub fn new(rows_per_page: usize) -> Self {
        Self {
            query: TableQuery::default(),
            page: 1,
            rows_per_page: rows_per_page.max(1),
        }
    }

    pub fn query(&self) -> &TableQuery {
        &self.query
    }

    // Changing what matches sends the view back to the first page.
    pub fn set_search(&mut self, search: Option<String>) {
        self.query.search = search;
        self.page = 1;
    }

    pub fn set_status(&mut self, status: Option<SubmissionStatus>) {
        self.query.status = status;
        self.page = 1;
    }

    pub fn set_sorting(&mut self, field: impl Into<String>, order: SortOrder) {
        self.query.sort_field = field.into();
        self.query.sort_order = order;
    }

    pub fn set_page(&mut self, page: usize) {
        self.page = page.max(1);
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.page = 1;
    }

    pub fn view<'a>(
        &self,
        records: &'a [NormalizedSubmission],
        registry: &FieldRegistry,
    ) -> TableView<'a> {
        paginate(
            apply(records, registry, &self.query),
            self.page,
            self.rows_per_page,
        )
    }
}

/// Arguments of `formdeck submissions`.
#[derive(Debug, Clone, Default)]
pub struct SubmissionListing {
    pub form_id: Option<String>,
    pub status: Option<SubmissionStatus>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub order: SortOrder,
    pub page: usize,
    pub rows: usize,
}

const SHOWN_FIELDS: usize = 4;
const COLUMN_WIDTH: usize = 20;

fn cell(text: &str) -> String {
    let clipped: String = text.chars().take(COLUMN_WIDTH).collect();
    format!("{:<width$}", clipped, width = COLUMN_WIDTH)
}

/// `formdeck submissions <namespace>`: loads one backend page and prints the
/// table view of it.
pub async fn run_submissions(config: &Config, namespace: &str, args: SubmissionListing) -> Result<()> {
    let gateway = build_gateway(config)?;
    let mut options = QueryOptions::namespace(namespace)
        .with_cursor(args.cursor.clone())
        .with_search(args.search.clone());
    if let Some(limit) = args.limit {
        options = options.with_limit(limit);
    }
    if let Some(form_id) = &args.form_id {
        options = options.with_filter("formId", form_id.as_str());
    }
    if let Some(status) = args.status {
        options = options.with_filter("status", status.backend_value());
    }

    let page = gateway.query_submissions(&options).await?;
    let records = &page.result.items;
    let registry = FieldRegistry::from_records(records);

    let mut engine = TableEngine::new(args.rows);
    engine.set_search(args.search.clone());
    engine.set_status(args.status);
    engine.set_sorting(
        args.sort_by.as_deref().unwrap_or(DEFAULT_SORT_FIELD),
        args.order,
    );
    engine.set_page(args.page);
    let view = engine.view(records, &registry);

    let shown: Vec<_> = registry.visible().take(SHOWN_FIELDS).collect();
    let mut header = vec![cell("ID"), cell("CREATED"), cell("STATUS")];
    header.extend(shown.iter().map(|d| cell(&d.label)));
    println!("{}", header.join(" "));
    println!("{}", "-".repeat((COLUMN_WIDTH + 1) * header.len()));

    for row in &view.rows {
        let mut cells = vec![
            cell(&row.id),
            cell(&row.created_at.format("%Y-%m-%d %H:%M").to_string()),
            cell(row.status.as_str()),
        ];
        cells.extend(
            shown
                .iter()
                .map(|d| cell(&format_value(row.field(&d.name), d.field_type))),
        );
        println!("{}", cells.join(" "));
    }

    println!();
    println!(
        "Page {}/{}: {} matching of {} loaded ({} total, {} dropped)",
        view.page,
        view.page_count,
        view.total_matched,
        records.len(),
        page.result.total_count,
        page.dropped
    );
    if let Some(next) = &page.result.cursors.next {
        println!("Next cursor: {}", next);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use serde_json::json;

    fn submission(id: &str, day: u32, status: &str, fields: Value) -> NormalizedSubmission {
        let raw = json!({
            "_id": id,
            "formId": "f1",
            "namespace": "ns",
            "_createdDate": format!("2024-03-{:02}T09:00:00Z", day),
            "status": status,
            "submissions": fields,
        });
        normalize(raw.as_object().unwrap()).unwrap()
    }

    fn sample() -> Vec<NormalizedSubmission> {
        vec![
            submission("a1", 1, "CONFIRMED", json!({"name": "Zoe", "email": "zoe@x.io", "age": 41})),
            submission("b2", 3, "PENDING", json!({"name": "adam", "email": "adam@y.io", "age": 9})),
            submission("c3", 2, "CONFIRMED", json!({"name": "Mia", "email": "john@z.io"})),
        ]
    }

    fn ids(rows: &[&NormalizedSubmission]) -> Vec<String> {
        rows.iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn test_default_sort_is_newest_first() {
        let records = sample();
        let registry = FieldRegistry::from_records(&records);
        let rows = apply(&records, &registry, &TableQuery::default());
        assert_eq!(ids(&rows), vec!["b2", "c3", "a1"]);
    }

    #[test]
    fn test_hidden_field_is_not_searched() {
        let records = sample();
        let mut registry = FieldRegistry::from_records(&records);
        let query = TableQuery {
            search: Some("JOHN".into()),
            ..TableQuery::default()
        };

        assert_eq!(ids(&apply(&records, &registry, &query)), vec!["c3"]);

        registry.set_visible("email", false);
        assert!(apply(&records, &registry, &query).is_empty());
    }

    #[test]
    fn test_search_matches_id_and_status() {
        let records = sample();
        let registry = FieldRegistry::from_records(&records);
        let by_id = TableQuery {
            search: Some("b2".into()),
            ..TableQuery::default()
        };
        assert_eq!(ids(&apply(&records, &registry, &by_id)), vec!["b2"]);

        let by_status = TableQuery {
            search: Some("pend".into()),
            ..TableQuery::default()
        };
        assert_eq!(ids(&apply(&records, &registry, &by_status)), vec!["b2"]);
    }

    #[test]
    fn test_status_filter_and_field_sort() {
        let records = sample();
        let registry = FieldRegistry::from_records(&records);
        let query = TableQuery {
            status: Some(SubmissionStatus::Confirmed),
            sort_field: "name".into(),
            sort_order: SortOrder::Asc,
            ..TableQuery::default()
        };
        assert_eq!(ids(&apply(&records, &registry, &query)), vec!["c3", "a1"]);
    }

    #[test]
    fn test_numeric_field_sort_with_missing_value() {
        let records = sample();
        let registry = FieldRegistry::from_records(&records);
        let query = TableQuery {
            sort_field: "age".into(),
            sort_order: SortOrder::Asc,
            ..TableQuery::default()
        };
        // missing sorts as "", numbers compare numerically
        assert_eq!(ids(&apply(&records, &registry, &query)), vec!["c3", "b2", "a1"]);
    }

    #[test]
    fn test_clear_restores_defaults() {
        let mut query = TableQuery {
            search: Some("x".into()),
            status: Some(SubmissionStatus::Pending),
            sort_field: "name".into(),
            sort_order: SortOrder::Asc,
        };
        query.clear();
        assert_eq!(query, TableQuery::default());
        assert_eq!(query.sort_field, "createdAt");
        assert_eq!(query.sort_order, SortOrder::Desc);
    }

    #[test]
    fn test_paginate_clamps_page() {
        let records = sample();
        let rows: Vec<&NormalizedSubmission> = records.iter().collect();
        let view = paginate(rows.clone(), 2, 2);
        assert_eq!(view.page_count, 2);
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.total_matched, 3);

        let view = paginate(rows, 9, 2);
        assert_eq!(view.page, 2);

        let empty = paginate(Vec::new(), 1, 10);
        assert_eq!(empty.page_count, 1);
        assert!(empty.rows.is_empty());
    }

    #[test]
    fn test_engine_resets_page_on_search() {
        let records = sample();
        let registry = FieldRegistry::from_records(&records);
        let mut engine = TableEngine::new(1);
        engine.set_page(3);
        assert_eq!(engine.view(&records, &registry).page, 3);

        engine.set_search(Some("mia".into()));
        let view = engine.view(&records, &registry);
        assert_eq!(view.page, 1);
        assert_eq!(view.total_matched, 1);

        engine.clear();
        assert_eq!(engine.view(&records, &registry).total_matched, 3);
    }
}
