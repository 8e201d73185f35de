//! Query gateway: one cursor-paginated contract over both backends.
//!
//! The gateway turns [`QueryOptions`] into a backend [`NativeQuery`], runs it
//! against the submission or collection backend, and reports the page as a
//! [`QueryResult`]. It holds no state between calls.
//!
//! # Translation
//!
//! | Option | Submission source | Collection source |
//! |--------|-------------------|-------------------|
//! | source | `eq namespace = ns` (always first) | collection id |
//! | `equality_filters` | chained `eq` | chained `eq` |
//! | `sort_field` | mapped to `_createdDate` / `_updatedDate` / passthrough | passed through |
//! | `limit` | clamped to `1..=max_limit` | clamped to `1..=max_limit` |
//! | `cursor` | `skip_to` | `skip_to` |
//! | `search_query` | page widened to the search window, filtered after normalization | any-of `contains` over `title`, `name`, `description` |
//!
//! Matches beyond the search window are not found on submission sources.
//! When the search runs client-side, every match inside the window is
//! returned, so such a page may hold more than `limit` items.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::backend::{CollectionBackend, CollectionMeta, NativeQuery, SubmissionBackend};
use crate::backend_http::HttpBackend;
use crate::backend_memory::InMemoryBackend;
use crate::classify::{extract_collection_field_order, format_value, infer_type};
use crate::config::{BackendKind, Config, QueryConfig};
use crate::error::GatewayError;
use crate::models::{
    CollectionSummary, NormalizedItem, NormalizedSubmission, QueryOptions, QueryResult, RawRecord, SourceKind,
    SourceRef,
};
use crate::normalize::{normalize_batch, normalize_items};
use crate::table::{fields_contain, matches_search, SearchScope};

/// Keys searched with `contains` on collection sources.
pub const COLLECTION_SEARCH_KEYS: [&str; 3] = ["title", "name", "description"];

/// Custom columns shown for collection rows.
pub const MAX_CUSTOM_COLUMNS: usize = 15;

const DEFAULT_SORT_FIELD: &str = "_createdDate";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewaySettings {
    pub default_limit: usize,
    pub max_limit: usize,
    pub search_window: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
            search_window: 200,
        }
    }
}

impl From<&QueryConfig> for GatewaySettings {
    fn from(config: &QueryConfig) -> Self {
        Self {
            default_limit: config.default_limit,
            max_limit: config.max_limit,
            search_window: config.search_window,
        }
    }
}

/// A normalized page plus the number of raw records that failed validation.
#[derive(Debug, Clone)]
pub struct NormalizedPage<T> {
    pub result: QueryResult<T>,
    pub dropped: usize,
}

/// Maps a logical sort name onto a property the submission backend can sort.
pub fn submission_sort_field(field: Option<&str>) -> &str {
    match field {
        None => DEFAULT_SORT_FIELD,
        Some("createdAt" | "createdDate" | "_createdDate") => "_createdDate",
        Some("updatedAt" | "updatedDate" | "_updatedDate") => "_updatedDate",
        Some(name @ ("status" | "formId" | "seen")) => name,
        Some(other) => {
            tracing::debug!(field = other, "Unsortable submission field, using _createdDate");
            DEFAULT_SORT_FIELD
        }
    }
}

fn collection_sort_field(field: Option<&str>) -> &str {
    match field {
        None | Some("createdAt" | "createdDate") => DEFAULT_SORT_FIELD,
        Some("updatedAt" | "updatedDate") => "_updatedDate",
        Some(other) => other,
    }
}

pub struct QueryGateway {
    submissions: Arc<dyn SubmissionBackend>,
    collections: Arc<dyn CollectionBackend>,
    settings: GatewaySettings,
}

impl QueryGateway {
    pub fn new(
        submissions: Arc<dyn SubmissionBackend>,
        collections: Arc<dyn CollectionBackend>,
    ) -> Self {
        Self {
            submissions,
            collections,
            settings: GatewaySettings::default(),
        }
    }

    /// Uses one backend for both contracts.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: SubmissionBackend + CollectionBackend + 'static,
    {
        Self::new(backend.clone(), backend)
    }

    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    fn pushes_down_search(&self, source: &SourceRef) -> bool {
        match source {
            SourceRef::Namespace(_) => self.submissions.supports_contains(),
            SourceRef::Collection(_) => self.collections.supports_contains(),
        }
    }

    /// Page size sent to the backend.
    pub fn effective_limit(&self, options: &QueryOptions) -> usize {
        let max = self.settings.max_limit.max(1);
        let limit = options
            .limit
            .unwrap_or(self.settings.default_limit)
            .clamp(1, max);
        if options.search_query.is_some() && !self.pushes_down_search(&options.source) {
            limit.max(self.settings.search_window)
        } else {
            limit
        }
    }

    pub fn build_native_query(&self, options: &QueryOptions) -> NativeQuery {
        let mut query = NativeQuery::new(self.effective_limit(options));

        let sort_field = match &options.source {
            SourceRef::Namespace(namespace) => {
                query = query.eq("namespace", namespace.as_str());
                submission_sort_field(options.sort_field.as_deref())
            }
            SourceRef::Collection(_) => collection_sort_field(options.sort_field.as_deref()),
        };

        for (field, value) in &options.equality_filters {
            query = query.eq(field.as_str(), value.clone());
        }

        if let Some(search) = &options.search_query {
            if self.pushes_down_search(&options.source) {
                for key in COLLECTION_SEARCH_KEYS {
                    query = query.contains(key, search.as_str());
                }
            }
        }

        query = query.sort_by(sort_field, options.sort_order);
        if let Some(cursor) = &options.cursor {
            query = query.skip_to(cursor.as_str());
        }
        query
    }

    /// Runs one backend query and reports the raw page.
    pub async fn query(
        &self,
        options: &QueryOptions,
    ) -> Result<QueryResult<RawRecord>, GatewayError> {
        let native = self.build_native_query(options);
        tracing::debug!(
            source = %options.source,
            limit = native.limit,
            cursor = ?native.skip_to,
            "Querying source"
        );

        let page = match &options.source {
            SourceRef::Namespace(_) => self.submissions.find(&native).await,
            SourceRef::Collection(id) => self.collections.find(id, &native).await,
        }
        .map_err(|error| {
            tracing::warn!(source = %options.source, error = %error, "Backend query failed");
            GatewayError::Backend {
                source_id: options.source.id().to_string(),
                error,
            }
        })?;

        if page.has_next && page.cursors.next.is_none() {
            tracing::debug!(source = %options.source, "has_next without a cursor, ending here");
        }

        let total = page.total_count.unwrap_or(page.items.len());
        Ok(QueryResult::new(
            page.items,
            total,
            page.has_next,
            page.has_prev,
            page.cursors,
        ))
    }

    /// Queries a namespace and normalizes the page. A search query is
    /// applied here, over every field.
    pub async fn query_submissions(
        &self,
        options: &QueryOptions,
    ) -> Result<NormalizedPage<NormalizedSubmission>, GatewayError> {
        expect_kind(options, SourceKind::Namespace)?;
        let raw = self.query(options).await?;
        let batch = normalize_batch(&raw.items);
        let backend_total = raw.total_count;

        let result = match &options.search_query {
            Some(search) if !self.submissions.supports_contains() => {
                let needle = search.to_lowercase();
                let matched: Vec<NormalizedSubmission> = batch
                    .items
                    .into_iter()
                    .filter(|s| matches_search(s, &needle, SearchScope::AllFields))
                    .collect();
                let total = matched.len();
                raw.with_items(matched, total)
            }
            _ => raw.with_items(batch.items, backend_total.saturating_sub(batch.dropped)),
        };

        Ok(NormalizedPage {
            result,
            dropped: batch.dropped,
        })
    }

    /// Queries a collection and normalizes its rows.
    pub async fn query_items(
        &self,
        options: &QueryOptions,
    ) -> Result<NormalizedPage<NormalizedItem>, GatewayError> {
        expect_kind(options, SourceKind::Collection)?;
        let raw = self.query(options).await?;
        let batch = normalize_items(&raw.items);
        let backend_total = raw.total_count;

        let result = match &options.search_query {
            Some(search) if !self.collections.supports_contains() => {
                let needle = search.to_lowercase();
                let matched: Vec<NormalizedItem> = batch
                    .items
                    .into_iter()
                    .filter(|item| fields_contain(item, &needle, SearchScope::AllFields))
                    .collect();
                let total = matched.len();
                raw.with_items(matched, total)
            }
            _ => raw.with_items(batch.items, backend_total.saturating_sub(batch.dropped)),
        };

        Ok(NormalizedPage {
            result,
            dropped: batch.dropped,
        })
    }

    /// Collections the backend knows, as listed.
    pub async fn collection_ids(&self) -> Result<Vec<CollectionMeta>, GatewayError> {
        self.collections.list_collections().await.map_err(|error| {
            tracing::warn!(error = %error, "Collection listing failed");
            GatewayError::Backend {
                source_id: "collections".to_string(),
                error,
            }
        })
    }

    /// Every listed collection with its row count, largest first.
    ///
    /// A collection whose count fails is kept with a count of `0`.
    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>, GatewayError> {
        let listed = self.collection_ids().await?;
        let mut summaries = Vec::with_capacity(listed.len());

        for meta in listed {
            let options = QueryOptions::collection(meta.id.as_str()).with_limit(1);
            let item_count = match self.query(&options).await {
                Ok(page) => page.total_count,
                Err(e) => {
                    tracing::warn!(collection = %meta.id, error = %e, "Collection count failed");
                    0
                }
            };
            summaries.push(CollectionSummary {
                display_name: meta.display_name.unwrap_or_else(|| meta.id.clone()),
                collection_id: meta.id,
                item_count,
            });
        }

        summaries.sort_by(|a, b| b.item_count.cmp(&a.item_count));
        Ok(summaries)
    }
}

fn expect_kind(options: &QueryOptions, kind: SourceKind) -> Result<(), GatewayError> {
    if options.source.kind() == kind {
        return Ok(());
    }
    Err(GatewayError::WrongSourceKind {
        source_id: options.source.id().to_string(),
        expected: match kind {
            SourceKind::Namespace => "namespace",
            SourceKind::Collection => "collection",
        },
    })
}

/// Creates the gateway described by `[backend]` and `[query]`.
pub fn build_gateway(config: &Config) -> Result<QueryGateway> {
    let settings = GatewaySettings::from(&config.query);
    let gateway = match config.backend.kind {
        BackendKind::Memory => {
            let path = config
                .backend
                .fixture
                .as_deref()
                .context("backend.fixture is required for the memory backend")?;
            QueryGateway::from_backend(Arc::new(InMemoryBackend::from_fixture(path)?))
        }
        BackendKind::Http => {
            let base_url = config
                .backend
                .base_url
                .as_deref()
                .context("backend.base_url is required for the http backend")?;
            let backend = HttpBackend::new(base_url, config.backend.timeout_secs)
                .context("Failed to build HTTP backend")?;
            QueryGateway::from_backend(Arc::new(backend))
        }
    };
    Ok(gateway.with_settings(settings))
}

/// `formdeck items <collection>`: prints one page of collection rows.
pub async fn run_items(
    config: &Config,
    collection_id: &str,
    limit: Option<usize>,
    search: Option<String>,
) -> Result<()> {
    let gateway = build_gateway(config)?;
    let mut options = QueryOptions::collection(collection_id).with_search(search);
    if let Some(limit) = limit {
        options = options.with_limit(limit);
    }

    let page = gateway.query(&options).await?;
    let dropped = normalize_items(&page.items).dropped;
    let columns = extract_collection_field_order(&page.items, MAX_CUSTOM_COLUMNS);

    if page.items.is_empty() {
        println!("No items in {}.", collection_id);
        return Ok(());
    }

    let types: Vec<_> = columns
        .iter()
        .map(|c| infer_type(c, &page.items))
        .collect();

    let header: Vec<String> = columns.iter().map(|c| format!("{:<20}", c)).collect();
    println!("{}", header.join(" "));
    println!("{}", "-".repeat(21 * columns.len()));
    for item in &page.items {
        let cells: Vec<String> = columns
            .iter()
            .zip(&types)
            .map(|(c, t)| {
                let text: String = format_value(item.get(c), *t).chars().take(20).collect();
                format!("{:<20}", text)
            })
            .collect();
        println!("{}", cells.join(" "));
    }
    println!();
    println!(
        "{} of {} items{}",
        page.items.len(),
        page.total_count,
        if dropped > 0 {
            format!(" ({} without _id)", dropped)
        } else {
            String::new()
        }
    );
    if let Some(next) = &page.cursors.next {
        println!("Next cursor: {}", next);
    }
    Ok(())
}

/// `formdeck collections`: lists every collection with its row count.
pub async fn run_collections(config: &Config) -> Result<()> {
    let gateway = build_gateway(config)?;
    let collections = gateway.list_collections().await?;

    if collections.is_empty() {
        println!("No collections.");
        return Ok(());
    }

    println!("{:<32} {:<32} {:>8}", "COLLECTION", "NAME", "ITEMS");
    for summary in &collections {
        println!(
            "{:<32} {:<32} {:>8}",
            summary.collection_id, summary.display_name, summary.item_count
        );
    }
    println!();
    println!("{} collections", collections.len());
    Ok(())
}
