//! Backend contracts.
//!
//! The core never speaks a backend's wire protocol. It builds a
//! [`NativeQuery`] (equality predicates, an any-of `contains` group, one sort
//! clause, a limit and an opaque `skip_to` cursor) and hands it to one of two
//! trait objects:
//!
//! ```text
//!                 ┌──────────────────────┐
//!  QueryGateway ─▶│ SubmissionBackend    │  namespaced submissions
//!                 │  eq / sort / skip_to │  (no text search)
//!                 └──────────────────────┘
//!                 ┌──────────────────────┐
//!               ─▶│ CollectionBackend    │  keyed CMS collections
//!                 │  sort / contains     │  (total count probe)
//!                 └──────────────────────┘
//! ```
//!
//! Built-in implementations: [`InMemoryBackend`](crate::backend_memory::InMemoryBackend)
//! and [`HttpBackend`](crate::backend_http::HttpBackend).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;
use crate::models::{Cursors, RawRecord, SortOrder};

/// An equality predicate on one backend property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqPredicate {
    pub field: String,
    pub value: Value,
}

/// A case-insensitive substring predicate on one backend property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainsPredicate {
    pub field: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortClause {
    pub field: String,
    pub order: SortOrder,
}

/// Backend-neutral query, translated by each adapter into its own syntax.
///
/// All `eq` predicates must hold; when `contains_any` is non-empty at least
/// one of its predicates must hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeQuery {
    pub eq: Vec<EqPredicate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains_any: Vec<ContainsPredicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortClause>,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_to: Option<String>,
}

impl NativeQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            eq: Vec::new(),
            contains_any: Vec::new(),
            sort: None,
            limit,
            skip_to: None,
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.eq.push(EqPredicate {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn contains(mut self, field: impl Into<String>, text: impl Into<String>) -> Self {
        self.contains_any.push(ContainsPredicate {
            field: field.into(),
            text: text.into(),
        });
        self
    }

    pub fn ascending(self, field: impl Into<String>) -> Self {
        self.sort_by(field, SortOrder::Asc)
    }

    pub fn descending(self, field: impl Into<String>) -> Self {
        self.sort_by(field, SortOrder::Desc)
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort = Some(SortClause {
            field: field.into(),
            order,
        });
        self
    }

    pub fn skip_to(mut self, cursor: impl Into<String>) -> Self {
        self.skip_to = Some(cursor.into());
        self
    }
}

/// One page as returned by a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativePage {
    pub items: Vec<RawRecord>,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_prev: bool,
    #[serde(default)]
    pub cursors: Cursors,
    /// Total matches across all pages, when the backend can count them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

/// Source of namespaced form submissions.
///
/// Offers equality filters, ascending/descending sort on system properties,
/// `limit`, forward cursors via `skip_to`, and `has_next`/`has_prev` probes.
#[async_trait]
pub trait SubmissionBackend: Send + Sync {
    /// Short identifier used in logs (e.g. `"memory"`, `"http"`).
    fn name(&self) -> &str;

    /// Whether `contains_any` predicates are honoured. Defaults to `false`:
    /// text search over submissions is done client-side.
    fn supports_contains(&self) -> bool {
        false
    }

    async fn find(&self, query: &NativeQuery) -> Result<NativePage, BackendError>;
}

/// A collection as listed by its backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Source of keyed CMS collection rows.
///
/// Offers ascending/descending sort on any key, `limit`, optional `contains`
/// text filters, a total-count probe, and a listing of its collections.
#[async_trait]
pub trait CollectionBackend: Send + Sync {
    fn name(&self) -> &str;

    fn supports_contains(&self) -> bool {
        true
    }

    async fn find(
        &self,
        collection_id: &str,
        query: &NativeQuery,
    ) -> Result<NativePage, BackendError>;

    async fn list_collections(&self) -> Result<Vec<CollectionMeta>, BackendError>;
}
