//! Source discovery.
//!
//! Probes an injected list of candidate namespaces and collections, one at a
//! time, and reports which of them hold records. Probes go through the
//! [`QueryGateway`] with a small page (`probe_limit`). A [`Throttle`] gate is
//! awaited before every probe and a [`CancellationToken`] is checked around
//! it, so a long scan can be stopped with the partial result intact.
//!
//! A failing probe never aborts the scan: the error lands in the report and
//! discovery moves on to the next candidate.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::gateway::{build_gateway, QueryGateway};
use crate::models::{QueryOptions, SourceKind, SourceRef, SourceSummary};
use crate::throttle::{IntervalGate, Throttle};

/// Something discovery may probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidate {
    Namespace { id: String, label: String },
    Collection { id: String },
}

impl Candidate {
    pub fn namespace(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Namespace {
            id: id.into(),
            label: label.into(),
        }
    }

    pub fn collection(id: impl Into<String>) -> Self {
        Self::Collection { id: id.into() }
    }

    pub fn source(&self) -> SourceRef {
        match self {
            Self::Namespace { id, .. } => SourceRef::Namespace(id.clone()),
            Self::Collection { id } => SourceRef::Collection(id.clone()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Namespace { label, .. } => label,
            Self::Collection { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ProbeOutcome {
    Found { records: usize, forms: usize },
    Empty,
    Failed { error: String },
}

/// What happened when one candidate was probed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub source_id: String,
    pub kind: SourceKind,
    #[serde(flatten)]
    pub outcome: ProbeOutcome,
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ProbeOutcome::Found { records, forms } if self.kind == SourceKind::Namespace => {
                write!(
                    f,
                    "found   {}: {} records in {} forms",
                    self.source_id, records, forms
                )
            }
            ProbeOutcome::Found { records, .. } => {
                write!(f, "found   {}: {} items", self.source_id, records)
            }
            ProbeOutcome::Empty => write!(f, "empty   {}", self.source_id),
            ProbeOutcome::Failed { error } => write!(f, "failed  {}: {}", self.source_id, error),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryResult {
    /// Non-empty sources, in probe order.
    pub found: Vec<SourceSummary>,
    pub report: Vec<ProbeReport>,
    pub cancelled: bool,
}

/// Distinct values, first-seen order kept.
fn dedup_ordered<'a>(ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

pub struct SourceDiscovery {
    gateway: Arc<QueryGateway>,
    throttle: Arc<dyn Throttle>,
    probe_limit: usize,
}

impl SourceDiscovery {
    pub fn new(gateway: Arc<QueryGateway>, throttle: Arc<dyn Throttle>) -> Self {
        Self {
            gateway,
            throttle,
            probe_limit: 100,
        }
    }

    pub fn with_probe_limit(mut self, probe_limit: usize) -> Self {
        self.probe_limit = probe_limit.max(1);
        self
    }

    /// Builds discovery from `[discovery]`, sharing `gateway`.
    pub fn from_config(config: &Config, gateway: Arc<QueryGateway>) -> Self {
        let throttle = Arc::new(IntervalGate::from_millis(config.discovery.probe_interval_ms));
        Self::new(gateway, throttle).with_probe_limit(config.discovery.probe_limit)
    }

    /// Probes `candidates` in order until done or cancelled.
    pub async fn discover(
        &self,
        candidates: &[Candidate],
        cancel: &CancellationToken,
    ) -> DiscoveryResult {
        let mut result = DiscoveryResult::default();

        for candidate in candidates {
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    result.cancelled = true;
                    break;
                }
                _ = self.throttle.ready() => {}
            }

            let (report, summary) = self.probe(candidate).await;
            tracing::debug!(source = %report.source_id, "{}", report);
            result.report.push(report);
            if let Some(summary) = summary {
                result.found.push(summary);
            }
        }

        if result.cancelled {
            tracing::info!(
                probed = result.report.len(),
                remaining = candidates.len() - result.report.len(),
                "Discovery cancelled"
            );
        } else {
            tracing::info!(
                probed = result.report.len(),
                found = result.found.len(),
                "Discovery complete"
            );
        }
        result
    }

    async fn probe(&self, candidate: &Candidate) -> (ProbeReport, Option<SourceSummary>) {
        let source = candidate.source();
        let options = QueryOptions::new(source.clone()).with_limit(self.probe_limit);

        let probed = match &source {
            SourceRef::Namespace(_) => self.gateway.query_submissions(&options).await.map(|page| {
                let forms = dedup_ordered(page.result.items.iter().map(|s| s.source_id.as_str()));
                (page.result.items.len(), forms)
            }),
            SourceRef::Collection(_) => self
                .gateway
                .query_items(&options)
                .await
                .map(|page| (page.result.total_count, Vec::new())),
        };

        let (outcome, summary) = match probed {
            Err(e) => {
                tracing::warn!(source = %source, error = %e, "Probe failed");
                (
                    ProbeOutcome::Failed {
                        error: e.to_string(),
                    },
                    None,
                )
            }
            Ok((0, _)) => (ProbeOutcome::Empty, None),
            Ok((records, secondary_ids)) => (
                ProbeOutcome::Found {
                    records,
                    forms: secondary_ids.len(),
                },
                Some(SourceSummary {
                    source_id: source.id().to_string(),
                    kind: source.kind(),
                    label: candidate.label().to_string(),
                    record_count: records,
                    secondary_ids,
                }),
            ),
        };

        (
            ProbeReport {
                source_id: source.id().to_string(),
                kind: source.kind(),
                outcome,
            },
            summary,
        )
    }
}

/// The configured candidates. When `[discovery].collections` is empty, every
/// collection the backend lists is probed instead; a failed listing only
/// drops the collections.
pub async fn resolve_candidates(config: &Config, gateway: &QueryGateway) -> Vec<Candidate> {
    let mut candidates = config.discovery.candidates();
    if config.discovery.collections.is_empty() {
        match gateway.collection_ids().await {
            Ok(listed) => {
                candidates.extend(listed.into_iter().map(|meta| Candidate::collection(meta.id)))
            }
            Err(e) => tracing::warn!(error = %e, "Could not list collections, probing namespaces only"),
        }
    }
    candidates
}

/// `formdeck discover`: probes the configured candidates. Ctrl-C stops the
/// scan and prints what was found so far.
pub async fn run_discover(config: &Config) -> Result<()> {
    let gateway = Arc::new(build_gateway(config)?);
    let candidates = resolve_candidates(config, &gateway).await;
    let discovery = SourceDiscovery::from_config(config, gateway);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    println!("Probing {} sources...", candidates.len());
    let result = discovery.discover(&candidates, &cancel).await;
    cancel.cancel();

    for line in &result.report {
        println!("  {}", line);
    }
    println!();

    if result.found.is_empty() {
        println!("No sources with records found.");
    } else {
        println!("{:<24} {:<12} {:<20} {:>8}  FORMS", "SOURCE", "KIND", "LABEL", "RECORDS");
        for summary in &result.found {
            println!(
                "{:<24} {:<12} {:<20} {:>8}  {}",
                summary.source_id,
                summary.kind.to_string(),
                summary.label,
                summary.record_count,
                summary.secondary_ids.len()
            );
        }
    }
    if result.cancelled {
        println!();
        println!(
            "Cancelled after {} of {} sources.",
            result.report.len(),
            candidates.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        CollectionBackend, CollectionMeta, NativePage, NativeQuery, SubmissionBackend,
    };
    use crate::backend_memory::InMemoryBackend;
    use crate::error::BackendError;
    use crate::models::RawRecord;
    use crate::throttle::Unthrottled;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Memory backend that fails every query on one namespace.
    struct FailingOn {
        namespace: &'static str,
        inner: InMemoryBackend,
    }

    #[async_trait]
    impl SubmissionBackend for FailingOn {
        fn name(&self) -> &str {
            "failing"
        }

        async fn find(&self, query: &NativeQuery) -> Result<NativePage, BackendError> {
            if query.eq.iter().any(|p| p.value == json!(self.namespace)) {
                return Err(BackendError::Transport("connection reset".into()));
            }
            SubmissionBackend::find(&self.inner, query).await
        }
    }

    #[async_trait]
    impl CollectionBackend for FailingOn {
        fn name(&self) -> &str {
            "failing"
        }

        async fn find(
            &self,
            collection_id: &str,
            query: &NativeQuery,
        ) -> Result<NativePage, BackendError> {
            CollectionBackend::find(&self.inner, collection_id, query).await
        }

        async fn list_collections(&self) -> Result<Vec<CollectionMeta>, BackendError> {
            self.inner.list_collections().await
        }
    }

    fn submission(id: &str, namespace: &str, form_id: &str) -> RawRecord {
        let value: Value = json!({
            "_id": id,
            "formId": form_id,
            "namespace": namespace,
            "_createdDate": "2024-05-01T12:00:00Z",
        });
        value.as_object().cloned().unwrap()
    }

    fn gateway() -> Arc<QueryGateway> {
        let inner = InMemoryBackend::new()
            .with_submissions(vec![
                submission("a", "ns2", "f1"),
                submission("b", "ns2", "f2"),
                submission("c", "ns2", "f1"),
                submission("d", "ns1", "f9"),
            ])
            .with_collection("Products", vec![json!({"_id": "p1"}).as_object().cloned().unwrap()]);
        Arc::new(QueryGateway::from_backend(Arc::new(FailingOn {
            namespace: "ns1",
            inner,
        })))
    }

    fn candidates() -> Vec<Candidate> {
        vec![
            Candidate::namespace("ns1", "First"),
            Candidate::namespace("ns2", "Second"),
            Candidate::namespace("ns3", "Third"),
            Candidate::collection("Products"),
        ]
    }

    #[tokio::test]
    async fn test_failed_probe_does_not_stop_scan() {
        let discovery = SourceDiscovery::new(gateway(), Arc::new(Unthrottled));
        let result = discovery
            .discover(&candidates()[..2], &CancellationToken::new())
            .await;

        assert!(!result.cancelled);
        assert_eq!(result.found.len(), 1);
        let ns2 = &result.found[0];
        assert_eq!(ns2.source_id, "ns2");
        assert_eq!(ns2.label, "Second");
        assert_eq!(ns2.record_count, 3);
        assert_eq!(ns2.secondary_ids, vec!["f1", "f2"]);

        assert_eq!(result.report.len(), 2);
        assert!(matches!(result.report[0].outcome, ProbeOutcome::Failed { .. }));
        assert_eq!(
            result.report[1].outcome,
            ProbeOutcome::Found {
                records: 3,
                forms: 2
            }
        );
    }

    #[tokio::test]
    async fn test_empty_sources_are_reported_not_found() {
        let discovery = SourceDiscovery::new(gateway(), Arc::new(Unthrottled));
        let result = discovery
            .discover(&candidates(), &CancellationToken::new())
            .await;

        let found: Vec<&str> = result.found.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(found, vec!["ns2", "Products"]);
        assert_eq!(result.report[2].outcome, ProbeOutcome::Empty);
        assert_eq!(result.found[1].kind, SourceKind::Collection);
        assert!(result.report[2].to_string().starts_with("empty"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start_probes_nothing() {
        let discovery = SourceDiscovery::new(gateway(), Arc::new(Unthrottled));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = discovery.discover(&candidates(), &cancel).await;
        assert!(result.cancelled);
        assert!(result.report.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_throttle_returns_partial_result() {
        let discovery = SourceDiscovery::new(gateway(), Arc::new(IntervalGate::from_millis(1_000)));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_500)).await;
            trigger.cancel();
        });

        let result = discovery.discover(&candidates(), &cancel).await;
        assert!(result.cancelled);
        // probes at t=0 and t=1000; the third waits until t=2000
        assert_eq!(result.report.len(), 2);
        assert_eq!(result.found.len(), 1);
    }

    #[tokio::test]
    async fn test_listed_collections_fill_in_when_none_configured() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            fixture = "unused.json"

            [[discovery.namespaces]]
            id = "ns2"
            "#,
        )
        .unwrap();
        let candidates = resolve_candidates(&config, &gateway()).await;
        assert_eq!(
            candidates,
            vec![
                Candidate::namespace("ns2", "Unknown"),
                Candidate::collection("Products"),
            ]
        );

        let config: Config = toml::from_str(
            r#"
            [backend]
            fixture = "unused.json"

            [discovery]
            collections = ["Recipes"]

            [[discovery.namespaces]]
            id = "ns2"
            "#,
        )
        .unwrap();
        let candidates = resolve_candidates(&config, &gateway()).await;
        assert_eq!(candidates[1], Candidate::collection("Recipes"));
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_dedup_keeps_first_seen_order() {
        assert_eq!(dedup_ordered(["b", "a", "b", "c", "a"]), vec!["b", "a", "c"]);
    }
}
