use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::discovery::Candidate;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Fixture file for the memory backend.
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    /// Query service root for the http backend.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    #[serde(default = "default_search_window")]
    pub search_window: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            search_window: default_search_window(),
        }
    }
}

fn default_limit() -> usize {
    50
}
fn default_max_limit() -> usize {
    200
}
fn default_search_window() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_probe_limit")]
    pub probe_limit: usize,
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_namespaces")]
    pub namespaces: Vec<NamespaceEntry>,
    #[serde(default)]
    pub collections: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_limit: default_probe_limit(),
            probe_interval_ms: default_probe_interval_ms(),
            namespaces: default_namespaces(),
            collections: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
}

fn default_probe_limit() -> usize {
    100
}
fn default_probe_interval_ms() -> u64 {
    100
}

/// Submission namespaces probed when the config lists none.
pub const KNOWN_NAMESPACES: [(&str, &str); 16] = [
    ("wix.form_app.form", "New Forms"),
    ("wix.site.form", "Legacy Site Forms"),
    ("wix.contacts.form", "Contact Forms"),
    ("wix.bookings.form", "Bookings"),
    ("wix.events.form", "Events"),
    ("wix.stores.form", "Stores"),
    ("wix.pro_gallery.form", "Pro Gallery"),
    ("wix.blog.form", "Blog"),
    ("wix.members.form", "Members"),
    ("wix.marketing.form", "Marketing"),
    ("wix.automation.form", "Automation"),
    ("wix.crm.form", "CRM"),
    ("forms", "Generic Forms"),
    ("site.forms", "Site Forms"),
    ("standalone.forms", "Standalone Forms"),
    ("custom.forms", "Custom Forms"),
];

fn default_namespaces() -> Vec<NamespaceEntry> {
    KNOWN_NAMESPACES
        .iter()
        .map(|(id, label)| NamespaceEntry {
            id: id.to_string(),
            label: Some(label.to_string()),
        })
        .collect()
}

/// Display label for a namespace id, "Unknown" when it is not a known one.
pub fn namespace_label(id: &str) -> &'static str {
    KNOWN_NAMESPACES
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, label)| *label)
        .unwrap_or("Unknown")
}

impl DiscoveryConfig {
    /// Namespaces first, then collections, in configured order.
    pub fn candidates(&self) -> Vec<Candidate> {
        let namespaces = self.namespaces.iter().map(|ns| {
            let label = ns
                .label
                .clone()
                .unwrap_or_else(|| namespace_label(&ns.id).to_string());
            Candidate::namespace(ns.id.clone(), label)
        });
        let collections = self.collections.iter().map(Candidate::collection);
        namespaces.chain(collections).collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate query
    if !(1..=200).contains(&config.query.max_limit) {
        anyhow::bail!("query.max_limit must be in [1, 200]");
    }
    if config.query.default_limit < 1 || config.query.default_limit > config.query.max_limit {
        anyhow::bail!(
            "query.default_limit must be in [1, {}]",
            config.query.max_limit
        );
    }
    if !(1..=200).contains(&config.query.search_window) {
        anyhow::bail!("query.search_window must be in [1, 200]");
    }

    // Validate discovery
    if config.discovery.probe_limit < 1 {
        anyhow::bail!("discovery.probe_limit must be >= 1");
    }
    if let Some(ns) = config.discovery.namespaces.iter().find(|ns| ns.id.trim().is_empty()) {
        anyhow::bail!("discovery.namespaces entry has an empty id (label {:?})", ns.label);
    }

    // Validate backend
    match config.backend.kind {
        BackendKind::Memory if config.backend.fixture.is_none() => {
            anyhow::bail!("backend.fixture must be set when kind is 'memory'")
        }
        BackendKind::Http if config.backend.base_url.is_none() => {
            anyhow::bail!("backend.base_url must be set when kind is 'http'")
        }
        _ => {}
    }
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [backend]
            fixture = "data/fixture.json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.query.default_limit, 50);
        assert_eq!(config.query.max_limit, 200);
        assert_eq!(config.discovery.probe_interval_ms, 100);
        assert_eq!(config.discovery.namespaces.len(), 16);

        let candidates = config.discovery.candidates();
        assert_eq!(candidates[0], Candidate::namespace("wix.form_app.form", "New Forms"));
    }

    #[test]
    fn test_custom_candidates() {
        let config = parse(
            r#"
            [backend]
            kind = "http"
            base_url = "http://localhost:8080"

            [discovery]
            collections = ["Products"]

            [[discovery.namespaces]]
            id = "wix.blog.form"

            [[discovery.namespaces]]
            id = "team.forms"
            label = "Team"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.discovery.candidates(),
            vec![
                Candidate::namespace("wix.blog.form", "Blog"),
                Candidate::namespace("team.forms", "Team"),
                Candidate::collection("Products"),
            ]
        );
    }

    #[test]
    fn test_rejects_bad_limits_and_backend() {
        let err = parse(
            r#"
            [backend]
            fixture = "f.json"
            [query]
            max_limit = 500
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_limit"));

        let err = parse(
            r#"
            [backend]
            fixture = "f.json"
            [query]
            default_limit = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("default_limit"));

        let err = parse(
            r#"
            [backend]
            fixture = "f.json"
            [query]
            search_window = 1000
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("search_window"));

        let err = parse(
            r#"
            [backend]
            kind = "http"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let err = load_config(Path::new("/nonexistent/formdeck.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
