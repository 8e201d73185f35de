//! # formdeck
//!
//! Turns schema-less, heterogeneous records (form submissions from many
//! unrelated namespaces and CMS collection rows with arbitrary field sets)
//! into a uniform, typed, paginated, filterable view model.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌────────────┐   ┌────────────┐
//! │ Discovery  │──▶│   Query     │──▶│ Normalizer │──▶│ Classifier │
//! │ (throttled)│   │  Gateway    │   │ (validate) │   │ type+stats │
//! └────────────┘   └──────┬──────┘   └────────────┘   └─────┬──────┘
//!                         │                                 ▼
//!              ┌──────────┴─────────┐               ┌──────────────┐
//!              ▼                    ▼               │ Table Engine │
//!      ┌──────────────┐    ┌───────────────┐        │ search/sort  │
//!      │ Submission   │    │  Collection   │        └──────┬───────┘
//!      │ backend      │    │  backend      │               ▼
//!      └──────────────┘    └───────────────┘        CLI / HTTP API
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! formdeck discover                         # probe configured namespaces
//! formdeck forms wix.form_app.form          # per-form summaries
//! formdeck submissions wix.form_app.form --search john
//! formdeck fields wix.form_app.form         # inferred types and statistics
//! formdeck serve                            # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Backend, gateway, and validation errors |
//! | [`backend`] | Backend contracts and native query shape |
//! | [`backend_memory`] | In-memory fixture backend |
//! | [`backend_http`] | JSON-over-HTTP backend |
//! | [`gateway`] | Uniform cursor-pagination query contract |
//! | [`normalize`] | Record validation and normalization |
//! | [`classify`] | Field type inference, statistics, cell classification |
//! | [`fields`] | Field descriptor registry |
//! | [`discovery`] | Sequential source discovery |
//! | [`throttle`] | Inter-probe rate gate |
//! | [`forms`] | Per-form summaries |
//! | [`table`] | In-memory filter, search, sort, and paging |
//! | [`server`] | HTTP API |

pub mod backend;
pub mod backend_http;
pub mod backend_memory;
pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fields;
pub mod forms;
pub mod gateway;
pub mod models;
pub mod normalize;
pub mod server;
pub mod table;
pub mod throttle;
