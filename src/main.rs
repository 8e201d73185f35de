//! # formdeck CLI
//!
//! Browse form submissions and CMS collections from the terminal, or serve
//! them over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! formdeck --config ./config/formdeck.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `formdeck discover` | Probe configured namespaces and collections |
//! | `formdeck forms <namespace>` | Per-form summaries of a namespace |
//! | `formdeck submissions <namespace>` | Search, filter, sort, and page submissions |
//! | `formdeck fields <namespace>` | Inferred field types and statistics |
//! | `formdeck items <collection>` | One page of collection rows |
//! | `formdeck collections` | Every collection with its row count |
//! | `formdeck serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Which namespaces have data?
//! formdeck discover
//!
//! # Confirmed submissions of one form mentioning "john", oldest first
//! formdeck submissions wix.form_app.form --form-id 0c1d... --status confirmed \
//!     --search john --order asc
//!
//! # Verbose logging
//! RUST_LOG=formdeck=debug formdeck forms wix.form_app.form
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use formdeck::models::{SortOrder, SubmissionStatus};
use formdeck::table::{SubmissionListing, DEFAULT_ROWS_PER_PAGE};
use formdeck::{config, discovery, fields, forms, gateway, server, table};

/// formdeck: a typed, paginated view over schema-less form submissions and
/// CMS collections.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/formdeck.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "formdeck",
    about = "Typed, paginated views over form submissions and CMS collections",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/formdeck.toml")]
    config: PathBuf,

    /// Log filter used when `RUST_LOG` is not set (e.g. `info`, `formdeck=debug`).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Probe every configured namespace and collection for records.
    ///
    /// Probes run one at a time with `[discovery].probe_interval_ms` between
    /// them. Ctrl-C stops the scan and prints the partial result.
    Discover,

    /// List the forms of a namespace with submission counts.
    Forms {
        /// Submission namespace (e.g. `wix.form_app.form`).
        namespace: String,
    },

    /// Show one page of submissions as a table.
    Submissions {
        namespace: String,

        /// Only submissions of this form.
        #[arg(long)]
        form_id: Option<String>,

        /// Status filter: confirmed, pending, payment_waiting, payment_canceled, unknown.
        #[arg(long)]
        status: Option<SubmissionStatus>,

        /// Backend page size (clamped to `[query].max_limit`).
        #[arg(long)]
        limit: Option<usize>,

        /// Resume from a cursor printed by a previous call.
        #[arg(long)]
        cursor: Option<String>,

        /// Case-insensitive substring search over id, status, and fields.
        #[arg(long)]
        search: Option<String>,

        /// Sort key: createdAt, updatedAt, status, or any field name.
        #[arg(long)]
        sort_by: Option<String>,

        /// Sort order: asc or desc.
        #[arg(long, default_value = "desc")]
        order: SortOrder,

        /// Table page to print (1-based).
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Rows per table page.
        #[arg(long, default_value_t = DEFAULT_ROWS_PER_PAGE)]
        rows: usize,
    },

    /// Show inferred types and statistics for every field of a namespace.
    Fields {
        namespace: String,

        #[arg(long)]
        form_id: Option<String>,
    },

    /// List every collection the backend knows, largest first.
    Collections,

    /// Show one page of a CMS collection.
    Items {
        collection: String,

        #[arg(long)]
        limit: Option<usize>,

        /// Searched in title, name, and description.
        #[arg(long)]
        search: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Discover => {
            discovery::run_discover(&cfg).await?;
        }
        Commands::Forms { namespace } => {
            forms::run_forms(&cfg, &namespace).await?;
        }
        Commands::Submissions {
            namespace,
            form_id,
            status,
            limit,
            cursor,
            search,
            sort_by,
            order,
            page,
            rows,
        } => {
            let listing = SubmissionListing {
                form_id,
                status,
                limit,
                cursor,
                search,
                sort_by,
                order,
                page,
                rows,
            };
            table::run_submissions(&cfg, &namespace, listing).await?;
        }
        Commands::Fields { namespace, form_id } => {
            fields::run_fields(&cfg, &namespace, form_id.as_deref()).await?;
        }
        Commands::Collections => {
            gateway::run_collections(&cfg).await?;
        }
        Commands::Items {
            collection,
            limit,
            search,
        } => {
            gateway::run_items(&cfg, &collection, limit, search).await?;
        }
    }

    Ok(())
}
