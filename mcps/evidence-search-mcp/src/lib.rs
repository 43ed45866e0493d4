//! Evidence Search MCP Library
//!
//! Turns a search strategy (keywords, backends, locale, date window, entities)
//! into throttled searches across several web search backends and
//! consolidates what comes back into one ranked, deduplicated list.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use evidence_search_mcp::{Config, SearchOrchestrator, SearchStrategy, HttpTransport, CallMonitor};
//!
//! let config = Config::load()?;
//! let transport = HttpTransport::new(&config.transport)?;
//! let orchestrator = SearchOrchestrator::with_transport(&config, transport, CallMonitor::new());
//!
//! let strategy = SearchStrategy::new(["Acme Corp partnership"]).with_backends(["google", "bing"]);
//! let outcome = orchestrator.investigate(&strategy).await?;
//! ```
//!
//! # Configuration
//! Set `EVIDENCE_SEARCH_CONFIG_PATH` or configure in `~/.binks/evidence-search.toml`

pub mod backends;
pub mod config;
pub mod consolidator;
pub mod credentials;
pub mod error;
pub mod monitor;
pub mod orchestrator;
pub mod planner;
pub mod scheduler;
pub mod server;
pub mod types;

pub use backends::{BackendAdapter, HttpTransport, SearchAdapter, Transport};
pub use config::Config;
pub use consolidator::{normalize_url, ResultConsolidator};
pub use credentials::{BatchProgress, CredentialQueues};
pub use error::{SearchError, SearchResult};
pub use monitor::CallMonitor;
pub use orchestrator::{InvestigationOutcome, SearchOrchestrator};
pub use planner::TaskPlanner;
pub use scheduler::{ExecutionReport, Scheduler};
pub use server::EvidenceSearchMcpServer;
pub use types::{
    CanonicalResult, ConsolidatedResult, DateRange, EntityProfile, ExecutionSummary, SearchStrategy, SearchTask,
    YearMonth,
};
