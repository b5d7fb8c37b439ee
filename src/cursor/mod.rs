//! Cursor workspace stores: discovery and read-only queries.
//!
//! The IDE keeps one SQLite `state.vscdb` per workspace plus a shared global
//! one. [`StoreRegistry`] finds them; [`QueryEngine`] reads them.

pub mod query;
pub mod registry;
pub mod store;

pub use query::{QueryEngine, QueryRecord, QueryRequest, QueryType};
pub use registry::{
    DiscoveryOutcome, DiscoveryReport, DiscoverySources, ProjectListing, ProjectRecord,
    RefreshSummary, StoreRegistry,
};
pub use store::{StoreTable, StoredValue};
