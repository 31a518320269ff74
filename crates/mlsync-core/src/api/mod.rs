//! Marketplace API access: operations, headers, the resilient orchestrator
//! and the typed client built on it.

pub mod client;
pub mod headers;
pub mod models;
pub mod operation;
pub mod orchestrator;

pub use client::MarketClient;
pub use models::{ItemDetail, ItemSummary, Paging, SearchPage};
pub use operation::{Operation, SearchQuery};
pub use orchestrator::{
    ApiResponse, Endpoint, OperationResult, Orchestrator, RequestAttempt, RequestMode,
};
