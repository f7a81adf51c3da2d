//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IDirectoryConnector`] / [`IDirectorySession`] - Directory bind, search and modify
//! - [`IUserStore`] - Local user records and metadata
//! - [`IReportSink`] - Persistent history of finished batches
//! - [`IExecutionLimit`] - Platform ceiling on process run time

pub mod directory;
pub mod execution_limit;
pub mod report_sink;
pub mod user_store;

pub use directory::{IDirectoryConnector, IDirectorySession, SearchFilter, SearchRequest};
pub use execution_limit::IExecutionLimit;
pub use report_sink::IReportSink;
pub use user_store::{IUserStore, UserFilter};
