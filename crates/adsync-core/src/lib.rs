//! adsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `DirectoryPrincipal`, `LocalUser`, `ConnectionDetails`, `BatchReport`
//! - **Typed keys** - `ObjectGuid`, `LocalUserId`, `AttributeName`, `LocalField`, `MetaKey`
//! - **Port definitions** - Traits for adapters: `IDirectoryConnector`, `IUserStore`,
//!   `IReportSink`, `IExecutionLimit`
//! - **Configuration** - YAML-backed `Config` with validation
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement; the
//! synchronization engine in `adsync-sync` drives them.

pub mod config;
pub mod domain;
pub mod ports;
