//! adsync - Synchronization engine for advertising account hierarchies.
//!
//! Mirrors ad accounts, campaigns, ad sets and ads from the Graph API into a
//! relational store, one connection (OAuth grant) at a time.
//!
//! # Features
//!
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//! - `server` - The HTTP trigger surface in [`server`].
//! - `redis` - A Redis-backed [`kv::KeyValueStore`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use adsync::{connect_and_migrate, kv::DatabaseStore, sync::{SyncOrchestrator, SyncQueue}};
//!
//! let db = Arc::new(connect_and_migrate("sqlite://adsync.db?mode=rwc").await?);
//! let store = Arc::new(DatabaseStore::new(Arc::clone(&db)));
//! let orchestrator = Arc::new(SyncOrchestrator::new(db, store, transport, graph_config));
//!
//! let queue = SyncQueue::start(orchestrator);
//! queue.handle().enqueue(connection_id, adsync::sync::chain_plan())?;
//! queue.shutdown().await;
//! ```

pub mod cooldown;
pub mod dates;
pub mod db;
pub mod entity;
pub mod graph;
pub mod http;
pub mod insights;
pub mod kv;
pub mod oauth;
pub mod repository;
pub mod retry;
pub mod status;
pub mod sync;
pub mod trigger;

#[cfg(feature = "migrate")]
pub mod migration;

#[cfg(feature = "server")]
pub mod server;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use repository::RepositoryError;
