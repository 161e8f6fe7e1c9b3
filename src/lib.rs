// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An audit-grade event store and analysis engine for Kubernetes cluster
//! state.
//!
//! Spectre continuously ingests resource CREATE/UPDATE/DELETE
//! notifications, persists them in a compact append-only format organized
//! by wall-clock hour, and answers time-bounded filtered queries that
//! reconstruct both the stream of events in a window and the final state
//! of every resource that existed at any point in it.
//!
//! Three subsystems do the work:
//!
//! - [`IngestPipeline`]: adapt, prune, and validate source notifications,
//!   then hand them to a single drain worker over a bounded queue.
//! - [`Storage`]: hourly [`BlockFile`](file::BlockFile)s, hour rotation,
//!   single-writer serialization.
//! - [`QueryEngine`]: file selection, index-driven block pruning, cached
//!   decode, in-block filtering, and synthetic state-event synthesis from
//!   carryover.
//!
//! # Example
//!
//! ```
//! use spectre::{
//!     IngestPipeline, Operation, QueryEngine, QueryFilter, RawNotification,
//!     ResourceIdentity, Storage, StorageConfig, StopSignal,
//! };
//! use std::sync::Arc;
//!
//! # let dir = tempfile::tempdir()?;
//! let storage = Arc::new(Storage::open(StorageConfig::new(dir.path()))?);
//! let config = StorageConfig::new(dir.path());
//! let pipeline = IngestPipeline::spawn(storage.clone(), &config);
//!
//! pipeline.submit(RawNotification {
//!     identity: ResourceIdentity {
//!         group: "apps".into(),
//!         version: "v1".into(),
//!         kind: "Deployment".into(),
//!         namespace: "default".into(),
//!         name: "nginx".into(),
//!         uid: "abc-123".into(),
//!     },
//!     timestamp: 1_700_000_000_000_000_000,
//!     operation: Operation::Create,
//!     payload: Some(serde_json::json!({"spec": {"replicas": 3}})),
//! });
//! pipeline.shutdown();
//!
//! let engine = QueryEngine::new(storage);
//! let response = engine.query(
//!     QueryFilter::new(0, 2_000_000_000_000_000_000).kind("Deployment"),
//!     &StopSignal::default(),
//! )?;
//! assert_eq!(1, response.events.len());
//! #
//! # Ok::<(), spectre::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![allow(missing_docs)]

mod binary_search;

#[doc(hidden)]
pub mod block;

mod block_cache;

#[doc(hidden)]
pub mod bloom;

mod checksum;

#[doc(hidden)]
pub mod coding;

mod compression;
mod config;
mod error;
mod event;

#[doc(hidden)]
pub mod file;

mod final_state;
mod ingest;
mod metrics;
mod query;
mod storage;
mod stop_signal;
mod time;

pub use compression::CompressionAlgorithm;
pub use config::StorageConfig;
pub use error::{Error, Result, Warning};
pub use event::{Operation, ResourceEvent, ResourceIdentity};
pub use ingest::{IngestPipeline, RawNotification};
pub use metrics::{Metrics, QueryMetrics};
pub use query::{QueryEngine, QueryFilter, QueryResponse};
pub use storage::Storage;
pub use stop_signal::StopSignal;
pub use time::HourBucket;

#[doc(hidden)]
#[cfg(feature = "test-util")]
pub use time::set_unix_timestamp_for_test;
