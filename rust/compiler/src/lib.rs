// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # Diagram Compiler
//!
//! Batch compiler for display objects. A batch of queued object ids becomes
//! grid and location index rows, a content-hashed compact payload per object
//! and a set of downstream recompilation signals, all committed in one
//! transaction.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use diagram_compiler::{memory::MemoryStore, CompileOptions, Compiler};
//!
//! let store = Arc::new(MemoryStore::new());
//! let compiler = Compiler::new(store.clone(), store.clone(), CompileOptions::default());
//! let report = compiler.compile_batch(&items).await?;
//! ```
//!
//! ## Stages
//!
//! - [`clone`]: placement pointers get a fresh generation of clones
//! - [`overlay`]: live values are fetched once per namespace and merged
//! - [`prepare`]: geometry is scaled into its coordinate space
//! - [`template`]: template groups embed their children
//! - [`indexer`]: grid cells and location buckets, in parallel
//! - [`packer`]: null-stripped payload and content hash
//! - [`commit`]: lock, replace, publish, dequeue

pub mod clone;
pub mod commit;
pub mod indexer;
pub mod memory;
pub mod overlay;
pub mod packer;
pub mod pipeline;
pub mod prepare;
pub mod report;
pub mod retry;
pub mod store;
pub mod template;
pub mod worker;

pub use commit::{commit_batch, CommitBatch, CommitPhase, CommitSummary};
pub use indexer::{location_bucket, stable_hash};
pub use packer::content_hash;
pub use pipeline::{CompileOptions, Compiler};
pub use report::{CompileReport, SkippedObject};
pub use retry::{RetryDecision, RetryPolicy};
pub use store::{
    CatalogSource, CloneReplacement, CompiledObject, IdAllocator, IndexStore, IndexTransaction,
    LiveValueSource, ObjectStore, WorkQueue,
};
pub use worker::{run_once, BatchOutcome, WorkerOptions, WorkerPool};
