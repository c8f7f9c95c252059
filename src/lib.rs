//! # sourcekeeper - Shared Working-Tree and Build Manager
//!
//! Manages a single shared source-control working tree for a large codebase,
//! reconciles its commit history (mainline plus open pull requests) into a
//! queryable ordered log, and drives a multi-stage build pipeline producing
//! versioned, content-addressed archives of compiled output.
//!
//! ## Overview
//!
//! The core is the [`manager::SourcesManager`]: one component coordinating
//! working-tree mutation, commit-history reconciliation, and build execution
//! under a single global lock. Outer layers (coordinators, test schedulers,
//! CI tooling) only talk to its query and archive APIs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    SourcesManager    │  single global lock over one working tree
//! └──┬──────┬──────┬─────┘
//!    │      │      │
//! ┌──▼───┐┌─▼────┐┌─▼───────┐
//! │ git  ││build ││ archive │
//! │ sync ││pipe- ││ store   │
//! │      ││line  ││(tar.gz) │
//! └──────┘└──────┘└─────────┘
//! ```
//!
//! ## Modules
//!
//! - [`manager`]: the Sources Manager and its global lock
//! - [`history`]: commit log model, PR retention, positional splice, queries
//! - [`git`]: git CLI invocation and structured log export parsing
//! - [`pipeline`]: multi-phase compile-and-package flow with progress stream
//! - [`archive`]: content-addressed archive store
//! - [`config`]: configuration with file and environment sources
//! - [`paths`]: filesystem layout under the managed data root
//! - [`error`]: error types and result alias
//!
//! ## Usage Example
//!
//! ```no_run
//! use sourcekeeper::{Config, SourcesManager};
//!
//! #[tokio::main]
//! async fn main() -> sourcekeeper::Result<()> {
//!     let manager = SourcesManager::new(Config::load()?);
//!     manager.ensure_sources_updated().await?;
//!
//!     let latest = manager.get_git_log(0, 10, false).await?;
//!     if let Some(head) = latest.first() {
//!         manager.compile(&head.commit_hash, false, None).await?;
//!     }
//!     Ok(())
//! }
//! ```

/// Content-addressed archive persistence for source and binary snapshots
pub mod archive;

/// Configuration with environment variable overrides
pub mod config;

/// Error types and utilities
pub mod error;

/// Git CLI invocation and export parsing
pub mod git;

/// Commit log model and queries
pub mod history;

/// The Sources Manager
pub mod manager;

/// Filesystem layout helpers
pub mod paths;

/// Build pipeline phases and progress reporting
pub mod pipeline;

pub use archive::{ArchiveKind, ArchiveStore};
pub use config::Config;
pub use error::{Result, SourcesError};
pub use history::{GitLogPerson, GitLogRecord};
pub use manager::SourcesManager;
